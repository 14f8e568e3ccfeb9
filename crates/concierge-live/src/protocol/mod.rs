//! Wire types: envelopes sent to the browser and the normalized form of
//! every inbound engine message.

mod client;
mod inbound;

pub use client::ClientEnvelope;
pub use inbound::{InboundMessage, MessageKind, ServerContent};
