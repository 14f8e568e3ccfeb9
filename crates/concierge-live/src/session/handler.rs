//! One engine message, one state-machine step.

use tracing::{debug, info, warn};

use super::Session;
use crate::grounding::format_sources;
use crate::protocol::{ClientEnvelope, InboundMessage, MessageKind, ServerContent};
use crate::tools::{DispatchContext, ToolCallDispatcher};
use crate::{LiveError, ToolCall};

/// Deliver to the client. A failed send is logged and processing goes on,
/// so turn state still resets.
fn relay(session: &Session, envelope: ClientEnvelope) {
    let kind = envelope.kind();
    if let Err(e) = session.relay.send(envelope) {
        warn!(session = %session.id, kind, error = %e, "Client send failed");
    }
}

pub(crate) async fn handle_message(
    session: &Session,
    dispatcher: &ToolCallDispatcher,
    message: InboundMessage,
) -> Result<(), LiveError> {
    if session.is_stopping() {
        return Ok(());
    }

    if !message.grounding.is_empty() {
        let mut turn = session.turn.lock().await;
        if session.is_stopping() {
            return Ok(());
        }
        if !turn.diagnostics_logged {
            debug!(
                session = %session.id,
                chunks = message.grounding.len(),
                "Grounding metadata in turn"
            );
            turn.diagnostics_logged = true;
        }
        for chunk in &message.grounding {
            turn.sources.add(chunk);
        }
    }

    match message.kind {
        MessageKind::ToolCall(calls) => handle_tool_calls(session, dispatcher, calls).await,
        MessageKind::Content(content) => {
            handle_content(session, content).await;
            Ok(())
        }
        MessageKind::SetupComplete => {
            debug!(session = %session.id, "Engine setup complete");
            Ok(())
        }
        MessageKind::ToolCallCancellation(ids) => {
            info!(session = %session.id, ?ids, "Engine cancelled tool calls");
            Ok(())
        }
        MessageKind::GoAway { time_left } => {
            info!(session = %session.id, ?time_left, "Engine will disconnect soon");
            Ok(())
        }
        MessageKind::Control => Ok(()),
    }
}

async fn handle_tool_calls(
    session: &Session,
    dispatcher: &ToolCallDispatcher,
    calls: Vec<ToolCall>,
) -> Result<(), LiveError> {
    if calls.is_empty() {
        return Ok(());
    }
    let ctx = DispatchContext {
        user_id: session.user_id.clone(),
        session_id: session.id.to_string(),
        conversation_id: session.conversation_id.clone(),
        voice_mode: true,
    };
    debug!(session = %session.id, count = calls.len(), "Dispatching tool calls");
    let dispatched = dispatcher.dispatch_all(&calls, &ctx).await;

    if session.is_stopping() {
        debug!(session = %session.id, "Session stopped during tool calls, reply dropped");
        return Ok(());
    }

    let mut follow_ups = Vec::new();
    let results: Vec<_> = dispatched
        .into_iter()
        .map(|d| {
            follow_ups.extend(d.follow_up);
            d.result
        })
        .collect();
    session.engine.send_tool_response(results).await?;

    for text in follow_ups {
        if let Err(e) = session.engine.send_system_turn(text).await {
            warn!(session = %session.id, error = %e, "Follow-up turn not sent");
        }
    }
    Ok(())
}

async fn handle_content(session: &Session, content: ServerContent) {
    let mut turn = session.turn.lock().await;
    if session.is_stopping() {
        return;
    }

    if content.interrupted {
        relay(session, ClientEnvelope::Interrupted);
        return;
    }

    for data in content.audio {
        relay(session, ClientEnvelope::Audio { data });
    }

    if let Some(fragment) = content.input_transcript {
        let finalized_before = turn.transcript.finalized().len();
        turn.transcript.update(&fragment);
        let text = if fragment.finished {
            let finalized = turn.transcript.finalized();
            if finalized.len() > finalized_before {
                finalized.last().cloned().unwrap_or_default()
            } else {
                String::new()
            }
        } else {
            turn.transcript.interim().to_owned()
        };
        relay(
            session,
            ClientEnvelope::InputTranscript {
                text,
                is_final: fragment.finished,
            },
        );
    }

    if let Some(fragment) = content.output_transcript {
        relay(
            session,
            ClientEnvelope::Transcript {
                text: fragment.text,
                is_final: fragment.finished,
            },
        );
    }

    if content.turn_complete {
        let sources = turn.sources.flush();
        if !sources.is_empty() {
            let formatted_text = format_sources(&sources);
            relay(
                session,
                ClientEnvelope::Sources {
                    sources,
                    formatted_text,
                },
            );
        }
        turn.diagnostics_logged = false;

        let utterance = turn.transcript.flush();
        if !utterance.is_empty() {
            relay(session, ClientEnvelope::UserTurnComplete { text: utterance });
        }
        relay(session, ClientEnvelope::TurnComplete);
    }
}
