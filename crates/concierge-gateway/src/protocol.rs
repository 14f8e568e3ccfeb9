//! Gateway wire protocol: frames browsers and job publishers send in.
//! Outbound frames are `concierge_live::ClientEnvelope`.

use concierge_live::{HistoryTurn, JobEvent, Location, PageContext};
use serde::Deserialize;

/// A frame from a connected client. Voice clients open with `start`.
/// `job_feed` and `job` belong to the loopback job feed listener; the
/// client listener refuses them.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Start(StartFrame),
    Audio { data: String },
    Text { text: String },
    Stop,
    JobFeed,
    Job(JobEvent),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartFrame {
    pub user_id: String,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub page_context: Option<PageContext>,
}

impl ClientFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::Start(_) => "start",
            ClientFrame::Audio { .. } => "audio",
            ClientFrame::Text { .. } => "text",
            ClientFrame::Stop => "stop",
            ClientFrame::JobFeed => "job_feed",
            ClientFrame::Job(_) => "job",
        }
    }
}
