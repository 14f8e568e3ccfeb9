//! System instruction composition for a live session.
//!
//! The persona text and the live-data digest come from an
//! [`InstructionBuilder`]; this module only appends the per-session
//! digests (history, location, mission) around them.

use async_trait::async_trait;

use crate::session::{HistoryTurn, Location, PageContext};

/// Most recent history turns carried into the instruction.
const HISTORY_DIGEST_TURNS: usize = 12;

#[async_trait]
pub trait InstructionBuilder: Send + Sync {
    /// Static persona and behavior rules.
    fn persona(&self) -> String;

    /// Short summary of the user's current data (pipeline, tasks due).
    async fn live_data_digest(&self, _user_id: &str) -> Option<String> {
        None
    }
}

/// Persona supplied as plain text, no live data.
#[derive(Debug, Clone)]
pub struct StaticPersona(pub String);

impl InstructionBuilder for StaticPersona {
    fn persona(&self) -> String {
        self.0.clone()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InstructionContext<'a> {
    pub user_id: &'a str,
    pub history: &'a [HistoryTurn],
    pub location: Option<&'a Location>,
    pub page_context: Option<&'a PageContext>,
}

pub async fn compose_instructions(
    builder: &dyn InstructionBuilder,
    ctx: InstructionContext<'_>,
) -> String {
    let mut sections = vec![builder.persona().trim().to_owned()];

    if let Some(history) = history_digest(ctx.history) {
        sections.push(history);
    }
    if let Some(location) = ctx.location.map(location_digest) {
        sections.push(location);
    }
    if let Some(live) = builder.live_data_digest(ctx.user_id).await {
        let live = live.trim();
        if !live.is_empty() {
            sections.push(format!("CURRENT DATA:\n{live}"));
        }
    }
    if let Some(mission) = ctx.page_context.and_then(mission_digest) {
        sections.push(mission);
    }

    sections.retain(|s| !s.is_empty());
    sections.join("\n\n")
}

fn history_digest(history: &[HistoryTurn]) -> Option<String> {
    let start = history.len().saturating_sub(HISTORY_DIGEST_TURNS);
    let lines: Vec<String> = history[start..]
        .iter()
        .filter(|turn| !turn.text.trim().is_empty())
        .map(|turn| format!("{}: {}", turn.role, turn.text.trim()))
        .collect();
    if lines.is_empty() {
        return None;
    }
    Some(format!("RECENT CONVERSATION:\n{}", lines.join("\n")))
}

fn location_digest(location: &Location) -> String {
    match location.label.as_deref().filter(|l| !l.trim().is_empty()) {
        Some(label) => format!(
            "USER LOCATION: {} ({:.4}, {:.4})",
            label.trim(),
            location.latitude,
            location.longitude
        ),
        None => format!(
            "USER LOCATION: {:.4}, {:.4}",
            location.latitude, location.longitude
        ),
    }
}

fn mission_digest(page: &PageContext) -> Option<String> {
    let mission = page.mission.as_deref()?.trim();
    if mission.is_empty() {
        return None;
    }
    Some(format!("CURRENT MISSION:\n{mission}"))
}
