//! Background job completions injected into live sessions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::EngineHandle;

/// A finished background job, as published by the job runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub id: String,
    pub user_id: String,
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_summary: Option<String>,
}

/// Process-wide job completion stream.
#[derive(Clone)]
pub struct JobBus {
    sender: broadcast::Sender<JobEvent>,
}

impl JobBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of listeners that received the event.
    pub fn publish(&self, event: JobEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

/// Where a job result goes: the session's engine connection, guarded by
/// its stopping flag.
#[derive(Debug, Clone)]
pub struct JobSink {
    pub engine: EngineHandle,
    pub stopping: Arc<AtomicBool>,
}

/// Unsubscribe handle. Dropping it does not unsubscribe.
#[derive(Debug)]
pub struct JobSubscription {
    task: JoinHandle<()>,
}

impl JobSubscription {
    pub fn unsubscribe(&self) {
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

#[derive(Clone)]
pub struct BackgroundJobBridge {
    bus: JobBus,
    delivery_instruction: String,
}

impl BackgroundJobBridge {
    pub fn new(bus: JobBus, delivery_instruction: impl Into<String>) -> Self {
        Self {
            bus,
            delivery_instruction: delivery_instruction.into(),
        }
    }

    pub fn bus(&self) -> &JobBus {
        &self.bus
    }

    /// Listen for `user_id`'s job completions and forward each one to
    /// `sink` as a system turn.
    pub fn subscribe(&self, user_id: &str, sink: JobSink) -> JobSubscription {
        let mut rx = self.bus.subscribe();
        let user_id = user_id.to_owned();
        let instruction = self.delivery_instruction.clone();

        let task = tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(user = %user_id, skipped, "Job listener lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if event.user_id != user_id {
                    continue;
                }
                if sink.stopping.load(Ordering::SeqCst) {
                    debug!(user = %user_id, job = %event.id, "Session stopping, job result dropped");
                    break;
                }

                info!(user = %user_id, job = %event.id, tool = %event.tool_name, "Delivering job result");
                let text = job_turn_text(&event, &instruction);
                if let Err(e) = sink.engine.send_system_turn(text).await {
                    warn!(user = %user_id, job = %event.id, error = %e, "Failed to deliver job result");
                }
            }
        });

        JobSubscription { task }
    }
}

/// `reports.generate_export` becomes `Generate export`.
fn tool_label(tool_name: &str) -> String {
    let action = tool_name
        .rsplit_once('.')
        .map_or(tool_name, |(_, action)| action);
    let words = action.replace(['_', '-'], " ");
    let mut chars = words.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => tool_name.to_owned(),
    }
}

fn job_summary(event: &JobEvent) -> String {
    if let Some(summary) = event.output_summary.as_deref().filter(|s| !s.trim().is_empty()) {
        return summary.trim().to_owned();
    }
    match &event.result {
        Some(Value::String(s)) => s.clone(),
        Some(value) => value.to_string(),
        None => "no output".to_owned(),
    }
}

pub fn job_turn_text(event: &JobEvent, delivery_instruction: &str) -> String {
    format!(
        "Background task \"{}\" completed. Deliver this result to the user as {}: {}",
        tool_label(&event.tool_name),
        delivery_instruction,
        job_summary(event)
    )
}
