//! Normalization of raw engine frames.
//!
//! Engine payloads are loosely specified: keys show up in camelCase or
//! snake_case and citation metadata can sit at varying depth. Everything
//! is parsed exactly once here into [`InboundMessage`]; nothing past this
//! point looks at raw JSON.

use serde_json::Value;

use crate::grounding::find_grounding_chunks;
use crate::{Direction, GroundingChunk, LiveError, ToolCall, TranscriptFragment};

/// A normalized engine message plus any citations found anywhere in it.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub kind: MessageKind,
    pub grounding: Vec<GroundingChunk>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    SetupComplete,
    ToolCall(Vec<ToolCall>),
    ToolCallCancellation(Vec<String>),
    Content(ServerContent),
    GoAway { time_left: Option<String> },
    /// Usage reports and anything else without conversational content.
    Control,
}

/// Conversational payload of one message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerContent {
    pub interrupted: bool,
    /// Base64 audio parts, in order.
    pub audio: Vec<String>,
    pub input_transcript: Option<TranscriptFragment>,
    pub output_transcript: Option<TranscriptFragment>,
    pub turn_complete: bool,
}

/// Look up `camel` or its snake_case spelling.
fn field<'a>(value: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    value.get(camel).or_else(|| value.get(snake))
}

fn flag(value: &Value, camel: &str, snake: &str) -> bool {
    field(value, camel, snake)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

impl InboundMessage {
    pub fn from_text(text: &str, scan_depth: usize) -> Result<Self, LiveError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| LiveError::Protocol(e.to_string()))?;
        Self::from_value(&value, scan_depth)
    }

    pub fn from_value(value: &Value, scan_depth: usize) -> Result<Self, LiveError> {
        if !value.is_object() {
            return Err(LiveError::Protocol("engine message is not an object".into()));
        }

        let grounding = find_grounding_chunks(value, scan_depth);
        let calls = field(value, "toolCall", "tool_call").map(parse_tool_calls);
        let kind = if let Some(calls) = calls {
            if calls.is_empty() {
                MessageKind::Control
            } else {
                MessageKind::ToolCall(calls)
            }
        } else if let Some(cancel) = field(value, "toolCallCancellation", "tool_call_cancellation")
        {
            let ids = cancel
                .get("ids")
                .and_then(Value::as_array)
                .map(|ids| {
                    ids.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            MessageKind::ToolCallCancellation(ids)
        } else if let Some(content) = field(value, "serverContent", "server_content") {
            MessageKind::Content(parse_server_content(content))
        } else if field(value, "setupComplete", "setup_complete").is_some() {
            MessageKind::SetupComplete
        } else if let Some(go_away) = field(value, "goAway", "go_away") {
            MessageKind::GoAway {
                time_left: field(go_away, "timeLeft", "time_left")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }
        } else {
            MessageKind::Control
        };

        Ok(Self { kind, grounding })
    }
}

fn parse_tool_calls(tool_call: &Value) -> Vec<ToolCall> {
    let Some(calls) = field(tool_call, "functionCalls", "function_calls").and_then(Value::as_array)
    else {
        return Vec::new();
    };

    calls
        .iter()
        .filter_map(|fc| {
            let name = fc.get("name")?.as_str()?.to_string();
            let id = fc
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(concierge_common::fallback_call_id);
            let arguments = fc
                .get("args")
                .or_else(|| fc.get("arguments"))
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default()));
            Some(ToolCall { id, name, arguments })
        })
        .collect()
}

fn parse_transcription(value: &Value, direction: Direction) -> TranscriptFragment {
    TranscriptFragment {
        text: value
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        finished: flag(value, "finished", "finished") || flag(value, "isFinal", "is_final"),
        direction,
    }
}

fn parse_server_content(content: &Value) -> ServerContent {
    let audio = field(content, "modelTurn", "model_turn")
        .and_then(|turn| turn.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| field(part, "inlineData", "inline_data"))
                .filter(|inline| {
                    field(inline, "mimeType", "mime_type")
                        .and_then(Value::as_str)
                        .map_or(true, |mime| mime.starts_with("audio/"))
                })
                .filter_map(|inline| inline.get("data").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    ServerContent {
        interrupted: flag(content, "interrupted", "interrupted"),
        audio,
        input_transcript: field(content, "inputTranscription", "input_transcription")
            .map(|v| parse_transcription(v, Direction::User)),
        output_transcript: field(content, "outputTranscription", "output_transcription")
            .map(|v| parse_transcription(v, Direction::Assistant)),
        turn_complete: flag(content, "turnComplete", "turn_complete"),
    }
}
