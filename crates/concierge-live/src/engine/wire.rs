//! JSON encoding of outbound messages for the Gemini Live protocol.

use serde_json::{json, Value};

use super::{EngineCommand, EngineSetup, SYSTEM_TURN_PREFIX};
use crate::ToolResult;

/// Mime type of client audio.
pub(crate) const INPUT_AUDIO_MIME: &str = "audio/pcm;rate=16000";

pub(crate) fn setup_message(model: &str, voice: &str, setup: &EngineSetup) -> Value {
    let mut tools = Vec::new();
    if !setup.function_declarations.is_empty() {
        tools.push(json!({ "functionDeclarations": setup.function_declarations }));
    }
    if setup.include_search {
        tools.push(json!({ "googleSearch": {} }));
    }

    json!({
        "setup": {
            "model": model,
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
                }
            },
            "systemInstruction": { "parts": [{ "text": setup.instruction }] },
            "tools": tools,
            "inputAudioTranscription": {},
            "outputAudioTranscription": {}
        }
    })
}

fn user_turn(text: &str) -> Value {
    json!({
        "clientContent": {
            "turns": [{ "role": "user", "parts": [{ "text": text }] }],
            "turnComplete": true
        }
    })
}

fn function_response(result: &ToolResult) -> Value {
    let response = if result.success {
        json!({ "result": result.result.clone().unwrap_or(Value::Null) })
    } else {
        json!({ "error": result.error.clone().unwrap_or_else(|| "unknown error".into()) })
    };
    json!({ "id": result.id, "name": result.name, "response": response })
}

/// Encode a command as a JSON frame. `Close` has no frame of its own.
pub fn encode_command(command: &EngineCommand) -> Option<Value> {
    match command {
        EngineCommand::Audio { data } => Some(json!({
            "realtimeInput": { "audio": { "data": data, "mimeType": INPUT_AUDIO_MIME } }
        })),
        EngineCommand::UserText { text } => Some(user_turn(text)),
        EngineCommand::SystemTurn { text } => {
            Some(user_turn(&format!("{SYSTEM_TURN_PREFIX} {text}")))
        }
        EngineCommand::ToolResponse { results } => Some(json!({
            "toolResponse": {
                "functionResponses": results.iter().map(function_response).collect::<Vec<_>>()
            }
        })),
        EngineCommand::Close => None,
    }
}
