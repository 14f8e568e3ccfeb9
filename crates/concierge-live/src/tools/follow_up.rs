//! Proactive follow-up suggestions after successful tool calls.

use serde_json::Value;

fn display_name(result: &Value) -> Option<String> {
    let obj = result.as_object()?;
    if let Some(name) = obj.get("name").and_then(Value::as_str) {
        return Some(name.to_string());
    }
    let first = obj
        .get("first_name")
        .or_else(|| obj.get("firstName"))
        .and_then(Value::as_str)?;
    Some(first.to_string())
}

/// Suggestion the assistant should offer after `tool_name` succeeded with
/// `result`, if any.
pub fn follow_up_for(tool_name: &str, result: &Value) -> Option<String> {
    let (domain, action) = tool_name.split_once('.')?;
    match (domain, action) {
        ("contacts", "create") => Some(match display_name(result) {
            Some(name) => format!(
                "The contact {name} was just created. Offer to schedule a follow-up call with {name} or attach them to a deal."
            ),
            None => "A contact was just created. Offer to schedule a follow-up call or attach them to a deal.".to_string(),
        }),
        ("properties", "create") => Some(
            "A property was just added. Offer to pull comparable listings nearby or set up a showing.".to_string(),
        ),
        ("deals", "create") => Some(
            "A deal was just opened. Offer to create a task to check in on it next week.".to_string(),
        ),
        ("deals", "update_stage") => {
            let stage = result.get("stage").and_then(Value::as_str).unwrap_or_default();
            if stage.starts_with("closed") {
                Some("The deal just closed. Offer to draft a thank-you note to the client.".to_string())
            } else {
                Some("The deal stage changed. Offer to let the client know about the update.".to_string())
            }
        }
        ("tasks", "create") => Some(
            "A task was just created. Offer a reminder the day before it is due.".to_string(),
        ),
        _ => None,
    }
}
