//! Agent response parsing.
//!
//! Agents answer with free-form text. The parser accepts, in order of
//! preference:
//!
//! 1. A JSON array of tagged actions: `[{"type": "schedule", "task_id": "t1", "step": 5}]`
//! 2. A single tagged action object: `{"type": "noop"}`
//! 3. An object wrapping an action list: `{"actions": [...]}`
//! 4. A keyed batch: `{"schedule": [{"task_id": "t1", "step": 5}], "reject": ["r2"]}`
//! 5. Line-oriented text: `schedule t1 at step 5`, `reschedule t1 to step 7`,
//!    `reject t2`, `cancel t3`, `noop`
//!
//! JSON may be wrapped in a markdown code fence.

use crate::batch::ActionBatch;
use qbench_types::{Action, Step, TaskId};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Maximum number of response characters echoed back in errors.
const ERROR_EXCERPT_LEN: usize = 200;

/// Errors produced while parsing an agent response.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The response is JSON but does not describe actions.
    #[error("Invalid action JSON: {0}")]
    InvalidJson(String),

    /// Neither JSON nor any recognised text command.
    #[error("Could not parse response: {0}")]
    Unrecognized(String),
}

/// Parses agent responses into ordered action lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser;

impl ResponseParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a response into actions, in submission order.
    ///
    /// An empty response is an empty batch.
    pub fn parse(&self, response: &str) -> Result<Vec<Action>, ParseError> {
        let body = strip_code_fence(response.trim());
        if body.is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Value>(body) {
            Ok(value) => self.parse_json(value),
            Err(_) => self.parse_text(body),
        }
    }

    fn parse_json(&self, value: Value) -> Result<Vec<Action>, ParseError> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| {
                    serde_json::from_value::<Action>(item)
                        .map_err(|e| ParseError::InvalidJson(e.to_string()))
                })
                .collect(),
            Value::Object(map) => {
                if map.contains_key("type") {
                    let action = serde_json::from_value::<Action>(Value::Object(map))
                        .map_err(|e| ParseError::InvalidJson(e.to_string()))?;
                    return Ok(vec![action]);
                }
                if let Some(actions) = map.get("actions") {
                    return self.parse_json(actions.clone());
                }
                if !map.is_empty() && map.keys().all(|k| ActionBatch::KEYS.contains(&k.as_str())) {
                    let batch = serde_json::from_value::<ActionBatch>(Value::Object(map))
                        .map_err(|e| ParseError::InvalidJson(e.to_string()))?;
                    return Ok(batch.into_actions());
                }
                Err(ParseError::InvalidJson(
                    "object is neither an action, an action list nor a keyed batch".to_string(),
                ))
            }
            other => Err(ParseError::InvalidJson(format!(
                "expected object or array, got {}",
                other
            ))),
        }
    }

    fn parse_text(&self, body: &str) -> Result<Vec<Action>, ParseError> {
        let mut actions = Vec::new();
        let mut recognized = false;

        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_text_line(line) {
                Some(action) => {
                    recognized = true;
                    if action != Action::Noop {
                        actions.push(action);
                    }
                }
                None => debug!(line, "Ignoring unrecognised response line"),
            }
        }

        if recognized {
            Ok(actions)
        } else {
            Err(ParseError::Unrecognized(excerpt(body)))
        }
    }
}

/// Parse one text command. Keywords are case-insensitive; task ids are not.
fn parse_text_line(line: &str) -> Option<Action> {
    let tokens: Vec<&str> = line
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| c == ',' || c == ';'))
        .filter(|t| !t.is_empty())
        .collect();
    let keyword = tokens.first()?.to_ascii_lowercase();

    match keyword.as_str() {
        "noop" | "no-op" | "nothing" => Some(Action::Noop),
        "schedule" | "reschedule" => {
            let task_id = TaskId::new(*tokens.get(1)?);
            // Skip filler words such as "at", "to", "step".
            let step = tokens[2..].iter().find_map(|t| t.parse::<u64>().ok())?;
            if keyword == "schedule" {
                Some(Action::Schedule {
                    task_id,
                    step: Step(step),
                })
            } else {
                Some(Action::Reschedule {
                    task_id,
                    step: Step(step),
                })
            }
        }
        "reject" => Some(Action::Reject {
            task_id: TaskId::new(*tokens.get(1)?),
        }),
        "cancel" => Some(Action::Cancel {
            task_id: TaskId::new(*tokens.get(1)?),
        }),
        _ => None,
    }
}

fn strip_code_fence(body: &str) -> &str {
    let Some(rest) = body.strip_prefix("```") else {
        return body;
    };
    // Drop an optional language tag on the opening fence line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn excerpt(body: &str) -> String {
    if body.chars().count() <= ERROR_EXCERPT_LEN {
        body.to_string()
    } else {
        let cut: String = body.chars().take(ERROR_EXCERPT_LEN).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(response: &str) -> Result<Vec<Action>, ParseError> {
        ResponseParser::new().parse(response)
    }

    #[test]
    fn test_json_array() {
        let actions = parse(
            r#"[{"type": "schedule", "task_id": "t1", "step": 5}, {"type": "reject", "task_id": "r2"}]"#,
        )
        .unwrap();
        assert_eq!(actions, vec![Action::schedule("t1", 5), Action::reject("r2")]);
    }

    #[test]
    fn test_single_object_and_wrapper() {
        assert_eq!(parse(r#"{"type": "noop"}"#).unwrap(), vec![Action::Noop]);
        assert_eq!(
            parse(r#"{"actions": [{"type": "cancel", "task_id": "x"}]}"#).unwrap(),
            vec![Action::cancel("x")]
        );
    }

    #[test]
    fn test_keyed_batch() {
        let actions =
            parse(r#"{"schedule": [{"task_id": "a", "step": 2}], "reject": ["b"]}"#).unwrap();
        assert_eq!(actions, vec![Action::schedule("a", 2), Action::reject("b")]);
    }

    #[test]
    fn test_code_fence_is_stripped() {
        let response = "```json\n[{\"type\": \"schedule\", \"task_id\": \"t1\", \"step\": 3}]\n```";
        assert_eq!(parse(response).unwrap(), vec![Action::schedule("t1", 3)]);
    }

    #[test]
    fn test_text_commands() {
        let response = "# plan\nSchedule T1 at step 5\nreschedule t2 to step 7\nreject r3\ncancel c4\nnoop";
        assert_eq!(
            parse(response).unwrap(),
            vec![
                Action::schedule("T1", 5),
                Action::reschedule("t2", 7),
                Action::reject("r3"),
                Action::cancel("c4"),
            ]
        );
    }

    #[test]
    fn test_unparsable_responses() {
        assert!(matches!(
            parse("I think we should wait."),
            Err(ParseError::Unrecognized(_))
        ));
        assert!(matches!(
            parse(r#"{"type": "teleport", "task_id": "a"}"#),
            Err(ParseError::InvalidJson(_))
        ));
        assert!(matches!(parse("42"), Err(ParseError::InvalidJson(_))));
        assert!(matches!(
            parse(r#"{"assign": []}"#),
            Err(ParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_empty_response_is_empty_batch() {
        assert!(parse("   ").unwrap().is_empty());
    }
}
