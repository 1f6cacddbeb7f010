//! Semantic events reconstructed from the external agent's NDJSON stream.

use serde_json::Value;

/// One content block inside an assistant message.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// Block types this build does not act on.
    Other(Value),
}

/// Terminal result event emitted once per session.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEvent {
    pub subtype: String,
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<u64>,
    pub num_turns: Option<u32>,
    pub session_id: Option<String>,
    pub result: Option<String>,
}

/// A recognized agent event. Unknown types carry the raw JSON
/// so the classifier can forward them to the logger.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    SystemInit {
        session_id: Option<String>,
        tools: Vec<String>,
        mcp_servers: Vec<String>,
    },
    User,
    Assistant {
        content: Vec<ContentBlock>,
    },
    ToolResult {
        tool_use_id: String,
        content: Option<String>,
        is_error: bool,
    },
    Result(ResultEvent),
    Error {
        message: String,
    },
    Unknown(Value),
}

impl AgentEvent {
    /// Decode one parsed JSON object into a semantic event.
    pub fn from_value(value: Value) -> Self {
        let Some(event_type) = value.get("type").and_then(Value::as_str) else {
            return Self::Unknown(value);
        };

        match event_type {
            "system" => {
                if value.get("subtype").and_then(Value::as_str) != Some("init") {
                    return Self::Unknown(value);
                }
                let session_id = value
                    .get("session_id")
                    .and_then(Value::as_str)
                    .map(String::from);
                let tools = string_list(value.get("tools"));
                let mcp_servers = value
                    .get("mcp_servers")
                    .and_then(Value::as_array)
                    .map(|servers| {
                        servers
                            .iter()
                            .filter_map(|s| match s {
                                Value::String(name) => Some(name.clone()),
                                Value::Object(obj) => obj
                                    .get("name")
                                    .and_then(Value::as_str)
                                    .map(String::from),
                                _ => None,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Self::SystemInit {
                    session_id,
                    tools,
                    mcp_servers,
                }
            }
            "user" => Self::User,
            "assistant" => {
                let content = value
                    .get("message")
                    .and_then(|m| m.get("content"))
                    .and_then(Value::as_array)
                    .map(|blocks| blocks.iter().map(parse_block).collect())
                    .unwrap_or_default();
                Self::Assistant { content }
            }
            "tool_result" => {
                let Some(tool_use_id) = value
                    .get("tool_use_id")
                    .and_then(Value::as_str)
                    .map(String::from)
                else {
                    return Self::Unknown(value);
                };
                let content = value.get("content").map(stringify_content);
                let is_error = value
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                Self::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                }
            }
            "result" => Self::Result(ResultEvent {
                subtype: value
                    .get("subtype")
                    .and_then(Value::as_str)
                    .unwrap_or("success")
                    .to_string(),
                cost_usd: value.get("cost_usd").and_then(Value::as_f64),
                duration_ms: value.get("duration_ms").and_then(Value::as_u64),
                num_turns: value
                    .get("num_turns")
                    .and_then(Value::as_u64)
                    .map(|n| n as u32),
                session_id: value
                    .get("session_id")
                    .and_then(Value::as_str)
                    .map(String::from),
                result: value.get("result").map(stringify_content),
            }),
            "error" => Self::Error {
                message: value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown agent error")
                    .to_string(),
            },
            _ => Self::Unknown(value),
        }
    }
}

fn parse_block(block: &Value) -> ContentBlock {
    match block.get("type").and_then(Value::as_str) {
        Some("text") => ContentBlock::Text {
            text: block
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        Some("tool_use") => ContentBlock::ToolUse {
            id: block
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            name: block
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            input: block.get("input").cloned().unwrap_or(Value::Null),
        },
        _ => ContentBlock::Other(block.clone()),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Flatten a tool-result or result payload to text.
fn stringify_content(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_system_init() {
        let event = AgentEvent::from_value(json!({
            "type": "system",
            "subtype": "init",
            "session_id": "S1",
            "tools": ["Read", "Write"],
            "mcp_servers": [{"name": "memory", "status": "connected"}],
        }));
        match event {
            AgentEvent::SystemInit {
                session_id,
                tools,
                mcp_servers,
            } => {
                assert_eq!(session_id.as_deref(), Some("S1"));
                assert_eq!(tools, vec!["Read", "Write"]);
                assert_eq!(mcp_servers, vec!["memory"]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_assistant_blocks() {
        let event = AgentEvent::from_value(json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "text", "text": "creating files"},
                {"type": "tool_use", "id": "t1", "name": "Write",
                 "input": {"file_path": "main.go"}},
            ]},
        }));
        let AgentEvent::Assistant { content } = event else {
            panic!("expected assistant event");
        };
        assert_eq!(content.len(), 2);
        assert!(matches!(&content[0], ContentBlock::Text { text } if text == "creating files"));
        assert!(matches!(&content[1], ContentBlock::ToolUse { id, name, .. }
            if id == "t1" && name == "Write"));
    }

    #[test]
    fn test_result_success() {
        let event = AgentEvent::from_value(json!({
            "type": "result",
            "subtype": "success",
            "cost_usd": 0.5,
            "num_turns": 1,
            "duration_ms": 1200,
        }));
        let AgentEvent::Result(result) = event else {
            panic!("expected result event");
        };
        assert_eq!(result.subtype, "success");
        assert_eq!(result.cost_usd, Some(0.5));
        assert_eq!(result.num_turns, Some(1));
    }

    #[test]
    fn test_tool_result_array_content() {
        let event = AgentEvent::from_value(json!({
            "type": "tool_result",
            "tool_use_id": "t1",
            "content": [{"type": "text", "text": "ok"}],
        }));
        let AgentEvent::ToolResult {
            tool_use_id,
            content,
            is_error,
        } = event
        else {
            panic!("expected tool_result event");
        };
        assert_eq!(tool_use_id, "t1");
        assert_eq!(content.as_deref(), Some("ok"));
        assert!(!is_error);
    }

    #[test]
    fn test_unknown_type_preserved() {
        let raw = json!({"type": "heartbeat", "seq": 7});
        let event = AgentEvent::from_value(raw.clone());
        assert_eq!(event, AgentEvent::Unknown(raw));
    }
}
