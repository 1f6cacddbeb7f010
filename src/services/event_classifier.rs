//! Streaming event classifier.
//!
//! Consumes raw NDJSON lines from the agent subprocess, reconstructs
//! semantic events, and applies their side effects to the ledger and the
//! tool registry in the exact order the lines were read. It is the sole
//! writer of both during a phase run.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::domain::models::{
    AgentEvent, AgentSession, ContentBlock, ResultEvent, ToolCategory,
};
use crate::services::cost_ledger::CostLedger;
use crate::services::tool_registry::ToolRegistry;

/// Everything the classifier learned from one phase's event stream.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedRun {
    pub session_id: Option<String>,
    pub active_mcp_servers: Vec<String>,
    /// Assistant text blocks, in order.
    pub transcript: Vec<String>,
    pub tool_call_ids: Vec<String>,
    /// Files referenced by file-operation tool inputs.
    pub files_created: Vec<String>,
    pub user_message_count: u64,
    pub phase_summary: Option<String>,
    pub phase_error: Option<String>,
    pub final_result: Option<ResultEvent>,
}

/// Classifies one phase attempt's stdout stream.
pub struct EventClassifier {
    ledger: Arc<RwLock<CostLedger>>,
    registry: Arc<RwLock<ToolRegistry>>,
}

impl EventClassifier {
    pub fn new(ledger: Arc<RwLock<CostLedger>>, registry: Arc<RwLock<ToolRegistry>>) -> Self {
        Self { ledger, registry }
    }

    /// Read lines until the channel closes, applying side effects in order.
    pub async fn consume(
        &self,
        phase_id: &str,
        lines: &mut mpsc::Receiver<String>,
    ) -> ClassifiedRun {
        let mut run = ClassifiedRun::default();
        let mut buffer = String::new();

        while let Some(line) = lines.recv().await {
            if line.trim().is_empty() {
                // A blank line terminates a failed buffer.
                flush_buffer(&mut buffer);
                continue;
            }

            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) {
                flush_buffer(&mut buffer);
                self.apply(phase_id, AgentEvent::from_value(value), &mut run)
                    .await;
                continue;
            }

            // Possibly a fragment of a multi-line JSON object: buffer and
            // re-attempt with the accumulated text.
            if buffer.is_empty() {
                buffer = line;
            } else {
                buffer.push('\n');
                buffer.push_str(&line);
            }
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&buffer) {
                buffer.clear();
                self.apply(phase_id, AgentEvent::from_value(value), &mut run)
                    .await;
            }
        }

        flush_buffer(&mut buffer);
        run
    }

    async fn apply(&self, phase_id: &str, event: AgentEvent, run: &mut ClassifiedRun) {
        match event {
            AgentEvent::SystemInit {
                session_id,
                tools,
                mcp_servers,
            } => {
                debug!(phase = phase_id, tools = tools.len(), "agent session initialized");
                if !mcp_servers.is_empty() {
                    info!(phase = phase_id, servers = ?mcp_servers, "active MCP servers");
                }
                run.session_id = session_id;
                run.active_mcp_servers = mcp_servers;
            }
            AgentEvent::User => {
                run.user_message_count += 1;
            }
            AgentEvent::Assistant { content } => {
                for block in content {
                    match block {
                        ContentBlock::Text { text } => run.transcript.push(text),
                        ContentBlock::ToolUse { id, name, input } => {
                            if let Some(path) = created_file_path(&name, &input) {
                                if !run.files_created.contains(&path) {
                                    run.files_created.push(path);
                                }
                            }
                            self.registry
                                .write()
                                .await
                                .start_call(&id, &name, input, Some(phase_id));
                            run.tool_call_ids.push(id);
                        }
                        ContentBlock::Other(_) => {}
                    }
                }
            }
            AgentEvent::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                let (result, error) = if is_error {
                    (None, Some(content.unwrap_or_else(|| "tool error".to_string())))
                } else {
                    (content, None)
                };
                self.registry.write().await.end_call(&tool_use_id, result, error);
            }
            AgentEvent::Result(result) => self.apply_result(phase_id, result, run).await,
            AgentEvent::Error { message } => {
                warn!(phase = phase_id, error = %message, "agent error event");
                run.phase_error = Some(message);
            }
            AgentEvent::Unknown(raw) => {
                debug!(phase = phase_id, event = %raw, "unrecognized agent event");
            }
        }
    }

    async fn apply_result(&self, phase_id: &str, result: ResultEvent, run: &mut ClassifiedRun) {
        match result.subtype.as_str() {
            "success" => {
                run.phase_summary = result
                    .result
                    .clone()
                    .filter(|s| !s.is_empty())
                    .or_else(|| Some("phase completed".to_string()));
                if let Some(cost) = result.cost_usd {
                    self.ledger.write().await.add_agent_session_cost(
                        cost,
                        AgentSession {
                            session_id: result
                                .session_id
                                .clone()
                                .or_else(|| run.session_id.clone())
                                .unwrap_or_else(|| "unknown".to_string()),
                            phase: Some(phase_id.to_string()),
                            duration_ms: result.duration_ms.unwrap_or(0),
                            num_turns: result.num_turns.unwrap_or(0),
                        },
                    );
                }
            }
            "error_max_turns" => {
                run.phase_error = Some("maximum turns exceeded".to_string());
            }
            "error" => {
                run.phase_error = Some(
                    result
                        .result
                        .clone()
                        .unwrap_or_else(|| "agent reported an error".to_string()),
                );
            }
            other => {
                // Unknown subtype: success-shaped if it carries a cost.
                if result.cost_usd.is_some() {
                    warn!(phase = phase_id, subtype = other, "treating unknown result subtype as success");
                    let mut success = result.clone();
                    success.subtype = "success".to_string();
                    Box::pin(self.apply_result(phase_id, success, run)).await;
                    return;
                }
                debug!(phase = phase_id, subtype = other, "ignoring unknown result subtype");
            }
        }
        run.final_result = Some(result);
    }
}

/// Surface an abandoned parse buffer to the logger, verbatim.
fn flush_buffer(buffer: &mut String) {
    if !buffer.is_empty() {
        info!(raw = %buffer, "agent emitted non-JSON output");
        buffer.clear();
    }
}

/// File path from a file-creating tool invocation, if any.
fn created_file_path(name: &str, input: &serde_json::Value) -> Option<String> {
    if ToolCategory::classify(name) != ToolCategory::FileOperation {
        return None;
    }
    let lower = name.to_lowercase();
    if !(lower.contains("write") || lower.contains("create") || lower.contains("edit")) {
        return None;
    }
    input
        .get("file_path")
        .or_else(|| input.get("path"))
        .and_then(serde_json::Value::as_str)
        .map(String::from)
}
