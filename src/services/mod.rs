//! Orchestration core services.

pub mod build_memory;
pub mod cost_ledger;
pub mod event_classifier;
pub mod instructions;
pub mod mcp_recommender;
pub mod phase_planner;
pub mod prompt_composer;
pub mod report;
pub mod research_coordinator;
pub mod scheduler;
pub mod spec_analyzer;
pub mod tool_gate;
pub mod tool_registry;

pub use build_memory::{MemoryStore, MemorySummary};
pub use cost_ledger::CostLedger;
pub use event_classifier::{ClassifiedRun, EventClassifier};
pub use instructions::InstructionSet;
pub use phase_planner::PhasePlanner;
pub use prompt_composer::PromptComposer;
pub use research_coordinator::ResearchCoordinator;
pub use scheduler::{BuildOutcome, BuildScheduler};
pub use tool_gate::ToolGate;
pub use tool_registry::ToolRegistry;

/// Extract a JSON object from an LLM response that may wrap it in
/// markdown fences or surrounding prose.
pub fn extract_json_from_response(response: &str) -> String {
    let trimmed = response.trim();

    if let Some(rest) = trimmed.strip_prefix("```json") {
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim().to_string();
        }
    }

    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim().to_string();
        }
    }

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return trimmed.to_string();
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            return trimmed[start..=end].to_string();
        }
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(
            extract_json_from_response(r#"{"a": 1}"#),
            r#"{"a": 1}"#
        );
    }

    #[test]
    fn test_extract_json_fenced() {
        assert_eq!(
            extract_json_from_response("```json\n{\"a\": 1}\n```"),
            r#"{"a": 1}"#
        );
        assert_eq!(
            extract_json_from_response("```\n{\"a\": 1}\n```"),
            r#"{"a": 1}"#
        );
    }

    #[test]
    fn test_extract_json_embedded() {
        assert_eq!(
            extract_json_from_response("Here is the plan: {\"a\": 1} as requested."),
            r#"{"a": 1}"#
        );
    }
}
