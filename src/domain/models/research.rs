//! Research queries, findings, and synthesis records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a research query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

/// A specialist question derived from the project profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchQuery {
    pub id: String,
    /// Category tag, e.g. "technology_analysis" or "security_analysis".
    pub category: String,
    pub text: String,
    pub focus_areas: Vec<String>,
    /// Higher runs earlier in synthesis ordering.
    pub priority: u8,
    pub estimated_minutes: u32,
    pub status: QueryStatus,
}

/// One specialty × query result cell.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchFinding {
    pub query_id: String,
    pub specialty: String,
    pub summary: String,
    pub recommendations: Vec<String>,
    pub best_practices: Vec<String>,
    pub implementation_patterns: Vec<String>,
    pub tools_and_versions: Vec<String>,
    pub pitfalls: Vec<String>,
    /// 0.0 - 1.0, see the coordinator's scoring rules.
    pub confidence: f64,
}

/// Aggregated design document produced from all findings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchSynthesis {
    pub executive_summary: String,
    pub prioritized_recommendations: Vec<String>,
    pub technology_decisions: Vec<String>,
    pub security_requirements: Vec<String>,
    pub risk_mitigations: Vec<String>,
    pub phased_roadmap: Vec<String>,
}

/// Full research output: the dump written to `.research/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchResults {
    pub queries: Vec<ResearchQuery>,
    pub findings: Vec<ResearchFinding>,
    pub synthesis: ResearchSynthesis,
    pub generated_at: Option<DateTime<Utc>>,
}

impl ResearchResults {
    /// Findings for a given category, highest confidence first.
    pub fn findings_for_category(&self, category: &str) -> Vec<&ResearchFinding> {
        let query_ids: Vec<&str> = self
            .queries
            .iter()
            .filter(|q| q.category == category)
            .map(|q| q.id.as_str())
            .collect();
        let mut findings: Vec<&ResearchFinding> = self
            .findings
            .iter()
            .filter(|f| query_ids.contains(&f.query_id.as_str()))
            .collect();
        findings.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        findings
    }
}
