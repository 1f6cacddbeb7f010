//! Research coordinator: parallel specialist queries with synthesis.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::errors::BuildResult;
use crate::domain::models::{
    ComplexityTier, CostCategory, ProjectProfile, QueryStatus, ResearchFinding, ResearchQuery,
    ResearchResults, ResearchSynthesis,
};
use crate::domain::ports::{LlmClient, LlmRequest};
use crate::services::cost_ledger::CostLedger;
use crate::services::extract_json_from_response;

/// Specialist agents available for research assignments.
const SPECIALISTS: &[(&str, &str, &[&str])] = &[
    ("technology-analyst", "TechnologyAnalyst", &["technology", "architecture", "tooling"]),
    ("security-specialist", "SecuritySpecialist", &["security", "auth", "compliance"]),
    ("performance-engineer", "PerformanceEngineer", &["performance", "scaling", "optimization"]),
    ("solutions-architect", "SolutionsArchitect", &["architecture", "patterns", "integration"]),
    ("best-practices-advisor", "BestPracticesAdvisor", &["best-practices", "testing", "quality"]),
    ("devops-specialist", "DevOpsSpecialist", &["deployment", "ci-cd", "operations"]),
];

/// Per-call timeout for specialist LLM requests.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Finding shape requested from specialists.
#[derive(Debug, Default, Deserialize)]
struct LlmFinding {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    recommendations: Vec<String>,
    #[serde(default)]
    best_practices: Vec<String>,
    #[serde(default)]
    implementation_patterns: Vec<String>,
    #[serde(default)]
    tools_and_versions: Vec<String>,
    #[serde(default)]
    pitfalls: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmSynthesis {
    #[serde(default)]
    executive_summary: String,
    #[serde(default)]
    prioritized_recommendations: Vec<String>,
    #[serde(default)]
    technology_decisions: Vec<String>,
    #[serde(default)]
    security_requirements: Vec<String>,
    #[serde(default)]
    risk_mitigations: Vec<String>,
    #[serde(default)]
    phased_roadmap: Vec<String>,
}

/// Fans research queries out to specialists and merges the results.
pub struct ResearchCoordinator {
    llm: Arc<dyn LlmClient>,
    model: String,
    ledger: Arc<RwLock<CostLedger>>,
    call_timeout: Duration,
    dump_dir: Option<PathBuf>,
}

impl ResearchCoordinator {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, ledger: Arc<RwLock<CostLedger>>) -> Self {
        Self {
            llm,
            model: model.into(),
            ledger,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            dump_dir: None,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Persist the full research dump under this directory.
    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    /// Run the full research pass for a profile.
    ///
    /// Individual call failures and timeouts are logged, never fatal.
    pub async fn run(&self, profile: &ProjectProfile) -> ResearchResults {
        let mut queries = build_queries(profile);
        let assignments = assign_agents(&queries);

        info!(
            queries = queries.len(),
            calls = assignments.len(),
            "dispatching research fan-out"
        );

        let mut futures = FuturesUnordered::new();
        for (query_index, specialist) in assignments {
            let query = queries[query_index].clone();
            futures.push(async move {
                let outcome = tokio::time::timeout(
                    self.call_timeout,
                    self.query_specialist(&query, specialist),
                )
                .await;
                (query_index, specialist, outcome)
            });
        }

        let mut findings = Vec::new();
        while let Some((query_index, specialist, outcome)) = futures.next().await {
            match outcome {
                Ok(Ok(finding)) => {
                    queries[query_index].status = QueryStatus::Completed;
                    findings.push(finding);
                }
                Ok(Err(e)) => {
                    warn!(query = %queries[query_index].id, specialist = specialist.1, error = %e, "research call failed");
                    if queries[query_index].status != QueryStatus::Completed {
                        queries[query_index].status = QueryStatus::Failed;
                    }
                }
                Err(_) => {
                    warn!(query = %queries[query_index].id, specialist = specialist.1, "research call timed out");
                    if queries[query_index].status != QueryStatus::Completed {
                        queries[query_index].status = QueryStatus::TimedOut;
                    }
                }
            }
        }

        let mut results = ResearchResults {
            queries,
            findings,
            synthesis: ResearchSynthesis::default(),
            generated_at: Some(Utc::now()),
        };
        results.synthesis = self.synthesize(&results).await;

        if let Some(dir) = &self.dump_dir {
            if let Err(e) = write_dump(&results, dir) {
                warn!(error = %e, "failed to write research dump");
            }
        }
        results
    }

    async fn query_specialist(
        &self,
        query: &ResearchQuery,
        specialist: (&str, &str, &[&str]),
    ) -> BuildResult<ResearchFinding> {
        let (_, specialty, focus) = specialist;
        let prompt = format!(
            r#"You are {specialty}, focused on {}.

Research question: {}
Focus areas: {}

Respond with a JSON object:
{{
  "summary": "...",
  "recommendations": ["..."],
  "best_practices": ["..."],
  "implementation_patterns": ["..."],
  "tools_and_versions": ["..."],
  "pitfalls": ["..."]
}}

Output ONLY the JSON object."#,
            focus.join(", "),
            query.text,
            query.focus_areas.join(", "),
        );

        let response = self
            .llm
            .complete(LlmRequest {
                model: self.model.clone(),
                system: None,
                prompt,
                max_tokens: 2048,
                temperature: 0.4,
            })
            .await?;

        self.ledger.write().await.add_token_usage(
            response.input_tokens,
            response.output_tokens,
            &self.model,
            None,
            CostCategory::Research,
        );

        Ok(parse_finding(&response.text, &query.id, specialty))
    }

    /// Basic synthesis, upgraded by an optional LLM executive pass.
    async fn synthesize(&self, results: &ResearchResults) -> ResearchSynthesis {
        let basic = basic_synthesis(results);
        if results.findings.is_empty() {
            return basic;
        }

        match self.executive_synthesis(results).await {
            Ok(executive) => executive,
            Err(e) => {
                warn!(error = %e, "executive synthesis failed; keeping basic synthesis");
                basic
            }
        }
    }

    async fn executive_synthesis(
        &self,
        results: &ResearchResults,
    ) -> BuildResult<ResearchSynthesis> {
        let findings_json = serde_json::to_string(&results.findings)?;
        let prompt = format!(
            r#"Merge these research findings into an executive synthesis.

Findings:
{findings_json}

Respond with a JSON object:
{{
  "executive_summary": "...",
  "prioritized_recommendations": ["..."],
  "technology_decisions": ["..."],
  "security_requirements": ["..."],
  "risk_mitigations": ["..."],
  "phased_roadmap": ["..."]
}}

Output ONLY the JSON object."#,
        );

        let response = self
            .llm
            .complete(LlmRequest {
                model: self.model.clone(),
                system: None,
                prompt,
                max_tokens: 2048,
                temperature: 0.2,
            })
            .await?;

        self.ledger.write().await.add_token_usage(
            response.input_tokens,
            response.output_tokens,
            &self.model,
            None,
            CostCategory::Research,
        );

        let json = extract_json_from_response(&response.text);
        let parsed: LlmSynthesis = serde_json::from_str(&json)?;
        Ok(ResearchSynthesis {
            executive_summary: parsed.executive_summary,
            prioritized_recommendations: parsed.prioritized_recommendations,
            technology_decisions: parsed.technology_decisions,
            security_requirements: parsed.security_requirements,
            risk_mitigations: parsed.risk_mitigations,
            phased_roadmap: parsed.phased_roadmap,
        })
    }
}

/// The fixed query set for a profile.
pub fn build_queries(profile: &ProjectProfile) -> Vec<ResearchQuery> {
    let tech = profile
        .technologies
        .iter()
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    let mut queries = vec![
        query(
            "technology_analysis",
            format!("Which libraries and versions best fit a {} project using {tech}?", profile.project_type),
            &["technology", "tooling"],
            9,
        ),
        query(
            "security_analysis",
            format!("What security measures does a {} project need?", profile.project_type),
            &["security", "auth"],
            8,
        ),
        query(
            "architecture_patterns",
            format!("Which architecture patterns suit a {} project of {} complexity?", profile.project_type, profile.complexity),
            &["architecture", "patterns"],
            8,
        ),
    ];

    if profile.has_requirement("performance") || profile.complexity == ComplexityTier::High {
        queries.push(query(
            "performance_optimization",
            "Where do projects like this lose performance, and how is it avoided?".to_string(),
            &["performance", "scaling"],
            6,
        ));
    }
    if profile.has_requirement("testing") {
        queries.push(query(
            "testing_strategy",
            "What testing strategy gives real confidence for this project?".to_string(),
            &["testing", "quality"],
            6,
        ));
    }
    if profile.has_requirement("deployment") {
        queries.push(query(
            "deployment_strategy",
            "How should this project be packaged and deployed?".to_string(),
            &["deployment", "ci-cd"],
            5,
        ));
    }
    queries
}

fn query(category: &str, text: String, focus: &[&str], priority: u8) -> ResearchQuery {
    ResearchQuery {
        id: category.to_string(),
        category: category.to_string(),
        text,
        focus_areas: focus.iter().map(|s| (*s).to_string()).collect(),
        priority,
        estimated_minutes: 2,
        status: QueryStatus::Pending,
    }
}

/// Assign 1-3 specialists per query by focus overlap.
fn assign_agents(queries: &[ResearchQuery]) -> Vec<(usize, (&'static str, &'static str, &'static [&'static str]))> {
    let mut assignments = Vec::new();
    for (i, q) in queries.iter().enumerate() {
        let mut matched: Vec<_> = SPECIALISTS
            .iter()
            .filter(|(_, _, focus)| {
                focus
                    .iter()
                    .any(|f| q.focus_areas.iter().any(|qa| qa == f))
            })
            .copied()
            .collect();
        if matched.is_empty() {
            matched.push(SPECIALISTS[0]);
        }
        for specialist in matched.into_iter().take(3) {
            assignments.push((i, specialist));
        }
    }
    assignments
}

/// Parse a specialist response, scoring confidence.
///
/// Confidence starts at 0.5 and gains 0.1 per populated major section
/// (summary, >=4 recommendations, >=4 best practices, patterns, tools),
/// capped at 1.0. Non-JSON fallback parsing multiplies by 0.8.
pub fn parse_finding(text: &str, query_id: &str, specialty: &str) -> ResearchFinding {
    let json = extract_json_from_response(text);
    let (parsed, fallback) = match serde_json::from_str::<LlmFinding>(&json) {
        Ok(parsed) => (parsed, false),
        Err(_) => (fallback_finding(text), true),
    };

    let mut confidence: f64 = 0.5;
    if !parsed.summary.trim().is_empty() {
        confidence += 0.1;
    }
    if parsed.recommendations.len() >= 4 {
        confidence += 0.1;
    }
    if parsed.best_practices.len() >= 4 {
        confidence += 0.1;
    }
    if !parsed.implementation_patterns.is_empty() {
        confidence += 0.1;
    }
    if !parsed.tools_and_versions.is_empty() {
        confidence += 0.1;
    }
    confidence = confidence.min(1.0);
    if fallback {
        confidence *= 0.8;
    }

    ResearchFinding {
        query_id: query_id.to_string(),
        specialty: specialty.to_string(),
        summary: parsed.summary,
        recommendations: parsed.recommendations,
        best_practices: parsed.best_practices,
        implementation_patterns: parsed.implementation_patterns,
        tools_and_versions: parsed.tools_and_versions,
        pitfalls: parsed.pitfalls,
        confidence,
    }
}

/// Extract what we can from a non-JSON response.
fn fallback_finding(text: &str) -> LlmFinding {
    let summary: String = text.chars().take(500).collect();
    let recommendations: Vec<String> = text
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
                .map(String::from)
        })
        .take(8)
        .collect();
    LlmFinding {
        summary,
        recommendations,
        ..LlmFinding::default()
    }
}

/// Deterministic merge of findings, used when the LLM pass is unavailable.
pub fn basic_synthesis(results: &ResearchResults) -> ResearchSynthesis {
    let mut synthesis = ResearchSynthesis::default();

    let mut queries: Vec<&ResearchQuery> = results.queries.iter().collect();
    queries.sort_by_key(|q| std::cmp::Reverse(q.priority));

    let mut summaries = Vec::new();
    for q in &queries {
        for finding in results.findings_for_category(&q.category) {
            if !finding.summary.is_empty() {
                summaries.push(format!("[{}] {}", q.category, finding.summary));
            }
            for rec in &finding.recommendations {
                if !synthesis.prioritized_recommendations.contains(rec) {
                    synthesis.prioritized_recommendations.push(rec.clone());
                }
            }
            for tool in &finding.tools_and_versions {
                if !synthesis.technology_decisions.contains(tool) {
                    synthesis.technology_decisions.push(tool.clone());
                }
            }
            for pitfall in &finding.pitfalls {
                let mitigation = format!("Mitigate: {pitfall}");
                if !synthesis.risk_mitigations.contains(&mitigation) {
                    synthesis.risk_mitigations.push(mitigation);
                }
            }
            if q.category == "security_analysis" {
                for rec in &finding.recommendations {
                    if !synthesis.security_requirements.contains(rec) {
                        synthesis.security_requirements.push(rec.clone());
                    }
                }
            }
        }
        synthesis.phased_roadmap.push(q.category.clone());
    }

    synthesis.executive_summary = summaries.join("\n");
    synthesis
}

/// Write the full research dump to `<dir>/research_results_<ts>.json`.
pub fn write_dump(results: &ResearchResults, dir: &Path) -> BuildResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("research_results_{}.json", Utc::now().timestamp()));
    std::fs::write(&path, serde_json::to_string_pretty(results)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ProjectProfile {
        let mut profile = ProjectProfile {
            project_type: "web_api".to_string(),
            ..ProjectProfile::default()
        };
        profile.requirements.insert("testing".to_string());
        profile.requirements.insert("deployment".to_string());
        profile.requirements.insert("performance".to_string());
        profile
    }

    #[test]
    fn test_query_set_follows_profile() {
        let queries = build_queries(&profile());
        let categories: Vec<&str> = queries.iter().map(|q| q.category.as_str()).collect();
        assert_eq!(
            categories,
            vec![
                "technology_analysis",
                "security_analysis",
                "architecture_patterns",
                "performance_optimization",
                "testing_strategy",
                "deployment_strategy",
            ]
        );

        let minimal = build_queries(&ProjectProfile::default());
        assert_eq!(minimal.len(), 3);
    }

    #[test]
    fn test_agent_assignment_bounds() {
        let queries = build_queries(&profile());
        let assignments = assign_agents(&queries);
        for (i, _) in &assignments {
            assert!(*i < queries.len());
        }
        for i in 0..queries.len() {
            let count = assignments.iter().filter(|(q, _)| *q == i).count();
            assert!((1..=3).contains(&count), "query {i} got {count} agents");
        }
    }

    #[test]
    fn test_confidence_scoring_full() {
        let text = serde_json::json!({
            "summary": "solid summary",
            "recommendations": ["a", "b", "c", "d"],
            "best_practices": ["a", "b", "c", "d"],
            "implementation_patterns": ["p"],
            "tools_and_versions": ["tokio 1.x"],
            "pitfalls": [],
        })
        .to_string();
        let finding = parse_finding(&text, "q", "s");
        assert!((finding.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_scoring_partial() {
        let text = serde_json::json!({
            "summary": "only a summary",
            "recommendations": ["one"],
        })
        .to_string();
        let finding = parse_finding(&text, "q", "s");
        assert!((finding.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_fallback_parsing_discounts_confidence() {
        let text = "Some freeform analysis.\n- use postgres\n- add rate limiting\n";
        let finding = parse_finding(text, "q", "s");
        assert!(finding.summary.starts_with("Some freeform"));
        assert_eq!(finding.recommendations.len(), 2);
        // 0.5 base + 0.1 summary, then x0.8 for fallback parsing.
        assert!((finding.confidence - 0.48).abs() < 1e-9);
    }

    #[test]
    fn test_basic_synthesis_merges_and_orders() {
        let mut results = ResearchResults::default();
        results.queries = build_queries(&ProjectProfile::default());
        results.findings = vec![
            ResearchFinding {
                query_id: "security_analysis".to_string(),
                specialty: "SecuritySpecialist".to_string(),
                summary: "lock it down".to_string(),
                recommendations: vec!["use argon2".to_string()],
                pitfalls: vec!["plaintext secrets".to_string()],
                confidence: 0.9,
                ..ResearchFinding::default()
            },
            ResearchFinding {
                query_id: "technology_analysis".to_string(),
                specialty: "TechnologyAnalyst".to_string(),
                summary: "use the boring stack".to_string(),
                tools_and_versions: vec!["postgres 16".to_string()],
                confidence: 0.8,
                ..ResearchFinding::default()
            },
        ];

        let synthesis = basic_synthesis(&results);
        assert!(synthesis.executive_summary.contains("lock it down"));
        assert_eq!(synthesis.security_requirements, vec!["use argon2"]);
        assert_eq!(synthesis.technology_decisions, vec!["postgres 16"]);
        assert_eq!(synthesis.risk_mitigations, vec!["Mitigate: plaintext secrets"]);
        // Roadmap follows priority order.
        assert_eq!(synthesis.phased_roadmap[0], "technology_analysis");
    }
}
