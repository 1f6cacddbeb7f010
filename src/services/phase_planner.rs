//! Phase planner: turns a specification (plus optional research) into a
//! validated, topologically-sorted build plan.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::errors::BuildResult;
use crate::domain::models::{
    sort_phases, BuildConfig, BuildPlan, CostCategory, Phase, ProjectProfile, ResearchResults,
    Specification,
};
use crate::domain::ports::{LlmClient, LlmRequest};
use crate::services::cost_ledger::CostLedger;
use crate::services::extract_json_from_response;

/// Research category → phase-name keywords used to attach findings.
const RESEARCH_PHASE_KEYWORDS: &[(&str, &[&str])] = &[
    ("technology_analysis", &["foundation", "setup", "data"]),
    ("security_analysis", &["security", "auth", "foundation"]),
    ("architecture_patterns", &["foundation", "business", "api"]),
    ("performance_optimization", &["optimization", "performance", "scaling"]),
    ("testing_strategy", &["test", "quality"]),
    ("deployment_strategy", &["deploy", "production"]),
];

/// Plan shape expected from the LLM.
#[derive(Debug, Deserialize)]
struct LlmPlan {
    phases: Vec<LlmPhase>,
}

#[derive(Debug, Deserialize)]
struct LlmPhase {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tasks: Vec<String>,
    #[serde(default)]
    dependencies: Vec<String>,
}

/// Produces validated build plans.
pub struct PhasePlanner {
    llm: Option<Arc<dyn LlmClient>>,
    config: BuildConfig,
    ledger: Arc<RwLock<CostLedger>>,
}

impl PhasePlanner {
    pub fn new(
        llm: Option<Arc<dyn LlmClient>>,
        config: BuildConfig,
        ledger: Arc<RwLock<CostLedger>>,
    ) -> Self {
        Self { llm, config, ledger }
    }

    /// Produce a plan, preferring the LLM and falling back to the
    /// deterministic default template on any failure.
    pub async fn plan(
        &self,
        spec: &Specification,
        profile: &ProjectProfile,
        research: Option<&ResearchResults>,
    ) -> BuildResult<BuildPlan> {
        let phases = if self.llm.is_none() {
            default_phases(profile, self.config.min_tasks_per_phase)
        } else {
            match self.llm_phases(spec, profile).await {
                Ok(phases) if !phases.is_empty() => phases,
                Ok(_) => {
                    warn!("LLM produced an empty plan; using the default template");
                    default_phases(profile, self.config.min_tasks_per_phase)
                }
                Err(e) => {
                    warn!(error = %e, "LLM planning failed; using the default template");
                    default_phases(profile, self.config.min_tasks_per_phase)
                }
            }
        };

        let mut plan = self.validate(phases, profile);
        if let Some(research) = research {
            integrate_research(&mut plan, research);
        }
        info!(phases = plan.len(), "plan ready");
        Ok(plan)
    }

    /// Deterministic plan without any LLM involvement.
    pub fn plan_default(
        &self,
        profile: &ProjectProfile,
        research: Option<&ResearchResults>,
    ) -> BuildPlan {
        let phases = default_phases(profile, self.config.min_tasks_per_phase);
        let mut plan = self.validate(phases, profile);
        if let Some(research) = research {
            integrate_research(&mut plan, research);
        }
        plan
    }

    async fn llm_phases(
        &self,
        spec: &Specification,
        profile: &ProjectProfile,
    ) -> BuildResult<Vec<Phase>> {
        let Some(llm) = &self.llm else {
            return Ok(Vec::new());
        };

        let prompt = planning_prompt(spec, profile, self.config.min_phases);
        let response = llm
            .complete(LlmRequest {
                model: self.config.model_analyzer.clone(),
                system: Some(
                    "You are a build planner for an autonomous code-generation agent."
                        .to_string(),
                ),
                prompt,
                max_tokens: 4096,
                temperature: 0.3,
            })
            .await?;

        self.ledger.write().await.add_token_usage(
            response.input_tokens,
            response.output_tokens,
            &self.config.model_analyzer,
            None,
            CostCategory::Analysis,
        );

        let json = extract_json_from_response(&response.text);
        let parsed: LlmPlan = serde_json::from_str(&json)?;
        Ok(parsed
            .phases
            .into_iter()
            .map(|p| {
                Phase::new(p.id, p.name, p.description)
                    .with_tasks(p.tasks)
                    .with_dependencies(p.dependencies)
            })
            .collect())
    }

    /// Enforce the load-time validation rules.
    ///
    /// Repairs empty fields, suffixes duplicate ids, drops dependencies on
    /// absent ids, pads up to `min_phases` with template phases, and sorts
    /// topologically with cyclic phases appended (cross-edges cleared).
    pub fn validate(&self, mut phases: Vec<Phase>, profile: &ProjectProfile) -> BuildPlan {
        // Repair empty fields.
        for (i, phase) in phases.iter_mut().enumerate() {
            if phase.id.trim().is_empty() {
                phase.id = format!("phase_{}", i + 1);
            }
            if phase.name.trim().is_empty() {
                phase.name = phase.id.clone();
            }
            if phase.description.trim().is_empty() {
                phase.description = format!("Implement the {} phase", phase.name);
            }
            if phase.tasks.is_empty() {
                phase.tasks.push(format!("Implement {}", phase.name));
            }
        }

        // Suffix duplicate ids.
        let mut seen: HashSet<String> = HashSet::new();
        for phase in &mut phases {
            if !seen.insert(phase.id.clone()) {
                let mut n = 2;
                while !seen.insert(format!("{}_{n}", phase.id)) {
                    n += 1;
                }
                phase.id = format!("{}_{n}", phase.id);
            }
        }

        // Pad with default phases.
        if phases.len() < self.config.min_phases {
            let existing: HashSet<String> = phases.iter().map(|p| p.id.clone()).collect();
            for default in default_phases(profile, self.config.min_tasks_per_phase) {
                if phases.len() >= self.config.min_phases {
                    break;
                }
                if !existing.contains(&default.id) {
                    phases.push(default);
                }
            }
        }

        // Drop dependencies on absent ids.
        let ids: HashSet<String> = phases.iter().map(|p| p.id.clone()).collect();
        for phase in &mut phases {
            phase.dependencies.retain(|d| ids.contains(d));
        }

        let (sorted, cyclic) = sort_phases(phases);
        if !cyclic.is_empty() {
            warn!(cyclic = ?cyclic, "circular dependencies cleared");
        }
        BuildPlan { phases: sorted }
    }
}

/// The deterministic 10-phase default template.
pub fn default_phases(profile: &ProjectProfile, min_tasks: usize) -> Vec<Phase> {
    let tech = if profile.technologies.is_empty() {
        "the chosen stack".to_string()
    } else {
        profile
            .technologies
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };

    let template: [(&str, &str, Vec<String>); 10] = [
        (
            "phase_1",
            "Foundation",
            vec![
                format!("Initialize the project structure for {tech}"),
                "Set up build tooling and dependency management".to_string(),
            ],
        ),
        (
            "phase_2",
            "Data Layer",
            vec![
                "Define core data models".to_string(),
                "Implement persistence and migrations".to_string(),
            ],
        ),
        (
            "phase_3",
            "Business Logic",
            vec![
                "Implement the core domain operations".to_string(),
                "Cover edge cases identified in the specification".to_string(),
            ],
        ),
        (
            "phase_4",
            "API Layer",
            vec![
                "Expose the public interface".to_string(),
                "Wire request validation and error responses".to_string(),
            ],
        ),
        (
            "phase_5",
            "Security",
            vec![
                "Implement authentication and authorization".to_string(),
                "Harden input handling".to_string(),
            ],
        ),
        (
            "phase_6",
            "User Interface",
            vec![
                "Build the user-facing surface".to_string(),
                "Connect it to the API layer".to_string(),
            ],
        ),
        (
            "phase_7",
            "Documentation",
            vec![
                "Write usage documentation".to_string(),
                "Document configuration and operational concerns".to_string(),
            ],
        ),
        (
            "phase_8",
            "Performance",
            vec![
                "Profile the critical paths".to_string(),
                "Apply targeted optimizations".to_string(),
            ],
        ),
        (
            "phase_9",
            "Deployment",
            vec![
                "Create deployment configuration".to_string(),
                "Verify a clean install from scratch".to_string(),
            ],
        ),
        (
            "phase_10",
            "Production Readiness",
            vec![
                "Run the full test suite".to_string(),
                "Review logs, errors, and loose ends".to_string(),
            ],
        ),
    ];

    let mut previous: Option<String> = None;
    template
        .into_iter()
        .map(|(id, name, mut tasks)| {
            while tasks.len() < min_tasks {
                tasks.push(format!("Review and refine the {name} phase output"));
            }
            let mut phase = Phase::new(id, name, format!("{name} work for the project"))
                .with_tasks(tasks);
            if let Some(prev) = &previous {
                phase.dependencies.push(prev.clone());
            }
            previous = Some(id.to_string());
            phase
        })
        .collect()
}

/// Attach research findings to matching phases.
pub fn integrate_research(plan: &mut BuildPlan, research: &ResearchResults) {
    let mut missing_security = false;
    let mut missing_optimization = false;

    for (category, keywords) in RESEARCH_PHASE_KEYWORDS {
        let findings = research.findings_for_category(category);
        if findings.is_empty() {
            continue;
        }
        let top = findings[0];

        let mut matched = false;
        for phase in &mut plan.phases {
            let name = phase.name.to_lowercase();
            if !keywords.iter().any(|k| name.contains(k)) {
                continue;
            }
            matched = true;
            for rec in top.recommendations.iter().take(3) {
                let task = format!("Apply research recommendation: {rec}");
                if !phase.tasks.contains(&task) {
                    phase.tasks.push(task);
                }
            }
            for practice in top.best_practices.iter().take(2) {
                let task = format!("Follow best practice: {practice}");
                if !phase.tasks.contains(&task) {
                    phase.tasks.push(task);
                }
            }
            if !top.implementation_patterns.is_empty() {
                phase.context.insert(
                    "implementation_patterns".to_string(),
                    serde_json::json!(top.implementation_patterns),
                );
            }
        }

        if !matched {
            match *category {
                "security_analysis" => missing_security = true,
                "performance_optimization" => missing_optimization = true,
                _ => {}
            }
        }
    }

    let last_id = plan.phases.last().map(|p| p.id.clone());
    if missing_security {
        let mut phase = Phase::new(
            "phase_security",
            "Security Hardening",
            "Security work demanded by research findings",
        )
        .with_tasks(vec!["Apply the security recommendations from research".to_string()]);
        if let Some(dep) = &last_id {
            phase.dependencies.push(dep.clone());
        }
        plan.phases.push(phase);
    }
    if missing_optimization {
        let dep = plan.phases.last().map(|p| p.id.clone());
        let mut phase = Phase::new(
            "phase_optimization",
            "Performance Optimization",
            "Optimization work demanded by research findings",
        )
        .with_tasks(vec!["Apply the performance recommendations from research".to_string()]);
        if let Some(dep) = dep {
            phase.dependencies.push(dep);
        }
        plan.phases.push(phase);
    }
}

fn planning_prompt(spec: &Specification, profile: &ProjectProfile, min_phases: usize) -> String {
    format!(
        r#"Decompose the following specification into build phases for an
autonomous coding agent.

## Project Profile
- Type: {}
- Complexity: {}
- Technologies: {}

## Specification
{}

## Required Output Format (JSON)
Respond with a JSON object:
```json
{{
  "phases": [
    {{
      "id": "phase_1",
      "name": "Short phase name",
      "description": "What this phase accomplishes",
      "tasks": ["concrete task 1", "concrete task 2"],
      "dependencies": ["ids of earlier phases"]
    }}
  ]
}}
```

Rules: at least {min_phases} phases; dependencies must form a DAG; every
phase needs concrete, verifiable tasks. Output ONLY the JSON object."#,
        profile.project_type,
        profile.complexity,
        profile
            .technologies
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", "),
        spec.summary(6_000),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ResearchFinding, ResearchQuery};

    fn planner(min_phases: usize) -> PhasePlanner {
        let config = BuildConfig {
            min_phases,
            ..BuildConfig::default()
        };
        PhasePlanner::new(None, config, Arc::new(RwLock::new(CostLedger::new())))
    }

    fn research_with(category: &str, recommendations: Vec<&str>) -> ResearchResults {
        ResearchResults {
            queries: vec![ResearchQuery {
                id: "q1".to_string(),
                category: category.to_string(),
                text: String::new(),
                focus_areas: vec![],
                priority: 5,
                estimated_minutes: 2,
                status: crate::domain::models::QueryStatus::Completed,
            }],
            findings: vec![ResearchFinding {
                query_id: "q1".to_string(),
                specialty: "specialist".to_string(),
                summary: "summary".to_string(),
                recommendations: recommendations.iter().map(|s| (*s).to_string()).collect(),
                best_practices: vec!["bp1".to_string(), "bp2".to_string(), "bp3".to_string()],
                implementation_patterns: vec!["pattern".to_string()],
                tools_and_versions: vec![],
                pitfalls: vec![],
                confidence: 0.9,
            }],
            ..ResearchResults::default()
        }
    }

    #[test]
    fn test_default_template_is_a_chain() {
        let phases = default_phases(&ProjectProfile::default(), 2);
        assert_eq!(phases.len(), 10);
        assert_eq!(phases[0].id, "phase_1");
        assert!(phases[0].dependencies.is_empty());
        for pair in phases.windows(2) {
            assert_eq!(pair[1].dependencies, vec![pair[0].id.clone()]);
        }
    }

    #[test]
    fn test_validate_suffixes_duplicates() {
        let phases = vec![
            Phase::new("phase_1", "One", "d").with_tasks(vec!["t".to_string()]),
            Phase::new("phase_1", "Two", "d").with_tasks(vec!["t".to_string()]),
        ];
        let plan = planner(2).validate(phases, &ProjectProfile::default());
        let ids: Vec<&str> = plan.phases.iter().map(|p| p.id.as_str()).collect();
        assert!(ids.contains(&"phase_1"));
        assert!(ids.contains(&"phase_1_2"));
    }

    #[test]
    fn test_validate_drops_absent_dependencies() {
        let phases = vec![
            Phase::new("a", "A", "d")
                .with_tasks(vec!["t".to_string()])
                .with_dependencies(vec!["nope".to_string()]),
            Phase::new("b", "B", "d")
                .with_tasks(vec!["t".to_string()])
                .with_dependencies(vec!["a".to_string()]),
        ];
        let plan = planner(2).validate(phases, &ProjectProfile::default());
        assert!(plan.phase("a").unwrap().dependencies.is_empty());
        assert_eq!(plan.phase("b").unwrap().dependencies, vec!["a"]);
    }

    #[test]
    fn test_validate_pads_to_min_phases() {
        let phases = vec![Phase::new("only", "Only", "d").with_tasks(vec!["t".to_string()])];
        let plan = planner(5).validate(phases, &ProjectProfile::default());
        assert_eq!(plan.len(), 5);
    }

    #[test]
    fn test_validate_repairs_empty_fields() {
        let phases = vec![
            Phase::new("", "", ""),
            Phase::new("x", "Named", "").with_tasks(vec!["t".to_string()]),
        ];
        let plan = planner(2).validate(phases, &ProjectProfile::default());
        let repaired = plan.phase("phase_1").unwrap();
        assert_eq!(repaired.name, "phase_1");
        assert!(!repaired.description.is_empty());
        assert!(!repaired.tasks.is_empty());
    }

    #[test]
    fn test_validate_clears_cycles() {
        let phases = vec![
            Phase::new("a", "A", "d")
                .with_tasks(vec!["t".to_string()])
                .with_dependencies(vec!["b".to_string()]),
            Phase::new("b", "B", "d")
                .with_tasks(vec!["t".to_string()])
                .with_dependencies(vec!["a".to_string()]),
        ];
        let plan = planner(2).validate(phases, &ProjectProfile::default());
        assert_eq!(plan.len(), 2);
        assert!(plan.phases.iter().all(|p| p.dependencies.is_empty()));
    }

    #[test]
    fn test_research_tasks_appended() {
        let mut plan = BuildPlan::from_phases(vec![Phase::new(
            "phase_1",
            "Security",
            "d",
        )
        .with_tasks(vec!["base".to_string()])]);
        let research = research_with("security_analysis", vec!["r1", "r2", "r3", "r4"]);
        integrate_research(&mut plan, &research);

        let phase = plan.phase("phase_1").unwrap();
        // top-3 recommendations + top-2 best practices
        assert_eq!(phase.tasks.len(), 1 + 3 + 2);
        assert!(phase.context.contains_key("implementation_patterns"));
    }

    #[test]
    fn test_research_appends_missing_security_phase() {
        let mut plan = BuildPlan::from_phases(vec![Phase::new("phase_1", "Foundation core", "d")
            .with_tasks(vec!["base".to_string()])]);
        // "Foundation core" matches security keywords ("foundation"), so use
        // a name that does not match to force the appended phase.
        plan.phases[0].name = "Core work".to_string();
        let research = research_with("security_analysis", vec!["r1"]);
        integrate_research(&mut plan, &research);

        assert!(plan.phase("phase_security").is_some());
        let appended = plan.phase("phase_security").unwrap();
        assert_eq!(appended.dependencies, vec!["phase_1"]);
    }

    #[tokio::test]
    async fn test_plan_without_llm_uses_template() {
        let planner = planner(3);
        let spec = Specification::new("Create a TODO CLI in Go");
        let profile = ProjectProfile::default();
        let plan = planner.plan(&spec, &profile, None).await.unwrap();
        assert_eq!(plan.len(), 10);
        assert_eq!(plan.first_phase_id(), Some("phase_1"));
    }
}
