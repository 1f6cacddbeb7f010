//! Derives a project profile from the specification text.
//!
//! Pure keyword analysis; the profile is recomputable at any time and is
//! never treated as authoritative state.

use crate::domain::models::{ComplexityTier, ProjectProfile, Specification};

const TECHNOLOGY_KEYWORDS: &[(&str, &[&str])] = &[
    ("python", &["python", "pip", "django", "flask", "fastapi"]),
    ("rust", &["rust", "cargo", "tokio"]),
    ("go", &["golang", " go ", "go.mod", "goroutine"]),
    ("javascript", &["javascript", "node.js", "nodejs", "npm"]),
    ("typescript", &["typescript"]),
    ("react", &["react", "next.js", "nextjs"]),
    ("vue", &["vue"]),
    ("java", &["java ", "spring boot", "maven"]),
    ("docker", &["docker", "container"]),
    ("kubernetes", &["kubernetes", "k8s", "helm"]),
    ("postgres", &["postgres", "postgresql"]),
    ("mysql", &["mysql"]),
    ("sqlite", &["sqlite"]),
    ("mongodb", &["mongodb", "mongo"]),
    ("redis", &["redis"]),
    ("graphql", &["graphql"]),
    ("grpc", &["grpc", "protobuf"]),
];

const REQUIREMENT_KEYWORDS: &[(&str, &[&str])] = &[
    ("auth", &["auth", "login", "jwt", "oauth", "session management"]),
    ("database", &["database", "persist", "storage", "schema"]),
    ("realtime", &["websocket", "real-time", "realtime", "streaming"]),
    ("testing", &["test", "coverage", "tdd"]),
    ("deployment", &["deploy", "ci/cd", "pipeline", "production"]),
    ("security", &["security", "encrypt", "vulnerability", "secure"]),
    ("performance", &["performance", "latency", "scale", "optimization"]),
    ("api", &["api", "rest", "endpoint"]),
    ("ui", &["frontend", "ui", "dashboard", "interface"]),
    ("documentation", &["documentation", "readme", "docs"]),
];

/// Analyze a specification into a project profile.
pub fn analyze(spec: &Specification) -> ProjectProfile {
    let lower = spec.text.to_lowercase();

    let mut profile = ProjectProfile::default();
    for (tag, keywords) in TECHNOLOGY_KEYWORDS {
        if keywords.iter().any(|k| lower.contains(k)) {
            profile.technologies.insert((*tag).to_string());
        }
    }
    for (tag, keywords) in REQUIREMENT_KEYWORDS {
        if keywords.iter().any(|k| lower.contains(k)) {
            profile.requirements.insert((*tag).to_string());
        }
    }

    profile.project_type = detect_project_type(&lower);
    profile.complexity = score_complexity(&lower, &profile);
    profile
}

fn detect_project_type(lower: &str) -> String {
    if lower.contains("cli") || lower.contains("command-line") || lower.contains("command line") {
        "cli".to_string()
    } else if lower.contains("library") || lower.contains("crate") || lower.contains("sdk") {
        "library".to_string()
    } else if (lower.contains("api") || lower.contains("rest") || lower.contains("endpoint"))
        && !lower.contains("frontend")
    {
        "web_api".to_string()
    } else if lower.contains("frontend")
        || lower.contains("web app")
        || lower.contains("react")
        || lower.contains("dashboard")
    {
        "web_app".to_string()
    } else {
        "application".to_string()
    }
}

fn score_complexity(lower: &str, profile: &ProjectProfile) -> ComplexityTier {
    let tag_count = profile.technologies.len() + profile.requirements.len();
    let length = lower.len();

    if tag_count >= 9 || length > 10_000 {
        ComplexityTier::High
    } else if tag_count <= 3 && length < 2_000 {
        ComplexityTier::Low
    } else {
        ComplexityTier::Medium
    }
}
