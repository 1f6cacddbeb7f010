//! Specification and derived project profile.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::errors::BuildResult;

/// The natural-language specification a build is constructed from.
///
/// Immutable for the lifetime of a build; the content hash keys resumption.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Specification {
    pub text: String,
    pub content_hash: String,
}

impl Specification {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let content_hash = hex::encode(hasher.finalize());
        Self { text, content_hash }
    }

    /// Load a specification from disk.
    ///
    /// Reads UTF-8, falling back to Latin-1 for legacy documents.
    pub fn load(path: impl AsRef<Path>) -> BuildResult<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let text = match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
        };
        Ok(Self::new(text))
    }

    /// A bounded summary used in prompts after the first phase.
    pub fn summary(&self, max_chars: usize) -> String {
        if self.text.chars().count() <= max_chars {
            return self.text.clone();
        }
        let truncated: String = self.text.chars().take(max_chars).collect();
        format!("{truncated}\n[... specification truncated ...]")
    }
}

/// Complexity tier derived from the specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityTier {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for ComplexityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Profile derived from the specification text.
///
/// Fully recomputable; never persisted as authoritative state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectProfile {
    /// Project-type tag, e.g. "cli", "web_api", "library".
    pub project_type: String,
    pub complexity: ComplexityTier,
    /// Technology tags detected in the specification.
    pub technologies: BTreeSet<String>,
    /// Requirement tags (auth, database, realtime, ...).
    pub requirements: BTreeSet<String>,
}

impl ProjectProfile {
    pub fn has_technology(&self, tag: &str) -> bool {
        self.technologies.contains(tag)
    }

    pub fn has_requirement(&self, tag: &str) -> bool {
        self.requirements.contains(tag)
    }
}
