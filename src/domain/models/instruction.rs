//! Operator instructions injected into agent prompts.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where an instruction applies. Narrower scopes rank higher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionScope {
    Global,
    Project,
    Phase,
    Tool,
}

impl InstructionScope {
    /// Specificity rank: global < project < phase < tool.
    pub fn rank(self) -> u8 {
        match self {
            Self::Global => 0,
            Self::Project => 1,
            Self::Phase => 2,
            Self::Tool => 3,
        }
    }
}

/// A single operator instruction with a context filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    pub id: String,
    pub name: String,
    pub body: String,
    pub scope: InstructionScope,
    /// Predicate over the selection context; empty matches everything.
    ///
    /// Matching rules per expected value:
    /// - array: context value must be a member
    /// - object: nested equality on every listed key
    /// - string starting with `regex:`: pattern match on the context string
    /// - anything else: equality
    #[serde(default)]
    pub filter: BTreeMap<String, Value>,
    pub priority: i32,
    /// Tools this instruction forces into the allowed list.
    #[serde(default)]
    pub required_tools: Vec<String>,
    /// Tools this instruction removes from the allowed list.
    #[serde(default)]
    pub restricted_tools: Vec<String>,
}

impl Instruction {
    pub fn applies_to(&self, context: &BTreeMap<String, Value>) -> bool {
        self.filter.iter().all(|(key, expected)| {
            let Some(actual) = context.get(key) else {
                return false;
            };
            match expected {
                Value::Array(options) => options.contains(actual),
                Value::Object(fields) => {
                    let Value::Object(actual_fields) = actual else {
                        return false;
                    };
                    fields
                        .iter()
                        .all(|(k, v)| actual_fields.get(k) == Some(v))
                }
                Value::String(s) if s.starts_with("regex:") => {
                    let pattern = &s["regex:".len()..];
                    match (Regex::new(pattern), actual.as_str()) {
                        (Ok(re), Some(text)) => re.is_match(text),
                        _ => false,
                    }
                }
                other => actual == other,
            }
        })
    }
}
