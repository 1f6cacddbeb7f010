//! Instruction selection for prompt composition.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::domain::models::Instruction;

/// Holds the instruction set for a build and selects the subset that
/// applies to a given context.
#[derive(Debug, Default)]
pub struct InstructionSet {
    instructions: Vec<Instruction>,
}

impl InstructionSet {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn add(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn all(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Applicable instructions ordered by descending (priority, scope
    /// specificity). Ties keep insertion order.
    pub fn select(&self, context: &BTreeMap<String, Value>) -> Vec<&Instruction> {
        let mut selected: Vec<&Instruction> = self
            .instructions
            .iter()
            .filter(|i| i.applies_to(context))
            .collect();
        selected.sort_by(|a, b| {
            (b.priority, b.scope.rank()).cmp(&(a.priority, a.scope.rank()))
        });
        selected
    }

    /// The concatenated bodies of applicable instructions.
    pub fn render(&self, context: &BTreeMap<String, Value>) -> String {
        self.select(context)
            .iter()
            .map(|i| i.body.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
