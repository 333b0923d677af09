//! Static intent → prompt-technique suggestion table.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Complexity, Intent};

/// A prompt-engineering technique identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Technique {
    ChainOfThought,
    FewShot,
    RolePrompting,
    StructuredOutput,
    StepByStep,
    TreeOfThoughts,
    SelfConsistency,
    ConstraintSpecification,
    TaskDecomposition,
    SelfCritique,
    ContextExpansion,
}

impl Technique {
    pub fn as_str(&self) -> &'static str {
        match self {
            Technique::ChainOfThought => "chain_of_thought",
            Technique::FewShot => "few_shot",
            Technique::RolePrompting => "role_prompting",
            Technique::StructuredOutput => "structured_output",
            Technique::StepByStep => "step_by_step",
            Technique::TreeOfThoughts => "tree_of_thoughts",
            Technique::SelfConsistency => "self_consistency",
            Technique::ConstraintSpecification => "constraint_specification",
            Technique::TaskDecomposition => "task_decomposition",
            Technique::SelfCritique => "self_critique",
            Technique::ContextExpansion => "context_expansion",
        }
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base suggestions for an intent, most relevant first.
pub fn techniques_for_intent(intent: Intent) -> &'static [Technique] {
    use Technique::*;

    match intent {
        Intent::CodeGeneration => &[StructuredOutput, FewShot, ConstraintSpecification],
        Intent::Debugging => &[StepByStep, ChainOfThought, ContextExpansion],
        Intent::DataAnalysis => &[ChainOfThought, StructuredOutput, StepByStep],
        Intent::CreativeWriting => &[RolePrompting, FewShot, ConstraintSpecification],
        Intent::TechnicalWriting => &[StructuredOutput, RolePrompting, FewShot],
        Intent::Summarization => &[StructuredOutput, ConstraintSpecification],
        Intent::Translation => &[RolePrompting, ConstraintSpecification, FewShot],
        Intent::QuestionAnswering => &[ContextExpansion, ChainOfThought],
        Intent::Reasoning => &[ChainOfThought, SelfConsistency, TreeOfThoughts],
        Intent::Conversation => &[RolePrompting],
    }
}

/// Extra suggestions driven by complexity, appended after the intent's own.
fn techniques_for_complexity(complexity: Complexity) -> &'static [Technique] {
    match complexity {
        Complexity::Simple => &[],
        Complexity::Moderate => &[Technique::StepByStep],
        Complexity::Complex => &[Technique::TaskDecomposition, Technique::ChainOfThought, Technique::SelfCritique],
    }
}

/// Suggested techniques: intent table first, then complexity extras, with
/// duplicates dropped and first occurrence order kept.
pub fn suggest_techniques(intent: Intent, complexity: Complexity) -> Vec<Technique> {
    let mut suggestions = Vec::new();
    for technique in techniques_for_intent(intent)
        .iter()
        .chain(techniques_for_complexity(complexity))
    {
        if !suggestions.contains(technique) {
            suggestions.push(*technique);
        }
    }
    suggestions
}
