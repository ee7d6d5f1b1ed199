use serde::Serialize;

use crate::scoring::clamp_confidence;

/// Pipeline stage that produced a candidate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum SourceStage {
    /// Raw text straight from a recognition provider.
    Provider(String),
    /// Output of the correction engine over a provider's text.
    Correction(String),
    /// A template-catalogue match.
    Template(String),
    /// The LLM disambiguator's answer.
    Disambiguation,
}

impl SourceStage {
    pub fn label(&self) -> String {
        match self {
            SourceStage::Provider(id) => format!("provider:{}", id),
            SourceStage::Correction(id) => format!("correction:{}", id),
            SourceStage::Template(name) => format!("template:{}", name),
            SourceStage::Disambiguation => "disambiguation".to_string(),
        }
    }
}

/// One stage's proposed expression with its confidence (0-100).
#[derive(Debug, Clone, Serialize)]
pub struct CandidateResult {
    pub source_stage: SourceStage,
    pub text: String,
    pub confidence: f32,
    pub explanation: String,
}

impl CandidateResult {
    pub fn new(
        source_stage: SourceStage,
        text: impl Into<String>,
        confidence: f32,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            source_stage,
            text: text.into(),
            confidence: clamp_confidence(confidence),
            explanation: explanation.into(),
        }
    }
}

/// Grouping key for consensus: whitespace-insensitive, case-insensitive.
pub fn normalize_key(text: &str) -> String {
    text.chars()
        .filter(|ch| !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether a candidate text plausibly contains an expression at all.
/// Filters pure punctuation/noise so the aggregator can report
/// `NoCandidates` instead of echoing garbage.
pub fn is_plausible_expression(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.chars().count() > 200 {
        return false;
    }
    trimmed
        .chars()
        .any(|ch| ch.is_alphanumeric() || "∫√π±".contains(ch))
}
