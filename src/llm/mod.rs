use anyhow::{Context, Result};
use std::future::Future;
use std::pin::Pin;
use tera::{Context as TeraContext, Tera};
use tracing::{debug, warn};

mod claude;
mod openai;

pub use claude::Claude;
pub use openai::OpenAI;

use crate::candidate::{CandidateResult, SourceStage, is_plausible_expression, normalize_key};
use crate::providers::get_env;
use crate::scoring;

/// Most candidates ever shown to the model; beyond the top few the extra
/// options only dilute the prompt.
const MAX_PROMPT_CANDIDATES: usize = 3;

pub type AdjudicateFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// A language model asked to pick or repair a reading. Implementations
/// receive the fully rendered prompt and reply in plain text.
pub trait DisambiguationModel: Send + Sync {
    fn id(&self) -> &str;
    fn adjudicate<'a>(&'a self, prompt: &'a str) -> AdjudicateFuture<'a>;
}

/// Optional LLM adjudication step. Without a configured model this is a
/// no-op that performs no network traffic at all.
pub struct Disambiguator {
    model: Option<Box<dyn DisambiguationModel>>,
}

impl Disambiguator {
    pub fn disabled() -> Self {
        Self { model: None }
    }

    pub fn with_model(model: Box<dyn DisambiguationModel>) -> Self {
        Self { model: Some(model) }
    }

    /// Picks a model from the environment: `OPENAI_API_KEY` first, then
    /// `ANTHROPIC_API_KEY`. No key means the step stays disabled.
    pub fn from_env(requested_model: Option<&str>) -> Self {
        if let Some(key) = get_env("OPENAI_API_KEY") {
            let mut model = OpenAI::new(key);
            if let Some(name) = requested_model {
                model = model.with_model(name);
            }
            return Self::with_model(Box::new(model));
        }
        if let Some(key) = get_env("ANTHROPIC_API_KEY") {
            let mut model = Claude::new(key);
            if let Some(name) = requested_model {
                model = model.with_model(name);
            }
            return Self::with_model(Box::new(model));
        }
        Self::disabled()
    }

    pub fn is_enabled(&self) -> bool {
        self.model.is_some()
    }

    /// Asks the model to adjudicate between the strongest candidates.
    ///
    /// Returns at most one extra candidate. Every failure mode (render,
    /// network, blank or implausible reply) degrades to an empty list;
    /// this stage can only ever add evidence, never break the pipeline.
    pub async fn adjudicate(
        &self,
        raw_text: &str,
        candidates: &[CandidateResult],
        hint: Option<&str>,
    ) -> Vec<CandidateResult> {
        let Some(model) = &self.model else {
            return Vec::new();
        };

        let shown: Vec<&CandidateResult> =
            candidates.iter().take(MAX_PROMPT_CANDIDATES).collect();
        let prompt = match render_prompt(raw_text, &shown, hint) {
            Ok(prompt) => prompt,
            Err(error) => {
                warn!(%error, "failed to render disambiguation prompt");
                return Vec::new();
            }
        };

        let reply = match model.adjudicate(&prompt).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(model = model.id(), %error, "disambiguation call failed");
                return Vec::new();
            }
        };

        let Some(answer) = parse_reply(&reply) else {
            warn!(model = model.id(), "disambiguation reply was unusable");
            return Vec::new();
        };
        if !is_plausible_expression(&answer) {
            warn!(model = model.id(), answer = %answer, "disambiguation reply rejected");
            return Vec::new();
        }

        let answer_key = normalize_key(&answer);
        let matched = shown
            .iter()
            .find(|candidate| normalize_key(&candidate.text) == answer_key);

        let candidate = match matched {
            Some(existing) => {
                debug!(model = model.id(), text = %existing.text, "model confirmed a candidate");
                CandidateResult::new(
                    SourceStage::Disambiguation,
                    existing.text.clone(),
                    scoring::disambiguation_match_confidence(existing.confidence),
                    format!("model {} confirmed an existing reading", model.id()),
                )
            }
            None => {
                debug!(model = model.id(), text = %answer, "model proposed a new reading");
                CandidateResult::new(
                    SourceStage::Disambiguation,
                    answer,
                    scoring::UNVERIFIED_REWRITE_CONFIDENCE,
                    format!("model {} proposed an unverified reading", model.id()),
                )
            }
        };
        vec![candidate]
    }
}

fn render_prompt(
    raw_text: &str,
    candidates: &[&CandidateResult],
    hint: Option<&str>,
) -> Result<String> {
    let template = include_str!("prompts/disambiguate.tera");
    let mut context = TeraContext::new();
    context.insert("raw_text", raw_text);
    let texts: Vec<&str> = candidates
        .iter()
        .map(|candidate| candidate.text.as_str())
        .collect();
    context.insert("candidates", &texts);
    context.insert("hint", &hint);
    Tera::one_off(template, &context, false)
        .with_context(|| "failed to render disambiguation prompt")
}

/// First meaningful line of the model's reply, stripped of code fences
/// and surrounding backticks or quotes.
fn parse_reply(reply: &str) -> Option<String> {
    let line = reply
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("```"))?;
    let cleaned = line.trim_matches(|ch| ch == '`' || ch == '"').trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct FixedModel {
        reply: Result<&'static str, &'static str>,
    }

    impl DisambiguationModel for FixedModel {
        fn id(&self) -> &str {
            "fixed"
        }

        fn adjudicate<'a>(&'a self, _prompt: &'a str) -> AdjudicateFuture<'a> {
            Box::pin(async move {
                match self.reply {
                    Ok(reply) => Ok(reply.to_string()),
                    Err(message) => Err(anyhow!(message)),
                }
            })
        }
    }

    fn candidates() -> Vec<CandidateResult> {
        vec![
            CandidateResult::new(
                SourceStage::Template("polynomial-integral".into()),
                "∫ (5x^4 - 6x^2 + 3) dx",
                92.0,
                "",
            ),
            CandidateResult::new(SourceStage::Provider("ocr-space".into()), "5x4 6x2 3", 70.0, ""),
        ]
    }

    #[test]
    fn parse_reply_strips_fences_and_backticks() {
        assert_eq!(parse_reply("`x^2`").as_deref(), Some("x^2"));
        assert_eq!(
            parse_reply("```\n∫ sec^2(2x) dx\n```").as_deref(),
            Some("∫ sec^2(2x) dx")
        );
        assert_eq!(parse_reply("\n\n  answer  \nextra").as_deref(), Some("answer"));
        assert!(parse_reply("").is_none());
        assert!(parse_reply("``").is_none());
    }

    #[test]
    fn prompt_contains_all_inputs() {
        let candidates = candidates();
        let shown: Vec<&CandidateResult> = candidates.iter().collect();
        let prompt = render_prompt("5x4 6x2 3", &shown, Some("x^4")).unwrap();
        assert!(prompt.contains("5x4 6x2 3"));
        assert!(prompt.contains("∫ (5x^4 - 6x^2 + 3) dx"));
        assert!(prompt.contains("x^4"));
    }

    #[tokio::test]
    async fn disabled_disambiguator_returns_nothing() {
        let result = Disambiguator::disabled()
            .adjudicate("5x4", &candidates(), None)
            .await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn model_failure_degrades_to_empty() {
        let disambiguator =
            Disambiguator::with_model(Box::new(FixedModel { reply: Err("down") }));
        let result = disambiguator.adjudicate("5x4", &candidates(), None).await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn confirming_a_candidate_boosts_it() {
        let disambiguator = Disambiguator::with_model(Box::new(FixedModel {
            reply: Ok("∫(5x^4 - 6x^2 + 3)DX"),
        }));
        let result = disambiguator.adjudicate("5x4", &candidates(), None).await;
        assert_eq!(result.len(), 1);
        // Matched up to whitespace/case, so the candidate's spelling wins.
        assert_eq!(result[0].text, "∫ (5x^4 - 6x^2 + 3) dx");
        assert_eq!(
            result[0].confidence,
            scoring::DISAMBIGUATION_CEILING,
            "92 + boost must cap at the ceiling"
        );
    }

    #[tokio::test]
    async fn novel_reading_gets_fixed_confidence() {
        let disambiguator = Disambiguator::with_model(Box::new(FixedModel {
            reply: Ok("∫ sec^2(2x) dx"),
        }));
        let result = disambiguator.adjudicate("sec", &candidates(), None).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].confidence, scoring::UNVERIFIED_REWRITE_CONFIDENCE);
    }

    #[tokio::test]
    async fn implausible_reply_is_rejected() {
        let disambiguator = Disambiguator::with_model(Box::new(FixedModel {
            reply: Ok("..,,--"),
        }));
        let result = disambiguator.adjudicate("5x4", &candidates(), None).await;
        assert!(result.is_empty());
    }
}
