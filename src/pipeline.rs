use std::time::Duration;

use tracing::{debug, info};

use crate::candidate::{CandidateResult, SourceStage, is_plausible_expression};
use crate::consensus::{self, ConsensusResult};
use crate::correction::{CorrectionRule, apply_rules, builtin_rules};
use crate::dispatch;
use crate::errors::{RecognizeError, RecognizeResult};
use crate::image_prep::{self, ImageClass};
use crate::llm::Disambiguator;
use crate::providers::{RawProviderResult, RecognitionProvider, available_from_env};
use crate::request::RecognitionRequest;
use crate::settings::Settings;
use crate::templates::{ExpressionTemplate, builtin_templates, match_templates};

/// Everything one recognition run produced, for callers that want more
/// than the winning text.
#[derive(Debug)]
pub struct RecognitionOutcome {
    pub consensus: ConsensusResult,
    pub image_class: ImageClass,
    pub provider_results: Vec<RawProviderResult>,
}

/// The whole recognition pipeline. Catalogues (correction rules,
/// templates) are built once here and reused across requests.
pub struct Recognizer {
    providers: Vec<Box<dyn RecognitionProvider>>,
    rules: Vec<CorrectionRule>,
    templates: Vec<ExpressionTemplate>,
    disambiguator: Disambiguator,
    settings: Settings,
}

impl Recognizer {
    pub fn new(
        providers: Vec<Box<dyn RecognitionProvider>>,
        disambiguator: Disambiguator,
        settings: Settings,
    ) -> Self {
        Self {
            providers,
            rules: builtin_rules(),
            templates: builtin_templates(),
            disambiguator,
            settings,
        }
    }

    /// Wires up providers and the disambiguation model from environment
    /// API keys.
    pub fn from_env(settings: Settings) -> Self {
        let disambiguator = if settings.disambiguation {
            Disambiguator::from_env(settings.llm_model.as_deref())
        } else {
            Disambiguator::disabled()
        };
        Self::new(available_from_env(), disambiguator, settings)
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    pub fn disambiguation_enabled(&self) -> bool {
        self.disambiguator.is_enabled()
    }

    /// Runs the full pipeline for one request.
    ///
    /// Dropping the returned future cancels any in-flight provider and
    /// model calls.
    pub async fn recognize(
        &self,
        request: &RecognitionRequest,
    ) -> RecognizeResult<RecognitionOutcome> {
        let bytes = request.payload.to_bytes()?;
        debug!(
            mime = request.payload.sniff_mime().unwrap_or("unknown"),
            bytes = bytes.len(),
            "decoding captured image"
        );
        let normalized = image_prep::normalize(&bytes)?;
        let png = normalized.to_png_bytes()?;

        let timeout = Duration::from_millis(self.settings.provider_timeout_ms);
        let provider_results = dispatch::dispatch(
            &self.providers,
            &png,
            &self.settings.ocr_language,
            timeout,
        )
        .await?;

        let mut candidates = Vec::new();
        for result in provider_results.iter().filter(|r| r.is_usable()) {
            let raw = result.raw_text.trim();
            let confidence = result
                .reported_confidence
                .unwrap_or(self.settings.default_provider_confidence);

            candidates.push(CandidateResult::new(
                SourceStage::Provider(result.provider_id.clone()),
                raw,
                confidence,
                format!("raw transcription in {} ms", result.latency_ms),
            ));

            let corrected = apply_rules(&self.rules, raw);
            if corrected != raw {
                candidates.push(CandidateResult::new(
                    SourceStage::Correction(result.provider_id.clone()),
                    corrected,
                    confidence,
                    "after transcription cleanup",
                ));
            }

            candidates.extend(match_templates(&self.templates, raw));
        }

        dedupe_candidates(&mut candidates);

        let mut ranked = candidates.clone();
        ranked.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.source_stage.cmp(&b.source_stage))
        });
        if let Some(raw) = best_raw_text(&provider_results) {
            let extra = self
                .disambiguator
                .adjudicate(raw, &ranked, request.hint.as_deref())
                .await;
            candidates.extend(extra);
        }

        candidates.retain(|candidate| is_plausible_expression(&candidate.text));
        debug!(candidates = candidates.len(), "aggregating candidates");

        let consensus = consensus::aggregate(candidates).ok_or(RecognizeError::NoCandidates)?;
        info!(
            text = %consensus.final_text,
            confidence = consensus.final_confidence,
            agreement = consensus.agreement_count,
            class = normalized.class.as_str(),
            "recognition complete"
        );

        Ok(RecognitionOutcome {
            consensus,
            image_class: normalized.class,
            provider_results,
        })
    }
}

/// Raw text of the most confident usable provider result; on a tie the
/// earliest-completing provider wins.
fn best_raw_text(results: &[RawProviderResult]) -> Option<&str> {
    let mut best: Option<&RawProviderResult> = None;
    for result in results.iter().filter(|result| result.is_usable()) {
        let beats_current = match best {
            Some(current) => {
                result.reported_confidence.unwrap_or(0.0)
                    > current.reported_confidence.unwrap_or(0.0)
            }
            None => true,
        };
        if beats_current {
            best = Some(result);
        }
    }
    best.map(|result| result.raw_text.trim())
}

/// Collapses duplicates produced when several providers trigger the same
/// template: one stage gets at most one candidate per text, keeping the
/// highest confidence.
fn dedupe_candidates(candidates: &mut Vec<CandidateResult>) {
    candidates.sort_by(|a, b| {
        a.source_stage
            .cmp(&b.source_stage)
            .then_with(|| a.text.cmp(&b.text))
            .then_with(|| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });
    candidates.dedup_by(|a, b| a.source_stage == b.source_stage && a.text == b.text);
}
