use anyhow::{Result, anyhow};
use std::path::Path;

pub mod candidate;
pub mod consensus;
pub mod correction;
pub mod dispatch;
pub mod errors;
pub mod image_prep;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod providers;
pub mod request;
pub mod scoring;
pub mod settings;
pub mod templates;

pub use candidate::{CandidateResult, SourceStage};
pub use consensus::{ConsensusGroup, ConsensusResult};
pub use errors::{RecognizeError, RecognizeResult};
pub use pipeline::{RecognitionOutcome, Recognizer};
pub use request::{ImagePayload, RecognitionRequest};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub hint: Option<String>,
    pub model: Option<String>,
    pub no_disambiguation: bool,
    pub show_providers: bool,
    pub settings_path: Option<String>,
    pub timeout_ms: Option<u64>,
    pub with_confidence: bool,
    pub with_alternatives: bool,
}

pub async fn run(config: Config, input: Vec<u8>) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    if let Some(timeout) = config.timeout_ms {
        if timeout > 0 {
            settings.provider_timeout_ms = timeout;
        }
    }
    if config.no_disambiguation {
        settings.disambiguation = false;
    }
    if let Some(model) = &config.model {
        settings.llm_model = Some(model.clone());
    }

    let recognizer = Recognizer::from_env(settings);
    if config.show_providers {
        return Ok(format_show_providers(&recognizer));
    }

    if input.is_empty() {
        return Err(anyhow!("no image data (pass a file path or pipe an image)"));
    }
    let mut request = build_request(input);
    if let Some(hint) = config.hint {
        request = request.with_hint(hint);
    }

    let outcome = recognizer.recognize(&request).await?;
    Ok(format_outcome(
        &outcome,
        config.with_confidence,
        config.with_alternatives,
    ))
}

/// The camera widget hands over `data:image/...;base64,` URIs as text;
/// anything else is treated as raw image bytes.
fn build_request(input: Vec<u8>) -> RecognitionRequest {
    if input.starts_with(b"data:") {
        if let Ok(text) = String::from_utf8(input.clone()) {
            return RecognitionRequest::from_data_uri(text.trim().to_string());
        }
    }
    RecognitionRequest::from_bytes(input)
}

fn format_outcome(
    outcome: &RecognitionOutcome,
    with_confidence: bool,
    with_alternatives: bool,
) -> String {
    let consensus = &outcome.consensus;
    let mut output = consensus.final_text.clone();

    if with_confidence {
        output.push('\n');
        output.push_str(&format!(
            "confidence: {:.0} ({} agreeing, image: {})",
            consensus.final_confidence,
            consensus.agreement_count,
            outcome.image_class.as_str()
        ));
    }

    if with_alternatives && consensus.groups.len() > 1 {
        output.push('\n');
        let lines: Vec<String> = consensus
            .groups
            .iter()
            .skip(1)
            .map(|group| {
                format!(
                    "  {:.0}\t{}\t{}",
                    group.confidence, group.text, group.explanation
                )
            })
            .collect();
        output.push_str("alternatives:\n");
        output.push_str(&lines.join("\n"));
    }

    output
}

fn format_show_providers(recognizer: &Recognizer) -> String {
    let ids = recognizer.provider_ids();
    let mut lines = Vec::new();
    if ids.is_empty() {
        lines.push(
            "providers: none (set OCR_SPACE_API_KEY and/or GOOGLE_VISION_API_KEY)".to_string(),
        );
    } else {
        lines.push(format!("providers: {}", ids.join(", ")));
    }
    lines.push(format!(
        "disambiguation: {}",
        if recognizer.disambiguation_enabled() {
            "enabled"
        } else {
            "disabled (no OPENAI_API_KEY/ANTHROPIC_API_KEY or turned off)"
        }
    ));
    lines.join("\n")
}

#[cfg(test)]
pub(crate) mod test_util;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_input_is_detected() {
        let request = build_request(b"data:image/png;base64,AAAA".to_vec());
        assert!(matches!(request.payload, ImagePayload::DataUri(_)));
        let request = build_request(vec![0x89, 0x50, 0x4e, 0x47]);
        assert!(matches!(request.payload, ImagePayload::Bytes(_)));
    }
}
