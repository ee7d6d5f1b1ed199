use anyhow::Result;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

mod ocr_space;
pub(crate) mod retry;
mod vision;

pub use ocr_space::OcrSpace;
pub use vision::GoogleVision;

/// Raw transcription returned by a provider. The confidence is the
/// provider's own figure on a 0-100 scale when the service reports one.
#[derive(Debug, Clone)]
pub struct ProviderText {
    pub text: String,
    pub confidence: Option<f32>,
}

/// What happened to one provider call, kept for logging and diagnostics
/// regardless of whether the call produced usable text.
#[derive(Debug, Clone, Serialize)]
pub struct RawProviderResult {
    pub provider_id: String,
    pub raw_text: String,
    pub reported_confidence: Option<f32>,
    pub latency_ms: u64,
    pub outcome: ProviderOutcome,
}

impl RawProviderResult {
    /// A result contributes to the pipeline only when the call succeeded
    /// and produced non-blank text.
    pub fn is_usable(&self) -> bool {
        matches!(self.outcome, ProviderOutcome::Text) && !self.raw_text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderOutcome {
    Text,
    Empty,
    TimedOut,
    Failed,
}

impl std::fmt::Display for ProviderOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ProviderOutcome::Text => "text",
            ProviderOutcome::Empty => "empty",
            ProviderOutcome::TimedOut => "timed-out",
            ProviderOutcome::Failed => "failed",
        };
        f.write_str(label)
    }
}

pub type RecognizeFuture<'a> = Pin<Box<dyn Future<Output = Result<ProviderText>> + Send + 'a>>;

/// One text-recognition backend. Implementations hold their own HTTP
/// client and credentials; the dispatcher owns timeouts and fan-out.
pub trait RecognitionProvider: Send + Sync {
    fn id(&self) -> &str;
    fn recognize<'a>(&'a self, png: &'a [u8], language: &'a str) -> RecognizeFuture<'a>;
}

/// Builds every provider whose API key is present in the environment.
/// Keys checked: `OCR_SPACE_API_KEY`, `GOOGLE_VISION_API_KEY`.
pub fn available_from_env() -> Vec<Box<dyn RecognitionProvider>> {
    let mut providers: Vec<Box<dyn RecognitionProvider>> = Vec::new();
    if let Some(key) = get_env("OCR_SPACE_API_KEY") {
        providers.push(Box::new(OcrSpace::new(key)));
    }
    if let Some(key) = get_env("GOOGLE_VISION_API_KEY") {
        providers.push(Box::new(GoogleVision::new(key)));
    }
    providers
}

pub(crate) fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
