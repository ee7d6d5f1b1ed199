use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;

use super::retry::{
    RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_RETRIES, is_rate_limited, retry_after, wait_with_backoff,
};
use super::{ProviderText, RecognitionProvider, RecognizeFuture};

const DEFAULT_BASE_URL: &str = "https://api.ocr.space";

/// OCR.space client. Engine 2 handles the mixed print/handwriting
/// captures better than the default engine.
#[derive(Debug, Clone)]
pub struct OcrSpace {
    key: String,
    client: reqwest::Client,
}

impl OcrSpace {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, png: &[u8], language: &str) -> Result<ProviderText> {
        let url = format!("{}/parse/image", base_url());
        let data_uri = format!("data:image/png;base64,{}", BASE64.encode(png));
        let form = [
            ("base64Image", data_uri.as_str()),
            ("language", language),
            ("OCREngine", "2"),
            ("scale", "true"),
            ("isOverlayRequired", "false"),
        ];

        let mut attempt = 0usize;
        let mut delay = RATE_LIMIT_BASE_DELAY;
        loop {
            attempt += 1;
            let response = self
                .client
                .post(&url)
                .header("apikey", &self.key)
                .form(&form)
                .send()
                .await?;

            let status = response.status();
            let retry_after = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                return extract_parsed_text(&text);
            }
            if is_rate_limited(status, &text) && attempt < RATE_LIMIT_MAX_RETRIES {
                delay = wait_with_backoff("OCR.space", attempt, delay, retry_after).await;
                continue;
            }
            return Err(anyhow!("OCR.space API error ({}): {}", status, text));
        }
    }
}

impl RecognitionProvider for OcrSpace {
    fn id(&self) -> &str {
        "ocr-space"
    }

    fn recognize<'a>(&'a self, png: &'a [u8], language: &'a str) -> RecognizeFuture<'a> {
        Box::pin(self.call(png, language))
    }
}

fn base_url() -> String {
    std::env::var("OCR_SPACE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn extract_parsed_text(body: &str) -> Result<ProviderText> {
    let payload: OcrSpaceResponse =
        serde_json::from_str(body).with_context(|| "failed to parse OCR.space response JSON")?;

    if payload.is_errored_on_processing.unwrap_or(false) {
        let message = match payload.error_message {
            Some(ErrorMessage::One(message)) => message,
            Some(ErrorMessage::Many(messages)) => messages.join("; "),
            None => "unknown processing error".to_string(),
        };
        return Err(anyhow!("OCR.space processing error: {}", message));
    }

    let text = payload
        .parsed_results
        .unwrap_or_default()
        .into_iter()
        .filter_map(|result| result.parsed_text)
        .collect::<Vec<_>>()
        .join("\n");

    // OCR.space reports no usable per-text confidence.
    Ok(ProviderText {
        text,
        confidence: None,
    })
}

#[derive(Debug, Deserialize)]
struct OcrSpaceResponse {
    #[serde(rename = "ParsedResults")]
    parsed_results: Option<Vec<ParsedResult>>,
    #[serde(rename = "IsErroredOnProcessing")]
    is_errored_on_processing: Option<bool>,
    #[serde(rename = "ErrorMessage")]
    error_message: Option<ErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct ParsedResult {
    #[serde(rename = "ParsedText")]
    parsed_text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorMessage {
    One(String),
    Many(Vec<String>),
}
