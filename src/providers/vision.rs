use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;

use super::retry::{
    RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_RETRIES, is_rate_limited, retry_after, wait_with_backoff,
};
use super::{ProviderText, RecognitionProvider, RecognizeFuture};

const DEFAULT_BASE_URL: &str = "https://vision.googleapis.com/v1";

/// Google Cloud Vision text-detection client (API-key auth).
#[derive(Debug, Clone)]
pub struct GoogleVision {
    key: String,
    client: reqwest::Client,
}

impl GoogleVision {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, png: &[u8], language: &str) -> Result<ProviderText> {
        let url = format!("{}/images:annotate?key={}", base_url(), self.key);
        let body = json!({
            "requests": [{
                "image": {"content": BASE64.encode(png)},
                "features": [{"type": "TEXT_DETECTION"}],
                "imageContext": {"languageHints": [language]}
            }]
        });

        let mut attempt = 0usize;
        let mut delay = RATE_LIMIT_BASE_DELAY;
        loop {
            attempt += 1;
            let response = self.client.post(&url).json(&body).send().await?;

            let status = response.status();
            let retry_after = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                return extract_annotation(&text);
            }
            if is_rate_limited(status, &text) && attempt < RATE_LIMIT_MAX_RETRIES {
                delay = wait_with_backoff("Google Vision", attempt, delay, retry_after).await;
                continue;
            }
            return Err(anyhow!("Google Vision API error ({}): {}", status, text));
        }
    }
}

impl RecognitionProvider for GoogleVision {
    fn id(&self) -> &str {
        "google-vision"
    }

    fn recognize<'a>(&'a self, png: &'a [u8], language: &'a str) -> RecognizeFuture<'a> {
        Box::pin(self.call(png, language))
    }
}

fn base_url() -> String {
    std::env::var("GOOGLE_VISION_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn extract_annotation(body: &str) -> Result<ProviderText> {
    let payload: AnnotateResponse =
        serde_json::from_str(body).with_context(|| "failed to parse Vision response JSON")?;
    let response = payload
        .responses
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("empty Vision response"))?;

    if let Some(error) = response.error {
        return Err(anyhow!(
            "Vision annotation error: {}",
            error.message.unwrap_or_else(|| "unknown".to_string())
        ));
    }

    let annotation = response.full_text_annotation.unwrap_or_default();
    // Page confidence is 0-1; the pipeline works on 0-100.
    let confidence = annotation
        .pages
        .first()
        .and_then(|page| page.confidence)
        .map(|value| (value * 100.0).clamp(0.0, 100.0));

    Ok(ProviderText {
        text: annotation.text.unwrap_or_default(),
        confidence,
    })
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateItem>,
}

#[derive(Debug, Deserialize)]
struct AnnotateItem {
    #[serde(rename = "fullTextAnnotation")]
    full_text_annotation: Option<FullTextAnnotation>,
    error: Option<VisionError>,
}

#[derive(Debug, Default, Deserialize)]
struct FullTextAnnotation {
    text: Option<String>,
    #[serde(default)]
    pages: Vec<AnnotationPage>,
}

#[derive(Debug, Deserialize)]
struct AnnotationPage {
    confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct VisionError {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::extract_annotation;

    #[test]
    fn extracts_text_and_confidence() {
        let body = r#"{
            "responses": [{
                "fullTextAnnotation": {
                    "text": "∫ sec^2(2x) dx",
                    "pages": [{"confidence": 0.87}]
                }
            }]
        }"#;
        let result = extract_annotation(body).unwrap();
        assert_eq!(result.text, "∫ sec^2(2x) dx");
        assert_eq!(result.confidence, Some(87.0));
    }

    #[test]
    fn missing_annotation_yields_empty_text() {
        let body = r#"{"responses": [{}]}"#;
        let result = extract_annotation(body).unwrap();
        assert!(result.text.is_empty());
        assert!(result.confidence.is_none());
    }

    #[test]
    fn annotation_error_is_surfaced() {
        let body = r#"{
            "responses": [{"error": {"message": "invalid image", "code": 3}}]
        }"#;
        let err = extract_annotation(body).unwrap_err();
        assert!(err.to_string().contains("invalid image"));
    }

    #[test]
    fn empty_responses_is_an_error() {
        assert!(extract_annotation(r#"{"responses": []}"#).is_err());
    }
}
