use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;

use super::{AdjudicateFuture, DisambiguationModel};
use crate::providers::retry::{
    RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_RETRIES, is_rate_limited, retry_after, wait_with_backoff,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const MAX_TOKENS: u32 = 200;

#[derive(Debug, Clone)]
pub struct Claude {
    key: String,
    model: String,
    client: reqwest::Client,
}

impl Claude {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    async fn call(&self, prompt: &str) -> Result<String> {
        let url = base_url();
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{"role": "user", "content": prompt}]
        });

        let mut attempt = 0usize;
        let mut delay = RATE_LIMIT_BASE_DELAY;
        loop {
            attempt += 1;
            let response = self
                .client
                .post(&url)
                .header("x-api-key", &self.key)
                .header("anthropic-version", "2023-06-01")
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            let retry_after = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                return extract_content_text(&text);
            }
            if is_rate_limited(status, &text) && attempt < RATE_LIMIT_MAX_RETRIES {
                delay = wait_with_backoff("Claude", attempt, delay, retry_after).await;
                continue;
            }
            return Err(anyhow!("Claude API error ({}): {}", status, text));
        }
    }
}

impl DisambiguationModel for Claude {
    fn id(&self) -> &str {
        "claude"
    }

    fn adjudicate<'a>(&'a self, prompt: &'a str) -> AdjudicateFuture<'a> {
        Box::pin(self.call(prompt))
    }
}

fn base_url() -> String {
    std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn extract_content_text(body: &str) -> Result<String> {
    let payload: MessagesResponse =
        serde_json::from_str(body).with_context(|| "failed to parse Claude response JSON")?;
    payload
        .content
        .into_iter()
        .find_map(|block| block.text)
        .ok_or_else(|| anyhow!("no text content returned from Claude"))
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::extract_content_text;

    #[test]
    fn extracts_first_text_block() {
        let body = r#"{
            "content": [{"type": "text", "text": "x^2 + 3 = y"}]
        }"#;
        assert_eq!(extract_content_text(body).unwrap(), "x^2 + 3 = y");
    }

    #[test]
    fn missing_text_is_an_error() {
        assert!(extract_content_text(r#"{"content": []}"#).is_err());
    }
}
