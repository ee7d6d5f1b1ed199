use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;

use super::{AdjudicateFuture, DisambiguationModel};
use crate::providers::retry::{
    RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_RETRIES, is_rate_limited, retry_after, wait_with_backoff,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct OpenAI {
    key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAI {
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
        let url = format!("{}/chat/completions", base_url());
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0
        });

        let mut attempt = 0usize;
        let mut delay = RATE_LIMIT_BASE_DELAY;
        loop {
            attempt += 1;
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.key)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            let retry_after = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                return extract_message_text(&text);
            }
            if is_rate_limited(status, &text) && attempt < RATE_LIMIT_MAX_RETRIES {
                delay = wait_with_backoff("OpenAI", attempt, delay, retry_after).await;
                continue;
            }
            return Err(anyhow!("OpenAI API error ({}): {}", status, text));
        }
    }
}

impl DisambiguationModel for OpenAI {
    fn id(&self) -> &str {
        "openai"
    }

    fn adjudicate<'a>(&'a self, prompt: &'a str) -> AdjudicateFuture<'a> {
        Box::pin(self.call(prompt))
    }
}

fn base_url() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn extract_message_text(body: &str) -> Result<String> {
    let payload: ChatResponse =
        serde_json::from_str(body).with_context(|| "failed to parse OpenAI response JSON")?;
    payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| anyhow!("no message content returned from OpenAI"))
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
