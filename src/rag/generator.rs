//! Answer generation collaborators.
//!
//! The core treats generation as prompt-in/text-out; failures are the
//! caller's to absorb (the orchestrator folds them into the answer field).

use anyhow::{Context, Result};
use serde_json::json;
use tracing::debug;

/// External text-generation collaborator.
pub trait AnswerGenerator: Send + Sync {
    /// Name of the underlying model, for statistics and display.
    fn model_name(&self) -> &str;

    /// Generate a completion for the given prompt.
    fn generate(&self, prompt: &str) -> Result<String>;
}

impl<T: AnswerGenerator + ?Sized> AnswerGenerator for std::sync::Arc<T> {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt)
    }
}

/// Generator backed by the Gemini REST `generateContent` endpoint.
pub struct GeminiGenerator {
    client: reqwest::blocking::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl GeminiGenerator {
    pub fn new(api_base: &str, api_key: &str, model: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .context("failed to build generator client")?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

impl AnswerGenerator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        anyhow::ensure!(!self.api_key.is_empty(), "generator API key is not set");

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        );
        debug!("generation request to {url} ({} prompt chars)", prompt.len());

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .context("generation request failed")?;

        let status = resp.status();
        let payload: serde_json::Value = resp.json().context("invalid generation response")?;

        anyhow::ensure!(
            status.is_success(),
            "generation API returned {status}: {}",
            payload["error"]["message"].as_str().unwrap_or("unknown")
        );

        payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .context("generation response missing candidate text")
    }
}

/// Canned generator for tests: records the last prompt it saw.
pub struct MockGenerator {
    pub answer: String,
    pub last_prompt: std::sync::Mutex<String>,
}

impl MockGenerator {
    #[must_use]
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            last_prompt: std::sync::Mutex::new(String::new()),
        }
    }
}

impl AnswerGenerator for MockGenerator {
    fn model_name(&self) -> &str {
        "mock-generator"
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = prompt.to_string();
        }
        Ok(self.answer.clone())
    }
}

/// Generator that always fails, for degraded-path tests.
pub struct FailingGenerator;

impl AnswerGenerator for FailingGenerator {
    fn model_name(&self) -> &str {
        "failing-generator"
    }

    fn generate(&self, _prompt: &str) -> Result<String> {
        anyhow::bail!("generator unavailable")
    }
}
