//! Answer-generation model boundary.
//!
//! The pipeline only needs `generate(prompt) -> answer text`; the
//! [`Generator`] trait keeps that boundary substitutable in tests.
//! [`GeminiGenerator`] implements it against the Gemini
//! `generateContent` API.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::config::GenerationConfig;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Build the answer prompt from assembled context and the question.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a codebase expert. Based on the following code snippets, answer the question:\n\n\
         Context:\n{}\n\n\
         Question:\n{}\n\n\
         Answer:",
        context, question
    )
}

/// Generation client for the Gemini API. Requires the `GEMINI_API_KEY`
/// environment variable.
pub struct GeminiGenerator {
    model: String,
    api_key: String,
    http: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            http,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", GEMINI_API_BASE, self.model);

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("generation request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Gemini generation API error {}: {}", status, body);
        }

        let json: serde_json::Value = response.json().await?;
        let text = json
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.pointer("/content/parts/0/text"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: no candidate text"))?;

        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_context_and_question() {
        let prompt = build_prompt("let x = 1; (from octo/app/a.rs)", "what is x?");
        assert!(prompt.starts_with("You are a codebase expert."));
        assert!(prompt.contains("let x = 1;"));
        assert!(prompt.contains("what is x?"));
        assert!(prompt.ends_with("Answer:"));
    }
}
