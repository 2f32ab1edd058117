//! Gemini `generateContent` backend.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use super::GenerativeBackend;
use crate::config::AssistConfig;
use crate::error::AssistError;

static KEY_PARAM: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)([?&]key=)[^&\s]+").ok());

/// Strip API keys from anything that may echo the request URL.
pub(crate) fn redact_key(raw: &str) -> String {
    match KEY_PARAM.as_ref() {
        Some(re) => re.replace_all(raw, "${1}[REDACTED]").into_owned(),
        None => raw.to_string(),
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a response body.
pub fn extract_candidate_text(body: &Value) -> Result<String, AssistError> {
    let candidate = body
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .ok_or(AssistError::UnexpectedResponseShape {
            missing: "candidates",
        })?;
    let content = candidate
        .get("content")
        .ok_or(AssistError::UnexpectedResponseShape { missing: "content" })?;
    let part = content
        .get("parts")
        .and_then(Value::as_array)
        .and_then(|p| p.first())
        .ok_or(AssistError::UnexpectedResponseShape { missing: "parts" })?;
    part.get("text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(AssistError::UnexpectedResponseShape { missing: "text" })
}

pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

impl GeminiClient {
    /// No request timeout is set: a hung call keeps its request loading.
    pub fn new(config: &AssistConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> Result<url::Url, AssistError> {
        let raw = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let mut url = url::Url::parse(&raw).map_err(|e| AssistError::NetworkFailure {
            reason: format!("invalid endpoint: {e}"),
        })?;
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret());
        Ok(url)
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, AssistError> {
        let url = self.endpoint()?;
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistError::NetworkFailure {
                reason: redact_key(&e.without_url().to_string()),
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, model = %self.model, "Generative API returned an error status");
        }

        // The body decides success: an error payload has no candidates.
        let payload: Value = response
            .json()
            .await
            .map_err(|e| AssistError::NetworkFailure {
                reason: redact_key(&e.without_url().to_string()),
            })?;
        extract_candidate_text(&payload)
    }
}
