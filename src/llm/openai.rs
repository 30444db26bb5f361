use crate::http::build_client;
use crate::models::ItemDescriptor;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("OPENAI_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".into()),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("api key is not configured")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("response is not a bare price: {0}")]
    MalformedPrice(String),
}

/// Price estimator backed by a chat-completion endpoint. The model is told
/// to answer with a single `$<integer>` token; anything that does not
/// validate against that shape is discarded, never trusted as a price.
pub struct LlmClient {
    http: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: build_client(),
            config,
        }
    }

    /// Absence of a key is a valid state, not an error; callers skip this
    /// step entirely when unconfigured.
    pub fn is_configured(&self) -> bool {
        self.config
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    pub async fn estimate_price(&self, item: &ItemDescriptor) -> Result<String, LlmError> {
        let key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(item),
                },
            ],
            max_tokens: 12,
            temperature: 0.2,
        };

        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Http(err.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Http(format!("HTTP {}", response.status())));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;

        let text = payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("missing choices".into()))?;

        validate_price_token(&text)
            .ok_or_else(|| LlmError::MalformedPrice(text.chars().take(60).collect()))
    }
}

const SYSTEM_PROMPT: &str = "You price used items for a resale pickup service. \
Respond with exactly one price token such as $75 — a dollar sign followed by a \
whole number. No ranges, no cents, no explanations. Typical secondhand ranges: \
electronics $30-$600, appliances $40-$400, furniture $30-$350, tools $20-$250, \
jewelry $20-$500, clothing $10-$120, books and media $5-$40.";

fn build_prompt(item: &ItemDescriptor) -> String {
    let mut prompt = String::from("Estimate a fair resale price for this item.\n");
    if let Some(name) = item.name.as_deref().filter(|n| !n.trim().is_empty()) {
        prompt.push_str(&format!("Name: {name}\n"));
    }
    prompt.push_str(&format!("Description: {}\n", item.description));
    if let Some(condition) = item.condition.as_deref().filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("Condition: {condition}\n"));
    }
    if let Some(issues) = item.issues.as_deref().filter(|i| !i.trim().is_empty()) {
        prompt.push_str(&format!("Known issues: {issues}\n"));
    }
    prompt.push_str("Answer with the price token only.");
    prompt
}

/// Accept only `$` followed by one or more digits, nothing else.
pub fn validate_price_token(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let digits = trimmed.strip_prefix('$')?;
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Some(trimmed.to_string())
    } else {
        None
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bare_price_tokens() {
        assert_eq!(validate_price_token("$75"), Some("$75".into()));
        assert_eq!(validate_price_token("  $1250\n"), Some("$1250".into()));
    }

    #[test]
    fn rejects_anything_else() {
        for bad in ["75", "$", "$75.50", "$75-$100", "around $75", "$75 or so", ""] {
            assert_eq!(validate_price_token(bad), None, "accepted: {bad:?}");
        }
    }

    #[test]
    fn unconfigured_client_reports_missing_key() {
        let client = LlmClient::new(LlmConfig {
            api_url: "http://localhost:1".into(),
            api_key: None,
            model: "test".into(),
        });
        assert!(!client.is_configured());
    }

    #[test]
    fn prompt_carries_optional_fields_when_present() {
        let item = ItemDescriptor {
            name: Some("KitchenAid mixer".into()),
            description: "Stand mixer, red".into(),
            condition: Some("Good".into()),
            issues: None,
        };
        let prompt = build_prompt(&item);
        assert!(prompt.contains("Name: KitchenAid mixer"));
        assert!(prompt.contains("Condition: Good"));
        assert!(!prompt.contains("Known issues"));
    }
}
