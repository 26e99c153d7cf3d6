use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_CHAT_MODEL: &str = "gpt-4-turbo";

/// Thin client for the OpenAI chat-completion endpoint, used as the direct
/// fallback path for script generation.
pub struct ChatClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl ChatClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends one system + user message pair and returns the assistant
    /// message content verbatim.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
        };

        info!("chat completion request: model={}", self.model);
        let response = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .context("chat completion request failed")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "OpenAI API error: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            );
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("invalid chat completion response")?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .context("chat completion response had no choices")?;
        choice
            .message
            .and_then(|m| m.content)
            .context("chat completion choice missing assistant content")
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_content_extraction() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "{\"segments\": []}"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content);
        assert_eq!(content.as_deref(), Some("{\"segments\": []}"));
    }

    #[test]
    fn empty_choices_is_detectable() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(parsed.choices.is_empty());
    }
}
