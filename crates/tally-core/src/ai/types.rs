//! Completion request/response types
//!
//! These types are provider-agnostic and shared by every provider client.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Result;

use super::parsing::completion_text;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A completion call as issued by callers of the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Requested model; the answering model may differ after fallback
    pub model: String,
    /// Overrides the registry default when set
    pub temperature: Option<f32>,
    /// Overrides the registry default when set
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(model: &str, messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: model.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Total characters across all messages
    pub fn content_len(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }

    /// Stable SHA-256 fingerprint of model, messages and overrides (cache key)
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.model.as_bytes());
        hasher.update([0u8]);
        for message in &self.messages {
            hasher.update(format!("{:?}", message.role).as_bytes());
            hasher.update([0u8]);
            hasher.update(message.content.as_bytes());
            hasher.update([0u8]);
        }
        if let Some(t) = self.temperature {
            hasher.update(t.to_be_bytes());
        }
        hasher.update([0u8]);
        if let Some(m) = self.max_tokens {
            hasher.update(m.to_be_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Wire body for `POST {base_url}/chat/completions`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Outcome of a successful dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionResult {
    /// Raw provider response body
    pub payload: Value,
    /// Model that actually answered
    pub model: String,
    /// Provider that actually answered
    pub provider: String,
}

impl CompletionResult {
    /// The completion text (`choices[0].message.content`)
    pub fn content(&self) -> Result<&str> {
        completion_text(&self.payload)
    }
}

/// Models advertised by one provider's `GET /models`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelListing {
    pub provider: String,
    pub models: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_request_serialization() {
        let request = ProviderRequest {
            messages: vec![ChatMessage::user("Hello")],
            model: "llama3.1-8b".to_string(),
            temperature: Some(0.1),
            max_tokens: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama3.1-8b");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Hello");
        let temp = json["temperature"].as_f64().unwrap();
        assert!((temp - 0.1).abs() < 0.001);
        // max_tokens should be omitted when None
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = CompletionRequest::new("m", vec![ChatMessage::user("same")]);
        let b = CompletionRequest::new("m", vec![ChatMessage::user("same")]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_distinguishes_inputs() {
        let base = CompletionRequest::new("m", vec![ChatMessage::user("text")]);
        let other_model = CompletionRequest::new("n", vec![ChatMessage::user("text")]);
        let other_role = CompletionRequest::new("m", vec![ChatMessage::system("text")]);
        let other_temp = base.clone().with_temperature(0.2);

        assert_ne!(base.fingerprint(), other_model.fingerprint());
        assert_ne!(base.fingerprint(), other_role.fingerprint());
        assert_ne!(base.fingerprint(), other_temp.fingerprint());
    }

    #[test]
    fn test_result_content() {
        let result = CompletionResult {
            payload: json!({"choices": [{"message": {"role": "assistant", "content": "{}"}}]}),
            model: "m".into(),
            provider: "p".into(),
        };
        assert_eq!(result.content().unwrap(), "{}");
    }
}
