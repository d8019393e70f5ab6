//! OpenAI-compatible provider implementation
//!
//! Works with any hosted service that implements the OpenAI chat completions API:
//! - OpenRouter (https://openrouter.ai/api/v1)
//! - Cerebras (https://api.cerebras.ai/v1)
//! - local servers such as vLLM or llama-server
//!
//! Base URLs include the API version segment; `/chat/completions` and
//! `/models` are appended directly.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{Error, Result};

use super::types::ProviderRequest;
use super::CompletionProvider;

/// OpenAI-compatible provider
///
/// # Example
///
/// ```rust,ignore
/// let provider = OpenAICompatibleProvider::new("openrouter", "https://openrouter.ai/api/v1", timeout)?
///     .with_api_key(&key)
///     .with_app_name("BankStatementAnalyzer");
/// ```
#[derive(Clone)]
pub struct OpenAICompatibleProvider {
    http_client: Client,
    name: String,
    base_url: String,
    api_key: Option<String>,
    app_name: Option<String>,
}

impl OpenAICompatibleProvider {
    /// Create a provider with a per-request timeout
    pub fn new(name: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            app_name: None,
        })
    }

    /// Send `Authorization: Bearer <key>` with every request
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    /// Send `X-App-Name` with every request
    pub fn with_app_name(mut self, app_name: &str) -> Self {
        self.app_name = Some(app_name.to_string());
        self
    }

    /// Create from a provider section of the config
    ///
    /// A missing API key is not an error here; the provider will answer 401
    /// and the dispatcher treats that like any other failed attempt.
    pub fn from_config(config: &ProviderConfig, timeout: Duration) -> Result<Self> {
        let mut provider = Self::new(&config.name, &config.base_url, timeout)?;

        match config.api_key() {
            Some(key) => provider = provider.with_api_key(&key),
            None => {
                if let Some(ref var) = config.api_key_env {
                    tracing::warn!(provider = %config.name, env = %var, "API key not set");
                }
            }
        }
        if let Some(ref app_name) = config.app_name {
            provider = provider.with_app_name(app_name);
        }

        Ok(provider)
    }

    fn authorize(&self, mut builder: RequestBuilder) -> RequestBuilder {
        if let Some(ref api_key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }
        if let Some(ref app_name) = self.app_name {
            builder = builder.header("X-App-Name", app_name);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value> {
        let response = self.authorize(builder).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl CompletionProvider for OpenAICompatibleProvider {
    async fn chat_completion(&self, request: &ProviderRequest) -> Result<Value> {
        debug!(provider = %self.name, model = %request.model, "POST /chat/completions");
        let builder = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .json(request);
        self.send(builder).await
    }

    async fn list_models(&self) -> Result<Vec<Value>> {
        let builder = self.http_client.get(format!("{}/models", self.base_url));
        let body = self.send(builder).await?;

        match body.get("data") {
            Some(Value::Array(models)) => Ok(models.clone()),
            _ => Err(Error::MalformedResponse(format!(
                "{} /models response has no data array",
                self.name
            ))),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
