//! Hosted completion provider abstraction
//!
//! This module provides a provider-agnostic interface for chat completions.
//! Every hosted provider speaks the OpenAI-compatible wire format
//! (`/chat/completions`, `/models`), so one HTTP client covers them all.
//!
//! # Architecture
//!
//! - `CompletionProvider` trait: one raw completion call and a model listing
//! - `OpenAICompatibleProvider`: reqwest client for OpenRouter, Cerebras and friends
//! - `MockProvider`: scripted offline provider for tests and demos
//! - `ProviderSet`: the primary/secondary pair the dispatcher is built from
//!
//! # Configuration
//!
//! Providers are declared in `config/models.toml` (`[providers.primary]`,
//! `[providers.secondary]`). Environment variables:
//! - `OPENROUTER_API_KEY`: bearer token for the primary provider
//! - `CEREBRAS_API_KEY`: bearer token for the secondary provider
//! - `TALLY_PROVIDER`: set to `mock` to run fully offline

mod mock;
mod openai_compatible;
pub mod parsing;
pub mod types;

pub use mock::{MockProvider, MockReply};
pub use openai_compatible::OpenAICompatibleProvider;
pub use parsing::{parse_analysis, parse_categories, parse_structured, StructuredPayload};
pub use types::*;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::AppConfig;
use crate::error::Result;

/// Environment variable selecting the provider implementation
pub const PROVIDER_ENV: &str = "TALLY_PROVIDER";

/// Trait implemented by every completion provider
///
/// A provider performs exactly one network call per method; retries,
/// pacing and fallback belong to the dispatcher.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// `POST /chat/completions`, returning the raw response body
    async fn chat_completion(&self, request: &ProviderRequest) -> Result<Value>;

    /// `GET /models`, returning the `data` array
    async fn list_models(&self) -> Result<Vec<Value>>;

    /// Short provider name used in logs and results
    fn name(&self) -> &str;

    /// Base URL (or a descriptive placeholder for offline providers)
    fn host(&self) -> &str;
}

/// Providers are shared between the dispatcher and concurrent requests
pub type SharedProvider = Arc<dyn CompletionProvider>;

/// Primary provider plus optional secondary
#[derive(Clone)]
pub struct ProviderSet {
    pub primary: SharedProvider,
    pub secondary: Option<SharedProvider>,
}

impl ProviderSet {
    /// Build HTTP providers from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let timeout = config.dispatch.timeout;
        let primary = OpenAICompatibleProvider::from_config(&config.primary, timeout)?;
        let secondary = config
            .secondary
            .as_ref()
            .map(|p| OpenAICompatibleProvider::from_config(p, timeout))
            .transpose()?;

        Ok(Self {
            primary: Arc::new(primary),
            secondary: secondary.map(|p| Arc::new(p) as SharedProvider),
        })
    }

    /// Build providers according to `TALLY_PROVIDER`
    ///
    /// `mock` selects the offline mock pair; anything else (or unset) uses
    /// the configured HTTP providers.
    pub fn from_env(config: &AppConfig) -> Result<Self> {
        let kind = std::env::var(PROVIDER_ENV).unwrap_or_default();
        match kind.to_lowercase().as_str() {
            "mock" => {
                tracing::info!("Using offline mock providers");
                Ok(Self::mock(config))
            }
            "" | "http" | "hosted" => Self::from_config(config),
            other => {
                tracing::warn!(provider = %other, "Unknown TALLY_PROVIDER, using configured providers");
                Self::from_config(config)
            }
        }
    }

    /// Offline providers named after the configured ones
    pub fn mock(config: &AppConfig) -> Self {
        Self {
            primary: Arc::new(MockProvider::new(&config.primary.name)),
            secondary: config
                .secondary
                .as_ref()
                .map(|p| Arc::new(MockProvider::new(&p.name)) as SharedProvider),
        }
    }
}
