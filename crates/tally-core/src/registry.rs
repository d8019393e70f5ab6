//! Model registry for task-based model selection
//!
//! A static, ordered list of model descriptors loaded once at startup.
//! Supports:
//! - Task-based selection (capability tag + input size)
//! - Parameter resolution (request overrides win over registry defaults)
//! - Substitution of a smaller model when a model keeps failing

use std::collections::BTreeSet;

use serde::Serialize;

use crate::ai::CompletionRequest;
use crate::config::AppConfig;
use crate::error::{Error, Result};

/// Sampling temperature for models the registry does not know
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Output token budget for models the registry does not know
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Task types for model selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    /// Grouping transactions into spending categories
    Categorization,
    /// Advice and savings projections
    FinancialAnalysis,
    /// Pulling transactions out of statement text
    TextExtraction,
}

impl TaskType {
    /// Get the capability tag for this task type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Categorization => "categorization",
            Self::FinancialAnalysis => "financial_analysis",
            Self::TextExtraction => "text_extraction",
        }
    }

    /// Get all task types
    pub fn all() -> &'static [TaskType] {
        &[
            Self::Categorization,
            Self::FinancialAnalysis,
            Self::TextExtraction,
        ]
    }
}

/// Static metadata for one model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDescriptor {
    /// Provider-facing model identifier
    pub id: String,
    /// Largest input (in tokens) this model is selected for
    pub max_input_tokens: usize,
    /// Default sampling temperature
    pub temperature: f32,
    /// Default output token budget
    pub max_tokens: u32,
    /// Task tags this model is suitable for
    pub capabilities: BTreeSet<String>,
    /// Smaller/cheaper model to try when this one fails
    pub substitute: Option<String>,
}

impl ModelDescriptor {
    pub fn new(id: &str, max_input_tokens: usize, temperature: f32, max_tokens: u32) -> Self {
        Self {
            id: id.to_string(),
            max_input_tokens,
            temperature,
            max_tokens,
            capabilities: BTreeSet::new(),
            substitute: None,
        }
    }

    pub fn with_capabilities(mut self, tags: &[&str]) -> Self {
        self.capabilities = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_substitute(mut self, id: &str) -> Self {
        self.substitute = Some(id.to_string());
        self
    }

    /// Whether this model carries the given capability tag
    pub fn supports(&self, task_tag: &str) -> bool {
        self.capabilities.contains(task_tag)
    }
}

/// Sampling parameters after merging request overrides with registry defaults
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Model registry
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
    default_index: usize,
    fallback_substitute: Option<String>,
}

impl ModelRegistry {
    /// Create a registry; `default_model` must be one of `models`
    pub fn new(models: Vec<ModelDescriptor>, default_model: &str) -> Result<Self> {
        let default_index = models
            .iter()
            .position(|m| m.id == default_model)
            .ok_or_else(|| {
                Error::Config(format!(
                    "Default model '{}' is not declared in the registry",
                    default_model
                ))
            })?;

        Ok(Self {
            models,
            default_index,
            fallback_substitute: None,
        })
    }

    /// Substitute used for models that declare none (and for unknown models)
    pub fn with_fallback_substitute(mut self, id: &str) -> Self {
        self.fallback_substitute = Some(id.to_string());
        self
    }

    /// Build the registry described by a loaded configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let registry = Self::new(config.models.clone(), &config.default_model)?;
        Ok(match config.substitute_model {
            Some(ref id) => registry.with_fallback_substitute(id),
            None => registry,
        })
    }

    /// Pick the first declared model that supports `task_tag` and fits `input_length`
    ///
    /// Never fails: returns the default descriptor when nothing matches.
    pub fn select_model(&self, task_tag: &str, input_length: usize) -> &ModelDescriptor {
        self.models
            .iter()
            .find(|m| m.supports(task_tag) && input_length <= m.max_input_tokens)
            .unwrap_or_else(|| self.default_model())
    }

    /// Get the default descriptor
    pub fn default_model(&self) -> &ModelDescriptor {
        &self.models[self.default_index]
    }

    /// Look up a descriptor by identifier
    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == id)
    }

    /// All descriptors in declaration order
    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Smaller model to use after `id` has failed (never `id` itself)
    pub fn substitute_for(&self, id: &str) -> Option<&ModelDescriptor> {
        let declared = self.get(id).and_then(|m| m.substitute.as_deref());
        declared
            .or(self.fallback_substitute.as_deref())
            .filter(|candidate| *candidate != id)
            .and_then(|candidate| self.get(candidate))
    }

    /// Merge request overrides with the defaults of `model`
    ///
    /// `model` is passed separately because a substituted attempt keeps the
    /// request's overrides but takes its defaults from the substitute.
    pub fn resolve(&self, request: &CompletionRequest, model: &str) -> ResolvedParams {
        let (temperature, max_tokens) = self
            .get(model)
            .map(|m| (m.temperature, m.max_tokens))
            .unwrap_or((DEFAULT_TEMPERATURE, DEFAULT_MAX_TOKENS));

        ResolvedParams {
            temperature: request.temperature.unwrap_or(temperature),
            max_tokens: request.max_tokens.unwrap_or(max_tokens),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ChatMessage;

    fn registry() -> ModelRegistry {
        ModelRegistry::new(
            vec![
                ModelDescriptor::new("large", 4096, 0.7, 4096)
                    .with_capabilities(&["financial_analysis", "categorization"])
                    .with_substitute("small"),
                ModelDescriptor::new("small", 2048, 0.8, 2048)
                    .with_capabilities(&["categorization", "text_extraction"]),
                ModelDescriptor::new("tiny", 2048, 0.7, 1024)
                    .with_capabilities(&["financial_analysis"]),
            ],
            "large",
        )
        .unwrap()
        .with_fallback_substitute("small")
    }

    #[test]
    fn test_task_type_as_str() {
        assert_eq!(TaskType::Categorization.as_str(), "categorization");
        assert_eq!(TaskType::FinancialAnalysis.as_str(), "financial_analysis");
        assert_eq!(TaskType::all().len(), 3);
    }

    #[test]
    fn test_select_first_match_in_declaration_order() {
        let registry = registry();
        assert_eq!(registry.select_model("categorization", 100).id, "large");
        assert_eq!(registry.select_model("text_extraction", 100).id, "small");
    }

    #[test]
    fn test_select_respects_token_limit() {
        let registry = registry();
        // Only "large" accepts 3000 tokens; it lacks text_extraction
        assert_eq!(registry.select_model("text_extraction", 3000).id, "large");
        assert_eq!(registry.select_model("financial_analysis", 3000).id, "large");
        // Boundary is inclusive
        assert_eq!(registry.select_model("text_extraction", 2048).id, "small");
    }

    #[test]
    fn test_unknown_task_returns_default() {
        let registry = registry();
        assert_eq!(registry.select_model("poetry", 10).id, "large");
        assert_eq!(registry.select_model("", 0).id, "large");
    }

    #[test]
    fn test_oversized_input_returns_default() {
        let registry = registry();
        assert_eq!(registry.select_model("categorization", 1_000_000).id, "large");
    }

    #[test]
    fn test_default_must_be_declared() {
        let err = ModelRegistry::new(vec![ModelDescriptor::new("a", 1, 0.5, 1)], "b").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_substitute_for() {
        let registry = registry();
        assert_eq!(registry.substitute_for("large").unwrap().id, "small");
        // "tiny" declares none, falls back to the registry-wide substitute
        assert_eq!(registry.substitute_for("tiny").unwrap().id, "small");
        // Unknown models also get the registry-wide substitute
        assert_eq!(registry.substitute_for("mystery").unwrap().id, "small");
        // Never substitutes a model with itself
        assert!(registry.substitute_for("small").is_none());
    }

    #[test]
    fn test_resolve_prefers_overrides() {
        let registry = registry();
        let request = CompletionRequest::new("small", vec![ChatMessage::user("hi")]);
        let params = registry.resolve(&request, "small");
        assert_eq!(params.temperature, 0.8);
        assert_eq!(params.max_tokens, 2048);

        let request = request.with_temperature(0.1).with_max_tokens(64);
        let params = registry.resolve(&request, "small");
        assert_eq!(params.temperature, 0.1);
        assert_eq!(params.max_tokens, 64);
    }

    #[test]
    fn test_resolve_unknown_model_uses_builtin_defaults() {
        let registry = registry();
        let request = CompletionRequest::new("mystery", vec![ChatMessage::user("hi")]);
        let params = registry.resolve(&request, "mystery");
        assert_eq!(params.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(params.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_from_embedded_config() {
        let config = AppConfig::embedded().unwrap();
        let registry = ModelRegistry::from_config(&config).unwrap();
        assert_eq!(registry.default_model().id, "llama-4-scout-17b-16e-instruct");
        assert_eq!(
            registry.substitute_for("cerebras-1.3b").unwrap().id,
            "llama3.1-8b"
        );
        assert_eq!(
            registry.substitute_for("llama3.1-8b").unwrap().id,
            "cerebras-1.3b"
        );
    }
}
