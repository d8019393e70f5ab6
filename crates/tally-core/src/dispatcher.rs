//! Completion dispatcher with pacing, caching and bounded fallback
//!
//! One `complete` call runs at most three provider attempts:
//!
//! 1. the requested model on the primary provider
//! 2. the same model on the secondary provider, when the model identifier
//!    matches the secondary pattern and a secondary is configured
//! 3. the registry's substitute model on the primary provider
//!
//! Each model is paced before its first attempt. Successful results are
//! stored in the injected cache under the request fingerprint.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::ai::parsing::completion_text;
use crate::ai::{CompletionRequest, CompletionResult, ModelListing, ProviderRequest, ProviderSet, SharedProvider};
use crate::cache::{CompletionCache, MemoryCache, NullCache};
use crate::config::{AppConfig, DispatchConfig};
use crate::error::{AttemptFailure, Error, Result};
use crate::pacing::{Clock, RatePacer, SystemClock};
use crate::registry::ModelRegistry;

/// Routes completion requests across providers
pub struct Dispatcher {
    primary: SharedProvider,
    secondary: Option<SharedProvider>,
    registry: Arc<ModelRegistry>,
    pacer: RatePacer,
    cache: Arc<dyn CompletionCache>,
    secondary_pattern: Regex,
    timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher with only a primary provider and no cache
    pub fn new(
        primary: SharedProvider,
        registry: Arc<ModelRegistry>,
        config: &DispatchConfig,
    ) -> Result<Self> {
        Ok(Self {
            primary,
            secondary: None,
            registry,
            pacer: RatePacer::new(config.min_interval(), Arc::new(SystemClock)),
            cache: Arc::new(NullCache),
            secondary_pattern: Regex::new(&config.secondary_pattern)?,
            timeout: config.timeout,
        })
    }

    pub fn with_secondary(mut self, provider: SharedProvider) -> Self {
        self.secondary = Some(provider);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CompletionCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the pacing clock (keeps the configured interval)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.pacer = RatePacer::new(self.pacer.min_interval(), clock);
        self
    }

    /// Build a dispatcher from configuration and a provider pair
    pub fn from_config(config: &AppConfig, providers: ProviderSet) -> Result<Self> {
        let registry = Arc::new(ModelRegistry::from_config(config)?);
        let mut dispatcher = Self::new(providers.primary, registry, &config.dispatch)?;

        if let Some(secondary) = providers.secondary {
            dispatcher = dispatcher.with_secondary(secondary);
        }
        if let Some(ttl) = config.dispatch.cache_ttl {
            dispatcher = dispatcher.with_cache(Arc::new(MemoryCache::new(ttl)));
        }

        Ok(dispatcher)
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn primary(&self) -> &SharedProvider {
        &self.primary
    }

    pub fn secondary(&self) -> Option<&SharedProvider> {
        self.secondary.as_ref()
    }

    /// Whether a failed primary attempt for `model` may be retried on the secondary
    pub fn is_secondary_eligible(&self, model: &str) -> bool {
        self.secondary.is_some() && self.secondary_pattern.is_match(model)
    }

    /// Run a completion through the fallback chain
    ///
    /// Fails with `ProviderUnavailable` only when every attempt failed; the
    /// error carries each attempt's provider, model and message in order.
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResult> {
        let fingerprint = request.fingerprint();
        if let Some(hit) = self.cache.get(&fingerprint) {
            debug!(model = %request.model, fingerprint = %fingerprint, "Completion cache hit");
            return Ok(hit);
        }

        let mut failures = Vec::new();

        let mut result = self
            .run_pipeline(&request, &request.model, true, &mut failures)
            .await;

        if result.is_none() {
            if let Some(substitute) = self.registry.substitute_for(&request.model) {
                warn!(
                    model = %request.model,
                    substitute = %substitute.id,
                    "Model failed, retrying with substitute"
                );
                result = self
                    .run_pipeline(&request, &substitute.id, false, &mut failures)
                    .await;
            }
        }

        match result {
            Some(result) => {
                info!(
                    requested = %request.model,
                    model = %result.model,
                    provider = %result.provider,
                    attempts = failures.len() + 1,
                    "Completion succeeded"
                );
                self.cache.put(&fingerprint, &result);
                Ok(result)
            }
            None => {
                warn!(model = %request.model, attempts = failures.len(), "All providers failed");
                Err(Error::ProviderUnavailable(failures))
            }
        }
    }

    /// Pace `model`, then try the primary and (if allowed) the secondary
    async fn run_pipeline(
        &self,
        request: &CompletionRequest,
        model: &str,
        allow_secondary: bool,
        failures: &mut Vec<AttemptFailure>,
    ) -> Option<CompletionResult> {
        self.pacer.pace(model).await;

        let params = self.registry.resolve(request, model);
        let wire = ProviderRequest {
            messages: request.messages.clone(),
            model: model.to_string(),
            temperature: Some(params.temperature),
            max_tokens: Some(params.max_tokens),
        };

        match self.attempt(&self.primary, &wire, failures).await {
            Some(result) => return Some(result),
            None if !allow_secondary => return None,
            None => {}
        }

        match self.secondary {
            Some(ref secondary) if self.secondary_pattern.is_match(model) => {
                warn!(model = %model, provider = %secondary.name(), "Primary failed, trying secondary");
                self.attempt(secondary, &wire, failures).await
            }
            _ => None,
        }
    }

    /// One provider call; failures are recorded rather than returned
    async fn attempt(
        &self,
        provider: &SharedProvider,
        wire: &ProviderRequest,
        failures: &mut Vec<AttemptFailure>,
    ) -> Option<CompletionResult> {
        match self.call(provider, wire).await {
            Ok(result) => Some(result),
            Err(err) => {
                warn!(provider = %provider.name(), model = %wire.model, error = %err, "Provider attempt failed");
                failures.push(AttemptFailure {
                    provider: provider.name().to_string(),
                    model: wire.model.clone(),
                    message: err.to_string(),
                });
                None
            }
        }
    }

    async fn call(&self, provider: &SharedProvider, wire: &ProviderRequest) -> Result<CompletionResult> {
        let payload = tokio::time::timeout(self.timeout, provider.chat_completion(wire))
            .await
            .map_err(|_| {
                Error::Transport(format!("request timed out after {:?}", self.timeout))
            })??;

        // A 200 without completion text is as useless as an error status
        completion_text(&payload)?;

        Ok(CompletionResult {
            payload,
            model: wire.model.clone(),
            provider: provider.name().to_string(),
        })
    }

    /// Query every configured provider's model listing
    ///
    /// Providers that fail are logged and left out.
    pub async fn list_models(&self) -> Vec<ModelListing> {
        let mut listings = Vec::new();

        for provider in std::iter::once(&self.primary).chain(self.secondary.iter()) {
            match tokio::time::timeout(self.timeout, provider.list_models()).await {
                Ok(Ok(models)) => listings.push(ModelListing {
                    provider: provider.name().to_string(),
                    models,
                }),
                Ok(Err(err)) => {
                    warn!(provider = %provider.name(), error = %err, "Failed to list models")
                }
                Err(_) => warn!(provider = %provider.name(), "Timed out listing models"),
            }
        }

        listings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{ChatMessage, CompletionProvider, MockProvider, MockReply};
    use crate::pacing::ManualClock;
    use crate::registry::ModelDescriptor;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    const CATEGORIES: &str = "{\"Groceries\": 85.5}";

    fn registry() -> Arc<ModelRegistry> {
        Arc::new(
            ModelRegistry::new(
                vec![
                    ModelDescriptor::new("llama-4-scout-17b-16e-instruct", 4096, 0.7, 4096)
                        .with_capabilities(&["categorization", "financial_analysis"])
                        .with_substitute("llama3.1-8b"),
                    ModelDescriptor::new("llama3.1-8b", 2048, 0.8, 2048)
                        .with_capabilities(&["categorization"])
                        .with_substitute("cerebras-1.3b"),
                    ModelDescriptor::new("cerebras-1.3b", 2048, 0.7, 2048),
                    ModelDescriptor::new("gpt-4o", 8192, 0.2, 1024),
                ],
                "llama-4-scout-17b-16e-instruct",
            )
            .unwrap()
            .with_fallback_substitute("llama3.1-8b"),
        )
    }

    fn config() -> DispatchConfig {
        DispatchConfig {
            timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    fn dispatcher(primary: &MockProvider, secondary: Option<&MockProvider>) -> (Dispatcher, ManualClock) {
        let clock = ManualClock::new();
        let mut dispatcher = Dispatcher::new(Arc::new(primary.clone()), registry(), &config())
            .unwrap()
            .with_clock(Arc::new(clock.clone()));
        if let Some(secondary) = secondary {
            dispatcher = dispatcher.with_secondary(Arc::new(secondary.clone()));
        }
        (dispatcher, clock)
    }

    fn request(model: &str) -> CompletionRequest {
        CompletionRequest::new(model, vec![ChatMessage::user("Categorize these transactions")])
    }

    /// Provider answering with a fixed payload after a delay
    struct StubProvider {
        delay: Duration,
        payload: Value,
    }

    #[async_trait]
    impl CompletionProvider for StubProvider {
        async fn chat_completion(&self, _request: &ProviderRequest) -> Result<Value> {
            tokio::time::sleep(self.delay).await;
            Ok(self.payload.clone())
        }

        async fn list_models(&self) -> Result<Vec<Value>> {
            Ok(vec![])
        }

        fn name(&self) -> &str {
            "stub"
        }

        fn host(&self) -> &str {
            "stub://"
        }
    }

    #[tokio::test]
    async fn test_primary_success_is_tagged() {
        let primary = MockProvider::always("openrouter", MockReply::Content(CATEGORIES.into()));
        let secondary = MockProvider::always("cerebras", MockReply::Content("{}".into()));
        let (dispatcher, _) = dispatcher(&primary, Some(&secondary));

        let result = dispatcher.complete(request("llama3.1-8b")).await.unwrap();
        assert_eq!(result.provider, "openrouter");
        assert_eq!(result.model, "llama3.1-8b");
        assert_eq!(result.content().unwrap(), CATEGORIES);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_secondary_answers_after_primary_error() {
        let primary = MockProvider::failing("openrouter", 500);
        let secondary = MockProvider::always("cerebras", MockReply::Content(CATEGORIES.into()));
        let (dispatcher, _) = dispatcher(&primary, Some(&secondary));

        let result = dispatcher.complete(request("llama3.1-8b")).await.unwrap();
        assert_eq!(result.provider, "cerebras");
        assert_eq!(result.model, "llama3.1-8b");
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.requests()[0].messages, request("x").messages);
    }

    #[tokio::test]
    async fn test_exhausted_chain_makes_exactly_three_attempts() {
        let primary = MockProvider::failing("openrouter", 500);
        let secondary = MockProvider::always("cerebras", MockReply::Transport("refused".into()));
        let (dispatcher, _) = dispatcher(&primary, Some(&secondary));

        let err = dispatcher.complete(request("llama3.1-8b")).await.unwrap_err();
        let attempts = match err {
            Error::ProviderUnavailable(attempts) => attempts,
            other => panic!("expected ProviderUnavailable, got {:?}", other),
        };

        assert_eq!(primary.calls() + secondary.calls(), 3);
        let chain: Vec<_> = attempts
            .iter()
            .map(|a| (a.provider.as_str(), a.model.as_str()))
            .collect();
        assert_eq!(
            chain,
            vec![
                ("openrouter", "llama3.1-8b"),
                ("cerebras", "llama3.1-8b"),
                ("openrouter", "cerebras-1.3b"),
            ]
        );
        assert!(attempts[1].message.contains("refused"));
    }

    #[tokio::test]
    async fn test_ineligible_model_skips_secondary() {
        let primary = MockProvider::new("openrouter")
            .then(MockReply::Status(429, "rate limited".into()))
            .then(MockReply::Content(CATEGORIES.into()));
        let secondary = MockProvider::always("cerebras", MockReply::Content("{}".into()));
        let (dispatcher, _) = dispatcher(&primary, Some(&secondary));

        assert!(!dispatcher.is_secondary_eligible("gpt-4o"));
        let result = dispatcher.complete(request("gpt-4o")).await.unwrap();
        assert_eq!(result.provider, "openrouter");
        assert_eq!(result.model, "llama3.1-8b");
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_secondary_configured() {
        let primary = MockProvider::failing("openrouter", 503);
        let (dispatcher, _) = dispatcher(&primary, None);

        assert!(!dispatcher.is_secondary_eligible("llama3.1-8b"));
        let err = dispatcher.complete(request("llama3.1-8b")).await.unwrap_err();
        assert!(matches!(err, Error::ProviderUnavailable(ref a) if a.len() == 2));
        assert_eq!(primary.calls(), 2);
    }

    #[tokio::test]
    async fn test_substitute_never_uses_secondary() {
        // The substitute matches the secondary pattern but only gets the primary
        let primary = MockProvider::failing("openrouter", 500);
        let secondary = MockProvider::failing("cerebras", 500);
        let (dispatcher, _) = dispatcher(&primary, Some(&secondary));

        let err = dispatcher.complete(request("gpt-4o")).await.unwrap_err();
        assert!(matches!(err, Error::ProviderUnavailable(ref a) if a.len() == 2));
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_completion_counts_as_failure() {
        let empty = StubProvider {
            delay: Duration::ZERO,
            payload: json!({"choices": []}),
        };
        let secondary = MockProvider::always("cerebras", MockReply::Content(CATEGORIES.into()));
        let dispatcher = Dispatcher::new(Arc::new(empty), registry(), &config())
            .unwrap()
            .with_secondary(Arc::new(secondary.clone()))
            .with_clock(Arc::new(ManualClock::new()));

        let result = dispatcher.complete(request("cerebras-1.3b")).await.unwrap();
        assert_eq!(result.provider, "cerebras");
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let secondary = MockProvider::always("cerebras", MockReply::Content(CATEGORIES.into()));
        let config = DispatchConfig {
            timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let stalled = StubProvider {
            delay: Duration::from_secs(30),
            payload: json!({}),
        };
        let dispatcher = Dispatcher::new(Arc::new(stalled), registry(), &config)
            .unwrap()
            .with_secondary(Arc::new(secondary.clone()))
            .with_clock(Arc::new(ManualClock::new()));

        let result = dispatcher.complete(request("llama3.1-8b")).await.unwrap();
        assert_eq!(result.provider, "cerebras");
    }

    #[tokio::test]
    async fn test_consecutive_calls_are_paced() {
        let primary = MockProvider::always("openrouter", MockReply::Content(CATEGORIES.into()));
        let (dispatcher, clock) = dispatcher(&primary, None);

        dispatcher.complete(request("llama3.1-8b")).await.unwrap();
        dispatcher
            .complete(request("llama3.1-8b").with_temperature(0.1))
            .await
            .unwrap();

        assert_eq!(clock.sleeps(), vec![Duration::from_secs(6)]);
        assert!(clock.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_other_models_are_not_paced() {
        let primary = MockProvider::always("openrouter", MockReply::Content(CATEGORIES.into()));
        let (dispatcher, clock) = dispatcher(&primary, None);

        dispatcher.complete(request("llama3.1-8b")).await.unwrap();
        dispatcher.complete(request("gpt-4o")).await.unwrap();

        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_identical_calls_yield_identical_payloads() {
        let primary = MockProvider::always("openrouter", MockReply::Content(CATEGORIES.into()));
        let (dispatcher, _) = dispatcher(&primary, None);

        let first = dispatcher.complete(request("llama3.1-8b")).await.unwrap();
        let second = dispatcher.complete(request("llama3.1-8b")).await.unwrap();
        assert_eq!(first.payload, second.payload);
        assert_eq!(primary.calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_provider() {
        let primary = MockProvider::always("openrouter", MockReply::Content(CATEGORIES.into()));
        let clock = ManualClock::new();
        let dispatcher = Dispatcher::new(Arc::new(primary.clone()), registry(), &config())
            .unwrap()
            .with_clock(Arc::new(clock.clone()))
            .with_cache(Arc::new(MemoryCache::with_clock(
                Duration::from_secs(3600),
                Arc::new(clock.clone()),
            )));

        let first = dispatcher.complete(request("llama3.1-8b")).await.unwrap();
        let second = dispatcher.complete(request("llama3.1-8b")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(primary.calls(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_resolved_parameters_are_sent() {
        let primary = MockProvider::always("openrouter", MockReply::Content(CATEGORIES.into()));
        let (dispatcher, _) = dispatcher(&primary, None);

        dispatcher.complete(request("llama3.1-8b")).await.unwrap();
        dispatcher
            .complete(request("gpt-4o").with_max_tokens(64))
            .await
            .unwrap();

        let sent = primary.requests();
        assert_eq!(sent[0].temperature, Some(0.8));
        assert_eq!(sent[0].max_tokens, Some(2048));
        assert_eq!(sent[1].temperature, Some(0.2));
        assert_eq!(sent[1].max_tokens, Some(64));
    }

    #[tokio::test]
    async fn test_list_models_skips_failing_provider() {
        let primary = MockProvider::new("openrouter");
        let secondary = MockProvider::failing("cerebras", 401);
        let (dispatcher, _) = dispatcher(&primary, Some(&secondary));

        let listings = dispatcher.list_models().await;
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].provider, "openrouter");
        assert_eq!(listings[0].models[0]["id"], "openrouter-mock");
    }

    #[tokio::test]
    async fn test_from_embedded_config() {
        let config = AppConfig::embedded().unwrap();
        let dispatcher = Dispatcher::from_config(&config, ProviderSet::mock(&config)).unwrap();

        assert_eq!(dispatcher.primary().name(), "openrouter");
        assert!(dispatcher.is_secondary_eligible("llama3.1-8b"));
        assert!(dispatcher.is_secondary_eligible("cerebras-1.3b"));
        assert!(!dispatcher.is_secondary_eligible("gpt-4o"));
    }
}
