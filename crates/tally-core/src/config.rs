//! Registry, dispatch and provider configuration
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/tally/config/models.toml)
//!    or an explicit path
//! 2. Fall back to embedded defaults (compiled into binary)

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::registry::{ModelDescriptor, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/models.toml");

/// Pacing, timeout and fallback settings for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Requests per minute allowed per model identifier (0 disables pacing)
    pub requests_per_minute: u32,
    /// Timeout for a single provider attempt
    pub timeout: Duration,
    /// Models matching this regex may be retried against the secondary provider
    pub secondary_pattern: String,
    /// How long completions stay cached (None disables caching)
    pub cache_ttl: Option<Duration>,
}

impl DispatchConfig {
    /// Minimum spacing between two dispatches to the same model
    pub fn min_interval(&self) -> Duration {
        if self.requests_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(60.0 / f64::from(self.requests_per_minute))
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 10,
            timeout: Duration::from_secs(30),
            secondary_pattern: "(?i)^(cerebras|llama)".to_string(),
            cache_ttl: None,
        }
    }
}

/// Connection settings for one hosted provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Short name used in logs and results (e.g. "openrouter")
    pub name: String,
    /// Base URL; `/chat/completions` and `/models` are appended
    pub base_url: String,
    /// Environment variable holding the bearer token
    pub api_key_env: Option<String>,
    /// Application name sent as `X-App-Name`
    pub app_name: Option<String>,
}

impl ProviderConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
    }
}

/// Full application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Descriptor returned when selection finds no match
    pub default_model: String,
    /// Substitute for models that declare none of their own
    pub substitute_model: Option<String>,
    /// Registry, in declaration order
    pub models: Vec<ModelDescriptor>,
    pub dispatch: DispatchConfig,
    pub primary: ProviderConfig,
    pub secondary: Option<ProviderConfig>,
}

impl AppConfig {
    /// Load from the default override location, falling back to the embedded config
    pub fn load() -> Result<Self> {
        load_config(None)
    }

    /// Load from an explicit override path (embedded config if it does not exist)
    pub fn load_from(path: &Path) -> Result<Self> {
        load_config(Some(path))
    }

    /// The embedded default configuration
    pub fn embedded() -> Result<Self> {
        parse_config(DEFAULT_CONFIG)
    }

    /// Parse configuration from TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("config").join("models.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<AppConfig> {
    let candidate = match override_path {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path(),
    };

    let content = match candidate {
        Some(path) if path.exists() => {
            tracing::debug!(path = %path.display(), "Loading config override");
            fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?
        }
        _ => DEFAULT_CONFIG.to_string(),
    };

    parse_config(&content)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    defaults: Option<RawDefaults>,
    #[serde(default)]
    models: Vec<RawModel>,
    providers: Option<RawProviders>,
}

#[derive(Debug, Deserialize)]
struct RawDefaults {
    model: Option<String>,
    substitute_model: Option<String>,
    timeout_secs: Option<u64>,
    requests_per_minute: Option<u32>,
    secondary_pattern: Option<String>,
    cache_ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawModel {
    id: String,
    max_input_tokens: Option<usize>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    #[serde(default)]
    capabilities: Vec<String>,
    substitute: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawProviders {
    primary: Option<RawProvider>,
    secondary: Option<RawProvider>,
}

#[derive(Debug, Deserialize)]
struct RawProvider {
    name: String,
    base_url: String,
    api_key_env: Option<String>,
    app_name: Option<String>,
}

impl From<RawProvider> for ProviderConfig {
    fn from(raw: RawProvider) -> Self {
        Self {
            name: raw.name,
            base_url: raw.base_url.trim_end_matches('/').to_string(),
            api_key_env: raw.api_key_env,
            app_name: raw.app_name,
        }
    }
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<AppConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut dispatch = DispatchConfig::default();
    let mut default_model = None;
    let mut substitute_model = None;

    if let Some(defaults) = raw.defaults {
        default_model = defaults.model;
        substitute_model = defaults.substitute_model;
        if let Some(timeout) = defaults.timeout_secs {
            if timeout == 0 {
                return Err(Error::Config("timeout_secs must be at least 1".into()));
            }
            dispatch.timeout = Duration::from_secs(timeout);
        }
        if let Some(rpm) = defaults.requests_per_minute {
            dispatch.requests_per_minute = rpm;
        }
        if let Some(pattern) = defaults.secondary_pattern {
            dispatch.secondary_pattern = pattern;
        }
        dispatch.cache_ttl = defaults
            .cache_ttl_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
    }

    let mut seen = BTreeSet::new();
    let mut models = Vec::with_capacity(raw.models.len());
    for model in raw.models {
        if !seen.insert(model.id.clone()) {
            return Err(Error::Config(format!("Duplicate model id: {}", model.id)));
        }
        let mut descriptor = ModelDescriptor::new(
            &model.id,
            model.max_input_tokens.unwrap_or(DEFAULT_MAX_TOKENS as usize),
            model.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            model.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        );
        descriptor.capabilities = model.capabilities.into_iter().collect();
        descriptor.substitute = model.substitute;
        models.push(descriptor);
    }

    for model in &models {
        if let Some(ref substitute) = model.substitute {
            require_declared(&seen, substitute, &format!("Substitute of '{}'", model.id))?;
        }
    }
    if let Some(ref substitute) = substitute_model {
        require_declared(&seen, substitute, "Default substitute model")?;
    }

    let default_model = default_model
        .or_else(|| models.first().map(|m| m.id.clone()))
        .ok_or_else(|| Error::Config("No models declared and no default model set".into()))?;

    let (primary, secondary) = match raw.providers {
        Some(providers) => (
            providers
                .primary
                .map(ProviderConfig::from)
                .ok_or_else(|| Error::Config("Missing [providers.primary]".into()))?,
            providers.secondary.map(ProviderConfig::from),
        ),
        None => return Err(Error::Config("Missing [providers] section".into())),
    };

    // Fail fast on a bad pattern rather than at first dispatch
    regex::Regex::new(&dispatch.secondary_pattern)?;

    Ok(AppConfig {
        default_model,
        substitute_model,
        models,
        dispatch,
        primary,
        secondary,
    })
}

fn require_declared(declared: &BTreeSet<String>, id: &str, what: &str) -> Result<()> {
    if declared.contains(id) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{} '{}' is not declared in the registry",
            what, id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[[models]]
id = "only-model"
capabilities = ["categorization"]

[providers.primary]
name = "local"
base_url = "http://localhost:8080/v1/"
"#;

    #[test]
    fn test_parse_default_config() {
        let config = AppConfig::embedded().unwrap();
        assert_eq!(config.default_model, "llama-4-scout-17b-16e-instruct");
        assert_eq!(config.substitute_model.as_deref(), Some("llama3.1-8b"));
        assert_eq!(config.models.len(), 3);
        assert_eq!(config.primary.name, "openrouter");
        assert_eq!(config.secondary.as_ref().unwrap().name, "cerebras");
        assert_eq!(config.dispatch.timeout, Duration::from_secs(30));
        assert_eq!(config.dispatch.requests_per_minute, 10);
        assert!(config.dispatch.cache_ttl.is_none());
    }

    #[test]
    fn test_declaration_order_is_preserved() {
        let config = AppConfig::embedded().unwrap();
        let ids: Vec<_> = config.models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["llama-4-scout-17b-16e-instruct", "llama3.1-8b", "cerebras-1.3b"]
        );
    }

    #[test]
    fn test_minimal_config_uses_builtin_defaults() {
        let config = AppConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.default_model, "only-model");
        assert!(config.secondary.is_none());
        assert_eq!(config.primary.base_url, "http://localhost:8080/v1");

        let model = &config.models[0];
        assert_eq!(model.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(model.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(model.supports("categorization"));
    }

    #[test]
    fn test_min_interval() {
        let dispatch = DispatchConfig {
            requests_per_minute: 10,
            ..Default::default()
        };
        assert_eq!(dispatch.min_interval(), Duration::from_secs(6));

        let unpaced = DispatchConfig {
            requests_per_minute: 0,
            ..Default::default()
        };
        assert_eq!(unpaced.min_interval(), Duration::ZERO);
    }

    #[test]
    fn test_cache_ttl_zero_disables() {
        let content = format!("[defaults]\ncache_ttl_secs = 0\n{}", MINIMAL);
        assert!(AppConfig::from_toml(&content).unwrap().dispatch.cache_ttl.is_none());

        let content = format!("[defaults]\ncache_ttl_secs = 3600\n{}", MINIMAL);
        assert_eq!(
            AppConfig::from_toml(&content).unwrap().dispatch.cache_ttl,
            Some(Duration::from_secs(3600))
        );
    }

    #[test]
    fn test_rejects_duplicate_models() {
        let content = r#"
[[models]]
id = "twice"

[[models]]
id = "twice"

[providers.primary]
name = "local"
base_url = "http://localhost:8080/v1"
"#;
        let err = AppConfig::from_toml(content).unwrap_err();
        assert!(err.to_string().contains("Duplicate model id"));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let content = format!("[defaults]\ntimeout_secs = 0\n{}", MINIMAL);
        let err = AppConfig::from_toml(&content).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn test_rejects_undeclared_substitutes() {
        let content = format!("[defaults]\nsubstitute_model = \"lama3.1-8b\"\n{}", MINIMAL);
        let err = AppConfig::from_toml(&content).unwrap_err();
        assert!(err.to_string().contains("'lama3.1-8b' is not declared"));

        let content = r#"
[[models]]
id = "big"
substitute = "smal"

[[models]]
id = "small"

[providers.primary]
name = "local"
base_url = "http://localhost:8080/v1"
"#;
        let err = AppConfig::from_toml(content).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("Substitute of 'big'"));
    }

    #[test]
    fn test_rejects_missing_primary() {
        let err = AppConfig::from_toml("[[models]]\nid = \"m\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_bad_secondary_pattern() {
        let content = format!("[defaults]\nsecondary_pattern = \"(unclosed\"\n{}", MINIMAL);
        assert!(matches!(
            AppConfig::from_toml(&content).unwrap_err(),
            Error::Regex(_)
        ));
    }

    #[test]
    fn test_load_from_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.toml");
        fs::write(&path, MINIMAL).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_model, "only-model");
    }

    #[test]
    fn test_load_from_missing_file_uses_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.models.len(), 3);
    }
}
