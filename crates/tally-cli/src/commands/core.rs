//! Shared command setup

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use tally_core::{
    parse_statement, AppConfig, Dispatcher, PromptLibrary, ProviderSet, StatementAnalyzer,
    StatementFormat, Transaction,
};

/// Load config from `--config`, else the data dir override, else built-in
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            AppConfig::load_from(path)
        }
        None => AppConfig::load(),
    }
    .context("Failed to load model configuration")?;

    debug!(
        models = config.models.len(),
        default_model = %config.default_model,
        "Loaded configuration"
    );
    Ok(config)
}

/// Analyzer over the configured providers (`TALLY_PROVIDER=mock` for offline)
pub fn build_analyzer(config_path: Option<&Path>) -> Result<StatementAnalyzer> {
    let config = load_config(config_path)?;
    let providers = ProviderSet::from_env(&config)?;
    let dispatcher = Dispatcher::from_config(&config, providers)?;
    Ok(StatementAnalyzer::new(
        Arc::new(dispatcher),
        PromptLibrary::new(),
    ))
}

/// Resolve `--format`, falling back to the file extension
pub fn resolve_format(file: &Path, format: Option<&str>) -> Result<StatementFormat> {
    match format {
        Some(f) => Ok(f.parse()?),
        None => Ok(StatementFormat::from_path(file)),
    }
}

/// Read and parse a statement file
pub fn load_statement(file: &Path, format: Option<&str>) -> Result<Vec<Transaction>> {
    let format = resolve_format(file, format)?;
    let content = fs::read_to_string(file)
        .with_context(|| format!("Failed to read statement: {}", file.display()))?;
    let transactions = parse_statement(format, &content)
        .with_context(|| format!("Failed to parse {} statement", format))?;

    if transactions.is_empty() {
        anyhow::bail!("No transactions found in {}", file.display());
    }

    debug!(count = transactions.len(), %format, "Loaded statement");
    Ok(transactions)
}
