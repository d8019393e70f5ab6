//! Statement analysis on top of the dispatcher
//!
//! Renders the analysis prompts, dispatches them and parses the replies into
//! category totals, advice and a savings matrix.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::ai::{parse_analysis, parse_categories, CompletionRequest};
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::models::{CategoryTotals, SpendingAnalysis, StatementReport, Transaction};
use crate::prompts::{PromptId, PromptLibrary};
use crate::statements::summarize;

/// Rough characters-per-token ratio used for model selection
const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of a prompt
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// One transaction per line, as shown to the model
pub fn format_transactions(transactions: &[Transaction]) -> String {
    transactions
        .iter()
        .map(Transaction::prompt_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// `Category: $total` lines for the advice prompt
pub fn format_categories(categories: &CategoryTotals) -> String {
    categories
        .iter()
        .map(|(name, total)| format!("{}: ${:.2}", name, total))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Categorization and advice for parsed statements
#[derive(Clone)]
pub struct StatementAnalyzer {
    dispatcher: Arc<Dispatcher>,
    prompts: PromptLibrary,
}

/// A parsed reply and the model that produced it
#[derive(Debug, Clone)]
pub struct Answered<T> {
    pub value: T,
    pub model: String,
    pub provider: String,
}

impl StatementAnalyzer {
    pub fn new(dispatcher: Arc<Dispatcher>, prompts: PromptLibrary) -> Self {
        Self {
            dispatcher,
            prompts,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Group transactions into category totals
    pub async fn categorize(
        &self,
        transactions: &[Transaction],
        model: Option<&str>,
    ) -> Result<Answered<CategoryTotals>> {
        require_transactions(transactions)?;

        let listing = format_transactions(transactions);
        let mut vars = HashMap::new();
        vars.insert("transactions", listing.as_str());

        let (text, model, provider) = self
            .run(PromptId::CategorizeTransactions, &vars, model)
            .await?;
        Ok(Answered {
            value: parse_categories(&text)?,
            model,
            provider,
        })
    }

    /// Advice and savings matrix, optionally informed by category totals
    pub async fn advise(
        &self,
        transactions: &[Transaction],
        categories: Option<&CategoryTotals>,
        model: Option<&str>,
    ) -> Result<Answered<SpendingAnalysis>> {
        require_transactions(transactions)?;

        let listing = format_transactions(transactions);
        let category_lines = categories.map(format_categories).unwrap_or_default();
        let mut vars = HashMap::new();
        vars.insert("transactions", listing.as_str());
        vars.insert("categories", category_lines.as_str());

        let (text, model, provider) = self.run(PromptId::SavingsAdvice, &vars, model).await?;
        Ok(Answered {
            value: parse_analysis(&text)?,
            model,
            provider,
        })
    }

    /// Summary, categories, advice and savings matrix for one statement
    pub async fn analyze(
        &self,
        transactions: &[Transaction],
        model: Option<&str>,
    ) -> Result<StatementReport> {
        let summary = summarize(transactions);
        let categories = self.categorize(transactions, model).await?;
        let analysis = self
            .advise(transactions, Some(&categories.value), model)
            .await?;

        info!(
            transactions = summary.total_transactions,
            categories = categories.value.len(),
            categorized_by = %categories.model,
            advised_by = %analysis.model,
            "Statement analyzed"
        );

        Ok(StatementReport {
            summary,
            categories: categories.value,
            advice: analysis.value.advice,
            savings_matrix: analysis.value.savings_matrix,
            categorized_by: categories.model,
            advised_by: analysis.model,
        })
    }

    /// Render, pick a model, dispatch; returns (completion text, model, provider)
    async fn run(
        &self,
        id: PromptId,
        vars: &HashMap<&str, &str>,
        model: Option<&str>,
    ) -> Result<(String, String, String)> {
        let prompt = self.prompts.get(id)?;
        let messages = prompt.messages(vars);

        let model = match model {
            Some(model) => model.to_string(),
            None => {
                let tokens: usize = messages
                    .iter()
                    .map(|m| estimate_tokens(&m.content))
                    .sum();
                let selected = self
                    .dispatcher
                    .registry()
                    .select_model(&prompt.metadata.task_type, tokens);
                debug!(prompt = id.as_str(), tokens, model = %selected.id, "Selected model");
                selected.id.clone()
            }
        };

        let result = self
            .dispatcher
            .complete(CompletionRequest::new(&model, messages))
            .await?;
        let text = result.content()?.to_string();

        Ok((text, result.model, result.provider))
    }
}

fn require_transactions(transactions: &[Transaction]) -> Result<()> {
    if transactions.is_empty() {
        return Err(Error::InvalidData("No transactions to analyze".into()));
    }
    Ok(())
}
