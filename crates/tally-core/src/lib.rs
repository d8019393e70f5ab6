//! Tally Core Library
//!
//! Shared functionality for the tally bank statement analyzer:
//! - Model registry for task-based model selection
//! - Completion dispatcher with per-model pacing, caching and provider fallback
//! - OpenAI-compatible hosted providers (OpenRouter, Cerebras) and a mock
//! - Strict structured parsing of model replies
//! - CSV and statement-text import
//! - Prompt library and statement analysis (categories, advice, savings matrix)

pub mod ai;
pub mod analysis;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod pacing;
pub mod prompts;
pub mod registry;
pub mod statements;

/// Test utilities including mock provider server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    parse_analysis, parse_categories, parse_structured, ChatMessage, CompletionProvider,
    CompletionRequest, CompletionResult, MockProvider, MockReply, ModelListing,
    OpenAICompatibleProvider, ProviderRequest, ProviderSet, Role, SharedProvider,
    StructuredPayload,
};
pub use analysis::{Answered, StatementAnalyzer};
pub use cache::{CompletionCache, MemoryCache, NullCache};
pub use config::{AppConfig, DispatchConfig, ProviderConfig};
pub use dispatcher::Dispatcher;
pub use error::{AttemptFailure, Error, Result};
pub use models::{
    CategoryTotals, KindTotals, SavingsMatrix, SavingsStrategy, SpendingAnalysis, SAVINGS_STRATEGIES,
    StatementReport, Transaction, TransactionKind, TransactionSummary,
};
pub use pacing::{Clock, ManualClock, RatePacer, SystemClock};
pub use prompts::{Prompt, PromptId, PromptLibrary};
pub use registry::{ModelDescriptor, ModelRegistry, ResolvedParams, TaskType};
pub use statements::{extract_from_text, parse_csv, parse_statement, summarize, StatementFormat};
