//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Shared setup (config, analyzer, statement loading)
//! - `statements` - Offline commands (parse, summary)
//! - `analysis` - Model-backed commands (categorize, analyze)
//! - `models` - Registry and provider listings
//! - `serve` - Web server command

pub mod analysis;
pub mod core;
pub mod models;
pub mod serve;
pub mod statements;

// Re-export command functions for main.rs
pub use analysis::*;
pub use core::*;
pub use models::*;
pub use serve::*;
pub use statements::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
