//! Domain models for statements and analysis results

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Direction of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money leaving the account
    Debit,
    /// Money entering the account
    Credit,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }

    /// Kind implied by the sign of a statement amount
    pub fn from_signed(amount: f64) -> Self {
        if amount < 0.0 {
            Self::Debit
        } else {
            Self::Credit
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "debit" | "dr" | "sale" | "withdrawal" | "purchase" | "payment" | "fee" => {
                Ok(Self::Debit)
            }
            "credit" | "cr" | "deposit" | "refund" | "return" => Ok(Self::Credit),
            _ => Err(Error::InvalidData(format!("Unknown transaction type: {}", s))),
        }
    }
}

/// A single statement line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub description: String,
    /// Always non-negative; direction lives in `kind`
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
}

impl Transaction {
    pub fn new(date: NaiveDate, description: &str, amount: f64, kind: TransactionKind) -> Self {
        Self {
            date,
            description: description.trim().to_string(),
            amount: amount.abs(),
            kind,
        }
    }

    /// Build from a signed amount (negative = debit)
    pub fn from_signed(date: NaiveDate, description: &str, amount: f64) -> Self {
        Self::new(date, description, amount, TransactionKind::from_signed(amount))
    }

    /// One-line rendering used in prompts: `2025-01-15: Grocery Store - $85.50 (debit)`
    pub fn prompt_line(&self) -> String {
        format!(
            "{}: {} - ${:.2} ({})",
            self.date, self.description, self.amount, self.kind
        )
    }
}

/// Count and total for one direction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindTotals {
    pub count: usize,
    pub total_amount: f64,
}

/// Debit/credit breakdown of a statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub total_transactions: usize,
    pub debits: KindTotals,
    pub credits: KindTotals,
}

impl TransactionSummary {
    /// Credits minus debits
    pub fn net(&self) -> f64 {
        self.credits.total_amount - self.debits.total_amount
    }
}

/// Category name to total amount
pub type CategoryTotals = BTreeMap<String, f64>;

/// One row of the savings matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsStrategy {
    pub monthly_savings: f64,
    pub annual_savings: f64,
    /// Projected return, in percent
    pub roi_projection: f64,
}

/// Strategy name (conservative, moderate, aggressive) to projections
pub type SavingsMatrix = BTreeMap<String, SavingsStrategy>;

/// Rows every savings matrix must have, and the only ones it may have
pub const SAVINGS_STRATEGIES: [&str; 3] = ["conservative", "moderate", "aggressive"];

/// Advice and savings matrix returned by the financial analysis prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendingAnalysis {
    pub advice: String,
    pub savings_matrix: SavingsMatrix,
}

/// Everything produced for one analyzed statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementReport {
    pub summary: TransactionSummary,
    pub categories: CategoryTotals,
    pub advice: String,
    pub savings_matrix: SavingsMatrix,
    /// Model that produced the categories
    pub categorized_by: String,
    /// Model that produced the advice
    pub advised_by: String,
}
