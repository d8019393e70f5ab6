//! Statement import and summary handlers

use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use tally_core::statements::{parse_statement as parse_content, summarize};
use tally_core::{StatementFormat, Transaction, TransactionSummary};

use crate::AppError;

#[derive(Debug, Deserialize)]
pub struct ParseStatementRequest {
    pub format: StatementFormat,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ParseStatementResponse {
    pub count: usize,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsRequest {
    pub transactions: Vec<Transaction>,
}

/// POST /api/statements/parse
pub async fn parse_statement(
    Json(req): Json<ParseStatementRequest>,
) -> Result<Json<ParseStatementResponse>, AppError> {
    if req.content.trim().is_empty() {
        return Err(AppError::bad_request("Statement content is empty"));
    }

    let transactions = parse_content(req.format, &req.content).map_err(AppError::from_core)?;
    info!(
        format = %req.format,
        count = transactions.len(),
        "Parsed statement"
    );

    Ok(Json(ParseStatementResponse {
        count: transactions.len(),
        transactions,
    }))
}

/// POST /api/statements/summary
pub async fn summarize_statement(
    Json(req): Json<TransactionsRequest>,
) -> Json<TransactionSummary> {
    Json(summarize(&req.transactions))
}
