//! Categorization and savings analysis handlers
//!
//! Provider outages surface as 503 and unparseable model replies as 502, so
//! clients can treat both as retry-later.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use tally_core::{CategoryTotals, StatementReport, Transaction};

use crate::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub transactions: Vec<Transaction>,
    /// Explicit model; the registry picks one when absent
    #[serde(default)]
    pub model_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CategorizeResponse {
    pub categories: CategoryTotals,
    pub model: String,
    pub provider: String,
}

/// POST /api/categorize
pub async fn categorize(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<CategorizeResponse>, AppError> {
    let answered = state
        .analyzer
        .categorize(&req.transactions, req.model_name.as_deref())
        .await
        .map_err(AppError::from_core)?;

    Ok(Json(CategorizeResponse {
        categories: answered.value,
        model: answered.model,
        provider: answered.provider,
    }))
}

/// POST /api/analyze
pub async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<StatementReport>, AppError> {
    let report = state
        .analyzer
        .analyze(&req.transactions, req.model_name.as_deref())
        .await
        .map_err(AppError::from_core)?;

    Ok(Json(report))
}
