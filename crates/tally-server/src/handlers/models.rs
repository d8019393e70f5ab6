//! Model registry and provider listings

use axum::{extract::State, Json};
use serde::Serialize;

use tally_core::{ModelDescriptor, ModelListing};

use crate::AppState;

#[derive(Serialize)]
pub struct ModelsResponse {
    /// Model used when task selection finds no match
    pub default_model: String,
    /// Registry in declaration order
    pub registry: Vec<ModelDescriptor>,
    /// Live `GET /models` results; unreachable providers are omitted
    pub providers: Vec<ModelListing>,
}

/// GET /api/models
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let dispatcher = state.analyzer.dispatcher();
    let registry = dispatcher.registry();

    Json(ModelsResponse {
        default_model: registry.default_model().id.clone(),
        registry: registry.models().to_vec(),
        providers: dispatcher.list_models().await,
    })
}
