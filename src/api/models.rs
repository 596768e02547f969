//! Models listing endpoint handler.

use crate::api::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Models list response in OpenAI format.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelObject>,
}

/// Individual model object.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelObject {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

/// GET /<ns>/v1/models - The single configured backend model.
pub async fn handle(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    let backend = &state.config.backend;

    Json(ModelsResponse {
        object: "list".to_string(),
        data: vec![ModelObject {
            id: backend.model.clone(),
            object: "model".to_string(),
            created: 0,
            owned_by: backend.owned_by.clone(),
        }],
    })
}
