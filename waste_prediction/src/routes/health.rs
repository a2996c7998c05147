use crate::{model_service::ModelService, server::SharedState};
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub model_loaded: bool,
}

#[derive(Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

pub async fn healthcheck<M: ModelService>(State(state): State<SharedState<M>>) -> Json<HealthStatus> {
    let model_loaded = state.classifier.is_ready();
    let status = if model_loaded { "healthy" } else { "degraded" };

    Json(HealthStatus {
        status: status.into(),
        model_loaded,
    })
}

pub async fn connectivity() -> Json<Message> {
    Json(Message {
        message: "API is working!".into(),
    })
}
