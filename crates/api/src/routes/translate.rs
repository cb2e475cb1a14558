use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateResponse {
    pub translated_text: String,
}

/// Synchronous ko→en quick translation.
pub async fn translate_ko_en(
    State(state): State<AppState>,
    Json(payload): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let text = payload.text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("text is required".to_string()));
    }
    let translated = state
        .translator
        .translate_reverse(text)
        .await
        .map_err(|error| {
            warn!(%error, "Quick translation failed");
            ApiError::Internal("Translation failed".to_string())
        })?;
    Ok(Json(TranslateResponse {
        translated_text: translated,
    }))
}
