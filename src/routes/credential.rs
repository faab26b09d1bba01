use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::app_state::AppState;
use crate::models::requests::{CredentialStatus, SaveCredentialRequest};
use crate::routes::ApiFailure;

/// GET /api/v1/credential: Whether a key resolves, and from where. Never
/// returns the key itself.
pub async fn credential_status(State(state): State<AppState>) -> Json<CredentialStatus> {
    let source = state.credential.read().await.source();
    Json(CredentialStatus {
        configured: source.is_some(),
        source,
        key_selection_requested: state.key_selection.is_requested(),
    })
}

/// PUT /api/v1/credential: Validate and persist a new key.
pub async fn save_credential(
    State(state): State<AppState>,
    Json(request): Json<SaveCredentialRequest>,
) -> Result<StatusCode, ApiFailure> {
    state.credential.write().await.save(&request.api_key).await?;
    state.key_selection.clear();
    Ok(StatusCode::NO_CONTENT)
}
