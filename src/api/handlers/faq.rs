use crate::{
    AppState,
    types::{AppError, FaqRequest, FaqResponse, Result},
};
use axum::{
    Json,
    extract::{Path, State},
};

/// Answer a question about a completed run's report.
pub async fn ask(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Json(payload): Json<FaqRequest>,
) -> Result<Json<FaqResponse>> {
    if run_id.trim().is_empty() {
        return Err(AppError::InvalidInput("run id is required".to_string()));
    }
    let answer = state
        .coordinator
        .answer_question(&run_id, &payload.question)
        .await?;
    Ok(Json(FaqResponse { answer }))
}
