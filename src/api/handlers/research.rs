use crate::{
    AppState,
    types::{Result, RunOutcome, RunRequest},
};
use axum::{Json, extract::State};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Advance a run by one interaction.
///
/// The response is either the next clarifying question, the finished
/// preview and full reports, or a failure reason. Dropping the request
/// (client disconnect) cancels the run.
pub async fn create_run(
    State(state): State<AppState>,
    Json(payload): Json<RunRequest>,
) -> Result<Json<RunOutcome>> {
    let start = Instant::now();

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let outcome = state.coordinator.advance(payload, cancel).await?;

    info!(
        run_id = outcome.run_id(),
        duration_ms = start.elapsed().as_millis() as u64,
        "run advanced"
    );
    Ok(Json(outcome))
}
