use axum::{Json, Router, extract::State, routing::post};
use axum_extra::extract::WithRejection;

use crate::auth::ClientIp;
use crate::error::{AppError, Result};
use crate::models::{GenerateSummaryRequest, GeneratedSummary};
use crate::server::AppState;

pub fn create_ai_routes() -> Router<AppState> {
    Router::new().route("/ai/generate-summary", post(handle_generate_summary))
}

// 未ログインでも利用可能（IP単位でレート制限）
async fn handle_generate_summary(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    WithRejection(Json(req), _): WithRejection<Json<GenerateSummaryRequest>, AppError>,
) -> Result<Json<GeneratedSummary>> {
    let summary = state
        .summary_service
        .generate(&client_ip, &req.original_content)
        .await?;
    Ok(Json(summary))
}
