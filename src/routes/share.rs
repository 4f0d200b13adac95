use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::error::Result;
use crate::models::PublicNoteResponse;
use crate::server::AppState;

pub fn create_share_routes() -> Router<AppState> {
    Router::new().route("/share/{token}", get(handle_get_share))
}

/// 公開リンクの閲覧（認証不要）。無効化・再生成済みのトークンは 404。
async fn handle_get_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<PublicNoteResponse>> {
    let note = state.public_link_service.resolve(&token).await?;
    Ok(Json(note))
}
