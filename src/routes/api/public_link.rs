use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::models::{PublicLinkResponse, UpdatePublicLinkRequest};
use crate::server::AppState;

pub fn create_public_link_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/notes/{id}/public-link",
            get(handle_get_link)
                .post(handle_create_link)
                .patch(handle_update_link)
                .delete(handle_delete_link),
        )
        .route("/notes/{id}/public-link/rotate", post(handle_rotate_link))
}

async fn handle_get_link(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(note_id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<Json<PublicLinkResponse>> {
    let link = state.public_link_service.get(user.user_id, note_id).await?;
    Ok(Json(link))
}

// 新規作成は 201、既存リンクの再有効化は 200
async fn handle_create_link(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(note_id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<(StatusCode, Json<PublicLinkResponse>)> {
    let (link, created) = state
        .public_link_service
        .create_or_enable(user.user_id, note_id)
        .await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(link)))
}

async fn handle_update_link(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(note_id), _): WithRejection<Path<Uuid>, AppError>,
    WithRejection(Json(req), _): WithRejection<Json<UpdatePublicLinkRequest>, AppError>,
) -> Result<Json<PublicLinkResponse>> {
    let link = state
        .public_link_service
        .set_enabled(user.user_id, note_id, req.is_enabled)
        .await?;
    Ok(Json(link))
}

async fn handle_rotate_link(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(note_id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<Json<PublicLinkResponse>> {
    let link = state
        .public_link_service
        .rotate(user.user_id, note_id)
        .await?;
    Ok(Json(link))
}

async fn handle_delete_link(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(note_id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<StatusCode> {
    state
        .public_link_service
        .delete(user.user_id, note_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
