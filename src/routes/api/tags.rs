use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, patch},
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::models::{
    CreateTagRequest, GrantAccessRequest, RecipientList, RecipientResponse, TagList, TagResponse,
    UpdateTagRequest,
};
use crate::server::AppState;

pub fn create_tags_routes() -> Router<AppState> {
    Router::new()
        .route("/tags", get(handle_get_tag_list).post(handle_create_tag))
        .route(
            "/tags/{id}",
            patch(handle_update_tag).delete(handle_delete_tag),
        )
        .route(
            "/tags/{id}/access",
            get(handle_list_recipients).post(handle_grant_access),
        )
        .route(
            "/tags/{id}/access/{recipient_id}",
            delete(handle_revoke_access),
        )
}

//// ハンドラ関数
async fn handle_get_tag_list(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<TagList>> {
    Ok(Json(state.tag_service.list(user.user_id).await?))
}

async fn handle_create_tag(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Json(req), _): WithRejection<Json<CreateTagRequest>, AppError>,
) -> Result<(StatusCode, Json<TagResponse>)> {
    let tag = state.tag_service.create(user.user_id, &req.name).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

async fn handle_update_tag(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(tag_id), _): WithRejection<Path<Uuid>, AppError>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateTagRequest>, AppError>,
) -> Result<Json<TagResponse>> {
    let tag = state
        .tag_service
        .rename(user.user_id, tag_id, &req.name)
        .await?;
    Ok(Json(tag))
}

async fn handle_delete_tag(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(tag_id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<StatusCode> {
    state.tag_service.delete(user.user_id, tag_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

//// 共有設定
async fn handle_list_recipients(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(tag_id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<Json<RecipientList>> {
    let recipients = state
        .tag_service
        .list_recipients(user.user_id, tag_id)
        .await?;
    Ok(Json(recipients))
}

async fn handle_grant_access(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(tag_id), _): WithRejection<Path<Uuid>, AppError>,
    WithRejection(Json(req), _): WithRejection<Json<GrantAccessRequest>, AppError>,
) -> Result<(StatusCode, Json<RecipientResponse>)> {
    let recipient = state
        .tag_service
        .grant_access(user.user_id, tag_id, &req.recipient_email)
        .await?;
    Ok((StatusCode::CREATED, Json(recipient)))
}

async fn handle_revoke_access(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path((tag_id, recipient_id)), _): WithRejection<Path<(Uuid, Uuid)>, AppError>,
) -> Result<StatusCode> {
    state
        .tag_service
        .revoke_access(user.user_id, tag_id, recipient_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
