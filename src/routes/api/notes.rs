use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::models::{CreateNoteRequest, NoteDetail, NoteList, NoteListQuery, UpdateNoteRequest};
use crate::server::AppState;

pub fn create_notes_routes() -> Router<AppState> {
    Router::new()
        .route("/notes", get(handle_list_notes).post(handle_create_note))
        .route(
            "/notes/{id}",
            get(handle_get_note)
                .patch(handle_update_note)
                .delete(handle_delete_note),
        )
}

async fn handle_list_notes(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Query(query), _): WithRejection<Query<NoteListQuery>, AppError>,
) -> Result<Json<NoteList>> {
    let list = state.note_service.list(user.user_id, query).await?;
    Ok(Json(list))
}

async fn handle_create_note(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Json(req), _): WithRejection<Json<CreateNoteRequest>, AppError>,
) -> Result<(StatusCode, Json<NoteDetail>)> {
    let note = state.note_service.create(user.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

async fn handle_get_note(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(note_id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<Json<NoteDetail>> {
    let note = state.note_service.get(user.user_id, note_id).await?;
    Ok(Json(note))
}

async fn handle_update_note(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(note_id), _): WithRejection<Path<Uuid>, AppError>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateNoteRequest>, AppError>,
) -> Result<Json<NoteDetail>> {
    let note = state.note_service.update(user.user_id, note_id, req).await?;
    Ok(Json(note))
}

async fn handle_delete_note(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(note_id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<StatusCode> {
    state.note_service.delete(user.user_id, note_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
