use axum::{Json, Router, extract::State, http::StatusCode, routing::delete};
use axum_extra::extract::{CookieJar, WithRejection};

use crate::auth::{AuthUser, clear_auth_cookies};
use crate::error::{AppError, Result};
use crate::models::DeleteAccountRequest;
use crate::server::AppState;

pub fn create_account_routes() -> Router<AppState> {
    Router::new().route("/user", delete(handle_delete_account))
}

/// アカウントと関連データをすべて削除する（パスワード確認あり）
async fn handle_delete_account(
    State(state): State<AppState>,
    user: AuthUser,
    jar: CookieJar,
    WithRejection(Json(req), _): WithRejection<Json<DeleteAccountRequest>, AppError>,
) -> Result<(StatusCode, CookieJar)> {
    state
        .auth_service
        .delete_account(user.user_id, &req.password)
        .await?;
    Ok((StatusCode::NO_CONTENT, clear_auth_cookies(jar)))
}
