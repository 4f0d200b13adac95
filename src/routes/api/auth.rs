use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use axum_extra::extract::{CookieJar, WithRejection};

use crate::auth::{
    ACCESS_TOKEN_COOKIE, AuthUser, REFRESH_TOKEN_COOKIE, access_cookie, bearer_token,
    ClientIp, clear_auth_cookies, refresh_cookie,
};
use crate::error::{AppError, Result};
use crate::messages;
use crate::models::{
    AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse, RegisterRequest,
    ResetPasswordRequest, UserResponse,
};
use crate::server::AppState;
use crate::services::IssuedTokens;

pub fn create_auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(handle_register))
        .route("/auth/login", post(handle_login))
        .route("/auth/logout", post(handle_logout))
        .route("/auth/forgot-password", post(handle_forgot_password))
        .route("/auth/reset-password", post(handle_reset_password))
        .route("/auth/refresh", post(handle_refresh))
        .route("/auth/me", get(handle_get_current_user))
}

fn check_rate_limit(state: &AppState, ClientIp(ip): &ClientIp) -> Result<()> {
    state.auth_rate_limiter.check_ip_limit(ip).map_err(|e| {
        tracing::warn!(client_ip = %ip, "auth rate limit exceeded");
        AppError::RateLimited(e)
    })
}

fn with_session_cookies(state: &AppState, jar: CookieJar, tokens: IssuedTokens) -> CookieJar {
    jar.add(access_cookie(tokens.access_token, &state.cookie_config))
        .add(refresh_cookie(tokens.refresh_token, &state.cookie_config))
}

async fn handle_register(
    State(state): State<AppState>,
    client_ip: ClientIp,
    jar: CookieJar,
    WithRejection(Json(req), _): WithRejection<Json<RegisterRequest>, AppError>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>)> {
    check_rate_limit(&state, &client_ip)?;

    let (user, tokens) = state.auth_service.register(req).await?;
    let jar = with_session_cookies(&state, jar, tokens);
    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse {
            user: UserResponse::from(&user),
        }),
    ))
}

async fn handle_login(
    State(state): State<AppState>,
    client_ip: ClientIp,
    jar: CookieJar,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, AppError>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    check_rate_limit(&state, &client_ip)?;

    let (user, tokens) = state.auth_service.login(req).await?;
    let jar = with_session_cookies(&state, jar, tokens);
    Ok((
        jar,
        Json(AuthResponse {
            user: UserResponse::from(&user),
        }),
    ))
}

// Cookie・Bearer で提示されたトークンをすべて失効させてから Cookie を削除する
async fn handle_logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>)> {
    let mut tokens: Vec<String> = [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE]
        .iter()
        .filter_map(|name| jar.get(name).map(|c| c.value().to_string()))
        .collect();
    tokens.extend(bearer_token(&headers));

    let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
    state.auth_service.logout(&refs).await?;

    Ok((
        clear_auth_cookies(jar),
        Json(MessageResponse::new(messages::LOGGED_OUT)),
    ))
}

async fn handle_forgot_password(
    State(state): State<AppState>,
    client_ip: ClientIp,
    WithRejection(Json(req), _): WithRejection<Json<ForgotPasswordRequest>, AppError>,
) -> Result<Json<MessageResponse>> {
    check_rate_limit(&state, &client_ip)?;

    state.auth_service.forgot_password(&req.email).await?;
    Ok(Json(MessageResponse::new(messages::RESET_LINK_SENT)))
}

async fn handle_reset_password(
    State(state): State<AppState>,
    client_ip: ClientIp,
    WithRejection(Json(req), _): WithRejection<Json<ResetPasswordRequest>, AppError>,
) -> Result<Json<MessageResponse>> {
    check_rate_limit(&state, &client_ip)?;

    state
        .auth_service
        .reset_password(&req.token, &req.password)
        .await?;
    Ok(Json(MessageResponse::new(messages::PASSWORD_CHANGED)))
}

async fn handle_refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>)> {
    let refresh_token = jar
        .get(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::Unauthorized(messages::UNAUTHORIZED.to_string()))?;

    let access_token = state.auth_service.refresh(&refresh_token).await?;
    Ok((
        jar.add(access_cookie(access_token, &state.cookie_config)),
        Json(MessageResponse::new(messages::SESSION_REFRESHED)),
    ))
}

async fn handle_get_current_user(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<AuthResponse>> {
    let user = state.auth_service.current_user(user.user_id).await?;
    Ok(Json(AuthResponse {
        user: UserResponse::from(&user),
    }))
}
