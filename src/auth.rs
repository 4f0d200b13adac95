use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::CookieConfig;
use crate::error::{AppError, Result};
use crate::messages;
use crate::server::AppState;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
const REFRESH_COOKIE_PATH: &str = "/api/auth";

//////
// 入力値の検証

pub fn validate_password_format(password: &str) -> Result<()> {
    let length_min = 8;
    let length_max = 256;
    let length = password.chars().count();
    if length < length_min || length > length_max {
        return Err(AppError::field("password", messages::PASSWORD_LENGTH));
    }

    Ok(())
}

pub fn validate_email_format(email: &str) -> Result<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AppError::field("email", messages::EMAIL_REQUIRED));
    }
    if !is_valid_email(email) {
        return Err(AppError::field("email", messages::INVALID_EMAIL));
    }
    Ok(())
}

/// ローカル部が空でなく、ドメインにドットを含む形式のみ許可
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

//////
// パスワードハッシュ

pub fn hash_password(password: &str) -> Result<String> {
    use rand::RngCore;

    let mut salt_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt =
        SaltString::encode_b64(&salt_bytes).map_err(|e| AppError::HashingError(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::HashingError(e.to_string()))
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed =
        PasswordHash::new(password_hash).map_err(|e| AppError::HashingError(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

//////
// 共通鍵（HMAC）

/// ランダムな共通鍵を生成（32バイト）し、Base64で返す
pub fn generate_secret_key() -> String {
    use base64::{Engine as _, engine::general_purpose};
    use rand::RngCore;

    let mut key = vec![0u8; 32];
    rand::rng().fill_bytes(&mut key);
    general_purpose::STANDARD.encode(&key)
}

/// JWT秘密鍵の読み込み（または自動生成）
/// 優先順位: 1. 設定値, 2. ファイル, 3. 自動生成（デバッグビルドのみ）
pub fn load_or_generate_secret_key(secret: Option<&str>, path: Option<&Path>) -> Result<String> {
    if let Some(secret) = secret {
        if secret.trim().is_empty() {
            return Err(AppError::EnvironmentError(
                "JWT secret is configured but empty".to_string(),
            ));
        }
        tracing::info!("JWT secret loaded from configuration");
        return Ok(secret.to_string());
    }

    if let Some(p) = path {
        if p.exists() {
            let secret = std::fs::read_to_string(p)
                .map_err(|e| AppError::EnvironmentError(e.to_string()))?;
            if !secret.trim().is_empty() {
                tracing::info!(path = %p.display(), "JWT secret loaded from file");
                return Ok(secret.trim().to_string());
            }
        }
    }

    if cfg!(debug_assertions) {
        tracing::warn!(
            "JWT secret not configured; generated an ephemeral one. Set JWT_SECRET for production"
        );
        return Ok(generate_secret_key());
    }

    Err(AppError::EnvironmentError(
        "Set JWT_SECRET or jwt.secret_file".to_string(),
    ))
}

pub fn create_encoding_key(secret: &str) -> EncodingKey {
    EncodingKey::from_secret(secret.as_bytes())
}

pub fn create_decoding_key(secret: &str) -> DecodingKey {
    DecodingKey::from_secret(secret.as_bytes())
}

//////
// JWT

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Refresh,
    PasswordReset,
}

impl TokenType {
    fn lifetime(&self) -> Duration {
        match self {
            TokenType::Access => Duration::hours(1),
            TokenType::Refresh => Duration::days(7),
            TokenType::PasswordReset => Duration::minutes(30),
        }
    }
}

static JWT_ALGORITHM: Algorithm = Algorithm::HS256;
const JWT_ISSUER: &str = "notatki-server";
const JWT_AUDIENCE: &str = "notatki-client";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaim {
    iss: String,
    aud: String,
    /// アクセス/リフレッシュではユーザーID、リセットではメールアドレス
    pub sub: String,
    iat: usize,
    pub jti: String,
    nbf: usize,
    pub exp: usize,
    pub typ: TokenType,
    /// 発行時の `User::token_version`
    #[serde(default)]
    pub ver: i32,
}

impl JwtClaim {
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp as i64, 0).unwrap_or_else(Utc::now)
    }
}

pub fn issue_token(subject: &str, typ: TokenType, version: i32, secret: &str) -> Result<String> {
    let now = Utc::now();
    let claims = JwtClaim {
        iss: JWT_ISSUER.to_string(),
        aud: JWT_AUDIENCE.to_string(),
        sub: subject.to_string(),
        iat: now.timestamp() as usize,
        jti: Uuid::new_v4().to_string(),
        nbf: now.timestamp() as usize,
        exp: (now + typ.lifetime()).timestamp() as usize,
        typ,
        ver: version,
    };

    encode(
        &Header::new(JWT_ALGORITHM),
        &claims,
        &create_encoding_key(secret),
    )
    .map_err(|e| AppError::EnvironmentError(e.to_string()))
}

pub fn issue_access_token(user_id: Uuid, version: i32, secret: &str) -> Result<String> {
    issue_token(&user_id.to_string(), TokenType::Access, version, secret)
}

pub fn issue_refresh_token(user_id: Uuid, version: i32, secret: &str) -> Result<String> {
    issue_token(&user_id.to_string(), TokenType::Refresh, version, secret)
}

// リセットトークンは一回限りの jti で管理するため世代は使わない
pub fn issue_password_reset_token(email: &str, secret: &str) -> Result<String> {
    issue_token(email, TokenType::PasswordReset, 0, secret)
}

/// 署名・有効期限・種別を検証してクレームを返す
pub fn validate_token(token: &str, expected: TokenType, key: &DecodingKey) -> Result<JwtClaim> {
    let mut validation = Validation::new(JWT_ALGORITHM);
    validation.set_audience(&[JWT_AUDIENCE]);
    validation.set_issuer(&[JWT_ISSUER]);
    let claims = decode::<JwtClaim>(token, key, &validation)
        .map_err(|e| AppError::Unauthorized(format!("invalid token: {e}")))?
        .claims;

    if claims.typ != expected {
        return Err(AppError::Unauthorized(format!(
            "token type is {:?}, expected {:?}",
            claims.typ, expected
        )));
    }
    Ok(claims)
}

//////
// Cookie

pub fn access_cookie(token: String, config: &CookieConfig) -> Cookie<'static> {
    Cookie::build((ACCESS_TOKEN_COOKIE, token))
        .path("/")
        .http_only(config.http_only)
        .secure(config.secure)
        .same_site(config.same_site)
        .build()
}

pub fn refresh_cookie(token: String, config: &CookieConfig) -> Cookie<'static> {
    Cookie::build((REFRESH_TOKEN_COOKIE, token))
        .path(REFRESH_COOKIE_PATH)
        .http_only(config.http_only)
        .secure(config.secure)
        .same_site(config.same_site)
        .build()
}

pub fn clear_auth_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_TOKEN_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_TOKEN_COOKIE).path(REFRESH_COOKIE_PATH))
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// レート制限のキーになるクライアントIP。
/// `trust_proxy` のときだけ X-Forwarded-For / X-Real-IP を使い、
/// それ以外は接続元アドレスを使う。
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy: bool) -> String {
    let forwarded = || {
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
            })
    };

    trust_proxy
        .then(forwarded)
        .flatten()
        .or_else(|| peer.map(|ip| ip.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// 接続元IP（`into_make_service_with_connect_info` で起動した場合に取得できる）
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientIp(client_ip(
            &parts.headers,
            peer,
            state.config.server.trust_proxy,
        )))
    }
}

/// 認証済みユーザー。アクセストークン（Cookie または Bearer）から抽出する。
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let unauthorized = || AppError::Unauthorized(messages::UNAUTHORIZED.to_string());

        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(ACCESS_TOKEN_COOKIE)
            .map(|c| c.value().to_string())
            .or_else(|| bearer_token(&parts.headers))
            .ok_or_else(unauthorized)?;

        let claims = validate_token(&token, TokenType::Access, &state.jwt_decoding_key)
            .map_err(|e| {
                tracing::debug!(error = %e, "rejected access token");
                unauthorized()
            })?;

        if state.auth_service.is_token_revoked(&claims.jti).await? {
            return Err(unauthorized());
        }

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| unauthorized())?;
        // 削除済みアカウント・パスワード変更前のトークンを拒否
        if !state
            .auth_service
            .is_session_current(user_id, claims.ver)
            .await?
        {
            return Err(unauthorized());
        }

        Ok(AuthUser {
            user_id,
            jti: claims.jti.clone(),
            expires_at: claims.expires_at(),
        })
    }
}
