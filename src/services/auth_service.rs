use chrono::Utc;
use jsonwebtoken::DecodingKey;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{
    TokenType, create_decoding_key, hash_password, issue_access_token, issue_password_reset_token,
    issue_refresh_token, normalize_email, validate_email_format, validate_password_format,
    validate_token, verify_password,
};
use crate::error::{AppError, Result};
use crate::messages;
use crate::models::{LoginRequest, RegisterRequest, User};
use crate::repositories::Repositories;
use crate::services::email_service::password_reset_mail;
use crate::services::{EmailRateLimiter, Mailer, ResetTokenStore};

/// 発行したアクセストークンとリフレッシュトークンの組
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct AuthService {
    repos: Repositories,
    jwt_secret: String,
    decoding_key: DecodingKey,
    mailer: Arc<dyn Mailer>,
    reset_tokens: ResetTokenStore,
    rate_limiter: Arc<EmailRateLimiter>,
    public_base_url: String,
}

impl AuthService {
    pub fn new(
        repos: Repositories,
        jwt_secret: String,
        mailer: Arc<dyn Mailer>,
        reset_tokens: ResetTokenStore,
        rate_limiter: Arc<EmailRateLimiter>,
        public_base_url: String,
    ) -> Self {
        let decoding_key = create_decoding_key(&jwt_secret);
        Self {
            repos,
            jwt_secret,
            decoding_key,
            mailer,
            reset_tokens,
            rate_limiter,
            public_base_url,
        }
    }

    fn issue_tokens(&self, user: &User) -> Result<IssuedTokens> {
        Ok(IssuedTokens {
            access_token: issue_access_token(user.id, user.token_version, &self.jwt_secret)?,
            refresh_token: issue_refresh_token(user.id, user.token_version, &self.jwt_secret)?,
        })
    }

    /// ユーザー登録
    pub async fn register(&self, req: RegisterRequest) -> Result<(User, IssuedTokens)> {
        validate_email_format(&req.email)?;
        validate_password_format(&req.password)?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: normalize_email(&req.email),
            password_hash: hash_password(&req.password)?,
            token_version: 0,
            created_at: now,
            updated_at: now,
        };
        let user = self.repos.users.create(user).await?;
        tracing::info!(user_id = %user.id, "user registered");

        let tokens = self.issue_tokens(&user)?;
        Ok((user, tokens))
    }

    /// ログイン処理
    pub async fn login(&self, req: LoginRequest) -> Result<(User, IssuedTokens)> {
        if req.email.trim().is_empty() {
            return Err(AppError::field("email", messages::EMAIL_REQUIRED));
        }
        if req.password.is_empty() {
            return Err(AppError::field("password", messages::PASSWORD_REQUIRED));
        }

        let invalid = || AppError::Unauthorized(messages::INVALID_CREDENTIALS.to_string());

        let user = self
            .repos
            .users
            .find_by_email(&normalize_email(&req.email))
            .await?
            .ok_or_else(invalid)?;

        if !verify_password(&req.password, &user.password_hash)? {
            tracing::warn!(user_id = %user.id, "login rejected: wrong password");
            return Err(invalid());
        }

        let tokens = self.issue_tokens(&user)?;
        Ok((user, tokens))
    }

    /// ログアウト処理。提示されたトークンの jti を失効させる（不正なトークンは無視）。
    pub async fn logout(&self, tokens: &[&str]) -> Result<()> {
        for token in tokens {
            let claims = validate_token(token, TokenType::Access, &self.decoding_key)
                .or_else(|_| validate_token(token, TokenType::Refresh, &self.decoding_key));
            if let Ok(claims) = claims {
                self.repos
                    .revocations
                    .revoke(&claims.jti, claims.expires_at())
                    .await?;
            }
        }
        Ok(())
    }

    /// リフレッシュトークンから新しいアクセストークンを発行
    pub async fn refresh(&self, refresh_token: &str) -> Result<String> {
        let unauthorized = || AppError::Unauthorized(messages::UNAUTHORIZED.to_string());

        let claims = validate_token(refresh_token, TokenType::Refresh, &self.decoding_key)
            .map_err(|_| unauthorized())?;
        if self.repos.revocations.is_revoked(&claims.jti).await? {
            return Err(unauthorized());
        }

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| unauthorized())?;
        let user = self
            .repos
            .users
            .find_by_id(user_id)
            .await?
            .filter(|user| user.token_version == claims.ver)
            .ok_or_else(unauthorized)?;

        issue_access_token(user.id, user.token_version, &self.jwt_secret)
    }

    /// パスワードリセットメールを送信する。
    /// アドレスの存在有無にかかわらず成功を返す（アカウント列挙対策）。
    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        validate_email_format(email)?;
        let email = normalize_email(email);

        self.rate_limiter
            .check_email_limit(&email)
            .map_err(AppError::RateLimited)?;

        let Some(user) = self.repos.users.find_by_email(&email).await? else {
            tracing::debug!("password reset requested for unknown address");
            return Ok(());
        };

        let token = issue_password_reset_token(&user.email, &self.jwt_secret)?;
        let claims = validate_token(&token, TokenType::PasswordReset, &self.decoding_key)?;
        self.reset_tokens
            .store(claims.jti.clone(), user.email.clone(), claims.expires_at());

        let reset_url = format!(
            "{}/reset-password?token={}",
            self.public_base_url.trim_end_matches('/'),
            token
        );
        let (subject, body) = password_reset_mail(&reset_url);

        // 送信失敗はクライアントに伝えない
        if let Err(e) = self.mailer.send(&user.email, &subject, &body).await {
            tracing::error!(user_id = %user.id, error = %e, "failed to send password reset mail");
        }
        Ok(())
    }

    /// リセットトークンを検証して新しいパスワードを設定
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        validate_password_format(new_password)?;

        let invalid = || AppError::field("token", messages::RESET_TOKEN_INVALID);

        let claims = validate_token(token, TokenType::PasswordReset, &self.decoding_key)
            .map_err(|_| invalid())?;
        if !self.reset_tokens.consume(&claims.jti, &claims.sub) {
            return Err(invalid());
        }

        let user = self
            .repos
            .users
            .find_by_email(&claims.sub)
            .await?
            .ok_or_else(invalid)?;

        let password_hash = hash_password(new_password)?;
        self.repos
            .users
            .update_password(user.id, &password_hash)
            .await?;
        self.reset_tokens.invalidate_for(&user.email);

        tracing::info!(user_id = %user.id, "password reset completed");
        Ok(())
    }

    /// 現在のユーザー情報取得
    pub async fn current_user(&self, user_id: Uuid) -> Result<User> {
        self.repos
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized(messages::UNAUTHORIZED.to_string()))
    }

    /// ユーザーが存在し、トークンの世代が現在のものと一致するか
    pub async fn is_session_current(&self, user_id: Uuid, version: i32) -> Result<bool> {
        Ok(self
            .repos
            .users
            .find_by_id(user_id)
            .await?
            .is_some_and(|user| user.token_version == version))
    }

    /// JTI がrevoke されているか確認
    pub async fn is_token_revoked(&self, jti: &str) -> Result<bool> {
        self.repos.revocations.is_revoked(jti).await
    }

    /// アカウント削除。パスワードで本人確認し、関連データごと削除する。
    pub async fn delete_account(&self, user_id: Uuid, password: &str) -> Result<()> {
        if password.is_empty() {
            return Err(AppError::field("password", messages::PASSWORD_REQUIRED));
        }
        let user = self.current_user(user_id).await?;
        if !verify_password(password, &user.password_hash)? {
            return Err(AppError::field("password", messages::WRONG_PASSWORD));
        }

        self.repos.users.delete(user_id).await?;
        self.reset_tokens.invalidate_for(&user.email);
        tracing::info!(user_id = %user_id, "account deleted");
        Ok(())
    }

    /// 期限切れの失効エントリを削除
    pub async fn cleanup_revocations(&self) -> Result<u64> {
        self.repos.revocations.cleanup().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingMailer {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Mailer for CapturingMailer {
        async fn send(&self, to_email: &str, _subject: &str, body: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((to_email.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn service(mailer: Arc<CapturingMailer>) -> AuthService {
        AuthService::new(
            Repositories::in_memory(),
            "test-secret".to_string(),
            mailer,
            ResetTokenStore::new(),
            Arc::new(EmailRateLimiter::new()),
            "http://localhost:3000/".to_string(),
        )
    }

    fn register_req(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "bardzo-tajne".to_string(),
        }
    }

    fn token_from(body: &str) -> String {
        let start = body.find("token=").unwrap() + "token=".len();
        body[start..].lines().next().unwrap().trim().to_string()
    }

    #[tokio::test]
    async fn register_normalizes_email_and_rejects_duplicates() {
        let svc = service(Arc::default());
        let (user, _) = svc.register(register_req(" Anna@Example.com ")).await.unwrap();
        assert_eq!(user.email, "anna@example.com");

        let err = svc.register(register_req("anna@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn login_rejects_wrong_password() {
        let svc = service(Arc::default());
        svc.register(register_req("anna@example.com")).await.unwrap();

        let err = svc
            .login(LoginRequest {
                email: "anna@example.com".into(),
                password: "zle-haslo".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let (user, _) = svc
            .login(LoginRequest {
                email: "ANNA@example.com".into(),
                password: "bardzo-tajne".into(),
            })
            .await
            .unwrap();
        assert_eq!(user.email, "anna@example.com");
    }

    #[tokio::test]
    async fn logout_revokes_presented_tokens() {
        let svc = service(Arc::default());
        let (_, tokens) = svc.register(register_req("anna@example.com")).await.unwrap();

        svc.logout(&[&tokens.access_token, &tokens.refresh_token, "garbage"])
            .await
            .unwrap();

        let claims =
            validate_token(&tokens.access_token, TokenType::Access, &svc.decoding_key).unwrap();
        assert!(svc.is_token_revoked(&claims.jti).await.unwrap());

        let err = svc.refresh(&tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn forgot_password_is_silent_for_unknown_address() {
        let mailer = Arc::new(CapturingMailer::default());
        let svc = service(mailer.clone());

        svc.forgot_password("nikt@example.com").await.unwrap();
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_token_works_once() {
        let mailer = Arc::new(CapturingMailer::default());
        let svc = service(mailer.clone());
        svc.register(register_req("anna@example.com")).await.unwrap();

        svc.forgot_password("anna@example.com").await.unwrap();
        let body = mailer.sent.lock().unwrap()[0].1.clone();
        assert!(body.contains("http://localhost:3000/reset-password?token="));
        let token = token_from(&body);

        svc.reset_password(&token, "nowe-haslo-123").await.unwrap();
        let err = svc.reset_password(&token, "inne-haslo-123").await.unwrap_err();
        assert!(matches!(err, AppError::FieldError { field: "token", .. }));

        svc.login(LoginRequest {
            email: "anna@example.com".into(),
            password: "nowe-haslo-123".into(),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn delete_account_requires_password() {
        let svc = service(Arc::default());
        let (user, _) = svc.register(register_req("anna@example.com")).await.unwrap();

        let err = svc.delete_account(user.id, "zle-haslo").await.unwrap_err();
        assert!(matches!(err, AppError::FieldError { field: "password", .. }));

        svc.delete_account(user.id, "bardzo-tajne").await.unwrap();
        assert!(!svc.is_session_current(user.id, 0).await.unwrap());
    }

    #[tokio::test]
    async fn password_reset_ends_existing_sessions() {
        let mailer = Arc::new(CapturingMailer::default());
        let svc = service(mailer.clone());
        let (user, old) = svc.register(register_req("anna@example.com")).await.unwrap();
        assert!(svc.is_session_current(user.id, 0).await.unwrap());

        svc.forgot_password("anna@example.com").await.unwrap();
        let token = token_from(&mailer.sent.lock().unwrap()[0].1);
        svc.reset_password(&token, "nowe-haslo-123").await.unwrap();

        let stale =
            validate_token(&old.access_token, TokenType::Access, &svc.decoding_key).unwrap();
        assert!(!svc.is_session_current(user.id, stale.ver).await.unwrap());
        let err = svc.refresh(&old.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        // 新しいパスワードでのログインは新しい世代で発行される
        let (_, fresh) = svc
            .login(LoginRequest {
                email: "anna@example.com".into(),
                password: "nowe-haslo-123".into(),
            })
            .await
            .unwrap();
        let claims =
            validate_token(&fresh.access_token, TokenType::Access, &svc.decoding_key).unwrap();
        assert_eq!(claims.ver, 1);
        assert!(svc.is_session_current(user.id, claims.ver).await.unwrap());
        svc.refresh(&fresh.refresh_token).await.unwrap();
    }
}
