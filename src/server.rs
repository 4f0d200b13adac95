use anyhow::Context;
use axum::{
    Json, Router,
    http::{Method, header},
    routing::get,
};
use jsonwebtoken::DecodingKey;
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{create_decoding_key, load_or_generate_secret_key};
use crate::config::{AiProvider, Config, CookieConfig, StorageBackend};
use crate::repositories::Repositories;
use crate::routes::{create_api_routes, create_share_routes};
use crate::services::{
    AuthRateLimiter, AuthService, EmailRateLimiter, GenerationRateLimiter, LogMailer, Mailer,
    MockSummaryGenerator, NoteService, OpenRouterGenerator, PublicLinkService, ResetTokenStore,
    SmtpMailer, SummaryGenerator, SummaryService, TagService,
};

/// アプリケーション全体で共有される状態
#[derive(Clone)]
pub struct AppState {
    pub jwt_decoding_key: DecodingKey,
    pub cookie_config: CookieConfig,
    /// サービス層
    pub auth_service: Arc<AuthService>,
    pub note_service: Arc<NoteService>,
    pub tag_service: Arc<TagService>,
    pub public_link_service: Arc<PublicLinkService>,
    pub summary_service: Arc<SummaryService>,
    pub auth_rate_limiter: Arc<AuthRateLimiter>,
    /// アプリケーション設定
    pub config: Arc<Config>,
}

/// 差し替え可能な外部依存（ストレージ・メール・要約生成）
pub struct Dependencies {
    pub repos: Repositories,
    pub mailer: Arc<dyn Mailer>,
    pub generator: Arc<dyn SummaryGenerator>,
    pub reset_tokens: ResetTokenStore,
}

impl AppState {
    pub fn new(config: Config, jwt_secret: String, deps: Dependencies) -> Self {
        let public_base_url = config.server.public_base_url.clone();
        let repos = deps.repos;

        let auth_service = Arc::new(AuthService::new(
            repos.clone(),
            jwt_secret.clone(),
            deps.mailer,
            deps.reset_tokens,
            Arc::new(EmailRateLimiter::new()),
            public_base_url.clone(),
        ));
        let tag_service = Arc::new(TagService::new(repos.clone()));
        let note_service = Arc::new(NoteService::new(
            repos.clone(),
            tag_service.clone(),
            public_base_url.clone(),
        ));
        let public_link_service = Arc::new(PublicLinkService::new(
            repos,
            note_service.clone(),
            public_base_url,
        ));
        let summary_service = Arc::new(SummaryService::new(
            deps.generator,
            GenerationRateLimiter::new(),
        ));

        Self {
            jwt_decoding_key: create_decoding_key(&jwt_secret),
            cookie_config: config.server.get_cookie_config(),
            auth_service,
            note_service,
            tag_service,
            public_link_service,
            summary_service,
            auth_rate_limiter: Arc::new(AuthRateLimiter::new()),
            config: Arc::new(config),
        }
    }

    /// 設定からストレージ・メーラー・要約プロバイダを組み立てる
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let jwt_secret = load_or_generate_secret_key(
            config.jwt.secret.as_deref(),
            config.jwt.secret_file.as_deref().map(Path::new),
        )
        .context("Failed to load JWT secret")?;

        let repos = match config.database.backend {
            StorageBackend::Memory => {
                tracing::info!("using in-memory storage");
                Repositories::in_memory()
            }
            StorageBackend::Postgres => {
                let url = config
                    .database
                    .url
                    .as_deref()
                    .context("DATABASE_URL is not set")?;
                let pool = PgPoolOptions::new()
                    .max_connections(config.database.max_connections)
                    .acquire_timeout(Duration::from_secs(5))
                    .connect(url)
                    .await
                    .context("Failed to connect to PostgreSQL")?;
                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .context("Failed to run database migrations")?;
                tracing::info!("connected to PostgreSQL, migrations applied");
                Repositories::postgres(pool)
            }
        };

        let mailer: Arc<dyn Mailer> = match &config.email {
            Some(email) => Arc::new(SmtpMailer::from_config(email)?),
            None => {
                tracing::warn!("SMTP not configured; password reset mails are only logged");
                Arc::new(LogMailer)
            }
        };

        let generator: Arc<dyn SummaryGenerator> = match config.ai.provider {
            AiProvider::OpenRouter => Arc::new(OpenRouterGenerator::new(&config.ai)?),
            AiProvider::Mock => {
                tracing::info!("using mock summary generator");
                Arc::new(MockSummaryGenerator)
            }
        };

        let reset_tokens = ResetTokenStore::new();
        reset_tokens.spawn_cleanup();

        let deps = Dependencies {
            repos,
            mailer,
            generator,
            reset_tokens,
        };
        Ok(Self::new(config, jwt_secret, deps))
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// ルーター全体（CORS・トレースは start_server 側で付与）
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", create_api_routes())
        .merge(create_share_routes())
        .with_state(state)
}

/// 1時間ごとに期限切れの失効エントリを削除
fn spawn_revocation_cleanup(state: &AppState) {
    let auth_service = state.auth_service.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match auth_service.cleanup_revocations().await {
                Ok(removed) if removed > 0 => {
                    tracing::debug!(removed, "expired token revocations removed")
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "revocation cleanup failed"),
            }
        }
    });
}

pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let server_config = &state.config.server;
    let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port)
        .parse()
        .context("Failed to parse server address")?;
    let trust_proxy = server_config.trust_proxy;

    let cors = CorsLayer::new()
        .allow_origin(server_config.get_allowed_origins()?)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    spawn_revocation_cleanup(&state);

    let app = build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, trust_proxy, "server listening");

    // レート制限のキーに接続元アドレスを使う
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server terminated unexpectedly")?;
    Ok(())
}
