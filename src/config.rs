use anyhow::Context;
use axum::http::HeaderValue;
use axum_extra::extract::cookie::SameSite;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// 実行環境を表すenum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(anyhow::anyhow!("Invalid environment: {}", s)),
        }
    }
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Environment::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// 永続化バックエンドの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

/// 要約生成プロバイダの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[default]
    Mock,
    OpenRouter,
}

impl FromStr for AiProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(AiProvider::Mock),
            "openrouter" => Ok(AiProvider::OpenRouter),
            _ => Err(anyhow::anyhow!("Invalid AI provider: {}", s)),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub jwt: JwtConfig,
    pub email: Option<EmailConfig>,
    pub ai: AiConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub env: Environment,
    pub allowed_origins: Vec<String>,
    /// 公開リンクとリセットリンクのベースURL
    pub public_base_url: String,
    /// リバースプロキシ配下の場合のみ X-Forwarded-For / X-Real-IP を信頼する
    pub trust_proxy: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5050,
            env: Environment::Development,
            allowed_origins: Vec::new(),
            public_base_url: "http://localhost:3000".to_string(),
            trust_proxy: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: Option<String>,
    pub secret_file: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Notatki".to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AiConfig {
    pub provider: AiProvider,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: AiProvider::Mock,
            api_key: String::new(),
            model: "openai/gpt-4o-mini".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Cookie設定（環境に応じて自動的に決定される）
#[derive(Debug, Clone, Copy)]
pub struct CookieConfig {
    pub secure: bool,
    pub same_site: SameSite,
    pub http_only: bool,
}

impl CookieConfig {
    pub fn from_environment(env: &Environment) -> Self {
        match env {
            Environment::Production => Self {
                secure: true,
                same_site: SameSite::Strict,
                http_only: true,
            },
            // 開発環境: ローカルテスト向け
            Environment::Development => Self {
                secure: false,
                same_site: SameSite::Lax,
                http_only: true,
            },
        }
    }
}

impl ServerConfig {
    /// 環境に応じたallowed_originsをHeaderValueとして取得
    ///
    /// # Errors
    /// プロダクション環境でallowed_originsが設定されていない場合にエラーを返す
    pub fn get_allowed_origins(&self) -> anyhow::Result<Vec<HeaderValue>> {
        let origin_strings = match self.env {
            Environment::Production => {
                if self.allowed_origins.is_empty() {
                    anyhow::bail!(
                        "Production environment requires explicit ALLOWED_ORIGINS configuration. \
                        Set ALLOWED_ORIGINS environment variable"
                    );
                }
                self.allowed_origins.clone()
            }
            Environment::Development => {
                let mut origins = vec![
                    format!("http://localhost:{}", self.port),
                    format!("http://127.0.0.1:{}", self.port),
                    "http://localhost:3000".to_string(),
                    "http://localhost:4321".to_string(),
                ];
                origins.extend(self.allowed_origins.clone());
                origins
            }
        };

        // パースに失敗したオリジンはログを出してスキップ
        let headers: Vec<HeaderValue> = origin_strings
            .into_iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(header_value) => {
                    tracing::debug!(%origin, "allowed origin");
                    Some(header_value)
                }
                Err(e) => {
                    tracing::warn!(%origin, error = %e, "failed to parse origin");
                    None
                }
            })
            .collect();

        if headers.is_empty() {
            anyhow::bail!("No valid CORS origins configured");
        }

        Ok(headers)
    }

    pub fn get_cookie_config(&self) -> CookieConfig {
        CookieConfig::from_environment(&self.env)
    }
}

impl Config {
    /// Config.toml（存在する場合）を読み込み、環境変数で上書きする
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "Config.toml".to_string());
        let mut config = if Path::new(&path).exists() {
            let config_str =
                fs::read_to_string(&path).with_context(|| format!("Failed to read {path}"))?;
            Self::from_toml(&config_str).with_context(|| format!("Failed to parse {path}"))?
        } else {
            Config::default()
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Ok(host) = env::var("SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("SERVER_PORT") {
            self.server.port = port.parse().context("Invalid SERVER_PORT")?;
        }
        if let Ok(value) = env::var("ENVIRONMENT") {
            self.server.env = Environment::from_str(&value)?;
        }
        if let Ok(origins) = env::var("ALLOWED_ORIGINS") {
            self.server.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(url) = env::var("PUBLIC_BASE_URL") {
            self.server.public_base_url = url;
        }
        if let Ok(value) = env::var("TRUST_PROXY") {
            self.server.trust_proxy = value.parse().context("Invalid TRUST_PROXY")?;
        }
        if let Ok(backend) = env::var("STORAGE_BACKEND") {
            self.database.backend = StorageBackend::from_str(&backend)?;
        }
        if let Ok(url) = env::var("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(secret) = env::var("JWT_SECRET") {
            self.jwt.secret = Some(secret);
        }
        if let Ok(host) = env::var("SMTP_HOST") {
            self.email = Some(EmailConfig {
                smtp_host: host,
                smtp_port: env::var("SMTP_PORT")
                    .unwrap_or_else(|_| "587".to_string())
                    .parse()
                    .context("Invalid SMTP_PORT")?,
                smtp_username: env::var("SMTP_USERNAME")
                    .context("SMTP_USERNAME must be set together with SMTP_HOST")?,
                smtp_password: env::var("SMTP_PASSWORD")
                    .context("SMTP_PASSWORD must be set together with SMTP_HOST")?,
                from_email: env::var("SMTP_FROM_EMAIL")
                    .or_else(|_| env::var("SMTP_USERNAME"))
                    .unwrap_or_default(),
                from_name: env::var("SMTP_FROM_NAME").unwrap_or_else(|_| default_from_name()),
            });
        }
        if let Ok(provider) = env::var("AI_PROVIDER") {
            self.ai.provider = AiProvider::from_str(&provider)?;
        }
        if let Ok(api_key) = env::var("AI_API_KEY") {
            self.ai.api_key = api_key;
        }
        if let Ok(model) = env::var("AI_MODEL") {
            self.ai.model = model;
        }
        if let Ok(base_url) = env::var("AI_BASE_URL") {
            self.ai.base_url = base_url;
        }
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.database.backend == StorageBackend::Postgres && self.database.url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when the postgres backend is selected");
        }
        if self.ai.provider == AiProvider::OpenRouter && self.ai.api_key.is_empty() {
            anyhow::bail!("AI_API_KEY must be set when the openrouter provider is selected");
        }
        if self.server.env == Environment::Production
            && self.database.backend == StorageBackend::Memory
        {
            tracing::warn!("in-memory storage selected in production; data will not survive restarts");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 8080
            env = "prod"
            allowed_origins = ["https://notatki.example"]

            [database]
            backend = "postgres"
            url = "postgres://localhost/notatki"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.env, Environment::Production);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.database.backend, StorageBackend::Postgres);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.ai.provider, AiProvider::Mock);
        assert!(config.email.is_none());
        assert!(!config.server.trust_proxy);
    }

    #[test]
    fn production_requires_explicit_origins() {
        let server = ServerConfig {
            env: Environment::Production,
            ..Default::default()
        };
        assert!(server.get_allowed_origins().is_err());

        let server = ServerConfig {
            env: Environment::Production,
            allowed_origins: vec!["https://notatki.example".to_string()],
            ..Default::default()
        };
        assert_eq!(server.get_allowed_origins().unwrap().len(), 1);
    }

    #[test]
    fn development_allows_localhost() {
        let origins = ServerConfig::default().get_allowed_origins().unwrap();
        assert!(origins.iter().any(|o| o == "http://localhost:3000"));
    }

    #[test]
    fn cookies_are_secure_in_production() {
        let cookie = CookieConfig::from_environment(&Environment::Production);
        assert!(cookie.secure);
        assert!(cookie.http_only);
        assert!(!CookieConfig::from_environment(&Environment::Development).secure);
    }
}
