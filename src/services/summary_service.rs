use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::AiConfig;
use crate::error::{AppError, Result};
use crate::models::{GeneratedSummary, GoalStatus};
use crate::services::GenerationRateLimiter;
use crate::services::note_service::validate_content;

const SUMMARY_MAX: usize = 2000;
const TAG_MAX: usize = 100;

/// 要約プロバイダが返す内容（所要時間はサービス側で計測する）
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SummaryDraft {
    pub summary_text: String,
    #[serde(default)]
    pub goal_status: GoalStatus,
    #[serde(default)]
    pub suggested_tag: Option<String>,
}

#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    /// 失敗時は `AppError::ExternalServiceError`（503）を返すこと
    async fn generate(&self, content: &str) -> Result<SummaryDraft>;
}

pub struct SummaryService {
    generator: Arc<dyn SummaryGenerator>,
    rate_limiter: GenerationRateLimiter,
}

impl SummaryService {
    pub fn new(generator: Arc<dyn SummaryGenerator>, rate_limiter: GenerationRateLimiter) -> Self {
        Self {
            generator,
            rate_limiter,
        }
    }

    /// 匿名でも利用可能。IPごとにレート制限する。
    pub async fn generate(&self, client_ip: &str, content: &str) -> Result<GeneratedSummary> {
        validate_content(content)?;
        self.rate_limiter.check_ip_limit(client_ip).map_err(|e| {
            tracing::warn!(client_ip, "summary generation rate limited");
            AppError::RateLimited(e)
        })?;

        let started = Instant::now();
        let draft = self.generator.generate(content).await.map_err(|e| {
            tracing::error!(error = %e, "summary provider failed");
            match e {
                AppError::ExternalServiceError(_) => e,
                other => AppError::ExternalServiceError(other.to_string()),
            }
        })?;
        let generation_time_ms = started.elapsed().as_millis() as u64;

        let summary_text = truncate_chars(draft.summary_text.trim(), SUMMARY_MAX);
        if summary_text.is_empty() {
            return Err(AppError::ExternalServiceError(
                "provider returned an empty summary".to_string(),
            ));
        }
        let suggested_tag = draft
            .suggested_tag
            .map(|t| truncate_chars(t.trim(), TAG_MAX))
            .filter(|t| !t.is_empty());

        tracing::info!(generation_time_ms, "summary generated");
        Ok(GeneratedSummary {
            summary_text,
            goal_status: draft.goal_status,
            suggested_tag,
            generation_time_ms,
        })
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

//////
// OpenRouter（OpenAI互換 chat/completions）

const SYSTEM_PROMPT: &str = "Jesteś asystentem, który streszcza notatki ze spotkań. \
Odpowiedz wyłącznie obiektem JSON o polach: \
\"summary_text\" (zwięzłe podsumowanie po polsku, maksymalnie 2000 znaków), \
\"goal_status\" (\"achieved\", \"not_achieved\" lub \"undefined\", czy cel spotkania został osiągnięty), \
\"suggested_tag\" (krótka nazwa etykiety dla notatki albo null).";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

pub struct OpenRouterGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenRouterGenerator {
    pub fn new(config: &AiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::EnvironmentError(format!("failed to create HTTP client: {}", e)))?;

        tracing::info!(base_url = %config.base_url, model = %config.model, "OpenRouter summary provider");
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

/// モデルの応答から JSON を取り出す（```json ... ``` で囲まれていることがある）
fn parse_draft(content: &str) -> Result<SummaryDraft> {
    let trimmed = content.trim();
    let json = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    };
    serde_json::from_str(json)
        .map_err(|e| AppError::ExternalServiceError(format!("unparseable model output: {}", e)))
}

#[async_trait]
impl SummaryGenerator for OpenRouterGenerator {
    async fn generate(&self, content: &str) -> Result<SummaryDraft> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content,
                },
            ],
            temperature: 0.2,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("X-Title", "Notatki")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalServiceError(format!(
                "provider returned {}: {}",
                status, body
            )));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("failed to parse response: {}", e)))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::ExternalServiceError("empty completion".to_string()))?;

        parse_draft(&content)
    }
}

//////
// モック（開発・テスト用、決定的）

pub struct MockSummaryGenerator;

fn detect_goal_status(content: &str) -> GoalStatus {
    let lower = content.to_lowercase();
    let negative = ["nie osiągnięto", "nie udało", "nie zrealizowano", "nie zostało"];
    let positive = ["osiągnięto", "udało się", "zrealizowano", "ustalono", "zatwierdzono"];

    if negative.iter().any(|k| lower.contains(k)) {
        GoalStatus::NotAchieved
    } else if positive.iter().any(|k| lower.contains(k)) {
        GoalStatus::Achieved
    } else {
        GoalStatus::Undefined
    }
}

/// 最初のハッシュタグ（#Projekt）をタグ候補にする
fn detect_tag(content: &str) -> Option<String> {
    content
        .split_whitespace()
        .find_map(|word| word.strip_prefix('#'))
        .map(|tag| {
            tag.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
                .to_string()
        })
        .filter(|tag| !tag.is_empty())
}

#[async_trait]
impl SummaryGenerator for MockSummaryGenerator {
    async fn generate(&self, content: &str) -> Result<SummaryDraft> {
        let sentences: Vec<&str> = content
            .split_inclusive(['.', '!', '?'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .take(2)
            .collect();

        Ok(SummaryDraft {
            summary_text: format!("Podsumowanie: {}", sentences.join(" ")),
            goal_status: detect_goal_status(content),
            suggested_tag: detect_tag(content),
        })
    }
}
