use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use rand::RngCore;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::messages;
use crate::models::{PublicLink, PublicLinkResponse, PublicNoteResponse};
use crate::repositories::Repositories;
use crate::services::NoteService;

// トークン衝突時の再試行回数
const TOKEN_ATTEMPTS: usize = 5;

/// 32バイトの乱数を URL-safe Base64 で表した公開トークン
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// 公開リンクの状態遷移:
/// 未作成 -> 有効 -> (再生成: 新トークン) -> 無効 -> 有効（同じトークン）
pub struct PublicLinkService {
    repos: Repositories,
    note_service: Arc<NoteService>,
    public_base_url: String,
}

impl PublicLinkService {
    pub fn new(
        repos: Repositories,
        note_service: Arc<NoteService>,
        public_base_url: String,
    ) -> Self {
        Self {
            repos,
            note_service,
            public_base_url,
        }
    }

    fn response(&self, link: &PublicLink) -> PublicLinkResponse {
        PublicLinkResponse::from_link(link, &self.public_base_url)
    }

    async fn existing(&self, user_id: Uuid, note_id: Uuid) -> Result<PublicLink> {
        self.note_service.owned_note(user_id, note_id).await?;
        self.repos
            .public_links
            .find_by_note(note_id)
            .await?
            .ok_or_else(|| AppError::NotFound(messages::PUBLIC_LINK_NOT_FOUND.to_string()))
    }

    pub async fn get(&self, user_id: Uuid, note_id: Uuid) -> Result<PublicLinkResponse> {
        let link = self.existing(user_id, note_id).await?;
        Ok(self.response(&link))
    }

    /// リンクを作成、または無効化されたリンクを同じトークンで再有効化する。
    /// 新規作成の場合は `true` を返す。
    pub async fn create_or_enable(
        &self,
        user_id: Uuid,
        note_id: Uuid,
    ) -> Result<(PublicLinkResponse, bool)> {
        self.note_service.owned_note(user_id, note_id).await?;

        if let Some(mut link) = self.repos.public_links.find_by_note(note_id).await? {
            if !link.is_enabled {
                link = self
                    .repos
                    .public_links
                    .set_enabled(note_id, true, Utc::now())
                    .await?;
                tracing::info!(note_id = %note_id, "public link re-enabled");
            }
            return Ok((self.response(&link), false));
        }

        let mut last_error = None;
        for _ in 0..TOKEN_ATTEMPTS {
            let now = Utc::now();
            let link = PublicLink {
                note_id,
                token: generate_token(),
                is_enabled: true,
                created_at: now,
                updated_at: now,
            };
            match self.repos.public_links.create(link).await {
                Ok(link) => {
                    tracing::info!(note_id = %note_id, "public link created");
                    return Ok((self.response(&link), true));
                }
                // 同じノートへの同時作成
                Err(AppError::Conflict(msg)) => {
                    if let Some(link) = self.repos.public_links.find_by_note(note_id).await? {
                        return Ok((self.response(&link), false));
                    }
                    last_error = Some(AppError::Conflict(msg));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| AppError::Conflict(messages::CONFLICT.to_string())))
    }

    pub async fn set_enabled(
        &self,
        user_id: Uuid,
        note_id: Uuid,
        is_enabled: bool,
    ) -> Result<PublicLinkResponse> {
        let mut link = self.existing(user_id, note_id).await?;
        if link.is_enabled != is_enabled {
            link = self
                .repos
                .public_links
                .set_enabled(note_id, is_enabled, Utc::now())
                .await?;
            tracing::info!(note_id = %note_id, is_enabled, "public link toggled");
        }
        Ok(self.response(&link))
    }

    /// 新しいトークンを割り当てる。旧トークンのURLは以後 404 になる。
    pub async fn rotate(&self, user_id: Uuid, note_id: Uuid) -> Result<PublicLinkResponse> {
        let current = self.existing(user_id, note_id).await?;

        for _ in 0..TOKEN_ATTEMPTS {
            let token = generate_token();
            if token == current.token {
                continue;
            }
            match self
                .repos
                .public_links
                .rotate_token(note_id, &token, Utc::now())
                .await
            {
                Ok(link) => {
                    tracing::info!(note_id = %note_id, "public link rotated");
                    return Ok(self.response(&link));
                }
                Err(AppError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(AppError::Conflict(messages::CONFLICT.to_string()))
    }

    pub async fn delete(&self, user_id: Uuid, note_id: Uuid) -> Result<()> {
        self.note_service.owned_note(user_id, note_id).await?;
        self.repos.public_links.delete(note_id).await?;
        tracing::info!(note_id = %note_id, "public link deleted");
        Ok(())
    }

    /// 公開トークンからノートを解決する（認証不要）。無効なリンクは 404。
    pub async fn resolve(&self, token: &str) -> Result<PublicNoteResponse> {
        let unavailable = || AppError::NotFound(messages::SHARED_NOTE_UNAVAILABLE.to_string());

        let link = self
            .repos
            .public_links
            .find_by_token(token)
            .await?
            .filter(|link| link.is_enabled)
            .ok_or_else(unavailable)?;
        let note = self
            .repos
            .notes
            .find_by_id(link.note_id)
            .await?
            .ok_or_else(unavailable)?;

        Ok(PublicNoteResponse {
            summary_text: note.summary_text,
            goal_status: note.goal_status,
            meeting_date: note.meeting_date,
            created_at: note.created_at,
        })
    }
}
