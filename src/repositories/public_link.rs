use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::messages;
use crate::models::PublicLink;
use crate::repositories::map_write_error;

/// トークンの一意性はストレージ側で保証する（衝突時は Conflict）。
/// 更新は列単位で行い、読み取った古い値で他の列を上書きしない。
#[async_trait]
pub trait PublicLinkRepository: Send + Sync {
    async fn find_by_note(&self, note_id: Uuid) -> Result<Option<PublicLink>>;
    async fn find_by_token(&self, token: &str) -> Result<Option<PublicLink>>;
    async fn create(&self, link: PublicLink) -> Result<PublicLink>;
    async fn set_enabled(
        &self,
        note_id: Uuid,
        is_enabled: bool,
        updated_at: DateTime<Utc>,
    ) -> Result<PublicLink>;
    /// token と updated_at のみ変更する
    async fn rotate_token(
        &self,
        note_id: Uuid,
        token: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<PublicLink>;
    async fn delete(&self, note_id: Uuid) -> Result<()>;
}

#[derive(FromRow)]
struct PublicLinkRow {
    note_id: Uuid,
    token: String,
    is_enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PublicLinkRow> for PublicLink {
    fn from(row: PublicLinkRow) -> Self {
        PublicLink {
            note_id: row.note_id,
            token: row.token,
            is_enabled: row.is_enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct PostgresPublicLinkRepository {
    pool: PgPool,
}

impl PostgresPublicLinkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PublicLinkRepository for PostgresPublicLinkRepository {
    async fn find_by_note(&self, note_id: Uuid) -> Result<Option<PublicLink>> {
        let row = sqlx::query_as::<_, PublicLinkRow>(
            "SELECT note_id, token, is_enabled, created_at, updated_at FROM public_links \
             WHERE note_id = $1",
        )
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PublicLink::from))
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<PublicLink>> {
        let row = sqlx::query_as::<_, PublicLinkRow>(
            "SELECT note_id, token, is_enabled, created_at, updated_at FROM public_links \
             WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PublicLink::from))
    }

    async fn create(&self, link: PublicLink) -> Result<PublicLink> {
        sqlx::query(
            "INSERT INTO public_links (note_id, token, is_enabled, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(link.note_id)
        .bind(&link.token)
        .bind(link.is_enabled)
        .bind(link.created_at)
        .bind(link.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, messages::CONFLICT))?;

        Ok(link)
    }

    async fn set_enabled(
        &self,
        note_id: Uuid,
        is_enabled: bool,
        updated_at: DateTime<Utc>,
    ) -> Result<PublicLink> {
        let row = sqlx::query_as::<_, PublicLinkRow>(
            "UPDATE public_links SET is_enabled = $1, updated_at = $2 WHERE note_id = $3 \
             RETURNING note_id, token, is_enabled, created_at, updated_at",
        )
        .bind(is_enabled)
        .bind(updated_at)
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PublicLink::from)
            .ok_or_else(|| AppError::NotFound(messages::PUBLIC_LINK_NOT_FOUND.to_string()))
    }

    async fn rotate_token(
        &self,
        note_id: Uuid,
        token: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<PublicLink> {
        let row = sqlx::query_as::<_, PublicLinkRow>(
            "UPDATE public_links SET token = $1, updated_at = $2 WHERE note_id = $3 \
             RETURNING note_id, token, is_enabled, created_at, updated_at",
        )
        .bind(token)
        .bind(updated_at)
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_write_error(e, messages::CONFLICT))?;

        row.map(PublicLink::from)
            .ok_or_else(|| AppError::NotFound(messages::PUBLIC_LINK_NOT_FOUND.to_string()))
    }

    async fn delete(&self, note_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM public_links WHERE note_id = $1")
            .bind(note_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(messages::PUBLIC_LINK_NOT_FOUND.to_string()));
        }
        Ok(())
    }
}
