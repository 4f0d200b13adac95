use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::messages;
use crate::models::{Tag, TagAccess};
use crate::repositories::map_write_error;

#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn find_by_id(&self, tag_id: Uuid) -> Result<Option<Tag>>;
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Tag>>;
    /// 大文字小文字を区別せずに名前で検索する
    async fn find_by_name(&self, user_id: Uuid, name: &str) -> Result<Option<Tag>>;
    /// `recipient_id` に共有されているタグ
    async fn find_shared_with(&self, recipient_id: Uuid) -> Result<Vec<Tag>>;
    async fn create(&self, tag: Tag) -> Result<Tag>;
    async fn update(&self, tag: Tag) -> Result<Tag>;
    async fn delete(&self, tag_id: Uuid) -> Result<()>;

    async fn grant_access(&self, access: TagAccess) -> Result<TagAccess>;
    async fn revoke_access(&self, tag_id: Uuid, recipient_id: Uuid) -> Result<()>;
    async fn list_access(&self, tag_id: Uuid) -> Result<Vec<TagAccess>>;
    async fn has_access(&self, tag_id: Uuid, user_id: Uuid) -> Result<bool>;
}

#[derive(FromRow)]
struct TagRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TagRow> for Tag {
    fn from(row: TagRow) -> Self {
        Tag {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct TagAccessRow {
    tag_id: Uuid,
    recipient_id: Uuid,
    granted_at: DateTime<Utc>,
}

impl From<TagAccessRow> for TagAccess {
    fn from(row: TagAccessRow) -> Self {
        TagAccess {
            tag_id: row.tag_id,
            recipient_id: row.recipient_id,
            granted_at: row.granted_at,
        }
    }
}

pub struct PostgresTagRepository {
    pool: PgPool,
}

impl PostgresTagRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TagRepository for PostgresTagRepository {
    async fn find_by_id(&self, tag_id: Uuid) -> Result<Option<Tag>> {
        let row = sqlx::query_as::<_, TagRow>(
            "SELECT id, user_id, name, created_at, updated_at FROM tags WHERE id = $1",
        )
        .bind(tag_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Tag::from))
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Tag>> {
        let rows = sqlx::query_as::<_, TagRow>(
            "SELECT id, user_id, name, created_at, updated_at FROM tags \
             WHERE user_id = $1 ORDER BY lower(name)",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Tag::from).collect())
    }

    async fn find_by_name(&self, user_id: Uuid, name: &str) -> Result<Option<Tag>> {
        let row = sqlx::query_as::<_, TagRow>(
            "SELECT id, user_id, name, created_at, updated_at FROM tags \
             WHERE user_id = $1 AND lower(name) = lower($2)",
        )
        .bind(user_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Tag::from))
    }

    async fn find_shared_with(&self, recipient_id: Uuid) -> Result<Vec<Tag>> {
        let rows = sqlx::query_as::<_, TagRow>(
            "SELECT t.id, t.user_id, t.name, t.created_at, t.updated_at FROM tags t \
             JOIN tag_access ta ON ta.tag_id = t.id \
             WHERE ta.recipient_id = $1 ORDER BY lower(t.name)",
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Tag::from).collect())
    }

    async fn create(&self, tag: Tag) -> Result<Tag> {
        sqlx::query(
            "INSERT INTO tags (id, user_id, name, created_at, updated_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(tag.id)
        .bind(tag.user_id)
        .bind(&tag.name)
        .bind(tag.created_at)
        .bind(tag.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, messages::TAG_NAME_TAKEN))?;

        Ok(tag)
    }

    async fn update(&self, tag: Tag) -> Result<Tag> {
        let result = sqlx::query("UPDATE tags SET name = $1, updated_at = $2 WHERE id = $3")
            .bind(&tag.name)
            .bind(tag.updated_at)
            .bind(tag.id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, messages::TAG_NAME_TAKEN))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Tag {} not found", tag.id)));
        }
        Ok(tag)
    }

    async fn delete(&self, tag_id: Uuid) -> Result<()> {
        // notes.tag_id は ON DELETE RESTRICT
        let result = sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(tag_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, messages::TAG_HAS_NOTES))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Tag {} not found", tag_id)));
        }
        Ok(())
    }

    async fn grant_access(&self, access: TagAccess) -> Result<TagAccess> {
        sqlx::query("INSERT INTO tag_access (tag_id, recipient_id, granted_at) VALUES ($1, $2, $3)")
            .bind(access.tag_id)
            .bind(access.recipient_id)
            .bind(access.granted_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, messages::RECIPIENT_EXISTS))?;

        Ok(access)
    }

    async fn revoke_access(&self, tag_id: Uuid, recipient_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM tag_access WHERE tag_id = $1 AND recipient_id = $2")
            .bind(tag_id)
            .bind(recipient_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(messages::RECIPIENT_MISSING.to_string()));
        }
        Ok(())
    }

    async fn list_access(&self, tag_id: Uuid) -> Result<Vec<TagAccess>> {
        let rows = sqlx::query_as::<_, TagAccessRow>(
            "SELECT tag_id, recipient_id, granted_at FROM tag_access \
             WHERE tag_id = $1 ORDER BY granted_at",
        )
        .bind(tag_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(TagAccess::from).collect())
    }

    async fn has_access(&self, tag_id: Uuid, user_id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM tag_access WHERE tag_id = $1 AND recipient_id = $2)",
        )
        .bind(tag_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}
