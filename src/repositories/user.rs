use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::messages;
use crate::models::User;
use crate::repositories::map_write_error;

#[async_trait]
pub trait UserHandler: Send + Sync {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>>;
    /// `email` は正規化済み（小文字）であること
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn create(&self, user: User) -> Result<User>;
    /// パスワードを更新し、発行済みトークンを無効にするため token_version を増やす
    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()>;
    /// ユーザーと、そのタグ・ノート・公開リンク・共有設定をすべて削除する
    async fn delete(&self, user_id: Uuid) -> Result<()>;
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    token_version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            token_version: row.token_version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserHandler for PostgresUserRepository {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, token_version, created_at, updated_at \
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, token_version, created_at, updated_at \
             FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn create(&self, user: User) -> Result<User> {
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, token_version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.token_version)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, messages::EMAIL_TAKEN))?;

        Ok(user)
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $1, token_version = token_version + 1, \
             updated_at = now() WHERE id = $2",
        )
        .bind(password_hash)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {user_id} not found")));
        }
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<()> {
        // ノートはタグを参照しているため先に削除する（他はON DELETE CASCADE）
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM notes WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {user_id} not found")));
        }
        tx.commit().await?;
        Ok(())
    }
}
