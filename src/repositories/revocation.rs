use chrono::{DateTime, Utc};

use crate::error::Result;

/// ログアウト済みトークン（jti）の失効リスト
#[async_trait::async_trait]
pub trait JWTHandler: Send + Sync {
    async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<()>;
    async fn is_revoked(&self, jti: &str) -> Result<bool>;
    /// 期限切れのエントリを削除し、削除件数を返す
    async fn cleanup(&self) -> Result<u64>;
}

pub struct RevocationRepository {
    pool: sqlx::PgPool,
}

impl RevocationRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl JWTHandler for RevocationRepository {
    async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO jwt_revocations (jti, expires_at, revoked_at) VALUES ($1, $2, now()) \
             ON CONFLICT (jti) DO NOTHING",
        )
        .bind(jti)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool> {
        let row =
            sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM jwt_revocations WHERE jti = $1")
                .bind(jti)
                .fetch_one(&self.pool)
                .await?;

        Ok(row.0 > 0)
    }

    async fn cleanup(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM jwt_revocations WHERE expires_at < now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
