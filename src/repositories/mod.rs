pub mod memory;
pub mod note;
pub mod public_link;
pub mod revocation;
pub mod tag;
pub mod user;

use std::sync::Arc;

use sqlx::PgPool;

use crate::error::AppError;

pub use memory::MemoryStore;
pub use note::{NoteFilter, NoteRepository, PostgresNoteRepository};
pub use public_link::{PostgresPublicLinkRepository, PublicLinkRepository};
pub use revocation::{JWTHandler, RevocationRepository};
pub use tag::{PostgresTagRepository, TagRepository};
pub use user::{PostgresUserRepository, UserHandler};

/// サービス層が使うリポジトリ一式
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserHandler>,
    pub notes: Arc<dyn NoteRepository>,
    pub tags: Arc<dyn TagRepository>,
    pub public_links: Arc<dyn PublicLinkRepository>,
    pub revocations: Arc<dyn JWTHandler>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PostgresUserRepository::new(pool.clone())),
            notes: Arc::new(PostgresNoteRepository::new(pool.clone())),
            tags: Arc::new(PostgresTagRepository::new(pool.clone())),
            public_links: Arc::new(PostgresPublicLinkRepository::new(pool.clone())),
            revocations: Arc::new(RevocationRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::default());
        Self {
            users: store.clone(),
            notes: store.clone(),
            tags: store.clone(),
            public_links: store.clone(),
            revocations: store,
        }
    }
}

/// 一意制約・外部キー制約違反を 409 に変換する
pub(crate) fn map_write_error(e: sqlx::Error, conflict_message: &str) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() || db.is_foreign_key_violation() => {
            AppError::Conflict(conflict_message.to_string())
        }
        _ => AppError::DatabaseError(e.to_string()),
    }
}
