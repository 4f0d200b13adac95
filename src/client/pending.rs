use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::{ClientError, NotesApi};
use crate::models::{CreateNoteRequest, GoalStatus, NoteDetail};

/// セッションストレージ上のキー
pub const PENDING_NOTE_KEY: &str = "pendingNote";

/// タグが決まっていない場合に使うタグ名
pub const DEFAULT_TAG_NAME: &str = "Bez etykiety";

/// ブラウザの sessionStorage に相当する保存先
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    /// 取り出して削除する（原子的であること）
    fn take(&self, key: &str) -> Option<String>;
}

#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    entries: DashMap<String, String>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.clone())
    }

    fn set(&self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn take(&self, key: &str) -> Option<String> {
        self.entries.remove(key).map(|(_, v)| v)
    }
}

/// 未ログインで生成したノート
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingNote {
    pub original_content: String,
    #[serde(default)]
    pub summary_text: Option<String>,
    #[serde(default)]
    pub goal_status: GoalStatus,
    #[serde(default)]
    pub meeting_date: Option<NaiveDate>,
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub is_ai_generated: bool,
}

impl PendingNote {
    fn into_request(self) -> CreateNoteRequest {
        let tag_name = self
            .tag_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_TAG_NAME.to_string());

        CreateNoteRequest {
            original_content: self.original_content,
            summary_text: self.summary_text,
            goal_status: Some(self.goal_status),
            meeting_date: self.meeting_date,
            tag_id: None,
            tag_name: Some(tag_name),
            is_ai_generated: self.is_ai_generated,
        }
    }
}

pub fn stash_pending_note(
    storage: &dyn SessionStorage,
    note: &PendingNote,
) -> Result<(), ClientError> {
    let raw = serde_json::to_string(note).map_err(|e| ClientError::Decode(e.to_string()))?;
    storage.set(PENDING_NOTE_KEY, raw);
    Ok(())
}

/// ログイン直後に保留中のノートを1件だけ保存する。
///
/// 送信前にキャッシュから取り出すので、同時に呼ばれても作成は1回。
/// 失敗した場合は手動で再試行できるよう元に戻す。
pub async fn save_pending_note<A: NotesApi>(
    storage: &dyn SessionStorage,
    api: &A,
) -> Result<Option<NoteDetail>, ClientError> {
    let Some(raw) = storage.take(PENDING_NOTE_KEY) else {
        return Ok(None);
    };

    let pending: PendingNote = match serde_json::from_str(&raw) {
        Ok(pending) => pending,
        Err(e) => {
            tracing::warn!(error = %e, "discarding malformed pending note");
            return Ok(None);
        }
    };

    match api.create_note(&pending.into_request()).await {
        Ok(note) => {
            tracing::info!(note_id = %note.id, "pending note saved");
            Ok(Some(note))
        }
        Err(err) => {
            storage.set(PENDING_NOTE_KEY, raw);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TagRef, UpdateNoteRequest};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct FakeNotes {
        created: Mutex<Vec<CreateNoteRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl NotesApi for FakeNotes {
        async fn create_note(&self, request: &CreateNoteRequest) -> Result<NoteDetail, ClientError> {
            if self.fail {
                return Err(ClientError::Network("offline".into()));
            }
            self.created.lock().unwrap().push(request.clone());
            let now = Utc::now();
            Ok(NoteDetail {
                id: Uuid::new_v4(),
                original_content: request.original_content.clone(),
                summary_text: request.summary_text.clone(),
                goal_status: request.goal_status.unwrap_or_default(),
                meeting_date: now.date_naive(),
                is_ai_generated: request.is_ai_generated,
                is_owner: true,
                tag: TagRef {
                    id: Uuid::new_v4(),
                    name: request.tag_name.clone().unwrap_or_default(),
                },
                public_link: None,
                created_at: now,
                updated_at: now,
            })
        }

        async fn update_note(
            &self,
            _: Uuid,
            _: &UpdateNoteRequest,
        ) -> Result<NoteDetail, ClientError> {
            unreachable!()
        }
    }

    fn pending() -> PendingNote {
        PendingNote {
            original_content: "Spotkanie zespołu".into(),
            summary_text: Some("Podsumowanie".into()),
            goal_status: GoalStatus::Achieved,
            meeting_date: None,
            tag_name: Some("Zespół".into()),
            is_ai_generated: true,
        }
    }

    #[tokio::test]
    async fn saves_once_and_clears_storage() {
        let storage = MemorySessionStorage::new();
        let api = FakeNotes::default();
        stash_pending_note(&storage, &pending()).unwrap();

        let saved = save_pending_note(&storage, &api).await.unwrap();
        assert!(saved.is_some());
        assert!(storage.get(PENDING_NOTE_KEY).is_none());

        // 2回目は何もしない
        assert!(save_pending_note(&storage, &api).await.unwrap().is_none());
        let created = api.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].tag_name.as_deref(), Some("Zespół"));
        assert!(created[0].tag_id.is_none());
    }

    #[tokio::test]
    async fn concurrent_triggers_create_one_note() {
        let storage = MemorySessionStorage::new();
        let api = FakeNotes::default();
        stash_pending_note(&storage, &pending()).unwrap();

        let (a, b) = tokio::join!(
            save_pending_note(&storage, &api),
            save_pending_note(&storage, &api)
        );
        let saved = [a.unwrap(), b.unwrap()];
        assert_eq!(saved.iter().filter(|s| s.is_some()).count(), 1);
        assert_eq!(api.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_payload_is_discarded() {
        let storage = MemorySessionStorage::new();
        let api = FakeNotes::default();
        storage.set(PENDING_NOTE_KEY, "{nie json".into());

        assert!(save_pending_note(&storage, &api).await.unwrap().is_none());
        assert!(storage.get(PENDING_NOTE_KEY).is_none());
        assert!(api.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_restores_payload_for_retry() {
        let storage = MemorySessionStorage::new();
        let api = FakeNotes {
            fail: true,
            ..Default::default()
        };
        stash_pending_note(&storage, &pending()).unwrap();

        assert!(save_pending_note(&storage, &api).await.is_err());
        assert!(storage.get(PENDING_NOTE_KEY).is_some());
    }

    #[test]
    fn missing_tag_uses_default_name() {
        let request = PendingNote {
            tag_name: Some("  ".into()),
            ..pending()
        }
        .into_request();
        assert_eq!(request.tag_name.as_deref(), Some(DEFAULT_TAG_NAME));
    }
}
