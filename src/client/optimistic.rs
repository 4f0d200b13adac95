use chrono::NaiveDate;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{ClientError, NotesApi, Toasts};
use crate::models::{GoalStatus, NoteDetail, TagRef, UpdateNoteRequest};

/// 画面間で共有するノートのキャッシュ
#[derive(Debug, Clone, Default)]
pub struct NoteCache {
    notes: Arc<DashMap<Uuid, NoteDetail>>,
}

impl NoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, note: NoteDetail) {
        self.notes.insert(note.id, note);
    }

    pub fn get(&self, note_id: Uuid) -> Option<NoteDetail> {
        self.notes.get(&note_id).map(|n| n.clone())
    }

    pub fn remove(&self, note_id: Uuid) -> Option<NoteDetail> {
        self.notes.remove(&note_id).map(|(_, n)| n)
    }

    /// エントリがある場合のみ書き換える
    fn modify(&self, note_id: Uuid, f: impl FnOnce(&mut NoteDetail)) -> bool {
        match self.notes.get_mut(&note_id) {
            Some(mut note) => {
                f(&mut note);
                true
            }
            None => false,
        }
    }
}

/// ノート詳細画面で編集できる1フィールド分の変更
#[derive(Debug, Clone, PartialEq)]
pub enum NoteEdit {
    /// `None` は要約の消去
    Summary(Option<String>),
    GoalStatus(GoalStatus),
    MeetingDate(NaiveDate),
    Tag(TagRef),
}

impl NoteEdit {
    fn apply(&self, note: &mut NoteDetail) {
        match self {
            NoteEdit::Summary(text) => note.summary_text = text.clone(),
            NoteEdit::GoalStatus(status) => note.goal_status = *status,
            NoteEdit::MeetingDate(date) => note.meeting_date = *date,
            NoteEdit::Tag(tag) => note.tag = tag.clone(),
        }
    }

    /// 同じフィールドの現在値（ロールバック用）
    fn previous(&self, note: &NoteDetail) -> NoteEdit {
        match self {
            NoteEdit::Summary(_) => NoteEdit::Summary(note.summary_text.clone()),
            NoteEdit::GoalStatus(_) => NoteEdit::GoalStatus(note.goal_status),
            NoteEdit::MeetingDate(_) => NoteEdit::MeetingDate(note.meeting_date),
            NoteEdit::Tag(_) => NoteEdit::Tag(note.tag.clone()),
        }
    }

    pub fn to_request(&self) -> UpdateNoteRequest {
        match self {
            // 空文字で要約を消去
            NoteEdit::Summary(text) => UpdateNoteRequest {
                summary_text: Some(text.clone().unwrap_or_default()),
                ..Default::default()
            },
            NoteEdit::GoalStatus(status) => UpdateNoteRequest {
                goal_status: Some(*status),
                ..Default::default()
            },
            NoteEdit::MeetingDate(date) => UpdateNoteRequest {
                meeting_date: Some(*date),
                ..Default::default()
            },
            NoteEdit::Tag(tag) => UpdateNoteRequest {
                tag_id: Some(tag.id),
                ..Default::default()
            },
        }
    }
}

/// 楽観的更新: キャッシュを先に書き換え、失敗したらそのフィールドだけ戻す。
/// 後勝ちで、競合の調停はしない。
pub struct NoteEditor<A> {
    api: A,
    cache: NoteCache,
    toasts: Toasts,
}

impl<A: NotesApi> NoteEditor<A> {
    pub fn new(api: A, cache: NoteCache, toasts: Toasts) -> Self {
        Self { api, cache, toasts }
    }

    pub fn cache(&self) -> &NoteCache {
        &self.cache
    }

    pub async fn edit(&self, note_id: Uuid, edit: NoteEdit) -> Result<NoteDetail, ClientError> {
        let mut rollback = None;
        self.cache.modify(note_id, |note| {
            rollback = Some(edit.previous(note));
            edit.apply(note);
        });

        match self.api.update_note(note_id, &edit.to_request()).await {
            Ok(note) => {
                self.cache.insert(note.clone());
                Ok(note)
            }
            Err(err) => {
                if let Some(previous) = rollback {
                    self.cache.modify(note_id, |note| previous.apply(note));
                }
                tracing::warn!(note_id = %note_id, error = %err, "note update failed, rolled back");
                self.toasts.error(err.user_message());
                Err(err)
            }
        }
    }
}
