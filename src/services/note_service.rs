use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::messages;
use crate::models::{
    CreateNoteRequest, Note, NoteDetail, NoteList, NoteListItem, NoteListQuery, Pagination,
    PublicLinkResponse, Tag, TagRef, UpdateNoteRequest,
};
use crate::repositories::{NoteFilter, Repositories};
use crate::services::TagService;

const CONTENT_MAX: usize = 5000;
const SUMMARY_MAX: usize = 2000;
const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

pub fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(AppError::field("original_content", messages::CONTENT_REQUIRED));
    }
    if content.chars().count() > CONTENT_MAX {
        return Err(AppError::field("original_content", messages::CONTENT_TOO_LONG));
    }
    Ok(())
}

/// 空白のみの要約は「要約なし」として扱う
fn normalize_summary(summary: Option<String>) -> Result<Option<String>> {
    let Some(summary) = summary else {
        return Ok(None);
    };
    let summary = summary.trim();
    if summary.is_empty() {
        return Ok(None);
    }
    if summary.chars().count() > SUMMARY_MAX {
        return Err(AppError::field("summary_text", messages::SUMMARY_TOO_LONG));
    }
    Ok(Some(summary.to_string()))
}

/// 一覧クエリを検証してリポジトリ用のフィルタに変換
fn build_filter(viewer_id: Uuid, query: NoteListQuery) -> Result<(NoteFilter, u32, u32)> {
    let page = query.page.unwrap_or(1);
    if page == 0 {
        return Err(AppError::field("page", messages::INVALID_PAGINATION));
    }
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(AppError::field("limit", messages::INVALID_PAGINATION));
    }
    if let (Some(from), Some(to)) = (query.date_from, query.date_to) {
        if from > to {
            return Err(AppError::field("date_from", messages::INVALID_DATE_RANGE));
        }
    }

    let filter = NoteFilter {
        viewer_id,
        include_shared: query.include_shared.unwrap_or(true),
        tag_id: query.tag_id,
        goal_status: query.goal_status,
        date_from: query.date_from,
        date_to: query.date_to,
        search: query
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        offset: u64::from(page - 1) * u64::from(limit),
        limit: u64::from(limit),
    };
    Ok((filter, page, limit))
}

pub struct NoteService {
    repos: Repositories,
    tag_service: Arc<TagService>,
    public_base_url: String,
}

impl NoteService {
    pub fn new(repos: Repositories, tag_service: Arc<TagService>, public_base_url: String) -> Self {
        Self {
            repos,
            tag_service,
            public_base_url,
        }
    }

    /// 閲覧可能なノート（所有者または共有先）。それ以外は存在を明かさず 404。
    async fn readable_note(&self, viewer_id: Uuid, note_id: Uuid) -> Result<Note> {
        let not_found = || AppError::NotFound(messages::NOTE_NOT_FOUND.to_string());
        let note = self
            .repos
            .notes
            .find_by_id(note_id)
            .await?
            .ok_or_else(not_found)?;

        if note.user_id == viewer_id || self.repos.tags.has_access(note.tag_id, viewer_id).await? {
            Ok(note)
        } else {
            Err(not_found())
        }
    }

    /// 変更可能なノート。共有先ユーザーには 403。
    pub async fn owned_note(&self, user_id: Uuid, note_id: Uuid) -> Result<Note> {
        let note = self.readable_note(user_id, note_id).await?;
        if note.user_id != user_id {
            return Err(AppError::Forbidden(messages::NOTE_NOT_OWNER.to_string()));
        }
        Ok(note)
    }

    async fn tag_of(&self, note: &Note) -> Result<Tag> {
        self.repos
            .tags
            .find_by_id(note.tag_id)
            .await?
            .ok_or_else(|| AppError::DatabaseError(format!("note {} has no tag", note.id)))
    }

    async fn detail(&self, viewer_id: Uuid, note: Note) -> Result<NoteDetail> {
        let tag = self.tag_of(&note).await?;
        let is_owner = note.user_id == viewer_id;
        let public_link = if is_owner {
            self.repos
                .public_links
                .find_by_note(note.id)
                .await?
                .map(|link| PublicLinkResponse::from_link(&link, &self.public_base_url))
        } else {
            None
        };

        Ok(NoteDetail {
            id: note.id,
            original_content: note.original_content,
            summary_text: note.summary_text,
            goal_status: note.goal_status,
            meeting_date: note.meeting_date,
            is_ai_generated: note.is_ai_generated,
            is_owner,
            tag: TagRef::from(&tag),
            public_link,
            created_at: note.created_at,
            updated_at: note.updated_at,
        })
    }

    /// 自分のタグのみ割り当て可能
    async fn assignable_tag(&self, user_id: Uuid, tag_id: Uuid) -> Result<Tag> {
        self.tag_service
            .owned_tag(user_id, tag_id)
            .await
            .map_err(|e| match e {
                AppError::NotFound(msg) | AppError::Forbidden(msg) => {
                    AppError::FieldError {
                        field: "tag_id",
                        message: msg,
                    }
                }
                other => other,
            })
    }

    pub async fn list(&self, viewer_id: Uuid, query: NoteListQuery) -> Result<NoteList> {
        let (filter, page, limit) = build_filter(viewer_id, query)?;
        let (notes, total) = self.repos.notes.list(&filter).await?;

        let mut tags: HashMap<Uuid, TagRef> = HashMap::new();
        let mut data = Vec::with_capacity(notes.len());
        for note in notes {
            if !tags.contains_key(&note.tag_id) {
                let tag = self.tag_of(&note).await?;
                tags.insert(tag.id, TagRef::from(&tag));
            }
            let tag = tags
                .get(&note.tag_id)
                .cloned()
                .ok_or_else(|| AppError::DatabaseError(format!("note {} has no tag", note.id)))?;

            data.push(NoteListItem {
                id: note.id,
                summary_text: note.summary_text,
                goal_status: note.goal_status,
                meeting_date: note.meeting_date,
                is_ai_generated: note.is_ai_generated,
                is_owner: note.user_id == viewer_id,
                tag,
                created_at: note.created_at,
                updated_at: note.updated_at,
            });
        }

        Ok(NoteList {
            data,
            pagination: Pagination { page, limit, total },
        })
    }

    pub async fn get(&self, viewer_id: Uuid, note_id: Uuid) -> Result<NoteDetail> {
        let note = self.readable_note(viewer_id, note_id).await?;
        self.detail(viewer_id, note).await
    }

    pub async fn create(&self, user_id: Uuid, req: CreateNoteRequest) -> Result<NoteDetail> {
        validate_content(&req.original_content)?;
        let summary_text = normalize_summary(req.summary_text)?;

        let tag_name = req
            .tag_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let tag = match (req.tag_id, tag_name) {
            (Some(tag_id), None) => self.assignable_tag(user_id, tag_id).await?,
            (None, Some(name)) => self.find_or_create_tag(user_id, name).await?,
            _ => return Err(AppError::field("tag_id", messages::TAG_CHOICE_REQUIRED)),
        };

        let now = Utc::now();
        let note = Note {
            id: Uuid::new_v4(),
            user_id,
            tag_id: tag.id,
            original_content: req.original_content,
            summary_text,
            goal_status: req.goal_status.unwrap_or_default(),
            meeting_date: req.meeting_date.unwrap_or_else(|| now.date_naive()),
            is_ai_generated: req.is_ai_generated,
            created_at: now,
            updated_at: now,
        };
        let note = self.repos.notes.create(note).await?;
        tracing::info!(note_id = %note.id, user_id = %user_id, "note created");

        self.detail(user_id, note).await
    }

    async fn find_or_create_tag(&self, user_id: Uuid, name: &str) -> Result<Tag> {
        if let Some(tag) = self.repos.tags.find_by_name(user_id, name).await? {
            return Ok(tag);
        }
        match self.tag_service.create_tag(user_id, name).await {
            // 同名タグの同時作成に負けた場合は既存を使う
            Err(AppError::Conflict(msg)) => self
                .repos
                .tags
                .find_by_name(user_id, name)
                .await?
                .ok_or(AppError::Conflict(msg)),
            other => other,
        }
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        note_id: Uuid,
        req: UpdateNoteRequest,
    ) -> Result<NoteDetail> {
        if req.is_empty() {
            return Err(AppError::ValidationError(messages::EMPTY_UPDATE.to_string()));
        }
        let mut note = self.owned_note(user_id, note_id).await?;

        if let Some(summary) = req.summary_text {
            note.summary_text = normalize_summary(Some(summary))?;
        }
        if let Some(status) = req.goal_status {
            note.goal_status = status;
        }
        if let Some(date) = req.meeting_date {
            note.meeting_date = date;
        }
        if let Some(tag_id) = req.tag_id {
            note.tag_id = self.assignable_tag(user_id, tag_id).await?.id;
        }
        note.updated_at = Utc::now();

        let note = self.repos.notes.update(note).await?;
        self.detail(user_id, note).await
    }

    pub async fn delete(&self, user_id: Uuid, note_id: Uuid) -> Result<()> {
        self.owned_note(user_id, note_id).await?;
        self.repos.notes.delete(note_id).await?;
        tracing::info!(note_id = %note_id, "note deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::models::{GoalStatus, User};

    struct Fixture {
        repos: Repositories,
        notes: NoteService,
        tags: Arc<TagService>,
    }

    fn fixture() -> Fixture {
        let repos = Repositories::in_memory();
        let tags = Arc::new(TagService::new(repos.clone()));
        let notes = NoteService::new(repos.clone(), tags.clone(), "http://localhost:3000".into());
        Fixture { repos, notes, tags }
    }

    async fn user(repos: &Repositories, email: &str) -> Uuid {
        let now = Utc::now();
        repos
            .users
            .create(User {
                id: Uuid::new_v4(),
                email: email.to_string(),
                password_hash: "x".to_string(),
                token_version: 0,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
            .id
    }

    fn new_note(tag_name: &str) -> CreateNoteRequest {
        CreateNoteRequest {
            original_content: "Omówiliśmy budżet na Q3.".to_string(),
            summary_text: Some("Budżet Q3".to_string()),
            tag_name: Some(tag_name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn list_query_defaults_and_bounds() {
        let viewer = Uuid::new_v4();
        let (filter, page, limit) = build_filter(viewer, NoteListQuery::default()).unwrap();
        assert_eq!((page, limit), (1, 20));
        assert!(filter.include_shared);
        assert_eq!(filter.offset, 0);

        let query = NoteListQuery {
            page: Some(3),
            limit: Some(10),
            search: Some("   ".into()),
            ..Default::default()
        };
        let (filter, _, _) = build_filter(viewer, query).unwrap();
        assert_eq!(filter.offset, 20);
        assert!(filter.search.is_none());

        for query in [
            NoteListQuery { page: Some(0), ..Default::default() },
            NoteListQuery { limit: Some(101), ..Default::default() },
            NoteListQuery {
                date_from: NaiveDate::from_ymd_opt(2024, 2, 1),
                date_to: NaiveDate::from_ymd_opt(2024, 1, 1),
                ..Default::default()
            },
        ] {
            assert!(build_filter(viewer, query).is_err());
        }
    }

    #[tokio::test]
    async fn create_requires_exactly_one_tag_choice() {
        let f = fixture();
        let owner = user(&f.repos, "anna@example.com").await;
        let tag = f.tags.create_tag(owner, "Zarząd").await.unwrap();

        let mut both = new_note("Zarząd");
        both.tag_id = Some(tag.id);
        let err = f.notes.create(owner, both).await.unwrap_err();
        assert!(matches!(err, AppError::FieldError { field: "tag_id", .. }));

        let mut none = new_note("");
        none.tag_name = None;
        assert!(f.notes.create(owner, none).await.is_err());
    }

    #[tokio::test]
    async fn create_reuses_existing_tag_by_name() {
        let f = fixture();
        let owner = user(&f.repos, "anna@example.com").await;

        let first = f.notes.create(owner, new_note("Zarząd")).await.unwrap();
        let second = f.notes.create(owner, new_note("zarząd")).await.unwrap();
        assert_eq!(first.tag.id, second.tag.id);
        assert!(first.is_owner);
        assert_eq!(first.goal_status, GoalStatus::Undefined);
        assert_eq!(first.meeting_date, Utc::now().date_naive());
    }

    #[tokio::test]
    async fn recipients_can_read_but_not_modify() {
        let f = fixture();
        let owner = user(&f.repos, "anna@example.com").await;
        let friend = user(&f.repos, "piotr@example.com").await;
        let stranger = user(&f.repos, "obcy@example.com").await;

        let note = f.notes.create(owner, new_note("Zespół")).await.unwrap();
        f.tags
            .grant_access(owner, note.tag.id, "piotr@example.com")
            .await
            .unwrap();

        let seen = f.notes.get(friend, note.id).await.unwrap();
        assert!(!seen.is_owner);
        assert!(seen.public_link.is_none());

        let update = UpdateNoteRequest {
            goal_status: Some(GoalStatus::Achieved),
            ..Default::default()
        };
        let err = f.notes.update(friend, note.id, update.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = f.notes.get(stranger, note.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let list = f.notes.list(friend, NoteListQuery::default()).await.unwrap();
        assert_eq!(list.pagination.total, 1);
        assert!(!list.data[0].is_owner);
    }

    #[tokio::test]
    async fn update_applies_fields_and_clears_summary() {
        let f = fixture();
        let owner = user(&f.repos, "anna@example.com").await;
        let note = f.notes.create(owner, new_note("Zarząd")).await.unwrap();

        let err = f
            .notes
            .update(owner, note.id, UpdateNoteRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let updated = f
            .notes
            .update(
                owner,
                note.id,
                UpdateNoteRequest {
                    summary_text: Some(String::new()),
                    goal_status: Some(GoalStatus::NotAchieved),
                    meeting_date: NaiveDate::from_ymd_opt(2024, 3, 14),
                    tag_id: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.summary_text, None);
        assert_eq!(updated.goal_status, GoalStatus::NotAchieved);
        assert_eq!(updated.meeting_date.to_string(), "2024-03-14");
        assert_eq!(updated.original_content, note.original_content);
    }

    #[tokio::test]
    async fn cannot_move_note_to_foreign_tag() {
        let f = fixture();
        let owner = user(&f.repos, "anna@example.com").await;
        let other = user(&f.repos, "piotr@example.com").await;
        let note = f.notes.create(owner, new_note("Moje")).await.unwrap();
        let foreign = f.tags.create_tag(other, "Cudze").await.unwrap();

        let err = f
            .notes
            .update(
                owner,
                note.id,
                UpdateNoteRequest {
                    tag_id: Some(foreign.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::FieldError { field: "tag_id", .. }));
    }
}
