use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::messages;
use crate::models::{Note, PublicLink, Tag, TagAccess, User};
use crate::repositories::{
    JWTHandler, NoteFilter, NoteRepository, PublicLinkRepository, TagRepository, UserHandler,
};

/// 開発・テスト用のインメモリストレージ。
/// 一意制約は副インデックスの entry API で保証する。
/// 同じマップの Ref を保持したまま書き込まないこと（デッドロックする）。
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<Uuid, User>,
    // 正規化済みemail -> user_id
    user_emails: DashMap<String, Uuid>,
    notes: DashMap<Uuid, Note>,
    tags: DashMap<Uuid, Tag>,
    // (user_id, 小文字の名前) -> tag_id
    tag_names: DashMap<(Uuid, String), Uuid>,
    tag_access: DashMap<(Uuid, Uuid), TagAccess>,
    // note_id -> PublicLink
    public_links: DashMap<Uuid, PublicLink>,
    // token -> note_id
    link_tokens: DashMap<String, Uuid>,
    // jti -> expires_at
    revoked: DashMap<String, DateTime<Utc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_visible(&self, note: &Note, viewer_id: Uuid, include_shared: bool) -> bool {
        note.user_id == viewer_id
            || (include_shared && self.tag_access.contains_key(&(note.tag_id, viewer_id)))
    }

    fn remove_link(&self, note_id: Uuid) -> Option<PublicLink> {
        let (_, link) = self.public_links.remove(&note_id)?;
        self.link_tokens.remove(&link.token);
        Some(link)
    }
}

fn tag_key(tag: &Tag) -> (Uuid, String) {
    (tag.user_id, tag.name.to_lowercase())
}

#[async_trait]
impl UserHandler for MemoryStore {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let Some(user_id) = self.user_emails.get(email).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn create(&self, user: User) -> Result<User> {
        match self.user_emails.entry(user.email.clone()) {
            Entry::Occupied(_) => return Err(AppError::Conflict(messages::EMAIL_TAKEN.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(user.id);
            }
        }
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))?;
        user.password_hash = password_hash.to_string();
        user.token_version += 1;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<()> {
        let (_, user) = self
            .users
            .remove(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))?;
        self.user_emails.remove(&user.email);

        let note_ids: Vec<Uuid> = self
            .notes
            .iter()
            .filter(|n| n.user_id == user_id)
            .map(|n| n.id)
            .collect();
        for note_id in note_ids {
            self.notes.remove(&note_id);
            self.remove_link(note_id);
        }

        let owned_tags: Vec<Tag> = self
            .tags
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.clone())
            .collect();
        for tag in owned_tags {
            self.tags.remove(&tag.id);
            self.tag_names.remove(&tag_key(&tag));
            self.tag_access.retain(|(tag_id, _), _| *tag_id != tag.id);
        }

        self.tag_access
            .retain(|(_, recipient_id), _| *recipient_id != user_id);
        Ok(())
    }
}

#[async_trait]
impl NoteRepository for MemoryStore {
    async fn find_by_id(&self, note_id: Uuid) -> Result<Option<Note>> {
        Ok(self.notes.get(&note_id).map(|n| n.clone()))
    }

    async fn list(&self, filter: &NoteFilter) -> Result<(Vec<Note>, u64)> {
        let search = filter.search.as_deref().map(str::to_lowercase);

        let mut matched: Vec<Note> = self
            .notes
            .iter()
            .map(|n| n.clone())
            .filter(|n| self.is_visible(n, filter.viewer_id, filter.include_shared))
            .filter(|n| filter.tag_id.is_none_or(|id| n.tag_id == id))
            .filter(|n| filter.goal_status.is_none_or(|s| n.goal_status == s))
            .filter(|n| filter.date_from.is_none_or(|d| n.meeting_date >= d))
            .filter(|n| filter.date_to.is_none_or(|d| n.meeting_date <= d))
            .filter(|n| match &search {
                Some(needle) => n
                    .summary_text
                    .as_deref()
                    .is_some_and(|s| s.to_lowercase().contains(needle.as_str())),
                None => true,
            })
            .collect();

        matched.sort_by(|a, b| {
            b.meeting_date
                .cmp(&a.meeting_date)
                .then(b.created_at.cmp(&a.created_at))
        });

        let total = matched.len() as u64;
        let page = matched
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn create(&self, note: Note) -> Result<Note> {
        self.notes.insert(note.id, note.clone());
        Ok(note)
    }

    async fn update(&self, note: Note) -> Result<Note> {
        let mut stored = self
            .notes
            .get_mut(&note.id)
            .ok_or_else(|| AppError::NotFound(format!("Note {} not found", note.id)))?;
        *stored = note.clone();
        Ok(note)
    }

    async fn delete(&self, note_id: Uuid) -> Result<()> {
        self.notes
            .remove(&note_id)
            .ok_or_else(|| AppError::NotFound(format!("Note {note_id} not found")))?;
        self.remove_link(note_id);
        Ok(())
    }

    async fn count_by_tag(&self, tag_id: Uuid) -> Result<u64> {
        Ok(self.notes.iter().filter(|n| n.tag_id == tag_id).count() as u64)
    }
}

#[async_trait]
impl TagRepository for MemoryStore {
    async fn find_by_id(&self, tag_id: Uuid) -> Result<Option<Tag>> {
        Ok(self.tags.get(&tag_id).map(|t| t.clone()))
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Tag>> {
        let mut tags: Vec<Tag> = self
            .tags
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.clone())
            .collect();
        tags.sort_by_key(|t| t.name.to_lowercase());
        Ok(tags)
    }

    async fn find_by_name(&self, user_id: Uuid, name: &str) -> Result<Option<Tag>> {
        let Some(tag_id) = self
            .tag_names
            .get(&(user_id, name.to_lowercase()))
            .map(|id| *id)
        else {
            return Ok(None);
        };
        Ok(self.tags.get(&tag_id).map(|t| t.clone()))
    }

    async fn find_shared_with(&self, recipient_id: Uuid) -> Result<Vec<Tag>> {
        let tag_ids: Vec<Uuid> = self
            .tag_access
            .iter()
            .filter(|a| a.recipient_id == recipient_id)
            .map(|a| a.tag_id)
            .collect();
        let mut tags: Vec<Tag> = tag_ids
            .into_iter()
            .filter_map(|id| self.tags.get(&id).map(|t| t.clone()))
            .collect();
        tags.sort_by_key(|t| t.name.to_lowercase());
        Ok(tags)
    }

    async fn create(&self, tag: Tag) -> Result<Tag> {
        match self.tag_names.entry(tag_key(&tag)) {
            Entry::Occupied(_) => {
                return Err(AppError::Conflict(messages::TAG_NAME_TAKEN.to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(tag.id);
            }
        }
        self.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    async fn update(&self, tag: Tag) -> Result<Tag> {
        let previous = self
            .tags
            .get(&tag.id)
            .map(|t| t.clone())
            .ok_or_else(|| AppError::NotFound(format!("Tag {} not found", tag.id)))?;

        let old_key = tag_key(&previous);
        let new_key = tag_key(&tag);
        if old_key != new_key {
            match self.tag_names.entry(new_key) {
                Entry::Occupied(_) => {
                    return Err(AppError::Conflict(messages::TAG_NAME_TAKEN.to_string()));
                }
                Entry::Vacant(slot) => {
                    slot.insert(tag.id);
                }
            }
            self.tag_names.remove(&old_key);
        }

        self.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    async fn delete(&self, tag_id: Uuid) -> Result<()> {
        if self.notes.iter().any(|n| n.tag_id == tag_id) {
            return Err(AppError::Conflict(messages::TAG_HAS_NOTES.to_string()));
        }
        let (_, tag) = self
            .tags
            .remove(&tag_id)
            .ok_or_else(|| AppError::NotFound(format!("Tag {tag_id} not found")))?;
        self.tag_names.remove(&tag_key(&tag));
        self.tag_access.retain(|(id, _), _| *id != tag_id);
        Ok(())
    }

    async fn grant_access(&self, access: TagAccess) -> Result<TagAccess> {
        match self.tag_access.entry((access.tag_id, access.recipient_id)) {
            Entry::Occupied(_) => Err(AppError::Conflict(messages::RECIPIENT_EXISTS.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(access.clone());
                Ok(access)
            }
        }
    }

    async fn revoke_access(&self, tag_id: Uuid, recipient_id: Uuid) -> Result<()> {
        self.tag_access
            .remove(&(tag_id, recipient_id))
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(messages::RECIPIENT_MISSING.to_string()))
    }

    async fn list_access(&self, tag_id: Uuid) -> Result<Vec<TagAccess>> {
        let mut access: Vec<TagAccess> = self
            .tag_access
            .iter()
            .filter(|a| a.tag_id == tag_id)
            .map(|a| a.clone())
            .collect();
        access.sort_by_key(|a| a.granted_at);
        Ok(access)
    }

    async fn has_access(&self, tag_id: Uuid, user_id: Uuid) -> Result<bool> {
        Ok(self.tag_access.contains_key(&(tag_id, user_id)))
    }
}

#[async_trait]
impl PublicLinkRepository for MemoryStore {
    async fn find_by_note(&self, note_id: Uuid) -> Result<Option<PublicLink>> {
        Ok(self.public_links.get(&note_id).map(|l| l.clone()))
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<PublicLink>> {
        let Some(note_id) = self.link_tokens.get(token).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.public_links.get(&note_id).map(|l| l.clone()))
    }

    async fn create(&self, link: PublicLink) -> Result<PublicLink> {
        if self.public_links.contains_key(&link.note_id) {
            return Err(AppError::Conflict(messages::CONFLICT.to_string()));
        }
        match self.link_tokens.entry(link.token.clone()) {
            Entry::Occupied(_) => return Err(AppError::Conflict(messages::CONFLICT.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(link.note_id);
            }
        }
        self.public_links.insert(link.note_id, link.clone());
        Ok(link)
    }

    async fn set_enabled(
        &self,
        note_id: Uuid,
        is_enabled: bool,
        updated_at: DateTime<Utc>,
    ) -> Result<PublicLink> {
        let mut link = self
            .public_links
            .get_mut(&note_id)
            .ok_or_else(|| AppError::NotFound(messages::PUBLIC_LINK_NOT_FOUND.to_string()))?;
        link.is_enabled = is_enabled;
        link.updated_at = updated_at;
        Ok(link.clone())
    }

    async fn rotate_token(
        &self,
        note_id: Uuid,
        token: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<PublicLink> {
        // リンクのエントリを保持したままトークン索引を差し替える
        let mut link = self
            .public_links
            .get_mut(&note_id)
            .ok_or_else(|| AppError::NotFound(messages::PUBLIC_LINK_NOT_FOUND.to_string()))?;

        match self.link_tokens.entry(token.to_string()) {
            Entry::Occupied(_) => return Err(AppError::Conflict(messages::CONFLICT.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(note_id);
            }
        }
        self.link_tokens.remove(&link.token);

        link.token = token.to_string();
        link.updated_at = updated_at;
        Ok(link.clone())
    }

    async fn delete(&self, note_id: Uuid) -> Result<()> {
        self.remove_link(note_id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(messages::PUBLIC_LINK_NOT_FOUND.to_string()))
    }
}

#[async_trait]
impl JWTHandler for MemoryStore {
    async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<()> {
        self.revoked.entry(jti.to_string()).or_insert(expires_at);
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool> {
        Ok(self.revoked.contains_key(jti))
    }

    async fn cleanup(&self) -> Result<u64> {
        let now = Utc::now();
        let before = self.revoked.len();
        self.revoked.retain(|_, expires_at| *expires_at > now);
        Ok((before - self.revoked.len()) as u64)
    }
}
