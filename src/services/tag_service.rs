use chrono::Utc;
use uuid::Uuid;

use crate::auth::{normalize_email, validate_email_format};
use crate::error::{AppError, Result};
use crate::messages;
use crate::models::{RecipientList, RecipientResponse, Tag, TagAccess, TagList, TagResponse};
use crate::repositories::Repositories;

const TAG_NAME_MAX: usize = 100;

/// 前後の空白を除いたタグ名を返す（1〜100文字）
pub fn validate_tag_name(name: &str) -> Result<String> {
    let name = name.trim();
    let length = name.chars().count();
    if length == 0 || length > TAG_NAME_MAX {
        return Err(AppError::field("name", messages::TAG_NAME_INVALID));
    }
    Ok(name.to_string())
}

pub struct TagService {
    repos: Repositories,
}

impl TagService {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// 所有者のみが操作できるタグを取得する。
    /// 共有されているだけなら 403、見えないタグは 404。
    pub async fn owned_tag(&self, user_id: Uuid, tag_id: Uuid) -> Result<Tag> {
        let tag = self
            .repos
            .tags
            .find_by_id(tag_id)
            .await?
            .ok_or_else(|| AppError::NotFound(messages::TAG_NOT_FOUND.to_string()))?;

        if tag.user_id == user_id {
            return Ok(tag);
        }
        if self.repos.tags.has_access(tag_id, user_id).await? {
            return Err(AppError::Forbidden(messages::TAG_NOT_OWNER.to_string()));
        }
        Err(AppError::NotFound(messages::TAG_NOT_FOUND.to_string()))
    }

    async fn owned_response(&self, tag: Tag) -> Result<TagResponse> {
        let note_count = self.repos.notes.count_by_tag(tag.id).await?;
        let recipients_count = self.repos.tags.list_access(tag.id).await?.len() as u64;
        Ok(TagResponse {
            id: tag.id,
            name: tag.name,
            is_owner: true,
            owner_email: None,
            note_count,
            recipients_count,
            created_at: tag.created_at,
            updated_at: tag.updated_at,
        })
    }

    /// 自分のタグ（統計付き）と、共有されたタグ
    pub async fn list(&self, user_id: Uuid) -> Result<TagList> {
        let mut tags = Vec::new();
        for tag in self.repos.tags.find_by_user_id(user_id).await? {
            tags.push(self.owned_response(tag).await?);
        }

        for tag in self.repos.tags.find_shared_with(user_id).await? {
            let owner_email = self
                .repos
                .users
                .find_by_id(tag.user_id)
                .await?
                .map(|u| u.email);
            let note_count = self.repos.notes.count_by_tag(tag.id).await?;
            tags.push(TagResponse {
                id: tag.id,
                name: tag.name,
                is_owner: false,
                owner_email,
                note_count,
                recipients_count: 0,
                created_at: tag.created_at,
                updated_at: tag.updated_at,
            });
        }

        Ok(TagList { tags })
    }

    pub async fn create(&self, user_id: Uuid, name: &str) -> Result<TagResponse> {
        let tag = self.create_tag(user_id, name).await?;
        self.owned_response(tag).await
    }

    /// ノート作成からも使う（統計なし）
    pub async fn create_tag(&self, user_id: Uuid, name: &str) -> Result<Tag> {
        let name = validate_tag_name(name)?;
        let now = Utc::now();
        let tag = self
            .repos
            .tags
            .create(Tag {
                id: Uuid::new_v4(),
                user_id,
                name,
                created_at: now,
                updated_at: now,
            })
            .await?;
        tracing::info!(tag_id = %tag.id, user_id = %user_id, "tag created");
        Ok(tag)
    }

    pub async fn rename(&self, user_id: Uuid, tag_id: Uuid, name: &str) -> Result<TagResponse> {
        let name = validate_tag_name(name)?;
        let mut tag = self.owned_tag(user_id, tag_id).await?;
        tag.name = name;
        tag.updated_at = Utc::now();
        let tag = self.repos.tags.update(tag).await?;
        self.owned_response(tag).await
    }

    /// ノートが残っているタグは削除できない（409）
    pub async fn delete(&self, user_id: Uuid, tag_id: Uuid) -> Result<()> {
        self.owned_tag(user_id, tag_id).await?;
        self.repos.tags.delete(tag_id).await?;
        tracing::info!(tag_id = %tag_id, "tag deleted");
        Ok(())
    }

    pub async fn list_recipients(&self, user_id: Uuid, tag_id: Uuid) -> Result<RecipientList> {
        self.owned_tag(user_id, tag_id).await?;

        let mut recipients = Vec::new();
        for access in self.repos.tags.list_access(tag_id).await? {
            // 受信者の削除と競合した場合は飛ばす
            if let Some(user) = self.repos.users.find_by_id(access.recipient_id).await? {
                recipients.push(RecipientResponse {
                    recipient_id: access.recipient_id,
                    email: user.email,
                    granted_at: access.granted_at,
                });
            }
        }
        Ok(RecipientList { recipients })
    }

    pub async fn grant_access(
        &self,
        user_id: Uuid,
        tag_id: Uuid,
        recipient_email: &str,
    ) -> Result<RecipientResponse> {
        validate_email_format(recipient_email)
            .map_err(|_| AppError::field("recipient_email", messages::INVALID_EMAIL))?;
        self.owned_tag(user_id, tag_id).await?;

        let recipient = self
            .repos
            .users
            .find_by_email(&normalize_email(recipient_email))
            .await?
            .ok_or_else(|| AppError::NotFound(messages::RECIPIENT_NOT_FOUND.to_string()))?;

        if recipient.id == user_id {
            return Err(AppError::field(
                "recipient_email",
                messages::RECIPIENT_IS_OWNER,
            ));
        }

        let access = self
            .repos
            .tags
            .grant_access(TagAccess {
                tag_id,
                recipient_id: recipient.id,
                granted_at: Utc::now(),
            })
            .await?;
        tracing::info!(tag_id = %tag_id, recipient_id = %recipient.id, "tag access granted");

        Ok(RecipientResponse {
            recipient_id: recipient.id,
            email: recipient.email,
            granted_at: access.granted_at,
        })
    }

    pub async fn revoke_access(&self, user_id: Uuid, tag_id: Uuid, recipient_id: Uuid) -> Result<()> {
        self.owned_tag(user_id, tag_id).await?;
        self.repos.tags.revoke_access(tag_id, recipient_id).await?;
        tracing::info!(tag_id = %tag_id, recipient_id = %recipient_id, "tag access revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;

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

    #[test]
    fn tag_names_are_trimmed_and_bounded() {
        assert_eq!(validate_tag_name("  Zarząd ").unwrap(), "Zarząd");
        assert!(validate_tag_name("   ").is_err());
        assert!(validate_tag_name(&"a".repeat(101)).is_err());
        assert!(validate_tag_name(&"ą".repeat(100)).is_ok());
    }

    #[tokio::test]
    async fn duplicate_name_conflicts_without_creating_second_tag() {
        let repos = Repositories::in_memory();
        let svc = TagService::new(repos.clone());
        let owner = user(&repos, "anna@example.com").await;

        svc.create(owner, "Projekt X").await.unwrap();
        let err = svc.create(owner, "projekt x").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        assert_eq!(svc.list(owner).await.unwrap().tags.len(), 1);
    }

    #[tokio::test]
    async fn sharing_rules() {
        let repos = Repositories::in_memory();
        let svc = TagService::new(repos.clone());
        let owner = user(&repos, "anna@example.com").await;
        let friend = user(&repos, "piotr@example.com").await;
        let tag = svc.create(owner, "Zespół").await.unwrap();

        let err = svc
            .grant_access(owner, tag.id, "nikt@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = svc
            .grant_access(owner, tag.id, "anna@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::FieldError { field: "recipient_email", .. }));

        svc.grant_access(owner, tag.id, "Piotr@Example.com")
            .await
            .unwrap();
        let err = svc
            .grant_access(owner, tag.id, "piotr@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // 受信者からは読み取り専用
        let listed = svc.list(friend).await.unwrap();
        assert_eq!(listed.tags.len(), 1);
        assert!(!listed.tags[0].is_owner);
        assert_eq!(listed.tags[0].owner_email.as_deref(), Some("anna@example.com"));

        let err = svc.rename(friend, tag.id, "Moje").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let owned = svc.list(owner).await.unwrap();
        assert_eq!(owned.tags[0].recipients_count, 1);

        svc.revoke_access(owner, tag.id, friend).await.unwrap();
        assert!(svc.list(friend).await.unwrap().tags.is_empty());
        let err = svc.rename(friend, tag.id, "Moje").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
