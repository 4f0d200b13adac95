use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 会議の目標が達成されたかどうか（三値）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Achieved,
    NotAchieved,
    #[default]
    Undefined,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Achieved => "achieved",
            GoalStatus::NotAchieved => "not_achieved",
            GoalStatus::Undefined => "undefined",
        }
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GoalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "achieved" => Ok(GoalStatus::Achieved),
            "not_achieved" => Ok(GoalStatus::NotAchieved),
            "undefined" => Ok(GoalStatus::Undefined),
            other => Err(format!("Invalid goal status: {other}")),
        }
    }
}

//////
// エンティティ

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    /// セッションの世代。パスワード変更ごとに増える
    pub token_version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tag_id: Uuid,
    pub original_content: String,
    pub summary_text: Option<String>,
    pub goal_status: GoalStatus,
    pub meeting_date: NaiveDate,
    pub is_ai_generated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// タグの閲覧権限（受信者）
#[derive(Debug, Clone, PartialEq)]
pub struct TagAccess {
    pub tag_id: Uuid,
    pub recipient_id: Uuid,
    pub granted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublicLink {
    pub note_id: Uuid,
    pub token: String,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//////
// 認証 API

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteAccountRequest {
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

//////
// ノート API

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRef {
    pub id: Uuid,
    pub name: String,
}

impl From<&Tag> for TagRef {
    fn from(tag: &Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicLinkResponse {
    pub token: String,
    pub url: String,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PublicLinkResponse {
    pub fn from_link(link: &PublicLink, public_base_url: &str) -> Self {
        Self {
            token: link.token.clone(),
            url: share_url(public_base_url, &link.token),
            is_enabled: link.is_enabled,
            created_at: link.created_at,
            updated_at: link.updated_at,
        }
    }
}

pub fn share_url(public_base_url: &str, token: &str) -> String {
    format!("{}/share/{}", public_base_url.trim_end_matches('/'), token)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteDetail {
    pub id: Uuid,
    pub original_content: String,
    pub summary_text: Option<String>,
    pub goal_status: GoalStatus,
    pub meeting_date: NaiveDate,
    pub is_ai_generated: bool,
    pub is_owner: bool,
    pub tag: TagRef,
    pub public_link: Option<PublicLinkResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteListItem {
    pub id: Uuid,
    pub summary_text: Option<String>,
    pub goal_status: GoalStatus,
    pub meeting_date: NaiveDate,
    pub is_ai_generated: bool,
    pub is_owner: bool,
    pub tag: TagRef,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteList {
    pub data: Vec<NoteListItem>,
    pub pagination: Pagination,
}

/// `GET /api/notes` のクエリ
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteListQuery {
    pub tag_id: Option<Uuid>,
    pub goal_status: Option<GoalStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub search: Option<String>,
    pub include_shared: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateNoteRequest {
    pub original_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_status: Option<GoalStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub is_ai_generated: bool,
}

/// 部分更新。`summary_text` に空文字を送ると要約を消去する。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateNoteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_status: Option<GoalStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<Uuid>,
}

impl UpdateNoteRequest {
    pub fn is_empty(&self) -> bool {
        self.summary_text.is_none()
            && self.goal_status.is_none()
            && self.meeting_date.is_none()
            && self.tag_id.is_none()
    }
}

//////
// タグ API

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagResponse {
    pub id: Uuid,
    pub name: String,
    pub is_owner: bool,
    pub owner_email: Option<String>,
    pub note_count: u64,
    pub recipients_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagList {
    pub tags: Vec<TagResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTagRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantAccessRequest {
    pub recipient_email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientResponse {
    pub recipient_id: Uuid,
    pub email: String,
    pub granted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientList {
    pub recipients: Vec<RecipientResponse>,
}

//////
// 公開リンク / 共有

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePublicLinkRequest {
    pub is_enabled: bool,
}

/// 公開リンクで閲覧できる範囲（原文は含めない）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicNoteResponse {
    pub summary_text: Option<String>,
    pub goal_status: GoalStatus,
    pub meeting_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

//////
// AI 要約

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateSummaryRequest {
    pub original_content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSummary {
    pub summary_text: String,
    pub goal_status: GoalStatus,
    pub suggested_tag: Option<String>,
    pub generation_time_ms: u64,
}
