//! REST API を利用するクライアント側の状態管理
//!
//! 各ウィジェット（ノート編集、公開リンク、ログイン、未保存ノート）は
//! `api` モジュールの小さなトレイト越しにサーバーと通信する。

mod api;
mod login;
mod optimistic;
mod pending;
mod public_link;
mod toast;

pub use api::{ApiClient, AuthApi, NotesApi, PublicLinkApi};
pub use login::{LoginForm, LoginOutcome};
pub use optimistic::{NoteCache, NoteEdit, NoteEditor};
pub use pending::{
    DEFAULT_TAG_NAME, MemorySessionStorage, PENDING_NOTE_KEY, PendingNote, SessionStorage,
    save_pending_note, stash_pending_note,
};
pub use public_link::PublicLinkPanel;
pub use toast::{Toast, ToastKind, Toasts};

use serde::Deserialize;

use crate::messages;

/// 401 のときの遷移先
pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP {status}: {message}")]
    Api {
        status: u16,
        message: String,
        field: Option<String>,
    },
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("{0}")]
    Invalid(String),
}

/// サーバーのエラーボディ `{ "error": ..., "field": ... }`
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(default)]
    pub field: Option<String>,
}

impl ClientError {
    /// ボディが読めなかった場合は状態コードの既定メッセージを使う
    pub fn from_status(status: u16, body: Option<ApiErrorBody>) -> Self {
        match body {
            Some(body) => ClientError::Api {
                status,
                message: body.error,
                field: body.field,
            },
            None => ClientError::Api {
                status,
                message: messages::for_status(status).to_string(),
                field: None,
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            ClientError::Api { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    /// 利用者に表示するメッセージ
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Api {
                status, message, ..
            } => {
                // 5xx の本文は表示しない
                if *status >= 500 {
                    messages::for_status(*status).to_string()
                } else {
                    message.clone()
                }
            }
            ClientError::Network(_) => messages::NETWORK_ERROR.to_string(),
            ClientError::Decode(_) => messages::SERVER_ERROR.to_string(),
            ClientError::Invalid(message) => message.clone(),
        }
    }

    pub fn requires_login(&self) -> bool {
        self.status() == Some(401)
    }

    /// 401 ならログイン画面へ
    pub fn redirect_target(&self) -> Option<&'static str> {
        self.requires_login().then_some(LOGIN_PATH)
    }

    /// 再試行で解決し得るエラー（トースト表示向け）
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Network(_) => true,
            ClientError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_hide_details() {
        let err = ClientError::from_status(
            500,
            Some(ApiErrorBody {
                error: "connection refused".into(),
                field: None,
            }),
        );
        assert_eq!(err.user_message(), messages::SERVER_ERROR);
        assert!(err.is_transient());
    }

    #[test]
    fn missing_body_falls_back_to_status_message() {
        let err = ClientError::from_status(409, None);
        assert_eq!(err.user_message(), messages::CONFLICT);
        assert!(!err.is_transient());
    }

    #[test]
    fn unauthorized_redirects_to_login() {
        let err = ClientError::from_status(401, None);
        assert_eq!(err.redirect_target(), Some(LOGIN_PATH));
        assert_eq!(ClientError::from_status(403, None).redirect_target(), None);
        assert_eq!(
            ClientError::Network("timeout".into()).user_message(),
            messages::NETWORK_ERROR
        );
    }

    #[test]
    fn keeps_field_from_body() {
        let err = ClientError::from_status(
            400,
            Some(ApiErrorBody {
                error: messages::INVALID_EMAIL.into(),
                field: Some("email".into()),
            }),
        );
        assert_eq!(err.field(), Some("email"));
        assert_eq!(err.user_message(), messages::INVALID_EMAIL);
    }
}
