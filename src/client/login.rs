use super::{AuthApi, ClientError, NotesApi, SessionStorage, Toasts, save_pending_note};
use crate::auth::is_valid_email;
use crate::messages;
use crate::models::{LoginRequest, UserResponse};

#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    LoggedIn(UserResponse),
    /// フィールドのエラーを表示済み
    Rejected,
}

/// ログインフォームの状態
#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub email_error: Option<String>,
    pub password_error: Option<String>,
    /// フォーム上部に出すエラー（レート制限・通信エラーなど）
    pub form_error: Option<String>,
}

impl LoginForm {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    fn clear_errors(&mut self) {
        self.email_error = None;
        self.password_error = None;
        self.form_error = None;
    }

    /// 送信前のチェック
    pub fn validate(&mut self) -> bool {
        self.clear_errors();
        let email = self.email.trim();
        if email.is_empty() {
            self.email_error = Some(messages::EMAIL_REQUIRED.to_string());
        } else if !is_valid_email(email) {
            self.email_error = Some(messages::INVALID_EMAIL.to_string());
        }
        if self.password.is_empty() {
            self.password_error = Some(messages::PASSWORD_REQUIRED.to_string());
        }
        self.email_error.is_none() && self.password_error.is_none()
    }

    pub async fn submit<A: AuthApi>(&mut self, api: &A) -> Result<LoginOutcome, ClientError> {
        if !self.validate() {
            return Ok(LoginOutcome::Rejected);
        }

        let request = LoginRequest {
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        };
        match api.login(&request).await {
            Ok(user) => Ok(LoginOutcome::LoggedIn(user)),
            // 認証失敗はメール欄に表示し、パスワード欄には触れない
            Err(err) if err.requires_login() => {
                self.email_error = Some(err.user_message());
                Ok(LoginOutcome::Rejected)
            }
            Err(err) if err.status() == Some(400) => {
                match err.field() {
                    Some("password") => self.password_error = Some(err.user_message()),
                    Some("email") => self.email_error = Some(err.user_message()),
                    _ => self.form_error = Some(err.user_message()),
                }
                Ok(LoginOutcome::Rejected)
            }
            Err(err) => {
                self.form_error = Some(err.user_message());
                Err(err)
            }
        }
    }

    /// ログインし、成功したら保留中のノートを保存する。
    ///
    /// ノートの保存に失敗してもログイン自体は成功として扱う。
    /// ペイロードはストレージに戻るので後から再試行できる。
    pub async fn submit_and_restore<A: AuthApi + NotesApi>(
        &mut self,
        api: &A,
        storage: &dyn SessionStorage,
        toasts: &Toasts,
    ) -> Result<LoginOutcome, ClientError> {
        let outcome = self.submit(api).await?;
        if let LoginOutcome::LoggedIn(_) = &outcome {
            match save_pending_note(storage, api).await {
                Ok(Some(_)) => toasts.success(messages::PENDING_NOTE_SAVED),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "failed to save pending note after login");
                    toasts.error(err.user_message());
                }
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{
        MemorySessionStorage, PENDING_NOTE_KEY, PendingNote, ToastKind, stash_pending_note,
    };
    use crate::models::{
        CreateNoteRequest, GoalStatus, NoteDetail, TagRef, UpdateNoteRequest,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct FakeAuth {
        status: Option<u16>,
        create_status: Option<u16>,
        created: Mutex<Vec<CreateNoteRequest>>,
    }

    impl FakeAuth {
        fn failing(status: u16) -> Self {
            Self {
                status: Some(status),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl AuthApi for FakeAuth {
        async fn login(&self, request: &LoginRequest) -> Result<UserResponse, ClientError> {
            match self.status {
                Some(status) => Err(ClientError::from_status(
                    status,
                    Some(crate::client::ApiErrorBody {
                        error: messages::for_status(status).to_string(),
                        field: None,
                    }),
                )),
                None => Ok(UserResponse {
                    id: Uuid::new_v4(),
                    email: request.email.clone(),
                    created_at: Utc::now(),
                }),
            }
        }
    }

    #[async_trait]
    impl NotesApi for FakeAuth {
        async fn create_note(&self, request: &CreateNoteRequest) -> Result<NoteDetail, ClientError> {
            if let Some(status) = self.create_status {
                return Err(ClientError::from_status(status, None));
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

    fn stashed() -> MemorySessionStorage {
        let storage = MemorySessionStorage::new();
        stash_pending_note(
            &storage,
            &PendingNote {
                original_content: "Planowanie sprintu".into(),
                summary_text: Some("Plan".into()),
                goal_status: GoalStatus::Achieved,
                meeting_date: None,
                tag_name: None,
                is_ai_generated: true,
            },
        )
        .unwrap();
        storage
    }

    #[tokio::test]
    async fn unauthorized_sets_email_error_only() {
        let mut form = LoginForm::new("anna@example.com", "zlehaslo1");
        let outcome = form.submit(&FakeAuth::failing(401)).await.unwrap();

        assert_eq!(outcome, LoginOutcome::Rejected);
        assert_eq!(form.email_error.as_deref(), Some(messages::UNAUTHORIZED));
        assert_eq!(form.password, "zlehaslo1");
        assert!(form.password_error.is_none());
    }

    #[tokio::test]
    async fn local_validation_skips_request() {
        let mut form = LoginForm::new("bez-malpy", "");
        // status があれば呼ばれた時点でエラーになる
        let outcome = form.submit(&FakeAuth::failing(500)).await.unwrap();

        assert_eq!(outcome, LoginOutcome::Rejected);
        assert_eq!(form.email_error.as_deref(), Some(messages::INVALID_EMAIL));
        assert_eq!(form.password_error.as_deref(), Some(messages::PASSWORD_REQUIRED));
        assert!(form.form_error.is_none());
    }

    #[tokio::test]
    async fn rate_limit_is_shown_above_form() {
        let mut form = LoginForm::new("anna@example.com", "haslo1234");
        let err = form
            .submit(&FakeAuth::failing(429))
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(form.form_error.as_deref(), Some(messages::TOO_MANY_REQUESTS));
        assert!(form.email_error.is_none());
    }

    #[tokio::test]
    async fn successful_login_returns_user() {
        let mut form = LoginForm::new(" anna@example.com ", "haslo1234");
        let outcome = form.submit(&FakeAuth::default()).await.unwrap();
        match outcome {
            LoginOutcome::LoggedIn(user) => assert_eq!(user.email, "anna@example.com"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn login_saves_pending_note_once() {
        let api = FakeAuth::default();
        let storage = stashed();
        let toasts = Toasts::new();

        let mut form = LoginForm::new("anna@example.com", "haslo1234");
        let outcome = form
            .submit_and_restore(&api, &storage, &toasts)
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::LoggedIn(_)));
        assert!(storage.get(PENDING_NOTE_KEY).is_none());

        // 再ログインしても二重に作成しない
        form.submit_and_restore(&api, &storage, &toasts)
            .await
            .unwrap();
        assert_eq!(api.created.lock().unwrap().len(), 1);

        let shown = toasts.drain();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].kind, ToastKind::Success);
        assert_eq!(shown[0].message, messages::PENDING_NOTE_SAVED);
    }

    #[tokio::test]
    async fn rejected_login_keeps_pending_note() {
        let api = FakeAuth::failing(401);
        let storage = stashed();
        let toasts = Toasts::new();

        let mut form = LoginForm::new("anna@example.com", "zlehaslo1");
        let outcome = form
            .submit_and_restore(&api, &storage, &toasts)
            .await
            .unwrap();
        assert_eq!(outcome, LoginOutcome::Rejected);
        assert!(storage.get(PENDING_NOTE_KEY).is_some());
        assert!(api.created.lock().unwrap().is_empty());
        assert!(toasts.is_empty());
    }

    #[tokio::test]
    async fn failed_restore_still_logs_in() {
        let api = FakeAuth {
            create_status: Some(503),
            ..Default::default()
        };
        let storage = stashed();
        let toasts = Toasts::new();

        let mut form = LoginForm::new("anna@example.com", "haslo1234");
        let outcome = form
            .submit_and_restore(&api, &storage, &toasts)
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::LoggedIn(_)));
        assert!(storage.get(PENDING_NOTE_KEY).is_some());

        let shown = toasts.drain();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].kind, ToastKind::Error);
        assert_eq!(shown[0].message, messages::SERVICE_UNAVAILABLE);
    }
}
