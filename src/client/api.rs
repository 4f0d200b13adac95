use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use uuid::Uuid;

use super::{ApiErrorBody, ClientError};
use crate::models::{
    AuthResponse, CreateNoteRequest, LoginRequest, MessageResponse, NoteDetail, NoteList,
    NoteListQuery, PublicLinkResponse, RegisterRequest, UpdateNoteRequest,
    UpdatePublicLinkRequest, UserResponse,
};

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<UserResponse, ClientError>;
}

#[async_trait]
pub trait NotesApi: Send + Sync {
    async fn create_note(&self, request: &CreateNoteRequest) -> Result<NoteDetail, ClientError>;
    async fn update_note(
        &self,
        note_id: Uuid,
        request: &UpdateNoteRequest,
    ) -> Result<NoteDetail, ClientError>;
}

#[async_trait]
pub trait PublicLinkApi: Send + Sync {
    /// リンクが無ければ `Ok(None)`
    async fn get_link(&self, note_id: Uuid) -> Result<Option<PublicLinkResponse>, ClientError>;
    async fn enable_link(&self, note_id: Uuid) -> Result<PublicLinkResponse, ClientError>;
    async fn set_link_enabled(
        &self,
        note_id: Uuid,
        is_enabled: bool,
    ) -> Result<PublicLinkResponse, ClientError>;
    async fn rotate_link(&self, note_id: Uuid) -> Result<PublicLinkResponse, ClientError>;
    async fn delete_link(&self, note_id: Uuid) -> Result<(), ClientError>;
}

/// Cookie を保持する HTTP クライアント
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.json::<ApiErrorBody>().await.ok();
        let err = ClientError::from_status(status.as_u16(), body);
        tracing::debug!(status = status.as_u16(), error = %err, "API request failed");
        Err(err)
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        self.execute(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// 登録に成功するとセッション Cookie が保持される
    pub async fn register(&self, request: &RegisterRequest) -> Result<UserResponse, ClientError> {
        let response: AuthResponse = self
            .json(self.http.post(self.url("/auth/register")).json(request))
            .await?;
        Ok(response.user)
    }

    pub async fn current_user(&self) -> Result<UserResponse, ClientError> {
        let response: AuthResponse = self.json(self.http.get(self.url("/auth/me"))).await?;
        Ok(response.user)
    }

    /// リフレッシュ Cookie（パス `/api/auth`）でアクセストークンを更新する
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let _: MessageResponse = self.json(self.http.post(self.url("/auth/refresh"))).await?;
        Ok(())
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        let _: MessageResponse = self.json(self.http.post(self.url("/auth/logout"))).await?;
        Ok(())
    }

    pub async fn list_notes(&self, query: &NoteListQuery) -> Result<NoteList, ClientError> {
        self.json(self.http.get(self.url("/notes")).query(query))
            .await
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, request: &LoginRequest) -> Result<UserResponse, ClientError> {
        let response: AuthResponse = self
            .json(self.http.post(self.url("/auth/login")).json(request))
            .await?;
        Ok(response.user)
    }
}

#[async_trait]
impl NotesApi for ApiClient {
    async fn create_note(&self, request: &CreateNoteRequest) -> Result<NoteDetail, ClientError> {
        self.json(self.http.post(self.url("/notes")).json(request))
            .await
    }

    async fn update_note(
        &self,
        note_id: Uuid,
        request: &UpdateNoteRequest,
    ) -> Result<NoteDetail, ClientError> {
        self.json(
            self.http
                .patch(self.url(&format!("/notes/{note_id}")))
                .json(request),
        )
        .await
    }
}

#[async_trait]
impl PublicLinkApi for ApiClient {
    async fn get_link(&self, note_id: Uuid) -> Result<Option<PublicLinkResponse>, ClientError> {
        let request = self
            .http
            .get(self.url(&format!("/notes/{note_id}/public-link")));
        match self.json(request).await {
            Ok(link) => Ok(Some(link)),
            Err(err) if err.status() == Some(StatusCode::NOT_FOUND.as_u16()) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn enable_link(&self, note_id: Uuid) -> Result<PublicLinkResponse, ClientError> {
        self.json(
            self.http
                .post(self.url(&format!("/notes/{note_id}/public-link"))),
        )
        .await
    }

    async fn set_link_enabled(
        &self,
        note_id: Uuid,
        is_enabled: bool,
    ) -> Result<PublicLinkResponse, ClientError> {
        self.json(
            self.http
                .patch(self.url(&format!("/notes/{note_id}/public-link")))
                .json(&UpdatePublicLinkRequest { is_enabled }),
        )
        .await
    }

    async fn rotate_link(&self, note_id: Uuid) -> Result<PublicLinkResponse, ClientError> {
        self.json(
            self.http
                .post(self.url(&format!("/notes/{note_id}/public-link/rotate"))),
        )
        .await
    }

    async fn delete_link(&self, note_id: Uuid) -> Result<(), ClientError> {
        self.execute(
            self.http
                .delete(self.url(&format!("/notes/{note_id}/public-link"))),
        )
        .await?;
        Ok(())
    }
}
