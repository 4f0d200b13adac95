#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::ConnectInfo,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tower::ServiceExt;

use notatki_server::config::Config;
use notatki_server::repositories::Repositories;
use notatki_server::server::{AppState, Dependencies, build_router};
use notatki_server::services::{Mailer, MockSummaryGenerator, ResetTokenStore};

pub const PASSWORD: &str = "bezpieczne-haslo";

/// 接続元を指定しないリクエストの送信元
pub fn default_peer() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40000))
}

/// JSON ボディ付きのリクエストを組み立てる
pub fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub body: String,
}

#[derive(Default)]
pub struct Outbox {
    mails: Mutex<Vec<SentMail>>,
}

impl Outbox {
    pub fn sent(&self) -> Vec<SentMail> {
        self.mails.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for Outbox {
    async fn send(
        &self,
        to_email: &str,
        _subject: &str,
        body: &str,
    ) -> notatki_server::Result<()> {
        self.mails.lock().unwrap().push(SentMail {
            to: to_email.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Response {
    /// Set-Cookie から次のリクエスト用の Cookie ヘッダーを作る
    pub fn cookie_header(&self) -> String {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .filter(|pair| pair.split_once('=').is_some_and(|(_, value)| !value.is_empty()))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub struct TestApp {
    router: Router,
    pub outbox: Arc<Outbox>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(configure: impl FnOnce(&mut Config)) -> Self {
        let mut config = Config::default();
        config.server.public_base_url = "https://notatki.example".to_string();
        configure(&mut config);

        let outbox = Arc::new(Outbox::default());
        let deps = Dependencies {
            repos: Repositories::in_memory(),
            mailer: outbox.clone(),
            generator: Arc::new(MockSummaryGenerator),
            reset_tokens: ResetTokenStore::new(),
        };
        let state = AppState::new(config, "integration-test-secret".to_string(), deps);

        Self {
            router: build_router(state),
            outbox,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        cookie: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    /// 接続元アドレスが無ければ既定の送信元を付けて送る
    pub async fn send(&self, mut request: Request<Body>) -> Response {
        if request.extensions().get::<ConnectInfo<SocketAddr>>().is_none() {
            request.extensions_mut().insert(ConnectInfo(default_peer()));
        }

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        Response {
            status,
            headers,
            body,
        }
    }

    /// 実ソケットで待ち受け、ベース URL を返す
    pub async fn serve(&self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = self
            .router
            .clone()
            .into_make_service_with_connect_info::<SocketAddr>();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    pub async fn get(&self, uri: &str, cookie: &str) -> Response {
        self.request(Method::GET, uri, None, Some(cookie)).await
    }

    pub async fn post(&self, uri: &str, body: Value, cookie: &str) -> Response {
        self.request(Method::POST, uri, Some(body), Some(cookie))
            .await
    }

    /// 登録してセッション Cookie を返す
    pub async fn register(&self, email: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/api/auth/register",
                Some(json!({ "email": email, "password": PASSWORD })),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.cookie_header()
    }

    /// タグ名を指定してノートを作成し、ID を返す
    pub async fn create_note(&self, cookie: &str, tag_name: &str, summary: &str) -> String {
        let response = self
            .post(
                "/api/notes",
                json!({
                    "original_content": "Spotkanie zespołu projektowego.",
                    "summary_text": summary,
                    "tag_name": tag_name,
                }),
                cookie,
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body["id"].as_str().unwrap().to_string()
    }
}
