mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::TestApp;
use notatki_server::messages;

#[tokio::test]
async fn note_crud() {
    let app = TestApp::new();
    let cookie = app.register("anna@example.com").await;
    let id = app.create_note(&cookie, "Zarząd", "Plan budżetu").await;

    let detail = app.get(&format!("/api/notes/{id}"), &cookie).await;
    assert_eq!(detail.status, StatusCode::OK);
    assert_eq!(detail.body["tag"]["name"], "Zarząd");
    assert_eq!(detail.body["goal_status"], "undefined");
    assert_eq!(detail.body["is_owner"], true);

    let patched = app
        .request(
            Method::PATCH,
            &format!("/api/notes/{id}"),
            Some(json!({ "goal_status": "achieved", "meeting_date": "2024-05-10" })),
            Some(&cookie),
        )
        .await;
    assert_eq!(patched.status, StatusCode::OK);
    assert_eq!(patched.body["goal_status"], "achieved");
    assert_eq!(patched.body["meeting_date"], "2024-05-10");
    assert_eq!(patched.body["summary_text"], "Plan budżetu");

    let empty = app
        .request(
            Method::PATCH,
            &format!("/api/notes/{id}"),
            Some(json!({})),
            Some(&cookie),
        )
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    let deleted = app
        .request(Method::DELETE, &format!("/api/notes/{id}"), None, Some(&cookie))
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    let gone = app.get(&format!("/api/notes/{id}"), &cookie).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_requires_exactly_one_tag_choice() {
    let app = TestApp::new();
    let cookie = app.register("anna@example.com").await;

    let missing = app
        .post(
            "/api/notes",
            json!({ "original_content": "Treść" }),
            &cookie,
        )
        .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.body["field"], "tag_id");

    let too_long = app
        .post(
            "/api/notes",
            json!({ "original_content": "a".repeat(5001), "tag_name": "X" }),
            &cookie,
        )
        .await;
    assert_eq!(too_long.status, StatusCode::BAD_REQUEST);
    assert_eq!(too_long.body["field"], "original_content");
}

#[tokio::test]
async fn list_filters_and_paginates() {
    let app = TestApp::new();
    let cookie = app.register("anna@example.com").await;
    app.create_note(&cookie, "Zarząd", "Budżet na Q3").await;
    app.create_note(&cookie, "Zarząd", "Rekrutacja").await;
    app.create_note(&cookie, "Zespół", "Retrospektywa sprintu").await;

    let all = app.get("/api/notes?limit=2", &cookie).await;
    assert_eq!(all.status, StatusCode::OK);
    assert_eq!(all.body["data"].as_array().unwrap().len(), 2);
    assert_eq!(all.body["pagination"]["total"], 3);
    assert_eq!(all.body["pagination"]["limit"], 2);

    let search = app.get("/api/notes?search=BUD%C5%BBET", &cookie).await;
    assert_eq!(search.body["pagination"]["total"], 1);

    let bad_limit = app.get("/api/notes?limit=101", &cookie).await;
    assert_eq!(bad_limit.status, StatusCode::BAD_REQUEST);

    let bad_range = app
        .get("/api/notes?date_from=2024-06-01&date_to=2024-05-01", &cookie)
        .await;
    assert_eq!(bad_range.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn notes_of_other_users_are_hidden() {
    let app = TestApp::new();
    let anna = app.register("anna@example.com").await;
    let piotr = app.register("piotr@example.com").await;
    let id = app.create_note(&anna, "Prywatne", "Tajne").await;

    let read = app.get(&format!("/api/notes/{id}"), &piotr).await;
    assert_eq!(read.status, StatusCode::NOT_FOUND);

    let list = app.get("/api/notes", &piotr).await;
    assert_eq!(list.body["pagination"]["total"], 0);

    let bad_id = app.get("/api/notes/nie-uuid", &anna).await;
    assert_eq!(bad_id.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn generate_summary_with_mock_provider() {
    let app = TestApp::new();
    let response = app
        .request(
            Method::POST,
            "/api/ai/generate-summary",
            Some(json!({
                "original_content": "Omówiliśmy #Marketing. Ustalono budżet kampanii. Następne spotkanie w maju."
            })),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["goal_status"], "achieved");
    assert_eq!(response.body["suggested_tag"], "Marketing");
    assert!(
        response.body["summary_text"]
            .as_str()
            .unwrap()
            .starts_with("Podsumowanie:")
    );
    assert!(response.body["generation_time_ms"].is_u64());
}

#[tokio::test]
async fn generate_summary_is_rate_limited_per_ip() {
    let app = TestApp::new();
    let body = json!({ "original_content": "Krótka notatka." });

    for _ in 0..5 {
        let ok = app
            .request(Method::POST, "/api/ai/generate-summary", Some(body.clone()), None)
            .await;
        assert_eq!(ok.status, StatusCode::OK);
    }
    let limited = app
        .request(Method::POST, "/api/ai/generate-summary", Some(body), None)
        .await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(
        limited.body["error"]
            .as_str()
            .unwrap()
            .starts_with(messages::TOO_MANY_REQUESTS)
    );
}
