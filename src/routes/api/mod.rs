use axum::Router;

use crate::server::AppState;

mod account;
mod ai;
mod auth;
mod notes;
mod public_link;
mod tags;

/// `/api` 配下のルート
pub fn create_api_routes() -> Router<AppState> {
    Router::new()
        .merge(auth::create_auth_routes())
        .merge(account::create_account_routes())
        .merge(ai::create_ai_routes())
        .merge(notes::create_notes_routes())
        .merge(public_link::create_public_link_routes())
        .merge(tags::create_tags_routes())
}
