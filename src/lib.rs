pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod messages;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod server;
pub mod services;

pub use error::{AppError, Result};
pub use server::{AppState, Dependencies, build_router, start_server};
