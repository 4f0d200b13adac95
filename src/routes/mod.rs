pub mod api;
mod share;

pub use api::create_api_routes;
pub use share::create_share_routes;
