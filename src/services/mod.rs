mod auth_service;
pub mod email_service;
pub mod note_service;
mod public_link_service;
mod rate_limiter;
mod reset_token_store;
pub mod summary_service;
mod tag_service;

pub use auth_service::{AuthService, IssuedTokens};
pub use email_service::{LogMailer, Mailer, SmtpMailer};
pub use note_service::NoteService;
pub use public_link_service::{PublicLinkService, generate_token};
pub use rate_limiter::{AuthRateLimiter, EmailRateLimiter, GenerationRateLimiter};
pub use reset_token_store::ResetTokenStore;
pub use summary_service::{
    MockSummaryGenerator, OpenRouterGenerator, SummaryDraft, SummaryGenerator, SummaryService,
};
pub use tag_service::{TagService, validate_tag_name};
