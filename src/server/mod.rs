//! HTTP server pieces for the auth service.

pub mod cookie;
pub mod error;
pub mod routes;
pub mod sweeper;

pub use error::ApiError;
pub use routes::{request_span, router, AppState, CurrentUser};
pub use sweeper::spawn_expiry_sweeper;
