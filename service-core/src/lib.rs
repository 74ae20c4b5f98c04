//! service-core: Shared infrastructure for the school finance services.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod response;
pub mod retry;

pub use axum;
pub use mongodb;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
pub use validator;
