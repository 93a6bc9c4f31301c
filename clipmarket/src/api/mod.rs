//! HTTP client with retry and time-boxed caching combinators.

pub mod cache;
pub mod client;
pub mod envelope;
pub mod errors;
pub mod retry;

pub use cache::{DEFAULT_TTL, ResponseCache};
pub use client::ApiClient;
pub use envelope::ApiResponse;
pub use errors::{ApiError, ApiResult};
pub use retry::{RetryPolicy, with_retry};
