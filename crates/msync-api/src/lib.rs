mod client;
mod error;
mod models;

pub use client::ApiClient;
pub use error::{ApiError, ApiResult};
pub use models::{Ack, AuthResponse};
