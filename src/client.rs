//! The resilient API client.
//!
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod core;
mod error_classification;
mod execution;
mod preflight;
pub mod request;
pub mod signals;
pub mod token_refresher;

pub use builder::ApiClientBuilder;
pub use core::ApiClient;
pub use request::{ApiRequest, ApiResponse, Method, MultipartPart, Payload};
pub use signals::SignalsSnapshot;
pub use token_refresher::TransportTokenRefresher;
