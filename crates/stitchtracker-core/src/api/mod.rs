//! REST API access for the craft tracker backend.
//!
//! - `transport`: the HTTP seam (`Transport`, `ReqwestTransport`) and URL joining
//! - `client`: `ApiClient`, one method per backend endpoint
//! - `error`: `ApiError`, shared by the session manager and the client

pub mod client;
pub mod error;
pub mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, RequestOptions, Transport};
