//! Error types for `schemata-client`.

use reqwest::{Method, StatusCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),

  /// The backend answered with a non-success status. `detail` is the
  /// backend's own message when it sent one.
  #[error("{method} {path} → {status}: {detail}")]
  Status {
    method: Method,
    path:   String,
    status: StatusCode,
    detail: String,
  },

  #[error("unexpected response body: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
