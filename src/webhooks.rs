use rocket::{http::Status, serde::json::Json, Request};
use serde::Serialize;

pub mod github;
pub use github::github_webhook;

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub detail: String,
}

impl ErrorDetail {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

#[rocket::catch(401)]
pub(crate) fn unauthorized() -> Json<ErrorDetail> {
    Json(ErrorDetail::new("Invalid signature"))
}

#[rocket::catch(default)]
pub(crate) fn default_catcher(status: Status, _request: &Request<'_>) -> Json<ErrorDetail> {
    Json(ErrorDetail::new(status.reason().unwrap_or("Unknown error")))
}
