use std::convert::Infallible;

use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    serde::json::Json,
    Request, State,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clone::{CloneResult, Cloner};
use crate::webhooks::ErrorDetail;

mod events;
pub use events::*;

mod signing;
use signing::SignedGitHubPayload;

const X_GITHUB_EVENT: &str = "X-GitHub-Event";

pub(crate) struct GitHubSecret(pub String);

#[rocket::post("/webhook", data = "<payload>")]
pub async fn github_webhook(
    event: GitHubEventType,
    payload: SignedGitHubPayload,
    cloner: &State<Cloner>,
) -> Result<Json<WebhookResponse>, (Status, Json<ErrorDetail>)> {
    debug!("received event {:?} with signed payload", event.0);

    match route_event(event.0.as_deref(), &payload.0, cloner).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            warn!("rejecting {:?} payload: {}", event.0, e);
            Err((e.status(), Json(ErrorDetail::new(e.to_string()))))
        }
    }
}

/// Value of the `X-GitHub-Event` header. A missing header isn't an error: the delivery is still
/// authenticated and acknowledged.
#[derive(Debug)]
pub struct GitHubEventType(pub Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for GitHubEventType {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let event_type = request.headers().get_one(X_GITHUB_EVENT).map(str::to_owned);
        Outcome::Success(GitHubEventType(event_type))
    }
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload isn't valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("unexpected issue payload: {0}")]
    Unexpected(#[source] serde_json::Error),
}

impl PayloadError {
    pub fn status(&self) -> Status {
        match self {
            PayloadError::Malformed(_) => Status::BadRequest,
            PayloadError::Unexpected(_) => Status::UnprocessableEntity,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WebhookResponse {
    Success {
        message: String,
        repository: RepositorySummary,
        #[serde(skip_serializing_if = "Option::is_none")]
        clone: Option<CloneResult>,
    },
    Received {
        event: Option<String>,
    },
}

/// Decides what to do with an authenticated delivery.
///
/// Only newly opened issues are acted upon, every other event is acknowledged as is.
pub async fn route_event(
    event_type: Option<&str>,
    body: &[u8],
    cloner: &Cloner,
) -> Result<WebhookResponse, PayloadError> {
    let payload: Value = serde_json::from_slice(body).map_err(PayloadError::Malformed)?;

    let opened_issue =
        event_type == Some("issues") && payload.get("action").and_then(Value::as_str) == Some("opened");
    if !opened_issue {
        debug!("nothing to do for event {:?}", event_type);
        return Ok(WebhookResponse::Received {
            event: event_type.map(str::to_owned),
        });
    }

    let event: IssuesEvent = serde_json::from_value(payload).map_err(PayloadError::Unexpected)?;
    Ok(handle_opened_issue(event, cloner).await)
}

async fn handle_opened_issue(event: IssuesEvent, cloner: &Cloner) -> WebhookResponse {
    let IssuesEvent {
        issue, repository, ..
    } = event;

    info!(
        number = ?issue.number,
        title = %issue.title,
        author = %issue.user.login,
        state = %issue.state,
        url = %issue.html_url,
        created_at = %issue.created_at,
        "new issue opened on {}",
        repository.full_name
    );
    debug!("body of issue {}:\n{}", issue, issue.body_or_placeholder());

    let clone = if cloner.enabled() && !repository.full_name.is_empty() {
        let result = cloner
            .clone_repository(
                &repository.full_name,
                &repository.owner.login,
                &repository.name,
            )
            .await;
        match &result {
            CloneResult::Error { message } => {
                warn!("couldn't clone {}: {}", repository.full_name, message)
            }
            other => info!("clone of {}: {:?}", repository.full_name, other),
        }
        Some(result)
    } else {
        None
    };

    WebhookResponse::Success {
        message: "Issue information logged".to_owned(),
        repository: RepositorySummary::from(&repository),
        clone,
    }
}
