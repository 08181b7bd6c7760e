//! Blocking client for the Todoist Sync API.

use std::io;
use std::time::Duration;

use serde_json::Value;

use super::{FULL_SYNC_CURSOR, RESOURCE_TYPES};
use crate::error::ErrorCode;

/// Longest response body excerpt kept in a [`FetchError::Status`].
const MAX_BODY_EXCERPT: usize = 2048;

/// Errors from a single pull against the Sync API. None are retried here.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Todoist returned HTTP {status} for cursor {cursor}: {body}")]
    Status {
        status: u16,
        cursor: String,
        body: String,
    },

    #[error("Todoist request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Todoist request failed: {0}")]
    Transport(String),

    #[error("Todoist response was not valid JSON: {0}")]
    Decode(#[source] io::Error),
}

impl FetchError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Status { .. } => ErrorCode::RemoteStatus,
            Self::Timeout { .. } => ErrorCode::RemoteTimeout,
            Self::Transport(_) => ErrorCode::RemoteTransport,
            Self::Decode(_) => ErrorCode::RemoteDecode,
        }
    }
}

/// Source of raw Sync API payloads.
///
/// `cursor == "*"` requests every resource; any other cursor requests the
/// changes since that cursor.
pub trait DeltaSource {
    fn fetch(&self, cursor: &str) -> Result<Value, FetchError>;
}

/// HTTP implementation of [`DeltaSource`] backed by `ureq`.
pub struct TodoistClient {
    agent: ureq::Agent,
    endpoint: String,
    token: String,
    timeout: Duration,
}

impl std::fmt::Debug for TodoistClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TodoistClient")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TodoistClient {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("orchestra/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            endpoint: endpoint.into(),
            token: token.into(),
            timeout,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// JSON array literal sent as the `resource_types` form field.
#[must_use]
pub fn resource_types_param() -> String {
    let quoted: Vec<String> = RESOURCE_TYPES.iter().map(|r| format!("\"{r}\"")).collect();
    format!("[{}]", quoted.join(","))
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    let mut source = std::error::Error::source(transport);
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if matches!(io_err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) {
                return true;
            }
        }
        source = err.source();
    }
    transport.to_string().contains("timed out")
}

fn excerpt(body: &str) -> String {
    if body.len() <= MAX_BODY_EXCERPT {
        return body.to_string();
    }
    let mut end = MAX_BODY_EXCERPT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

impl DeltaSource for TodoistClient {
    fn fetch(&self, cursor: &str) -> Result<Value, FetchError> {
        let resource_types = resource_types_param();
        if cursor == FULL_SYNC_CURSOR {
            tracing::info!(endpoint = %self.endpoint, "requesting full Todoist pull");
        } else {
            tracing::info!(endpoint = %self.endpoint, cursor, "requesting Todoist delta");
        }

        let result = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.token))
            .send_form(&[("sync_token", cursor), ("resource_types", resource_types.as_str())]);

        match result {
            Ok(response) => response.into_json::<Value>().map_err(FetchError::Decode),
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                tracing::error!(
                    endpoint = %self.endpoint,
                    status,
                    cursor,
                    resource_types = %resource_types,
                    authorization = "Bearer <redacted>",
                    body = %body,
                    "Todoist sync rejected"
                );
                Err(FetchError::Status {
                    status,
                    cursor: cursor.to_string(),
                    body: excerpt(&body),
                })
            }
            Err(ureq::Error::Transport(transport)) => {
                if is_timeout(&transport) {
                    tracing::error!(endpoint = %self.endpoint, timeout = ?self.timeout, "Todoist sync timed out");
                    Err(FetchError::Timeout {
                        timeout: self.timeout,
                    })
                } else {
                    tracing::error!(endpoint = %self.endpoint, error = %transport, "Todoist sync transport failure");
                    Err(FetchError::Transport(transport.to_string()))
                }
            }
        }
    }
}
