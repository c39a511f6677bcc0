use std::time::Duration;

use http::StatusCode;
use request_governor::governor::{http::HttpError, retries::RetryDirective};
use snafu::Snafu;

/// Errors surfaced to callers of [`CampaignClient`](crate::CampaignClient).
///
/// Throttling and gateway timeouts only show up here once the configured
/// retries are exhausted.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ClientError {
    #[snafu(display("Failed to initialize campaign client: {}", message))]
    Initialization { message: String },

    #[snafu(display("Invalid base URL: {}", details))]
    InvalidUrl { details: String },

    #[snafu(display("Invalid campaign id {:?}", id))]
    InvalidCampaignId { id: String },

    /// No response arrived: connection, DNS or timeout failures.
    #[snafu(display("Network error: {}", source))]
    Network { source: HttpError },

    #[snafu(display("Resource not found: {}", resource))]
    NotFound { resource: String },

    /// The server kept throttling after every resubmission.
    #[snafu(display("Rate limited by the API (retry after {:?})", retry_after))]
    RateLimited { retry_after: Option<Duration> },

    #[snafu(display("Gateway timed out serving {}", path))]
    GatewayTimeout { path: String },

    #[snafu(display("API error (status {}): {}", status, body))]
    Api { status: StatusCode, body: String },

    #[snafu(display("Failed to decode response from {}: {}", path, source))]
    Decode {
        path: String,
        source: serde_json::Error,
    },

    /// The live update connection failed or dropped. The subscription
    /// reconnects on its own after reporting this.
    #[snafu(display("Live update stream error: {}", source))]
    StreamConnection { source: HttpError },
}

impl ClientError {
    /// Maps a transport-level failure for `path` onto the caller-facing kinds.
    pub(crate) fn from_http(error: HttpError, path: &str) -> Self {
        match error {
            HttpError::Status { status, .. } if status == StatusCode::NOT_FOUND => {
                ClientError::NotFound {
                    resource: path.to_string(),
                }
            }
            HttpError::Status { status, body } if status == StatusCode::TOO_MANY_REQUESTS => {
                ClientError::RateLimited {
                    retry_after: RetryDirective::from_throttle_body(&body).map(|d| d.delay),
                }
            }
            HttpError::Status { status, .. } if status == StatusCode::GATEWAY_TIMEOUT => {
                ClientError::GatewayTimeout {
                    path: path.to_string(),
                }
            }
            HttpError::Status { status, body } => ClientError::Api { status, body },
            source => ClientError::Network { source },
        }
    }

    /// Whether repeating the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network { .. }
            | ClientError::RateLimited { .. }
            | ClientError::GatewayTimeout { .. }
            | ClientError::StreamConnection { .. } => true,
            ClientError::Api { status, .. } => status.is_server_error(),
            ClientError::Initialization { .. }
            | ClientError::InvalidUrl { .. }
            | ClientError::InvalidCampaignId { .. }
            | ClientError::NotFound { .. }
            | ClientError::Decode { .. } => false,
        }
    }
}
