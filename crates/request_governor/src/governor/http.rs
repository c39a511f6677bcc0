use bytes::Bytes;
use http::{Method, StatusCode};
use snafu::Snafu;

use crate::Error as CrateError;

/// Everything that can go wrong between admission and a buffered response.
///
/// Non-success statuses are errors here (`Status`), so retry policies can
/// inspect the status code and the body of a rejected request.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum HttpError {
    /// The request never produced a response (DNS, connect, reset).
    #[snafu(display("HTTP transport error: {}", source))]
    Transport { source: CrateError },

    /// The request itself was malformed or invalid before sending.
    #[snafu(display("Invalid HTTP request: {}", details))]
    InvalidRequest { details: String },

    /// The server answered with a non-success status.
    #[snafu(display("HTTP error response (status {}): {}", status, body))]
    Status { status: StatusCode, body: String },

    #[snafu(display("HTTP request timed out"))]
    Timeout,

    /// Other client-side failures, e.g. reading the response body.
    #[snafu(display("HTTP client error: {}", source))]
    ClientError { source: CrateError },

    /// The governor went away while the request was waiting for admission.
    #[snafu(display("Request was dropped before it could be admitted"))]
    AdmissionAborted,
}

impl HttpError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_status(&self, expected: StatusCode) -> bool {
        self.status() == Some(expected)
    }
}

/// Everything needed to send a request again unchanged: method, path relative
/// to the transport's base URL and an optional JSON body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Bytes>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A successful response with its body already read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}
