use thiserror::Error;

/// Failure of a single controller round trip.
///
/// Callers above the client turn every variant into a sentinel; none of
/// them is fatal.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Connection refused, DNS failure, timeout, or a body that could not be read.
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Any status other than 200. The body is kept for display only.
    #[error("{endpoint} returned HTTP {status}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("malformed response from {endpoint}: {source}")]
    Malformed {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// Valid JSON of the wrong shape.
    #[error("unexpected response from {endpoint}: {reason}")]
    Unexpected { endpoint: String, reason: String },
}

impl DeviceError {
    /// Text the controller sent alongside a failure, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            DeviceError::Status { body, .. } if !body.trim().is_empty() => Some(body.trim()),
            _ => None,
        }
    }
}
