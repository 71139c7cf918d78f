//! Error types for the status pipeline.

use thiserror::Error;

/// Errors produced while turning status documents into panel data.
///
/// Per-service and per-instance errors are values, not aborts: a
/// [`Error::MalformedService`] is carried next to the records that did
/// normalize, and an [`Error::InstanceFetchFailed`] sits next to the
/// instances that did report. Only [`Error::AllInstancesFailed`] fails a
/// whole polling cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The text is not a status document (bad markup or no `monit` root).
    #[error("Malformed status document: {0}")]
    MalformedDocument(String),

    /// One instance could not be fetched or its document was unusable.
    #[error("{id}: Fetch failed. ({reason})")]
    InstanceFetchFailed { id: String, reason: String },

    /// One service entry lacks its kind tag or name.
    #[error("Malformed service #{index}: {reason}")]
    MalformedService { index: usize, reason: String },

    /// Every instance of the cycle failed.
    #[error("Failed to fetch data for all of the instances!")]
    AllInstancesFailed,
}

/// Transport-level errors raised by a status fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The endpoint answered with a non-success status code.
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Http(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_error_message_names_instance() {
        let err = Error::InstanceFetchFailed {
            id: "web-1".to_string(),
            reason: "Request timed out".to_string(),
        };
        assert_eq!(err.to_string(), "web-1: Fetch failed. (Request timed out)");
    }

    #[test]
    fn test_all_failed_message() {
        assert_eq!(
            Error::AllInstancesFailed.to_string(),
            "Failed to fetch data for all of the instances!"
        );
    }
}
