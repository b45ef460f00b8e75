use std::sync::Arc;

/// Represents a result type for operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while talking to the remote service or managing local state.
///
/// Remote failures are mapped from HTTP status codes (see [`Error::from_status`]), so callers can
/// decide what is worth retrying without inspecting raw responses.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// 400 Bad Request.
    #[error("bad request: {message}")]
    BadRequest { message: String },

    /// 401. The api key is likely invalid.
    #[error("unauthorized, api_key is likely invalid: {message}")]
    Unauthorized { message: String },

    /// 403. The api key lacks permission for this operation.
    #[error("forbidden: {message}")]
    Forbidden { message: String },

    /// 404.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// 405.
    #[error("invalid http method: {message}")]
    InvalidMethod { message: String },

    /// Request deadline elapsed (408 or local timeout).
    #[error("timeout after {timeout_millis}ms: {message}")]
    Timeout { message: String, timeout_millis: u64 },

    /// 413.
    #[error("payload too large: {message}")]
    PayloadTooLarge { message: String },

    /// 499.
    #[error("client closed request: {message}")]
    ClientClosedRequest { message: String },

    /// 500.
    #[error("internal server error: {message}")]
    InternalServerError { message: String },

    /// 502, 503 and 504.
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String },

    /// 3xx.
    #[error("redirect request ({status_code}): {message}")]
    RedirectRequest { message: String, status_code: u16 },

    /// The request never produced a response.
    #[error("network error: {message}")]
    Network { message: String },

    /// Any other failure. `status_code` is set when a response was received.
    #[error("unknown error: {message}")]
    Unknown {
        message: String,
        status_code: Option<u16>,
    },

    /// Invalid configuration or argument supplied by the host application.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// Operation is not valid in the current state.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Persistent storage backend failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Payload could not be encoded or decoded.
    #[error(transparent)]
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    Serialization(Arc<serde_json::Error>),
}

impl Error {
    /// Map a non-2xx HTTP status to an error. `message` is the server-provided message, if any.
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Error {
        let message = message.into();
        match status_code {
            300..=399 => Error::RedirectRequest {
                message,
                status_code,
            },
            400 => Error::BadRequest { message },
            401 => Error::Unauthorized { message },
            403 => Error::Forbidden { message },
            404 => Error::NotFound { message },
            405 => Error::InvalidMethod { message },
            // The server gave up waiting, so there is no client-side deadline to report.
            408 => Error::Timeout {
                message,
                timeout_millis: 0,
            },
            413 => Error::PayloadTooLarge { message },
            499 => Error::ClientClosedRequest { message },
            500 => Error::InternalServerError { message },
            502..=504 => Error::ServiceUnavailable { message },
            _ => Error::Unknown {
                message,
                status_code: Some(status_code),
            },
        }
    }

    /// Authentication failures can't be fixed by retrying, so they are never queued as metrics.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Unauthorized { .. } | Error::Forbidden { .. })
    }

    /// Errors that may go away if the same request is sent again later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Network { .. }
                | Error::Timeout { .. }
                | Error::ClientClosedRequest { .. }
                | Error::InternalServerError { .. }
                | Error::ServiceUnavailable { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Serialization(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        let value = value.without_url();
        if value.is_timeout() {
            Error::Timeout {
                message: value.to_string(),
                timeout_millis: 0,
            }
        } else if let Some(status) = value.status() {
            Error::from_status(status.as_u16(), value.to_string())
        } else {
            Error::Network {
                message: value.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn maps_status_codes() {
        assert!(matches!(
            Error::from_status(302, ""),
            Error::RedirectRequest {
                status_code: 302,
                ..
            }
        ));
        assert!(matches!(Error::from_status(400, ""), Error::BadRequest { .. }));
        assert!(matches!(Error::from_status(401, ""), Error::Unauthorized { .. }));
        assert!(matches!(Error::from_status(403, ""), Error::Forbidden { .. }));
        assert!(matches!(Error::from_status(404, ""), Error::NotFound { .. }));
        assert!(matches!(Error::from_status(405, ""), Error::InvalidMethod { .. }));
        assert!(matches!(Error::from_status(408, ""), Error::Timeout { .. }));
        assert!(matches!(Error::from_status(413, ""), Error::PayloadTooLarge { .. }));
        assert!(matches!(
            Error::from_status(499, ""),
            Error::ClientClosedRequest { .. }
        ));
        assert!(matches!(
            Error::from_status(500, ""),
            Error::InternalServerError { .. }
        ));
        for code in [502, 503, 504] {
            assert!(matches!(
                Error::from_status(code, ""),
                Error::ServiceUnavailable { .. }
            ));
        }
        assert!(matches!(
            Error::from_status(418, ""),
            Error::Unknown {
                status_code: Some(418),
                ..
            }
        ));
    }

    #[test]
    fn auth_errors() {
        assert!(Error::from_status(401, "").is_auth_error());
        assert!(Error::from_status(403, "").is_auth_error());
        assert!(!Error::from_status(500, "").is_auth_error());
    }

    #[test]
    fn transient_errors() {
        assert!(Error::from_status(503, "").is_transient());
        assert!(Error::Network {
            message: String::new()
        }
        .is_transient());
        assert!(!Error::from_status(400, "").is_transient());
        assert!(!Error::from_status(401, "").is_transient());
    }
}
