//! Error types shared by every edgekit crate.

use std::fmt;

use thiserror::Error;

/// Result type alias for edgekit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the SDK.
///
/// Every fallible operation returns one of these; nothing is retried or
/// swallowed inside the SDK. Use [`Error::kind`] to branch on the coarse
/// category instead of matching every variant.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid method {0:?}")]
    InvalidMethod(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no content")]
    NoContent,

    #[error("store not found: {0}")]
    StoreNotFound(String),

    #[error("backend not found: {0}")]
    BackendNotFound(String),

    #[error("send to backend {backend:?} failed: {detail}")]
    Send {
        backend: String,
        detail: SendErrorKind,
    },

    #[error("request already sent")]
    AlreadySent,

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("stream closed")]
    StreamClosed,

    #[error("request header fields too large")]
    HeadersTooLarge,

    #[error("invalid HTTP status code {0}")]
    InvalidStatusCode(u16),

    #[error("handler panicked: {0}")]
    HandlerPanicked(String),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    NoContent,
    BackendNotFound,
    SendError,
    Cancelled,
    DeadlineExceeded,
    ResourceExhausted,
    StreamClosed,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_)
            | Error::InvalidUrl { .. }
            | Error::InvalidMethod(_)
            | Error::InvalidStatusCode(_)
            | Error::AlreadySent => ErrorKind::InvalidArgument,
            Error::NotFound(_) | Error::StoreNotFound(_) => ErrorKind::NotFound,
            Error::NoContent => ErrorKind::NoContent,
            Error::BackendNotFound(_) => ErrorKind::BackendNotFound,
            Error::Send { .. } => ErrorKind::SendError,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Error::ResourceExhausted(_) | Error::HeadersTooLarge => ErrorKind::ResourceExhausted,
            Error::StreamClosed => ErrorKind::StreamClosed,
            Error::HandlerPanicked(_) | Error::Decode(_) | Error::Transport(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// `true` for `Cancelled` and `DeadlineExceeded`.
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind(), ErrorKind::Cancelled | ErrorKind::DeadlineExceeded)
    }

    pub fn send_detail(&self) -> Option<&SendErrorKind> {
        match self {
            Error::Send { detail, .. } => Some(detail),
            _ => None,
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport(message.into())
    }
}

/// Detailed reason for a failed backend send, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendErrorKind {
    DnsTimeout,
    DnsError { rcode: u16, info_code: u16 },
    DestinationNotFound,
    DestinationUnavailable,
    DestinationIpUnroutable,
    ConnectionRefused,
    ConnectionTerminated,
    ConnectionTimeout,
    ConnectionLimitReached,
    TlsCertificateError,
    TlsConfigurationError,
    TlsAlertReceived { id: u8, description: String },
    TlsProtocolError,
    HttpIncompleteResponse,
    HttpResponseHeaderSectionTooLarge,
    HttpResponseBodyTooLarge,
    HttpResponseTimeout,
    HttpResponseStatusInvalid,
    HttpUpgradeFailed,
    HttpProtocolError,
    HttpRequestCacheKeyInvalid,
    HttpRequestUriInvalid,
    InternalError,
}

impl fmt::Display for SendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendErrorKind::DnsTimeout => f.write_str("DNS timeout"),
            SendErrorKind::DnsError { rcode, info_code } => {
                write!(f, "DNS error (rcode={rcode}, info_code={info_code})")
            }
            SendErrorKind::DestinationNotFound => f.write_str("destination not found"),
            SendErrorKind::DestinationUnavailable => f.write_str("destination unavailable"),
            SendErrorKind::DestinationIpUnroutable => f.write_str("destination IP unroutable"),
            SendErrorKind::ConnectionRefused => f.write_str("connection refused"),
            SendErrorKind::ConnectionTerminated => f.write_str("connection terminated"),
            SendErrorKind::ConnectionTimeout => f.write_str("connection timeout"),
            SendErrorKind::ConnectionLimitReached => f.write_str("connection limit reached"),
            SendErrorKind::TlsCertificateError => f.write_str("TLS certificate error"),
            SendErrorKind::TlsConfigurationError => f.write_str("TLS configuration error"),
            SendErrorKind::TlsAlertReceived { id, description } => {
                write!(f, "TLS alert received: {description} (id={id})")
            }
            SendErrorKind::TlsProtocolError => f.write_str("TLS protocol error"),
            SendErrorKind::HttpIncompleteResponse => f.write_str("incomplete HTTP response"),
            SendErrorKind::HttpResponseHeaderSectionTooLarge => {
                f.write_str("HTTP response header section too large")
            }
            SendErrorKind::HttpResponseBodyTooLarge => f.write_str("HTTP response body too large"),
            SendErrorKind::HttpResponseTimeout => f.write_str("HTTP response timeout"),
            SendErrorKind::HttpResponseStatusInvalid => f.write_str("invalid HTTP response status"),
            SendErrorKind::HttpUpgradeFailed => f.write_str("HTTP upgrade failed"),
            SendErrorKind::HttpProtocolError => f.write_str("HTTP protocol error"),
            SendErrorKind::HttpRequestCacheKeyInvalid => f.write_str("invalid request cache key"),
            SendErrorKind::HttpRequestUriInvalid => f.write_str("invalid request URI"),
            SendErrorKind::InternalError => f.write_str("internal error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(Error::invalid_argument("x").kind(), ErrorKind::InvalidArgument);
        assert_eq!(Error::InvalidMethod("G T".into()).kind(), ErrorKind::InvalidArgument);
        assert_eq!(Error::StoreNotFound("s".into()).kind(), ErrorKind::NotFound);
        assert_eq!(Error::NoContent.kind(), ErrorKind::NoContent);
        assert_eq!(Error::BackendNotFound("b".into()).kind(), ErrorKind::BackendNotFound);
        assert_eq!(Error::StreamClosed.kind(), ErrorKind::StreamClosed);
        assert_eq!(Error::HeadersTooLarge.kind(), ErrorKind::ResourceExhausted);
    }

    #[test]
    fn timeouts_are_classified() {
        assert!(Error::Cancelled.is_timeout());
        assert!(Error::DeadlineExceeded.is_timeout());
        assert!(!Error::NoContent.is_timeout());
    }

    #[test]
    fn send_error_display_includes_backend_and_detail() {
        let err = Error::Send {
            backend: "origin".into(),
            detail: SendErrorKind::DnsError {
                rcode: 3,
                info_code: 0,
            },
        };
        assert_eq!(
            err.to_string(),
            "send to backend \"origin\" failed: DNS error (rcode=3, info_code=0)"
        );
        assert!(matches!(
            err.send_detail(),
            Some(SendErrorKind::DnsError { rcode: 3, .. })
        ));
    }

    #[test]
    fn decode_errors_convert() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: Error = json_err.into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
