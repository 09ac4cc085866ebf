//! Transfer error taxonomy.
//!
//! Failures split three ways: [`Error::Network`] for anything that went
//! wrong reaching the peer (DNS, connect, TLS, timeouts), [`Error::Transfer`]
//! for every other libcurl failure, and [`Error::BadResponse`] for HTTP
//! 4xx/5xx surfaced by the status middleware. Request-shaping problems are
//! reported as [`Error::Builder`] before any curl handle exists.

use http::{Method, Response, StatusCode};
use thiserror::Error;

use crate::body::Body;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The peer could not be reached: DNS resolution, connect refusal,
    /// TLS handshake or certificate verification, timeouts, or a
    /// connection that produced no response at all.
    #[error("network failure for {method} {url}: {source}")]
    Network {
        method: Method,
        url: String,
        #[source]
        source: curl::Error,
    },

    /// libcurl reported a failure after the connection was established.
    #[error("transfer failed for {method} {url}: {source}")]
    Transfer {
        method: Method,
        url: String,
        #[source]
        source: curl::Error,
    },

    /// The server answered with a 4xx or 5xx status. The full response is
    /// preserved for inspection.
    #[error("{method} {url} returned HTTP {status}")]
    BadResponse {
        method: Method,
        url: String,
        status: StatusCode,
        response: Box<Response<Body>>,
    },

    /// The request could not be constructed (invalid URL, malformed
    /// header, conflicting body sources, ...).
    #[error("could not build request: {message}")]
    Builder { message: String },

    /// curl completed the transfer but the captured response head could
    /// not be parsed.
    #[error("malformed response head for {method} {url}: {message}")]
    Protocol {
        method: Method,
        url: String,
        message: String,
    },

    /// The curl multi interface failed while driving a batch. This aborts
    /// the whole batch rather than a single transfer.
    #[error("curl multi interface failure: {source}")]
    Multi {
        #[source]
        source: curl::MultiError,
    },
}

impl Error {
    pub(crate) fn builder(message: impl Into<String>) -> Self {
        Self::Builder {
            message: message.into(),
        }
    }

    /// Classifies a libcurl failure as [`Error::Network`] or
    /// [`Error::Transfer`].
    pub(crate) fn from_curl(
        method: Method,
        url: String,
        source: curl::Error,
    ) -> Self {
        if is_network_class(&source) {
            Self::Network {
                method,
                url,
                source,
            }
        } else {
            Self::Transfer {
                method,
                url,
                source,
            }
        }
    }

    /// True for connection-level failures.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// True when the server answered with a 4xx/5xx status.
    pub fn is_bad_response(&self) -> bool {
        matches!(self, Self::BadResponse { .. })
    }

    /// True when the error never left the client: the request could not
    /// be built.
    pub fn is_builder(&self) -> bool {
        matches!(self, Self::Builder { .. })
    }

    /// Status code of the rejected response, if there is one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::BadResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The rejected response, if this error carries one.
    pub fn response(&self) -> Option<&Response<Body>> {
        match self {
            Self::BadResponse { response, .. } => Some(response),
            _ => None,
        }
    }

    /// Consumes the error, yielding the rejected response if present.
    pub fn into_response(self) -> Option<Response<Body>> {
        match self {
            Self::BadResponse { response, .. } => Some(*response),
            _ => None,
        }
    }

    /// The method of the request this error belongs to, when known.
    pub fn method(&self) -> Option<&Method> {
        match self {
            Self::Network { method, .. }
            | Self::Transfer { method, .. }
            | Self::BadResponse { method, .. }
            | Self::Protocol { method, .. } => Some(method),
            _ => None,
        }
    }

    /// The URL of the request this error belongs to, when known.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Network { url, .. }
            | Self::Transfer { url, .. }
            | Self::BadResponse { url, .. }
            | Self::Protocol { url, .. } => Some(url),
            _ => None,
        }
    }
}

/// Connect-class curl failures: the request never produced a usable
/// response from the peer.
fn is_network_class(e: &curl::Error) -> bool {
    e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_couldnt_connect()
        || e.is_ssl_connect_error()
        || e.is_peer_failed_verification()
        || e.is_operation_timedout()
        || e.is_got_nothing()
}
