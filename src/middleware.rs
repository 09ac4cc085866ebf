//! Built-in middleware.
//!
//! Each constructor returns a [`Middleware`] ready to be pushed onto a
//! [`HandlerStack`](crate::HandlerStack). They are plain decorators: a
//! middleware receives the next handler and returns a new one that runs
//! around it.

use std::cell::RefCell;
use std::rc::Rc;

use http::{Method, Request, Response, StatusCode};

use crate::body::Body;
use crate::error::Error;
use crate::exchange::Exchange;
use crate::options::RequestOptions;
use crate::stack::{Handler, Middleware};

/// Rejects 4xx/5xx responses as [`Error::BadResponse`].
///
/// Honors the per-request `http_errors` option: when disabled, error
/// statuses pass through as ordinary responses. The client installs this
/// layer by default under the name `"http_errors"`.
pub fn http_errors() -> Middleware {
    Rc::new(|next: Handler| -> Handler {
        Rc::new(move |exchange: Exchange| {
            if !exchange.options.http_errors_enabled() {
                return next(exchange);
            }
            let method = exchange.request.method().clone();
            let url = exchange.request.uri().to_string();
            next(exchange).then(move |result| match result {
                Ok(response) if is_error_status(response.status()) => {
                    Err(Error::BadResponse {
                        method,
                        url,
                        status: response.status(),
                        response: Box::new(response),
                    })
                }
                other => other,
            })
        })
    })
}

fn is_error_status(status: StatusCode) -> bool {
    status.is_client_error() || status.is_server_error()
}

/// Rewrites the outgoing request before it reaches the transport.
pub fn map_request<F>(f: F) -> Middleware
where
    F: Fn(Request<Body>) -> Request<Body> + 'static,
{
    let f = Rc::new(f);
    Rc::new(move |next: Handler| -> Handler {
        let f = Rc::clone(&f);
        Rc::new(move |exchange: Exchange| next(exchange.map_request(|r| f(r))))
    })
}

/// Rewrites the incoming response on its way back up the stack.
pub fn map_response<F>(f: F) -> Middleware
where
    F: Fn(Response<Body>) -> Response<Body> + 'static,
{
    let f = Rc::new(f);
    Rc::new(move |next: Handler| -> Handler {
        let f = Rc::clone(&f);
        Rc::new(move |exchange: Exchange| {
            let f = Rc::clone(&f);
            next(exchange).then(move |result| result.map(|response| f(response)))
        })
    })
}

/// Observes every outgoing request without touching it.
pub fn tap<F>(f: F) -> Middleware
where
    F: Fn(&Request<Body>, &RequestOptions) + 'static,
{
    let f = Rc::new(f);
    Rc::new(move |next: Handler| -> Handler {
        let f = Rc::clone(&f);
        Rc::new(move |exchange: Exchange| {
            f(&exchange.request, &exchange.options);
            next(exchange)
        })
    })
}

/// One dispatched request and how it ended.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub method: Method,
    pub url: String,
    /// Status of the response, also set when the transfer ended in
    /// [`Error::BadResponse`].
    pub status: Option<StatusCode>,
    pub error: Option<String>,
}

impl HistoryEntry {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Shared recording sink for the [`history`] middleware. Clones share
/// the same underlying log.
#[derive(Clone, Debug, Default)]
pub struct HistoryLog {
    entries: Rc<RefCell<Vec<HistoryEntry>>>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Copies the recorded entries out, oldest first.
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.borrow().clone()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    fn record(&self, entry: HistoryEntry) {
        self.entries.borrow_mut().push(entry);
    }
}

/// Records every dispatched request and its outcome into `log`.
pub fn history(log: HistoryLog) -> Middleware {
    Rc::new(move |next: Handler| -> Handler {
        let log = log.clone();
        Rc::new(move |exchange: Exchange| {
            let log = log.clone();
            let method = exchange.request.method().clone();
            let url = exchange.request.uri().to_string();
            next(exchange).then(move |result| {
                let (status, error) = match &result {
                    Ok(response) => (Some(response.status()), None),
                    Err(err) => (err.status(), Some(err.to_string())),
                };
                log.record(HistoryEntry {
                    method,
                    url,
                    status,
                    error,
                });
                result
            })
        })
    })
}

/// Emits a `tracing` event per request: one on dispatch, one on
/// completion carrying the elapsed wall time. Batched transfers report
/// the time from dispatch to settlement.
#[cfg(feature = "tracing")]
pub fn log() -> Middleware {
    Rc::new(|next: Handler| -> Handler {
        Rc::new(move |exchange: Exchange| {
            let method = exchange.request.method().clone();
            let url = exchange.request.uri().to_string();
            tracing::debug!(%method, %url, "dispatching request");
            let started = std::time::Instant::now();
            next(exchange).then(move |result| {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                match &result {
                    Ok(response) => tracing::debug!(
                        %method,
                        %url,
                        status = %response.status(),
                        elapsed_ms,
                        "request completed"
                    ),
                    Err(error) => tracing::warn!(
                        %method,
                        %url,
                        elapsed_ms,
                        %error,
                        "request failed"
                    ),
                }
                result
            })
        })
    })
}
