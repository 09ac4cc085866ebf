//! An HTTP client over libcurl with a composable middleware stack.
//!
//! Every request travels through a [`HandlerStack`]: named middleware
//! layers wrapped around a terminal handler that performs the transfer
//! with libcurl. Middleware are plain decorators over handlers, so
//! anything from header rewriting to status policing composes the same
//! way. The stack a [`Client`] ships with checks 4xx/5xx statuses and
//! rejects them as typed errors.
//!
//! # Dispatch model
//!
//! The client is synchronous and single threaded. A plain request
//! performs its transfer inline and blocks until the response is
//! parsed. A [`Batch`] multiplexes many transfers over curl's multi
//! interface, still on the calling thread, with a bounded number in
//! flight at a time.
//!
//! # Example
//!
//! ```no_run
//! use curlstack::{Client, RequestOptions};
//!
//! fn main() -> Result<(), curlstack::Error> {
//!     let client = Client::builder()
//!         .with_base_url("https://api.example.com/")
//!         .build()?;
//!
//!     let response = client.get("health")?;
//!     println!("{} {}", response.status(), response.body().text());
//!
//!     let submitted = client.post(
//!         "jobs",
//!         RequestOptions::new().with_form([("kind", "sync")]),
//!     )?;
//!     println!("accepted: {}", submitted.status());
//!     Ok(())
//! }
//! ```

mod batch;
mod body;
mod client;
mod delivery;
mod error;
mod exchange;
pub mod middleware;
mod options;
mod stack;
mod transport;

pub use batch::{Batch, DEFAULT_BATCH_CONCURRENCY};
pub use body::Body;
pub use client::{Client, ClientBuilder};
pub use delivery::Delivery;
pub use error::Error;
pub use exchange::Exchange;
pub use middleware::{HistoryEntry, HistoryLog};
pub use options::{Auth, RedirectPolicy, RequestOptions};
pub use stack::{Handler, HandlerStack, Middleware, StackError};
pub use transport::{curl_transport, TransferInfo};

/// Re-export of the message types this crate builds on.
pub use http;

pub mod prelude {
    pub use crate::{
        curl_transport, Auth, Batch, Body, Client, ClientBuilder, Delivery,
        Error, Exchange, Handler, HandlerStack, HistoryEntry, HistoryLog,
        Middleware, RedirectPolicy, RequestOptions, StackError, TransferInfo,
    };

    pub use http::{Method, Request, Response, StatusCode};
}
