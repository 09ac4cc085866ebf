//! Shows the tracing events the client emits while dispatching.
//!
//! To see logs, run with `RUST_LOG` set to a level (debug or trace):
//! `RUST_LOG=trace cargo run --example tracing_demo`

use curlstack::{middleware, Client};
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The fmt subscriber reads RUST_LOG; without it no events are shown.
    tracing_subscriber::fmt::init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org/get".to_string());

    info!("building client");
    let client = Client::builder()
        .with_middleware(middleware::log(), "log")
        .build()?;

    // The log layer emits one event on dispatch and one on completion.
    // The transport adds trace-level events around the transfer itself.
    let response = client.get(&url)?;

    info!(status = %response.status(), "done");
    Ok(())
}
