//! Fetches a JSON document and prints selected fields plus transfer facts.
//!
//! Run: `cargo run --example get_json [url]`

use curlstack::{Client, RequestOptions, TransferInfo};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org/json".to_string());

    let client = Client::new();

    let response = client.request(
        http::Method::GET,
        &url,
        RequestOptions::new()
            .with_header("Accept", "application/json")
            .with_query("source", "get_json"),
    )?;

    println!("Status: {}", response.status());

    let document: serde_json::Value = response.body().json()?;
    println!("Body:\n{}", serde_json::to_string_pretty(&document)?);

    if let Some(info) = response.extensions().get::<TransferInfo>() {
        println!(
            "Fetched {} in {:?} ({} redirects)",
            info.effective_url, info.total_time, info.redirect_count
        );
    }

    Ok(())
}
