//! Fetches a set of URLs concurrently over one multi handle.
//!
//! Run: `cargo run --example batch [url...]`

use curlstack::Client;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        urls = (1..=6)
            .map(|n| format!("https://httpbin.org/status/{}", 195 + n))
            .collect();
    }

    let client = Client::new();

    let mut batch = client
        .batch()
        .with_concurrency(3)
        .on_response(|index, response| {
            println!("[{index}] finished with {}", response.status())
        })
        .on_error(|index, error| println!("[{index}] failed: {error}"));

    for url in &urls {
        batch.get(url);
    }

    let results = batch.run()?;

    println!("--- in request order ---");
    for (url, result) in urls.iter().zip(results) {
        match result {
            Ok(response) => {
                println!("{url}: {} ({} bytes)", response.status(), response.body().len())
            }
            Err(error) => println!("{url}: {error}"),
        }
    }

    Ok(())
}
