use std::time::Duration;

use flagsync::{ClientConfig, User};

#[tokio::main]
async fn main() -> flagsync::Result<()> {
    env_logger::init();

    let api_key = std::env::var("FLAGSYNC_API_KEY").unwrap();
    let endpoint = std::env::var("FLAGSYNC_ENDPOINT").unwrap();

    let client = ClientConfig::new(
        api_key,
        endpoint,
        "web",
        User::new("test-user").with_attribute("country", "NL"),
    )
    .polling_interval(Duration::from_secs(60))
    .to_client()?;

    // Lookups before the first successful fetch serve the default.
    if let Err(err) = client.initialize().await {
        eprintln!("initial fetch failed: {err}");
    }

    let enabled = client.bool_variation("a-boolean-flag", false).await;
    println!("Variation: {enabled:?}");

    client.track("demo-finished", 1.0).await;
    client.flush().await?;
    client.destroy(false).await
}
