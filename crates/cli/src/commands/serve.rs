//! `nebula serve`: start the HTTP API server.

use std::path::Path;
use tracing::warn;

pub async fn run(
    config_path: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    if !config.has_api_key() {
        warn!("GOOGLE_API_KEY is not set; chat turns will answer with a support notice until a key is configured");
    }

    println!("Nebula API");
    println!("   Listening: {}:{}", config.server.host, config.server.port);
    println!("   Model:     {}", config.chat_model);
    println!("   Docs dir:  {}", config.retrieval.docs_dir);

    let (engine, event_bus) = super::build_engine(&config).await;
    nebula_server::start(&config, engine, event_bus).await?;

    Ok(())
}
