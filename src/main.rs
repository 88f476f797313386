//! # Repeater KML service
//! Polls the NGGMRS node status API and republishes the repeater network as a KML document that
//! ATAK, Google Earth and other mapping clients can load over HTTP.
//!
//! Every refresh fetches the node list, colours each repeater by its status (yellow while
//! transmitting, red when its last report is older than five minutes, green otherwise) and swaps
//! the new document in for the old one. A failed refresh keeps serving the previous document.
//!
//! # Configure
//! Settings are read from `src/config.json`, or from the file named by `REPEATER_KML_CONFIG`.
//! Every field is optional.
//! ```json
//! {
//!     "source_url": "https://stats.nggmrs.net/api/nodes",
//!     "http_port": 8080,
//!     "refresh_interval_sec": 300,
//!     "output_path": "nggmrs_repeaters.kml"
//! }
//! ```
//! `PORT` in the environment overrides `http_port`.
//!
//! # Run the server
//! ```bash
//! RUST_LOG=info cargo run
//! ```
//! The document is served at `http://<host>:<port>/kml`.
use repeater_kml::{config, http, kml, scheduler, source, store};

use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let configs = config::Config::load().unwrap_or_else(|err| {
        log::error!("Failed to load config: {}", err);
        std::process::exit(1);
    });

    log::info!(
        "Polling {} every {}s, serving on {}",
        configs.source_url,
        configs.refresh_interval_sec,
        configs.bind_addr()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let document_store = Arc::new(store::DocumentStore::new());

    let node_source = source::HttpNodeSource::new(&configs.source_url, configs.fetch_timeout())?;
    let mut refresher = scheduler::Refresher::new(
        node_source,
        Arc::clone(&document_store),
        configs.refresh_interval(),
    )
    .with_builder(kml::DocumentBuilder::new(&configs.document_name));
    if let Some(path) = &configs.output_path {
        refresher = refresher.with_output_path(path);
    }

    let refresh_shutdown = shutdown_rx.clone();
    let refresh_task = tokio::spawn(async move {
        refresher.run(refresh_shutdown).await;
    });

    let config = Arc::new(configs);
    let http_store = Arc::clone(&document_store);
    let http_shutdown = shutdown_rx.clone();
    let http_listener_task = tokio::spawn(async move {
        if let Err(e) = http::listen(http_store, config, http_shutdown).await {
            log::error!("HTTP listener failed: {}", e);
            std::process::exit(1);
        }
    });

    tokio::signal::ctrl_c().await?;
    log::info!("Received Ctrl+C, shutting down gracefully...");
    shutdown_tx.send(true).ok();

    tokio::try_join!(refresh_task, http_listener_task)?;

    log::info!("Repeater KML service stopped.");
    Ok(())
}
