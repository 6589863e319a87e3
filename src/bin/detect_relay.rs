//! detect_relay - server-side detection relay
//!
//! This daemon:
//! 1. Loads the backend settings and the server-held credential
//! 2. Serves POST /detect-objects with permissive CORS
//! 3. Stops on Ctrl-C

use anyhow::Result;
use std::sync::mpsc;

use brainsight::relay::{RelayServer, DETECT_PATH};
use brainsight::{BrainsightConfig, DetectionClient};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = BrainsightConfig::load()?;
    // Refuses to start without a credential.
    let client = DetectionClient::from_settings(&config.backend)?;

    let handle = RelayServer::new(config.relay.clone(), client).spawn()?;
    log::info!(
        "detection relay listening on http://{}{} (upstream {})",
        handle.addr,
        DETECT_PATH,
        config.backend.url
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    log::info!("detect_relay waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping relay...");
    handle.stop()?;

    Ok(())
}
