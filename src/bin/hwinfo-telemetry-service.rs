//! hwinfo-telemetry-service - Companion process
//!
//! Reads HWiNFO shared memory on behalf of hwinfo-deck. It is launched by the
//! deck with a magic cookie and session token in its environment and serves
//! requests on stdin/stdout until stdin closes or a shutdown arrives.

use anyhow::Context;
use hwinfo_deck::{
    config::ReaderConfig,
    hwinfo,
    logging,
    service::protocol::{MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE, READER_CONFIG_KEY, SESSION_TOKEN_KEY},
    service::server::{send_handshake, serve},
};
use std::io::{self, BufReader};

fn main() -> anyhow::Result<()> {
    if std::env::var(MAGIC_COOKIE_KEY).as_deref() != Ok(MAGIC_COOKIE_VALUE) {
        eprintln!(
            "This binary is a companion of hwinfo-deck and is not meant to be run directly."
        );
        std::process::exit(1);
    }

    logging::init_service_logging("info");

    let token = std::env::var(SESSION_TOKEN_KEY).unwrap_or_default();
    let reader_config = match std::env::var(READER_CONFIG_KEY) {
        Ok(json) => serde_json::from_str::<ReaderConfig>(&json).unwrap_or_else(|e| {
            tracing::warn!("Invalid reader config, using defaults: {}", e);
            ReaderConfig::default()
        }),
        Err(_) => ReaderConfig::default(),
    };
    let mut reader = hwinfo::producer_reader(&reader_config);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut output = stdout.lock();
    send_handshake(&mut output, &token).context("failed to send handshake")?;
    tracing::info!(pid = std::process::id(), "Telemetry service ready");

    let outcome = serve(&mut reader, BufReader::new(stdin.lock()), output)
        .context("request loop failed")?;
    tracing::info!("Telemetry service stopping: {:?}", outcome);
    Ok(())
}
