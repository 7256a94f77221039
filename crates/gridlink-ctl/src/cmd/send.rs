//! `send`: upload a grid to the first matching peer.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use gridlink_core::config::{secs, GridlinkConfig};
use gridlink_core::wire::{chunk_count, Strategy};
use gridlink_core::Payload;
use gridlink_services::{
    DeviceResolver, GridStore, LoopbackAdapter, LoopbackPeer, SessionConfig, TransferSession,
};

use super::Flags;

const FLAGS: &[&str] = &[
    "--name",
    "--address",
    "--path",
    "--payload",
    "--wait",
    "--max-chunk",
    "--scan-timeout",
];

/// Address the in-process peer answers on when none is given.
const LOOPBACK_ADDRESS: &str = "00:00:00:00:00:01";

pub async fn cmd_send(mut config: GridlinkConfig, args: &[&str]) -> Result<()> {
    let flags = Flags::parse(args, FLAGS)?;
    if let Some(name) = flags.get("--name") {
        config.device.name_prefix = name.to_string();
    }
    if let Some(address) = flags.get("--address") {
        config.device.address = address.to_string();
    }
    if let Some(wait) = flags.number("--wait")? {
        config.transfer.grace_secs = wait;
    }
    if let Some(max_chunk) = flags.number("--max-chunk")? {
        config.transfer.max_chunk = max_chunk;
    }
    if let Some(timeout) = flags.number("--scan-timeout")? {
        config.discovery.timeout_secs = timeout;
    }
    config.validate().context("invalid options")?;

    // Validate before touching the radio.
    let payload = load_payload(flags.get("--path"), flags.get("--payload"))?;

    let adapter = loopback_adapter(&config);
    let resolver = DeviceResolver::new(&adapter, secs(config.discovery.timeout_secs));
    let address = resolver
        .resolve(&config.device.name_prefix, config.address())
        .await?;
    println!("[INFO] Connecting to {}", address);

    let max_chunk = config.transfer.max_chunk;
    let total = payload.len();
    match Strategy::select(total, max_chunk) {
        Strategy::Inline => println!("[INFO] Sending {} bytes inline", total),
        Strategy::Chunked => println!(
            "[INFO] Sending {} bytes in {} chunk(s) of up to {} bytes",
            total,
            chunk_count(total, max_chunk),
            max_chunk
        ),
    }

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    let mut session = TransferSession::new(
        address,
        payload,
        SessionConfig {
            max_chunk,
            grace: config.grace(),
        },
    )
    .with_progress(progress_tx);

    let progress_printer = tokio::spawn(async move {
        let mut index = 0;
        while let Some(p) = progress_rx.recv().await {
            index += 1;
            println!("[INFO] write {}: {}/{} bytes sent", index, p.sent, p.total);
        }
    });
    let status_printer = tokio::spawn(async move {
        while let Some(notification) = status_rx.recv().await {
            println!("[STATUS] {}", notification);
        }
    });

    let outcome = session.run(&adapter, status_tx).await;
    drop(session);
    let _ = progress_printer.await;
    let _ = status_printer.await;

    let report = outcome?;
    println!(
        "[INFO] Transfer complete: {} bytes in {} write(s)",
        report.bytes_sent, report.frames_written
    );
    Ok(())
}

fn load_payload(path: Option<&str>, inline: Option<&str>) -> Result<Payload> {
    let payload = match (inline, path) {
        (Some(json), _) => Payload::from_json_str(json),
        (None, Some(path)) => {
            let bytes = std::fs::read(Path::new(path))
                .with_context(|| format!("failed to read {}", path))?;
            Payload::from_json_bytes(bytes)
        }
        (None, None) => Ok(Payload::demo()),
    };
    payload.context("payload rejected")
}

/// The in-process peer `send` talks to. It accepts the configured chunk
/// size and persists to `[peer].grid_path`.
fn loopback_adapter(config: &GridlinkConfig) -> LoopbackAdapter {
    let address = config.address().unwrap_or(LOOPBACK_ADDRESS);
    let name = format!("{}-loopback", config.device.name_prefix);
    let peer = LoopbackPeer::persisting(
        address,
        Some(&name),
        config.peer.max_bytes as usize,
        config.transfer.max_chunk,
        GridStore::new(&config.peer.grid_path),
    );
    LoopbackAdapter::new(vec![peer])
}
