//! gridlink integration test harness.
//!
//! Every test drives the full resolve → session → teardown flow against an
//! in-memory loopback peer, so nothing here needs a radio or root.
//!
//!   cargo test --test integration

use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use tokio::sync::mpsc;

use gridlink_core::wire::MAX_ATTRIBUTE_LEN;
use gridlink_core::Payload;
use gridlink_services::{
    DeviceResolver, GridReceiver, LoopbackAdapter, LoopbackPeer, SessionConfig, StatusNotification,
    TransferError, TransferReport, TransferSession,
};

// ── Harness ───────────────────────────────────────────────────────────────────

pub const PEER_ADDRESS: &str = "C0:FF:EE:00:00:01";
pub const PEER_NAME: &str = "TMbot-test";
pub const MAX_BYTES: usize = 1 << 20;
/// Largest chunk body the harness peer accepts: anything that fits an
/// attribute alongside the opcode.
pub const PEER_MAX_CHUNK: usize = MAX_ATTRIBUTE_LEN - 1;

/// A valid grid exactly `len` bytes long (padded with trailing whitespace).
pub fn grid_of_len(len: usize) -> Payload {
    let mut points = Vec::new();
    let mut text = String::from("[]");
    let mut i = 0;
    loop {
        points.push(format!("[{},{}]", i % 10, i / 10 % 10));
        let candidate = format!("[[{}]]", points.join(","));
        if candidate.len() > len {
            break;
        }
        text = candidate;
        i += 1;
    }
    assert!(text.len() <= len, "cannot build a grid of {len} bytes");
    let padded = format!("{text:<len$}");
    Payload::from_json_str(&padded).expect("generated grid is valid JSON")
}

pub fn loopback() -> (LoopbackAdapter, LoopbackPeer) {
    let receiver = GridReceiver::new(MAX_BYTES).with_max_chunk(PEER_MAX_CHUNK);
    let peer = LoopbackPeer::with_receiver(PEER_ADDRESS, Some(PEER_NAME), receiver);
    (LoopbackAdapter::new(vec![peer.clone()]), peer)
}

pub fn quick(max_chunk: usize) -> SessionConfig {
    SessionConfig {
        max_chunk,
        grace: Duration::ZERO,
    }
}

/// Everything one session run produced.
pub struct Outcome {
    pub result: Result<TransferReport, TransferError>,
    pub session: TransferSession,
    pub notifications: Vec<StatusNotification>,
}

/// Resolve by name prefix, then run one session to completion.
pub async fn send(
    adapter: &LoopbackAdapter,
    payload: Payload,
    config: SessionConfig,
) -> Result<Outcome> {
    let resolver = DeviceResolver::new(adapter, Duration::from_secs(1));
    let address = resolver.resolve("TMbot", None).await?;
    let session = TransferSession::new(address, payload, config);
    Ok(run(adapter, session).await)
}

pub async fn run(adapter: &LoopbackAdapter, mut session: TransferSession) -> Outcome {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = session.run(adapter, tx).await;
    let mut notifications = Vec::new();
    while let Ok(n) = rx.try_recv() {
        notifications.push(n);
    }
    Outcome {
        result,
        session,
        notifications,
    }
}

/// Concatenated bodies of every Chunk frame in `writes`.
pub fn chunk_bodies(writes: &[Bytes]) -> Vec<Bytes> {
    writes
        .iter()
        .filter(|w| w.first() == Some(&0x02))
        .map(|w| w.slice(1..))
        .collect()
}

// ── Test modules ──────────────────────────────────────────────────────────────

mod discovery;
mod status;
mod teardown;
mod transfer;

#[test]
fn grid_helper_hits_exact_lengths() {
    for len in [2, 3, 9, 180, 181, 500, 2000] {
        assert_eq!(grid_of_len(len).len(), len);
    }
}
