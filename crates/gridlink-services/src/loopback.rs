//! In-memory transport: a simulated peer behind the `Adapter`/`Link` seam.
//!
//! The peer runs a [`GridReceiver`] on its upload endpoint and pushes a
//! [`PeerStatus`](gridlink_core::PeerStatus) snapshot on its status endpoint
//! after every write. Counters and fault injection make it usable as a test
//! double for sessions.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};

use gridlink_core::wire::{Opcode, MAX_ATTRIBUTE_LEN, STATUS_CHAR_UUID, UPLOAD_CHAR_UUID};
use gridlink_core::{GridRecord, PeerStatus};

use crate::grid_store::GridStore;
use crate::link::{Adapter, DiscoveredDevice, Link, LinkError};
use crate::reassembly::{GridReceiver, Received};

struct PeerState {
    receiver: GridReceiver,
    subscriber: Option<mpsc::UnboundedSender<Bytes>>,
    writes: Vec<Bytes>,
    fail_on_write: Option<usize>,
    drop_after_write: Option<usize>,
    trailing: Option<(Duration, Bytes)>,
}

#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    subscribes: AtomicUsize,
    unsubscribes: AtomicUsize,
    closes: AtomicUsize,
}

/// A simulated receiving device. Cloning shares the same device.
#[derive(Clone)]
pub struct LoopbackPeer {
    address: Arc<str>,
    name: Option<Arc<str>>,
    connected: Arc<AtomicBool>,
    counters: Arc<Counters>,
    state: Arc<Mutex<PeerState>>,
}

impl LoopbackPeer {
    pub fn new(address: &str, name: Option<&str>, max_bytes: usize) -> Self {
        Self::with_receiver(address, name, GridReceiver::new(max_bytes))
    }

    pub fn with_receiver(address: &str, name: Option<&str>, receiver: GridReceiver) -> Self {
        Self {
            address: address.into(),
            name: name.map(Into::into),
            connected: Arc::new(AtomicBool::new(false)),
            counters: Arc::default(),
            state: Arc::new(Mutex::new(PeerState {
                receiver,
                subscriber: None,
                writes: Vec::new(),
                fail_on_write: None,
                drop_after_write: None,
                trailing: None,
            })),
        }
    }

    /// A peer that accepts chunks of up to `max_chunk` bytes and persists
    /// every completed grid to `store`.
    pub fn persisting(
        address: &str,
        name: Option<&str>,
        max_bytes: usize,
        max_chunk: usize,
        store: GridStore,
    ) -> Self {
        let receiver = GridReceiver::new(max_bytes)
            .with_max_chunk(max_chunk)
            .with_store(store);
        Self::with_receiver(address, name, receiver)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn advertisement(&self) -> DiscoveredDevice {
        DiscoveredDevice::new(&*self.address, self.name.as_deref())
    }

    /// Reject the write with this zero-based index. The write is still
    /// recorded.
    pub async fn fail_on_write(&self, index: usize) {
        self.state.lock().await.fail_on_write = Some(index);
    }

    /// Accept the write with this zero-based index, then drop the link.
    pub async fn drop_after_write(&self, index: usize) {
        self.state.lock().await.drop_after_write = Some(index);
    }

    /// Push `notification` on the status endpoint `delay` after the final
    /// write of a transfer.
    pub async fn trailing_notification(&self, delay: Duration, notification: impl Into<Bytes>) {
        self.state.lock().await.trailing = Some((delay, notification.into()));
    }

    /// Push an arbitrary value to the current subscriber, if any.
    pub async fn notify(&self, value: impl Into<Bytes>) -> bool {
        let state = self.state.lock().await;
        push(&state, value.into())
    }

    /// Simulate the radio link going away.
    pub async fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.state.lock().await.subscriber = None;
        tracing::debug!(address = %self.address, "loopback link dropped");
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn writes(&self) -> Vec<Bytes> {
        self.state.lock().await.writes.clone()
    }

    pub async fn status(&self) -> PeerStatus {
        self.state.lock().await.receiver.status().clone()
    }

    pub async fn last_record(&self) -> Option<GridRecord> {
        self.state.lock().await.receiver.last_record().cloned()
    }

    pub fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    pub fn subscribes(&self) -> usize {
        self.counters.subscribes.load(Ordering::SeqCst)
    }

    pub fn unsubscribes(&self) -> usize {
        self.counters.unsubscribes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    async fn handle_write(&self, endpoint: &str, data: &[u8]) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        if endpoint != UPLOAD_CHAR_UUID {
            return Err(LinkError::UnknownEndpoint(endpoint.to_string()));
        }

        let mut state = self.state.lock().await;
        let index = state.writes.len();
        state.writes.push(Bytes::copy_from_slice(data));
        if state.fail_on_write == Some(index) {
            return Err(LinkError::Rejected(format!("injected failure at write {index}")));
        }
        if data.len() > MAX_ATTRIBUTE_LEN {
            return Err(LinkError::Rejected(format!(
                "value of {} bytes exceeds attribute limit",
                data.len()
            )));
        }

        let result = state.receiver.handle_write(data);
        let snapshot = Bytes::from(state.receiver.status().to_json_bytes());
        push(&state, snapshot);

        if state.drop_after_write == Some(index) {
            self.connected.store(false, Ordering::SeqCst);
            state.subscriber = None;
            tracing::debug!(address = %self.address, index, "loopback link dropped after write");
        }

        match result {
            Ok(received) => {
                if finishes_transfer(&received, data) {
                    if let Some((delay, value)) = state.trailing.clone() {
                        self.spawn_trailing(delay, value);
                    }
                }
                Ok(())
            }
            Err(e) => Err(LinkError::Rejected(e.to_string())),
        }
    }

    fn spawn_trailing(&self, delay: Duration, value: Bytes) {
        let state = self.state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let state = state.lock().await;
            if !push(&state, value) {
                tracing::debug!("trailing notification had no subscriber");
            }
        });
    }
}

/// The last write of a transfer: an end frame or an inline payload.
fn finishes_transfer(received: &Received, data: &[u8]) -> bool {
    match received {
        Received::Ended => true,
        Received::Completed(_) => data.first().is_some_and(|b| Opcode::try_from(*b).is_err()),
        _ => false,
    }
}

fn push(state: &PeerState, value: Bytes) -> bool {
    match &state.subscriber {
        Some(tx) => tx.send(value).is_ok(),
        None => false,
    }
}

/// Adapter over a fixed set of loopback peers.
#[derive(Clone, Default)]
pub struct LoopbackAdapter {
    peers: Vec<LoopbackPeer>,
}

impl LoopbackAdapter {
    pub fn new(peers: Vec<LoopbackPeer>) -> Self {
        Self { peers }
    }

    pub fn peer(&self, address: &str) -> Option<&LoopbackPeer> {
        self.peers.iter().find(|p| p.address() == address)
    }
}

#[async_trait]
impl Adapter for LoopbackAdapter {
    async fn scan(&self) -> Result<mpsc::Receiver<DiscoveredDevice>, LinkError> {
        let (tx, rx) = mpsc::channel(self.peers.len().max(1));
        let adverts: Vec<_> = self.peers.iter().map(LoopbackPeer::advertisement).collect();
        tokio::spawn(async move {
            for advert in adverts {
                if tx.send(advert).await.is_err() {
                    return;
                }
            }
            tx.closed().await;
        });
        Ok(rx)
    }

    async fn connect(&self, address: &str) -> Result<Box<dyn Link>, LinkError> {
        let peer = self
            .peer(address)
            .ok_or_else(|| LinkError::UnknownDevice(address.to_string()))?
            .clone();
        peer.connected.store(true, Ordering::SeqCst);
        peer.counters.connects.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(address, "loopback connected");
        Ok(Box::new(LoopbackLink { peer }))
    }
}

struct LoopbackLink {
    peer: LoopbackPeer,
}

#[async_trait]
impl Link for LoopbackLink {
    fn address(&self) -> &str {
        self.peer.address()
    }

    fn is_connected(&self) -> bool {
        self.peer.is_connected()
    }

    async fn write_with_response(&self, endpoint: &str, data: &[u8]) -> Result<(), LinkError> {
        self.peer.handle_write(endpoint, data).await
    }

    async fn subscribe(&self, endpoint: &str) -> Result<mpsc::UnboundedReceiver<Bytes>, LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        if endpoint != STATUS_CHAR_UUID {
            return Err(LinkError::UnknownEndpoint(endpoint.to_string()));
        }
        self.peer.counters.subscribes.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.peer.state.lock().await;
        let _ = tx.send(Bytes::from(state.receiver.status().to_json_bytes()));
        state.subscriber = Some(tx);
        Ok(rx)
    }

    async fn unsubscribe(&self, endpoint: &str) -> Result<(), LinkError> {
        self.peer.counters.unsubscribes.fetch_add(1, Ordering::SeqCst);
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        if endpoint != STATUS_CHAR_UUID {
            return Err(LinkError::UnknownEndpoint(endpoint.to_string()));
        }
        self.peer.state.lock().await.subscriber = None;
        Ok(())
    }

    async fn close(&self) -> Result<(), LinkError> {
        self.peer.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.peer.connected.store(false, Ordering::SeqCst);
        self.peer.state.lock().await.subscriber = None;
        Ok(())
    }
}
