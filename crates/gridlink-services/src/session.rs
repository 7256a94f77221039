//! Transfer session: one upload of one payload to one peer.
//!
//! ```text
//! Idle → Connecting → Active(Inline | Chunked) → Completed | Failed | Cancelled
//! ```
//!
//! Writes are strictly sequential: each frame waits for the link's
//! confirmation before the next is issued. The status channel runs beside
//! the write loop and shares nothing with it except the link. Whatever
//! terminal state is reached, teardown (unsubscribe, then close) runs
//! exactly once before `run` returns. If the `run` future is dropped
//! early, teardown is spawned onto the runtime instead.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use gridlink_core::wire::{chunk_frames, Frame, Strategy, DEFAULT_MAX_CHUNK, UPLOAD_CHAR_UUID};
use gridlink_core::Payload;

use crate::error::TransferError;
use crate::link::{Adapter, Link};
use crate::status_channel::{NotificationSink, StatusChannel};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Active(Strategy),
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }
}

/// Tunables for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Max payload bytes per chunk; payloads up to this size go inline.
    pub max_chunk: usize,
    /// How long to keep listening for status after the final write.
    pub grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_chunk: DEFAULT_MAX_CHUNK,
            grace: Duration::from_secs(2),
        }
    }
}

/// Cumulative progress, one event per confirmed payload write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub sent: usize,
    pub total: usize,
}

/// Outcome of a completed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    pub strategy: Strategy,
    pub bytes_sent: usize,
    pub frames_written: usize,
}

/// Requests cancellation of a chunked transfer before its next chunk.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

pub struct TransferSession {
    address: String,
    payload: Payload,
    config: SessionConfig,
    strategy: Strategy,
    state: SessionState,
    offset: usize,
    frames_written: usize,
    progress: Option<mpsc::UnboundedSender<Progress>>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl TransferSession {
    pub fn new(address: impl Into<String>, payload: Payload, config: SessionConfig) -> Self {
        let config = SessionConfig {
            max_chunk: config.max_chunk.max(1),
            ..config
        };
        let strategy = Strategy::select(payload.len(), config.max_chunk);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            address: address.into(),
            payload,
            config,
            strategy,
            state: SessionState::Idle,
            offset: 0,
            frames_written: 0,
            progress: None,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        }
    }

    /// Stream a `Progress` event after every confirmed payload write.
    pub fn with_progress(mut self, progress: mpsc::UnboundedSender<Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel_tx.clone())
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Payload bytes confirmed so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Connect, subscribe, send, wait out the grace period on success, and
    /// tear down. Status notifications go to `sink` for the lifetime of the
    /// subscription.
    pub async fn run(
        &mut self,
        adapter: &dyn Adapter,
        sink: NotificationSink,
    ) -> Result<TransferReport, TransferError> {
        if self.state != SessionState::Idle {
            return Err(TransferError::SessionReused);
        }
        self.transition(SessionState::Connecting);

        let link: Arc<dyn Link> = match adapter.connect(&self.address).await {
            Ok(link) => Arc::from(link),
            Err(e) => {
                tracing::warn!(address = %self.address, error = %e, "connect failed");
                self.transition(SessionState::Failed);
                return Err(TransferError::Connection(e));
            }
        };
        tracing::info!(address = %self.address, "connected");
        let mut teardown = Teardown::new(link.clone());

        match StatusChannel::subscribe(link.clone(), sink).await {
            Ok(channel) => teardown.channel = Some(channel),
            Err(e) => {
                self.transition(SessionState::Failed);
                teardown.run().await;
                return Err(e);
            }
        }

        self.transition(SessionState::Active(self.strategy));
        let outcome = self.send(link.as_ref()).await;

        match &outcome {
            Ok(_) => {
                self.transition(SessionState::Completed);
                if !self.config.grace.is_zero() {
                    tracing::debug!(grace = ?self.config.grace, "waiting for trailing status");
                    tokio::time::sleep(self.config.grace).await;
                }
            }
            Err(TransferError::Cancelled { .. }) => self.transition(SessionState::Cancelled),
            Err(_) => self.transition(SessionState::Failed),
        }

        teardown.run().await;
        tracing::debug!(address = %self.address, state = ?self.state, "session torn down");
        outcome
    }

    async fn send(&mut self, link: &dyn Link) -> Result<TransferReport, TransferError> {
        let total = self.payload.len();
        tracing::info!(strategy = ?self.strategy, total, "sending payload");

        match self.strategy {
            Strategy::Inline => {
                let raw = self.payload.bytes().clone();
                self.write(link, &raw).await?;
                self.advance(total);
            }
            Strategy::Chunked => {
                self.write_frame(link, &Frame::Start {
                    total_length: total as u32,
                })
                .await?;

                for chunk in chunk_frames(self.payload.bytes(), self.config.max_chunk) {
                    if *self.cancel_rx.borrow() {
                        self.write_frame(link, &Frame::Cancel).await?;
                        tracing::info!(sent = self.offset, total, "cancel frame sent");
                        return Err(TransferError::Cancelled {
                            sent: self.offset,
                            total,
                        });
                    }
                    let len = match &chunk {
                        Frame::Chunk(body) => body.len(),
                        _ => 0,
                    };
                    self.write_frame(link, &chunk).await?;
                    self.advance(self.offset + len);
                    tracing::info!(sent = self.offset, total, "chunk sent");
                }

                self.write_frame(link, &Frame::End).await?;
                tracing::info!("end frame sent");
            }
        }

        Ok(TransferReport {
            strategy: self.strategy,
            bytes_sent: self.offset,
            frames_written: self.frames_written,
        })
    }

    async fn write_frame(&mut self, link: &dyn Link, frame: &Frame) -> Result<(), TransferError> {
        self.write(link, &frame.encode()).await
    }

    async fn write(&mut self, link: &dyn Link, data: &Bytes) -> Result<(), TransferError> {
        let frame = self.frames_written;
        link.write_with_response(UPLOAD_CHAR_UUID, data)
            .await
            .map_err(|source| {
                tracing::warn!(frame, error = %source, "write failed, aborting transfer");
                TransferError::WriteFailure { frame, source }
            })?;
        self.frames_written += 1;
        Ok(())
    }

    fn advance(&mut self, offset: usize) {
        self.offset = offset;
        if let Some(progress) = &self.progress {
            let _ = progress.send(Progress {
                sent: offset,
                total: self.payload.len(),
            });
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }
}

/// Owns the connection for the life of one run. `run` releases it; if the
/// session future is dropped first, `Drop` spawns the release instead.
struct Teardown {
    link: Option<Arc<dyn Link>>,
    channel: Option<StatusChannel>,
}

impl Teardown {
    fn new(link: Arc<dyn Link>) -> Self {
        Self {
            link: Some(link),
            channel: None,
        }
    }

    async fn run(&mut self) {
        if let Some(link) = self.link.take() {
            release(link, self.channel.take()).await;
        }
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        let channel = self.channel.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(address = link.address(), "session dropped mid-run, releasing link");
                handle.spawn(release(link, channel));
            }
            Err(_) => {
                tracing::warn!(address = link.address(), "session dropped outside a runtime, link left open");
            }
        }
    }
}

/// Unsubscribe, then close. Failures are logged and never replace the
/// transfer outcome.
async fn release(link: Arc<dyn Link>, channel: Option<StatusChannel>) {
    if let Some(mut channel) = channel {
        if let Err(e) = channel.unsubscribe().await {
            tracing::warn!(error = %e, "unsubscribe during teardown failed");
        }
    }
    if let Err(e) = link.close().await {
        tracing::warn!(error = %e, "close during teardown failed");
    }
}
