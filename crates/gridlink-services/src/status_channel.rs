//! Status channel: forwards peer notifications to a caller-owned sink.
//!
//! Notifications are produced by the link on its own schedule. A forwarder
//! task moves them, in arrival order, into an unbounded mpsc sink so the
//! write path never waits on the consumer.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use gridlink_core::wire::STATUS_CHAR_UUID;
use gridlink_core::PeerStatus;

use crate::error::TransferError;
use crate::link::{Link, LinkError};

/// One value pushed by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusNotification {
    /// Valid UTF-8, usually a JSON status snapshot.
    Text(String),
    /// Not UTF-8. Delivered as-is, never treated as an error.
    Raw(Bytes),
}

impl StatusNotification {
    pub fn decode(raw: Bytes) -> Self {
        match std::str::from_utf8(&raw) {
            Ok(text) => StatusNotification::Text(text.to_string()),
            Err(_) => StatusNotification::Raw(raw),
        }
    }

    /// Best-effort parse as a status snapshot.
    pub fn as_peer_status(&self) -> Option<PeerStatus> {
        match self {
            StatusNotification::Text(text) => serde_json::from_str(text).ok(),
            StatusNotification::Raw(_) => None,
        }
    }
}

impl std::fmt::Display for StatusNotification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusNotification::Text(text) => f.write_str(text),
            StatusNotification::Raw(raw) => write!(f, "raw bytes: {}", hex::encode(raw)),
        }
    }
}

/// Where decoded notifications go.
pub type NotificationSink = mpsc::UnboundedSender<StatusNotification>;

/// A live subscription to the peer's status endpoint.
pub struct StatusChannel {
    link: Arc<dyn Link>,
    stop: Option<oneshot::Sender<()>>,
    forwarder: Option<JoinHandle<usize>>,
}

impl StatusChannel {
    /// Enable notifications and start forwarding into `sink`.
    pub async fn subscribe(
        link: Arc<dyn Link>,
        sink: NotificationSink,
    ) -> Result<Self, TransferError> {
        if !link.is_connected() {
            return Err(TransferError::ChannelClosed);
        }
        let notifications = link
            .subscribe(STATUS_CHAR_UUID)
            .await
            .map_err(channel_error)?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let forwarder = tokio::spawn(forward(notifications, sink, stop_rx));
        tracing::debug!(address = link.address(), "status channel subscribed");

        Ok(Self {
            link,
            stop: Some(stop_tx),
            forwarder: Some(forwarder),
        })
    }

    pub fn is_subscribed(&self) -> bool {
        self.forwarder.is_some()
    }

    /// Stop delivery. Notifications already received by the link are
    /// flushed to the sink before this returns. A second call on a live
    /// connection is a no-op.
    pub async fn unsubscribe(&mut self) -> Result<(), TransferError> {
        if !self.link.is_connected() {
            return Err(TransferError::ChannelClosed);
        }
        let Some(forwarder) = self.forwarder.take() else {
            return Ok(());
        };

        let result = self.link.unsubscribe(STATUS_CHAR_UUID).await;
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match forwarder.await {
            Ok(delivered) => tracing::debug!(delivered, "status channel unsubscribed"),
            Err(e) => tracing::warn!(error = %e, "status forwarder panicked"),
        }
        result.map_err(channel_error)
    }
}

fn channel_error(e: LinkError) -> TransferError {
    match e {
        LinkError::NotConnected => TransferError::ChannelClosed,
        other => TransferError::Connection(other),
    }
}

async fn forward(
    mut notifications: mpsc::UnboundedReceiver<Bytes>,
    sink: NotificationSink,
    mut stop: oneshot::Receiver<()>,
) -> usize {
    let mut delivered = 0;
    loop {
        tokio::select! {
            biased;
            raw = notifications.recv() => match raw {
                Some(raw) => {
                    deliver(&sink, raw);
                    delivered += 1;
                }
                None => break,
            },
            _ = &mut stop => {
                while let Ok(raw) = notifications.try_recv() {
                    deliver(&sink, raw);
                    delivered += 1;
                }
                break;
            }
        }
    }
    delivered
}

fn deliver(sink: &NotificationSink, raw: Bytes) {
    let len = raw.len();
    let notification = StatusNotification::decode(raw);
    if matches!(notification, StatusNotification::Raw(_)) {
        tracing::debug!(len, "undecodable status notification");
    } else {
        tracing::debug!(len, "status notification");
    }
    if sink.send(notification).is_err() {
        tracing::trace!("status sink dropped");
    }
}
