//! Link abstraction: the seam between the transfer protocol and a radio.
//!
//! The protocol needs very little from the transport: a time-bounded scan
//! for advertising devices, a connection that supports confirmed writes to
//! one endpoint, and a notification stream from another. Radio backends
//! implement [`Adapter`] and [`Link`]; [`crate::loopback`] is the in-memory
//! implementation used by the CLI and the tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// A device seen during a discovery scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Connectable address (MAC or platform identifier).
    pub address: String,
    /// Advertised local name, if the advertisement carried one.
    pub name: Option<String>,
}

impl DiscoveredDevice {
    pub fn new(address: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            address: address.into(),
            name: name.map(str::to_string),
        }
    }

    pub fn name_starts_with(&self, prefix: &str) -> bool {
        self.name.as_deref().is_some_and(|n| n.starts_with(prefix))
    }
}

/// Errors surfaced by a transport backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("link is not connected")]
    NotConnected,

    #[error("no device with address {0}")]
    UnknownDevice(String),

    #[error("endpoint {0} not found on peer")]
    UnknownEndpoint(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("peer rejected write: {0}")]
    Rejected(String),

    #[error("scan failed: {0}")]
    Scan(String),
}

/// Entry point of a transport: discovery and connection establishment.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Start a discovery scan. Advertisements arrive on the returned
    /// receiver until the scan ends or the receiver is dropped, which stops
    /// the scan.
    async fn scan(&self) -> Result<mpsc::Receiver<DiscoveredDevice>, LinkError>;

    /// Establish a connection to `address`.
    async fn connect(&self, address: &str) -> Result<Box<dyn Link>, LinkError>;
}

/// An established connection to one peer.
#[async_trait]
pub trait Link: Send + Sync {
    fn address(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Write `data` to `endpoint` and wait for the peer's confirmation.
    /// Timeouts enforced by the backend surface as `LinkError::Timeout`.
    async fn write_with_response(&self, endpoint: &str, data: &[u8]) -> Result<(), LinkError>;

    /// Enable notifications on `endpoint`. Values arrive in order on the
    /// returned receiver until [`Link::unsubscribe`] or [`Link::close`].
    async fn subscribe(&self, endpoint: &str) -> Result<mpsc::UnboundedReceiver<Bytes>, LinkError>;

    async fn unsubscribe(&self, endpoint: &str) -> Result<(), LinkError>;

    async fn close(&self) -> Result<(), LinkError>;
}
