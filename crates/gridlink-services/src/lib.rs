//! gridlink-services: upload sessions, the status channel, and the
//! receiving side (reassembly, persistence, observation).

pub mod error;
pub mod grid_store;
pub mod link;
pub mod loopback;
pub mod observer;
pub mod reassembly;
pub mod resolver;
pub mod session;
pub mod status_channel;

pub use error::TransferError;
pub use grid_store::GridStore;
pub use link::{Adapter, DiscoveredDevice, Link, LinkError};
pub use loopback::{LoopbackAdapter, LoopbackPeer};
pub use observer::{GridObserver, GridSummary, Observation};
pub use reassembly::{GridReceiver, ReceiveError, Received};
pub use resolver::DeviceResolver;
pub use session::{
    CancelHandle, Progress, SessionConfig, SessionState, TransferReport, TransferSession,
};
pub use status_channel::{NotificationSink, StatusChannel, StatusNotification};
