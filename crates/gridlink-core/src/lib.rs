//! gridlink-core: wire format, payload model, peer status, and configuration.
//! All other gridlink crates depend on this one.

pub mod config;
pub mod grid;
pub mod status;
pub mod wire;

pub use grid::{GridRecord, GridStats, Payload, PayloadError};
pub use status::PeerStatus;
pub use wire::{Frame, Opcode, Strategy, WireError};
