//! Peer-side reassembly: turns upload writes back into a grid.
//!
//! This is the receiving half of the protocol, used by the loopback peer.
//! Each write is either a frame (first byte is an opcode) or, outside a
//! chunked transfer, a complete inline payload.

use bytes::BytesMut;

use gridlink_core::grid::{parse_grid, GridError};
use gridlink_core::wire::{Frame, Opcode, WireError, DEFAULT_MAX_CHUNK};
use gridlink_core::{GridRecord, PeerStatus};

use crate::grid_store::GridStore;

/// Status message recorded when the sender abandons a transfer.
pub const CANCELLED_BY_CLIENT: &str = "transfer cancelled by client";

/// What an accepted write did.
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    /// Start frame accepted; expecting this many bytes.
    Started { expected: usize },
    /// Chunk appended; transfer still incomplete.
    Progress { received: usize, expected: usize },
    /// A full grid arrived, inline or as the final chunk.
    Completed(GridRecord),
    /// End frame acknowledged.
    Ended,
    /// Cancel frame acknowledged; partial data discarded.
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error("invalid write length {0}")]
    InvalidLength(usize),

    #[error("chunk received without a start frame")]
    UnexpectedChunk,

    #[error("received {received} bytes, more than the {expected} announced")]
    Overflow { received: usize, expected: usize },

    #[error("end frame after {received} of {expected} bytes")]
    Incomplete { received: usize, expected: usize },

    #[error("payload of {len} bytes exceeds limit of {max}")]
    TooLarge { len: usize, max: usize },

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("failed to persist grid: {0}")]
    Store(#[from] std::io::Error),
}

/// Reassembly state machine for one upload endpoint.
pub struct GridReceiver {
    max_chunk: usize,
    max_bytes: usize,
    expected: Option<usize>,
    buffer: BytesMut,
    store: Option<GridStore>,
    status: PeerStatus,
    last_record: Option<GridRecord>,
}

impl GridReceiver {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_chunk: DEFAULT_MAX_CHUNK,
            max_bytes,
            expected: None,
            buffer: BytesMut::new(),
            store: None,
            status: PeerStatus::new(max_bytes as u64),
            last_record: None,
        }
    }

    pub fn with_max_chunk(mut self, max_chunk: usize) -> Self {
        self.max_chunk = max_chunk;
        self
    }

    /// Persist every completed grid through `store`.
    pub fn with_store(mut self, store: GridStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn status(&self) -> &PeerStatus {
        &self.status
    }

    pub fn last_record(&self) -> Option<&GridRecord> {
        self.last_record.as_ref()
    }

    pub fn in_transfer(&self) -> bool {
        self.expected.is_some()
    }

    /// Handle one write to the upload endpoint. Errors are also recorded in
    /// the status snapshot.
    pub fn handle_write(&mut self, data: &[u8]) -> Result<Received, ReceiveError> {
        let result = self.dispatch(data);
        if let Err(e) = &result {
            tracing::debug!(error = %e, "upload write rejected");
            self.status.mark_error(e.to_string());
        }
        result
    }

    fn dispatch(&mut self, data: &[u8]) -> Result<Received, ReceiveError> {
        let Some(&first) = data.first() else {
            return Err(ReceiveError::InvalidLength(0));
        };
        if Opcode::try_from(first).is_err() && !self.in_transfer() {
            return self.inline(data);
        }

        match Frame::decode(data)? {
            Frame::Start { total_length } => self.start(total_length as usize),
            Frame::Chunk(body) => self.chunk(&body),
            Frame::End => self.end(),
            Frame::Cancel => {
                self.reset();
                self.status.cancel_reception(CANCELLED_BY_CLIENT);
                Ok(Received::Cancelled)
            }
        }
    }

    fn inline(&mut self, data: &[u8]) -> Result<Received, ReceiveError> {
        if data.len() > self.max_bytes {
            return Err(ReceiveError::TooLarge {
                len: data.len(),
                max: self.max_bytes,
            });
        }
        self.finish(data).map(Received::Completed)
    }

    fn start(&mut self, expected: usize) -> Result<Received, ReceiveError> {
        self.reset();
        if expected > self.max_bytes {
            return Err(ReceiveError::TooLarge {
                len: expected,
                max: self.max_bytes,
            });
        }
        self.expected = Some(expected);
        self.buffer.reserve(expected);
        self.status.start_reception(expected as u64);
        Ok(Received::Started { expected })
    }

    fn chunk(&mut self, body: &[u8]) -> Result<Received, ReceiveError> {
        let Some(expected) = self.expected else {
            return Err(ReceiveError::UnexpectedChunk);
        };
        if body.is_empty() || body.len() > self.max_chunk {
            return Err(ReceiveError::InvalidLength(body.len()));
        }

        self.buffer.extend_from_slice(body);
        let received = self.buffer.len();
        if received > expected {
            self.reset();
            return Err(ReceiveError::Overflow { received, expected });
        }
        if received == expected {
            let data = std::mem::take(&mut self.buffer);
            self.expected = None;
            return self.finish(&data).map(Received::Completed);
        }

        self.status.progress_reception(received as u64);
        Ok(Received::Progress { received, expected })
    }

    fn end(&mut self) -> Result<Received, ReceiveError> {
        if let Some(expected) = self.expected {
            let received = self.buffer.len();
            self.reset();
            return Err(ReceiveError::Incomplete { received, expected });
        }
        Ok(Received::Ended)
    }

    fn finish(&mut self, data: &[u8]) -> Result<GridRecord, ReceiveError> {
        let grid = parse_grid(data)?;
        let record = GridRecord::new(grid, data.len());
        let saved_at = record.received_at.clone();
        if let Some(store) = &self.store {
            store.save(&record)?;
        }
        self.status.mark_saved(&saved_at, data.len() as u64, &record.hash);
        tracing::info!(bytes = data.len(), stats = %record.stats(), "grid received");
        self.last_record = Some(record.clone());
        Ok(record)
    }

    fn reset(&mut self) {
        self.expected = None;
        self.buffer.clear();
    }
}
