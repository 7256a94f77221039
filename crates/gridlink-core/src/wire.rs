//! gridlink wire format: the frames written to the peer's upload endpoint.
//!
//! These types ARE the protocol. Every opcode and every byte offset is part
//! of what the peer firmware parses. Changing anything here is a breaking
//! change for deployed peers.
//!
//! | Frame  | Byte 0        | Bytes 1..N                               |
//! |--------|---------------|------------------------------------------|
//! | Start  | opcode_start  | total length, 4 bytes little-endian u32  |
//! | Chunk  | opcode_chunk  | raw payload slice, at most `max_chunk`   |
//! | End    | opcode_end    | (none)                                   |
//! | Cancel | opcode_cancel | (none)                                   |
//!
//! Inline uploads (payload no larger than one chunk) are written raw and
//! never pass through this module's encoder.

use bytes::{BufMut, Bytes, BytesMut};

// ── Endpoints ─────────────────────────────────────────────────────────────────

/// Primary service advertised by the peer.
pub const SERVICE_UUID: &str = "12345678-1234-5678-1234-56789abc0000";

/// Write-with-response endpoint that receives inline payloads and frames.
pub const UPLOAD_CHAR_UUID: &str = "12345678-1234-5678-1234-56789abc0001";

/// Notify endpoint that pushes status snapshots.
pub const STATUS_CHAR_UUID: &str = "12345678-1234-5678-1234-56789abc0002";

// ── Limits ────────────────────────────────────────────────────────────────────

/// Default maximum payload bytes carried by one Chunk frame.
pub const DEFAULT_MAX_CHUNK: usize = 180;

/// Largest value a single attribute write may carry on the link.
/// A Chunk frame is `1 + max_chunk` bytes and must fit.
pub const MAX_ATTRIBUTE_LEN: usize = 512;

/// Encoded size of a Start frame: opcode + u32 length.
pub const START_FRAME_LEN: usize = 5;

/// Advertised name prefix of the peer family.
pub const DEFAULT_NAME_PREFIX: &str = "TMbot";

// ── Opcodes ───────────────────────────────────────────────────────────────────

/// Frame discriminator, always byte 0 of a framed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Start = 0x01,
    Chunk = 0x02,
    Cancel = 0x03,
    End = 0x04,
}

impl TryFrom<u8> for Opcode {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Opcode::Start),
            0x02 => Ok(Opcode::Chunk),
            0x03 => Ok(Opcode::Cancel),
            0x04 => Ok(Opcode::End),
            other => Err(WireError::UnknownOpcode(other)),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

// ── Frames ────────────────────────────────────────────────────────────────────

/// One unit of chunked-transfer wire data.
///
/// `Chunk` carries a cheap `Bytes` view into the payload; slicing a payload
/// into chunks never copies until the frame is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Announces a chunked transfer of `total_length` bytes.
    Start { total_length: u32 },
    /// One contiguous slice of the payload. No per-chunk length prefix.
    Chunk(Bytes),
    /// Marks successful completion of a chunked transfer.
    End,
    /// Abandons an in-progress chunked transfer.
    Cancel,
}

impl Frame {
    pub fn opcode(&self) -> Opcode {
        match self {
            Frame::Start { .. } => Opcode::Start,
            Frame::Chunk(_) => Opcode::Chunk,
            Frame::End => Opcode::End,
            Frame::Cancel => Opcode::Cancel,
        }
    }

    /// Size of the encoded frame in bytes.
    pub fn encoded_len(&self) -> usize {
        match self {
            Frame::Start { .. } => START_FRAME_LEN,
            Frame::Chunk(body) => 1 + body.len(),
            Frame::End | Frame::Cancel => 1,
        }
    }

    /// Serialize to the exact bytes written to the upload endpoint. Total.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.opcode().into());
        match self {
            Frame::Start { total_length } => buf.put_u32_le(*total_length),
            Frame::Chunk(body) => buf.put_slice(body),
            Frame::End | Frame::Cancel => {}
        }
        buf.freeze()
    }

    /// Parse one framed write. Used on the receiving side.
    pub fn decode(data: &[u8]) -> Result<Frame, WireError> {
        let (&first, rest) = data.split_first().ok_or(WireError::Empty)?;
        match Opcode::try_from(first)? {
            Opcode::Start => {
                if data.len() < START_FRAME_LEN {
                    return Err(WireError::Truncated {
                        opcode: first,
                        expected: START_FRAME_LEN,
                        actual: data.len(),
                    });
                }
                if data.len() > START_FRAME_LEN {
                    return Err(WireError::TrailingBytes {
                        opcode: first,
                        extra: data.len() - START_FRAME_LEN,
                    });
                }
                let mut len = [0u8; 4];
                len.copy_from_slice(&rest[..4]);
                Ok(Frame::Start {
                    total_length: u32::from_le_bytes(len),
                })
            }
            Opcode::Chunk => Ok(Frame::Chunk(Bytes::copy_from_slice(rest))),
            Opcode::End | Opcode::Cancel if !rest.is_empty() => Err(WireError::TrailingBytes {
                opcode: first,
                extra: rest.len(),
            }),
            Opcode::End => Ok(Frame::End),
            Opcode::Cancel => Ok(Frame::Cancel),
        }
    }
}

// ── Strategy ──────────────────────────────────────────────────────────────────

/// How a payload crosses the link. Chosen once from its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One raw write, no opcode wrapper.
    Inline,
    /// Start, ⌈L / M⌉ Chunk frames, End.
    Chunked,
}

impl Strategy {
    pub fn select(len: usize, max_chunk: usize) -> Strategy {
        if len <= max_chunk {
            Strategy::Inline
        } else {
            Strategy::Chunked
        }
    }
}

/// Number of Chunk frames needed for `len` bytes.
pub fn chunk_count(len: usize, max_chunk: usize) -> usize {
    len.div_ceil(max_chunk.max(1))
}

/// Lazily slice `payload` into Chunk frames of at most `max_chunk` bytes,
/// in increasing offset order.
pub fn chunk_frames(payload: &Bytes, max_chunk: usize) -> ChunkFrames {
    ChunkFrames {
        payload: payload.clone(),
        offset: 0,
        max_chunk: max_chunk.max(1),
    }
}

/// Iterator returned by [`chunk_frames`].
#[derive(Debug, Clone)]
pub struct ChunkFrames {
    payload: Bytes,
    offset: usize,
    max_chunk: usize,
}

impl ChunkFrames {
    /// Bytes already handed out.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for ChunkFrames {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.offset >= self.payload.len() {
            return None;
        }
        let end = (self.offset + self.max_chunk).min(self.payload.len());
        let body = self.payload.slice(self.offset..end);
        self.offset = end;
        Some(Frame::Chunk(body))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = chunk_count(self.payload.len() - self.offset, self.max_chunk);
        (n, Some(n))
    }
}

impl ExactSizeIterator for ChunkFrames {}

/// The complete frame sequence for a payload. Empty for Inline payloads,
/// which bypass framing entirely.
///
/// The caller guarantees `payload.len()` fits in a u32 (see `Payload`).
pub fn transfer_frames(payload: &Bytes, max_chunk: usize) -> Vec<Frame> {
    if Strategy::select(payload.len(), max_chunk) == Strategy::Inline {
        return Vec::new();
    }
    let mut frames = Vec::with_capacity(chunk_count(payload.len(), max_chunk) + 2);
    frames.push(Frame::Start {
        total_length: payload.len() as u32,
    });
    frames.extend(chunk_frames(payload, max_chunk));
    frames.push(Frame::End);
    frames
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("empty write")]
    Empty,

    #[error("unknown opcode: 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("frame 0x{opcode:02x} truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        opcode: u8,
        expected: usize,
        actual: usize,
    },

    #[error("frame 0x{opcode:02x} has {extra} trailing bytes")]
    TrailingBytes { opcode: u8, extra: usize },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
