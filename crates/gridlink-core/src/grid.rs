//! Tile grid payloads and the record a receiving peer persists.
//!
//! A grid is a list of tile sets, each tile set a list of `[x, y]` points.
//! The sender only checks that the payload is well-formed JSON; the grid
//! shape is enforced by the receiver.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Grid sent when the caller does not supply one.
pub const DEMO_GRID: &str = "[[[0,0],[1,0],[2,0]],[[3,1],[3,2]]]";

// ── Payload ───────────────────────────────────────────────────────────────────

/// Serialized grid bytes, validated as well-formed JSON.
///
/// Immutable once built. The length always fits the u32 field of a Start
/// frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(Bytes);

impl Payload {
    pub fn from_json_bytes(bytes: impl Into<Bytes>) -> Result<Self, PayloadError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(PayloadError::Empty);
        }
        if u32::try_from(bytes.len()).is_err() {
            return Err(PayloadError::TooLarge(bytes.len()));
        }
        serde_json::from_slice::<serde::de::IgnoredAny>(&bytes)
            .map_err(|e| PayloadError::Malformed(e.to_string()))?;
        Ok(Self(bytes))
    }

    pub fn from_json_str(text: &str) -> Result<Self, PayloadError> {
        Self::from_json_bytes(Bytes::copy_from_slice(text.as_bytes()))
    }

    /// The demonstration grid.
    pub fn demo() -> Self {
        Self(Bytes::from_static(DEMO_GRID.as_bytes()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("payload is empty")]
    Empty,

    #[error("payload is not well-formed JSON: {0}")]
    Malformed(String),

    #[error("payload of {0} bytes does not fit a 32-bit length field")]
    TooLarge(usize),
}

// ── Grid shape ────────────────────────────────────────────────────────────────

/// Parse and shape-check a grid. Returns the parsed JSON value so the
/// caller can persist it without re-serializing numbers.
pub fn parse_grid(bytes: &[u8]) -> Result<Value, GridError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| GridError::InvalidJson(e.to_string()))?;
    validate_grid(&value)?;
    Ok(value)
}

/// Check that `value` is an array of tile sets of finite `[x, y]` pairs.
pub fn validate_grid(value: &Value) -> Result<(), GridError> {
    let tile_sets = value.as_array().ok_or(GridError::NotAnArray)?;
    for (set_index, tile_set) in tile_sets.iter().enumerate() {
        let points = tile_set
            .as_array()
            .ok_or(GridError::BadTileSet(set_index))?;
        for (point_index, point) in points.iter().enumerate() {
            let ok = point.as_array().is_some_and(|p| {
                p.len() == 2 && p.iter().all(|n| n.as_f64().is_some_and(f64::is_finite))
            });
            if !ok {
                return Err(GridError::BadPoint {
                    set: set_index,
                    point: point_index,
                });
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("grid must be an array of tile sets")]
    NotAnArray,

    #[error("tile set {0} is not an array")]
    BadTileSet(usize),

    #[error("tile set {set}, point {point} is not a numeric [x, y] pair")]
    BadPoint { set: usize, point: usize },
}

// ── Record ────────────────────────────────────────────────────────────────────

/// The status file written by the receiving side after each upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRecord {
    pub received_at: String,
    pub grid: Value,
    pub hash: String,
    pub bytes: u64,
}

impl GridRecord {
    /// Build a record for a grid received now. `raw_len` is the size of the
    /// payload as it crossed the link.
    pub fn new(grid: Value, raw_len: usize) -> Self {
        Self {
            received_at: chrono::Utc::now().to_rfc3339(),
            hash: grid_hash(&grid),
            grid,
            bytes: raw_len as u64,
        }
    }

    pub fn stats(&self) -> GridStats {
        GridStats::of(&self.grid)
    }
}

/// Hex BLAKE3 digest of the canonical (compact) grid JSON.
pub fn grid_hash(grid: &Value) -> String {
    hex::encode(blake3::hash(grid.to_string().as_bytes()).as_bytes())
}

/// Tile-set and point counts of a grid value. Non-arrays count as empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridStats {
    pub tile_sets: usize,
    pub points: usize,
}

impl GridStats {
    pub fn of(grid: &Value) -> Self {
        let Some(sets) = grid.as_array() else {
            return Self::default();
        };
        Self {
            tile_sets: sets.len(),
            points: sets
                .iter()
                .map(|s| s.as_array().map_or(0, Vec::len))
                .sum(),
        }
    }
}

impl std::fmt::Display for GridStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} tile set(s), {} points total",
            self.tile_sets, self.points
        )
    }
}
