//! Status snapshots pushed by a receiving peer over its notify endpoint.

use serde::{Deserialize, Serialize};

/// Receiver-side view of the upload pipeline. Serialized as camelCase JSON.
///
/// Every field is optional on the wire so older or partial snapshots still
/// parse.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeerStatus {
    pub ok: bool,
    pub last_error: Option<String>,
    pub last_saved_at: Option<String>,
    pub last_bytes: u64,
    pub last_payload_hash: Option<String>,
    pub receiving: bool,
    pub expected_bytes: Option<u64>,
    pub received_bytes: u64,
    pub max_bytes: u64,
    pub timestamp: Option<String>,
}

impl PeerStatus {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            ok: true,
            max_bytes,
            ..Self::default()
        }
    }

    pub fn to_json_bytes(&self) -> Vec<u8> {
        // A struct of plain fields always serializes.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Stamp the snapshot with the current time.
    pub fn touch(&mut self) {
        self.timestamp = Some(chrono::Utc::now().to_rfc3339());
    }

    pub fn start_reception(&mut self, expected: u64) {
        self.receiving = true;
        self.expected_bytes = Some(expected);
        self.received_bytes = 0;
        self.last_error = None;
        self.ok = true;
        self.touch();
    }

    pub fn progress_reception(&mut self, received: u64) {
        self.receiving = true;
        self.received_bytes = received;
        self.touch();
    }

    pub fn cancel_reception(&mut self, message: &str) {
        self.receiving = false;
        self.expected_bytes = None;
        self.received_bytes = 0;
        self.ok = false;
        self.last_error = Some(message.to_string());
        self.touch();
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.receiving = false;
        self.ok = false;
        self.last_error = Some(message.into());
        self.touch();
    }

    pub fn mark_saved(&mut self, saved_at: &str, bytes: u64, hash: &str) {
        self.ok = true;
        self.last_error = None;
        self.last_saved_at = Some(saved_at.to_string());
        self.last_bytes = bytes;
        self.last_payload_hash = Some(hash.to_string());
        self.receiving = false;
        self.expected_bytes = None;
        self.received_bytes = bytes;
        self.touch();
    }

    /// One-line human summary used by the CLI.
    pub fn summary(&self) -> String {
        if let Some(err) = &self.last_error {
            return format!("error: {err}");
        }
        match (self.receiving, self.expected_bytes) {
            (true, Some(expected)) => {
                format!("receiving {}/{} bytes", self.received_bytes, expected)
            }
            _ => match &self.last_payload_hash {
                Some(hash) => format!(
                    "idle, last grid {} bytes ({})",
                    self.last_bytes,
                    &hash[..hash.len().min(12)]
                ),
                None => "idle".to_string(),
            },
        }
    }
}
