//! Device resolution: explicit address or a time-bounded name-prefix scan.

use std::time::Duration;

use crate::error::TransferError;
use crate::link::{Adapter, DiscoveredDevice};

pub struct DeviceResolver<'a> {
    adapter: &'a dyn Adapter,
    scan_timeout: Duration,
}

impl<'a> DeviceResolver<'a> {
    pub fn new(adapter: &'a dyn Adapter, scan_timeout: Duration) -> Self {
        Self {
            adapter,
            scan_timeout,
        }
    }

    /// Produce a connectable address.
    ///
    /// A non-empty `address` is returned as-is without scanning. Otherwise
    /// the first advertised device whose name starts with `name_prefix`
    /// wins. Exactly one scan is attempted.
    pub async fn resolve(
        &self,
        name_prefix: &str,
        address: Option<&str>,
    ) -> Result<String, TransferError> {
        if let Some(address) = address.filter(|a| !a.is_empty()) {
            tracing::debug!(address, "explicit address, skipping scan");
            return Ok(address.to_string());
        }

        tracing::info!(prefix = name_prefix, timeout = ?self.scan_timeout, "scanning");
        let mut adverts = self
            .adapter
            .scan()
            .await
            .map_err(TransferError::Connection)?;

        let found = tokio::time::timeout(self.scan_timeout, async {
            while let Some(device) = adverts.recv().await {
                if device.name_starts_with(name_prefix) {
                    return Some(device);
                }
                tracing::trace!(address = %device.address, name = ?device.name, "ignoring device");
            }
            None
        })
        .await
        .ok()
        .flatten();

        match found {
            Some(DiscoveredDevice { address, name }) => {
                tracing::info!(%address, name = ?name, "device found");
                Ok(address)
            }
            None => Err(TransferError::DeviceNotFound {
                prefix: name_prefix.to_string(),
                timeout: self.scan_timeout,
            }),
        }
    }
}
