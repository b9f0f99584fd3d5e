use async_trait::async_trait;

use crate::error::Result;

/// Boundary to the BLE collaborator that moves chunks
///
/// The session owns a `Transport` plus the notification channel produced by
/// the same collaborator. Implementations write to the equipment's RX
/// characteristic and must complete each write before returning, so the
/// session's one-chunk-at-a-time discipline holds on the air. The crate
/// ships a btleplug implementation in [`crate::ble`]; tests substitute
/// their own.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one chunk to the RX characteristic and await completion
    ///
    /// # Errors
    ///
    /// Returns a transport-level error if the write fails.
    async fn write_chunk(&self, chunk: &[u8]) -> Result<()>;

    /// Whether the underlying connection is still up
    async fn is_connected(&self) -> bool;

    /// Tear down the connection
    ///
    /// # Errors
    ///
    /// Returns a transport-level error if the disconnect fails.
    async fn disconnect(&self) -> Result<()>;
}
