use std::time::Duration;

use thiserror::Error;

/// Envelope-level protocol violations detected while decoding a frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// The three-byte frame prefix was neither `02 04 02` nor `01 04 02`
    #[error("bad frame signature: {0:02X?}")]
    BadSignature([u8; 3]),

    /// The checksum byte does not match the sum of the frame contents
    #[error("checksum mismatch: expected {expected:02X}, got {got:02X}")]
    BadChecksum {
        /// Checksum computed over the received frame
        expected: u8,
        /// Checksum byte carried by the frame
        got: u8,
    },

    /// The two length fields of the envelope disagree
    #[error("length fields disagree: {first} vs {second}")]
    LengthMismatch {
        /// Length field at byte 3
        first: u8,
        /// Length field at byte 5
        second: u8,
    },

    /// The frame is shorter than the minimum or disagrees with its
    /// declared length
    #[error("frame truncated: {0} bytes")]
    Truncated(usize),

    /// The command byte is not part of the protocol's command set
    #[error("unknown command byte {0:#04X}")]
    UnknownCommand(u8),

    /// A response echoed a different command than the outstanding request
    #[error("unexpected command: got {got:#04X}, expected {expected:#04X}")]
    UnexpectedCommand {
        /// Command byte the response carried
        got: u8,
        /// Command byte of the outstanding request
        expected: u8,
    },

    /// The response status byte was not `RESPONSE_OK`
    #[error("response status not OK: {0:#04X}")]
    ResponseNotOk(u8),
}

/// Chunk-level framing violations detected during reassembly
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingViolation {
    /// A payload chunk arrived while no reassembly was in progress
    #[error("unexpected chunk with index {index:#04X} outside reassembly")]
    UnexpectedChunk {
        /// Index byte of the offending chunk
        index: u8,
    },

    /// A chunk arrived out of sequence
    #[error("chunk order violation: got index {got:#04X}, expected {expected:#04X}")]
    OrderViolation {
        /// Index byte of the offending chunk
        got: u8,
        /// Index byte the reassembler expected next
        expected: u8,
    },

    /// Chunk data would overrun the announced envelope length
    #[error("chunk data overruns envelope: {received} bytes of {expected}")]
    Overrun {
        /// Bytes accumulated including the offending chunk
        received: usize,
        /// Envelope length announced by the header chunk
        expected: usize,
    },

    /// The final chunk arrived before the envelope was complete
    #[error("envelope incomplete at EOF: {received} bytes of {expected}")]
    Underrun {
        /// Bytes accumulated when the EOF chunk arrived
        received: usize,
        /// Envelope length announced by the header chunk
        expected: usize,
    },

    /// A chunk was too short to carry its declared framing fields
    #[error("chunk truncated: {0} bytes")]
    Truncated(usize),

    /// The header chunk declared an impossible envelope/chunk-count pair
    #[error("bad header chunk: {len} envelope bytes in {chunks} chunks")]
    BadHeader {
        /// Envelope length announced by the header chunk
        len: u8,
        /// Total chunk count announced by the header chunk
        chunks: u8,
    },
}

/// Errors that can occur when working with iFit equipment
#[derive(Error, Debug)]
pub enum IfitError {
    /// Bluetooth Low Energy related errors
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// Transport operation (connect/subscribe/write) failed
    #[error("transport error: {0}")]
    Transport(String),

    /// Connection dropped mid-session
    #[error("connection to equipment lost")]
    TransportLost,

    /// iFit device not found during scanning
    #[error("iFit device not found")]
    DeviceNotFound,

    /// Chunk-level framing violation
    #[error("framing error: {0}")]
    Framing(#[from] FramingViolation),

    /// Envelope-level protocol violation
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// The envelope is too long to frame into chunks
    #[error("envelope of {0} bytes exceeds the chunkable maximum")]
    EnvelopeTooLong(usize),

    /// Encountered a characteristic ID not in the catalog
    #[error("unknown characteristic {0}")]
    UnknownCharacteristic(u8),

    /// Attempted to write a read-only characteristic
    #[error("characteristic {0} is not writable")]
    NotWritable(u8),

    /// A converter rejected an input value
    #[error("value {value} out of range for {name}")]
    ValueOutOfRange {
        /// Converter or characteristic name
        name: &'static str,
        /// Rejected value, rendered for display
        value: String,
    },

    /// A converter rejected input bytes
    #[error("malformed {name} value: {raw:02X?}")]
    MalformedValue {
        /// Converter or characteristic name
        name: &'static str,
        /// Offending raw bytes
        raw: Vec<u8>,
    },

    /// The equipment rejected the activation code
    #[error("authentication failed: equipment rejected the activation code")]
    AuthenticationFailed,

    /// Invalid caller-supplied parameters
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Response or connect deadline exceeded
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// Configured deadline
        timeout: Duration,
    },

    /// Caller cancelled the request before completion
    #[error("request cancelled")]
    Cancelled,

    /// The session is not in a state that permits the operation
    #[error("session not ready: {reason}")]
    NotReady {
        /// Why the operation was refused
        reason: String,
    },
}

/// Result type for iFit operations
pub type Result<T> = std::result::Result<T, IfitError>;

impl IfitError {
    /// Check if this error indicates a connection issue
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Ble(_) | Self::Transport(_) | Self::TransportLost | Self::DeviceNotFound
        )
    }

    /// Check if this error is recoverable without reconnecting
    ///
    /// Recoverable errors leave the session ready for the next request;
    /// connection-level errors require a new session.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Protocol(_)
                | Self::Framing(_)
                | Self::EnvelopeTooLong(_)
                | Self::UnknownCharacteristic(_)
                | Self::NotWritable(_)
                | Self::ValueOutOfRange { .. }
                | Self::MalformedValue { .. }
                | Self::AuthenticationFailed
                | Self::Cancelled
                | Self::NotReady { .. }
                | Self::InvalidParameters(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let lost = IfitError::TransportLost;
        assert!(lost.is_connection_error());
        assert!(!lost.is_recoverable());

        let timeout = IfitError::Timeout {
            timeout: Duration::from_secs(5),
        };
        assert!(!timeout.is_connection_error());
        assert!(timeout.is_recoverable());

        let checksum = IfitError::Protocol(ProtocolViolation::BadChecksum {
            expected: 0xFC,
            got: 0x05,
        });
        assert!(!checksum.is_connection_error());
        assert!(checksum.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let error = IfitError::Framing(FramingViolation::OrderViolation {
            got: 0x02,
            expected: 0x01,
        });
        let rendered = format!("{error}");
        assert!(rendered.contains("chunk order violation"));
        assert!(rendered.contains("0x02"));

        let error = IfitError::NotWritable(16);
        assert_eq!(format!("{error}"), "characteristic 16 is not writable");
    }
}
