#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # ifit-ble
//!
//! A Rust library for controlling iFit fitness equipment (treadmills,
//! ellipticals, bikes) over Bluetooth Low Energy.
//!
//! iFit equipment exposes a proprietary GATT service with two
//! characteristics: commands are written to the RX characteristic as a
//! sequence of at most 20-byte chunks, and responses arrive as notification
//! chunks on the TX characteristic. Inside that chunk framing sits a
//! checksummed command envelope, and inside the envelope sits a
//! bitmap-directed payload of typed characteristic values. This crate
//! implements the full stack:
//!
//! - **Catalog**: the static table of protocol characteristics (speed,
//!   incline, pulse, calories, ...) with their converters ([`catalog`])
//! - **Converters**: typed encode/decode of characteristic values
//!   ([`convert`])
//! - **Envelope codec**: the checksummed command frame ([`envelope`])
//! - **Chunker**: 20-byte GATT chunking and reassembly ([`chunker`])
//! - **Session**: request/response correlation, activation and the
//!   high-level read/write operations ([`session`])
//!
//! The protocol was reverse-engineered from BLE traffic between iFit
//! consoles and their companion app; see the characteristic and offset
//! tables in [`catalog`] and [`session`] for what has been mapped so far.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ifit_ble::{ble, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Discover and connect to the first iFit device in range
//!     let session = ble::connect_first(SessionConfig::default()).await?;
//!
//!     // Load equipment metadata (supported characteristics, firmware, ...)
//!     let info = session.initialize().await?;
//!     println!("firmware: {:?}", info.firmware_version);
//!
//!     // Unlock control with the 36-byte activation code, then set speed
//!     let code = [0u8; 36]; // from your equipment
//!     session.enable(&code).await?;
//!     session.set_kph(8.0).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Monitoring without activation
//!
//! Reading current values does not require an activation code: a connected
//! session may poll read-only characteristics (speed, incline, pulse, mode)
//! immediately. Only writes require [`Session::enable`](session::Session::enable).

/// Bluetooth Low Energy transport built on btleplug
pub mod ble;
/// Static characteristic and capability catalog
pub mod catalog;
/// Chunking of envelopes into GATT-sized writes and reassembly of responses
pub mod chunker;
/// Typed value converters and bitmap coding
pub mod convert;
/// Command envelope codec
pub mod envelope;
/// Error types and handling
pub mod error;
/// Request/response session engine and high-level operations
pub mod session;
/// Transport boundary trait
pub mod transport;
/// Protocol value types and session configuration
pub mod types;

// Re-export the main types for convenient usage
pub use catalog::{Capability, Characteristic};
pub use envelope::{Command, Envelope, Equipment};
pub use error::{IfitError, Result};
pub use session::Session;
pub use transport::Transport;
pub use types::{
    EquipmentInformation, Mode, PulseSource, PulseValue, SessionConfig, SessionState, Value,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// iFit GATT service UUID
///
/// Proprietary service exposed by all iFit-branded consoles. The same UUID
/// is used across treadmills, bikes and ellipticals.
pub const IFIT_SERVICE_UUID: &str = "00001533-1412-efde-1523-785feabcd123";

/// iFit RX characteristic UUID (client writes to equipment)
///
/// All outbound command chunks are written here. Write-without-response is
/// accepted by the equipment; write-with-response gives stronger ordering.
pub const IFIT_RX_CHAR_UUID: &str = "00001535-1412-efde-1523-785feabcd123";

/// iFit TX characteristic UUID (equipment notifies the client)
///
/// Response chunks arrive as notifications on this characteristic. The
/// client must subscribe before issuing any request.
pub const IFIT_TX_CHAR_UUID: &str = "00001534-1412-efde-1523-785feabcd123";

/// Marker byte that closes iFit manufacturer data in BLE advertisements
///
/// iFit consoles advertise manufacturer data ending with `0xDD` followed by
/// the two-byte little-endian pairing code shown on the console display.
/// Used to identify iFit devices during scanning.
pub const IFIT_ADVERTISEMENT_MARKER: u8 = 0xDD;
