use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{IfitError, ProtocolViolation, Result};

/// Frame prefix emitted on every request
pub const REQUEST_SIGNATURE: [u8; 3] = [0x02, 0x04, 0x02];

/// Frame prefix some equipment uses on responses
///
/// Never emitted by this crate; accepted on decode alongside
/// [`REQUEST_SIGNATURE`]. Whether the leading `0x01` carries meaning is
/// unknown.
pub const RESPONSE_SIGNATURE: [u8; 3] = [0x01, 0x04, 0x02];

/// Status byte value signalling success in a response payload
pub const RESPONSE_OK: u8 = 0x02;

/// Maximum payload an envelope can carry
///
/// The length byte stores `payload + 4`, capping the payload at 251 bytes.
pub const MAX_PAYLOAD: usize = 251;

/// Bytes the envelope adds around its payload: signature, two length
/// fields, equipment, command, checksum
pub const ENVELOPE_OVERHEAD: usize = 8;

const HEADER_LEN: usize = 7;

/// Equipment class addressed by an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Equipment {
    /// Generic addressing, used before the equipment class is known
    General,
    /// Treadmill
    Treadmill,
    /// Device-type echo seen in some response streams; parse-only
    TypeEcho,
    /// Equipment byte outside the mapped range
    Unknown(u8),
}

impl Equipment {
    /// Decode an equipment byte, preserving unmapped values
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0x02 => Self::General,
            0x04 => Self::Treadmill,
            0x07 => Self::TypeEcho,
            other => Self::Unknown(other),
        }
    }

    /// Wire value of this equipment class
    #[must_use]
    pub const fn raw(self) -> u8 {
        match self {
            Self::General => 0x02,
            Self::Treadmill => 0x04,
            Self::TypeEcho => 0x07,
            Self::Unknown(other) => other,
        }
    }
}

/// Operation code carried in byte 6 of every envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Write characteristic values and read others in one exchange
    WriteAndRead,
    /// Request sensor calibration
    Calibrate,
    /// Query supported capability IDs
    SupportedCapabilities,
    /// Query the supported characteristic bitmap
    EquipmentInformation,
    /// Query the numeric model reference
    EquipmentReference,
    /// Query the firmware version string
    EquipmentFirmware,
    /// Query the supported command set
    SupportedCommands,
    /// Submit the activation code to unlock control
    Enable,
    /// Query the serial number string
    EquipmentSerial,
}

impl Command {
    /// Decode a command byte
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x02 => Some(Self::WriteAndRead),
            0x06 => Some(Self::Calibrate),
            0x80 => Some(Self::SupportedCapabilities),
            0x81 => Some(Self::EquipmentInformation),
            0x82 => Some(Self::EquipmentReference),
            0x84 => Some(Self::EquipmentFirmware),
            0x88 => Some(Self::SupportedCommands),
            0x90 => Some(Self::Enable),
            0x95 => Some(Self::EquipmentSerial),
            _ => None,
        }
    }

    /// Wire value of this command
    #[must_use]
    pub const fn raw(self) -> u8 {
        match self {
            Self::WriteAndRead => 0x02,
            Self::Calibrate => 0x06,
            Self::SupportedCapabilities => 0x80,
            Self::EquipmentInformation => 0x81,
            Self::EquipmentReference => 0x82,
            Self::EquipmentFirmware => 0x84,
            Self::SupportedCommands => 0x88,
            Self::Enable => 0x90,
            Self::EquipmentSerial => 0x95,
        }
    }
}

/// Logical view of one command frame
///
/// Wire layout (request direction):
///
/// ```text
/// 02 04 02  len  eq  len  cmd  <payload bytes>  checksum
/// ```
///
/// `len` appears twice and equals `payload + 4`. The checksum is the low
/// byte of the sum of every byte from `eq` through the last payload byte,
/// the three-byte signature excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Equipment class this frame addresses
    pub equipment: Equipment,
    /// Operation code
    pub command: Command,
    /// Inner payload; in responses, byte 0 is the status byte
    pub payload: Bytes,
}

impl Envelope {
    /// Create an envelope
    pub fn new(equipment: Equipment, command: Command, payload: impl Into<Bytes>) -> Self {
        Self {
            equipment,
            command,
            payload: payload.into(),
        }
    }

    /// Total length of the encoded frame
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.payload.len() + ENVELOPE_OVERHEAD
    }

    /// Serialize the envelope, always under the request signature
    ///
    /// # Errors
    ///
    /// Returns [`IfitError::EnvelopeTooLong`] if the payload exceeds
    /// [`MAX_PAYLOAD`].
    pub fn encode(&self) -> Result<Bytes> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(IfitError::EnvelopeTooLong(self.encoded_len()));
        }
        let length = (self.payload.len() + 4) as u8;

        let mut checksum = u32::from(self.equipment.raw())
            + u32::from(length)
            + u32::from(self.command.raw());
        for byte in &self.payload {
            checksum += u32::from(*byte);
        }

        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_slice(&REQUEST_SIGNATURE);
        buf.put_u8(length);
        buf.put_u8(self.equipment.raw());
        buf.put_u8(length);
        buf.put_u8(self.command.raw());
        buf.put_slice(&self.payload);
        buf.put_u8(checksum as u8);
        Ok(buf.freeze())
    }

    /// Parse and validate a complete frame
    ///
    /// Accepts both the request and the response signature. Validation
    /// order: signature, length fields, checksum, command byte — so any
    /// corruption surfaces as a typed [`ProtocolViolation`] rather than a
    /// silently wrong envelope.
    ///
    /// # Errors
    ///
    /// Returns [`IfitError::Protocol`] describing the first violation found.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < ENVELOPE_OVERHEAD {
            return Err(ProtocolViolation::Truncated(raw.len()).into());
        }
        let signature = [raw[0], raw[1], raw[2]];
        if signature != REQUEST_SIGNATURE && signature != RESPONSE_SIGNATURE {
            return Err(ProtocolViolation::BadSignature(signature).into());
        }
        let length = raw[3];
        if length != raw[5] {
            return Err(ProtocolViolation::LengthMismatch {
                first: length,
                second: raw[5],
            }
            .into());
        }
        if length < 4 || raw.len() != usize::from(length) + 4 {
            return Err(ProtocolViolation::Truncated(raw.len()).into());
        }

        let checksum: u32 = raw[4..raw.len() - 1].iter().map(|b| u32::from(*b)).sum();
        let expected = checksum as u8;
        let got = raw[raw.len() - 1];
        if expected != got {
            return Err(ProtocolViolation::BadChecksum { expected, got }.into());
        }

        let command =
            Command::from_raw(raw[6]).ok_or(ProtocolViolation::UnknownCommand(raw[6]))?;

        Ok(Self {
            equipment: Equipment::from_raw(raw[4]),
            command,
            payload: Bytes::copy_from_slice(&raw[HEADER_LEN..raw.len() - 1]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_set_kph_request() {
        // write_and_read carrying {Kph: 10.0}: write bitmap 01 01,
        // empty read bitmap 00, value E8 03
        let envelope = Envelope::new(
            Equipment::Treadmill,
            Command::WriteAndRead,
            vec![0x01, 0x01, 0x00, 0xE8, 0x03],
        );
        let encoded = envelope.encode().unwrap();
        assert_eq!(
            encoded.as_ref(),
            [0x02, 0x04, 0x02, 0x09, 0x04, 0x09, 0x02, 0x01, 0x01, 0x00, 0xE8, 0x03, 0xFC]
        );
    }

    #[test]
    fn test_round_trip() {
        let envelope = Envelope::new(
            Equipment::General,
            Command::EquipmentInformation,
            Bytes::new(),
        );
        let decoded = Envelope::decode(&envelope.encode().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_decode_firmware_response_frame() {
        // Captured EQUIPMENT_FIRMWARE response, response signature included
        let raw: Vec<u8> = vec![
            0x01, 0x04, 0x02, 0x1C, 0x04, 0x1C, 0x84, 0x02, 0x50, 0xA3, 0x00, 0x30, 0x2E, 0x31,
            0x2E, 0x30, 0x36, 0x31, 0x32, 0x32, 0x30, 0x31, 0x37, 0x2E, 0x30, 0x39, 0x30, 0x38,
            0x01, 0x2A, 0x03, 0x16,
        ];
        let envelope = Envelope::decode(&raw).unwrap();
        assert_eq!(envelope.equipment, Equipment::Treadmill);
        assert_eq!(envelope.command, Command::EquipmentFirmware);
        assert_eq!(envelope.payload.len(), 24);
        assert_eq!(envelope.payload[0], RESPONSE_OK);
    }

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let envelope = Envelope::new(
            Equipment::Treadmill,
            Command::WriteAndRead,
            vec![0x01, 0x01, 0x00, 0xE8, 0x03],
        );
        let mut raw = envelope.encode().unwrap().to_vec();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        assert!(matches!(
            Envelope::decode(&raw),
            Err(IfitError::Protocol(ProtocolViolation::BadChecksum { .. }))
        ));
    }

    #[test]
    fn test_decode_rejects_bad_signature() {
        let mut raw = Envelope::new(Equipment::General, Command::Enable, vec![0u8; 4])
            .encode()
            .unwrap()
            .to_vec();
        raw[0] = 0x03;
        assert!(matches!(
            Envelope::decode(&raw),
            Err(IfitError::Protocol(ProtocolViolation::BadSignature(_)))
        ));
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        let mut raw = Envelope::new(Equipment::General, Command::Enable, vec![0u8; 4])
            .encode()
            .unwrap()
            .to_vec();
        raw[5] = raw[5].wrapping_add(1);
        assert!(matches!(
            Envelope::decode(&raw),
            Err(IfitError::Protocol(ProtocolViolation::LengthMismatch { .. }))
        ));
    }

    #[test]
    fn test_decode_rejects_truncation() {
        let raw = Envelope::new(Equipment::General, Command::Enable, vec![0u8; 4])
            .encode()
            .unwrap();
        assert!(Envelope::decode(&raw[..raw.len() - 2]).is_err());
        assert!(Envelope::decode(&[0x02, 0x04, 0x02]).is_err());
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let envelope = Envelope::new(
            Equipment::General,
            Command::WriteAndRead,
            vec![0u8; MAX_PAYLOAD + 1],
        );
        assert!(matches!(
            envelope.encode(),
            Err(IfitError::EnvelopeTooLong(_))
        ));
    }

    #[test]
    fn test_equipment_echo_recognized() {
        let mut raw = Envelope::new(Equipment::General, Command::WriteAndRead, vec![0x02])
            .encode()
            .unwrap()
            .to_vec();
        // Patch the equipment byte to the device-type echo and fix the sum
        raw[4] = 0x07;
        let last = raw.len() - 1;
        raw[last] = raw[last].wrapping_add(0x05);
        let envelope = Envelope::decode(&raw).unwrap();
        assert_eq!(envelope.equipment, Equipment::TypeEcho);
    }
}
