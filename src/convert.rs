use std::collections::BTreeSet;

use bytes::{BufMut, BytesMut};

use crate::error::{IfitError, Result};
use crate::types::{PulseSource, PulseValue, Value};

/// Scale factor of the calorie characteristics
///
/// The firmware stores calories as `value * 100000000 / 1024`. The ratio
/// must be kept in this exact form; a rounded decimal constant would not be
/// bit-identical to the device's arithmetic.
pub const CALORIE_SCALE: f64 = 100_000_000.0 / 1024.0;

/// Wire codec for one characteristic value
///
/// Each catalog entry carries one of these. All multi-byte integers are
/// little-endian. Converters are pure: [`encode`](Self::encode) and
/// [`decode`](Self::decode) never touch the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Converter {
    /// One-byte unsigned integer
    UInt8,
    /// Two-byte unsigned integer
    UInt16,
    /// Four-byte unsigned integer
    UInt32,
    /// Hundredths in a two-byte unsigned integer (speed, incline)
    Double,
    /// Four-byte calorie total in the firmware's odd scale
    Scaled32,
    /// One byte, `0x00` or `0x01`
    Boolean,
    /// Four-byte pulse composite
    Pulse,
}

impl Converter {
    /// Number of bytes this converter reads and writes
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::UInt8 | Self::Boolean => 1,
            Self::UInt16 | Self::Double => 2,
            Self::UInt32 | Self::Scaled32 | Self::Pulse => 4,
        }
    }

    /// Converter name used in error reports
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::UInt8 => "UInt8",
            Self::UInt16 => "UInt16",
            Self::UInt32 => "UInt32",
            Self::Double => "Double",
            Self::Scaled32 => "Scaled32",
            Self::Boolean => "Boolean",
            Self::Pulse => "Pulse",
        }
    }

    /// Append the wire encoding of `value` to `buf`
    ///
    /// # Errors
    ///
    /// Returns [`IfitError::ValueOutOfRange`] if `value` is of the wrong
    /// variant for this converter or falls outside its encodable domain.
    pub fn encode(self, value: &Value, buf: &mut BytesMut) -> Result<()> {
        match self {
            Self::UInt8 => {
                let v = self.integer_input(value)?;
                if v > u64::from(u8::MAX) {
                    return Err(self.out_of_range(value));
                }
                buf.put_u8(v as u8);
            }
            Self::UInt16 => {
                let v = self.integer_input(value)?;
                if v > u64::from(u16::MAX) {
                    return Err(self.out_of_range(value));
                }
                buf.put_u16_le(v as u16);
            }
            Self::UInt32 => {
                let v = self.integer_input(value)?;
                if v > u64::from(u32::MAX) {
                    return Err(self.out_of_range(value));
                }
                buf.put_u32_le(v as u32);
            }
            Self::Double => {
                let v = self.numeric_input(value)?;
                let scaled = (v * 100.0).round();
                if !v.is_finite() || !(0.0..=f64::from(u16::MAX)).contains(&scaled) {
                    return Err(self.out_of_range(value));
                }
                buf.put_u16_le(scaled as u16);
            }
            Self::Scaled32 => {
                let v = self.numeric_input(value)?;
                let scaled = (v * CALORIE_SCALE).round();
                if !v.is_finite() || !(0.0..=f64::from(u32::MAX)).contains(&scaled) {
                    return Err(self.out_of_range(value));
                }
                buf.put_u32_le(scaled as u32);
            }
            Self::Boolean => match value {
                Value::Boolean(v) => buf.put_u8(u8::from(*v)),
                _ => return Err(self.out_of_range(value)),
            },
            Self::Pulse => match value {
                Value::Pulse(pulse) => {
                    buf.put_u8(pulse.current_bpm);
                    buf.put_u8(pulse.average_bpm);
                    buf.put_u8(pulse.sample_count);
                    buf.put_u8(pulse.source.raw());
                }
                _ => return Err(self.out_of_range(value)),
            },
        }
        Ok(())
    }

    /// Decode one value from the front of `buf`
    ///
    /// Returns the value together with the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns [`IfitError::MalformedValue`] if `buf` is shorter than
    /// [`width`](Self::width) or carries bytes outside the decodable domain
    /// (for example a [`Converter::Boolean`] byte other than 0 or 1).
    pub fn decode(self, buf: &[u8]) -> Result<(Value, usize)> {
        let width = self.width();
        if buf.len() < width {
            return Err(IfitError::MalformedValue {
                name: self.name(),
                raw: buf.to_vec(),
            });
        }
        let value = match self {
            Self::UInt8 => Value::UInt8(buf[0]),
            Self::UInt16 => Value::UInt16(u16::from_le_bytes([buf[0], buf[1]])),
            Self::UInt32 => Value::UInt32(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
            Self::Double => Value::Double(f64::from(u16::from_le_bytes([buf[0], buf[1]])) / 100.0),
            Self::Scaled32 => Value::Calories(
                f64::from(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])) / CALORIE_SCALE,
            ),
            Self::Boolean => match buf[0] {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                other => {
                    return Err(IfitError::MalformedValue {
                        name: self.name(),
                        raw: vec![other],
                    })
                }
            },
            Self::Pulse => Value::Pulse(PulseValue {
                current_bpm: buf[0],
                average_bpm: buf[1],
                sample_count: buf[2],
                source: PulseSource::from_raw(buf[3]),
            }),
        };
        Ok((value, width))
    }

    /// Integer input for the integer converters; rejects other variants
    fn integer_input(self, value: &Value) -> Result<u64> {
        value
            .as_u32()
            .map(u64::from)
            .ok_or_else(|| self.out_of_range(value))
    }

    /// Numeric input for the scaled converters; rejects other variants
    fn numeric_input(self, value: &Value) -> Result<f64> {
        value.as_f64().ok_or_else(|| self.out_of_range(value))
    }

    fn out_of_range(self, value: &Value) -> IfitError {
        IfitError::ValueOutOfRange {
            name: self.name(),
            value: value.to_string(),
        }
    }
}

/// Encode a set of characteristic IDs as a length-prefixed bitmap
///
/// Layout: `LL b0 b1 .. b(LL-1)` where `LL` is the minimum byte count that
/// covers the highest ID present; bit `id % 8` of byte `id / 8` is set for
/// each member. The empty set renders as the single byte `0x00`.
#[must_use]
pub fn encode_bitmap<I: IntoIterator<Item = u8>>(ids: I) -> Vec<u8> {
    let mut bitmap: Vec<u8> = Vec::new();
    for id in ids {
        let index = usize::from(id / 8);
        if index >= bitmap.len() {
            bitmap.resize(index + 1, 0);
        }
        bitmap[index] |= 1 << (id % 8);
    }
    let mut out = Vec::with_capacity(1 + bitmap.len());
    out.push(bitmap.len() as u8);
    out.extend_from_slice(&bitmap);
    out
}

/// Decode a length-prefixed bitmap from the front of `buf`
///
/// Returns the ID set and the number of bytes consumed (`1 + LL`).
///
/// # Errors
///
/// Returns [`IfitError::MalformedValue`] if `buf` is shorter than the
/// declared bitmap or the declared length would map bits past ID 255.
pub fn decode_bitmap(buf: &[u8]) -> Result<(BTreeSet<u8>, usize)> {
    let malformed = || IfitError::MalformedValue {
        name: "bitmap",
        raw: buf.to_vec(),
    };
    let ll = usize::from(*buf.first().ok_or_else(malformed)?);
    if ll > 32 || buf.len() < 1 + ll {
        return Err(malformed());
    }
    let mut ids = BTreeSet::new();
    for (index, byte) in buf[1..=ll].iter().enumerate() {
        for bit in 0..8u8 {
            if byte & (1 << bit) != 0 {
                ids.insert((index * 8) as u8 + bit);
            }
        }
    }
    Ok((ids, 1 + ll))
}
