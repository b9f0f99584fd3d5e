use std::collections::HashMap;
use std::sync::LazyLock;

use crate::convert::Converter;

/// Static definition of one protocol characteristic
///
/// Protocol characteristics are the named, typed values the equipment
/// exposes inside `WRITE_AND_READ` payloads; they are unrelated to GATT
/// characteristics. The table is fixed at compile time and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Characteristic {
    /// Protocol ID, the bit position used in request bitmaps
    pub id: u8,
    /// Name from the protocol document
    pub name: &'static str,
    /// Whether the equipment accepts writes to this characteristic
    pub writable: bool,
    /// Wire codec for this characteristic's value
    pub converter: Converter,
}

/// A high-level capability advertised via `SUPPORTED_CAPABILITIES`
///
/// Capabilities map a feature ID reported by the equipment to the
/// characteristic that carries the feature's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    /// Capability ID as reported by the equipment
    pub id: u8,
    /// Capability name from the protocol document
    pub name: &'static str,
    /// ID of the characteristic backing this capability
    pub characteristic_id: u8,
}

/// The characteristic table, ascending by ID
///
/// Mapped from observed traffic on production consoles. The `X1`..`X7`
/// entries are writable characteristics whose purpose has not been
/// identified yet; names are inherited from the protocol document.
pub const CHARACTERISTICS: &[Characteristic] = &[
    Characteristic { id: 0, name: "Kph", writable: true, converter: Converter::Double },
    Characteristic { id: 1, name: "Incline", writable: true, converter: Converter::Double },
    Characteristic { id: 4, name: "CurrentDistance", writable: false, converter: Converter::UInt32 },
    Characteristic { id: 6, name: "Distance", writable: false, converter: Converter::UInt32 },
    Characteristic { id: 9, name: "Volume", writable: true, converter: Converter::UInt8 },
    Characteristic { id: 10, name: "Pulse", writable: false, converter: Converter::Pulse },
    Characteristic { id: 11, name: "UpTime", writable: false, converter: Converter::UInt32 },
    Characteristic { id: 12, name: "Mode", writable: true, converter: Converter::UInt8 },
    Characteristic { id: 13, name: "Calories", writable: false, converter: Converter::Scaled32 },
    Characteristic { id: 16, name: "CurrentKph", writable: false, converter: Converter::Double },
    Characteristic { id: 17, name: "CurrentIncline", writable: false, converter: Converter::Double },
    Characteristic { id: 20, name: "CurrentTime", writable: false, converter: Converter::UInt32 },
    Characteristic { id: 21, name: "CurrentCalories", writable: false, converter: Converter::Scaled32 },
    Characteristic { id: 27, name: "MaxIncline", writable: false, converter: Converter::Double },
    Characteristic { id: 28, name: "MinIncline", writable: false, converter: Converter::Double },
    Characteristic { id: 30, name: "MaxKph", writable: false, converter: Converter::Double },
    Characteristic { id: 31, name: "MinKph", writable: false, converter: Converter::Double },
    Characteristic { id: 34, name: "X1", writable: true, converter: Converter::UInt16 },
    Characteristic { id: 35, name: "X2", writable: true, converter: Converter::UInt16 },
    Characteristic { id: 36, name: "Metric", writable: true, converter: Converter::Boolean },
    Characteristic { id: 43, name: "X3", writable: true, converter: Converter::Double },
    Characteristic { id: 46, name: "X4", writable: true, converter: Converter::UInt16 },
    Characteristic { id: 49, name: "MaxPulse", writable: false, converter: Converter::UInt8 },
    Characteristic { id: 52, name: "AverageIncline", writable: false, converter: Converter::Double },
    Characteristic { id: 69, name: "X5", writable: true, converter: Converter::UInt32 },
    Characteristic { id: 70, name: "TotalTime", writable: false, converter: Converter::UInt32 },
    Characteristic { id: 71, name: "X6", writable: true, converter: Converter::UInt16 },
    Characteristic { id: 100, name: "X7", writable: true, converter: Converter::UInt8 },
    Characteristic { id: 103, name: "PausedTime", writable: false, converter: Converter::UInt32 },
];

/// Capability table from the protocol document
pub const CAPABILITIES: &[Capability] = &[
    Capability { id: 65, name: "Speed", characteristic_id: 0 },
    Capability { id: 66, name: "Incline", characteristic_id: 1 },
    Capability { id: 70, name: "Pulse", characteristic_id: 10 },
    Capability { id: 71, name: "Key", characteristic_id: 7 },
    Capability { id: 77, name: "Distance", characteristic_id: 6 },
    Capability { id: 78, name: "Time", characteristic_id: 11 },
];

static BY_ID: LazyLock<HashMap<u8, &'static Characteristic>> =
    LazyLock::new(|| CHARACTERISTICS.iter().map(|c| (c.id, c)).collect());

static BY_NAME: LazyLock<HashMap<&'static str, &'static Characteristic>> =
    LazyLock::new(|| CHARACTERISTICS.iter().map(|c| (c.name, c)).collect());

/// Look up a characteristic by protocol ID
#[must_use]
pub fn by_id(id: u8) -> Option<&'static Characteristic> {
    BY_ID.get(&id).copied()
}

/// Look up a characteristic by its protocol-document name
#[must_use]
pub fn by_name(name: &str) -> Option<&'static Characteristic> {
    BY_NAME.get(name).copied()
}

/// Whether the characteristic with `id` exists and accepts writes
#[must_use]
pub fn writable_by_id(id: u8) -> bool {
    by_id(id).is_some_and(|c| c.writable)
}

/// All characteristics in ascending ID order
pub fn iter_sorted_by_id() -> impl Iterator<Item = &'static Characteristic> {
    CHARACTERISTICS.iter()
}

/// Look up a capability by its reported ID
#[must_use]
pub fn capability_by_id(id: u8) -> Option<&'static Capability> {
    CAPABILITIES.iter().find(|c| c.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_unique_and_sorted() {
        let mut seen = std::collections::BTreeSet::new();
        let mut previous = None;
        for characteristic in CHARACTERISTICS {
            assert!(seen.insert(characteristic.id), "duplicate id {}", characteristic.id);
            if let Some(previous) = previous {
                assert!(characteristic.id > previous, "table not ascending at {}", characteristic.id);
            }
            previous = Some(characteristic.id);
        }
    }

    #[test]
    fn test_lookup_by_id_and_name() {
        let kph = by_id(0).unwrap();
        assert_eq!(kph.name, "Kph");
        assert_eq!(kph.converter, Converter::Double);
        assert!(kph.writable);

        let pulse = by_name("Pulse").unwrap();
        assert_eq!(pulse.id, 10);
        assert_eq!(pulse.converter, Converter::Pulse);
        assert!(!pulse.writable);

        assert!(by_id(2).is_none());
        assert!(by_name("NoSuchThing").is_none());
    }

    #[test]
    fn test_writable_by_id() {
        assert!(writable_by_id(0));
        assert!(writable_by_id(36));
        assert!(!writable_by_id(16));
        assert!(!writable_by_id(250));
    }

    #[test]
    fn test_iter_sorted() {
        let ids: Vec<u8> = iter_sorted_by_id().map(|c| c.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        assert_eq!(ids.first(), Some(&0));
        assert_eq!(ids.last(), Some(&103));
    }

    #[test]
    fn test_capabilities_map_to_characteristics() {
        let speed = capability_by_id(65).unwrap();
        assert_eq!(speed.characteristic_id, 0);
        assert_eq!(by_id(speed.characteristic_id).unwrap().name, "Kph");

        // Key (7) points at a characteristic that is not in the table;
        // observed on consoles but never mapped
        let key = capability_by_id(71).unwrap();
        assert!(by_id(key.characteristic_id).is_none());
    }
}
