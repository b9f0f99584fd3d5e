//! Property tests for the codec layers: envelope framing, chunking,
//! checksum soundness, converter round-trips and bitmap coding.

use ifit_ble::catalog::{self, Characteristic};
use ifit_ble::chunker::{chunk_frame, Reassembler, MAX_CHUNK, MAX_FRAME};
use ifit_ble::convert::{decode_bitmap, encode_bitmap, Converter};
use ifit_ble::envelope::{Command, Envelope, Equipment, ENVELOPE_OVERHEAD, MAX_PAYLOAD};
use ifit_ble::types::Value;
use proptest::prelude::*;

fn arb_equipment() -> impl Strategy<Value = Equipment> {
    prop_oneof![Just(Equipment::General), Just(Equipment::Treadmill)]
}

fn arb_command() -> impl Strategy<Value = Command> {
    proptest::sample::select(vec![
        Command::WriteAndRead,
        Command::Calibrate,
        Command::SupportedCapabilities,
        Command::EquipmentInformation,
        Command::EquipmentReference,
        Command::EquipmentFirmware,
        Command::SupportedCommands,
        Command::Enable,
        Command::EquipmentSerial,
    ])
}

/// A value on the encodable grid of the given converter
fn arb_value_for(converter: Converter) -> BoxedStrategy<Value> {
    match converter {
        Converter::UInt8 => any::<u8>().prop_map(Value::UInt8).boxed(),
        Converter::UInt16 => any::<u16>().prop_map(Value::UInt16).boxed(),
        Converter::UInt32 => any::<u32>().prop_map(Value::UInt32).boxed(),
        Converter::Double => (0u16..=u16::MAX)
            .prop_map(|hundredths| Value::Double(f64::from(hundredths) / 100.0))
            .boxed(),
        Converter::Scaled32 => (0u32..=u32::MAX)
            .prop_map(|raw| Value::Calories(f64::from(raw) / (100_000_000.0 / 1024.0)))
            .boxed(),
        Converter::Boolean => any::<bool>().prop_map(Value::Boolean).boxed(),
        Converter::Pulse => unreachable!("no writable pulse characteristic"),
    }
}

fn arb_writable() -> impl Strategy<Value = (&'static Characteristic, Value)> {
    let writables: Vec<&'static Characteristic> = catalog::iter_sorted_by_id()
        .filter(|characteristic| characteristic.writable)
        .collect();
    proptest::sample::select(writables).prop_flat_map(|characteristic| {
        arb_value_for(characteristic.converter)
            .prop_map(move |value| (characteristic, value))
    })
}

proptest! {
    /// Every envelope that fits the length field decodes back to itself.
    #[test]
    fn envelope_round_trip(
        equipment in arb_equipment(),
        command in arb_command(),
        payload in proptest::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD),
    ) {
        let envelope = Envelope::new(equipment, command, payload);
        let encoded = envelope.encode().unwrap();
        prop_assert_eq!(encoded.len(), envelope.encoded_len());
        let decoded = Envelope::decode(&encoded).unwrap();
        prop_assert_eq!(decoded, envelope);
    }

    /// Chunking never exceeds 20 bytes per GATT write and reassembly
    /// restores the exact frame.
    #[test]
    fn chunker_round_trip(
        frame in proptest::collection::vec(any::<u8>(), ENVELOPE_OVERHEAD..=MAX_FRAME),
    ) {
        let chunks = chunk_frame(&frame).unwrap();
        for chunk in &chunks {
            prop_assert!(chunk.len() <= MAX_CHUNK);
        }
        prop_assert_eq!(chunks[0][2] as usize, frame.len());
        prop_assert_eq!(chunks[0][3] as usize, chunks.len());

        let mut reassembler = Reassembler::new();
        let mut assembled = None;
        for chunk in &chunks {
            prop_assert!(assembled.is_none(), "frame completed before final chunk");
            assembled = reassembler.accept(chunk).unwrap();
        }
        let assembled = assembled.unwrap();
        prop_assert_eq!(assembled.as_ref(), frame.as_slice());
    }

    /// Flipping any single bit outside the three-byte signature makes the
    /// decoder fail; corruption is never silent.
    #[test]
    fn single_bit_corruption_is_detected(
        equipment in arb_equipment(),
        command in arb_command(),
        payload in proptest::collection::vec(any::<u8>(), 0..=64),
        flip in any::<proptest::sample::Index>(),
    ) {
        let raw = Envelope::new(equipment, command, payload).encode().unwrap();
        let mut corrupted = raw.to_vec();
        let flippable_bits = (corrupted.len() - 3) * 8;
        let bit = flip.index(flippable_bits);
        corrupted[3 + bit / 8] ^= 1 << (bit % 8);
        prop_assert!(Envelope::decode(&corrupted).is_err());
    }

    /// Writable characteristics encode and decode without loss across
    /// their whole domain.
    #[test]
    fn writable_converter_round_trip((characteristic, value) in arb_writable()) {
        let mut buf = bytes::BytesMut::new();
        characteristic.converter.encode(&value, &mut buf).unwrap();
        prop_assert_eq!(buf.len(), characteristic.converter.width());
        let (decoded, consumed) = characteristic.converter.decode(&buf).unwrap();
        prop_assert_eq!(consumed, characteristic.converter.width());
        match (value, decoded) {
            (Value::Double(sent), Value::Double(received)) => {
                prop_assert!((sent - received).abs() < 1e-9);
            }
            (sent, received) => prop_assert_eq!(sent, received),
        }
    }

    /// Bitmap coding is idempotent over arbitrary ID sets.
    #[test]
    fn bitmap_round_trip(ids in proptest::collection::btree_set(any::<u8>(), 0..=48)) {
        let encoded = encode_bitmap(ids.iter().copied());
        let (decoded, consumed) = decode_bitmap(&encoded).unwrap();
        prop_assert_eq!(&decoded, &ids);
        prop_assert_eq!(consumed, encoded.len());
        // Minimality: the byte count is exactly what the highest ID needs
        let expected_len = ids.iter().next_back().map_or(0, |max| usize::from(max / 8) + 1);
        prop_assert_eq!(encoded.len(), 1 + expected_len);
    }
}
