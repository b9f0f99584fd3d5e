use bytes::{Bytes, BytesMut};
use tracing::warn;

use crate::error::{FramingViolation, IfitError, Result};

/// Largest write the protocol ever issues on the RX characteristic
///
/// The protocol predates larger negotiated MTUs and always frames for a
/// 20-byte GATT payload, so it stays compatible with legacy firmware even
/// when the stack would allow more.
pub const MAX_CHUNK: usize = 20;

/// Envelope bytes carried per payload chunk (after index and length bytes)
pub const MAX_CHUNK_DATA: usize = 18;

/// Index byte marking a header chunk
pub const HEADER_MARKER: u8 = 0xFE;

/// Index byte marking the final payload chunk of a message
pub const EOF_MARKER: u8 = 0xFF;

/// Second byte of every header chunk; fixed in observed traffic
const HEADER_TAG: u8 = 0x02;

/// Largest envelope that fits the one-byte length field of a header chunk
pub const MAX_FRAME: usize = 255;

const fn chunks_for(len: usize) -> usize {
    len.div_ceil(MAX_CHUNK_DATA)
}

/// Split an encoded envelope into GATT-sized chunks
///
/// Produces one header chunk `FE 02 LL NN` (`LL` = envelope length, `NN` =
/// total chunks including the header) followed by payload chunks
/// `II LL <data>`, where `II` counts up from zero and the final chunk is
/// marked [`EOF_MARKER`] instead of its ordinal. Every chunk fits in
/// [`MAX_CHUNK`] bytes.
///
/// # Errors
///
/// Returns [`IfitError::EnvelopeTooLong`] if `frame` exceeds [`MAX_FRAME`]
/// bytes.
pub fn chunk_frame(frame: &[u8]) -> Result<Vec<Bytes>> {
    if frame.len() > MAX_FRAME {
        return Err(IfitError::EnvelopeTooLong(frame.len()));
    }
    let payload_chunks = chunks_for(frame.len());
    let mut chunks = Vec::with_capacity(1 + payload_chunks);

    chunks.push(Bytes::copy_from_slice(&[
        HEADER_MARKER,
        HEADER_TAG,
        frame.len() as u8,
        (payload_chunks + 1) as u8,
    ]));

    for (ordinal, data) in frame.chunks(MAX_CHUNK_DATA).enumerate() {
        let index = if ordinal == payload_chunks - 1 {
            EOF_MARKER
        } else {
            ordinal as u8
        };
        let mut chunk = BytesMut::with_capacity(2 + data.len());
        chunk.extend_from_slice(&[index, data.len() as u8]);
        chunk.extend_from_slice(data);
        chunks.push(chunk.freeze());
    }
    Ok(chunks)
}

/// Incremental reassembly of inbound notification chunks
///
/// Holds at most one envelope in progress. Chunks must arrive in order: a
/// header first, then payload chunks with sequential indices closed by the
/// EOF marker. A fresh header while an envelope is in progress restarts
/// reassembly, which tolerates device-side retries. Any violation clears
/// the buffer so the next header starts clean.
#[derive(Debug, Default)]
pub struct Reassembler {
    assembly: Option<Assembly>,
}

#[derive(Debug)]
struct Assembly {
    expected_len: usize,
    payload_chunks: usize,
    next_ordinal: usize,
    buf: BytesMut,
}

impl Reassembler {
    /// Create an idle reassembler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an envelope is partially assembled
    #[must_use]
    pub const fn in_progress(&self) -> bool {
        self.assembly.is_some()
    }

    /// Discard any partially assembled envelope
    pub fn reset(&mut self) {
        self.assembly = None;
    }

    /// Consume one notification chunk
    ///
    /// Returns `Ok(Some(frame))` when the chunk completes an envelope,
    /// `Ok(None)` while more chunks are expected.
    ///
    /// # Errors
    ///
    /// Returns [`IfitError::Framing`] on any framing violation; the
    /// partially assembled envelope is discarded.
    pub fn accept(&mut self, chunk: &[u8]) -> Result<Option<Bytes>> {
        let Some(&index) = chunk.first() else {
            return Err(self.fail(FramingViolation::Truncated(0)));
        };

        if index == HEADER_MARKER {
            if self.assembly.is_some() {
                warn!("new header chunk while reassembly in progress, restarting");
            }
            return self.begin(chunk).map(|()| None);
        }

        let Some(assembly) = self.assembly.as_mut() else {
            return Err(self.fail(FramingViolation::UnexpectedChunk { index }));
        };

        if chunk.len() < 2 {
            return Err(self.fail(FramingViolation::Truncated(chunk.len())));
        }
        let data_len = usize::from(chunk[1]);
        if chunk.len() < 2 + data_len {
            return Err(self.fail(FramingViolation::Truncated(chunk.len())));
        }

        let final_expected = assembly.next_ordinal == assembly.payload_chunks - 1;
        let expected = if final_expected {
            EOF_MARKER
        } else {
            assembly.next_ordinal as u8
        };
        if index != expected {
            return Err(self.fail(FramingViolation::OrderViolation {
                got: index,
                expected,
            }));
        }

        let received = assembly.buf.len() + data_len;
        if received > assembly.expected_len {
            let expected = assembly.expected_len;
            return Err(self.fail(FramingViolation::Overrun { received, expected }));
        }

        // Chunks may be zero-padded past their declared length; take only
        // the declared bytes
        assembly.buf.extend_from_slice(&chunk[2..2 + data_len]);

        if index == EOF_MARKER {
            if assembly.buf.len() != assembly.expected_len {
                let (received, expected) = (assembly.buf.len(), assembly.expected_len);
                return Err(self.fail(FramingViolation::Underrun { received, expected }));
            }
            let frame = std::mem::take(&mut assembly.buf).freeze();
            self.assembly = None;
            return Ok(Some(frame));
        }

        assembly.next_ordinal += 1;
        Ok(None)
    }

    fn begin(&mut self, chunk: &[u8]) -> Result<()> {
        if chunk.len() < 4 {
            return Err(self.fail(FramingViolation::Truncated(chunk.len())));
        }
        let expected_len = usize::from(chunk[2]);
        let total_chunks = usize::from(chunk[3]);
        if expected_len == 0 || total_chunks != chunks_for(expected_len) + 1 {
            return Err(self.fail(FramingViolation::BadHeader {
                len: chunk[2],
                chunks: chunk[3],
            }));
        }
        self.assembly = Some(Assembly {
            expected_len,
            payload_chunks: total_chunks - 1,
            next_ordinal: 0,
            buf: BytesMut::with_capacity(expected_len),
        });
        Ok(())
    }

    fn fail(&mut self, violation: FramingViolation) -> IfitError {
        self.assembly = None;
        violation.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(chunks: &[Bytes]) -> Bytes {
        let mut reassembler = Reassembler::new();
        let mut out = None;
        for chunk in chunks {
            out = reassembler.accept(chunk).unwrap();
        }
        out.expect("final chunk completes the frame")
    }

    #[test]
    fn test_single_chunk_frame() {
        // Envelope carrying a Kph=10.0 write: fits one payload chunk,
        // which is therefore EOF-marked
        let frame = [
            0x02, 0x04, 0x02, 0x09, 0x04, 0x09, 0x02, 0x01, 0x01, 0x00, 0xE8, 0x03, 0xFC,
        ];
        let chunks = chunk_frame(&frame).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref(), [0xFE, 0x02, 0x0D, 0x02]);
        assert_eq!(
            chunks[1].as_ref(),
            [
                0xFF, 0x0D, 0x02, 0x04, 0x02, 0x09, 0x04, 0x09, 0x02, 0x01, 0x01, 0x00, 0xE8,
                0x03, 0xFC
            ]
        );
    }

    #[test]
    fn test_multi_chunk_round_trip() {
        let frame: Vec<u8> = (0u8..45).collect();
        let chunks = chunk_frame(&frame).unwrap();
        // 45 bytes → header + chunks of 18, 18, 9
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].as_ref(), [0xFE, 0x02, 45, 4]);
        assert_eq!(chunks[1][0], 0x00);
        assert_eq!(chunks[2][0], 0x01);
        assert_eq!(chunks[3][0], EOF_MARKER);
        assert_eq!(chunks[3][1], 9);
        for chunk in &chunks {
            assert!(chunk.len() <= MAX_CHUNK);
        }
        assert_eq!(reassemble(&chunks).as_ref(), frame.as_slice());
    }

    #[test]
    fn test_exact_chunk_boundary() {
        // 36 bytes = exactly two full chunks; the second is EOF-marked
        let frame: Vec<u8> = (0u8..36).collect();
        let chunks = chunk_frame(&frame).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2][0], EOF_MARKER);
        assert_eq!(chunks[2][1], 18);
        assert_eq!(reassemble(&chunks).as_ref(), frame.as_slice());
    }

    #[test]
    fn test_frame_too_long() {
        let frame = vec![0u8; MAX_FRAME + 1];
        assert!(matches!(
            chunk_frame(&frame),
            Err(IfitError::EnvelopeTooLong(256))
        ));
    }

    #[test]
    fn test_chunk_without_header_rejected() {
        let mut reassembler = Reassembler::new();
        let error = reassembler.accept(&[0x00, 0x01, 0xAA]).unwrap_err();
        assert!(matches!(
            error,
            IfitError::Framing(FramingViolation::UnexpectedChunk { index: 0x00 })
        ));
        assert!(!reassembler.in_progress());
    }

    #[test]
    fn test_out_of_order_chunk_rejected() {
        let frame: Vec<u8> = (0u8..45).collect();
        let chunks = chunk_frame(&frame).unwrap();
        let mut reassembler = Reassembler::new();
        reassembler.accept(&chunks[0]).unwrap();
        reassembler.accept(&chunks[1]).unwrap();
        // Skip chunk 1, deliver the EOF chunk
        let error = reassembler.accept(&chunks[3]).unwrap_err();
        assert!(matches!(
            error,
            IfitError::Framing(FramingViolation::OrderViolation {
                got: EOF_MARKER,
                expected: 0x01,
            })
        ));
        // Violation clears the buffer; a retry from the header succeeds
        assert!(!reassembler.in_progress());
        assert_eq!(reassemble(&chunks).as_ref(), frame.as_slice());
    }

    #[test]
    fn test_header_restarts_reassembly() {
        let frame: Vec<u8> = (0u8..30).collect();
        let chunks = chunk_frame(&frame).unwrap();
        let mut reassembler = Reassembler::new();
        reassembler.accept(&chunks[0]).unwrap();
        reassembler.accept(&chunks[1]).unwrap();
        // Device retries from the header; the stale bytes are dropped
        for chunk in &chunks[..chunks.len() - 1] {
            reassembler.accept(chunk).unwrap();
        }
        let frame_out = reassembler
            .accept(chunks.last().unwrap())
            .unwrap()
            .expect("complete");
        assert_eq!(frame_out.as_ref(), frame.as_slice());
    }

    #[test]
    fn test_overrun_rejected() {
        let mut reassembler = Reassembler::new();
        // Header declares 20 envelope bytes in two payload chunks
        reassembler.accept(&[0xFE, 0x02, 20, 3]).unwrap();
        let mut first = vec![0x00, 18];
        first.extend_from_slice(&[0u8; 18]);
        reassembler.accept(&first).unwrap();
        let error = reassembler.accept(&[0xFF, 3, 1, 2, 3]).unwrap_err();
        assert!(matches!(
            error,
            IfitError::Framing(FramingViolation::Overrun {
                received: 21,
                expected: 20,
            })
        ));
    }

    #[test]
    fn test_underrun_rejected() {
        let mut reassembler = Reassembler::new();
        reassembler.accept(&[0xFE, 0x02, 20, 3]).unwrap();
        let mut first = vec![0x00, 18];
        first.extend_from_slice(&[0u8; 18]);
        reassembler.accept(&first).unwrap();
        let error = reassembler.accept(&[0xFF, 1, 0xAB]).unwrap_err();
        assert!(matches!(
            error,
            IfitError::Framing(FramingViolation::Underrun {
                received: 19,
                expected: 20,
            })
        ));
    }

    #[test]
    fn test_bad_header_rejected() {
        let mut reassembler = Reassembler::new();
        assert!(matches!(
            reassembler.accept(&[0xFE, 0x02, 0, 1]).unwrap_err(),
            IfitError::Framing(FramingViolation::BadHeader { .. })
        ));
        // Chunk count inconsistent with the declared length
        assert!(matches!(
            reassembler.accept(&[0xFE, 0x02, 16, 3]).unwrap_err(),
            IfitError::Framing(FramingViolation::BadHeader { .. })
        ));
    }

    #[test]
    fn test_padded_chunks_tolerated() {
        // Consoles pad notification chunks to 20 bytes; only the declared
        // length is consumed
        let frame: Vec<u8> = (10u8..20).collect();
        let mut reassembler = Reassembler::new();
        reassembler.accept(&[0xFE, 0x02, 10, 2]).unwrap();
        let mut chunk = vec![0xFF, 10];
        chunk.extend_from_slice(&frame);
        chunk.resize(MAX_CHUNK, 0);
        let out = reassembler.accept(&chunk).unwrap().expect("complete");
        assert_eq!(out.as_ref(), frame.as_slice());
    }
}
