//! Journal frames persisting cache and queue state.
//!
//! ```text
//! | magic "WPJ1" (4) | len u32 LE (4) | crc32 u32 LE (4) | CBOR body (len) |
//! ```
//!
//! The body is a CBOR array of [`JournalOp`]s applied as one atomic batch.
//! Structured record fields are stored natively as CBOR maps. Recovery stops
//! at the first frame that is short, has a bad magic or fails its checksum;
//! everything from there on is a torn tail.

use crate::error::{CoreError, CoreResult};
use crate::queue::QueueEntry;
use crate::record::CachedRecord;
use crate::types::{QueueEntryId, RecordId};
use serde::{Deserialize, Serialize};

/// Magic bytes opening every frame.
pub const JOURNAL_MAGIC: [u8; 4] = *b"WPJ1";

/// Size of the frame header.
pub const FRAME_HEADER_LEN: usize = 12;

/// One state change recorded in the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalOp {
    /// Insert or overwrite a cached record.
    PutRecord(CachedRecord),
    /// Remove a cached record.
    RemoveRecord {
        /// Table of the record.
        table: String,
        /// Record id.
        id: RecordId,
    },
    /// Insert or overwrite a queue entry.
    PutEntry(QueueEntry),
    /// Remove a queue entry.
    RemoveEntry(QueueEntryId),
    /// Queue id counter at compaction time, so ids stay monotonic.
    Checkpoint {
        /// Next queue entry id.
        next_entry_id: u64,
    },
}

/// Encodes one batch into a framed byte buffer.
pub fn encode_frame(ops: &[JournalOp]) -> CoreResult<Vec<u8>> {
    let mut body = Vec::new();
    ciborium::ser::into_writer(ops, &mut body).map_err(|e| CoreError::codec(e.to_string()))?;

    let len = u32::try_from(body.len())
        .map_err(|_| CoreError::codec(format!("frame body too large: {} bytes", body.len())))?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.extend_from_slice(&JOURNAL_MAGIC);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&compute_crc32(&body).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Result of scanning a journal image.
#[derive(Debug, Default)]
pub struct DecodedJournal {
    /// Batches in write order.
    pub batches: Vec<Vec<JournalOp>>,
    /// Length of the valid prefix.
    pub valid_len: u64,
    /// Why scanning stopped early, if it did.
    pub torn_tail: Option<CoreError>,
}

/// Decodes every intact frame from `bytes`.
#[must_use]
pub fn decode_frames(bytes: &[u8]) -> DecodedJournal {
    let mut decoded = DecodedJournal::default();
    let mut offset = 0usize;

    while offset < bytes.len() {
        match decode_frame_at(bytes, offset) {
            Ok((ops, frame_len)) => {
                decoded.batches.push(ops);
                offset += frame_len;
                decoded.valid_len = offset as u64;
            }
            Err(err) => {
                decoded.torn_tail = Some(err);
                break;
            }
        }
    }

    decoded
}

fn decode_frame_at(bytes: &[u8], offset: usize) -> CoreResult<(Vec<JournalOp>, usize)> {
    let corrupt = |message: &str| CoreError::JournalCorruption {
        offset: offset as u64,
        message: message.to_owned(),
    };

    let header = bytes
        .get(offset..offset + FRAME_HEADER_LEN)
        .ok_or_else(|| corrupt("truncated frame header"))?;
    if header[0..4] != JOURNAL_MAGIC {
        return Err(corrupt("bad frame magic"));
    }

    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let expected_crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);

    let body_start = offset + FRAME_HEADER_LEN;
    let body = bytes
        .get(body_start..body_start + len)
        .ok_or_else(|| corrupt("truncated frame body"))?;

    let actual_crc = compute_crc32(body);
    if actual_crc != expected_crc {
        return Err(corrupt(&format!(
            "checksum mismatch: expected {expected_crc:08x}, got {actual_crc:08x}"
        )));
    }

    let ops: Vec<JournalOp> =
        ciborium::de::from_reader(body).map_err(|e| corrupt(&e.to_string()))?;
    Ok((ops, FRAME_HEADER_LEN + len))
}

/// Computes CRC32 (IEEE polynomial) of `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Fields;
    use serde_json::json;

    fn sample_ops() -> Vec<JournalOp> {
        let fields: Fields = json!({
            "trip_id": "t1",
            "content": "Pack sunscreen",
            "split_with": ["ana", "ben"],
            "amount": 12.5,
        })
        .as_object()
        .cloned()
        .unwrap();
        vec![
            JournalOp::PutRecord(CachedRecord::synced("notes", RecordId::from("n1"), fields)),
            JournalOp::RemoveEntry(QueueEntryId(7)),
        ]
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn frames_decode_in_order() {
        let mut bytes = encode_frame(&sample_ops()).unwrap();
        bytes.extend(encode_frame(&[JournalOp::Checkpoint { next_entry_id: 9 }]).unwrap());

        let decoded = decode_frames(&bytes);
        assert!(decoded.torn_tail.is_none());
        assert_eq!(decoded.valid_len, bytes.len() as u64);
        assert_eq!(decoded.batches.len(), 2);
        assert_eq!(decoded.batches[0], sample_ops());
    }

    #[test]
    fn structured_fields_stay_structured() {
        let bytes = encode_frame(&sample_ops()).unwrap();
        let decoded = decode_frames(&bytes);
        let JournalOp::PutRecord(record) = &decoded.batches[0][0] else {
            panic!("expected record");
        };
        assert_eq!(record.field("split_with"), Some(&json!(["ana", "ben"])));
    }

    #[test]
    fn truncated_tail_is_reported() {
        let first = encode_frame(&sample_ops()).unwrap();
        let second = encode_frame(&sample_ops()).unwrap();
        let mut bytes = first.clone();
        bytes.extend_from_slice(&second[..second.len() - 3]);

        let decoded = decode_frames(&bytes);
        assert_eq!(decoded.batches.len(), 1);
        assert_eq!(decoded.valid_len, first.len() as u64);
        assert!(matches!(
            decoded.torn_tail,
            Some(CoreError::JournalCorruption { .. })
        ));
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let mut bytes = encode_frame(&sample_ops()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let decoded = decode_frames(&bytes);
        assert!(decoded.batches.is_empty());
        assert_eq!(decoded.valid_len, 0);
        assert!(decoded.torn_tail.is_some());
    }
}
