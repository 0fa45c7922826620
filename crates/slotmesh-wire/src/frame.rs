//! Complete frame structure for the SlotMesh wire protocol
//!
//! Frame = Fixed Header + Body
//! - Data body: record count (u8, 1..=BULK_SIZE) followed by the records
//! - Sync body: one tagged sync record, or nothing for a bare marker

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use slotmesh_core::{NodeId, RecordBatch, SlotmeshError, SlotmeshResult, SyncRecord, BULK_SIZE};

use crate::codec::{self, BULK_RECORD_SIZE};
use crate::{FrameHeader, MessageKind, HEADER_SIZE};

/// Maximum frame size (fits a single low-power radio packet buffer)
pub const MAX_FRAME_SIZE: usize = 512;

/// Largest data frame: full batch of bulk records
pub const MAX_DATA_FRAME_SIZE: usize = HEADER_SIZE + 1 + BULK_SIZE * BULK_RECORD_SIZE;

/// Frame body
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameBody {
    Data(RecordBatch),
    Sync(SyncRecord),
}

/// Complete SlotMesh frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub body: FrameBody,
}

impl Frame {
    /// Data frame from `sender` to `dest`
    pub fn data(sender: NodeId, dest: NodeId, records: RecordBatch) -> Self {
        let mut header = FrameHeader::new(MessageKind::Data, sender, dest);
        header
            .flags
            .set_relayed(records.iter().any(|r| r.source != sender));
        Frame {
            header,
            body: FrameBody::Data(records),
        }
    }

    /// Broadcast sync frame; a record without a tag is sent as a bare marker
    pub fn sync(sender: NodeId, record: SyncRecord) -> Self {
        let mut header = FrameHeader::new(MessageKind::Sync, sender, NodeId::BROADCAST);
        header.flags.set_marker(record.tag.is_none());
        Frame {
            header,
            body: FrameBody::Sync(record),
        }
    }

    /// Parse a frame, rejecting trailing bytes
    pub fn parse(bytes: &[u8]) -> SlotmeshResult<Self> {
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(SlotmeshError::FrameTooLarge {
                size: bytes.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        let mut buf = bytes;
        let header = FrameHeader::parse(&mut buf)?;

        let body = match header.kind {
            MessageKind::Data => {
                if header.flags.is_marker() {
                    return Err(SlotmeshError::InvalidWireFormat(
                        "marker flag on data frame".into(),
                    ));
                }
                let count = match buf.first() {
                    Some(c) => *c as usize,
                    None => {
                        return Err(SlotmeshError::BufferTooShort {
                            expected: 1,
                            actual: 0,
                        })
                    }
                };
                buf = &buf[1..];
                if count == 0 || count > BULK_SIZE {
                    return Err(SlotmeshError::InvalidWireFormat(format!(
                        "record count {} outside 1..={}",
                        count, BULK_SIZE
                    )));
                }
                let mut records = RecordBatch::new();
                for _ in 0..count {
                    records.push(codec::decode_record(&mut buf)?);
                }
                FrameBody::Data(records)
            }
            MessageKind::Sync if header.flags.is_marker() => {
                // Receiver supplies the remaining time from its own schedule
                FrameBody::Sync(SyncRecord::marker(Duration::ZERO))
            }
            MessageKind::Sync => FrameBody::Sync(codec::decode_sync(&mut buf)?),
        };

        if !buf.is_empty() {
            return Err(SlotmeshError::InvalidWireFormat(format!(
                "{} trailing bytes",
                buf.len()
            )));
        }

        Ok(Frame { header, body })
    }

    /// Serialize frame to bytes
    pub fn serialize(&self) -> SlotmeshResult<Bytes> {
        let size = self.size();
        if size > MAX_FRAME_SIZE {
            return Err(SlotmeshError::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(size);
        self.header.serialize(&mut buf);
        match &self.body {
            FrameBody::Data(records) => {
                if records.is_empty() {
                    return Err(SlotmeshError::InvalidWireFormat(
                        "data frame without records".into(),
                    ));
                }
                buf.extend_from_slice(&[records.len() as u8]);
                for record in records {
                    codec::encode_record(record, &mut buf);
                }
            }
            FrameBody::Sync(record) if record.tag.is_some() => {
                codec::encode_sync(record, &mut buf);
            }
            FrameBody::Sync(_) => {}
        }
        Ok(buf.freeze())
    }

    /// Calculate total frame size
    pub fn size(&self) -> usize {
        HEADER_SIZE
            + match &self.body {
                FrameBody::Data(records) => {
                    1 + records.iter().map(codec::record_size).sum::<usize>()
                }
                FrameBody::Sync(record) if record.tag.is_some() => codec::SYNC_RECORD_SIZE,
                FrameBody::Sync(_) => 0,
            }
    }

    pub fn records(&self) -> Option<&RecordBatch> {
        match &self.body {
            FrameBody::Data(records) => Some(records),
            FrameBody::Sync(_) => None,
        }
    }

    pub fn sync_record(&self) -> Option<&SyncRecord> {
        match &self.body {
            FrameBody::Sync(record) => Some(record),
            FrameBody::Data(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmesh_core::{DataRecord, Payload, Readings, SeqNo, SyncTag};

    fn batch(source: u16, n: u8) -> RecordBatch {
        (1..=n)
            .map(|i| DataRecord::scalar(NodeId::new(source), SeqNo::new(i), i as u16 * 100))
            .collect()
    }

    #[test]
    fn test_data_frame_roundtrip() {
        let frame = Frame::data(NodeId::new(3), NodeId::new(33), batch(3, 3));
        assert!(!frame.header.flags.is_relayed());

        let bytes = frame.serialize().unwrap();
        assert_eq!(bytes.len(), frame.size());
        assert_eq!(Frame::parse(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_relayed_flag_follows_sources() {
        let mut records = batch(3, 2);
        records[1] = records[1].relayed();
        let frame = Frame::data(NodeId::new(33), NodeId::new(1), records);
        assert!(frame.header.flags.is_relayed());
    }

    #[test]
    fn test_full_bulk_frame_fits() {
        let readings: Readings = (0..BULK_SIZE as u16).collect();
        let records: RecordBatch = (0..BULK_SIZE as u8)
            .map(|i| DataRecord::new(NodeId::new(6), SeqNo::new(i), Payload::Bulk(readings.clone())))
            .collect();
        let frame = Frame::data(NodeId::new(6), NodeId::new(28), records);
        assert_eq!(frame.size(), MAX_DATA_FRAME_SIZE);

        let bytes = frame.serialize().unwrap();
        assert_eq!(Frame::parse(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_tagged_sync_roundtrip() {
        let record = SyncRecord::tagged(SyncTag::new(41), Duration::from_millis(730), 3);
        let frame = Frame::sync(NodeId::new(1), record);
        assert!(frame.header.dest.is_broadcast());

        let bytes = frame.serialize().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + codec::SYNC_RECORD_SIZE);
        assert_eq!(Frame::parse(&bytes).unwrap().sync_record(), Some(&record));
    }

    #[test]
    fn test_marker_has_no_body() {
        let frame = Frame::sync(NodeId::new(1), SyncRecord::marker(Duration::from_millis(5)));
        let bytes = frame.serialize().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);

        let parsed = Frame::parse(&bytes).unwrap();
        assert!(parsed.header.flags.is_marker());
        assert_eq!(parsed.sync_record().and_then(|r| r.tag), None);
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let frame = Frame::sync(NodeId::new(1), SyncRecord::marker(Duration::ZERO));
        let mut bytes = frame.serialize().unwrap().to_vec();
        bytes.push(0xAA);
        assert!(matches!(
            Frame::parse(&bytes),
            Err(SlotmeshError::InvalidWireFormat(_))
        ));
    }

    #[test]
    fn test_rejects_empty_and_oversized_counts() {
        let empty = Frame {
            header: FrameHeader::new(MessageKind::Data, NodeId::new(3), NodeId::new(33)),
            body: FrameBody::Data(RecordBatch::new()),
        };
        assert!(empty.serialize().is_err());

        let bytes = [6u8, 0, 0, 3, 0, 33, 13];
        assert!(matches!(
            Frame::parse(&bytes),
            Err(SlotmeshError::InvalidWireFormat(_))
        ));

        let bytes = [6u8, 0, 0, 3, 0, 33];
        assert!(matches!(
            Frame::parse(&bytes),
            Err(SlotmeshError::BufferTooShort { .. })
        ));
    }

    #[test]
    fn test_rejects_oversized_input() {
        let bytes = vec![0u8; MAX_FRAME_SIZE + 1];
        assert!(matches!(
            Frame::parse(&bytes),
            Err(SlotmeshError::FrameTooLarge { .. })
        ));
    }

    proptest::proptest! {
        #[test]
        fn prop_parse_never_panics(bytes in proptest::collection::vec(proptest::num::u8::ANY, 0..600)) {
            let _ = Frame::parse(&bytes);
        }
    }
}
