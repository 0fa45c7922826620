//! Body codecs for data and sync records
//!
//! Data record (scalar, 7 bytes / bulk, 30 bytes):
//! - source: u16
//! - seq: u8
//! - hops: u8
//! - payload tag: u8 (0 = scalar, 1 = bulk)
//! - scalar: value u16
//! - bulk: count u8, then `BULK_SIZE` u16 slots, unused slots zero
//!
//! Tagged sync record (7 bytes):
//! - tag: u16
//! - remaining: u32 microseconds
//! - ttl: u8

use std::time::Duration;

use bytes::{Buf, BufMut};
use slotmesh_core::{
    DataRecord, NodeId, Payload, Readings, SeqNo, SlotmeshError, SlotmeshResult, SyncRecord,
    SyncTag, BULK_SIZE,
};

const PAYLOAD_SCALAR: u8 = 0;
const PAYLOAD_BULK: u8 = 1;

/// Record prefix shared by both payload kinds
const RECORD_PREFIX_SIZE: usize = 5;

pub const SCALAR_RECORD_SIZE: usize = RECORD_PREFIX_SIZE + 2;
pub const BULK_RECORD_SIZE: usize = RECORD_PREFIX_SIZE + 1 + 2 * BULK_SIZE;
pub const SYNC_RECORD_SIZE: usize = 7;

/// Encoded size of one data record
pub fn record_size(record: &DataRecord) -> usize {
    match record.payload {
        Payload::Scalar(_) => SCALAR_RECORD_SIZE,
        Payload::Bulk(_) => BULK_RECORD_SIZE,
    }
}

pub fn encode_record(record: &DataRecord, buf: &mut impl BufMut) {
    buf.put_u16(record.source.0);
    buf.put_u8(record.seq.0);
    buf.put_u8(record.hops);
    match &record.payload {
        Payload::Scalar(value) => {
            buf.put_u8(PAYLOAD_SCALAR);
            buf.put_u16(*value);
        }
        Payload::Bulk(values) => {
            buf.put_u8(PAYLOAD_BULK);
            buf.put_u8(values.len() as u8);
            for value in values {
                buf.put_u16(*value);
            }
            for _ in values.len()..BULK_SIZE {
                buf.put_u16(0);
            }
        }
    }
}

pub fn decode_record(buf: &mut &[u8]) -> SlotmeshResult<DataRecord> {
    ensure(buf, RECORD_PREFIX_SIZE)?;
    let source = NodeId::new(buf.get_u16());
    let seq = SeqNo::new(buf.get_u8());
    let hops = buf.get_u8();

    let payload = match buf.get_u8() {
        PAYLOAD_SCALAR => {
            ensure(buf, 2)?;
            Payload::Scalar(buf.get_u16())
        }
        PAYLOAD_BULK => {
            ensure(buf, 1 + 2 * BULK_SIZE)?;
            let count = buf.get_u8() as usize;
            if count > BULK_SIZE {
                return Err(SlotmeshError::InvalidWireFormat(format!(
                    "bulk count {} exceeds {}",
                    count, BULK_SIZE
                )));
            }
            let mut values = Readings::new();
            for i in 0..BULK_SIZE {
                let value = buf.get_u16();
                if i < count {
                    values.push(value);
                }
            }
            Payload::Bulk(values)
        }
        other => {
            return Err(SlotmeshError::InvalidWireFormat(format!(
                "unknown payload tag {}",
                other
            )))
        }
    };

    Ok(DataRecord {
        source,
        seq,
        hops,
        payload,
    })
}

/// Encode a tagged sync record. Markers have no body and never reach here.
pub fn encode_sync(record: &SyncRecord, buf: &mut impl BufMut) {
    buf.put_u16(record.tag.unwrap_or_default().0);
    let micros = record.remaining.as_micros().min(u32::MAX as u128) as u32;
    buf.put_u32(micros);
    buf.put_u8(record.ttl);
}

pub fn decode_sync(buf: &mut &[u8]) -> SlotmeshResult<SyncRecord> {
    ensure(buf, SYNC_RECORD_SIZE)?;
    let tag = SyncTag::new(buf.get_u16());
    let remaining = Duration::from_micros(buf.get_u32() as u64);
    let ttl = buf.get_u8();
    Ok(SyncRecord::tagged(tag, remaining, ttl))
}

#[inline]
fn ensure(buf: &&[u8], needed: usize) -> SlotmeshResult<()> {
    if buf.remaining() < needed {
        return Err(SlotmeshError::BufferTooShort {
            expected: needed,
            actual: buf.remaining(),
        });
    }
    Ok(())
}
