//! Fixed header for the SlotMesh wire protocol
//!
//! Fixed header is 6 bytes, multi-byte fields in network byte order:
//! - Byte 0: Message kind
//! - Byte 1: Flags
//! - Bytes 2-3: Sender address (link-layer transmitter)
//! - Bytes 4-5: Destination address (0xFFFF = broadcast)

use bytes::{Buf, BufMut};
use slotmesh_core::{NodeId, SlotmeshError, SlotmeshResult};

use crate::FrameFlags;

/// Fixed header size in bytes
pub const HEADER_SIZE: usize = 6;

/// Message kind identifiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Sensor data records
    Data = 6,
    /// Timing beacon
    Sync = 7,
}

impl MessageKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            6 => Some(MessageKind::Data),
            7 => Some(MessageKind::Sync),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Fixed header structure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: MessageKind,
    pub flags: FrameFlags,
    /// Node that put the frame on the air
    pub sender: NodeId,
    /// Intended receiver, or broadcast
    pub dest: NodeId,
}

impl FrameHeader {
    pub fn new(kind: MessageKind, sender: NodeId, dest: NodeId) -> Self {
        FrameHeader {
            kind,
            flags: FrameFlags::NONE,
            sender,
            dest,
        }
    }

    /// Parse header from the front of `buf`, advancing it
    pub fn parse(buf: &mut &[u8]) -> SlotmeshResult<Self> {
        if buf.remaining() < HEADER_SIZE {
            return Err(SlotmeshError::BufferTooShort {
                expected: HEADER_SIZE,
                actual: buf.remaining(),
            });
        }

        let kind_byte = buf.get_u8();
        let kind =
            MessageKind::from_byte(kind_byte).ok_or(SlotmeshError::UnknownMessageKind(kind_byte))?;

        let flags = FrameFlags::new(buf.get_u8());
        if flags.has_reserved() {
            return Err(SlotmeshError::InvalidWireFormat(format!(
                "reserved flag bits set: {:#010b}",
                flags.0
            )));
        }

        let sender = NodeId::new(buf.get_u16());
        let dest = NodeId::new(buf.get_u16());

        Ok(FrameHeader {
            kind,
            flags,
            sender,
            dest,
        })
    }

    /// Append header bytes to `buf`
    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.kind.to_byte());
        buf.put_u8(self.flags.0);
        buf.put_u16(self.sender.0);
        buf.put_u16(self.dest.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let mut header = FrameHeader::new(MessageKind::Data, NodeId::new(33), NodeId::new(1));
        header.flags.set_relayed(true);

        let mut bytes = Vec::new();
        header.serialize(&mut bytes);
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(bytes, vec![6, 0b01, 0, 33, 0, 1]);

        let mut cursor = bytes.as_slice();
        let parsed = FrameHeader::parse(&mut cursor).unwrap();
        assert_eq!(parsed, header);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_header_too_short() {
        let mut buf: &[u8] = &[6, 0, 0];
        let result = FrameHeader::parse(&mut buf);
        assert!(matches!(result, Err(SlotmeshError::BufferTooShort { .. })));
    }

    #[test]
    fn test_unknown_kind() {
        let mut buf: &[u8] = &[9, 0, 0, 1, 0, 2];
        assert!(matches!(
            FrameHeader::parse(&mut buf),
            Err(SlotmeshError::UnknownMessageKind(9))
        ));
    }
}
