//! Identity and sequence types for SlotMesh
//!
//! Node addresses are 16-bit, matching the short link-layer addresses used
//! by low-power radios. Sequence numbers and sync tags wrap and are compared
//! with serial-number arithmetic: a value within half the modulus "ahead"
//! of another counts as newer.

use std::fmt;

/// Node address (link-layer short address)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeId(pub u16);

impl NodeId {
    pub const ZERO: NodeId = NodeId(0);
    /// Broadcast destination
    pub const BROADCAST: NodeId = NodeId(0xFFFF);

    #[inline]
    pub fn new(id: u16) -> Self {
        NodeId(id)
    }

    #[inline]
    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        NodeId(u16::from_be_bytes(bytes))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({:03})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// Per-source data sequence number (modulus 256)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SeqNo(pub u8);

impl SeqNo {
    /// Largest forward distance still treated as "newer"
    pub const HALF_RANGE: u8 = 127;

    #[inline]
    pub fn new(seq: u8) -> Self {
        SeqNo(seq)
    }

    #[inline]
    pub fn next(self) -> Self {
        SeqNo(self.0.wrapping_add(1))
    }

    /// True if `self` is strictly ahead of `other` within half the modulus
    #[inline]
    pub fn is_newer_than(self, other: SeqNo) -> bool {
        let ahead = self.0.wrapping_sub(other.0);
        ahead != 0 && ahead <= Self::HALF_RANGE
    }
}

impl fmt::Debug for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

/// Synchronization round tag (modulus 65536)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SyncTag(pub u16);

impl SyncTag {
    pub const HALF_RANGE: u16 = 32767;

    #[inline]
    pub fn new(tag: u16) -> Self {
        SyncTag(tag)
    }

    #[inline]
    pub fn next(self) -> Self {
        SyncTag(self.0.wrapping_add(1))
    }

    #[inline]
    pub fn is_newer_than(self, other: SyncTag) -> bool {
        let ahead = self.0.wrapping_sub(other.0);
        ahead != 0 && ahead <= Self::HALF_RANGE
    }
}

impl fmt::Debug for SyncTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.0)
    }
}
