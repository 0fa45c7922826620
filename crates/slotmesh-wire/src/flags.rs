//! Frame flags for the SlotMesh wire protocol

/// Frame flags (1 byte)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameFlags(pub u8);

impl FrameFlags {
    pub const NONE: FrameFlags = FrameFlags(0);

    // Flag bits
    /// Frame carries records forwarded by a relay
    pub const RELAYED: u8 = 0b0000_0001;
    /// Sync frame is a bare marker with no payload
    pub const MARKER: u8 = 0b0000_0010;
    pub const RESERVED: u8 = 0b1111_1100;

    #[inline]
    pub fn new(bits: u8) -> Self {
        FrameFlags(bits)
    }

    #[inline]
    pub fn is_relayed(self) -> bool {
        self.0 & Self::RELAYED != 0
    }

    #[inline]
    pub fn is_marker(self) -> bool {
        self.0 & Self::MARKER != 0
    }

    #[inline]
    pub fn set_relayed(&mut self, value: bool) {
        if value {
            self.0 |= Self::RELAYED;
        } else {
            self.0 &= !Self::RELAYED;
        }
    }

    #[inline]
    pub fn set_marker(&mut self, value: bool) {
        if value {
            self.0 |= Self::MARKER;
        } else {
            self.0 &= !Self::MARKER;
        }
    }

    /// Any bit this version does not define
    #[inline]
    pub fn has_reserved(self) -> bool {
        self.0 & Self::RESERVED != 0
    }
}

impl From<u8> for FrameFlags {
    fn from(bits: u8) -> Self {
        FrameFlags(bits)
    }
}

impl From<FrameFlags> for u8 {
    fn from(flags: FrameFlags) -> Self {
        flags.0
    }
}
