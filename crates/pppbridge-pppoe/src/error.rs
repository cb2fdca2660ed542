/// Errors raised while parsing PPPoE frames and discovery tags.
#[derive(Debug, thiserror::Error)]
pub enum PppoeError {
    /// The Ethernet frame is shorter than the combined headers.
    #[error("frame shorter than PPPoE header ({len} bytes)")]
    TruncatedFrame { len: usize },

    /// The frame carried an ethertype other than the one expected.
    #[error("unexpected ethertype {ethertype:#06x}")]
    WrongEthertype { ethertype: u16 },

    /// The PPPoE version/type octet was not 0x11.
    #[error("unknown PPPoE ver/type {vertype:#04x}")]
    BadVerType { vertype: u8 },

    /// Fewer payload bytes present than the header declared.
    #[error("payload shorter than declared length ({declared} declared, {present} present)")]
    TruncatedPayload { declared: usize, present: usize },

    /// A tag header was cut off at the end of the payload.
    #[error("truncated tag header ({remaining} bytes left, need 4)")]
    TruncatedTagHeader { remaining: usize },

    /// A tag declared more value bytes than the payload holds.
    #[error("truncated tag value (need {need} bytes, {remaining} left)")]
    TruncatedTagValue { need: usize, remaining: usize },

    /// End-Of-List tags must have zero length.
    #[error("End-Of-List tag with non-zero length {len}")]
    EndOfListWithValue { len: usize },

    /// A MAC address string did not parse.
    #[error("invalid MAC address {0:?}")]
    BadMacAddr(String),
}
