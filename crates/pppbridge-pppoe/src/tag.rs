//! Discovery payload tags.
//!
//! A discovery payload is a sequence of TLVs: 16-bit tag type, 16-bit value
//! length, value bytes, all big-endian. Tags of the same type may repeat,
//! zero-length values are legal, and ordering carries no meaning on the
//! wire (we preserve insertion order when encoding). Parsing stops at an
//! End-Of-List tag.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::PppoeError;

pub const END_OF_LIST: u16 = 0x0000;
pub const SERVICE_NAME: u16 = 0x0101;
pub const AC_NAME: u16 = 0x0102;
pub const HOST_UNIQ: u16 = 0x0103;
pub const AC_COOKIE: u16 = 0x0104;
pub const VENDOR_SPECIFIC: u16 = 0x0105;
pub const RELAY_SESSION_ID: u16 = 0x0110;
pub const SERVICE_NAME_ERROR: u16 = 0x0201;
pub const AC_SYSTEM_ERROR: u16 = 0x0202;
pub const GENERIC_ERROR: u16 = 0x0203;

const TAG_HEADER_LEN: usize = 4;

/// A multiset of discovery tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tags {
    entries: Vec<(u16, Bytes)>,
}

impl Tags {
    pub fn new() -> Self {
        Tags::default()
    }

    /// Append a tag; duplicates of the same type are kept.
    pub fn push(&mut self, tag_type: u16, value: impl Into<Bytes>) {
        self.entries.push((tag_type, value.into()));
    }

    /// First value of the given tag type, if any.
    pub fn first(&self, tag_type: u16) -> Option<&Bytes> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag_type)
            .map(|(_, v)| v)
    }

    /// All values of the given tag type, in insertion order.
    pub fn all(&self, tag_type: u16) -> impl Iterator<Item = &Bytes> {
        self.entries
            .iter()
            .filter(move |(t, _)| *t == tag_type)
            .map(|(_, v)| v)
    }

    pub fn count(&self, tag_type: u16) -> usize {
        self.entries.iter().filter(|(t, _)| *t == tag_type).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy every tag of `tag_type` from `other` into `self`. Used to echo
    /// Host-Uniq and Relay-Session-Id back to the requesting host.
    pub fn echo_from(&mut self, other: &Tags, tag_type: u16) {
        for value in other.all(tag_type) {
            self.push(tag_type, value.clone());
        }
    }

    /// Encoded payload size in bytes.
    pub fn encoded_len(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, v)| TAG_HEADER_LEN + v.len())
            .sum()
    }

    /// Append the wire encoding of every tag to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        for (tag_type, value) in &self.entries {
            dst.put_u16(*tag_type);
            dst.put_u16(value.len() as u16);
            dst.put_slice(value);
        }
    }

    /// Parse a discovery payload into tags.
    ///
    /// Stops at End-Of-List; trailing bytes after it are ignored. Truncated
    /// tags and a non-empty End-Of-List are errors.
    pub fn parse(mut payload: &[u8]) -> Result<Tags, PppoeError> {
        let mut tags = Tags::new();
        while !payload.is_empty() {
            if payload.len() < TAG_HEADER_LEN {
                return Err(PppoeError::TruncatedTagHeader {
                    remaining: payload.len(),
                });
            }
            let tag_type = u16::from_be_bytes([payload[0], payload[1]]);
            let value_len = u16::from_be_bytes([payload[2], payload[3]]) as usize;
            payload = &payload[TAG_HEADER_LEN..];
            if payload.len() < value_len {
                return Err(PppoeError::TruncatedTagValue {
                    need: value_len,
                    remaining: payload.len(),
                });
            }
            if tag_type == END_OF_LIST {
                if value_len != 0 {
                    return Err(PppoeError::EndOfListWithValue { len: value_len });
                }
                break;
            }
            tags.push(tag_type, Bytes::copy_from_slice(&payload[..value_len]));
            payload = &payload[value_len..];
        }
        Ok(tags)
    }
}
