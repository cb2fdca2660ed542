//! PPPoE packet encode/parse.
//!
//! Wire layout (RFC 2516): 14-byte Ethernet header (destination, source,
//! ethertype) followed by the 6-byte PPPoE header — ver/type octet 0x11,
//! code, 16-bit session id, 16-bit payload length — all big-endian.

use bytes::{BufMut, BytesMut};

use crate::error::PppoeError;
use crate::mac::MacAddr;
use crate::tag::Tags;

pub const ETHERTYPE_DISCOVERY: u16 = 0x8863;
pub const ETHERTYPE_SESSION: u16 = 0x8864;

/// VER and TYPE nibbles combined into one octet.
pub const VERTYPE: u8 = 0x11;

pub const ETH_HEADER_LEN: usize = 14;
pub const PPPOE_HEADER_LEN: usize = 6;
pub const HEADER_LEN: usize = ETH_HEADER_LEN + PPPOE_HEADER_LEN;

/// PPPoE discovery codes. Session traffic uses code zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Padi,
    Pado,
    Padr,
    Pads,
    Padt,
    Session,
}

impl Code {
    pub fn as_u8(self) -> u8 {
        match self {
            Code::Padi => 0x09,
            Code::Pado => 0x07,
            Code::Padr => 0x19,
            Code::Pads => 0x65,
            Code::Padt => 0xA7,
            Code::Session => 0x00,
        }
    }

    pub fn from_u8(code: u8) -> Option<Code> {
        match code {
            0x09 => Some(Code::Padi),
            0x07 => Some(Code::Pado),
            0x19 => Some(Code::Padr),
            0x65 => Some(Code::Pads),
            0xA7 => Some(Code::Padt),
            0x00 => Some(Code::Session),
            _ => None,
        }
    }
}

/// A parsed PPPoE frame; the payload borrows the receive buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct PppoeFrame<'a> {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub code: u8,
    pub session_id: u16,
    pub payload: &'a [u8],
}

/// Parse an Ethernet frame carrying PPPoE with the given ethertype.
///
/// Validates the ethertype, the ver/type octet and that the declared
/// payload length is actually present; excess capture bytes beyond the
/// declared length are trimmed.
pub fn parse_frame(raw: &[u8], expected_ethertype: u16) -> Result<PppoeFrame<'_>, PppoeError> {
    if raw.len() < HEADER_LEN {
        return Err(PppoeError::TruncatedFrame { len: raw.len() });
    }
    let mut dst = [0u8; 6];
    let mut src = [0u8; 6];
    dst.copy_from_slice(&raw[0..6]);
    src.copy_from_slice(&raw[6..12]);
    let ethertype = u16::from_be_bytes([raw[12], raw[13]]);
    if ethertype != expected_ethertype {
        return Err(PppoeError::WrongEthertype { ethertype });
    }
    let vertype = raw[14];
    if vertype != VERTYPE {
        return Err(PppoeError::BadVerType { vertype });
    }
    let code = raw[15];
    let session_id = u16::from_be_bytes([raw[16], raw[17]]);
    let declared = u16::from_be_bytes([raw[18], raw[19]]) as usize;
    let present = raw.len() - HEADER_LEN;
    if present < declared {
        return Err(PppoeError::TruncatedPayload { declared, present });
    }
    Ok(PppoeFrame {
        dst: MacAddr(dst),
        src: MacAddr(src),
        code,
        session_id,
        payload: &raw[HEADER_LEN..HEADER_LEN + declared],
    })
}

fn encode_headers(
    dst_mac: MacAddr,
    src_mac: MacAddr,
    ethertype: u16,
    code: Code,
    session_id: u16,
    payload_len: usize,
    dst: &mut BytesMut,
) {
    dst.reserve(HEADER_LEN + payload_len);
    dst.put_slice(dst_mac.as_bytes());
    dst.put_slice(src_mac.as_bytes());
    dst.put_u16(ethertype);
    dst.put_u8(VERTYPE);
    dst.put_u8(code.as_u8());
    dst.put_u16(session_id);
    dst.put_u16(payload_len as u16);
}

/// Encode a discovery packet (PADO, PADS, PADT...) into `dst`.
pub fn encode_discovery(
    dst_mac: MacAddr,
    src_mac: MacAddr,
    code: Code,
    session_id: u16,
    tags: &Tags,
    dst: &mut BytesMut,
) {
    encode_headers(
        dst_mac,
        src_mac,
        ETHERTYPE_DISCOVERY,
        code,
        session_id,
        tags.encoded_len(),
        dst,
    );
    tags.encode(dst);
}

/// Encode a session data packet carrying one PPP packet into `dst`.
pub fn encode_session(
    dst_mac: MacAddr,
    src_mac: MacAddr,
    session_id: u16,
    payload: &[u8],
    dst: &mut BytesMut,
) {
    encode_headers(
        dst_mac,
        src_mac,
        ETHERTYPE_SESSION,
        Code::Session,
        session_id,
        payload.len(),
        dst,
    );
    dst.put_slice(payload);
}
