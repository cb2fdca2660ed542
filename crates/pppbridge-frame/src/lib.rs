//! RFC 1662 HDLC-like framing for PPP over asynchronous serial lines.
//!
//! This is the core value-add layer of pppbridge. Outbound PPP packets are
//! byte-stuffed, checksummed and flag-delimited by the [`stuffer`]; the raw
//! byte stream coming back from the modem is scanned by the [`Unstuffer`],
//! which finds frame boundaries, verifies the FCS and delivers validated
//! payloads. Everything here is synchronous, allocation-free per call and
//! owned by exactly one serial link.

pub mod fcs;
pub mod stuffer;
pub mod unstuffer;

/// Frame delimiter. Never appears inside a stuffed frame body.
pub const FLAG: u8 = 0x7E;
/// Escape marker: the following byte is transmitted XORed with [`ESCAPE_MASK`].
pub const ESCAPE: u8 = 0x7D;
/// XOR mask applied to escaped bytes.
pub const ESCAPE_MASK: u8 = 0x20;
/// Fixed HDLC address/control header prefixed to every PPP frame.
pub const HDLC_HEADER: [u8; 2] = [0xFF, 0x03];

pub use stuffer::{stuff, stuffed_upper_bound};
pub use unstuffer::{FrameDefect, Unstuffer, UnstufferStats};
