//! Frame encoder: payload in, stuffed flag-delimited frame out.

use crate::fcs;
use crate::{ESCAPE, ESCAPE_MASK, FLAG, HDLC_HEADER};

/// Worst-case encoded size for a payload of `payload_len` bytes: every
/// payload byte may escape to two bytes, plus the header (2 bytes) and FCS
/// (2 bytes) which may each escape, plus the two flag bytes.
pub const fn stuffed_upper_bound(payload_len: usize) -> usize {
    2 * payload_len + 8
}

/// Encode one complete PPP payload into `out` as a stuffed, checksummed,
/// flag-delimited frame. Returns the number of bytes written.
///
/// `out` must hold at least [`stuffed_upper_bound`]`(payload.len())` bytes;
/// this is a caller precondition, checked in debug builds. An undersized
/// buffer in a release build panics on the out-of-bounds write rather than
/// corrupting memory.
///
/// Cannot fail for a correctly sized buffer: every byte value is encodable.
pub fn stuff(payload: &[u8], out: &mut [u8]) -> usize {
    debug_assert!(
        out.len() >= stuffed_upper_bound(payload.len()),
        "output buffer too small: {} < {}",
        out.len(),
        stuffed_upper_bound(payload.len())
    );

    let mut n = 0;
    // The flag is never escaped or checksummed; no stuffed byte can equal it.
    out[n] = FLAG;
    n += 1;

    let mut fcs = fcs::INIT;
    for &b in HDLC_HEADER.iter().chain(payload) {
        fcs = fcs::update(fcs, b);
        n = put_stuffed(out, n, b);
    }

    let fcs = fcs ^ 0xFFFF;
    n = put_stuffed(out, n, (fcs & 0xFF) as u8);
    n = put_stuffed(out, n, (fcs >> 8) as u8);

    out[n] = FLAG;
    n + 1
}

#[inline]
fn put_stuffed(out: &mut [u8], n: usize, b: u8) -> usize {
    if b == FLAG || b == ESCAPE {
        out[n] = ESCAPE;
        out[n + 1] = b ^ ESCAPE_MASK;
        n + 2
    } else {
        out[n] = b;
        n + 1
    }
}
