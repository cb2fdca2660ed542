//! PPP frame check sequence (FCS-16), RFC 1662 appendix C.
//!
//! Table-driven CRC-16 with the X.25 polynomial, bit-reflected. The table is
//! evaluated at compile time and shared read-only by the stuffer and the
//! unstuffer.

/// Initial FCS value for a new frame.
pub const INIT: u16 = 0xFFFF;

/// Value the running FCS settles on after folding in a frame's header,
/// payload and the two FCS bytes as sent (the RFC 1662 complement trick).
pub const GOOD: u16 = 0xF0B8;

const POLY: u16 = 0x8408;

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut b = i as u16;
        let mut bit = 0;
        while bit < 8 {
            b = if b & 1 != 0 { (b >> 1) ^ POLY } else { b >> 1 };
            bit += 1;
        }
        table[i] = b;
        i += 1;
    }
    table
}

static TABLE: [u16; 256] = build_table();

/// Fold one byte into a running FCS.
#[inline]
pub fn update(fcs: u16, byte: u8) -> u16 {
    (fcs >> 8) ^ TABLE[((fcs ^ byte as u16) & 0xFF) as usize]
}

/// Compute the finalized FCS of a byte slice (fold from [`INIT`], then
/// complement). This is the value transmitted low byte first.
pub fn fcs16(data: &[u8]) -> u16 {
    let mut fcs = INIT;
    for &b in data {
        fcs = update(fcs, b);
    }
    fcs ^ 0xFFFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_reference_entries() {
        // First entries and the last one, computed by hand from appendix C.
        assert_eq!(TABLE[0], 0x0000);
        assert_eq!(TABLE[1], 0x1189);
        assert_eq!(TABLE[2], 0x2312);
        assert_eq!(TABLE[3], 0x329B);
        assert_eq!(TABLE[255], 0x0F78);
    }

    #[test]
    fn x25_check_value() {
        // Standard CRC-16/X-25 check input.
        assert_eq!(fcs16(b"123456789"), 0x906E);
    }

    #[test]
    fn hdlc_header_fcs() {
        assert_eq!(fcs16(&[0xFF, 0x03]), 0xC21C);
    }

    #[test]
    fn complement_trick_holds() {
        // Folding the transmitted FCS bytes back in lands on GOOD.
        let body = [0xFF, 0x03, 0x41, 0x42];
        let fcs = fcs16(&body);
        let mut running = INIT;
        for &b in &body {
            running = update(running, b);
        }
        running = update(running, (fcs & 0xFF) as u8);
        running = update(running, (fcs >> 8) as u8);
        assert_eq!(running, GOOD);
    }
}
