//! Frame decoder: stateful scanner over the raw modem byte stream.
//!
//! The stream has no alignment guarantees; a frame may arrive split across
//! any number of reads, preceded by line noise, or truncated by a modem
//! hiccup. The decoder keeps just enough state to carry a frame in progress
//! across `process` calls and resynchronizes on the next flag byte after
//! anything malformed.

use tracing::warn;

use crate::fcs;
use crate::{ESCAPE, ESCAPE_MASK, FLAG, HDLC_HEADER};

/// Why an in-progress frame was discarded. None of these are fatal: the
/// decoder keeps scanning for the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameDefect {
    /// A flag byte arrived immediately after an escape marker. RFC 1662
    /// forbids escaping the flag; this is also the HDLC abort sequence.
    #[error("flag byte inside escape sequence")]
    EscapedFlag,
    /// The running checksum did not verify at the closing flag.
    #[error("FCS check failed (fcs={fcs:#06x}, {len} bytes)")]
    BadFcs { fcs: u16, len: usize },
    /// An unstuffed byte did not match the fixed 0xFF 0x03 header.
    #[error("unexpected HDLC header byte {byte:#04x}")]
    BadHeader { byte: u8 },
    /// The frame outgrew the decoder's payload buffer.
    #[error("frame larger than {capacity}-byte buffer")]
    Oversized { capacity: usize },
}

/// Counters for frames delivered and discarded, cumulative over the life of
/// the decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnstufferStats {
    pub frames: u64,
    pub escaped_flags: u64,
    pub bad_fcs: u64,
    pub bad_headers: u64,
    pub oversized: u64,
}

/// Streaming RFC 1662 frame decoder for one serial link.
///
/// Feed it raw bytes in arbitrary chunks; it invokes the callback once per
/// validated frame with the unstuffed payload (header and FCS stripped).
/// The slice borrows the decoder's internal buffer and is only valid for
/// the duration of the callback.
pub struct Unstuffer {
    buf: Box<[u8]>,
    in_frame: bool,
    header_matched: usize,
    in_escape: bool,
    /// Stored bytes so far; includes the trailing FCS pair once the header
    /// is past.
    frame_size: usize,
    fcs: u16,
    stats: UnstufferStats,
}

/// A closing flag leaves room for the 2 FCS bytes plus the 2-byte PPP
/// protocol field; anything shorter is inter-frame keepalive noise.
const MIN_FRAME_SIZE: usize = 4;

impl Unstuffer {
    /// Create a decoder whose payload buffer holds `capacity` bytes.
    /// Frames exceeding it are discarded whole, never truncated.
    pub fn new(capacity: usize) -> Self {
        Unstuffer {
            buf: vec![0u8; capacity].into_boxed_slice(),
            in_frame: false,
            header_matched: 0,
            in_escape: false,
            frame_size: 0,
            fcs: fcs::INIT,
            stats: UnstufferStats::default(),
        }
    }

    /// Payload buffer capacity.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Cumulative decode statistics.
    pub fn stats(&self) -> UnstufferStats {
        self.stats
    }

    /// Scan a chunk of raw serial bytes, invoking `on_frame` with the
    /// payload of every validated frame completed within it.
    ///
    /// Never fails: malformed input is logged, counted and skipped, and the
    /// decoder re-arms on the next flag byte. The callback must finish with
    /// the payload (copy or transmit it) before returning, because the next
    /// byte of the stream may start overwriting the buffer.
    pub fn process<F>(&mut self, chunk: &[u8], mut on_frame: F)
    where
        F: FnMut(&[u8]),
    {
        for &b in chunk {
            if !self.in_frame {
                // Hunting for frame sync; drop noise until a flag arrives.
                if b == FLAG {
                    self.arm();
                }
                continue;
            }

            if b == FLAG {
                if self.in_escape {
                    self.discard(FrameDefect::EscapedFlag);
                    continue;
                }
                // A single flag both closes this frame and opens the next.
                if self.frame_size >= MIN_FRAME_SIZE {
                    if self.fcs == fcs::GOOD {
                        self.stats.frames += 1;
                        on_frame(&self.buf[..self.frame_size - 2]);
                    } else {
                        self.stats.bad_fcs += 1;
                        warn!(
                            "discarding frame: {}",
                            FrameDefect::BadFcs {
                                fcs: self.fcs,
                                len: self.frame_size,
                            }
                        );
                    }
                }
                self.arm();
                continue;
            }

            let b = if self.in_escape {
                self.in_escape = false;
                b ^ ESCAPE_MASK
            } else if b == ESCAPE {
                self.in_escape = true;
                continue;
            } else {
                b
            };

            self.fcs = fcs::update(self.fcs, b);

            if self.header_matched < HDLC_HEADER.len() {
                if b == HDLC_HEADER[self.header_matched] {
                    self.header_matched += 1;
                } else {
                    self.discard(FrameDefect::BadHeader { byte: b });
                }
            } else if self.frame_size == self.buf.len() {
                self.discard(FrameDefect::Oversized {
                    capacity: self.buf.len(),
                });
            } else {
                self.buf[self.frame_size] = b;
                self.frame_size += 1;
            }
        }
    }

    /// Reset to a fresh in-frame state (a flag byte has just been consumed).
    fn arm(&mut self) {
        self.in_frame = true;
        self.header_matched = 0;
        self.in_escape = false;
        self.frame_size = 0;
        self.fcs = fcs::INIT;
    }

    /// Drop the frame in progress and resume hunting for a flag.
    fn discard(&mut self, defect: FrameDefect) {
        match defect {
            FrameDefect::EscapedFlag => self.stats.escaped_flags += 1,
            FrameDefect::BadFcs { .. } => self.stats.bad_fcs += 1,
            FrameDefect::BadHeader { .. } => self.stats.bad_headers += 1,
            FrameDefect::Oversized { .. } => self.stats.oversized += 1,
        }
        warn!("discarding frame: {defect}");
        self.in_frame = false;
        self.in_escape = false;
    }
}

impl std::fmt::Debug for Unstuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unstuffer")
            .field("capacity", &self.buf.len())
            .field("in_frame", &self.in_frame)
            .field("frame_size", &self.frame_size)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stuffer::{stuff, stuffed_upper_bound};

    fn encode(payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; stuffed_upper_bound(payload.len())];
        let n = stuff(payload, &mut out);
        out.truncate(n);
        out
    }

    fn collect(unstuffer: &mut Unstuffer, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        unstuffer.process(bytes, |p| frames.push(p.to_vec()));
        frames
    }

    #[test]
    fn decodes_known_vector() {
        let mut u = Unstuffer::new(1500);
        let frames = collect(&mut u, &[0x7E, 0xFF, 0x03, 0x41, 0x42, 0xC0, 0xE8, 0x7E]);
        assert_eq!(frames, vec![b"AB".to_vec()]);
        assert_eq!(u.stats().frames, 1);
    }

    #[test]
    fn unescapes_stuffed_bytes() {
        let payload = [0x7E, 0x7D, 0x01, 0x20];
        let mut u = Unstuffer::new(1500);
        let frames = collect(&mut u, &encode(&payload));
        assert_eq!(frames, vec![payload.to_vec()]);
    }

    #[test]
    fn shared_flag_between_frames() {
        // Two frames with a single flag between them.
        let mut wire = encode(b"first!");
        let second = encode(b"second");
        wire.extend_from_slice(&second[1..]);
        let mut u = Unstuffer::new(1500);
        let frames = collect(&mut u, &wire);
        assert_eq!(frames, vec![b"first!".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn keepalive_flags_are_silent() {
        let mut u = Unstuffer::new(1500);
        let frames = collect(&mut u, &[0x7E, 0x7E, 0x7E, 0x7E]);
        assert!(frames.is_empty());
        assert_eq!(u.stats(), UnstufferStats::default());
    }

    #[test]
    fn short_frames_are_ignored() {
        // Empty and 1-byte payloads leave fewer than 4 stored bytes.
        let mut u = Unstuffer::new(1500);
        let mut wire = encode(b"");
        wire.extend_from_slice(&encode(b"A"));
        let frames = collect(&mut u, &wire);
        assert!(frames.is_empty());
        assert_eq!(u.stats(), UnstufferStats::default());
    }

    #[test]
    fn noise_before_first_flag_is_discarded() {
        let mut wire = vec![0x00, 0x55, 0xAA, 0x0D, 0x0A]; // modem chatter
        wire.extend_from_slice(&encode(b"hello"));
        let mut u = Unstuffer::new(1500);
        let frames = collect(&mut u, &wire);
        assert_eq!(frames, vec![b"hello".to_vec()]);
    }

    #[test]
    fn garbage_frame_then_valid_frame() {
        // 7E <garbage> 7E <valid> 7E: only the valid frame is delivered.
        let mut wire = vec![0x7E, 0xDE, 0xAD, 0xBE, 0xEF, 0x42];
        wire.extend_from_slice(&encode(b"good frame"));
        let mut u = Unstuffer::new(1500);
        let frames = collect(&mut u, &wire);
        assert_eq!(frames, vec![b"good frame".to_vec()]);
        assert_eq!(u.stats().bad_headers, 1);
    }

    #[test]
    fn corrupted_fcs_is_rejected() {
        let mut wire = encode(b"payload");
        let n = wire.len();
        wire[n - 3] ^= 0x01; // flip a bit in the FCS high byte
        let mut u = Unstuffer::new(1500);
        assert!(collect(&mut u, &wire).is_empty());
        assert_eq!(u.stats().bad_fcs, 1);

        // The stream recovers on the very next frame.
        let frames = collect(&mut u, &encode(b"payload"));
        assert_eq!(frames, vec![b"payload".to_vec()]);
    }

    #[test]
    fn any_single_payload_bit_flip_is_detected() {
        let wire = encode(b"sensitive");
        let mut u = Unstuffer::new(1500);
        // Flip every bit of every non-flag byte in turn.
        for i in 1..wire.len() - 1 {
            for bit in 0..8 {
                let mut corrupted = wire.clone();
                corrupted[i] ^= 1 << bit;
                if corrupted[i] == FLAG || corrupted[i] == ESCAPE {
                    continue; // changes framing rather than content
                }
                let frames = collect(&mut u, &corrupted);
                assert!(frames.is_empty(), "bit {bit} of byte {i} undetected");
                // Terminate any half-open frame before the next round.
                u.process(&[FLAG], |_| {});
            }
        }
    }

    #[test]
    fn bad_header_rejected_without_storing() {
        let wire = [0x7E, 0xFF, 0x00, 0x41, 0x42, 0x00, 0x00, 0x7E];
        let mut u = Unstuffer::new(1500);
        assert!(collect(&mut u, &wire).is_empty());
        assert_eq!(u.stats().bad_headers, 1);
    }

    #[test]
    fn escaped_flag_aborts_frame() {
        let mut wire = vec![0x7E, 0xFF, 0x03, 0x41, 0x7D, 0x7E];
        wire.extend_from_slice(&encode(b"after abort"));
        let mut u = Unstuffer::new(1500);
        let frames = collect(&mut u, &wire);
        assert_eq!(frames, vec![b"after abort".to_vec()]);
        assert_eq!(u.stats().escaped_flags, 1);
    }

    #[test]
    fn oversized_frame_is_discarded_not_truncated() {
        let mut u = Unstuffer::new(16);
        let wire = encode(&[0x11u8; 64]);
        assert!(collect(&mut u, &wire).is_empty());
        assert_eq!(u.stats().oversized, 1);

        // A frame that fits still decodes afterwards.
        let frames = collect(&mut u, &encode(b"small"));
        assert_eq!(frames, vec![b"small".to_vec()]);
    }

    #[test]
    fn frame_spanning_many_chunks() {
        let wire = encode(&[0x7E, 0x00, 0x7D, 0x31, 0x32]);
        let mut u = Unstuffer::new(1500);
        let mut frames = Vec::new();
        for byte in &wire {
            u.process(std::slice::from_ref(byte), |p| frames.push(p.to_vec()));
        }
        assert_eq!(frames, vec![vec![0x7E, 0x00, 0x7D, 0x31, 0x32]]);
    }

    #[test]
    fn escape_pair_split_across_chunks() {
        let payload = [0x41, 0x7E, 0x42];
        let wire = encode(&payload);
        // Split right after the escape marker.
        let esc_at = wire.iter().position(|&b| b == ESCAPE).unwrap();
        let mut u = Unstuffer::new(1500);
        let mut frames = Vec::new();
        u.process(&wire[..=esc_at], |p| frames.push(p.to_vec()));
        assert!(frames.is_empty());
        u.process(&wire[esc_at + 1..], |p| frames.push(p.to_vec()));
        assert_eq!(frames, vec![payload.to_vec()]);
    }
}
