//! End-to-end framing properties: everything the stuffer emits, the
//! unstuffer must recover, regardless of how the serial layer slices it.

use pppbridge_frame::{stuff, stuffed_upper_bound, Unstuffer};

fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; stuffed_upper_bound(payload.len())];
    let n = stuff(payload, &mut out);
    out.truncate(n);
    out
}

fn decode_all(unstuffer: &mut Unstuffer, wire: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    unstuffer.process(wire, |p| frames.push(p.to_vec()));
    frames
}

#[test]
fn roundtrip_across_payload_lengths() {
    // Payloads shorter than 2 bytes are below the PPP protocol field and
    // are treated as keepalive noise by the decoder, so start at 2.
    let mut u = Unstuffer::new(2048);
    for len in 2..=512usize {
        let payload: Vec<u8> = (0..len).map(|i| (i * 7 + len) as u8).collect();
        let frames = decode_all(&mut u, &encode(&payload));
        assert_eq!(frames.len(), 1, "payload length {len}");
        assert_eq!(frames[0], payload, "payload length {len}");
    }
}

#[test]
fn roundtrip_all_byte_values() {
    // Exercises every escape decision at least once.
    let payload: Vec<u8> = (0..=255u8).collect();
    let mut u = Unstuffer::new(2048);
    let frames = decode_all(&mut u, &encode(&payload));
    assert_eq!(frames, vec![payload]);
}

#[test]
fn chunk_boundary_independence() {
    let payload: Vec<u8> = (0..64u8).flat_map(|b| [b, 0x7E, 0x7D]).collect();
    let wire = encode(&payload);

    // Every split position of the wire into two chunks.
    for split in 0..=wire.len() {
        let mut u = Unstuffer::new(2048);
        let mut frames = Vec::new();
        u.process(&wire[..split], |p| frames.push(p.to_vec()));
        u.process(&wire[split..], |p| frames.push(p.to_vec()));
        assert_eq!(frames, vec![payload.clone()], "split at {split}");
    }

    // Byte-at-a-time, the worst case a modem can produce.
    let mut u = Unstuffer::new(2048);
    let mut frames = Vec::new();
    for b in &wire {
        u.process(std::slice::from_ref(b), |p| frames.push(p.to_vec()));
    }
    assert_eq!(frames, vec![payload]);
}

#[test]
fn resynchronizes_after_garbage_frame() {
    let good = encode(b"the real frame");
    let mut wire = vec![0x7E];
    wire.extend_from_slice(&[0x13, 0x37, 0x00, 0x99]); // garbage, no flags
    wire.push(0x7E);
    wire.extend_from_slice(&good[1..]); // shares the flag with the garbage

    let mut u = Unstuffer::new(2048);
    let frames = decode_all(&mut u, &wire);
    assert_eq!(frames, vec![b"the real frame".to_vec()]);
    assert_eq!(u.stats().frames, 1);
}

#[test]
fn back_to_back_traffic_with_interleaved_noise() {
    let payloads: Vec<Vec<u8>> = (0..20)
        .map(|i| (0..30 + i).map(|j| (i * j) as u8).collect())
        .collect();

    let mut wire = Vec::new();
    for (i, p) in payloads.iter().enumerate() {
        wire.extend_from_slice(&encode(p));
        if i % 3 == 0 {
            wire.push(0x7E); // idle keepalive flag between frames
        }
    }

    let mut u = Unstuffer::new(2048);
    let frames = decode_all(&mut u, &wire);
    assert_eq!(frames, payloads);
    assert_eq!(u.stats().frames, 20);
}

#[test]
fn concrete_wire_vector() {
    // Bit-exact RFC 1662 framing of the payload "AB".
    let wire = encode(b"AB");
    assert_eq!(wire, [0x7E, 0xFF, 0x03, 0x41, 0x42, 0xC0, 0xE8, 0x7E]);

    let mut u = Unstuffer::new(2048);
    let frames = decode_all(&mut u, &wire);
    assert_eq!(frames, vec![vec![0x41, 0x42]]);
}
