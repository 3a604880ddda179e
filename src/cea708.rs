//! CEA-708 (DTVCC) packetization.
//!
//! The 708 side mirrors each caption into a single bottom-anchored window
//! on service 1: define-window, window attributes carrying the
//! justification, pen location, G0 text with carriage returns between
//! lines, then display. Service-block bytes are chunked to 31 bytes,
//! packed into DTVCC packets, and each frame's packet rides a Caption
//! Distribution Packet wrapped in a SMPTE-291 ancillary packet. The
//! companion 608 word occupies the first cc_data triplet.

use crate::encoder::EncodedWord;
use crate::timecode::FrameRate;
use crate::Alignment;

/// The single caption service used by the generated stream.
const SERVICE: u8 = 1;
/// Longest service block the packetizer may emit.
const MAX_BLOCK: usize = 31;

/// cc_data triplets per frame, fixed per frame rate so the caption channel
/// bandwidth totals 9600 bits/s.
pub(crate) fn cc_count(rate: FrameRate) -> usize {
    match rate.nominal() {
        24 => 25,
        25 => 24,
        50 => 12,
        60 => 10,
        _ => 20,
    }
}

fn justification(alignment: Alignment) -> u8 {
    match alignment {
        Alignment::Left => 0,
        Alignment::Right => 1,
        Alignment::Center => 2,
    }
}

fn push_g0(out: &mut Vec<u8>, text: &str) {
    for c in text.chars() {
        let b = u32::from(c);
        if (0x20..0x7F).contains(&b) {
            out.push(b as u8);
        } else {
            // G0 is ASCII; anything else degrades to a question mark.
            out.push(b'?');
        }
    }
}

/// The command sequence that builds, fills and shows the caption window.
pub(crate) fn caption_commands(lines: &[String], alignment: Alignment) -> Vec<u8> {
    let rows = lines.len().max(1) as u8;
    let mut out = Vec::with_capacity(32 + lines.iter().map(String::len).sum::<usize>());
    // DLW: delete all windows from the previous caption.
    out.extend_from_slice(&[0x8C, 0xFF]);
    // DF0: visible=0, row/column locks, priority 3, relative=0,
    // anchor vertical 74 (bottom), horizontal 80 (center), anchor point 7
    // (bottom center), row count, 32 columns, window style 2, pen style 0.
    out.extend_from_slice(&[
        0x98,
        0x1B,
        74,
        80,
        0x70 | (rows - 1),
        31,
        0x10,
    ]);
    // SWA: opaque black fill, no border, justification in the low bits.
    out.extend_from_slice(&[0x97, 0x00, 0x00, justification(alignment), 0x00]);
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push(0x0D);
        }
        // SPL: pen to the start of this row.
        out.extend_from_slice(&[0x92, i as u8, 0x00]);
        push_g0(&mut out, line);
    }
    // DSW: display window 0.
    out.extend_from_slice(&[0x89, 0x01]);
    out
}

/// The command sequence that clears the caption from screen.
pub(crate) fn erase_commands() -> Vec<u8> {
    // CLW + DLW on all windows.
    vec![0x88, 0xFF, 0x8C, 0xFF]
}

/// Chunk a service payload into service blocks: a header byte carrying the
/// service number and length, then up to 31 data bytes.
pub(crate) fn service_blocks(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + payload.len() / MAX_BLOCK + 1);
    for chunk in payload.chunks(MAX_BLOCK) {
        out.push(SERVICE << 5 | chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    out
}

/// Builds DTVCC packets from queued service-block bytes, at most one
/// packet per frame.
#[derive(Debug, Default)]
pub(crate) struct Packetizer {
    queue: Vec<u8>,
    sequence: u8,
}

impl Packetizer {
    pub(crate) fn enqueue(&mut self, bytes: &[u8]) {
        self.queue.extend_from_slice(bytes);
    }

    pub(crate) fn has_data(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Emit the next packet, taking at most `max_payload` queued bytes.
    /// The header byte holds a 2-bit sequence number and the packet size
    /// in byte pairs; odd payloads are padded with a zero byte.
    pub(crate) fn next_packet(&mut self, max_payload: usize) -> Option<Vec<u8>> {
        if self.queue.is_empty() {
            return None;
        }
        let take = self.queue.len().min(max_payload).min(62);
        let mut payload: Vec<u8> = self.queue.drain(..take).collect();
        if (payload.len() + 1) % 2 == 1 {
            payload.push(0x00);
        }
        let size_code = ((payload.len() + 1) / 2) as u8;
        let mut packet = Vec::with_capacity(payload.len() + 1);
        packet.push(self.sequence << 6 | size_code);
        packet.extend_from_slice(&payload);
        self.sequence = (self.sequence + 1) & 0x03;
        Some(packet)
    }
}

/// One frame's cc_data triplets: the 608 word in the first slot, the DTVCC
/// packet spread over the following slots, padding after.
pub(crate) fn cc_data(
    count: usize,
    cc608: Option<EncodedWord>,
    packet: Option<&[u8]>,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(count * 3);
    // Slot 0: valid NTSC field-1 pair; a null pair when the 608 channel is
    // idle this frame.
    match cc608 {
        Some(w) => out.extend_from_slice(&[0xFC, w.hi(), w.lo()]),
        None => out.extend_from_slice(&[0xFC, 0x80, 0x80]),
    }
    if let Some(packet) = packet {
        for (i, pair) in packet.chunks(2).enumerate() {
            if out.len() / 3 >= count {
                break;
            }
            // Packet start on the first triplet, continuation after.
            out.push(if i == 0 { 0xFF } else { 0xFE });
            out.push(pair[0]);
            out.push(*pair.get(1).unwrap_or(&0x00));
        }
    }
    while out.len() / 3 < count {
        out.extend_from_slice(&[0xFA, 0x00, 0x00]);
    }
    out
}

fn framerate_id(rate: FrameRate) -> u8 {
    match (rate.nominal(), rate.is_ntsc()) {
        (24, true) => 1,
        (24, false) => 2,
        (25, _) => 3,
        (30, true) => 4,
        (30, false) => 5,
        (50, _) => 6,
        (60, true) => 7,
        _ => 8,
    }
}

fn bcd(value: u8) -> u8 {
    (value / 10) << 4 | (value % 10)
}

/// Wrap one frame's cc_data in a Caption Distribution Packet: identifier,
/// length, frame rate, flags, header sequence counter, SMPTE-12M timecode
/// section, cc_data section, footer with the same counter and a
/// two's-complement checksum over the whole packet.
pub(crate) fn cdp(
    sequence: u16,
    frame: u64,
    rate: FrameRate,
    drop_frame: bool,
    cc_data: &[u8],
) -> Vec<u8> {
    let tc = crate::timecode::Timecode::from_frames(frame, rate, drop_frame);
    let cc_count = (cc_data.len() / 3) as u8;
    // identifier(2) rate/flags(2) counter(2) + tc section(5)
    // + cc section(2+data) + footer(4), plus the length byte itself.
    let len = 2 + 1 + 1 + 1 + 2 + 5 + 2 + cc_data.len() + 4;
    let mut out = Vec::with_capacity(len);
    out.extend_from_slice(&[0x96, 0x69]);
    out.push(len as u8);
    out.push(framerate_id(rate) << 4 | 0x0F);
    // time_code_present | ccdata_present | caption_service_active.
    out.push(0x80 | 0x40 | 0x02);
    out.extend_from_slice(&sequence.to_be_bytes());
    out.push(0x71);
    out.push(0xC0 | bcd(tc.hours));
    out.push(0x80 | bcd(tc.minutes));
    out.push(bcd(tc.seconds));
    out.push(if drop_frame { 0x80 } else { 0x00 } | bcd(tc.frames));
    out.push(0x72);
    out.push(0xE0 | cc_count);
    out.extend_from_slice(cc_data);
    out.push(0x74);
    out.extend_from_slice(&sequence.to_be_bytes());
    let sum: u32 = out.iter().map(|&b| u32::from(b)).sum();
    out.push((256 - (sum % 256) as u16) as u8);
    out
}

/// Wrap a CDP in a SMPTE-291 ancillary packet: DID 0x61, SDID 0x01, byte
/// count, payload, 8-bit checksum.
pub(crate) fn anc_wrap(cdp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(cdp.len() + 4);
    out.extend_from_slice(&[0x61, 0x01, cdp.len() as u8]);
    out.extend_from_slice(cdp);
    let sum: u32 = out.iter().map(|&b| u32::from(b)).sum();
    out.push((sum & 0xFF) as u8);
    out
}
