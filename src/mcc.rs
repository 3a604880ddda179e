//! MacCaption MCC container output.
//!
//! An MCC document is a `File Format=MacCaption_MCC V1.0` header block
//! followed by one line per populated frame: a timecode label and that
//! frame's ancillary-packet bytes, hex-encoded with the MacCaption macro
//! letters substituted for the common byte runs. The caption payload is
//! the same 608 word stream the SCC writer emits, carried in CDP packets
//! alongside a 708 service-1 mirror of each caption.

use std::collections::BTreeMap;

use crate::block;
use crate::cea708;
use crate::encoder::EncodedWord;
use crate::scheduler::{EventKind, ScheduledEvent};
use crate::timecode;
use crate::{CaptionError, Cue, ScheduleStats, SccOptions};

/// A generated MCC document plus the 608 scheduling statistics.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MccOutput {
    pub text: String,
    pub stats: ScheduleStats,
}

fn rate_label(opts: &SccOptions) -> String {
    let df = if opts.drop_frame { "DF" } else { "" };
    format!("{}{}", opts.frame_rate.nominal(), df)
}

/// MacCaption macro letters for frequent byte runs, longest first so the
/// greedy scan below never splits a run a macro could cover.
fn compress(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        // G through O cover 1 to 9 repetitions of the FA0000 padding triplet.
        if bytes[i..].starts_with(&[0xFA, 0x00, 0x00]) {
            let mut reps = 1;
            while reps < 9 && bytes[i + reps * 3..].starts_with(&[0xFA, 0x00, 0x00]) {
                reps += 1;
            }
            out.push((b'G' + (reps - 1) as u8) as char);
            i += reps * 3;
        } else if bytes[i..].starts_with(&[0xE1, 0x00, 0x00, 0x00]) {
            out.push('U');
            i += 4;
        } else if bytes[i..].starts_with(&[0xFB, 0x80, 0x80]) {
            out.push('P');
            i += 3;
        } else if bytes[i..].starts_with(&[0xFC, 0x80, 0x80]) {
            out.push('Q');
            i += 3;
        } else if bytes[i..].starts_with(&[0xFD, 0x80, 0x80]) {
            out.push('R');
            i += 3;
        } else if bytes[i..].starts_with(&[0x96, 0x69]) {
            out.push('S');
            i += 2;
        } else if bytes[i..].starts_with(&[0x61, 0x01]) {
            out.push('T');
            i += 2;
        } else if bytes[i] == 0x00 {
            out.push('Z');
            i += 1;
        } else {
            out.push_str(&format!("{:02X}", bytes[i]));
            i += 1;
        }
    }
    out
}

/// Build the MCC document for already scheduled 608 events. See
/// [`crate::generate_mcc`].
pub(crate) fn generate(
    cues: &[Cue],
    events: &[ScheduledEvent],
    opts: &SccOptions,
    stats: ScheduleStats,
) -> Result<MccOutput, CaptionError> {
    let rate = opts.frame_rate;
    let offset = crate::offset_frames(opts)?;
    let count = cea708::cc_count(rate);

    // One 608 word per frame, flattened from the scheduled events.
    let mut words: BTreeMap<u64, EncodedWord> = BTreeMap::new();
    for event in events {
        for (i, word) in event.words.iter().enumerate() {
            words.insert(event.frame + i as u64, *word);
        }
    }

    // 708 service payloads queue at each cue's display frame; erase events
    // mirror as clear-and-delete commands.
    let mut inserts: BTreeMap<u64, Vec<u8>> = BTreeMap::new();
    for (index, cue) in cues.iter().enumerate() {
        let lines = block::layout_cue(cue, opts, true)
            .map_err(|source| CaptionError::Block { index, source })?;
        let texts: Vec<String> = lines.iter().map(|l| l.text.clone()).collect();
        let commands = cea708::caption_commands(&texts, opts.alignment);
        let display = offset + rate.seconds_to_frames(cue.start);
        inserts
            .entry(display)
            .or_default()
            .extend(cea708::service_blocks(&commands));
    }
    for event in events {
        if matches!(event.kind, EventKind::Erase | EventKind::EndOfFile) {
            inserts
                .entry(event.frame)
                .or_default()
                .extend(cea708::service_blocks(&cea708::erase_commands()));
        }
    }

    let mut text = String::new();
    text.push_str("File Format=MacCaption_MCC V1.0\n\n");
    text.push_str(&format!("Time Code Rate={}\n", rate_label(opts)));
    text.push_str(&format!(
        "Drop Frame={}\n",
        if opts.drop_frame { "TRUE" } else { "FALSE" }
    ));
    text.push_str("CC Service=1\n");
    text.push_str("Language=en\n\n");

    let mut packetizer = cea708::Packetizer::default();
    let mut sequence: u16 = 0;
    let first = match (words.keys().next(), inserts.keys().next()) {
        (Some(&w), Some(&i)) => w.min(i),
        (Some(&w), None) => w,
        (None, Some(&i)) => i,
        (None, None) => {
            return Ok(MccOutput { text, stats });
        }
    };
    // Triplet slots after the 608 slot, minus the packet header byte.
    let max_payload = (count - 1) * 2 - 1;
    let mut frame = first;
    loop {
        if let Some(bytes) = inserts.remove(&frame) {
            packetizer.enqueue(&bytes);
        }
        let word = words.remove(&frame);
        if word.is_none() && !packetizer.has_data() {
            // Skip ahead to the next populated frame.
            let next = match (words.keys().next(), inserts.keys().next()) {
                (Some(&w), Some(&i)) => w.min(i),
                (Some(&w), None) => w,
                (None, Some(&i)) => i,
                (None, None) => break,
            };
            frame = next;
            continue;
        }
        let packet = packetizer.next_packet(max_payload);
        let data = cea708::cc_data(count, word, packet.as_deref());
        let cdp = cea708::cdp(sequence, frame, rate, opts.drop_frame, &data);
        sequence = sequence.wrapping_add(1);
        let anc = cea708::anc_wrap(&cdp);
        let label = timecode::format_frames(frame, rate, opts.drop_frame).replace(';', ":");
        text.push_str(&label);
        text.push('\t');
        text.push_str(&compress(&anc));
        text.push('\n');
        frame += 1;
    }

    Ok(MccOutput { text, stats })
}
