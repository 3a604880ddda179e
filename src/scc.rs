//! Scenarist SCC reading and writing.
//!
//! An SCC document is a `Scenarist_SCC V1.0` header followed by caption
//! lines of the form `HH:MM:SS;FF<TAB>9420 9420 ...`: a timecode label and
//! the hex words transmitted starting at that frame, one word per frame.
//! The writer emits one line per scheduled event; the reader runs a pop-on
//! decoder model over the word stream to recover cues.

use crate::scheduler::ScheduledEvent;
use crate::tables;
use crate::timecode::{self, FrameRate, Timecode, TimecodeError};
use thiserror::Error;

pub(crate) const HEADER: &str = "Scenarist_SCC V1.0";

/// Errors from SCC parsing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("missing {HEADER:?} header")]
    MissingHeader,
    #[error("line {line}: invalid word token {token:?}")]
    BadWord { line: usize, token: String },
    #[error("line {line}: {source}")]
    Timecode {
        line: usize,
        #[source]
        source: TimecodeError,
    },
}

/// One caption recovered from an SCC word stream.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecodedCue {
    /// Seconds from timecode zero at which the caption appeared (the frame
    /// its first `EOC` was transmitted).
    pub start: f64,
    /// Seconds at which it was erased or replaced; `None` when the stream
    /// ends with the caption still up.
    pub end: Option<f64>,
    pub lines: Vec<String>,
    /// 1-based row of each line.
    pub rows: Vec<u8>,
    /// Starting column of each line, indent plus tab offsets.
    pub columns: Vec<u8>,
}

impl DecodedCue {
    /// The lines joined with newlines.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// A fully decoded SCC document.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecodedDocument {
    pub cues: Vec<DecodedCue>,
    /// The rate used to convert frames to seconds (a hint or the 29.97
    /// default; SCC text does not record it).
    pub frame_rate: FrameRate,
    /// True when any caption line uses the `;` frames delimiter.
    pub drop_frame: bool,
    /// The (top, bottom) rows of the first two-line caption, when any.
    pub row_pair: Option<(u8, u8)>,
    /// Seconds of the earliest timecode in the document, the base for
    /// re-anchoring cue times to zero-based media time.
    pub timecode_base_sec: f64,
    /// The earliest timecode's original label.
    pub timecode_base_label: Option<String>,
}

/// Render scheduled events as SCC text. Events must already be sorted and
/// non-overlapping; each becomes one caption line.
pub(crate) fn serialize(events: &[ScheduledEvent], rate: FrameRate, drop_frame: bool) -> String {
    let mut out = String::with_capacity(64 + events.len() * 80);
    out.push_str(HEADER);
    out.push_str("\n\n");
    for event in events {
        out.push_str(&timecode::format_frames(event.frame, rate, drop_frame));
        out.push('\t');
        for (i, word) in event.words.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&word.to_hex());
        }
        out.push_str("\n\n");
    }
    out
}

/// Remove `/* */` and `//` comments, preserving line structure so error
/// positions stay meaningful.
pub(crate) fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_block = false;
    while let Some(c) = chars.next() {
        if in_block {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block = false;
            } else if c == '\n' {
                out.push('\n');
            }
            continue;
        }
        match c {
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                in_block = true;
            }
            '/' if chars.peek() == Some(&'/') => {
                // Line comment: drop to end of line.
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// A caption line being assembled in decoder memory.
#[derive(Debug, Clone, Default)]
struct BufLine {
    row: u8,
    column: u8,
    text: String,
}

/// Pop-on decoder state over the transmitted word stream.
#[derive(Default)]
struct PopOnDecoder {
    /// Non-displayed memory being loaded between RCL and EOC.
    buffer: Vec<BufLine>,
    /// Displayed caption and the frame its EOC arrived.
    displayed: Option<(u64, Vec<BufLine>)>,
    /// Previous word, for the transmit-twice squash.
    last_control: Option<(u8, u8)>,
    committed: Vec<(u64, Option<u64>, Vec<BufLine>)>,
}

impl PopOnDecoder {
    fn current_line(&mut self) -> &mut BufLine {
        if self.buffer.is_empty() {
            self.buffer.push(BufLine { row: 15, column: 0, text: String::new() });
        }
        let last = self.buffer.len() - 1;
        &mut self.buffer[last]
    }

    fn commit_displayed(&mut self, end: Option<u64>) {
        if let Some((start, lines)) = self.displayed.take() {
            self.committed.push((start, end, lines));
        }
    }

    fn word(&mut self, frame: u64, b0: u8, b1: u8) {
        if (b0, b1) == (0, 0) {
            self.last_control = None;
            return;
        }
        if !tables::is_control_byte(b0) {
            self.last_control = None;
            for b in [b0, b1] {
                if b == 0 {
                    continue;
                }
                if let Some(c) = tables::basic_char(b) {
                    self.current_line().text.push(c);
                }
            }
            return;
        }
        // Control codes are conventionally transmitted twice; the second
        // consecutive copy is ignored, the third starts over.
        if self.last_control == Some((b0, b1)) {
            self.last_control = None;
            return;
        }
        self.last_control = Some((b0, b1));
        let base = b0 & !0x08;
        match (base, b1) {
            // RCL and ENM both leave non-displayed memory empty.
            (0x14, 0x20) | (0x14, 0x2E) => self.buffer.clear(),
            (0x14, 0x2C) => self.commit_displayed(Some(frame)),
            (0x14, 0x2F) => {
                self.commit_displayed(Some(frame));
                let lines = std::mem::take(&mut self.buffer);
                self.displayed = Some((frame, lines));
            }
            // Transparent space: an overwriteable placeholder column.
            (0x11, 0x39) => self.current_line().text.push(' '),
            (0x17, 0x21..=0x23) => {
                let line = self.current_line();
                line.column = (line.column + (b1 - 0x20)).min(31);
            }
            // Mid-row style changes do not affect recovered text.
            (0x11, 0x20..=0x2F) => {}
            _ => {
                if let Some(c) = tables::glyph_char(base, b1) {
                    // The glyph overwrites the placeholder ahead of it.
                    let line = self.current_line();
                    line.text.pop();
                    line.text.push(c);
                } else if let Some(pac) = tables::pac_decode(base, b1) {
                    self.buffer.push(BufLine {
                        row: pac.row,
                        column: pac.column,
                        text: String::new(),
                    });
                }
            }
        }
    }

    fn finish(mut self, rate: FrameRate) -> Vec<DecodedCue> {
        self.commit_displayed(None);
        let mut cues: Vec<DecodedCue> = self
            .committed
            .into_iter()
            .filter(|(_, _, lines)| lines.iter().any(|l| !l.text.trim().is_empty()))
            .map(|(start, end, lines)| DecodedCue {
                start: rate.frames_to_seconds(start),
                end: end.map(|f| rate.frames_to_seconds(f)),
                lines: lines.iter().map(|l| l.text.trim_end().to_string()).collect(),
                rows: lines.iter().map(|l| l.row).collect(),
                columns: lines.iter().map(|l| l.column).collect(),
            })
            .collect();
        // A caption cannot outlive its replacement.
        for i in 1..cues.len() {
            let next_start = cues[i].start;
            if let Some(end) = &mut cues[i - 1].end {
                if *end > next_start {
                    *end = next_start;
                }
            }
        }
        cues
    }
}

/// Decode SCC text into cues. See [`crate::decode_scc`].
pub(crate) fn decode(
    text: &str,
    rate_hint: Option<FrameRate>,
) -> Result<DecodedDocument, DecodeError> {
    let rate = rate_hint.unwrap_or(FrameRate::F29_97);
    let stripped = strip_comments(text);
    let mut lines = stripped
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty());

    match lines.next() {
        Some((_, first)) if first.starts_with(HEADER) => {}
        _ => return Err(DecodeError::MissingHeader),
    }

    let mut decoder = PopOnDecoder::default();
    let mut saw_drop = false;
    let mut base: Option<(u64, String)> = None;
    for (line_no, line) in lines {
        let mut tokens = line.split_whitespace();
        let Some(label) = tokens.next() else { continue };
        let tc = Timecode::parse(label)
            .map_err(|source| DecodeError::Timecode { line: line_no, source })?;
        tc.assert_legal_drop_frame(rate)
            .map_err(|source| DecodeError::Timecode { line: line_no, source })?;
        saw_drop |= tc.drop_frame;
        let start = tc
            .to_frames(rate)
            .map_err(|source| DecodeError::Timecode { line: line_no, source })?;
        if base.as_ref().is_none_or(|(frame, _)| start < *frame) {
            base = Some((start, label.to_string()));
        }
        for (i, token) in tokens.enumerate() {
            let word = crate::encoder::EncodedWord::from_hex(token).ok_or_else(|| {
                DecodeError::BadWord { line: line_no, token: token.to_string() }
            })?;
            let (b0, b1) = word.data();
            decoder.word(start + i as u64, b0, b1);
        }
        // Words on separate caption lines are never "consecutive".
        decoder.last_control = None;
    }

    let cues = decoder.finish(rate);
    let row_pair = cues.iter().find_map(|c| {
        let mut rows: Vec<u8> = c.rows.clone();
        rows.sort_unstable();
        rows.dedup();
        (rows.len() >= 2).then(|| (rows[0], rows[1]))
    });
    let (base_frame, base_label) = match base {
        Some((frame, label)) => (frame, Some(label)),
        None => (0, None),
    };
    Ok(DecodedDocument {
        cues,
        frame_rate: rate,
        drop_frame: saw_drop,
        row_pair,
        timecode_base_sec: rate.frames_to_seconds(base_frame),
        timecode_base_label: base_label,
    })
}
