//! CEA-608 caption encoding, decoding and verification for the SCC and
//! MCC interchange formats.
//!
//! The main entry points take a list of [`Cue`]s and an [`SccOptions`]:
//! [`generate_scc`] produces a Scenarist SCC document, [`generate_mcc`]
//! wraps the same caption stream in CDP packets for a MacCaption MCC
//! document, [`decode_scc`] recovers cues from an SCC document, and
//! [`verify_scc`] checks a document without decoding it.

use thiserror::Error;

mod block;
mod cea708;
mod encoder;
mod mcc;
mod scc;
mod scheduler;
mod tables;
mod timecode;
mod verify;

pub use block::{BlockError, CaptionBlock, PlacementAudit};
pub use encoder::{EncodeError, EncodedWord, NULL_WORD};
pub use mcc::MccOutput;
pub use scc::{DecodeError, DecodedCue, DecodedDocument};
pub use scheduler::{EventKind, ScheduleStats, ScheduledEvent};
pub use tables::Channel;
pub use timecode::{FrameRate, Timecode, TimecodeError};
pub use verify::{IssueKind, VerificationIssue, VerificationReport};

/// Errors from caption generation.
#[derive(Error, Debug)]
pub enum CaptionError {
    #[error("cue {index}: {source}")]
    Block {
        index: usize,
        #[source]
        source: BlockError,
    },
    #[error(transparent)]
    Timecode(#[from] TimecodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("drop-frame timecode requires 29.97 or 59.94 fps, got {0}")]
    DropFrameRate(FrameRate),
    #[error("non-drop 29.97 fps output drifts against wall-clock time; set allow_ndf to permit it")]
    NonDropNtsc,
    #[error("start timecode {tc} and options disagree on drop-frame")]
    StartTimecodeMismatch { tc: String, tc_drop: bool, opt_drop: bool },
    #[error("cue {index} starts at {start}s, before the previous cue")]
    UnsortedCues { index: usize, start: f64 },
}

/// One caption event on the input side.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Cue {
    /// Display time in seconds from program start.
    pub start: f64,
    /// Erase time in seconds; defaults to the next cue's start.
    pub end: Option<f64>,
    /// Caption text. `\n` forces a line break; inline `{row:N}`, `{col:N}`,
    /// `{italic}` and `{underline}` tags adjust placement and style.
    pub text: String,
    /// Speaker name, rendered as a `>> NAME: ` prefix on the first line.
    pub speaker: Option<String>,
    /// Pre-wrapped lines; bypasses word wrapping when set.
    pub explicit_lines: Option<Vec<String>>,
    /// Per-line row/column overrides, strongest placement source.
    pub placement_override: Option<Vec<LinePlacement>>,
}

/// Optional per-line placement override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LinePlacement {
    /// 1-based caption row (1-15).
    pub row: Option<u8>,
    /// Leftmost visible column (0-31).
    pub col: Option<u8>,
}

/// Horizontal alignment within the safe-margin-adjusted row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Alignment {
    Left,
    #[default]
    Center,
    Right,
}

/// Which row pair two-line captions occupy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RowPolicy {
    /// Rows 14 and 15, the conventional bottom placement.
    #[default]
    Bottom2,
    /// Rows 13 and 14, one row up.
    Rows13_14,
    /// Rows 12 and 13, clear of lower-third graphics.
    Rows12_13,
}

impl RowPolicy {
    /// The (top, bottom) row pair.
    pub fn rows(self) -> (u8, u8) {
        match self {
            RowPolicy::Bottom2 => (14, 15),
            RowPolicy::Rows13_14 => (13, 14),
            RowPolicy::Rows12_13 => (12, 13),
        }
    }
}

/// Columns kept clear at each edge of the 32-column row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SafeMargins {
    pub left: u8,
    pub right: u8,
}

/// What to do when a cue needs more lines than fit in a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum OverflowPolicy {
    /// Fail generation with the offending cue identified.
    #[default]
    Error,
    /// Keep the leading lines and drop the rest.
    Truncate,
}

/// How aggressively the scheduler may shorten a cue whose caption would
/// otherwise appear late. Each permission unlocks one rung of the
/// mitigation ladder; rungs are applied in declaration order and the
/// first encoding that fits the available frames wins.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LatePolicy {
    pub enabled: bool,
    /// Lateness tolerated before any rung is taken, in seconds.
    pub max_late_sec: f64,
    /// Stop duplicating control and preamble words.
    pub allow_disable_redundancy: bool,
    /// Drop tab offsets and even-padding.
    pub allow_drop_prefix_words: bool,
    /// Drop the `>> NAME: ` speaker prefix.
    pub allow_drop_speaker_prefix: bool,
    /// Trim leading text from the first line.
    pub allow_truncate: bool,
}

impl Default for LatePolicy {
    fn default() -> Self {
        LatePolicy {
            enabled: false,
            max_late_sec: 0.5,
            allow_disable_redundancy: true,
            allow_drop_prefix_words: true,
            allow_drop_speaker_prefix: false,
            allow_truncate: false,
        }
    }
}

/// Generation options shared by the SCC and MCC writers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SccOptions {
    pub frame_rate: FrameRate,
    /// Use drop-frame timecode labels. Only legal at 29.97 and 59.94 fps.
    pub drop_frame: bool,
    /// Permit non-drop labels at 29.97 fps despite the wall-clock drift.
    pub allow_ndf: bool,
    pub channel: Channel,
    pub max_chars_per_line: usize,
    /// Lines per pop-on block, 1 or 2.
    pub max_lines_per_block: usize,
    pub alignment: Alignment,
    pub row_policy: RowPolicy,
    pub safe_margins: SafeMargins,
    pub overflow_policy: OverflowPolicy,
    /// Transmit every control code twice, the transmission-robustness
    /// convention for tape workflows.
    pub repeat_control_codes: bool,
    /// Also transmit preamble address codes twice.
    pub repeat_preamble_codes: bool,
    /// Pad each block to an even word count with null words.
    pub pad_even: bool,
    /// Absolute timecode of program start, e.g. `01:00:00;00`. Cue times
    /// are offsets from it. Defaults to zero.
    pub start_tc: Option<String>,
    /// Transmit `EDM ENM` at the program start to flush decoder memory.
    pub start_reset: bool,
    /// Transmit a final `EDM EDM` at the last cue's end.
    pub end_of_file_erase: bool,
    /// Reject unencodable characters instead of substituting.
    pub strict_characters: bool,
    pub late_eoc_mitigation: LatePolicy,
}

impl Default for SccOptions {
    fn default() -> Self {
        SccOptions {
            frame_rate: FrameRate::F29_97,
            drop_frame: true,
            allow_ndf: false,
            channel: Channel::One,
            max_chars_per_line: 32,
            max_lines_per_block: 2,
            alignment: Alignment::Center,
            row_policy: RowPolicy::Bottom2,
            safe_margins: SafeMargins::default(),
            overflow_policy: OverflowPolicy::Error,
            repeat_control_codes: true,
            repeat_preamble_codes: false,
            pad_even: false,
            start_tc: None,
            start_reset: false,
            end_of_file_erase: true,
            strict_characters: false,
            late_eoc_mitigation: LatePolicy::default(),
        }
    }
}

/// A generated SCC document plus its scheduling statistics.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SccOutput {
    pub text: String,
    pub stats: ScheduleStats,
}

fn validate(opts: &SccOptions) -> Result<(), CaptionError> {
    if opts.drop_frame && !opts.frame_rate.supports_drop_frame() {
        return Err(CaptionError::DropFrameRate(opts.frame_rate));
    }
    if !opts.drop_frame && opts.frame_rate == FrameRate::F29_97 && !opts.allow_ndf {
        return Err(CaptionError::NonDropNtsc);
    }
    Ok(())
}

pub(crate) fn offset_frames(opts: &SccOptions) -> Result<u64, CaptionError> {
    let Some(label) = &opts.start_tc else {
        return Ok(0);
    };
    let tc = Timecode::parse(label)?;
    if tc.drop_frame != opts.drop_frame {
        return Err(CaptionError::StartTimecodeMismatch {
            tc: label.clone(),
            tc_drop: tc.drop_frame,
            opt_drop: opts.drop_frame,
        });
    }
    Ok(tc.to_frames(opts.frame_rate)?)
}

/// Build the scheduled event stream shared by the SCC and MCC writers.
fn build_events(
    cues: &[Cue],
    opts: &SccOptions,
) -> Result<(Vec<ScheduledEvent>, ScheduleStats), CaptionError> {
    validate(opts)?;
    let offset = offset_frames(opts)?;
    let rate = opts.frame_rate;

    let mut timings = Vec::with_capacity(cues.len());
    let mut prev_start = f64::NEG_INFINITY;
    for (index, cue) in cues.iter().enumerate() {
        if cue.start < prev_start {
            return Err(CaptionError::UnsortedCues { index, start: cue.start });
        }
        prev_start = cue.start;
        let display_frame = offset + rate.seconds_to_frames(cue.start);
        // A cue without an end holds until the next cue, or two seconds
        // past its start at the end of the list.
        let end_sec = cue
            .end
            .or_else(|| cues.get(index + 1).map(|n| n.start))
            .unwrap_or(cue.start + 2.0);
        let end_frame = (offset + rate.seconds_to_frames(end_sec)).max(display_frame + 1);
        let variants = block::block_variants(cue, opts)
            .map_err(|source| CaptionError::Block { index, source })?;
        timings.push(scheduler::CueTiming { display_frame, end_frame, variants });
    }

    let sched_opts = scheduler::ScheduleOptions {
        frame_rate: rate,
        channel: opts.channel,
        offset_frames: offset,
        start_reset: opts.start_reset,
        end_of_file_erase: opts.end_of_file_erase,
        mitigation_enabled: opts.late_eoc_mitigation.enabled,
        max_late_sec: opts.late_eoc_mitigation.max_late_sec,
    };
    Ok(scheduler::schedule(&timings, &sched_opts))
}

/// Encode cues into a Scenarist SCC document.
///
/// Cues must be sorted by start time. The output is deterministic: the
/// same cues and options always produce byte-identical text.
pub fn generate_scc(cues: &[Cue], opts: &SccOptions) -> Result<SccOutput, CaptionError> {
    let (events, stats) = build_events(cues, opts)?;
    let text = scc::serialize(&events, opts.frame_rate, opts.drop_frame);
    Ok(SccOutput { text, stats })
}

/// Encode cues into a MacCaption MCC document carrying CDP packets.
///
/// The caption payload is the same CEA-608 stream [`generate_scc`]
/// produces, carried in field 1 of each frame's cc_data alongside 708
/// service 1 padding.
pub fn generate_mcc(cues: &[Cue], opts: &SccOptions) -> Result<MccOutput, CaptionError> {
    let (events, stats) = build_events(cues, opts)?;
    mcc::generate(cues, &events, opts, stats)
}

/// Decode an SCC document back into cues.
///
/// The frame rate cannot be recovered from the text alone; `rate_hint`
/// overrides the 29.97 fps assumption. Drop-frame is detected from the
/// timecode delimiter.
pub fn decode_scc(text: &str, rate_hint: Option<FrameRate>) -> Result<DecodedDocument, CaptionError> {
    Ok(scc::decode(text, rate_hint)?)
}

/// Check an SCC document without decoding captions. Collects every issue
/// up to `max_errors` rather than stopping at the first.
pub fn verify_scc(text: &str, rate_hint: Option<FrameRate>, max_errors: usize) -> VerificationReport {
    verify::verify(text, rate_hint, max_errors)
}

/// Row, indent and column data per line per cue, for preview and QC.
pub fn compute_placement_audit(
    cues: &[Cue],
    opts: &SccOptions,
) -> Result<Vec<Vec<PlacementAudit>>, CaptionError> {
    validate(opts)?;
    cues.iter()
        .enumerate()
        .map(|(index, cue)| {
            block::placement_audit(cue, opts).map_err(|source| CaptionError::Block { index, source })
        })
        .collect()
}
