//! Pop-on caption block assembly.
//!
//! Builds the full control-code and text word sequence for one cue:
//! `RCL, ENM, (PAC, [TabOffset], text…)+, EOC`, with optional duplicated
//! control words. Also computes the row/column placement that feeds both
//! the preamble codes and the placement audit.

use crate::encoder::{self, EncodedWord, NULL_WORD};
use crate::tables;
use crate::{Alignment, Cue, OverflowPolicy, SccOptions};
use thiserror::Error;

/// Errors raised while laying out or encoding a single cue.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlockError {
    #[error(transparent)]
    Encode(#[from] encoder::EncodeError),
    #[error("text needs {lines} lines but at most {max_lines} of {max_chars} columns fit: {snippet:?}")]
    Overflow {
        lines: usize,
        max_lines: usize,
        max_chars: usize,
        snippet: String,
    },
}

/// The encoded word sequence for one cue.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionBlock {
    /// All words, in transmission order.
    pub words: Vec<EncodedWord>,
    /// Index of the first `EOC` word. Words before it must be transmitted
    /// before the caption can appear, so this is also the lead word count.
    pub eoc_index: usize,
}

impl CaptionBlock {
    /// Frames of transmission needed before the caption becomes visible.
    pub fn lead_frames(&self) -> u64 {
        self.eoc_index as u64
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Per-line placement derived while building a block. Preview/QC data,
/// never authoritative for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlacementAudit {
    /// 1-based caption row.
    pub row: u8,
    /// PAC indent in 4-column steps (0-7).
    pub indent_nibble: u8,
    /// First visible column (0-31), indent plus tab offset.
    pub column_start: u8,
}

/// One wrapped, placed, encoded caption line.
#[derive(Debug, Clone)]
pub(crate) struct LaidLine {
    pub text: String,
    pub words: Vec<EncodedWord>,
    pub row: u8,
    pub column: u8,
    pub substituted: Vec<char>,
}

impl LaidLine {
    pub(crate) fn indent_nibble(&self) -> u8 {
        (self.column / 4).min(7)
    }

    pub(crate) fn tab(&self) -> u8 {
        self.column % 4
    }

    pub(crate) fn audit(&self) -> PlacementAudit {
        PlacementAudit {
            row: self.row,
            indent_nibble: self.indent_nibble(),
            column_start: self.indent_nibble() * 4 + self.tab(),
        }
    }
}

/// Greedy word wrap against the visible (tag-stripped) width.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0;
    for token in text.split_whitespace() {
        let token_width = encoder::visible_width(token);
        let sep = usize::from(!current.is_empty());
        if current_width + sep + token_width > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_width = 0;
        }
        if token_width > width {
            // A single token wider than the row gets hard-split.
            let mut chars = token.chars().peekable();
            while chars.peek().is_some() {
                let chunk: String = chars.by_ref().take(width).collect();
                lines.push(chunk);
            }
            continue;
        }
        if !current.is_empty() {
            current.push(' ');
            current_width += 1;
        }
        current.push_str(token);
        current_width += token_width;
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn usable_width(opts: &SccOptions) -> usize {
    let margins = usize::from(opts.safe_margins.left) + usize::from(opts.safe_margins.right);
    opts.max_chars_per_line.min(32usize.saturating_sub(margins)).max(1)
}

/// Wrap, place and encode a cue's text into lines.
///
/// Column precedence per line: an explicit placement override, then an
/// inline `{col:N}` tag, then the alignment computed against the
/// safe-margin-adjusted width. Row precedence: placement override, then
/// `{row:N}` tag, then the configured row pair.
pub(crate) fn layout_cue(
    cue: &Cue,
    opts: &SccOptions,
    include_speaker: bool,
) -> Result<Vec<LaidLine>, BlockError> {
    let width = usable_width(opts);
    let mut source_lines: Vec<String> = match &cue.explicit_lines {
        Some(lines) => lines.clone(),
        None => cue
            .text
            .split('\n')
            .flat_map(|part| wrap(part, width))
            .collect(),
    };
    if include_speaker {
        if let Some(speaker) = &cue.speaker {
            match source_lines.first_mut() {
                Some(first) => *first = format!(">> {speaker}: {first}"),
                None => source_lines.push(format!(">> {speaker}:")),
            }
            // The prefix may push the first line past the width again.
            if cue.explicit_lines.is_none() {
                let joined = source_lines.join("\n");
                source_lines = joined.split('\n').flat_map(|p| wrap(p, width)).collect();
            }
        }
    }

    let max_lines = opts.max_lines_per_block.clamp(1, 2);
    if source_lines.len() > max_lines {
        match opts.overflow_policy {
            OverflowPolicy::Error => {
                return Err(BlockError::Overflow {
                    lines: source_lines.len(),
                    max_lines,
                    max_chars: width,
                    snippet: snippet(&cue.text),
                });
            }
            OverflowPolicy::Truncate => source_lines.truncate(max_lines),
        }
    }

    let (top_row, bottom_row) = opts.row_policy.rows();
    let count = source_lines.len();
    let mut laid = Vec::with_capacity(count);
    for (i, line) in source_lines.iter().enumerate() {
        let encoded = encoder::encode_line(line, opts.channel, opts.strict_characters)?;
        let override_placement = cue
            .placement_override
            .as_ref()
            .and_then(|p| p.get(i))
            .copied();
        // A single visible line sits on the bottom row of the pair.
        let default_row = if count == 2 && i == 0 { top_row } else { bottom_row };
        let row = override_placement
            .and_then(|p| p.row)
            .or(encoded.row_tag)
            .unwrap_or(default_row)
            .clamp(1, 15);
        let len = encoder::visible_width(line).min(32);
        let left = usize::from(opts.safe_margins.left);
        let aligned = match opts.alignment {
            Alignment::Left => left,
            Alignment::Center => left + (width.saturating_sub(len)) / 2,
            Alignment::Right => left + width.saturating_sub(len),
        };
        let column = override_placement
            .and_then(|p| p.col)
            .or(encoded.col_tag)
            .unwrap_or(aligned.min(31) as u8)
            .min(31);
        laid.push(LaidLine {
            text: line.clone(),
            words: encoded.words,
            row,
            column,
            substituted: encoded.substituted,
        });
    }
    Ok(laid)
}

fn snippet(text: &str) -> String {
    let mut s: String = text.chars().take(40).collect();
    if text.chars().count() > 40 {
        s.push_str("...");
    }
    s
}

/// Knobs the scheduler's mitigation ladder turns while re-encoding a cue.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VariantOptions {
    pub repeat_control_codes: bool,
    pub repeat_preamble_codes: bool,
    /// Tab offsets and even-padding are optional prefix words; dropping
    /// them loses sub-indent precision but shortens the lead.
    pub prefix_words: bool,
    pub include_speaker: bool,
    /// Trim this many leading visible characters from the first line.
    pub truncate_chars: usize,
}

impl VariantOptions {
    pub(crate) fn from_options(opts: &SccOptions) -> Self {
        VariantOptions {
            repeat_control_codes: opts.repeat_control_codes,
            repeat_preamble_codes: opts.repeat_preamble_codes,
            prefix_words: true,
            include_speaker: true,
            truncate_chars: 0,
        }
    }
}

/// Assemble the word sequence for already laid-out lines.
pub(crate) fn assemble(
    lines: &[LaidLine],
    opts: &SccOptions,
    variant: VariantOptions,
) -> CaptionBlock {
    let channel = opts.channel;
    let mut words = Vec::new();
    let mut push_pair = |words: &mut Vec<EncodedWord>, pair: [u8; 2], repeat: bool| {
        let w = EncodedWord::from_data(pair[0], pair[1]);
        words.push(w);
        if repeat {
            words.push(w);
        }
    };
    push_pair(
        &mut words,
        tables::resume_caption_loading(channel),
        variant.repeat_control_codes,
    );
    push_pair(
        &mut words,
        tables::erase_non_displayed(channel),
        variant.repeat_control_codes,
    );
    for line in lines {
        if let Some(pac) = tables::pac(line.row, line.indent_nibble(), false, channel) {
            push_pair(&mut words, pac, variant.repeat_preamble_codes);
        }
        if variant.prefix_words {
            if let Some(tab) = tables::tab_offset(line.tab(), channel) {
                push_pair(&mut words, tab, false);
            }
        }
        words.extend_from_slice(&line.words);
    }
    let eoc_index = words.len();
    push_pair(
        &mut words,
        tables::end_of_caption(channel),
        variant.repeat_control_codes,
    );
    if variant.prefix_words && opts.pad_even && words.len() % 2 == 1 {
        words.push(NULL_WORD);
    }
    CaptionBlock { words, eoc_index }
}

/// Build a cue's block with the configured options.
pub(crate) fn build_block(cue: &Cue, opts: &SccOptions) -> Result<CaptionBlock, BlockError> {
    let lines = layout_cue(cue, opts, true)?;
    Ok(assemble(&lines, opts, VariantOptions::from_options(opts)))
}

/// Build the mitigation ladder for a cue: the preferred block first, then
/// progressively shorter re-encodings in the fixed order the scheduler
/// applies them: disable duplication, drop prefix words, drop the speaker
/// prefix, truncate leading text.
pub(crate) fn block_variants(cue: &Cue, opts: &SccOptions) -> Result<Vec<CaptionBlock>, BlockError> {
    let mitigation = &opts.late_eoc_mitigation;
    let lines = layout_cue(cue, opts, true)?;
    let base = VariantOptions::from_options(opts);
    let mut variants = vec![assemble(&lines, opts, base)];
    if !mitigation.enabled {
        return Ok(variants);
    }

    let mut current = base;
    let mut push = |variants: &mut Vec<CaptionBlock>, block: CaptionBlock| {
        if variants.last().map(|b| b.eoc_index) != Some(block.eoc_index) {
            variants.push(block);
        }
    };
    if mitigation.allow_disable_redundancy {
        current.repeat_control_codes = false;
        current.repeat_preamble_codes = false;
        push(&mut variants, assemble(&lines, opts, current));
    }
    if mitigation.allow_drop_prefix_words {
        current.prefix_words = false;
        push(&mut variants, assemble(&lines, opts, current));
    }
    if mitigation.allow_drop_speaker_prefix && cue.speaker.is_some() {
        current.include_speaker = false;
        let bare = layout_cue(cue, opts, false)?;
        push(&mut variants, assemble(&bare, opts, current));
    }
    if mitigation.allow_truncate {
        // Last resort: shorten the first line from the left in steps until
        // only a handful of characters remain.
        let source = if current.include_speaker {
            lines.clone()
        } else {
            layout_cue(cue, opts, false)?
        };
        if let Some(first) = source.first() {
            let visible = encoder::visible_width(&first.text);
            for keep in [visible * 2 / 3, visible / 3, 4.min(visible)] {
                if keep >= visible || keep == 0 {
                    continue;
                }
                let mut truncated = source.clone();
                let cut: String = first
                    .text
                    .chars()
                    .skip(visible - keep)
                    .collect();
                let encoded = encoder::encode_line(&cut, opts.channel, false)?;
                truncated[0].text = cut;
                truncated[0].words = encoded.words;
                push(&mut variants, assemble(&truncated, opts, current));
            }
        }
    }
    Ok(variants)
}

/// Per-line placement data for every cue, for preview and QC tooling.
pub(crate) fn placement_audit(
    cue: &Cue,
    opts: &SccOptions,
) -> Result<Vec<PlacementAudit>, BlockError> {
    Ok(layout_cue(cue, opts, true)?.iter().map(LaidLine::audit).collect())
}
