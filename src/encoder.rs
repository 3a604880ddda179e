//! Character and glyph encoding: visible text to parity-correct words.
//!
//! A caption line goes through three stages here: normalization (whitespace
//! collapse, smart punctuation), inline bracket-tag tokenization, and byte
//! encoding against the CEA-608 character tables. The output is a list of
//! [`EncodedWord`]s whose bytes all carry odd parity.

use crate::tables::{self, Channel, MidRowStyle};
use thiserror::Error;

/// A 16-bit caption word: two 7-bit data bytes, each with an odd-parity
/// 8th bit. The canonical text form is four uppercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EncodedWord(u16);

/// The padding word: two NUL bytes with parity applied.
pub const NULL_WORD: EncodedWord = EncodedWord(0x8080);

impl EncodedWord {
    /// Build a word from two 7-bit data bytes, applying odd parity.
    pub fn from_data(hi: u8, lo: u8) -> EncodedWord {
        EncodedWord(u16::from(tables::add_parity(hi)) << 8 | u16::from(tables::add_parity(lo)))
    }

    /// Wrap a raw 16-bit value without touching parity.
    pub fn from_raw(raw: u16) -> EncodedWord {
        EncodedWord(raw)
    }

    /// Parse the canonical 4-hex-digit form. Parity is preserved as-is.
    pub fn from_hex(s: &str) -> Option<EncodedWord> {
        if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u16::from_str_radix(s, 16).ok().map(EncodedWord)
    }

    pub fn raw(self) -> u16 {
        self.0
    }

    /// High byte with parity bit.
    pub fn hi(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Low byte with parity bit.
    pub fn lo(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// The two 7-bit data bytes with parity stripped.
    pub fn data(self) -> (u8, u8) {
        (tables::strip_parity(self.hi()), tables::strip_parity(self.lo()))
    }

    /// Whether both bytes carry correct odd parity.
    pub fn parity_ok(self) -> bool {
        self.hi().count_ones() % 2 == 1 && self.lo().count_ones() % 2 == 1
    }

    /// True when the word is a two-byte control code (PAC, mid-row, tab,
    /// command or two-byte glyph).
    pub fn is_control(self) -> bool {
        tables::is_control_byte(self.data().0)
    }

    /// Canonical uppercase hex form, e.g. `94AE`.
    pub fn to_hex(self) -> String {
        format!("{:04X}", self.0)
    }
}

impl std::fmt::Display for EncodedWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// Errors from strict-mode character encoding.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("characters not representable in CEA-608: {chars:?}")]
pub struct EncodeError {
    /// The characters with no mapping, in input order, deduplicated.
    pub chars: Vec<char>,
}

/// One token of the inline bracket-tag mini-language.
///
/// Tags are brace-delimited: `{row:14}`, `{col:8}`, `{italic}`, `{yellow}`,
/// `{underline}`. Anything unrecognized stays literal text, as do unmatched
/// braces.
#[derive(Debug, Clone, PartialEq)]
pub enum InlineToken {
    Text(String),
    Style { style: MidRowStyle, underline: bool },
    Row(u8),
    Col(u8),
}

/// Split a line into text runs and recognized inline tags.
pub fn tokenize_inline(line: &str) -> Vec<InlineToken> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut rest = line;
    while let Some(open) = rest.find('{') {
        let Some(close_rel) = rest[open..].find('}') else {
            break;
        };
        let close = open + close_rel;
        let body = &rest[open + 1..close];
        if let Some(token) = parse_tag(body) {
            text.push_str(&rest[..open]);
            if !text.is_empty() {
                tokens.push(InlineToken::Text(std::mem::take(&mut text)));
            }
            tokens.push(token);
        } else {
            // Unknown tag: keep it (braces included) as literal text.
            text.push_str(&rest[..=close]);
        }
        rest = &rest[close + 1..];
    }
    text.push_str(rest);
    if !text.is_empty() {
        tokens.push(InlineToken::Text(text));
    }
    tokens
}

fn parse_tag(body: &str) -> Option<InlineToken> {
    if let Some(value) = body.strip_prefix("row:") {
        let row = value.trim().parse::<u8>().ok()?;
        return (1..=15).contains(&row).then_some(InlineToken::Row(row));
    }
    if let Some(value) = body.strip_prefix("col:") {
        let col = value.trim().parse::<u8>().ok()?;
        return (col <= 31).then_some(InlineToken::Col(col));
    }
    if body == "underline" || body == "u" {
        return Some(InlineToken::Style { style: MidRowStyle::White, underline: true });
    }
    MidRowStyle::from_tag(body).map(|style| InlineToken::Style { style, underline: false })
}

/// Normalize text ahead of encoding: smart punctuation to ASCII, whitespace
/// runs collapsed to single spaces, ends trimmed.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.chars() {
        let mapped: &str = match c {
            '\u{2018}' | '\u{2019}' | '\u{02BC}' | '`' => "'",
            '\u{201C}' | '\u{201D}' => "\"",
            '\u{2013}' | '\u{2014}' | '\u{2212}' => "-",
            '\u{2026}' => "...",
            '\u{00A0}' | '\u{2009}' | '\u{200A}' => " ",
            c if c.is_whitespace() => " ",
            _ => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(c);
                continue;
            }
        };
        if mapped == " " {
            pending_space = true;
        } else {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push_str(mapped);
        }
    }
    out
}

/// The visible column width of a line once tags are stripped and the text
/// normalized. One character per column; two-byte glyphs still occupy one.
pub fn visible_width(line: &str) -> usize {
    tokenize_inline(&normalize(line))
        .iter()
        .map(|t| match t {
            InlineToken::Text(s) => s.chars().count(),
            _ => 0,
        })
        .sum()
}

/// The result of encoding one visible line.
#[derive(Debug, Clone, Default)]
pub struct EncodedLine {
    /// The parity-encoded words for the line's text and mid-row codes.
    pub words: Vec<EncodedWord>,
    /// Characters substituted with spaces under non-strict encoding.
    pub substituted: Vec<char>,
    /// A `{row:N}` override found in the line's markup.
    pub row_tag: Option<u8>,
    /// A `{col:N}` override found in the line's markup.
    pub col_tag: Option<u8>,
}

/// Word-building state: bytes pack into words pairwise, and control codes
/// must start on a word boundary.
struct WordPacker {
    words: Vec<EncodedWord>,
    pending: Option<u8>,
}

impl WordPacker {
    fn new() -> Self {
        WordPacker { words: Vec::new(), pending: None }
    }

    fn push_byte(&mut self, b: u8) {
        match self.pending.take() {
            Some(hi) => self.words.push(EncodedWord::from_data(hi, b)),
            None => self.pending = Some(b),
        }
    }

    /// Complete a half-filled word with a non-printing NUL filler. A visible
    /// space here would corrupt the rendered text, so it is never used.
    fn flush_nul(&mut self) {
        if let Some(hi) = self.pending.take() {
            self.words.push(EncodedWord::from_data(hi, 0x00));
        }
    }

    fn push_pair(&mut self, pair: [u8; 2]) {
        self.flush_nul();
        self.words.push(EncodedWord::from_data(pair[0], pair[1]));
    }

    fn finish(mut self) -> Vec<EncodedWord> {
        self.flush_nul();
        self.words
    }
}

/// Encode one line of visible text into caption words.
///
/// Two-byte glyphs need exactly one overwriteable placeholder column ahead
/// of the glyph code: a pending odd byte is completed with a space, and an
/// already aligned stream gets a transparent-space pair instead. Mid-row
/// style codes split the line into chunks; a chunk ending on an odd byte is
/// padded with a non-printing NUL.
///
/// `strict` fails on characters with no table mapping; otherwise each such
/// character becomes a space and is reported in [`EncodedLine::substituted`].
pub fn encode_line(line: &str, channel: Channel, strict: bool) -> Result<EncodedLine, EncodeError> {
    let mut packer = WordPacker::new();
    let mut out = EncodedLine::default();

    // Normalize the whole line first so whitespace collapse cannot eat
    // spaces that sit against an inline tag.
    for token in tokenize_inline(&normalize(line)) {
        match token {
            InlineToken::Row(row) => out.row_tag = Some(row),
            InlineToken::Col(col) => out.col_tag = Some(col),
            InlineToken::Style { style, underline } => {
                packer.push_pair(tables::mid_row(style, underline, channel));
            }
            InlineToken::Text(text) => {
                for c in text.chars() {
                    if let Some(b) = tables::basic_byte(c) {
                        packer.push_byte(b);
                    } else if let Some([b0, b1]) = tables::two_byte_glyph(c) {
                        if packer.pending.is_some() {
                            packer.push_byte(0x20);
                        } else {
                            packer.push_pair(tables::transparent_space(channel));
                        }
                        packer.push_pair([b0 | channel.data_bit(), b1]);
                    } else {
                        if !out.substituted.contains(&c) {
                            out.substituted.push(c);
                        }
                        packer.push_byte(0x20);
                    }
                }
            }
        }
    }

    if strict && !out.substituted.is_empty() {
        return Err(EncodeError { chars: out.substituted });
    }
    if !out.substituted.is_empty() {
        log::warn!(
            "substituted unsupported characters {:?} in line {:?}",
            out.substituted,
            line
        );
    }
    out.words = packer.finish();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_hex_round_trip() {
        let w = EncodedWord::from_data(0x14, 0x2F);
        assert_eq!(w.to_hex(), "942F");
        assert_eq!(EncodedWord::from_hex("942F"), Some(w));
        assert!(w.parity_ok());
        assert_eq!(w.data(), (0x14, 0x2F));
        assert!(EncodedWord::from_hex("94G0").is_none());
    }

    #[test]
    fn parity_invariant_on_plain_text() {
        let encoded = encode_line("HELLO WORLD", Channel::One, true).unwrap();
        for w in &encoded.words {
            assert!(w.parity_ok(), "word {w} has bad parity");
        }
        // 11 chars pack into 6 words, last padded with NUL.
        assert_eq!(encoded.words.len(), 6);
        assert_eq!(encoded.words[0].data(), (0x48, 0x45));
        assert_eq!(encoded.words[5].data(), (0x44, 0x00));
    }

    #[test]
    fn glyph_placeholder_when_aligned() {
        // Aligned stream: transparent space precedes the glyph pair.
        let encoded = encode_line("♪♪", Channel::One, true).unwrap();
        let data: Vec<_> = encoded.words.iter().map(|w| w.data()).collect();
        assert_eq!(
            data,
            vec![(0x11, 0x39), (0x11, 0x37), (0x11, 0x39), (0x11, 0x37)]
        );
    }

    #[test]
    fn glyph_placeholder_pairs_pending_byte() {
        let encoded = encode_line("Aé", Channel::One, true).unwrap();
        let data: Vec<_> = encoded.words.iter().map(|w| w.data()).collect();
        // 'é' has a basic-set byte, no glyph needed.
        assert_eq!(data, vec![(0x41, 0x5C)]);

        let encoded = encode_line("A«", Channel::One, true).unwrap();
        let data: Vec<_> = encoded.words.iter().map(|w| w.data()).collect();
        // Pending 'A' is completed with a placeholder space, then the glyph.
        assert_eq!(data, vec![(0x41, 0x20), (0x12, 0x3E)]);
    }

    #[test]
    fn mid_row_chunk_pads_with_nul() {
        let encoded = encode_line("ONE {italic}TWO", Channel::One, true).unwrap();
        let data: Vec<_> = encoded.words.iter().map(|w| w.data()).collect();
        assert_eq!(
            data,
            vec![(0x4F, 0x4E), (0x45, 0x20), (0x11, 0x2E), (0x54, 0x57), (0x4F, 0x00)]
        );
    }

    #[test]
    fn placement_tags_are_extracted() {
        let encoded = encode_line("{row:14}{col:8}HI", Channel::One, true).unwrap();
        assert_eq!(encoded.row_tag, Some(14));
        assert_eq!(encoded.col_tag, Some(8));
        assert_eq!(encoded.words.len(), 1);
    }

    #[test]
    fn unknown_tags_stay_literal() {
        let tokens = tokenize_inline("a {bogus} b");
        assert_eq!(tokens, vec![InlineToken::Text("a {bogus} b".into())]);
    }

    #[test]
    fn strict_rejects_unmapped_characters() {
        let err = encode_line("日本語", Channel::One, true).unwrap_err();
        assert_eq!(err.chars, vec!['日', '本', '語']);
        let ok = encode_line("日本語", Channel::One, false).unwrap();
        assert_eq!(ok.substituted, vec!['日', '本', '語']);
        assert_eq!(ok.words.len(), 2);
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize("it\u{2019}s  \u{201C}fine\u{201D}"), "it's \"fine\"");
        assert_eq!(normalize("  a\u{2014}b\u{2026}  "), "a-b...");
    }
}
