//! Constant CEA-608 byte tables.
//!
//! Everything here is read-only data: the basic character set, the two-byte
//! special/extended glyph tables, preamble address codes, miscellaneous
//! control codes and the odd-parity helpers. No table is mutated at runtime.

/// The CEA-608 caption channel the generated words are addressed to.
///
/// Channels 2 and 4 set the 0x08 bit on the first byte of every control
/// code. The field distinction between 1/2 and 3/4 is not representable in
/// SCC words and only matters for carriage outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Channel {
    /// CC1 (field 1, data channel 1)
    One,
    /// CC2 (field 1, data channel 2)
    Two,
    /// CC3 (field 2, data channel 1)
    Three,
    /// CC4 (field 2, data channel 2)
    Four,
}

impl Default for Channel {
    fn default() -> Self {
        Channel::One
    }
}

impl Channel {
    /// Construct a channel from its 1-based number.
    pub fn from_number(n: u8) -> Option<Channel> {
        match n {
            1 => Some(Channel::One),
            2 => Some(Channel::Two),
            3 => Some(Channel::Three),
            4 => Some(Channel::Four),
            _ => None,
        }
    }

    /// The bit OR-ed into byte 0 of control codes for this channel.
    pub(crate) fn data_bit(self) -> u8 {
        match self {
            Channel::One | Channel::Three => 0x00,
            Channel::Two | Channel::Four => 0x08,
        }
    }
}

/// A mid-row style change: one of the seven colors or italics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MidRowStyle {
    White,
    Green,
    Blue,
    Cyan,
    Red,
    Yellow,
    Magenta,
    Italics,
}

impl MidRowStyle {
    /// Parse the bracket-tag name used in inline markup, e.g. `{italic}`.
    pub(crate) fn from_tag(tag: &str) -> Option<MidRowStyle> {
        match tag {
            "white" => Some(MidRowStyle::White),
            "green" => Some(MidRowStyle::Green),
            "blue" => Some(MidRowStyle::Blue),
            "cyan" => Some(MidRowStyle::Cyan),
            "red" => Some(MidRowStyle::Red),
            "yellow" => Some(MidRowStyle::Yellow),
            "magenta" => Some(MidRowStyle::Magenta),
            "italic" | "italics" | "i" => Some(MidRowStyle::Italics),
            _ => None,
        }
    }

    fn offset(self) -> u8 {
        match self {
            MidRowStyle::White => 0x00,
            MidRowStyle::Green => 0x02,
            MidRowStyle::Blue => 0x04,
            MidRowStyle::Cyan => 0x06,
            MidRowStyle::Red => 0x08,
            MidRowStyle::Yellow => 0x0a,
            MidRowStyle::Magenta => 0x0c,
            MidRowStyle::Italics => 0x0e,
        }
    }
}

/// Returns true when the 7-bit byte already has an odd number of set bits.
pub(crate) fn check_odd_parity(byte: u8) -> bool {
    byte.count_ones() % 2 == 1
}

/// Set the 8th bit so the byte has odd parity.
pub(crate) fn add_parity(byte: u8) -> u8 {
    debug_assert!(byte & 0x80 == 0);
    if check_odd_parity(byte) { byte } else { byte | 0x80 }
}

/// Drop the parity bit, leaving the 7 data bits.
pub(crate) fn strip_parity(byte: u8) -> u8 {
    byte & 0x7F
}

/// The ten byte values of the basic set that do not render as their ASCII
/// glyph, paired with the character they render instead.
static BASIC_SUBSTITUTIONS: [(u8, char); 10] = [
    (0x2A, 'á'),
    (0x5C, 'é'),
    (0x5E, 'í'),
    (0x5F, 'ó'),
    (0x60, 'ú'),
    (0x7B, 'ç'),
    (0x7C, '÷'),
    (0x7D, 'Ñ'),
    (0x7E, 'ñ'),
    (0x7F, '█'),
];

/// Encode a character as a single basic-set byte, if it has one.
pub(crate) fn basic_byte(c: char) -> Option<u8> {
    if let Some(&(byte, _)) = BASIC_SUBSTITUTIONS.iter().find(|(_, ch)| *ch == c) {
        return Some(byte);
    }
    let b = u32::from(c);
    if (0x20..0x7F).contains(&b) && !BASIC_SUBSTITUTIONS.iter().any(|(sub, _)| u32::from(*sub) == b)
    {
        Some(b as u8)
    } else {
        None
    }
}

/// Decode a basic-set byte back to its rendered character.
pub(crate) fn basic_char(byte: u8) -> Option<char> {
    if let Some(&(_, ch)) = BASIC_SUBSTITUTIONS.iter().find(|(b, _)| *b == byte) {
        return Some(ch);
    }
    if (0x20..0x7F).contains(&byte) {
        Some(byte as char)
    } else {
        None
    }
}

struct TwoByteGlyph {
    bytes: [u8; 2],
    ch: char,
}

macro_rules! glyph {
    ($b0:expr, $b1:expr, $ch:expr) => {
        TwoByteGlyph { bytes: [$b0, $b1], ch: $ch }
    };
}

/// Special character set (0x11 0x30-0x3F). 0x11 0x39 is the transparent
/// space and is handled separately, not via this table.
static SPECIAL_GLYPHS: [TwoByteGlyph; 15] = [
    glyph!(0x11, 0x30, '®'),
    glyph!(0x11, 0x31, '°'),
    glyph!(0x11, 0x32, '½'),
    glyph!(0x11, 0x33, '¿'),
    glyph!(0x11, 0x34, '™'),
    glyph!(0x11, 0x35, '¢'),
    glyph!(0x11, 0x36, '£'),
    glyph!(0x11, 0x37, '♪'),
    glyph!(0x11, 0x38, 'à'),
    glyph!(0x11, 0x3A, 'è'),
    glyph!(0x11, 0x3B, 'â'),
    glyph!(0x11, 0x3C, 'ê'),
    glyph!(0x11, 0x3D, 'î'),
    glyph!(0x11, 0x3E, 'ô'),
    glyph!(0x11, 0x3F, 'û'),
];

/// Extended Western European character sets (0x12/0x13 0x20-0x3F). These
/// also carry the ASCII codepoints displaced by the basic substitutions
/// (asterisk, backslash, caret, underscore, braces, pipe, tilde).
static EXTENDED_GLYPHS: [TwoByteGlyph; 64] = [
    glyph!(0x12, 0x20, 'Á'),
    glyph!(0x12, 0x21, 'É'),
    glyph!(0x12, 0x22, 'Ó'),
    glyph!(0x12, 0x23, 'Ú'),
    glyph!(0x12, 0x24, 'Ü'),
    glyph!(0x12, 0x25, 'ü'),
    glyph!(0x12, 0x26, '´'),
    glyph!(0x12, 0x27, '¡'),
    glyph!(0x12, 0x28, '*'),
    glyph!(0x12, 0x29, '‛'),
    glyph!(0x12, 0x2A, '—'),
    glyph!(0x12, 0x2B, '©'),
    glyph!(0x12, 0x2C, '℠'),
    glyph!(0x12, 0x2D, '•'),
    glyph!(0x12, 0x2E, '“'),
    glyph!(0x12, 0x2F, '”'),
    glyph!(0x12, 0x30, 'À'),
    glyph!(0x12, 0x31, 'Â'),
    glyph!(0x12, 0x32, 'Ç'),
    glyph!(0x12, 0x33, 'È'),
    glyph!(0x12, 0x34, 'Ê'),
    glyph!(0x12, 0x35, 'Ë'),
    glyph!(0x12, 0x36, 'ë'),
    glyph!(0x12, 0x37, 'Î'),
    glyph!(0x12, 0x38, 'Ï'),
    glyph!(0x12, 0x39, 'ï'),
    glyph!(0x12, 0x3A, 'Ô'),
    glyph!(0x12, 0x3B, 'Ù'),
    glyph!(0x12, 0x3C, 'ù'),
    glyph!(0x12, 0x3D, 'Û'),
    glyph!(0x12, 0x3E, '«'),
    glyph!(0x12, 0x3F, '»'),
    glyph!(0x13, 0x20, 'Ã'),
    glyph!(0x13, 0x21, 'ã'),
    glyph!(0x13, 0x22, 'Í'),
    glyph!(0x13, 0x23, 'Ì'),
    glyph!(0x13, 0x24, 'ì'),
    glyph!(0x13, 0x25, 'Ò'),
    glyph!(0x13, 0x26, 'ò'),
    glyph!(0x13, 0x27, 'Õ'),
    glyph!(0x13, 0x28, 'õ'),
    glyph!(0x13, 0x29, '{'),
    glyph!(0x13, 0x2A, '}'),
    glyph!(0x13, 0x2B, '\\'),
    glyph!(0x13, 0x2C, '^'),
    glyph!(0x13, 0x2D, '_'),
    glyph!(0x13, 0x2E, '|'),
    glyph!(0x13, 0x2F, '~'),
    glyph!(0x13, 0x30, 'Ä'),
    glyph!(0x13, 0x31, 'ä'),
    glyph!(0x13, 0x32, 'Ö'),
    glyph!(0x13, 0x33, 'ö'),
    glyph!(0x13, 0x34, 'ß'),
    glyph!(0x13, 0x35, '¥'),
    glyph!(0x13, 0x36, '¤'),
    glyph!(0x13, 0x37, '¦'),
    glyph!(0x13, 0x38, 'Å'),
    glyph!(0x13, 0x39, 'å'),
    glyph!(0x13, 0x3A, 'Ø'),
    glyph!(0x13, 0x3B, 'ø'),
    glyph!(0x13, 0x3C, '⌜'),
    glyph!(0x13, 0x3D, '⌝'),
    glyph!(0x13, 0x3E, '⌞'),
    glyph!(0x13, 0x3F, '⌟'),
];

/// Encode a character as a two-byte special/extended glyph, if it has one.
pub(crate) fn two_byte_glyph(c: char) -> Option<[u8; 2]> {
    SPECIAL_GLYPHS
        .iter()
        .chain(EXTENDED_GLYPHS.iter())
        .find(|g| g.ch == c)
        .map(|g| g.bytes)
}

/// Decode a two-byte glyph code back to its character.
///
/// Takes 7-bit data bytes with the channel bit already cleared.
pub(crate) fn glyph_char(b0: u8, b1: u8) -> Option<char> {
    SPECIAL_GLYPHS
        .iter()
        .chain(EXTENDED_GLYPHS.iter())
        .find(|g| g.bytes == [b0, b1])
        .map(|g| g.ch)
}

/// The transparent space control pair. Occupies one column without drawing
/// anything; used as the overwriteable placeholder ahead of two-byte glyphs
/// when the byte stream is word-aligned.
pub(crate) fn transparent_space(channel: Channel) -> [u8; 2] {
    [0x11 | channel.data_bit(), 0x39]
}

pub(crate) fn resume_caption_loading(channel: Channel) -> [u8; 2] {
    [0x14 | channel.data_bit(), 0x20]
}

pub(crate) fn erase_non_displayed(channel: Channel) -> [u8; 2] {
    [0x14 | channel.data_bit(), 0x2E]
}

pub(crate) fn erase_displayed(channel: Channel) -> [u8; 2] {
    [0x14 | channel.data_bit(), 0x2C]
}

pub(crate) fn end_of_caption(channel: Channel) -> [u8; 2] {
    [0x14 | channel.data_bit(), 0x2F]
}

/// Tab offset control code moving the cursor 1-3 columns right.
pub(crate) fn tab_offset(n: u8, channel: Channel) -> Option<[u8; 2]> {
    if (1..=3).contains(&n) {
        Some([0x17 | channel.data_bit(), 0x20 + n])
    } else {
        None
    }
}

/// Mid-row style change control code.
pub(crate) fn mid_row(style: MidRowStyle, underline: bool, channel: Channel) -> [u8; 2] {
    let u = if underline { 0x01 } else { 0x00 };
    [0x11 | channel.data_bit(), 0x20 + style.offset() + u]
}

/// Byte-0/byte-1 bases of the preamble address code for each row (1-15).
static PAC_ROW_CODES: [(u8, u8); 15] = [
    (0x11, 0x40),
    (0x11, 0x60),
    (0x12, 0x40),
    (0x12, 0x60),
    (0x15, 0x40),
    (0x15, 0x60),
    (0x16, 0x40),
    (0x16, 0x60),
    (0x17, 0x40),
    (0x17, 0x60),
    (0x10, 0x40),
    (0x13, 0x40),
    (0x13, 0x60),
    (0x14, 0x40),
    (0x14, 0x60),
];

/// Encode a preamble address code for a 1-based row and an indent nibble
/// (0-7, i.e. column / 4).
///
/// Always uses the indent-style second-byte range so the indentation is
/// recoverable on decode for every row, including rows whose plain base
/// codes carry color instead of indent.
pub(crate) fn pac(row: u8, indent_nibble: u8, underline: bool, channel: Channel) -> Option<[u8; 2]> {
    if !(1..=15).contains(&row) || indent_nibble > 7 {
        return None;
    }
    let (b0, base) = PAC_ROW_CODES[(row - 1) as usize];
    let u = if underline { 0x01 } else { 0x00 };
    Some([b0 | channel.data_bit(), base | 0x10 | (indent_nibble << 1) | u])
}

/// The row, indent and styling recovered from a preamble address code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PacInfo {
    /// 1-based row.
    pub row: u8,
    /// Starting column (0-28, multiples of 4). Zero for color preambles.
    pub column: u8,
    pub underline: bool,
    pub italics: bool,
}

/// Decode a preamble address code from 7-bit data bytes (channel bit
/// already cleared from byte 0).
pub(crate) fn pac_decode(b0: u8, b1: u8) -> Option<PacInfo> {
    if !(0x40..=0x7F).contains(&b1) {
        return None;
    }
    let base = b1 & 0x60;
    let row = PAC_ROW_CODES
        .iter()
        .position(|&(rb0, rbase)| rb0 == b0 && rbase == base)
        .map(|i| i as u8 + 1)?;
    let ty = b1 & 0x1E;
    let underline = b1 & 0x01 != 0;
    let (column, italics) = if ty >= 0x10 {
        (((ty - 0x10) >> 1) * 4, false)
    } else {
        (0, ty == 0x0E)
    };
    Some(PacInfo { row, column, underline, italics })
}

/// True when a 7-bit data byte 0 marks a two-byte control code.
pub(crate) fn is_control_byte(b0: u8) -> bool {
    (0x10..=0x1F).contains(&b0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_helpers() {
        assert_eq!(add_parity(0x43), 0x43); // 'C' already odd
        assert_eq!(add_parity(0x41), 0xC1); // 'A' even, bit added
        assert!(check_odd_parity(0xC1));
        assert_eq!(strip_parity(0xC1), 0x41);
    }

    #[test]
    fn basic_set_substitutions() {
        assert_eq!(basic_byte('A'), Some(0x41));
        assert_eq!(basic_byte('á'), Some(0x2A));
        assert_eq!(basic_byte('*'), None);
        assert_eq!(basic_char(0x2A), Some('á'));
        assert_eq!(basic_char(0x41), Some('A'));
    }

    #[test]
    fn displaced_ascii_uses_extended_set() {
        assert_eq!(two_byte_glyph('*'), Some([0x12, 0x28]));
        assert_eq!(two_byte_glyph('_'), Some([0x13, 0x2D]));
        assert_eq!(glyph_char(0x11, 0x37), Some('♪'));
    }

    #[test]
    fn pac_round_trip() {
        let code = pac(14, 3, false, Channel::One).unwrap();
        assert_eq!(code, [0x14, 0x56]);
        let info = pac_decode(code[0], code[1]).unwrap();
        assert_eq!(info.row, 14);
        assert_eq!(info.column, 12);
        assert!(!info.underline);
    }

    #[test]
    fn pac_row15_channel2() {
        let code = pac(15, 0, false, Channel::Two).unwrap();
        assert_eq!(code, [0x1C, 0x70]);
        assert_eq!(pac_decode(0x14, 0x70).unwrap().row, 15);
    }

    #[test]
    fn control_codes_channel_bit() {
        assert_eq!(resume_caption_loading(Channel::One), [0x14, 0x20]);
        assert_eq!(resume_caption_loading(Channel::Two), [0x1C, 0x20]);
        assert_eq!(tab_offset(2, Channel::One), Some([0x17, 0x22]));
        assert_eq!(tab_offset(4, Channel::One), None);
    }
}
