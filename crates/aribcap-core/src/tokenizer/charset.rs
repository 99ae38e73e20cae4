//! Graphic sets of the ARIB 8-bit code and their glyph mapping
//!
//! Kana, alphanumerics and the algorithmic rows of the JIS plane are mapped
//! here. Full kanji and additional-symbol tables are static lookup data and
//! plug in through [`GlyphTable`].

/// U+3013 GETA MARK, shown for glyphs with no mapping
pub const GETA: char = '\u{3013}';

/// Ideographic space, used for SP
pub const IDEOGRAPHIC_SPACE: char = '\u{3000}';

/// First Private Use Area codepoint for additional symbols
const PUA_BASE: u32 = 0xE000;
/// First row of the additional symbols with no Unicode counterpart
const PUA_FIRST_ROW: u8 = 90;

/// A graphic set that can be designated to G0..G3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphicSet {
    Kanji,
    Alphanumeric,
    Hiragana,
    Katakana,
    /// Mosaic A..D as 0..=3
    Mosaic(u8),
    ProportionalAlphanumeric,
    ProportionalHiragana,
    ProportionalKatakana,
    JisX0201Katakana,
    /// Latin-1 supplement of the SBTVD profile
    LatinExtension,
    JisKanjiPlane1,
    JisKanjiPlane2,
    AdditionalSymbols,
    /// DRCS-0 (two-byte) .. DRCS-15
    Drcs(u8),
    Macro,
}

impl GraphicSet {
    /// Bytes per character
    pub fn width(&self) -> usize {
        match self {
            GraphicSet::Kanji
            | GraphicSet::JisKanjiPlane1
            | GraphicSet::JisKanjiPlane2
            | GraphicSet::AdditionalSymbols
            | GraphicSet::Drcs(0) => 2,
            _ => 1,
        }
    }

    /// One-byte set from the final byte of `ESC ( F`
    pub fn single(final_byte: u8) -> Option<Self> {
        Some(match final_byte {
            0x4A => GraphicSet::Alphanumeric,
            0x30 => GraphicSet::Hiragana,
            0x31 => GraphicSet::Katakana,
            f @ 0x32..=0x35 => GraphicSet::Mosaic(f - 0x32),
            0x36 => GraphicSet::ProportionalAlphanumeric,
            0x37 => GraphicSet::ProportionalHiragana,
            0x38 => GraphicSet::ProportionalKatakana,
            0x49 => GraphicSet::JisX0201Katakana,
            _ => return None,
        })
    }

    /// Two-byte set from the final byte of `ESC $ F`
    pub fn double(final_byte: u8) -> Option<Self> {
        Some(match final_byte {
            0x42 => GraphicSet::Kanji,
            0x39 => GraphicSet::JisKanjiPlane1,
            0x3A => GraphicSet::JisKanjiPlane2,
            0x3B => GraphicSet::AdditionalSymbols,
            _ => return None,
        })
    }

    /// One-byte DRCS set from the final byte of `ESC ( SP F`
    pub fn drcs_single(final_byte: u8) -> Option<Self> {
        match final_byte {
            f @ 0x41..=0x4F => Some(GraphicSet::Drcs(f - 0x40)),
            0x70 => Some(GraphicSet::Macro),
            _ => None,
        }
    }

    /// Two-byte DRCS set from the final byte of `ESC $ ( SP F`
    pub fn drcs_double(final_byte: u8) -> Option<Self> {
        (final_byte == 0x40).then_some(GraphicSet::Drcs(0))
    }
}

/// Static lookup of two-byte codes that have no algorithmic mapping
pub trait GlyphTable: Send + Sync {
    /// Map `row`/`cell` (both 1..=94) of a two-byte set to a codepoint
    fn lookup(&self, set: GraphicSet, row: u8, cell: u8) -> Option<char>;
}

/// Table holding only the algorithmic JIS rows
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicGlyphTable;

impl GlyphTable for BasicGlyphTable {
    fn lookup(&self, set: GraphicSet, row: u8, cell: u8) -> Option<char> {
        match set {
            GraphicSet::Kanji | GraphicSet::JisKanjiPlane1 => jis_row(row, cell),
            _ => None,
        }
    }
}

fn jis_row(row: u8, cell: u8) -> Option<char> {
    let codepoint = match (row, cell) {
        (1, 1) => 0x3000,
        (1, 2) => 0x3001,
        (1, 3) => 0x3002,
        (1, 4) => 0xFF0C,
        (1, 5) => 0xFF0E,
        (1, 6) => 0x30FB,
        (1, 7) => 0xFF1A,
        (1, 8) => 0xFF1B,
        (1, 9) => 0xFF1F,
        (1, 10) => 0xFF01,
        (1, 28) => 0x30FC,
        (1, 42) => 0xFF08,
        (1, 43) => 0xFF09,
        (1, c @ 54..=59) => 0x300C + u32::from(c - 54),
        // full-width digits and latin letters
        (3, c @ (16..=25 | 33..=58 | 65..=90)) => 0xFF00 + u32::from(c),
        (4, c @ 1..=83) => 0x3040 + u32::from(c),
        (5, c @ 1..=86) => 0x30A0 + u32::from(c),
        _ => return None,
    };
    char::from_u32(codepoint)
}

/// Private Use Area codepoint of an additional symbol
pub fn additional_symbol_pua(row: u8, cell: u8) -> Option<char> {
    if !(PUA_FIRST_ROW..=94).contains(&row) || !(1..=94).contains(&cell) {
        return None;
    }
    let index = u32::from(row - PUA_FIRST_ROW) * 94 + u32::from(cell - 1);
    char::from_u32(PUA_BASE + index)
}

/// Map a code of a one-byte set (0x21..=0x7E)
pub fn single_byte(set: GraphicSet, code: u8) -> Option<char> {
    match set {
        GraphicSet::Alphanumeric | GraphicSet::ProportionalAlphanumeric => match code {
            0x5C => Some('\u{00A5}'),
            0x7E => Some('\u{203E}'),
            c @ 0x21..=0x7D => Some(char::from(c)),
            _ => None,
        },
        GraphicSet::Hiragana | GraphicSet::ProportionalHiragana => match code {
            c @ 0x21..=0x73 => char::from_u32(0x3041 + u32::from(c - 0x21)),
            0x77 => Some('\u{309D}'),
            0x78 => Some('\u{309E}'),
            c => kana_punctuation(c),
        },
        GraphicSet::Katakana | GraphicSet::ProportionalKatakana => match code {
            c @ 0x21..=0x76 => char::from_u32(0x30A1 + u32::from(c - 0x21)),
            0x77 => Some('\u{30FD}'),
            0x78 => Some('\u{30FE}'),
            c => kana_punctuation(c),
        },
        GraphicSet::JisX0201Katakana => match code {
            c @ 0x21..=0x5F => char::from_u32(0xFF61 + u32::from(c - 0x21)),
            _ => None,
        },
        GraphicSet::LatinExtension => match code {
            c @ 0x21..=0x7E => char::from_u32(0x80 + u32::from(c)),
            _ => None,
        },
        _ => None,
    }
}

fn kana_punctuation(code: u8) -> Option<char> {
    match code {
        0x79 => Some('\u{30FC}'),
        0x7A => Some('\u{3002}'),
        0x7B => Some('\u{300C}'),
        0x7C => Some('\u{300D}'),
        0x7D => Some('\u{3001}'),
        0x7E => Some('\u{30FB}'),
        _ => None,
    }
}
