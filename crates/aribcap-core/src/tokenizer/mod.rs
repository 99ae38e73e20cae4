//! 8-bit code tokenizer for caption statement bodies
//!
//! Decodes the ARIB code structure: G0..G3 designation, locking and single
//! shifts, C0/C1 control functions, CSI sequences and TIME. Every control
//! function consumes its declared parameter bytes even when the parameter
//! values are not understood, so a bad code never shifts the tokens after it.
//! A sequence cut short by the end of input ends the stream.

pub mod charset;
pub mod token;

use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::{Association, TokenizerConfig};
use crate::transport::drcs::{DrcsRef, DrcsTable};
use crate::transport::pes::DataUnit;
use crate::types::CharSize;

pub use charset::{BasicGlyphTable, GlyphTable, GraphicSet, GETA};
pub use token::{total_wait, Character, ControlCode, Token};

const MAX_CSI_PARAMS: usize = 4;

/// Designations and invocations a statement starts with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CodeState {
    g: [GraphicSet; 4],
    gl: usize,
    gr: usize,
}

impl CodeState {
    fn initial(association: Association) -> Self {
        match association {
            Association::Arib => Self {
                g: [
                    GraphicSet::Kanji,
                    GraphicSet::Alphanumeric,
                    GraphicSet::Hiragana,
                    GraphicSet::Macro,
                ],
                gl: 0,
                gr: 2,
            },
            Association::Sbtvd => Self {
                g: [
                    GraphicSet::Alphanumeric,
                    GraphicSet::Alphanumeric,
                    GraphicSet::LatinExtension,
                    GraphicSet::Macro,
                ],
                gl: 0,
                gr: 2,
            },
        }
    }
}

/// Stateless tokenizer for one character-set profile
#[derive(Clone)]
pub struct Tokenizer {
    association: Association,
    config: TokenizerConfig,
    glyphs: Arc<dyn GlyphTable>,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("association", &self.association)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Tokenizer {
    pub fn new(association: Association, config: TokenizerConfig) -> Self {
        Self {
            association,
            config,
            glyphs: Arc::new(BasicGlyphTable),
        }
    }

    /// Japanese JIS8 profile
    pub fn japanese(config: TokenizerConfig) -> Self {
        Self::new(Association::Arib, config)
    }

    /// Replace the two-byte glyph lookup
    pub fn with_glyph_table(mut self, glyphs: Arc<dyn GlyphTable>) -> Self {
        self.glyphs = glyphs;
        self
    }

    pub fn association(&self) -> Association {
        self.association
    }

    /// Tokenize one statement body
    pub fn tokenize(&self, bytes: &[u8]) -> Vec<Token> {
        let mut decoder = Decoder::new(self);
        decoder.run(bytes);
        decoder.tokens
    }

    /// Tokenize the data units of a caption statement
    ///
    /// Glyphs of all DRCS units are bound first, followed by the tokens of
    /// every statement unit in order. Code state and TIME waits carry over
    /// from one statement unit to the next.
    pub fn tokenize_units(&self, units: &[DataUnit]) -> Vec<Token> {
        let mut drcs = DrcsTable::new();
        let mut bodies = Vec::new();

        for unit in units {
            match unit {
                DataUnit::Statement(body) => bodies.push(body),
                DataUnit::Drcs { two_byte, data } => {
                    if !drcs.load(data, *two_byte) {
                        debug!(len = data.len(), "Malformed DRCS unit, keeping parsed glyphs");
                    }
                }
                DataUnit::Geometric(_)
                | DataUnit::SynthesizedSound(_)
                | DataUnit::Colormap(_)
                | DataUnit::Bitmap(_) => trace!("Skipping non-text data unit"),
            }
        }

        let mut decoder = Decoder::new(self);
        if !drcs.is_empty() {
            decoder.push_control(ControlCode::BindDrcs(Arc::new(drcs)));
        }
        for body in bodies {
            decoder.run(body);
        }
        decoder.tokens
    }
}

struct Decoder<'t, 'a> {
    tokenizer: &'t Tokenizer,
    input: &'a [u8],
    pos: usize,
    code: CodeState,
    /// Accumulated TIME wait in tenths of a second
    wait: u32,
    tokens: Vec<Token>,
}

impl<'t, 'a> Decoder<'t, 'a> {
    fn new(tokenizer: &'t Tokenizer) -> Self {
        Self {
            tokenizer,
            input: &[],
            pos: 0,
            code: CodeState::initial(tokenizer.association),
            wait: 0,
            tokens: Vec::new(),
        }
    }

    fn run(&mut self, input: &'a [u8]) {
        self.input = input;
        self.pos = 0;
        self.tokens.reserve(input.len());

        while let Some(byte) = self.next() {
            if self.step(byte).is_none() {
                debug!(offset = self.pos, "Statement ends inside a control sequence");
                break;
            }
        }
    }

    fn next(&mut self) -> Option<u8> {
        let byte = *self.input.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn push_control(&mut self, code: ControlCode) {
        self.tokens.push(Token::Control(code));
    }

    fn push_character(&mut self, character: Character) {
        self.tokens.push(Token::Character(character));
    }

    /// Handle one code; `None` when its parameters run past the input
    fn step(&mut self, byte: u8) -> Option<()> {
        match byte {
            0x00 => self.push_control(ControlCode::Null),
            0x07 => self.push_control(ControlCode::Bell),
            0x08 => self.push_control(ControlCode::ActivePositionBackward),
            0x09 => self.push_control(ControlCode::ActivePositionForward),
            0x0A => self.push_control(ControlCode::ActivePositionDown),
            0x0B => self.push_control(ControlCode::ActivePositionUp),
            0x0C => self.tokens.push(Token::ClearScreen {
                time: f64::from(self.wait) / 10.0,
            }),
            0x0D => self.push_control(ControlCode::ActivePositionReturn),
            // LS1 / LS0
            0x0E => self.code.gl = 1,
            0x0F => self.code.gl = 0,
            0x16 => {
                let p = self.next()?;
                self.push_control(ControlCode::ParameterizedForward(p & 0x3F));
            }
            0x18 => self.push_control(ControlCode::Cancel),
            // SS2 / SS3
            0x19 => self.single_shift(2)?,
            0x1D => self.single_shift(3)?,
            0x1B => self.escape()?,
            0x1C => {
                let row = self.next()? & 0x3F;
                let column = self.next()? & 0x3F;
                self.push_control(ControlCode::ActivePositionSet { row, column });
            }
            0x1E => self.push_control(ControlCode::RecordSeparator),
            0x1F => self.push_control(ControlCode::UnitSeparator),
            0x20 => {
                let space = match self.tokenizer.association {
                    Association::Arib => charset::IDEOGRAPHIC_SPACE,
                    Association::Sbtvd => ' ',
                };
                self.push_character(Character::new(space));
            }
            0x7F => self.push_control(ControlCode::Delete),
            0x21..=0x7E => self.graphic(self.code.g[self.code.gl], byte)?,
            0x80..=0x87 => self.push_control(ControlCode::Foreground(byte - 0x80)),
            0x88 => self.push_control(ControlCode::CharacterSize(CharSize::Small)),
            0x89 => self.push_control(ControlCode::CharacterSize(CharSize::Medium)),
            0x8A => self.push_control(ControlCode::CharacterSize(CharSize::Normal)),
            0x8B => {
                let size = match self.next()? {
                    0x60 => Some(CharSize::Tiny),
                    0x41 => Some(CharSize::DoubleHeight),
                    0x44 => Some(CharSize::DoubleWidth),
                    0x45 => Some(CharSize::DoubleSize),
                    p => {
                        trace!(p, "Unsupported SZX");
                        None
                    }
                };
                if let Some(size) = size {
                    self.push_control(ControlCode::CharacterSize(size));
                }
            }
            0x90 => self.color()?,
            0x91 => {
                let p = self.next()?;
                self.push_control(ControlCode::Flashing(p));
            }
            0x92 => {
                let p = self.next()?;
                if p == 0x20 {
                    self.next()?;
                    self.push_control(ControlCode::Conceal(true));
                } else {
                    self.push_control(ControlCode::Conceal(p == 0x40));
                }
            }
            // POL, WMM
            0x93 | 0x94 => {
                let p = self.next()?;
                trace!(code = byte, p, "Unsupported control function");
            }
            0x95 => self.macro_definition()?,
            0x97 => {
                let p = self.next()?;
                self.push_control(ControlCode::Highlight(p & 0x0F));
            }
            0x98 => {
                let p = self.next()?;
                self.tokens.push(Token::Repeat { count: p & 0x3F });
            }
            0x99 => self.push_control(ControlCode::Underline(false)),
            0x9A => self.push_control(ControlCode::Underline(true)),
            0x9B => self.csi()?,
            0x9D => self.time()?,
            0xA1..=0xFE => self.graphic(self.code.g[self.code.gr], byte & 0x7F)?,
            _ => trace!(code = byte, "Unsupported code"),
        }
        Some(())
    }

    fn single_shift(&mut self, slot: usize) -> Option<()> {
        let byte = self.next()? & 0x7F;
        if (0x21..=0x7E).contains(&byte) {
            self.graphic(self.code.g[slot], byte)?;
        } else {
            trace!(byte, "Single shift without a graphic character");
        }
        Some(())
    }

    fn designate(&mut self, slot: u8, set: Option<GraphicSet>) {
        match set {
            Some(set) => self.code.g[usize::from(slot)] = set,
            None => trace!(slot, "Unsupported designation"),
        }
    }

    fn escape(&mut self) -> Option<()> {
        match self.next()? {
            // LS2, LS3, LS1R, LS2R, LS3R
            0x6E => self.code.gl = 2,
            0x6F => self.code.gl = 3,
            0x7E => self.code.gr = 1,
            0x7D => self.code.gr = 2,
            0x7C => self.code.gr = 3,
            b @ 0x28..=0x2B => {
                let set = match self.next()? {
                    0x20 => GraphicSet::drcs_single(self.next()?),
                    f => GraphicSet::single(f),
                };
                self.designate(b - 0x28, set);
            }
            0x24 => match self.next()? {
                b @ 0x28..=0x2B => {
                    let set = match self.next()? {
                        0x20 => GraphicSet::drcs_double(self.next()?),
                        f => GraphicSet::double(f),
                    };
                    self.designate(b - 0x28, set);
                }
                f => self.designate(0, GraphicSet::double(f)),
            },
            b => trace!(b, "Unsupported escape sequence"),
        }
        Some(())
    }

    fn graphic(&mut self, set: GraphicSet, first: u8) -> Option<()> {
        let second = if set.width() == 2 {
            Some(self.next()? & 0x7F)
        } else {
            None
        };
        match self.glyph(set, first, second) {
            Some(character) => self.push_character(character),
            None => trace!(?set, first, "Graphic set without text glyphs"),
        }
        Some(())
    }

    fn glyph(&self, set: GraphicSet, first: u8, second: Option<u8>) -> Option<Character> {
        let config = &self.tokenizer.config;
        match (set, second) {
            (GraphicSet::Mosaic(_) | GraphicSet::Macro, _) => None,
            (GraphicSet::Drcs(0), Some(second)) => Some(Character::drcs(DrcsRef::double(first, second))),
            (GraphicSet::Drcs(n), _) => Some(Character::drcs(DrcsRef::single(n, first))),
            (_, Some(second)) => {
                let (row, cell) = (first - 0x20, second.saturating_sub(0x20));
                let additional = set == GraphicSet::AdditionalSymbols || row >= 90;
                let ch = if additional && config.use_pua {
                    charset::additional_symbol_pua(row, cell)
                } else if additional {
                    self.tokenizer.glyphs.lookup(GraphicSet::AdditionalSymbols, row, cell)
                } else {
                    self.tokenizer.glyphs.lookup(set, row, cell)
                };
                Some(Character::new(ch.unwrap_or(GETA)))
            }
            (_, None) => Some(Character::new(charset::single_byte(set, first).unwrap_or(GETA))),
        }
    }

    fn color(&mut self) -> Option<()> {
        let p = self.next()?;
        if p == 0x20 {
            let palette = self.next()? & 0x0F;
            self.push_control(ControlCode::Palette(palette));
            return Some(());
        }
        let color = p & 0x0F;
        match p & 0xF0 {
            0x40 => self.push_control(ControlCode::Foreground(color)),
            0x50 => self.push_control(ControlCode::Background(color)),
            0x60 => self.push_control(ControlCode::HalfForeground(color)),
            0x70 => self.push_control(ControlCode::HalfBackground(color)),
            _ => trace!(p, "Unsupported COL"),
        }
        Some(())
    }

    /// Macro definitions are consumed up to their MACRO 0x4F terminator
    fn macro_definition(&mut self) -> Option<()> {
        match self.next()? {
            0x40 | 0x41 => {
                loop {
                    if self.next()? == 0x95 && self.peek() == Some(0x4F) {
                        self.pos += 1;
                        break;
                    }
                }
                trace!("Skipped macro definition");
            }
            0x4F => {}
            p => trace!(p, "Unsupported MACRO"),
        }
        Some(())
    }

    /// TIME: only the presentation wait is interpreted
    fn time(&mut self) -> Option<()> {
        match self.next()? {
            0x20 => {
                let tenths = self.next()? & 0x3F;
                self.wait += u32::from(tenths);
                self.push_control(ControlCode::TimeWait(tenths));
            }
            0x28 => {
                self.next()?;
                trace!("Skipped TIME control mode");
            }
            0x29 => {
                while self.next()? != 0x20 {}
                self.next()?;
                trace!("Skipped TIME presentation time");
            }
            p => trace!(p, "Unsupported TIME"),
        }
        Some(())
    }

    fn csi(&mut self) -> Option<()> {
        let mut params = [0u32; MAX_CSI_PARAMS];
        let mut count = 0;
        let mut current: Option<u32> = None;

        loop {
            let byte = self.next()?;
            match byte {
                0x30..=0x39 => {
                    let digit = u32::from(byte - 0x30);
                    current = Some(current.unwrap_or(0).saturating_mul(10).saturating_add(digit));
                }
                0x3B | 0x20 => {
                    if count < MAX_CSI_PARAMS {
                        params[count] = current.unwrap_or(0);
                        count += 1;
                    }
                    current = None;
                    if byte == 0x20 {
                        let final_byte = self.next()?;
                        self.csi_final(final_byte, &params[..count]);
                        return Some(());
                    }
                }
                _ => {
                    trace!(byte, "Malformed CSI sequence");
                    return Some(());
                }
            }
        }
    }

    fn csi_final(&mut self, final_byte: u8, params: &[u32]) {
        let code = match (final_byte, params) {
            (0x53, [format, ..]) => ControlCode::SetWritingFormat(*format),
            (0x56, [width, height]) => ControlCode::SetDisplayFormat {
                width: *width,
                height: *height,
            },
            (0x5F, [x, y]) => ControlCode::SetDisplayPosition { x: *x, y: *y },
            (0x57, [width, height]) => ControlCode::CharacterComposition {
                width: *width,
                height: *height,
            },
            (0x58, [spacing]) => ControlCode::HorizontalSpacing(*spacing),
            (0x59, [spacing]) => ControlCode::VerticalSpacing(*spacing),
            (0x61, [x, y]) => ControlCode::ActiveCoordinatePositionSet { x: *x, y: *y },
            (0x63, [0 | 3, ..]) => ControlCode::Ornament(None),
            (0x63, [1 | 2, color]) => ControlCode::Ornament(Some(palette_color(*color))),
            (0x64, [style]) => ControlCode::FontStyle {
                bold: style & 1 != 0,
                italic: style & 2 != 0,
            },
            (0x68, [sound]) => ControlCode::BuiltinSound(*sound),
            _ => {
                trace!(final_byte, ?params, "Unsupported CSI");
                return;
            }
        };
        self.push_control(code);
    }
}

/// ORN colors are written as palette * 100 + index
fn palette_color(value: u32) -> u8 {
    let palette = (value / 100).min(7);
    let index = (value % 100).min(15);
    (palette * 16 + index) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn japanese() -> Tokenizer {
        Tokenizer::japanese(TokenizerConfig::default())
    }

    fn chars(tokens: &[Token]) -> String {
        tokens
            .iter()
            .filter_map(|token| match token {
                Token::Character(c) => Some(c.ch),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_alphanumeric_via_locking_shift() {
        let tokens = japanese().tokenize(&[0x0E, 0x41]);
        assert_eq!(tokens, vec![Token::Character(Character::new('A'))]);
    }

    #[test]
    fn test_space_follows_profile() {
        let latin = Tokenizer::new(Association::Sbtvd, TokenizerConfig::default());
        assert_eq!(chars(&latin.tokenize(b"Ola mundo")), "Ola mundo");

        let tokens = japanese().tokenize(&[0xC1, 0x20, 0xC1]);
        assert_eq!(chars(&tokens), "ち\u{3000}ち");
    }

    #[test]
    fn test_default_designations() {
        // GL = G0 kanji (row 4 hiragana), GR = G2 hiragana
        let tokens = japanese().tokenize(&[0x24, 0x24, 0xC1]);
        assert_eq!(chars(&tokens), "いち");
    }

    #[test]
    fn test_parameter_width_is_honored() {
        // SZX with an unknown parameter, then a hiragana
        let tokens = japanese().tokenize(&[0x8B, 0x7A, 0xC1]);
        assert_eq!(tokens, vec![Token::Character(Character::new('ち'))]);

        // COL palette form takes two parameter bytes
        let tokens = japanese().tokenize(&[0x90, 0x20, 0x41, 0xC1]);
        assert_eq!(
            tokens,
            vec![
                Token::Control(ControlCode::Palette(1)),
                Token::Character(Character::new('ち')),
            ]
        );

        // POL is skipped but still consumes its parameter
        let tokens = japanese().tokenize(&[0x93, 0xC1, 0xC2]);
        assert_eq!(chars(&tokens), "ぢ");

        // APS takes two
        let tokens = japanese().tokenize(&[0x1C, 0x41, 0x42, 0xC1]);
        assert_eq!(
            tokens[0],
            Token::Control(ControlCode::ActivePositionSet { row: 1, column: 2 })
        );
        assert_eq!(chars(&tokens), "ち");
    }

    #[test]
    fn test_unknown_csi_is_skipped() {
        let tokens = japanese().tokenize(&[0x9B, b'3', b'0', 0x3B, b'1', 0x20, 0x7B, 0xC1]);
        assert_eq!(tokens, vec![Token::Character(Character::new('ち'))]);
    }

    #[test]
    fn test_csi_sequences() {
        let mut bytes = vec![0x9B];
        bytes.extend_from_slice(b"620;480 V");
        bytes.push(0x9B);
        bytes.extend_from_slice(b"170;30 _");
        bytes.push(0x9B);
        bytes.extend_from_slice(b"1;701 c");
        let tokens = japanese().tokenize(&bytes);
        assert_eq!(
            tokens,
            vec![
                Token::Control(ControlCode::SetDisplayFormat { width: 620, height: 480 }),
                Token::Control(ControlCode::SetDisplayPosition { x: 170, y: 30 }),
                Token::Control(ControlCode::Ornament(Some(7 * 16 + 1))),
            ]
        );
    }

    #[test]
    fn test_truncated_sequence_ends_stream() {
        let tokens = japanese().tokenize(&[0xC1, 0x9B, b'3', b'6']);
        assert_eq!(chars(&tokens), "ち");
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn test_time_wait_and_clear_screen() {
        let tokens = japanese().tokenize(&[0x0C, 0x9D, 0x20, 0x5E, 0x0C]);
        assert_eq!(
            tokens,
            vec![
                Token::ClearScreen { time: 0.0 },
                Token::Control(ControlCode::TimeWait(30)),
                Token::ClearScreen { time: 3.0 },
            ]
        );
    }

    #[test]
    fn test_repeat_and_colors() {
        let tokens = japanese().tokenize(&[0x87, 0x90, 0x51, 0x98, 0x43]);
        assert_eq!(
            tokens,
            vec![
                Token::Control(ControlCode::Foreground(7)),
                Token::Control(ControlCode::Background(1)),
                Token::Repeat { count: 3 },
            ]
        );
    }

    #[test]
    fn test_designation_and_single_shift() {
        // G1 <- katakana, invoked via LS1; SS2 picks one hiragana
        let tokens = japanese().tokenize(&[0x1B, 0x29, 0x31, 0x0E, 0x21, 0x19, 0x21, 0x22]);
        assert_eq!(chars(&tokens), "ァぁア");
    }

    #[test]
    fn test_macro_definition_is_consumed() {
        let tokens = japanese().tokenize(&[0x95, 0x40, 0x60, 0x1B, 0x28, 0x4A, 0x95, 0x4F, 0xC1]);
        assert_eq!(chars(&tokens), "ち");
    }

    #[test]
    fn test_additional_symbols_use_pua() {
        let bytes = [0x7A, 0x21];
        let plain = japanese().tokenize(&bytes);
        assert_eq!(chars(&plain), GETA.to_string());

        let pua = Tokenizer::japanese(TokenizerConfig { use_pua: true }).tokenize(&bytes);
        assert_eq!(chars(&pua), "\u{E000}");
    }

    #[test]
    fn test_drcs_units_are_bound_first() {
        let drcs = Bytes::from_static(&[0x01, 0x41, 0x21, 0x01, 0x00, 0x00, 0x08, 0x01, 0xFF]);
        // G0 <- DRCS-1, then code 0x21
        let body = Bytes::from_static(&[0x1B, 0x28, 0x20, 0x41, 0x21]);
        let units = vec![
            DataUnit::Statement(body),
            DataUnit::Drcs { two_byte: false, data: drcs },
        ];

        let tokens = japanese().tokenize_units(&units);
        assert_eq!(tokens.len(), 2);
        let Token::Control(ControlCode::BindDrcs(table)) = &tokens[0] else {
            panic!("expected DRCS binding, got {:?}", tokens[0]);
        };
        assert!(table.get(&DrcsRef::single(1, 0x21)).is_some());
        assert_eq!(tokens[1], Token::Character(Character::drcs(DrcsRef::single(1, 0x21))));
    }

    #[test]
    fn test_truncated_drcs_unit_keeps_parsed_glyphs() {
        // two codes announced, the second is cut after its character code
        let drcs = Bytes::from_static(&[
            0x02, 0x41, 0x21, 0x01, 0x00, 0x00, 0x08, 0x01, 0xFF, 0x41, 0x22,
        ]);
        let units = vec![DataUnit::Drcs { two_byte: false, data: drcs }];

        let tokens = japanese().tokenize_units(&units);
        let [Token::Control(ControlCode::BindDrcs(table))] = tokens.as_slice() else {
            panic!("expected a single DRCS binding, got {:?}", tokens);
        };
        assert_eq!(table.len(), 1);
        assert!(table.get(&DrcsRef::single(1, 0x21)).is_some());
        assert!(table.get(&DrcsRef::single(1, 0x22)).is_none());
    }

    #[test]
    fn test_wait_carries_across_statement_units() {
        let units = vec![
            DataUnit::Statement(Bytes::from_static(&[0x9D, 0x20, 0x4A])),
            DataUnit::Statement(Bytes::from_static(&[0x0C])),
        ];
        let tokens = japanese().tokenize_units(&units);
        assert_eq!(tokens.last(), Some(&Token::ClearScreen { time: 1.0 }));
    }

    #[test]
    fn test_sbtvd_profile() {
        let tokenizer = Tokenizer::new(Association::Sbtvd, TokenizerConfig::default());
        let tokens = tokenizer.tokenize(&[0x4F, 0x6C, 0xE1]);
        assert_eq!(chars(&tokens), "Olá");
    }
}
