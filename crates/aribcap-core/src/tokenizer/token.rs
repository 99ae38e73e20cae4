//! Tokens produced from a caption statement body

use std::sync::Arc;

use crate::types::CharSize;

pub use crate::transport::drcs::{DrcsRef, DrcsTable};

/// A decoded character
#[derive(Debug, Clone, PartialEq)]
pub struct Character {
    /// Unicode codepoint, U+3013 for unmapped glyphs
    pub ch: char,
    /// Set when the code addresses a downloaded glyph
    pub drcs: Option<DrcsRef>,
}

impl Character {
    pub fn new(ch: char) -> Self {
        Self { ch, drcs: None }
    }

    pub fn drcs(drcs: DrcsRef) -> Self {
        Self {
            ch: super::charset::GETA,
            drcs: Some(drcs),
        }
    }
}

/// Control functions with their parameters
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCode {
    /// NUL
    Null,
    /// BEL
    Bell,
    /// APB
    ActivePositionBackward,
    /// APF
    ActivePositionForward,
    /// APD
    ActivePositionDown,
    /// APU
    ActivePositionUp,
    /// APR
    ActivePositionReturn,
    /// PAPF
    ParameterizedForward(u8),
    /// APS
    ActivePositionSet { row: u8, column: u8 },
    /// CAN
    Cancel,
    /// RS
    RecordSeparator,
    /// US
    UnitSeparator,
    /// DEL, draws a space filled with the foreground color
    Delete,
    /// BKF..WHF, COL with a foreground color
    Foreground(u8),
    /// COL with a background color
    Background(u8),
    /// COL with a half-intensity foreground color
    HalfForeground(u8),
    /// COL with a half-intensity background color
    HalfBackground(u8),
    /// COL palette selection
    Palette(u8),
    /// SSZ, MSZ, NSZ, SZX
    CharacterSize(CharSize),
    /// FLC: 0x40 normal, 0x47 inverted, 0x4F stop
    Flashing(u8),
    /// CDC
    Conceal(bool),
    /// HLC enclosure bits
    Highlight(u8),
    /// STL / SPL
    Underline(bool),
    /// ORN hemming color, `None` clears it
    Ornament(Option<u8>),
    /// MDF
    FontStyle { bold: bool, italic: bool },
    /// SWF writing format
    SetWritingFormat(u32),
    /// SDF
    SetDisplayFormat { width: u32, height: u32 },
    /// SDP
    SetDisplayPosition { x: u32, y: u32 },
    /// SSM
    CharacterComposition { width: u32, height: u32 },
    /// SHS
    HorizontalSpacing(u32),
    /// SVS
    VerticalSpacing(u32),
    /// ACPS
    ActiveCoordinatePositionSet { x: u32, y: u32 },
    /// PRA
    BuiltinSound(u32),
    /// TIME wait in tenths of a second
    TimeWait(u8),
    /// Glyphs downloaded by the DRCS units of this statement
    BindDrcs(Arc<DrcsTable>),
}

/// Semantic token of a caption statement
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Character(Character),
    Control(ControlCode),
    /// CS, `time` is the wait accumulated before it in seconds
    ClearScreen { time: f64 },
    /// RPC, `count == 0` repeats to the end of the line
    Repeat { count: u8 },
}

impl Token {
    pub fn is_character(&self) -> bool {
        matches!(self, Token::Character(_))
    }
}

/// Total TIME wait of a token stream in seconds
pub fn total_wait(tokens: &[Token]) -> f64 {
    tokens
        .iter()
        .map(|token| match token {
            Token::Control(ControlCode::TimeWait(tenths)) => f64::from(*tenths) / 10.0,
            _ => 0.0,
        })
        .sum()
}
