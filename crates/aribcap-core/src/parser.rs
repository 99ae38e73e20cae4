//! Caption state machine
//!
//! Consumes tokens in order and resolves every character against the
//! current [`CaptionPlaneState`] into a positioned [`Placement`]. Control
//! codes only touch the state fields they name. Rectangles handed out are
//! clipped to the plane.

use tracing::trace;

use crate::state::CaptionPlaneState;
use crate::tokenizer::{Character, ControlCode, Token};
use crate::transport::drcs::{DrcsPattern, DrcsRef};
use crate::types::{Rect, WritingMode};

/// What is drawn in a cell
#[derive(Debug, Clone, PartialEq)]
pub enum Glyph {
    Char(char),
    /// Downloaded bitmap glyph
    Drcs { drcs: DrcsRef, pattern: DrcsPattern },
    /// DEL: the cell filled with the foreground color
    Fill,
}

/// Colors as palette indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Colors {
    pub foreground: u8,
    pub background: u8,
    pub half_foreground: u8,
    pub half_background: u8,
    /// Hemming color
    pub ornament: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub scale_x: f64,
    pub scale_y: f64,
    pub writing_mode: WritingMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextStyle {
    pub flashing: u8,
    pub conceal: bool,
    pub highlight: u8,
    pub underline: bool,
    pub bold: bool,
    pub italic: bool,
}

/// A glyph resolved to plane coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub glyph: Glyph,
    /// Glyph box
    pub rect: Rect,
    /// Character cell before the advance, for the background
    pub cell: Rect,
    /// Unscaled font size (SSM)
    pub font_size: (f64, f64),
    pub colors: Colors,
    pub transform: Transform,
    pub style: TextStyle,
}

/// Parser output for the renderer
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Glyph(Placement),
    /// Erase the plane, `time` seconds into the segment
    ClearScreen { time: f64 },
}

/// Directives of a token stream and the state it ended in
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutput {
    pub directives: Vec<Directive>,
    pub state: CaptionPlaneState,
}

/// Run `tokens` from `initial`
pub fn parse(initial: &CaptionPlaneState, tokens: &[Token]) -> ParseOutput {
    let mut parser = Parser::new(initial.clone());
    let mut directives = Vec::with_capacity(tokens.len());
    for token in tokens {
        parser.step(token, &mut directives);
    }
    ParseOutput {
        directives,
        state: parser.finish(),
    }
}

/// Incremental form of [`parse`]
#[derive(Debug, Clone)]
pub struct Parser {
    state: CaptionPlaneState,
    /// Most recent character, for RPC
    last: Option<Glyph>,
}

impl Parser {
    pub fn new(state: CaptionPlaneState) -> Self {
        Self { state, last: None }
    }

    pub fn state(&self) -> &CaptionPlaneState {
        &self.state
    }

    pub fn finish(self) -> CaptionPlaneState {
        self.state
    }

    /// Apply one token, appending its directives to `out`
    pub fn step(&mut self, token: &Token, out: &mut Vec<Directive>) {
        match token {
            Token::Character(character) => {
                let glyph = self.resolve(character);
                self.place(glyph.clone(), out);
                self.last = Some(glyph);
            }
            Token::Control(code) => self.control(code, out),
            Token::ClearScreen { time } => out.push(Directive::ClearScreen { time: *time }),
            Token::Repeat { count } => {
                let Some(glyph) = self.last.clone() else {
                    trace!("RPC without a preceding character");
                    return;
                };
                let count = match *count {
                    0 => self.state.remaining_in_line(),
                    n => usize::from(n),
                };
                for _ in 0..count {
                    self.place(glyph.clone(), out);
                }
            }
        }
    }

    fn resolve(&self, character: &Character) -> Glyph {
        let pattern = character
            .drcs
            .and_then(|drcs| Some((drcs, self.state.drcs.as_ref()?.get(&drcs)?.clone())));
        match pattern {
            Some((drcs, pattern)) => Glyph::Drcs { drcs, pattern },
            None => Glyph::Char(character.ch),
        }
    }

    fn place(&mut self, glyph: Glyph, out: &mut Vec<Directive>) {
        let state = &mut self.state;
        state.wrap_if_needed();

        let (width, height) = state.plane;
        let (scale_x, scale_y) = state.scale();
        out.push(Directive::Glyph(Placement {
            glyph,
            rect: state.glyph_rect().clamp_to(width, height),
            cell: state.cell_rect().clamp_to(width, height),
            font_size: state.font_size,
            colors: Colors {
                foreground: state.foreground,
                background: state.background,
                half_foreground: state.half_foreground,
                half_background: state.half_background,
                ornament: state.ornament,
            },
            transform: Transform {
                scale_x,
                scale_y,
                writing_mode: state.writing_mode,
            },
            style: TextStyle {
                flashing: state.flashing,
                conceal: state.conceal,
                highlight: state.highlight,
                underline: state.underline,
                bold: state.bold,
                italic: state.italic,
            },
        }));

        state.forward();
    }

    fn control(&mut self, code: &ControlCode, out: &mut Vec<Directive>) {
        let state = &mut self.state;
        match code {
            ControlCode::ActivePositionBackward => state.backward(),
            ControlCode::ActivePositionForward => state.forward(),
            ControlCode::ActivePositionDown => state.line_down(),
            ControlCode::ActivePositionUp => state.line_up(),
            ControlCode::ActivePositionReturn => state.carriage_return(),
            ControlCode::ParameterizedForward(n) => {
                for _ in 0..*n {
                    state.forward();
                }
            }
            ControlCode::ActivePositionSet { row, column } => state.set_cell_position(*row, *column),
            ControlCode::ActiveCoordinatePositionSet { x, y } => {
                state.set_coordinate_position(f64::from(*x), f64::from(*y))
            }
            ControlCode::Delete => self.place(Glyph::Fill, out),
            ControlCode::Foreground(color) => state.foreground = state.color(*color),
            ControlCode::Background(color) => state.background = state.color(*color),
            ControlCode::HalfForeground(color) => state.half_foreground = state.color(*color),
            ControlCode::HalfBackground(color) => state.half_background = state.color(*color),
            ControlCode::Palette(palette) => state.palette = *palette & 0x07,
            ControlCode::CharacterSize(size) => state.char_size = *size,
            ControlCode::Flashing(mode) => state.flashing = *mode,
            ControlCode::Conceal(conceal) => state.conceal = *conceal,
            ControlCode::Highlight(bits) => state.highlight = *bits,
            ControlCode::Underline(underline) => state.underline = *underline,
            ControlCode::Ornament(color) => state.ornament = *color,
            ControlCode::FontStyle { bold, italic } => {
                state.bold = *bold;
                state.italic = *italic;
            }
            ControlCode::SetWritingFormat(format) => state.set_writing_format(*format),
            ControlCode::SetDisplayFormat { width, height } => {
                state.set_display_format(f64::from(*width), f64::from(*height))
            }
            ControlCode::SetDisplayPosition { x, y } => {
                state.set_display_position(f64::from(*x), f64::from(*y))
            }
            ControlCode::CharacterComposition { width, height } => {
                state.set_font_size(f64::from(*width), f64::from(*height))
            }
            ControlCode::HorizontalSpacing(spacing) => state.spacing.0 = f64::from(*spacing),
            ControlCode::VerticalSpacing(spacing) => state.spacing.1 = f64::from(*spacing),
            ControlCode::BindDrcs(table) => state.drcs = Some(table.clone()),
            ControlCode::Null
            | ControlCode::Bell
            | ControlCode::Cancel
            | ControlCode::RecordSeparator
            | ControlCode::UnitSeparator
            | ControlCode::BuiltinSound(_)
            | ControlCode::TimeWait(_) => {}
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(CaptionPlaneState::default())
    }
}
