//! Caption plane state
//!
//! Positions are kept relative to the display area (SDP/SDF) and name the
//! top-left corner of the active character cell. All movement keeps the
//! active cell inside the display area, and the display area inside the
//! plane.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Association;
use crate::transport::drcs::DrcsTable;
use crate::types::{CharSize, Rect, WritingMode};

const EPSILON: f64 = 1e-6;

/// Mutable caption plane state threaded through one segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionPlaneState {
    /// Plane size in pixels (SWF)
    pub plane: (f64, f64),
    pub writing_mode: WritingMode,
    /// Display area origin within the plane (SDP)
    pub margin: (f64, f64),
    /// Display area size (SDF)
    pub area: (f64, f64),
    /// Active position within the display area
    pub position: (f64, f64),
    /// Character composition dots (SSM)
    pub font_size: (f64, f64),
    /// Character (SHS) and line (SVS) spacing
    pub spacing: (f64, f64),
    /// Character size, giving the scale
    pub char_size: CharSize,
    pub palette: u8,
    /// Color indices are `palette * 16 + color`
    pub foreground: u8,
    pub background: u8,
    pub half_foreground: u8,
    pub half_background: u8,
    pub ornament: Option<u8>,
    /// FLC parameter, 0x4F when not flashing
    pub flashing: u8,
    pub conceal: bool,
    pub highlight: u8,
    pub underline: bool,
    pub bold: bool,
    pub italic: bool,
    /// Downloaded glyphs of the current statement
    #[serde(skip)]
    pub drcs: Option<Arc<DrcsTable>>,
}

impl Default for CaptionPlaneState {
    fn default() -> Self {
        Self::japanese()
    }
}

impl CaptionPlaneState {
    /// Initial state of Japanese captions: 960x540 horizontal plane
    pub fn japanese() -> Self {
        Self {
            plane: (960.0, 540.0),
            writing_mode: WritingMode::Horizontal,
            margin: (0.0, 0.0),
            area: (960.0, 540.0),
            position: (0.0, 0.0),
            font_size: (36.0, 36.0),
            spacing: (4.0, 24.0),
            char_size: CharSize::Normal,
            palette: 0,
            foreground: 7,
            background: 8,
            half_foreground: 7,
            half_background: 8,
            ornament: None,
            flashing: 0x4F,
            conceal: false,
            highlight: 0,
            underline: false,
            bold: false,
            italic: false,
            drcs: None,
        }
    }

    /// Initial state of SBTVD captions: 720x480 horizontal plane
    pub fn sbtvd() -> Self {
        Self {
            plane: (720.0, 480.0),
            area: (720.0, 480.0),
            font_size: (32.0, 32.0),
            spacing: (2.0, 12.0),
            ..Self::japanese()
        }
    }

    pub fn for_association(association: Association) -> Self {
        match association {
            Association::Arib => Self::japanese(),
            Association::Sbtvd => Self::sbtvd(),
        }
    }

    pub fn scale(&self) -> (f64, f64) {
        self.char_size.scale()
    }

    /// Advance width of one character
    pub fn cell_width(&self) -> f64 {
        let spacing = match self.writing_mode {
            WritingMode::Horizontal => self.spacing.0,
            WritingMode::Vertical => self.spacing.1,
        };
        (self.font_size.0 + spacing) * self.scale().0
    }

    /// Advance height of one character
    pub fn cell_height(&self) -> f64 {
        let spacing = match self.writing_mode {
            WritingMode::Horizontal => self.spacing.1,
            WritingMode::Vertical => self.spacing.0,
        };
        (self.font_size.1 + spacing) * self.scale().1
    }

    /// Active cell in plane coordinates, backgrounds fill it
    pub fn cell_rect(&self) -> Rect {
        Rect::new(
            self.margin.0 + self.position.0,
            self.margin.1 + self.position.1,
            self.cell_width(),
            self.cell_height(),
        )
    }

    /// Glyph box centered in the active cell
    pub fn glyph_rect(&self) -> Rect {
        let (sx, sy) = self.scale();
        let cell = self.cell_rect();
        let width = self.font_size.0 * sx;
        let height = self.font_size.1 * sy;
        Rect::new(
            cell.x + (cell.width - width) / 2.0,
            cell.y + (cell.height - height) / 2.0,
            width,
            height,
        )
    }

    /// Color index within the current palette
    pub fn color(&self, color: u8) -> u8 {
        self.palette * 16 + (color & 0x0F)
    }

    /// Apply an SWF writing format
    ///
    /// Unknown formats leave the state untouched.
    pub fn set_writing_format(&mut self, format: u32) {
        let (plane, mode) = match format {
            0 | 2 | 7 => ((960.0, 540.0), WritingMode::Horizontal),
            1 | 3 | 8 => ((960.0, 540.0), WritingMode::Vertical),
            5 => ((1920.0, 1080.0), WritingMode::Horizontal),
            6 => ((1920.0, 1080.0), WritingMode::Vertical),
            9 => ((720.0, 480.0), WritingMode::Horizontal),
            10 => ((720.0, 480.0), WritingMode::Vertical),
            11 => ((1280.0, 720.0), WritingMode::Horizontal),
            12 => ((1280.0, 720.0), WritingMode::Vertical),
            _ => return,
        };
        self.plane = plane;
        self.writing_mode = mode;
        self.margin = (0.0, 0.0);
        self.area = plane;
        self.home();
    }

    /// Apply SDF; zero sizes are ignored
    pub fn set_display_format(&mut self, width: f64, height: f64) {
        if width <= 0.0 || height <= 0.0 {
            return;
        }
        self.area = (width.min(self.plane.0), height.min(self.plane.1));
        self.fit_area();
    }

    /// Apply SDP
    pub fn set_display_position(&mut self, x: f64, y: f64) {
        self.margin = (x, y);
        self.fit_area();
    }

    /// Apply SSM; zero sizes are ignored
    pub fn set_font_size(&mut self, width: f64, height: f64) {
        if width > 0.0 && height > 0.0 {
            self.font_size = (width, height);
            self.clamp_position();
        }
    }

    /// Move the active position to the first cell of the first line
    pub fn home(&mut self) {
        self.position = match self.writing_mode {
            WritingMode::Horizontal => (0.0, 0.0),
            WritingMode::Vertical => ((self.area.0 - self.cell_width()).max(0.0), 0.0),
        };
    }

    /// APS: move to a character cell
    pub fn set_cell_position(&mut self, row: u8, column: u8) {
        let (row, column) = (f64::from(row), f64::from(column));
        self.position = match self.writing_mode {
            WritingMode::Horizontal => (column * self.cell_width(), row * self.cell_height()),
            WritingMode::Vertical => (
                self.area.0 - (row + 1.0) * self.cell_width(),
                column * self.cell_height(),
            ),
        };
        self.clamp_position();
    }

    /// ACPS: plane coordinates of the lower-left corner of the active cell
    pub fn set_coordinate_position(&mut self, x: f64, y: f64) {
        self.position = (x - self.margin.0, y - self.margin.1 - self.cell_height());
        self.clamp_position();
    }

    /// Cells left on the current line, the active one included
    pub fn remaining_in_line(&self) -> usize {
        let remaining = match self.writing_mode {
            WritingMode::Horizontal => (self.area.0 - self.position.0) / self.cell_width(),
            WritingMode::Vertical => (self.area.1 - self.position.1) / self.cell_height(),
        };
        (remaining + EPSILON).floor().max(0.0) as usize
    }

    /// Start a new line if the active cell overflows the current one
    pub fn wrap_if_needed(&mut self) {
        let overflows = match self.writing_mode {
            WritingMode::Horizontal => self.position.0 + self.cell_width() > self.area.0 + EPSILON,
            WritingMode::Vertical => self.position.1 + self.cell_height() > self.area.1 + EPSILON,
        };
        if overflows {
            self.carriage_return();
        }
    }

    /// APF and the advance after each character
    pub fn forward(&mut self) {
        match self.writing_mode {
            WritingMode::Horizontal => {
                self.position.0 += self.cell_width();
                if self.position.0 + self.cell_width() > self.area.0 + EPSILON {
                    self.position.0 = 0.0;
                    self.line_down();
                }
            }
            WritingMode::Vertical => {
                self.position.1 += self.cell_height();
                if self.position.1 + self.cell_height() > self.area.1 + EPSILON {
                    self.position.1 = 0.0;
                    self.line_down();
                }
            }
        }
    }

    /// APB
    pub fn backward(&mut self) {
        match self.writing_mode {
            WritingMode::Horizontal => {
                self.position.0 -= self.cell_width();
                if self.position.0 < -EPSILON {
                    self.position.0 = last_cell(self.area.0, self.cell_width());
                    self.line_up();
                }
            }
            WritingMode::Vertical => {
                self.position.1 -= self.cell_height();
                if self.position.1 < -EPSILON {
                    self.position.1 = last_cell(self.area.1, self.cell_height());
                    self.line_up();
                }
            }
        }
    }

    /// APD, wrapping to the first line past the last
    pub fn line_down(&mut self) {
        match self.writing_mode {
            WritingMode::Horizontal => {
                self.position.1 += self.cell_height();
                if self.position.1 + self.cell_height() > self.area.1 + EPSILON {
                    self.position.1 = 0.0;
                }
            }
            WritingMode::Vertical => {
                self.position.0 -= self.cell_width();
                if self.position.0 < -EPSILON {
                    self.position.0 = (self.area.0 - self.cell_width()).max(0.0);
                }
            }
        }
    }

    /// APU, wrapping to the last line before the first
    pub fn line_up(&mut self) {
        match self.writing_mode {
            WritingMode::Horizontal => {
                self.position.1 -= self.cell_height();
                if self.position.1 < -EPSILON {
                    self.position.1 = last_cell(self.area.1, self.cell_height());
                }
            }
            WritingMode::Vertical => {
                self.position.0 += self.cell_width();
                if self.position.0 + self.cell_width() > self.area.0 + EPSILON {
                    let width = self.cell_width();
                    self.position.0 = (self.area.0 - width).max(0.0) % width;
                }
            }
        }
    }

    /// APR
    pub fn carriage_return(&mut self) {
        match self.writing_mode {
            WritingMode::Horizontal => self.position.0 = 0.0,
            WritingMode::Vertical => self.position.1 = 0.0,
        }
        self.line_down();
    }

    /// Keep the active cell inside the display area
    pub fn clamp_position(&mut self) {
        let max_x = (self.area.0 - self.cell_width()).max(0.0);
        let max_y = (self.area.1 - self.cell_height()).max(0.0);
        self.position.0 = self.position.0.clamp(0.0, max_x);
        self.position.1 = self.position.1.clamp(0.0, max_y);
    }

    fn fit_area(&mut self) {
        self.margin.0 = self.margin.0.clamp(0.0, self.plane.0 - self.area.0);
        self.margin.1 = self.margin.1.clamp(0.0, self.plane.1 - self.area.1);
        self.clamp_position();
    }
}

fn last_cell(extent: f64, cell: f64) -> f64 {
    ((extent / cell + EPSILON).floor() - 1.0).max(0.0) * cell
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_japanese_defaults() {
        let state = CaptionPlaneState::default();
        assert_eq!(state.plane, (960.0, 540.0));
        assert_eq!(state.cell_width(), 40.0);
        assert_eq!(state.cell_height(), 60.0);
        assert_eq!(state.cell_rect(), Rect::new(0.0, 0.0, 40.0, 60.0));
        assert_eq!(state.glyph_rect(), Rect::new(2.0, 12.0, 36.0, 36.0));
    }

    #[test]
    fn test_forward_wraps_to_next_line() {
        let mut state = CaptionPlaneState::default();
        state.set_display_format(120.0, 120.0);
        state.forward();
        state.forward();
        assert_eq!(state.position, (80.0, 0.0));
        state.forward();
        assert_eq!(state.position, (0.0, 60.0));
        // past the last line back to the first
        state.carriage_return();
        assert_eq!(state.position, (0.0, 0.0));
    }

    #[test]
    fn test_backward_wraps_to_previous_line() {
        let mut state = CaptionPlaneState::default();
        state.set_display_format(120.0, 120.0);
        state.backward();
        assert_eq!(state.position, (80.0, 60.0));
    }

    #[test]
    fn test_display_area_stays_in_plane() {
        let mut state = CaptionPlaneState::default();
        state.set_display_format(620.0, 480.0);
        state.set_display_position(900.0, 100.0);
        assert_eq!(state.margin, (340.0, 60.0));
        state.set_display_format(0.0, 10.0);
        assert_eq!(state.area, (620.0, 480.0));
    }

    #[test]
    fn test_cell_position_is_clamped() {
        let mut state = CaptionPlaneState::default();
        state.set_cell_position(63, 63);
        assert_eq!(state.position, (920.0, 480.0));
        assert!(state.cell_rect().contained_in(960.0, 540.0));
    }

    #[test]
    fn test_vertical_format() {
        let mut state = CaptionPlaneState::default();
        state.set_writing_format(8);
        assert_eq!(state.writing_mode, WritingMode::Vertical);
        assert_eq!(state.cell_width(), 60.0);
        assert_eq!(state.position, (900.0, 0.0));
        state.line_down();
        assert_eq!(state.position, (840.0, 0.0));
    }

    #[test]
    fn test_remaining_in_line() {
        let mut state = CaptionPlaneState::default();
        state.set_display_format(200.0, 120.0);
        assert_eq!(state.remaining_in_line(), 5);
        state.forward();
        assert_eq!(state.remaining_in_line(), 4);
    }

    #[test]
    fn test_font_size_stays_positive() {
        let mut state = CaptionPlaneState::default();
        state.set_font_size(0.0, 20.0);
        assert_eq!(state.font_size, (36.0, 36.0));
    }
}
