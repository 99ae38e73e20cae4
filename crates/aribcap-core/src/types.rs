//! Core types for aribcap

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::parser::Directive;
use crate::state::CaptionPlaneState;

/// Presentation timestamp in seconds, totally ordered so it can key a tree
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pts(pub f64);

impl PartialEq for Pts {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pts {}

impl PartialOrd for Pts {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pts {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl From<f64> for Pts {
    fn from(seconds: f64) -> Self {
        Self(seconds)
    }
}

impl std::fmt::Display for Pts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}

/// Caption payload recovered from its transport envelope
#[derive(Debug, Clone, PartialEq)]
pub struct RawSegment {
    /// Presentation time in seconds
    pub pts: f64,
    /// PES data packet bytes
    pub data: Bytes,
}

impl RawSegment {
    pub fn new(pts: f64, data: impl Into<Bytes>) -> Self {
        Self {
            pts,
            data: data.into(),
        }
    }
}

/// Decoded caption ready for presentation
#[derive(Debug, Clone)]
pub struct TokenizedSegment {
    /// Presentation time in seconds
    pub pts: f64,
    /// Display duration in seconds, `f64::INFINITY` when open-ended
    pub duration: f64,
    /// Plane state the directives were resolved from
    pub initial_state: CaptionPlaneState,
    /// Drawing directives in bitstream order
    pub directives: Vec<Directive>,
}

impl TokenizedSegment {
    /// Presentation end time, infinite for open-ended captions
    pub fn end_time(&self) -> f64 {
        self.pts + self.duration
    }

    /// Whether `time` falls inside `[pts, pts + duration)`
    pub fn is_active_at(&self, time: f64) -> bool {
        time >= self.pts && time < self.end_time()
    }
}

/// Axis-aligned rectangle in caption plane pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Clip to `[0, width) x [0, height)`
    pub fn clamp_to(&self, width: f64, height: f64) -> Rect {
        let x = self.x.clamp(0.0, width);
        let y = self.y.clamp(0.0, height);
        Rect {
            x,
            y,
            width: (self.right().min(width) - x).max(0.0),
            height: (self.bottom().min(height) - y).max(0.0),
        }
    }

    pub fn contained_in(&self, width: f64, height: f64) -> bool {
        self.x >= 0.0 && self.y >= 0.0 && self.right() <= width && self.bottom() <= height
    }
}

/// Character size selected by SSZ/MSZ/NSZ/SZX
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CharSize {
    /// SSZ
    Small,
    /// MSZ
    Medium,
    /// NSZ
    #[default]
    Normal,
    /// SZX 0x60
    Tiny,
    /// SZX 0x41
    DoubleHeight,
    /// SZX 0x44
    DoubleWidth,
    /// SZX 0x45
    DoubleSize,
}

impl CharSize {
    /// Horizontal and vertical scale factors
    pub fn scale(&self) -> (f64, f64) {
        match self {
            CharSize::Small => (0.5, 0.5),
            CharSize::Medium => (0.5, 1.0),
            CharSize::Normal => (1.0, 1.0),
            CharSize::Tiny => (0.25, 0.25),
            CharSize::DoubleHeight => (1.0, 2.0),
            CharSize::DoubleWidth => (2.0, 1.0),
            CharSize::DoubleSize => (2.0, 2.0),
        }
    }
}

/// Writing direction of the caption plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WritingMode {
    #[default]
    Horizontal,
    Vertical,
}

impl std::fmt::Display for WritingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WritingMode::Horizontal => write!(f, "horizontal"),
            WritingMode::Vertical => write!(f, "vertical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pts_ordering_is_total() {
        let mut keys = vec![Pts(3.0), Pts(-0.0), Pts(1.5), Pts(0.0)];
        keys.sort();
        assert_eq!(keys[0], Pts(-0.0));
        assert_eq!(keys[3], Pts(3.0));
        assert!(Pts(f64::NAN) > Pts(f64::INFINITY));
    }

    #[test]
    fn test_rect_clamp() {
        let rect = Rect::new(950.0, 500.0, 40.0, 60.0).clamp_to(960.0, 540.0);
        assert_eq!(rect, Rect::new(950.0, 500.0, 10.0, 40.0));
        assert!(rect.contained_in(960.0, 540.0));

        let outside = Rect::new(-10.0, -10.0, 5.0, 5.0).clamp_to(960.0, 540.0);
        assert_eq!(outside.width, 0.0);
        assert!(outside.contained_in(960.0, 540.0));
    }

    #[test]
    fn test_char_size_scale() {
        assert_eq!(CharSize::Normal.scale(), (1.0, 1.0));
        assert_eq!(CharSize::Medium.scale(), (0.5, 1.0));
        assert_eq!(CharSize::DoubleSize.scale(), (2.0, 2.0));
    }

    #[test]
    fn test_segment_activity_window() {
        let segment = TokenizedSegment {
            pts: 2.0,
            duration: 3.0,
            initial_state: CaptionPlaneState::default(),
            directives: Vec::new(),
        };
        assert!(segment.is_active_at(2.0));
        assert!(segment.is_active_at(4.9));
        assert!(!segment.is_active_at(5.0));
    }
}
