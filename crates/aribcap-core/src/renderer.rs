//! Renderer interface
//!
//! Drawing is left to the embedding application. A renderer receives the
//! initial plane state of a segment together with its directives and is
//! free to rasterize them however it likes.

use crate::parser::Directive;
use crate::state::CaptionPlaneState;

/// A sink for parsed caption segments
pub trait Renderer: Send {
    /// Draw one segment, replacing whatever was shown before
    fn render(&mut self, initial_state: &CaptionPlaneState, directives: &[Directive]);

    /// Remove everything currently drawn
    fn clear(&mut self);

    /// The drawing surface changed size, in pixels
    fn resize(&mut self, width: u32, height: u32);

    fn destroy(&mut self) {
        self.clear();
    }

    fn on_seeking(&mut self) {
        self.clear();
    }

    /// The element hosting the renderer was resized
    ///
    /// Returns true when the renderer needs the current segment drawn again.
    fn on_container_resize(&mut self, width: u32, height: u32) -> bool {
        self.resize(width, height);
        true
    }

    /// The video resolution changed
    ///
    /// Returns true when the renderer needs the current segment drawn again.
    fn on_video_resize(&mut self, _width: u32, _height: u32) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::tokenizer::{Character, Token};

    #[derive(Default)]
    struct Recording {
        drawn: Vec<usize>,
        clears: usize,
        size: Option<(u32, u32)>,
    }

    impl Renderer for Recording {
        fn render(&mut self, _initial_state: &CaptionPlaneState, directives: &[Directive]) {
            self.drawn.push(directives.len());
        }

        fn clear(&mut self) {
            self.clears += 1;
        }

        fn resize(&mut self, width: u32, height: u32) {
            self.size = Some((width, height));
        }
    }

    #[test]
    fn test_default_hooks() {
        let mut renderer = Recording::default();
        let state = CaptionPlaneState::default();
        let output = parse(&state, &[Token::Character(Character::new('A'))]);

        renderer.render(&state, &output.directives);
        assert_eq!(renderer.drawn, vec![1]);

        renderer.on_seeking();
        assert_eq!(renderer.clears, 1);

        assert!(renderer.on_container_resize(1920, 1080));
        assert_eq!(renderer.size, Some((1920, 1080)));
        assert!(!renderer.on_video_resize(1280, 720));

        renderer.destroy();
        assert_eq!(renderer.clears, 2);
    }
}
