//! Aribcap Core - ARIB STD-B24 caption decoding
//!
//! This crate turns caption payloads carried alongside broadcast video into
//! positioned, styled glyph placements:
//! - ID3v2 timed metadata and PES data packet extraction
//! - Data group / data unit demultiplexing with DRCS glyph loading
//! - 8-bit code tokenization (G0..G3 sets, C0/C1 controls, CSI)
//! - Caption plane layout with a pure, deterministic parser
//! - Presentation scheduling and background decoding
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Aribcap Core                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  feed / feed_id3        ┌──────────────┐                        │
//! │  ─────────────────────► │  Raw Segment │                        │
//! │                         │  Scheduler   │                        │
//! │                         └──────┬───────┘                        │
//! │                   content(t)   │ range(prev, t)                 │
//! │                         ┌──────┴───────┐                        │
//! │                         │ Decode Pump  │ PES → units → tokens   │
//! │                         └──────┬───────┘          → directives  │
//! │                                │                                │
//! │                         ┌──────┴───────┐                        │
//! │  ◄───────────────────── │ Presentation │                        │
//! │  floor(t - timeshift)   │  Scheduler   │                        │
//! │                         └──────┬───────┘                        │
//! │                                │                                │
//! │                         ┌──────┴───────┐                        │
//! │                         │   Renderer   │ (supplied by caller)   │
//! │                         └──────────────┘                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod feeder;
pub mod parser;
pub mod pump;
pub mod renderer;
pub mod scheduler;
pub mod state;
pub mod tokenizer;
pub mod transport;
pub mod types;

pub use config::{Association, FeederConfig, TokenizerConfig};
pub use error::{Error, Result};
pub use feeder::{CaptionFeeder, Feeder};
pub use parser::{parse, Directive, Glyph, ParseOutput, Parser, Placement};
pub use pump::{CaptionDecoder, CaptionScheduler, DecodePump};
pub use renderer::Renderer;
pub use scheduler::PresentationScheduler;
pub use state::CaptionPlaneState;
pub use tokenizer::{Token, Tokenizer};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the caption library with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "Aribcap Core initialized");
}
