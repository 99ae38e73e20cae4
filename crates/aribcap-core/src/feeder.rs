//! Caption feeder
//!
//! Player integrations push transport payloads in with [`CaptionFeeder::feed`]
//! or [`CaptionFeeder::feed_id3`] and poll [`Feeder::content`] once per
//! rendering tick. Raw segments wait in a pts-ordered store until playback
//! reaches them; each query hands the segments between the previous and
//! the current query time to the decode pump and answers from the decoded
//! captions, so decoding never runs on the caller's stack.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::FeederConfig;
use crate::pump::{CaptionDecoder, CaptionScheduler, DecodePump};
use crate::scheduler::PresentationScheduler;
#[cfg(feature = "id3")]
use crate::transport::id3::Id3Extractor;
use crate::types::{RawSegment, TokenizedSegment};
use crate::{Error, Result};

/// Contract between a player integration and a caption source
#[async_trait]
pub trait Feeder: Send + Sync {
    /// Caption active at playback time `time`, if any
    async fn content(&self, time: f64) -> Option<Arc<TokenizedSegment>>;

    /// The feeder was attached to a media element
    async fn on_attach(&self);

    /// The feeder was detached from its media element
    async fn on_detach(&self);

    /// Playback is seeking
    async fn on_seeking(&self);
}

/// Feeder for captions carried in PES data packets or ID3 tags
pub struct CaptionFeeder {
    config: FeederConfig,
    #[cfg(feature = "id3")]
    id3: Id3Extractor,
    /// Raw segments keyed by presentation time in seconds
    decode: PresentationScheduler<RawSegment>,
    /// Decoded captions, written only by the pump
    present: Arc<CaptionScheduler>,
    pump: DecodePump,
    previous_time: RwLock<Option<f64>>,
    destroyed: AtomicBool,
}

impl std::fmt::Debug for CaptionFeeder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptionFeeder")
            .field("config", &self.config)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl CaptionFeeder {
    /// Create a feeder and start its decode pump
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: FeederConfig) -> Result<Self> {
        config.validate()?;

        let present = Arc::new(CaptionScheduler::new());
        let pump = DecodePump::spawn(
            CaptionDecoder::new(config.clone()),
            present.clone(),
            config.max_pending,
        )?;

        info!(
            timeshift = config.timeshift,
            data_identifier = config.data_identifier,
            language_tag = config.language_tag,
            "Caption feeder created"
        );

        Ok(Self {
            #[cfg(feature = "id3")]
            id3: Id3Extractor::new(config.id3_owner.clone()),
            config,
            decode: PresentationScheduler::new(),
            present,
            pump,
            previous_time: RwLock::new(None),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &FeederConfig {
        &self.config
    }

    /// Store a PES payload presented at `pts / timescale` seconds
    #[instrument(skip(self, data), fields(len))]
    pub async fn feed(&self, data: impl Into<Bytes> + Send, pts: f64, dts: f64, timescale: f64) {
        if self.is_destroyed() {
            return;
        }
        if timescale <= 0.0 || !timescale.is_finite() || !pts.is_finite() {
            warn!("Ignoring payload with an unusable timestamp");
            return;
        }
        let data = data.into();
        tracing::Span::current().record("len", data.len());

        let seconds = pts / timescale;
        self.decode.insert(seconds, RawSegment::new(seconds, data)).await;
    }

    /// Extract caption frames from ID3v2 tags presented at `pts` seconds
    ///
    /// Returns how many caption segments were stored.
    #[cfg(feature = "id3")]
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub async fn feed_id3(&self, data: &Bytes, pts: f64) -> usize {
        if self.is_destroyed() || !pts.is_finite() {
            return 0;
        }
        let segments = self.id3.extract(pts, data);
        let count = segments.len();
        for segment in segments {
            self.decode.insert(segment.pts, segment).await;
        }
        debug!(count, "ID3 caption frames stored");
        count
    }

    /// Wait until the pump has decoded everything handed to it so far
    pub async fn flush(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::PumpStopped);
        }
        self.pump.flush().await
    }

    /// Raw segments stored and not yet discarded
    pub async fn buffered(&self) -> usize {
        self.decode.len().await
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Stop decoding for good
    #[instrument(skip(self))]
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.clear().await;
        self.pump.shutdown().await;
        info!("Caption feeder destroyed");
    }

    async fn clear(&self) {
        *self.previous_time.write().await = None;
        self.pump.cancel().await;
    }

    async fn hand_off(&self, from: f64, to: f64) {
        for segment in self.decode.range(from, to).await {
            if let Err(e) = self.pump.enqueue(segment).await {
                warn!(error = %e, "Decode pump unavailable");
                return;
            }
        }
    }
}

#[async_trait]
impl Feeder for CaptionFeeder {
    async fn content(&self, time: f64) -> Option<Arc<TokenizedSegment>> {
        if self.is_destroyed() {
            return None;
        }

        let previous = self.previous_time.write().await.replace(time);
        if let Some(previous) = previous {
            self.hand_off(previous, time).await;
        }
        if let Some(retention) = self.config.retention {
            let evicted = self.decode.evict_before(time - retention).await;
            if evicted > 0 {
                trace!(evicted, "Evicted raw segments behind playback");
            }
        }

        self.present.floor(time - self.config.timeshift).await
    }

    #[instrument(skip(self))]
    async fn on_attach(&self) {
        info!("Caption feeder attached");
        self.clear().await;
    }

    #[instrument(skip(self))]
    async fn on_detach(&self) {
        info!("Caption feeder detached");
        self.clear().await;
    }

    #[instrument(skip(self))]
    async fn on_seeking(&self) {
        info!("Seeking, dropping decoded captions");
        self.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Directive, Glyph};
    use crate::transport::pes::tests::statement_pes;

    fn glyph_chars(segment: &TokenizedSegment) -> String {
        segment
            .directives
            .iter()
            .filter_map(|d| match d {
                Directive::Glyph(p) => match p.glyph {
                    Glyph::Char(c) => Some(c),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_content_follows_playback() {
        let feeder = CaptionFeeder::new(FeederConfig::default()).unwrap();
        feeder.feed(statement_pes(1, &[0xC1]), 90_000.0, 90_000.0, 90_000.0).await;

        assert!(feeder.content(0.0).await.is_none());
        feeder.content(1.5).await;
        feeder.flush().await.unwrap();

        let segment = feeder.content(1.5).await.unwrap();
        assert_eq!(segment.pts, 1.0);
        assert_eq!(glyph_chars(&segment), "ち");
    }

    #[tokio::test]
    async fn test_first_query_only_sets_position() {
        let feeder = CaptionFeeder::new(FeederConfig::default()).unwrap();
        feeder.feed(statement_pes(1, &[0xC1]), 1.0, 1.0, 1.0).await;

        feeder.content(5.0).await;
        feeder.flush().await.unwrap();
        assert!(feeder.content(5.0).await.is_none());
    }

    #[tokio::test]
    async fn test_timeshift_applies_to_lookup() {
        let config = FeederConfig {
            timeshift: 1.0,
            ..Default::default()
        };
        let feeder = CaptionFeeder::new(config).unwrap();
        feeder.feed(statement_pes(1, &[0xC1]), 2.0, 2.0, 1.0).await;

        feeder.content(0.0).await;
        feeder.content(2.5).await;
        feeder.flush().await.unwrap();
        assert!(feeder.content(2.5).await.is_none());
        assert!(feeder.content(3.0).await.is_some());
    }

    #[tokio::test]
    async fn test_seeking_clears_captions() {
        let feeder = CaptionFeeder::new(FeederConfig::default()).unwrap();
        feeder.feed(statement_pes(1, &[0xC1]), 1.0, 1.0, 1.0).await;
        feeder.content(0.0).await;
        feeder.content(2.0).await;
        feeder.flush().await.unwrap();
        assert!(feeder.content(2.0).await.is_some());

        feeder.on_seeking().await;
        assert!(feeder.content(2.0).await.is_none());
        assert!(feeder.content(3.0).await.is_none());
    }

    #[tokio::test]
    async fn test_retention_evicts_played_segments() {
        let config = FeederConfig {
            retention: Some(1.0),
            ..Default::default()
        };
        let feeder = CaptionFeeder::new(config).unwrap();
        feeder.feed(statement_pes(1, &[0xC1]), 1.0, 1.0, 1.0).await;
        feeder.feed(statement_pes(1, &[0xC2]), 5.0, 5.0, 1.0).await;

        feeder.content(0.0).await;
        feeder.content(4.0).await;
        assert_eq!(feeder.buffered().await, 1);

        // evicted only after it was handed to the pump
        feeder.flush().await.unwrap();
        assert_eq!(feeder.content(4.0).await.unwrap().pts, 1.0);
    }

    #[tokio::test]
    async fn test_raw_segments_kept_without_retention() {
        let feeder = CaptionFeeder::new(FeederConfig::default()).unwrap();
        feeder.feed(statement_pes(1, &[0xC1]), 1.0, 1.0, 1.0).await;
        feeder.content(0.0).await;
        feeder.content(100.0).await;
        assert_eq!(feeder.buffered().await, 1);
    }

    #[tokio::test]
    async fn test_bad_timescale_is_ignored() {
        let feeder = CaptionFeeder::new(FeederConfig::default()).unwrap();
        feeder.feed(statement_pes(1, &[0xC1]), 1.0, 1.0, 0.0).await;
        assert_eq!(feeder.buffered().await, 0);
    }

    #[tokio::test]
    async fn test_destroy() {
        let feeder = CaptionFeeder::new(FeederConfig::default()).unwrap();
        feeder.destroy().await;
        assert!(feeder.is_destroyed());
        assert!(feeder.content(1.0).await.is_none());
        assert!(matches!(feeder.flush().await, Err(Error::PumpStopped)));
        // idempotent
        feeder.destroy().await;
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = FeederConfig {
            language_tag: 0,
            ..Default::default()
        };
        assert!(matches!(CaptionFeeder::new(config), Err(Error::InvalidConfig(_))));
    }

    #[cfg(feature = "id3")]
    #[tokio::test]
    async fn test_feed_id3() {
        use crate::transport::id3::tests::{id3_tag, priv_frame};

        let feeder = CaptionFeeder::new(FeederConfig::default()).unwrap();
        let tag = id3_tag(&[priv_frame("aribb24.js", &statement_pes(1, &[0xC1]))]);
        assert_eq!(feeder.feed_id3(&Bytes::from(tag), 4.0).await, 1);
        assert_eq!(feeder.buffered().await, 1);
    }
}
