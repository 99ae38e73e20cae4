//! Presentation scheduler
//!
//! An ordered map from presentation time to segment. Inserting at an
//! existing time replaces the previous entry. Each operation takes the lock
//! once, so an insert is never observed half done.

use std::collections::BTreeMap;
use std::ops::Bound;

use tokio::sync::RwLock;
use tracing::trace;

use crate::types::Pts;

/// Segments ordered by presentation time
#[derive(Debug)]
pub struct PresentationScheduler<T> {
    entries: RwLock<BTreeMap<Pts, T>>,
}

impl<T> Default for PresentationScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PresentationScheduler<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T: Clone> PresentationScheduler<T> {
    /// Insert, replacing any entry at the same time
    pub async fn insert(&self, pts: f64, segment: T) {
        let replaced = self.entries.write().await.insert(Pts(pts), segment);
        if replaced.is_some() {
            trace!(pts, "Replaced segment with the same pts");
        }
    }

    /// Entries with `lo <= pts < hi`, in time order
    pub async fn range(&self, lo: f64, hi: f64) -> Vec<T> {
        if Pts(lo) >= Pts(hi) {
            return Vec::new();
        }
        self.entries
            .read()
            .await
            .range((Bound::Included(Pts(lo)), Bound::Excluded(Pts(hi))))
            .map(|(_, segment)| segment.clone())
            .collect()
    }

    /// Entry with the greatest `pts <= time`
    ///
    /// The entry's own duration is not consulted.
    pub async fn floor(&self, time: f64) -> Option<T> {
        self.entries
            .read()
            .await
            .range(..=Pts(time))
            .next_back()
            .map(|(_, segment)| segment.clone())
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Drop entries with `pts < time`, returning how many were dropped
    pub async fn evict_before(&self, time: f64) -> usize {
        let mut entries = self.entries.write().await;
        let kept = entries.split_off(&Pts(time));
        std::mem::replace(&mut *entries, kept).len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn scheduler(keys: &[f64]) -> PresentationScheduler<f64> {
        let scheduler = PresentationScheduler::new();
        for &key in keys {
            scheduler.insert(key, key).await;
        }
        scheduler
    }

    #[tokio::test]
    async fn test_floor() {
        let scheduler = scheduler(&[5.0, 1.0, 3.0]).await;

        assert_eq!(scheduler.floor(0.999).await, None);
        assert_eq!(scheduler.floor(1.0).await, Some(1.0));
        assert_eq!(scheduler.floor(3.0).await, Some(3.0));
        assert_eq!(scheduler.floor(4.999).await, Some(3.0));
        assert_eq!(scheduler.floor(5.0).await, Some(5.0));
        assert_eq!(scheduler.floor(1e9).await, Some(5.0));
    }

    #[tokio::test]
    async fn test_range_is_half_open() {
        let scheduler = scheduler(&[1.0, 2.0, 3.0, 4.0]).await;

        assert_eq!(scheduler.range(2.0, 4.0).await, vec![2.0, 3.0]);
        assert_eq!(scheduler.range(0.0, 1.0).await, Vec::<f64>::new());
        assert_eq!(scheduler.range(4.0, 2.0).await, Vec::<f64>::new());
        assert_eq!(scheduler.range(3.0, 3.0).await, Vec::<f64>::new());
    }

    #[tokio::test]
    async fn test_duplicate_pts_overwrites() {
        let scheduler = PresentationScheduler::new();
        scheduler.insert(1.0, "first").await;
        scheduler.insert(1.0, "second").await;

        assert_eq!(scheduler.len().await, 1);
        assert_eq!(scheduler.floor(1.0).await, Some("second"));
    }

    #[test]
    fn test_usable_without_runtime() {
        let scheduler = PresentationScheduler::new();
        tokio_test::block_on(scheduler.insert(2.0, 'b'));
        tokio_test::block_on(scheduler.insert(1.0, 'a'));

        assert_eq!(tokio_test::block_on(scheduler.range(0.0, 3.0)), vec!['a', 'b']);
    }

    #[tokio::test]
    async fn test_evict_before() {
        let scheduler = scheduler(&[1.0, 2.0, 3.0]).await;

        assert_eq!(scheduler.evict_before(2.0).await, 1);
        assert_eq!(scheduler.range(0.0, 10.0).await, vec![2.0, 3.0]);
        assert_eq!(scheduler.evict_before(0.5).await, 0);
    }

    #[tokio::test]
    async fn test_clear() {
        let scheduler = scheduler(&[1.0, 2.0]).await;
        scheduler.clear().await;

        assert!(scheduler.is_empty().await);
        assert_eq!(scheduler.floor(2.0).await, None);
    }
}
