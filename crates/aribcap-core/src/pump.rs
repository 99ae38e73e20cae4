//! Decode pump
//!
//! A single background task drains a FIFO of raw segments, decodes each one
//! and inserts the result into the presentation scheduler. Cancelling starts
//! a new epoch: everything still queued is dropped and the scheduler is
//! cleared, while the task itself keeps running. A segment decoded in an old
//! epoch is discarded instead of inserted.
//!
//! ```text
//!   enqueue ──▶ [ queue ] ──notify──▶ worker ──decode──▶ scheduler
//!                   ▲                   │
//!   cancel ─── epoch + 1, clear ────────┘ (stale results dropped)
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::{Association, FeederConfig};
use crate::parser::parse;
use crate::scheduler::PresentationScheduler;
use crate::state::CaptionPlaneState;
use crate::tokenizer::{total_wait, Tokenizer};
use crate::transport::pes::{parse_pes, CaptionData, CaptionManagement};
use crate::types::{RawSegment, TokenizedSegment};
use crate::{Error, Result};

/// Scheduler of decoded captions shared by the pump and its readers
pub type CaptionScheduler = PresentationScheduler<Arc<TokenizedSegment>>;

/// Turns raw PES data packets into tokenized segments
///
/// Caption management data selects the character-set profile; statements
/// of the configured language are tokenized and parsed from the profile's
/// initial state.
#[derive(Debug)]
pub struct CaptionDecoder {
    config: FeederConfig,
    tokenizer: Option<Tokenizer>,
}

impl CaptionDecoder {
    pub fn new(config: FeederConfig) -> Self {
        let tokenizer = config
            .association
            .map(|association| Tokenizer::new(association, config.tokenizer.clone()));
        Self { config, tokenizer }
    }

    /// Association currently in use, if one was forced or detected
    pub fn association(&self) -> Option<Association> {
        self.tokenizer.as_ref().map(Tokenizer::association)
    }

    /// Decode one segment
    ///
    /// `Ok(None)` for anything that carries no presentable caption:
    /// malformed envelopes, other data identifiers, other languages and
    /// caption management.
    pub fn decode(&mut self, segment: &RawSegment) -> Result<Option<TokenizedSegment>> {
        let Some(packet) = parse_pes(&segment.data) else {
            return Ok(None);
        };
        if packet.data_identifier != self.config.data_identifier {
            trace!(
                data_identifier = packet.data_identifier,
                "Skipping data packet of another service"
            );
            return Ok(None);
        }

        let statement = match packet.group.caption()? {
            None => return Ok(None),
            Some(CaptionData::Management(management)) => {
                self.select_profile(&management)?;
                return Ok(None);
            }
            Some(CaptionData::Statement(statement)) => statement,
        };
        if packet.group.language_tag() != self.config.language_tag {
            trace!(language_tag = packet.group.language_tag(), "Skipping other caption language");
            return Ok(None);
        }

        let config = &self.config;
        let tokenizer = self.tokenizer.get_or_insert_with(|| {
            debug!("No caption management seen yet, assuming Japanese captions");
            Tokenizer::new(Association::Arib, config.tokenizer.clone())
        });

        let tokens = tokenizer.tokenize_units(&statement.units);
        let initial_state = CaptionPlaneState::for_association(tokenizer.association());
        let output = parse(&initial_state, &tokens);
        let wait = total_wait(&tokens);

        Ok(Some(TokenizedSegment {
            pts: segment.pts,
            duration: if wait > 0.0 { wait } else { f64::INFINITY },
            initial_state,
            directives: output.directives,
        }))
    }

    fn select_profile(&mut self, management: &CaptionManagement) -> Result<()> {
        if self.config.association.is_some() {
            return Ok(());
        }
        let Some(language) = management.language(self.config.language_tag) else {
            debug!(language_tag = self.config.language_tag, "Caption language not announced");
            return Ok(());
        };

        match Association::from_language(language) {
            Some(association) => {
                if self.association() != Some(association) {
                    info!(language, ?association, "Caption profile selected");
                    self.tokenizer = Some(Tokenizer::new(association, self.config.tokenizer.clone()));
                }
                Ok(())
            }
            None => Err(Error::UnsupportedLanguage {
                language: language.to_string(),
            }),
        }
    }
}

struct Shared {
    queue: Mutex<VecDeque<RawSegment>>,
    notify: Notify,
    epoch: AtomicU64,
    /// Segments enqueued but not yet finished
    pending: watch::Sender<usize>,
    max_pending: Option<usize>,
}

/// Background decode worker
pub struct DecodePump {
    shared: Arc<Shared>,
    scheduler: Arc<CaptionScheduler>,
    shutdown: watch::Sender<bool>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl DecodePump {
    /// Spawn the worker on the current tokio runtime
    pub fn spawn(
        decoder: CaptionDecoder,
        scheduler: Arc<CaptionScheduler>,
        max_pending: Option<usize>,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Internal(format!("decode pump needs a tokio runtime: {}", e)))?;

        let (pending, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            epoch: AtomicU64::new(0),
            pending,
            max_pending,
        });
        let (shutdown, shutdown_rx) = watch::channel(false);

        let worker = runtime.spawn(run(
            shared.clone(),
            scheduler.clone(),
            decoder,
            shutdown_rx,
        ));

        Ok(Self {
            shared,
            scheduler,
            shutdown,
            worker: std::sync::Mutex::new(Some(worker)),
        })
    }

    /// Queue a segment for decoding
    pub async fn enqueue(&self, segment: RawSegment) -> Result<()> {
        if *self.shutdown.borrow() {
            return Err(Error::PumpStopped);
        }

        let mut queue = self.shared.queue.lock().await;
        let dropped = match self.shared.max_pending {
            Some(max) if queue.len() >= max => queue.pop_front(),
            _ => None,
        };
        if let Some(dropped) = dropped {
            debug!(pts = dropped.pts, "Decode queue full, dropping oldest segment");
        } else {
            self.shared.pending.send_modify(|n| *n += 1);
        }
        queue.push_back(segment);
        drop(queue);

        self.shared.notify.notify_one();
        Ok(())
    }

    /// Drop queued work, clear the scheduler and start a new epoch
    #[instrument(skip(self))]
    pub async fn cancel(&self) {
        let mut queue = self.shared.queue.lock().await;
        let dropped = queue.len();
        queue.clear();
        let epoch = self.shared.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.scheduler.clear().await;
        self.shared.pending.send_modify(|n| *n = n.saturating_sub(dropped));
        drop(queue);

        self.shared.notify.notify_one();
        debug!(epoch, dropped, "Decode epoch cancelled");
    }

    pub fn epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::Acquire)
    }

    /// Segments queued or being decoded
    pub fn pending(&self) -> usize {
        *self.shared.pending.borrow()
    }

    /// Wait until everything enqueued so far has been handled
    ///
    /// Fails with `PumpStopped` once the pump is shut down.
    pub async fn flush(&self) -> Result<()> {
        let mut pending = self.shared.pending.subscribe();
        let mut stopped = self.shutdown.subscribe();

        tokio::select! {
            drained = pending.wait_for(|&n| n == 0) => match drained {
                Ok(_) if !*self.shutdown.borrow() => Ok(()),
                _ => Err(Error::PumpStopped),
            },
            _ = stopped.wait_for(|&stop| stop) => Err(Error::PumpStopped),
        }
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown.borrow()
            && self
                .worker
                .lock()
                .map(|worker| worker.as_ref().is_some_and(|w| !w.is_finished()))
                .unwrap_or(false)
    }

    /// Stop the worker and wait for it to exit
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let worker = self.worker.lock().ok().and_then(|mut worker| worker.take());
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "Decode pump exited abnormally");
            }
        }

        let mut queue = self.shared.queue.lock().await;
        let dropped = queue.len();
        queue.clear();
        self.shared.pending.send_replace(0);
        drop(queue);
        if dropped > 0 {
            debug!(dropped, "Discarded undecoded segments on shutdown");
        }
    }
}

impl Drop for DecodePump {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn run(
    shared: Arc<Shared>,
    scheduler: Arc<CaptionScheduler>,
    mut decoder: CaptionDecoder,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Decode pump started");

    while !*shutdown.borrow() {
        let (epoch, batch) = {
            let mut queue = shared.queue.lock().await;
            let epoch = shared.epoch.load(Ordering::Acquire);
            (epoch, queue.drain(..).collect::<Vec<_>>())
        };

        if batch.is_empty() {
            tokio::select! {
                _ = shared.notify.notified() => continue,
                _ = shutdown.changed() => break,
            }
        }

        for segment in batch {
            process(&shared, &scheduler, &mut decoder, epoch, segment).await;
            shared.pending.send_modify(|n| *n = n.saturating_sub(1));
        }
    }

    info!("Decode pump stopped");
}

async fn process(
    shared: &Shared,
    scheduler: &CaptionScheduler,
    decoder: &mut CaptionDecoder,
    epoch: u64,
    segment: RawSegment,
) {
    if shared.epoch.load(Ordering::Acquire) != epoch {
        trace!(pts = segment.pts, "Skipping segment of a cancelled epoch");
        return;
    }

    match decoder.decode(&segment) {
        Ok(Some(decoded)) => {
            // the queue lock orders this insert against `cancel`
            let _queue = shared.queue.lock().await;
            if shared.epoch.load(Ordering::Acquire) != epoch {
                trace!(pts = segment.pts, "Discarding segment decoded before a seek");
                return;
            }
            debug!(
                pts = decoded.pts,
                duration = decoded.duration,
                directives = decoded.directives.len(),
                "Caption decoded"
            );
            scheduler.insert(decoded.pts, Arc::new(decoded)).await;
        }
        Ok(None) => {}
        Err(e) if e.is_recoverable() => {
            warn!(pts = segment.pts, code = e.error_code(), error = %e, "Dropping caption segment");
        }
        Err(e) => {
            error!(pts = segment.pts, code = e.error_code(), error = %e, "Caption segment failed");
        }
    }
}
