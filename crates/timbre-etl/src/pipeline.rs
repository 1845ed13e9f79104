//! The per-track embedding run.
//!
//! For every catalog track, in shuffled order: skip it if it is already
//! checkpointed, otherwise resolve → fetch → decode → resample → embed.
//! A success is written to the checkpoint store first and then appended
//! to the result sink and flushed. A crash between the two loses only the
//! SQL line, which `export` can regenerate from the store; a failed
//! checkpoint write never reaches the sink.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use timbre_core::model::{AudioObjectKey, EmbeddingVector, TrackRecord};
use timbre_core::sql::SqlUpdateRecord;
use timbre_core::CheckpointStore;

use crate::audio::{decode_bytes, to_canonical_rate, Resample, RubatoResampler};
use crate::catalog::CatalogSource;
use crate::config::Config;
use crate::embed::EmbeddingExtractor;
use crate::error::{ErrorKind, PipelineError, TrackError, TrackResult};
use crate::resolve::resolve_track;
use crate::sink::ResultSink;
use crate::store::{ObjectStore, RetryingStore};

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub canonical_sample_rate: u32,
    /// Extra attempts for transient object-store failures (listings and reads).
    pub retrieval_retries: usize,
    /// First backoff delay; doubles on each retry.
    pub retry_delay: Duration,
    pub shuffle_seed: Option<u64>,
    /// Stop after attempting this many unprocessed tracks.
    pub limit: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            canonical_sample_rate: 48_000,
            retrieval_retries: 0,
            retry_delay: Duration::from_millis(500),
            shuffle_seed: None,
            limit: None,
        }
    }
}

impl RunOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            canonical_sample_rate: config.canonical_sample_rate,
            retrieval_retries: config.retrieval_retries,
            shuffle_seed: config.shuffle_seed,
            ..Self::default()
        }
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Failed tracks whose checkpoint was written but whose SQL line was
    /// not. Included in `failed`; the next run skips them.
    pub unflushed: usize,
    pub failures_by_kind: BTreeMap<ErrorKind, usize>,
}

impl RunSummary {
    fn record_failure(&mut self, err: &TrackError) {
        self.failed += 1;
        if matches!(err, TrackError::Unflushed(_)) {
            self.unflushed += 1;
        }
        *self.failures_by_kind.entry(err.kind()).or_default() += 1;
    }

    /// Failures of one kind.
    #[must_use]
    pub fn failures(&self, kind: ErrorKind) -> usize {
        self.failures_by_kind.get(&kind).copied().unwrap_or(0)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed: {}, Failed: {}, Skipped: {}, Total: {}",
            self.processed, self.failed, self.skipped, self.total
        )?;
        if !self.failures_by_kind.is_empty() {
            let kinds: Vec<String> = self
                .failures_by_kind
                .iter()
                .map(|(kind, count)| format!("{kind}={count}"))
                .collect();
            write!(f, " ({})", kinds.join(", "))?;
        }
        Ok(())
    }
}

/// Randomize the traversal order. A fixed seed gives a fixed order.
#[must_use]
pub fn shuffled(mut tracks: Vec<TrackRecord>, seed: Option<u64>) -> Vec<TrackRecord> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    tracks.shuffle(&mut rng);
    tracks
}

/// Drives the pipeline over a catalog, one track at a time.
#[derive(Debug)]
pub struct Orchestrator<'a> {
    objects: RetryingStore<'a>,
    checkpoints: &'a dyn CheckpointStore,
    extractor: EmbeddingExtractor,
    resampler: Box<dyn Resample>,
    options: RunOptions,
}

impl<'a> Orchestrator<'a> {
    #[must_use]
    pub fn new(
        objects: &'a dyn ObjectStore,
        checkpoints: &'a dyn CheckpointStore,
        extractor: EmbeddingExtractor,
        options: RunOptions,
    ) -> Self {
        Self {
            objects: RetryingStore::new(objects, options.retrieval_retries, options.retry_delay),
            checkpoints,
            extractor,
            resampler: Box::new(RubatoResampler),
            options,
        }
    }

    /// Replace the default rubato resampler.
    #[must_use]
    pub fn with_resampler(mut self, resampler: Box<dyn Resample>) -> Self {
        self.resampler = resampler;
        self
    }

    /// Load the catalog and process it.
    ///
    /// Only a catalog failure is returned as an error; per-track problems
    /// end up in the summary.
    pub fn run_catalog(
        &self,
        source: &CatalogSource,
        sink: &mut dyn ResultSink,
    ) -> Result<RunSummary, PipelineError> {
        let tracks = source.load(&self.objects)?;
        Ok(self.run(tracks, sink))
    }

    /// Process `tracks` in shuffled order.
    pub fn run(&self, tracks: Vec<TrackRecord>, sink: &mut dyn ResultSink) -> RunSummary {
        let tracks = shuffled(tracks, self.options.shuffle_seed);
        let total = tracks.len();
        let mut summary = RunSummary {
            total,
            ..RunSummary::default()
        };
        let mut attempted = 0;

        for (i, track) in tracks.iter().enumerate() {
            let progress = format!("[{}/{}]", i + 1, total);

            match self.checkpoints.has(&track.uri) {
                Ok(true) => {
                    log::debug!("{} Skipping {} (already embedded)", progress, track.uri);
                    summary.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    let err = TrackError::Persistence(format!("checkpoint lookup failed: {e}"));
                    report_failure(&progress, track, &err);
                    summary.record_failure(&err);
                    continue;
                }
            }

            if self.options.limit.is_some_and(|limit| attempted >= limit) {
                log::info!("Reached the limit of {} tracks, stopping", attempted);
                break;
            }
            attempted += 1;

            log::info!("{} Processing {} ({})", progress, track.uri, track);
            let outcome = self
                .process_track(track)
                .and_then(|embedding| self.commit(&track.uri, &embedding, sink));

            match outcome {
                Ok(()) => {
                    log::info!("{} Embedded {}", progress, track.uri);
                    summary.processed += 1;
                }
                Err(err) => {
                    report_failure(&progress, track, &err);
                    summary.record_failure(&err);
                }
            }
        }

        log::info!("Run complete. {}", summary);
        summary
    }

    /// Resolve, fetch, decode and embed one track.
    pub fn process_track(&self, track: &TrackRecord) -> TrackResult<EmbeddingVector> {
        let key = resolve_track(track, &self.objects)?;
        let bytes = self.fetch(&key)?;
        let decoded = decode_bytes(&key, bytes)?;
        let buffer = to_canonical_rate(decoded, self.options.canonical_sample_rate, &*self.resampler)?;
        self.extractor.extract(&buffer)
    }

    /// Persist a result: checkpoint first, then the flushed SQL line.
    fn commit(
        &self,
        uri: &str,
        embedding: &EmbeddingVector,
        sink: &mut dyn ResultSink,
    ) -> TrackResult<()> {
        self.checkpoints
            .put(uri, embedding)
            .map_err(|e| TrackError::Persistence(format!("checkpoint write failed: {e}")))?;

        let record = SqlUpdateRecord::new(uri, embedding);
        sink.append(&record)
            .and_then(|()| sink.flush())
            .map_err(|e| TrackError::Unflushed(e.to_string()))
    }

    /// Read the object, retrying transient store failures per the options.
    /// An empty payload is final.
    fn fetch(&self, key: &AudioObjectKey) -> TrackResult<Vec<u8>> {
        let bytes = self
            .objects
            .get(key.as_str())
            .map_err(|source| TrackError::Retrieval {
                key: key.to_string(),
                source,
            })?;
        if bytes.is_empty() {
            return Err(TrackError::EmptyObject {
                key: key.to_string(),
            });
        }
        Ok(bytes)
    }
}

fn report_failure(progress: &str, track: &TrackRecord, err: &TrackError) {
    match err.kind() {
        ErrorKind::Persistence => {
            log::error!("{} {} failed ({}): {}", progress, track.uri, err.kind(), err);
        }
        kind => log::warn!("{} {} failed ({}): {}", progress, track.uri, kind, err),
    }
}
