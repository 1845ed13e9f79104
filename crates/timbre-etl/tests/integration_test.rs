//! Integration tests for the resolve → decode → embed → checkpoint run.
//!
//! Audio objects are small WAV files synthesized with hound and served from
//! the in-memory object store; the embedding model is a scripted stand-in
//! so results are predictable.

use std::io::{self, Cursor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};
use tempfile::TempDir;
use timbre_core::model::{SampleBuffer, TrackRecord};
use timbre_core::sql::SqlUpdateRecord;
use timbre_core::{CheckpointDb, CheckpointStore, MemoryCheckpointStore};
use timbre_etl::audio::Resample;
use timbre_etl::embed::{EmbeddingExtractor, EmbeddingMatrix, EmbeddingModel};
use timbre_etl::error::{ErrorKind, TrackResult};
use timbre_etl::export::export_checkpoints;
use timbre_etl::pipeline::{Orchestrator, RunOptions};
use timbre_etl::sink::{ResultSink, SqlSink};
use timbre_etl::store::MemoryObjectStore;
use timbre_etl::{CatalogSource, MelEmbedder};

const WIDTH: usize = 4;

fn wav_bytes(sample_rate: u32, frames: usize, level: i16) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(level).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn track(uri: &str, name: &str, album: &str, artist: &str) -> TrackRecord {
    TrackRecord::new(uri, name, Some(album.to_string()), vec![artist.to_string()])
}

/// Emits two frames whose mean is `[rate_khz, 1, 2, 3]`.
#[derive(Debug, Default)]
struct ScriptedModel {
    calls: Arc<AtomicUsize>,
}

impl EmbeddingModel for ScriptedModel {
    fn width(&self) -> usize {
        WIDTH
    }

    #[allow(clippy::cast_precision_loss)]
    fn embed(&self, _samples: &[f32], sample_rate: u32) -> anyhow::Result<EmbeddingMatrix> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let khz = sample_rate as f32 / 1000.0;
        Ok(vec![vec![khz, 0.0, 1.0, 2.0], vec![khz, 2.0, 3.0, 4.0]])
    }
}

#[derive(Debug)]
struct NanModel;

impl EmbeddingModel for NanModel {
    fn width(&self) -> usize {
        WIDTH
    }

    fn embed(&self, _samples: &[f32], _sample_rate: u32) -> anyhow::Result<EmbeddingMatrix> {
        Ok(vec![vec![0.0, f32::NAN, 0.0, 0.0]])
    }
}

#[derive(Debug)]
struct InfiniteModel;

impl EmbeddingModel for InfiniteModel {
    fn width(&self) -> usize {
        WIDTH
    }

    fn embed(&self, _samples: &[f32], _sample_rate: u32) -> anyhow::Result<EmbeddingMatrix> {
        Ok(vec![vec![f32::INFINITY, 1.0, 0.0, 0.0]])
    }
}

#[derive(Debug, Default)]
struct SpyResampler {
    calls: Arc<AtomicUsize>,
}

impl Resample for SpyResampler {
    fn resample(&self, buffer: &SampleBuffer, target_rate: u32) -> TrackResult<SampleBuffer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SampleBuffer::new(buffer.samples.clone(), target_rate))
    }
}

/// Accepts appends but fails every flush.
#[derive(Debug, Default)]
struct BrokenSink {
    appended: usize,
}

impl ResultSink for BrokenSink {
    fn append(&mut self, _record: &SqlUpdateRecord) -> io::Result<()> {
        self.appended += 1;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::other("disk full"))
    }
}

fn scripted() -> EmbeddingExtractor {
    EmbeddingExtractor::new(Box::new(ScriptedModel::default()), WIDTH)
}

fn options() -> RunOptions {
    RunOptions {
        shuffle_seed: Some(42),
        retry_delay: Duration::ZERO,
        ..RunOptions::default()
    }
}

/// Three resolvable tracks and one that has no audio object.
fn library() -> (MemoryObjectStore, Vec<TrackRecord>) {
    let store = MemoryObjectStore::new();
    store.insert(
        "Daft Punk/Discovery/01 - One More Time.mp3.txt",
        b"not audio".to_vec(),
    );
    store.insert(
        "Daft Punk/Discovery/01 - One More Time.wav",
        wav_bytes(48_000, 4_800, 1_000),
    );
    store.insert("Daft Punk/Discovery/Aerodynamic.wav", wav_bytes(48_000, 4_800, 2_000));
    store.insert("AC_DC/Back in Black/06 - Back in Black.wav", wav_bytes(48_000, 4_800, 3_000));

    let tracks = vec![
        track("spotify:track:1", "One More Time", "Discovery", "Daft Punk"),
        track("spotify:track:2", "Aerodynamic", "Discovery", "Daft Punk"),
        track("spotify:track:3", "Back in Black", "Back in Black", "AC/DC"),
        track("spotify:track:4", "Missing Song", "Discovery", "Daft Punk"),
    ];
    (store, tracks)
}

fn sink_text(sink: SqlSink<Vec<u8>>) -> String {
    String::from_utf8(sink.into_inner()).unwrap()
}

#[test]
fn test_run_embeds_resolvable_tracks() {
    let (store, tracks) = library();
    let checkpoints = MemoryCheckpointStore::new();
    let mut sink = SqlSink::new(Vec::new());

    let summary = Orchestrator::new(&store, &checkpoints, scripted(), options()).run(tracks, &mut sink);

    assert_eq!(summary.total, 4);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures(ErrorKind::Resolution), 1);
    assert_eq!(checkpoints.count().unwrap(), 3);

    let embedding = checkpoints.get("spotify:track:1").unwrap().unwrap();
    assert_eq!(embedding.as_slice(), &[48.0, 1.0, 2.0, 3.0]);

    let text = sink_text(sink);
    assert_eq!(text.matches("UPDATE track").count(), 3);
    assert_eq!(text.matches("WHERE uri = 'spotify:track:1';").count(), 1);
    assert!(text.contains(
        "UPDATE track\nSET embedding = '[48.000000,1.000000,2.000000,3.000000]'::vector\nWHERE uri = 'spotify:track:1';\n\n"
    ));
    assert!(!text.contains("spotify:track:4"));
}

#[test]
fn test_second_run_is_idempotent() {
    let (store, tracks) = library();
    let checkpoints = MemoryCheckpointStore::new();

    let mut first_sink = SqlSink::new(Vec::new());
    let first = Orchestrator::new(&store, &checkpoints, scripted(), options())
        .run(tracks.clone(), &mut first_sink);
    let after_first = checkpoints.snapshot().unwrap();

    let model = ScriptedModel::default();
    let calls = Arc::clone(&model.calls);
    let mut second_sink = SqlSink::new(Vec::new());
    let second = Orchestrator::new(
        &store,
        &checkpoints,
        EmbeddingExtractor::new(Box::new(model), WIDTH),
        RunOptions {
            shuffle_seed: Some(7),
            ..options()
        },
    )
    .run(tracks, &mut second_sink);

    assert_eq!(first.processed, 3);
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(checkpoints.snapshot().unwrap(), after_first);
    assert!(sink_text(second_sink).is_empty());
}

#[test]
fn test_nan_embedding_is_not_checkpointed() {
    let (store, tracks) = library();
    let checkpoints = MemoryCheckpointStore::new();
    let mut sink = SqlSink::new(Vec::new());

    let summary = Orchestrator::new(
        &store,
        &checkpoints,
        EmbeddingExtractor::new(Box::new(NanModel), WIDTH),
        options(),
    )
    .run(tracks, &mut sink);

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.failures(ErrorKind::Embedding), 3);
    assert_eq!(checkpoints.count().unwrap(), 0);
    assert!(sink_text(sink).is_empty());
}

#[test]
fn test_canonical_rate_skips_resampler() {
    let (store, tracks) = library();
    let checkpoints = MemoryCheckpointStore::new();
    let spy = SpyResampler::default();
    let calls = Arc::clone(&spy.calls);

    let summary = Orchestrator::new(&store, &checkpoints, scripted(), options())
        .with_resampler(Box::new(spy))
        .run(tracks, &mut SqlSink::new(Vec::new()));

    assert_eq!(summary.processed, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_other_rates_are_resampled() {
    let store = MemoryObjectStore::new();
    store.insert("A/X/Song.wav", wav_bytes(44_100, 4_410, 1_000));
    let checkpoints = MemoryCheckpointStore::new();
    let spy = SpyResampler::default();
    let calls = Arc::clone(&spy.calls);

    let summary = Orchestrator::new(&store, &checkpoints, scripted(), options())
        .with_resampler(Box::new(spy))
        .run(vec![track("u", "Song", "X", "A")], &mut SqlSink::new(Vec::new()));

    assert_eq!(summary.processed, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // The model saw the canonical rate.
    assert_eq!(checkpoints.get("u").unwrap().unwrap().as_slice()[0], 48.0);
}

#[test]
fn test_checkpoint_precedes_sink_output() {
    let (store, tracks) = library();
    let checkpoints = MemoryCheckpointStore::new();
    let mut sink = BrokenSink::default();

    let summary = Orchestrator::new(&store, &checkpoints, scripted(), options()).run(tracks, &mut sink);

    // Every embedded track reached the store even though no SQL line was flushed.
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.failures(ErrorKind::Persistence), 3);
    assert_eq!(summary.unflushed, 3);
    assert_eq!(checkpoints.count().unwrap(), 3);
    assert_eq!(sink.appended, 3);

    // The lost lines are recoverable from the store.
    let mut export = SqlSink::new(Vec::new());
    assert_eq!(export_checkpoints(&checkpoints, &mut export).unwrap(), 3);
}

#[test]
fn test_failed_checkpoint_write_skips_sink() {
    let (store, tracks) = library();
    let checkpoints = MemoryCheckpointStore::new();
    checkpoints.fail_writes(true);
    let mut sink = SqlSink::new(Vec::new());

    let summary = Orchestrator::new(&store, &checkpoints, scripted(), options()).run(tracks, &mut sink);

    assert_eq!(summary.failures(ErrorKind::Persistence), 3);
    assert_eq!(summary.unflushed, 0);
    assert_eq!(summary.failures(ErrorKind::Resolution), 1);
    assert!(sink_text(sink).is_empty());
}

#[test]
fn test_failures_do_not_stop_the_run() {
    let store = MemoryObjectStore::new();
    store.insert("A/X/Empty.wav", Vec::new());
    store.insert("A/X/Garbage.mp3", b"garbage".to_vec());
    store.insert("A/X/Good.wav", wav_bytes(48_000, 480, 500));

    let tracks = vec![
        track("u-empty", "Empty", "X", "A"),
        track("u-garbage", "Garbage", "X", "A"),
        track("u-good", "Good", "X", "A"),
        track("u-missing", "Missing", "X", "A"),
    ];
    let checkpoints = MemoryCheckpointStore::new();

    let summary = Orchestrator::new(&store, &checkpoints, scripted(), options())
        .run(tracks, &mut SqlSink::new(Vec::new()));

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.failures(ErrorKind::Retrieval), 1);
    assert_eq!(summary.failures(ErrorKind::Decode), 1);
    assert_eq!(summary.failures(ErrorKind::Resolution), 1);
    assert!(checkpoints.has("u-good").unwrap());
}

#[test]
fn test_transient_retrieval_is_retried_when_enabled() {
    let build = || {
        let store = MemoryObjectStore::new();
        store.insert("A/X/Song.wav", wav_bytes(48_000, 480, 500));
        store.fail_next_gets("A/X/Song.wav", 1);
        store
    };
    let tracks = vec![track("u", "Song", "X", "A")];

    let store = build();
    let checkpoints = MemoryCheckpointStore::new();
    let summary = Orchestrator::new(&store, &checkpoints, scripted(), options())
        .run(tracks.clone(), &mut SqlSink::new(Vec::new()));
    assert_eq!(summary.failures(ErrorKind::Retrieval), 1);
    assert_eq!(store.get_calls(), 1);

    let store = build();
    let checkpoints = MemoryCheckpointStore::new();
    let summary = Orchestrator::new(
        &store,
        &checkpoints,
        scripted(),
        RunOptions {
            retrieval_retries: 1,
            ..options()
        },
    )
    .run(tracks, &mut SqlSink::new(Vec::new()));
    assert_eq!(summary.processed, 1);
    assert_eq!(store.get_calls(), 2);
}

#[test]
fn test_transient_listing_is_retried_when_enabled() {
    let store = MemoryObjectStore::new();
    store.insert("A/X/Song.wav", wav_bytes(48_000, 480, 500));
    let tracks = vec![track("u", "Song", "X", "A")];

    store.fail_next_listings(1);
    let checkpoints = MemoryCheckpointStore::new();
    let summary = Orchestrator::new(&store, &checkpoints, scripted(), options())
        .run(tracks.clone(), &mut SqlSink::new(Vec::new()));
    assert_eq!(summary.failures(ErrorKind::Retrieval), 1);
    assert!(!checkpoints.has("u").unwrap());

    store.fail_next_listings(1);
    let summary = Orchestrator::new(
        &store,
        &checkpoints,
        scripted(),
        RunOptions {
            retrieval_retries: 1,
            ..options()
        },
    )
    .run(tracks, &mut SqlSink::new(Vec::new()));
    assert_eq!(summary.processed, 1);
    assert!(checkpoints.has("u").unwrap());
}

#[test]
fn test_infinite_embedding_is_not_checkpointed() {
    let (store, tracks) = library();
    let temp_dir = TempDir::new().unwrap();
    let checkpoints = CheckpointDb::open(temp_dir.path().join("checkpoints.db")).unwrap();
    let mut sink = SqlSink::new(Vec::new());

    let summary = Orchestrator::new(
        &store,
        &checkpoints,
        EmbeddingExtractor::new(Box::new(InfiniteModel), WIDTH),
        options(),
    )
    .run(tracks, &mut sink);

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.failures(ErrorKind::Embedding), 3);
    assert_eq!(checkpoints.count().unwrap(), 0);
    assert!(!sink_text(sink).contains("inf"));

    let mut export = SqlSink::new(Vec::new());
    assert_eq!(export_checkpoints(&checkpoints, &mut export).unwrap(), 0);
}

#[test]
fn test_empty_object_is_not_retried() {
    let store = MemoryObjectStore::new();
    store.insert("A/X/Song.wav", Vec::new());
    let checkpoints = MemoryCheckpointStore::new();

    let summary = Orchestrator::new(
        &store,
        &checkpoints,
        scripted(),
        RunOptions {
            retrieval_retries: 3,
            ..options()
        },
    )
    .run(vec![track("u", "Song", "X", "A")], &mut SqlSink::new(Vec::new()));

    assert_eq!(summary.failures(ErrorKind::Retrieval), 1);
    assert_eq!(store.get_calls(), 1);
}

#[test]
fn test_limit_counts_only_attempted_tracks() {
    let (store, tracks) = library();
    let checkpoints = MemoryCheckpointStore::new();
    let orchestrator = Orchestrator::new(
        &store,
        &checkpoints,
        scripted(),
        RunOptions {
            limit: Some(1),
            ..options()
        },
    );

    let first = orchestrator.run(tracks.clone(), &mut SqlSink::new(Vec::new()));
    assert_eq!(first.processed + first.failed, 1);

    let second = orchestrator.run(tracks, &mut SqlSink::new(Vec::new()));
    assert_eq!(second.skipped, first.processed);
    assert_eq!(second.processed + second.failed, 1);
}

#[test]
fn test_run_catalog_from_object_store() {
    let (store, _) = library();
    store.insert(
        "tracks.json",
        br#"[{"uri": "spotify:track:2", "name": "Aerodynamic", "album": "Discovery", "artists": "Daft Punk"}]"#
            .to_vec(),
    );
    let checkpoints = MemoryCheckpointStore::new();

    let summary = Orchestrator::new(&store, &checkpoints, scripted(), options())
        .run_catalog(
            &CatalogSource::Object("tracks.json".to_string()),
            &mut SqlSink::new(Vec::new()),
        )
        .unwrap();

    assert_eq!(summary.total, 1);
    assert_eq!(summary.processed, 1);
}

#[test]
fn test_missing_catalog_aborts_before_processing() {
    let store = MemoryObjectStore::new();
    let checkpoints = MemoryCheckpointStore::new();
    let result = Orchestrator::new(&store, &checkpoints, scripted(), options()).run_catalog(
        &CatalogSource::Object("tracks.json".to_string()),
        &mut SqlSink::new(Vec::new()),
    );
    assert!(result.is_err());
}

#[test]
fn test_sqlite_checkpoints_and_sql_file_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("checkpoints.db");
    let sql_path = temp_dir.path().join("updates.sql");
    let (store, tracks) = library();

    {
        let checkpoints = CheckpointDb::open(&db_path).unwrap();
        let mut sink = SqlSink::open_append(&sql_path).unwrap();
        let summary = Orchestrator::new(
            &store,
            &checkpoints,
            EmbeddingExtractor::new(Box::new(MelEmbedder::new(16)), 16),
            options(),
        )
        .run(tracks.clone(), &mut sink);
        assert_eq!(summary.processed, 3);
    }

    // A restarted worker finds nothing left to do.
    let checkpoints = CheckpointDb::open(&db_path).unwrap();
    let mut sink = SqlSink::open_append(&sql_path).unwrap();
    let summary = Orchestrator::new(
        &store,
        &checkpoints,
        EmbeddingExtractor::new(Box::new(MelEmbedder::new(16)), 16),
        options(),
    )
    .run(tracks, &mut sink);
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.skipped, 3);

    let text = std::fs::read_to_string(&sql_path).unwrap();
    assert!(text.starts_with("-- Generated embeddings updates\n\n"));
    assert_eq!(text.matches("UPDATE track").count(), 3);
    assert_eq!(checkpoints.get("spotify:track:3").unwrap().unwrap().len(), 16);
}
