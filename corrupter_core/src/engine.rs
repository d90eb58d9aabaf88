use crate::config::CorruptionConfig;
use crate::observer::ProgressObserver;
use crate::stats::RunStatistics;
use crate::strategy::corrupt_chunk;
use rand::Rng;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upper bound on the bytes held in memory at once.
pub const CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Errors that end a corruption run. None of them are retried.
#[derive(Error, Debug)]
pub enum CorruptError {
    /// The source could not be sized or opened. Raised before the destination is touched.
    #[error("Input file not found or unreadable {path:?}: {source}")]
    SourceNotFound { path: PathBuf, source: io::Error },

    /// Opening the destination, or any read or write while streaming, failed.
    /// Bytes already written to the destination stay there.
    #[error("File read/write failed: {0}")]
    Io(#[from] io::Error),

    /// An engine parameter was rejected before any I/O.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Streams a source through the corruption strategy in bounded-size chunks.
#[derive(Debug, Clone)]
pub struct Engine {
    config: CorruptionConfig,
    chunk_size: usize,
}

impl Engine {
    pub fn new(config: CorruptionConfig) -> Self {
        Self {
            config,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Overrides the chunk size. Bursts are clamped at every chunk boundary, so this
    /// changes the output of burst-mode runs.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Result<Self, CorruptError> {
        if chunk_size == 0 {
            return Err(CorruptError::InvalidArgument(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        self.chunk_size = chunk_size;
        Ok(self)
    }

    pub fn config(&self) -> &CorruptionConfig {
        &self.config
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Corrupts `source` into `dest`, truncating any existing destination.
    ///
    /// The source is sized and opened before the destination is created, so a missing
    /// source leaves the destination untouched. The random source comes from
    /// [`CorruptionConfig::rng`].
    pub fn run(
        &self,
        source: &Path,
        dest: &Path,
        observer: &mut dyn ProgressObserver,
    ) -> Result<RunStatistics, CorruptError> {
        let source_not_found = |source_err: io::Error| CorruptError::SourceNotFound {
            path: source.to_path_buf(),
            source: source_err,
        };
        let metadata = fs::metadata(source).map_err(source_not_found)?;
        if !metadata.is_file() {
            return Err(source_not_found(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }
        let total_size = metadata.len();
        let input = File::open(source).map_err(source_not_found)?;

        if dest.exists() {
            warn!(dest = ?dest, "Destination exists and will be overwritten");
        }
        let output = File::create(dest)?;

        info!(
            source = ?source,
            dest = ?dest,
            total_size,
            mode = %self.config.mode(),
            probability = self.config.probability(),
            seed = ?self.config.seed(),
            "Starting corruption run"
        );

        let mut rng = self.config.rng();
        let stats = self.run_stream(input, output, total_size, &mut rng, observer)?;

        if stats.processed_bytes != total_size {
            warn!(
                expected = total_size,
                processed = stats.processed_bytes,
                "Source size changed while streaming"
            );
        }
        info!(
            processed = stats.processed_bytes,
            corrupted = stats.corrupted_bytes,
            rate = stats.actual_rate(),
            "Corruption run finished"
        );
        Ok(stats)
    }

    /// Runs the chunk loop over any reader/writer pair with a caller-supplied random source.
    ///
    /// Each chunk is filled until it holds `chunk_size` bytes or the reader is exhausted,
    /// corrupted in place, and written out whole. The output therefore always has the
    /// same length as the input.
    ///
    /// # Arguments
    /// * `reader`: Source of the bytes to corrupt.
    /// * `writer`: Destination for the corrupted bytes. Flushed before returning.
    /// * `total_size`: Expected input length, used only for progress reporting.
    /// * `rng`: Random source, consumed sequentially in position order.
    /// * `observer`: Receives progress after every chunk.
    pub fn run_stream<R, W, G>(
        &self,
        mut reader: R,
        mut writer: W,
        total_size: u64,
        rng: &mut G,
        observer: &mut dyn ProgressObserver,
    ) -> Result<RunStatistics, CorruptError>
    where
        R: Read,
        W: Write,
        G: Rng + ?Sized,
    {
        let mut stats = RunStatistics::new(total_size);
        observer.on_start(total_size);

        loop {
            let mut chunk = Vec::with_capacity(self.chunk_size);
            let read = reader
                .by_ref()
                .take(self.chunk_size as u64)
                .read_to_end(&mut chunk)?;
            if read == 0 {
                break;
            }

            let corrupted = corrupt_chunk(&mut chunk, &self.config, rng);
            writer.write_all(&chunk)?;
            stats.record_chunk(chunk.len(), corrupted);
            debug!(
                chunk = stats.chunks,
                len = chunk.len(),
                corrupted,
                "Chunk written"
            );

            if let Err(e) = observer.on_chunk(&stats.progress()) {
                warn!(observer = observer.name(), error = %e, "Progress observer failed");
            }
        }

        writer.flush()?;
        if let Err(e) = observer.on_finish(&stats) {
            warn!(observer = observer.name(), error = %e, "Progress observer failed");
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CorruptionMode;
    use crate::observer::{NoOpObserver, Progress};
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingObserver {
        started_with: Option<u64>,
        updates: Vec<Progress>,
        finished: Option<RunStatistics>,
    }

    impl ProgressObserver for RecordingObserver {
        fn name(&self) -> &'static str {
            "RecordingObserver"
        }

        fn on_start(&mut self, total_size: u64) {
            self.started_with = Some(total_size);
        }

        fn on_chunk(&mut self, progress: &Progress) -> io::Result<()> {
            self.updates.push(*progress);
            Ok(())
        }

        fn on_finish(&mut self, stats: &RunStatistics) -> io::Result<()> {
            self.finished = Some(*stats);
            Ok(())
        }
    }

    struct FailingObserver;

    impl ProgressObserver for FailingObserver {
        fn name(&self) -> &'static str {
            "FailingObserver"
        }

        fn on_chunk(&mut self, _progress: &Progress) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal went away"))
        }

        fn on_finish(&mut self, _stats: &RunStatistics) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal went away"))
        }
    }

    /// Hands out `good` bytes, then fails every later read.
    struct FailingReader {
        good: Vec<u8>,
        offset: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.offset == self.good.len() {
                return Err(io::Error::other("device removed"));
            }
            let n = buf.len().min(self.good.len() - self.offset);
            buf[..n].copy_from_slice(&self.good[self.offset..self.offset + n]);
            self.offset += n;
            Ok(n)
        }
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn engine(probability: f64, mode: CorruptionMode, seed: u64, chunk_size: usize) -> Engine {
        let config = CorruptionConfig::new(probability, mode, Some(seed)).unwrap();
        Engine::new(config).with_chunk_size(chunk_size).unwrap()
    }

    fn sample_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[test]
    fn output_length_matches_input_across_chunks() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("in.bin");
        let dest = dir.path().join("out.bin");
        std::fs::write(&source, sample_bytes(1000)).unwrap();

        for mode in [
            CorruptionMode::Replace,
            CorruptionMode::BitFlip,
            CorruptionMode::Zero,
            CorruptionMode::burst(7).unwrap(),
        ] {
            let stats = engine(0.2, mode, 1, 64)
                .run(&source, &dest, &mut NoOpObserver)
                .unwrap();
            assert_eq!(std::fs::metadata(&dest).unwrap().len(), 1000);
            assert_eq!(stats.processed_bytes, 1000);
            assert_eq!(stats.total_size, 1000);
            assert!(stats.corrupted_bytes <= stats.processed_bytes);
            assert_eq!(stats.chunks, 16);
        }
    }

    #[test]
    fn seeded_runs_are_byte_identical() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("in.bin");
        std::fs::write(&source, sample_bytes(10_000)).unwrap();
        let first = dir.path().join("first.bin");
        let second = dir.path().join("second.bin");

        let engine = engine(0.05, CorruptionMode::burst(3).unwrap(), 4242, 512);
        let first_stats = engine.run(&source, &first, &mut NoOpObserver).unwrap();
        let second_stats = engine.run(&source, &second, &mut NoOpObserver).unwrap();

        assert_eq!(
            std::fs::read(&first).unwrap(),
            std::fs::read(&second).unwrap()
        );
        assert_eq!(first_stats, second_stats);
        assert!(first_stats.corrupted_bytes > 0);
    }

    #[test]
    fn zero_probability_copies_source_verbatim() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("in.bin");
        let dest = dir.path().join("out.bin");
        let data = sample_bytes(3000);
        std::fs::write(&source, &data).unwrap();

        let stats = engine(0.0, CorruptionMode::Replace, 0, 1024)
            .run(&source, &dest, &mut NoOpObserver)
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), data);
        assert_eq!(stats.corrupted_bytes, 0);
        assert_eq!(stats.actual_rate(), 0.0);
    }

    #[test]
    fn zero_mode_scenario_on_ten_zero_bytes() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("zeros.bin");
        let dest = dir.path().join("zeros_corrupted.bin");
        std::fs::write(&source, [0u8; 10]).unwrap();

        let config = CorruptionConfig::new(1.0, CorruptionMode::Zero, Some(42)).unwrap();
        let stats = Engine::new(config)
            .run(&source, &dest, &mut NoOpObserver)
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), vec![0u8; 10]);
        assert_eq!(stats.corrupted_bytes, 10);
        assert_eq!(stats.actual_rate(), 100.0);
    }

    #[test]
    fn bitflip_scenario_on_saturated_bytes() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("ff.bin");
        let dest = dir.path().join("ff_corrupted.bin");
        std::fs::write(&source, [0xFFu8; 10]).unwrap();

        let config = CorruptionConfig::new(1.0, CorruptionMode::BitFlip, Some(7)).unwrap();
        let stats = Engine::new(config)
            .run(&source, &dest, &mut NoOpObserver)
            .unwrap();
        let output = std::fs::read(&dest).unwrap();
        assert_eq!(output.len(), 10);
        assert!(output.iter().all(|b| b.count_ones() == 7));
        assert_eq!(stats.corrupted_bytes, 10);
    }

    #[test]
    fn missing_source_is_reported_and_destination_left_alone() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("does_not_exist.bin");
        let dest = dir.path().join("out.bin");
        std::fs::write(&dest, b"precious").unwrap();

        let result = engine(1.0, CorruptionMode::Zero, 0, 16).run(&source, &dest, &mut NoOpObserver);
        match result {
            Err(CorruptError::SourceNotFound { path, .. }) => assert_eq!(path, source),
            other => panic!("expected SourceNotFound, got {other:?}"),
        }
        assert_eq!(std::fs::read(&dest).unwrap(), b"precious");
    }

    #[test]
    fn directory_source_is_reported_and_destination_left_alone() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a_directory");
        std::fs::create_dir(&source).unwrap();
        let dest = dir.path().join("out.bin");
        std::fs::write(&dest, b"precious").unwrap();

        let result =
            Engine::new(CorruptionConfig::default()).run(&source, &dest, &mut NoOpObserver);
        match result {
            Err(CorruptError::SourceNotFound { path, source: err }) => {
                assert_eq!(path, source);
                assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
            }
            other => panic!("expected SourceNotFound, got {other:?}"),
        }
        assert_eq!(std::fs::read(&dest).unwrap(), b"precious");
    }

    #[test]
    fn missing_source_does_not_create_destination() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let result = engine(1.0, CorruptionMode::Zero, 0, 16).run(
            &dir.path().join("nope.bin"),
            &dest,
            &mut NoOpObserver,
        );
        assert!(matches!(result, Err(CorruptError::SourceNotFound { .. })));
        assert!(!dest.exists());
    }

    #[test]
    fn existing_destination_is_truncated() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("in.bin");
        let dest = dir.path().join("out.bin");
        std::fs::write(&source, b"short").unwrap();
        std::fs::write(&dest, vec![b'x'; 4096]).unwrap();

        engine(0.0, CorruptionMode::Replace, 0, 16)
            .run(&source, &dest, &mut NoOpObserver)
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"short");
    }

    #[test]
    fn empty_source_produces_empty_destination() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("empty.bin");
        let dest = dir.path().join("empty_out.bin");
        std::fs::write(&source, b"").unwrap();

        let mut observer = RecordingObserver::default();
        let stats = engine(1.0, CorruptionMode::Replace, 0, 16)
            .run(&source, &dest, &mut observer)
            .unwrap();
        assert_eq!(stats, RunStatistics::new(0));
        assert_eq!(stats.actual_rate(), 0.0);
        assert!(observer.updates.is_empty());
        assert_eq!(observer.started_with, Some(0));
        assert_eq!(observer.finished, Some(stats));
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 0);
    }

    #[test]
    fn observer_sees_monotonic_progress_ending_at_full_size() {
        let mut observer = RecordingObserver::default();
        let data = sample_bytes(250);
        let mut output = Vec::new();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let stats = engine(0.5, CorruptionMode::Replace, 5, 100)
            .run_stream(data.as_slice(), &mut output, 250, &mut rng, &mut observer)
            .unwrap();

        let processed: Vec<u64> = observer.updates.iter().map(|p| p.processed_bytes).collect();
        assert_eq!(processed, vec![100, 200, 250]);
        assert_eq!(observer.updates.last().unwrap().percentage(), 100.0);
        assert_eq!(observer.finished, Some(stats));
        assert_eq!(output.len(), 250);
    }

    #[test]
    fn burst_is_clamped_at_chunk_boundary() {
        // 20 bytes in chunks of 10 with bursts of 4: each chunk takes trials at 0, 4 and 8,
        // the last of which only reaches 2 bytes. A carried-over burst would need 5 trials.
        let data = vec![0u8; 20];
        let mut output = Vec::new();
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let stats = engine(1.0, CorruptionMode::burst(4).unwrap(), 8, 10)
            .run_stream(data.as_slice(), &mut output, 20, &mut rng, &mut NoOpObserver)
            .unwrap();
        assert_eq!(stats.corrupted_bytes, 20);
        assert_eq!(stats.chunks, 2);

        let mut expected = vec![0u8; 20];
        let mut reference_rng = ChaCha8Rng::seed_from_u64(8);
        let config = CorruptionConfig::new(1.0, CorruptionMode::burst(4).unwrap(), None).unwrap();
        for chunk in expected.chunks_mut(10) {
            corrupt_chunk(chunk, &config, &mut reference_rng);
        }
        assert_eq!(output, expected);
    }

    #[test]
    fn chunk_size_changes_burst_output() {
        let data = vec![0u8; 30];
        let run = |chunk_size| {
            let mut output = Vec::new();
            let mut rng = ChaCha8Rng::seed_from_u64(1);
            engine(1.0, CorruptionMode::burst(4).unwrap(), 1, chunk_size)
                .run_stream(data.as_slice(), &mut output, 30, &mut rng, &mut NoOpObserver)
                .unwrap();
            output
        };
        assert_ne!(run(10), run(30));
    }

    #[test]
    fn write_failure_surfaces_as_io_error() {
        let data = sample_bytes(32);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let result = engine(0.0, CorruptionMode::Replace, 0, 16).run_stream(
            data.as_slice(),
            FailingWriter,
            32,
            &mut rng,
            &mut NoOpObserver,
        );
        assert!(matches!(result, Err(CorruptError::Io(_))));
    }

    #[test]
    fn read_failure_surfaces_as_io_error_and_keeps_written_chunks() {
        let first_chunk = sample_bytes(16);
        let reader = FailingReader {
            good: first_chunk.clone(),
            offset: 0,
        };
        let mut output = Vec::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let result = engine(0.0, CorruptionMode::Replace, 0, 16).run_stream(
            reader,
            &mut output,
            64,
            &mut rng,
            &mut NoOpObserver,
        );
        assert!(matches!(result, Err(CorruptError::Io(_))));
        assert_eq!(output, first_chunk);
    }

    #[test]
    fn failing_observer_does_not_abort_the_run() {
        let data = sample_bytes(64);
        let mut output = Vec::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let stats = engine(0.0, CorruptionMode::Replace, 0, 16)
            .run_stream(data.as_slice(), &mut output, 64, &mut rng, &mut FailingObserver)
            .unwrap();
        assert_eq!(stats.processed_bytes, 64);
        assert_eq!(output, data);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let result = Engine::new(CorruptionConfig::default()).with_chunk_size(0);
        assert!(matches!(result, Err(CorruptError::InvalidArgument(_))));
        assert_eq!(Engine::new(CorruptionConfig::default()).chunk_size(), CHUNK_SIZE);
    }
}
