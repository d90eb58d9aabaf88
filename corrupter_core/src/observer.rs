use crate::stats::RunStatistics;
use std::io::{self, Write};

/// Snapshot of how far a run has streamed, handed to observers after every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed_bytes: u64,
    pub total_size: u64,
}

impl Progress {
    /// Completion in percent. An empty source counts as fully processed.
    pub fn percentage(&self) -> f64 {
        if self.total_size == 0 {
            100.0
        } else {
            self.processed_bytes as f64 / self.total_size as f64 * 100.0
        }
    }
}

/// A `ProgressObserver` watches a corruption run from the outside.
///
/// The engine calls `on_start` once the source size is known, `on_chunk` after each
/// chunk has been written, and `on_finish` when the input is exhausted. Observers
/// are purely informational: a failing callback is logged by the engine and the
/// run carries on.
pub trait ProgressObserver {
    /// Returns a static name identifying the observer in log output.
    fn name(&self) -> &'static str;

    /// Called before the first chunk is read.
    fn on_start(&mut self, _total_size: u64) {}

    /// Called after each chunk write with the cumulative progress.
    ///
    /// # Returns
    /// `Ok(())` on success, or the I/O error raised while rendering the progress.
    fn on_chunk(&mut self, progress: &Progress) -> io::Result<()>;

    /// Called once after the final chunk, before the engine returns. Failures are
    /// logged by the engine like those of `on_chunk`.
    fn on_finish(&mut self, _stats: &RunStatistics) -> io::Result<()> {
        Ok(())
    }
}

/// An observer that ignores every notification.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoOpObserver;

impl ProgressObserver for NoOpObserver {
    fn name(&self) -> &'static str {
        "NoOpObserver"
    }

    fn on_chunk(&mut self, _progress: &Progress) -> io::Result<()> {
        Ok(())
    }
}

/// Renders a single, continuously rewritten progress line to a writer.
///
/// Each update starts with a carriage return so a terminal shows only the latest
/// percentage; `on_finish` terminates the line.
#[derive(Debug)]
pub struct ConsoleProgress<W: Write> {
    out: W,
}

impl<W: Write> ConsoleProgress<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl ConsoleProgress<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ProgressObserver for ConsoleProgress<W> {
    fn name(&self) -> &'static str {
        "ConsoleProgress"
    }

    fn on_chunk(&mut self, progress: &Progress) -> io::Result<()> {
        write!(
            self.out,
            "\rProgress: {:.2}% [{} / {} bytes]",
            progress.percentage(),
            progress.processed_bytes,
            progress.total_size
        )?;
        self.out.flush()
    }

    fn on_finish(&mut self, _stats: &RunStatistics) -> io::Result<()> {
        writeln!(self.out)?;
        self.out.flush()
    }
}
