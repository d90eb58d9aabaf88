pub mod config;
pub mod engine;
pub mod observer;
pub mod paths;
pub mod stats;
pub mod strategy;

pub use config::{ConfigError, CorrupterSettings, CorruptionConfig, CorruptionMode, ModeKind};
pub use engine::{CHUNK_SIZE, CorruptError, Engine};
pub use observer::{ConsoleProgress, NoOpObserver, Progress, ProgressObserver};
pub use paths::{default_output_path, same_file};
pub use stats::{RunReport, RunStatistics};
pub use strategy::{Step, corrupt_chunk, evaluate};
