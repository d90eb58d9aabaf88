use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use serde::Deserialize;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_PROBABILITY: f64 = 0.00001;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Probability must be a number between 0 and 1, got {0}")]
    InvalidProbability(f64),
    #[error("Burst length must be a positive integer, got {0}")]
    InvalidBurstLength(u64),
    #[error("Mode 'burst' requires a burst-length")]
    MissingBurstLength,
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// How a triggered trial alters the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptionMode {
    /// Overwrite the byte with a uniformly random value.
    #[default]
    Replace,
    /// Invert one uniformly chosen bit of the byte.
    BitFlip,
    /// Set the byte to zero.
    Zero,
    /// Overwrite `length` consecutive bytes with random values, clamped to the chunk end.
    Burst { length: NonZeroUsize },
}

impl CorruptionMode {
    pub fn burst(length: u64) -> Result<Self, ConfigError> {
        usize::try_from(length)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(|length| CorruptionMode::Burst { length })
            .ok_or(ConfigError::InvalidBurstLength(length))
    }

    pub fn name(&self) -> &'static str {
        match self {
            CorruptionMode::Replace => "replace",
            CorruptionMode::BitFlip => "bitflip",
            CorruptionMode::Zero => "zero",
            CorruptionMode::Burst { .. } => "burst",
        }
    }
}

impl fmt::Display for CorruptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorruptionMode::Burst { length } => write!(f, "burst ({length} bytes)"),
            other => f.write_str(other.name()),
        }
    }
}

/// Immutable parameters of a single corruption run.
///
/// Only constructible through [`CorruptionConfig::new`], so a value in hand always
/// carries a probability within `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CorruptionConfig {
    probability: f64,
    mode: CorruptionMode,
    seed: Option<u64>,
}

impl CorruptionConfig {
    pub fn new(
        probability: f64,
        mode: CorruptionMode,
        seed: Option<u64>,
    ) -> Result<Self, ConfigError> {
        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(ConfigError::InvalidProbability(probability));
        }
        Ok(Self {
            probability,
            mode,
            seed,
        })
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn mode(&self) -> CorruptionMode {
        self.mode
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Builds the random source for a run.
    ///
    /// A seeded config always yields the same stream; without a seed the generator
    /// is keyed from the thread-local OS-backed RNG.
    pub fn rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        }
    }
}

impl Default for CorruptionConfig {
    fn default() -> Self {
        Self {
            probability: DEFAULT_PROBABILITY,
            mode: CorruptionMode::default(),
            seed: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ModeKind {
    #[default]
    Replace,
    BitFlip,
    Zero,
    Burst,
}

/// Settings as read from a TOML file or assembled from command-line flags.
///
/// Every field is optional; [`CorrupterSettings::into_config`] fills the gaps with
/// built-in defaults and validates the result.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CorrupterSettings {
    #[serde(default)]
    pub probability: Option<f64>,
    #[serde(default)]
    pub mode: Option<ModeKind>,
    #[serde(default)]
    pub burst_length: Option<u64>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl CorrupterSettings {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn into_config(self) -> Result<CorruptionConfig, ConfigError> {
        let mode = match self.mode.unwrap_or_default() {
            ModeKind::Replace => CorruptionMode::Replace,
            ModeKind::BitFlip => CorruptionMode::BitFlip,
            ModeKind::Zero => CorruptionMode::Zero,
            ModeKind::Burst => {
                CorruptionMode::burst(self.burst_length.ok_or(ConfigError::MissingBurstLength)?)?
            }
        };
        CorruptionConfig::new(
            self.probability.unwrap_or(DEFAULT_PROBABILITY),
            mode,
            self.seed,
        )
    }
}
