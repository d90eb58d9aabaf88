use crate::config::{CorruptionConfig, CorruptionMode};
use rand::Rng;

/// Outcome of a single trial at one buffer position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// How many positions the walk moves forward before the next trial.
    pub advance: usize,
    /// How many bytes of the buffer were overwritten by this trial.
    pub corrupted: usize,
}

impl Step {
    const UNTOUCHED: Step = Step {
        advance: 1,
        corrupted: 0,
    };

    const SINGLE: Step = Step {
        advance: 1,
        corrupted: 1,
    };
}

/// Runs one Bernoulli trial at `position` and applies the configured mutation if it fires.
///
/// Exactly one uniform `f64` in `[0, 1)` is drawn for the trial; the trial fires when
/// that value is below the configured probability. Further draws happen only for a
/// fired trial, so the stream consumed from `rng` depends solely on the config and
/// the buffer length, never on the byte values.
///
/// Single-byte modes always advance by one. A fired burst advances by the full burst
/// length even when the buffer ends first; positions past the end are skipped and
/// not counted.
///
/// # Arguments
/// * `buffer`: The chunk being corrupted in place.
/// * `position`: Index of the trial. Must be less than `buffer.len()`.
/// * `config`: Probability and mode of the run.
/// * `rng`: The run's random source.
pub fn evaluate<R: Rng + ?Sized>(
    buffer: &mut [u8],
    position: usize,
    config: &CorruptionConfig,
    rng: &mut R,
) -> Step {
    if rng.random::<f64>() >= config.probability() {
        return Step::UNTOUCHED;
    }

    match config.mode() {
        CorruptionMode::Replace => {
            buffer[position] = rng.random();
            Step::SINGLE
        }
        CorruptionMode::BitFlip => {
            let bit = rng.random_range(0..8u32);
            buffer[position] ^= 1 << bit;
            Step::SINGLE
        }
        CorruptionMode::Zero => {
            buffer[position] = 0;
            Step::SINGLE
        }
        CorruptionMode::Burst { length } => {
            let end = position.saturating_add(length.get()).min(buffer.len());
            for byte in &mut buffer[position..end] {
                *byte = rng.random();
            }
            Step {
                advance: length.get(),
                corrupted: end - position,
            }
        }
    }
}

/// Walks a chunk left to right, trialling each reachable position, and returns the
/// number of corrupted bytes.
///
/// A burst that would run past the end of `buffer` is clamped to it; nothing is
/// carried over into the next chunk.
pub fn corrupt_chunk<R: Rng + ?Sized>(
    buffer: &mut [u8],
    config: &CorruptionConfig,
    rng: &mut R,
) -> u64 {
    let mut position = 0;
    let mut corrupted = 0u64;
    while position < buffer.len() {
        let step = evaluate(buffer, position, config, rng);
        corrupted += step.corrupted as u64;
        position = position.saturating_add(step.advance);
    }
    corrupted
}
