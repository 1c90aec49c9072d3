use crate::core::Block;
use log::info;

// Retarget constants
const INITIAL_DIFFICULTY: u32 = 15;
const MIN_DIFFICULTY: u32 = 1;
const MAX_DIFFICULTY: u32 = 255;
const ADJUSTMENT_INTERVAL: i64 = 5; // retarget every 5 blocks
const TARGET_BLOCK_TIME_MS: i64 = 10_000;
const SLOW_THRESHOLD_MS: i64 = 2 * TARGET_BLOCK_TIME_MS;
const FAST_THRESHOLD_MS: i64 = TARGET_BLOCK_TIME_MS / 2;

/// Difficulty retargeting: every fifth block compares the gap to the
/// previous block against the 10-second target and steps the difficulty
/// by one in the appropriate direction.
pub struct DifficultyAdjustment;

impl DifficultyAdjustment {
    /// Difficulty for the block about to be mined at `next_height`, given
    /// the current chain tip and the current wall-clock time.
    pub fn next_difficulty(tip: &Block, next_height: i64, now_ms: i64) -> u32 {
        let current = tip.get_difficulty();
        if next_height <= 0 || next_height % ADJUSTMENT_INTERVAL != 0 {
            return current;
        }

        let elapsed = now_ms - tip.get_timestamp();
        let adjusted = if elapsed > SLOW_THRESHOLD_MS {
            current.saturating_sub(1).max(MIN_DIFFICULTY)
        } else if elapsed < FAST_THRESHOLD_MS {
            (current + 1).min(MAX_DIFFICULTY)
        } else {
            current
        };

        if adjusted != current {
            info!(
                "Difficulty retarget at height {next_height}: {current} -> {adjusted} (last gap {elapsed}ms)"
            );
        }
        adjusted
    }

    pub fn initial_difficulty() -> u32 {
        INITIAL_DIFFICULTY
    }

    /// A difficulty is acceptable iff the target shift stays in range.
    pub fn is_valid_difficulty(difficulty: u32) -> bool {
        (MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&difficulty)
    }
}
