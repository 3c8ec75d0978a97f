//! # User Identifier Codec
//!
//! A user ID is a signed 64-bit integer that self-encodes where and when the
//! user was created:
//!
//! ```text
//! bits [63:22]  milliseconds since 2024-01-01T00:00:00Z (42 bits)
//! bits [21:20]  user shard index                         (2 bits)
//! bits [19:0]   uniform random counter                   (20 bits)
//! ```
//!
//! Because the shard index is embedded, locating a user's shard never needs
//! a lookup table. Monotonicity is not required: the low 20 random bits keep
//! same-millisecond IDs apart, and the rare collision surfaces as a unique
//! violation at insert time.

use chrono::{DateTime, Utc};
use rand::Rng;

/// Epoch the timestamp field counts from: 2024-01-01T00:00:00Z.
const CUSTOM_EPOCH_MS: i64 = 1_704_067_200_000;

const SHARD_BITS: u32 = 2;
const COUNTER_BITS: u32 = 20;

/// Number of user shards the encoding supports.
pub const USER_SHARD_COUNT: u32 = 1 << SHARD_BITS;

const SHARD_MASK: i64 = (USER_SHARD_COUNT as i64) - 1;
const COUNTER_MASK: i64 = (1 << COUNTER_BITS) - 1;

/// Decoded fields of a user ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedUserId {
    pub created_at: DateTime<Utc>,
    pub shard_index: u32,
    pub counter: u32,
}

/// Generate a fresh user ID on the given shard.
///
/// Fails fast on an out-of-range shard index: that is a programming error,
/// not a recoverable condition.
pub fn generate_user_id(shard_index: u32) -> i64 {
    assert!(
        shard_index < USER_SHARD_COUNT,
        "shard index {shard_index} out of range 0..{USER_SHARD_COUNT}"
    );

    let elapsed_ms = Utc::now().timestamp_millis() - CUSTOM_EPOCH_MS;
    let counter: i64 = rand::thread_rng().gen_range(0..1 << COUNTER_BITS);

    (elapsed_ms << (SHARD_BITS + COUNTER_BITS)) | ((shard_index as i64) << COUNTER_BITS) | counter
}

/// Decode the timestamp, shard index and counter embedded in a user ID.
pub fn parse_user_id(user_id: i64) -> ParsedUserId {
    let timestamp_ms = (user_id >> (SHARD_BITS + COUNTER_BITS)) + CUSTOM_EPOCH_MS;
    let created_at = DateTime::from_timestamp_millis(timestamp_ms).unwrap_or(DateTime::UNIX_EPOCH);

    ParsedUserId {
        created_at,
        shard_index: ((user_id >> COUNTER_BITS) & SHARD_MASK) as u32,
        counter: (user_id & COUNTER_MASK) as u32,
    }
}
