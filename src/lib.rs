//! # shardledger
//!
//! A user-account service whose persistence is horizontally sharded across
//! multiple Postgres databases and whose multi-shard mutations (registration,
//! inter-user money transfer) run as sagas with compensations on a workflow
//! engine.
//!
//! - [`id`]: 64-bit user IDs that self-encode creation time and shard index
//! - [`shard`]: CRC32 routing, per-shard pools, the transaction helper
//! - [`config`]: YAML shard configuration
//! - [`migrations`]: idempotent per-shard DDL
//! - [`activities`]: idempotent single-shard operations behind the sagas
//! - [`saga`]: the registration and transfer orchestrations + worker host
//! - [`error`]: the sentinel error taxonomy crossing the saga boundary

pub mod activities;
pub mod config;
pub mod error;
pub mod id;
pub mod migrations;
pub mod model;
pub mod saga;
pub mod shard;

pub use activities::{ShardedUserService, UserActivities};
pub use config::Config;
pub use error::AppError;
pub use model::{TransactionType, TransferMoneyParams, User, WELCOME_BONUS};
pub use saga::UserSaga;
pub use shard::{ShardRouter, ShardTopology};
