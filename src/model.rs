//! Domain records stored on the shards and the payloads moving between saga
//! steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Initial balance credited to every new user, in currency minor units.
pub const WELCOME_BONUS: i64 = 100_000;

/// A row in the per-shard `users` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub phone_number: String,
    pub email: String,
    pub balance: i64,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Discriminator of the `(id, type)` idempotency key for money movements.
///
/// A replayed `decrease` is a no-op; a `compensate` after a committed
/// `decrease` is distinguishable because the type differs. That is what
/// yields exactly-once effect on top of at-least-once dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Decrease,
    Increase,
    Compensate,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Decrease => "decrease",
            TransactionType::Increase => "increase",
            TransactionType::Compensate => "compensate",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input of the transfer saga and of each money-movement activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferMoneyParams {
    /// Saga-assigned transaction identifier; half of the idempotency key.
    pub transaction_id: String,
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub amount: i64,
}
