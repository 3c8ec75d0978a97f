//! # User Activities
//!
//! The data-layer role behind the sagas: idempotent single-shard operations.
//! The trait keeps the workflow layer and the data layer independently
//! testable; [`ShardedUserService`] is the Postgres implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::id;
use crate::model::{TransactionType, User, WELCOME_BONUS};
use crate::shard::{ShardRouter, ShardTopology, with_transaction};

/// Single-shard operations driven by the sagas. Every money movement is
/// expected to be idempotent under re-invocation with the same
/// `(transaction_id, transaction_type)` pair.
#[async_trait]
pub trait UserActivities: Send + Sync + 'static {
    /// Insert a user row with the welcome bonus on the shard owning the
    /// phone number. No idempotency key: a duplicate invocation fails on the
    /// unique constraint and the saga treats that as terminal.
    async fn create_user_record(
        &self,
        user_id: i64,
        phone: &str,
        email: &str,
    ) -> Result<(), AppError>;

    /// Insert the email-uniqueness row on the shard owning the email.
    async fn create_email_record(&self, user_id: i64, email: &str) -> Result<(), AppError>;

    /// Delete the user row if it exists; succeeds either way. The shard is
    /// derived from the ID.
    async fn delete_user_record_if_present(&self, user_id: i64) -> Result<(), AppError>;

    /// Delete the email row if it exists; succeeds either way.
    async fn delete_email_record_if_present(&self, email: &str) -> Result<(), AppError>;

    /// Debit the sender inside one transaction on the sender's shard.
    async fn decrease_money_from_user(
        &self,
        transaction_id: &str,
        transaction_type: TransactionType,
        from_user_id: i64,
        to_user_id: i64,
        amount: i64,
    ) -> Result<(), AppError>;

    /// Credit the recipient inside one transaction on the recipient's shard.
    /// Compensation calls this with the endpoints swapped and type
    /// `compensate`, which lands the refund on the original sender's shard.
    async fn increase_money_to_user(
        &self,
        transaction_id: &str,
        transaction_type: TransactionType,
        from_user_id: i64,
        to_user_id: i64,
        amount: i64,
    ) -> Result<(), AppError>;

    async fn get_user_by_id(&self, user_id: i64) -> Result<User, AppError>;

    async fn mark_user_as_blocked(&self, user_id: i64) -> Result<(), AppError>;

    /// Pure routing view, so orchestration code can place IDs without
    /// touching a pool.
    fn topology(&self) -> ShardTopology;
}

/// Postgres implementation over the shard router.
pub struct ShardedUserService {
    router: Arc<ShardRouter>,
}

impl ShardedUserService {
    pub fn new(router: Arc<ShardRouter>) -> Self {
        Self { router }
    }
}

const UNIQUE_VIOLATION_SQLSTATE: &str = "23505";

fn unique_violation(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION_SQLSTATE) => {
            Some(db.constraint().unwrap_or("unknown").to_string())
        }
        _ => None,
    }
}

fn into_app_error(err: sqlx::Error) -> AppError {
    match unique_violation(&err) {
        Some(constraint) => AppError::UniqueViolation { constraint },
        None => AppError::Database(err),
    }
}

#[async_trait]
impl UserActivities for ShardedUserService {
    async fn create_user_record(
        &self,
        user_id: i64,
        phone: &str,
        email: &str,
    ) -> Result<(), AppError> {
        let shard = self.router.topology().hash_phone_number(phone);
        let pool = self.router.user_pool(shard)?;
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO users (id, phone_number, email, balance, is_blocked, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, FALSE, $5, $5)",
        )
        .bind(user_id)
        .bind(phone)
        .bind(email)
        .bind(WELCOME_BONUS)
        .bind(now)
        .execute(pool)
        .await
        .map_err(into_app_error)?;

        Ok(())
    }

    async fn create_email_record(&self, user_id: i64, email: &str) -> Result<(), AppError> {
        let shard = self.router.topology().hash_email(email);
        let pool = self.router.email_pool(shard)?;
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO emails (email, user_id, created_at, updated_at) VALUES ($1, $2, $3, $3)",
        )
        .bind(email)
        .bind(user_id)
        .bind(now)
        .execute(pool)
        .await
        .map_err(into_app_error)?;

        Ok(())
    }

    async fn delete_user_record_if_present(&self, user_id: i64) -> Result<(), AppError> {
        let shard = id::parse_user_id(user_id).shard_index;
        let pool = self.router.user_pool(shard)?;

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(())
    }

    async fn delete_email_record_if_present(&self, email: &str) -> Result<(), AppError> {
        let shard = self.router.topology().hash_email(email);
        let pool = self.router.email_pool(shard)?;

        sqlx::query("DELETE FROM emails WHERE email = $1")
            .bind(email)
            .execute(pool)
            .await?;

        Ok(())
    }

    async fn decrease_money_from_user(
        &self,
        transaction_id: &str,
        transaction_type: TransactionType,
        from_user_id: i64,
        to_user_id: i64,
        amount: i64,
    ) -> Result<(), AppError> {
        if amount < 0 {
            return Err(AppError::NegativeAmount);
        }

        let shard = id::parse_user_id(from_user_id).shard_index;
        let pool = self.router.user_pool(shard)?;
        let transaction_id = transaction_id.to_string();

        with_transaction(pool, move |conn: &mut sqlx::PgConnection| {
            Box::pin(async move {
                let now = Utc::now();

                let inserted =
                    sqlx::query("INSERT INTO idempotence (id, type, created_at) VALUES ($1, $2, $3)")
                        .bind(&transaction_id)
                        .bind(transaction_type.as_str())
                        .bind(now)
                        .execute(&mut *conn)
                        .await;
                if let Err(err) = inserted {
                    if unique_violation(&err).is_some() {
                        // Already committed once: replaying is a no-op.
                        return Ok(());
                    }
                    return Err(AppError::Database(err));
                }

                let row = sqlx::query(
                    "SELECT balance, is_blocked FROM users WHERE id = $1 FOR UPDATE",
                )
                .bind(from_user_id)
                .fetch_optional(&mut *conn)
                .await?
                .ok_or(AppError::UserNotFound(from_user_id))?;

                let balance: i64 = row.try_get("balance")?;
                let is_blocked: bool = row.try_get("is_blocked")?;

                if is_blocked {
                    return Err(AppError::UserIsBlocked);
                }
                if balance < amount {
                    return Err(AppError::InsufficientFunds);
                }

                let updated =
                    sqlx::query("UPDATE users SET balance = balance - $1, updated_at = $2 WHERE id = $3")
                        .bind(amount)
                        .bind(now)
                        .bind(from_user_id)
                        .execute(&mut *conn)
                        .await?;
                if updated.rows_affected() != 1 {
                    return Err(AppError::UnexpectedRowCount(updated.rows_affected()));
                }

                sqlx::query(
                    "INSERT INTO transaction (id, from_id, to_id, amount, created_at) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(Uuid::new_v4())
                .bind(from_user_id)
                .bind(to_user_id)
                .bind(amount)
                .bind(now)
                .execute(&mut *conn)
                .await?;

                Ok(())
            })
        })
        .await
    }

    async fn increase_money_to_user(
        &self,
        transaction_id: &str,
        transaction_type: TransactionType,
        from_user_id: i64,
        to_user_id: i64,
        amount: i64,
    ) -> Result<(), AppError> {
        if amount < 0 {
            return Err(AppError::NegativeAmount);
        }

        let shard = id::parse_user_id(to_user_id).shard_index;
        let pool = self.router.user_pool(shard)?;
        let transaction_id = transaction_id.to_string();

        with_transaction(pool, move |conn: &mut sqlx::PgConnection| {
            Box::pin(async move {
                let now = Utc::now();

                let inserted =
                    sqlx::query("INSERT INTO idempotence (id, type, created_at) VALUES ($1, $2, $3)")
                        .bind(&transaction_id)
                        .bind(transaction_type.as_str())
                        .bind(now)
                        .execute(&mut *conn)
                        .await;
                if let Err(err) = inserted {
                    if unique_violation(&err).is_some() {
                        return Ok(());
                    }
                    return Err(AppError::Database(err));
                }

                let row = sqlx::query("SELECT is_blocked FROM users WHERE id = $1 FOR UPDATE")
                    .bind(to_user_id)
                    .fetch_optional(&mut *conn)
                    .await?
                    .ok_or(AppError::UserNotFound(to_user_id))?;

                let is_blocked: bool = row.try_get("is_blocked")?;
                if is_blocked {
                    return Err(AppError::UserIsBlocked);
                }

                let updated =
                    sqlx::query("UPDATE users SET balance = balance + $1, updated_at = $2 WHERE id = $3")
                        .bind(amount)
                        .bind(now)
                        .bind(to_user_id)
                        .execute(&mut *conn)
                        .await?;
                if updated.rows_affected() != 1 {
                    return Err(AppError::UnexpectedRowCount(updated.rows_affected()));
                }

                sqlx::query(
                    "INSERT INTO transaction (id, from_id, to_id, amount, created_at) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(Uuid::new_v4())
                .bind(from_user_id)
                .bind(to_user_id)
                .bind(amount)
                .bind(now)
                .execute(&mut *conn)
                .await?;

                Ok(())
            })
        })
        .await
    }

    async fn get_user_by_id(&self, user_id: i64) -> Result<User, AppError> {
        let shard = id::parse_user_id(user_id).shard_index;
        let pool = self.router.user_pool(shard)?;

        let row = sqlx::query(
            "SELECT id, phone_number, email, balance, is_blocked, created_at, updated_at \
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::UserNotFound(user_id))?;

        Ok(User {
            id: row.try_get("id")?,
            phone_number: row.try_get("phone_number")?,
            email: row.try_get("email")?,
            balance: row.try_get("balance")?,
            is_blocked: row.try_get("is_blocked")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn mark_user_as_blocked(&self, user_id: i64) -> Result<(), AppError> {
        let shard = id::parse_user_id(user_id).shard_index;
        let pool = self.router.user_pool(shard)?;

        let updated = sqlx::query("UPDATE users SET is_blocked = TRUE, updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(user_id)
            .execute(pool)
            .await?;
        if updated.rows_affected() != 1 {
            return Err(AppError::UserNotFound(user_id));
        }

        Ok(())
    }

    fn topology(&self) -> ShardTopology {
        self.router.topology()
    }
}
