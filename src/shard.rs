//! # Shard Router
//!
//! Routing is pure and stateless: CRC32-IEEE of the partition key modulo the
//! shard count. [`ShardTopology`] carries only the counts, so orchestration
//! code can route without touching a connection pool; [`ShardRouter`] owns
//! the index → pool maps for the process lifetime.

use futures::future::BoxFuture;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use std::fmt;

use crate::config::DbConfig;
use crate::error::AppError;
use crate::migrations;

/// The two sharding dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardKind {
    User,
    Email,
}

impl fmt::Display for ShardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardKind::User => f.write_str("user"),
            ShardKind::Email => f.write_str("email"),
        }
    }
}

/// Shard counts per dimension; all routing derives from these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardTopology {
    pub user_shards: u32,
    pub email_shards: u32,
}

impl ShardTopology {
    pub fn new(user_shards: u32, email_shards: u32) -> Self {
        Self {
            user_shards,
            email_shards,
        }
    }

    /// User shard owning the given phone number.
    pub fn hash_phone_number(&self, phone: &str) -> u32 {
        crc32fast::hash(phone.as_bytes()) % self.user_shards
    }

    /// Email shard owning the given address.
    pub fn hash_email(&self, email: &str) -> u32 {
        crc32fast::hash(email.as_bytes()) % self.email_shards
    }
}

/// Owns one connection pool per configured shard.
pub struct ShardRouter {
    user_pools: HashMap<u32, PgPool>,
    email_pools: HashMap<u32, PgPool>,
    topology: ShardTopology,
}

impl ShardRouter {
    /// Open, ping and migrate every configured shard. A failure on any shard
    /// aborts startup.
    pub async fn connect(config: &DbConfig) -> Result<Self, AppError> {
        let mut user_pools = HashMap::new();
        for (&index, dsn) in &config.user_shards {
            let pool = open_shard(dsn, migrations::USER_SHARD_MIGRATIONS).await?;
            tracing::info!(kind = %ShardKind::User, shard = index, "shard ready");
            user_pools.insert(index, pool);
        }

        let mut email_pools = HashMap::new();
        for (&index, dsn) in &config.email_shards {
            let pool = open_shard(dsn, migrations::EMAIL_SHARD_MIGRATIONS).await?;
            tracing::info!(kind = %ShardKind::Email, shard = index, "shard ready");
            email_pools.insert(index, pool);
        }

        let topology = ShardTopology::new(user_pools.len() as u32, email_pools.len() as u32);

        Ok(Self {
            user_pools,
            email_pools,
            topology,
        })
    }

    pub fn topology(&self) -> ShardTopology {
        self.topology
    }

    pub fn user_pool(&self, index: u32) -> Result<&PgPool, AppError> {
        self.user_pools.get(&index).ok_or(AppError::ShardNotFound {
            kind: ShardKind::User,
            index,
        })
    }

    pub fn email_pool(&self, index: u32) -> Result<&PgPool, AppError> {
        self.email_pools.get(&index).ok_or(AppError::ShardNotFound {
            kind: ShardKind::Email,
            index,
        })
    }

    /// Close every pool. Called once at shutdown.
    pub async fn close(&self) {
        for pool in self.user_pools.values() {
            pool.close().await;
        }
        for pool in self.email_pools.values() {
            pool.close().await;
        }
    }
}

async fn open_shard(dsn: &str, ddl: &[&str]) -> Result<PgPool, AppError> {
    let pool = PgPoolOptions::new().connect(dsn).await?;

    // Liveness check before touching the schema.
    sqlx::query("SELECT 1").execute(&pool).await?;

    for statement in ddl {
        sqlx::query(statement).execute(&pool).await?;
    }

    Ok(pool)
}

/// Run `f` inside a database transaction.
///
/// The closure runs against the transaction's connection; an error rolls the
/// transaction back and propagates, success commits (and surfaces commit
/// errors). On panic the transaction guard rolls back on drop before the
/// unwind continues. No savepoints, no retry; retrying is the saga layer's
/// job.
pub async fn with_transaction<T, F>(pool: &PgPool, f: F) -> Result<T, AppError>
where
    T: Send,
    F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, AppError>> + Send,
{
    let mut tx = pool.begin().await?;

    match f(&mut *tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            let _ = tx.rollback().await;
            Err(err)
        }
    }
}
