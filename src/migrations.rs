//! # Schema Bootstrap
//!
//! Idempotent DDL applied to every shard at router startup. A failure on any
//! shard aborts startup.

/// DDL for user shards: account rows, the money-movement idempotency table
/// and the append-only transaction journal.
pub const USER_SHARD_MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id           BIGINT PRIMARY KEY,
        phone_number TEXT NOT NULL UNIQUE,
        email        TEXT NOT NULL UNIQUE,
        balance      BIGINT NOT NULL,
        is_blocked   BOOLEAN NOT NULL DEFAULT FALSE,
        created_at   TIMESTAMPTZ NOT NULL,
        updated_at   TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS idempotence (
        id         TEXT NOT NULL,
        type       TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (id, type)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transaction (
        id         UUID PRIMARY KEY,
        from_id    BIGINT NOT NULL,
        to_id      BIGINT NOT NULL,
        amount     BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

/// DDL for email shards: the global email-uniqueness index, keyed by the
/// email itself.
pub const EMAIL_SHARD_MIGRATIONS: &[&str] = &[r#"
    CREATE TABLE IF NOT EXISTS emails (
        email      TEXT PRIMARY KEY,
        user_id    BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#];
