//! Shared test harness: the sagas run through the real engine and workers
//! against an in-memory data layer with the same semantics as the Postgres
//! implementation (per-shard uniqueness, `(id, type)` idempotence, blocked
//! and balance checks).

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use saga_engine::{ActivityOptions, RetryPolicy, SagaClient, SagaEngine};
use shardledger::activities::UserActivities;
use shardledger::error::AppError;
use shardledger::id;
use shardledger::model::{TransactionType, User, WELCOME_BONUS};
use shardledger::saga::{self, UserSaga, WorkerHost};
use shardledger::shard::ShardTopology;

pub struct JournalEntry {
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub amount: i64,
}

#[derive(Default)]
struct UserShard {
    users: HashMap<i64, User>,
    idempotence: HashSet<(String, &'static str)>,
    journal: Vec<JournalEntry>,
}

struct State {
    user_shards: Vec<UserShard>,
    email_shards: Vec<HashMap<String, i64>>,
}

/// In-memory stand-in for [`shardledger::ShardedUserService`].
pub struct InMemoryUserActivities {
    topology: ShardTopology,
    state: Mutex<State>,
}

impl InMemoryUserActivities {
    pub fn new() -> Self {
        let topology = ShardTopology::new(id::USER_SHARD_COUNT, 2);
        let state = State {
            user_shards: (0..topology.user_shards)
                .map(|_| UserShard::default())
                .collect(),
            email_shards: (0..topology.email_shards).map(|_| HashMap::new()).collect(),
        };
        Self {
            topology,
            state: Mutex::new(state),
        }
    }

    pub fn user_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.user_shards.iter().map(|s| s.users.len()).sum()
    }

    pub fn users_per_shard(&self) -> Vec<usize> {
        let state = self.state.lock().unwrap();
        state.user_shards.iter().map(|s| s.users.len()).collect()
    }

    pub fn email_exists(&self, email: &str) -> bool {
        let state = self.state.lock().unwrap();
        let shard = self.topology.hash_email(email) as usize;
        state.email_shards[shard].contains_key(email)
    }

    pub fn journal_len(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.user_shards.iter().map(|s| s.journal.len()).sum()
    }
}

#[async_trait]
impl UserActivities for InMemoryUserActivities {
    async fn create_user_record(
        &self,
        user_id: i64,
        phone: &str,
        email: &str,
    ) -> Result<(), AppError> {
        let shard = self.topology.hash_phone_number(phone) as usize;
        let mut state = self.state.lock().unwrap();
        let shard_state = &mut state.user_shards[shard];

        if shard_state.users.contains_key(&user_id) {
            return Err(AppError::UniqueViolation {
                constraint: "users_pkey".to_string(),
            });
        }
        if shard_state.users.values().any(|u| u.phone_number == phone) {
            return Err(AppError::UniqueViolation {
                constraint: "users_phone_number_key".to_string(),
            });
        }
        if shard_state.users.values().any(|u| u.email == email) {
            return Err(AppError::UniqueViolation {
                constraint: "users_email_key".to_string(),
            });
        }

        let now = Utc::now();
        shard_state.users.insert(
            user_id,
            User {
                id: user_id,
                phone_number: phone.to_string(),
                email: email.to_string(),
                balance: WELCOME_BONUS,
                is_blocked: false,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn create_email_record(&self, user_id: i64, email: &str) -> Result<(), AppError> {
        let shard = self.topology.hash_email(email) as usize;
        let mut state = self.state.lock().unwrap();
        let emails = &mut state.email_shards[shard];

        if emails.contains_key(email) {
            return Err(AppError::UniqueViolation {
                constraint: "emails_pkey".to_string(),
            });
        }
        emails.insert(email.to_string(), user_id);
        Ok(())
    }

    async fn delete_user_record_if_present(&self, user_id: i64) -> Result<(), AppError> {
        let shard = id::parse_user_id(user_id).shard_index as usize;
        let mut state = self.state.lock().unwrap();
        state.user_shards[shard].users.remove(&user_id);
        Ok(())
    }

    async fn delete_email_record_if_present(&self, email: &str) -> Result<(), AppError> {
        let shard = self.topology.hash_email(email) as usize;
        let mut state = self.state.lock().unwrap();
        state.email_shards[shard].remove(email);
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

        let shard = id::parse_user_id(from_user_id).shard_index as usize;
        let mut state = self.state.lock().unwrap();
        let shard_state = &mut state.user_shards[shard];

        let key = (transaction_id.to_string(), transaction_type.as_str());
        if shard_state.idempotence.contains(&key) {
            return Ok(());
        }

        {
            let user = shard_state
                .users
                .get_mut(&from_user_id)
                .ok_or(AppError::UserNotFound(from_user_id))?;
            if user.is_blocked {
                return Err(AppError::UserIsBlocked);
            }
            if user.balance < amount {
                return Err(AppError::InsufficientFunds);
            }
            user.balance -= amount;
            user.updated_at = Utc::now();
        }

        shard_state.idempotence.insert(key);
        shard_state.journal.push(JournalEntry {
            from_user_id,
            to_user_id,
            amount,
        });
        Ok(())
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

        let shard = id::parse_user_id(to_user_id).shard_index as usize;
        let mut state = self.state.lock().unwrap();
        let shard_state = &mut state.user_shards[shard];

        let key = (transaction_id.to_string(), transaction_type.as_str());
        if shard_state.idempotence.contains(&key) {
            return Ok(());
        }

        {
            let user = shard_state
                .users
                .get_mut(&to_user_id)
                .ok_or(AppError::UserNotFound(to_user_id))?;
            if user.is_blocked {
                return Err(AppError::UserIsBlocked);
            }
            user.balance += amount;
            user.updated_at = Utc::now();
        }

        shard_state.idempotence.insert(key);
        shard_state.journal.push(JournalEntry {
            from_user_id,
            to_user_id,
            amount,
        });
        Ok(())
    }

    async fn get_user_by_id(&self, user_id: i64) -> Result<User, AppError> {
        let shard = id::parse_user_id(user_id).shard_index as usize;
        let state = self.state.lock().unwrap();
        state.user_shards[shard]
            .users
            .get(&user_id)
            .cloned()
            .ok_or(AppError::UserNotFound(user_id))
    }

    async fn mark_user_as_blocked(&self, user_id: i64) -> Result<(), AppError> {
        let shard = id::parse_user_id(user_id).shard_index as usize;
        let mut state = self.state.lock().unwrap();
        let user = state.user_shards[shard]
            .users
            .get_mut(&user_id)
            .ok_or(AppError::UserNotFound(user_id))?;
        user.is_blocked = true;
        user.updated_at = Utc::now();
        Ok(())
    }

    fn topology(&self) -> ShardTopology {
        self.topology
    }
}

/// The production retry schedule in miniature, so failure-path tests stay
/// quick while still exercising multiple attempts.
pub fn fast_activity_options() -> ActivityOptions {
    ActivityOptions::default()
        .with_schedule_to_close(Duration::from_secs(2))
        .with_start_to_close(Duration::from_millis(500))
        .with_retry_policy(
            RetryPolicy::default()
                .with_initial_interval(Duration::from_millis(10))
                .with_maximum_interval(Duration::from_millis(40))
                .with_maximum_attempts(5)
                .with_non_retryable_error_types([
                    AppError::COMPENSATION_COMPLETED,
                    AppError::USER_IS_BLOCKED,
                ]),
        )
}

pub struct TestEnv {
    pub engine: Arc<SagaEngine>,
    pub activities: Arc<InMemoryUserActivities>,
    pub saga: UserSaga,
    pub workers: WorkerHost,
}

pub async fn setup() -> TestEnv {
    let engine = Arc::new(SagaEngine::new());
    let activities = Arc::new(InMemoryUserActivities::new());
    let shared: Arc<dyn UserActivities> = activities.clone();

    let workers = saga::start_workers(&engine, Arc::clone(&shared), fast_activity_options()).await;
    let saga = UserSaga::new(SagaClient::new(Arc::clone(&engine)), shared);

    TestEnv {
        engine,
        activities,
        saga,
        workers,
    }
}
