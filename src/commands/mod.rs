use std::sync::Arc;

use crate::{
    domain::{PointPolicy, Violation},
    locks::{KeyGuard, KeyLockRegistry},
};

pub mod charge;
pub mod query;
pub mod use_points;

/// Point mutation service
///
/// Mutations for the same user are serialized through a [`KeyLockRegistry`], mutations for
/// different users run in parallel. Reads go straight to the database without locking.
pub struct DomainLogic<D, C> {
    database: Arc<D>,
    clock: Arc<C>,
    locks: KeyLockRegistry<u64>,
    policy: PointPolicy,
}

impl<D, C> DomainLogic<D, C> {
    pub fn new(database: Arc<D>, clock: Arc<C>) -> Self {
        Self {
            database,
            clock,
            locks: KeyLockRegistry::new(),
            policy: PointPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PointPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &PointPolicy {
        &self.policy
    }

    /// Number of users with a mutation in flight or queued
    pub fn locked_users(&self) -> usize {
        self.locks.len()
    }

    /// Take the guard for `user_id`, honoring the configured timeout
    async fn lock_user(&self, user_id: u64) -> Result<KeyGuard<u64>, Error> {
        match self.policy.lock_timeout {
            Some(timeout) => self
                .locks
                .acquire_timeout(user_id, timeout)
                .await
                .map_err(|err| Error::LockTimeout {
                    user_id,
                    timeout: err.0,
                }),
            None => Ok(self.locks.acquire(user_id).await),
        }
    }
}

/// Clones share the database, the clock and the lock registry
impl<D, C> Clone for DomainLogic<D, C> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            clock: self.clock.clone(),
            locks: self.locks.clone(),
            policy: self.policy.clone(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The amount is malformed or out of range, whatever the current balance
    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount { amount: i64, reason: String },

    /// Charging would push the balance above the maximum
    #[error("balance of user {user_id} would exceed {max_balance}: {current} + {amount}")]
    BalanceLimitExceeded {
        user_id: u64,
        current: u64,
        amount: u64,
        max_balance: u64,
    },

    /// Using more points than the user holds
    #[error("user {user_id} holds {current} points, cannot use {amount}")]
    InsufficientBalance {
        user_id: u64,
        current: u64,
        amount: u64,
    },

    #[error("database port error: {0:?}")]
    Store(#[from] crate::ports::database::Error),

    #[error("timed out after {timeout:?} waiting for the lock of user {user_id}")]
    LockTimeout {
        user_id: u64,
        timeout: std::time::Duration,
    },
}

impl Error {
    /// Turn a static amount check failure into an [`Error::InvalidAmount`]
    fn invalid_amount(amount: i64, violation: Violation) -> Self {
        let reason = match violation {
            Violation::ChargeTooSmall { min_charge } => {
                format!("charges start at {min_charge} points")
            }
            Violation::NonPositiveAmount => "amount must be positive".to_string(),
            Violation::UseTooLarge { max_use } => {
                format!("at most {max_use} points can be used at once")
            }
            other => format!("{other:?}"),
        };
        Self::InvalidAmount { amount, reason }
    }
}
