use std::time::Duration;

/// Smallest amount accepted by a single charge
pub const MIN_CHARGE: u64 = 10_000;

/// Upper bound for the balance of any user, and for a single use
pub const MAX_BALANCE: u64 = 1_000_000;

/// Current point balance of a user
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserPoint {
    pub user_id: u64,
    /// Number of points held by the user
    ///
    /// Always within `0..=MAX_BALANCE` when read back from the store.
    pub point: u64,
    pub updated_at_millis: i64,
}

impl UserPoint {
    /// Balance of a user the store has never seen
    pub fn empty(user_id: u64, now_millis: i64) -> Self {
        Self {
            user_id,
            point: 0,
            updated_at_millis: now_millis,
        }
    }
}

/// Details for a committed balance change
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointHistory {
    /// Sequence number assigned by the store
    ///
    /// Strictly increasing in commit order, even when two records share a timestamp.
    pub id: u64,
    pub user_id: u64,
    /// Number of points moved. Always positive, the direction is given by `kind`.
    pub amount: u64,
    pub kind: TransactionType,
    pub timestamp_millis: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Charge,
    Use,
}

/// Business limits applied to balance changes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointPolicy {
    pub min_charge: u64,
    pub max_balance: u64,
    /// Maximum time to wait for the per-user guard
    ///
    /// `None` waits forever, which is fine as long as critical sections stay short.
    pub lock_timeout: Option<Duration>,
}

impl Default for PointPolicy {
    fn default() -> Self {
        Self {
            min_charge: MIN_CHARGE,
            max_balance: MAX_BALANCE,
            lock_timeout: None,
        }
    }
}

/// Reason a balance change was rejected
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    ChargeTooSmall { min_charge: u64 },
    NonPositiveAmount,
    UseTooLarge { max_use: u64 },
    BalanceLimitExceeded { max_balance: u64 },
    InsufficientBalance,
}

impl PointPolicy {
    /// Static check on a charge amount, done before any lock is taken
    pub fn check_charge_amount(&self, amount: i64) -> Result<u64, Violation> {
        match u64::try_from(amount) {
            Ok(amount) if amount >= self.min_charge && amount > 0 => Ok(amount),
            _ => Err(Violation::ChargeTooSmall {
                min_charge: self.min_charge,
            }),
        }
    }

    /// Static check on a use amount, done before any lock is taken
    pub fn check_use_amount(&self, amount: i64) -> Result<u64, Violation> {
        let amount = match u64::try_from(amount) {
            Ok(amount) if amount > 0 => amount,
            _ => return Err(Violation::NonPositiveAmount),
        };
        if amount > self.max_balance {
            return Err(Violation::UseTooLarge {
                max_use: self.max_balance,
            });
        }

        Ok(amount)
    }

    /// Balance after charging `amount` on top of `current`
    pub fn charged_balance(&self, current: u64, amount: u64) -> Result<u64, Violation> {
        current
            .checked_add(amount)
            .filter(|new_balance| *new_balance <= self.max_balance)
            .ok_or(Violation::BalanceLimitExceeded {
                max_balance: self.max_balance,
            })
    }

    /// Balance after using `amount` out of `current`
    pub fn used_balance(&self, current: u64, amount: u64) -> Result<u64, Violation> {
        current
            .checked_sub(amount)
            .ok_or(Violation::InsufficientBalance)
    }
}
