use crate::domain::{PointHistory, TransactionType, UserPoint};

/// Storage for balances and their history
///
/// Each call is applied atomically on its own, but nothing ties two calls together. Callers
/// that read, then write, must serialize themselves.
#[mockall::automock]
#[async_trait::async_trait]
pub trait DatabasePort: Send + Sync {
    /// Current balance, or an empty one if the user is unknown
    async fn select_by_id(&self, user_id: u64) -> Result<UserPoint, Error>;
    async fn insert_or_update(&self, user_id: u64, point: u64) -> Result<UserPoint, Error>;
    async fn insert_history(
        &self,
        user_id: u64,
        amount: u64,
        kind: TransactionType,
        timestamp_millis: i64,
    ) -> Result<PointHistory, Error>;
    /// History of a user, oldest first
    async fn select_history_by_user_id(&self, user_id: u64) -> Result<Vec<PointHistory>, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
