use crate::{
    domain::{PointHistory, TransactionType, UserPoint},
    ports::database::{DatabasePort, Error},
};
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

#[derive(Clone, Debug, Default)]
pub struct MemoryDatabase {
    points: Arc<Mutex<HashMap<u64, UserPoint>>>,
    histories: Arc<Mutex<Histories>>,
    /// Delay applied before every call
    ///
    /// Widens the window between a read and the following write, so races between
    /// unserialized callers actually show up in tests.
    latency: Option<Duration>,
}

#[derive(Debug, Default)]
struct Histories {
    last_id: u64,
    by_user: HashMap<u64, Vec<PointHistory>>,
}

impl MemoryDatabase {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait::async_trait]
impl DatabasePort for MemoryDatabase {
    async fn select_by_id(&self, user_id: u64) -> Result<UserPoint, Error> {
        self.simulate_latency().await;
        let user_point = self
            .points
            .lock()?
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| UserPoint::empty(user_id, Utc::now().timestamp_millis()));

        Ok(user_point)
    }

    async fn insert_or_update(&self, user_id: u64, point: u64) -> Result<UserPoint, Error> {
        self.simulate_latency().await;
        let user_point = UserPoint {
            user_id,
            point,
            updated_at_millis: Utc::now().timestamp_millis(),
        };
        self.points.lock()?.insert(user_id, user_point.clone());

        Ok(user_point)
    }

    async fn insert_history(
        &self,
        user_id: u64,
        amount: u64,
        kind: TransactionType,
        timestamp_millis: i64,
    ) -> Result<PointHistory, Error> {
        self.simulate_latency().await;
        let mut histories = self.histories.lock()?;
        histories.last_id += 1;
        let history = PointHistory {
            id: histories.last_id,
            user_id,
            amount,
            kind,
            timestamp_millis,
        };
        histories
            .by_user
            .entry(user_id)
            .or_default()
            .push(history.clone());

        Ok(history)
    }

    async fn select_history_by_user_id(&self, user_id: u64) -> Result<Vec<PointHistory>, Error> {
        self.simulate_latency().await;
        let histories = self
            .histories
            .lock()?
            .by_user
            .get(&user_id)
            .cloned()
            .unwrap_or_default();

        Ok(histories)
    }
}

/// Erased [`PoisonError`]
///
/// `PoisonError` keeps the `MutexGuard` internally, which is not send. Thus we erase the error
/// and only keep the string representation instead.
#[derive(Debug, thiserror::Error)]
#[error("poison error: {0}")]
pub struct ErasedPoisonError(String);

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Self::Adapter(Box::new(ErasedPoisonError(err.to_string())))
    }
}
