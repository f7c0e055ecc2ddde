use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use log::{info, warn};
use tower::Service;

use crate::{
    domain::{TransactionType, UserPoint},
    ports::{clock::ClockPort, database::DatabasePort},
};

use super::{DomainLogic, Error};

pub struct UseRequest {
    pub user_id: u64,
    pub amount: i64,
}

impl<D, C> DomainLogic<D, C>
where
    D: DatabasePort,
    C: ClockPort,
{
    /// Spend `amount` points out of the balance of `user_id`
    pub async fn use_points(&self, user_id: u64, amount: i64) -> Result<UserPoint, Error> {
        let amount = self.policy.check_use_amount(amount).map_err(|violation| {
            warn!("rejected use of {amount} for user {user_id}: {violation:?}");
            Error::invalid_amount(amount, violation)
        })?;

        let _guard = self.lock_user(user_id).await?;

        let current = self.database.select_by_id(user_id).await?;
        let new_point = self
            .policy
            .used_balance(current.point, amount)
            .map_err(|_| {
                warn!(
                    "rejected use of {amount} for user {user_id}: only {} available",
                    current.point
                );
                Error::InsufficientBalance {
                    user_id,
                    current: current.point,
                    amount,
                }
            })?;

        let user_point = self.database.insert_or_update(user_id, new_point).await?;
        self.database
            .insert_history(user_id, amount, TransactionType::Use, self.clock.now_millis())
            .await?;
        info!(
            "used {amount} for user {user_id}: {} -> {}",
            current.point, user_point.point
        );

        Ok(user_point)
    }
}

impl<D, C> Service<UseRequest> for DomainLogic<D, C>
where
    D: DatabasePort + 'static,
    C: ClockPort + 'static,
{
    type Response = UserPoint;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: UseRequest) -> Self::Future {
        let domain = self.clone();
        Box::pin(async move { domain.use_points(req.user_id, req.amount).await })
    }
}
