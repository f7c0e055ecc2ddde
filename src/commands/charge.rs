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

pub struct ChargeRequest {
    pub user_id: u64,
    pub amount: i64,
}

impl<D, C> DomainLogic<D, C>
where
    D: DatabasePort,
    C: ClockPort,
{
    /// Add `amount` points to the balance of `user_id`
    ///
    /// The amount is checked before taking the user lock, so malformed requests never queue
    /// behind valid ones. The balance limit is checked under the lock.
    pub async fn charge(&self, user_id: u64, amount: i64) -> Result<UserPoint, Error> {
        let amount = self
            .policy
            .check_charge_amount(amount)
            .map_err(|violation| {
                warn!("rejected charge of {amount} for user {user_id}: {violation:?}");
                Error::invalid_amount(amount, violation)
            })?;

        let _guard = self.lock_user(user_id).await?;

        let current = self.database.select_by_id(user_id).await?;
        let new_point = self
            .policy
            .charged_balance(current.point, amount)
            .map_err(|_| {
                warn!(
                    "rejected charge of {amount} for user {user_id}: balance {} at limit",
                    current.point
                );
                Error::BalanceLimitExceeded {
                    user_id,
                    current: current.point,
                    amount,
                    max_balance: self.policy.max_balance,
                }
            })?;

        let user_point = self.database.insert_or_update(user_id, new_point).await?;
        self.database
            .insert_history(
                user_id,
                amount,
                TransactionType::Charge,
                self.clock.now_millis(),
            )
            .await?;
        info!(
            "charged {amount} for user {user_id}: {} -> {}",
            current.point, user_point.point
        );

        Ok(user_point)
    }
}

impl<D, C> Service<ChargeRequest> for DomainLogic<D, C>
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

    fn call(&mut self, req: ChargeRequest) -> Self::Future {
        let domain = self.clone();
        Box::pin(async move { domain.charge(req.user_id, req.amount).await })
    }
}
