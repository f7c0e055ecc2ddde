use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tower::Service;

use crate::{
    domain::{PointHistory, UserPoint},
    ports::{clock::ClockPort, database::DatabasePort},
};

use super::{DomainLogic, Error};

pub struct GetPointRequest {
    pub user_id: u64,
}

pub struct GetHistoryRequest {
    pub user_id: u64,
}

impl<D, C> DomainLogic<D, C>
where
    D: DatabasePort,
    C: ClockPort,
{
    /// Current balance of a user
    ///
    /// Not serialized against mutations in flight for the same user.
    pub async fn point(&self, user_id: u64) -> Result<UserPoint, Error> {
        Ok(self.database.select_by_id(user_id).await?)
    }

    /// Committed balance changes of a user, oldest first
    pub async fn history(&self, user_id: u64) -> Result<Vec<PointHistory>, Error> {
        Ok(self.database.select_history_by_user_id(user_id).await?)
    }
}

impl<D, C> Service<GetPointRequest> for DomainLogic<D, C>
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

    fn call(&mut self, req: GetPointRequest) -> Self::Future {
        let domain = self.clone();
        Box::pin(async move { domain.point(req.user_id).await })
    }
}

impl<D, C> Service<GetHistoryRequest> for DomainLogic<D, C>
where
    D: DatabasePort + 'static,
    C: ClockPort + 'static,
{
    type Response = Vec<PointHistory>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: GetHistoryRequest) -> Self::Future {
        let domain = self.clone();
        Box::pin(async move { domain.history(req.user_id).await })
    }
}
