use std::{sync::Arc, time::Duration};

use point_service::{
    adapters::{clock::system::SystemClock, database::memory::MemoryDatabase},
    commands::{DomainLogic, Error},
    domain::TransactionType,
};
use rstest::*;
use speculoos::prelude::*;

type Domain = DomainLogic<MemoryDatabase, SystemClock>;

const AMOUNT: i64 = 10_000;

/// Service over a store slow enough to expose lost updates
#[fixture]
fn domain() -> Domain {
    DomainLogic::new(
        Arc::new(MemoryDatabase::with_latency(Duration::from_millis(2))),
        Arc::new(SystemClock),
    )
}

/// Retry a use until an earlier charge made room for it
async fn use_when_funded(domain: &Domain, user_id: u64, amount: i64) -> Result<(), Error> {
    loop {
        match domain.use_points(user_id, amount).await {
            Ok(_) => return Ok(()),
            Err(Error::InsufficientBalance { .. }) => tokio::task::yield_now().await,
            Err(err) => return Err(err),
        }
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 5)]
async fn test_concurrent_charges_same_user(domain: Domain) -> Result<(), Error> {
    // GIVEN one user with no points

    // WHEN charging five times concurrently
    let handles: Vec<_> = (0..5)
        .map(|_| {
            let domain = domain.clone();
            tokio::spawn(async move { domain.charge(1, AMOUNT).await })
        })
        .collect();
    for handle in handles {
        assert_that!(handle.await.unwrap()).is_ok();
    }

    // THEN no update was lost
    assert_that!(domain.point(1).await?.point).is_equal_to(50_000);
    assert_that!(domain.history(1).await?).has_length(5);
    assert_that!(domain.locked_users()).is_equal_to(0);

    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 5)]
async fn test_concurrent_charges_and_uses_same_user(domain: Domain) -> Result<(), Error> {
    // GIVEN one user with no points

    // WHEN interleaving three charges and two uses
    let mut handles = Vec::new();
    for i in 0..5 {
        let domain = domain.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                domain.charge(2, AMOUNT).await.map(|_| ())
            } else {
                use_when_funded(&domain, 2, AMOUNT).await
            }
        }));
    }
    for handle in handles {
        assert_that!(handle.await.unwrap()).is_ok();
    }

    // THEN
    // * the balance reflects every operation exactly once
    // * rejected attempts left no trace in the history
    assert_that!(domain.point(2).await?.point).is_equal_to(10_000);
    let history = domain.history(2).await?;
    assert_that!(history).has_length(5);
    let charges = history
        .iter()
        .filter(|history| history.kind == TransactionType::Charge)
        .count();
    assert_that!(charges).is_equal_to(3);

    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_distinct_users(domain: Domain) -> Result<(), Error> {
    // GIVEN 100 users with no points

    // WHEN each one is charged, then spends it all, all users at once
    let handles: Vec<_> = (1..=100u64)
        .map(|user_id| {
            let domain = domain.clone();
            tokio::spawn(async move {
                domain.charge(user_id, AMOUNT).await?;
                domain.use_points(user_id, AMOUNT).await
            })
        })
        .collect();
    for handle in handles {
        assert_that!(handle.await.unwrap()).is_ok();
    }

    // THEN every user is back to zero with its own two records
    for user_id in 1..=100u64 {
        assert_that!(domain.point(user_id).await?.point).is_equal_to(0);
        let history = domain.history(user_id).await?;
        assert_that!(history).has_length(2);
        assert_that!(history.iter().all(|history| history.user_id == user_id)).is_true();
    }
    assert_that!(domain.locked_users()).is_equal_to(0);

    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_history_follows_commit_order(domain: Domain) -> Result<(), Error> {
    // GIVEN a user charged concurrently many times
    let handles: Vec<_> = (0..20)
        .map(|_| {
            let domain = domain.clone();
            tokio::spawn(async move { domain.charge(3, AMOUNT).await })
        })
        .collect();
    let mut balances = Vec::new();
    for handle in handles {
        balances.push(handle.await.unwrap()?.point);
    }

    // THEN
    // * every intermediate balance was observed exactly once
    // * history is ordered by commit, with non-decreasing timestamps
    balances.sort_unstable();
    let expected: Vec<u64> = (1..=20).map(|i| i * AMOUNT as u64).collect();
    assert_that!(balances).is_equal_to(expected);

    let history = domain.history(3).await?;
    assert_that!(history).has_length(20);
    for pair in history.windows(2) {
        assert_that!(pair[0].id).is_less_than(pair[1].id);
        assert_that!(pair[0].timestamp_millis).is_less_than_or_equal_to(pair[1].timestamp_millis);
    }
    assert_that!(domain.history(3).await?).is_equal_to(history);

    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_rejected_calls_leave_state_untouched(domain: Domain) -> Result<(), Error> {
    // GIVEN a user at the balance limit
    domain.charge(4, 1_000_000).await?;

    // WHEN sending requests that must all be rejected
    let too_small = domain.charge(4, 9_999).await;
    let over_limit = domain.charge(4, AMOUNT).await;
    let negative_use = domain.use_points(4, -1).await;
    let too_large_use = domain.use_points(4, 1_000_001).await;

    // THEN each fails with its own kind and nothing changed
    assert_that!(too_small)
        .is_err()
        .matches(|err| matches!(err, Error::InvalidAmount { .. }));
    assert_that!(over_limit)
        .is_err()
        .matches(|err| matches!(err, Error::BalanceLimitExceeded { .. }));
    assert_that!(negative_use)
        .is_err()
        .matches(|err| matches!(err, Error::InvalidAmount { .. }));
    assert_that!(too_large_use)
        .is_err()
        .matches(|err| matches!(err, Error::InvalidAmount { .. }));
    assert_that!(domain.point(4).await?.point).is_equal_to(1_000_000);
    assert_that!(domain.history(4).await?).has_length(1);

    // AND spending from the untouched balance still works
    let res = domain.use_points(5, AMOUNT).await;
    assert_that!(res)
        .is_err()
        .matches(|err| matches!(err, Error::InsufficientBalance { .. }));
    assert_that!(domain.use_points(4, 1_000_000).await?.point).is_equal_to(0);

    Ok(())
}
