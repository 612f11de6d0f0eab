// Circuit breaker state machine through its public surface

use std::io;
use std::sync::Arc;
use std::time::Duration;

use todos_api::core::errors::BreakerError;
use todos_api::core::resilience::{
    BreakerListener, BreakerStats, CircuitBreaker, CircuitBreakerConfig, CircuitState,
};

use crate::common::EventLog;

fn tripped_breaker(listener: Option<Arc<dyn BreakerListener>>) -> CircuitBreaker {
    let cb = CircuitBreaker::new("findOne", CircuitBreakerConfig::default());
    match listener {
        Some(listener) => cb.with_listener(listener),
        None => cb,
    }
}

async fn fail(cb: &CircuitBreaker) -> Result<(), BreakerError<io::Error>> {
    cb.invoke(|| async { Err::<(), _>(io::Error::new(io::ErrorKind::ConnectionRefused, "down")) })
        .await
}

async fn succeed(cb: &CircuitBreaker) -> Result<u32, BreakerError<io::Error>> {
    cb.invoke(|| async { Ok::<u32, io::Error>(7) }).await
}

async fn trip(cb: &CircuitBreaker) {
    assert!(matches!(fail(cb).await, Err(BreakerError::Inner(_))));
    assert_eq!(cb.state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_failures_open_for_small_runs() {
    for n in 1..=2 {
        let cb = tripped_breaker(None);
        for _ in 0..n {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Open, "after {} failures", n);

        let mut invoked = false;
        let result = cb
            .invoke(|| {
                invoked = true;
                async { Ok::<(), io::Error>(()) }
            })
            .await;

        assert!(result.unwrap_err().is_open());
        assert!(!invoked, "call reached the operation after {} failures", n);
        assert_eq!(cb.stats().failures, 1);
        assert_eq!(cb.stats().rejections, n as u64);
    }
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_does_not_invoke_operation() {
    let cb = tripped_breaker(None);
    trip(&cb).await;

    let mut invoked = false;
    let result = cb
        .invoke(|| {
            invoked = true;
            async { Ok::<(), io::Error>(()) }
        })
        .await;

    assert!(result.unwrap_err().is_open());
    assert!(!invoked);
}

#[tokio::test(start_paused = true)]
async fn test_rejects_until_reset_timeout_elapses() {
    let cb = tripped_breaker(None);
    trip(&cb).await;

    tokio::time::advance(Duration::from_secs(29)).await;
    assert!(succeed(&cb).await.unwrap_err().is_open());
    assert_eq!(cb.state(), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(succeed(&cb).await.unwrap(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_successful_trial_closes_and_resets_stats() {
    let cb = tripped_breaker(None);
    trip(&cb).await;
    let _ = succeed(&cb).await;
    assert_eq!(cb.stats().rejections, 1);

    tokio::time::advance(Duration::from_secs(30)).await;
    succeed(&cb).await.unwrap();

    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.stats(), BreakerStats::default());

    // the window was cleared too: one failure in three calls stays below 50%
    succeed(&cb).await.unwrap();
    succeed(&cb).await.unwrap();
    let _ = fail(&cb).await;
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_failed_trial_reopens_and_restarts_cooldown() {
    let cb = tripped_breaker(None);
    trip(&cb).await;

    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(matches!(fail(&cb).await, Err(BreakerError::Inner(_))));
    assert_eq!(cb.state(), CircuitState::Open);
    assert_eq!(cb.stats().failures, 2);

    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(succeed(&cb).await.unwrap_err().is_open());

    tokio::time::advance(Duration::from_secs(20)).await;
    succeed(&cb).await.unwrap();
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_admits_exactly_one_trial() {
    let cb = tripped_breaker(None);
    trip(&cb).await;
    tokio::time::advance(Duration::from_secs(30)).await;

    let slow_trial = cb.invoke(|| async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok::<u32, io::Error>(1)
    });
    let concurrent = async {
        tokio::task::yield_now().await;
        succeed(&cb).await
    };

    let (trial, other) = tokio::join!(slow_trial, concurrent);

    assert_eq!(trial.unwrap(), 1);
    assert!(other.unwrap_err().is_open());
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_trial_reopens() {
    let cb = tripped_breaker(None);
    trip(&cb).await;
    tokio::time::advance(Duration::from_secs(30)).await;

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        cb.invoke(|| async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<(), io::Error>(())
        }),
    )
    .await;

    assert!(abandoned.is_err());
    assert_eq!(cb.state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_rejections_do_not_count_toward_error_rate() {
    let cb = tripped_breaker(None);
    trip(&cb).await;

    for _ in 0..20 {
        let _ = succeed(&cb).await;
    }
    let stats = cb.stats();
    assert_eq!(stats.rejections, 20);
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.successes, 0);
}

#[tokio::test(start_paused = true)]
async fn test_listener_sees_transitions_in_order() {
    let log = Arc::new(EventLog::default());
    let cb = tripped_breaker(Some(log.clone() as Arc<dyn BreakerListener>));

    trip(&cb).await;
    let _ = succeed(&cb).await;
    tokio::time::advance(Duration::from_secs(30)).await;
    succeed(&cb).await.unwrap();

    assert_eq!(
        log.names_for("findOne"),
        vec!["failure", "open", "reject", "halfOpen", "success", "close"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_slow_call_reports_timeout() {
    let cb = CircuitBreaker::new(
        "find",
        CircuitBreakerConfig {
            timeout: Duration::from_millis(200),
            ..CircuitBreakerConfig::default()
        },
    );

    let result = cb
        .invoke(|| async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<(), io::Error>(())
        })
        .await;

    match result {
        Err(BreakerError::Timeout { operation, after }) => {
            assert_eq!(operation, "find");
            assert_eq!(after, Duration::from_millis(200));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(cb.stats().timeouts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_reports_name_state_and_stats() {
    let cb = tripped_breaker(None);
    succeed(&cb).await.unwrap();

    let snapshot = cb.snapshot();
    assert_eq!(snapshot.name, "findOne");
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.stats.successes, 1);
    assert!(cb.is_healthy());
}

#[tokio::test(start_paused = true)]
async fn test_last_transition_tracks_state_changes() {
    let cb = tripped_breaker(None);
    let created = cb.last_transition();

    tokio::time::advance(Duration::from_secs(2)).await;
    trip(&cb).await;

    assert_eq!(cb.last_transition() - created, Duration::from_secs(2));
}
