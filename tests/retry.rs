//! Call adapter integration tests.
//!
//! Verifies the retry budget, the exponential sleep schedule, and the
//! per-attempt timeout.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::Result;
use poddigest::CallPolicy;

fn instant_policy(max_attempts: u32) -> CallPolicy {
    CallPolicy {
        max_attempts,
        timeout_seconds: 5,
        backoff_base_seconds: 0.0,
    }
}

#[tokio::test]
async fn test_first_attempt_success_makes_one_call() {
    let policy = instant_policy(5);
    let calls = AtomicU32::new(0);

    let value = policy
        .run("stable", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("done")
        })
        .await
        .unwrap();

    assert_eq!(value, "done");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fails_then_succeeds_on_final_attempt() {
    let policy = instant_policy(4);
    let calls = AtomicU32::new(0);

    let value = policy
        .run("flaky", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 4 {
                anyhow::bail!("transient failure {}", n);
            }
            Ok(n)
        })
        .await
        .unwrap();

    assert_eq!(value, 4);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_exhausted_budget_propagates_final_error() {
    let policy = instant_policy(3);
    let calls = AtomicU32::new(0);

    let result: Result<()> = policy
        .run("broken", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("service unavailable");
        })
        .await;

    // Exactly max_attempts calls, then the failure is the caller's problem.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains("service unavailable"), "{message}");
    assert!(message.contains("3 attempts"), "{message}");
}

#[tokio::test]
async fn test_sleep_schedule_is_exponential_in_base() {
    let policy = CallPolicy {
        max_attempts: 4,
        timeout_seconds: 5,
        backoff_base_seconds: 3.0,
    };

    assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(3));
    assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(9));
    assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(27));
}

#[tokio::test(start_paused = true)]
async fn test_extreme_configured_backoff_does_not_panic() {
    // The base is environment-supplied; a large-but-parsable value must
    // produce a capped sleep, not a Duration overflow mid-retry.
    let policy = CallPolicy {
        max_attempts: 2,
        timeout_seconds: 5,
        backoff_base_seconds: 1e300,
    };
    let calls = AtomicU32::new(0);

    let result: Result<()> = policy
        .run("overflow", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("transient failure");
        })
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_hung_call_is_cut_off_by_timeout() {
    let policy = CallPolicy {
        max_attempts: 2,
        timeout_seconds: 0,
        backoff_base_seconds: 0.0,
    };
    let calls = AtomicU32::new(0);

    let result: Result<()> = policy
        .run("hung", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

    assert!(result.is_err());
    // Both attempts were made; each one timed out rather than blocking.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
