//! # Error Handling Unit Tests
//!
//! Tests for error classification and retry delay calculation.
//!
//! These tests verify:
//! - Store failures split into transient and data-integrity classes
//! - Fibonacci backoff for failures that need an operator
//! - Fixed requeue for transient failures, with timeout escalation

use user_management_operator::config::ControllerConfig;
use user_management_operator::controller::backoff::FibonacciBackoff;
use user_management_operator::controller::reconciler::{
    BackoffState, CycleError, ErrorClass, ReconcilerError, Stage,
};
use user_management_operator::runtime::error_policy::retry_delay;
use user_management_operator::store::StoreError;

#[test]
fn test_backoff_calculation_fibonacci_sequence() {
    // 1, 1, 2, 3, 5, 8 minutes, then capped at 10
    let expected_seconds = [60, 60, 120, 180, 300, 480, 600, 600];
    let mut backoff = FibonacciBackoff::new(1, 10);

    for (attempt, expected) in expected_seconds.into_iter().enumerate() {
        let seconds = backoff.next_backoff_seconds();
        assert_eq!(
            seconds, expected,
            "Backoff for attempt {attempt} should be {expected} seconds, got {seconds}"
        );
    }
}

#[test]
fn test_backoff_restarts_after_reset() {
    let mut backoff = FibonacciBackoff::new(1, 10);
    for _ in 0..5 {
        backoff.next_backoff_seconds();
    }
    backoff.reset();
    assert_eq!(backoff.next_backoff_seconds(), 60);
}

#[test]
fn test_store_error_classification() {
    let transient = [
        StoreError::Api {
            code: 500,
            message: "internal error".to_string(),
        },
        StoreError::Api {
            code: 429,
            message: "too many requests".to_string(),
        },
        StoreError::Transport("connection reset".to_string()),
        StoreError::NotFound {
            kind: "Route".to_string(),
            namespace: "ns1".to_string(),
            name: "cp-console".to_string(),
        },
    ];
    for error in transient {
        let message = error.to_string();
        let class = CycleError::from_store(Stage::ApplyCoreResources, error).class();
        assert_eq!(class, ErrorClass::TransientStore, "{message}");
    }

    let permanent = [
        StoreError::Api {
            code: 422,
            message: "spec.template is invalid".to_string(),
        },
        StoreError::InvalidObject("Secret has no name".to_string()),
    ];
    for error in permanent {
        let message = error.to_string();
        let class = CycleError::from_store(Stage::ApplyCoreResources, error).class();
        assert_eq!(class, ErrorClass::DataIntegrity, "{message}");
    }
}

#[test]
fn test_failures_outside_a_cycle_are_transient() {
    let error = ReconcilerError::ReconciliationFailed(anyhow::anyhow!("status patch failed"));
    assert_eq!(error.class(), ErrorClass::TransientStore);

    let wrapped: ReconcilerError = CycleError::Timeout {
        target: "ns1/platform-auth-service".to_string(),
        timeout_secs: 120,
    }
    .into();
    assert_eq!(wrapped.class(), ErrorClass::Timeout);
}

#[test]
fn test_retry_delay_per_class() {
    let config = ControllerConfig::default();
    let cases = [
        (ErrorClass::PrerequisiteMissing, 60, "error-backoff"),
        (ErrorClass::DataIntegrity, 60, "error-backoff"),
        (ErrorClass::TransientStore, config.transient_requeue_secs, "transient"),
        (ErrorClass::Cancelled, config.transient_requeue_secs, "cancelled"),
        (ErrorClass::Timeout, config.transient_requeue_secs, "restart-timeout"),
    ];

    for (class, expected_secs, expected_reason) in cases {
        let mut state = BackoffState::new(config.backoff_min_minutes, config.backoff_max_minutes);
        let decision = retry_delay(class, &mut state, &config);
        assert_eq!(decision.delay.as_secs(), expected_secs, "{}", class.as_str());
        assert_eq!(decision.reason, expected_reason);
        assert_eq!(state.error_count, 1);
    }
}

#[test]
fn test_success_resets_instance_backoff() {
    let config = ControllerConfig::default();
    let mut state = BackoffState::new(config.backoff_min_minutes, config.backoff_max_minutes);
    for _ in 0..4 {
        retry_delay(ErrorClass::DataIntegrity, &mut state, &config);
    }
    retry_delay(ErrorClass::Timeout, &mut state, &config);

    state.reset();

    assert_eq!(state.error_count, 0);
    assert_eq!(state.consecutive_timeouts, 0);
    let decision = retry_delay(ErrorClass::DataIntegrity, &mut state, &config);
    assert_eq!(decision.delay.as_secs(), 60);
}
