//! Tests for error types

use voxgate::core::{GateError, SynthesisError};

#[test]
fn admission_denied_display() {
    let err = GateError::AdmissionDenied {
        left: 0,
        frozen: false,
    };
    assert_eq!(
        format!("{}", err),
        "admission denied: 0 syntheses left (frozen: false)"
    );
}

#[test]
fn rate_limited_display() {
    let err = GateError::RateLimited { wait_secs: 4 };
    assert_eq!(format!("{}", err), "rate limited: retry in 4s");
}

#[test]
fn text_too_long_display() {
    let err = GateError::TextTooLong { len: 301, max: 300 };
    assert_eq!(
        format!("{}", err),
        "text too long: 301 characters (max 300)"
    );
}

#[test]
fn synthesis_errors_pass_through_transparently() {
    let err = GateError::from(SynthesisError::InvalidVoice("ghost".into()));
    assert_eq!(format!("{}", err), "unknown voice: ghost");

    let err = GateError::from(SynthesisError::Model("oom".into()));
    assert_eq!(format!("{}", err), "synthesis model error: oom");

    let err = GateError::from(SynthesisError::Timeout);
    assert_eq!(format!("{}", err), "synthesis timed out");
}

#[test]
fn persistence_wraps_sqlx_errors() {
    let err = GateError::from(sqlx::Error::RowNotFound);
    match &err {
        GateError::Persistence(msg) => assert!(!msg.is_empty()),
        other => panic!("expected persistence error, got {other:?}"),
    }
    assert!(format!("{}", err).starts_with("ledger store error:"));
}

#[test]
fn queue_lifecycle_errors_display() {
    assert_eq!(format!("{}", GateError::QueueClosed), "queue closed");
    assert_eq!(
        format!("{}", GateError::JobAbandoned),
        "job abandoned before resolution"
    );
}
