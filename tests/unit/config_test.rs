//! Tests for configuration validation

use voxgate::config::{GateConfig, LedgerConfig, QueueConfig, StoreBackendConfig};

#[test]
fn full_config_round_trips_through_json() {
    let cfg = GateConfig {
        queue: QueueConfig { max_concurrent: 4 },
        ledger: LedgerConfig {
            free_limit: 20,
            flood_interval_secs: 10,
            reset_window_days: 14,
        },
        store: StoreBackendConfig::Sqlite {
            path: "ledger.db".into(),
        },
        max_text_len: 500,
    };
    let json = serde_json::to_string(&cfg).unwrap();
    let back = GateConfig::from_json_str(&json).unwrap();
    assert_eq!(back.queue.max_concurrent, 4);
    assert_eq!(back.ledger.free_limit, 20);
    assert_eq!(back.ledger.flood_interval_secs, 10);
    assert_eq!(back.ledger.reset_window_days, 14);
    assert_eq!(back.max_text_len, 500);
    assert!(matches!(back.store, StoreBackendConfig::Sqlite { .. }));
}

#[test]
fn empty_object_yields_defaults() {
    let cfg = GateConfig::from_json_str("{}").unwrap();
    assert_eq!(cfg.queue.max_concurrent, 3);
    assert_eq!(cfg.ledger.free_limit, 30);
    assert_eq!(cfg.ledger.flood_interval_secs, 5);
    assert_eq!(cfg.ledger.reset_window_days, 7);
    assert_eq!(cfg.max_text_len, 300);
}

#[test]
fn invalid_reset_window_is_rejected() {
    let err =
        GateConfig::from_json_str(r#"{"ledger": {"reset_window_days": 0}}"#).unwrap_err();
    assert!(err.contains("reset_window_days"));
}

#[test]
fn invalid_max_text_len_is_rejected() {
    let err = GateConfig::from_json_str(r#"{"max_text_len": 0}"#).unwrap_err();
    assert!(err.contains("max_text_len"));
}

#[test]
fn garbage_json_reports_a_parse_error() {
    let err = GateConfig::from_json_str("not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}
