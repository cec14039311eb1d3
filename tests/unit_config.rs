#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::io::Write;
use std::time::Duration;

use loadgen_agent::config::{is_sql_identifier, AppConfig, StoreConfig};

#[test]
fn defaults_without_file() {
    let c = AppConfig::load(None).expect("defaults");
    assert_eq!(c.bind, "0.0.0.0:8080");
    assert!(matches!(c.store, StoreConfig::Memory));
    assert_eq!(c.corpus.count, 1000);
    assert!((c.burn.safety_factor - 0.99).abs() < f64::EPSILON);
    assert_eq!(c.pool.health_check_interval(), Some(Duration::from_secs(30)));
}

#[test]
fn partial_file_keeps_other_defaults() {
    let mut f = tempfile::NamedTempFile::new().expect("tmp");
    write!(
        f,
        r#"{{"corpus": {{"count": 50, "ttl_seconds": 60}},
            "pool": {{"max_size": 4, "max_lifetime_seconds": 0}},
            "store": {{"type": "redis", "key_prefix": "bench"}}}}"#
    )
    .expect("write");
    let c = AppConfig::load(Some(f.path())).expect("load");
    assert_eq!(c.corpus.count, 50);
    assert_eq!(c.corpus.ttl_seconds, 60);
    assert_eq!(c.corpus.record_size, 64);
    assert_eq!(c.pool.max_size, 4);
    assert_eq!(c.pool.min_size, 1);
    assert_eq!(c.pool.max_lifetime(), None);
    match c.store {
        StoreConfig::Redis(r) => {
            assert_eq!(r.key_prefix, "bench");
            assert_eq!(r.url, "redis://127.0.0.1:6379");
        }
        other => panic!("unexpected store {other:?}"),
    }
}

#[test]
fn postgres_store_config() {
    let c = AppConfig::from_json(
        r#"{"store": {"type": "postgres", "url": "postgres://u@db/x", "password": "pw"}}"#,
    )
    .expect("json");
    c.validate().expect("valid");
    match c.store {
        StoreConfig::Postgres(p) => {
            assert_eq!(p.table, "corpus");
            assert_eq!(p.password.as_deref(), Some("pw"));
        }
        other => panic!("unexpected store {other:?}"),
    }
}

#[test]
fn rejects_invalid_values() {
    for raw in [
        r#"{"burn": {"safety_factor": 0.0}}"#,
        r#"{"burn": {"safety_factor": 1.5}}"#,
        r#"{"burn": {"buffer_size": 4}}"#,
        r#"{"pool": {"min_size": 5, "max_size": 2}}"#,
        r#"{"pool": {"max_size": 0}}"#,
        r#"{"corpus": {"count": 0}}"#,
        r#"{"store": {"type": "postgres", "table": "corpus; drop"}}"#,
    ] {
        let c = AppConfig::from_json(raw).expect("json");
        assert!(c.validate().is_err(), "{raw}");
    }
    assert!(AppConfig::from_json(r#"{"store": {"type": "mongo"}}"#).is_err());
}

#[test]
fn identifiers() {
    assert!(is_sql_identifier("corpus"));
    assert!(is_sql_identifier("_corpus_2"));
    assert!(!is_sql_identifier("2corpus"));
    assert!(!is_sql_identifier("a-b"));
    assert!(!is_sql_identifier(""));
}
