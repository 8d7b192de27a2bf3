//! Tests for `src/logging.rs`.

use confine::logging::{LoggingGuard, LOG_FILE};

#[test]
fn logging_guard_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LoggingGuard>();
}

#[test]
fn init_file_creates_logs_dir() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs_dir = tmp.path().join("logs");
    assert!(!logs_dir.exists());

    // Only one global subscriber can be installed per process, so the
    // result is not asserted; the directory is created either way.
    let _result = confine::logging::init_file(&logs_dir);
    assert!(logs_dir.exists(), "logs directory should be created");
    assert_eq!(LOG_FILE, "confine.log");
}

#[test]
fn init_cli_tolerates_an_existing_subscriber() {
    confine::logging::init_cli();
    confine::logging::init_cli();
    tracing::info!("still logging");
}
