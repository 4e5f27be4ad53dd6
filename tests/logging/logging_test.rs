//! Tests for `src/logging.rs`.

use crosscontext::logging::LoggingGuard;

#[test]
fn logging_guard_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LoggingGuard>();
}

#[test]
fn init_production_creates_logs_dir() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs_dir = tmp.path().join("logs");
    assert!(!logs_dir.exists());

    // Only this test installs a global subscriber in this binary.
    let guard = crosscontext::logging::init_production(&logs_dir);
    assert!(guard.is_ok());
    assert!(logs_dir.is_dir());

    // A second install reports an error instead of panicking.
    crosscontext::logging::init_cli();
    assert!(crosscontext::logging::init_production(&logs_dir).is_err());
}
