//! Unit tests for sqlgate error and classify modules

use sqlgate::classify::{classify, classify_text, log_failure, FailureClass};
use sqlgate::error::{Error, ErrorCategory};

#[test]
fn test_error_connection() {
    let err = Error::connection("Failed to connect");

    assert_eq!(err.category(), ErrorCategory::Connection);
    assert!(err.to_string().contains("Failed to connect"));
    assert!(err.is_retriable());
}

#[test]
fn test_error_refused() {
    let err = Error::refused("127.0.0.1:5432");

    assert_eq!(err.category(), ErrorCategory::ConnectionRefused);
    assert!(err.is_retriable());
    assert!(err.category().is_connect_failure());
}

#[test]
fn test_error_descriptor() {
    let err = Error::descriptor("missing host");

    assert_eq!(err.category(), ErrorCategory::Descriptor);
    assert!(!err.is_retriable());
}

#[test]
fn test_error_query() {
    let err = Error::query_with_sql("Syntax error in SQL", "SELEC 1");

    assert_eq!(err.category(), ErrorCategory::Query);
    assert!(err.to_string().contains("Syntax error"));
    assert!(!err.is_retriable());
}

#[test]
fn test_error_scan() {
    let err = Error::scan("unsupported scan type: money");

    assert_eq!(err.category(), ErrorCategory::Scan);
    assert!(!err.category().is_connect_failure());
}

#[test]
fn test_error_config_and_unsupported() {
    assert_eq!(
        Error::config("bad").category(),
        ErrorCategory::Configuration
    );
    assert_eq!(
        Error::unsupported("named parameters").category(),
        ErrorCategory::Unsupported
    );
}

#[test]
fn test_category_display() {
    assert_eq!(ErrorCategory::ConnectionRefused.to_string(), "connection_refused");
    assert_eq!(ErrorCategory::Scan.to_string(), "scan");
}

// ==================== Classification Tests ====================

#[test]
fn test_classify_structured() {
    assert_eq!(classify(&Error::refused("x")), FailureClass::ConnectionRefused);
    assert_eq!(
        classify(&Error::descriptor("x")),
        FailureClass::MalformedDescriptor
    );
    assert_eq!(classify(&Error::connection("x")), FailureClass::Connect);
    assert_eq!(classify(&Error::query("x")), FailureClass::Query);
    assert_eq!(classify(&Error::scan("x")), FailureClass::Scan);
}

#[test]
fn test_classify_driver_text() {
    assert_eq!(
        classify_text("dial tcp [::1]:5432: connect: connection refused"),
        Some(FailureClass::ConnectionRefused)
    );
    assert_eq!(
        classify_text(r#"missing "dbname" in connection info string"#),
        Some(FailureClass::MalformedDescriptor)
    );
    assert_eq!(classify_text("deadlock detected"), None);
}

#[test]
fn test_log_failure_does_not_alter_error() {
    let err = Error::refused("db:5432");
    let class = log_failure("postgres://app:pw@db/prod", "SELECT 1", &err);

    assert_eq!(class, FailureClass::ConnectionRefused);
    assert_eq!(err.category(), ErrorCategory::ConnectionRefused);
}
