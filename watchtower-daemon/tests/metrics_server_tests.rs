//! Integration tests for metrics server functionality.

use serial_test::serial;
use watchtower_core::config::MetricsConfig;
use watchtower_daemon::metrics_server;

#[test]
#[serial]
fn test_install_metrics_recorder_fails_with_invalid_address() {
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "999.999.999.999".to_owned(),
        port: 9100,
        endpoint: "/metrics".to_owned(),
    };

    let result = metrics_server::install_metrics_recorder(&config);
    assert!(result.is_err(), "invalid address must be rejected");
}

#[test]
#[serial]
fn test_install_metrics_recorder_rejects_unsupported_endpoint() {
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "127.0.0.1".to_owned(),
        port: 19101,
        endpoint: "/custom".to_owned(),
    };

    let err = metrics_server::install_metrics_recorder(&config).unwrap_err();
    assert!(err.to_string().contains("/custom"));
}

#[test]
#[serial]
fn test_install_metrics_recorder_succeeds_once() {
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "127.0.0.1".to_owned(),
        port: 0,
        endpoint: "/metrics".to_owned(),
    };

    let first = metrics_server::install_metrics_recorder(&config);
    assert!(first.is_ok(), "first install should succeed: {:?}", first.err());

    let second = metrics_server::install_metrics_recorder(&config);
    assert!(second.is_err(), "global recorder can only be installed once");
}
