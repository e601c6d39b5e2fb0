use std::time::Duration;

use anyhow::Result;

use crate::config::Config;

#[test]
fn config_deserializes_from_full_env() -> Result<()> {
    let config: Config = envy::from_iter(vec![
        ("LOG_LEVEL".into(), "debug".into()),
        ("OPERATOR_NAMESPACE".into(), "cassandra".into()),
        ("HTTP_PORT".into(), "8080".into()),
        ("METRIC_POLL_INTERVAL".into(), "1m30s".into()),
        ("METRIC_REQUEST_DURATION".into(), "500ms".into()),
        ("ALLOW_EMPTY_DIR".into(), "true".into()),
    ])?;
    let config = config.validated()?;

    assert!(config.log_level == "debug", "unexpected value parsed for LOG_LEVEL, got {}, expected {}", config.log_level, "debug");
    assert!(
        config.operator_namespace == "cassandra",
        "unexpected value parsed for OPERATOR_NAMESPACE, got {}, expected {}",
        config.operator_namespace,
        "cassandra"
    );
    assert!(config.http_port == 8080, "unexpected value parsed for HTTP_PORT, got {}, expected {}", config.http_port, 8080);
    assert!(
        config.metric_poll_interval == Duration::from_secs(90),
        "unexpected value parsed for METRIC_POLL_INTERVAL, got {:?}, expected {:?}",
        config.metric_poll_interval,
        Duration::from_secs(90)
    );
    assert!(
        config.metric_request_duration == Duration::from_millis(500),
        "unexpected value parsed for METRIC_REQUEST_DURATION, got {:?}, expected {:?}",
        config.metric_request_duration,
        Duration::from_millis(500)
    );
    assert!(config.allow_empty_dir, "unexpected value parsed for ALLOW_EMPTY_DIR, got {}, expected {}", config.allow_empty_dir, true);

    Ok(())
}

#[test]
fn config_deserializes_from_empty_env() -> Result<()> {
    let config: Config = envy::from_iter(Vec::<(String, String)>::new())?;
    let config = config.validated()?;

    assert!(config.log_level == "info", "unexpected default for LOG_LEVEL, got {}, expected {}", config.log_level, "info");
    assert!(
        config.operator_namespace.is_empty(),
        "unexpected default for OPERATOR_NAMESPACE, got {}, expected an empty string",
        config.operator_namespace
    );
    assert!(config.http_port == 9090, "unexpected default for HTTP_PORT, got {}, expected {}", config.http_port, 9090);
    assert!(
        config.metric_poll_interval == Duration::from_secs(5),
        "unexpected default for METRIC_POLL_INTERVAL, got {:?}, expected {:?}",
        config.metric_poll_interval,
        Duration::from_secs(5)
    );
    assert!(
        config.metric_request_duration == Duration::from_secs(2),
        "unexpected default for METRIC_REQUEST_DURATION, got {:?}, expected {:?}",
        config.metric_request_duration,
        Duration::from_secs(2)
    );
    assert!(!config.allow_empty_dir, "unexpected default for ALLOW_EMPTY_DIR, got {}, expected {}", config.allow_empty_dir, false);

    Ok(())
}

#[test]
fn config_rejects_zero_poll_interval() -> Result<()> {
    let config: Config = envy::from_iter(vec![("METRIC_POLL_INTERVAL".into(), "0s".into())])?;
    assert!(config.validated().is_err(), "expected a zero METRIC_POLL_INTERVAL to be rejected");
    Ok(())
}

#[test]
fn config_rejects_unparseable_durations() {
    let res = envy::from_iter::<_, Config>(vec![("METRIC_REQUEST_DURATION".into(), "soon".into())]);
    assert!(res.is_err(), "expected an unparseable METRIC_REQUEST_DURATION to be rejected");
}
