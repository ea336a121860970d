use std::env;
use std::sync::{Mutex, OnceLock};

use freightdesk_cli::commands::{config, doctor, migrate, seed};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("FREIGHTDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "schema is at version 1");
    });
}

#[test]
fn migrate_reports_config_failure_for_non_sqlite_url() {
    with_env(&[("FREIGHTDESK_DATABASE_URL", "postgres://localhost/freightdesk")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_is_idempotent_against_a_file_database() {
    let dir = TempDir::new().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("seed.db").display());

    with_env(&[("FREIGHTDESK_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "seed");
        assert!(first_payload["message"]
            .as_str()
            .unwrap_or_default()
            .contains("company profile created"));

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);
        let message = second_payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("lookups: 0 created"), "unexpected message: {message}");
        assert!(message.ends_with("company profile kept"), "unexpected message: {message}");
    });
}

#[test]
fn config_attributes_env_values_and_fails_on_invalid_env() {
    with_env(&[("FREIGHTDESK_SERVER_PORT", "9443")], || {
        let result = config::run();
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("- server.port = 9443 (source: env (FREIGHTDESK_SERVER_PORT))"));
        assert!(message.contains("- logging.level = info (source: default)"));
    });

    with_env(&[("FREIGHTDESK_SERVER_PORT", "not-a-port")], || {
        let result = config::run();
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn doctor_reports_schema_version_after_migrate() {
    let dir = TempDir::new().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("doctor.db").display());

    with_env(&[("FREIGHTDESK_DATABASE_URL", url.as_str())], || {
        let before = doctor::run(true);
        assert_eq!(before.exit_code, 0);
        let report = parse_payload(&before.output);
        assert_eq!(report["overall_status"], "pass");
        assert!(report["checks"][1]["details"]
            .as_str()
            .unwrap_or_default()
            .contains("no migrations applied yet"));

        assert_eq!(migrate::run().exit_code, 0);

        let after = parse_payload(&doctor::run(true).output);
        assert_eq!(after["checks"][1]["details"], "connected; schema at migration 1");
    });
}

#[test]
fn doctor_fails_when_config_invalid() {
    with_env(&[("FREIGHTDESK_LOGGING_LEVEL", "verbose")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(report["checks"][0]["status"], "fail");
        assert_eq!(report["checks"][1]["status"], "skipped");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "FREIGHTDESK_CONFIG",
        "FREIGHTDESK_DATABASE_URL",
        "FREIGHTDESK_DATABASE_MAX_CONNECTIONS",
        "FREIGHTDESK_DATABASE_TIMEOUT_SECS",
        "FREIGHTDESK_SERVER_BIND_ADDRESS",
        "FREIGHTDESK_SERVER_PORT",
        "FREIGHTDESK_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "FREIGHTDESK_LOGGING_LEVEL",
        "FREIGHTDESK_LOGGING_FORMAT",
        "FREIGHTDESK_LOG_LEVEL",
        "FREIGHTDESK_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
