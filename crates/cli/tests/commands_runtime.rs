use std::env;
use std::sync::{Mutex, OnceLock};

use pollbot_cli::commands::{config, doctor, migrate};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = TempDir::new().expect("tempdir");
    let url = sqlite_url(&dir);
    with_env(&[("POLLBOT_DATABASE_URL", &url)], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("applied 1 pending migration(s)"), "{message}");
    });
}

#[test]
fn migrate_is_idempotent_across_runs() {
    let dir = TempDir::new().expect("tempdir");
    let url = sqlite_url(&dir);
    with_env(&[("POLLBOT_DATABASE_URL", &url)], || {
        assert_eq!(migrate::run().exit_code, 0);

        let second = migrate::run();
        assert_eq!(second.exit_code, 0, "expected second migrate run to succeed");
        let payload = parse_payload(&second.output);
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("applied 0 pending migration(s)"), "{message}");
    });
}

#[test]
fn migrate_returns_config_failure_for_unsupported_database() {
    with_env(&[("POLLBOT_DATABASE_URL", "postgres://localhost/polls")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_redacts_tokens_and_reports_env_sources() {
    with_env(
        &[
            ("POLLBOT_MATTERMOST_TOKENS", "firstsecrettoken,second-secret-token"),
            ("POLLBOT_POLL_DEFAULT_MAX_VOTES", "2"),
            ("POLLBOT_SERVER_PUBLIC_URL", "https://polls.example.com/"),
        ],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);

            let output = &result.output;
            assert!(output.contains(
                "- mattermost.tokens = 2 token(s) [fi***, se***] (source: env (POLLBOT_MATTERMOST_TOKENS))"
            ));
            assert!(output
                .contains("- poll.default_max_votes = 2 (source: env (POLLBOT_POLL_DEFAULT_MAX_VOTES))"));
            assert!(output.contains("- server.public_url = https://polls.example.com/"));
            assert!(output.contains("- database.url = sqlite://pollbot.db (source: default)"));
            assert!(!output.contains("firstsecrettoken"));
            assert!(!output.contains("second-secret-token"));
        },
    );
}

#[test]
fn config_reports_validation_failure() {
    with_env(&[("POLLBOT_POLL_DEFAULT_MAX_VOTES", "0")], || {
        let result = config::run();
        assert_eq!(result.exit_code, 2);
        assert!(result.output.starts_with("config validation failed"));
    });
}

#[test]
fn doctor_passes_after_migrate() {
    let dir = TempDir::new().expect("tempdir");
    let url = sqlite_url(&dir);
    with_env(&[("POLLBOT_DATABASE_URL", &url), ("POLLBOT_MATTERMOST_TOKEN", "abc123")], || {
        assert_eq!(migrate::run().exit_code, 0);

        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        let checks = payload["checks"].as_array().expect("checks array");
        let names: Vec<&str> = checks.iter().filter_map(|check| check["name"].as_str()).collect();
        assert_eq!(
            names,
            ["config_validation", "token_policy", "database_connectivity", "migration_status"]
        );
        assert_eq!(checks[1]["details"], "1 slash-command token(s) accepted");
    });
}

#[test]
fn doctor_flags_unapplied_migrations() {
    let dir = TempDir::new().expect("tempdir");
    let url = sqlite_url(&dir);
    with_env(&[("POLLBOT_DATABASE_URL", &url)], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 5);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][2]["status"], "pass");
        assert_eq!(payload["checks"][3]["status"], "fail");
    });
}

#[test]
fn doctor_skips_runtime_checks_when_config_is_invalid() {
    with_env(&[("POLLBOT_SERVER_PUBLIC_URL", "ftp://polls.example.com")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 2);

        let lines: Vec<&str> = result.output.lines().collect();
        assert_eq!(lines[0], "doctor: one or more readiness checks failed");
        assert!(lines[1].starts_with("- [fail] config_validation:"));
        assert!(lines[2].starts_with("- [skip] token_policy:"));
        assert!(lines[3].starts_with("- [skip] database_connectivity:"));
    });
}

fn sqlite_url(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("polls.db").display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "POLLBOT_DATABASE_URL",
        "POLLBOT_DATABASE_MAX_CONNECTIONS",
        "POLLBOT_DATABASE_TIMEOUT_SECS",
        "POLLBOT_MATTERMOST_TOKENS",
        "POLLBOT_MATTERMOST_TOKEN",
        "POLLBOT_SERVER_BIND_ADDRESS",
        "POLLBOT_SERVER_PORT",
        "POLLBOT_SERVER_PUBLIC_URL",
        "POLLBOT_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "POLLBOT_POLL_DEFAULT_MAX_VOTES",
        "POLLBOT_LOGGING_LEVEL",
        "POLLBOT_LOGGING_FORMAT",
        "POLLBOT_LOG_LEVEL",
        "POLLBOT_LOG_FORMAT",
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
