use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use pollbot_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG};

/// One rendered config entry: dotted key, display value, and env overrides in priority order.
struct Entry {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::text(EXIT_CONFIG, format!("config validation failed: {error}"))
        }
    };

    CommandResult::text(0, render(&config, detect_config_path().as_deref()))
}

pub(crate) fn render(config: &AppConfig, config_file_path: Option<&Path>) -> String {
    let config_file_doc = load_config_file_doc(config_file_path);

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(config) {
        let source =
            field_source(entry.key, entry.env_keys, config_file_doc.as_ref(), config_file_path);
        lines.push(render_line(entry.key, &entry.value, source));
    }

    lines.join("\n")
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    vec![
        Entry {
            key: "database.url",
            value: config.database.url.clone(),
            env_keys: &["POLLBOT_DATABASE_URL"],
        },
        Entry {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            env_keys: &["POLLBOT_DATABASE_MAX_CONNECTIONS"],
        },
        Entry {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            env_keys: &["POLLBOT_DATABASE_TIMEOUT_SECS"],
        },
        Entry {
            key: "mattermost.tokens",
            value: render_tokens(config),
            env_keys: &["POLLBOT_MATTERMOST_TOKENS", "POLLBOT_MATTERMOST_TOKEN"],
        },
        Entry {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["POLLBOT_SERVER_BIND_ADDRESS"],
        },
        Entry {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["POLLBOT_SERVER_PORT"],
        },
        Entry {
            key: "server.public_url",
            value: config.server.public_url.clone().unwrap_or_else(|| "<from Host header>".into()),
            env_keys: &["POLLBOT_SERVER_PUBLIC_URL"],
        },
        Entry {
            key: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: &["POLLBOT_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Entry {
            key: "poll.default_max_votes",
            value: config.poll.default_max_votes.to_string(),
            env_keys: &["POLLBOT_POLL_DEFAULT_MAX_VOTES"],
        },
        Entry {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["POLLBOT_LOGGING_LEVEL", "POLLBOT_LOG_LEVEL"],
        },
        Entry {
            key: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["POLLBOT_LOGGING_FORMAT", "POLLBOT_LOG_FORMAT"],
        },
    ]
}

fn render_tokens(config: &AppConfig) -> String {
    let tokens = &config.mattermost.tokens;
    if tokens.is_empty() {
        return "<none; every slash command accepted>".to_string();
    }

    let redacted: Vec<String> =
        tokens.iter().map(|token| redact_token(token.expose_secret())).collect();
    format!("{} token(s) [{}]", tokens.len(), redacted.join(", "))
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("pollbot.toml"), PathBuf::from("config/pollbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the first two characters of long tokens so operators can tell them apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.get(..2) {
        Some(prefix) if trimmed.chars().count() > 8 => format!("{prefix}***"),
        _ => "<redacted>".to_string(),
    }
}
