use std::env;
use std::fs;
use std::path::Path;

use freightdesk_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

use crate::commands::{load_config, CommandResult};

/// Config keys with the environment variables that can override them, in lookup order.
const FIELDS: &[(&str, &[&str])] = &[
    ("database.url", &["FREIGHTDESK_DATABASE_URL"]),
    ("database.max_connections", &["FREIGHTDESK_DATABASE_MAX_CONNECTIONS"]),
    ("database.timeout_secs", &["FREIGHTDESK_DATABASE_TIMEOUT_SECS"]),
    ("server.bind_address", &["FREIGHTDESK_SERVER_BIND_ADDRESS"]),
    ("server.port", &["FREIGHTDESK_SERVER_PORT"]),
    ("server.graceful_shutdown_secs", &["FREIGHTDESK_SERVER_GRACEFUL_SHUTDOWN_SECS"]),
    ("logging.level", &["FREIGHTDESK_LOGGING_LEVEL", "FREIGHTDESK_LOG_LEVEL"]),
    ("logging.format", &["FREIGHTDESK_LOGGING_FORMAT", "FREIGHTDESK_LOG_FORMAT"]),
];

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let config_file_path = resolve_config_path(LoadOptions::from_env().config_path.as_deref());
    CommandResult::success("config", render(&config, config_file_path.as_deref()))
}

pub fn render(config: &AppConfig, config_file_path: Option<&Path>) -> String {
    let config_file_doc = load_config_file_doc(config_file_path);

    let file = config_file_path.map(|path| path.display().to_string());
    let mut lines = vec![format!(
        "effective config (source precedence: env > file > default; file: {}):",
        file.as_deref().unwrap_or("<none>")
    )];

    for (key, env_keys) in FIELDS {
        let value = field_value(config, key);
        let source = field_source(key, env_keys, config_file_doc.as_ref(), config_file_path);
        lines.push(format!("- {key} = {value} (source: {source})"));
    }

    lines.join("\n")
}

fn field_value(config: &AppConfig, key: &str) -> String {
    match key {
        "database.url" => redact_database_url(&config.database.url),
        "database.max_connections" => config.database.max_connections.to_string(),
        "database.timeout_secs" => config.database.timeout_secs.to_string(),
        "server.bind_address" => config.server.bind_address.clone(),
        "server.port" => config.server.port.to_string(),
        "server.graceful_shutdown_secs" => config.server.graceful_shutdown_secs.to_string(),
        "logging.level" => config.logging.level.clone(),
        "logging.format" => format!("{:?}", config.logging.format).to_ascii_lowercase(),
        _ => "<unknown>".to_string(),
    }
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

/// Hides user info (`user:secret@`) and any `password=` query value.
pub fn redact_database_url(url: &str) -> String {
    let mut redacted = match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    };

    if let Some(start) = redacted.find("password=") {
        let value_start = start + "password=".len();
        let value_end = redacted[value_start..]
            .find('&')
            .map(|end| value_start + end)
            .unwrap_or(redacted.len());
        redacted.replace_range(value_start..value_end, "***");
    }

    redacted
}
