use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use claimdesk_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key: &'static str,
    env: &'static [&'static str],
    value: String,
}

pub fn run(options: &LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let path = options.config_path.clone().or_else(detect_config_path);
    let doc = load_config_file_doc(path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(&field, doc.as_ref(), path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }
    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field {
            key: "database.url",
            env: &["CLAIMDESK_DATABASE_URL"],
            value: config.database.url.clone(),
        },
        Field {
            key: "database.max_connections",
            env: &["CLAIMDESK_DATABASE_MAX_CONNECTIONS"],
            value: config.database.max_connections.to_string(),
        },
        Field {
            key: "database.timeout_secs",
            env: &["CLAIMDESK_DATABASE_TIMEOUT_SECS"],
            value: config.database.timeout_secs.to_string(),
        },
        Field {
            key: "store.backend",
            env: &["CLAIMDESK_STORE_BACKEND"],
            value: format!("{:?}", config.store.backend),
        },
        Field {
            key: "api.base_url",
            env: &["CLAIMDESK_API_BASE_URL"],
            value: config.api.base_url.clone(),
        },
        Field {
            key: "api.token",
            env: &["CLAIMDESK_API_TOKEN"],
            value: redact_token(config.api.token.as_ref().map(|token| token.expose_secret())),
        },
        Field {
            key: "api.request_timeout_secs",
            env: &["CLAIMDESK_API_REQUEST_TIMEOUT_SECS"],
            value: config.api.request_timeout_secs.to_string(),
        },
        Field {
            key: "logging.level",
            env: &["CLAIMDESK_LOGGING_LEVEL", "CLAIMDESK_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Field {
            key: "logging.format",
            env: &["CLAIMDESK_LOGGING_FORMAT", "CLAIMDESK_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format),
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("claimdesk.toml"), PathBuf::from("config/claimdesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(field: &Field, doc: Option<&Value>, path: Option<&Path>) -> String {
    if let Some(key) = field.env.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({key})");
    }

    if doc.is_some_and(|doc| contains_path(doc, field.key)) {
        let file = path.map(|path| path.display().to_string()).unwrap_or_else(|| "config file".into());
        return format!("file ({file})");
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

fn redact_token(token: Option<&str>) -> String {
    match token.map(str::trim) {
        None => "<unset>".to_string(),
        Some("") => "<empty>".to_string(),
        Some(token) if token.chars().count() > 8 => {
            let prefix: String = token.chars().take(4).collect();
            format!("{prefix}***")
        }
        Some(_) => "<redacted>".to_string(),
    }
}
