use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use pricewise_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];

    for (key_path, value, env_keys) in entries(&config) {
        let source =
            field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key_path, &value, source));
    }

    lines.join("\n")
}

type Entry = (&'static str, String, &'static [&'static str]);

fn entry(key_path: &'static str, value: String, env_keys: &'static [&'static str]) -> Entry {
    (key_path, value, env_keys)
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    let database = &config.database;
    let wizard = &config.wizard;
    let logging = &config.logging;
    vec![
        entry("database.url", database.url.clone(), &["PRICEWISE_DATABASE_URL"]),
        entry(
            "database.max_connections",
            database.max_connections.to_string(),
            &["PRICEWISE_DATABASE_MAX_CONNECTIONS"],
        ),
        entry(
            "database.timeout_secs",
            database.timeout_secs.to_string(),
            &["PRICEWISE_DATABASE_TIMEOUT_SECS"],
        ),
        entry(
            "wizard.autosave_debounce_ms",
            wizard.autosave_debounce_ms.to_string(),
            &["PRICEWISE_WIZARD_AUTOSAVE_DEBOUNCE_MS"],
        ),
        entry(
            "wizard.discard_suppression_ms",
            wizard.discard_suppression_ms.to_string(),
            &["PRICEWISE_WIZARD_DISCARD_SUPPRESSION_MS"],
        ),
        entry(
            "wizard.discard_retry",
            wizard.discard_retry.to_string(),
            &["PRICEWISE_WIZARD_DISCARD_RETRY"],
        ),
        entry("wizard.currency", wizard.currency.clone(), &["PRICEWISE_WIZARD_CURRENCY"]),
        entry(
            "logging.level",
            logging.level.clone(),
            &["PRICEWISE_LOGGING_LEVEL", "PRICEWISE_LOG_LEVEL"],
        ),
        entry(
            "logging.format",
            format!("{:?}", logging.format),
            &["PRICEWISE_LOGGING_FORMAT", "PRICEWISE_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("pricewise.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/pricewise.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
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

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, field_source};

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc: Value = "[wizard]\nautosave_debounce_ms = 250\n".parse().expect("toml");

        assert!(contains_path(&doc, "wizard.autosave_debounce_ms"));
        assert!(!contains_path(&doc, "wizard.currency"));
        assert!(!contains_path(&doc, "database.url"));
    }

    #[test]
    fn file_source_names_the_path_when_no_env_is_set() {
        let doc: Value = "[logging]\nformat = \"json\"\n".parse().expect("toml");

        let source = field_source(
            "logging.format",
            &["PRICEWISE_TEST_UNSET_FORMAT_KEY"],
            Some(&doc),
            Some(std::path::Path::new("pricewise.toml")),
        );
        assert_eq!(source, "file (pricewise.toml)");

        let fallback =
            field_source("logging.level", &["PRICEWISE_TEST_UNSET_LEVEL_KEY"], Some(&doc), None);
        assert_eq!(fallback, "default");
    }
}
