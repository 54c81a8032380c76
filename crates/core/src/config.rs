use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wizard::WizardSettings;

#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub wizard: WizardConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WizardConfig {
    pub autosave_debounce_ms: u64,
    pub discard_suppression_ms: u64,
    pub discard_retry: bool,
    pub currency: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub autosave_debounce_ms: Option<u64>,
    pub discard_suppression_ms: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://pricewise.db".to_string(), max_connections: 5, timeout_secs: 30 }
    }
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            autosave_debounce_ms: 1_000,
            discard_suppression_ms: 3_000,
            discard_retry: true,
            currency: "USD".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("pricewise.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn wizard_settings(&self) -> WizardSettings {
        WizardSettings {
            autosave_debounce: Duration::from_millis(self.wizard.autosave_debounce_ms),
            discard_suppression: Duration::from_millis(self.wizard.discard_suppression_ms),
            discard_retry: self.wizard.discard_retry,
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(wizard) = patch.wizard {
            if let Some(debounce) = wizard.autosave_debounce_ms {
                self.wizard.autosave_debounce_ms = debounce;
            }
            if let Some(suppression) = wizard.discard_suppression_ms {
                self.wizard.discard_suppression_ms = suppression;
            }
            if let Some(discard_retry) = wizard.discard_retry {
                self.wizard.discard_retry = discard_retry;
            }
            if let Some(currency) = wizard.currency {
                self.wizard.currency = currency;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PRICEWISE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PRICEWISE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("PRICEWISE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PRICEWISE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PRICEWISE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PRICEWISE_WIZARD_AUTOSAVE_DEBOUNCE_MS") {
            self.wizard.autosave_debounce_ms =
                parse_u64("PRICEWISE_WIZARD_AUTOSAVE_DEBOUNCE_MS", &value)?;
        }
        if let Some(value) = read_env("PRICEWISE_WIZARD_DISCARD_SUPPRESSION_MS") {
            self.wizard.discard_suppression_ms =
                parse_u64("PRICEWISE_WIZARD_DISCARD_SUPPRESSION_MS", &value)?;
        }
        if let Some(value) = read_env("PRICEWISE_WIZARD_DISCARD_RETRY") {
            self.wizard.discard_retry = parse_bool("PRICEWISE_WIZARD_DISCARD_RETRY", &value)?;
        }
        if let Some(value) = read_env("PRICEWISE_WIZARD_CURRENCY") {
            self.wizard.currency = value;
        }

        let log_level =
            read_env("PRICEWISE_LOGGING_LEVEL").or_else(|| read_env("PRICEWISE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PRICEWISE_LOGGING_FORMAT").or_else(|| read_env("PRICEWISE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(debounce) = overrides.autosave_debounce_ms {
            self.wizard.autosave_debounce_ms = debounce;
        }
        if let Some(suppression) = overrides.discard_suppression_ms {
            self.wizard.discard_suppression_ms = suppression;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_wizard(&self.wizard)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("pricewise.toml"), PathBuf::from("config/pricewise.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some((before, expression)) = rest.split_once("${") {
        output.push_str(before);
        let (var, tail) =
            expression.split_once('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let value = env::var(var)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_string() })?;
        output.push_str(&value);
        rest = tail;
    }

    output.push_str(rest);
    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_wizard(wizard: &WizardConfig) -> Result<(), ConfigError> {
    if !(50..=60_000).contains(&wizard.autosave_debounce_ms) {
        return Err(ConfigError::Validation(
            "wizard.autosave_debounce_ms must be in range 50..=60000".to_string(),
        ));
    }

    // A shorter window would let a debounced save outlive the suppression.
    if wizard.discard_suppression_ms < wizard.autosave_debounce_ms {
        return Err(ConfigError::Validation(
            "wizard.discard_suppression_ms must be at least wizard.autosave_debounce_ms"
                .to_string(),
        ));
    }

    let currency = wizard.currency.trim();
    if currency.len() != 3 || !currency.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Err(ConfigError::Validation(
            "wizard.currency must be a three-letter ISO code such as `USD`".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    wizard: Option<WizardPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WizardPatch {
    autosave_debounce_ms: Option<u64>,
    discard_suppression_ms: Option<u64>,
    discard_retry: Option<bool>,
    currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Mutex, MutexGuard, OnceLock};
    use std::time::Duration;

    use tempfile::TempDir;

    use super::{
        interpolate_env_vars, validate_wizard, AppConfig, ConfigError, ConfigOverrides,
        LoadOptions, LogFormat, WizardConfig,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    /// Serializes tests that read or write process environment.
    fn env_guard() -> MutexGuard<'static, ()> {
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("pricewise.toml");
        fs::write(&path, contents).expect("write config file");
        path
    }

    fn wizard_error(wizard: &WizardConfig) -> String {
        match validate_wizard(wizard) {
            Err(ConfigError::Validation(message)) => message,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn default_wizard_section_is_valid() {
        assert!(validate_wizard(&WizardConfig::default()).is_ok());
    }

    #[test]
    fn debounce_outside_its_range_is_rejected() {
        for debounce in [0, 49, 60_001] {
            let wizard = WizardConfig {
                autosave_debounce_ms: debounce,
                discard_suppression_ms: 120_000,
                ..WizardConfig::default()
            };
            assert!(wizard_error(&wizard).contains("autosave_debounce_ms"), "debounce {debounce}");
        }

        let edges = WizardConfig {
            autosave_debounce_ms: 60_000,
            discard_suppression_ms: 60_000,
            ..WizardConfig::default()
        };
        assert!(validate_wizard(&edges).is_ok());
    }

    #[test]
    fn suppression_shorter_than_debounce_is_rejected() {
        let wizard = WizardConfig {
            autosave_debounce_ms: 2_000,
            discard_suppression_ms: 1_999,
            ..WizardConfig::default()
        };
        assert!(wizard_error(&wizard).contains("discard_suppression_ms"));
    }

    #[test]
    fn currency_must_be_an_uppercase_iso_code() {
        for currency in ["usd", "US", "EURO", "U5D", ""] {
            let wizard = WizardConfig { currency: currency.to_string(), ..WizardConfig::default() };
            assert!(wizard_error(&wizard).contains("wizard.currency"), "currency {currency:?}");
        }

        let euro = WizardConfig { currency: "EUR".to_string(), ..WizardConfig::default() };
        assert!(validate_wizard(&euro).is_ok());
    }

    #[test]
    fn interpolation_requires_closed_and_defined_vars() {
        let _guard = env_guard();
        env::set_var("TEST_PRICEWISE_CODE", "CHF");

        let interpolated =
            interpolate_env_vars("currency = \"${TEST_PRICEWISE_CODE}\" # $5").expect("interpolated");
        assert_eq!(interpolated, "currency = \"CHF\" # $5");
        assert!(matches!(
            interpolate_env_vars("url = \"${TEST_PRICEWISE_CODE"),
            Err(ConfigError::UnterminatedInterpolation)
        ));
        assert!(matches!(
            interpolate_env_vars("url = \"${TEST_PRICEWISE_UNSET}\""),
            Err(ConfigError::MissingEnvInterpolation { ref var }) if var == "TEST_PRICEWISE_UNSET"
        ));

        env::remove_var("TEST_PRICEWISE_CODE");
    }

    #[test]
    fn defaults_map_to_wizard_settings() {
        let _guard = env_guard();

        let config = AppConfig::load(LoadOptions::default()).expect("default config");
        let settings = config.wizard_settings();

        assert_eq!(settings.autosave_debounce, Duration::from_secs(1));
        assert_eq!(settings.discard_suppression, Duration::from_secs(3));
        assert!(settings.discard_retry);
        assert_eq!(config.wizard.currency, "USD");
        assert!(matches!(config.logging.format, LogFormat::Compact));
    }

    #[test]
    fn wizard_section_is_read_from_file_with_interpolation() {
        let _guard = env_guard();
        env::set_var("TEST_PRICEWISE_CURRENCY", "EUR");

        let dir = TempDir::new().expect("temp dir");
        let path = write_config(
            &dir,
            r#"
[wizard]
autosave_debounce_ms = 750
discard_suppression_ms = 750
discard_retry = false
currency = "${TEST_PRICEWISE_CURRENCY}"
"#,
        );
        let loaded =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() });
        env::remove_var("TEST_PRICEWISE_CURRENCY");

        let config = loaded.expect("file config");
        assert_eq!(config.wizard.currency, "EUR");
        let settings = config.wizard_settings();
        assert_eq!(settings.autosave_debounce, Duration::from_millis(750));
        assert_eq!(settings.discard_suppression, Duration::from_millis(750));
        assert!(!settings.discard_retry);
    }

    #[test]
    fn overrides_beat_env_and_env_beats_file() {
        let _guard = env_guard();
        env::set_var("PRICEWISE_WIZARD_DISCARD_SUPPRESSION_MS", "5000");
        env::set_var("PRICEWISE_WIZARD_CURRENCY", "GBP");

        let dir = TempDir::new().expect("temp dir");
        let path = write_config(
            &dir,
            r#"
[wizard]
autosave_debounce_ms = 400
discard_suppression_ms = 4000
currency = "EUR"
"#,
        );
        let loaded = AppConfig::load(LoadOptions {
            config_path: Some(path),
            overrides: ConfigOverrides {
                autosave_debounce_ms: Some(300),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });
        env::remove_var("PRICEWISE_WIZARD_DISCARD_SUPPRESSION_MS");
        env::remove_var("PRICEWISE_WIZARD_CURRENCY");

        let config = loaded.expect("layered config");
        assert_eq!(config.wizard.autosave_debounce_ms, 300);
        assert_eq!(config.wizard.discard_suppression_ms, 5_000);
        assert_eq!(config.wizard.currency, "GBP");
    }

    #[test]
    fn layered_values_are_validated_after_merging() {
        let _guard = env_guard();
        env::set_var("PRICEWISE_WIZARD_DISCARD_SUPPRESSION_MS", "500");

        let loaded = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                autosave_debounce_ms: Some(2_000),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });
        env::remove_var("PRICEWISE_WIZARD_DISCARD_SUPPRESSION_MS");

        assert!(matches!(
            loaded,
            Err(ConfigError::Validation(ref message)) if message.contains("discard_suppression_ms")
        ));
    }

    #[test]
    fn invalid_env_number_is_reported_with_its_key() {
        let _guard = env_guard();
        env::set_var("PRICEWISE_WIZARD_AUTOSAVE_DEBOUNCE_MS", "soon");

        let loaded = AppConfig::load(LoadOptions::default());
        env::remove_var("PRICEWISE_WIZARD_AUTOSAVE_DEBOUNCE_MS");

        assert!(matches!(
            loaded,
            Err(ConfigError::InvalidEnvOverride { ref key, .. })
                if key == "PRICEWISE_WIZARD_AUTOSAVE_DEBOUNCE_MS"
        ));
    }
}
