use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub mailer: MailerConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Outbound mail relay. Disabled by default; the outbox still fills so
/// nothing is lost while the relay is off.
#[derive(Clone, Debug)]
pub struct MailerConfig {
    pub enabled: bool,
    pub api_url: String,
    pub api_token: SecretString,
    pub from_address: String,
    pub max_attempts: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    /// Orders further out than this start as forecast.
    pub forecast_window_days: i64,
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
    pub mailer_enabled: Option<bool>,
    pub mailer_api_url: Option<String>,
    pub mailer_api_token: Option<String>,
    pub forecast_window_days: Option<i64>,
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://plantdesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            mailer: MailerConfig {
                enabled: false,
                api_url: String::new(),
                api_token: String::new().into(),
                from_address: "plantdesk@plant.example".to_string(),
                max_attempts: 3,
                timeout_secs: 15,
            },
            workflow: WorkflowConfig { forecast_window_days: 7 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    mailer: Option<MailerPatch>,
    workflow: Option<WorkflowPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MailerPatch {
    enabled: Option<bool>,
    api_url: Option<String>,
    api_token: Option<String>,
    from_address: Option<String>,
    max_attempts: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    forecast_window_days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("plantdesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
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

        if let Some(mailer) = patch.mailer {
            if let Some(enabled) = mailer.enabled {
                self.mailer.enabled = enabled;
            }
            if let Some(api_url) = mailer.api_url {
                self.mailer.api_url = api_url;
            }
            if let Some(api_token_value) = mailer.api_token {
                self.mailer.api_token = secret_value(api_token_value);
            }
            if let Some(from_address) = mailer.from_address {
                self.mailer.from_address = from_address;
            }
            if let Some(max_attempts) = mailer.max_attempts {
                self.mailer.max_attempts = max_attempts;
            }
            if let Some(timeout_secs) = mailer.timeout_secs {
                self.mailer.timeout_secs = timeout_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(forecast_window_days) = workflow.forecast_window_days {
                self.workflow.forecast_window_days = forecast_window_days;
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
        if let Some(value) = read_env("PLANTDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PLANTDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("PLANTDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PLANTDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PLANTDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PLANTDESK_MAILER_ENABLED") {
            self.mailer.enabled = parse_bool("PLANTDESK_MAILER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("PLANTDESK_MAILER_API_URL") {
            self.mailer.api_url = value;
        }
        if let Some(value) = read_env("PLANTDESK_MAILER_API_TOKEN") {
            self.mailer.api_token = secret_value(value);
        }
        if let Some(value) = read_env("PLANTDESK_MAILER_FROM_ADDRESS") {
            self.mailer.from_address = value;
        }
        if let Some(value) = read_env("PLANTDESK_MAILER_MAX_ATTEMPTS") {
            self.mailer.max_attempts = parse_u32("PLANTDESK_MAILER_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("PLANTDESK_MAILER_TIMEOUT_SECS") {
            self.mailer.timeout_secs = parse_u64("PLANTDESK_MAILER_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PLANTDESK_WORKFLOW_FORECAST_WINDOW_DAYS") {
            self.workflow.forecast_window_days =
                parse_i64("PLANTDESK_WORKFLOW_FORECAST_WINDOW_DAYS", &value)?;
        }

        let log_level =
            read_env("PLANTDESK_LOGGING_LEVEL").or_else(|| read_env("PLANTDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PLANTDESK_LOGGING_FORMAT").or_else(|| read_env("PLANTDESK_LOG_FORMAT"));
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
        if let Some(enabled) = overrides.mailer_enabled {
            self.mailer.enabled = enabled;
        }
        if let Some(api_url) = overrides.mailer_api_url {
            self.mailer.api_url = api_url;
        }
        if let Some(api_token) = overrides.mailer_api_token {
            self.mailer.api_token = secret_value(api_token);
        }
        if let Some(forecast_window_days) = overrides.forecast_window_days {
            self.workflow.forecast_window_days = forecast_window_days;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_mailer(&self.mailer)?;
        validate_workflow(&self.workflow)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("plantdesk.toml"), PathBuf::from("config/plantdesk.toml")]
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
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

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

fn validate_mailer(mailer: &MailerConfig) -> Result<(), ConfigError> {
    if !mailer.enabled {
        return Ok(());
    }

    let api_url = mailer.api_url.trim();
    if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
        return Err(ConfigError::Validation(
            "mailer.api_url must be an http(s) URL when the mailer is enabled".to_string(),
        ));
    }

    if mailer.api_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "mailer.api_token is required when the mailer is enabled".to_string(),
        ));
    }

    if !mailer.from_address.contains('@') {
        return Err(ConfigError::Validation(
            "mailer.from_address must be an email address".to_string(),
        ));
    }

    if mailer.max_attempts == 0 || mailer.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "mailer.max_attempts must be in range 1..=10".to_string(),
        ));
    }

    if mailer.timeout_secs == 0 || mailer.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "mailer.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.forecast_window_days < 1 || workflow.forecast_window_days > 60 {
        return Err(ConfigError::Validation(
            "workflow.forecast_window_days must be in range 1..=60".to_string(),
        ));
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    #[test]
    fn defaults_validate_with_mailer_disabled() {
        let config = AppConfig::default();
        config.validate().expect("defaults must be valid");
        assert!(!config.mailer.enabled);
        assert_eq!(config.workflow.forecast_window_days, 7);
    }

    #[test]
    fn toml_patch_overrides_selected_fields() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
[database]
url = "sqlite://ops.db"

[mailer]
enabled = true
api_url = "https://relay.plant.example/send"
api_token = "relay-token-1"
from_address = "noreply@plant.example"

[workflow]
forecast_window_days = 10

[logging]
level = "debug"
format = "json"
"#
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect("load");

        assert_eq!(config.database.url, "sqlite://ops.db");
        assert!(config.mailer.enabled);
        assert_eq!(config.mailer.api_token.expose_secret(), "relay-token-1");
        assert_eq!(config.workflow.forecast_window_days, 10);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn overrides_win_over_file_values() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "[database]\nurl = \"sqlite://file.db\"\n").expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                forecast_window_days: Some(14),
                ..Default::default()
            },
        })
        .expect("load");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.workflow.forecast_window_days, 14);
    }

    #[test]
    fn enabled_mailer_without_token_fails_validation() {
        let mut config = AppConfig::default();
        config.mailer.enabled = true;
        config.mailer.api_url = "https://relay.plant.example/send".to_string();

        let error = config.validate().expect_err("missing token must fail");
        assert!(matches!(error, ConfigError::Validation(_)));
    }

    #[test]
    fn out_of_range_forecast_window_fails_validation() {
        let mut config = AppConfig::default();
        config.workflow.forecast_window_days = 0;
        assert!(config.validate().is_err());

        config.workflow.forecast_window_days = 90;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_required_file_is_reported() {
        let error = AppConfig::load(LoadOptions {
            config_path: Some("does-not-exist.toml".into()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect_err("missing file must fail");

        assert!(matches!(error, ConfigError::MissingConfigFile(_)));
    }
}
