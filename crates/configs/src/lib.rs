//! # configs
//!
//! Layered settings: built-in defaults, then `config/refuge.toml` if present,
//! then `REFUGE__*` environment variables (a `.env` file is loaded first).

use std::time::Duration;

use config::{Config, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const CONFIG_FILE: &str = "config/refuge";
const ENV_PREFIX: &str = "REFUGE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Deserialize)]
pub struct BackendSettings {
    /// Base URL of the content service; unset means the in-memory demo backend
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub session_token: Option<SecretString>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. "info,services=debug"
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DemoSettings {
    /// Fill the in-memory backend with sample posts
    pub seed: bool,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub backend: BackendSettings,
    pub log: LogSettings,
    pub demo: DemoSettings,
}

impl BackendSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Settings {
    /// Loads `.env`, the optional config file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::from_sources(
            File::with_name(CONFIG_FILE).required(false),
            Environment::with_prefix(ENV_PREFIX).separator("__"),
        )
    }

    fn from_sources<S>(file: S, env: Environment) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings: Settings = Config::builder()
            .set_default("backend.timeout_secs", 10)?
            .set_default("log.filter", "info")?
            .set_default("log.json", false)?
            .set_default("demo.seed", true)?
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "backend.timeout_secs",
                reason: "must be at least one second".into(),
            });
        }
        if let Some(url) = &self.backend.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid {
                    field: "backend.base_url",
                    reason: format!("{url} is not an http(s) URL"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load_with(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_sources(
            File::with_name("does-not-exist").required(false),
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .source(Some(source)),
        )
    }

    #[test]
    fn defaults_apply_without_any_source() {
        let settings = load_with(&[]).unwrap();
        assert_eq!(settings.backend.timeout(), Duration::from_secs(10));
        assert!(settings.backend.base_url.is_none());
        assert_eq!(settings.log.filter, "info");
        assert!(settings.demo.seed);
    }

    #[test]
    fn environment_overrides_defaults() {
        let settings = load_with(&[
            ("REFUGE__BACKEND__BASE_URL", "https://refuge.example"),
            ("REFUGE__BACKEND__TIMEOUT_SECS", "3"),
        ])
        .unwrap();
        assert_eq!(settings.backend.base_url.as_deref(), Some("https://refuge.example"));
        assert_eq!(settings.backend.timeout_secs, 3);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = load_with(&[("REFUGE__BACKEND__TIMEOUT_SECS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "backend.timeout_secs", .. }));
    }

    #[test]
    fn non_http_base_url_is_rejected() {
        let err = load_with(&[("REFUGE__BACKEND__BASE_URL", "ftp://nope")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "backend.base_url", .. }));
    }
}
