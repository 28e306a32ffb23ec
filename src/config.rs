use std::{collections::HashMap, path::PathBuf, time::Duration};

use config::{Config as ConfigLib, ConfigError, Environment, File};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::request::DEFAULT_CLIENT_ID;
use crate::soap::SOAP_ACTION;

pub const DEFAULT_ENDPOINT: &str = "https://vetstat.fvst.dk/vetstat/services/external/CHRWS";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub vetstat: VetStatConfig,
    #[serde(default)]
    pub credentials: Option<CredentialConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VetStatConfig {
    pub endpoint: String,
    pub soap_action: String,
    pub client_id: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub workers: usize,
}

impl VetStatConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Where the service username, password and PKCS#12 bundle come from.
///
/// `certificate` holds the bundle as base64 and takes precedence over
/// `certificate_path`.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialConfig {
    pub username: String,
    pub password: SecretString,
    #[serde(default)]
    pub certificate: Option<SecretString>,
    #[serde(default)]
    pub certificate_path: Option<PathBuf>,
    #[serde(default = "empty_secret")]
    pub certificate_password: SecretString,
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("vetstat.endpoint", DEFAULT_ENDPOINT)?
            .set_default("vetstat.soap_action", SOAP_ACTION)?
            .set_default("vetstat.client_id", DEFAULT_CLIENT_ID)?
            .set_default("vetstat.timeout_secs", 60)?
            .set_default("vetstat.max_retries", 3)?
            .set_default("vetstat.retry_backoff_ms", 500)?
            .set_default("vetstat.workers", 4)?
            .add_source(File::with_name("config/settings").required(false));

        // Explicit overrides replace the system environment so tests do not
        // see each other's variables
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // e.g. APP_VETSTAT__ENDPOINT or APP_CREDENTIALS__USERNAME
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::load_with_sources(Some(HashMap::new())).expect("Failed to load config");

        assert_eq!(config.vetstat.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.vetstat.soap_action, SOAP_ACTION);
        assert_eq!(config.vetstat.client_id, "LandbrugsData");
        assert_eq!(config.vetstat.timeout(), Duration::from_secs(60));
        assert_eq!(config.vetstat.max_retries, 3);
        assert_eq!(config.vetstat.retry_backoff(), Duration::from_millis(500));
        assert_eq!(config.vetstat.workers, 4);
        assert!(config.credentials.is_none());
    }

    #[test]
    fn test_env_config() {
        let mut env_vars = HashMap::new();
        env_vars.insert(
            "vetstat.endpoint".to_string(),
            "http://localhost:8080/CHRWS".to_string(),
        );
        env_vars.insert("vetstat.workers".to_string(), "8".to_string());
        env_vars.insert("credentials.username".to_string(), "fvm-user".to_string());
        env_vars.insert("credentials.password".to_string(), "fvm-pass".to_string());
        env_vars.insert(
            "credentials.certificate_path".to_string(),
            "/etc/vetstat/client.p12".to_string(),
        );
        env_vars.insert(
            "credentials.certificate_password".to_string(),
            "bundle-pass".to_string(),
        );

        let config = Config::load_with_sources(Some(env_vars)).expect("Failed to load config");

        assert_eq!(config.vetstat.endpoint, "http://localhost:8080/CHRWS");
        assert_eq!(config.vetstat.workers, 8);
        let credentials = config.credentials.unwrap();
        assert_eq!(credentials.username, "fvm-user");
        assert_eq!(credentials.password.expose_secret(), "fvm-pass");
        assert!(credentials.certificate.is_none());
        assert_eq!(
            credentials.certificate_path,
            Some(PathBuf::from("/etc/vetstat/client.p12"))
        );
        assert_eq!(credentials.certificate_password.expose_secret(), "bundle-pass");
    }

    #[test]
    fn test_partial_env_override() {
        let mut env_vars = HashMap::new();
        env_vars.insert("vetstat.max_retries".to_string(), "0".to_string());
        env_vars.insert("credentials.username".to_string(), "fvm-user".to_string());
        env_vars.insert("credentials.password".to_string(), "fvm-pass".to_string());
        env_vars.insert("credentials.certificate".to_string(), "MIIB".to_string());

        let config = Config::load_with_sources(Some(env_vars)).expect("Failed to load config");

        assert_eq!(config.vetstat.max_retries, 0);
        // Everything else keeps its default
        assert_eq!(config.vetstat.timeout_secs, 60);
        let credentials = config.credentials.unwrap();
        assert_eq!(credentials.certificate.unwrap().expose_secret(), "MIIB");
        assert!(credentials.certificate_path.is_none());
        assert!(credentials.certificate_password.expose_secret().is_empty());
    }

    #[test]
    fn test_secrets_are_redacted() {
        let mut env_vars = HashMap::new();
        env_vars.insert("credentials.username".to_string(), "fvm-user".to_string());
        env_vars.insert("credentials.password".to_string(), "hunter2".to_string());

        let config = Config::load_with_sources(Some(env_vars)).expect("Failed to load config");

        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
