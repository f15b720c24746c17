use crate::models::CustomEndpointRegistry;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const ENV_PREFIX: &str = "EYEEM_";

pub const DEFAULT_API_BASE_URL: &str = "https://vision-api.eyeem.com/v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] envy::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Deserialize, Clone)]
pub struct Config {
    pub client_id: String,

    pub client_secret: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    #[serde(default)]
    pub throttle_requests_per_minute: Option<u32>,

    /// `name=model_id` pairs separated by commas.
    #[serde(default)]
    pub custom_endpoints: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field(
                "throttle_requests_per_minute",
                &self.throttle_requests_per_minute,
            )
            .field("custom_endpoints", &self.custom_endpoints)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Self::from_env_with_prefix(ENV_PREFIX)
    }

    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let config: Config = envy::prefixed(prefix).from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Config with defaults for everything but the client credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_base_url: default_api_base_url(),
            request_timeout_seconds: default_request_timeout_seconds(),
            throttle_requests_per_minute: None,
            custom_endpoints: String::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate client credentials
        if self.client_id.trim().is_empty() || self.client_secret.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Client id and client secret must not be empty".into(),
            ));
        }

        // Validate API base URL format
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(ConfigError::Validation(format!(
                "API base URL must start with http:// or https://: {}",
                self.api_base_url
            )));
        }

        if self.request_timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Request timeout must be greater than 0".into(),
            ));
        }

        // Validate throttle rate
        if let Some(rpm) = self.throttle_requests_per_minute {
            if rpm == 0 || rpm > 600 {
                return Err(ConfigError::Validation(format!(
                    "Throttle requests per minute must be between 1 and 600, got: {rpm}"
                )));
            }
        }

        // Validate custom endpoint entries
        self.custom_endpoint_registry()?;

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Minimum spacing between analysis requests, if throttling is enabled.
    pub fn throttle_interval(&self) -> Option<Duration> {
        self.throttle_requests_per_minute
            .filter(|rpm| *rpm > 0)
            .map(|rpm| Duration::from_millis(60_000 / rpm as u64))
    }

    pub fn custom_endpoint_registry(&self) -> Result<CustomEndpointRegistry, ConfigError> {
        parse_custom_endpoints(&self.custom_endpoints)
    }
}

/// Parse `name=model_id,name=model_id` into a registry.
pub fn parse_custom_endpoints(raw: &str) -> Result<CustomEndpointRegistry, ConfigError> {
    let mut registry = CustomEndpointRegistry::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, model_id) = entry
            .split_once('=')
            .map(|(n, id)| (n.trim(), id.trim()))
            .filter(|(n, id)| !n.is_empty() && !id.is_empty())
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "Custom endpoint must be name=model_id, got: {entry}"
                ))
            })?;

        if registry.register(name, model_id).is_some() {
            return Err(ConfigError::Validation(format!(
                "Duplicate custom endpoint name: {name}"
            )));
        }
    }

    Ok(registry)
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_defaults() {
        // Unique prefix so parallel tests don't see each other's variables
        let prefix = "EYEEM_TEST_DEFAULTS_";
        env::set_var(format!("{prefix}CLIENT_ID"), "id");
        env::set_var(format!("{prefix}CLIENT_SECRET"), "secret");

        let config =
            Config::from_env_with_prefix(prefix).expect("Failed to load config with defaults");

        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.request_timeout_seconds, 30);
        assert_eq!(config.throttle_requests_per_minute, None);
        assert!(config.custom_endpoint_registry().unwrap().is_empty());
    }

    #[test]
    fn test_config_from_env_overrides() {
        let prefix = "EYEEM_TEST_OVERRIDES_";
        env::set_var(format!("{prefix}CLIENT_ID"), "id");
        env::set_var(format!("{prefix}CLIENT_SECRET"), "secret");
        env::set_var(format!("{prefix}API_BASE_URL"), "http://localhost:9000/v1");
        env::set_var(format!("{prefix}THROTTLE_REQUESTS_PER_MINUTE"), "30");
        env::set_var(
            format!("{prefix}CUSTOM_ENDPOINTS"),
            "portrait=abc, street = def",
        );

        let config = Config::from_env_with_prefix(prefix).expect("Failed to load config");

        assert_eq!(config.api_base_url, "http://localhost:9000/v1");
        assert_eq!(config.throttle_interval(), Some(Duration::from_secs(2)));

        let registry = config.custom_endpoint_registry().unwrap();
        assert_eq!(registry.model_id("portrait"), Some("abc"));
        assert_eq!(registry.model_id("street"), Some("def"));
    }

    #[test]
    fn test_config_missing_credentials() {
        let result = Config::from_env_with_prefix("EYEEM_TEST_MISSING_");
        assert!(matches!(result, Err(ConfigError::EnvVar(_))));
    }

    #[test]
    fn test_config_validation_invalid_url() {
        let mut config = Config::new("id", "secret");
        config.api_base_url = "vision-api.eyeem.com".to_string();

        let result = config.validate();
        assert!(result.is_err());
        let error_msg = result.unwrap_err().to_string();
        assert!(error_msg.contains("must start with http:// or https://"));
    }

    #[test]
    fn test_config_validation_empty_secret() {
        let config = Config::new("id", "  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_throttle_range() {
        let mut config = Config::new("id", "secret");
        config.throttle_requests_per_minute = Some(0);

        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("between 1 and 600"));

        config.throttle_requests_per_minute = Some(60);
        assert!(config.validate().is_ok());
        assert_eq!(config.throttle_interval(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_zero_throttle_has_no_interval() {
        let mut config = Config::new("id", "secret");
        config.throttle_requests_per_minute = Some(0);

        assert_eq!(config.throttle_interval(), None);
    }

    #[test]
    fn test_parse_custom_endpoints_rejects_bad_entries() {
        assert!(parse_custom_endpoints("portrait").is_err());
        assert!(parse_custom_endpoints("=abc").is_err());
        assert!(parse_custom_endpoints("portrait=").is_err());
        assert!(parse_custom_endpoints("a=1,a=2").is_err());
    }

    #[test]
    fn test_parse_custom_endpoints_skips_blank_entries() {
        let registry = parse_custom_endpoints(" a=1,, b=2 ,").unwrap();
        assert_eq!(registry.len(), 2);
        assert!(parse_custom_endpoints("").unwrap().is_empty());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = Config::new("id", "very-secret");
        assert!(!format!("{config:?}").contains("very-secret"));
    }
}
