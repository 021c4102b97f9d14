use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    error::{RateLimitError, Result},
    identity::DEFAULT_TOKEN_HEADER,
    limiter::LimiterConfig,
    storage::RedisConfig,
};

/// Process settings for the rate limit service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rate_limit_ip_requests_per_second: u32,
    pub rate_limit_ip_block_duration_seconds: u64,
    pub rate_limit_token_requests_per_second: u32,
    pub rate_limit_token_block_duration_seconds: u64,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: String,
    pub redis_db: i64,
    pub server_port: u16,
    pub token_header: String,
    pub request_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let limits = LimiterConfig::default();
        Self {
            rate_limit_ip_requests_per_second: limits.ip_requests_per_second,
            rate_limit_ip_block_duration_seconds: limits.ip_block_duration_seconds,
            rate_limit_token_requests_per_second: limits.token_requests_per_second,
            rate_limit_token_block_duration_seconds: limits.token_block_duration_seconds,
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_password: String::new(),
            redis_db: 0,
            server_port: 8080,
            token_header: DEFAULT_TOKEN_HEADER.to_string(),
            request_timeout_ms: 1000,
        }
    }
}

impl Settings {
    /// Load settings from defaults, an optional YAML file, then environment
    /// variables such as `RATE_LIMIT_IP_REQUESTS_PER_SECOND` or `REDIS_HOST`.
    /// Empty variables count as unset.
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::load_with(path, config::Environment::default())
    }

    fn load_with(path: Option<&str>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::new(path, config::FileFormat::Yaml));
        }
        let settings: Settings = builder
            .add_source(env.try_parsing(true).ignore_empty(true))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rate_limit_ip_requests_per_second == 0 {
            return Err(RateLimitError::Config(
                "rate_limit_ip_requests_per_second must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit_token_requests_per_second == 0 {
            return Err(RateLimitError::Config(
                "rate_limit_token_requests_per_second must be greater than zero".to_string(),
            ));
        }
        if self.token_header.trim().is_empty() {
            return Err(RateLimitError::Config(
                "token_header must not be empty".to_string(),
            ));
        }
        http::HeaderName::from_bytes(self.token_header.as_bytes()).map_err(|e| {
            RateLimitError::Config(format!("invalid token_header {:?}: {}", self.token_header, e))
        })?;
        Ok(())
    }

    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig {
            ip_requests_per_second: self.rate_limit_ip_requests_per_second,
            ip_block_duration_seconds: self.rate_limit_ip_block_duration_seconds,
            token_requests_per_second: self.rate_limit_token_requests_per_second,
            token_block_duration_seconds: self.rate_limit_token_block_duration_seconds,
        }
    }

    pub fn redis_config(&self) -> RedisConfig {
        RedisConfig {
            command_timeout: self.request_timeout(),
            ..RedisConfig::from_parts(
                &self.redis_host,
                self.redis_port,
                &self.redis_password,
                self.redis_db,
            )
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.rate_limit_ip_requests_per_second, 10);
        assert_eq!(settings.rate_limit_ip_block_duration_seconds, 300);
        assert_eq!(settings.rate_limit_token_requests_per_second, 100);
        assert_eq!(settings.rate_limit_token_block_duration_seconds, 600);
        assert_eq!(settings.token_header, "API_KEY");
        assert!(settings.validate().is_ok());
    }

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::default().source(Some(vars))
    }

    fn load_yaml(name: &str, yaml: &str, vars: &[(&str, &str)]) -> Result<Settings> {
        let path = std::env::temp_dir().join(format!(
            "edge-ratelimit-{}-{}.yaml",
            name,
            std::process::id()
        ));
        std::fs::write(&path, yaml).unwrap();
        let result = Settings::load_with(path.to_str(), env(vars));
        std::fs::remove_file(&path).unwrap();
        result
    }

    #[test]
    fn test_load_settings_from_yaml() {
        let yaml = r#"
rate_limit_ip_requests_per_second: 5
rate_limit_ip_block_duration_seconds: 60
rate_limit_token_requests_per_second: 10
rate_limit_token_block_duration_seconds: 120
redis_host: cache
"#;

        let settings = load_yaml("full", yaml, &[]).unwrap();
        let limits = settings.limiter_config();
        assert_eq!(limits.ip_requests_per_second, 5);
        assert_eq!(limits.token_block_duration_seconds, 120);
        assert_eq!(settings.redis_port, 6379);
        assert_eq!(settings.redis_config().url, "redis://cache:6379/0");
    }

    #[test]
    fn test_env_overrides_file() {
        let yaml = "redis_host: cache\nserver_port: 9000\n";
        let settings = load_yaml("env", yaml, &[("REDIS_HOST", "redis.internal")]).unwrap();
        assert_eq!(settings.redis_host, "redis.internal");
        assert_eq!(settings.server_port, 9000);
    }

    #[test]
    fn test_empty_env_values_use_defaults() {
        let settings = Settings::load_with(
            None,
            env(&[
                ("REDIS_PORT", ""),
                ("REDIS_HOST", ""),
                ("RATE_LIMIT_IP_REQUESTS_PER_SECOND", "7"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.redis_port, 6379);
        assert_eq!(settings.redis_host, "localhost");
        assert_eq!(settings.rate_limit_ip_requests_per_second, 7);
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        let yaml = "rate_limit_ip_requests_per_second: 0\n";
        assert!(matches!(
            load_yaml("zero-rate", yaml, &[]),
            Err(RateLimitError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_token_header_is_rejected() {
        let settings = Settings {
            token_header: "bad header".to_string(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_block_duration_is_allowed() {
        let yaml = "rate_limit_ip_block_duration_seconds: 0\n";
        let settings = load_yaml("zero-block", yaml, &[]).unwrap();
        assert_eq!(settings.limiter_config().ip_block_duration_seconds, 0);
    }

    #[test]
    fn test_redis_timeout_follows_request_timeout() {
        let settings = Settings {
            request_timeout_ms: 250,
            ..Default::default()
        };
        assert_eq!(
            settings.redis_config().command_timeout,
            Duration::from_millis(250)
        );
    }
}
