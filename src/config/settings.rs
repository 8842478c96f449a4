use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

/// Reads a variable from the process environment (or a stand-in for it).
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub fn process_env() -> EnvLookup {
    Arc::new(|key| std::env::var(key).ok())
}

#[derive(Debug)]
pub struct ConfigError(String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub cors: CorsSettings,
    #[serde(default)]
    pub security: SecuritySettings,
    #[serde(default)]
    pub probe: ProbeSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: StringOrVec,
}

#[derive(Debug, Clone)]
pub struct StringOrVec(pub Vec<String>);

impl<'de> serde::Deserialize<'de> for StringOrVec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct StringOrVecVisitor;

        impl<'de> Visitor<'de> for StringOrVecVisitor {
            type Value = StringOrVec;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a string or array of strings")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(StringOrVec::from_csv(v))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut vec = Vec::new();
                while let Some(s) = seq.next_element::<String>()? {
                    vec.push(s);
                }
                Ok(StringOrVec(vec))
            }
        }

        deserializer.deserialize_any(StringOrVecVisitor)
    }
}

impl StringOrVec {
    fn from_csv(value: &str) -> Self {
        StringOrVec(
            value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecuritySettings {
    /// 64 hex characters; secrets (API keys, database passwords) are sealed
    /// with this key before they reach the store.
    #[serde(default = "default_encryption_key")]
    pub encryption_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSettings {
    /// Upper bound for a connectivity test when the caller gives none.
    #[serde(default = "default_probe_timeout")]
    pub default_timeout_secs: u64,
    #[serde(default = "default_probe_max_timeout")]
    pub max_timeout_secs: u64,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_request_timeout() -> u64 {
    120
}
fn default_db_url() -> String {
    "sqlite:tradedesk.db?mode=rwc".to_string()
}
fn default_max_connections() -> u32 {
    10
}
fn default_min_connections() -> u32 {
    1
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}
fn default_encryption_key() -> String {
    String::new()
}
fn default_probe_timeout() -> u64 {
    30
}
fn default_probe_max_timeout() -> u64 {
    600
}
fn default_allowed_origins() -> StringOrVec {
    StringOrVec(vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
    ])
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            encryption_key: default_encryption_key(),
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_probe_timeout(),
            max_timeout_secs: default_probe_max_timeout(),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Settings {
            server: ServerSettings {
                host: std::env::var("SERVER_HOST").unwrap_or_else(|_| default_host()),
                port: env_parsed("SERVER_PORT").unwrap_or_else(default_port),
                request_timeout_secs: env_parsed("REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(default_request_timeout),
            },
            database: DatabaseSettings {
                url: std::env::var("DATABASE_URL").unwrap_or_else(|_| default_db_url()),
                max_connections: env_parsed("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(default_max_connections),
                min_connections: env_parsed("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(default_min_connections),
            },
            logging: LoggingSettings {
                level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| default_log_level()),
                format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| default_log_format()),
            },
            cors: CorsSettings {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .map(|s| StringOrVec::from_csv(&s))
                    .unwrap_or_else(|_| default_allowed_origins()),
            },
            security: SecuritySettings {
                encryption_key: std::env::var("ENCRYPTION_KEY")
                    .unwrap_or_else(|_| default_encryption_key()),
            },
            probe: ProbeSettings {
                default_timeout_secs: env_parsed("PROBE_TIMEOUT_SECS")
                    .unwrap_or_else(default_probe_timeout),
                max_timeout_secs: env_parsed("PROBE_MAX_TIMEOUT_SECS")
                    .unwrap_or_else(default_probe_max_timeout),
            },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.encryption_key.len() != 64 {
            return Err(ConfigError(
                "Encryption key must be 64 hex characters (32 bytes)".to_string(),
            ));
        }
        if hex::decode(&self.security.encryption_key).is_err() {
            return Err(ConfigError(
                "Encryption key must be valid hex".to_string(),
            ));
        }

        if self.probe.default_timeout_secs == 0 {
            return Err(ConfigError(
                "Probe timeout must be at least one second".to_string(),
            ));
        }
        if self.probe.max_timeout_secs < self.probe.default_timeout_secs {
            return Err(ConfigError(
                "Maximum probe timeout cannot be lower than the default".to_string(),
            ));
        }

        Ok(())
    }
}

impl ServerSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ProbeSettings {
    /// Clamps a caller-supplied timeout into `1..=max_timeout_secs`,
    /// substituting the default when none was given.
    pub fn effective_timeout(&self, requested_secs: Option<u64>) -> Duration {
        let secs = requested_secs
            .unwrap_or(self.default_timeout_secs)
            .clamp(1, self.max_timeout_secs);
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_settings() -> Settings {
        Settings {
            server: ServerSettings::default(),
            database: DatabaseSettings::default(),
            logging: LoggingSettings::default(),
            cors: CorsSettings::default(),
            security: SecuritySettings {
                encryption_key: "ab".repeat(32),
            },
            probe: ProbeSettings::default(),
        }
    }

    #[test]
    fn accepts_a_complete_configuration() {
        assert!(valid_settings().validate().is_ok());
    }

    #[test]
    fn rejects_short_or_non_hex_keys() {
        let mut settings = valid_settings();
        settings.security.encryption_key = "abc".to_string();
        assert!(settings.validate().is_err());

        settings.security.encryption_key = "zz".repeat(32);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn probe_timeout_defaults_and_clamps() {
        let probe = ProbeSettings::default();
        assert_eq!(probe.effective_timeout(None), Duration::from_secs(30));
        assert_eq!(probe.effective_timeout(Some(0)), Duration::from_secs(1));
        assert_eq!(probe.effective_timeout(Some(5_000)), Duration::from_secs(600));
    }

    #[test]
    fn origins_split_on_commas() {
        let origins = StringOrVec::from_csv("http://a.test, http://b.test,");
        assert_eq!(origins.0, vec!["http://a.test", "http://b.test"]);
    }
}
