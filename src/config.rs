use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const WAL_FILE_NAME: &str = "courtbook.wal";

/// HS256 keys shorter than the hash output weaken the signature.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} has an invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("COURTBOOK_JWT_SECRET must be at least 32 bytes, got {0}")]
    SecretTooShort(usize),
}

/// Signing secret and token lifetimes.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub auth: AuthConfig,
    /// WAL appends replayed on open before the binary rewrites the log.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

/// A token lifetime in whole seconds; zero would issue dead tokens.
fn parse_ttl(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default_secs: u64,
) -> Result<Duration, ConfigError> {
    match parse_or(lookup, var, default_secs)? {
        0 => Err(ConfigError::Invalid {
            var,
            value: lookup(var).unwrap_or_default(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret =
            lookup("COURTBOOK_JWT_SECRET").ok_or(ConfigError::Missing("COURTBOOK_JWT_SECRET"))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::SecretTooShort(jwt_secret.len()));
        }

        let access_ttl = parse_ttl(&lookup, "COURTBOOK_ACCESS_TTL_SECS", 1800)?;
        let refresh_ttl = parse_ttl(&lookup, "COURTBOOK_REFRESH_TTL_SECS", 60480)?;
        let metrics_port = match lookup("COURTBOOK_METRICS_PORT") {
            None => None,
            Some(value) => Some(value.trim().parse::<u16>().map_err(|_| ConfigError::Invalid {
                var: "COURTBOOK_METRICS_PORT",
                value,
            })?),
        };

        Ok(Self {
            data_dir: PathBuf::from(lookup("COURTBOOK_DATA_DIR").unwrap_or_else(|| "./data".into())),
            auth: AuthConfig {
                jwt_secret,
                access_ttl,
                refresh_ttl,
            },
            compact_threshold: parse_or(&lookup, "COURTBOOK_COMPACT_THRESHOLD", 1000u64)?,
            metrics_port,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }
}
