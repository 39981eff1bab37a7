use serde::Deserialize;
use std::fmt;
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = [
    "http://localhost:5173",
    "https://textmate-frontend.netlify.app",
];
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("AUTH_TOKEN_SECRET must be at least {MIN_SECRET_LEN} bytes")]
    SecretTooShort,
}

/// Keys accepted from the optional TOML file. Every key is optional and
/// environment variables take precedence over it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub mongo_uri: Option<String>,
    pub database_name: Option<String>,
    pub allowed_origins: Option<Vec<String>>,
    pub auth_token_secret: Option<String>,
    pub auth_token_ttl_hours: Option<u64>,
    pub cookie_secure: Option<bool>,
    pub login_rate_limit: Option<usize>,
    pub trusted_proxies: Option<Vec<String>>,
    pub json_limit_bytes: Option<usize>,
}

impl FileConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Ok(toml::from_str(&content)?)
    }
}

/// Process-wide settings, built once in `main` and shared read-only.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub mongo_uri: String,
    pub database_name: String,
    pub allowed_origins: Vec<String>,
    pub auth_token_secret: String,
    pub auth_token_ttl: Duration,
    pub cookie_secure: bool,
    pub login_rate_limit: usize,
    /// Peers whose `Forwarded`/`X-Forwarded-For` headers name the client.
    pub trusted_proxies: Vec<IpAddr>,
    pub json_limit_bytes: usize,
}

impl AppConfig {
    /// Loads `CONFIG_PATH` (if set) and layers the process environment on top.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match std::env::var("CONFIG_PATH") {
            Ok(path) => FileConfig::load_from_file(path)?,
            Err(_) => FileConfig::default(),
        };

        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    pub fn from_sources<F>(file: FileConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let host = env("HOST")
            .or(file.host)
            .unwrap_or_else(|| "0.0.0.0".to_string());

        let port = match env("PORT") {
            Some(raw) => parse_number("PORT", &raw)?,
            None => file.port.unwrap_or(DEFAULT_PORT),
        };

        let mongo_uri = env("MONGO_URI")
            .or(file.mongo_uri)
            .ok_or(ConfigError::Missing("MONGO_URI"))?;

        let database_name = env("DATABASE_NAME")
            .or(file.database_name)
            .unwrap_or_else(|| "textmate".to_string());

        let allowed_origins = match env("ALLOWED_ORIGINS") {
            Some(raw) => parse_origin_list(&raw),
            None => file.allowed_origins.unwrap_or_else(|| {
                DEFAULT_ALLOWED_ORIGINS
                    .iter()
                    .map(|origin| origin.to_string())
                    .collect()
            }),
        };

        let auth_token_secret = env("AUTH_TOKEN_SECRET")
            .or(file.auth_token_secret)
            .ok_or(ConfigError::Missing("AUTH_TOKEN_SECRET"))?;
        if auth_token_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::SecretTooShort);
        }

        let ttl_hours: u64 = match env("AUTH_TOKEN_TTL_HOURS") {
            Some(raw) => parse_number("AUTH_TOKEN_TTL_HOURS", &raw)?,
            None => file.auth_token_ttl_hours.unwrap_or(24),
        };

        let auth_token_ttl = ttl_hours
            .checked_mul(3600)
            .map(Duration::from_secs)
            .ok_or(ConfigError::Invalid {
                key: "AUTH_TOKEN_TTL_HOURS",
                value: ttl_hours.to_string(),
            })?;

        let cookie_secure = match env("COOKIE_SECURE") {
            Some(raw) => parse_flag("COOKIE_SECURE", &raw)?,
            None => file.cookie_secure.unwrap_or(false),
        };

        let login_rate_limit = match env("LOGIN_RATE_LIMIT") {
            Some(raw) => parse_number("LOGIN_RATE_LIMIT", &raw)?,
            None => file.login_rate_limit.unwrap_or(10),
        };

        let trusted_proxies = match env("TRUSTED_PROXIES") {
            Some(raw) => parse_ip_list(raw.split(','))?,
            None => parse_ip_list(file.trusted_proxies.iter().flatten().map(String::as_str))?,
        };

        let json_limit_bytes = match env("JSON_LIMIT_BYTES") {
            Some(raw) => parse_number("JSON_LIMIT_BYTES", &raw)?,
            None => file.json_limit_bytes.unwrap_or(64 * 1024),
        };

        Ok(Self {
            host,
            port,
            mongo_uri,
            database_name,
            allowed_origins,
            auth_token_secret,
            auth_token_ttl,
            cookie_secure,
            login_rate_limit,
            trusted_proxies,
            json_limit_bytes,
        })
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_name", &self.database_name)
            .field("allowed_origins", &self.allowed_origins)
            .field("auth_token_ttl", &self.auth_token_ttl)
            .field("cookie_secure", &self.cookie_secure)
            .field("login_rate_limit", &self.login_rate_limit)
            .field("trusted_proxies", &self.trusted_proxies)
            .field("json_limit_bytes", &self.json_limit_bytes)
            .finish_non_exhaustive()
    }
}

pub fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().trim_end_matches('/'))
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_ip_list<'a>(items: impl IntoIterator<Item = &'a str>) -> Result<Vec<IpAddr>, ConfigError> {
    items
        .into_iter()
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse().map_err(|_| ConfigError::Invalid {
                key: "TRUSTED_PROXIES",
                value: item.to_string(),
            })
        })
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
        }),
    }
}
