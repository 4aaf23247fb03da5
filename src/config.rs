use std::fs;
use std::time::Duration;

use yaml_rust::{Yaml, YamlLoader};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Unreadable { path: String, source: std::io::Error },

    #[error("config is not valid yaml: {0}")]
    Malformed(#[from] yaml_rust::ScanError),

    #[error("required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Mysql,
    Memory,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MysqlConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ttl: chrono::Duration,
    pub secure_cookies: bool,
}

#[derive(Debug, Clone)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub hash_iterations: u32,
}

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub currency: String,
    pub api_base_url: String,
    pub timeout: Duration,
    /// Attempts made after the first one fails.
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RazorpayConfig {
    /// The gateway is usable only when both halves of the key pair are present.
    pub fn is_configured(&self) -> bool {
        !self.key_id.is_empty() && !self.key_secret.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageBackend,
    /// Only present for the mysql backend.
    pub mysql: Option<MysqlConfig>,
    pub session: SessionConfig,
    pub password: PasswordConfig,
    pub razorpay: RazorpayConfig,
    pub maintenance_interval: Duration,
    /// Accounts granted the staff capability at startup.
    pub staff_usernames: Vec<String>,
}

impl AppConfig {

    pub fn load(path: &str) -> Result<AppConfig, ConfigError> {
        let buf = fs::read_to_string(path)
            .map_err(|source| ConfigError::Unreadable { path: path.to_string(), source })?;
        let mut config = AppConfig::from_yaml_str(&buf)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_yaml_str(buf: &str) -> Result<AppConfig, ConfigError> {
        let config = YamlLoader::load_from_str(buf)?.into_iter().next().unwrap_or(Yaml::Null);

        let server = &config["server"];
        let server = ServerConfig {
            host: string_or(&server["host"], "server.host", "0.0.0.0")?,
            port: port_or(&server["port"], "server.port", 8000)?,
            allowed_origins: string_list(&server["allowed_origins"], "server.allowed_origins")?,
        };

        let storage = match string_or(&config["storage"]["backend"], "storage.backend", "mysql")?.as_str() {
            "mysql" => StorageBackend::Mysql,
            "memory" => StorageBackend::Memory,
            other => return Err(ConfigError::InvalidValue {
                key: "storage.backend",
                reason: format!("expected mysql or memory, got {}", other),
            }),
        };

        let mysql = match storage {
            StorageBackend::Mysql => {
                let creds = &config["mysql"];
                Some(MysqlConfig {
                    host: required_string(&creds["host"], "mysql.host")?,
                    port: port_or(&creds["port"], "mysql.port", 3306)?,
                    username: required_string(&creds["username"], "mysql.username")?,
                    password: required_string(&creds["password"], "mysql.password")?,
                    database: required_string(&creds["database"], "mysql.database")?,
                    max_connections: positive_or(&creds["max_connections"], "mysql.max_connections", 10)? as u32,
                })
            }
            StorageBackend::Memory => None,
        };

        let session = &config["session"];
        let session = SessionConfig {
            ttl: chrono::Duration::hours(positive_or(&session["ttl_hours"], "session.ttl_hours", 24 * 14)?),
            secure_cookies: bool_or(&session["secure_cookies"], "session.secure_cookies", false)?,
        };

        let password = &config["password"];
        let password = PasswordConfig {
            min_length: positive_or(&password["min_length"], "password.min_length", 8)? as usize,
            hash_iterations: positive_or(&password["hash_iterations"], "password.hash_iterations", 600_000)? as u32,
        };

        let razorpay = &config["razorpay"];
        let razorpay = RazorpayConfig {
            key_id: string_or(&razorpay["key_id"], "razorpay.key_id", "")?,
            key_secret: string_or(&razorpay["key_secret"], "razorpay.key_secret", "")?,
            currency: string_or(&razorpay["currency"], "razorpay.currency", "INR")?,
            api_base_url: string_or(&razorpay["api_base_url"], "razorpay.api_base_url", "https://api.razorpay.com")?,
            timeout: Duration::from_secs(positive_or(&razorpay["timeout_secs"], "razorpay.timeout_secs", 10)? as u64),
            max_retries: non_negative_or(&razorpay["max_retries"], "razorpay.max_retries", 3)? as u32,
            initial_backoff: Duration::from_millis(positive_or(&razorpay["backoff_ms"], "razorpay.backoff_ms", 250)? as u64),
        };

        let maintenance_interval = Duration::from_secs(
            positive_or(&config["maintenance"]["interval_secs"], "maintenance.interval_secs", 300)? as u64);

        Ok(AppConfig {
            server,
            storage,
            mysql,
            session,
            password,
            razorpay,
            maintenance_interval,
            staff_usernames: string_list(&config["staff"]["usernames"], "staff.usernames")?,
        })
    }

    /// Gateway keys can come from the environment so they stay out of the config file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) where F: Fn(&str) -> Option<String> {
        if let Some(key_id) = lookup("RAZORPAY_KEY_ID") {
            self.razorpay.key_id = key_id;
        }
        if let Some(key_secret) = lookup("RAZORPAY_KEY_SECRET") {
            self.razorpay.key_secret = key_secret;
        }
    }
}

fn is_unset(node: &Yaml) -> bool {
    node.is_badvalue() || node.is_null()
}

fn invalid(key: &'static str, expected: &str) -> ConfigError {
    ConfigError::InvalidValue { key, reason: format!("expected {}", expected) }
}

fn required_string(node: &Yaml, key: &'static str) -> Result<String, ConfigError> {
    if is_unset(node) {
        return Err(ConfigError::MissingRequired(key));
    }
    string_or(node, key, "")
}

fn string_or(node: &Yaml, key: &'static str, default: &str) -> Result<String, ConfigError> {
    match node {
        _ if is_unset(node) => Ok(default.to_string()),
        Yaml::String(value) => Ok(value.clone()),
        Yaml::Integer(value) => Ok(value.to_string()),
        _ => Err(invalid(key, "a string")),
    }
}

fn int_or(node: &Yaml, key: &'static str, default: i64) -> Result<i64, ConfigError> {
    if is_unset(node) {
        return Ok(default);
    }
    node.as_i64().ok_or_else(|| invalid(key, "an integer"))
}

fn positive_or(node: &Yaml, key: &'static str, default: i64) -> Result<i64, ConfigError> {
    let value = int_or(node, key, default)?;
    if value <= 0 || value > u32::MAX as i64 {
        return Err(invalid(key, "a positive integer"));
    }
    Ok(value)
}

fn non_negative_or(node: &Yaml, key: &'static str, default: i64) -> Result<i64, ConfigError> {
    let value = int_or(node, key, default)?;
    if value < 0 || value > u32::MAX as i64 {
        return Err(invalid(key, "zero or a positive integer"));
    }
    Ok(value)
}

fn port_or(node: &Yaml, key: &'static str, default: u16) -> Result<u16, ConfigError> {
    let value = int_or(node, key, default as i64)?;
    u16::try_from(value).ok().filter(|p| *p != 0).ok_or_else(|| invalid(key, "a port number"))
}

fn bool_or(node: &Yaml, key: &'static str, default: bool) -> Result<bool, ConfigError> {
    if is_unset(node) {
        return Ok(default);
    }
    node.as_bool().ok_or_else(|| invalid(key, "true or false"))
}

fn string_list(node: &Yaml, key: &'static str) -> Result<Vec<String>, ConfigError> {
    if is_unset(node) {
        return Ok(Vec::new());
    }
    let items = node.as_vec().ok_or_else(|| invalid(key, "a list"))?;
    items.iter()
        .map(|item| item.as_str().map(str::to_string).ok_or_else(|| invalid(key, "a list of strings")))
        .collect()
}
