//! Configuration management
//!
//! This module handles loading and parsing configuration for the TechInsights backend.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Read cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Blog generation (LLM) configuration
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Cover image search configuration
    #[serde(default)]
    pub images: ImageConfig,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin, `*` allows any origin
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_cors_origin() -> String {
    "*".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/techinsights.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Read cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
        }
    }
}

fn default_ttl() -> u64 {
    3600
}

/// Blog generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Generation API endpoint (Gemini `generateContent` style)
    #[serde(default)]
    pub api_url: Option<String>,
    /// Generation API key, sent as the `key` query parameter
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    /// Window during which the newest post counts as fresh
    #[serde(default = "default_cache_window_minutes")]
    pub cache_window_minutes: u64,
    /// Interval for scheduled background generation, 0 disables it
    #[serde(default)]
    pub schedule_interval_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            timeout_secs: default_generation_timeout(),
            cache_window_minutes: default_cache_window_minutes(),
            schedule_interval_secs: 0,
        }
    }
}

fn default_generation_timeout() -> u64 {
    25
}

fn default_cache_window_minutes() -> u64 {
    60
}

impl GenerationConfig {
    /// Freshness window as a chrono duration
    pub fn cache_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cache_window_minutes as i64)
    }
}

/// Cover image search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Image API base URL
    #[serde(default = "default_image_api_url")]
    pub api_url: String,
    /// Image API access key (`Client-ID` authorization)
    #[serde(default)]
    pub access_key: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_image_timeout")]
    pub timeout_secs: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            api_url: default_image_api_url(),
            access_key: None,
            timeout_secs: default_image_timeout(),
        }
    }
}

fn default_image_api_url() -> String {
    "https://api.unsplash.com".to_string()
}

fn default_image_timeout() -> u64 {
    10
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret used to sign access tokens
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Token lifetime in days
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
    /// Shared secret that lets the scheduler/cron caller act as admin
    #[serde(default)]
    pub cron_secret: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            token_ttl_days: default_token_ttl_days(),
            cron_secret: None,
        }
    }
}

/// No built-in signing secret; startup refuses to run until one is set
fn default_jwt_secret() -> String {
    String::new()
}

impl AuthConfig {
    /// Reject configurations that would sign tokens with a blank secret
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingJwtSecret);
        }
        Ok(())
    }
}

fn default_token_ttl_days() -> i64 {
    30
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("auth.jwt_secret is not set (set JWT_SECRET or TECHINSIGHTS_AUTH_JWT_SECRET)")]
    MissingJwtSecret,
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Prefixed variables always win:
    /// - TECHINSIGHTS_SERVER_HOST / TECHINSIGHTS_SERVER_PORT / TECHINSIGHTS_SERVER_CORS_ORIGIN
    /// - TECHINSIGHTS_DATABASE_DRIVER / TECHINSIGHTS_DATABASE_URL
    /// - TECHINSIGHTS_GENERATION_API_URL / TECHINSIGHTS_GENERATION_API_KEY
    /// - TECHINSIGHTS_GENERATION_CACHE_WINDOW_MINUTES / TECHINSIGHTS_GENERATION_SCHEDULE_INTERVAL_SECS
    /// - TECHINSIGHTS_IMAGES_ACCESS_KEY
    /// - TECHINSIGHTS_AUTH_JWT_SECRET / TECHINSIGHTS_AUTH_CRON_SECRET
    ///
    /// The conventional deployment variables (`PORT`, `GEMINI_API_URL`, `GEMINI_API_KEY`,
    /// `UNSPLASH_ACCESS_KEY`, `JWT_SECRET`, `CRON_SECRET`) are honored when the
    /// prefixed variable is absent.
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Some(host) = env_var(&["TECHINSIGHTS_SERVER_HOST"]) {
            self.server.host = host;
        }
        if let Some(port) = env_var(&["TECHINSIGHTS_SERVER_PORT", "PORT"]) {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Some(cors_origin) = env_var(&["TECHINSIGHTS_SERVER_CORS_ORIGIN"]) {
            self.server.cors_origin = cors_origin;
        }

        // Database configuration
        if let Some(driver) = env_var(&["TECHINSIGHTS_DATABASE_DRIVER"]) {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Some(url) = env_var(&["TECHINSIGHTS_DATABASE_URL"]) {
            self.database.url = url;
        }

        // Generation configuration
        if let Some(url) = env_var(&["TECHINSIGHTS_GENERATION_API_URL", "GEMINI_API_URL"]) {
            self.generation.api_url = Some(url);
        }
        if let Some(key) = env_var(&["TECHINSIGHTS_GENERATION_API_KEY", "GEMINI_API_KEY"]) {
            self.generation.api_key = Some(key);
        }
        if let Some(window) = env_var(&["TECHINSIGHTS_GENERATION_CACHE_WINDOW_MINUTES"]) {
            if let Ok(window) = window.parse::<u64>() {
                self.generation.cache_window_minutes = window;
            }
        }
        if let Some(interval) = env_var(&["TECHINSIGHTS_GENERATION_SCHEDULE_INTERVAL_SECS"]) {
            if let Ok(interval) = interval.parse::<u64>() {
                self.generation.schedule_interval_secs = interval;
            }
        }

        // Image configuration
        if let Some(key) = env_var(&["TECHINSIGHTS_IMAGES_ACCESS_KEY", "UNSPLASH_ACCESS_KEY"]) {
            self.images.access_key = Some(key);
        }

        // Auth configuration
        if let Some(secret) = env_var(&["TECHINSIGHTS_AUTH_JWT_SECRET", "JWT_SECRET"]) {
            self.auth.jwt_secret = secret;
        }
        if let Some(secret) = env_var(&["TECHINSIGHTS_AUTH_CRON_SECRET", "CRON_SECRET"]) {
            self.auth.cron_secret = Some(secret);
        }
    }
}

/// First non-empty value among the given variable names
fn env_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.is_empty())
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
