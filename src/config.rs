/// Configuration management for VideoTube
use crate::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Allowed browser origin; `*` allows any
    pub cors_origin: String,
    pub json_body_limit: usize,
    pub upload_limit: usize,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
    pub blob_location: PathBuf,
    pub upload_tmp_location: PathBuf,
    /// Public URL prefix under which stored blobs are served
    pub media_base_url: String,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub access_token_secret: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_secret: String,
    pub refresh_token_ttl_days: i64,
    /// Argon2 memory cost in KiB
    pub password_memory_kib: u32,
    pub password_iterations: u32,
    pub secure_cookies: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> ApiResult<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ApiError::Config(format!("{} has an invalid value", name))),
        Err(_) => Ok(default),
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ApiResult<Self> {
        dotenv::dotenv().ok();

        let hostname = var_or("VIDEOTUBE_HOSTNAME", "localhost");
        let port = parse_var("VIDEOTUBE_PORT", 8000u16)?;
        let cors_origin = var_or("VIDEOTUBE_CORS_ORIGIN", "*");
        let json_body_limit = parse_var("VIDEOTUBE_JSON_BODY_LIMIT", 16 * 1024usize)?;
        let upload_limit = parse_var("VIDEOTUBE_UPLOAD_LIMIT", 512 * 1024 * 1024usize)?;

        let data_directory: PathBuf = var_or("VIDEOTUBE_DATA_DIRECTORY", "./data").into();
        let database = env::var("VIDEOTUBE_DATABASE_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("videotube.sqlite"));
        let blob_location = env::var("VIDEOTUBE_BLOB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("media"));
        let upload_tmp_location = env::var("VIDEOTUBE_UPLOAD_TMP_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("temp"));
        let media_base_url = env::var("VIDEOTUBE_MEDIA_BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}/media", hostname, port));

        let access_token_secret = env::var("VIDEOTUBE_ACCESS_TOKEN_SECRET")
            .map_err(|_| ApiError::Config("Access token secret required".to_string()))?;
        let refresh_token_secret = env::var("VIDEOTUBE_REFRESH_TOKEN_SECRET")
            .map_err(|_| ApiError::Config("Refresh token secret required".to_string()))?;
        let access_token_ttl_minutes = parse_var("VIDEOTUBE_ACCESS_TOKEN_TTL_MINUTES", 15i64)?;
        let refresh_token_ttl_days = parse_var("VIDEOTUBE_REFRESH_TOKEN_TTL_DAYS", 10i64)?;
        let password_memory_kib = parse_var("VIDEOTUBE_PASSWORD_MEMORY_KIB", 19456u32)?;
        let password_iterations = parse_var("VIDEOTUBE_PASSWORD_ITERATIONS", 2u32)?;
        let secure_cookies = parse_var("VIDEOTUBE_SECURE_COOKIES", true)?;

        let level = env::var("RUST_LOG").unwrap_or_else(|_| var_or("VIDEOTUBE_LOG_LEVEL", "info"));
        let format = match var_or("VIDEOTUBE_LOG_FORMAT", "pretty").to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                cors_origin,
                json_body_limit,
                upload_limit,
            },
            storage: StorageConfig {
                data_directory,
                database,
                blob_location,
                upload_tmp_location,
                media_base_url,
            },
            authentication: AuthConfig {
                access_token_secret,
                access_token_ttl_minutes,
                refresh_token_secret,
                refresh_token_ttl_days,
                password_memory_kib,
                password_iterations,
                secure_cookies,
            },
            logging: LoggingConfig { level, format },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ApiResult<()> {
        if self.service.hostname.is_empty() {
            return Err(ApiError::Config("Hostname cannot be empty".to_string()));
        }

        let auth = &self.authentication;
        if auth.access_token_secret.len() < 32 || auth.refresh_token_secret.len() < 32 {
            return Err(ApiError::Config(
                "Token secrets must be at least 32 characters".to_string(),
            ));
        }

        if auth.access_token_secret == auth.refresh_token_secret {
            return Err(ApiError::Config(
                "Access and refresh token secrets must differ".to_string(),
            ));
        }

        if auth.access_token_ttl_minutes <= 0 || auth.refresh_token_ttl_days <= 0 {
            return Err(ApiError::Config("Token lifetimes must be positive".to_string()));
        }

        if auth.access_token_ttl_minutes >= auth.refresh_token_ttl_days.saturating_mul(24 * 60) {
            return Err(ApiError::Config(
                "Access tokens must expire before refresh tokens".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration rooted in a scratch directory, with cheap password hashing
    pub fn for_testing(data_directory: PathBuf) -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 8000,
                cors_origin: "*".to_string(),
                json_body_limit: 16 * 1024,
                upload_limit: 8 * 1024 * 1024,
            },
            storage: StorageConfig {
                database: data_directory.join("videotube.sqlite"),
                blob_location: data_directory.join("media"),
                upload_tmp_location: data_directory.join("temp"),
                media_base_url: "http://localhost:8000/media".to_string(),
                data_directory,
            },
            authentication: AuthConfig {
                access_token_secret: "test-access-secret-key-for-testing-only".to_string(),
                access_token_ttl_minutes: 15,
                refresh_token_secret: "test-refresh-secret-key-for-testing-only".to_string(),
                refresh_token_ttl_days: 10,
                password_memory_kib: 8,
                password_iterations: 1,
                secure_cookies: false,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}
