use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct FinanceConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub storage: StorageBackend,
    pub mongodb: MongoConfig,
    pub images: ImagesConfig,
    pub auth: AuthConfig,
    pub fcm: FcmConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImagesConfig {
    /// Directory uploaded images are written to.
    pub local_path: String,
    /// Prefix for the absolute URLs returned to clients.
    pub public_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared HS256 secret with the identity provider.
    pub jwt_secret: Secret<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FcmConfig {
    pub enabled: bool,
    pub project_id: String,
    /// OAuth2 bearer token for the FCM HTTP v1 API.
    pub access_token: Secret<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongodb,
    Memory,
}

impl FinanceConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let mut common = core_config::Config::load()?;
        if common.otlp_endpoint.is_none() {
            common.otlp_endpoint = env::var("OTLP_ENDPOINT").ok();
        }

        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let storage: StorageBackend = get_env("STORAGE_BACKEND", Some("mongodb"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let fcm_enabled = get_env("FCM_ENABLED", Some("false"), false)?
            .parse::<bool>()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("FCM_ENABLED: {}", e)))?;

        Ok(FinanceConfig {
            common,
            storage,
            mongodb: MongoConfig {
                uri: get_env(
                    "MONGODB_URI",
                    Some("mongodb://localhost:27017"),
                    is_prod && storage == StorageBackend::Mongodb,
                )?,
                database: get_env("MONGODB_DATABASE", Some("finance_db"), is_prod)?,
            },
            images: ImagesConfig {
                local_path: get_env("IMAGES_LOCAL_PATH", Some("storage/images"), is_prod)?,
                public_base_url: get_env(
                    "IMAGES_PUBLIC_BASE_URL",
                    Some("http://localhost:8080/images"),
                    is_prod,
                )?,
            },
            auth: AuthConfig {
                jwt_secret: Secret::new(get_env("JWT_SECRET", None, is_prod)?),
            },
            fcm: FcmConfig {
                enabled: fcm_enabled,
                project_id: get_env("FCM_PROJECT_ID", Some(""), is_prod && fcm_enabled)?,
                access_token: Secret::new(get_env(
                    "FCM_ACCESS_TOKEN",
                    Some(""),
                    is_prod && fcm_enabled,
                )?),
            },
        })
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(StorageBackend::Mongodb),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(format!("Invalid storage backend: {}", s)),
        }
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
