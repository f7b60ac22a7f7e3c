use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::store::{DatabaseConfig, DatabaseType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Endpoint the extraction requests are POSTed to.
    pub endpoint: String,
    /// Bearer token for the extraction service, if it requires one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    300
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/extract".to_string(),
            api_key: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Config {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Config {
            database: DatabaseConfig {
                db_type: match std::env::var("DATABASE_TYPE")
                    .unwrap_or_else(|_| "sqlite".to_string())
                    .to_lowercase()
                    .as_str()
                {
                    "memory" => DatabaseType::Memory,
                    _ => DatabaseType::Sqlite,
                },
                sqlite_path: std::env::var("SQLITE_PATH")
                    .map(PathBuf::from)
                    .ok()
                    .or_else(|| Some(PathBuf::from("data/docgrid.db"))),
            },
            extraction: ExtractionConfig {
                endpoint: std::env::var("EXTRACTION_ENDPOINT")
                    .unwrap_or_else(|_| "http://localhost:8080/extract".to_string()),
                api_key: std::env::var("EXTRACTION_API_KEY").ok(),
                timeout_seconds: std::env::var("EXTRACTION_TIMEOUT_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_timeout_seconds),
            },
        };

        if config.extraction.api_key.is_none() {
            tracing::warn!(
                "EXTRACTION_API_KEY is not set. Extraction calls will be unauthenticated."
            );
        }

        config.database.validate().map_err(crate::Error::Config)?;

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            extraction: ExtractionConfig::default(),
        }
    }
}
