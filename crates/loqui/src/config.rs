//! Server configuration.
//!
//! Loaded from an optional TOML file overlaid with `LOQUI_*` environment
//! variables (e.g. `LOQUI_SERVER__PORT=9000`,
//! `LOQUI_COMPLETION__API_KEY=...`).

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageSettings,
    pub auth: AuthSettings,
    pub completion: CompletionSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; `*` allows any (development only).
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory for uploaded blobs.
    pub root: PathBuf,
    /// URL prefix under which uploads are served back.
    pub public_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// HS256 secret shared with the identity provider. Must be set.
    pub jwt_secret: String,
}

/// Which completion backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionProvider {
    /// Hosted Gemini-compatible API.
    Google,
    /// Canned replies, no network. For development and tests.
    Scripted,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    pub provider: CompletionProvider,
    pub base_url: String,
    pub model: String,
    /// API key; usually supplied as `LOQUI_COMPLETION__API_KEY`.
    pub api_key: Option<String>,
    /// Reply text for the scripted provider.
    pub scripted_reply: String,
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loqui")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageSettings::default(),
            auth: AuthSettings::default(),
            completion: CompletionSettings::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_origins: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("loqui.db"),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: data_dir().join("uploads"),
            public_base_url: "http://127.0.0.1:8080/files".to_string(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
        }
    }
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            provider: CompletionProvider::Google,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key: None,
            scripted_reply: "This is a scripted reply.".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(true),
            );
        }

        builder
            .add_source(Environment::with_prefix("LOQUI").separator("__"))
            .build()
            .context("reading configuration")?
            .try_deserialize()
            .context("parsing configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.completion.provider, CompletionProvider::Google);
        assert!(config.auth.jwt_secret.is_empty());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_provider_parses_lowercase() {
        let provider: CompletionProvider = serde_json::from_str("\"scripted\"").unwrap();
        assert_eq!(provider, CompletionProvider::Scripted);
    }
}
