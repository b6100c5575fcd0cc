use rollcall_core::{DEFAULT_CALL_TIMEOUT, DEFAULT_MATCH_THRESHOLD};
use rollcall_io::FaceApiCredentials;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_API_BASE_URL: &str = "https://api-us.faceplusplus.com";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read secrets file {path}: {source}")]
    SecretsRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("bad secrets file {path}: {source}")]
    SecretsParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("face service credentials missing: set ROLLCALL_SECRETS_FILE or ROLLCALL_API_KEY and ROLLCALL_API_SECRET")]
    MissingCredentials,
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Secrets file layout:
///
/// ```toml
/// [face_api]
/// api_key = "..."
/// api_secret = "..."
/// ```
#[derive(Debug, Deserialize)]
struct SecretsFile {
    face_api: SecretsSection,
}

#[derive(Debug, Deserialize)]
struct SecretsSection {
    api_key: String,
    api_secret: String,
}

/// CLI configuration, loaded from environment variables.
#[derive(Debug)]
pub struct Config {
    /// Face service base URL (default: Face++ US region).
    pub api_base_url: String,
    /// API key pair, if any was configured.
    pub credentials: Option<FaceApiCredentials>,
    /// Path to the SQLite ledger database.
    pub db_path: PathBuf,
    /// Confidence at or above which faces match.
    pub match_threshold: f64,
    /// Timeout in seconds for each face service call.
    pub call_timeout_secs: u64,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("ledger.db"));

        let match_threshold = parse_or(&var, "ROLLCALL_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD);
        if !(0.0..=100.0).contains(&match_threshold) {
            return Err(ConfigError::Invalid {
                key: "ROLLCALL_MATCH_THRESHOLD",
                reason: format!("{match_threshold} is outside 0-100"),
            });
        }

        let call_timeout_secs = parse_or(
            &var,
            "ROLLCALL_CALL_TIMEOUT_SECS",
            DEFAULT_CALL_TIMEOUT.as_secs(),
        );
        if call_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "ROLLCALL_CALL_TIMEOUT_SECS",
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            api_base_url: var("ROLLCALL_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            credentials: resolve_credentials(&var)?,
            db_path,
            match_threshold,
            call_timeout_secs,
        })
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn require_credentials(&self) -> Result<&FaceApiCredentials, ConfigError> {
        self.credentials.as_ref().ok_or(ConfigError::MissingCredentials)
    }
}

/// Environment variables win over the secrets file; a half-set pair falls
/// back to the file.
fn resolve_credentials(
    var: &impl Fn(&str) -> Option<String>,
) -> Result<Option<FaceApiCredentials>, ConfigError> {
    if let (Some(api_key), Some(api_secret)) = (var("ROLLCALL_API_KEY"), var("ROLLCALL_API_SECRET"))
    {
        return Ok(Some(FaceApiCredentials {
            api_key,
            api_secret,
        }));
    }
    match var("ROLLCALL_SECRETS_FILE") {
        Some(path) => read_secrets(Path::new(&path)).map(Some),
        None => Ok(None),
    }
}

fn read_secrets(path: &Path) -> Result<FaceApiCredentials, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::SecretsRead {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: SecretsFile = toml::from_str(&text).map_err(|source| ConfigError::SecretsParse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(FaceApiCredentials {
        api_key: parsed.face_api.api_key,
        api_secret: parsed.face_api.api_secret,
    })
}

fn parse_or<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
