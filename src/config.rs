use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AppError;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const HOME_DIR_NAME: &str = ".goalforge";
const TOKEN_FILE: &str = "tokens.json";

/// Runtime settings resolved from flags and their environment fallbacks.
#[derive(Clone, Debug)]
pub struct Config {
    pub home: PathBuf,
    pub remote: Option<Url>,
    pub timeout: Duration,
}

impl Config {
    pub fn resolve(
        home: Option<PathBuf>,
        remote: Option<String>,
        timeout_ms: Option<u64>,
    ) -> Result<Self, AppError> {
        let home = match home {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => default_home()?,
        };
        let remote = match remote.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(parse_remote(raw)?),
            _ => None,
        };
        let timeout_ms = timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
        if timeout_ms == 0 {
            return Err(AppError::InvalidInput(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            home,
            remote,
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    pub fn token_path(&self) -> PathBuf {
        self.home.join(TOKEN_FILE)
    }
}

fn default_home() -> Result<PathBuf, AppError> {
    match std::env::var("HOME") {
        Ok(home) if !home.trim().is_empty() => Ok(PathBuf::from(home).join(HOME_DIR_NAME)),
        _ => Err(AppError::InvalidInput(
            "unable to resolve home directory; set GOALFORGE_HOME".to_string(),
        )),
    }
}

fn parse_remote(raw: &str) -> Result<Url, AppError> {
    let url = Url::parse(raw)
        .map_err(|err| AppError::InvalidInput(format!("invalid remote url {raw}: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AppError::InvalidInput(format!(
            "unsupported remote scheme: {other}"
        ))),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl TokenPair {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
        }
    }

    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// The persisted token pair, kept as JSON under the home directory.
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<TokenPair>, AppError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let tokens: TokenPair = serde_json::from_str(&raw)?;
        if tokens.access_token.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(tokens))
    }

    pub fn save(&self, tokens: &TokenPair) -> Result<(), AppError> {
        if tokens.access_token.trim().is_empty() {
            return Err(AppError::InvalidInput("token cannot be empty".to_string()));
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(tokens)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    /// Returns whether a token file was removed.
    pub fn clear(&self) -> Result<bool, AppError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
