//! Mail credentials
//!
//! Read from a `KEY=value` file. The first existing file among
//! `ARGUS_CONFIG`, `~/.argus_config` and `./.argus_config` wins.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::DispatchError;

pub const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com:587";

const CONFIG_FILE_NAME: &str = ".argus_config";

const REQUIRED_KEYS: [&str; 4] = [
    "EMAIL_SENDER",
    "EMAIL_RECIPIENT",
    "EMAIL_SENDER_USERNAME",
    "EMAIL_SENDER_PASSWORD",
];

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub sender: String,
    pub recipient: String,
    pub username: String,
    pub password: String,
    pub server: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("sender", &self.sender)
            .field("recipient", &self.recipient)
            .field("username", &self.username)
            .field("password", &"***")
            .field("server", &self.server)
            .finish()
    }
}

impl Credentials {
    /// Loads credentials from the first file found on the search path
    pub fn discover(explicit: Option<&Path>) -> Result<Self, DispatchError> {
        let candidates = search_paths(explicit);
        match candidates.iter().find(|p| p.is_file()) {
            Some(path) => Self::load(path),
            None => Err(DispatchError::CredentialsNotFound {
                searched: candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    pub fn load(path: &Path) -> Result<Self, DispatchError> {
        let contents = std::fs::read_to_string(path).map_err(|source| DispatchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let credentials = Self::from_map(path, parse(&contents))?;
        info!("Loaded mail credentials from {}", path.display());
        Ok(credentials)
    }

    fn from_map(path: &Path, mut values: HashMap<String, String>) -> Result<Self, DispatchError> {
        let missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .filter(|key| values.get(**key).is_none_or(|v| v.is_empty()))
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DispatchError::IncompleteCredentials {
                path: path.to_path_buf(),
                keys: missing,
            });
        }

        let mut take = |key: &str| values.remove(key).unwrap_or_default();
        Ok(Self {
            sender: take("EMAIL_SENDER"),
            recipient: take("EMAIL_RECIPIENT"),
            username: take("EMAIL_SENDER_USERNAME"),
            password: take("EMAIL_SENDER_PASSWORD"),
            server: Some(take("SMTP_SERVER"))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SMTP_SERVER.to_string()),
        })
    }
}

/// Candidate credential files, in lookup order
pub fn search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = explicit {
        paths.push(path.to_path_buf());
    }
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from(".").join(CONFIG_FILE_NAME));
    paths
}

/// Parses `KEY=value` lines, skipping blanks and `#` comments
pub fn parse(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let key = key.trim().trim_start_matches("export ").trim();
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            (key.to_string(), value.to_string())
        })
        .collect()
}
