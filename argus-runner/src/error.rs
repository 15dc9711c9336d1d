//! Runner error types

use std::path::PathBuf;

/// Errors that stop a workflow before or while it runs
///
/// Stage timeouts and non-zero exits are not errors; they are logged and
/// the pipeline continues with whatever output exists.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("workflow '{workflow}' requires '{tool}', which was not found on PATH")]
    MissingTool { workflow: String, tool: String },

    #[error("stage '{stage}' has an invalid filter '{pattern}': {source}")]
    InvalidFilter {
        stage: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Configuration errors terminate the invocation with exit code 1
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingTool { .. } | Self::InvalidFilter { .. })
    }
}

/// Errors reported by the notification dispatcher
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no credentials file found (searched: {searched})")]
    CredentialsNotFound { searched: String },

    #[error("credentials file {} is missing: {}", path.display(), keys.join(", "))]
    IncompleteCredentials { path: PathBuf, keys: Vec<String> },

    #[error("mail program '{0}' was not found on PATH")]
    MissingMailer(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("delivery failed after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors() {
        let missing = PipelineError::MissingTool {
            workflow: "vulns".to_string(),
            tool: "nuclei".to_string(),
        };
        assert!(missing.is_configuration());
        assert!(missing.to_string().contains("nuclei"));

        let io = PipelineError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        );
        assert!(!io.is_configuration());
    }

    #[test]
    fn test_incomplete_credentials_message() {
        let err = DispatchError::IncompleteCredentials {
            path: PathBuf::from("/home/op/.argus_config"),
            keys: vec!["EMAIL_SENDER".to_string(), "EMAIL_RECIPIENT".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "credentials file /home/op/.argus_config is missing: EMAIL_SENDER, EMAIL_RECIPIENT"
        );
    }
}
