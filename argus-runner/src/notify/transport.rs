//! Delivery transports

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::Message;
use super::credentials::Credentials;
use crate::error::DispatchError;

/// Delivers one rendered message
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, message: &Message) -> Result<()>;
}

/// Sends mail through a `sendemail`-compatible command line program
pub struct CommandTransport {
    program: PathBuf,
    credentials: Credentials,
}

impl CommandTransport {
    pub fn new(mailer: &str, credentials: Credentials) -> Result<Self, DispatchError> {
        let program =
            which::which(mailer).map_err(|_| DispatchError::MissingMailer(mailer.to_string()))?;
        Ok(Self {
            program,
            credentials,
        })
    }

    fn args(&self, subject: &str, body_file: &Path) -> Vec<String> {
        let c = &self.credentials;
        vec![
            "-f".to_string(),
            c.sender.clone(),
            "-t".to_string(),
            c.recipient.clone(),
            "-u".to_string(),
            subject.to_string(),
            "-o".to_string(),
            format!("message-file={}", body_file.display()),
            "-s".to_string(),
            c.server.clone(),
            "-xu".to_string(),
            c.username.clone(),
            "-xp".to_string(),
            c.password.clone(),
            "-o".to_string(),
            "tls=yes".to_string(),
        ]
    }
}

#[async_trait]
impl Transport for CommandTransport {
    async fn deliver(&self, message: &Message) -> Result<()> {
        let mut body_file =
            tempfile::NamedTempFile::new().context("Failed to create message file")?;
        body_file
            .write_all(message.body.as_bytes())
            .context("Failed to write message file")?;

        debug!(
            "Invoking {} for '{}'",
            self.program.display(),
            message.subject
        );

        let output = Command::new(&self.program)
            .args(self.args(&message.subject, body_file.path()))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            anyhow::bail!("mailer exited with {}: {}", output.status, detail);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            sender: "argus@example.com".to_string(),
            recipient: "ops@example.com".to_string(),
            username: "argus".to_string(),
            password: "secret".to_string(),
            server: "smtp.example.com:587".to_string(),
        }
    }

    #[test]
    fn test_missing_mailer() {
        let err = CommandTransport::new("argus-no-such-mailer", credentials())
            .err()
            .unwrap();
        assert!(matches!(err, DispatchError::MissingMailer(_)));
    }

    #[test]
    fn test_mailer_arguments() {
        let transport = CommandTransport {
            program: PathBuf::from("/usr/bin/sendemail"),
            credentials: credentials(),
        };
        let args = transport.args("New subdomains - urls_acme", Path::new("/tmp/body"));

        assert_eq!(args[0..4], ["-f", "argus@example.com", "-t", "ops@example.com"]);
        assert!(args.contains(&"message-file=/tmp/body".to_string()));
        assert!(args.contains(&"New subdomains - urls_acme".to_string()));
        assert!(args.contains(&"smtp.example.com:587".to_string()));
    }

    #[tokio::test]
    async fn test_deliver_reports_failure() {
        let transport = CommandTransport {
            program: PathBuf::from("false"),
            credentials: credentials(),
        };
        let message = Message {
            subject: "s".to_string(),
            body: "b".to_string(),
        };
        assert!(transport.deliver(&message).await.is_err());
    }
}
