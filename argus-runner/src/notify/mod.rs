//! Notification dispatch
//!
//! Renders a `NotificationRequest` into a message and delivers it with
//! bounded retries. A delivery failure is reported to the caller; findings
//! already recorded in the result store stay recorded.

pub mod credentials;
pub mod template;
pub mod transport;

use argus_core::domain::notification::NotificationRequest;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::DispatchError;

pub use credentials::Credentials;
pub use template::{TemplateStore, TemplateVars};
pub use transport::{CommandTransport, Transport};

/// Characters removed from subjects before they reach a transport
const SHELL_METACHARACTERS: &[char] = &[
    '`', '$', ';', '&', '|', '<', '>', '(', ')', '\\', '"', '\'', '*', '?', '!', '~', '{', '}',
];

/// A rendered message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

/// Retry schedule for deliveries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after the first failed attempt, doubled after each further one
    pub base_delay: Duration,
    /// Upper bound of the random jitter, never more than `base_delay`
    pub max_jitter: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(10),
            max_jitter: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following failed attempt `attempt`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16));
        let jitter_ms = self.max_jitter.min(self.base_delay).as_millis() as u64;
        if jitter_ms == 0 {
            return backoff;
        }
        backoff + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// What a successful delivery took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub attempts: u32,
    pub delays: Vec<Duration>,
}

pub struct NotificationDispatcher {
    transport: Arc<dyn Transport>,
    templates: TemplateStore,
    policy: RetryPolicy,
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn Transport>, templates: TemplateStore, policy: RetryPolicy) -> Self {
        Self {
            transport,
            templates,
            policy,
        }
    }

    /// Renders and delivers a request
    pub async fn send(&self, request: &NotificationRequest) -> Result<DispatchReport, DispatchError> {
        let message = self.render(request, Utc::now())?;
        self.deliver(&message).await
    }

    /// Builds the message for a request
    pub fn render(
        &self,
        request: &NotificationRequest,
        now: DateTime<Utc>,
    ) -> Result<Message, DispatchError> {
        let body = std::fs::read_to_string(&request.body_path).map_err(|source| {
            DispatchError::Io {
                path: request.body_path.clone(),
                source,
            }
        })?;

        let timestamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        let count = request.findings.to_string();
        let vars: TemplateVars<'_> = [
            ("timestamp", timestamp.as_str()),
            ("workflow", request.workflow.as_str()),
            ("target", request.target.as_str()),
            ("severity", request.severity.as_deref().unwrap_or("info")),
            ("count", count.as_str()),
        ]
        .into_iter()
        .collect();

        Ok(Message {
            subject: sanitize_subject(&request.subject),
            body: self
                .templates
                .render(request.template.as_deref(), &body, &vars),
        })
    }

    /// Delivers a message, retrying with exponential backoff
    pub async fn deliver(&self, message: &Message) -> Result<DispatchReport, DispatchError> {
        let max = self.policy.max_attempts;
        let mut delays = Vec::new();
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=max {
            match tokio::time::timeout(self.policy.attempt_timeout, self.transport.deliver(message))
                .await
            {
                Ok(Ok(())) => {
                    info!(
                        "Delivered '{}' on attempt {}/{}",
                        message.subject, attempt, max
                    );
                    return Ok(DispatchReport {
                        attempts: attempt,
                        delays,
                    });
                }
                Ok(Err(e)) => last_error = format!("{:#}", e),
                Err(_) => {
                    last_error = format!("timed out after {:?}", self.policy.attempt_timeout)
                }
            }

            if attempt < max {
                let delay = self.policy.delay_after(attempt);
                warn!(
                    "Delivery attempt {}/{} failed: {}, retrying in {:?}",
                    attempt, max, last_error, delay
                );
                delays.push(delay);
                tokio::time::sleep(delay).await;
            }
        }

        error!(
            "Giving up on '{}' after {} attempt(s): {}",
            message.subject, max, last_error
        );
        Err(DispatchError::Exhausted {
            attempts: max,
            last_error,
        })
    }
}

/// Strips shell metacharacters and control characters from a subject
pub fn sanitize_subject(subject: &str) -> String {
    let cleaned: String = subject
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .filter(|c| !SHELL_METACHARACTERS.contains(c))
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Fails until `succeed_on`, recording every attempt
    struct FlakyTransport {
        succeed_on: Option<u32>,
        attempts: Mutex<u32>,
        delivered: Mutex<Vec<Message>>,
    }

    impl FlakyTransport {
        fn new(succeed_on: Option<u32>) -> Arc<Self> {
            Arc::new(Self {
                succeed_on,
                attempts: Mutex::new(0),
                delivered: Mutex::new(Vec::new()),
            })
        }

        fn attempts(&self) -> u32 {
            *self.attempts.lock().unwrap()
        }
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn deliver(&self, message: &Message) -> anyhow::Result<()> {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            if Some(*attempts) == self.succeed_on {
                self.delivered.lock().unwrap().push(message.clone());
                return Ok(());
            }
            anyhow::bail!("connection refused")
        }
    }

    struct HangingTransport;

    #[async_trait]
    impl Transport for HangingTransport {
        async fn deliver(&self, _message: &Message) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(2),
            max_jitter: Duration::ZERO,
            attempt_timeout: Duration::from_millis(200),
        }
    }

    fn message() -> Message {
        Message {
            subject: "New ports - urls_acme".to_string(),
            body: "a:80\n".to_string(),
        }
    }

    fn dispatcher(transport: Arc<dyn Transport>, templates: &std::path::Path) -> NotificationDispatcher {
        NotificationDispatcher::new(transport, TemplateStore::new(templates), fast_policy())
    }

    #[tokio::test]
    async fn test_exhausts_after_max_attempts() {
        let dir = TempDir::new().unwrap();
        let transport = FlakyTransport::new(None);
        let dispatcher = dispatcher(transport.clone(), dir.path());

        let err = dispatcher.deliver(&message()).await.unwrap_err();

        assert!(matches!(err, DispatchError::Exhausted { attempts: 5, .. }));
        assert_eq!(transport.attempts(), 5);
    }

    #[tokio::test]
    async fn test_stops_on_first_success() {
        let dir = TempDir::new().unwrap();
        let transport = FlakyTransport::new(Some(3));
        let dispatcher = dispatcher(transport.clone(), dir.path());

        let report = dispatcher.deliver(&message()).await.unwrap();

        assert_eq!(report.attempts, 3);
        assert_eq!(transport.attempts(), 3);
        assert_eq!(transport.delivered.lock().unwrap().len(), 1);
        assert_eq!(
            report.delays,
            vec![Duration::from_millis(2), Duration::from_millis(4)]
        );
    }

    #[tokio::test]
    async fn test_attempt_timeout_counts_as_failure() {
        let dir = TempDir::new().unwrap();
        let mut policy = fast_policy();
        policy.max_attempts = 2;
        policy.attempt_timeout = Duration::from_millis(20);
        let dispatcher =
            NotificationDispatcher::new(Arc::new(HangingTransport), TemplateStore::new(dir.path()), policy);

        match dispatcher.deliver(&message()).await {
            Err(DispatchError::Exhausted { attempts, last_error }) => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("timed out"));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[test]
    fn test_delays_strictly_increase() {
        let policy = RetryPolicy::default();
        let delays: Vec<Duration> = (1..policy.max_attempts).map(|a| policy.delay_after(a)).collect();

        assert_eq!(delays.len(), 4);
        assert!(delays[0] >= Duration::from_secs(10));
        assert!(delays[0] <= Duration::from_secs(11));
        for pair in delays.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn test_sanitize_subject() {
        assert_eq!(
            sanitize_subject("[argus] New `rm -rf` $(id); results\nfor urls_acme | x"),
            "[argus] New rm -rf id results for urls_acme x"
        );
        assert_eq!(sanitize_subject("New ports - urls_acme"), "New ports - urls_acme");
    }

    #[tokio::test]
    async fn test_send_renders_template() {
        let dir = TempDir::new().unwrap();
        let templates = dir.path().join("templates");
        std::fs::create_dir(&templates).unwrap();
        std::fs::write(
            templates.join("default.tmpl"),
            "{{count}} new {{severity}} finding(s) for {{workflow}}/{{target}}:\n{{findings}}\n",
        )
        .unwrap();
        let body = dir.path().join("new.txt");
        std::fs::write(&body, "a:80\nb:443\n").unwrap();

        let transport = FlakyTransport::new(Some(1));
        let dispatcher = dispatcher(transport.clone(), &templates);
        let request = NotificationRequest {
            subject: "New ports; - urls_acme".to_string(),
            body_path: PathBuf::from(&body),
            template: Some("ports".to_string()),
            workflow: "ports".to_string(),
            target: "urls_acme".to_string(),
            severity: None,
            findings: 2,
        };

        dispatcher.send(&request).await.unwrap();

        let delivered = transport.delivered.lock().unwrap();
        assert_eq!(delivered[0].subject, "New ports - urls_acme");
        assert_eq!(
            delivered[0].body,
            "2 new info finding(s) for ports/urls_acme:\na:80\nb:443\n"
        );
    }
}
