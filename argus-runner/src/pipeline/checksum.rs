//! Content checksum stage
//!
//! Fetches each input URL and emits `<url> <sha256-hex>`. Paired with the
//! result store, a new line for a known URL means its content changed.

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{ACCEPT, USER_AGENT};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
];

/// Fetches the body of a URL
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> anyhow::Result<Vec<u8>>;
}

/// HTTP fetcher rotating through browser user agents
pub struct HttpFetcher {
    client: reqwest::Client,
    next_agent: AtomicUsize,
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            client,
            next_agent: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> anyhow::Result<Vec<u8>> {
        let agent = USER_AGENTS[self.next_agent.fetch_add(1, Ordering::Relaxed) % USER_AGENTS.len()];

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, agent)
            .header(ACCEPT, "text/html,application/xhtml+xml,*/*;q=0.8")
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.bytes().await?.to_vec())
    }
}

/// Retry schedule for a single URL
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub attempts: u32,
    /// Delay after the first failure, doubled after each further one
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl FetchPolicy {
    fn delay_after(&self, failures: u32) -> Duration {
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << failures.saturating_sub(1).min(16));
        let jitter_ms = self.max_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return backoff;
        }
        backoff + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Adds `http://` to lines without a scheme
pub fn normalize_url(line: &str) -> String {
    let line = line.trim();
    if line.starts_with("http://") || line.starts_with("https://") {
        line.to_string()
    } else {
        format!("http://{}", line)
    }
}

/// Fetches one URL and formats its checksum line
///
/// Returns `None` once every attempt has failed.
pub async fn checksum_line(
    fetcher: &dyn ContentFetcher,
    line: &str,
    timeout: Duration,
    policy: &FetchPolicy,
) -> Option<String> {
    let url = normalize_url(line);

    for attempt in 1..=policy.attempts {
        match fetcher.fetch(&url, timeout).await {
            Ok(body) => {
                let digest = hex::encode(Sha256::digest(&body));
                debug!("{} -> {}", url, digest);
                return Some(format!("{} {}", url, digest));
            }
            Err(e) if attempt < policy.attempts => {
                let delay = policy.delay_after(attempt);
                debug!(
                    "Fetch of {} failed (attempt {}/{}): {:#}, retrying in {:?}",
                    url, attempt, policy.attempts, e, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                warn!(
                    "Giving up on {} after {} attempt(s): {:#}",
                    url, policy.attempts, e
                );
            }
        }
    }

    None
}
