//! Workflow execution
//!
//! Runs one workflow over every active target file: normalize the file,
//! run the pipeline, reconcile against history, notify on novelty. Each
//! target file gets its own run context and statistics.

use anyhow::{Context, Result};
use argus_core::Layout;
use argus_core::domain::target::{TargetFile, TargetStatus, discover};
use argus_core::domain::workflow::WorkflowDescriptor;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, error, info};

use crate::context::RunContext;
use crate::notify::NotificationDispatcher;
use crate::pipeline::ToolPipeline;
use crate::reconcile::Reconciler;
use crate::store::ResultStore;

/// Statistics of one (workflow, target file) run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TargetStats {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub workflow: String,
    pub target: String,
    pub findings: usize,
    pub novel: usize,
    pub notified: bool,
    pub delivery_failed: bool,
    pub elapsed_secs: f64,
}

/// Result of running a workflow over all its target files
#[derive(Debug, Default)]
pub struct RunSummary {
    pub targets: Vec<TargetStats>,
}

impl RunSummary {
    pub fn delivery_failures(&self) -> usize {
        self.targets.iter().filter(|t| t.delivery_failed).count()
    }
}

pub struct WorkflowRunner {
    layout: Layout,
    keep_runs: bool,
    pipeline: ToolPipeline,
    store: ResultStore,
    dispatcher: NotificationDispatcher,
}

impl WorkflowRunner {
    pub fn new(
        layout: Layout,
        keep_runs: bool,
        pipeline: ToolPipeline,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        let store = ResultStore::new(&layout.results_dir);
        Self {
            layout,
            keep_runs,
            pipeline,
            store,
            dispatcher,
        }
    }

    /// Runs the workflow against every active target file
    pub async fn run(&self, workflow: &WorkflowDescriptor) -> Result<RunSummary> {
        let files = discover(&self.layout.targets_dir).with_context(|| {
            format!(
                "Failed to list target files in {}",
                self.layout.targets_dir.display()
            )
        })?;

        let mut summary = RunSummary::default();
        for (path, status) in files {
            match status {
                TargetStatus::Active => {}
                TargetStatus::Disabled => {
                    debug!("Skipping disabled target file {}", path.display());
                    continue;
                }
                TargetStatus::Ignored => continue,
            }

            if let Some(stats) = self.run_target(workflow, &path).await? {
                summary.targets.push(stats);
            }
        }

        if summary.targets.is_empty() {
            info!("No active target files for workflow '{}'", workflow.name);
        }
        Ok(summary)
    }

    async fn run_target(
        &self,
        workflow: &WorkflowDescriptor,
        path: &Path,
    ) -> Result<Option<TargetStats>> {
        let file = TargetFile::normalize_in_place(path)
            .with_context(|| format!("Failed to normalize {}", path.display()))?;

        if file.is_empty() {
            info!(
                "Target file {} is empty after normalization, skipping",
                file.id
            );
            return Ok(None);
        }

        let ctx = RunContext::create(&self.layout.runs_dir, &workflow.name, &file.id, Utc::now())
            .context("Failed to create run directory")?;

        info!(
            "Running '{}' on {} ({} target(s), run {})",
            workflow.name,
            file.id,
            file.targets.len(),
            ctx.id()
        );

        let findings = self.pipeline.run(workflow, &file.targets, &ctx).await?;
        write_lines(&ctx.findings_file(), &findings)?;

        let reconciliation = Reconciler::new(&self.store)
            .reconcile(workflow, &file.id, &findings, &ctx.new_findings_file())
            .with_context(|| format!("Failed to reconcile {}/{}", workflow.name, file.id))?;

        let mut stats = TargetStats {
            run_id: ctx.id().to_string(),
            started_at: ctx.started_at(),
            workflow: workflow.name.clone(),
            target: file.id.clone(),
            findings: findings.len(),
            novel: reconciliation.novel.len(),
            ..Default::default()
        };

        if let Some(request) = reconciliation.request {
            let message = self.dispatcher.render(&request, Utc::now())?;
            std::fs::write(ctx.message_file(), &message.body)
                .context("Failed to write message file")?;

            match self.dispatcher.deliver(&message).await {
                Ok(_) => stats.notified = true,
                Err(e) => {
                    error!(
                        "Notification for {}/{} failed: {}",
                        workflow.name, file.id, e
                    );
                    stats.delivery_failed = true;
                }
            }
        }

        stats.elapsed_secs = ctx.elapsed().as_secs_f64();
        info!(
            "Finished '{}' on {}: {} finding(s), {} new, {:.1}s",
            workflow.name, file.id, stats.findings, stats.novel, stats.elapsed_secs
        );

        std::fs::write(ctx.stats_file(), serde_json::to_string_pretty(&stats)?)
            .context("Failed to write run statistics")?;
        ctx.finish(self.keep_runs)
            .context("Failed to clean up run directory")?;

        Ok(Some(stats))
    }
}

fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    let mut contents = lines.join("\n");
    if !contents.is_empty() {
        contents.push('\n');
    }
    std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{Message, RetryPolicy, TemplateStore, Transport};
    use crate::pipeline::{ContentFetcher, Invocation, StageOutcome, ToolRunner};
    use argus_core::domain::workflow::{Cadence, Priority, StageKind, StageSpec};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Echoes its stdin back with a `found.` prefix per line
    struct PrefixRunner;

    #[async_trait]
    impl ToolRunner for PrefixRunner {
        async fn run(&self, invocation: &Invocation) -> StageOutcome {
            let output = invocation
                .stdin
                .as_deref()
                .unwrap_or_default()
                .lines()
                .map(|l| format!("found.{}\n", l))
                .collect();
            StageOutcome::Completed { output }
        }
    }

    struct NoFetch;

    #[async_trait]
    impl ContentFetcher for NoFetch {
        async fn fetch(&self, _url: &str, _timeout: Duration) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("offline")
        }
    }

    struct Outbox {
        fail: bool,
        sent: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl Transport for Outbox {
        async fn deliver(&self, message: &Message) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("smtp down");
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn workflow() -> WorkflowDescriptor {
        WorkflowDescriptor {
            name: "subdomains".to_string(),
            description: None,
            cadence: Cadence::Daily,
            priority: Priority::Normal,
            stages: vec![StageSpec {
                name: "enumerate".to_string(),
                kind: StageKind::Command {
                    tool: "subfinder".to_string(),
                    args: vec![],
                },
                timeout: Duration::from_secs(5),
                fan_out: false,
                filter: None,
            }],
            subject: Some("New subdomains".to_string()),
            template: None,
            severity: None,
            seed_silently: false,
        }
    }

    fn runner(home: &Path, outbox: Arc<Outbox>, keep_runs: bool) -> WorkflowRunner {
        let layout = Layout::new(home);
        let pipeline = ToolPipeline::new(Arc::new(PrefixRunner), Arc::new(NoFetch));
        let dispatcher = NotificationDispatcher::new(
            outbox,
            TemplateStore::new(&layout.templates_dir),
            RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                max_jitter: Duration::ZERO,
                attempt_timeout: Duration::from_secs(1),
            },
        );
        WorkflowRunner::new(layout, keep_runs, pipeline, dispatcher)
    }

    fn setup() -> TempDir {
        let home = TempDir::new().unwrap();
        let targets = home.path().join("targets");
        std::fs::create_dir(&targets).unwrap();
        std::fs::write(
            targets.join("urls_acme.txt"),
            "# acme\n*.acme.com\nhttps://shop.acme.com\n",
        )
        .unwrap();
        std::fs::write(targets.join("_urls_paused.txt"), "paused.com\n").unwrap();
        std::fs::write(targets.join("urls_empty.txt"), "# nothing yet\n").unwrap();
        std::fs::write(targets.join("notes.md"), "ignored\n").unwrap();
        home
    }

    #[tokio::test]
    async fn test_run_notifies_once() {
        let home = setup();
        let outbox = Arc::new(Outbox {
            fail: false,
            sent: Mutex::new(Vec::new()),
        });
        let runner = runner(home.path(), outbox.clone(), true);

        let first = runner.run(&workflow()).await.unwrap();
        assert_eq!(first.targets.len(), 1);
        assert_eq!(first.targets[0].target, "urls_acme");
        assert_eq!(first.targets[0].novel, 2);
        assert!(first.targets[0].notified);

        {
            let sent = outbox.sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].subject, "New subdomains - urls_acme");
            assert_eq!(sent[0].body, "found.acme.com\nfound.shop.acme.com\n");
        }

        let normalized =
            std::fs::read_to_string(home.path().join("targets").join("urls_acme.txt")).unwrap();
        assert_eq!(normalized, "# acme\nacme.com\nshop.acme.com\n");

        let second = runner.run(&workflow()).await.unwrap();
        assert_eq!(second.targets[0].novel, 0);
        assert!(!second.targets[0].notified);
        assert_eq!(outbox.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_failure_keeps_findings() {
        let home = setup();
        let failing = Arc::new(Outbox {
            fail: true,
            sent: Mutex::new(Vec::new()),
        });

        let summary = runner(home.path(), failing, false)
            .run(&workflow())
            .await
            .unwrap();
        assert_eq!(summary.delivery_failures(), 1);

        let store = ResultStore::new(home.path().join("results"));
        let seen = store.partition("subdomains", "urls_acme").load().unwrap();
        assert_eq!(seen.len(), 2);

        let working = Arc::new(Outbox {
            fail: false,
            sent: Mutex::new(Vec::new()),
        });
        let retry = runner(home.path(), working.clone(), false)
            .run(&workflow())
            .await
            .unwrap();
        assert_eq!(retry.targets[0].novel, 0);
        assert!(working.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_directories_follow_keep_flag() {
        let home = setup();
        let outbox = Arc::new(Outbox {
            fail: false,
            sent: Mutex::new(Vec::new()),
        });

        runner(home.path(), outbox, false)
            .run(&workflow())
            .await
            .unwrap();

        let runs = home.path().join("runs");
        let leftover: Vec<_> = walk(&runs)
            .into_iter()
            .filter(|p| p.extension().is_some_and(|e| e == "json"))
            .collect();
        assert!(leftover.is_empty());
    }

    fn walk(dir: &Path) -> Vec<std::path::PathBuf> {
        let mut out = Vec::new();
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    out.extend(walk(&path));
                } else {
                    out.push(path);
                }
            }
        }
        out
    }
}
