//! Reconciler
//!
//! Diffs a run's normalized findings against the result store. Novel lines
//! are persisted before anything is reported, so a crash after this point
//! can at worst repeat a notification, never lose a finding.

use argus_core::domain::notification::NotificationRequest;
use argus_core::domain::workflow::WorkflowDescriptor;
use std::collections::HashSet;
use std::io;
use std::path::Path;
use tracing::{debug, info};

use crate::store::ResultStore;

/// Key a silently seeded line is baselined under: its first field
///
/// For checksum lines (`<url> <sha256>`) this is the URL.
fn baseline_key(line: &str) -> &str {
    line.split(' ').next().unwrap_or(line)
}

/// Outcome of reconciling one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Lines inserted into the store by this run, in stream order
    pub novel: Vec<String>,
    /// `None` when nothing is new or every new line was a silent baseline
    pub request: Option<NotificationRequest>,
}

pub struct Reconciler<'a> {
    store: &'a ResultStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a ResultStore) -> Self {
        Self { store }
    }

    /// Records novel findings and builds the request reporting them
    ///
    /// `body_path` receives the reported lines, one per line, when any exist.
    /// With `seed_silently`, a line whose first field has never been seen
    /// for this partition is persisted as a baseline and not reported.
    pub fn reconcile(
        &self,
        workflow: &WorkflowDescriptor,
        target: &str,
        findings: &[String],
        body_path: &Path,
    ) -> io::Result<Reconciliation> {
        let partition = self.store.partition(&workflow.name, target);
        let mut seen = partition.load()?;
        let mut baseline_keys: HashSet<String> = if workflow.seed_silently {
            seen.iter().map(|line| baseline_key(line).to_string()).collect()
        } else {
            HashSet::new()
        };

        let novel: Vec<String> = findings
            .iter()
            .filter(|line| seen.insert((*line).clone()))
            .cloned()
            .collect();

        if novel.is_empty() {
            debug!(
                "No new findings for {}/{} ({} already known)",
                workflow.name,
                target,
                findings.len()
            );
            return Ok(Reconciliation {
                novel,
                request: None,
            });
        }

        partition.append(&novel)?;

        // With silent seeding the first line seen for a key is its baseline
        let reported: Vec<&String> = if workflow.seed_silently {
            novel
                .iter()
                .filter(|line| !baseline_keys.insert(baseline_key(line).to_string()))
                .collect()
        } else {
            novel.iter().collect()
        };

        if reported.is_empty() {
            info!(
                "Seeded {}/{} with {} baseline(s) without notifying",
                workflow.name,
                target,
                novel.len()
            );
            return Ok(Reconciliation {
                novel,
                request: None,
            });
        }

        let mut body = reported
            .iter()
            .map(|line| line.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        body.push('\n');
        std::fs::write(body_path, body)?;

        let request = NotificationRequest {
            subject: workflow.subject_for(target),
            body_path: body_path.to_path_buf(),
            template: workflow.template.clone(),
            workflow: workflow.name.clone(),
            target: target.to_string(),
            severity: workflow.severity.clone(),
            findings: reported.len(),
        };

        Ok(Reconciliation {
            novel,
            request: Some(request),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::domain::workflow::{Cadence, Priority};
    use tempfile::TempDir;

    fn workflow(seed_silently: bool) -> WorkflowDescriptor {
        WorkflowDescriptor {
            name: "subdomains".to_string(),
            description: None,
            cadence: Cadence::Daily,
            priority: Priority::Normal,
            stages: vec![],
            subject: Some("New subdomains".to_string()),
            template: Some("subdomains".to_string()),
            severity: None,
            seed_silently,
        }
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path().join("results"));
        let reconciler = Reconciler::new(&store);
        let body = dir.path().join("new.txt");
        let findings = lines(&["a.example.com", "b.example.com"]);

        let first = reconciler
            .reconcile(&workflow(false), "urls_acme", &findings, &body)
            .unwrap();
        let request = first.request.unwrap();
        assert_eq!(request.findings, 2);
        assert_eq!(request.subject, "New subdomains - urls_acme");
        assert_eq!(request.template, Some("subdomains".to_string()));
        assert_eq!(
            std::fs::read_to_string(&request.body_path).unwrap(),
            "a.example.com\nb.example.com\n"
        );

        let second = reconciler
            .reconcile(&workflow(false), "urls_acme", &findings, &body)
            .unwrap();
        assert!(second.request.is_none());
        assert!(second.novel.is_empty());
    }

    #[test]
    fn test_intra_run_dedup_precedes_history() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        let reconciler = Reconciler::new(&store);
        let body = dir.path().join("new.txt");

        let outcome = reconciler
            .reconcile(&workflow(false), "urls_acme", &lines(&["A", "A", "B"]), &body)
            .unwrap();

        assert_eq!(outcome.novel, lines(&["A", "B"]));
        assert_eq!(std::fs::read_to_string(&body).unwrap(), "A\nB\n");
        assert_eq!(outcome.request.unwrap().findings, 2);
    }

    #[test]
    fn test_only_unseen_lines_are_reported() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        store
            .partition("subdomains", "urls_acme")
            .append(&lines(&["old.example.com"]))
            .unwrap();
        let reconciler = Reconciler::new(&store);
        let body = dir.path().join("new.txt");

        let outcome = reconciler
            .reconcile(
                &workflow(false),
                "urls_acme",
                &lines(&["old.example.com", "new.example.com"]),
                &body,
            )
            .unwrap();

        assert_eq!(outcome.novel, lines(&["new.example.com"]));
        let seen = store.partition("subdomains", "urls_acme").load().unwrap();
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_seed_silently_on_empty_history() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        let reconciler = Reconciler::new(&store);
        let body = dir.path().join("new.txt");
        let wf = workflow(true);

        let seeded = reconciler
            .reconcile(&wf, "urls_acme", &lines(&["http://a abc"]), &body)
            .unwrap();
        assert_eq!(seeded.novel.len(), 1);
        assert!(seeded.request.is_none());

        let changed = reconciler
            .reconcile(
                &wf,
                "urls_acme",
                &lines(&["http://a abc", "http://a def"]),
                &body,
            )
            .unwrap();
        assert_eq!(changed.novel, lines(&["http://a def"]));
        assert!(changed.request.is_some());
    }

    #[test]
    fn test_empty_findings_build_nothing() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        let body = dir.path().join("new.txt");

        let outcome = Reconciler::new(&store)
            .reconcile(&workflow(false), "urls_acme", &[], &body)
            .unwrap();

        assert!(outcome.request.is_none());
        assert!(!body.exists());
    }

    #[test]
    fn test_seed_silently_per_key() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        let reconciler = Reconciler::new(&store);
        let body = dir.path().join("new.txt");
        let wf = workflow(true);

        reconciler
            .reconcile(&wf, "urls_a", &lines(&["http://a h1"]), &body)
            .unwrap();

        // A URL added after the first run gets its own silent baseline
        let added = reconciler
            .reconcile(&wf, "urls_a", &lines(&["http://a h1", "http://b h2"]), &body)
            .unwrap();
        assert_eq!(added.novel, lines(&["http://b h2"]));
        assert!(added.request.is_none());

        let changed = reconciler
            .reconcile(
                &wf,
                "urls_a",
                &lines(&["http://a h3", "http://b h2", "http://c h4"]),
                &body,
            )
            .unwrap();
        assert_eq!(changed.novel, lines(&["http://a h3", "http://c h4"]));
        let request = changed.request.unwrap();
        assert_eq!(request.findings, 1);
        assert_eq!(std::fs::read_to_string(&body).unwrap(), "http://a h3\n");

        let seen = store.partition(&wf.name, "urls_a").load().unwrap();
        assert_eq!(seen.len(), 4);
    }
}
