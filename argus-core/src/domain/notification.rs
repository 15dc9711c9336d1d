//! Notification request domain type

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A request to report newly found lines
///
/// Built by the reconciler and consumed exactly once by the dispatcher.
/// Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub subject: String,
    /// File holding the novel findings, one per line
    pub body_path: PathBuf,
    pub template: Option<String>,
    pub workflow: String,
    pub target: String,
    pub severity: Option<String>,
    pub findings: usize,
}
