//! Workflow domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Placeholder replaced with the path of a stage's input list
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Placeholder replaced with the current line of a fan-out stage
pub const TARGET_PLACEHOLDER: &str = "{target}";

/// Placeholder replaced with the run's scratch directory
pub const RUN_DIR_PLACEHOLDER: &str = "{run_dir}";

/// A configured recon pipeline
///
/// Loaded once at startup from a Lua definition and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub cadence: Cadence,
    pub priority: Priority,
    pub stages: Vec<StageSpec>,
    /// Subject line used when novel findings are reported
    pub subject: Option<String>,
    /// Template identifier used to render the notification body
    pub template: Option<String>,
    /// Severity label exposed to templates
    pub severity: Option<String>,
    /// Persist the first observations of a partition without notifying
    #[serde(default)]
    pub seed_silently: bool,
}

impl WorkflowDescriptor {
    /// External programs this workflow needs on the host
    ///
    /// Deduplicated, in stage order.
    pub fn required_tools(&self) -> Vec<&str> {
        let mut tools: Vec<&str> = Vec::new();
        for stage in &self.stages {
            if let StageKind::Command { tool, .. } = &stage.kind
                && !tools.contains(&tool.as_str())
            {
                tools.push(tool.as_str());
            }
        }
        tools
    }

    /// Subject to use for a notification about `target`
    pub fn subject_for(&self, target: &str) -> String {
        match &self.subject {
            Some(subject) => format!("{} - {}", subject, target),
            None => format!("[argus] New {} results for {}", self.name, target),
        }
    }
}

/// One step of a workflow's pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    pub kind: StageKind,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Run once per input line instead of once per stage
    pub fan_out: bool,
    /// Only output lines matching this regex are kept
    pub filter: Option<String>,
}

/// What a stage actually runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageKind {
    /// An external command-line tool read through its stdout
    Command { tool: String, args: Vec<String> },
    /// Built-in content fetch emitting `<url> <sha256>` per input line
    Checksum,
}

impl StageSpec {
    /// Whether the argument template references the input list file
    pub fn uses_input_file(&self) -> bool {
        match &self.kind {
            StageKind::Command { args, .. } => args.iter().any(|a| a.contains(INPUT_PLACEHOLDER)),
            StageKind::Checksum => false,
        }
    }
}

/// Recurrence class of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cadence {
    Hourly,
    Daily,
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Hourly => write!(f, "hourly"),
            Cadence::Daily => write!(f, "daily"),
        }
    }
}

impl FromStr for Cadence {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(Cadence::Hourly),
            "daily" => Ok(Cadence::Daily),
            other => Err(ParseEnumError::new("cadence", other)),
        }
    }
}

/// Priority class of a workflow
///
/// `High` workflows bypass resource-pressure admission and are never
/// terminated by the stuck-process sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Normal,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
        }
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            other => Err(ParseEnumError::new("priority", other)),
        }
    }
}

/// Error returned when a cadence or priority string is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(name: &str, tool: &str, args: &[&str]) -> StageSpec {
        StageSpec {
            name: name.to_string(),
            kind: StageKind::Command {
                tool: tool.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
            },
            timeout: Duration::from_secs(60),
            fan_out: false,
            filter: None,
        }
    }

    fn workflow(stages: Vec<StageSpec>) -> WorkflowDescriptor {
        WorkflowDescriptor {
            name: "subdomains".to_string(),
            description: None,
            cadence: Cadence::Daily,
            priority: Priority::Normal,
            stages,
            subject: None,
            template: None,
            severity: None,
            seed_silently: false,
        }
    }

    #[test]
    fn test_required_tools_deduplicated_in_order() {
        let wf = workflow(vec![
            command("enum", "subfinder", &["-dL", "{input}"]),
            command("resolve", "dnsx", &[]),
            command("again", "subfinder", &[]),
            StageSpec {
                name: "content".to_string(),
                kind: StageKind::Checksum,
                timeout: Duration::from_secs(30),
                fan_out: false,
                filter: None,
            },
        ]);

        assert_eq!(wf.required_tools(), vec!["subfinder", "dnsx"]);
    }

    #[test]
    fn test_uses_input_file() {
        assert!(command("a", "tool", &["-l", "{input}"]).uses_input_file());
        assert!(!command("b", "tool", &["-silent"]).uses_input_file());
    }

    #[test]
    fn test_parse_cadence_and_priority() {
        assert_eq!("Hourly".parse::<Cadence>().unwrap(), Cadence::Hourly);
        assert_eq!("daily".parse::<Cadence>().unwrap(), Cadence::Daily);
        assert!("weekly".parse::<Cadence>().is_err());

        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(" normal ".parse::<Priority>().unwrap(), Priority::Normal);
        let err = "urgent".parse::<Priority>().unwrap_err();
        assert!(err.to_string().contains("urgent"));
    }

    #[test]
    fn test_subject_for() {
        let mut wf = workflow(vec![]);
        assert_eq!(
            wf.subject_for("urls_acme"),
            "[argus] New subdomains results for urls_acme"
        );

        wf.subject = Some("New subdomains".to_string());
        assert_eq!(wf.subject_for("urls_acme"), "New subdomains - urls_acme");
    }
}
