//! Workflow definition parser
//!
//! This module evaluates Lua workflow definitions in the sandbox and turns
//! the returned table into a `WorkflowDescriptor`. Definitions are loaded
//! once at startup; the order of `load_workflows` (file name order) is the
//! fixed enumeration order used for admission.

use anyhow::{Context, Result};
use argus_core::domain::workflow::{Cadence, Priority, StageKind, StageSpec, WorkflowDescriptor};
use mlua::{Table, Value};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::env::{EnvModule, ProcessEnv, VarProvider};
use crate::sandbox::create_sandbox;

/// Stage timeout when a definition does not set one
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(600);

/// Parse a workflow definition with access to `ARGUS_*` variables
///
/// # Example
/// ```no_run
/// use argus_lua::parser::parse_workflow;
///
/// let source = r#"
///     return workflow.define {
///         name = "vulns",
///         cadence = "hourly",
///         priority = "high",
///         stages = {
///             workflow.stage { name = "probe", tool = "httpx", args = {"-l", "{input}", "-silent"} },
///             workflow.stage { name = "scan", tool = "nuclei", args = {"-silent"}, filter = "critical|high" },
///         },
///     }
/// "#;
///
/// let workflow = parse_workflow(source)?;
/// assert_eq!(workflow.stages.len(), 2);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn parse_workflow(source: &str) -> Result<WorkflowDescriptor> {
    parse_workflow_with(source, ProcessEnv)
}

/// Parse a workflow definition with a custom variable provider
///
/// # Errors
/// Returns an error if:
/// - The Lua source is invalid or does not return a table
/// - Required fields are missing (name, cadence, stages)
/// - A field has the wrong type or an unknown value
pub fn parse_workflow_with(
    source: &str,
    vars: impl VarProvider + 'static,
) -> Result<WorkflowDescriptor> {
    let lua = create_sandbox().context("Failed to create sandbox")?;
    EnvModule::new(vars)
        .register(&lua)
        .context("Failed to register env module")?;

    let definition: Table = lua
        .load(source)
        .eval()
        .context("Failed to evaluate workflow definition")?;

    let name: String = definition
        .get("name")
        .context("Workflow must have a 'name' field")?;
    validate_name(&name)?;

    let description: Option<String> = definition.get("description").ok();

    let cadence: String = definition
        .get("cadence")
        .context(format!("Workflow '{}' must have a 'cadence' field", name))?;
    let cadence: Cadence = cadence.parse()?;

    let priority: Priority = match definition.get::<Option<String>>("priority") {
        Ok(Some(p)) => p.parse()?,
        Ok(None) => Priority::Normal,
        Err(e) => anyhow::bail!("Field 'priority' of '{}' must be a string: {}", name, e),
    };

    let subject: Option<String> = optional_string(&definition, "subject")?;
    let template: Option<String> = optional_string(&definition, "template")?;
    let severity: Option<String> = optional_string(&definition, "severity")?;
    let seed_silently: bool = definition.get::<Option<bool>>("seed_silently")?.unwrap_or(false);

    let stages = parse_stages(&definition, &name)?;

    Ok(WorkflowDescriptor {
        name,
        description,
        cadence,
        priority,
        stages,
        subject,
        template,
        severity,
        seed_silently,
    })
}

/// Load every `*.lua` definition of a directory, sorted by file name
///
/// Duplicate workflow names are rejected.
pub fn load_workflows(dir: &Path) -> Result<Vec<WorkflowDescriptor>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read workflows directory {}", dir.display()))?
    {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "lua") && path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    let mut names = HashSet::new();
    let mut workflows = Vec::with_capacity(files.len());
    for path in files {
        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let workflow =
            parse_workflow(&source).with_context(|| format!("Invalid workflow {}", path.display()))?;

        if !names.insert(workflow.name.clone()) {
            anyhow::bail!(
                "Duplicate workflow name '{}' in {}",
                workflow.name,
                path.display()
            );
        }
        debug!(
            "Loaded workflow '{}' ({} stage(s)) from {}",
            workflow.name,
            workflow.stages.len(),
            path.display()
        );
        workflows.push(workflow);
    }

    Ok(workflows)
}

/// Load a single workflow by name from a definitions directory
pub fn load_workflow(dir: &Path, name: &str) -> Result<WorkflowDescriptor> {
    load_workflows(dir)?
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| anyhow::anyhow!("Workflow '{}' not found in {}", name, dir.display()))
}

/// Names end up in tracking-file records and directory names
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        anyhow::bail!("Workflow name cannot be empty");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        anyhow::bail!(
            "Workflow name '{}' may only contain letters, digits, '-' and '_'",
            name
        );
    }
    Ok(())
}

fn optional_string(table: &Table, field: &str) -> Result<Option<String>> {
    table
        .get::<Option<String>>(field)
        .with_context(|| format!("Field '{}' must be a string", field))
}

/// Parse the 'stages' field from the definition table
fn parse_stages(definition: &Table, workflow: &str) -> Result<Vec<StageSpec>> {
    let stages_table: Table = definition
        .get("stages")
        .context(format!("Workflow '{}' must have a 'stages' field", workflow))?;

    let mut stages = Vec::new();

    for pair in stages_table.sequence_values::<Table>() {
        let stage_table = pair.context("Failed to read stage entry")?;
        stages.push(parse_stage(&stage_table)?);
    }

    if stages.is_empty() {
        anyhow::bail!("Workflow '{}' must have at least one stage", workflow);
    }

    Ok(stages)
}

fn parse_stage(stage: &Table) -> Result<StageSpec> {
    let name: String = stage.get("name").context("Stage must have a 'name' field")?;

    let kind_name: String = stage
        .get::<Option<String>>("kind")?
        .unwrap_or_else(|| "command".to_string());

    let kind = match kind_name.as_str() {
        "command" => {
            let tool: String = stage
                .get("tool")
                .context(format!("Stage '{}' must have a 'tool' field", name))?;
            if tool.trim().is_empty() {
                anyhow::bail!("Stage '{}' has an empty 'tool'", name);
            }
            let args = parse_args(stage, &name)?;
            StageKind::Command { tool, args }
        }
        "checksum" => StageKind::Checksum,
        other => anyhow::bail!("Stage '{}' has unknown kind '{}'", name, other),
    };

    let timeout = match stage.get::<Value>("timeout")? {
        Value::Nil => DEFAULT_STAGE_TIMEOUT,
        Value::Integer(secs) if secs > 0 => Duration::from_secs(secs as u64),
        Value::Number(secs) if secs > 0.0 => Duration::from_secs_f64(secs),
        _ => anyhow::bail!("Stage '{}' timeout must be a positive number of seconds", name),
    };

    let fan_out: bool = stage.get::<Option<bool>>("fan_out")?.unwrap_or(false);
    let filter: Option<String> = optional_string(stage, "filter")?;

    Ok(StageSpec {
        name,
        kind,
        timeout,
        fan_out,
        filter,
    })
}

fn parse_args(stage: &Table, name: &str) -> Result<Vec<String>> {
    match stage.get::<Value>("args")? {
        Value::Nil => Ok(Vec::new()),
        Value::Table(table) => {
            let mut args = Vec::new();
            for value in table.sequence_values::<Value>() {
                let arg = match value.context("Failed to read args entry")? {
                    Value::String(s) => s.to_str()?.to_string(),
                    Value::Integer(i) => i.to_string(),
                    Value::Number(n) => n.to_string(),
                    _ => anyhow::bail!("Stage '{}' args must be strings or numbers", name),
                };
                args.push(arg);
            }
            Ok(args)
        }
        _ => anyhow::bail!("Field 'args' of stage '{}' must be an array", name),
    }
}
