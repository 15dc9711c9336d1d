//! Workflow listing

use anyhow::Result;
use argus_core::Layout;
use argus_core::domain::workflow::{Priority, StageKind, WorkflowDescriptor};
use colored::*;

/// List every workflow definition with its stages
pub fn list_workflows(layout: &Layout) -> Result<()> {
    let workflows = argus_lua::load_workflows(&layout.workflows_dir)?;

    if workflows.is_empty() {
        println!(
            "{}",
            format!("No workflows in {}.", layout.workflows_dir.display()).yellow()
        );
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} workflow(s):", workflows.len()).bold()
    );
    println!();
    for workflow in &workflows {
        print_workflow(workflow);
    }

    Ok(())
}

fn print_workflow(workflow: &WorkflowDescriptor) {
    let priority = match workflow.priority {
        Priority::High => workflow.priority.to_string().red(),
        Priority::Normal => workflow.priority.to_string().normal(),
    };

    println!("  {} {}", "▸".cyan(), workflow.name.bold());
    if let Some(description) = &workflow.description {
        println!("    {}", description.dimmed());
    }
    println!("    Cadence:    {}", workflow.cadence);
    println!("    Priority:   {}", priority);
    if workflow.seed_silently {
        println!("    Seeding:    {}", "silent".dimmed());
    }
    println!("    Stages:");
    for (i, stage) in workflow.stages.iter().enumerate() {
        let what = match &stage.kind {
            StageKind::Command { tool, args } => format!("{} {}", tool, args.join(" ")),
            StageKind::Checksum => "checksum".to_string(),
        };
        let fan_out = if stage.fan_out { " (per target)" } else { "" };
        println!(
            "      {}. {} {}{}",
            i + 1,
            stage.name.cyan(),
            what.trim_end(),
            fan_out.dimmed()
        );
    }

    let missing = missing_tools(workflow);
    if !missing.is_empty() {
        println!("    {} {}", "Missing:".red(), missing.join(", "));
    }
    println!();
}

/// Tools of a workflow that cannot be found on `PATH`
fn missing_tools(workflow: &WorkflowDescriptor) -> Vec<&str> {
    workflow
        .required_tools()
        .into_iter()
        .filter(|tool| which::which(tool).is_err())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tools() {
        let workflow = argus_lua::parse_workflow(
            r#"
            return workflow.define({
                name = "probe",
                cadence = "hourly",
                stages = {
                    workflow.stage({ name = "a", tool = "sh", args = { "-c", "true" } }),
                    workflow.stage({ name = "b", tool = "argus-no-such-tool" }),
                },
            })
            "#,
        )
        .unwrap();

        assert_eq!(missing_tools(&workflow), vec!["argus-no-such-tool"]);
    }
}
