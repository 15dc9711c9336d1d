//! External tool discovery
//!
//! Every command stage names a program that must exist on the host. A
//! workflow whose tools are missing fails before any stage runs, which is
//! a configuration error rather than a stage failure.

use argus_core::domain::workflow::WorkflowDescriptor;
use tracing::{debug, info};

use crate::error::PipelineError;

/// Checks that every tool a workflow needs is installed
pub fn ensure_tools(workflow: &WorkflowDescriptor) -> Result<(), PipelineError> {
    let tools = workflow.required_tools();
    for tool in &tools {
        match which::which(tool) {
            Ok(path) => debug!("Found {} at {}", tool, path.display()),
            Err(_) => {
                return Err(PipelineError::MissingTool {
                    workflow: workflow.name.clone(),
                    tool: tool.to_string(),
                });
            }
        }
    }

    info!(
        "All {} tool(s) for workflow '{}' are available",
        tools.len(),
        workflow.name
    );
    Ok(())
}
