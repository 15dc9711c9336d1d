//! Tool pipeline
//!
//! One parameterized pipeline drives every workflow. Each stage receives the
//! previous stage's normalized output as its input list:
//! - Command stages run a tool once, or once per input line for fan-out
//! - Checksum stages fetch every input URL and hash its content
//!
//! Stage failures never abort the pipeline. Output lines pass through the
//! stage filter, then normalization and intra-run dedup, in that order.

pub mod checksum;
pub mod stage;

use argus_core::domain::finding::normalize_stream;
use argus_core::domain::workflow::{
    INPUT_PLACEHOLDER, RUN_DIR_PLACEHOLDER, StageKind, StageSpec, TARGET_PLACEHOLDER,
    WorkflowDescriptor,
};
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::error::PipelineError;

pub use checksum::{ContentFetcher, FetchPolicy, HttpFetcher};
pub use stage::{CommandRunner, Invocation, StageOutcome, ToolRunner};

/// Executes a workflow's stages against a target list
pub struct ToolPipeline {
    runner: Arc<dyn ToolRunner>,
    fetcher: Arc<dyn ContentFetcher>,
    fetch_policy: FetchPolicy,
}

impl ToolPipeline {
    pub fn new(runner: Arc<dyn ToolRunner>, fetcher: Arc<dyn ContentFetcher>) -> Self {
        Self {
            runner,
            fetcher,
            fetch_policy: FetchPolicy::default(),
        }
    }

    pub fn with_fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = policy;
        self
    }

    /// Runs every stage and returns the normalized findings
    ///
    /// An empty target list returns immediately without running any stage.
    pub async fn run(
        &self,
        workflow: &WorkflowDescriptor,
        targets: &[String],
        ctx: &RunContext,
    ) -> Result<Vec<String>, PipelineError> {
        let filters = compile_filters(&workflow.stages)?;

        if targets.is_empty() {
            info!("No targets for workflow '{}', nothing to run", workflow.name);
            return Ok(Vec::new());
        }

        let mut lines: Vec<String> = targets.to_vec();

        for (index, (stage, filter)) in workflow.stages.iter().zip(&filters).enumerate() {
            if lines.is_empty() {
                info!(
                    "Stage '{}' of '{}' has no input, skipping remaining stages",
                    stage.name, workflow.name
                );
                break;
            }

            let input_path = ctx.stage_input(index, &stage.name);
            write_lines(&input_path, &lines)?;

            debug!(
                "Stage {}/{} '{}' with {} input line(s)",
                index + 1,
                workflow.stages.len(),
                stage.name,
                lines.len()
            );

            let raw = match &stage.kind {
                StageKind::Command { tool, args } => {
                    self.run_command(stage, tool, args, &lines, &input_path, ctx)
                        .await
                }
                StageKind::Checksum => self.run_checksum(stage, &lines).await,
            };

            let output_path = ctx.stage_output(index, &stage.name);
            std::fs::write(&output_path, &raw).map_err(|e| PipelineError::io(&output_path, e))?;

            let kept = raw
                .lines()
                .filter(|line| filter.as_ref().is_none_or(|re| re.is_match(line)));
            lines = normalize_stream(kept);

            info!(
                "Stage '{}' produced {} line(s)",
                stage.name,
                lines.len()
            );
        }

        Ok(lines)
    }

    async fn run_command(
        &self,
        stage: &StageSpec,
        tool: &str,
        args: &[String],
        lines: &[String],
        input_path: &Path,
        ctx: &RunContext,
    ) -> String {
        let references_input = args
            .iter()
            .any(|a| a.contains(INPUT_PLACEHOLDER) || a.contains(TARGET_PLACEHOLDER));

        if !stage.fan_out {
            let stdin = (!references_input).then(|| join_lines(lines));
            let invocation = Invocation {
                program: tool.to_string(),
                args: substitute(args, input_path, ctx.dir(), None),
                stdin,
                timeout: stage.timeout,
            };
            return self.invoke(stage, &invocation).await;
        }

        // Sequential so concatenation follows input order
        let mut combined = String::new();
        for line in lines {
            let invocation = Invocation {
                program: tool.to_string(),
                args: substitute(args, input_path, ctx.dir(), Some(line)),
                stdin: (!references_input).then(|| format!("{}\n", line)),
                timeout: stage.timeout,
            };
            let output = self.invoke(stage, &invocation).await;
            combined.push_str(&output);
            if !output.is_empty() && !output.ends_with('\n') {
                combined.push('\n');
            }
        }
        combined
    }

    async fn invoke(&self, stage: &StageSpec, invocation: &Invocation) -> String {
        match self.runner.run(invocation).await {
            StageOutcome::Completed { output } => output,
            StageOutcome::Failed { code, output } => {
                warn!(
                    "Stage '{}': {} exited with {:?}, continuing with {} byte(s) of output",
                    stage.name,
                    invocation.program,
                    code,
                    output.len()
                );
                output
            }
            StageOutcome::TimedOut { output } => {
                warn!(
                    "Stage '{}': {} timed out after {:?}, continuing with partial output",
                    stage.name, invocation.program, invocation.timeout
                );
                output
            }
            StageOutcome::SpawnFailed { reason } => {
                warn!(
                    "Stage '{}': failed to start {}: {}",
                    stage.name, invocation.program, reason
                );
                String::new()
            }
        }
    }

    async fn run_checksum(&self, stage: &StageSpec, lines: &[String]) -> String {
        let mut output = String::new();
        let mut failed = 0usize;
        for line in lines {
            match checksum::checksum_line(
                self.fetcher.as_ref(),
                line,
                stage.timeout,
                &self.fetch_policy,
            )
            .await
            {
                Some(entry) => {
                    output.push_str(&entry);
                    output.push('\n');
                }
                None => failed += 1,
            }
        }
        if failed > 0 {
            warn!(
                "Stage '{}': {} of {} URL(s) could not be fetched",
                stage.name,
                failed,
                lines.len()
            );
        }
        output
    }
}

fn compile_filters(stages: &[StageSpec]) -> Result<Vec<Option<Regex>>, PipelineError> {
    stages
        .iter()
        .map(|stage| {
            stage
                .filter
                .as_deref()
                .map(|pattern| {
                    Regex::new(pattern).map_err(|source| PipelineError::InvalidFilter {
                        stage: stage.name.clone(),
                        pattern: pattern.to_string(),
                        source,
                    })
                })
                .transpose()
        })
        .collect()
}

fn substitute(args: &[String], input: &Path, run_dir: &Path, target: Option<&str>) -> Vec<String> {
    let input = input.to_string_lossy();
    let run_dir = run_dir.to_string_lossy();
    args.iter()
        .map(|arg| {
            let arg = arg
                .replace(INPUT_PLACEHOLDER, &input)
                .replace(RUN_DIR_PLACEHOLDER, &run_dir);
            match target {
                Some(target) => arg.replace(TARGET_PLACEHOLDER, target),
                None => arg,
            }
        })
        .collect()
}

fn join_lines(lines: &[String]) -> String {
    let mut joined = lines.join("\n");
    joined.push('\n');
    joined
}

fn write_lines(path: &Path, lines: &[String]) -> Result<(), PipelineError> {
    std::fs::write(path, join_lines(lines)).map_err(|e| PipelineError::io(path, e))
}
