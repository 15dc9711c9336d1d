//! Argus Lua Infrastructure
//!
//! Workflows are declared in Lua so operators can build argument lists with
//! ordinary expressions. This crate provides:
//! - A restricted sandbox with the `workflow` helper module
//! - An `env` module exposing `ARGUS_*` variables to definitions
//! - Parsing of definitions into `WorkflowDescriptor`s

pub mod env;
pub mod parser;
pub mod sandbox;

pub use env::{EnvModule, ProcessEnv, VarProvider};
pub use parser::{load_workflow, load_workflows, parse_workflow, parse_workflow_with};
pub use sandbox::create_sandbox;

pub use argus_core::domain::workflow::{StageSpec, WorkflowDescriptor};
