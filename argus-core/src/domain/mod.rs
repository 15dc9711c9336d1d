//! Core domain types
//!
//! This module contains the core domain structures used across Argus services.
//! These types are shared between the orchestrator (scheduling and tracking),
//! the runner (pipeline execution) and the CLI (inspection).

pub mod finding;
pub mod notification;
pub mod process;
pub mod target;
pub mod workflow;
