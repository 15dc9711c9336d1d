//! Argus Core
//!
//! Core types and abstractions for the Argus recon scheduler.
//!
//! This crate contains:
//! - Domain types: Workflows, target files, findings, tracked processes
//! - Layout: the on-disk directory convention shared by every binary

pub mod domain;
pub mod layout;

pub use layout::Layout;
