//! Centralized constants for the node-healthcheck workspace.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod lease;
pub mod paths;
pub mod state;
