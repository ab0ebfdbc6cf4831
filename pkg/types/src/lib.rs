pub mod config;
pub mod healthcheck;
pub mod lease;
pub mod node;
pub mod remediation;
pub mod validate;
