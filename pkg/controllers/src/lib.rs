//! Node lease arbitration and the controllers that drive it.

pub mod conflict;
pub mod duration;
pub mod error;
pub mod lease;
pub mod overdue;
pub mod remediation;

pub use error::LeaseError;
pub use lease::{LeaseArbiter, LeaseConfig};
