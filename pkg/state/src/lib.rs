pub mod client;
pub mod clock;
pub mod lease_store;
