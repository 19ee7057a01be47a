// Core domain types and persisted state
pub mod config;
pub mod store;
pub mod types;

// Source adapters and their external collaborators
pub mod adapters;
pub mod browser;
pub mod market;
pub mod transfers;

// New-event pipeline
pub mod dedup;
pub mod delivery;
pub mod scheduler;
pub mod workers;

// Re-export commonly used types for convenience
pub use store::Store;
pub use types::*;
