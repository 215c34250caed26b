//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `recorder` - Engine-gated frame aggregation loop
//! - `persistence` - Single-writer storage worker and trip reconciliation

pub mod persistence;
pub mod recorder;

// Re-export commonly used types
pub use persistence::PersistHandle;
pub use recorder::Recorder;
