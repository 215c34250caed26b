//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `can` - SLCAN serial frame source for the vehicle bus
//! - `store` - SQLite persistence for records and trips

pub mod can;
pub mod store;

// Re-export commonly used types
pub use can::{FrameEvent, SlcanMonitor};
pub use store::Store;
