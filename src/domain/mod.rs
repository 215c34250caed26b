//! Domain models - frames, measurements, records and trips
//!
//! This module contains the canonical data types used throughout the system:
//! - `Frame` - a decoded bus telemetry message
//! - `Measurement` - incremental min/max/mean accumulator over one channel
//! - `Record` - aggregate of one contiguous engine-running interval
//! - `Trip` - aggregate of one or more temporally adjacent records

pub mod frame;
pub mod measurement;
pub mod record;
pub mod trip;

use std::time::{SystemTime, UNIX_EPOCH};

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}
