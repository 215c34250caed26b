//! Incremental min/max/mean accumulator for a scalar telemetry channel

/// Running statistics over a stream of samples.
///
/// The mean uses an incremental update (Welford form), so long runs do not
/// lose precision to a growing sum. Starts zeroed; `min`/`max` become
/// meaningful with the first append.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Measurement {
    initialized: bool,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub count: u32,
}

impl Measurement {
    /// Fold one sample into the channel.
    pub fn append(&mut self, value: f64) {
        self.count += 1;
        self.avg += (value - self.avg) / f64::from(self.count);
        if !self.initialized {
            self.min = value;
            self.max = value;
            self.initialized = true;
        } else {
            if value < self.min {
                self.min = value;
            }
            if value > self.max {
                self.max = value;
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}
