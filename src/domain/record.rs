//! Aggregate state of one contiguous engine-running interval

use crate::domain::frame::{Frame, TripData};
use crate::domain::measurement::Measurement;
use tracing::info;

/// Full span of the 16-bit distance tick counter, in cm.
const DIST_COUNTER_RANGE: u32 = 65535 * 10;
/// Full span of the 8-bit fuel tick counter, in mm³.
const FUEL_COUNTER_RANGE: u32 = 255 * 80;

/// Trip computer values captured at one end of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TripSnapshot {
    /// Trip time (min)
    pub time: u16,
    /// Trip distance (km)
    pub dist: u16,
    /// Trip average speed (km/h)
    pub avg_speed: u8,
    /// Trip average fuel consumption (0.1 l/100 km)
    pub avg_fuel_cons: u16,
}

impl From<TripData> for TripSnapshot {
    fn from(d: TripData) -> Self {
        Self {
            time: d.total_time,
            dist: d.total_dist,
            avg_speed: d.speed,
            avg_fuel_cons: d.fuel_cons,
        }
    }
}

/// Statistics at one end of a record.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordStat {
    /// Epoch milliseconds of the first/last append
    pub time: u64,
    /// Total mileage (km)
    pub mileage: f64,
    /// Trip computer snapshot, once one has been seen
    pub trip: Option<TripSnapshot>,
}

/// Running aggregate for the currently active engine-on interval.
///
/// Distance and fuel accumulate as deltas of two monotonically-increasing
/// hardware counters that wrap at their bit width. The last raw readings
/// survive [`Record::reset`] so the first delta of the next record stays
/// continuous across a flush.
#[derive(Debug, Clone, Default)]
pub struct Record {
    pub start: RecordStat,
    pub end: RecordStat,

    /// Engine speed (RPM)
    pub engine_speed: Measurement,
    /// Vehicle speed (km/h)
    pub vehicle_speed: Measurement,

    counters_init: bool,
    dist_last: u32,
    fuel_last: u32,
    /// Distance covered (cm)
    pub dist: u32,
    /// Fuel used (mm³)
    pub fuel: u32,

    /// Coolant temperature (°C)
    pub coolant_temp: Measurement,
    /// Outside temperature (°C)
    pub outside_temp: Measurement,
    /// Oil temperature (°C)
    pub oil_temp: Measurement,
    /// Oil level (%)
    pub oil_level: Measurement,
    /// Fuel level (%)
    pub fuel_level: Measurement,
    /// Instant fuel consumption (l/100 km)
    pub fuel_cons: Measurement,
    /// Approximate remaining range (km)
    pub fuel_range: Measurement,
}

impl Record {
    /// Clear everything except the raw counter baselines.
    pub fn reset(&mut self) {
        let counters_init = self.counters_init;
        let dist_last = self.dist_last;
        let fuel_last = self.fuel_last;

        *self = Record::default();

        if counters_init {
            self.counters_init = true;
            self.dist_last = dist_last;
            self.fuel_last = fuel_last;
        }
    }

    /// Overwrite the raw counter baselines (scaled cm / mm³ values).
    ///
    /// Called on engine start/stop transitions, where the transition frame
    /// itself is not aggregated but its counter readings must become the
    /// baseline for the next delta.
    pub fn seed_counters(&mut self, dist_raw: u32, fuel_raw: u32) {
        self.dist_last = dist_raw;
        self.fuel_last = fuel_raw;
    }

    /// Fold one decoded frame into the record; `now` is epoch milliseconds.
    pub fn append(&mut self, frame: &Frame, now: u64) {
        if self.start.time == 0 {
            self.start.time = now;
        }
        self.end.time = now;

        match *frame {
            // Command frames gate the recorder, not the aggregate.
            // Trip-data-2 is decoded but intentionally not folded.
            Frame::Command { .. } | Frame::TripData2(_) => {}

            Frame::Fast { engine_speed, vehicle_speed, dist, fuel } => {
                self.engine_speed.append(f64::from(engine_speed) * 0.125);
                self.vehicle_speed.append(f64::from(vehicle_speed) * 0.01);
                let dist_raw = u32::from(dist) * 10;
                let fuel_raw = u32::from(fuel) * 80;
                if !self.counters_init {
                    // first reading only establishes the baseline
                    self.counters_init = true;
                } else {
                    let mut dist = dist_raw;
                    let mut fuel = fuel_raw;
                    if dist < self.dist_last {
                        dist += DIST_COUNTER_RANGE;
                    }
                    if fuel < self.fuel_last {
                        fuel += FUEL_COUNTER_RANGE;
                    }
                    self.dist += dist - self.dist_last;
                    self.fuel += fuel - self.fuel_last;
                }
                self.dist_last = dist_raw;
                self.fuel_last = fuel_raw;
            }

            Frame::Slow { coolant_temp, total_mileage, outside_temp, .. } => {
                self.coolant_temp.append(f64::from(coolant_temp));
                self.outside_temp.append(f64::from(outside_temp) * 0.5);
                let mileage = f64::from(total_mileage) * 0.1;
                if self.start.mileage == 0.0 {
                    self.start.mileage = mileage;
                }
                self.end.mileage = mileage;
            }

            Frame::TempLevel { oil_temp, fuel_level, oil_level } => {
                self.oil_temp.append(f64::from(oil_temp));
                self.oil_level.append(f64::from(oil_level));
                self.fuel_level.append(f64::from(fuel_level));
            }

            Frame::TripGeneral { invalid_cons, invalid_range, fuel_cons, fuel_range, .. } => {
                if !invalid_cons {
                    self.fuel_cons.append(f64::from(fuel_cons) * 0.1);
                }
                if !invalid_range {
                    self.fuel_range.append(f64::from(fuel_range));
                }
            }

            Frame::TripData1(data) => {
                let snapshot = TripSnapshot::from(data);
                if self.start.trip.is_none() {
                    self.start.trip = Some(snapshot);
                }
                self.end.trip = Some(snapshot);
            }
        }
    }

    /// Wall-clock span of the record so far.
    pub fn elapsed_ms(&self) -> u64 {
        self.end.time.saturating_sub(self.start.time)
    }

    /// Persisted shape of the record.
    pub fn to_row(&self) -> RecordRow {
        RecordRow {
            start_time: self.start.time,
            end_time: self.end.time,
            start_mileage: self.start.mileage,
            end_mileage: self.end.mileage,
            dist: self.dist,
            fuel: self.fuel,
            engine_speed_avg: self.engine_speed.avg,
            engine_speed_max: self.engine_speed.max,
            vehicle_speed_min: self.vehicle_speed.min,
            vehicle_speed_max: self.vehicle_speed.max,
            coolant_temp: self.coolant_temp.avg,
            outside_temp: self.outside_temp.avg,
            oil_temp: self.oil_temp.avg,
            oil_level: self.oil_level.avg,
            fuel_level: self.fuel_level.avg,
            fuel_range: self.fuel_range.avg,
            fuel_cons_min: self.fuel_cons.min,
            fuel_cons_max: self.fuel_cons.max,
        }
    }

    /// Log a human-readable progress summary for the active record.
    pub fn log_summary(&self) {
        if self.start.time == self.end.time {
            return;
        }
        let elapsed_ms = self.end.time - self.start.time;
        let start_trip = self.start.trip.unwrap_or_default();
        let end_trip = self.end.trip.unwrap_or_default();
        info!(
            elapsed_s = elapsed_ms / 1000,
            trip_elapsed_s = u32::from(end_trip.time.saturating_sub(start_trip.time)) * 60,
            dist_km = self.dist as f64 * 0.00001,
            trip_dist_km = end_trip.dist.saturating_sub(start_trip.dist),
            fuel_l = f64::from(self.fuel) * 0.000001,
            fuel_level_pct = self.fuel_level.avg as u32,
            engine_speed_rpm = self.engine_speed.avg as u32,
            vehicle_speed_avg = self.vehicle_speed.avg,
            vehicle_speed_calc = self.dist as f64 / elapsed_ms as f64 * 36.0,
            fuel_cons_avg = self.fuel_cons.avg,
            // divide guard for zero-distance records; display only
            fuel_cons_calc = f64::from(self.fuel) * 10.0 / f64::from(self.dist.max(1)),
            "record_summary"
        );
    }
}

/// Persisted shape of a record.
///
/// Produced from a live [`Record`] at flush time and read back from storage
/// during trip reconciliation, so the live and recovered paths feed the trip
/// aggregator identically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordRow {
    pub start_time: u64,
    pub end_time: u64,
    pub start_mileage: f64,
    pub end_mileage: f64,
    /// Distance (cm)
    pub dist: u32,
    /// Fuel (mm³)
    pub fuel: u32,
    pub engine_speed_avg: f64,
    pub engine_speed_max: f64,
    pub vehicle_speed_min: f64,
    pub vehicle_speed_max: f64,
    pub coolant_temp: f64,
    pub outside_temp: f64,
    pub oil_temp: f64,
    pub oil_level: f64,
    pub fuel_level: f64,
    pub fuel_range: f64,
    pub fuel_cons_min: f64,
    pub fuel_cons_max: f64,
}

impl RecordRow {
    /// Whether the record carries anything worth persisting.
    pub fn worth_saving(&self) -> bool {
        self.start_time != self.end_time && self.dist != 0
    }
}
