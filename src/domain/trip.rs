//! Aggregate of one or more temporally adjacent records

use crate::domain::measurement::Measurement;
use crate::domain::record::RecordRow;
use tracing::info;

/// Trip-level summary, built by folding persisted record rows in
/// `start_time` order.
///
/// Channels are fed record-level aggregates, not raw samples: speeds track
/// the max of each record's max, temperatures track min/max/avg of each
/// record's avg, and fuel consumption folds each record's min and max so the
/// trip span covers both extremes.
#[derive(Debug, Clone, Default)]
pub struct Trip {
    /// Total engine-on time (ms)
    pub time: u64,
    /// Total distance (cm)
    pub dist: u32,
    /// Total fuel used (mm³)
    pub fuel: u32,

    /// Start time of the earliest record (epoch ms); zero until the first fold
    pub start_time: u64,
    /// End time of the last record (epoch ms)
    pub end_time: u64,
    pub start_mileage: f64,
    pub end_mileage: f64,

    /// Engine speed - max only (RPM)
    pub engine_speed: Measurement,
    /// Vehicle speed - max only (km/h)
    pub vehicle_speed: Measurement,
    /// Coolant temperature (°C)
    pub coolant_temp: Measurement,
    /// Outside temperature (°C)
    pub outside_temp: Measurement,
    /// Oil temperature (°C)
    pub oil_temp: Measurement,
    /// Oil level - min/max only (%)
    pub oil_level: Measurement,
    /// Fuel level - min/max only (%)
    pub fuel_level: Measurement,
    /// Approximate remaining range - min/max only (km)
    pub fuel_range: Measurement,
    /// Instant fuel consumption - min/max only (l/100 km)
    pub fuel_cons: Measurement,
}

impl Trip {
    /// Fold one record into the trip.
    pub fn append(&mut self, row: &RecordRow) {
        self.time += row.end_time.saturating_sub(row.start_time);
        self.dist += row.dist;
        self.fuel += row.fuel;

        // a zero bound means "not set yet", adopt the first value
        if self.start_time == 0 {
            self.start_time = row.start_time;
        } else {
            self.start_time = self.start_time.min(row.start_time);
        }
        self.end_time = self.end_time.max(row.end_time);

        if self.start_mileage == 0.0 {
            self.start_mileage = row.start_mileage;
        } else {
            self.start_mileage = self.start_mileage.min(row.start_mileage);
        }
        self.end_mileage = self.end_mileage.max(row.end_mileage);

        // max only
        self.engine_speed.append(row.engine_speed_max);
        self.vehicle_speed.append(row.vehicle_speed_max);
        // min/max/avg
        self.coolant_temp.append(row.coolant_temp);
        self.outside_temp.append(row.outside_temp);
        self.oil_temp.append(row.oil_temp);
        // min/max only
        self.oil_level.append(row.oil_level);
        self.fuel_level.append(row.fuel_level);
        self.fuel_range.append(row.fuel_range);
        self.fuel_cons.append(row.fuel_cons_min);
        self.fuel_cons.append(row.fuel_cons_max);
    }

    /// Whether the trip carries anything worth persisting.
    pub fn worth_saving(&self) -> bool {
        self.start_time != self.end_time && self.dist != 0
    }

    /// Log a human-readable summary of a finished trip.
    pub fn log_summary(&self, trip_id: i64) {
        info!(
            trip_id,
            start_time = self.start_time,
            end_time = self.end_time,
            time_ms = self.time,
            dist_cm = self.dist,
            fuel_mm3 = self.fuel,
            start_mileage_km = self.start_mileage,
            end_mileage_km = self.end_mileage,
            engine_speed_max = self.engine_speed.max as u32,
            vehicle_speed_max = self.vehicle_speed.max,
            fuel_level_min = self.fuel_level.min as u32,
            fuel_level_max = self.fuel_level.max as u32,
            fuel_cons_min = self.fuel_cons.min,
            fuel_cons_max = self.fuel_cons.max,
            "trip_summary"
        );
        if self.dist != 0 && self.time != 0 {
            info!(
                trip_id,
                avg_speed = self.dist as f64 / self.time as f64 * 36.0,
                avg_cons = f64::from(self.fuel) * 10.0 / f64::from(self.dist),
                "trip_averages"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(start_time: u64, end_time: u64, dist: u32, fuel: u32) -> RecordRow {
        RecordRow {
            start_time,
            end_time,
            start_mileage: 500.0,
            end_mileage: 505.0,
            dist,
            fuel,
            engine_speed_avg: 1_800.0,
            engine_speed_max: 3_200.0,
            vehicle_speed_min: 0.0,
            vehicle_speed_max: 90.0,
            coolant_temp: 85.0,
            outside_temp: 12.0,
            oil_temp: 95.0,
            oil_level: 60.0,
            fuel_level: 55.0,
            fuel_range: 420.0,
            fuel_cons_min: 4.5,
            fuel_cons_max: 11.0,
        }
    }

    #[test]
    fn test_totals_sum_over_records() {
        let mut trip = Trip::default();
        trip.append(&row(1_000, 11_000, 2_000, 160));
        trip.append(&row(20_000, 35_000, 3_000, 240));
        assert_eq!(trip.time, 25_000);
        assert_eq!(trip.dist, 5_000);
        assert_eq!(trip.fuel, 400);
    }

    #[test]
    fn test_bounds_adopt_first_value_then_min_max() {
        let mut trip = Trip::default();
        trip.append(&row(10_000, 20_000, 100, 10));
        assert_eq!(trip.start_time, 10_000);
        assert_eq!(trip.end_time, 20_000);

        // an earlier record narrows the lower bound, not the upper
        trip.append(&row(5_000, 8_000, 100, 10));
        assert_eq!(trip.start_time, 5_000);
        assert_eq!(trip.end_time, 20_000);

        assert_eq!(trip.start_mileage, 500.0);
        assert_eq!(trip.end_mileage, 505.0);
    }

    #[test]
    fn test_channels_fold_record_aggregates() {
        let mut trip = Trip::default();
        let mut a = row(1_000, 2_000, 100, 10);
        a.engine_speed_max = 3_000.0;
        a.coolant_temp = 80.0;
        a.fuel_cons_min = 4.0;
        a.fuel_cons_max = 9.0;
        let mut b = row(3_000, 4_000, 100, 10);
        b.engine_speed_max = 4_500.0;
        b.coolant_temp = 90.0;
        b.fuel_cons_min = 5.0;
        b.fuel_cons_max = 12.0;

        trip.append(&a);
        trip.append(&b);

        assert_eq!(trip.engine_speed.max, 4_500.0);
        assert_eq!(trip.coolant_temp.min, 80.0);
        assert_eq!(trip.coolant_temp.max, 90.0);
        assert_eq!(trip.coolant_temp.avg, 85.0);
        // consumption span covers both record extremes
        assert_eq!(trip.fuel_cons.min, 4.0);
        assert_eq!(trip.fuel_cons.max, 12.0);
    }

    #[test]
    fn test_oil_level_folds_oil_level_channel() {
        let mut trip = Trip::default();
        let mut r = row(1_000, 2_000, 100, 10);
        r.oil_level = 62.0;
        r.oil_temp = 101.0;
        trip.append(&r);
        assert_eq!(trip.oil_level.min, 62.0);
        assert_eq!(trip.oil_temp.avg, 101.0);
    }

    #[test]
    fn test_worth_saving() {
        let mut trip = Trip::default();
        assert!(!trip.worth_saving());
        trip.append(&row(1_000, 1_000, 0, 0));
        assert!(!trip.worth_saving());
        trip.append(&row(2_000, 9_000, 500, 40));
        assert!(trip.worth_saving());
    }
}
