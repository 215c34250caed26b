//! SQLite persistence for records and trips
//!
//! One `Store` wraps one connection; all access is serialized by the
//! persistence worker that owns it. Records key on `(start_time, end_time)`,
//! so a replayed insert of the same interval is a no-op rather than a
//! duplicate.

use crate::domain::record::RecordRow;
use crate::domain::trip::Trip;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, ErrorCode};
use std::fs;
use std::path::Path;

pub struct Store {
    conn: Connection,
}

/// Round a value to 3 decimal places for storage stability.
fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Whether an error is transient database contention, worth retrying.
pub fn is_busy(err: &anyhow::Error) -> bool {
    err.downcast_ref::<rusqlite::Error>().is_some_and(|e| {
        matches!(
            e.sqlite_error_code(),
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        )
    })
}

impl Store {
    /// Open (or create) the database and ensure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("failed to enable WAL mode")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("failed to enable foreign keys")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS record (
                start_time INTEGER NOT NULL,
                end_time INTEGER NOT NULL,
                start_mileage REAL NOT NULL,
                end_mileage REAL NOT NULL,
                dist INTEGER NOT NULL,
                fuel INTEGER NOT NULL,
                engine_speed REAL NOT NULL,
                engine_speed_max REAL NOT NULL,
                vehicle_speed_min REAL NOT NULL,
                vehicle_speed_max REAL NOT NULL,
                coolant_temp REAL NOT NULL,
                outside_temp REAL NOT NULL,
                oil_temp REAL NOT NULL,
                oil_level REAL NOT NULL,
                fuel_level REAL NOT NULL,
                fuel_range REAL NOT NULL,
                fuel_cons_min REAL NOT NULL,
                fuel_cons_max REAL NOT NULL,
                trip_id INTEGER DEFAULT NULL,
                PRIMARY KEY(start_time, end_time)
            );
            CREATE TABLE IF NOT EXISTS trip (
                trip_id INTEGER NOT NULL PRIMARY KEY,
                time INTEGER NOT NULL,
                dist INTEGER NOT NULL,
                fuel INTEGER NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER NOT NULL,
                start_mileage REAL NOT NULL,
                end_mileage REAL NOT NULL,
                engine_speed_max REAL NOT NULL,
                vehicle_speed_max REAL NOT NULL,
                coolant_temp_avg REAL NOT NULL,
                coolant_temp_min REAL NOT NULL,
                coolant_temp_max REAL NOT NULL,
                outside_temp_avg REAL NOT NULL,
                outside_temp_min REAL NOT NULL,
                outside_temp_max REAL NOT NULL,
                oil_temp_avg REAL NOT NULL,
                oil_temp_min REAL NOT NULL,
                oil_temp_max REAL NOT NULL,
                oil_level_min REAL NOT NULL,
                oil_level_max REAL NOT NULL,
                fuel_level_min REAL NOT NULL,
                fuel_level_max REAL NOT NULL,
                fuel_range_min REAL NOT NULL,
                fuel_range_max REAL NOT NULL,
                fuel_cons_min REAL NOT NULL,
                fuel_cons_max REAL NOT NULL
            );",
        )
        .context("failed to create schema")?;

        Ok(Self { conn })
    }

    /// Insert a flushed record with a null trip link.
    ///
    /// Returns `false` when a record with the same `(start_time, end_time)`
    /// key already exists (retried delivery).
    pub fn insert_record(&self, row: &RecordRow) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO record (
                    start_time, end_time, start_mileage, end_mileage,
                    dist, fuel, engine_speed, engine_speed_max,
                    vehicle_speed_min, vehicle_speed_max,
                    coolant_temp, outside_temp, oil_temp, oil_level,
                    fuel_level, fuel_range, fuel_cons_min, fuel_cons_max
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    row.start_time as i64,
                    row.end_time as i64,
                    round3(row.start_mileage),
                    round3(row.end_mileage),
                    row.dist,
                    row.fuel,
                    round3(row.engine_speed_avg),
                    round3(row.engine_speed_max),
                    round3(row.vehicle_speed_min),
                    round3(row.vehicle_speed_max),
                    round3(row.coolant_temp),
                    round3(row.outside_temp),
                    round3(row.oil_temp),
                    round3(row.oil_level),
                    round3(row.fuel_level),
                    round3(row.fuel_range),
                    round3(row.fuel_cons_min),
                    round3(row.fuel_cons_max),
                ],
            )
            .context("record insert failed")?;
        Ok(changed > 0)
    }

    /// All records not yet assigned to a trip, in ascending start order.
    pub fn ungrouped_records(&self) -> Result<Vec<RecordRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT
                    start_time, end_time, start_mileage, end_mileage,
                    dist, fuel, engine_speed, engine_speed_max,
                    vehicle_speed_min, vehicle_speed_max,
                    coolant_temp, outside_temp, oil_temp, oil_level,
                    fuel_level, fuel_range, fuel_cons_min, fuel_cons_max
                FROM record
                WHERE trip_id IS NULL
                ORDER BY start_time",
            )
            .context("ungrouped query prepare failed")?;

        let rows = stmt
            .query_map([], |row| {
                Ok(RecordRow {
                    start_time: row.get::<_, i64>(0)? as u64,
                    end_time: row.get::<_, i64>(1)? as u64,
                    start_mileage: row.get(2)?,
                    end_mileage: row.get(3)?,
                    dist: row.get(4)?,
                    fuel: row.get(5)?,
                    engine_speed_avg: row.get(6)?,
                    engine_speed_max: row.get(7)?,
                    vehicle_speed_min: row.get(8)?,
                    vehicle_speed_max: row.get(9)?,
                    coolant_temp: row.get(10)?,
                    outside_temp: row.get(11)?,
                    oil_temp: row.get(12)?,
                    oil_level: row.get(13)?,
                    fuel_level: row.get(14)?,
                    fuel_range: row.get(15)?,
                    fuel_cons_min: row.get(16)?,
                    fuel_cons_max: row.get(17)?,
                })
            })
            .context("ungrouped query failed")?;

        rows.collect::<rusqlite::Result<Vec<_>>>().context("ungrouped row read failed")
    }

    /// Persist a finished trip and stamp every record it covers.
    ///
    /// Membership is re-derived from timestamps, so a re-run over the same
    /// interval stamps the same rows. Both writes commit atomically.
    /// Returns the generated trip id.
    pub fn insert_trip(&mut self, trip: &Trip) -> Result<i64> {
        let tx = self.conn.transaction().context("trip transaction begin failed")?;

        tx.execute(
            "INSERT INTO trip (
                time, dist, fuel,
                start_time, end_time, start_mileage, end_mileage,
                engine_speed_max, vehicle_speed_max,
                coolant_temp_avg, coolant_temp_min, coolant_temp_max,
                outside_temp_avg, outside_temp_min, outside_temp_max,
                oil_temp_avg, oil_temp_min, oil_temp_max,
                oil_level_min, oil_level_max, fuel_level_min, fuel_level_max,
                fuel_range_min, fuel_range_max, fuel_cons_min, fuel_cons_max
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                      ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)",
            params![
                trip.time as i64,
                trip.dist,
                trip.fuel,
                trip.start_time as i64,
                trip.end_time as i64,
                round3(trip.start_mileage),
                round3(trip.end_mileage),
                round3(trip.engine_speed.max),
                round3(trip.vehicle_speed.max),
                round3(trip.coolant_temp.avg),
                round3(trip.coolant_temp.min),
                round3(trip.coolant_temp.max),
                round3(trip.outside_temp.avg),
                round3(trip.outside_temp.min),
                round3(trip.outside_temp.max),
                round3(trip.oil_temp.avg),
                round3(trip.oil_temp.min),
                round3(trip.oil_temp.max),
                round3(trip.oil_level.min),
                round3(trip.oil_level.max),
                round3(trip.fuel_level.min),
                round3(trip.fuel_level.max),
                round3(trip.fuel_range.min),
                round3(trip.fuel_range.max),
                round3(trip.fuel_cons.min),
                round3(trip.fuel_cons.max),
            ],
        )
        .context("trip insert failed")?;

        let trip_id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE record SET trip_id = ?1
             WHERE start_time >= ?2 AND start_time < ?3
             AND end_time > ?4 AND end_time <= ?5",
            params![
                trip_id,
                trip.start_time as i64,
                trip.end_time as i64,
                trip.start_time as i64,
                trip.end_time as i64,
            ],
        )
        .context("record trip link update failed")?;

        tx.commit().context("trip transaction commit failed")?;
        Ok(trip_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_row(start_time: u64, end_time: u64) -> RecordRow {
        RecordRow {
            start_time,
            end_time,
            start_mileage: 1_000.1234567,
            end_mileage: 1_005.5,
            dist: 12_345,
            fuel: 678,
            engine_speed_avg: 1_812.3456,
            engine_speed_max: 4_100.0,
            vehicle_speed_min: 0.0,
            vehicle_speed_max: 88.8,
            coolant_temp: 84.5,
            outside_temp: 11.25,
            oil_temp: 96.0,
            oil_level: 58.0,
            fuel_level: 47.0,
            fuel_range: 390.0,
            fuel_cons_min: 4.321,
            fuel_cons_max: 13.579,
        }
    }

    #[test]
    fn test_insert_and_read_back() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();

        assert!(store.insert_record(&sample_row(1_000, 2_000)).unwrap());
        let rows = store.ungrouped_records().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].start_time, 1_000);
        assert_eq!(rows[0].dist, 12_345);
        // stored floats are rounded to 3 decimals
        assert_eq!(rows[0].start_mileage, 1_000.123);
        assert_eq!(rows[0].engine_speed_avg, 1_812.346);
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();

        assert!(store.insert_record(&sample_row(1_000, 2_000)).unwrap());
        assert!(!store.insert_record(&sample_row(1_000, 2_000)).unwrap());
        assert_eq!(store.ungrouped_records().unwrap().len(), 1);
    }

    #[test]
    fn test_ungrouped_ordering() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();

        store.insert_record(&sample_row(30_000, 31_000)).unwrap();
        store.insert_record(&sample_row(10_000, 11_000)).unwrap();
        store.insert_record(&sample_row(20_000, 21_000)).unwrap();

        let starts: Vec<u64> =
            store.ungrouped_records().unwrap().iter().map(|r| r.start_time).collect();
        assert_eq!(starts, vec![10_000, 20_000, 30_000]);
    }

    #[test]
    fn test_trip_insert_links_covered_records() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path().join("test.db")).unwrap();

        store.insert_record(&sample_row(1_000, 2_000)).unwrap();
        store.insert_record(&sample_row(3_000, 4_000)).unwrap();
        store.insert_record(&sample_row(900_000, 901_000)).unwrap();

        let mut trip = Trip::default();
        for row in &store.ungrouped_records().unwrap()[..2] {
            trip.append(row);
        }
        let trip_id = store.insert_trip(&trip).unwrap();
        assert!(trip_id > 0);

        // the record outside the trip window keeps its null link
        let remaining = store.ungrouped_records().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].start_time, 900_000);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("data").join("triplog.db");
        Store::open(&nested).unwrap();
        assert!(nested.exists());
    }

    #[test]
    fn test_round3() {
        assert_eq!(round3(1.23456), 1.235);
        assert_eq!(round3(-0.0004), -0.0);
        assert_eq!(round3(100.0), 100.0);
    }
}
