//! Engine-gated record aggregation loop
//!
//! The Recorder is the primary consumer of bus frames. It aggregates frames
//! into the active record only while the engine is running, flushes the
//! record on engine start/stop transitions and on a fixed time ceiling, and
//! hands completed records to the persistence worker by move.

use crate::io::can::FrameEvent;
use crate::domain::frame::{Frame, NetworkState};
use crate::domain::record::Record;
use crate::services::persistence::PersistHandle;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Records are flushed once they span this much wall-clock time.
const MAX_RECORD_MS: u64 = 60 * 1000;

pub struct Recorder {
    record: Record,
    engine_running: bool,
    network_state: Option<NetworkState>,
    frames_seen: u64,
    /// Every n-th aggregated frame emits a record summary log.
    summary_every: u64,
    persist: PersistHandle,
}

impl Recorder {
    pub fn new(persist: PersistHandle, summary_every: u64) -> Self {
        Self {
            record: Record::default(),
            engine_running: false,
            network_state: None,
            frames_seen: 0,
            summary_every: summary_every.max(1),
            persist,
        }
    }

    /// Consume frames until the source closes the channel, then flush the
    /// interval that was still open.
    pub async fn run(mut self, mut frame_rx: mpsc::Receiver<FrameEvent>) {
        info!("recorder_started");
        while let Some(event) = frame_rx.recv().await {
            if let Some(frame) = Frame::decode(&event.raw) {
                self.process(&frame, event.received_at);
            }
            // unrecognized identifiers fall through untouched
        }
        self.flush();
        info!("recorder_stopped");
    }

    /// Fold one decoded frame into the active record; `now` is epoch
    /// milliseconds of the frame's arrival.
    pub fn process(&mut self, frame: &Frame, now: u64) {
        if let Frame::Command { network_state, .. } = frame {
            if self.network_state != Some(*network_state) {
                debug!(state = network_state.as_str(), "network_state_changed");
                self.network_state = Some(*network_state);
            }
        }

        if let Frame::Fast { engine_speed, dist, fuel, .. } = *frame {
            let running = engine_speed != 0;
            if running != self.engine_running {
                info!(running, "engine_state_changed");
                self.flush();
                // the transition frame contributes no counter delta: the
                // baseline is seeded from its own readings, so the next
                // delta stays continuous
                self.record.seed_counters(u32::from(dist) * 10, u32::from(fuel) * 80);
                self.engine_running = running;
            }
        }

        if !self.engine_running {
            return;
        }

        self.record.append(frame, now);

        if self.record.elapsed_ms() >= MAX_RECORD_MS {
            self.flush();
        }

        self.frames_seen += 1;
        if self.frames_seen % self.summary_every == 0 {
            self.record.log_summary();
        }
    }

    /// Hand the current record to the persistence worker and start fresh.
    ///
    /// Empty records are handed over too: the worker skips the insert but
    /// still runs a reconciliation pass.
    fn flush(&mut self) {
        self.record.log_summary();
        let row = self.record.to_row();
        self.record.reset();
        self.persist.save_record(row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::persistence::{self, Job};
    use tokio::sync::mpsc::Receiver;

    fn recorder() -> (Recorder, Receiver<Job>) {
        let (handle, rx) = persistence::channel();
        (Recorder::new(handle, 10), rx)
    }

    fn fast(engine_speed: u16, vehicle_speed: u16, dist: u16, fuel: u8) -> Frame {
        Frame::Fast { engine_speed, vehicle_speed, dist, fuel }
    }

    fn next_row(rx: &mut Receiver<Job>) -> crate::domain::record::RecordRow {
        match rx.try_recv().expect("expected a queued job") {
            Job::SaveRecord(row) => row,
            Job::Reconcile => panic!("expected SaveRecord"),
        }
    }

    #[test]
    fn test_engine_off_frames_not_aggregated() {
        let (mut recorder, mut rx) = recorder();
        recorder.process(&fast(0, 0, 100, 5), 1_000);
        recorder.process(&fast(0, 0, 110, 5), 2_000);
        assert!(rx.try_recv().is_err());
        assert_eq!(recorder.record.elapsed_ms(), 0);
    }

    #[test]
    fn test_engine_start_flushes_and_seeds() {
        let (mut recorder, mut rx) = recorder();
        recorder.process(&fast(6400, 0, 100, 5), 1_000);
        // transition flushes the (empty) record first
        let row = next_row(&mut rx);
        assert!(!row.worth_saving());

        // the transition frame is aggregated after the flush and computes
        // no delta against the seeded baseline
        recorder.process(&fast(6400, 0, 200, 5), 2_000);
        assert_eq!(recorder.record.dist, 1_000);
    }

    #[test]
    fn test_engine_stop_flushes_record() {
        let (mut recorder, mut rx) = recorder();
        recorder.process(&fast(6400, 1_000, 100, 5), 1_000);
        next_row(&mut rx);
        recorder.process(&fast(6400, 1_000, 300, 5), 5_000);
        recorder.process(&fast(0, 0, 300, 5), 9_000);

        let row = next_row(&mut rx);
        assert_eq!(row.start_time, 1_000);
        assert_eq!(row.end_time, 5_000);
        assert_eq!(row.dist, 2_000);
        assert!(row.worth_saving());

        // stopped engine frames are not aggregated
        assert_eq!(recorder.record.elapsed_ms(), 0);
    }

    #[test]
    fn test_time_ceiling_flushes_record() {
        let (mut recorder, mut rx) = recorder();
        recorder.process(&fast(6400, 1_000, 0, 0), 0);
        next_row(&mut rx);

        let mut now = 0;
        let mut tick = 0;
        while now < MAX_RECORD_MS {
            now += 10_000;
            tick += 100;
            recorder.process(&fast(6400, 1_000, tick, 0), now);
        }

        let row = next_row(&mut rx);
        assert_eq!(row.end_time.saturating_sub(row.start_time), MAX_RECORD_MS);
        // the engine is still running; aggregation continues in a new record
        recorder.process(&fast(6400, 1_000, tick + 100, 0), now + 10_000);
        assert_eq!(recorder.record.dist, 1_000);
    }

    #[test]
    fn test_counter_continuity_across_stop_start() {
        let (mut recorder, mut rx) = recorder();
        recorder.process(&fast(6400, 0, 100, 5), 1_000);
        next_row(&mut rx);
        recorder.process(&fast(6400, 0, 200, 6), 2_000);
        // stop: flush, seed with 300/7 readings
        recorder.process(&fast(0, 0, 300, 7), 3_000);
        next_row(&mut rx);
        // start again: flush empty record, seed with 350/8
        recorder.process(&fast(6400, 0, 350, 8), 10_000);
        next_row(&mut rx);
        // delta relative to the 350/8 baseline
        recorder.process(&fast(6400, 0, 400, 9), 11_000);
        assert_eq!(recorder.record.dist, 500);
        assert_eq!(recorder.record.fuel, 80);
    }

    #[test]
    fn test_non_fast_frames_ignored_while_engine_off() {
        let (mut recorder, mut rx) = recorder();
        let slow = Frame::Slow {
            state_sev: 0,
            state_gen: 0,
            state_gmp: 0,
            coolant_temp: 60,
            total_mileage: 10_000,
            outside_temp: 0,
        };
        recorder.process(&slow, 1_000);
        assert!(rx.try_recv().is_err());
        assert!(!recorder.record.coolant_temp.is_initialized());

        // once running, the same frame is folded in
        recorder.process(&fast(6400, 0, 0, 0), 2_000);
        recorder.process(&slow, 3_000);
        assert!(recorder.record.coolant_temp.is_initialized());
    }
}
