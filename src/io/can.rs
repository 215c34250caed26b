//! SLCAN (serial-line CAN) frame source
//!
//! Protocol:
//! - ASCII commands terminated by CR
//! - "C" closes the channel, "S<n>" selects the bitrate, "O" opens it
//! - Standard data frames: 't' + 3 hex id + 1 hex DLC + 2×DLC hex bytes + CR
//! - 0x07 (bell) signals a rejected command

use crate::domain::epoch_ms;
use crate::domain::frame::RawFrame;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tokio_serial::SerialPortBuilderExt;

const LINE_TERMINATOR: u8 = b'\r';
const BELL: u8 = 0x07;

/// A raw frame stamped with its receive time.
#[derive(Debug, Clone, Copy)]
pub struct FrameEvent {
    pub raw: RawFrame,
    /// Epoch milliseconds at receipt
    pub received_at: u64,
}

/// Map a CAN bitrate to the SLCAN setup command code.
fn bitrate_code(bitrate: u32) -> Option<char> {
    match bitrate {
        10_000 => Some('0'),
        20_000 => Some('1'),
        50_000 => Some('2'),
        100_000 => Some('3'),
        125_000 => Some('4'),
        250_000 => Some('5'),
        500_000 => Some('6'),
        800_000 => Some('7'),
        1_000_000 => Some('8'),
        _ => None,
    }
}

/// Parse one CR-stripped SLCAN line into a raw frame.
///
/// Only standard-id data frames ('t') are of interest; command echoes,
/// remote frames and extended ids yield `None`.
fn parse_frame_line(line: &[u8]) -> Option<RawFrame> {
    if line.len() < 5 || line[0] != b't' {
        return None;
    }
    let id = u32::from_str_radix(std::str::from_utf8(&line[1..4]).ok()?, 16).ok()?;
    let dlc = (line[4] as char).to_digit(16)? as usize;
    if dlc > 8 || line.len() < 5 + dlc * 2 {
        return None;
    }
    let bytes = hex::decode(&line[5..5 + dlc * 2]).ok()?;
    let mut data = [0u8; 8];
    data[..dlc].copy_from_slice(&bytes);
    Some(RawFrame { id, data })
}

pub struct SlcanMonitor {
    device: String,
    baud: u32,
    bitrate: u32,
    event_tx: mpsc::Sender<FrameEvent>,
    /// Persistent read buffer; frames can arrive split across reads.
    read_buffer: Vec<u8>,
}

impl SlcanMonitor {
    pub fn new(device: &str, baud: u32, bitrate: u32, event_tx: mpsc::Sender<FrameEvent>) -> Self {
        Self {
            device: device.to_string(),
            baud,
            bitrate,
            event_tx,
            read_buffer: Vec::with_capacity(256),
        }
    }

    /// Drain complete lines from the read buffer and forward decodable
    /// frames. Returns the number of frames forwarded.
    fn drain_lines(&mut self) -> usize {
        let mut forwarded = 0;
        while let Some(end) = self.read_buffer.iter().position(|&b| b == LINE_TERMINATOR) {
            let line: Vec<u8> = self.read_buffer.drain(..=end).collect();
            let line = &line[..line.len() - 1];
            if line.is_empty() || line == [BELL] {
                continue;
            }
            match parse_frame_line(line) {
                Some(raw) => {
                    let event = FrameEvent { raw, received_at: epoch_ms() };
                    if let Err(e) = self.event_tx.try_send(event) {
                        warn!(error = %e, "frame_channel_full_frame_dropped");
                    } else {
                        forwarded += 1;
                    }
                }
                None => {
                    debug!(len = line.len(), "slcan_line_ignored");
                }
            }
        }
        forwarded
    }

    /// Open the serial port and stream frames until shutdown or a hard
    /// read error. Dropping the monitor closes the event channel, which
    /// terminates the recorder loop.
    pub async fn run(mut self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            device = %self.device,
            baud = %self.baud,
            bitrate = %self.bitrate,
            "slcan_monitor_started"
        );

        let port_result = tokio_serial::new(&self.device, self.baud)
            .timeout(Duration::from_millis(100))
            .open_native_async();

        let mut port = match port_result {
            Ok(p) => {
                info!(device = %self.device, "slcan_port_opened");
                p
            }
            Err(e) => {
                error!(device = %self.device, error = %e, "slcan_port_open_failed");
                return;
            }
        };

        // reset the channel, set the bitrate, open
        let code = match bitrate_code(self.bitrate) {
            Some(c) => c,
            None => {
                warn!(bitrate = %self.bitrate, "slcan_unsupported_bitrate_using_125k");
                '4'
            }
        };
        let setup = format!("C\rS{code}\rO\r");
        if let Err(e) = port.write_all(setup.as_bytes()).await {
            error!(error = %e, "slcan_setup_write_failed");
            return;
        }

        let mut temp_buf = [0u8; 256];
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        let _ = port.write_all(b"C\r").await;
                        info!("slcan_shutdown");
                        return;
                    }
                }
                read = port.read(&mut temp_buf) => {
                    match read {
                        Ok(0) => {
                            warn!("slcan_port_eof");
                            return;
                        }
                        Ok(n) => {
                            self.read_buffer.extend_from_slice(&temp_buf[..n]);
                            self.drain_lines();
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                        Err(e) => {
                            error!(error = %e, "slcan_read_error");
                            return;
                        }
                    }
                }
            }
        }
    }
}
