//! CAN frame decoding for the BSI telemetry set
//!
//! Seven identifiers from the vehicle's comfort bus are understood; anything
//! else decodes to `None` and is ignored upstream. Variants carry raw integer
//! fields with the physical resolution documented per field; scaling happens
//! where the value is consumed.

/// Bus command state (economy mode, power level, network state).
pub const FRAME_BSI_COMMAND: u32 = 0x036;
/// High-rate telemetry: engine speed, vehicle speed, distance/fuel ticks.
pub const FRAME_BSI_FAST: u32 = 0x0B6;
/// Low-rate telemetry: temperatures and total mileage.
pub const FRAME_BSI_SLOW: u32 = 0x0F6;
/// Oil temperature and fuel/oil levels.
pub const FRAME_TEMP_LEVEL: u32 = 0x161;
/// Instantaneous fuel consumption, remaining range, route distance.
pub const FRAME_TRIP_GENERAL: u32 = 0x221;
/// Trip computer, first memory slot.
pub const FRAME_TRIP_DATA_1: u32 = 0x2A1;
/// Trip computer, second memory slot.
pub const FRAME_TRIP_DATA_2: u32 = 0x261;

/// One raw frame off the bus: identifier plus up to 8 payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame {
    pub id: u32,
    pub data: [u8; 8],
}

/// Bus network state, 3-bit field in the command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    Waking,
    Normal,
    Standby,
    Waking2,
    ComOff,
    Reserved(u8),
}

impl NetworkState {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0b000 => NetworkState::Waking,
            0b001 => NetworkState::Normal,
            0b010 => NetworkState::Standby,
            0b011 => NetworkState::Waking2,
            0b100 => NetworkState::ComOff,
            other => NetworkState::Reserved(other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkState::Waking => "waking",
            NetworkState::Normal => "normal",
            NetworkState::Standby => "standby",
            NetworkState::Waking2 => "waking2",
            NetworkState::ComOff => "com_off",
            NetworkState::Reserved(_) => "reserved",
        }
    }
}

/// Trip computer snapshot carried by both trip-data identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TripData {
    /// Average speed (km/h)
    pub speed: u8,
    /// Total distance (km)
    pub total_dist: u16,
    /// Average fuel consumption (0.1 l/100 km)
    pub fuel_cons: u16,
    /// Total time (min)
    pub total_time: u16,
}

impl TripData {
    fn decode(d: &[u8; 8]) -> Self {
        Self {
            speed: d[0],
            total_dist: u16::from_be_bytes([d[1], d[2]]),
            fuel_cons: u16::from_be_bytes([d[3], d[4]]),
            total_time: u16::from_be_bytes([d[5], d[6]]),
        }
    }
}

/// A decoded telemetry message, one per recognized raw frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    Command {
        economy_mode: bool,
        power_level: u8,
        network_state: NetworkState,
    },
    Fast {
        /// Resolution: 0.125 RPM
        engine_speed: u16,
        /// Resolution: 0.01 km/h
        vehicle_speed: u16,
        /// Distance tick, resolution: 0.1 m
        dist: u16,
        /// Fuel tick, resolution: 80 mm³
        fuel: u8,
    },
    Slow {
        state_sev: u8,
        state_gen: u8,
        state_gmp: u8,
        /// Resolution: 1 °C (offset already applied)
        coolant_temp: i16,
        /// Resolution: 0.1 km
        total_mileage: u32,
        /// Resolution: 0.5 °C (offset already applied)
        outside_temp: i16,
    },
    TempLevel {
        /// Resolution: 1 °C (offset already applied)
        oil_temp: i16,
        /// Resolution: 1 %
        fuel_level: u8,
        /// Resolution: 1 %; 0xFF means unknown
        oil_level: u8,
    },
    TripGeneral {
        invalid_cons: bool,
        invalid_range: bool,
        /// Resolution: 0.1 l/100 km
        fuel_cons: u16,
        /// Resolution: 1 km
        fuel_range: u16,
        /// Resolution: 0.1 km
        route_dist: u16,
    },
    TripData1(TripData),
    TripData2(TripData),
}

impl Frame {
    /// Decode a raw frame into a typed message.
    ///
    /// Returns `None` for unrecognized identifiers; decoding a recognized
    /// identifier never fails (only the sentinel normalizations apply).
    pub fn decode(raw: &RawFrame) -> Option<Frame> {
        let d = &raw.data;
        let frame = match raw.id {
            FRAME_BSI_COMMAND => Frame::Command {
                economy_mode: d[2] & 0x80 != 0,
                power_level: d[2] & 0b1111,
                network_state: NetworkState::from_bits(d[4] & 0b111),
            },
            FRAME_BSI_FAST => Frame::Fast {
                engine_speed: u16::from_be_bytes([d[0], d[1]]),
                vehicle_speed: u16::from_be_bytes([d[2], d[3]]),
                dist: u16::from_be_bytes([d[4], d[5]]),
                fuel: d[6],
            },
            FRAME_BSI_SLOW => Frame::Slow {
                state_sev: (d[0] >> 3) & 0b11,
                state_gen: (d[0] >> 2) & 0b1,
                state_gmp: d[0] & 0b11,
                coolant_temp: i16::from(d[1]) - 40,
                total_mileage: u32::from_be_bytes([0, d[2], d[3], d[4]]),
                outside_temp: i16::from(d[6]) - 80,
            },
            FRAME_TEMP_LEVEL => Frame::TempLevel {
                oil_temp: i16::from(d[2]) - 40,
                fuel_level: d[3],
                // 0xFB and above signal an unavailable reading
                oil_level: if d[6] < 0xFB { d[6] } else { 0xFF },
            },
            FRAME_TRIP_GENERAL => {
                let fuel_cons = u16::from_be_bytes([d[1], d[2]]);
                Frame::TripGeneral {
                    invalid_cons: d[0] & 0x80 != 0 || fuel_cons == 0xFFFF,
                    invalid_range: d[0] & 0x40 != 0,
                    fuel_cons,
                    fuel_range: u16::from_be_bytes([d[3], d[4]]),
                    route_dist: u16::from_be_bytes([d[5], d[6]]),
                }
            }
            FRAME_TRIP_DATA_1 => Frame::TripData1(TripData::decode(d)),
            FRAME_TRIP_DATA_2 => Frame::TripData2(TripData::decode(d)),
            _ => return None,
        };
        Some(frame)
    }
}
