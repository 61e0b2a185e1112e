// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed measurement and command values.
//!
//! These are the in-memory forms of the wire objects: each carries the
//! value, the quality flags octet, and the event timestamp. The per-group
//! serializers live in [`crate::app::objects`].

use std::time::{SystemTime, UNIX_EPOCH};

/// Quality flag bits shared by the measurement types.
///
/// Bit 7 doubles as the state bit of single-bit binary objects; double-bit
/// objects use bits 6..7 for their state.
pub mod flags {
    /// The point is online and the value current.
    pub const ONLINE: u8 = 0x01;
    /// The source device restarted.
    pub const RESTART: u8 = 0x02;
    /// Communication with the source was lost.
    pub const COMM_LOST: u8 = 0x04;
    /// Value forced at a remote device.
    pub const REMOTE_FORCED: u8 = 0x08;
    /// Value forced at the outstation.
    pub const LOCAL_FORCED: u8 = 0x10;
    /// Binary input chatter filter active.
    pub const CHATTER_FILTER: u8 = 0x20;
    /// Analog value outside its range.
    pub const OVER_RANGE: u8 = 0x20;
    /// Analog reference check failed.
    pub const REFERENCE_ERR: u8 = 0x40;
    /// Binary state bit (group 1/2/10 single-octet forms).
    pub const STATE: u8 = 0x80;
    /// Double-bit state field mask (bits 6..7).
    pub const DOUBLE_STATE_MASK: u8 = 0xC0;
}

/// DNP3 absolute time: milliseconds since the Unix epoch, carried in 48 bits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DnpTime(u64);

impl DnpTime {
    /// Largest value representable in 48 bits.
    pub const MAX_MILLIS: u64 = (1 << 48) - 1;

    /// From milliseconds since the Unix epoch (truncated to 48 bits).
    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        Self(millis & Self::MAX_MILLIS)
    }

    /// Current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self::from_millis(millis)
    }

    /// Milliseconds since the Unix epoch.
    #[inline]
    #[must_use]
    pub fn millis(self) -> u64 {
        self.0
    }

    /// Shift by a signed millisecond offset, saturating at the 48-bit range.
    #[must_use]
    pub fn offset_by(self, offset_ms: i64) -> Self {
        let shifted = self.0 as i64 + offset_ms;
        Self::from_millis(shifted.clamp(0, Self::MAX_MILLIS as i64) as u64)
    }

    /// Encode as 6 octets, little-endian.
    #[must_use]
    pub fn encode(self) -> [u8; 6] {
        let bytes = self.0.to_le_bytes();
        [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]]
    }

    /// Decode from 6 octets, little-endian.
    #[must_use]
    pub fn decode(bytes: &[u8; 6]) -> Self {
        let mut full = [0u8; 8];
        full[..6].copy_from_slice(bytes);
        Self(u64::from_le_bytes(full))
    }
}

/// Double-bit binary state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoubleBit {
    /// Transitioning between states.
    Intermediate,
    /// Determined off.
    DeterminedOff,
    /// Determined on.
    DeterminedOn,
    /// Abnormal or unknown.
    Indeterminate,
}

impl DoubleBit {
    /// Decode from the two state bits (0..=3).
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Intermediate,
            1 => Self::DeterminedOff,
            2 => Self::DeterminedOn,
            _ => Self::Indeterminate,
        }
    }

    /// Encode to the two state bits.
    #[must_use]
    pub fn to_bits(self) -> u8 {
        match self {
            Self::Intermediate => 0,
            Self::DeterminedOff => 1,
            Self::DeterminedOn => 2,
            Self::Indeterminate => 3,
        }
    }
}

/// Binary input.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Binary {
    /// Current state.
    pub value: bool,
    /// Quality flags (state bit excluded).
    pub flags: u8,
    /// Time of the last change.
    pub time: DnpTime,
}

/// Double-bit binary input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoubleBitBinary {
    /// Current state.
    pub value: DoubleBit,
    /// Quality flags (state bits excluded).
    pub flags: u8,
    /// Time of the last change.
    pub time: DnpTime,
}

impl Default for DoubleBitBinary {
    fn default() -> Self {
        Self {
            value: DoubleBit::Indeterminate,
            flags: 0,
            time: DnpTime::default(),
        }
    }
}

/// Analog input.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Analog {
    /// Current value.
    pub value: f64,
    /// Quality flags.
    pub flags: u8,
    /// Time of the last change.
    pub time: DnpTime,
}

/// Running counter.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Counter {
    /// Current count.
    pub value: u32,
    /// Quality flags.
    pub flags: u8,
    /// Time of the last change.
    pub time: DnpTime,
}

/// Frozen counter snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FrozenCounter {
    /// Count at freeze time.
    pub value: u32,
    /// Quality flags.
    pub flags: u8,
    /// Time of the freeze.
    pub time: DnpTime,
}

/// Binary output status.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct BinaryOutputStatus {
    /// Current output state.
    pub value: bool,
    /// Quality flags (state bit excluded).
    pub flags: u8,
    /// Time of the last change.
    pub time: DnpTime,
}

/// Analog output status.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct AnalogOutputStatus {
    /// Current output value.
    pub value: f64,
    /// Quality flags.
    pub flags: u8,
    /// Time of the last change.
    pub time: DnpTime,
}

/// The measurement point types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointType {
    /// Group 1 / group 2 events.
    Binary,
    /// Group 3 / group 4 events.
    DoubleBitBinary,
    /// Group 30 / group 32 events.
    Analog,
    /// Group 20 / group 22 events.
    Counter,
    /// Group 21.
    FrozenCounter,
    /// Group 10.
    BinaryOutputStatus,
    /// Group 40.
    AnalogOutputStatus,
}

/// A typed measurement, as delivered to handlers and kept in event buffers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    /// Binary input value.
    Binary(Binary),
    /// Double-bit binary input value.
    DoubleBitBinary(DoubleBitBinary),
    /// Analog input value.
    Analog(Analog),
    /// Counter value.
    Counter(Counter),
    /// Frozen counter value.
    FrozenCounter(FrozenCounter),
    /// Binary output status value.
    BinaryOutputStatus(BinaryOutputStatus),
    /// Analog output status value.
    AnalogOutputStatus(AnalogOutputStatus),
}

impl Measurement {
    /// The point type of this value.
    #[must_use]
    pub fn point_type(&self) -> PointType {
        match self {
            Self::Binary(_) => PointType::Binary,
            Self::DoubleBitBinary(_) => PointType::DoubleBitBinary,
            Self::Analog(_) => PointType::Analog,
            Self::Counter(_) => PointType::Counter,
            Self::FrozenCounter(_) => PointType::FrozenCounter,
            Self::BinaryOutputStatus(_) => PointType::BinaryOutputStatus,
            Self::AnalogOutputStatus(_) => PointType::AnalogOutputStatus,
        }
    }
}

/// Per-command status code, echoed in command responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Accepted / executed.
    Success,
    /// The operate arrived after the select window closed.
    Timeout,
    /// Operate without a matching select.
    NoSelect,
    /// Malformed command object.
    FormatError,
    /// The point does not support this command.
    NotSupported,
    /// A command is already executing on the point.
    AlreadyActive,
    /// Hardware problem.
    HardwareError,
    /// The point is under local control.
    Local,
    /// Too many objects in one request.
    TooManyObjs,
    /// Not authorized.
    NotAuthorized,
    /// Any other status octet.
    Unknown(u8),
}

impl CommandStatus {
    /// Decode from the wire octet.
    #[must_use]
    pub fn from_u8(byte: u8) -> Self {
        match byte {
            0 => Self::Success,
            1 => Self::Timeout,
            2 => Self::NoSelect,
            3 => Self::FormatError,
            4 => Self::NotSupported,
            5 => Self::AlreadyActive,
            6 => Self::HardwareError,
            7 => Self::Local,
            8 => Self::TooManyObjs,
            9 => Self::NotAuthorized,
            other => Self::Unknown(other),
        }
    }

    /// Encode to the wire octet.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Timeout => 1,
            Self::NoSelect => 2,
            Self::FormatError => 3,
            Self::NotSupported => 4,
            Self::AlreadyActive => 5,
            Self::HardwareError => 6,
            Self::Local => 7,
            Self::TooManyObjs => 8,
            Self::NotAuthorized => 9,
            Self::Unknown(other) => other,
        }
    }
}

/// CROB operation codes (low nibble of the control code octet).
pub mod crob_code {
    /// No operation.
    pub const NUL: u8 = 0x00;
    /// Pulse the point on.
    pub const PULSE_ON: u8 = 0x01;
    /// Pulse the point off.
    pub const PULSE_OFF: u8 = 0x02;
    /// Latch the point on.
    pub const LATCH_ON: u8 = 0x03;
    /// Latch the point off.
    pub const LATCH_OFF: u8 = 0x04;
}

/// Control Relay Output Block (group 12 variation 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crob {
    /// Control code (operation type, trip/close, queue bits).
    pub code: u8,
    /// Pulse repetition count.
    pub count: u8,
    /// On time in milliseconds.
    pub on_time_ms: u32,
    /// Off time in milliseconds.
    pub off_time_ms: u32,
    /// Status (zero on requests, echoed with the result on responses).
    pub status: CommandStatus,
}

impl Crob {
    /// A latch-on command with the customary single pulse.
    #[must_use]
    pub fn latch_on() -> Self {
        Self {
            code: crob_code::LATCH_ON,
            count: 1,
            on_time_ms: 0,
            off_time_ms: 0,
            status: CommandStatus::Success,
        }
    }

    /// A latch-off command.
    #[must_use]
    pub fn latch_off() -> Self {
        Self {
            code: crob_code::LATCH_OFF,
            count: 1,
            on_time_ms: 0,
            off_time_ms: 0,
            status: CommandStatus::Success,
        }
    }
}

/// Analog output command value (group 41).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogOutput {
    /// Commanded value.
    pub value: f64,
    /// Status (zero on requests, echoed with the result on responses).
    pub status: CommandStatus,
}

impl AnalogOutput {
    /// Command with a clean status.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self {
            value,
            status: CommandStatus::Success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dnp_time_roundtrip() {
        for millis in [0u64, 1, 0xFFFF, 1_600_000_000_000, DnpTime::MAX_MILLIS] {
            let t = DnpTime::from_millis(millis);
            assert_eq!(DnpTime::decode(&t.encode()), t);
            assert_eq!(t.millis(), millis);
        }
    }

    #[test]
    fn test_dnp_time_truncates_to_48_bits() {
        let t = DnpTime::from_millis(u64::MAX);
        assert_eq!(t.millis(), DnpTime::MAX_MILLIS);
    }

    #[test]
    fn test_dnp_time_encode_little_endian() {
        let t = DnpTime::from_millis(0x0102_0304_0506);
        assert_eq!(t.encode(), [0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_dnp_time_offset_saturates() {
        assert_eq!(DnpTime::from_millis(100).offset_by(-200).millis(), 0);
        assert_eq!(
            DnpTime::from_millis(DnpTime::MAX_MILLIS).offset_by(10).millis(),
            DnpTime::MAX_MILLIS
        );
        assert_eq!(DnpTime::from_millis(100).offset_by(50).millis(), 150);
    }

    #[test]
    fn test_double_bit_roundtrip() {
        for bits in 0..4u8 {
            assert_eq!(DoubleBit::from_bits(bits).to_bits(), bits);
        }
    }

    #[test]
    fn test_command_status_roundtrip() {
        for byte in 0..=10u8 {
            assert_eq!(CommandStatus::from_u8(byte).as_u8(), byte);
        }
        assert_eq!(CommandStatus::from_u8(127), CommandStatus::Unknown(127));
    }

    #[test]
    fn test_measurement_point_type() {
        let m = Measurement::Analog(Analog {
            value: 1.5,
            flags: flags::ONLINE,
            time: DnpTime::default(),
        });
        assert_eq!(m.point_type(), PointType::Analog);
    }
}
