// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-size wire encodings by (group, variation).
//!
//! All multi-octet fields are little-endian. [`object_size`] is the oracle
//! the dispatchers use to walk unknown object data: a return of 0 means the
//! encoding is variable (packed bits, class headers) or unknown.
//!
//! | Group | Contents | Variations |
//! |-------|----------|------------|
//! | 1 | binary input | 2 (flags) |
//! | 2 | binary input event | 1 (flags), 2 (+abs time), 3 (+rel time) |
//! | 3 | double-bit input | 2 (flags) |
//! | 10 | binary output status | 2 (flags) |
//! | 12 | CROB | 1 |
//! | 20 | counter | 1, 2, 5, 6 |
//! | 21 | frozen counter | 1, 2 |
//! | 22 | counter event | 1, 2, 5, 6 |
//! | 30 | analog input | 1..6 |
//! | 32 | analog input event | 1, 2, 3 |
//! | 40 | analog output status | 1..4 |
//! | 41 | analog output command | 1..4 |
//! | 50 | absolute time | 1 |
//! | 60 | class data | 1..4 (header only) |
//! | 80 | internal indications | 1 (packed bits) |

use super::measurement::{
    flags, Analog, AnalogOutput, AnalogOutputStatus, Binary, BinaryOutputStatus, CommandStatus,
    Counter, Crob, DnpTime, DoubleBit, DoubleBitBinary, FrozenCounter,
};
use super::ObjectError;

/// Binary input (static).
pub const GROUP_BINARY: u8 = 1;
/// Binary input change events.
pub const GROUP_BINARY_EVENT: u8 = 2;
/// Double-bit binary input (static).
pub const GROUP_DOUBLE_BIT: u8 = 3;
/// Binary output status.
pub const GROUP_BINARY_OUTPUT_STATUS: u8 = 10;
/// Control relay output block.
pub const GROUP_CROB: u8 = 12;
/// Running counters (static).
pub const GROUP_COUNTER: u8 = 20;
/// Frozen counters.
pub const GROUP_FROZEN_COUNTER: u8 = 21;
/// Counter change events.
pub const GROUP_COUNTER_EVENT: u8 = 22;
/// Analog inputs (static).
pub const GROUP_ANALOG: u8 = 30;
/// Analog input change events.
pub const GROUP_ANALOG_EVENT: u8 = 32;
/// Analog output status.
pub const GROUP_ANALOG_OUTPUT_STATUS: u8 = 40;
/// Analog output command.
pub const GROUP_ANALOG_OUTPUT: u8 = 41;
/// Absolute time.
pub const GROUP_TIME: u8 = 50;
/// Class data (read requests).
pub const GROUP_CLASS: u8 = 60;
/// Internal indications (write requests).
pub const GROUP_IIN: u8 = 80;

/// Fixed per-object octet count for a group/variation; 0 means variable or
/// unknown.
#[must_use]
pub fn object_size(group: u8, variation: u8) -> usize {
    match (group, variation) {
        (GROUP_BINARY | GROUP_DOUBLE_BIT | GROUP_BINARY_OUTPUT_STATUS, 2) => 1,
        (GROUP_BINARY_EVENT, 1) => 1,
        (GROUP_BINARY_EVENT, 2) => 7,
        (GROUP_BINARY_EVENT, 3) => 3,
        (GROUP_CROB, 1) => 11,
        (GROUP_COUNTER | GROUP_FROZEN_COUNTER | GROUP_COUNTER_EVENT, 1) => 5,
        (GROUP_COUNTER | GROUP_FROZEN_COUNTER | GROUP_COUNTER_EVENT, 2) => 3,
        (GROUP_COUNTER, 5) => 4,
        (GROUP_COUNTER, 6) => 2,
        (GROUP_COUNTER_EVENT, 5) => 11,
        (GROUP_COUNTER_EVENT, 6) => 9,
        (GROUP_ANALOG | GROUP_ANALOG_EVENT, 1) => 5,
        (GROUP_ANALOG | GROUP_ANALOG_EVENT, 2) => 3,
        (GROUP_ANALOG, 3) => 4,
        (GROUP_ANALOG, 4) => 2,
        (GROUP_ANALOG, 5) => 5,
        (GROUP_ANALOG, 6) => 9,
        (GROUP_ANALOG_EVENT, 3) => 11,
        (GROUP_ANALOG_OUTPUT_STATUS | GROUP_ANALOG_OUTPUT, 1 | 3) => 5,
        (GROUP_ANALOG_OUTPUT_STATUS | GROUP_ANALOG_OUTPUT, 2) => 3,
        (GROUP_ANALOG_OUTPUT_STATUS | GROUP_ANALOG_OUTPUT, 4) => 9,
        (GROUP_TIME, 1) => 6,
        _ => 0,
    }
}

#[inline]
fn flags_with_state(quality: u8, state: bool) -> u8 {
    let base = quality & !flags::STATE;
    if state {
        base | flags::STATE
    } else {
        base
    }
}

fn take(buf: &[u8], len: usize) -> Result<&[u8], ObjectError> {
    if buf.len() < len {
        return Err(ObjectError::TooShort);
    }
    Ok(&buf[..len])
}

fn read_u16(buf: &[u8]) -> u16 {
    u16::from_le_bytes([buf[0], buf[1]])
}

fn read_u32(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}

fn read_time(buf: &[u8]) -> DnpTime {
    let mut b = [0u8; 6];
    b.copy_from_slice(&buf[..6]);
    DnpTime::decode(&b)
}

// ============================================================================
// Binary (groups 1, 2, 10)
// ============================================================================

/// Encode a group 1 static binary input.
pub fn encode_binary_input(
    variation: u8,
    m: &Binary,
    out: &mut Vec<u8>,
) -> Result<(), ObjectError> {
    match variation {
        2 => {
            out.push(flags_with_state(m.flags, m.value));
            Ok(())
        }
        _ => Err(ObjectError::UnknownObject(GROUP_BINARY, variation)),
    }
}

/// Decode a group 1 static binary input.
pub fn decode_binary_input(variation: u8, buf: &[u8]) -> Result<Binary, ObjectError> {
    match variation {
        2 => {
            let b = take(buf, 1)?;
            Ok(Binary {
                value: b[0] & flags::STATE != 0,
                flags: b[0] & !flags::STATE,
                time: DnpTime::default(),
            })
        }
        _ => Err(ObjectError::UnknownObject(GROUP_BINARY, variation)),
    }
}

/// Encode a group 2 binary input event.
pub fn encode_binary_event(
    variation: u8,
    m: &Binary,
    out: &mut Vec<u8>,
) -> Result<(), ObjectError> {
    let state_flags = flags_with_state(m.flags, m.value);
    match variation {
        1 => out.push(state_flags),
        2 => {
            out.push(state_flags);
            out.extend_from_slice(&m.time.encode());
        }
        3 => {
            out.push(state_flags);
            // Relative time: low 16 bits of the event time; the common time
            // of occurrence object is the receiver's concern.
            out.extend_from_slice(&(m.time.millis() as u16).to_le_bytes());
        }
        _ => return Err(ObjectError::UnknownObject(GROUP_BINARY_EVENT, variation)),
    }
    Ok(())
}

/// Decode a group 2 binary input event.
pub fn decode_binary_event(variation: u8, buf: &[u8]) -> Result<Binary, ObjectError> {
    match variation {
        1 => {
            let b = take(buf, 1)?;
            Ok(Binary {
                value: b[0] & flags::STATE != 0,
                flags: b[0] & !flags::STATE,
                time: DnpTime::default(),
            })
        }
        2 => {
            let b = take(buf, 7)?;
            Ok(Binary {
                value: b[0] & flags::STATE != 0,
                flags: b[0] & !flags::STATE,
                time: read_time(&b[1..]),
            })
        }
        3 => {
            let b = take(buf, 3)?;
            Ok(Binary {
                value: b[0] & flags::STATE != 0,
                flags: b[0] & !flags::STATE,
                time: DnpTime::from_millis(u64::from(read_u16(&b[1..]))),
            })
        }
        _ => Err(ObjectError::UnknownObject(GROUP_BINARY_EVENT, variation)),
    }
}

/// Encode a group 3 double-bit binary input.
pub fn encode_double_bit_input(
    variation: u8,
    m: &DoubleBitBinary,
    out: &mut Vec<u8>,
) -> Result<(), ObjectError> {
    match variation {
        2 => {
            let b = (m.flags & !flags::DOUBLE_STATE_MASK) | (m.value.to_bits() << 6);
            out.push(b);
            Ok(())
        }
        _ => Err(ObjectError::UnknownObject(GROUP_DOUBLE_BIT, variation)),
    }
}

/// Decode a group 3 double-bit binary input.
pub fn decode_double_bit_input(
    variation: u8,
    buf: &[u8],
) -> Result<DoubleBitBinary, ObjectError> {
    match variation {
        2 => {
            let b = take(buf, 1)?;
            Ok(DoubleBitBinary {
                value: DoubleBit::from_bits(b[0] >> 6),
                flags: b[0] & !flags::DOUBLE_STATE_MASK,
                time: DnpTime::default(),
            })
        }
        _ => Err(ObjectError::UnknownObject(GROUP_DOUBLE_BIT, variation)),
    }
}

/// Encode a group 10 binary output status.
pub fn encode_binary_output_status(
    variation: u8,
    m: &BinaryOutputStatus,
    out: &mut Vec<u8>,
) -> Result<(), ObjectError> {
    match variation {
        2 => {
            out.push(flags_with_state(m.flags, m.value));
            Ok(())
        }
        _ => Err(ObjectError::UnknownObject(
            GROUP_BINARY_OUTPUT_STATUS,
            variation,
        )),
    }
}

/// Decode a group 10 binary output status.
pub fn decode_binary_output_status(
    variation: u8,
    buf: &[u8],
) -> Result<BinaryOutputStatus, ObjectError> {
    match variation {
        2 => {
            let b = take(buf, 1)?;
            Ok(BinaryOutputStatus {
                value: b[0] & flags::STATE != 0,
                flags: b[0] & !flags::STATE,
                time: DnpTime::default(),
            })
        }
        _ => Err(ObjectError::UnknownObject(
            GROUP_BINARY_OUTPUT_STATUS,
            variation,
        )),
    }
}

// ============================================================================
// CROB (group 12)
// ============================================================================

/// Encode a group 12 variation 1 control relay output block.
pub fn encode_crob(crob: &Crob, out: &mut Vec<u8>) {
    out.push(crob.code);
    out.push(crob.count);
    out.extend_from_slice(&crob.on_time_ms.to_le_bytes());
    out.extend_from_slice(&crob.off_time_ms.to_le_bytes());
    out.push(crob.status.as_u8());
}

/// Decode a group 12 variation 1 control relay output block.
pub fn decode_crob(buf: &[u8]) -> Result<Crob, ObjectError> {
    let b = take(buf, 11)?;
    Ok(Crob {
        code: b[0],
        count: b[1],
        on_time_ms: read_u32(&b[2..]),
        off_time_ms: read_u32(&b[6..]),
        status: CommandStatus::from_u8(b[10]),
    })
}

// ============================================================================
// Counters (groups 20, 21, 22)
// ============================================================================

fn encode_counter_value(
    group: u8,
    variation: u8,
    value: u32,
    quality: u8,
    time: DnpTime,
    out: &mut Vec<u8>,
) -> Result<(), ObjectError> {
    match variation {
        1 => {
            out.push(quality);
            out.extend_from_slice(&value.to_le_bytes());
        }
        2 => {
            out.push(quality);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        5 if group == GROUP_COUNTER => {
            out.extend_from_slice(&value.to_le_bytes());
        }
        6 if group == GROUP_COUNTER => {
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        5 if group == GROUP_COUNTER_EVENT => {
            out.push(quality);
            out.extend_from_slice(&value.to_le_bytes());
            out.extend_from_slice(&time.encode());
        }
        6 if group == GROUP_COUNTER_EVENT => {
            out.push(quality);
            out.extend_from_slice(&(value as u16).to_le_bytes());
            out.extend_from_slice(&time.encode());
        }
        _ => return Err(ObjectError::UnknownObject(group, variation)),
    }
    Ok(())
}

fn decode_counter_value(
    group: u8,
    variation: u8,
    buf: &[u8],
) -> Result<(u32, u8, DnpTime), ObjectError> {
    match variation {
        1 => {
            let b = take(buf, 5)?;
            Ok((read_u32(&b[1..]), b[0], DnpTime::default()))
        }
        2 => {
            let b = take(buf, 3)?;
            Ok((u32::from(read_u16(&b[1..])), b[0], DnpTime::default()))
        }
        5 if group == GROUP_COUNTER => {
            let b = take(buf, 4)?;
            Ok((read_u32(b), flags::ONLINE, DnpTime::default()))
        }
        6 if group == GROUP_COUNTER => {
            let b = take(buf, 2)?;
            Ok((u32::from(read_u16(b)), flags::ONLINE, DnpTime::default()))
        }
        5 if group == GROUP_COUNTER_EVENT => {
            let b = take(buf, 11)?;
            Ok((read_u32(&b[1..]), b[0], read_time(&b[5..])))
        }
        6 if group == GROUP_COUNTER_EVENT => {
            let b = take(buf, 9)?;
            Ok((u32::from(read_u16(&b[1..])), b[0], read_time(&b[3..])))
        }
        _ => Err(ObjectError::UnknownObject(group, variation)),
    }
}

/// Encode a group 20 counter.
pub fn encode_counter(variation: u8, m: &Counter, out: &mut Vec<u8>) -> Result<(), ObjectError> {
    encode_counter_value(GROUP_COUNTER, variation, m.value, m.flags, m.time, out)
}

/// Decode a group 20 counter.
pub fn decode_counter(variation: u8, buf: &[u8]) -> Result<Counter, ObjectError> {
    let (value, quality, time) = decode_counter_value(GROUP_COUNTER, variation, buf)?;
    Ok(Counter {
        value,
        flags: quality,
        time,
    })
}

/// Encode a group 21 frozen counter (variations 1 and 2).
pub fn encode_frozen_counter(
    variation: u8,
    m: &FrozenCounter,
    out: &mut Vec<u8>,
) -> Result<(), ObjectError> {
    match variation {
        1 | 2 => encode_counter_value(GROUP_FROZEN_COUNTER, variation, m.value, m.flags, m.time, out),
        _ => Err(ObjectError::UnknownObject(GROUP_FROZEN_COUNTER, variation)),
    }
}

/// Decode a group 21 frozen counter.
pub fn decode_frozen_counter(variation: u8, buf: &[u8]) -> Result<FrozenCounter, ObjectError> {
    match variation {
        1 | 2 => {
            let (value, quality, time) = decode_counter_value(GROUP_FROZEN_COUNTER, variation, buf)?;
            Ok(FrozenCounter {
                value,
                flags: quality,
                time,
            })
        }
        _ => Err(ObjectError::UnknownObject(GROUP_FROZEN_COUNTER, variation)),
    }
}

/// Encode a group 22 counter event.
pub fn encode_counter_event(
    variation: u8,
    m: &Counter,
    out: &mut Vec<u8>,
) -> Result<(), ObjectError> {
    encode_counter_value(GROUP_COUNTER_EVENT, variation, m.value, m.flags, m.time, out)
}

/// Decode a group 22 counter event.
pub fn decode_counter_event(variation: u8, buf: &[u8]) -> Result<Counter, ObjectError> {
    let (value, quality, time) = decode_counter_value(GROUP_COUNTER_EVENT, variation, buf)?;
    Ok(Counter {
        value,
        flags: quality,
        time,
    })
}

// ============================================================================
// Analog (groups 30, 32, 40, 41)
// ============================================================================

/// Encode a group 30 analog input.
pub fn encode_analog_input(
    variation: u8,
    m: &Analog,
    out: &mut Vec<u8>,
) -> Result<(), ObjectError> {
    match variation {
        1 => {
            out.push(m.flags);
            out.extend_from_slice(&(m.value as i32).to_le_bytes());
        }
        2 => {
            out.push(m.flags);
            out.extend_from_slice(&(m.value as i16).to_le_bytes());
        }
        3 => out.extend_from_slice(&(m.value as i32).to_le_bytes()),
        4 => out.extend_from_slice(&(m.value as i16).to_le_bytes()),
        5 => {
            out.push(m.flags);
            out.extend_from_slice(&(m.value as f32).to_le_bytes());
        }
        6 => {
            out.push(m.flags);
            out.extend_from_slice(&m.value.to_le_bytes());
        }
        _ => return Err(ObjectError::UnknownObject(GROUP_ANALOG, variation)),
    }
    Ok(())
}

/// Decode a group 30 analog input.
pub fn decode_analog_input(variation: u8, buf: &[u8]) -> Result<Analog, ObjectError> {
    let (value, quality) = match variation {
        1 => {
            let b = take(buf, 5)?;
            (f64::from(read_u32(&b[1..]) as i32), b[0])
        }
        2 => {
            let b = take(buf, 3)?;
            (f64::from(read_u16(&b[1..]) as i16), b[0])
        }
        3 => {
            let b = take(buf, 4)?;
            (f64::from(read_u32(b) as i32), flags::ONLINE)
        }
        4 => {
            let b = take(buf, 2)?;
            (f64::from(read_u16(b) as i16), flags::ONLINE)
        }
        5 => {
            let b = take(buf, 5)?;
            (f64::from(f32::from_le_bytes([b[1], b[2], b[3], b[4]])), b[0])
        }
        6 => {
            let b = take(buf, 9)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&b[1..9]);
            (f64::from_le_bytes(raw), b[0])
        }
        _ => return Err(ObjectError::UnknownObject(GROUP_ANALOG, variation)),
    };
    Ok(Analog {
        value,
        flags: quality,
        time: DnpTime::default(),
    })
}

/// Encode a group 32 analog input event.
pub fn encode_analog_event(
    variation: u8,
    m: &Analog,
    out: &mut Vec<u8>,
) -> Result<(), ObjectError> {
    match variation {
        1 => {
            out.push(m.flags);
            out.extend_from_slice(&(m.value as i32).to_le_bytes());
        }
        2 => {
            out.push(m.flags);
            out.extend_from_slice(&(m.value as i16).to_le_bytes());
        }
        3 => {
            out.push(m.flags);
            out.extend_from_slice(&(m.value as i32).to_le_bytes());
            out.extend_from_slice(&m.time.encode());
        }
        _ => return Err(ObjectError::UnknownObject(GROUP_ANALOG_EVENT, variation)),
    }
    Ok(())
}

/// Decode a group 32 analog input event.
pub fn decode_analog_event(variation: u8, buf: &[u8]) -> Result<Analog, ObjectError> {
    match variation {
        1 => {
            let b = take(buf, 5)?;
            Ok(Analog {
                value: f64::from(read_u32(&b[1..]) as i32),
                flags: b[0],
                time: DnpTime::default(),
            })
        }
        2 => {
            let b = take(buf, 3)?;
            Ok(Analog {
                value: f64::from(read_u16(&b[1..]) as i16),
                flags: b[0],
                time: DnpTime::default(),
            })
        }
        3 => {
            let b = take(buf, 11)?;
            Ok(Analog {
                value: f64::from(read_u32(&b[1..]) as i32),
                flags: b[0],
                time: read_time(&b[5..]),
            })
        }
        _ => Err(ObjectError::UnknownObject(GROUP_ANALOG_EVENT, variation)),
    }
}

/// Encode a group 40 analog output status.
pub fn encode_analog_output_status(
    variation: u8,
    m: &AnalogOutputStatus,
    out: &mut Vec<u8>,
) -> Result<(), ObjectError> {
    match variation {
        1 => {
            out.push(m.flags);
            out.extend_from_slice(&(m.value as i32).to_le_bytes());
        }
        2 => {
            out.push(m.flags);
            out.extend_from_slice(&(m.value as i16).to_le_bytes());
        }
        3 => {
            out.push(m.flags);
            out.extend_from_slice(&(m.value as f32).to_le_bytes());
        }
        4 => {
            out.push(m.flags);
            out.extend_from_slice(&m.value.to_le_bytes());
        }
        _ => {
            return Err(ObjectError::UnknownObject(
                GROUP_ANALOG_OUTPUT_STATUS,
                variation,
            ))
        }
    }
    Ok(())
}

/// Decode a group 40 analog output status.
pub fn decode_analog_output_status(
    variation: u8,
    buf: &[u8],
) -> Result<AnalogOutputStatus, ObjectError> {
    let (value, quality) = match variation {
        1 => {
            let b = take(buf, 5)?;
            (f64::from(read_u32(&b[1..]) as i32), b[0])
        }
        2 => {
            let b = take(buf, 3)?;
            (f64::from(read_u16(&b[1..]) as i16), b[0])
        }
        3 => {
            let b = take(buf, 5)?;
            (f64::from(f32::from_le_bytes([b[1], b[2], b[3], b[4]])), b[0])
        }
        4 => {
            let b = take(buf, 9)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&b[1..9]);
            (f64::from_le_bytes(raw), b[0])
        }
        _ => {
            return Err(ObjectError::UnknownObject(
                GROUP_ANALOG_OUTPUT_STATUS,
                variation,
            ))
        }
    };
    Ok(AnalogOutputStatus {
        value,
        flags: quality,
        time: DnpTime::default(),
    })
}

/// Encode a group 41 analog output command.
pub fn encode_analog_output(
    variation: u8,
    cmd: &AnalogOutput,
    out: &mut Vec<u8>,
) -> Result<(), ObjectError> {
    match variation {
        1 => out.extend_from_slice(&(cmd.value as i32).to_le_bytes()),
        2 => out.extend_from_slice(&(cmd.value as i16).to_le_bytes()),
        3 => out.extend_from_slice(&(cmd.value as f32).to_le_bytes()),
        4 => out.extend_from_slice(&cmd.value.to_le_bytes()),
        _ => return Err(ObjectError::UnknownObject(GROUP_ANALOG_OUTPUT, variation)),
    }
    out.push(cmd.status.as_u8());
    Ok(())
}

/// Decode a group 41 analog output command.
pub fn decode_analog_output(variation: u8, buf: &[u8]) -> Result<AnalogOutput, ObjectError> {
    let (value, status) = match variation {
        1 => {
            let b = take(buf, 5)?;
            (f64::from(read_u32(b) as i32), b[4])
        }
        2 => {
            let b = take(buf, 3)?;
            (f64::from(read_u16(b) as i16), b[2])
        }
        3 => {
            let b = take(buf, 5)?;
            (f64::from(f32::from_le_bytes([b[0], b[1], b[2], b[3]])), b[4])
        }
        4 => {
            let b = take(buf, 9)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&b[..8]);
            (f64::from_le_bytes(raw), b[8])
        }
        _ => return Err(ObjectError::UnknownObject(GROUP_ANALOG_OUTPUT, variation)),
    };
    Ok(AnalogOutput {
        value,
        status: CommandStatus::from_u8(status),
    })
}

// ============================================================================
// Time (group 50)
// ============================================================================

/// Encode a group 50 variation 1 absolute time.
pub fn encode_time(time: DnpTime, out: &mut Vec<u8>) {
    out.extend_from_slice(&time.encode());
}

/// Decode a group 50 variation 1 absolute time.
pub fn decode_time(buf: &[u8]) -> Result<DnpTime, ObjectError> {
    let b = take(buf, 6)?;
    Ok(read_time(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_size_table() {
        assert_eq!(object_size(1, 2), 1);
        assert_eq!(object_size(2, 1), 1);
        assert_eq!(object_size(2, 2), 7);
        assert_eq!(object_size(2, 3), 3);
        assert_eq!(object_size(3, 2), 1);
        assert_eq!(object_size(10, 2), 1);
        assert_eq!(object_size(12, 1), 11);
        assert_eq!(object_size(20, 1), 5);
        assert_eq!(object_size(20, 2), 3);
        assert_eq!(object_size(20, 5), 4);
        assert_eq!(object_size(20, 6), 2);
        assert_eq!(object_size(22, 5), 11);
        assert_eq!(object_size(22, 6), 9);
        assert_eq!(object_size(30, 1), 5);
        assert_eq!(object_size(30, 4), 2);
        assert_eq!(object_size(30, 5), 5);
        assert_eq!(object_size(30, 6), 9);
        assert_eq!(object_size(32, 3), 11);
        assert_eq!(object_size(40, 4), 9);
        assert_eq!(object_size(41, 1), 5);
        assert_eq!(object_size(50, 1), 6);

        // Variable or header-only encodings
        assert_eq!(object_size(1, 1), 0);
        assert_eq!(object_size(60, 1), 0);
        assert_eq!(object_size(60, 4), 0);
        assert_eq!(object_size(80, 1), 0);
        assert_eq!(object_size(99, 1), 0);
    }

    #[test]
    fn test_binary_input_g1v2() {
        let m = Binary {
            value: true,
            flags: flags::ONLINE,
            time: DnpTime::default(),
        };
        let mut out = Vec::new();
        encode_binary_input(2, &m, &mut out).expect("encode");
        assert_eq!(out, [0x81]);

        let decoded = decode_binary_input(2, &out).expect("decode");
        assert!(decoded.value);
        assert_eq!(decoded.flags, flags::ONLINE);
    }

    #[test]
    fn test_binary_event_with_time() {
        let m = Binary {
            value: false,
            flags: flags::ONLINE | flags::CHATTER_FILTER,
            time: DnpTime::from_millis(0x0102_0304_0506),
        };
        let mut out = Vec::new();
        encode_binary_event(2, &m, &mut out).expect("encode");
        assert_eq!(out.len(), 7);
        assert_eq!(out[0], flags::ONLINE | flags::CHATTER_FILTER);
        assert_eq!(&out[1..], &[0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);

        let decoded = decode_binary_event(2, &out).expect("decode");
        assert_eq!(decoded, m);
    }

    #[test]
    fn test_double_bit_g3v2() {
        let m = DoubleBitBinary {
            value: DoubleBit::DeterminedOn,
            flags: flags::ONLINE,
            time: DnpTime::default(),
        };
        let mut out = Vec::new();
        encode_double_bit_input(2, &m, &mut out).expect("encode");
        assert_eq!(out, [0x81]); // state 2 in bits 6..7 plus online

        let decoded = decode_double_bit_input(2, &out).expect("decode");
        assert_eq!(decoded.value, DoubleBit::DeterminedOn);
    }

    #[test]
    fn test_crob_roundtrip() {
        let crob = Crob {
            code: 0x03,
            count: 1,
            on_time_ms: 1000,
            off_time_ms: 500,
            status: CommandStatus::Success,
        };
        let mut out = Vec::new();
        encode_crob(&crob, &mut out);
        assert_eq!(out.len(), 11);
        assert_eq!(out[0], 0x03);
        assert_eq!(out[1], 1);
        assert_eq!(&out[2..6], &1000u32.to_le_bytes());
        assert_eq!(&out[6..10], &500u32.to_le_bytes());
        assert_eq!(out[10], 0);

        assert_eq!(decode_crob(&out).expect("decode"), crob);
        assert_eq!(decode_crob(&out[..10]), Err(ObjectError::TooShort));
    }

    #[test]
    fn test_counter_variations() {
        let m = Counter {
            value: 0x01020304,
            flags: flags::ONLINE,
            time: DnpTime::default(),
        };

        let mut v1 = Vec::new();
        encode_counter(1, &m, &mut v1).expect("v1");
        assert_eq!(v1, [0x01, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(decode_counter(1, &v1).expect("decode").value, 0x01020304);

        let mut v2 = Vec::new();
        encode_counter(2, &m, &mut v2).expect("v2");
        assert_eq!(v2, [0x01, 0x04, 0x03]); // low 16 bits
        assert_eq!(decode_counter(2, &v2).expect("decode").value, 0x0304);

        let mut v5 = Vec::new();
        encode_counter(5, &m, &mut v5).expect("v5");
        assert_eq!(v5, [0x04, 0x03, 0x02, 0x01]);

        let mut v6 = Vec::new();
        encode_counter(6, &m, &mut v6).expect("v6");
        assert_eq!(v6.len(), 2);
    }

    #[test]
    fn test_counter_event_with_time() {
        let m = Counter {
            value: 42,
            flags: flags::ONLINE,
            time: DnpTime::from_millis(1000),
        };
        let mut out = Vec::new();
        encode_counter_event(5, &m, &mut out).expect("encode");
        assert_eq!(out.len(), 11);

        let decoded = decode_counter_event(5, &out).expect("decode");
        assert_eq!(decoded, m);
    }

    #[test]
    fn test_analog_variations_roundtrip() {
        let m = Analog {
            value: -1234.0,
            flags: flags::ONLINE,
            time: DnpTime::default(),
        };

        for variation in 1..=6u8 {
            let mut out = Vec::new();
            encode_analog_input(variation, &m, &mut out).expect("encode");
            assert_eq!(out.len(), object_size(GROUP_ANALOG, variation));

            let decoded = decode_analog_input(variation, &out).expect("decode");
            assert_eq!(decoded.value, -1234.0, "variation {}", variation);
        }
    }

    #[test]
    fn test_analog_event_g32v3_layout() {
        let m = Analog {
            value: 7.0,
            flags: flags::ONLINE,
            time: DnpTime::from_millis(0xAABBCC),
        };
        let mut out = Vec::new();
        encode_analog_event(3, &m, &mut out).expect("encode");
        assert_eq!(out.len(), 11);
        assert_eq!(out[0], flags::ONLINE);
        assert_eq!(&out[1..5], &7i32.to_le_bytes());

        let decoded = decode_analog_event(3, &out).expect("decode");
        assert_eq!(decoded, m);
    }

    #[test]
    fn test_analog_output_command_roundtrip() {
        let cmd = AnalogOutput::new(-55.0);
        for variation in 1..=4u8 {
            let mut out = Vec::new();
            encode_analog_output(variation, &cmd, &mut out).expect("encode");
            assert_eq!(out.len(), object_size(GROUP_ANALOG_OUTPUT, variation));

            let decoded = decode_analog_output(variation, &out).expect("decode");
            assert_eq!(decoded.value, -55.0);
            assert_eq!(decoded.status, CommandStatus::Success);
        }
    }

    #[test]
    fn test_analog_output_status_roundtrip() {
        let m = AnalogOutputStatus {
            value: 99.5,
            flags: flags::ONLINE,
            time: DnpTime::default(),
        };
        for variation in [3u8, 4] {
            let mut out = Vec::new();
            encode_analog_output_status(variation, &m, &mut out).expect("encode");
            let decoded = decode_analog_output_status(variation, &out).expect("decode");
            assert_eq!(decoded.value, 99.5, "variation {}", variation);
        }

        // Integer variations truncate
        let mut out = Vec::new();
        encode_analog_output_status(1, &m, &mut out).expect("encode");
        assert_eq!(decode_analog_output_status(1, &out).expect("decode").value, 99.0);
    }

    #[test]
    fn test_time_roundtrip() {
        let t = DnpTime::from_millis(1_600_000_000_000);
        let mut out = Vec::new();
        encode_time(t, &mut out);
        assert_eq!(out.len(), 6);
        assert_eq!(decode_time(&out).expect("decode"), t);
        assert_eq!(decode_time(&out[..5]), Err(ObjectError::TooShort));
    }

    #[test]
    fn test_unknown_variations_rejected() {
        let b = Binary::default();
        let mut out = Vec::new();
        assert_eq!(
            encode_binary_input(7, &b, &mut out),
            Err(ObjectError::UnknownObject(1, 7))
        );
        assert_eq!(
            decode_counter(9, &[0u8; 8]),
            Err(ObjectError::UnknownObject(20, 9))
        );
        assert_eq!(
            decode_analog_event(4, &[0u8; 8]),
            Err(ObjectError::UnknownObject(32, 4))
        );
    }

    #[test]
    fn test_truncated_buffers_rejected() {
        assert_eq!(decode_binary_input(2, &[]), Err(ObjectError::TooShort));
        assert_eq!(decode_binary_event(2, &[0x81, 0, 0]), Err(ObjectError::TooShort));
        assert_eq!(decode_analog_input(6, &[0u8; 8]), Err(ObjectError::TooShort));
        assert_eq!(decode_counter_event(5, &[0u8; 10]), Err(ObjectError::TooShort));
    }
}
