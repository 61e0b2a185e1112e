// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object headers and range specifiers.
//!
//! Every object block in an APDU starts with a three-octet header followed
//! by a range whose encoding depends on the qualifier:
//!
//! ```text
//! +-------+-----------+-----------+------------------+
//! | group | variation | qualifier | range (0..8 B)   |
//! +-------+-----------+-----------+------------------+
//! ```
//!
//! | Qualifier | Range | Octets |
//! |-----------|-------|--------|
//! | 0x00/0x01/0x02 | start-stop, 8/16/32-bit | 2/4/8 |
//! | 0x03/0x04/0x05 | absolute address, 8/16/32-bit | 1/2/4 |
//! | 0x06 | all objects (no range) | 0 |
//! | 0x07/0x08/0x09 | count, 8/16/32-bit | 1/2/4 |
//! | 0x5B | free format, 8-bit count | 1 |
//!
//! Modeling the range as a sum type makes every encoder and decoder match
//! exhaustively; an unlisted qualifier cannot slip through as a half-parsed
//! header.

use super::ObjectError;

/// Range qualifier octet values.
pub mod qualifier {
    /// 8-bit start and stop indexes.
    pub const START_STOP_8: u8 = 0x00;
    /// 16-bit start and stop indexes.
    pub const START_STOP_16: u8 = 0x01;
    /// 32-bit start and stop indexes.
    pub const START_STOP_32: u8 = 0x02;
    /// 8-bit absolute address.
    pub const ADDRESS_8: u8 = 0x03;
    /// 16-bit absolute address.
    pub const ADDRESS_16: u8 = 0x04;
    /// 32-bit absolute address.
    pub const ADDRESS_32: u8 = 0x05;
    /// All objects of the group/variation.
    pub const ALL_OBJECTS: u8 = 0x06;
    /// 8-bit object count.
    pub const COUNT_8: u8 = 0x07;
    /// 16-bit object count.
    pub const COUNT_16: u8 = 0x08;
    /// 32-bit object count.
    pub const COUNT_32: u8 = 0x09;
    /// Free-format objects, 8-bit count.
    pub const FREE_FORMAT: u8 = 0x5B;
}

/// Decoded range specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Range {
    /// Qualifier 0x06: every object of the group/variation.
    None,
    /// Qualifiers 0x00..=0x02: inclusive index range.
    StartStop {
        /// First point index.
        start: u32,
        /// Last point index (inclusive, `>= start`).
        stop: u32,
    },
    /// Qualifiers 0x07..=0x09: plain object count.
    Count {
        /// Number of objects following the header (`> 0`).
        count: u32,
    },
    /// Qualifiers 0x03..=0x05: one absolute address.
    Address {
        /// Absolute object address.
        address: u32,
    },
    /// Qualifier 0x5B: handler-defined free-format objects.
    FreeFormat {
        /// Number of free-format objects.
        count: u8,
    },
}

impl Range {
    /// Number of objects this range selects (0 for free-format/none).
    #[must_use]
    pub fn object_count(&self) -> usize {
        match self {
            Self::None | Self::FreeFormat { .. } => 0,
            Self::StartStop { start, stop } => (*stop - *start) as usize + 1,
            Self::Count { count } => *count as usize,
            Self::Address { .. } => 1,
        }
    }

    /// Index of the first selected point, where the range carries one.
    #[must_use]
    pub fn start_index(&self) -> Option<u32> {
        match self {
            Self::StartStop { start, .. } => Some(*start),
            Self::Address { address } => Some(*address),
            _ => None,
        }
    }
}

/// A parsed object header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Object group.
    pub group: u8,
    /// Object variation.
    pub variation: u8,
    /// Raw qualifier octet.
    pub qualifier: u8,
    /// Decoded range.
    pub range: Range,
}

impl ObjectHeader {
    /// Header selecting all objects of a group/variation (qualifier 0x06).
    #[must_use]
    pub fn all_objects(group: u8, variation: u8) -> Self {
        Self {
            group,
            variation,
            qualifier: qualifier::ALL_OBJECTS,
            range: Range::None,
        }
    }

    /// Header with an 8-bit start-stop range (qualifier 0x00).
    #[must_use]
    pub fn start_stop_8(group: u8, variation: u8, start: u8, stop: u8) -> Self {
        Self {
            group,
            variation,
            qualifier: qualifier::START_STOP_8,
            range: Range::StartStop {
                start: u32::from(start),
                stop: u32::from(stop),
            },
        }
    }

    /// Header with a 16-bit start-stop range (qualifier 0x01).
    #[must_use]
    pub fn start_stop_16(group: u8, variation: u8, start: u16, stop: u16) -> Self {
        Self {
            group,
            variation,
            qualifier: qualifier::START_STOP_16,
            range: Range::StartStop {
                start: u32::from(start),
                stop: u32::from(stop),
            },
        }
    }

    /// Header with an 8-bit count (qualifier 0x07).
    #[must_use]
    pub fn count_8(group: u8, variation: u8, count: u8) -> Self {
        Self {
            group,
            variation,
            qualifier: qualifier::COUNT_8,
            range: Range::Count {
                count: u32::from(count),
            },
        }
    }

    /// Header with a 16-bit count (qualifier 0x08).
    #[must_use]
    pub fn count_16(group: u8, variation: u8, count: u16) -> Self {
        Self {
            group,
            variation,
            qualifier: qualifier::COUNT_16,
            range: Range::Count {
                count: u32::from(count),
            },
        }
    }

    /// Parse one header from the front of `buf`.
    ///
    /// # Returns
    ///
    /// The header and the number of octets consumed.
    ///
    /// # Errors
    ///
    /// - `TooShort` when the buffer ends inside the header or range
    /// - `UnsupportedQualifier` for a qualifier outside the recognized set
    /// - `InvalidRange` for `stop < start` or a zero count
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), ObjectError> {
        if buf.len() < 3 {
            return Err(ObjectError::TooShort);
        }
        let group = buf[0];
        let variation = buf[1];
        let qual = buf[2];
        let rest = &buf[3..];

        let (range, range_len) = match qual {
            qualifier::START_STOP_8 => {
                let b = take::<2>(rest)?;
                (
                    Range::StartStop {
                        start: u32::from(b[0]),
                        stop: u32::from(b[1]),
                    },
                    2,
                )
            }
            qualifier::START_STOP_16 => {
                let b = take::<4>(rest)?;
                (
                    Range::StartStop {
                        start: u32::from(u16::from_le_bytes([b[0], b[1]])),
                        stop: u32::from(u16::from_le_bytes([b[2], b[3]])),
                    },
                    4,
                )
            }
            qualifier::START_STOP_32 => {
                let b = take::<8>(rest)?;
                (
                    Range::StartStop {
                        start: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
                        stop: u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
                    },
                    8,
                )
            }
            qualifier::ADDRESS_8 => {
                let b = take::<1>(rest)?;
                (
                    Range::Address {
                        address: u32::from(b[0]),
                    },
                    1,
                )
            }
            qualifier::ADDRESS_16 => {
                let b = take::<2>(rest)?;
                (
                    Range::Address {
                        address: u32::from(u16::from_le_bytes([b[0], b[1]])),
                    },
                    2,
                )
            }
            qualifier::ADDRESS_32 => {
                let b = take::<4>(rest)?;
                (
                    Range::Address {
                        address: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
                    },
                    4,
                )
            }
            qualifier::ALL_OBJECTS => (Range::None, 0),
            qualifier::COUNT_8 => {
                let b = take::<1>(rest)?;
                (
                    Range::Count {
                        count: u32::from(b[0]),
                    },
                    1,
                )
            }
            qualifier::COUNT_16 => {
                let b = take::<2>(rest)?;
                (
                    Range::Count {
                        count: u32::from(u16::from_le_bytes([b[0], b[1]])),
                    },
                    2,
                )
            }
            qualifier::COUNT_32 => {
                let b = take::<4>(rest)?;
                (
                    Range::Count {
                        count: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
                    },
                    4,
                )
            }
            qualifier::FREE_FORMAT => {
                let b = take::<1>(rest)?;
                (Range::FreeFormat { count: b[0] }, 1)
            }
            other => return Err(ObjectError::UnsupportedQualifier(other)),
        };

        match range {
            Range::StartStop { start, stop } if stop < start => {
                return Err(ObjectError::InvalidRange);
            }
            Range::Count { count } if count == 0 => {
                return Err(ObjectError::InvalidRange);
            }
            _ => {}
        }

        Ok((
            Self {
                group,
                variation,
                qualifier: qual,
                range,
            },
            3 + range_len,
        ))
    }

    /// Append the wire encoding to `out`.
    ///
    /// # Errors
    ///
    /// `InvalidRange` when the range does not fit the qualifier's width.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), ObjectError> {
        out.push(self.group);
        out.push(self.variation);
        out.push(self.qualifier);

        match (self.qualifier, self.range) {
            (qualifier::START_STOP_8, Range::StartStop { start, stop }) => {
                let (start, stop) = (narrow::<u8>(start)?, narrow::<u8>(stop)?);
                out.push(start);
                out.push(stop);
            }
            (qualifier::START_STOP_16, Range::StartStop { start, stop }) => {
                let (start, stop) = (narrow::<u16>(start)?, narrow::<u16>(stop)?);
                out.extend_from_slice(&start.to_le_bytes());
                out.extend_from_slice(&stop.to_le_bytes());
            }
            (qualifier::START_STOP_32, Range::StartStop { start, stop }) => {
                out.extend_from_slice(&start.to_le_bytes());
                out.extend_from_slice(&stop.to_le_bytes());
            }
            (qualifier::ADDRESS_8, Range::Address { address }) => {
                out.push(narrow::<u8>(address)?);
            }
            (qualifier::ADDRESS_16, Range::Address { address }) => {
                out.extend_from_slice(&narrow::<u16>(address)?.to_le_bytes());
            }
            (qualifier::ADDRESS_32, Range::Address { address }) => {
                out.extend_from_slice(&address.to_le_bytes());
            }
            (qualifier::ALL_OBJECTS, Range::None) => {}
            (qualifier::COUNT_8, Range::Count { count }) => {
                out.push(narrow::<u8>(count)?);
            }
            (qualifier::COUNT_16, Range::Count { count }) => {
                out.extend_from_slice(&narrow::<u16>(count)?.to_le_bytes());
            }
            (qualifier::COUNT_32, Range::Count { count }) => {
                out.extend_from_slice(&count.to_le_bytes());
            }
            (qualifier::FREE_FORMAT, Range::FreeFormat { count }) => {
                out.push(count);
            }
            _ => return Err(ObjectError::InvalidRange),
        }
        Ok(())
    }
}

/// First `N` octets of `buf`, or `TooShort`.
fn take<const N: usize>(buf: &[u8]) -> Result<[u8; N], ObjectError> {
    if buf.len() < N {
        return Err(ObjectError::TooShort);
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[..N]);
    Ok(out)
}

/// Narrow a u32 range field to the qualifier's width.
fn narrow<T: TryFrom<u32>>(value: u32) -> Result<T, ObjectError> {
    T::try_from(value).map_err(|_| ObjectError::InvalidRange)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(header: ObjectHeader) -> ObjectHeader {
        let mut wire = Vec::new();
        header.encode(&mut wire).expect("encode");
        let (parsed, consumed) = ObjectHeader::parse(&wire).expect("parse");
        assert_eq!(consumed, wire.len());
        parsed
    }

    #[test]
    fn test_all_objects_roundtrip() {
        let header = ObjectHeader::all_objects(60, 1);
        assert_eq!(roundtrip(header), header);

        let mut wire = Vec::new();
        header.encode(&mut wire).expect("encode");
        assert_eq!(wire, [0x3C, 0x01, 0x06]);
    }

    #[test]
    fn test_start_stop_roundtrips() {
        let h8 = ObjectHeader::start_stop_8(1, 2, 0, 9);
        assert_eq!(roundtrip(h8), h8);

        let h16 = ObjectHeader::start_stop_16(30, 1, 256, 1000);
        assert_eq!(roundtrip(h16), h16);

        let h32 = ObjectHeader {
            group: 20,
            variation: 1,
            qualifier: qualifier::START_STOP_32,
            range: Range::StartStop {
                start: 70_000,
                stop: 70_010,
            },
        };
        assert_eq!(roundtrip(h32), h32);
    }

    #[test]
    fn test_count_roundtrips() {
        let h8 = ObjectHeader::count_8(12, 1, 3);
        assert_eq!(roundtrip(h8), h8);

        let h16 = ObjectHeader::count_16(2, 1, 700);
        assert_eq!(roundtrip(h16), h16);

        let h32 = ObjectHeader {
            group: 32,
            variation: 3,
            qualifier: qualifier::COUNT_32,
            range: Range::Count { count: 100_000 },
        };
        assert_eq!(roundtrip(h32), h32);
    }

    #[test]
    fn test_address_roundtrips() {
        for (qual, address) in [
            (qualifier::ADDRESS_8, 200u32),
            (qualifier::ADDRESS_16, 40_000),
            (qualifier::ADDRESS_32, 1_000_000),
        ] {
            let header = ObjectHeader {
                group: 41,
                variation: 2,
                qualifier: qual,
                range: Range::Address { address },
            };
            assert_eq!(roundtrip(header), header);
        }
    }

    #[test]
    fn test_free_format_roundtrip() {
        let header = ObjectHeader {
            group: 70,
            variation: 3,
            qualifier: qualifier::FREE_FORMAT,
            range: Range::FreeFormat { count: 1 },
        };
        assert_eq!(roundtrip(header), header);
    }

    #[test]
    fn test_unsupported_qualifier() {
        assert_eq!(
            ObjectHeader::parse(&[1, 2, 0x17, 0, 0]),
            Err(ObjectError::UnsupportedQualifier(0x17))
        );
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        // stop < start
        assert_eq!(
            ObjectHeader::parse(&[1, 2, 0x00, 5, 4]),
            Err(ObjectError::InvalidRange)
        );
        // zero count
        assert_eq!(
            ObjectHeader::parse(&[1, 2, 0x07, 0]),
            Err(ObjectError::InvalidRange)
        );
    }

    #[test]
    fn test_truncated_header_and_range() {
        assert_eq!(ObjectHeader::parse(&[1, 2]), Err(ObjectError::TooShort));
        assert_eq!(ObjectHeader::parse(&[1, 2, 0x01, 0, 0]), Err(ObjectError::TooShort));
        assert_eq!(ObjectHeader::parse(&[1, 2, 0x08, 1]), Err(ObjectError::TooShort));
    }

    #[test]
    fn test_object_count() {
        assert_eq!(
            ObjectHeader::start_stop_8(1, 2, 3, 7).range.object_count(),
            5
        );
        assert_eq!(ObjectHeader::count_16(2, 1, 9).range.object_count(), 9);
        assert_eq!(ObjectHeader::all_objects(60, 2).range.object_count(), 0);
        assert_eq!(
            Range::Address { address: 12 }.object_count(),
            1
        );
    }

    #[test]
    fn test_encode_rejects_overflow() {
        let header = ObjectHeader {
            group: 1,
            variation: 2,
            qualifier: qualifier::START_STOP_8,
            range: Range::StartStop {
                start: 0,
                stop: 300,
            },
        };
        let mut out = Vec::new();
        assert_eq!(header.encode(&mut out), Err(ObjectError::InvalidRange));
    }
}
