// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Response object dispatch.
//!
//! Walks the object data of a response fragment header by header, decodes
//! the fixed-size objects of known groups into typed batches, and hands
//! them to the [`ReadHandler`]. Unknown groups with a known size are
//! skipped; an unknown size ends dispatch for the fragment (logged, not an
//! error, since everything before it was already delivered).

use crate::app::header::ObjectHeader;
use crate::app::objects::{
    self, decode_analog_event, decode_analog_input, decode_analog_output_status,
    decode_binary_event, decode_binary_input, decode_binary_output_status, decode_counter,
    decode_counter_event, decode_double_bit_input, decode_frozen_counter, object_size,
};
use crate::app::ObjectError;

use super::handler::{HeaderInfo, ReadHandler};

/// Decode a batch of `count` objects with a per-object decoder and deliver.
fn dispatch_batch<T>(
    data: &[u8],
    count: usize,
    size: usize,
    start: u32,
    decode: impl Fn(&[u8]) -> Result<T, ObjectError>,
    deliver: impl FnOnce(&[(u16, T)]),
) -> Result<(), ObjectError> {
    let mut values = Vec::with_capacity(count);
    for i in 0..count {
        let object = &data[i * size..(i + 1) * size];
        values.push(((start as u16) + i as u16, decode(object)?));
    }
    deliver(&values);
    Ok(())
}

/// Walk `objects` and deliver every decoded batch to `handler`.
///
/// # Errors
///
/// `TooShort` / `InvalidRange` / `UnsupportedQualifier` on malformed
/// headers or truncated object data.
pub fn dispatch_objects(objects: &[u8], handler: &dyn ReadHandler) -> Result<(), ObjectError> {
    let mut rest = objects;
    while !rest.is_empty() {
        let (header, consumed) = ObjectHeader::parse(rest)?;
        rest = &rest[consumed..];

        let count = header.range.object_count();
        let start = header.range.start_index().unwrap_or(0);
        if count == 0 {
            // Class headers and empty ranges carry no object data.
            continue;
        }

        let size = object_size(header.group, header.variation);
        if size == 0 {
            log::info!(
                "[MASTER] no codec for g{}v{}, dispatch stops for this fragment",
                header.group,
                header.variation
            );
            return Ok(());
        }
        if rest.len() < size * count {
            return Err(ObjectError::TooShort);
        }
        let data = &rest[..size * count];
        rest = &rest[size * count..];

        let info = HeaderInfo {
            group: header.group,
            variation: header.variation,
            qualifier: header.qualifier,
        };
        let variation = header.variation;
        match header.group {
            objects::GROUP_BINARY => dispatch_batch(
                data,
                count,
                size,
                start,
                |b| decode_binary_input(variation, b),
                |v| handler.process_binary(&info, v),
            )?,
            objects::GROUP_BINARY_EVENT => dispatch_batch(
                data,
                count,
                size,
                start,
                |b| decode_binary_event(variation, b),
                |v| handler.process_binary(&info, v),
            )?,
            objects::GROUP_DOUBLE_BIT => dispatch_batch(
                data,
                count,
                size,
                start,
                |b| decode_double_bit_input(variation, b),
                |v| handler.process_double_bit(&info, v),
            )?,
            objects::GROUP_BINARY_OUTPUT_STATUS => dispatch_batch(
                data,
                count,
                size,
                start,
                |b| decode_binary_output_status(variation, b),
                |v| handler.process_binary_output_status(&info, v),
            )?,
            objects::GROUP_COUNTER => dispatch_batch(
                data,
                count,
                size,
                start,
                |b| decode_counter(variation, b),
                |v| handler.process_counter(&info, v),
            )?,
            objects::GROUP_FROZEN_COUNTER => dispatch_batch(
                data,
                count,
                size,
                start,
                |b| decode_frozen_counter(variation, b),
                |v| handler.process_frozen_counter(&info, v),
            )?,
            objects::GROUP_COUNTER_EVENT => dispatch_batch(
                data,
                count,
                size,
                start,
                |b| decode_counter_event(variation, b),
                |v| handler.process_counter(&info, v),
            )?,
            objects::GROUP_ANALOG => dispatch_batch(
                data,
                count,
                size,
                start,
                |b| decode_analog_input(variation, b),
                |v| handler.process_analog(&info, v),
            )?,
            objects::GROUP_ANALOG_EVENT => dispatch_batch(
                data,
                count,
                size,
                start,
                |b| decode_analog_event(variation, b),
                |v| handler.process_analog(&info, v),
            )?,
            objects::GROUP_ANALOG_OUTPUT_STATUS => dispatch_batch(
                data,
                count,
                size,
                start,
                |b| decode_analog_output_status(variation, b),
                |v| handler.process_analog_output_status(&info, v),
            )?,
            other => {
                // Known size, unknown semantics: already skipped above.
                log::debug!("[MASTER] skipping {} objects of g{}", count, other);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::measurement::{flags, Analog, Binary};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording {
        binaries: Mutex<Vec<(u16, Binary)>>,
        analogs: Mutex<Vec<(u16, Analog)>>,
        headers: Mutex<Vec<HeaderInfo>>,
    }

    impl ReadHandler for Recording {
        fn process_binary(&self, info: &HeaderInfo, values: &[(u16, Binary)]) {
            self.headers.lock().push(*info);
            self.binaries.lock().extend_from_slice(values);
        }

        fn process_analog(&self, info: &HeaderInfo, values: &[(u16, Analog)]) {
            self.headers.lock().push(*info);
            self.analogs.lock().extend_from_slice(values);
        }
    }

    #[test]
    fn test_dispatch_binary_start_stop() {
        // g1v2, qualifier 0x00, start 2 stop 4, three flag octets
        let objects = vec![0x01, 0x02, 0x00, 0x02, 0x04, 0x81, 0x01, 0x81];
        let handler = Recording::default();
        dispatch_objects(&objects, &handler).expect("dispatch");

        let binaries = handler.binaries.lock();
        assert_eq!(binaries.len(), 3);
        assert_eq!(binaries[0].0, 2);
        assert!(binaries[0].1.value);
        assert_eq!(binaries[1].0, 3);
        assert!(!binaries[1].1.value);
        assert_eq!(binaries[2].0, 4);

        let headers = handler.headers.lock();
        assert_eq!(headers.len(), 1);
        assert_eq!((headers[0].group, headers[0].variation), (1, 2));
    }

    #[test]
    fn test_dispatch_analog_and_binary_mixed() {
        let mut objects = vec![0x01, 0x02, 0x00, 0x00, 0x00, 0x81];
        // g30v2: flags + i16, two objects, start 5
        objects.extend_from_slice(&[0x1E, 0x02, 0x00, 0x05, 0x06]);
        objects.extend_from_slice(&[flags::ONLINE, 0x34, 0x12]);
        objects.extend_from_slice(&[flags::ONLINE, 0xFF, 0xFF]);

        let handler = Recording::default();
        dispatch_objects(&objects, &handler).expect("dispatch");

        assert_eq!(handler.binaries.lock().len(), 1);
        let analogs = handler.analogs.lock();
        assert_eq!(analogs.len(), 2);
        assert_eq!(analogs[0], (5, Analog { value: f64::from(0x1234i16), flags: flags::ONLINE, time: Default::default() }));
        assert_eq!(analogs[1].0, 6);
        assert_eq!(analogs[1].1.value, -1.0);
    }

    #[test]
    fn test_class_headers_are_skipped() {
        // g60v1..v4, all-objects qualifier: no object data
        let objects = vec![0x3C, 0x01, 0x06, 0x3C, 0x02, 0x06, 0x3C, 0x03, 0x06, 0x3C, 0x04, 0x06];
        let handler = Recording::default();
        dispatch_objects(&objects, &handler).expect("dispatch");
        assert!(handler.binaries.lock().is_empty());
        assert!(handler.analogs.lock().is_empty());
    }

    #[test]
    fn test_unknown_group_with_size_skipped() {
        // g50v1 (time, 6 octets, no process_* callback) then a binary
        let mut objects = vec![0x32, 0x01, 0x07, 0x01];
        objects.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        objects.extend_from_slice(&[0x01, 0x02, 0x00, 0x00, 0x00, 0x81]);

        let handler = Recording::default();
        dispatch_objects(&objects, &handler).expect("dispatch");
        assert_eq!(handler.binaries.lock().len(), 1);
    }

    #[test]
    fn test_unknown_size_stops_dispatch_cleanly() {
        // A group with no codec and a count: dispatch ends, no error
        let mut objects = vec![0x01, 0x02, 0x00, 0x00, 0x00, 0x81];
        objects.extend_from_slice(&[0x63, 0x01, 0x07, 0x02, 0xAA, 0xBB]);

        let handler = Recording::default();
        dispatch_objects(&objects, &handler).expect("no error");
        assert_eq!(handler.binaries.lock().len(), 1, "prior data was delivered");
    }

    #[test]
    fn test_truncated_object_data_is_error() {
        let objects = vec![0x01, 0x02, 0x00, 0x00, 0x02, 0x81]; // promises 3, has 1
        let handler = Recording::default();
        assert_eq!(
            dispatch_objects(&objects, &handler),
            Err(ObjectError::TooShort)
        );
    }

    #[test]
    fn test_malformed_header_is_error() {
        let handler = Recording::default();
        assert_eq!(
            dispatch_objects(&[0x01, 0x02, 0x55], &handler),
            Err(ObjectError::UnsupportedQualifier(0x55))
        );
    }
}
