// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outstation station: database, events, commands, unsolicited reporting.
//!
//! # Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                        Outstation                            |
//! |                                                              |
//! |  receive path (channel pump)       workers                   |
//! |  secondary link -> transport       update applier:           |
//! |    -> APDU parse                     queue -> database       |
//! |    -> READ/WRITE/SELECT/...          -> event buffers        |
//! |    -> build response               unsolicited sender:       |
//! |    -> segment -> link -> wire        drain -> 0x82 -> confirm|
//! +--------------------------------------------------------------+
//! ```
//!
//! Requests are answered synchronously on the receive path; the response
//! echoes the request sequence. Measurement updates flow through a bounded
//! queue into the applier worker, which owns deadband evaluation and event
//! generation.
//!
//! # Modules
//!
//! - `database` - typed point arrays and update batches
//! - `events` - class-partitioned event buffers
//! - `control` - SELECT/OPERATE arbitration and command hooks

pub mod control;
pub mod database;
pub mod events;

pub use control::{ControlHandler, NullControlHandler, SelectArbiter};
pub use database::{
    ChangeEvent, Database, DatabaseConfig, EventClass, EventMode, Point, PointConfig, Update,
};
pub use events::{EventBufferConfig, EventBuffers, EventStats};

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::app::apdu::Apdu;
use crate::app::function::FunctionCode;
use crate::app::header::{ObjectHeader, Range};
use crate::app::iin::{iin1, iin2, Iin};
use crate::app::measurement::{DnpTime, Measurement, PointType};
use crate::app::objects::{
    self, decode_analog_output, decode_crob, decode_time, encode_analog_output,
    encode_analog_output_status, encode_binary_event, encode_binary_input,
    encode_binary_output_status, encode_counter, encode_counter_event, encode_crob,
    encode_double_bit_input, encode_frozen_counter, encode_analog_input, encode_analog_event,
    object_size,
};
use crate::app::measurement::CommandStatus;
use crate::app::sequence::AppSequences;
use crate::app::ObjectError;
use crate::channel::{ChannelError, ChannelWriter, Session, Shutdown};
use crate::link::frame::LinkFrame;
use crate::link::primary::PrimaryLink;
use crate::link::secondary::SecondaryLink;
use crate::link::{LinkConfig, LinkError};
use crate::transport::reassembly::{Reassembler, TransportConfig};
use crate::transport::Segmenter;

/// Outstation configuration.
#[derive(Debug, Clone)]
pub struct OutstationConfig {
    /// Name used in log lines.
    pub id: String,
    /// Local link address.
    pub local_addr: u16,
    /// Master link address.
    pub remote_addr: u16,
    /// SELECT -> OPERATE window.
    pub select_timeout: Duration,
    /// Most command objects accepted in one request.
    pub max_controls_per_request: usize,
    /// Classes reported unsolicited when enabled.
    pub unsol_class1: bool,
    /// Class 2 unsolicited.
    pub unsol_class2: bool,
    /// Class 3 unsolicited.
    pub unsol_class3: bool,
    /// How long the unsolicited sender waits for the master's confirm.
    pub unsol_confirm_timeout: Duration,
    /// Unsolicited retransmissions after the first attempt.
    pub unsol_retries: u32,
    /// Idle period between unsolicited checks.
    pub unsol_poll: Duration,
    /// Event buffer capacities.
    pub event_buffers: EventBufferConfig,
    /// Depth of the update queue feeding the applier worker.
    pub update_queue_depth: usize,
    /// Largest reassembled request fragment accepted.
    pub max_rx_frag: usize,
    /// Largest response fragment transmitted.
    pub max_tx_frag: usize,
}

impl Default for OutstationConfig {
    fn default() -> Self {
        Self {
            id: "outstation".to_string(),
            local_addr: 1024,
            remote_addr: 1,
            select_timeout: Duration::from_secs(5),
            max_controls_per_request: 16,
            unsol_class1: true,
            unsol_class2: true,
            unsol_class3: true,
            unsol_confirm_timeout: Duration::from_secs(5),
            unsol_retries: 3,
            unsol_poll: Duration::from_secs(1),
            event_buffers: EventBufferConfig::default(),
            update_queue_depth: 256,
            max_rx_frag: 2048,
            max_tx_frag: 2048,
        }
    }
}

struct UnsolMask {
    class1: bool,
    class2: bool,
    class3: bool,
}

struct OutstationInner {
    config: OutstationConfig,
    control: Arc<dyn ControlHandler>,
    writer: ChannelWriter,
    database: Mutex<Database>,
    events: Mutex<EventBuffers>,
    primary: Mutex<PrimaryLink>,
    secondary: Mutex<SecondaryLink>,
    reassembler: Mutex<Reassembler>,
    segmenter: Mutex<Segmenter>,
    seqs: Mutex<AppSequences>,
    select: Mutex<SelectArbiter>,
    unsol_mask: Mutex<UnsolMask>,
    confirm_tx: Sender<u8>,
    confirm_rx: Receiver<u8>,
    /// Milliseconds to add to event timestamps (set by a time-sync write).
    time_offset_ms: AtomicI64,
    time_valid: AtomicBool,
    restart_pending: AtomicBool,
    broadcast_seen: AtomicBool,
}

/// The session half of an outstation, registered on a channel router.
pub struct OutstationSession {
    inner: Arc<OutstationInner>,
}

impl Session for OutstationSession {
    fn local_address(&self) -> u16 {
        self.inner.config.local_addr
    }

    fn on_frame(&self, frame: LinkFrame) {
        if frame.control.prm {
            if frame.is_broadcast() {
                self.inner.broadcast_seen.store(true, Ordering::Release);
            }
            let inner = self.inner.clone();
            let mut deliver = |tpdu: &[u8]| inner.on_tpdu(tpdu);
            let disposition = self.inner.secondary.lock().on_frame(&frame, &mut deliver);
            match disposition {
                Ok(disp) => {
                    if disp.user_process_reset {
                        self.inner.reset_user_process();
                    }
                    if let Some(response) = disp.response {
                        if let Ok(wire) = response.serialize() {
                            let _ = self.inner.writer.write(wire);
                        }
                    }
                }
                Err(e) => {
                    log::debug!("[OUTSTATION] {} dropped frame: {}", self.inner.config.id, e);
                }
            }
        } else if let Some(func) = frame.control.secondary_function() {
            let _ = self.inner.link_resp_sender().try_send(func);
        }
    }

    fn on_connection_established(&self) {
        self.inner.reassembler.lock().reset();
    }

    fn on_connection_lost(&self) {
        self.inner.reassembler.lock().reset();
    }
}

impl OutstationInner {
    fn link_resp_sender(&self) -> crossbeam::channel::Sender<crate::link::frame::SecondaryFunction> {
        self.primary.lock().response_sender()
    }

    fn reset_user_process(&self) {
        self.select.lock().clear();
        self.reassembler.lock().reset();
        log::info!("[OUTSTATION] {} user process reset", self.config.id);
    }

    fn on_tpdu(&self, tpdu: &[u8]) -> bool {
        let fragment = match self.reassembler.lock().on_segment(tpdu) {
            Ok(complete) => complete,
            Err(e) => {
                log::warn!("[OUTSTATION] {} reassembly: {}", self.config.id, e);
                return true;
            }
        };
        if let Some(fragment) = fragment {
            self.on_fragment(&fragment);
        }
        true
    }

    fn on_fragment(&self, fragment: &[u8]) {
        let request = match Apdu::parse(fragment) {
            Ok(apdu) => apdu,
            Err(e) => {
                log::warn!("[OUTSTATION] {} bad fragment: {}", self.config.id, e);
                return;
            }
        };

        if request.function == FunctionCode::Confirm {
            if request.control.uns {
                let _ = self.confirm_tx.try_send(request.control.seq);
            }
            return;
        }

        let response = self.handle_request(&request);
        if let Some(response) = response {
            if let Err(e) = self.send_fragment(&response.serialize()) {
                log::warn!("[OUTSTATION] {} response send failed: {}", self.config.id, e);
            }
        }
    }

    fn send_fragment(&self, wire: &[u8]) -> Result<(), LinkError> {
        let segments = self.segmenter.lock().split(wire);
        let mut tx = |data: Vec<u8>| {
            self.writer
                .write(data)
                .map_err(|_| LinkError::ChannelClosed)
        };
        let mut primary = self.primary.lock();
        for segment in &segments {
            primary.send_unconfirmed(segment, &mut tx)?;
        }
        Ok(())
    }

    /// IIN octets reflecting the current device state.
    fn base_iin(&self) -> Iin {
        let mut iin = Iin::new();
        if self.restart_pending.load(Ordering::Acquire) {
            iin.set_iin1(iin1::DEVICE_RESTART);
        }
        if !self.time_valid.load(Ordering::Acquire) {
            iin.set_iin1(iin1::NEED_TIME);
        }
        if self.broadcast_seen.swap(false, Ordering::AcqRel) {
            iin.set_iin1(iin1::BROADCAST);
        }
        iin
    }

    /// Add the residual-event class bits.
    fn event_iin(&self, iin: &mut Iin) {
        let events = self.events.lock();
        if events.has_events(EventClass::Class1) {
            iin.set_iin1(iin1::CLASS_1_EVENTS);
        }
        if events.has_events(EventClass::Class2) {
            iin.set_iin1(iin1::CLASS_2_EVENTS);
        }
        if events.has_events(EventClass::Class3) {
            iin.set_iin1(iin1::CLASS_3_EVENTS);
        }
    }

    fn handle_request(&self, request: &Apdu) -> Option<Apdu> {
        let seq = request.control.seq;
        match request.function {
            FunctionCode::Read => Some(self.handle_read(request)),
            FunctionCode::Write => Some(self.handle_write(request)),
            FunctionCode::Select => Some(self.handle_commands(request, CommandPhase::Select)),
            FunctionCode::Operate => Some(self.handle_commands(request, CommandPhase::Operate)),
            FunctionCode::DirectOperate => {
                Some(self.handle_commands(request, CommandPhase::Direct))
            }
            FunctionCode::DirectOperateNoResp => {
                let _ = self.handle_commands(request, CommandPhase::Direct);
                None
            }
            FunctionCode::EnableUnsolicited => Some(self.handle_unsol_control(request, true)),
            FunctionCode::DisableUnsolicited => Some(self.handle_unsol_control(request, false)),
            FunctionCode::DelayMeasurement => {
                // Answer with a zero delay time object.
                let mut iin = self.base_iin();
                self.event_iin(&mut iin);
                let mut out = Vec::new();
                let header_ok = ObjectHeader::count_8(objects::GROUP_TIME, 1, 1)
                    .encode(&mut out)
                    .is_ok();
                if header_ok {
                    objects::encode_time(DnpTime::from_millis(0), &mut out);
                }
                Some(Apdu::response(seq, iin).with_objects(out))
            }
            _ => {
                let mut iin = self.base_iin();
                self.event_iin(&mut iin);
                iin.set_iin2(iin2::NO_FUNC_CODE_SUPPORT);
                log::debug!(
                    "[OUTSTATION] {} unsupported function {:?}",
                    self.config.id,
                    request.function
                );
                Some(Apdu::response(seq, iin))
            }
        }
    }

    fn handle_read(&self, request: &Apdu) -> Apdu {
        let mut iin = self.base_iin();
        let mut out = Vec::new();
        let budget = self.config.max_tx_frag.saturating_sub(16);

        let mut rest = &request.objects[..];
        while !rest.is_empty() {
            let (header, consumed) = match ObjectHeader::parse(rest) {
                Ok(parsed) => parsed,
                Err(ObjectError::UnsupportedQualifier(_)) => {
                    iin.set_iin2(iin2::PARAMETER_ERROR);
                    break;
                }
                Err(_) => {
                    iin.set_iin2(iin2::PARAMETER_ERROR);
                    break;
                }
            };
            rest = &rest[consumed..];

            match (header.group, header.variation) {
                (objects::GROUP_CLASS, 1) => self.emit_all_static(&mut out, &mut iin),
                (objects::GROUP_CLASS, 2) => self.emit_events(EventClass::Class1, budget, &mut out),
                (objects::GROUP_CLASS, 3) => self.emit_events(EventClass::Class2, budget, &mut out),
                (objects::GROUP_CLASS, 4) => self.emit_events(EventClass::Class3, budget, &mut out),
                (group, variation) if is_static_group(group) => {
                    self.emit_static_group(group, variation, header.range, &mut out, &mut iin);
                }
                _ => {
                    iin.set_iin2(iin2::OBJECT_UNKNOWN);
                }
            }
        }

        if self.events.lock().take_overflowed() {
            iin.set_iin2(iin2::EVENT_BUFFER_OVERFLOW);
        }
        self.event_iin(&mut iin);
        Apdu::response(request.control.seq, iin).with_objects(out)
    }

    fn emit_all_static(&self, out: &mut Vec<u8>, iin: &mut Iin) {
        for group in [
            objects::GROUP_BINARY,
            objects::GROUP_DOUBLE_BIT,
            objects::GROUP_BINARY_OUTPUT_STATUS,
            objects::GROUP_COUNTER,
            objects::GROUP_FROZEN_COUNTER,
            objects::GROUP_ANALOG,
            objects::GROUP_ANALOG_OUTPUT_STATUS,
        ] {
            self.emit_static_group(group, 0, Range::None, out, iin);
        }
    }

    fn emit_static_group(
        &self,
        group: u8,
        variation: u8,
        range: Range,
        out: &mut Vec<u8>,
        iin: &mut Iin,
    ) {
        let database = self.database.lock();
        let result = match group {
            objects::GROUP_BINARY => emit_runs(
                database.binaries(),
                variation,
                range,
                group,
                |point, var, out| encode_binary_input(var, &point.value, out),
                out,
            ),
            objects::GROUP_DOUBLE_BIT => emit_runs(
                database.double_bits(),
                variation,
                range,
                group,
                |point, var, out| encode_double_bit_input(var, &point.value, out),
                out,
            ),
            objects::GROUP_BINARY_OUTPUT_STATUS => emit_runs(
                database.binary_output_statuses(),
                variation,
                range,
                group,
                |point, var, out| encode_binary_output_status(var, &point.value, out),
                out,
            ),
            objects::GROUP_COUNTER => emit_runs(
                database.counters(),
                variation,
                range,
                group,
                |point, var, out| encode_counter(var, &point.value, out),
                out,
            ),
            objects::GROUP_FROZEN_COUNTER => emit_runs(
                database.frozen_counters(),
                variation,
                range,
                group,
                |point, var, out| encode_frozen_counter(var, &point.value, out),
                out,
            ),
            objects::GROUP_ANALOG => emit_runs(
                database.analogs(),
                variation,
                range,
                group,
                |point, var, out| encode_analog_input(var, &point.value, out),
                out,
            ),
            objects::GROUP_ANALOG_OUTPUT_STATUS => emit_runs(
                database.analog_output_statuses(),
                variation,
                range,
                group,
                |point, var, out| encode_analog_output_status(var, &point.value, out),
                out,
            ),
            _ => EmitResult::ObjectUnknown,
        };
        match result {
            EmitResult::Ok => {}
            EmitResult::ParameterError => iin.set_iin2(iin2::PARAMETER_ERROR),
            EmitResult::ObjectUnknown => iin.set_iin2(iin2::OBJECT_UNKNOWN),
        }
    }

    /// Drain and serialize one class's events; what does not fit the budget
    /// goes back to the buffer.
    fn emit_events(&self, class: EventClass, budget: usize, out: &mut Vec<u8>) {
        let drained = self.events.lock().drain_class(class);
        if drained.is_empty() {
            return;
        }
        let offset = self.time_offset_ms.load(Ordering::Acquire);

        let mut leftovers = Vec::new();
        let mut iter = drained.into_iter();
        while let Some(event) = iter.next() {
            if out.len() >= budget || encode_event(&event, offset, out).is_err() {
                leftovers.push(event);
                leftovers.extend(iter);
                break;
            }
        }
        if !leftovers.is_empty() {
            self.events.lock().restore(leftovers);
        }
    }

    fn handle_write(&self, request: &Apdu) -> Apdu {
        let mut iin = self.base_iin();
        let mut rest = &request.objects[..];

        while !rest.is_empty() {
            let (header, consumed) = match ObjectHeader::parse(rest) {
                Ok(parsed) => parsed,
                Err(_) => {
                    iin.set_iin2(iin2::PARAMETER_ERROR);
                    break;
                }
            };
            rest = &rest[consumed..];

            match (header.group, header.variation) {
                (objects::GROUP_TIME, 1) => {
                    let count = header.range.object_count().max(1);
                    let needed = 6 * count;
                    if rest.len() < needed {
                        iin.set_iin2(iin2::PARAMETER_ERROR);
                        break;
                    }
                    match decode_time(&rest[..6]) {
                        Ok(time) => {
                            let offset = time.millis() as i64 - DnpTime::now().millis() as i64;
                            self.time_offset_ms.store(offset, Ordering::Release);
                            self.time_valid.store(true, Ordering::Release);
                            log::info!(
                                "[OUTSTATION] {} time synchronized (offset {} ms)",
                                self.config.id,
                                offset
                            );
                        }
                        Err(_) => iin.set_iin2(iin2::PARAMETER_ERROR),
                    }
                    rest = &rest[needed..];
                }
                (objects::GROUP_IIN, 1) => {
                    let Range::StartStop { start, stop } = header.range else {
                        iin.set_iin2(iin2::PARAMETER_ERROR);
                        break;
                    };
                    let bits = (stop - start) as usize + 1;
                    let needed = bits.div_ceil(8);
                    if rest.len() < needed {
                        iin.set_iin2(iin2::PARAMETER_ERROR);
                        break;
                    }
                    // Restart (bit 7) is the only writable indication; the
                    // master clears it by writing a zero bit.
                    for bit in start..=stop {
                        let offset = (bit - start) as usize;
                        let value = rest[offset / 8] >> (offset % 8) & 1;
                        if bit == 7 && value == 0 {
                            self.restart_pending.store(false, Ordering::Release);
                        }
                    }
                    rest = &rest[needed..];
                }
                _ => {
                    iin.set_iin2(iin2::OBJECT_UNKNOWN);
                    break;
                }
            }
        }

        self.event_iin(&mut iin);
        Apdu::response(request.control.seq, iin)
    }

    fn handle_unsol_control(&self, request: &Apdu, enable: bool) -> Apdu {
        let mut iin = self.base_iin();
        let mut rest = &request.objects[..];
        let mut mask = self.unsol_mask.lock();

        while !rest.is_empty() {
            let (header, consumed) = match ObjectHeader::parse(rest) {
                Ok(parsed) => parsed,
                Err(_) => {
                    iin.set_iin2(iin2::PARAMETER_ERROR);
                    break;
                }
            };
            rest = &rest[consumed..];
            match (header.group, header.variation) {
                (objects::GROUP_CLASS, 2) => mask.class1 = enable,
                (objects::GROUP_CLASS, 3) => mask.class2 = enable,
                (objects::GROUP_CLASS, 4) => mask.class3 = enable,
                _ => iin.set_iin2(iin2::OBJECT_UNKNOWN),
            }
        }
        drop(mask);

        self.event_iin(&mut iin);
        Apdu::response(request.control.seq, iin)
    }

    fn handle_commands(&self, request: &Apdu, phase: CommandPhase) -> Apdu {
        let mut iin = self.base_iin();
        let mut out = Vec::new();

        // An OPERATE must match the stored SELECT before anything executes.
        let operate_matches = match phase {
            CommandPhase::Operate => self
                .select
                .lock()
                .matches(&request.objects, request.control.seq),
            _ => true,
        };

        let mut all_success = true;
        let mut controls_seen = 0usize;
        let mut rest = &request.objects[..];
        while !rest.is_empty() {
            let (header, consumed) = match ObjectHeader::parse(rest) {
                Ok(parsed) => parsed,
                Err(_) => {
                    iin.set_iin2(iin2::PARAMETER_ERROR);
                    break;
                }
            };
            rest = &rest[consumed..];

            let size = object_size(header.group, header.variation);
            let count = header.range.object_count();
            if size == 0 || rest.len() < size * count {
                iin.set_iin2(iin2::OBJECT_UNKNOWN);
                break;
            }
            let data = &rest[..size * count];
            rest = &rest[size * count..];

            if header.encode(&mut out).is_err() {
                iin.set_iin2(iin2::PARAMETER_ERROR);
                break;
            }
            let start = header.range.start_index().unwrap_or(0) as u16;

            for i in 0..count {
                let object = &data[i * size..(i + 1) * size];
                let index = start + i as u16;
                controls_seen += 1;

                let over_limit = controls_seen > self.config.max_controls_per_request;
                match header.group {
                    objects::GROUP_CROB => {
                        let Ok(mut crob) = decode_crob(object) else {
                            iin.set_iin2(iin2::PARAMETER_ERROR);
                            all_success = false;
                            continue;
                        };
                        crob.status = if over_limit {
                            CommandStatus::TooManyObjs
                        } else if !operate_matches {
                            CommandStatus::NoSelect
                        } else {
                            match phase {
                                CommandPhase::Select => self.control.select_crob(index, &crob),
                                CommandPhase::Operate | CommandPhase::Direct => {
                                    self.control.operate_crob(index, &crob)
                                }
                            }
                        };
                        all_success &= crob.status == CommandStatus::Success;
                        encode_crob(&crob, &mut out);
                    }
                    objects::GROUP_ANALOG_OUTPUT => {
                        let Ok(mut command) = decode_analog_output(header.variation, object) else {
                            iin.set_iin2(iin2::PARAMETER_ERROR);
                            all_success = false;
                            continue;
                        };
                        command.status = if over_limit {
                            CommandStatus::TooManyObjs
                        } else if !operate_matches {
                            CommandStatus::NoSelect
                        } else {
                            match phase {
                                CommandPhase::Select => self.control.select_analog(index, &command),
                                CommandPhase::Operate | CommandPhase::Direct => {
                                    self.control.operate_analog(index, &command)
                                }
                            }
                        };
                        all_success &= command.status == CommandStatus::Success;
                        let _ = encode_analog_output(header.variation, &command, &mut out);
                    }
                    _ => {
                        iin.set_iin2(iin2::OBJECT_UNKNOWN);
                        all_success = false;
                    }
                }
            }
        }

        if phase == CommandPhase::Select {
            if all_success && !iin.is_error() {
                self.select.lock().record(&request.objects, request.control.seq);
            } else {
                self.select.lock().clear();
            }
        }

        self.event_iin(&mut iin);
        Apdu::response(request.control.seq, iin).with_objects(out)
    }

    /// One pass of the unsolicited sender.
    fn unsolicited_pass(&self, shutdown: &Shutdown) {
        let (class1, class2, class3) = {
            let mask = self.unsol_mask.lock();
            (mask.class1, mask.class2, mask.class3)
        };

        let mut pending = Vec::new();
        {
            let mut events = self.events.lock();
            if class1 {
                pending.extend(events.drain_class(EventClass::Class1));
            }
            if class2 {
                pending.extend(events.drain_class(EventClass::Class2));
            }
            if class3 {
                pending.extend(events.drain_class(EventClass::Class3));
            }
        }
        if pending.is_empty() {
            return;
        }

        let offset = self.time_offset_ms.load(Ordering::Acquire);
        let mut payload = Vec::new();
        let mut ok = true;
        for event in &pending {
            if encode_event(event, offset, &mut payload).is_err() {
                ok = false;
                break;
            }
        }
        if !ok {
            log::warn!("[OUTSTATION] {} dropping unencodable events", self.config.id);
            return;
        }

        let seq = self.seqs.lock().unsolicited.next();
        let mut iin = self.base_iin();
        self.event_iin(&mut iin);
        let apdu = Apdu::unsolicited(seq, iin).with_objects(payload);
        let wire = apdu.serialize();

        // Drop confirms left over from a previous exchange.
        while self.confirm_rx.try_recv().is_ok() {}

        let mut attempts = 0u32;
        loop {
            if shutdown.is_triggered() {
                self.events.lock().restore(pending);
                return;
            }
            if self.send_fragment(&wire).is_err() {
                self.events.lock().restore(pending);
                return;
            }
            attempts += 1;

            match self.confirm_rx.recv_timeout(self.config.unsol_confirm_timeout) {
                Ok(confirmed_seq) if confirmed_seq == seq => {
                    log::debug!(
                        "[OUTSTATION] {} unsolicited seq {} confirmed ({} events)",
                        self.config.id,
                        seq,
                        pending.len()
                    );
                    return;
                }
                Ok(other) => {
                    log::debug!(
                        "[OUTSTATION] {} stale unsolicited confirm seq {}",
                        self.config.id,
                        other
                    );
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {}
            }

            if attempts > self.config.unsol_retries {
                log::warn!(
                    "[OUTSTATION] {} unsolicited seq {} unconfirmed, retaining events",
                    self.config.id,
                    seq
                );
                self.events.lock().restore(pending);
                return;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandPhase {
    Select,
    Operate,
    Direct,
}

fn is_static_group(group: u8) -> bool {
    matches!(
        group,
        objects::GROUP_BINARY
            | objects::GROUP_DOUBLE_BIT
            | objects::GROUP_BINARY_OUTPUT_STATUS
            | objects::GROUP_COUNTER
            | objects::GROUP_FROZEN_COUNTER
            | objects::GROUP_ANALOG
            | objects::GROUP_ANALOG_OUTPUT_STATUS
    )
}

enum EmitResult {
    Ok,
    ParameterError,
    ObjectUnknown,
}

/// Serialize a slice of points as start-stop runs grouped by variation.
///
/// `requested_variation` 0 means "use each point's configured variation".
fn emit_runs<T>(
    points: &[Point<T>],
    requested_variation: u8,
    range: Range,
    group: u8,
    encode: impl Fn(&Point<T>, u8, &mut Vec<u8>) -> Result<(), ObjectError>,
    out: &mut Vec<u8>,
) -> EmitResult {
    if points.is_empty() {
        // Nothing configured: an explicit range for it is a parameter error.
        return match range {
            Range::None => EmitResult::Ok,
            _ => EmitResult::ParameterError,
        };
    }

    let (first, last) = match range {
        Range::None => (0usize, points.len() - 1),
        Range::StartStop { start, stop } => {
            if start as usize >= points.len() {
                return EmitResult::ParameterError;
            }
            (start as usize, (stop as usize).min(points.len() - 1))
        }
        Range::Address { address } => {
            if address as usize >= points.len() {
                return EmitResult::ParameterError;
            }
            (address as usize, address as usize)
        }
        Range::Count { count } => (0usize, (count as usize - 1).min(points.len() - 1)),
        Range::FreeFormat { .. } => return EmitResult::ParameterError,
    };

    let variation_of = |i: usize| {
        if requested_variation == 0 {
            points[i].config.static_variation
        } else {
            requested_variation
        }
    };

    let mut run_start = first;
    while run_start <= last {
        let variation = variation_of(run_start);
        let mut run_end = run_start;
        while run_end < last && variation_of(run_end + 1) == variation {
            run_end += 1;
        }

        let header = if run_end <= 0xFF {
            ObjectHeader::start_stop_8(group, variation, run_start as u8, run_end as u8)
        } else {
            ObjectHeader::start_stop_16(group, variation, run_start as u16, run_end as u16)
        };
        if header.encode(out).is_err() {
            return EmitResult::ParameterError;
        }
        for point in &points[run_start..=run_end] {
            if encode(point, variation, out).is_err() {
                return EmitResult::ObjectUnknown;
            }
        }
        run_start = run_end + 1;
    }
    EmitResult::Ok
}

/// Serialize one event as its own single-point object block.
fn encode_event(event: &ChangeEvent, offset_ms: i64, out: &mut Vec<u8>) -> Result<(), ObjectError> {
    let (group, index) = match event.measurement.point_type() {
        PointType::Binary => (objects::GROUP_BINARY_EVENT, event.index),
        PointType::Counter => (objects::GROUP_COUNTER_EVENT, event.index),
        PointType::Analog => (objects::GROUP_ANALOG_EVENT, event.index),
        other => {
            log::debug!("[OUTSTATION] no event encoding for {:?}", other);
            return Ok(());
        }
    };

    let header = if index <= 0xFF {
        ObjectHeader::start_stop_8(group, event.variation, index as u8, index as u8)
    } else {
        ObjectHeader::start_stop_16(group, event.variation, index, index)
    };
    header.encode(out)?;

    match &event.measurement {
        Measurement::Binary(m) => {
            let mut shifted = *m;
            shifted.time = m.time.offset_by(offset_ms);
            encode_binary_event(event.variation, &shifted, out)
        }
        Measurement::Counter(m) => {
            let mut shifted = *m;
            shifted.time = m.time.offset_by(offset_ms);
            encode_counter_event(event.variation, &shifted, out)
        }
        Measurement::Analog(m) => {
            let mut shifted = *m;
            shifted.time = m.time.offset_by(offset_ms);
            encode_analog_event(event.variation, &shifted, out)
        }
        _ => Ok(()),
    }
}

/// A DNP3 outstation bound to one master.
pub struct Outstation {
    inner: Arc<OutstationInner>,
    shutdown: Shutdown,
    update_tx: Sender<Vec<Update>>,
    workers: Vec<JoinHandle<()>>,
}

impl Outstation {
    /// Create an outstation writing through `writer`. The returned
    /// [`OutstationSession`] must be registered on the channel's router.
    pub fn new(
        config: OutstationConfig,
        database: DatabaseConfig,
        control: Arc<dyn ControlHandler>,
        writer: ChannelWriter,
    ) -> (Self, Arc<OutstationSession>) {
        let link_config = LinkConfig {
            local_addr: config.local_addr,
            remote_addr: config.remote_addr,
            is_master: false,
            response_timeout: config.unsol_confirm_timeout,
            max_retries: config.unsol_retries,
        };
        let (confirm_tx, confirm_rx) = bounded(1);
        let (update_tx, update_rx) = bounded::<Vec<Update>>(config.update_queue_depth);

        let inner = Arc::new(OutstationInner {
            control,
            writer,
            database: Mutex::new(Database::new(&database)),
            events: Mutex::new(EventBuffers::new(config.event_buffers.clone())),
            primary: Mutex::new(PrimaryLink::new(link_config.clone())),
            secondary: Mutex::new(SecondaryLink::new(link_config)),
            reassembler: Mutex::new(Reassembler::new(TransportConfig {
                max_reassembly: config.max_rx_frag,
                ..TransportConfig::default()
            })),
            segmenter: Mutex::new(Segmenter::new()),
            seqs: Mutex::new(AppSequences::default()),
            select: Mutex::new(SelectArbiter::new(config.select_timeout)),
            unsol_mask: Mutex::new(UnsolMask {
                class1: config.unsol_class1,
                class2: config.unsol_class2,
                class3: config.unsol_class3,
            }),
            confirm_tx,
            confirm_rx,
            time_offset_ms: AtomicI64::new(0),
            time_valid: AtomicBool::new(false),
            restart_pending: AtomicBool::new(true),
            broadcast_seen: AtomicBool::new(false),
            config,
        });

        let shutdown = Shutdown::new();
        let mut workers = Vec::new();

        // Update applier
        {
            let inner = inner.clone();
            let shutdown = shutdown.clone();
            workers.push(std::thread::spawn(move || {
                update_applier(&inner, &update_rx, &shutdown);
            }));
        }
        // Unsolicited sender
        {
            let inner = inner.clone();
            let shutdown = shutdown.clone();
            workers.push(std::thread::spawn(move || {
                while !shutdown.is_triggered() {
                    std::thread::sleep(inner.config.unsol_poll);
                    inner.unsolicited_pass(&shutdown);
                }
            }));
        }

        let session = Arc::new(OutstationSession {
            inner: inner.clone(),
        });
        (
            Self {
                inner,
                shutdown,
                update_tx,
                workers,
            },
            session,
        )
    }

    /// Queue a measurement update batch for the applier worker.
    ///
    /// # Errors
    ///
    /// `Closed` after shutdown.
    pub fn apply_updates(&self, updates: Vec<Update>) -> Result<(), ChannelError> {
        self.update_tx
            .send(updates)
            .map_err(|_| ChannelError::Closed)
    }

    /// Queued events per class.
    #[must_use]
    pub fn event_counts(&self) -> (usize, usize, usize) {
        self.inner.events.lock().counts()
    }

    /// Event counters.
    #[must_use]
    pub fn event_stats(&self) -> EventStats {
        self.inner.events.lock().stats()
    }

    /// Stop the workers.
    pub fn shutdown(&mut self) {
        self.shutdown.trigger();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for Outstation {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn update_applier(inner: &Arc<OutstationInner>, queue: &Receiver<Vec<Update>>, shutdown: &Shutdown) {
    loop {
        match queue.recv_timeout(Duration::from_millis(100)) {
            Ok(batch) => {
                let events = inner.database.lock().apply(&batch);
                if !events.is_empty() {
                    let mut buffers = inner.events.lock();
                    for event in events {
                        buffers.push(event);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if shutdown.is_triggered() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::debug!("[OUTSTATION] {} update applier stopped", inner.config.id);
}
