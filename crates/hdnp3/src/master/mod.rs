// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Master station: scheduled scans, commands, and response correlation.
//!
//! # Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                           Master                             |
//! |                                                              |
//! |  task processor thread          receive path (channel pump)  |
//! |  queue.next_ready()             secondary link -> transport  |
//! |    -> build request               -> APDU parse              |
//! |    -> send_and_wait  <---- 1-slot rendezvous <--- responses  |
//! |    -> dispatch to ReadHandler     unsolicited -> confirm     |
//! +--------------------------------------------------------------+
//! ```
//!
//! The master holds at most one outstanding request: every exchange runs
//! under one lock, and the receive path delivers parsed responses through a
//! one-slot rendezvous. Unexpected or duplicate responses are dropped with
//! a warning.
//!
//! # Modules
//!
//! - `tasks` - priority + ready-time task queue
//! - `handler` - measurement/SOE callback traits
//! - `dispatch` - response object walking and typed delivery

pub mod dispatch;
pub mod handler;
pub mod tasks;

pub use handler::{FragmentInfo, HeaderInfo, NullReadHandler, ReadHandler, TaskResult};
pub use tasks::{ClassMask, ScanState, Task, TaskKind, TaskQueue};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::app::apdu::Apdu;
use crate::app::control::{AppControl, APP_SEQ_MODULUS};
use crate::app::function::FunctionCode;
use crate::app::header::ObjectHeader;
use crate::app::iin::{iin1, Iin};
use crate::app::measurement::{AnalogOutput, CommandStatus, Crob};
use crate::app::objects::{
    self, decode_analog_output, decode_crob, encode_analog_output, encode_crob, encode_time,
    object_size,
};
use crate::app::sequence::AppSequences;
use crate::channel::{ChannelWriter, Session, Shutdown};
use crate::link::frame::LinkFrame;
use crate::link::primary::PrimaryLink;
use crate::link::secondary::SecondaryLink;
use crate::link::{LinkConfig, LinkError};
use crate::transport::reassembly::{Reassembler, TransportConfig};
use crate::transport::Segmenter;

/// Task processor tick.
const PROCESSOR_TICK: Duration = Duration::from_millis(100);

/// Master configuration.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// Name used in log lines.
    pub id: String,
    /// Local link address.
    pub local_addr: u16,
    /// Outstation link address.
    pub remote_addr: u16,
    /// How long each request attempt waits for a response.
    pub response_timeout: Duration,
    /// Request retransmissions after the first attempt.
    pub max_retries: u32,
    /// Delay before a failed periodic scan runs again.
    pub task_retry_period: Duration,
    /// One-shot tasks older than this are dropped unexecuted.
    pub task_start_timeout: Duration,
    /// Send DISABLE_UNSOLICITED during startup.
    pub disable_unsol_on_startup: bool,
    /// Leave the outstation's restart indication alone.
    pub ignore_restart_iin: bool,
    /// Classes re-enabled for unsolicited reporting at startup.
    pub unsol_class_mask: ClassMask,
    /// Run an integrity scan during startup.
    pub startup_integrity_scan: bool,
    /// Re-run the integrity scan at this interval.
    pub integrity_period: Option<Duration>,
    /// Answer IIN1.NEED_TIME with a time-sync write.
    pub time_sync_on_need: bool,
    /// Largest reassembled response fragment accepted.
    pub max_rx_frag: usize,
    /// Largest request fragment transmitted.
    pub max_tx_frag: usize,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            id: "master".to_string(),
            local_addr: 1,
            remote_addr: 1024,
            response_timeout: Duration::from_secs(2),
            max_retries: 2,
            task_retry_period: Duration::from_secs(5),
            task_start_timeout: Duration::from_secs(10),
            disable_unsol_on_startup: true,
            ignore_restart_iin: false,
            unsol_class_mask: ClassMask::events(),
            startup_integrity_scan: true,
            integrity_period: None,
            time_sync_on_need: true,
            max_rx_frag: 2048,
            max_tx_frag: 2048,
        }
    }
}

impl MasterConfig {
    /// Polling profile: periodic integrity scans, unsolicited disabled.
    #[must_use]
    pub fn polling(local_addr: u16, remote_addr: u16, integrity_period: Duration) -> Self {
        Self {
            local_addr,
            remote_addr,
            integrity_period: Some(integrity_period),
            unsol_class_mask: ClassMask::none(),
            ..Self::default()
        }
    }
}

/// Errors surfaced by master request operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// All attempts timed out.
    Timeout,
    /// The channel shut down underneath the request.
    ChannelClosed,
    /// The link layer refused the operation.
    LinkLayer(LinkError),
    /// The response did not match the request (echo or shape mismatch).
    BadResponse,
    /// SELECT was not accepted for every command.
    SelectFailed(Vec<CommandStatus>),
    /// The request fragment exceeds `max_tx_frag`.
    TooLarge,
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out"),
            Self::ChannelClosed => write!(f, "channel closed"),
            Self::LinkLayer(e) => write!(f, "link layer: {}", e),
            Self::BadResponse => write!(f, "response did not match request"),
            Self::SelectFailed(_) => write!(f, "select rejected"),
            Self::TooLarge => write!(f, "request exceeds max_tx_frag"),
        }
    }
}

impl std::error::Error for TaskError {}

impl From<LinkError> for TaskError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::ChannelClosed => Self::ChannelClosed,
            other => Self::LinkLayer(other),
        }
    }
}

/// One output command addressed to a point.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Point index.
    pub index: u16,
    /// What to do to it.
    pub kind: CommandKind,
}

/// The supported command object kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    /// Group 12 var 1 control relay output block.
    Crob(Crob),
    /// Group 41 var 1 analog output.
    Analog(AnalogOutput),
}

struct MasterInner {
    config: MasterConfig,
    handler: Arc<dyn ReadHandler>,
    writer: ChannelWriter,
    queue: TaskQueue,
    exchange: Mutex<()>,
    resp_tx: Sender<Apdu>,
    resp_rx: Receiver<Apdu>,
    primary: Mutex<PrimaryLink>,
    /// Feed for link-layer ACK/NACK frames; kept outside the primary lock
    /// so delivery never waits on an exchange in flight.
    link_resp_tx: crossbeam::channel::Sender<crate::link::frame::SecondaryFunction>,
    secondary: Mutex<SecondaryLink>,
    reassemblers: DashMap<u16, Reassembler>,
    segmenter: Mutex<Segmenter>,
    seqs: Mutex<AppSequences>,
    last_iin: Mutex<Iin>,
    time_sync_pending: AtomicBool,
    clear_restart_pending: AtomicBool,
}

/// The session half of a master: registered on a channel router under the
/// master's local address.
pub struct MasterSession {
    inner: Arc<MasterInner>,
}

impl Session for MasterSession {
    fn local_address(&self) -> u16 {
        self.inner.config.local_addr
    }

    fn on_frame(&self, frame: LinkFrame) {
        if frame.control.prm {
            let inner = self.inner.clone();
            let mut deliver = |tpdu: &[u8]| inner.on_tpdu(frame.source, tpdu);
            let disposition = self.inner.secondary.lock().on_frame(&frame, &mut deliver);
            match disposition {
                Ok(disp) => {
                    if let Some(response) = disp.response {
                        if let Ok(wire) = response.serialize() {
                            let _ = self.inner.writer.write(wire);
                        }
                    }
                }
                Err(e) => {
                    log::debug!("[MASTER] {} dropped frame: {}", self.inner.config.id, e);
                }
            }
        } else if let Some(func) = frame.control.secondary_function() {
            let _ = self.inner.link_resp_tx.try_send(func);
        }
    }

    fn on_connection_lost(&self) {
        for mut entry in self.inner.reassemblers.iter_mut() {
            entry.value_mut().reset();
        }
    }

    fn on_connection_established(&self) {
        for mut entry in self.inner.reassemblers.iter_mut() {
            entry.value_mut().reset();
        }
    }
}

impl MasterInner {
    /// Receive-path delivery of one transport segment.
    fn on_tpdu(&self, source: u16, tpdu: &[u8]) -> bool {
        let fragment = {
            let mut reassembler = self.reassemblers.entry(source).or_insert_with(|| {
                Reassembler::new(TransportConfig {
                    max_reassembly: self.config.max_rx_frag,
                    ..TransportConfig::default()
                })
            });
            match reassembler.on_segment(tpdu) {
                Ok(complete) => complete,
                Err(e) => {
                    log::warn!("[MASTER] {} reassembly: {}", self.config.id, e);
                    return true;
                }
            }
        };
        if let Some(fragment) = fragment {
            self.on_fragment(&fragment);
        }
        true
    }

    fn on_fragment(&self, fragment: &[u8]) {
        let apdu = match Apdu::parse(fragment) {
            Ok(apdu) => apdu,
            Err(e) => {
                log::warn!("[MASTER] {} bad fragment: {}", self.config.id, e);
                return;
            }
        };
        match apdu.function {
            FunctionCode::UnsolicitedResponse => self.handle_unsolicited(apdu),
            f if f.is_response() => {
                if self.resp_tx.try_send(apdu).is_err() {
                    log::warn!(
                        "[MASTER] {} unexpected response dropped (nothing outstanding)",
                        self.config.id
                    );
                }
            }
            other => {
                log::warn!("[MASTER] {} ignoring request {:?}", self.config.id, other);
            }
        }
    }

    fn handle_unsolicited(&self, apdu: Apdu) {
        let iin = apdu.iin.unwrap_or_default();
        self.note_iin(iin);

        let info = FragmentInfo {
            control: apdu.control,
            function: apdu.function,
            iin,
        };
        self.handler.on_begin_fragment(&info);
        if let Err(e) = dispatch::dispatch_objects(&apdu.objects, self.handler.as_ref()) {
            log::warn!("[MASTER] {} unsolicited dispatch: {}", self.config.id, e);
        }
        self.handler.on_end_fragment(&info);

        if apdu.control.con {
            let confirm = Apdu {
                control: AppControl {
                    fir: true,
                    fin: true,
                    con: false,
                    uns: true,
                    seq: apdu.control.seq,
                },
                function: FunctionCode::Confirm,
                iin: None,
                objects: Vec::new(),
            };
            if let Err(e) = self.send_fragment(&confirm.serialize()) {
                log::warn!("[MASTER] {} unsolicited confirm failed: {}", self.config.id, e);
            }
        }
    }

    /// Record response IIN and schedule the automatic follow-ups.
    fn note_iin(&self, iin: Iin) {
        *self.last_iin.lock() = iin;
        self.handler.on_receive_iin(iin);

        if iin.has_iin1(iin1::NEED_TIME)
            && self.config.time_sync_on_need
            && !self.time_sync_pending.swap(true, Ordering::AcqRel)
        {
            self.queue.enqueue(Task::one_shot(TaskKind::TimeSync, 10));
        }
        if iin.has_iin1(iin1::DEVICE_RESTART)
            && !self.config.ignore_restart_iin
            && !self.clear_restart_pending.swap(true, Ordering::AcqRel)
        {
            self.queue.enqueue(Task::one_shot(TaskKind::ClearRestart, 10));
        }
    }

    /// Segment one serialized fragment and transmit it via the link layer.
    fn send_fragment(&self, wire: &[u8]) -> Result<(), TaskError> {
        if wire.len() > self.config.max_tx_frag {
            return Err(TaskError::TooLarge);
        }
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

    /// Send a request and wait for its (possibly multi-fragment) response.
    ///
    /// Serialized: at most one request is outstanding per master.
    fn send_and_wait(&self, request: &Apdu) -> Result<Apdu, TaskError> {
        let _outstanding = self.exchange.lock();

        // Drop any stale response from a previous timed-out exchange.
        while self.resp_rx.try_recv().is_ok() {}

        let wire = request.serialize();
        let mut attempts = 0u32;
        loop {
            self.send_fragment(&wire)?;
            attempts += 1;

            if let Some(response) = self.wait_response(request.control.seq) {
                let iin = response.iin.unwrap_or_default();
                self.note_iin(iin);
                return Ok(response);
            }

            if attempts > self.config.max_retries {
                log::warn!(
                    "[MASTER] {} request timed out after {} attempts",
                    self.config.id,
                    attempts
                );
                return Err(TaskError::Timeout);
            }
        }
    }

    /// Collect response fragments for `seq` until FIN, within one timeout
    /// window. Returns `None` on timeout.
    fn wait_response(&self, seq: u8) -> Option<Apdu> {
        let deadline = Instant::now() + self.config.response_timeout;
        let mut combined: Option<Apdu> = None;
        let mut expected_seq = seq;

        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let apdu = match self.resp_rx.recv_timeout(remaining) {
                Ok(apdu) => apdu,
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            };

            if apdu.control.seq != expected_seq {
                log::warn!(
                    "[MASTER] {} response seq {} does not match expected {}, dropped",
                    self.config.id,
                    apdu.control.seq,
                    expected_seq
                );
                continue;
            }
            if combined.is_none() && !apdu.control.fir {
                log::warn!("[MASTER] {} mid-message fragment dropped", self.config.id);
                continue;
            }

            let fin = apdu.control.fin;
            match combined.as_mut() {
                None => combined = Some(apdu),
                Some(first) => {
                    first.objects.extend_from_slice(&apdu.objects);
                    first.iin = match (first.iin, apdu.iin) {
                        (Some(a), Some(b)) => Some(a.merge(b)),
                        (a, b) => a.or(b),
                    };
                    first.control.fin = fin;
                }
            }
            if fin {
                return combined;
            }
            expected_seq = (expected_seq + 1) % APP_SEQ_MODULUS;
        }
    }

    /// Build and run a READ with the given object headers; dispatch the
    /// response to the handler.
    fn read(&self, headers: &[ObjectHeader]) -> Result<(), TaskError> {
        let mut payload = Vec::new();
        for header in headers {
            header.encode(&mut payload).map_err(|_| TaskError::TooLarge)?;
        }
        let seq = self.seqs.lock().solicited.next();
        let request = Apdu::request(FunctionCode::Read, seq).with_objects(payload);

        let response = self.send_and_wait(&request)?;
        let info = FragmentInfo {
            control: response.control,
            function: response.function,
            iin: response.iin.unwrap_or_default(),
        };
        self.handler.on_begin_fragment(&info);
        if let Err(e) = dispatch::dispatch_objects(&response.objects, self.handler.as_ref()) {
            log::warn!("[MASTER] {} response dispatch: {}", self.config.id, e);
        }
        self.handler.on_end_fragment(&info);
        Ok(())
    }

    fn class_headers(mask: ClassMask, headers: &mut Vec<ObjectHeader>) {
        if mask.class1 {
            headers.push(ObjectHeader::all_objects(objects::GROUP_CLASS, 2));
        }
        if mask.class2 {
            headers.push(ObjectHeader::all_objects(objects::GROUP_CLASS, 3));
        }
        if mask.class3 {
            headers.push(ObjectHeader::all_objects(objects::GROUP_CLASS, 4));
        }
        if mask.class0 {
            headers.push(ObjectHeader::all_objects(objects::GROUP_CLASS, 1));
        }
    }

    fn execute_task(&self, kind: &TaskKind) -> Result<(), TaskError> {
        match kind {
            TaskKind::IntegrityScan => {
                let mut headers = Vec::new();
                Self::class_headers(ClassMask::all(), &mut headers);
                self.read(&headers)
            }
            TaskKind::ClassScan(mask) => {
                let mut headers = Vec::new();
                Self::class_headers(*mask, &mut headers);
                self.read(&headers)
            }
            TaskKind::RangeScan {
                group,
                variation,
                start,
                stop,
            } => self.read(&[ObjectHeader::start_stop_16(*group, *variation, *start, *stop)]),
            TaskKind::TimeSync => {
                let result = self.write_time();
                self.time_sync_pending.store(false, Ordering::Release);
                result
            }
            TaskKind::ClearRestart => {
                let result = self.write_clear_restart();
                self.clear_restart_pending.store(false, Ordering::Release);
                result
            }
            TaskKind::DisableUnsolicited(mask) => {
                self.unsolicited_control(FunctionCode::DisableUnsolicited, *mask)
            }
            TaskKind::EnableUnsolicited(mask) => {
                self.unsolicited_control(FunctionCode::EnableUnsolicited, *mask)
            }
        }
    }

    fn write_time(&self) -> Result<(), TaskError> {
        let mut payload = Vec::new();
        ObjectHeader::count_8(objects::GROUP_TIME, 1, 1)
            .encode(&mut payload)
            .map_err(|_| TaskError::BadResponse)?;
        encode_time(self.handler.get_time(), &mut payload);

        let seq = self.seqs.lock().solicited.next();
        let request = Apdu::request(FunctionCode::Write, seq).with_objects(payload);
        self.send_and_wait(&request).map(|_| ())
    }

    fn write_clear_restart(&self) -> Result<(), TaskError> {
        // Group 80 var 1, bit 7 only, packed value 0.
        let mut payload = Vec::new();
        ObjectHeader::start_stop_8(objects::GROUP_IIN, 1, 7, 7)
            .encode(&mut payload)
            .map_err(|_| TaskError::BadResponse)?;
        payload.push(0x00);

        let seq = self.seqs.lock().solicited.next();
        let request = Apdu::request(FunctionCode::Write, seq).with_objects(payload);
        self.send_and_wait(&request).map(|_| ())
    }

    fn unsolicited_control(&self, function: FunctionCode, mask: ClassMask) -> Result<(), TaskError> {
        let mut headers = Vec::new();
        Self::class_headers(
            ClassMask {
                class0: false,
                ..mask
            },
            &mut headers,
        );
        let mut payload = Vec::new();
        for header in &headers {
            header.encode(&mut payload).map_err(|_| TaskError::BadResponse)?;
        }
        let seq = self.seqs.lock().solicited.next();
        let request = Apdu::request(function, seq).with_objects(payload);
        self.send_and_wait(&request).map(|_| ())
    }

    fn encode_commands(commands: &[Command]) -> Result<Vec<u8>, TaskError> {
        let mut payload = Vec::new();
        for command in commands {
            match &command.kind {
                CommandKind::Crob(crob) => {
                    ObjectHeader::start_stop_16(objects::GROUP_CROB, 1, command.index, command.index)
                        .encode(&mut payload)
                        .map_err(|_| TaskError::TooLarge)?;
                    encode_crob(crob, &mut payload);
                }
                CommandKind::Analog(ao) => {
                    ObjectHeader::start_stop_16(
                        objects::GROUP_ANALOG_OUTPUT,
                        1,
                        command.index,
                        command.index,
                    )
                    .encode(&mut payload)
                    .map_err(|_| TaskError::TooLarge)?;
                    encode_analog_output(1, ao, &mut payload).map_err(|_| TaskError::TooLarge)?;
                }
            }
        }
        Ok(payload)
    }

    /// Pull the per-command statuses out of a command response, in request
    /// order.
    fn parse_command_statuses(objects_buf: &[u8], expected: usize) -> Result<Vec<CommandStatus>, TaskError> {
        let mut statuses = Vec::with_capacity(expected);
        let mut rest = objects_buf;
        while !rest.is_empty() {
            let (header, consumed) = ObjectHeader::parse(rest).map_err(|_| TaskError::BadResponse)?;
            rest = &rest[consumed..];
            let size = object_size(header.group, header.variation);
            let count = header.range.object_count();
            if size == 0 || rest.len() < size * count {
                return Err(TaskError::BadResponse);
            }
            for i in 0..count {
                let object = &rest[i * size..(i + 1) * size];
                let status = match header.group {
                    objects::GROUP_CROB => {
                        decode_crob(object).map_err(|_| TaskError::BadResponse)?.status
                    }
                    objects::GROUP_ANALOG_OUTPUT => {
                        decode_analog_output(header.variation, object)
                            .map_err(|_| TaskError::BadResponse)?
                            .status
                    }
                    _ => return Err(TaskError::BadResponse),
                };
                statuses.push(status);
            }
            rest = &rest[size * count..];
        }
        if statuses.len() != expected {
            return Err(TaskError::BadResponse);
        }
        Ok(statuses)
    }

    fn run_command(
        &self,
        function: FunctionCode,
        seq: u8,
        payload: Vec<u8>,
        expected: usize,
    ) -> Result<(Vec<CommandStatus>, Vec<u8>), TaskError> {
        let request = Apdu::request(function, seq).with_objects(payload);
        let response = self.send_and_wait(&request)?;
        let statuses = Self::parse_command_statuses(&response.objects, expected)?;
        Ok((statuses, response.objects))
    }
}

/// A DNP3 master bound to one outstation.
pub struct Master {
    inner: Arc<MasterInner>,
    shutdown: Shutdown,
    processor: Option<JoinHandle<()>>,
}

impl Master {
    /// Create a master writing through `writer`. The returned
    /// [`MasterSession`] must be registered on the channel's router.
    pub fn new(
        config: MasterConfig,
        handler: Arc<dyn ReadHandler>,
        writer: ChannelWriter,
    ) -> (Self, Arc<MasterSession>) {
        let link_config = LinkConfig {
            local_addr: config.local_addr,
            remote_addr: config.remote_addr,
            is_master: true,
            response_timeout: config.response_timeout,
            max_retries: config.max_retries,
        };
        let (resp_tx, resp_rx) = bounded(1);
        let primary = PrimaryLink::new(link_config.clone());
        let link_resp_tx = primary.response_sender();

        let inner = Arc::new(MasterInner {
            handler,
            writer,
            queue: TaskQueue::new(),
            exchange: Mutex::new(()),
            resp_tx,
            resp_rx,
            primary: Mutex::new(primary),
            link_resp_tx,
            secondary: Mutex::new(SecondaryLink::new(link_config)),
            reassemblers: DashMap::new(),
            segmenter: Mutex::new(Segmenter::new()),
            seqs: Mutex::new(AppSequences::default()),
            last_iin: Mutex::new(Iin::new()),
            time_sync_pending: AtomicBool::new(false),
            clear_restart_pending: AtomicBool::new(false),
            config,
        });

        let shutdown = Shutdown::new();
        let processor = {
            let inner = inner.clone();
            let shutdown = shutdown.clone();
            std::thread::spawn(move || task_processor(&inner, &shutdown))
        };

        let session = Arc::new(MasterSession {
            inner: inner.clone(),
        });
        (
            Self {
                inner,
                shutdown,
                processor: Some(processor),
            },
            session,
        )
    }

    /// Queue the startup sequence per the configuration.
    pub fn startup(&self) {
        if self.inner.config.disable_unsol_on_startup {
            self.inner.queue.enqueue(Task::one_shot(
                TaskKind::DisableUnsolicited(ClassMask::events()),
                100,
            ));
        }
        if self.inner.config.startup_integrity_scan {
            self.inner
                .queue
                .enqueue(Task::one_shot(TaskKind::IntegrityScan, 50));
        }
        if let Some(period) = self.inner.config.integrity_period {
            self.add_periodic_scan(TaskKind::IntegrityScan, period);
        }
    }

    /// Run a scan right now, bypassing the queue. Blocks for the exchange.
    pub fn scan(&self, kind: TaskKind) -> Result<(), TaskError> {
        self.inner.execute_task(&kind)
    }

    /// Queue a one-shot scan.
    pub fn enqueue_scan(&self, kind: TaskKind, priority: i32) {
        self.inner.queue.enqueue(Task::one_shot(kind, priority));
    }

    /// Register a periodic scan; the handle can demand an immediate run or
    /// disable it.
    pub fn add_periodic_scan(&self, kind: TaskKind, period: Duration) -> Arc<ScanState> {
        let scan = ScanState::new(period);
        self.inner.queue.enqueue(Task {
            priority: 0,
            ready_at: Instant::now(),
            kind,
            scan: Some(scan.clone()),
        });
        scan
    }

    /// Execute each command immediately (function DIRECT_OPERATE).
    ///
    /// Returns one status per command, in order.
    pub fn direct_operate(&self, commands: &[Command]) -> Result<Vec<CommandStatus>, TaskError> {
        let payload = MasterInner::encode_commands(commands)?;
        let seq = self.inner.seqs.lock().solicited.next();
        let (statuses, _) =
            self.inner
                .run_command(FunctionCode::DirectOperate, seq, payload, commands.len())?;
        Ok(statuses)
    }

    /// Two-pass SELECT then OPERATE.
    ///
    /// The OPERATE carries an object payload byte-identical to the SELECT;
    /// the SELECT must be accepted for every command or the operation fails
    /// with [`TaskError::SelectFailed`].
    pub fn select_and_operate(&self, commands: &[Command]) -> Result<Vec<CommandStatus>, TaskError> {
        let payload = MasterInner::encode_commands(commands)?;

        // The outstation requires OPERATE to carry the successor sequence of
        // the SELECT; reserve both up front so a scheduled task cannot slip
        // a sequence number in between the phases.
        let (select_seq, operate_seq) = {
            let mut seqs = self.inner.seqs.lock();
            (seqs.solicited.next(), seqs.solicited.next())
        };

        let (select_statuses, select_echo) = self.inner.run_command(
            FunctionCode::Select,
            select_seq,
            payload.clone(),
            commands.len(),
        )?;
        if select_statuses.iter().any(|s| *s != CommandStatus::Success) {
            return Err(TaskError::SelectFailed(select_statuses));
        }
        // The outstation must echo the select payload byte for byte.
        if select_echo != payload {
            return Err(TaskError::BadResponse);
        }

        let (operate_statuses, _) = self.inner.run_command(
            FunctionCode::Operate,
            operate_seq,
            payload,
            commands.len(),
        )?;
        Ok(operate_statuses)
    }

    /// Reset the link layer (clears a primary-link error state).
    pub fn reset_link(&self) -> Result<(), LinkError> {
        let inner = &self.inner;
        let mut tx = |data: Vec<u8>| {
            inner
                .writer
                .write(data)
                .map_err(|_| LinkError::ChannelClosed)
        };
        inner.primary.lock().reset_link(&mut tx)
    }

    /// IIN octets of the most recent response.
    #[must_use]
    pub fn last_iin(&self) -> Iin {
        *self.inner.last_iin.lock()
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn queued_tasks(&self) -> usize {
        self.inner.queue.len()
    }

    /// Stop the task processor.
    pub fn shutdown(&mut self) {
        self.shutdown.trigger();
        if let Some(processor) = self.processor.take() {
            let _ = processor.join();
        }
    }
}

impl Drop for Master {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn task_processor(inner: &Arc<MasterInner>, shutdown: &Shutdown) {
    while !shutdown.is_triggered() {
        std::thread::sleep(PROCESSOR_TICK);

        let Some(task) = inner.queue.next_ready(Instant::now()) else {
            continue;
        };

        // Stale one-shots are dropped rather than run long after their time.
        if task.scan.is_none() && task.ready_at.elapsed() > inner.config.task_start_timeout {
            log::warn!("[MASTER] {} dropping stale task {:?}", inner.config.id, task.kind);
            continue;
        }

        let enabled = task.scan.as_ref().map_or(true, |s| s.is_enabled());
        let mut failed = false;
        if enabled {
            inner.handler.on_task_start(&task.kind);
            let result = inner.execute_task(&task.kind);
            let outcome = match &result {
                Ok(()) => TaskResult::Success,
                Err(TaskError::Timeout) => TaskResult::Timeout,
                Err(_) => TaskResult::Failure,
            };
            failed = result.is_err();
            inner.handler.on_task_complete(&task.kind, outcome);
            if let Err(e) = result {
                log::warn!("[MASTER] {} task {:?} failed: {}", inner.config.id, task.kind, e);
            }
        }

        if let Some(scan) = &task.scan {
            let ready_at = if scan.take_demand() {
                Instant::now()
            } else if failed {
                Instant::now() + inner.config.task_retry_period
            } else {
                Instant::now() + scan.period
            };
            inner.queue.enqueue(Task {
                priority: task.priority,
                ready_at,
                kind: task.kind,
                scan: Some(scan.clone()),
            });
        }
    }
    log::debug!("[MASTER] {} task processor stopped", inner.config.id);
}
