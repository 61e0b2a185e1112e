// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Master <-> outstation integration over a loopback channel pair.
//!
//! Both stations run their full stacks: link framing, transport
//! segmentation, application codec, workers. The only fake part is the
//! wire.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use hdnp3::app::iin::iin1;
use hdnp3::app::measurement::{
    flags, Analog, AnalogOutput, Binary, CommandStatus, Crob, DnpTime, Measurement,
};
use hdnp3::channel::{Channel, ChannelConfig, LoopbackTransport, SessionRouter};
use hdnp3::master::{
    ClassMask, Command, CommandKind, HeaderInfo, Master, MasterConfig, ReadHandler, TaskKind,
};
use hdnp3::outstation::{
    ControlHandler, DatabaseConfig, EventMode, Outstation, OutstationConfig, PointConfig, Update,
};

const MASTER_ADDR: u16 = 1;
const OUTSTATION_ADDR: u16 = 1024;

#[derive(Default)]
struct RecordingHandler {
    binaries: Mutex<Vec<(u16, Binary)>>,
    analogs: Mutex<Vec<(u16, Analog)>>,
}

impl RecordingHandler {
    fn wait_binaries(&self, n: usize) -> Vec<(u16, Binary)> {
        for _ in 0..300 {
            if self.binaries.lock().len() >= n {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        self.binaries.lock().clone()
    }
}

impl ReadHandler for RecordingHandler {
    fn process_binary(&self, _info: &HeaderInfo, values: &[(u16, Binary)]) {
        self.binaries.lock().extend_from_slice(values);
    }

    fn process_analog(&self, _info: &HeaderInfo, values: &[(u16, Analog)]) {
        self.analogs.lock().extend_from_slice(values);
    }
}

#[derive(Default)]
struct RelayControl {
    operated: Mutex<Vec<(u16, u8)>>,
    analog_writes: Mutex<Vec<(u16, f64)>>,
}

impl ControlHandler for RelayControl {
    fn select_crob(&self, _index: u16, _crob: &Crob) -> CommandStatus {
        CommandStatus::Success
    }

    fn operate_crob(&self, index: u16, crob: &Crob) -> CommandStatus {
        self.operated.lock().push((index, crob.code));
        CommandStatus::Success
    }

    fn select_analog(&self, _index: u16, _command: &AnalogOutput) -> CommandStatus {
        CommandStatus::Success
    }

    fn operate_analog(&self, index: u16, command: &AnalogOutput) -> CommandStatus {
        self.analog_writes.lock().push((index, command.value));
        CommandStatus::Success
    }
}

struct Stack {
    master: Master,
    outstation: Outstation,
    master_channel: Channel,
    outstation_channel: Channel,
    handler: Arc<RecordingHandler>,
    control: Arc<RelayControl>,
}

fn master_config() -> MasterConfig {
    MasterConfig {
        local_addr: MASTER_ADDR,
        remote_addr: OUTSTATION_ADDR,
        response_timeout: Duration::from_secs(1),
        max_retries: 1,
        disable_unsol_on_startup: false,
        startup_integrity_scan: false,
        time_sync_on_need: false,
        ignore_restart_iin: true,
        ..MasterConfig::default()
    }
}

fn outstation_config() -> OutstationConfig {
    OutstationConfig {
        local_addr: OUTSTATION_ADDR,
        remote_addr: MASTER_ADDR,
        unsol_class1: false,
        unsol_class2: false,
        unsol_class3: false,
        unsol_poll: Duration::from_millis(50),
        ..OutstationConfig::default()
    }
}

fn database() -> DatabaseConfig {
    DatabaseConfig::new()
        .with_binaries(4, PointConfig::binary())
        .with_analogs(4, PointConfig::analog(1.0))
        .with_counters(2, PointConfig::counter(0.0))
}

impl Stack {
    fn new(master_config: MasterConfig, outstation_config: OutstationConfig) -> Self {
        let (phys_m, phys_o) = LoopbackTransport::pair();

        let master_channel = Channel::open(
            ChannelConfig {
                id: "master-loop".to_string(),
                ..ChannelConfig::default()
            },
            Arc::new(phys_m),
            Arc::new(SessionRouter::new()),
        );
        let outstation_channel = Channel::open(
            ChannelConfig {
                id: "outstation-loop".to_string(),
                ..ChannelConfig::default()
            },
            Arc::new(phys_o),
            Arc::new(SessionRouter::new()),
        );

        let handler = Arc::new(RecordingHandler::default());
        let (master, master_session) = Master::new(
            master_config,
            handler.clone(),
            master_channel.writer(),
        );
        master_channel
            .router()
            .register(master_session)
            .expect("register master");

        let control = Arc::new(RelayControl::default());
        let (outstation, outstation_session) = Outstation::new(
            outstation_config,
            database(),
            control.clone(),
            outstation_channel.writer(),
        );
        outstation_channel
            .router()
            .register(outstation_session)
            .expect("register outstation");

        Self {
            master,
            outstation,
            master_channel,
            outstation_channel,
            handler,
            control,
        }
    }

    fn update_binary(&self, index: u16, value: bool) {
        self.outstation
            .apply_updates(vec![Update::detect(
                index,
                Measurement::Binary(Binary {
                    value,
                    flags: flags::ONLINE,
                    time: DnpTime::from_millis(1_000_000),
                }),
            )])
            .expect("update");
    }

    fn close(mut self) {
        self.master.shutdown();
        self.outstation.shutdown();
        self.master_channel.close();
        self.outstation_channel.close();
    }
}

#[test]
fn integrity_poll_delivers_static_data() {
    let stack = Stack::new(master_config(), outstation_config());

    stack
        .outstation
        .apply_updates(vec![Update {
            index: 2,
            measurement: Measurement::Binary(Binary {
                value: true,
                flags: flags::ONLINE,
                time: DnpTime::from_millis(0),
            }),
            mode: EventMode::Suppress,
        }])
        .expect("update");
    std::thread::sleep(Duration::from_millis(100));

    stack.master.scan(TaskKind::IntegrityScan).expect("scan");

    let binaries = stack.handler.binaries.lock().clone();
    assert_eq!(binaries.len(), 4, "all configured binaries reported");
    assert!(binaries[2].1.value);
    assert!(!binaries[0].1.value);

    let analogs = stack.handler.analogs.lock().clone();
    assert_eq!(analogs.len(), 4);

    stack.close();
}

#[test]
fn deadband_event_reaches_master_via_class_scan() {
    let stack = Stack::new(master_config(), outstation_config());

    stack.update_binary(1, true);
    for _ in 0..100 {
        if stack.outstation.event_counts().0 == 1 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    stack
        .master
        .scan(TaskKind::ClassScan(ClassMask::events()))
        .expect("scan");

    let binaries = stack.handler.binaries.lock().clone();
    assert_eq!(binaries.len(), 1);
    assert_eq!(binaries[0].0, 1);
    assert!(binaries[0].1.value);

    // The events were drained by the read
    assert_eq!(stack.outstation.event_counts(), (0, 0, 0));

    stack.close();
}

#[test]
fn select_and_operate_crob_end_to_end() {
    let stack = Stack::new(master_config(), outstation_config());

    let statuses = stack
        .master
        .select_and_operate(&[Command {
            index: 3,
            kind: CommandKind::Crob(Crob::latch_on()),
        }])
        .expect("select/operate");

    assert_eq!(statuses, vec![CommandStatus::Success]);
    assert_eq!(stack.control.operated.lock().clone(), vec![(3u16, 0x03u8)]);

    stack.close();
}

#[test]
fn direct_operate_analog_end_to_end() {
    let stack = Stack::new(master_config(), outstation_config());

    let statuses = stack
        .master
        .direct_operate(&[Command {
            index: 1,
            kind: CommandKind::Analog(AnalogOutput::new(77.0)),
        }])
        .expect("direct operate");

    assert_eq!(statuses, vec![CommandStatus::Success]);
    assert_eq!(stack.control.analog_writes.lock().clone(), vec![(1u16, 77.0)]);

    stack.close();
}

#[test]
fn unsolicited_event_confirmed_and_cleared() {
    let outstation_config = OutstationConfig {
        unsol_class1: true,
        unsol_poll: Duration::from_millis(50),
        unsol_confirm_timeout: Duration::from_secs(2),
        ..outstation_config()
    };
    let stack = Stack::new(master_config(), outstation_config);

    stack.update_binary(0, true);

    // The outstation pushes the event unsolicited; the master dispatches it
    // and confirms automatically.
    let binaries = stack.handler.wait_binaries(1);
    assert_eq!(binaries.len(), 1);
    assert_eq!(binaries[0].0, 0);
    assert!(binaries[0].1.value);

    // The confirm releases the buffered event
    for _ in 0..300 {
        if stack.outstation.event_counts() == (0, 0, 0) {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(stack.outstation.event_counts(), (0, 0, 0));

    stack.close();
}

#[test]
fn need_time_triggers_automatic_time_sync() {
    let master_config = MasterConfig {
        time_sync_on_need: true,
        ..master_config()
    };
    let stack = Stack::new(master_config, outstation_config());

    // First scan observes NEED_TIME and queues the time-sync write
    stack
        .master
        .scan(TaskKind::ClassScan(ClassMask::events()))
        .expect("scan");
    assert!(stack.master.last_iin().has_iin1(iin1::NEED_TIME));

    // The task processor runs the write; subsequent responses are clean
    let mut synced = false;
    for _ in 0..300 {
        stack
            .master
            .scan(TaskKind::ClassScan(ClassMask::events()))
            .expect("scan");
        if !stack.master.last_iin().has_iin1(iin1::NEED_TIME) {
            synced = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(synced, "outstation never reported a synchronized clock");

    stack.close();
}

#[test]
fn periodic_scan_keeps_polling() {
    let stack = Stack::new(master_config(), outstation_config());

    stack.update_binary(0, true);
    std::thread::sleep(Duration::from_millis(100));

    stack
        .master
        .add_periodic_scan(TaskKind::ClassScan(ClassMask::events()), Duration::from_millis(200));

    // First run picks up the first event
    let binaries = stack.handler.wait_binaries(1);
    assert!(!binaries.is_empty());

    // A later change is picked up by a later cycle without further prodding
    stack.update_binary(0, false);
    let binaries = stack.handler.wait_binaries(2);
    assert_eq!(binaries.len(), 2);
    assert!(!binaries[1].1.value);

    stack.close();
}
