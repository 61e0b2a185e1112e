// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Callback surface toward the master's user.
//!
//! Measurement data flows out of the stack through [`ReadHandler`], one
//! fragment at a time: `on_begin_fragment`, a `process_*` call per object
//! header, `on_end_fragment`. All methods have no-op defaults so an
//! application implements only what it displays.

use crate::app::control::AppControl;
use crate::app::function::FunctionCode;
use crate::app::iin::Iin;
use crate::app::measurement::{
    Analog, AnalogOutputStatus, Binary, BinaryOutputStatus, Counter, DnpTime, DoubleBitBinary,
    FrozenCounter,
};

use super::tasks::TaskKind;

/// Identity of the fragment being dispatched.
#[derive(Debug, Clone, Copy)]
pub struct FragmentInfo {
    /// Application control octet of the fragment.
    pub control: AppControl,
    /// Response function (solicited or unsolicited).
    pub function: FunctionCode,
    /// Internal indications of the fragment.
    pub iin: Iin,
}

/// Identity of the object header a batch of values came from.
#[derive(Debug, Clone, Copy)]
pub struct HeaderInfo {
    /// Object group.
    pub group: u8,
    /// Object variation.
    pub variation: u8,
    /// Range qualifier octet.
    pub qualifier: u8,
}

/// Outcome reported through [`ReadHandler::on_task_complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskResult {
    /// The response arrived and was dispatched.
    Success,
    /// The outstation answered with an IIN2 error.
    Failure,
    /// No response within the configured window.
    Timeout,
}

/// Receiver of measurement data and task lifecycle notifications.
pub trait ReadHandler: Send + Sync {
    /// A response fragment is about to be dispatched.
    fn on_begin_fragment(&self, _info: &FragmentInfo) {}

    /// The fragment's object headers have all been dispatched.
    fn on_end_fragment(&self, _info: &FragmentInfo) {}

    /// Binary input values (groups 1 and 2), indexed by point number.
    fn process_binary(&self, _info: &HeaderInfo, _values: &[(u16, Binary)]) {}

    /// Double-bit binary values (group 3).
    fn process_double_bit(&self, _info: &HeaderInfo, _values: &[(u16, DoubleBitBinary)]) {}

    /// Analog input values (groups 30 and 32).
    fn process_analog(&self, _info: &HeaderInfo, _values: &[(u16, Analog)]) {}

    /// Counter values (groups 20 and 22).
    fn process_counter(&self, _info: &HeaderInfo, _values: &[(u16, Counter)]) {}

    /// Frozen counter values (group 21).
    fn process_frozen_counter(&self, _info: &HeaderInfo, _values: &[(u16, FrozenCounter)]) {}

    /// Binary output status values (group 10).
    fn process_binary_output_status(&self, _info: &HeaderInfo, _values: &[(u16, BinaryOutputStatus)]) {
    }

    /// Analog output status values (group 40).
    fn process_analog_output_status(&self, _info: &HeaderInfo, _values: &[(u16, AnalogOutputStatus)]) {
    }

    /// The IIN octets of any received response.
    fn on_receive_iin(&self, _iin: Iin) {}

    /// A task started executing.
    fn on_task_start(&self, _kind: &TaskKind) {}

    /// A task finished.
    fn on_task_complete(&self, _kind: &TaskKind, _result: TaskResult) {}

    /// Wall-clock source for time synchronization writes.
    fn get_time(&self) -> DnpTime {
        DnpTime::now()
    }
}

/// Handler that drops everything; useful for link-only applications and
/// tests.
#[derive(Debug, Default)]
pub struct NullReadHandler;

impl ReadHandler for NullReadHandler {}
