// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The outstation's point database.
//!
//! Six typed arrays indexed by point number, sized once at construction.
//! Applying an update batch stores the new values and decides, per point,
//! whether a change event is generated:
//!
//! - `Force` always emits, `Suppress` never does.
//! - `Detect` emits on any change for binary-like points and on a change
//!   beyond the configured deadband for analogs and counters.
//!
//! Events are only generated for points assigned to class 1..=3.

use crate::app::measurement::{
    Analog, AnalogOutputStatus, Binary, BinaryOutputStatus, Counter, DoubleBitBinary,
    FrozenCounter, Measurement, PointType,
};

/// Event class assignment of a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    /// Class 0: static only, never generates events.
    None,
    /// Class 1 (highest priority).
    Class1,
    /// Class 2.
    Class2,
    /// Class 3 (lowest priority).
    Class3,
}

/// How an update decides whether to emit an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventMode {
    /// Emit iff the value changed beyond the point's deadband.
    Detect,
    /// Always emit.
    Force,
    /// Never emit.
    Suppress,
}

/// Per-point configuration.
#[derive(Debug, Clone, Copy)]
pub struct PointConfig {
    /// Variation used when the point appears in static responses.
    pub static_variation: u8,
    /// Variation used when the point appears as an event.
    pub event_variation: u8,
    /// Event class assignment.
    pub class: EventClass,
    /// Change threshold for analog and counter points.
    pub deadband: f64,
}

impl PointConfig {
    /// Binary-family default: g1v2 static, g2v2 events, class 1.
    #[must_use]
    pub fn binary() -> Self {
        Self {
            static_variation: 2,
            event_variation: 2,
            class: EventClass::Class1,
            deadband: 0.0,
        }
    }

    /// Analog default: g30v1 static, g32v3 events, class 2.
    #[must_use]
    pub fn analog(deadband: f64) -> Self {
        Self {
            static_variation: 1,
            event_variation: 3,
            class: EventClass::Class2,
            deadband,
        }
    }

    /// Counter default: g20v1 static, g22v1 events, class 3.
    #[must_use]
    pub fn counter(deadband: f64) -> Self {
        Self {
            static_variation: 1,
            event_variation: 1,
            class: EventClass::Class3,
            deadband,
        }
    }

    /// Output-status default: static only (class 0).
    #[must_use]
    pub fn output_status() -> Self {
        Self {
            static_variation: 2,
            event_variation: 2,
            class: EventClass::None,
            deadband: 0.0,
        }
    }
}

/// One stored point: current value plus configuration.
#[derive(Debug, Clone)]
pub struct Point<T> {
    /// Current value, flags, and timestamp.
    pub value: T,
    /// Static/event variations, class, deadband.
    pub config: PointConfig,
}

/// Database sizing and per-point configuration.
#[derive(Debug, Default, Clone)]
pub struct DatabaseConfig {
    /// Binary input points.
    pub binaries: Vec<PointConfig>,
    /// Double-bit binary input points.
    pub double_bits: Vec<PointConfig>,
    /// Analog input points.
    pub analogs: Vec<PointConfig>,
    /// Counter points.
    pub counters: Vec<PointConfig>,
    /// Frozen counter points.
    pub frozen_counters: Vec<PointConfig>,
    /// Binary output status points.
    pub binary_output_statuses: Vec<PointConfig>,
    /// Analog output status points.
    pub analog_output_statuses: Vec<PointConfig>,
}

impl DatabaseConfig {
    /// Empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `n` binary inputs with one config.
    #[must_use]
    pub fn with_binaries(mut self, n: usize, config: PointConfig) -> Self {
        self.binaries = vec![config; n];
        self
    }

    /// `n` double-bit inputs with one config.
    #[must_use]
    pub fn with_double_bits(mut self, n: usize, config: PointConfig) -> Self {
        self.double_bits = vec![config; n];
        self
    }

    /// `n` analog inputs with one config.
    #[must_use]
    pub fn with_analogs(mut self, n: usize, config: PointConfig) -> Self {
        self.analogs = vec![config; n];
        self
    }

    /// `n` counters with one config.
    #[must_use]
    pub fn with_counters(mut self, n: usize, config: PointConfig) -> Self {
        self.counters = vec![config; n];
        self
    }

    /// `n` frozen counters with one config.
    #[must_use]
    pub fn with_frozen_counters(mut self, n: usize, config: PointConfig) -> Self {
        self.frozen_counters = vec![config; n];
        self
    }

    /// `n` binary output status points with one config.
    #[must_use]
    pub fn with_binary_output_statuses(mut self, n: usize, config: PointConfig) -> Self {
        self.binary_output_statuses = vec![config; n];
        self
    }

    /// `n` analog output status points with one config.
    #[must_use]
    pub fn with_analog_output_statuses(mut self, n: usize, config: PointConfig) -> Self {
        self.analog_output_statuses = vec![config; n];
        self
    }
}

/// One point update inside a batch.
#[derive(Debug, Clone)]
pub struct Update {
    /// Point index.
    pub index: u16,
    /// New value (the variant selects the point array).
    pub measurement: Measurement,
    /// Event policy for this update.
    pub mode: EventMode,
}

impl Update {
    /// Deadband-checked update.
    #[must_use]
    pub fn detect(index: u16, measurement: Measurement) -> Self {
        Self {
            index,
            measurement,
            mode: EventMode::Detect,
        }
    }
}

/// A change event produced by an update.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Point index.
    pub index: u16,
    /// Class the event belongs to (never `None`).
    pub class: EventClass,
    /// Event variation configured for the point.
    pub variation: u8,
    /// Value at the time of the event.
    pub measurement: Measurement,
}

/// The typed point arrays.
pub struct Database {
    binaries: Vec<Point<Binary>>,
    double_bits: Vec<Point<DoubleBitBinary>>,
    analogs: Vec<Point<Analog>>,
    counters: Vec<Point<Counter>>,
    frozen_counters: Vec<Point<FrozenCounter>>,
    binary_output_statuses: Vec<Point<BinaryOutputStatus>>,
    analog_output_statuses: Vec<Point<AnalogOutputStatus>>,
}

fn build<T: Default>(configs: &[PointConfig]) -> Vec<Point<T>> {
    configs
        .iter()
        .map(|config| Point {
            value: T::default(),
            config: *config,
        })
        .collect()
}

impl Database {
    /// Build the database; sizes are fixed for the outstation's lifetime.
    #[must_use]
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            binaries: build(&config.binaries),
            double_bits: build(&config.double_bits),
            analogs: build(&config.analogs),
            counters: build(&config.counters),
            frozen_counters: build(&config.frozen_counters),
            binary_output_statuses: build(&config.binary_output_statuses),
            analog_output_statuses: build(&config.analog_output_statuses),
        }
    }

    /// Binary input points.
    #[must_use]
    pub fn binaries(&self) -> &[Point<Binary>] {
        &self.binaries
    }

    /// Double-bit input points.
    #[must_use]
    pub fn double_bits(&self) -> &[Point<DoubleBitBinary>] {
        &self.double_bits
    }

    /// Analog input points.
    #[must_use]
    pub fn analogs(&self) -> &[Point<Analog>] {
        &self.analogs
    }

    /// Counter points.
    #[must_use]
    pub fn counters(&self) -> &[Point<Counter>] {
        &self.counters
    }

    /// Frozen counter points.
    #[must_use]
    pub fn frozen_counters(&self) -> &[Point<FrozenCounter>] {
        &self.frozen_counters
    }

    /// Binary output status points.
    #[must_use]
    pub fn binary_output_statuses(&self) -> &[Point<BinaryOutputStatus>] {
        &self.binary_output_statuses
    }

    /// Analog output status points.
    #[must_use]
    pub fn analog_output_statuses(&self) -> &[Point<AnalogOutputStatus>] {
        &self.analog_output_statuses
    }

    /// Number of points of one type.
    #[must_use]
    pub fn point_count(&self, point_type: PointType) -> usize {
        match point_type {
            PointType::Binary => self.binaries.len(),
            PointType::DoubleBitBinary => self.double_bits.len(),
            PointType::Analog => self.analogs.len(),
            PointType::Counter => self.counters.len(),
            PointType::FrozenCounter => self.frozen_counters.len(),
            PointType::BinaryOutputStatus => self.binary_output_statuses.len(),
            PointType::AnalogOutputStatus => self.analog_output_statuses.len(),
        }
    }

    /// Apply a batch atomically (the caller holds the database lock for the
    /// whole batch). Returns the change events the batch produced, in batch
    /// order.
    pub fn apply(&mut self, updates: &[Update]) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        for update in updates {
            if let Some(event) = self.apply_one(update) {
                events.push(event);
            }
        }
        events
    }

    fn apply_one(&mut self, update: &Update) -> Option<ChangeEvent> {
        let index = update.index as usize;
        let (changed, config) = match &update.measurement {
            Measurement::Binary(m) => {
                let point = self.binaries.get_mut(index)?;
                let changed = point.value.value != m.value;
                point.value = *m;
                (changed, point.config)
            }
            Measurement::DoubleBitBinary(m) => {
                let point = self.double_bits.get_mut(index)?;
                let changed = point.value.value != m.value;
                point.value = *m;
                (changed, point.config)
            }
            Measurement::Analog(m) => {
                let point = self.analogs.get_mut(index)?;
                let changed = (point.value.value - m.value).abs() > point.config.deadband;
                point.value = *m;
                (changed, point.config)
            }
            Measurement::Counter(m) => {
                let point = self.counters.get_mut(index)?;
                let delta = f64::from(point.value.value.abs_diff(m.value));
                let changed = delta > point.config.deadband;
                point.value = *m;
                (changed, point.config)
            }
            Measurement::FrozenCounter(m) => {
                let point = self.frozen_counters.get_mut(index)?;
                let delta = f64::from(point.value.value.abs_diff(m.value));
                let changed = delta > point.config.deadband;
                point.value = *m;
                (changed, point.config)
            }
            Measurement::BinaryOutputStatus(m) => {
                let point = self.binary_output_statuses.get_mut(index)?;
                let changed = point.value.value != m.value;
                point.value = *m;
                (changed, point.config)
            }
            Measurement::AnalogOutputStatus(m) => {
                let point = self.analog_output_statuses.get_mut(index)?;
                let changed = point.value.value != m.value;
                point.value = *m;
                (changed, point.config)
            }
        };

        let emit = match update.mode {
            EventMode::Force => true,
            EventMode::Suppress => false,
            EventMode::Detect => changed,
        };
        if !emit || config.class == EventClass::None {
            return None;
        }
        Some(ChangeEvent {
            index: update.index,
            class: config.class,
            variation: config.event_variation,
            measurement: update.measurement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::measurement::{flags, DnpTime};

    fn binary(value: bool) -> Measurement {
        Measurement::Binary(Binary {
            value,
            flags: flags::ONLINE,
            time: DnpTime::from_millis(1000),
        })
    }

    fn analog(value: f64) -> Measurement {
        Measurement::Analog(Analog {
            value,
            flags: flags::ONLINE,
            time: DnpTime::from_millis(1000),
        })
    }

    fn counter(value: u32) -> Measurement {
        Measurement::Counter(Counter {
            value,
            flags: flags::ONLINE,
            time: DnpTime::from_millis(1000),
        })
    }

    fn test_db() -> Database {
        Database::new(
            &DatabaseConfig::new()
                .with_binaries(4, PointConfig::binary())
                .with_analogs(4, PointConfig::analog(5.0))
                .with_counters(2, PointConfig::counter(10.0)),
        )
    }

    #[test]
    fn test_sizes_fixed_at_construction() {
        let db = test_db();
        assert_eq!(db.point_count(PointType::Binary), 4);
        assert_eq!(db.point_count(PointType::Analog), 4);
        assert_eq!(db.point_count(PointType::Counter), 2);
        assert_eq!(db.point_count(PointType::DoubleBitBinary), 0);
    }

    #[test]
    fn test_binary_change_emits_event() {
        let mut db = test_db();

        // Default value is false; storing false is no change
        let events = db.apply(&[Update::detect(0, binary(false))]);
        assert!(events.is_empty());

        let events = db.apply(&[Update::detect(0, binary(true))]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].index, 0);
        assert_eq!(events[0].class, EventClass::Class1);
        assert_eq!(events[0].variation, 2);

        assert!(db.binaries()[0].value.value);
    }

    #[test]
    fn test_analog_deadband_gates_events() {
        let mut db = test_db();

        // Below the deadband of 5.0: stored, no event
        let events = db.apply(&[Update::detect(1, analog(4.0))]);
        assert!(events.is_empty());
        assert_eq!(db.analogs()[1].value.value, 4.0);

        // From 4.0 to 8.0 is still within 5.0
        let events = db.apply(&[Update::detect(1, analog(8.0))]);
        assert!(events.is_empty());

        // From 8.0 to 14.0 exceeds it
        let events = db.apply(&[Update::detect(1, analog(14.0))]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].class, EventClass::Class2);
    }

    #[test]
    fn test_counter_deadband() {
        let mut db = test_db();

        assert!(db.apply(&[Update::detect(0, counter(10))]).is_empty());
        assert_eq!(db.apply(&[Update::detect(0, counter(21))]).len(), 1);
    }

    #[test]
    fn test_force_and_suppress_modes() {
        let mut db = test_db();

        // Force emits even without a change
        let events = db.apply(&[Update {
            index: 0,
            measurement: binary(false),
            mode: EventMode::Force,
        }]);
        assert_eq!(events.len(), 1);

        // Suppress never emits, even on a change
        let events = db.apply(&[Update {
            index: 0,
            measurement: binary(true),
            mode: EventMode::Suppress,
        }]);
        assert!(events.is_empty());
        assert!(db.binaries()[0].value.value, "value stored anyway");
    }

    #[test]
    fn test_class_none_never_emits() {
        let mut db = Database::new(
            &DatabaseConfig::new().with_binaries(
                1,
                PointConfig {
                    class: EventClass::None,
                    ..PointConfig::binary()
                },
            ),
        );
        let events = db.apply(&[Update {
            index: 0,
            measurement: binary(true),
            mode: EventMode::Force,
        }]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_out_of_range_index_skipped() {
        let mut db = test_db();
        let events = db.apply(&[
            Update::detect(99, binary(true)),
            Update::detect(1, binary(true)),
        ]);
        // The bad index is skipped, the good one applies
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].index, 1);
    }

    #[test]
    fn test_batch_order_preserved() {
        let mut db = test_db();
        let events = db.apply(&[
            Update::detect(0, binary(true)),
            Update::detect(1, analog(100.0)),
            Update::detect(1, binary(true)),
        ]);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].index, 0);
        assert_eq!(events[1].index, 1);
        assert!(matches!(events[2].measurement, Measurement::Binary(_)));
    }
}
