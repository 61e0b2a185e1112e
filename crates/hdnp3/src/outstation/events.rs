// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Class-partitioned event buffers.
//!
//! Three FIFO queues, one per event class, each capped at a configured
//! maximum. When a queue is full the oldest event is dropped to make room
//! and the overflow indication latches until the next read reports it.

use std::collections::VecDeque;

use super::database::{ChangeEvent, EventClass};

/// Buffer capacities.
#[derive(Debug, Clone)]
pub struct EventBufferConfig {
    /// Maximum queued class 1 events.
    pub max_class1: usize,
    /// Maximum queued class 2 events.
    pub max_class2: usize,
    /// Maximum queued class 3 events.
    pub max_class3: usize,
}

impl Default for EventBufferConfig {
    fn default() -> Self {
        Self {
            max_class1: 100,
            max_class2: 100,
            max_class3: 100,
        }
    }
}

/// Event counters.
#[derive(Debug, Default, Clone)]
pub struct EventStats {
    /// Events accepted into a buffer.
    pub queued: u64,
    /// Events dropped by the drop-oldest policy.
    pub dropped: u64,
}

/// The three class queues.
pub struct EventBuffers {
    config: EventBufferConfig,
    class1: VecDeque<ChangeEvent>,
    class2: VecDeque<ChangeEvent>,
    class3: VecDeque<ChangeEvent>,
    overflowed: bool,
    stats: EventStats,
}

impl EventBuffers {
    /// Empty buffers.
    #[must_use]
    pub fn new(config: EventBufferConfig) -> Self {
        Self {
            config,
            class1: VecDeque::new(),
            class2: VecDeque::new(),
            class3: VecDeque::new(),
            overflowed: false,
            stats: EventStats::default(),
        }
    }

    /// Counters snapshot.
    #[must_use]
    pub fn stats(&self) -> EventStats {
        self.stats.clone()
    }

    fn queue(&mut self, class: EventClass) -> (&mut VecDeque<ChangeEvent>, usize) {
        match class {
            EventClass::Class1 | EventClass::None => (&mut self.class1, self.config.max_class1),
            EventClass::Class2 => (&mut self.class2, self.config.max_class2),
            EventClass::Class3 => (&mut self.class3, self.config.max_class3),
        }
    }

    /// Queue one event, dropping the oldest of its class when full.
    pub fn push(&mut self, event: ChangeEvent) {
        debug_assert!(event.class != EventClass::None);
        let (queue, max) = self.queue(event.class);
        let dropped_oldest = if queue.len() >= max {
            queue.pop_front();
            true
        } else {
            false
        };
        queue.push_back(event);

        if dropped_oldest {
            self.overflowed = true;
            self.stats.dropped += 1;
        }
        self.stats.queued += 1;
    }

    /// Queued events per class.
    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.class1.len(), self.class2.len(), self.class3.len())
    }

    /// Whether a class has events queued.
    #[must_use]
    pub fn has_events(&self, class: EventClass) -> bool {
        match class {
            EventClass::None => false,
            EventClass::Class1 => !self.class1.is_empty(),
            EventClass::Class2 => !self.class2.is_empty(),
            EventClass::Class3 => !self.class3.is_empty(),
        }
    }

    /// Remove and return all events of one class, oldest first.
    pub fn drain_class(&mut self, class: EventClass) -> Vec<ChangeEvent> {
        match class {
            EventClass::None => Vec::new(),
            EventClass::Class1 => self.class1.drain(..).collect(),
            EventClass::Class2 => self.class2.drain(..).collect(),
            EventClass::Class3 => self.class3.drain(..).collect(),
        }
    }

    /// Put drained events back at the front, preserving their order
    /// (unsolicited retry exhausted without a confirm).
    pub fn restore(&mut self, events: Vec<ChangeEvent>) {
        for event in events.into_iter().rev() {
            let (queue, max) = self.queue(event.class);
            if queue.len() >= max {
                // The buffer refilled while the events were in flight; the
                // restored event is older than everything queued, drop it.
                self.overflowed = true;
                self.stats.dropped += 1;
                continue;
            }
            queue.push_front(event);
        }
    }

    /// Consume the latched overflow indication.
    pub fn take_overflowed(&mut self) -> bool {
        std::mem::take(&mut self.overflowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::measurement::{Binary, Measurement};

    fn event(index: u16, class: EventClass) -> ChangeEvent {
        ChangeEvent {
            index,
            class,
            variation: 2,
            measurement: Measurement::Binary(Binary::default()),
        }
    }

    fn buffers(max: usize) -> EventBuffers {
        EventBuffers::new(EventBufferConfig {
            max_class1: max,
            max_class2: max,
            max_class3: max,
        })
    }

    #[test]
    fn test_fifo_per_class() {
        let mut b = buffers(10);
        b.push(event(1, EventClass::Class1));
        b.push(event(2, EventClass::Class2));
        b.push(event(3, EventClass::Class1));

        assert_eq!(b.counts(), (2, 1, 0));
        assert!(b.has_events(EventClass::Class1));
        assert!(!b.has_events(EventClass::Class3));

        let drained = b.drain_class(EventClass::Class1);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].index, 1, "oldest first");
        assert_eq!(drained[1].index, 3);
        assert_eq!(b.counts(), (0, 1, 0));
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut b = buffers(3);
        for i in 0..5u16 {
            b.push(event(i, EventClass::Class2));
        }

        let drained = b.drain_class(EventClass::Class2);
        let indexes: Vec<u16> = drained.iter().map(|e| e.index).collect();
        assert_eq!(indexes, [2, 3, 4], "events 0 and 1 were dropped");

        assert!(b.take_overflowed());
        assert!(!b.take_overflowed(), "overflow latch is consumed");
        assert_eq!(b.stats().dropped, 2);
    }

    #[test]
    fn test_restore_preserves_order() {
        let mut b = buffers(10);
        for i in 0..3u16 {
            b.push(event(i, EventClass::Class1));
        }
        let drained = b.drain_class(EventClass::Class1);

        // New events arrive while the drained batch is in flight
        b.push(event(10, EventClass::Class1));
        b.restore(drained);

        let all = b.drain_class(EventClass::Class1);
        let indexes: Vec<u16> = all.iter().map(|e| e.index).collect();
        assert_eq!(indexes, [0, 1, 2, 10]);
    }

    #[test]
    fn test_restore_into_full_buffer_drops() {
        let mut b = buffers(2);
        b.push(event(0, EventClass::Class3));
        b.push(event(1, EventClass::Class3));
        let drained = b.drain_class(EventClass::Class3);

        b.push(event(2, EventClass::Class3));
        b.push(event(3, EventClass::Class3));
        b.restore(drained);

        let all = b.drain_class(EventClass::Class3);
        let indexes: Vec<u16> = all.iter().map(|e| e.index).collect();
        assert_eq!(indexes, [2, 3]);
        assert!(b.take_overflowed());
    }
}
