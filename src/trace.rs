// SPDX-License-Identifier: GPL-2.0

//! DFS trace events.
//!
//! Scene transitions, status polls and sysfs writes are recorded as [`TraceEvent`]s and handed
//! to a [`TraceSink`]. They are diagnostics only; nothing reads them back to make decisions.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};
use log::trace;

use crate::vote::VoteMagic;

/// Clock name used for DDR rate events.
pub const FTRACE_DDR_NAME: &str = "unisoc-ddr";

/// One trace event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A scene was entered (`enter == true`) or exited.
    Scene {
        name: String,
        freq: u32,
        count: u32,
        magic: VoteMagic,
        enter: bool,
    },
    /// Periodic status snapshot.
    Poll {
        cur_freq: u32,
        ap_freq: u32,
        cp_freq: u32,
        force_freq: u32,
        on_off: u32,
        auto_on_off: u32,
    },
    /// A sysfs write reached the core.
    Sysfs { func: &'static str, value: u32 },
    /// Generic clock rate event.
    ClockSetRate { name: &'static str, rate: u32 },
}

/// A trace event with the time it was emitted.
#[derive(Debug, Clone)]
pub struct TraceRecord {
    /// Emission time.
    pub at: DateTime<Local>,
    /// The event.
    pub event: TraceEvent,
}

/// Receives trace events.
pub trait TraceSink: Send + Sync {
    /// Records `event`.
    fn emit(&self, event: TraceEvent);
}

/// Forwards events to the `log` facade at trace level.
#[derive(Debug, Default)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn emit(&self, event: TraceEvent) {
        match event {
            TraceEvent::Scene {
                name,
                freq,
                count,
                magic,
                enter,
            } => trace!(
                "sprd_scene: name={name} freq={freq} count={count} magic={magic:#x} enter={}",
                enter as u8
            ),
            TraceEvent::Poll {
                cur_freq,
                ap_freq,
                cp_freq,
                force_freq,
                on_off,
                auto_on_off,
            } => trace!(
                "sprd_dfs_poll: cur={cur_freq} ap={ap_freq} cp={cp_freq} force={force_freq} \
                 on_off={on_off} auto_on_off={auto_on_off}"
            ),
            TraceEvent::Sysfs { func, value } => trace!("sprd_dfs_sysfs: {func} value={value}"),
            TraceEvent::ClockSetRate { name, rate } => {
                trace!("clock_set_rate: name={name} state={rate}")
            }
        }
    }
}

/// Keeps the most recent events in memory.
pub struct TraceBuffer {
    capacity: usize,
    records: Mutex<VecDeque<TraceRecord>>,
}

impl TraceBuffer {
    /// Creates a buffer holding at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Returns the buffered events, oldest first.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| r.event.clone())
            .collect()
    }

    /// Removes and returns all buffered records.
    pub fn drain(&self) -> Vec<TraceRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }
}

impl TraceSink for TraceBuffer {
    fn emit(&self, event: TraceEvent) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if self.capacity == 0 {
            return;
        }
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(TraceRecord {
            at: Local::now(),
            event,
        });
    }
}
