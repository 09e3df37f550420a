// SPDX-License-Identifier: GPL-2.0

//! Periodic DFS status tracing.
//!
//! While the interval is non-zero a worker thread snapshots the DFS status and emits it as a
//! trace event, then sleeps for the interval. The interval may change while the worker runs; the
//! new value applies from the next sleep on.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, warn};

use crate::dfs::{lock, Dfs};
use crate::error::{Error, Result};
use crate::trace::{TraceEvent, FTRACE_DDR_NAME};

/// Longest accepted poll interval, in milliseconds.
pub const TRACE_POLL_MAX_MS: u32 = 5000;

struct Shared {
    interval_ms: AtomicU32,
    stopped: Mutex<bool>,
    wake: Condvar,
}

struct Worker {
    shared: Arc<Shared>,
    handle: JoinHandle<()>,
}

struct PollState {
    interval_ms: u32,
    worker: Option<Worker>,
}

/// The trace poll worker and its interval.
pub struct TracePoller {
    state: Mutex<PollState>,
}

impl Default for TracePoller {
    fn default() -> Self {
        Self::new()
    }
}

impl TracePoller {
    /// Creates a stopped poller.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PollState {
                interval_ms: 0,
                worker: None,
            }),
        }
    }

    /// Current interval in milliseconds; 0 when stopped.
    pub fn interval(&self) -> u32 {
        lock(&self.state).interval_ms
    }

    /// Returns true while a worker is running.
    pub fn is_running(&self) -> bool {
        lock(&self.state).worker.is_some()
    }

    /// Sets the poll interval, capped at [`TRACE_POLL_MAX_MS`].
    ///
    /// Going from 0 to non-zero starts the worker with an immediate first poll. Going to 0 stops
    /// it and waits until it has exited.
    pub fn set_interval(&self, dfs: &Arc<Dfs>, time: u32) -> Result {
        let time = time.min(TRACE_POLL_MAX_MS);
        let mut state = lock(&self.state);

        if state.interval_ms == 0 && time != 0 {
            state.worker = Some(spawn(dfs.clone(), time)?);
        } else if state.interval_ms != 0 && time == 0 {
            if let Some(worker) = state.worker.take() {
                cancel(worker);
            }
        } else if let Some(worker) = &state.worker {
            worker.shared.interval_ms.store(time, Ordering::Relaxed);
        }
        state.interval_ms = time;
        Ok(())
    }

    /// Stops the worker, if any, and resets the interval to 0.
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        if let Some(worker) = state.worker.take() {
            cancel(worker);
        }
        state.interval_ms = 0;
    }
}

impl Drop for TracePoller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn(dfs: Arc<Dfs>, interval_ms: u32) -> Result<Worker> {
    let shared = Arc::new(Shared {
        interval_ms: AtomicU32::new(interval_ms),
        stopped: Mutex::new(false),
        wake: Condvar::new(),
    });
    let worker_shared = shared.clone();
    let handle = thread::Builder::new()
        .name("dfs-trace-poll".into())
        .spawn(move || run(&dfs, &worker_shared))
        .map_err(|e| {
            error!("trace poll: cannot start worker: {e}");
            Error::InvalidArgument
        })?;
    Ok(Worker { shared, handle })
}

fn cancel(worker: Worker) {
    *lock(&worker.shared.stopped) = true;
    worker.shared.wake.notify_all();
    if worker.handle.join().is_err() {
        warn!("trace poll worker panicked");
    }
}

fn run(dfs: &Dfs, shared: &Shared) {
    loop {
        poll_all_status(dfs);

        let interval = u64::from(shared.interval_ms.load(Ordering::Relaxed));
        let interval = Duration::from_millis(interval);
        let stopped = lock(&shared.stopped);
        let (stopped, _) = shared
            .wake
            .wait_timeout_while(stopped, interval, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        if *stopped {
            break;
        }
    }
}

/// Emits one status snapshot. Values that cannot be read are reported as 0.
pub fn poll_all_status(dfs: &Dfs) {
    let cur_freq = dfs.cur_freq().unwrap_or(0);
    dfs.emit(TraceEvent::Poll {
        cur_freq,
        ap_freq: dfs.ap_freq().unwrap_or(0),
        cp_freq: dfs.cp_freq().unwrap_or(0),
        force_freq: dfs.forced_freq().unwrap_or(0),
        on_off: dfs.status().unwrap_or(0),
        auto_on_off: dfs.auto_status().unwrap_or(0),
    });
    dfs.emit(TraceEvent::ClockSetRate {
        name: FTRACE_DDR_NAME,
        rate: cur_freq,
    });
}
