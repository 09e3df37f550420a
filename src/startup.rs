// SPDX-License-Identifier: GPL-2.0

//! Startup handshake with the PM-system firmware.
//!
//! Probe returns right away and leaves the handshake to a worker thread, since the firmware may
//! take a while to come up. Until the worker finishes, cached queries fall through to the remote
//! and scene votes are refused.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info, warn};

use crate::devfreq::DevfreqProfile;
use crate::dfs::{lock, Dfs, StartupState};
use crate::error::{Error, Result};
use crate::smsg::{SIPC_ID_PM_SYS, SMSG_CH_PM_CTRL};

/// Name of the startup thread.
pub fn thread_name() -> String {
    format!("dfs-{SIPC_ID_PM_SYS}-{SMSG_CH_PM_CTRL}")
}

/// Spawns the startup worker for `dfs`.
pub(crate) fn spawn(dfs: Arc<Dfs>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(thread_name())
        .spawn(move || {
            let state = match run(&dfs) {
                Ok(()) => StartupState::Ready,
                Err(_) if cancelled(&dfs) => StartupState::Cancelled,
                Err(e) => StartupState::Failed(e),
            };
            dfs.finish_startup(state);
        })
        .map_err(|e| {
            error!("create dfs thread error: {e}");
            Error::InvalidArgument
        })
}

fn cancelled(dfs: &Dfs) -> bool {
    dfs.cancel.load(Ordering::Acquire)
}

/// Fails with [`Error::NotInitialized`] once the device is being removed.
fn check_cancel(dfs: &Dfs) -> Result {
    if cancelled(dfs) {
        info!("dfs startup cancelled");
        return Err(Error::NotInitialized);
    }
    Ok(())
}

fn run(dfs: &Dfs) -> Result {
    dfs.link.open()?;
    enable(dfs)?;
    check_cancel(dfs)?;
    pull_freq_table(dfs)?;
    check_cancel(dfs)?;
    sync_overflow(dfs)?;
    check_cancel(dfs)?;
    sync_underflow(dfs)?;
    check_cancel(dfs)?;
    read_profile(dfs)?;
    set_bounds(dfs);
    check_cancel(dfs)?;
    dfs.auto_enable().map_err(|e| {
        error!("dfs auto enable failed: {e}");
        e
    })?;
    dfs.init_done.store(true, Ordering::Release);
    info!("dfs startup done");
    Ok(())
}

/// Keeps asking the firmware to enable DVFS until it agrees.
fn enable(dfs: &Dfs) -> Result {
    let policy = dfs.retry;
    let mut attempts = 0u32;
    loop {
        check_cancel(dfs)?;
        let err = match dfs.enable() {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        attempts = attempts.saturating_add(1);
        if policy.max_attempts.is_some_and(|max| attempts >= max) {
            error!("dfs enable failed after {attempts} attempts: {err}");
            return Err(err);
        }
        warn!("dfs enable failed: {err}, retrying");
        if policy.backoff_ms != 0 {
            thread::sleep(Duration::from_millis(policy.backoff_ms));
        }
    }
}

fn pull_freq_table(dfs: &Dfs) -> Result {
    for sel in 0..dfs.freq_num() {
        let freq = dfs.freq_table(sel).map_err(|e| {
            error!("dfs get freq table {sel} failed: {e}");
            e
        })?;
        lock(&dfs.tables).freq_table[sel] = freq;
    }
    Ok(())
}

/// Pushes configured watermarks, or pulls the firmware's when none are configured.
fn sync_overflow(dfs: &Dfs) -> Result {
    let configured = lock(&dfs.tables).overflow.clone();
    if configured.first().is_some_and(|&v| v != 0) {
        for (sel, &value) in configured.iter().enumerate() {
            dfs.set_overflow(value, sel).map_err(|e| {
                error!("dfs set overflow {sel} failed: {e}");
                e
            })?;
        }
    } else {
        for sel in 0..dfs.freq_num() {
            let value = dfs.overflow(sel).map_err(|e| {
                error!("dfs get overflow {sel} failed: {e}");
                e
            })?;
            lock(&dfs.tables).overflow[sel] = value;
        }
    }
    Ok(())
}

fn sync_underflow(dfs: &Dfs) -> Result {
    let configured = lock(&dfs.tables).underflow.clone();
    if configured.first().is_some_and(|&v| v != 0) {
        for (sel, &value) in configured.iter().enumerate() {
            dfs.set_underflow(value, sel).map_err(|e| {
                error!("dfs set underflow {sel} failed: {e}");
                e
            })?;
        }
    } else {
        for sel in 0..dfs.freq_num() {
            let value = dfs.underflow(sel).map_err(|e| {
                error!("dfs get underflow {sel} failed: {e}");
                e
            })?;
            lock(&dfs.tables).underflow[sel] = value;
        }
    }
    Ok(())
}

fn read_profile(dfs: &Dfs) -> Result {
    let initial_freq = dfs.cur_freq().map_err(|e| {
        error!("dfs get current freq failed: {e}");
        e
    })?;
    let polling_ms = dfs.timer().map_err(|e| {
        error!("dfs get timer failed: {e}");
        e
    })?;
    *lock(&dfs.profile) = DevfreqProfile {
        initial_freq: u64::from(initial_freq),
        polling_ms,
    };
    Ok(())
}

fn set_bounds(dfs: &Dfs) {
    let mut tables = lock(&dfs.tables);
    tables.min_freq = tables.freq_table.first().copied().unwrap_or(0);
    tables.max_freq = tables.freq_table.last().copied().unwrap_or(0);
}
