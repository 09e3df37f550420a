// SPDX-License-Identifier: GPL-2.0

//! DDR DFS core: driver state, arbitration and the public vote API.
//!
//! Clients vote for a minimum DDR frequency by entering named scenes. For every arbitration
//! domain the core keeps the frequency it last applied and talks to the PM-system firmware only
//! when the max-vote of the domain changes.
//!
//! Two locks guard the state:
//!
//! - the scene table lock is short-held and protects activation counts and requested frequencies;
//! - `sync` is held across the whole decide-and-apply sequence, so at most one vote, forced
//!   frequency or watermark write is in flight at any time.
//!
//! The two are never nested. A vote computes its target first and only then takes `sync`, so two
//! racing votes in the same domain converge on some max-vote snapshot rather than being strictly
//! ordered.

use core::time::Duration;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use log::{error, info, warn};

use crate::config::{DfsConfig, RetryPolicy, SysfsErrors, VoteStrategy};
use crate::devfreq::{DevFreqProfile, DevfreqProfile};
use crate::error::{Error, Result};
use crate::msg::{Command, DfsLink, DEFAULT_WAIT, ON_OFF_WAIT};
use crate::scene::{SceneInfo, SceneTable};
use crate::smsg::SmsgChannel;
use crate::startup;
use crate::trace::{LogSink, TraceEvent, TraceSink};
use crate::vote::{ExtVote, ExtVoter, InlineVote, VoteEncoder, VoteMagic, MASTER_MAX, MODE_MAX};

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Progress of the startup handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupState {
    /// The worker is still running.
    Running,
    /// Tables are populated and auto DVFS is on.
    Ready,
    /// A stage failed; cached reads stay unavailable.
    Failed(Error),
    /// The device was removed before startup finished.
    Cancelled,
}

/// Frequency and watermark tables filled in by the startup worker.
pub(crate) struct Tables {
    pub(crate) freq_table: Vec<u32>,
    pub(crate) overflow: Vec<u32>,
    pub(crate) underflow: Vec<u32>,
    pub(crate) min_freq: u32,
    pub(crate) max_freq: u32,
}

/// External collaborators a DFS device is bound to.
pub struct DfsResources {
    /// SIPC channel to the PM system.
    pub channel: Arc<dyn SmsgChannel>,
    /// Register voter used with [`VoteStrategy::External`].
    pub ext_voter: Option<Arc<dyn ExtVoter>>,
    /// Trace event sink.
    pub trace: Arc<dyn TraceSink>,
}

impl DfsResources {
    /// Resources with no external voter and trace events sent to the log.
    pub fn new(channel: Arc<dyn SmsgChannel>) -> Self {
        Self {
            channel,
            ext_voter: None,
            trace: Arc::new(LogSink),
        }
    }

    /// Sets the external voter.
    pub fn with_ext_voter(mut self, voter: Arc<dyn ExtVoter>) -> Self {
        self.ext_voter = Some(voter);
        self
    }

    /// Sets the trace sink.
    pub fn with_trace(mut self, trace: Arc<dyn TraceSink>) -> Self {
        self.trace = trace;
        self
    }
}

/// State of one bound DFS device.
pub struct Dfs {
    pub(crate) link: DfsLink,
    encoder: Box<dyn VoteEncoder>,
    scenes: SceneTable,
    /// Serializes every operation that changes firmware state.
    sync: Mutex<()>,
    /// Last applied frequency per `[mode][master]`. Written only with `sync` held.
    last_vote: [[AtomicU32; MASTER_MAX]; MODE_MAX],
    /// Last successfully forced frequency. Written only with `sync` held.
    force_freq: AtomicU32,
    pub(crate) tables: Mutex<Tables>,
    pub(crate) profile: Mutex<DevfreqProfile>,
    freq_num: usize,
    backdoor_freq: u32,
    pub(crate) retry: RetryPolicy,
    sysfs_errors: SysfsErrors,
    pub(crate) init_done: AtomicBool,
    pub(crate) cancel: AtomicBool,
    startup: Mutex<StartupState>,
    startup_cv: Condvar,
    trace: Arc<dyn TraceSink>,
}

impl Dfs {
    fn new(config: &DfsConfig, res: DfsResources) -> Result<Self> {
        let encoder: Box<dyn VoteEncoder> = match (config.vote, res.ext_voter) {
            (VoteStrategy::Inline, _) => Box::new(InlineVote),
            (VoteStrategy::External, Some(voter)) => Box::new(ExtVote::new(voter)),
            (VoteStrategy::External, None) => {
                error!("external vote selected without a voter");
                return Err(Error::InvalidArgument);
            }
        };

        Ok(Self {
            link: DfsLink::new(res.channel),
            encoder,
            scenes: SceneTable::new(config.scene_table()),
            sync: Mutex::new(()),
            last_vote: Default::default(),
            force_freq: AtomicU32::new(0),
            tables: Mutex::new(Tables {
                freq_table: vec![0; config.freq_num],
                overflow: config.overflow_table(),
                underflow: config.underflow_table(),
                min_freq: 0,
                max_freq: 0,
            }),
            profile: Mutex::new(DevfreqProfile::default()),
            freq_num: config.freq_num,
            backdoor_freq: config.backdoor,
            retry: config.enable_retry,
            sysfs_errors: config.sysfs_errors,
            init_done: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
            startup: Mutex::new(StartupState::Running),
            startup_cv: Condvar::new(),
            trace: res.trace,
        })
    }

    fn ready(&self) -> Result {
        if self.is_ready() {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    /// Returns true once the startup handshake has completed.
    pub fn is_ready(&self) -> bool {
        self.init_done.load(Ordering::Acquire)
    }

    /// Returns the current startup state.
    pub fn startup_state(&self) -> StartupState {
        *lock(&self.startup)
    }

    pub(crate) fn finish_startup(&self, state: StartupState) {
        *lock(&self.startup) = state;
        self.startup_cv.notify_all();
    }

    /// Waits at most `timeout` for the startup worker to finish.
    ///
    /// Returns the stage error if startup failed and [`Error::NotInitialized`] if it is still
    /// running or was cancelled.
    pub fn wait_for_startup(&self, timeout: Duration) -> Result {
        let deadline = Instant::now() + timeout;
        let mut state = lock(&self.startup);
        loop {
            match *state {
                StartupState::Ready => return Ok(()),
                StartupState::Failed(e) => return Err(e),
                StartupState::Cancelled => return Err(Error::NotInitialized),
                StartupState::Running => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::NotInitialized);
            }
            state = self
                .startup_cv
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    pub(crate) fn emit(&self, event: TraceEvent) {
        self.trace.emit(event);
    }

    /// Sysfs write error policy of this device.
    pub fn sysfs_errors(&self) -> SysfsErrors {
        self.sysfs_errors
    }

    /// Resolves the max-vote of domain `magic` and applies it if it changed.
    ///
    /// The target is the highest frequency among the active scenes of the domain. It is sent only
    /// when it differs from what was last applied. The cache only moves on success, so a failed
    /// vote is retried by the next request.
    fn send_scene_request(&self, magic: VoteMagic) -> Result {
        let target = self.scenes.target(magic);

        let _sync = lock(&self.sync);
        let (mode, master) = magic.slot();
        let last = &self.last_vote[mode][master];
        if target == last.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.encoder.vote(&self.link, target, magic)?;
        last.store(target, Ordering::Relaxed);
        Ok(())
    }

    /// Adds an activation of scene `name` and re-resolves its domain.
    pub fn enter_scene(&self, name: &str) -> Result {
        self.ready()?;
        let id = self.scenes.find(name).map_err(|e| {
            error!("enter_scene: the scene {name} is invalid");
            e
        })?;
        let scene = self.scenes.activate(id);
        let magic = scene.magic;
        self.emit(scene_event(scene, true));
        self.send_scene_request(magic)
    }

    /// Drops an activation of scene `name` and re-resolves its domain.
    pub fn exit_scene(&self, name: &str) -> Result {
        self.ready()?;
        let id = self.scenes.find(name).map_err(|e| {
            error!("exit_scene: the scene {name} is invalid");
            e
        })?;
        let scene = self.scenes.deactivate(id);
        let magic = scene.magic;
        self.emit(scene_event(scene, false));
        self.send_scene_request(magic)
    }

    /// Changes the frequency scene `name` asks for.
    ///
    /// Takes effect immediately if the scene is active, otherwise on its next activation.
    pub fn set_scene_freq(&self, name: &str, freq: u32) -> Result {
        self.ready()?;
        let id = self.scenes.find(name).map_err(|e| {
            error!("set_scene_freq: the scene {name} is invalid");
            e
        })?;
        let magic = self.scenes.set_freq(id, freq);
        self.send_scene_request(magic)
    }

    /// Sets the DDR frequency directly, bypassing scene arbitration.
    pub fn force_freq(&self, freq: u32) -> Result {
        self.ready()?;
        let _sync = lock(&self.sync);
        self.link.call(Command::SetDdrFreq, freq, DEFAULT_WAIT)?;
        self.force_freq.store(freq, Ordering::Relaxed);
        Ok(())
    }

    /// Forces the configured backdoor frequency.
    pub fn set_backdoor(&self) -> Result {
        if self.backdoor_freq == 0 {
            return Err(Error::InvalidArgument);
        }
        self.force_freq(self.backdoor_freq)
    }

    /// Leaves the backdoor by handing control back to auto DVFS.
    ///
    /// The frequency in effect before the backdoor is not restored.
    pub fn reset_backdoor(&self) -> Result {
        if self.backdoor_freq == 0 {
            return Err(Error::InvalidArgument);
        }
        self.auto_enable()
    }

    /// Enables DVFS on the firmware side.
    pub fn enable(&self) -> Result {
        self.link.call(Command::Enable, 0, ON_OFF_WAIT).map(drop)
    }

    /// Disables DVFS on the firmware side.
    pub fn disable(&self) -> Result {
        self.link.call(Command::Disable, 0, ON_OFF_WAIT).map(drop)
    }

    /// Enables hardware-driven automatic DVFS.
    pub fn auto_enable(&self) -> Result {
        self.link.call(Command::AutoEnable, 0, ON_OFF_WAIT).map(drop)
    }

    /// Disables hardware-driven automatic DVFS.
    pub fn auto_disable(&self) -> Result {
        self.link.call(Command::AutoDisable, 0, ON_OFF_WAIT).map(drop)
    }

    /// Queries whether DVFS is enabled.
    pub fn status(&self) -> Result<u32> {
        self.link.call(Command::InqStatus, 0, DEFAULT_WAIT)
    }

    /// Queries whether automatic DVFS is enabled.
    pub fn auto_status(&self) -> Result<u32> {
        self.link.call(Command::InqAutoStatus, 0, DEFAULT_WAIT)
    }

    /// Number of frequency levels.
    pub fn freq_num(&self) -> usize {
        self.freq_num
    }

    fn check_index(&self, sel: usize) -> Result<u32> {
        if sel >= self.freq_num {
            return Err(Error::InvalidArgument);
        }
        u32::try_from(sel).map_err(|_| Error::InvalidArgument)
    }

    /// Frequency of level `sel`.
    pub fn freq_table(&self, sel: usize) -> Result<u32> {
        let idx = self.check_index(sel)?;
        if !self.is_ready() {
            return self.link.call(Command::InqDdrTable, idx, DEFAULT_WAIT);
        }
        Ok(lock(&self.tables).freq_table[sel])
    }

    /// Queries the current DDR frequency.
    pub fn cur_freq(&self) -> Result<u32> {
        self.link.call(Command::InqDdrFreq, 0, DEFAULT_WAIT)
    }

    /// Frequency last applied for the default application-processor domain.
    pub fn ap_freq(&self) -> Result<u32> {
        self.ready()?;
        let (mode, master) = VoteMagic::DEFAULT.slot();
        Ok(self.last_vote[mode][master].load(Ordering::Relaxed))
    }

    /// Queries the frequency the communication processors vote for.
    pub fn cp_freq(&self) -> Result<u32> {
        self.link.call(Command::InqCpFreq, 0, DEFAULT_WAIT)
    }

    /// Last successfully forced frequency.
    pub fn forced_freq(&self) -> Result<u32> {
        self.ready()?;
        Ok(self.force_freq.load(Ordering::Relaxed))
    }

    /// Frequency last applied for domain `magic`.
    pub fn domain_freq(&self, magic: VoteMagic) -> u32 {
        let (mode, master) = magic.slot();
        self.last_vote[mode][master].load(Ordering::Relaxed)
    }

    /// Overflow watermark of level `sel`.
    pub fn overflow(&self, sel: usize) -> Result<u32> {
        let idx = self.check_index(sel)?;
        if !self.is_ready() {
            return self.link.call(Command::InqOverflow, idx, DEFAULT_WAIT);
        }
        Ok(lock(&self.tables).overflow[sel])
    }

    /// Underflow watermark of level `sel`.
    pub fn underflow(&self, sel: usize) -> Result<u32> {
        let idx = self.check_index(sel)?;
        if !self.is_ready() {
            return self.link.call(Command::InqUnderflow, idx, DEFAULT_WAIT);
        }
        Ok(lock(&self.tables).underflow[sel])
    }

    /// Firmware polling interval in milliseconds.
    pub fn timer(&self) -> Result<u32> {
        if !self.is_ready() {
            return self.link.call(Command::InqTimer, 0, DEFAULT_WAIT);
        }
        Ok(lock(&self.profile).polling_ms)
    }

    /// Number of configured scenes.
    pub fn scene_num(&self) -> usize {
        self.scenes.len()
    }

    /// Snapshot of scene `index`.
    pub fn scene_info(&self, index: usize) -> Result<SceneInfo> {
        self.scenes.info(index)
    }

    /// Pushes the overflow watermark of level `sel`.
    pub fn set_overflow(&self, value: u32, sel: usize) -> Result {
        self.check_index(sel)?;
        let cmd = Command::para_overflow(sel)?;
        let _sync = lock(&self.sync);
        self.link.call(cmd, value, DEFAULT_WAIT)?;
        if self.is_ready() {
            lock(&self.tables).overflow[sel] = value;
        }
        Ok(())
    }

    /// Pushes the underflow watermark of level `sel`.
    pub fn set_underflow(&self, value: u32, sel: usize) -> Result {
        self.check_index(sel)?;
        let cmd = Command::para_underflow(sel)?;
        let _sync = lock(&self.sync);
        self.link.call(cmd, value, DEFAULT_WAIT)?;
        if self.is_ready() {
            lock(&self.tables).underflow[sel] = value;
        }
        Ok(())
    }

    /// Lowest and highest frequency level, known once startup has pulled the table.
    pub fn freq_bounds(&self) -> (u32, u32) {
        let tables = lock(&self.tables);
        (tables.min_freq, tables.max_freq)
    }

    /// Platform resume: replays hardware vote state.
    pub fn resume(&self) {
        self.encoder.resume();
    }
}

impl DevFreqProfile for Dfs {
    fn target(&self, freq: u64) -> Result {
        let freq = u32::try_from(freq).map_err(|_| Error::InvalidArgument)?;
        self.force_freq(freq).map_err(|e| {
            error!("dfs_freq_target: set freq fail: {e}");
            e
        })
    }

    fn profile(&self) -> DevfreqProfile {
        *lock(&self.profile)
    }

    fn freq_bounds(&self) -> (u64, u64) {
        let (min, max) = Dfs::freq_bounds(self);
        (u64::from(min), u64::from(max))
    }
}

fn scene_event(scene: SceneInfo, enter: bool) -> TraceEvent {
    TraceEvent::Scene {
        name: scene.name,
        freq: scene.freq,
        count: scene.count,
        magic: scene.magic,
        enter,
    }
}

/// The `sprd,dfs` platform driver.
///
/// Only one device can be bound at a time.
#[derive(Default)]
pub struct DfsDriver {
    bound: Mutex<Option<(Arc<Dfs>, JoinHandle<()>)>>,
}

impl DfsDriver {
    /// Creates an unbound driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a device described by `config` and starts the startup worker.
    pub fn probe(&self, config: &DfsConfig, res: DfsResources) -> Result<Arc<Dfs>> {
        let mut bound = lock(&self.bound);
        if bound.is_some() {
            error!("dfs core can be used by a single device only");
            return Err(Error::AlreadyProbed);
        }
        config.validate().map_err(|e| {
            error!("dfs probe: {e}");
            Error::InvalidArgument
        })?;

        let dfs = Arc::new(Dfs::new(config, res)?);
        let worker = startup::spawn(dfs.clone())?;
        info!(
            "dfs probed: {} levels, {} scenes",
            dfs.freq_num(),
            dfs.scene_num()
        );
        *bound = Some((dfs.clone(), worker));
        Ok(dfs)
    }

    /// Returns the bound device, if any.
    pub fn device(&self) -> Option<Arc<Dfs>> {
        lock(&self.bound).as_ref().map(|(dfs, _)| dfs.clone())
    }

    /// Unbinds the device, stopping a startup worker that is still retrying.
    pub fn remove(&self) -> Result {
        let (dfs, worker) = lock(&self.bound).take().ok_or(Error::NotInitialized)?;
        dfs.cancel.store(true, Ordering::Release);
        if worker.join().is_err() {
            warn!("dfs startup worker panicked");
        }
        Ok(())
    }
}
