// SPDX-License-Identifier: GPL-2.0

//! A simulated PM-system DFS firmware.
//!
//! [`SimFirmware`] implements [`SmsgChannel`] and answers DFS requests the way the firmware
//! does: it keeps per-domain votes, frequency and watermark tables, and the enable flags. Faults
//! can be injected per command, and every request is counted so callers can check exactly which
//! commands a code path sent.

use core::time::Duration;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use log::debug;

use crate::dfs::lock;
use crate::msg::{Command, RetStatus};
use crate::smsg::{
    SipcError, Smsg, SmsgChannel, SMSG_CH_PM_CTRL, SMSG_TYPE_DFS, SMSG_TYPE_DFS_RSP,
};
use crate::vote::ums512::FREQ_TABLE;

/// Default firmware polling interval in milliseconds.
pub const SIM_TIMER_MS: u32 = 40;

/// An injected reply status.
#[derive(Debug, Clone, Copy)]
struct Fault {
    /// Command the fault applies to; any command when `None`.
    cmd: Option<u16>,
    status: RetStatus,
}

struct FwState {
    enabled: bool,
    auto_enabled: bool,
    freq_table: Vec<u32>,
    overflow: Vec<u32>,
    underflow: Vec<u32>,
    timer_ms: u32,
    cp_freq: u32,
    votes: HashMap<u32, u32>,
    forced: Option<u32>,
    faults: VecDeque<Fault>,
    enable_gate_closed: bool,
    open_failures: usize,
    send_failures: usize,
    dropped_replies: usize,
    calls: HashMap<u16, usize>,
    log: Vec<Smsg>,
}

/// Simulated firmware end of the PM control channel.
pub struct SimFirmware {
    state: Mutex<FwState>,
    replies: Mutex<VecDeque<Smsg>>,
    reply_ready: Condvar,
    in_flight: AtomicBool,
    overlaps: AtomicUsize,
    latency: Mutex<Duration>,
}

impl Default for SimFirmware {
    fn default() -> Self {
        Self::new(FREQ_TABLE.to_vec())
    }
}

impl SimFirmware {
    /// Creates a firmware with the given frequency levels, DVFS off.
    pub fn new(freq_table: Vec<u32>) -> Self {
        let levels = freq_table.len();
        Self {
            state: Mutex::new(FwState {
                enabled: false,
                auto_enabled: false,
                freq_table,
                overflow: (1..=levels as u32).map(|i| i * 100).collect(),
                underflow: (1..=levels as u32).map(|i| i * 10).collect(),
                timer_ms: SIM_TIMER_MS,
                cp_freq: 0,
                votes: HashMap::new(),
                forced: None,
                faults: VecDeque::new(),
                enable_gate_closed: false,
                open_failures: 0,
                send_failures: 0,
                dropped_replies: 0,
                calls: HashMap::new(),
                log: Vec::new(),
            }),
            replies: Mutex::new(VecDeque::new()),
            reply_ready: Condvar::new(),
            in_flight: AtomicBool::new(false),
            overlaps: AtomicUsize::new(0),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    /// Delays every reply by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    /// Answers the next `cmd` request with `status`.
    pub fn inject(&self, cmd: Command, status: RetStatus) {
        lock(&self.state).faults.push_back(Fault {
            cmd: Some(cmd.code()),
            status,
        });
    }

    /// Answers the next request, whatever it is, with `status`.
    pub fn inject_any(&self, status: RetStatus) {
        lock(&self.state).faults.push_back(Fault { cmd: None, status });
    }

    /// Makes `Enable` answer `AdjBusy` until [`open_enable_gate`] is called.
    ///
    /// [`open_enable_gate`]: SimFirmware::open_enable_gate
    pub fn close_enable_gate(&self) {
        lock(&self.state).enable_gate_closed = true;
    }

    /// Lets `Enable` succeed again.
    pub fn open_enable_gate(&self) {
        lock(&self.state).enable_gate_closed = false;
    }

    /// Fails the next `n` channel opens.
    pub fn fail_opens(&self, n: usize) {
        lock(&self.state).open_failures = n;
    }

    /// Fails the next `n` sends.
    pub fn fail_sends(&self, n: usize) {
        lock(&self.state).send_failures = n;
    }

    /// Swallows the replies to the next `n` requests.
    pub fn drop_replies(&self, n: usize) {
        lock(&self.state).dropped_replies = n;
    }

    /// Sets the frequency the communication processors ask for.
    pub fn set_cp_freq(&self, freq: u32) {
        lock(&self.state).cp_freq = freq;
    }

    /// Number of `cmd` requests received.
    pub fn count(&self, cmd: Command) -> usize {
        lock(&self.state)
            .calls
            .get(&cmd.code())
            .copied()
            .unwrap_or(0)
    }

    /// Number of requests received.
    pub fn total_calls(&self) -> usize {
        lock(&self.state).calls.values().sum()
    }

    /// Forgets the request counters and log.
    pub fn reset_counts(&self) {
        let mut state = lock(&self.state);
        state.calls.clear();
        state.log.clear();
    }

    /// Every request received since the last reset, oldest first.
    pub fn requests(&self) -> Vec<Smsg> {
        lock(&self.state).log.clone()
    }

    /// Number of times a request arrived while another one was unanswered.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::Relaxed)
    }

    /// Frequency last voted for raw domain `magic`.
    pub fn vote(&self, magic: u32) -> Option<u32> {
        lock(&self.state).votes.get(&magic).copied()
    }

    /// Frequency last forced, if any.
    pub fn forced(&self) -> Option<u32> {
        lock(&self.state).forced
    }

    /// Current overflow watermarks.
    pub fn overflow(&self) -> Vec<u32> {
        lock(&self.state).overflow.clone()
    }

    /// Current underflow watermarks.
    pub fn underflow(&self) -> Vec<u32> {
        lock(&self.state).underflow.clone()
    }

    /// Returns `(enabled, auto_enabled)`.
    pub fn enabled(&self) -> (bool, bool) {
        let state = lock(&self.state);
        (state.enabled, state.auto_enabled)
    }

    /// Current DDR frequency.
    pub fn cur_freq(&self) -> u32 {
        lock(&self.state).cur_freq()
    }
}

impl FwState {
    /// Snaps `freq` up to the first level that satisfies it.
    fn snap(&self, freq: u32) -> u32 {
        self.freq_table
            .iter()
            .copied()
            .find(|&f| f >= freq)
            .or_else(|| self.freq_table.last().copied())
            .unwrap_or(freq)
    }

    fn cur_freq(&self) -> u32 {
        if let Some(forced) = self.forced {
            return forced;
        }
        let max = self.votes.values().copied().max().unwrap_or(0);
        self.snap(max)
    }

    fn handle(&mut self, flag: u16, value: u32) -> (RetStatus, u32) {
        let Some(cmd) = Command::from_code(flag) else {
            return (RetStatus::InvalidCmd, self.cur_freq());
        };
        let sel = value as usize;
        match cmd {
            Command::Normal => {
                if !self.enabled {
                    return (RetStatus::Disable, self.cur_freq());
                }
                self.votes.insert(value >> 16, value & 0xffff);
                (RetStatus::AdjOk, self.cur_freq())
            }
            Command::Enable => {
                if self.enable_gate_closed {
                    return (RetStatus::AdjBusy, self.cur_freq());
                }
                self.enabled = true;
                (RetStatus::OnOffSucceed, 0)
            }
            Command::Disable => {
                self.enabled = false;
                (RetStatus::OnOffSucceed, 0)
            }
            Command::AutoEnable => {
                self.auto_enabled = true;
                self.forced = None;
                (RetStatus::OnOffSucceed, 0)
            }
            Command::AutoDisable => {
                self.auto_enabled = false;
                (RetStatus::OnOffSucceed, 0)
            }
            Command::AxiEnable | Command::AxiDisable => (RetStatus::OnOffSucceed, 0),
            Command::InqDdrFreq => (RetStatus::InqSucceed, self.cur_freq()),
            Command::InqApFreq => (
                RetStatus::InqSucceed,
                self.votes.get(&0).copied().unwrap_or(0),
            ),
            Command::InqCpFreq => (RetStatus::InqSucceed, self.cp_freq),
            Command::InqDdrTable => match self.freq_table.get(sel) {
                Some(&f) => (RetStatus::InqSucceed, f),
                None => (RetStatus::InqFail, 0),
            },
            Command::InqCount => (RetStatus::InqSucceed, self.freq_table.len() as u32),
            Command::InqStatus => (RetStatus::InqSucceed, u32::from(self.enabled)),
            Command::InqAutoStatus => (RetStatus::InqSucceed, u32::from(self.auto_enabled)),
            Command::InqOverflow => match self.overflow.get(sel) {
                Some(&v) => (RetStatus::InqSucceed, v),
                None => (RetStatus::InqFail, 0),
            },
            Command::InqUnderflow => match self.underflow.get(sel) {
                Some(&v) => (RetStatus::InqSucceed, v),
                None => (RetStatus::InqFail, 0),
            },
            Command::InqTimer => (RetStatus::InqSucceed, self.timer_ms),
            Command::InqAxi | Command::InqAxiWltc | Command::InqAxiRltc => {
                (RetStatus::InqSucceed, 0)
            }
            Command::SetDdrFreq => {
                self.forced = Some(self.snap(value));
                (RetStatus::SetSucceed, self.cur_freq())
            }
            Command::SetCalFreq => (RetStatus::SetSucceed, value),
            Command::ParaOverflow(i) => match self.overflow.get_mut(usize::from(i)) {
                Some(slot) => {
                    *slot = value;
                    (RetStatus::ParaOk, value)
                }
                None => (RetStatus::InvalidCmd, 0),
            },
            Command::ParaUnderflow(i) => match self.underflow.get_mut(usize::from(i)) {
                Some(slot) => {
                    *slot = value;
                    (RetStatus::ParaOk, value)
                }
                None => (RetStatus::InvalidCmd, 0),
            },
            Command::ParaTimer => {
                self.timer_ms = value;
                (RetStatus::ParaOk, value)
            }
            Command::SetAxiWltc | Command::SetAxiRltc => (RetStatus::ParaOk, value),
            Command::Debug => (RetStatus::DebugOk, 0),
        }
    }

    fn take_fault(&mut self, flag: u16) -> Option<RetStatus> {
        let idx = self
            .faults
            .iter()
            .position(|f| f.cmd.map_or(true, |c| c == flag))?;
        self.faults.remove(idx).map(|f| f.status)
    }
}

impl SmsgChannel for SimFirmware {
    fn open(&self, _dst: u8, channel: u8) -> Result<(), SipcError> {
        if channel != SMSG_CH_PM_CTRL {
            return Err(SipcError::NoDevice);
        }
        let mut state = lock(&self.state);
        if state.open_failures > 0 {
            state.open_failures -= 1;
            return Err(SipcError::NoDevice);
        }
        Ok(())
    }

    fn send(&self, _dst: u8, msg: &Smsg, _timeout: Duration) -> Result<(), SipcError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            self.overlaps.fetch_add(1, Ordering::Relaxed);
        }

        let reply = {
            let mut state = lock(&self.state);
            if state.send_failures > 0 {
                state.send_failures -= 1;
                self.in_flight.store(false, Ordering::Release);
                return Err(SipcError::Timeout);
            }
            *state.calls.entry(msg.flag).or_insert(0) += 1;
            state.log.push(*msg);

            if msg.channel != SMSG_CH_PM_CTRL || msg.ty != SMSG_TYPE_DFS {
                None
            } else {
                // A faulted request leaves the firmware state untouched.
                let (status, value) = match state.take_fault(msg.flag) {
                    Some(fault) => (fault, state.cur_freq()),
                    None => state.handle(msg.flag, msg.value),
                };
                if state.dropped_replies > 0 {
                    state.dropped_replies -= 1;
                    None
                } else {
                    Some(Smsg::new(
                        SMSG_CH_PM_CTRL,
                        SMSG_TYPE_DFS_RSP,
                        status.flag(),
                        value,
                    ))
                }
            }
        };
        debug!("sim fw: {:#06x} {:#x} -> {:?}", msg.flag, msg.value, reply);

        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        if let Some(reply) = reply {
            lock(&self.replies).push_back(reply);
            self.reply_ready.notify_all();
        }
        Ok(())
    }

    fn recv(&self, _dst: u8, timeout: Duration) -> Result<Smsg, SipcError> {
        let deadline = Instant::now() + timeout;
        let mut replies = lock(&self.replies);
        let res = loop {
            if let Some(reply) = replies.pop_front() {
                break Ok(reply);
            }
            let now = Instant::now();
            if now >= deadline {
                break Err(SipcError::Timeout);
            }
            replies = self
                .reply_ready
                .wait_timeout(replies, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        };
        self.in_flight.store(false, Ordering::Release);
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smsg::SIPC_ID_PM_SYS;

    fn request(fw: &SimFirmware, cmd: Command, value: u32) -> Smsg {
        let msg = Smsg::new(SMSG_CH_PM_CTRL, SMSG_TYPE_DFS, cmd.code(), value);
        fw.send(SIPC_ID_PM_SYS, &msg, Duration::from_millis(100))
            .unwrap();
        fw.recv(SIPC_ID_PM_SYS, Duration::from_millis(100)).unwrap()
    }

    #[test]
    fn votes_need_enable_and_snap_to_levels() {
        let fw = SimFirmware::default();
        let reply = request(&fw, Command::Normal, 800);
        assert_eq!(RetStatus::from_flag(reply.flag), RetStatus::Disable);

        request(&fw, Command::Enable, 0);
        let reply = request(&fw, Command::Normal, 800 | 2 << 16);
        assert_eq!(RetStatus::from_flag(reply.flag), RetStatus::AdjOk);
        assert_eq!(reply.value, 1024);
        assert_eq!(fw.vote(2), Some(800));
        assert_eq!(fw.count(Command::Normal), 2);
    }

    #[test]
    fn injected_fault_hits_matching_command_once() {
        let fw = SimFirmware::default();
        fw.inject(Command::Enable, RetStatus::AdjBusy);
        let reply = request(&fw, Command::InqStatus, 0);
        assert_eq!(RetStatus::from_flag(reply.flag), RetStatus::InqSucceed);
        let reply = request(&fw, Command::Enable, 0);
        assert_eq!(RetStatus::from_flag(reply.flag), RetStatus::AdjBusy);
        let reply = request(&fw, Command::Enable, 0);
        assert_eq!(RetStatus::from_flag(reply.flag), RetStatus::OnOffSucceed);
    }

    #[test]
    fn dropped_reply_times_out() {
        let fw = SimFirmware::default();
        fw.drop_replies(1);
        let msg = Smsg::new(SMSG_CH_PM_CTRL, SMSG_TYPE_DFS, Command::InqTimer.code(), 0);
        fw.send(SIPC_ID_PM_SYS, &msg, Duration::ZERO).unwrap();
        assert_eq!(
            fw.recv(SIPC_ID_PM_SYS, Duration::from_millis(10)),
            Err(SipcError::Timeout)
        );
        assert_eq!(request(&fw, Command::InqTimer, 0).value, SIM_TIMER_MS);
    }
}
