// SPDX-License-Identifier: GPL-2.0

//! DFS request/reply shim over the SIPC channel.
//!
//! [`DfsLink::transact`] turns a `(command, value)` pair into one blocking round-trip and maps
//! the firmware status code onto [`Error`]. Nothing here retries.

use core::time::Duration;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, error, info};

use crate::error::{Error, Result};
use crate::smsg::{
    SipcError, Smsg, SmsgChannel, SIPC_ID_PM_SYS, SMSG_CH_PM_CTRL, SMSG_TYPE_DFS,
    SMSG_TYPE_DFS_RSP,
};

/// How long a request may wait for channel buffer space.
pub const SEND_TIMEOUT: Duration = Duration::from_millis(100);

/// Reply wait for enable/disable style commands.
pub const ON_OFF_WAIT: Duration = Duration::from_millis(2000);

/// Reply wait for votes, queries and parameter writes.
pub const DEFAULT_WAIT: Duration = Duration::from_millis(500);

/// Number of entries a parameter block can address.
pub const PARA_BLOCK_LEN: u8 = 0x10;

/// Commands understood by the PM-system DFS firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Normal,
    Enable,
    Disable,
    AutoEnable,
    AutoDisable,
    AxiEnable,
    AxiDisable,
    InqDdrFreq,
    InqApFreq,
    InqCpFreq,
    InqDdrTable,
    InqCount,
    InqStatus,
    InqAutoStatus,
    InqOverflow,
    InqUnderflow,
    InqTimer,
    InqAxi,
    InqAxiWltc,
    InqAxiRltc,
    SetDdrFreq,
    SetCalFreq,
    /// Overflow watermark of the given frequency level.
    ParaOverflow(u8),
    /// Underflow watermark of the given frequency level.
    ParaUnderflow(u8),
    ParaTimer,
    SetAxiWltc,
    SetAxiRltc,
    Debug,
}

impl Command {
    /// Returns the 16-bit command code put on the wire.
    pub fn code(self) -> u16 {
        match self {
            Command::Normal => 0x0000,
            Command::Enable => 0x0300,
            Command::Disable => 0x0305,
            Command::AutoEnable => 0x0310,
            Command::AutoDisable => 0x0315,
            Command::AxiEnable => 0x0320,
            Command::AxiDisable => 0x0330,
            Command::InqDdrFreq => 0x0500,
            Command::InqApFreq => 0x0502,
            Command::InqCpFreq => 0x0503,
            Command::InqDdrTable => 0x0505,
            Command::InqCount => 0x0507,
            Command::InqStatus => 0x050A,
            Command::InqAutoStatus => 0x050B,
            Command::InqOverflow => 0x0510,
            Command::InqUnderflow => 0x0520,
            Command::InqTimer => 0x0530,
            Command::InqAxi => 0x0540,
            Command::InqAxiWltc => 0x0541,
            Command::InqAxiRltc => 0x0542,
            Command::SetDdrFreq => 0x0600,
            Command::SetCalFreq => 0x0603,
            Command::ParaOverflow(sel) => 0x0710 + u16::from(sel),
            Command::ParaUnderflow(sel) => 0x0720 + u16::from(sel),
            Command::ParaTimer => 0x0730,
            Command::SetAxiWltc => 0x0810,
            Command::SetAxiRltc => 0x0820,
            Command::Debug => 0x0FFF,
        }
    }

    /// Decodes a wire command code.
    pub fn from_code(code: u16) -> Option<Self> {
        let cmd = match code {
            0x0000 => Command::Normal,
            0x0300 => Command::Enable,
            0x0305 => Command::Disable,
            0x0310 => Command::AutoEnable,
            0x0315 => Command::AutoDisable,
            0x0320 => Command::AxiEnable,
            0x0330 => Command::AxiDisable,
            0x0500 => Command::InqDdrFreq,
            0x0502 => Command::InqApFreq,
            0x0503 => Command::InqCpFreq,
            0x0505 => Command::InqDdrTable,
            0x0507 => Command::InqCount,
            0x050A => Command::InqStatus,
            0x050B => Command::InqAutoStatus,
            0x0510 => Command::InqOverflow,
            0x0520 => Command::InqUnderflow,
            0x0530 => Command::InqTimer,
            0x0540 => Command::InqAxi,
            0x0541 => Command::InqAxiWltc,
            0x0542 => Command::InqAxiRltc,
            0x0600 => Command::SetDdrFreq,
            0x0603 => Command::SetCalFreq,
            0x0710..=0x071F => Command::ParaOverflow((code - 0x0710) as u8),
            0x0720..=0x072F => Command::ParaUnderflow((code - 0x0720) as u8),
            0x0730 => Command::ParaTimer,
            0x0810 => Command::SetAxiWltc,
            0x0820 => Command::SetAxiRltc,
            0x0FFF => Command::Debug,
            _ => return None,
        };
        Some(cmd)
    }

    /// Overflow watermark command for table index `sel`.
    pub fn para_overflow(sel: usize) -> Result<Self> {
        Ok(Command::ParaOverflow(para_index(sel)?))
    }

    /// Underflow watermark command for table index `sel`.
    pub fn para_underflow(sel: usize) -> Result<Self> {
        Ok(Command::ParaUnderflow(para_index(sel)?))
    }
}

fn para_index(sel: usize) -> Result<u8> {
    u8::try_from(sel)
        .ok()
        .filter(|&sel| sel < PARA_BLOCK_LEN)
        .ok_or(Error::InvalidArgument)
}

/// Status codes the firmware puts in a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetStatus {
    AdjOk,
    AdjVerFail,
    AdjBusy,
    AdjNoChange,
    AdjFail,
    Disable,
    OnOffSucceed,
    OnOffFail,
    InqSucceed,
    InqFail,
    SetSucceed,
    SetFail,
    ParaOk,
    DebugOk,
    InvalidCmd,
    /// A code outside the protocol.
    Unknown(u16),
}

impl RetStatus {
    /// Decodes a reply flag.
    pub fn from_flag(flag: u16) -> Self {
        match flag {
            0x0000 => RetStatus::AdjOk,
            0x0001 => RetStatus::AdjVerFail,
            0x0002 => RetStatus::AdjBusy,
            0x0003 => RetStatus::AdjNoChange,
            0x0004 => RetStatus::AdjFail,
            0x0005 => RetStatus::Disable,
            0x0300 => RetStatus::OnOffSucceed,
            0x0303 => RetStatus::OnOffFail,
            0x0500 => RetStatus::InqSucceed,
            0x0503 => RetStatus::InqFail,
            0x0600 => RetStatus::SetSucceed,
            0x0603 => RetStatus::SetFail,
            0x070F => RetStatus::ParaOk,
            0x0F00 => RetStatus::DebugOk,
            0x0F0F => RetStatus::InvalidCmd,
            other => RetStatus::Unknown(other),
        }
    }

    /// Returns the wire code of this status.
    pub fn flag(self) -> u16 {
        match self {
            RetStatus::AdjOk => 0x0000,
            RetStatus::AdjVerFail => 0x0001,
            RetStatus::AdjBusy => 0x0002,
            RetStatus::AdjNoChange => 0x0003,
            RetStatus::AdjFail => 0x0004,
            RetStatus::Disable => 0x0005,
            RetStatus::OnOffSucceed => 0x0300,
            RetStatus::OnOffFail => 0x0303,
            RetStatus::InqSucceed => 0x0500,
            RetStatus::InqFail => 0x0503,
            RetStatus::SetSucceed => 0x0600,
            RetStatus::SetFail => 0x0603,
            RetStatus::ParaOk => 0x070F,
            RetStatus::DebugOk => 0x0F00,
            RetStatus::InvalidCmd => 0x0F0F,
            RetStatus::Unknown(flag) => flag,
        }
    }
}

/// A DFS reply as received from the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    /// Decoded status.
    pub status: RetStatus,
    /// Payload, usually the current frequency or the queried value.
    pub value: u32,
}

impl Reply {
    /// Maps the reply onto the crate's error taxonomy, keeping the payload either way.
    pub fn into_result(self) -> Result<u32> {
        let value = self.value;
        match self.status {
            RetStatus::AdjOk
            | RetStatus::OnOffSucceed
            | RetStatus::InqSucceed
            | RetStatus::SetSucceed
            | RetStatus::ParaOk
            | RetStatus::DebugOk => Ok(value),
            RetStatus::AdjVerFail => {
                info!("dfs verify fail! current freq:{value}");
                Err(Error::VersionMismatch(value))
            }
            RetStatus::AdjBusy => {
                info!("dfs busy! current freq:{value}");
                Err(Error::Busy(value))
            }
            RetStatus::AdjNoChange => {
                info!("dfs no change! current freq:{value}");
                Err(Error::NoChange(value))
            }
            RetStatus::AdjFail => {
                info!("dfs fail! current freq:{value}");
                Err(Error::Fail(value))
            }
            RetStatus::Disable => {
                info!("dfs is disabled! current freq:{value}");
                Err(Error::Disabled(value))
            }
            RetStatus::OnOffFail => {
                error!("dfs enable verify failed");
                Err(Error::Fail(value))
            }
            RetStatus::InqFail => {
                error!("dfs inquire failed");
                Err(Error::Fail(value))
            }
            RetStatus::SetFail => {
                error!("dfs set failed");
                Err(Error::Fail(value))
            }
            RetStatus::InvalidCmd => {
                error!("dfs: no this command");
                Err(Error::InvalidCommand(value))
            }
            RetStatus::Unknown(flag) => {
                info!("dfs invalid cmd:{flag:#x}! current freq:{value}");
                Err(Error::InvalidCommand(value))
            }
        }
    }
}

/// The DFS end of the PM-system channel.
pub struct DfsLink {
    channel: Arc<dyn SmsgChannel>,
    /// Pairs each request with its reply.
    xfer: Mutex<()>,
}

impl DfsLink {
    /// Wraps an SIPC channel.
    pub fn new(channel: Arc<dyn SmsgChannel>) -> Self {
        Self {
            channel,
            xfer: Mutex::new(()),
        }
    }

    /// Opens the PM control channel.
    pub fn open(&self) -> Result {
        self.channel
            .open(SIPC_ID_PM_SYS, SMSG_CH_PM_CTRL)
            .map_err(|e| {
                error!("open sipc channel failed: {e}");
                Error::SendFailed(e)
            })
    }

    /// Sends `cmd` with `value` and waits at most `wait` for the reply.
    ///
    /// Transport failures are returned as errors. A reply, whatever its status, is returned as
    /// [`Reply`] so that callers can still look at the payload.
    pub fn transact(&self, cmd: Command, value: u32, wait: Duration) -> Result<Reply> {
        let msg = Smsg::new(SMSG_CH_PM_CTRL, SMSG_TYPE_DFS, cmd.code(), value);
        let _xfer = self.xfer.lock().unwrap_or_else(PoisonError::into_inner);

        debug!(
            "dfs send: channel={}, type={}, flag={:#06x}, value={:#010x}",
            msg.channel, msg.ty, msg.flag, msg.value
        );
        if let Err(e) = self.channel.send(SIPC_ID_PM_SYS, &msg, SEND_TIMEOUT) {
            error!("dfs send failed, value:{value}, cmd:{:#x}: {e}", cmd.code());
            return Err(Error::SendFailed(e));
        }

        let reply = match self.channel.recv(SIPC_ID_PM_SYS, wait) {
            Ok(reply) => reply,
            Err(SipcError::Timeout) => {
                error!("dfs receive timed out: {:#x}", cmd.code());
                return Err(Error::ReceiveTimeout);
            }
            Err(e) => {
                error!("dfs receive failed: {:#x}: {e}", cmd.code());
                return Err(Error::ReceiveFailed(e));
            }
        };
        if reply.channel != SMSG_CH_PM_CTRL || reply.ty != SMSG_TYPE_DFS_RSP {
            error!(
                "dfs reply on channel {} type {} is not for us",
                reply.channel, reply.ty
            );
            return Err(Error::ReceiveFailed(SipcError::UnexpectedReply));
        }

        Ok(Reply {
            status: RetStatus::from_flag(reply.flag),
            value: reply.value,
        })
    }

    /// Runs one request and folds the reply status into the result.
    pub fn call(&self, cmd: Command, value: u32, wait: Duration) -> Result<u32> {
        self.transact(cmd, value, wait)?.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Canned {
        sent: Mutex<Vec<Smsg>>,
        replies: Mutex<VecDeque<Result<Smsg, SipcError>>>,
        send_err: Option<SipcError>,
    }

    impl Canned {
        fn new(replies: Vec<Result<Smsg, SipcError>>) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                replies: Mutex::new(replies.into()),
                send_err: None,
            })
        }
    }

    impl SmsgChannel for Canned {
        fn open(&self, _dst: u8, _channel: u8) -> Result<(), SipcError> {
            Ok(())
        }

        fn send(&self, _dst: u8, msg: &Smsg, _timeout: Duration) -> Result<(), SipcError> {
            if let Some(e) = self.send_err {
                return Err(e);
            }
            self.sent.lock().unwrap().push(*msg);
            Ok(())
        }

        fn recv(&self, _dst: u8, _timeout: Duration) -> Result<Smsg, SipcError> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(SipcError::Timeout))
        }
    }

    fn rsp(flag: u16, value: u32) -> Result<Smsg, SipcError> {
        Ok(Smsg::new(SMSG_CH_PM_CTRL, SMSG_TYPE_DFS_RSP, flag, value))
    }

    #[test]
    fn request_is_tagged_with_command_and_value() {
        let chan = Canned::new(vec![rsp(0x0500, 933)]);
        let link = DfsLink::new(chan.clone());

        assert_eq!(link.call(Command::InqDdrFreq, 0, DEFAULT_WAIT), Ok(933));
        let sent = chan.sent.lock().unwrap();
        assert_eq!(
            sent[0],
            Smsg::new(SMSG_CH_PM_CTRL, SMSG_TYPE_DFS, 0x0500, 0)
        );
    }

    #[test]
    fn failure_statuses_keep_payload() {
        let cases = [
            (0x0001, Error::VersionMismatch(768)),
            (0x0002, Error::Busy(768)),
            (0x0003, Error::NoChange(768)),
            (0x0004, Error::Fail(768)),
            (0x0005, Error::Disabled(768)),
            (0x0303, Error::Fail(768)),
            (0x0503, Error::Fail(768)),
            (0x0603, Error::Fail(768)),
            (0x0F0F, Error::InvalidCommand(768)),
            (0x1234, Error::InvalidCommand(768)),
        ];
        for (flag, expected) in cases {
            let link = DfsLink::new(Canned::new(vec![rsp(flag, 768)]));
            let reply = link.transact(Command::Normal, 0, DEFAULT_WAIT).unwrap();
            assert_eq!(reply.value, 768);
            assert_eq!(reply.into_result(), Err(expected), "flag {flag:#x}");
        }
    }

    #[test]
    fn reply_on_wrong_type_is_rejected() {
        let stray = Ok(Smsg::new(SMSG_CH_PM_CTRL, SMSG_TYPE_DFS, 0x0000, 1));
        let link = DfsLink::new(Canned::new(vec![stray]));
        assert_eq!(
            link.call(Command::Enable, 0, ON_OFF_WAIT),
            Err(Error::ReceiveFailed(SipcError::UnexpectedReply))
        );
    }

    #[test]
    fn transport_failures() {
        let link = DfsLink::new(Canned::new(vec![]));
        assert_eq!(
            link.call(Command::InqStatus, 0, DEFAULT_WAIT),
            Err(Error::ReceiveTimeout)
        );

        let link = DfsLink::new(Canned::new(vec![Err(SipcError::Closed)]));
        assert_eq!(
            link.call(Command::InqStatus, 0, DEFAULT_WAIT),
            Err(Error::ReceiveFailed(SipcError::Closed))
        );

        let chan = Arc::new(Canned {
            sent: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            send_err: Some(SipcError::NoDevice),
        });
        let link = DfsLink::new(chan);
        assert_eq!(
            link.call(Command::InqStatus, 0, DEFAULT_WAIT),
            Err(Error::SendFailed(SipcError::NoDevice))
        );
    }

    #[test]
    fn parameter_commands_are_indexed() {
        assert_eq!(Command::para_overflow(3).unwrap().code(), 0x0713);
        assert_eq!(Command::para_underflow(15).unwrap().code(), 0x072F);
        assert_eq!(Command::para_overflow(16), Err(Error::InvalidArgument));
        assert_eq!(Command::from_code(0x0724), Some(Command::ParaUnderflow(4)));
        assert_eq!(Command::from_code(0x0701), None);
        for flag in [0x0000, 0x0303, 0x070F, 0x0F0F, 0x4242] {
            assert_eq!(RetStatus::from_flag(flag).flag(), flag);
        }
    }
}
