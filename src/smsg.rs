// SPDX-License-Identifier: GPL-2.0

//! SIPC shared-memory message channel.
//!
//! The DFS core talks to the PM-system firmware through small fixed-size messages. The channel
//! itself lives outside this crate; [`SmsgChannel`] is the interface the core needs from it.

use core::time::Duration;

use crate::error::code;

/// SIPC destination of the PM system.
pub const SIPC_ID_PM_SYS: u8 = 6;

/// Logical channel carrying power-management control traffic.
pub const SMSG_CH_PM_CTRL: u8 = 42;

/// Message type of a DFS request.
pub const SMSG_TYPE_DFS: u8 = 13;

/// Message type of a DFS response.
pub const SMSG_TYPE_DFS_RSP: u8 = 14;

/// One SIPC message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Smsg {
    /// Logical channel.
    pub channel: u8,
    /// Message type.
    pub ty: u8,
    /// Command code on requests, status code on replies.
    pub flag: u16,
    /// Payload.
    pub value: u32,
}

impl Smsg {
    /// Builds a message, the equivalent of `smsg_set`.
    pub fn new(channel: u8, ty: u8, flag: u16, value: u32) -> Self {
        Self {
            channel,
            ty,
            flag,
            value,
        }
    }
}

/// Failure reported by the SIPC channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SipcError {
    /// The destination is not present.
    #[error("no such sipc device")]
    NoDevice,
    /// The channel has been closed or its peer died.
    #[error("sipc channel closed")]
    Closed,
    /// No buffer space or reply within the timeout.
    #[error("sipc timed out")]
    Timeout,
    /// A reply arrived that is not a DFS response.
    #[error("unexpected sipc reply")]
    UnexpectedReply,
}

impl SipcError {
    /// Returns the errno the SIPC layer reports for this failure.
    pub fn to_errno(self) -> i32 {
        match self {
            SipcError::NoDevice => code::ENODEV,
            SipcError::Closed => code::EPIPE,
            SipcError::Timeout => code::ETIME,
            SipcError::UnexpectedReply => code::EINVAL,
        }
    }
}

/// A bidirectional SIPC message channel.
///
/// Implementations must be usable from several threads; the DFS core pairs each [`send`] with
/// the following [`recv`] under its own lock.
///
/// [`send`]: SmsgChannel::send
/// [`recv`]: SmsgChannel::recv
pub trait SmsgChannel: Send + Sync {
    /// Opens `channel` towards `dst`, blocking until the peer is up.
    ///
    /// Must return, with an error if need be, in bounded time: device removal waits for the
    /// startup worker, which checks for cancellation only between its stages.
    fn open(&self, dst: u8, channel: u8) -> Result<(), SipcError>;

    /// Queues `msg` for `dst`, waiting at most `timeout` for buffer space.
    fn send(&self, dst: u8, msg: &Smsg, timeout: Duration) -> Result<(), SipcError>;

    /// Waits at most `timeout` for the next message from `dst`.
    fn recv(&self, dst: u8, timeout: Duration) -> Result<Smsg, SipcError>;
}
