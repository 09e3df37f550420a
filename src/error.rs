// SPDX-License-Identifier: GPL-2.0

//! DFS errors.
//!
//! Every failure the core can report is a variant of [`Error`]. Remote outcomes carry the value
//! the PM-system firmware put in its reply, which is usually the frequency it is running at.

use crate::smsg::SipcError;

/// Contains the C-compatible error codes the DFS interface reports.
pub mod code {
    macro_rules! declare_err {
        ($err:tt, $val:expr, $doc:expr) => {
            #[doc = $doc]
            pub const $err: i32 = -$val;
        };
    }

    declare_err!(EPERM, 1, "Operation not permitted.");
    declare_err!(ENOENT, 2, "No such file or directory.");
    declare_err!(EIO, 5, "I/O error.");
    declare_err!(EACCES, 13, "Permission denied.");
    declare_err!(EFAULT, 14, "Bad address.");
    declare_err!(EBUSY, 16, "Device or resource busy.");
    declare_err!(EEXIST, 17, "File exists.");
    declare_err!(ENODEV, 19, "No such device.");
    declare_err!(EINVAL, 22, "Invalid argument.");
    declare_err!(EPIPE, 32, "Broken pipe.");
    declare_err!(ETIME, 62, "Timer expired.");
}

/// Error reported by the DFS core and its sysfs surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The core is not bound, or the startup handshake has not completed.
    #[error("dfs core not initialized")]
    NotInitialized,
    /// Unknown scene, out-of-range index, or malformed input.
    #[error("invalid argument")]
    InvalidArgument,
    /// A DFS instance is already bound; only one device is supported.
    #[error("dfs core can be used by a single device only")]
    AlreadyProbed,
    /// An attribute group with that name already exists.
    #[error("already exists")]
    AlreadyExists,
    /// The attribute does not support the requested access.
    #[error("permission denied")]
    NoAccess,
    /// The request could not be handed to the SIPC channel.
    #[error("dfs send failed: {0}")]
    SendFailed(SipcError),
    /// No reply arrived within the caller's wait.
    #[error("dfs receive timed out")]
    ReceiveTimeout,
    /// The channel failed while waiting, or the reply was not addressed to us.
    #[error("dfs receive failed: {0}")]
    ReceiveFailed(SipcError),
    /// Firmware rejected the protocol version.
    #[error("dfs verify fail, current freq {0}")]
    VersionMismatch(u32),
    /// Firmware is busy.
    #[error("dfs busy, current freq {0}")]
    Busy(u32),
    /// Firmware reports nothing to change.
    #[error("dfs no change, current freq {0}")]
    NoChange(u32),
    /// Firmware failed the operation.
    #[error("dfs fail, current freq {0}")]
    Fail(u32),
    /// DVFS is disabled on the firmware side.
    #[error("dfs is disabled, current freq {0}")]
    Disabled(u32),
    /// Firmware does not know the command.
    #[error("dfs invalid command, value {0}")]
    InvalidCommand(u32),
}

impl Error {
    /// Returns the errno the C driver reports for this error.
    pub fn to_errno(self) -> i32 {
        match self {
            Error::NotInitialized => code::ENOENT,
            Error::InvalidArgument => code::EINVAL,
            Error::AlreadyProbed => code::EBUSY,
            Error::AlreadyExists => code::EEXIST,
            Error::NoAccess => code::EACCES,
            Error::SendFailed(e) | Error::ReceiveFailed(e) => e.to_errno(),
            Error::ReceiveTimeout => code::ETIME,
            Error::VersionMismatch(_) => code::EIO,
            Error::Busy(_) => code::EBUSY,
            Error::NoChange(_) | Error::Fail(_) => code::EFAULT,
            Error::Disabled(_) => code::EPERM,
            Error::InvalidCommand(_) => code::EINVAL,
        }
    }

    /// Returns the payload of the firmware reply, if this error came from one.
    pub fn remote_value(self) -> Option<u32> {
        match self {
            Error::VersionMismatch(v)
            | Error::Busy(v)
            | Error::NoChange(v)
            | Error::Fail(v)
            | Error::Disabled(v)
            | Error::InvalidCommand(v) => Some(v),
            _ => None,
        }
    }
}

/// A [`Result`] with an [`Error`] error type.
///
/// [`Result`]: core::result::Result
pub type Result<T = (), E = Error> = core::result::Result<T, E>;

/// Converts a [`Result`] into an errno-style return value, where 0 is success.
pub fn to_result(res: Result) -> i32 {
    match res {
        Ok(()) => 0,
        Err(e) => e.to_errno(),
    }
}
