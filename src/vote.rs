// SPDX-License-Identifier: GPL-2.0

//! Arbitration domains and vote encoding.
//!
//! A scene votes inside one domain, identified by its "vote magic": the vote mode in bits 8..12
//! and the bus master in bits 0..8. Each domain keeps its own last applied frequency.
//!
//! How a resolved vote reaches the hardware is up to a [`VoteEncoder`]. [`InlineVote`] packs the
//! domain into the value of a `Normal` DFS command; [`ExtVote`] hands non-default domains to an
//! [`ExtVoter`], for SoCs where masters vote through dedicated registers.

pub mod ums512;

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::msg::{Command, DfsLink, DEFAULT_WAIT};

/// Number of vote modes.
pub const MODE_MAX: usize = 2;

/// Number of bus masters.
pub const MASTER_MAX: usize = 8;

/// What a vote asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VoteMode {
    /// A minimum frequency.
    Freq = 0,
    /// A bandwidth.
    Bw = 1,
}

/// Bus master a vote belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Master {
    /// Application processor, software scenes. The default domain.
    Null = 0,
    Dpu = 1,
    Dcam = 2,
    Pubcp = 3,
    Wtlcp = 4,
    Wtlcp1 = 5,
    Agcp = 6,
    Sw = 7,
}

impl TryFrom<u32> for Master {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Ok(match value {
            0 => Master::Null,
            1 => Master::Dpu,
            2 => Master::Dcam,
            3 => Master::Pubcp,
            4 => Master::Wtlcp,
            5 => Master::Wtlcp1,
            6 => Master::Agcp,
            7 => Master::Sw,
            _ => return Err(Error::InvalidArgument),
        })
    }
}

/// An arbitration domain: `(mode << 8) | master`.
///
/// # Invariants
///
/// The mode is below [`MODE_MAX`] and the master below [`MASTER_MAX`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct VoteMagic(u16);

impl VoteMagic {
    /// The default application-processor frequency domain.
    pub const DEFAULT: VoteMagic = VoteMagic(0);

    /// Builds the magic of a `(mode, master)` pair.
    pub const fn new(mode: VoteMode, master: Master) -> Self {
        Self(((mode as u16) << 8) | master as u16)
    }

    /// Returns the vote mode.
    pub fn mode(self) -> VoteMode {
        if self.0 >> 8 == VoteMode::Bw as u16 {
            VoteMode::Bw
        } else {
            VoteMode::Freq
        }
    }

    /// Returns the bus master.
    pub fn master(self) -> Master {
        // The invariant guarantees a valid master.
        Master::try_from(u32::from(self.0 & 0xff)).unwrap_or(Master::Null)
    }

    /// Returns the raw magic.
    pub fn raw(self) -> u32 {
        u32::from(self.0)
    }

    /// Returns true for the default domain.
    pub fn is_default(self) -> bool {
        self.0 == 0
    }

    /// Row/column of this domain in the last-vote cache.
    pub(crate) fn slot(self) -> (usize, usize) {
        (self.mode() as usize, self.master() as usize)
    }
}

impl TryFrom<u32> for VoteMagic {
    type Error = Error;

    fn try_from(magic: u32) -> Result<Self> {
        let mode = (magic >> 8) & 0xf;
        if magic > 0xfff || mode as usize >= MODE_MAX {
            return Err(Error::InvalidArgument);
        }
        let master = Master::try_from(magic & 0xff)?;
        let mode = if mode == 0 { VoteMode::Freq } else { VoteMode::Bw };
        Ok(Self::new(mode, master))
    }
}

impl From<VoteMagic> for u32 {
    fn from(magic: VoteMagic) -> u32 {
        magic.raw()
    }
}

impl fmt::Debug for VoteMagic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VoteMagic({:#x})", self.0)
    }
}

impl fmt::LowerHex for VoteMagic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Pushes a resolved domain vote towards the hardware.
///
/// Called with the DFS serialization lock held, so at most one vote is in flight.
pub trait VoteEncoder: Send + Sync {
    /// Applies `freq` for the domain `magic`.
    fn vote(&self, link: &DfsLink, freq: u32, magic: VoteMagic) -> Result;

    /// Restores hardware vote state after system resume.
    fn resume(&self) {}
}

/// Encodes the domain into the high half of a `Normal` command value.
#[derive(Debug, Default)]
pub struct InlineVote;

impl InlineVote {
    /// Returns the command value carrying `freq` for `magic`.
    pub fn encode(freq: u32, magic: VoteMagic) -> u32 {
        (freq & 0xffff) | (magic.raw() << 16)
    }
}

impl VoteEncoder for InlineVote {
    fn vote(&self, link: &DfsLink, freq: u32, magic: VoteMagic) -> Result {
        link.call(Command::Normal, Self::encode(freq, magic), DEFAULT_WAIT)
            .map(|_| ())
    }
}

/// A vote path outside the DFS message protocol.
pub trait ExtVoter: Send + Sync {
    /// Applies `freq` for the non-default domain `magic`.
    fn vote(&self, freq: u32, magic: VoteMagic) -> Result;

    /// Replays the last programmed votes.
    fn resume(&self);
}

/// Sends default-domain votes as plain `Normal` commands and delegates the rest to `V`.
pub struct ExtVote<V: ?Sized> {
    voter: std::sync::Arc<V>,
}

impl<V: ExtVoter + ?Sized> ExtVote<V> {
    /// Creates an encoder delegating to `voter`.
    pub fn new(voter: std::sync::Arc<V>) -> Self {
        Self { voter }
    }
}

impl<V: ExtVoter + ?Sized> VoteEncoder for ExtVote<V> {
    fn vote(&self, link: &DfsLink, freq: u32, magic: VoteMagic) -> Result {
        if magic.is_default() {
            link.call(Command::Normal, freq, DEFAULT_WAIT).map(|_| ())
        } else {
            self.voter.vote(freq, magic)
        }
    }

    fn resume(&self) {
        self.voter.resume();
    }
}
