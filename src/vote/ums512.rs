// SPDX-License-Identifier: GPL-2.0

//! Register-based master votes on UMS512.
//!
//! Each bus master owns one vote register in the DDR DVFS block. A vote clears the enable bits,
//! programs either a frequency selector or a raw bandwidth, and then sets the frequency enable
//! bit again. The last value written is kept so it can be replayed after resume.

use std::sync::{Mutex, PoisonError};

use crate::error::{Error, Result};

use super::{ExtVoter, Master, VoteMagic, VoteMode};

/// Physical base of the vote register block.
pub const VOTE_BASE: u64 = 0x3105_6400;

/// Size of the vote register window.
pub const VOTE_WINDOW: usize = 256;

/// Frequencies the selector field indexes, in MHz.
pub const FREQ_TABLE: [u32; 8] = [256, 384, 512, 768, 1024, 1333, 1536, 1866];

/// Access to a 32-bit register window.
pub trait RegisterBank: Send + Sync {
    /// Reads the register at byte offset `offset`.
    fn read32(&self, offset: usize) -> u32;

    /// Writes the register at byte offset `offset`.
    fn write32(&self, offset: usize, value: u32);
}

/// A plain memory-backed register window.
pub struct MemRegs {
    regs: Mutex<Vec<u32>>,
}

impl MemRegs {
    /// Creates a zeroed window of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            regs: Mutex::new(vec![0; size / 4]),
        }
    }
}

impl RegisterBank for MemRegs {
    fn read32(&self, offset: usize) -> u32 {
        let regs = self.regs.lock().unwrap_or_else(PoisonError::into_inner);
        regs.get(offset / 4).copied().unwrap_or(0)
    }

    fn write32(&self, offset: usize, value: u32) {
        let mut regs = self.regs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(reg) = regs.get_mut(offset / 4) {
            *reg = value;
        }
    }
}

#[derive(Clone, Copy)]
struct VoteReg {
    master: Master,
    offset: usize,
    freq_bit: u32,
    freq_mask: u32,
    freq_en_bit: u32,
    bw_en_bit: u32,
}

const fn reg(master: Master, offset: usize, freq_en_bit: u32) -> VoteReg {
    VoteReg {
        master,
        offset,
        freq_bit: 16,
        freq_mask: 0x7,
        freq_en_bit,
        bw_en_bit: 25,
    }
}

const VOTE_REGS: [VoteReg; 7] = [
    reg(Master::Dpu, 0x00, 25),
    reg(Master::Dcam, 0x04, 25),
    reg(Master::Pubcp, 0x08, 24),
    reg(Master::Wtlcp, 0x0c, 24),
    reg(Master::Wtlcp1, 0x10, 24),
    reg(Master::Agcp, 0x14, 24),
    reg(Master::Sw, 0x18, 24),
];

/// Maps a frequency to the selector of the first table entry above it.
///
/// Frequencies at or above the top level select the last entry.
pub fn freq_to_sel(freq: u32) -> u32 {
    let sel = FREQ_TABLE.iter().take_while(|&&f| freq >= f).count();
    sel.min(FREQ_TABLE.len() - 1) as u32
}

/// Vote register writer for UMS512.
pub struct Ums512Voter<B> {
    regs: B,
    /// Last value written per master; serializes register updates.
    reinit: Mutex<[u32; VOTE_REGS.len()]>,
}

impl<B: RegisterBank> Ums512Voter<B> {
    /// Creates a voter over the vote register window.
    pub fn new(regs: B) -> Self {
        Self {
            regs,
            reinit: Mutex::new([0; VOTE_REGS.len()]),
        }
    }

    /// Returns the register window.
    pub fn regs(&self) -> &B {
        &self.regs
    }
}

impl<B: RegisterBank> ExtVoter for Ums512Voter<B> {
    fn vote(&self, freq: u32, magic: VoteMagic) -> Result {
        let master = magic.master();
        let idx = VOTE_REGS
            .iter()
            .position(|r| r.master == master)
            .ok_or(Error::InvalidArgument)?;
        let r = VOTE_REGS[idx];

        let mut reinit = self.reinit.lock().unwrap_or_else(PoisonError::into_inner);

        let mut temp = self.regs.read32(r.offset);
        temp &= !(1 << r.freq_en_bit);
        temp &= !(1 << r.bw_en_bit);
        temp |= 0xc000_0000;
        self.regs.write32(r.offset, temp);

        let mut temp = self.regs.read32(r.offset);
        temp &= !(r.freq_mask << r.freq_bit);
        match magic.mode() {
            VoteMode::Freq => temp |= (freq_to_sel(freq) & r.freq_mask) << r.freq_bit,
            VoteMode::Bw => {
                temp |= freq << r.freq_bit;
                temp |= 1 << r.bw_en_bit;
            }
        }
        self.regs.write32(r.offset, temp);

        let temp = self.regs.read32(r.offset) | 1 << r.freq_en_bit;
        self.regs.write32(r.offset, temp);

        reinit[idx] = temp;
        Ok(())
    }

    fn resume(&self) {
        let reinit = self.reinit.lock().unwrap_or_else(PoisonError::into_inner);
        for (r, &val) in VOTE_REGS.iter().zip(reinit.iter()) {
            if val != 0 {
                self.regs.write32(r.offset, val);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_counts_levels_below_or_equal() {
        assert_eq!(freq_to_sel(0), 0);
        assert_eq!(freq_to_sel(256), 1);
        assert_eq!(freq_to_sel(800), 4);
        assert_eq!(freq_to_sel(1536), 7);
        assert_eq!(freq_to_sel(1866), 7);
        assert_eq!(freq_to_sel(u32::MAX), 7);
    }

    #[test]
    fn top_frequency_stays_inside_the_selector_field() {
        let voter = Ums512Voter::new(MemRegs::new(VOTE_WINDOW));
        let dpu = VoteMagic::new(VoteMode::Freq, Master::Dpu);

        voter.vote(1866, dpu).unwrap();
        let val = voter.regs().read32(0x00);
        assert_eq!((val >> 16) & 0x7, 7);
        assert_eq!(val & (1 << 19), 0);
    }

    #[test]
    fn frequency_vote_programs_selector_and_enable() {
        let voter = Ums512Voter::new(MemRegs::new(VOTE_WINDOW));
        let dcam = VoteMagic::new(VoteMode::Freq, Master::Dcam);

        voter.vote(800, dcam).unwrap();
        let val = voter.regs().read32(0x04);
        assert_eq!(val & 0xc000_0000, 0xc000_0000);
        assert_eq!((val >> 16) & 0x7, 4);
        assert_ne!(val & (1 << 25), 0);
    }

    #[test]
    fn default_domain_has_no_register() {
        let voter = Ums512Voter::new(MemRegs::new(VOTE_WINDOW));
        assert_eq!(
            voter.vote(800, VoteMagic::DEFAULT),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn resume_replays_last_votes() {
        let voter = Ums512Voter::new(MemRegs::new(VOTE_WINDOW));
        let sw = VoteMagic::new(VoteMode::Freq, Master::Sw);

        voter.vote(1333, sw).unwrap();
        let programmed = voter.regs().read32(0x18);
        voter.regs().write32(0x18, 0);
        voter.regs().write32(0x00, 0xdead);

        voter.resume();
        assert_eq!(voter.regs().read32(0x18), programmed);
        // Masters that never voted are left alone.
        assert_eq!(voter.regs().read32(0x00), 0xdead);
    }
}
