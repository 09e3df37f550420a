// SPDX-License-Identifier: GPL-2.0

//! DDR DVFS scene voting for Spreadtrum/Unisoc SoCs.
//!
//! The DDR frequency on these parts is owned by firmware running on the PM system. This crate is
//! the application-processor side of that arrangement: clients enter and exit named *scenes*,
//! each asking for a minimum frequency in an arbitration domain, and the core forwards the
//! highest request of each domain to the firmware over an SIPC message channel.
//!
//! - [`dfs`] holds the driver state, the arbitration engine and the public vote API.
//! - [`startup`] runs the firmware handshake after probe.
//! - [`governor`] is the `sprd_governor` devfreq governor and its attribute files.
//! - [`sim`] is a simulated firmware for tests and the `dfsctl` tool.

pub mod config;
pub mod devfreq;
pub mod dfs;
pub mod error;
pub mod governor;
pub mod msg;
pub mod scene;
pub mod sim;
pub mod smsg;
pub mod startup;
pub mod sysfs;
pub mod trace;
pub mod vote;

pub use crate::config::DfsConfig;
pub use crate::dfs::{Dfs, DfsDriver, DfsResources, StartupState};
pub use crate::error::{Error, Result};
