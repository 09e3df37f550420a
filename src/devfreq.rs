// SPDX-License-Identifier: GPL-2.0

//! A small devfreq framework model.
//!
//! Governors register by name. A [`DevFreq`] device binds a DFS core to one governor, forwards
//! lifecycle events to it and owns the attribute groups the governor installs.

use std::sync::{Arc, Mutex};

use log::{debug, error};

use crate::dfs::{lock, Dfs};
use crate::error::{Error, Result};
use crate::sysfs::AttributeGroup;

/// Profile values the driver reports to the devfreq core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DevfreqProfile {
    /// Frequency at registration time.
    pub initial_freq: u64,
    /// Polling interval in milliseconds.
    pub polling_ms: u32,
}

/// Driver side of a devfreq device.
pub trait DevFreqProfile: Send + Sync {
    /// Switches the device to `freq`.
    fn target(&self, freq: u64) -> Result;

    /// Returns the current profile values.
    fn profile(&self) -> DevfreqProfile;

    /// Returns `(min, max)`; zero when unknown.
    fn freq_bounds(&self) -> (u64, u64);
}

/// Lifecycle events delivered to a governor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernorEvent {
    Start,
    Stop,
    Interval,
    Suspend,
    Resume,
}

/// A devfreq governor.
pub trait Governor: Send + Sync {
    /// Name the governor registers under.
    fn name(&self) -> &'static str;

    /// Frequency the device should run at.
    fn get_target_freq(&self, df: &DevFreq) -> Result<u64>;

    /// Handles a lifecycle event.
    fn event_handler(&self, df: &DevFreq, event: GovernorEvent) -> Result;
}

/// Registered governors.
#[derive(Default)]
pub struct GovernorList {
    governors: Mutex<Vec<Arc<dyn Governor>>>,
}

impl GovernorList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `gov`. Names are unique.
    pub fn add_governor(&self, gov: Arc<dyn Governor>) -> Result {
        let mut governors = lock(&self.governors);
        if governors.iter().any(|g| g.name() == gov.name()) {
            error!("devfreq: governor {} already registered", gov.name());
            return Err(Error::AlreadyExists);
        }
        governors.push(gov);
        Ok(())
    }

    /// Unregisters the governor called `name`.
    pub fn remove_governor(&self, name: &str) -> Result {
        let mut governors = lock(&self.governors);
        let idx = governors
            .iter()
            .position(|g| g.name() == name)
            .ok_or(Error::InvalidArgument)?;
        governors.remove(idx);
        Ok(())
    }

    /// Looks up a governor by name.
    pub fn find(&self, name: &str) -> Option<Arc<dyn Governor>> {
        lock(&self.governors)
            .iter()
            .find(|g| g.name() == name)
            .cloned()
    }
}

/// A devfreq device driven by a DFS core.
pub struct DevFreq {
    dfs: Arc<Dfs>,
    governor: Arc<dyn Governor>,
    groups: Mutex<Vec<Arc<AttributeGroup>>>,
}

impl DevFreq {
    /// Binds `dfs` to the governor called `governor` and starts it.
    pub fn add_device(dfs: Arc<Dfs>, list: &GovernorList, governor: &str) -> Result<Arc<Self>> {
        let governor = list.find(governor).ok_or_else(|| {
            error!("devfreq: governor {governor} not found");
            Error::InvalidArgument
        })?;
        let df = Arc::new(Self {
            dfs,
            governor,
            groups: Mutex::new(Vec::new()),
        });
        df.governor.event_handler(&df, GovernorEvent::Start)?;
        Ok(df)
    }

    /// Stops the governor.
    pub fn remove_device(&self) -> Result {
        self.governor.event_handler(self, GovernorEvent::Stop)
    }

    /// The DFS core behind this device.
    pub fn device(&self) -> &Arc<Dfs> {
        &self.dfs
    }

    /// Name of the bound governor.
    pub fn governor_name(&self) -> &'static str {
        self.governor.name()
    }

    /// Profile values reported by the driver.
    pub fn profile(&self) -> DevfreqProfile {
        DevFreqProfile::profile(&*self.dfs)
    }

    /// Lowest frequency level.
    pub fn min_freq(&self) -> u64 {
        DevFreqProfile::freq_bounds(&*self.dfs).0
    }

    /// Highest frequency level.
    pub fn max_freq(&self) -> u64 {
        DevFreqProfile::freq_bounds(&*self.dfs).1
    }

    /// Asks the governor for a target and applies it, clamped to the known bounds.
    pub fn update(&self) -> Result {
        let mut freq = self.governor.get_target_freq(self)?;
        let (min, max) = DevFreqProfile::freq_bounds(&*self.dfs);
        if max != 0 {
            freq = freq.clamp(min, max);
        }
        debug!("devfreq: update to {freq}");
        DevFreqProfile::target(&*self.dfs, freq)
    }

    /// Delivers a suspend event to the governor.
    pub fn suspend(&self) -> Result {
        self.governor.event_handler(self, GovernorEvent::Suspend)
    }

    /// Delivers a resume event to the governor.
    pub fn resume(&self) -> Result {
        self.governor.event_handler(self, GovernorEvent::Resume)
    }

    /// Installs an attribute group.
    pub fn create_group(&self, group: AttributeGroup) -> Result {
        let mut groups = lock(&self.groups);
        if groups.iter().any(|g| g.name() == group.name()) {
            return Err(Error::AlreadyExists);
        }
        groups.push(Arc::new(group));
        Ok(())
    }

    /// Removes the attribute group called `name`, if installed.
    pub fn remove_group(&self, name: &str) {
        lock(&self.groups).retain(|g| g.name() != name);
    }

    fn group(&self, name: &str) -> Result<Arc<AttributeGroup>> {
        lock(&self.groups)
            .iter()
            .find(|g| g.name() == name)
            .cloned()
            .ok_or(Error::InvalidArgument)
    }

    /// Names of the installed groups.
    pub fn groups(&self) -> Vec<&'static str> {
        lock(&self.groups).iter().map(|g| g.name()).collect()
    }

    /// Reads `group/attr`.
    pub fn sysfs_show(&self, group: &str, attr: &str) -> Result<String> {
        // The group lock is not held across the handler.
        self.group(group)?.show(attr)
    }

    /// Writes `page` to `group/attr`.
    pub fn sysfs_store(&self, group: &str, attr: &str, page: &str) -> Result<usize> {
        self.group(group)?.store(attr, page)
    }
}
