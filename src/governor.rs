// SPDX-License-Identifier: GPL-2.0

//! The `sprd_governor` devfreq governor.
//!
//! Frequency decisions are made by scene votes and the firmware, not by the governor: its target
//! is a fixed constant. What the governor provides is the userspace control surface, a group of
//! attribute files installed on the devfreq device when the governor starts.

pub mod poll;
mod sysfs;

use std::sync::{Arc, Mutex};

use log::error;

use crate::devfreq::{DevFreq, Governor, GovernorEvent};
use crate::error::Result;
use crate::sysfs::AttributeGroup;

use self::poll::TracePoller;
use self::sysfs::{SceneAttrs, SPRD_GOVERNOR_ATTRS};

pub use self::sysfs::attribute_names;

/// Governor and attribute group name.
pub const GOVERNOR_NAME: &str = "sprd_governor";

/// Frequency the governor always asks for.
pub const TARGET_FREQ: u64 = 933;

/// State shared by every device the governor drives.
pub(crate) struct GovState {
    /// Last backdoor state written successfully.
    pub(crate) backdoor: Mutex<i32>,
    pub(crate) poller: TracePoller,
}

/// The scene governor.
pub struct SceneGovernor {
    state: Arc<GovState>,
}

impl Default for SceneGovernor {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGovernor {
    /// Creates the governor with the backdoor off and polling stopped.
    pub fn new() -> Self {
        Self {
            state: Arc::new(GovState {
                backdoor: Mutex::new(0),
                poller: TracePoller::new(),
            }),
        }
    }

    /// The trace poll worker.
    pub fn poller(&self) -> &TracePoller {
        &self.state.poller
    }

    fn start(&self, df: &DevFreq) -> Result {
        let ops = Arc::new(SceneAttrs::new(df.device().clone(), self.state.clone()));
        df.create_group(AttributeGroup::new(
            GOVERNOR_NAME,
            &SPRD_GOVERNOR_ATTRS,
            ops,
        ))
        .map_err(|e| {
            error!("devfreq_sprd_gov_start: sysfs create fail: {e}");
            e
        })
    }

    fn stop(&self, df: &DevFreq) {
        df.remove_group(GOVERNOR_NAME);
        self.state.poller.stop();
    }
}

impl Governor for SceneGovernor {
    fn name(&self) -> &'static str {
        GOVERNOR_NAME
    }

    fn get_target_freq(&self, _df: &DevFreq) -> Result<u64> {
        Ok(TARGET_FREQ)
    }

    fn event_handler(&self, df: &DevFreq, event: GovernorEvent) -> Result {
        match event {
            GovernorEvent::Start => self.start(df),
            GovernorEvent::Stop => {
                self.stop(df);
                Ok(())
            }
            GovernorEvent::Interval | GovernorEvent::Suspend | GovernorEvent::Resume => Ok(()),
        }
    }
}
