// SPDX-License-Identifier: GPL-2.0

//! Shared fixture: a DFS core bound to the simulated firmware.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sprd_dfs::sim::SimFirmware;
use sprd_dfs::trace::TraceBuffer;
use sprd_dfs::{Dfs, DfsConfig, DfsDriver, DfsResources};

pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Two default-domain scenes, two DCAM frequency scenes and one DCAM bandwidth scene.
pub const SCENES: &str = r#"{
    "scenes": [
        {"name": "boost", "freq": 1333},
        {"name": "lcdon", "freq": 384},
        {"name": "camera", "freq": 768, "magic": 2},
        {"name": "video", "freq": 1024, "magic": 2},
        {"name": "isp_bw", "freq": 600, "magic": 258}
    ]
}"#;

/// Bound test device.
pub struct Fixture {
    pub driver: DfsDriver,
    pub dfs: Arc<Dfs>,
    pub fw: Arc<SimFirmware>,
    pub trace: Arc<TraceBuffer>,
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = self.driver.remove();
    }
}

pub fn config(json: &str) -> DfsConfig {
    DfsConfig::from_json(json).expect("Invalid test config")
}

/// Probes without waiting for startup.
pub fn probe(json: &str, fw: Arc<SimFirmware>) -> Fixture {
    let trace = Arc::new(TraceBuffer::new(256));
    let driver = DfsDriver::new();
    let res = DfsResources::new(fw.clone()).with_trace(trace.clone());
    let dfs = driver.probe(&config(json), res).expect("Probe failed");
    Fixture {
        driver,
        dfs,
        fw,
        trace,
    }
}

/// Probes, waits for a successful startup and clears the firmware counters.
pub fn start(json: &str) -> Fixture {
    let fixture = probe(json, Arc::new(SimFirmware::default()));
    fixture
        .dfs
        .wait_for_startup(STARTUP_TIMEOUT)
        .expect("Startup failed");
    fixture.fw.reset_counts();
    fixture
}

/// Values of the `Normal` commands the firmware received, oldest first.
pub fn votes(fw: &SimFirmware) -> Vec<u32> {
    fw.requests()
        .iter()
        .filter(|m| m.flag == 0)
        .map(|m| m.value)
        .collect()
}

/// Adds the top-level keys of `extra` to the JSON object `base`.
pub fn merge(base: &str, extra: &str) -> String {
    let mut base: serde_json::Value = serde_json::from_str(base).expect("Invalid base JSON");
    let extra: serde_json::Value = serde_json::from_str(extra).expect("Invalid extra JSON");
    if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    base.to_string()
}
