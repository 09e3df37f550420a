// SPDX-License-Identifier: GPL-2.0

//! DFS device configuration.
//!
//! Mirrors the `sprd,dfs` device-tree node: number of frequency levels, optional backdoor
//! frequency, optional watermark tables and the scene list. A few driver policies that the C
//! driver fixed at build time are configurable here as well.
//!
//! ```json
//! {
//!     "freq_num": 8,
//!     "backdoor": 1866,
//!     "scenes": [
//!         { "name": "boost", "freq": 1333 },
//!         { "name": "camera", "freq": 768, "magic": 2 }
//!     ]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::msg::PARA_BLOCK_LEN;
use crate::scene::Scene;
use crate::vote::VoteMagic;

/// Number of frequency levels when the node does not say.
pub const DEFAULT_FREQ_NUM: usize = 8;

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("freq_num {0} out of range")]
    FreqNum(usize),
    #[error("scene {0} has an empty name")]
    EmptySceneName(usize),
    #[error("scene {0} is defined twice")]
    DuplicateScene(String),
}

/// One `sprd-scene` / `sprd-freq` / `scene-magic` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Scene name.
    pub name: String,
    /// Frequency the scene asks for.
    pub freq: u32,
    /// Arbitration domain.
    #[serde(default)]
    pub magic: VoteMagic,
}

/// How resolved votes reach the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteStrategy {
    /// Domain packed into the `Normal` command value.
    #[default]
    Inline,
    /// Non-default domains go through an external voter.
    External,
}

/// Retry policy of the startup enable handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Give up after this many attempts; retry forever when unset.
    pub max_attempts: Option<u32>,
    /// Pause between attempts, in milliseconds.
    pub backoff_ms: u64,
}

/// What a failing sysfs write reports to the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SysfsErrors {
    /// Log the failure and report the whole buffer as consumed.
    #[default]
    Lenient,
    /// Return the error to the writer.
    Strict,
}

/// Configuration of one DFS device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DfsConfig {
    /// Number of frequency levels.
    pub freq_num: usize,
    /// Backdoor frequency; 0 disables the backdoor.
    pub backdoor: u32,
    /// Overflow watermarks to push at startup.
    pub overflow: Option<Vec<u32>>,
    /// Underflow watermarks to push at startup.
    pub underflow: Option<Vec<u32>>,
    /// Scene list.
    pub scenes: Vec<SceneConfig>,
    /// Vote encoding.
    pub vote: VoteStrategy,
    /// Startup enable retry policy.
    pub enable_retry: RetryPolicy,
    /// Sysfs write error policy.
    pub sysfs_errors: SysfsErrors,
}

impl Default for DfsConfig {
    fn default() -> Self {
        Self {
            freq_num: DEFAULT_FREQ_NUM,
            backdoor: 0,
            overflow: None,
            underflow: None,
            scenes: Vec::new(),
            vote: VoteStrategy::default(),
            enable_retry: RetryPolicy::default(),
            sysfs_errors: SysfsErrors::default(),
        }
    }
}

impl DfsConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: DfsConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Checks the constraints probe relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.freq_num == 0 || self.freq_num > usize::from(PARA_BLOCK_LEN) {
            return Err(ConfigError::FreqNum(self.freq_num));
        }
        let mut seen = HashSet::new();
        for (i, scene) in self.scenes.iter().enumerate() {
            if scene.name.is_empty() {
                return Err(ConfigError::EmptySceneName(i));
            }
            if !seen.insert(scene.name.as_str()) {
                return Err(ConfigError::DuplicateScene(scene.name.clone()));
            }
        }
        Ok(())
    }

    /// Overflow table to start from; all zero when absent or malformed.
    pub(crate) fn overflow_table(&self) -> Vec<u32> {
        watermarks("overflow", self.overflow.as_deref(), self.freq_num)
    }

    /// Underflow table to start from; all zero when absent or malformed.
    pub(crate) fn underflow_table(&self) -> Vec<u32> {
        watermarks("underflow", self.underflow.as_deref(), self.freq_num)
    }

    pub(crate) fn scene_table(&self) -> Vec<Scene> {
        self.scenes
            .iter()
            .map(|s| Scene::new(s.name.clone(), s.freq, s.magic))
            .collect()
    }
}

fn watermarks(what: &str, table: Option<&[u32]>, freq_num: usize) -> Vec<u32> {
    match table {
        Some(t) if t.len() == freq_num => t.to_vec(),
        Some(t) => {
            warn!("{what} table has {} entries, expected {freq_num}; ignored", t.len());
            vec![0; freq_num]
        }
        None => vec![0; freq_num],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vote::Master;
    use std::io::Write;

    #[test]
    fn defaults_follow_device_tree_fallbacks() {
        let config = DfsConfig::from_json("{}").unwrap();
        assert_eq!(config.freq_num, 8);
        assert_eq!(config.backdoor, 0);
        assert_eq!(config.overflow_table(), vec![0; 8]);
        assert_eq!(config.vote, VoteStrategy::Inline);
        assert_eq!(config.enable_retry.max_attempts, None);
        assert_eq!(config.sysfs_errors, SysfsErrors::Lenient);
    }

    #[test]
    fn scenes_and_policies_parse() {
        let config = DfsConfig::from_json(
            r#"{
                "freq_num": 4,
                "overflow": [1, 2, 3, 4],
                "underflow": [1, 2],
                "scenes": [
                    {"name": "camera", "freq": 800, "magic": 2},
                    {"name": "boost", "freq": 1200}
                ],
                "vote": "external",
                "enable_retry": {"max_attempts": 5, "backoff_ms": 10},
                "sysfs_errors": "strict"
            }"#,
        )
        .unwrap();
        assert_eq!(config.scenes[0].magic.master(), Master::Dcam);
        assert!(config.scenes[1].magic.is_default());
        assert_eq!(config.overflow_table(), vec![1, 2, 3, 4]);
        assert_eq!(config.underflow_table(), vec![0; 4]);
        assert_eq!(config.vote, VoteStrategy::External);
        assert_eq!(config.enable_retry.max_attempts, Some(5));
        assert_eq!(config.sysfs_errors, SysfsErrors::Strict);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(matches!(
            DfsConfig::from_json(r#"{"freq_num": 0}"#),
            Err(ConfigError::FreqNum(0))
        ));
        assert!(matches!(
            DfsConfig::from_json(r#"{"scenes": [{"name": "", "freq": 1}]}"#),
            Err(ConfigError::EmptySceneName(0))
        ));
        assert!(matches!(
            DfsConfig::from_json(
                r#"{"scenes": [{"name": "a", "freq": 1}, {"name": "a", "freq": 2}]}"#
            ),
            Err(ConfigError::DuplicateScene(_))
        ));
        assert!(matches!(
            DfsConfig::from_json(r#"{"scenes": [{"name": "a", "freq": 1, "magic": 12}]}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"backdoor": 1866}}"#).unwrap();
        let config = DfsConfig::load(file.path()).unwrap();
        assert_eq!(config.backdoor, 1866);

        assert!(matches!(
            DfsConfig::load(file.path().with_extension("missing")),
            Err(ConfigError::Io(_))
        ));
    }
}
