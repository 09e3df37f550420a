// SPDX-License-Identifier: GPL-2.0

//! Scene registry.
//!
//! Scenes are created once from configuration and never added or removed afterwards. Each keeps
//! a count of outstanding activations; while the count is non-zero the scene's frequency takes
//! part in its domain's max-vote.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::vote::VoteMagic;

/// A named, reference-counted frequency request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scene {
    name: String,
    freq: u32,
    count: u32,
    magic: VoteMagic,
}

impl Scene {
    /// Creates an inactive scene.
    pub fn new(name: impl Into<String>, freq: u32, magic: VoteMagic) -> Self {
        Self {
            name: name.into(),
            freq,
            count: 0,
            magic,
        }
    }
}

/// Snapshot of one scene, as shown in the scene list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneInfo {
    /// Scene name.
    pub name: String,
    /// Requested frequency.
    pub freq: u32,
    /// Outstanding activations.
    pub count: u32,
    /// Arbitration domain.
    pub magic: VoteMagic,
}

/// Handle to a scene inside a [`SceneTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneId(usize);

/// The fixed scene table.
///
/// The lock is only ever held for a handful of field updates; nothing blocks under it.
pub struct SceneTable {
    scenes: Mutex<Vec<Scene>>,
}

impl SceneTable {
    /// Creates a table from `scenes`.
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self {
            scenes: Mutex::new(scenes),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Scene>> {
        self.scenes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of scenes.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no scene is configured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks a scene up by exact name.
    pub fn find(&self, name: &str) -> Result<SceneId> {
        self.lock()
            .iter()
            .position(|s| s.name == name)
            .map(SceneId)
            .ok_or(Error::InvalidArgument)
    }

    /// Adds one activation and returns the scene as it is now.
    pub fn activate(&self, id: SceneId) -> SceneInfo {
        let mut scenes = self.lock();
        let scene = &mut scenes[id.0];
        scene.count += 1;
        info_of(scene)
    }

    /// Drops one activation, never going below zero.
    pub fn deactivate(&self, id: SceneId) -> SceneInfo {
        let mut scenes = self.lock();
        let scene = &mut scenes[id.0];
        scene.count = scene.count.saturating_sub(1);
        info_of(scene)
    }

    /// Overwrites the requested frequency, active or not.
    pub fn set_freq(&self, id: SceneId, freq: u32) -> VoteMagic {
        let mut scenes = self.lock();
        scenes[id.0].freq = freq;
        scenes[id.0].magic
    }

    /// Domain of a scene.
    pub fn magic(&self, id: SceneId) -> VoteMagic {
        self.lock()[id.0].magic
    }

    /// Highest requested frequency among active scenes of `magic`, or 0.
    pub fn target(&self, magic: VoteMagic) -> u32 {
        self.lock()
            .iter()
            .filter(|s| s.count > 0 && s.magic == magic)
            .map(|s| s.freq)
            .max()
            .unwrap_or(0)
    }

    /// Snapshot of the scene at `index`.
    pub fn info(&self, index: usize) -> Result<SceneInfo> {
        self.lock()
            .get(index)
            .map(info_of)
            .ok_or(Error::InvalidArgument)
    }
}

fn info_of(scene: &Scene) -> SceneInfo {
    SceneInfo {
        name: scene.name.clone(),
        freq: scene.freq,
        count: scene.count,
        magic: scene.magic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vote::{Master, VoteMode};

    fn table() -> SceneTable {
        let dcam = VoteMagic::new(VoteMode::Freq, Master::Dcam);
        SceneTable::new(vec![
            Scene::new("camera", 800, dcam),
            Scene::new("boost", 1200, dcam),
            Scene::new("lcdon", 384, VoteMagic::DEFAULT),
        ])
    }

    #[test]
    fn find_is_exact() {
        let t = table();
        assert_eq!(t.find("boost"), Ok(SceneId(1)));
        assert_eq!(t.find("boos"), Err(Error::InvalidArgument));
        assert_eq!(t.find("Boost"), Err(Error::InvalidArgument));
    }

    #[test]
    fn deactivate_saturates_at_zero() {
        let t = table();
        let id = t.find("camera").unwrap();
        assert_eq!(t.deactivate(id).count, 0);
        assert_eq!(t.activate(id).count, 1);
        assert_eq!(t.activate(id).count, 2);
        t.deactivate(id);
        t.deactivate(id);
        assert_eq!(t.deactivate(id).count, 0);
    }

    #[test]
    fn target_is_max_of_active_in_domain() {
        let t = table();
        let dcam = VoteMagic::new(VoteMode::Freq, Master::Dcam);
        assert_eq!(t.target(dcam), 0);

        t.activate(t.find("camera").unwrap());
        t.activate(t.find("lcdon").unwrap());
        assert_eq!(t.target(dcam), 800);
        assert_eq!(t.target(VoteMagic::DEFAULT), 384);

        t.activate(t.find("boost").unwrap());
        assert_eq!(t.target(dcam), 1200);
    }

    #[test]
    fn set_freq_applies_to_inactive_scene() {
        let t = table();
        let id = t.find("camera").unwrap();
        t.set_freq(id, 900);
        let dcam = VoteMagic::new(VoteMode::Freq, Master::Dcam);
        assert_eq!(t.target(dcam), 0);
        t.activate(id);
        assert_eq!(t.target(dcam), 900);
        assert_eq!(t.info(0).unwrap().freq, 900);
        assert_eq!(t.info(3), Err(Error::InvalidArgument));
    }
}
