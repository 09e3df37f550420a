// SPDX-License-Identifier: GPL-2.0

//! `sprd_governor` attribute files.
//!
//! Reads never fail: a value that cannot be fetched is printed as 0. Writes with an empty scene
//! name are rejected; any other failure is logged and, under the lenient policy, the write is
//! still reported as fully consumed.

use std::fmt::Write;
use std::sync::Arc;

use log::error;

use crate::config::SysfsErrors;
use crate::dfs::{lock, Dfs};
use crate::error::{Error, Result};
use crate::sysfs::{
    scan_i32, scan_u32, split_word, write_table, Attribute, AttributeOperations, S_IRUGO,
    S_IRW_GRP, S_IWUSR_GRP,
};
use crate::trace::TraceEvent;

use super::GovState;

/// Scene the `scene_boost_dfs` file toggles.
const BOOST_SCENE: &str = "boost";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attr {
    ScalingForceDdrFreq,
    ScalingOverflow,
    ScalingUnderflow,
    DfsOnOff,
    AutoDfsOnOff,
    DdrinfoCurFreq,
    DdrinfoApFreq,
    DdrinfoCpFreq,
    DdrinfoFreqTable,
    ScenarioDfs,
    ExitScene,
    SceneFreqSet,
    SceneBoostDfs,
    SceneDfsList,
    Backdoor,
    TracePoll,
}

impl Attr {
    const ALL: [Attr; 16] = [
        Attr::ScalingForceDdrFreq,
        Attr::ScalingOverflow,
        Attr::ScalingUnderflow,
        Attr::DfsOnOff,
        Attr::AutoDfsOnOff,
        Attr::DdrinfoCurFreq,
        Attr::DdrinfoApFreq,
        Attr::DdrinfoCpFreq,
        Attr::DdrinfoFreqTable,
        Attr::ScenarioDfs,
        Attr::ExitScene,
        Attr::SceneFreqSet,
        Attr::SceneBoostDfs,
        Attr::SceneDfsList,
        Attr::Backdoor,
        Attr::TracePoll,
    ];

    fn from_id(id: usize) -> Result<Self> {
        Self::ALL.get(id).copied().ok_or(Error::InvalidArgument)
    }
}

/// Attribute table, in the order of [`Attr::ALL`].
pub(crate) static SPRD_GOVERNOR_ATTRS: [Attribute; 16] = [
    Attribute::new("scaling_force_ddr_freq", S_IRW_GRP),
    Attribute::new("scaling_overflow", S_IRW_GRP),
    Attribute::new("scaling_underflow", S_IRW_GRP),
    Attribute::new("dfs_on_off", S_IRW_GRP),
    Attribute::new("auto_dfs_on_off", S_IRW_GRP),
    Attribute::new("ddrinfo_cur_freq", S_IRUGO),
    Attribute::new("ddrinfo_ap_freq", S_IRUGO),
    Attribute::new("ddrinfo_cp_freq", S_IRUGO),
    Attribute::new("ddrinfo_freq_table", S_IRUGO),
    Attribute::new("scenario_dfs", S_IWUSR_GRP),
    Attribute::new("exit_scene", S_IWUSR_GRP),
    Attribute::new("scene_freq_set", S_IWUSR_GRP),
    Attribute::new("scene_boost_dfs", S_IWUSR_GRP),
    Attribute::new("scene_dfs_list", S_IRUGO),
    Attribute::new("backdoor", S_IRW_GRP),
    Attribute::new("trace_poll", S_IRW_GRP),
];

/// Names of the governor's attribute files.
pub fn attribute_names() -> impl Iterator<Item = &'static str> {
    SPRD_GOVERNOR_ATTRS.iter().map(|a| a.name)
}

/// Handlers of the `sprd_governor` group for one device.
pub(crate) struct SceneAttrs {
    dfs: Arc<Dfs>,
    gov: Arc<GovState>,
}

impl SceneAttrs {
    pub(crate) fn new(dfs: Arc<Dfs>, gov: Arc<GovState>) -> Self {
        Self { dfs, gov }
    }

    /// Applies the write error policy to the outcome of a store.
    fn finish(&self, func: &str, page: &str, res: Result) -> Result<usize> {
        match res {
            Ok(()) => Ok(page.len()),
            Err(e) => {
                error!("{func}: {e}");
                match self.dfs.sysfs_errors() {
                    SysfsErrors::Lenient => Ok(page.len()),
                    SysfsErrors::Strict => Err(e),
                }
            }
        }
    }

    fn show_table(&self, page: &mut String, get: impl Fn(&Dfs, usize) -> Result<u32>) {
        let dfs: &Dfs = &self.dfs;
        let values: Vec<u32> = (0..dfs.freq_num())
            .map(|i| get(dfs, i).unwrap_or(0))
            .collect();
        write_table(page, values);
    }

    fn show_scenes(&self, page: &mut String) {
        for info in (0..self.dfs.scene_num()).filter_map(|i| self.dfs.scene_info(i).ok()) {
            let _ = writeln!(
                page,
                "{} freq {}  magic {:#x} count {}",
                info.name, info.freq, info.magic, info.count
            );
        }
    }

    fn on_off(
        &self,
        func: &'static str,
        page: &str,
        on: fn(&Dfs) -> Result,
        off: fn(&Dfs) -> Result,
    ) -> Result<usize> {
        let Some(enable) = scan_u32(page) else {
            return self.finish(func, page, Err(Error::InvalidArgument));
        };
        let res = match enable {
            1 => on(&*self.dfs),
            0 => off(&*self.dfs),
            _ => Err(Error::InvalidArgument),
        };
        self.dfs.emit(TraceEvent::Sysfs {
            func,
            value: enable,
        });
        self.finish(func, page, res)
    }

    fn store_watermark(
        &self,
        func: &str,
        page: &str,
        set: fn(&Dfs, u32, usize) -> Result,
    ) -> Result<usize> {
        let mut args = page.split_whitespace().map(scan_u32);
        let (Some(Some(sel)), Some(Some(value))) = (args.next(), args.next()) else {
            return self.finish(func, page, Err(Error::InvalidArgument));
        };
        let res = usize::try_from(sel)
            .map_err(|_| Error::InvalidArgument)
            .and_then(|sel| set(&*self.dfs, value, sel));
        self.finish(func, page, res)
    }

    fn store_scene(&self, func: &str, page: &str, op: fn(&Dfs, &str) -> Result) -> Result<usize> {
        let (name, _) = split_word(page).ok_or(Error::InvalidArgument)?;
        let res = op(&*self.dfs, name);
        self.finish(func, page, res)
    }

    fn store_scene_freq(&self, page: &str) -> Result<usize> {
        let func = "scene_freq_set_store";
        let (name, rest) = split_word(page).ok_or(Error::InvalidArgument)?;
        let res = match scan_u32(rest) {
            Some(freq) => self.dfs.set_scene_freq(name, freq),
            None => Err(Error::InvalidArgument),
        };
        self.finish(func, page, res)
    }

    fn store_boost(&self, page: &str) -> Result<usize> {
        let func = "scene_boost_dfs_store";
        // The second number is a frequency; the boost scene keeps its configured one.
        let mut args = page.split_whitespace().map(scan_u32);
        let (Some(Some(enable)), Some(Some(_freq))) = (args.next(), args.next()) else {
            return self.finish(func, page, Err(Error::InvalidArgument));
        };
        let res = match enable {
            1 => self.dfs.enter_scene(BOOST_SCENE),
            0 => self.dfs.exit_scene(BOOST_SCENE),
            _ => Err(Error::InvalidArgument),
        };
        self.finish(func, page, res)
    }

    fn store_backdoor(&self, page: &str) -> Result<usize> {
        let func = "backdoor_store";
        let Some(backdoor) = scan_i32(page) else {
            return self.finish(func, page, Err(Error::InvalidArgument));
        };
        let mut status = lock(&self.gov.backdoor);
        if *status == backdoor {
            return Ok(page.len());
        }
        let res = match backdoor {
            1 => self.dfs.set_backdoor(),
            0 => self.dfs.reset_backdoor(),
            _ => Err(Error::InvalidArgument),
        };
        if res.is_ok() {
            *status = backdoor;
        }
        drop(status);
        self.finish(func, page, res)
    }

    fn store_trace_poll(&self, page: &str) -> Result<usize> {
        let func = "trace_poll_store";
        let res = match scan_u32(page) {
            Some(time) => self.gov.poller.set_interval(&self.dfs, time),
            None => Err(Error::InvalidArgument),
        };
        self.finish(func, page, res)
    }
}

impl AttributeOperations for SceneAttrs {
    fn show(&self, id: usize, page: &mut String) -> Result {
        let dfs = &self.dfs;
        let _ = match Attr::from_id(id)? {
            Attr::ScalingForceDdrFreq => writeln!(page, "{}", dfs.forced_freq().unwrap_or(0)),
            Attr::ScalingOverflow => {
                self.show_table(page, Dfs::overflow);
                Ok(())
            }
            Attr::ScalingUnderflow => {
                self.show_table(page, Dfs::underflow);
                Ok(())
            }
            Attr::DfsOnOff => writeln!(page, "{}", dfs.status().unwrap_or(0)),
            Attr::AutoDfsOnOff => writeln!(page, "{}", dfs.auto_status().unwrap_or(0)),
            Attr::DdrinfoCurFreq => writeln!(page, "{}", dfs.cur_freq().unwrap_or(0)),
            Attr::DdrinfoApFreq => writeln!(page, "{}", dfs.ap_freq().unwrap_or(0)),
            Attr::DdrinfoCpFreq => writeln!(page, "{}", dfs.cp_freq().unwrap_or(0)),
            Attr::DdrinfoFreqTable => {
                self.show_table(page, Dfs::freq_table);
                Ok(())
            }
            Attr::SceneDfsList => {
                self.show_scenes(page);
                Ok(())
            }
            Attr::Backdoor => writeln!(page, "{}", *lock(&self.gov.backdoor)),
            Attr::TracePoll => writeln!(page, "{}", self.gov.poller.interval()),
            Attr::ScenarioDfs | Attr::ExitScene | Attr::SceneFreqSet | Attr::SceneBoostDfs => {
                return Err(Error::NoAccess)
            }
        };
        Ok(())
    }

    fn store(&self, id: usize, page: &str) -> Result<usize> {
        match Attr::from_id(id)? {
            Attr::ScalingForceDdrFreq => {
                let func = "scaling_force_ddr_freq_store";
                let Some(freq) = scan_u32(page) else {
                    return self.finish(func, page, Err(Error::InvalidArgument));
                };
                let res = self.dfs.force_freq(freq);
                self.dfs.emit(TraceEvent::Sysfs { func, value: freq });
                self.finish(func, page, res)
            }
            Attr::ScalingOverflow => {
                self.store_watermark("scaling_overflow_store", page, Dfs::set_overflow)
            }
            Attr::ScalingUnderflow => {
                self.store_watermark("scaling_underflow_store", page, Dfs::set_underflow)
            }
            Attr::DfsOnOff => self.on_off("dfs_on_off_store", page, Dfs::enable, Dfs::disable),
            Attr::AutoDfsOnOff => self.on_off(
                "auto_dfs_on_off_store",
                page,
                Dfs::auto_enable,
                Dfs::auto_disable,
            ),
            Attr::ScenarioDfs => self.store_scene("scenario_dfs_store", page, Dfs::enter_scene),
            Attr::ExitScene => self.store_scene("exit_scenario_store", page, Dfs::exit_scene),
            Attr::SceneFreqSet => self.store_scene_freq(page),
            Attr::SceneBoostDfs => self.store_boost(page),
            Attr::Backdoor => self.store_backdoor(page),
            Attr::TracePoll => self.store_trace_poll(page),
            Attr::DdrinfoCurFreq
            | Attr::DdrinfoApFreq
            | Attr::DdrinfoCpFreq
            | Attr::DdrinfoFreqTable
            | Attr::SceneDfsList => Err(Error::NoAccess),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_attr_order() {
        let names: Vec<_> = attribute_names().collect();
        assert_eq!(names.len(), Attr::ALL.len());
        assert_eq!(names[Attr::TracePoll as usize], "trace_poll");
        assert_eq!(names[Attr::SceneDfsList as usize], "scene_dfs_list");
        for (i, attr) in Attr::ALL.iter().enumerate() {
            assert_eq!(Attr::from_id(i), Ok(*attr));
        }
        assert!(Attr::from_id(16).is_err());
    }

    #[test]
    fn write_only_files_have_no_read_bits() {
        for a in &SPRD_GOVERNOR_ATTRS[Attr::ScenarioDfs as usize..=Attr::SceneBoostDfs as usize] {
            assert_eq!(a.mode, 0o220, "{}", a.name);
            assert!(!a.readable());
        }
    }
}
