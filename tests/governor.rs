// SPDX-License-Identifier: GPL-2.0

//! The `sprd_governor` devfreq governor and its attribute files.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sprd_dfs::devfreq::{DevFreq, Governor, GovernorList};
use sprd_dfs::governor::{SceneGovernor, GOVERNOR_NAME, TARGET_FREQ};
use sprd_dfs::msg::{Command, RetStatus};
use sprd_dfs::trace::{TraceEvent, FTRACE_DDR_NAME};
use sprd_dfs::Error;

use common::{merge, start, Fixture, SCENES};

struct Bound {
    f: Fixture,
    gov: Arc<SceneGovernor>,
    df: Arc<DevFreq>,
}

impl Bound {
    fn show(&self, attr: &str) -> Result<String, Error> {
        self.df.sysfs_show(GOVERNOR_NAME, attr)
    }

    fn store(&self, attr: &str, page: &str) -> Result<usize, Error> {
        self.df.sysfs_store(GOVERNOR_NAME, attr, page)
    }
}

impl Drop for Bound {
    fn drop(&mut self) {
        let _ = self.df.remove_device();
    }
}

fn bind(json: &str) -> Bound {
    let f = start(json);
    let list = GovernorList::new();
    let gov = Arc::new(SceneGovernor::new());
    list.add_governor(gov.clone()).unwrap();
    let df = DevFreq::add_device(f.dfs.clone(), &list, GOVERNOR_NAME).unwrap();
    Bound { f, gov, df }
}

#[test]
fn governor_registration() {
    let list = GovernorList::new();
    list.add_governor(Arc::new(SceneGovernor::new())).unwrap();
    assert_eq!(
        list.add_governor(Arc::new(SceneGovernor::new())),
        Err(Error::AlreadyExists)
    );

    let f = start(SCENES);
    assert!(matches!(
        DevFreq::add_device(f.dfs.clone(), &list, "performance"),
        Err(Error::InvalidArgument)
    ));

    list.remove_governor(GOVERNOR_NAME).unwrap();
    assert_eq!(list.remove_governor(GOVERNOR_NAME), Err(Error::InvalidArgument));
    assert!(list.find(GOVERNOR_NAME).is_none());
}

#[test]
fn start_installs_group_and_update_forces_target() {
    let b = bind(SCENES);
    assert_eq!(b.df.groups(), vec![GOVERNOR_NAME]);
    assert_eq!(b.df.governor_name(), GOVERNOR_NAME);
    assert_eq!(b.gov.get_target_freq(&b.df), Ok(TARGET_FREQ));
    assert_eq!((b.df.min_freq(), b.df.max_freq()), (256, 1866));
    assert_eq!(b.df.profile().polling_ms, 40);

    b.df.update().unwrap();
    assert_eq!(b.f.dfs.forced_freq(), Ok(933));
    assert_eq!(b.f.fw.forced(), Some(1024));

    // Other events leave the group alone.
    b.df.suspend().unwrap();
    b.df.resume().unwrap();
    assert_eq!(b.df.groups(), vec![GOVERNOR_NAME]);
}

#[test]
fn stop_removes_group_and_poller() {
    let b = bind(SCENES);
    b.store("trace_poll", "10\n").unwrap();
    assert!(b.gov.poller().is_running());

    b.df.remove_device().unwrap();
    assert!(b.df.groups().is_empty());
    assert!(!b.gov.poller().is_running());
    assert_eq!(b.gov.poller().interval(), 0);
    assert_eq!(b.show("dfs_on_off"), Err(Error::InvalidArgument));
}

#[test]
fn info_files() {
    let b = bind(SCENES);
    assert_eq!(
        b.show("ddrinfo_freq_table").unwrap(),
        "256 384 512 768 1024 1333 1536 1866 \n"
    );
    assert_eq!(
        b.show("scaling_overflow").unwrap(),
        "100 200 300 400 500 600 700 800 \n"
    );
    assert_eq!(b.show("scaling_underflow").unwrap(), "10 20 30 40 50 60 70 80 \n");
    assert_eq!(b.show("dfs_on_off").unwrap(), "1\n");
    assert_eq!(b.show("auto_dfs_on_off").unwrap(), "1\n");
    assert_eq!(b.show("ddrinfo_cur_freq").unwrap(), "256\n");
    assert_eq!(b.show("ddrinfo_ap_freq").unwrap(), "0\n");
    assert_eq!(b.show("ddrinfo_cp_freq").unwrap(), "0\n");
    assert_eq!(b.show("scaling_force_ddr_freq").unwrap(), "0\n");
    assert_eq!(b.show("backdoor").unwrap(), "0\n");
    assert_eq!(b.show("trace_poll").unwrap(), "0\n");
    assert_eq!(
        b.show("scene_dfs_list").unwrap(),
        "boost freq 1333  magic 0x0 count 0\n\
         lcdon freq 384  magic 0x0 count 0\n\
         camera freq 768  magic 0x2 count 0\n\
         video freq 1024  magic 0x2 count 0\n\
         isp_bw freq 600  magic 0x102 count 0\n"
    );
}

#[test]
fn read_failures_print_zero() {
    let b = bind(SCENES);
    b.f.fw.set_cp_freq(512);
    assert_eq!(b.show("ddrinfo_cp_freq").unwrap(), "512\n");
    b.f.fw.inject(Command::InqCpFreq, RetStatus::InqFail);
    assert_eq!(b.show("ddrinfo_cp_freq").unwrap(), "0\n");
}

#[test]
fn access_follows_file_modes() {
    let b = bind(SCENES);
    assert_eq!(b.show("scenario_dfs"), Err(Error::NoAccess));
    assert_eq!(b.show("scene_boost_dfs"), Err(Error::NoAccess));
    assert_eq!(b.store("ddrinfo_cur_freq", "1\n"), Err(Error::NoAccess));
    assert_eq!(b.store("scene_dfs_list", "1\n"), Err(Error::NoAccess));
    assert_eq!(b.store("no_such_file", "1\n"), Err(Error::InvalidArgument));
}

#[test]
fn scene_files() {
    let b = bind(SCENES);

    assert_eq!(b.store("scenario_dfs", "camera\n"), Ok(7));
    let list = b.show("scene_dfs_list").unwrap();
    assert_eq!(list.lines().nth(2), Some("camera freq 768  magic 0x2 count 1"));
    assert_eq!(b.f.dfs.domain_freq(b.f.dfs.scene_info(2).unwrap().magic), 768);

    b.store("scene_freq_set", "camera 1024\n").unwrap();
    assert_eq!(b.f.fw.vote(2), Some(1024));

    b.store("exit_scene", "camera").unwrap();
    assert_eq!(b.f.fw.vote(2), Some(0));

    b.store("scene_boost_dfs", "1 1866\n").unwrap();
    assert_eq!(b.show("ddrinfo_ap_freq").unwrap(), "1333\n");
    b.store("scene_boost_dfs", "0 0\n").unwrap();
    assert_eq!(b.show("ddrinfo_ap_freq").unwrap(), "0\n");
}

#[test]
fn lenient_writes_consume_everything() {
    let b = bind(SCENES);
    b.f.fw.reset_counts();

    assert_eq!(b.store("scenario_dfs", "nosuch\n"), Ok(7));
    assert_eq!(b.store("scene_freq_set", "boost\n"), Ok(6));
    assert_eq!(b.store("scene_boost_dfs", "1\n"), Ok(2));
    assert_eq!(b.store("scene_boost_dfs", "2 0\n"), Ok(4));
    assert_eq!(b.store("scaling_overflow", "9 100\n"), Ok(6));
    assert_eq!(b.store("scaling_force_ddr_freq", "fast\n"), Ok(5));
    assert_eq!(b.store("dfs_on_off", "3\n"), Ok(2));
    assert_eq!(b.f.fw.total_calls(), 0);

    // An empty scene name is always refused.
    assert_eq!(b.store("scenario_dfs", " boost\n"), Err(Error::InvalidArgument));
    assert_eq!(b.store("exit_scene", "\n"), Err(Error::InvalidArgument));
    assert_eq!(b.store("scene_freq_set", ""), Err(Error::InvalidArgument));
}

#[test]
fn strict_writes_report_errors() {
    let b = bind(&merge(SCENES, r#"{"sysfs_errors": "strict"}"#));

    assert_eq!(b.store("scenario_dfs", "nosuch\n"), Err(Error::InvalidArgument));
    assert_eq!(
        b.store("scaling_force_ddr_freq", "fast\n"),
        Err(Error::InvalidArgument)
    );
    b.f.fw.inject(Command::Normal, RetStatus::AdjBusy);
    assert!(matches!(
        b.store("scenario_dfs", "boost\n"),
        Err(Error::Busy(_))
    ));
    assert_eq!(b.store("scenario_dfs", "lcdon\n"), Ok(6));
}

#[test]
fn control_files() {
    let b = bind(SCENES);

    b.store("scaling_force_ddr_freq", "1536\n").unwrap();
    assert_eq!(b.show("scaling_force_ddr_freq").unwrap(), "1536\n");
    assert_eq!(b.f.fw.forced(), Some(1536));

    b.store("scaling_overflow", "2 4242\n").unwrap();
    assert_eq!(b.f.fw.overflow()[2], 4242);
    assert!(b.show("scaling_overflow").unwrap().starts_with("100 200 4242 "));
    b.store("scaling_underflow", "0 7\n").unwrap();
    assert!(b.show("scaling_underflow").unwrap().starts_with("7 20 "));

    b.store("dfs_on_off", "0\n").unwrap();
    assert_eq!(b.show("dfs_on_off").unwrap(), "0\n");
    b.store("auto_dfs_on_off", "0\n").unwrap();
    assert_eq!(b.f.fw.enabled(), (false, false));
    b.store("dfs_on_off", "1\n").unwrap();
    b.store("auto_dfs_on_off", "1\n").unwrap();
    assert_eq!(b.f.fw.enabled(), (true, true));

    let sysfs: Vec<_> = b
        .f
        .trace
        .events()
        .into_iter()
        .filter_map(|e| match e {
            TraceEvent::Sysfs { func, value } => Some((func, value)),
            _ => None,
        })
        .collect();
    assert_eq!(
        sysfs,
        vec![
            ("scaling_force_ddr_freq_store", 1536),
            ("dfs_on_off_store", 0),
            ("auto_dfs_on_off_store", 0),
            ("dfs_on_off_store", 1),
            ("auto_dfs_on_off_store", 1),
        ]
    );
}

#[test]
fn backdoor_file() {
    let b = bind(&merge(SCENES, r#"{"backdoor": 1866}"#));
    b.f.fw.reset_counts();

    // Writing the current state does nothing.
    b.store("backdoor", "0\n").unwrap();
    assert_eq!(b.f.fw.total_calls(), 0);

    b.store("backdoor", "1\n").unwrap();
    assert_eq!(b.show("backdoor").unwrap(), "1\n");
    assert_eq!(b.f.fw.forced(), Some(1866));
    b.store("backdoor", "1\n").unwrap();
    assert_eq!(b.f.fw.count(Command::SetDdrFreq), 1);

    b.store("backdoor", "0\n").unwrap();
    assert_eq!(b.show("backdoor").unwrap(), "0\n");
    assert_eq!(b.f.fw.count(Command::AutoEnable), 1);

    // The state only moves when the firmware accepts the request.
    b.f.fw.inject(Command::SetDdrFreq, RetStatus::SetFail);
    b.store("backdoor", "1\n").unwrap();
    assert_eq!(b.show("backdoor").unwrap(), "0\n");
    b.store("backdoor", "5\n").unwrap();
    assert_eq!(b.show("backdoor").unwrap(), "0\n");
}

#[test]
fn backdoor_needs_a_frequency() {
    let b = bind(SCENES);
    b.store("backdoor", "1\n").unwrap();
    assert_eq!(b.show("backdoor").unwrap(), "0\n");
}

#[test]
fn trace_poll_file() {
    let b = bind(SCENES);

    b.store("trace_poll", "9000\n").unwrap();
    assert_eq!(b.show("trace_poll").unwrap(), "5000\n");
    // The first poll does not wait for the interval.
    thread::sleep(Duration::from_millis(200));
    let polls = |b: &Bound| {
        b.f.trace
            .events()
            .into_iter()
            .filter(|e| matches!(e, TraceEvent::Poll { .. }))
            .count()
    };
    assert_eq!(polls(&b), 1);

    b.store("trace_poll", "10\n").unwrap();
    b.store("trace_poll", "0\n").unwrap();
    assert!(!b.gov.poller().is_running());
    b.store("trace_poll", "20\n").unwrap();
    thread::sleep(Duration::from_millis(150));
    b.store("trace_poll", "0\n").unwrap();
    assert_eq!(b.show("trace_poll").unwrap(), "0\n");

    let stopped_at = polls(&b);
    assert!(stopped_at >= 3, "only {stopped_at} polls");
    thread::sleep(Duration::from_millis(60));
    assert_eq!(polls(&b), stopped_at);

    let events = b.f.trace.events();
    assert!(events.contains(&TraceEvent::ClockSetRate {
        name: FTRACE_DDR_NAME,
        rate: 256,
    }));
    assert!(events.contains(&TraceEvent::Poll {
        cur_freq: 256,
        ap_freq: 0,
        cp_freq: 0,
        force_freq: 0,
        on_off: 1,
        auto_on_off: 1,
    }));
}
