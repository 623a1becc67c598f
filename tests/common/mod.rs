#![allow(dead_code)]

use std::fs;

use deployer::config::Settings;
use deployer::control::ControlVolume;
use deployer::exec::Dispatcher;
use tempfile::TempDir;

pub use deployer_test_utils::builders::{settings_for, write_script, InputsBuilder};
pub use deployer_test_utils::fake_transport::{FakeTransport, Reply};
pub use deployer_test_utils::{init_tracing, spawn_runner, with_timeout};

/// A reset control volume in a temp dir, with the working directory present.
pub struct Harness {
    pub dir: TempDir,
    pub settings: Settings,
    pub volume: ControlVolume,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        let dir = TempDir::new().expect("tempdir");
        let settings = settings_for(dir.path());
        let volume = ControlVolume::new(&settings.control.root, &settings.control.workdir);
        volume.reset().expect("reset volume");
        fs::create_dir_all(volume.workdir()).expect("create workdir");
        Self {
            dir,
            settings,
            volume,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.volume.clone(), self.settings.dispatcher.clone())
    }
}
