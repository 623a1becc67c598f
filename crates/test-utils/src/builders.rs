#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use deployer::config::{Inputs, Operation, Settings};
use serde_json::{Map, Value};

/// Builder for `Inputs` with every required field filled in.
pub struct InputsBuilder {
    inputs: Inputs,
}

impl InputsBuilder {
    pub fn new() -> Self {
        Self {
            inputs: Inputs {
                release_bucket: "releases".into(),
                release_key: "svc/1.0.0.zip".into(),
                tf_state_bucket: "state-bucket".into(),
                tf_locks_table: "locks".into(),
                service_name: "svc".into(),
                workspace: "test".into(),
                region: "eu-west-1".into(),
                operation: Operation::Init,
                new_state: false,
                log_url: String::new(),
                tf_vars: Map::new(),
            },
        }
    }

    pub fn operation(mut self, operation: Operation) -> Self {
        self.inputs.operation = operation;
        self
    }

    pub fn new_state(mut self, new_state: bool) -> Self {
        self.inputs.new_state = new_state;
        self
    }

    pub fn log_url(mut self, url: &str) -> Self {
        self.inputs.log_url = url.to_string();
        self
    }

    pub fn tf_var(mut self, key: &str, value: Value) -> Self {
        self.inputs.tf_vars.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> Inputs {
        self.inputs
    }
}

impl Default for InputsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Default settings rooted at `root`, with fast status polling.
pub fn settings_for(root: &Path) -> Settings {
    let mut settings = Settings::default().with_control_root(root);
    settings.dispatcher.status_poll_interval_ms = 10;
    settings.runner.poll_interval_ms = 10;
    settings
}

/// Write an executable `/bin/sh` script named `name` into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut perms = fs::metadata(&path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod script");
    path
}
