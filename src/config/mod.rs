// src/config/mod.rs

//! Configuration for both sides of the control channel.
//!
//! - `model.rs`: the TOML-backed settings model.
//! - `loader.rs`: reading settings from disk.
//! - `validate.rs`: invariants checked when turning raw settings into `Settings`.
//! - `inputs.rs`: the JSON invocation parameters of a single deployment.

pub mod inputs;
pub mod loader;
pub mod model;
pub mod validate;

pub use inputs::{Inputs, Operation};
pub use loader::{load_and_validate, load_from_path, resolve};
pub use model::{
    ControlSection, DispatcherSection, RawSettings, RelaySection, RunnerSection, Settings,
    TerraformSection,
};
