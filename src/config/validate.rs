// src/config/validate.rs

use crate::config::model::{RawSettings, Settings};
use crate::errors::{DeployerError, Result};

impl TryFrom<RawSettings> for Settings {
    type Error = crate::errors::DeployerError;

    fn try_from(raw: RawSettings) -> std::result::Result<Self, Self::Error> {
        validate_raw_settings(&raw)?;
        Ok(Settings::new_unchecked(raw))
    }
}

fn validate_raw_settings(raw: &RawSettings) -> Result<()> {
    validate_control(raw)?;
    validate_intervals(raw)?;
    validate_backoff(raw)?;
    Ok(())
}

fn validate_control(raw: &RawSettings) -> Result<()> {
    if raw.control.root.as_os_str().is_empty() {
        return Err(DeployerError::ConfigError(
            "[control].root must not be empty".to_string(),
        ));
    }
    if raw.control.workdir.is_absolute() {
        return Err(DeployerError::ConfigError(format!(
            "[control].workdir must be relative to the release directory (got {:?})",
            raw.control.workdir
        )));
    }
    if raw.terraform.binary.trim().is_empty() {
        return Err(DeployerError::ConfigError(
            "[terraform].binary must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_intervals(raw: &RawSettings) -> Result<()> {
    if raw.runner.poll_interval_ms == 0 {
        return Err(DeployerError::ConfigError(
            "[runner].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if raw.dispatcher.status_poll_interval_ms == 0 {
        return Err(DeployerError::ConfigError(
            "[dispatcher].status_poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if raw.dispatcher.read_buffer_size == 0 {
        return Err(DeployerError::ConfigError(
            "[dispatcher].read_buffer_size must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_backoff(raw: &RawSettings) -> Result<()> {
    let relay = &raw.relay;
    if relay.initial_backoff_ms == 0 {
        return Err(DeployerError::ConfigError(
            "[relay].initial_backoff_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if relay.initial_backoff_ms > relay.max_backoff_ms {
        return Err(DeployerError::ConfigError(format!(
            "[relay].initial_backoff_ms ({}) must not exceed max_backoff_ms ({})",
            relay.initial_backoff_ms, relay.max_backoff_ms
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Settings::try_from(RawSettings::default()).is_ok());
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut raw = RawSettings::default();
        raw.runner.poll_interval_ms = 0;
        match Settings::try_from(raw) {
            Err(DeployerError::ConfigError(msg)) => assert!(msg.contains("poll_interval_ms")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn inverted_backoff_bounds_are_rejected() {
        let mut raw = RawSettings::default();
        raw.relay.initial_backoff_ms = 10_000;
        raw.relay.max_backoff_ms = 5_000;
        assert!(matches!(
            Settings::try_from(raw),
            Err(DeployerError::ConfigError(_))
        ));
    }

    #[test]
    fn absolute_workdir_is_rejected() {
        let mut raw = RawSettings::default();
        raw.control.workdir = "/etc".into();
        assert!(Settings::try_from(raw).is_err());
    }
}
