// src/config/inputs.rs

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::{DeployerError, Result};

/// What the deployment should do once Terraform is initialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Initialise and select the workspace only.
    #[default]
    Init,
    Plan,
    Apply,
}

/// Invocation parameters for one deployment, passed as a single JSON
/// argument.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inputs {
    #[serde(default)]
    pub release_bucket: String,
    #[serde(default)]
    pub release_key: String,
    #[serde(default)]
    pub tf_state_bucket: String,
    #[serde(default)]
    pub tf_locks_table: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub workspace: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub operation: Operation,
    /// Expect to create fresh state rather than reuse an existing one.
    #[serde(default)]
    pub new_state: bool,
    /// First log endpoint. Empty disables log forwarding.
    #[serde(default, rename = "logURL")]
    pub log_url: String,
    #[serde(default)]
    pub tf_vars: Map<String, Value>,
}

impl Inputs {
    /// Parse and validate the JSON parameters.
    pub fn parse(json: &str) -> Result<Self> {
        let inputs: Inputs = serde_json::from_str(json)
            .map_err(|e| DeployerError::Inputs(format!("error parsing input: {e}")))?;
        inputs.validate()?;
        Ok(inputs)
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("releaseBucket", &self.release_bucket),
            ("releaseKey", &self.release_key),
            ("tfStateBucket", &self.tf_state_bucket),
            ("tfLocksTable", &self.tf_locks_table),
            ("serviceName", &self.service_name),
            ("workspace", &self.workspace),
            ("region", &self.region),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(DeployerError::Inputs(format!("missing {field}")));
            }
        }
        Ok(())
    }

    /// Where Terraform keeps this service/workspace state.
    pub fn state_location(&self) -> String {
        format!("s3://{}/{}", self.tf_state_bucket, self.state_key())
    }

    pub fn state_key(&self) -> String {
        format!("{}/{}/terraform.tfstate", self.service_name, self.workspace)
    }
}
