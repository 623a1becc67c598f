// src/workflow/terraform.rs

//! Terraform argument vectors for each workflow step.

use crate::config::Inputs;

pub const TFVARS_FILE: &str = "tfvars.json";
pub const PLAN_FILE: &str = "tfplan";

pub fn init_args(terraform: &str, inputs: &Inputs) -> Vec<String> {
    vec![
        terraform.to_string(),
        "init".to_string(),
        "-reconfigure".to_string(),
        format!("-backend-config=bucket={}", inputs.tf_state_bucket),
        format!("-backend-config=dynamodb_table={}", inputs.tf_locks_table),
        format!("-backend-config=workspace_key_prefix={}", inputs.service_name),
        "-backend-config=key=terraform.tfstate".to_string(),
        format!("-backend-config=region={}", inputs.region),
    ]
}

/// Shell expression that selects `workspace`, creating it when missing.
pub fn select_workspace_expr(terraform: &str, workspace: &str) -> String {
    let terraform = shell_quote(terraform);
    let workspace = shell_quote(workspace);
    format!(
        "{terraform} workspace select {workspace} || {terraform} workspace new {workspace}"
    )
}

/// `out`: also save the plan to this file for a later apply.
pub fn plan_args(terraform: &str, out: Option<&str>) -> Vec<String> {
    let mut args = vec![
        terraform.to_string(),
        "plan".to_string(),
        format!("-var-file={TFVARS_FILE}"),
    ];
    if let Some(out) = out {
        args.push(format!("-out={out}"));
    }
    args
}

pub fn apply_args(terraform: &str, plan: &str) -> Vec<String> {
    vec![terraform.to_string(), "apply".to_string(), plan.to_string()]
}

fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}
