use anyhow::{bail, Result};
use std::collections::HashSet;

use super::types::YamlConfig;

/// Validate the entire configuration for correctness.
///
/// Cycles are not checked here; they surface when a plan is resolved.
pub fn validate(config: &YamlConfig) -> Result<()> {
    validate_settings(config)?;
    validate_stack_names(config)?;
    validate_stack_references(config)?;
    Ok(())
}

fn validate_settings(config: &YamlConfig) -> Result<()> {
    if config.project.settings.max_concurrency == Some(0) {
        bail!("settings.max_concurrency must be at least 1");
    }
    Ok(())
}

/// Stack names are paths: non-empty, no whitespace, no empty segments.
fn validate_stack_names(config: &YamlConfig) -> Result<()> {
    for name in config.project.stacks.keys() {
        if name.trim().is_empty() {
            bail!("Stack names must not be empty");
        }
        if name.chars().any(char::is_whitespace) {
            bail!("Stack name '{}' must not contain whitespace", name);
        }
        if name.split('/').any(str::is_empty) {
            bail!(
                "Stack name '{}' must be a relative path without empty segments",
                name
            );
        }
    }
    Ok(())
}

/// Ensure all dependency references point to existing stacks.
fn validate_stack_references(config: &YamlConfig) -> Result<()> {
    let stack_names: HashSet<&str> = config.project.stacks.keys().map(|s| s.as_str()).collect();
    for (name, stack) in &config.project.stacks {
        for dep in &stack.dependencies {
            if !stack_names.contains(dep.as_str()) {
                bail!("Stack '{}' depends on '{}', which does not exist", name, dep);
            }
        }
    }
    Ok(())
}
