use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::types::{YamlConfig, YamlProject, YamlSettings};

/// Load config from a path.
///
/// - If `path` is a `.yaml`/`.yml` file, load just that file.
/// - If `path` is a directory, discover and merge all `*.yaml`/`*.yml` files in it.
pub fn load_config(path: &Path) -> Result<YamlConfig> {
    if path.is_file() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        return parse_config(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()));
    }

    if path.is_dir() {
        let yamls = find_yaml_files(path)?;
        if yamls.is_empty() {
            bail!("No .yaml files found in directory: {}", path.display());
        }
        return merge_yaml_files(&yamls);
    }

    bail!(
        "Config not found: '{}'. Place .yaml files in the current directory or specify a path with -c",
        path.display()
    )
}

/// Find all .yaml/.yml files in a directory (non-recursive), sorted by name.
fn find_yaml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.is_file()
                && matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Merge multiple yaml config files into a single YamlConfig.
///
/// Project name and settings come from the first file that defines them.
/// Stacks are merged across all files.
fn merge_yaml_files(files: &[PathBuf]) -> Result<YamlConfig> {
    tracing::info!(
        files = ?files.iter().map(|f| f.display().to_string()).collect::<Vec<_>>(),
        "Discovered config files"
    );

    let mut merged_name: Option<String> = None;
    let mut merged_settings: Option<YamlSettings> = None;
    let mut merged_stacks = BTreeMap::new();

    for file in files {
        let content = fs::read_to_string(file)
            .with_context(|| format!("Failed to read config file: {}", file.display()))?;
        let config: YamlConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", file.display()))?;

        let project = config.project;

        if merged_name.is_none() {
            merged_name = Some(project.name);
        }
        if merged_settings.is_none() {
            merged_settings = Some(project.settings);
        }

        for (name, stack) in project.stacks {
            if merged_stacks.contains_key(&name) {
                bail!(
                    "Duplicate stack '{}' found across config files. Stack names must be unique.",
                    name
                );
            }
            merged_stacks.insert(name, stack);
        }
    }

    Ok(YamlConfig {
        project: YamlProject {
            name: merged_name.unwrap_or_else(|| "stratus".to_string()),
            settings: merged_settings.unwrap_or_default(),
            stacks: merged_stacks,
        },
    })
}

/// Parse YAML content into a YamlConfig.
pub fn parse_config(content: &str) -> Result<YamlConfig> {
    let config: YamlConfig =
        serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;
    Ok(config)
}
