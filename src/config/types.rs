use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

// ─── YAML Config ────────────────────────────────────────────────────────────

/// Root of a YAML configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlConfig {
    pub project: YamlProject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlProject {
    pub name: String,
    #[serde(default)]
    pub settings: YamlSettings,
    #[serde(default)]
    pub stacks: BTreeMap<String, YamlStackConfig>,
}

/// Project-wide settings. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlSettings {
    #[serde(default = "default_aws_binary")]
    pub aws_binary: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    /// Upper bound on stacks run at once within a batch. Unset means no bound.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub ignore_dependencies: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for YamlSettings {
    fn default() -> Self {
        Self {
            aws_binary: default_aws_binary(),
            region: None,
            profile: None,
            max_concurrency: None,
            ignore_dependencies: false,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_aws_binary() -> String {
    "aws".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

/// A single stack definition, keyed by its path in `project.stacks`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YamlStackConfig {
    #[serde(default)]
    pub template_path: Option<PathBuf>,
    /// Overrides the derived `<project>-<path>` cloud stack name.
    #[serde(default)]
    pub stack_name: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub ignore: bool,
    #[serde(default)]
    pub obsolete: bool,
}
