use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use super::types::{YamlConfig, YamlSettings, YamlStackConfig};
use crate::dag::graph::StackGraph;
use crate::dag::stack::{external_name_for, Stack};
use crate::planner::plan::{Plan, PlanOptions};

/// Fully resolved stacks loaded from configuration, ready for planning.
#[derive(Debug, Clone)]
pub struct StackSource {
    project: String,
    settings: YamlSettings,
    graph: StackGraph,
}

impl StackSource {
    /// Load, validate and resolve the configuration at `path` (file or directory).
    pub fn load(path: &Path) -> Result<Self> {
        let config = super::parser::load_config(path)?;
        let base_dir = if path.is_dir() {
            path.to_path_buf()
        } else {
            path.parent().map(Path::to_path_buf).unwrap_or_default()
        };
        Self::from_config(&config, &base_dir)
    }

    /// Build stacks from an already parsed config. Relative template paths
    /// are resolved against `base_dir`.
    pub fn from_config(config: &YamlConfig, base_dir: &Path) -> Result<Self> {
        super::validator::validate(config)?;

        let project = &config.project;
        let stacks = project
            .stacks
            .iter()
            .map(|(name, stack_config)| to_stack(&project.name, name, stack_config, base_dir));
        let graph = StackGraph::new(stacks)?;

        tracing::info!(
            project = project.name.as_str(),
            stacks = graph.len(),
            "Loaded stack configuration"
        );

        Ok(Self {
            project: project.name.clone(),
            settings: project.settings.clone(),
            graph,
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn settings(&self) -> &YamlSettings {
        &self.settings
    }

    pub fn graph(&self) -> &StackGraph {
        &self.graph
    }

    /// Stacks directly targeted by `path`: the stack named `path` and every
    /// stack below it.
    pub fn command_stacks(&self, path: &str) -> Vec<Arc<Stack>> {
        self.graph
            .stacks()
            .filter(|stack| stack.is_under(path))
            .cloned()
            .collect()
    }

    /// Plan options from file settings, with command-line overrides applied.
    pub fn plan_options(
        &self,
        max_concurrency: Option<NonZeroUsize>,
        ignore_dependencies: bool,
    ) -> PlanOptions {
        PlanOptions {
            ignore_dependencies: ignore_dependencies || self.settings.ignore_dependencies,
            max_concurrency: max_concurrency
                .or_else(|| self.settings.max_concurrency.and_then(NonZeroUsize::new)),
        }
    }

    pub fn plan(&self, path: &str, options: PlanOptions) -> Plan {
        Plan::for_path(path, self.graph.clone(), options)
    }
}

fn to_stack(project: &str, name: &str, config: &YamlStackConfig, base_dir: &Path) -> Stack {
    let external_name = config
        .stack_name
        .clone()
        .unwrap_or_else(|| external_name_for(Some(project), name));

    let template_path: Option<PathBuf> = config.template_path.as_ref().map(|p| {
        if p.is_absolute() {
            p.clone()
        } else {
            base_dir.join(p)
        }
    });

    let mut stack = Stack::new(name)
        .with_dependencies(config.dependencies.iter().cloned())
        .with_external_name(external_name);
    stack.template_path = template_path;
    stack.parameters = config
        .parameters
        .iter()
        .map(|(k, v)| (k.clone(), parameter_value(v)))
        .collect();
    stack.tags = config.tags.clone();
    stack.region = config.region.clone();
    stack.profile = config.profile.clone();
    stack.ignore = config.ignore;
    stack.obsolete = config.obsolete;
    stack
}

/// Render a parameter as the string CloudFormation expects. Lists become
/// comma-delimited.
fn parameter_value(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Sequence(items) => items
            .iter()
            .map(parameter_value)
            .collect::<Vec<_>>()
            .join(","),
        serde_yaml::Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .unwrap_or_default()
            .trim()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_value_rendering() {
        let list: serde_yaml::Value = serde_yaml::from_str("[a, b, 3]").unwrap();
        assert_eq!(parameter_value(&list), "a,b,3");
        assert_eq!(parameter_value(&serde_yaml::Value::Bool(true)), "true");
        assert_eq!(parameter_value(&serde_yaml::Value::Null), "");
    }
}
