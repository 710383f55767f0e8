use thiserror::Error;

use crate::dag::graph::GraphError;

/// Fatal planning errors. Any of these aborts the whole command; no partial
/// launch order is usable.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(
        "Circular dependency detected: stacks {} can never be ready (cycles: {})",
        .unresolved.join(", "),
        format_cycles(.cycles)
    )]
    Cycle {
        unresolved: Vec<String>,
        cycles: Vec<Vec<String>>,
    },

    #[error(
        "No stacks detected from the given path '{path}'. Valid stack paths are: {}",
        .valid_paths.join(", ")
    )]
    NoStacksFound {
        path: String,
        valid_paths: Vec<String>,
    },

    #[error("Cannot prune obsolete stack '{stack}': non-obsolete stack '{dependent}' depends on it")]
    ObsoleteDependency { stack: String, dependent: String },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    if cycles.is_empty() {
        return "none isolated".to_string();
    }
    cycles
        .iter()
        .map(|cycle| format!("[{}]", cycle.join(" -> ")))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_names_stacks() {
        let err = PlanError::Cycle {
            unresolved: vec!["a".to_string(), "b".to_string()],
            cycles: vec![vec!["a".to_string(), "b".to_string()]],
        };
        let msg = err.to_string();
        assert!(msg.contains("Circular dependency"));
        assert!(msg.contains("[a -> b]"));
    }

    #[test]
    fn test_no_stacks_error_lists_valid_paths() {
        let err = PlanError::NoStacksFound {
            path: "prod".to_string(),
            valid_paths: vec!["dev/vpc".to_string(), "dev/app".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'prod'"));
        assert!(msg.contains("dev/vpc, dev/app"));
    }
}
