use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use serde::Serialize;

/// A single deployable unit of infrastructure.
///
/// Identity is the `name` (the stack path, e.g. `dev/network/vpc`): equality,
/// hashing and ordering look at nothing else. Dependencies are held here as raw
/// names and resolved to live stacks when a [`StackGraph`](super::graph::StackGraph)
/// is built.
#[derive(Debug, Clone, Serialize)]
pub struct Stack {
    pub name: String,
    pub external_name: String,
    pub dependencies: Vec<String>,
    pub template_path: Option<PathBuf>,
    pub parameters: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub ignore: bool,
    pub obsolete: bool,
}

impl Stack {
    /// Create a stack with no dependencies. The external name defaults to the
    /// path with `/` replaced by `-`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            external_name: external_name_for(None, &name),
            name,
            dependencies: Vec::new(),
            template_path: None,
            parameters: BTreeMap::new(),
            tags: BTreeMap::new(),
            region: None,
            profile: None,
            ignore: false,
            obsolete: false,
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_external_name(mut self, external_name: impl Into<String>) -> Self {
        self.external_name = external_name.into();
        self
    }

    pub fn with_template(mut self, template_path: impl Into<PathBuf>) -> Self {
        self.template_path = Some(template_path.into());
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignore = true;
        self
    }

    pub fn obsoleted(mut self) -> Self {
        self.obsolete = true;
        self
    }

    /// Whether this stack lives at `path` or anywhere below it.
    ///
    /// An empty path or `.` matches every stack.
    pub fn is_under(&self, path: &str) -> bool {
        let path = path.trim_matches('/');
        if path.is_empty() || path == "." {
            return true;
        }
        self.name == path
            || self
                .name
                .strip_prefix(path)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Build the cloud-side stack name: `<project>-<path with '/' replaced by '-'>`.
pub fn external_name_for(project: Option<&str>, name: &str) -> String {
    let flattened = name.trim_matches('/').replace('/', "-");
    match project {
        Some(project) if !project.is_empty() => format!("{}-{}", project, flattened),
        _ => flattened,
    }
}

impl PartialEq for Stack {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Stack {}

impl Hash for Stack {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for Stack {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Stack {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_name_only() {
        let a = Stack::new("dev/vpc").with_dependencies(["dev/base"]);
        let b = Stack::new("dev/vpc").ignored();
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn test_is_under_path() {
        let stack = Stack::new("dev/network/vpc");
        assert!(stack.is_under("dev"));
        assert!(stack.is_under("dev/network"));
        assert!(stack.is_under("dev/network/vpc"));
        assert!(stack.is_under("/dev/"));
        assert!(stack.is_under(""));
        assert!(stack.is_under("."));
        assert!(!stack.is_under("dev/net"));
        assert!(!stack.is_under("prod"));
    }

    #[test]
    fn test_external_name() {
        assert_eq!(external_name_for(Some("acme"), "dev/vpc"), "acme-dev-vpc");
        assert_eq!(external_name_for(None, "dev/vpc"), "dev-vpc");
        assert_eq!(Stack::new("a/b/c").external_name, "a-b-c");
    }
}
