use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use petgraph::algo::tarjan_scc;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use thiserror::Error;

use super::stack::Stack;

/// Errors raised while building a [`StackGraph`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Stack '{stack}' depends on '{dependency}', which does not exist")]
    UnknownDependency { stack: String, dependency: String },

    #[error("Duplicate stack '{0}'. Stack names must be unique.")]
    DuplicateStack(String),
}

/// Directed "depends on" graph over stacks.
///
/// An edge `A -> B` means A depends on B, so the outgoing degree of a node is
/// the number of dependencies it is still waiting for. Nodes are kept in a
/// `StableDiGraph` so indices survive [`StackGraph::remove_stack`].
#[derive(Debug, Clone, Default)]
pub struct StackGraph {
    graph: StableDiGraph<Arc<Stack>, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl StackGraph {
    /// Build the graph from a flat stack collection, resolving every
    /// dependency name to the stack it refers to.
    pub fn new<I>(stacks: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = Stack>,
    {
        Self::from_shared(stacks.into_iter().map(Arc::new))
    }

    /// Same as [`StackGraph::new`] for stacks that are already shared.
    pub fn from_shared<I>(stacks: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = Arc<Stack>>,
    {
        let stacks: Vec<Arc<Stack>> = stacks.into_iter().collect();
        let mut graph = Self::default();

        for stack in &stacks {
            if graph.node_map.contains_key(&stack.name) {
                return Err(GraphError::DuplicateStack(stack.name.clone()));
            }
            let idx = graph.graph.add_node(Arc::clone(stack));
            graph.node_map.insert(stack.name.clone(), idx);
        }

        for stack in &stacks {
            let from = graph.node_map[&stack.name];
            for dependency in &stack.dependencies {
                let to = graph.node_map.get(dependency).copied().ok_or_else(|| {
                    GraphError::UnknownDependency {
                        stack: stack.name.clone(),
                        dependency: dependency.clone(),
                    }
                })?;
                graph.graph.update_edge(from, to, ());
            }
        }

        Ok(graph)
    }

    /// Restrict the graph to `command_stacks` and everything they reach.
    ///
    /// Forward, that is each command stack plus its transitive dependencies.
    /// With `reverse`, every edge is flipped first, so the closure follows
    /// dependents instead and a stack's "dependencies" become the stacks that
    /// depend on it. The returned graph is independent of `self`.
    pub fn filtered<'a, I>(&self, command_stacks: I, reverse: bool) -> StackGraph
    where
        I: IntoIterator<Item = &'a Stack>,
    {
        let direction = if reverse {
            Direction::Incoming
        } else {
            Direction::Outgoing
        };

        let mut relevant: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = command_stacks
            .into_iter()
            .filter_map(|stack| self.node_map.get(&stack.name).copied())
            .collect();

        while let Some(idx) = queue.pop_front() {
            if !relevant.insert(idx) {
                continue;
            }
            for neighbor in self.graph.neighbors_directed(idx, direction) {
                if !relevant.contains(&neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }

        let mut ordered: Vec<NodeIndex> = relevant.into_iter().collect();
        ordered.sort();

        let mut filtered = StackGraph::default();
        let mut remap: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        for idx in ordered {
            let stack = Arc::clone(&self.graph[idx]);
            let new_idx = filtered.graph.add_node(Arc::clone(&stack));
            filtered.node_map.insert(stack.name.clone(), new_idx);
            remap.insert(idx, new_idx);
        }

        for edge in self.graph.edge_indices() {
            let Some((from, to)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            if let (Some(&from), Some(&to)) = (remap.get(&from), remap.get(&to)) {
                if reverse {
                    filtered.graph.update_edge(to, from, ());
                } else {
                    filtered.graph.update_edge(from, to, ());
                }
            }
        }

        filtered
    }

    /// Number of dependencies of `stack` still present in the graph.
    /// Zero means the stack is ready.
    pub fn count_dependencies(&self, stack: &Stack) -> usize {
        self.node_map
            .get(&stack.name)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Outgoing)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Remove `stack` and every edge touching it. Returns false if it was
    /// not in the graph.
    pub fn remove_stack(&mut self, stack: &Stack) -> bool {
        match self.node_map.remove(&stack.name) {
            Some(idx) => self.graph.remove_node(idx).is_some(),
            None => false,
        }
    }

    /// Stacks currently in the graph, in insertion order.
    pub fn stacks(&self) -> impl Iterator<Item = &Arc<Stack>> + '_ {
        self.graph
            .node_indices()
            .filter_map(move |idx| self.graph.node_weight(idx))
    }

    /// Resolved dependencies of `stack`, sorted by name.
    pub fn dependencies(&self, stack: &Stack) -> Vec<Arc<Stack>> {
        self.neighbors(stack, Direction::Outgoing)
    }

    /// Stacks that depend on `stack`, sorted by name.
    pub fn dependents(&self, stack: &Stack) -> Vec<Arc<Stack>> {
        self.neighbors(stack, Direction::Incoming)
    }

    fn neighbors(&self, stack: &Stack, direction: Direction) -> Vec<Arc<Stack>> {
        let Some(&idx) = self.node_map.get(&stack.name) else {
            return Vec::new();
        };
        let mut neighbors: Vec<Arc<Stack>> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| Arc::clone(&self.graph[n]))
            .collect();
        neighbors.sort();
        neighbors.dedup();
        neighbors
    }

    /// Every `(stack, dependency)` edge.
    pub fn edges(&self) -> Vec<(Arc<Stack>, Arc<Stack>)> {
        self.graph
            .edge_indices()
            .filter_map(|edge| self.graph.edge_endpoints(edge))
            .map(|(from, to)| (Arc::clone(&self.graph[from]), Arc::clone(&self.graph[to])))
            .collect()
    }

    /// Dependency cycles, each as a sorted list of stack names. A stack that
    /// depends on itself is reported as a cycle of one.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&idx| self.graph.find_edge(idx, idx).is_some())
            })
            .map(|component| {
                let mut names: Vec<String> = component
                    .iter()
                    .map(|&idx| self.graph[idx].name.clone())
                    .collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();
        cycles
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Stack>> {
        self.node_map
            .get(name)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    pub fn contains(&self, stack: &Stack) -> bool {
        self.node_map.contains_key(&stack.name)
    }

    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }
}
