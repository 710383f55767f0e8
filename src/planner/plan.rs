use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;

use tracing::debug;

use super::error::PlanError;
use crate::dag::graph::StackGraph;
use crate::dag::stack::Stack;
use crate::executor::actions::{Command, StackActions};
use crate::executor::parallel::{Executor, StatusMap};

/// A set of stacks with no unresolved dependency between them, safe to run
/// concurrently. Ordered by name so iteration is stable.
pub type Batch = BTreeSet<Arc<Stack>>;

/// Ordered batches produced by [`Plan::resolve`].
#[derive(Debug, Clone, Default)]
pub struct LaunchOrder {
    batches: Vec<Batch>,
    /// Per stack, the stacks it waited for in the filtered graph
    /// (dependents instead of dependencies when resolved in reverse).
    prerequisites: HashMap<String, Vec<Arc<Stack>>>,
}

impl LaunchOrder {
    /// A single unordered batch with no prerequisites.
    pub fn flat(stacks: Batch) -> Self {
        let batches = if stacks.is_empty() {
            Vec::new()
        } else {
            vec![stacks]
        };
        Self {
            batches,
            prerequisites: HashMap::new(),
        }
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn prerequisites(&self, stack: &Stack) -> &[Arc<Stack>] {
        self.prerequisites
            .get(&stack.name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All stacks, batch by batch.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Stack>> + '_ {
        self.batches.iter().flat_map(|batch| batch.iter())
    }

    /// Drop `stack` from whichever batch holds it. Emptied batches stay in
    /// place so positions are preserved.
    pub fn remove_stack(&mut self, stack: &Stack) -> bool {
        self.batches.iter_mut().any(|batch| batch.remove(stack))
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn stack_count(&self) -> usize {
        self.batches.iter().map(BTreeSet::len).sum()
    }
}

/// Inputs the plan consumes from configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions {
    /// Skip graph resolution and run exactly the command stacks in one batch.
    pub ignore_dependencies: bool,
    /// Upper bound on concurrent actions per batch. `None` means batch size.
    pub max_concurrency: Option<NonZeroUsize>,
}

/// Orders a target set of stacks for a command and hands the result to the
/// [`Executor`].
#[derive(Debug, Clone)]
pub struct Plan {
    command_path: String,
    graph: StackGraph,
    command_stacks: BTreeSet<Arc<Stack>>,
    options: PlanOptions,
    resolved_for: Option<(Command, bool)>,
    launch_order: LaunchOrder,
}

impl Plan {
    pub fn new<I>(
        command_path: impl Into<String>,
        graph: StackGraph,
        command_stacks: I,
        options: PlanOptions,
    ) -> Self
    where
        I: IntoIterator<Item = Arc<Stack>>,
    {
        Self {
            command_path: command_path.into(),
            graph,
            command_stacks: command_stacks.into_iter().collect(),
            options,
            resolved_for: None,
            launch_order: LaunchOrder::default(),
        }
    }

    /// Target every stack in `graph` that lives at or below `command_path`.
    pub fn for_path(command_path: &str, graph: StackGraph, options: PlanOptions) -> Self {
        let command_stacks: Vec<Arc<Stack>> = graph
            .stacks()
            .filter(|stack| stack.is_under(command_path))
            .cloned()
            .collect();
        Self::new(command_path, graph, command_stacks, options)
    }

    pub fn command_path(&self) -> &str {
        &self.command_path
    }

    pub fn graph(&self) -> &StackGraph {
        &self.graph
    }

    pub fn command_stacks(&self) -> &BTreeSet<Arc<Stack>> {
        &self.command_stacks
    }

    pub fn options(&self) -> PlanOptions {
        self.options
    }

    /// The last resolved launch order, if any.
    pub fn launch_order(&self) -> Option<&LaunchOrder> {
        self.resolved_for.map(|_| &self.launch_order)
    }

    /// Compute the launch order for `command`.
    ///
    /// The result is cached against `(command, reverse)`; calling again with
    /// the same pair returns the cached order, including any stacks removed
    /// from it since.
    pub fn resolve(&mut self, command: Command, reverse: bool) -> Result<&LaunchOrder, PlanError> {
        if self.resolved_for == Some((command, reverse)) {
            return Ok(&self.launch_order);
        }
        self.resolved_for = None;

        let launch_order = if self.options.ignore_dependencies {
            debug!(command = %command, "Ignoring dependencies, single flat batch");
            LaunchOrder::flat(self.command_stacks.clone())
        } else {
            self.batch(command, reverse)?
        };

        if launch_order.is_empty() {
            let mut valid_paths: Vec<String> =
                self.graph.stacks().map(|stack| stack.name.clone()).collect();
            valid_paths.sort();
            return Err(PlanError::NoStacksFound {
                path: self.command_path.clone(),
                valid_paths,
            });
        }

        self.launch_order = launch_order;
        self.resolved_for = Some((command, reverse));
        Ok(&self.launch_order)
    }

    /// Peel dependency-free batches off the filtered graph until it is empty.
    fn batch(&self, command: Command, reverse: bool) -> Result<LaunchOrder, PlanError> {
        let mut graph = self
            .graph
            .filtered(self.command_stacks.iter().map(|stack| &**stack), reverse);

        let prerequisites: HashMap<String, Vec<Arc<Stack>>> = graph
            .stacks()
            .map(|stack| (stack.name.clone(), graph.dependencies(stack)))
            .collect();

        let mut batches: Vec<Batch> = Vec::new();
        while !graph.is_empty() {
            let batch: Batch = graph
                .stacks()
                .filter(|stack| graph.count_dependencies(stack) == 0)
                .cloned()
                .collect();

            if batch.is_empty() {
                let mut unresolved: Vec<String> =
                    graph.stacks().map(|stack| stack.name.clone()).collect();
                unresolved.sort();
                return Err(PlanError::Cycle {
                    unresolved,
                    cycles: graph.cycles(),
                });
            }

            for stack in &batch {
                graph.remove_stack(stack);
            }

            debug!(
                command = %command,
                reverse = reverse,
                batch = batches.len() + 1,
                stacks = ?batch.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
                "Resolved batch"
            );
            batches.push(batch);
        }

        Ok(LaunchOrder {
            batches,
            prerequisites,
        })
    }

    /// Every stack in the resolved order, batch by batch. Empty if the plan
    /// has not been resolved.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Stack>> + '_ {
        self.launch_order().into_iter().flat_map(LaunchOrder::iter)
    }

    /// Exclude `stack` from the resolved order without resolving again.
    pub fn remove_stack(&mut self, stack: &Stack) -> bool {
        self.launch_order.remove_stack(stack)
    }

    /// Keep only the stacks for which `predicate` holds.
    pub fn filter<F>(&mut self, predicate: F)
    where
        F: Fn(&Stack) -> bool,
    {
        let excluded: Vec<Arc<Stack>> = self
            .iter()
            .filter(|stack| {
                let stack: &Stack = stack;
                !predicate(stack)
            })
            .cloned()
            .collect();
        for stack in excluded {
            debug!(stack = %stack, "Removing stack from plan");
            self.remove_stack(&stack);
        }
    }

    /// Resolve for `command` (reversed for tear-down commands) and execute it.
    ///
    /// Only resolution errors are returned; per-stack failures end up in the
    /// status map.
    pub async fn run(
        &mut self,
        command: Command,
        actions: Arc<dyn StackActions>,
        args: &[String],
    ) -> Result<StatusMap, PlanError> {
        let launch_order = self.resolve(command, command.reverses())?.clone();
        let executor = Executor::new(launch_order, command, self.options.max_concurrency);
        Ok(executor.execute(actions, args).await)
    }
}
