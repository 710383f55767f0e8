use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use super::actions::{Command, StackActions, StackStatus};
use crate::dag::stack::Stack;
use crate::planner::plan::LaunchOrder;

/// Final status of every stack in a run.
pub type StatusMap = BTreeMap<Arc<Stack>, StackStatus>;

type SharedStatuses = Arc<DashMap<Arc<Stack>, StackStatus>>;

/// Runs a resolved launch order one batch at a time, with the stacks of a
/// batch in parallel.
///
/// A batch is fully finished before the next one starts. A stack whose
/// prerequisite failed is marked failed without its action being invoked;
/// mutating commands also refuse to start on a prerequisite left
/// non-terminal.
#[derive(Debug, Clone)]
pub struct Executor {
    launch_order: LaunchOrder,
    command: Command,
    max_concurrency: Option<NonZeroUsize>,
}

impl Executor {
    pub fn new(
        launch_order: LaunchOrder,
        command: Command,
        max_concurrency: Option<NonZeroUsize>,
    ) -> Self {
        Self {
            launch_order,
            command,
            max_concurrency,
        }
    }

    pub fn command(&self) -> Command {
        self.command
    }

    /// Worker pool size for a batch: the batch size, capped by
    /// `max_concurrency` when set.
    pub fn pool_size(&self, batch_len: usize) -> usize {
        let size = match self.max_concurrency {
            Some(max) => batch_len.min(max.get()),
            None => batch_len,
        };
        size.max(1)
    }

    /// Execute the command against every stack. Per-stack errors are
    /// recorded as [`StackStatus::Failed`] and never returned.
    pub async fn execute(&self, actions: Arc<dyn StackActions>, args: &[String]) -> StatusMap {
        let statuses: SharedStatuses = Arc::new(DashMap::new());
        let args: Arc<[String]> = Arc::from(args);

        for stack in self.launch_order.iter() {
            statuses.insert(Arc::clone(stack), StackStatus::Pending);
        }

        for (batch_idx, batch) in self.launch_order.batches().iter().enumerate() {
            if batch.is_empty() {
                continue;
            }

            let pool_size = self.pool_size(batch.len());
            info!(
                command = %self.command,
                batch = batch_idx + 1,
                pool_size = pool_size,
                stacks = ?batch.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
                "Starting batch"
            );

            let semaphore = Arc::new(Semaphore::new(pool_size));
            let mut handles = Vec::with_capacity(batch.len());

            for stack in batch {
                let task = run_stack(
                    Arc::clone(stack),
                    self.command,
                    Arc::clone(&actions),
                    Arc::clone(&args),
                    self.launch_order.prerequisites(stack).to_vec(),
                    Arc::clone(&statuses),
                    Arc::clone(&semaphore),
                );
                handles.push((Arc::clone(stack), tokio::spawn(task)));
            }

            // Wait for every stack in this batch
            for (stack, handle) in handles {
                match handle.await {
                    Ok(status) => {
                        info!(stack = %stack, status = %status, "Stack finished");
                    }
                    Err(e) => {
                        error!(stack = %stack, error = %e, "Stack task aborted");
                        statuses.insert(stack, StackStatus::Failed);
                    }
                }
            }

            debug!(batch = batch_idx + 1, "Finished batch");
        }

        statuses
            .iter()
            .map(|entry| (Arc::clone(entry.key()), *entry.value()))
            .collect()
    }
}

/// Run one stack: short-circuit on a failed prerequisite (or, for mutating
/// commands, one that has not reached a terminal status), otherwise invoke
/// the action under a pool permit. The only status cell written is `stack`'s.
async fn run_stack(
    stack: Arc<Stack>,
    command: Command,
    actions: Arc<dyn StackActions>,
    args: Arc<[String]>,
    prerequisites: Vec<Arc<Stack>>,
    statuses: SharedStatuses,
    semaphore: Arc<Semaphore>,
) -> StackStatus {
    let blocking = prerequisites.iter().find_map(|dep| {
        let status = *statuses.get(dep)?;
        let blocks = status == StackStatus::Failed || (command.mutates() && !status.is_terminal());
        blocks.then(|| (Arc::clone(dep), status))
    });
    if let Some((dependency, status)) = blocking {
        warn!(
            stack = %stack,
            dependency = %dependency,
            dependency_status = %status,
            "Skipping, dependency did not complete"
        );
        statuses.insert(stack, StackStatus::Failed);
        return StackStatus::Failed;
    }

    let Ok(_permit) = semaphore.acquire_owned().await else {
        error!(stack = %stack, "Worker pool closed before stack could run");
        statuses.insert(stack, StackStatus::Failed);
        return StackStatus::Failed;
    };

    statuses.insert(Arc::clone(&stack), StackStatus::InProgress);
    let started = Instant::now();

    let status = match command.invoke(&*actions, &stack, &args).await {
        Ok(status) => status,
        Err(e) => {
            error!(stack = %stack, command = %command, error = %e, "Stack action failed");
            StackStatus::Failed
        }
    };

    debug!(
        stack = %stack,
        status = %status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Stack action returned"
    );
    statuses.insert(stack, status);
    status
}
