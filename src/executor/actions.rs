use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::dag::stack::Stack;

/// Outcome of running a command against one stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StackStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
}

impl StackStatus {
    /// `Complete` and `Failed` never change again within a run.
    pub fn is_terminal(self) -> bool {
        matches!(self, StackStatus::Complete | StackStatus::Failed)
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StackStatus::Pending => "PENDING",
            StackStatus::InProgress => "IN_PROGRESS",
            StackStatus::Complete => "COMPLETE",
            StackStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// The closed set of operations that can be planned and executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Create,
    Update,
    Launch,
    Delete,
    Status,
    Diff,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::Create,
        Command::Update,
        Command::Launch,
        Command::Delete,
        Command::Status,
        Command::Diff,
    ];

    /// Tear-down commands walk the graph backwards: a stack goes only after
    /// everything that depends on it is gone.
    pub fn reverses(self) -> bool {
        matches!(self, Command::Delete)
    }

    /// Commands that change cloud resources. A stack only runs them once
    /// every prerequisite has settled.
    pub fn mutates(self) -> bool {
        matches!(
            self,
            Command::Create | Command::Update | Command::Launch | Command::Delete
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Command::Create => "create",
            Command::Update => "update",
            Command::Launch => "launch",
            Command::Delete => "delete",
            Command::Status => "status",
            Command::Diff => "diff",
        }
    }

    /// Run this command for `stack` through `actions`.
    pub async fn invoke(
        self,
        actions: &dyn StackActions,
        stack: &Stack,
        args: &[String],
    ) -> Result<StackStatus> {
        match self {
            Command::Create => actions.create(stack, args).await,
            Command::Update => actions.update(stack, args).await,
            Command::Launch => actions.launch(stack, args).await,
            Command::Delete => actions.delete(stack, args).await,
            Command::Status => actions.status(stack, args).await,
            Command::Diff => actions.diff(stack, args).await,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match Command::ALL.iter().find(|c| c.as_str() == s) {
            Some(command) => Ok(*command),
            None => bail!(
                "Unknown command '{}'. Valid commands are: {}",
                s,
                Command::ALL
                    .iter()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

/// Performs the per-stack operations. One method per [`Command`].
///
/// Implementations return the resulting status or an error; the executor
/// records any error as [`StackStatus::Failed`] and does not look further.
/// `args` are passed through verbatim from the caller.
#[async_trait]
pub trait StackActions: Send + Sync {
    async fn create(&self, stack: &Stack, args: &[String]) -> Result<StackStatus>;
    async fn update(&self, stack: &Stack, args: &[String]) -> Result<StackStatus>;
    async fn launch(&self, stack: &Stack, args: &[String]) -> Result<StackStatus>;
    async fn delete(&self, stack: &Stack, args: &[String]) -> Result<StackStatus>;
    async fn status(&self, stack: &Stack, args: &[String]) -> Result<StackStatus>;
    async fn diff(&self, stack: &Stack, args: &[String]) -> Result<StackStatus>;
}
