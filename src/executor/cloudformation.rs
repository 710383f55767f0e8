use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::actions::{StackActions, StackStatus};
use super::retry::with_retry;
use crate::config::types::YamlSettings;
use crate::dag::stack::Stack;

const CAPABILITIES: [&str; 3] = [
    "CAPABILITY_IAM",
    "CAPABILITY_NAMED_IAM",
    "CAPABILITY_AUTO_EXPAND",
];

/// Raised for throttled API calls; the only failure that is retried.
#[derive(Debug, Error)]
#[error("AWS API request was throttled: {0}")]
struct Throttled(String);

/// Result of an `aws` command execution.
#[derive(Debug)]
pub struct AwsResult {
    pub exit_code: i32,
    pub stdout_lines: Vec<String>,
    pub stderr_lines: Vec<String>,
}

impl AwsResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout(&self) -> String {
        self.stdout_lines.join("\n")
    }

    /// Extract a human-readable error message from the result.
    pub fn error_message(&self) -> String {
        let stderr = self
            .stderr_lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if !stderr.is_empty() {
            return stderr;
        }
        format!("exit code {}", self.exit_code)
    }

    fn stderr_contains(&self, needle: &str) -> bool {
        self.stderr_lines.iter().any(|l| l.contains(needle))
    }

    pub fn stack_missing(&self) -> bool {
        !self.success() && self.stderr_contains("does not exist")
    }

    pub fn no_updates(&self) -> bool {
        !self.success() && self.stderr_contains("No updates are to be performed")
    }

    pub fn throttled(&self) -> bool {
        !self.success()
            && (self.stderr_contains("Throttling") || self.stderr_contains("Rate exceeded"))
    }
}

/// What `launch` has to do, given the stack's current cloud status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchStep {
    Create,
    /// Delete the leftovers of a failed creation, then create.
    Recreate,
    Update,
    InProgress,
    Blocked(String),
}

pub fn launch_step(cloud_status: Option<&str>) -> LaunchStep {
    match cloud_status {
        None => LaunchStep::Create,
        Some("CREATE_FAILED" | "ROLLBACK_COMPLETE" | "REVIEW_IN_PROGRESS") => LaunchStep::Recreate,
        Some(s) if s.ends_with("COMPLETE") => LaunchStep::Update,
        Some(s) if s.ends_with("IN_PROGRESS") => LaunchStep::InProgress,
        Some(s) => LaunchStep::Blocked(s.to_string()),
    }
}

/// Collapse a CloudFormation stack status into a [`StackStatus`].
pub fn status_from_cloud(cloud_status: Option<&str>) -> StackStatus {
    match cloud_status {
        None => StackStatus::Pending,
        Some(s) if s.ends_with("ROLLBACK_COMPLETE") => StackStatus::Failed,
        Some(s) if s.ends_with("_COMPLETE") => StackStatus::Complete,
        Some(s) if s.ends_with("_IN_PROGRESS") => StackStatus::InProgress,
        Some(s) if s.ends_with("_FAILED") => StackStatus::Failed,
        Some(_) => StackStatus::Pending,
    }
}

/// Arguments for `create-stack` / `update-stack`.
pub fn deploy_args(subcommand: &str, stack: &Stack) -> Result<Vec<String>> {
    let template = stack
        .template_path
        .as_ref()
        .with_context(|| format!("Stack '{}' has no template_path", stack.name))?;

    let mut args = vec![
        subcommand.to_string(),
        "--stack-name".to_string(),
        stack.external_name.clone(),
        "--template-body".to_string(),
        format!("file://{}", template.display()),
        "--capabilities".to_string(),
    ];
    args.extend(CAPABILITIES.iter().map(|c| c.to_string()));

    if !stack.parameters.is_empty() {
        args.push("--parameters".to_string());
        args.extend(stack.parameters.iter().map(|(key, value)| {
            format!(
                "ParameterKey={},ParameterValue={}",
                key,
                value.replace(',', "\\,")
            )
        }));
    }

    if !stack.tags.is_empty() {
        args.push("--tags".to_string());
        args.extend(
            stack
                .tags
                .iter()
                .map(|(key, value)| format!("Key={},Value={}", key, value)),
        );
    }

    Ok(args)
}

/// Whether the local template matches the deployed one. YAML bodies come
/// back from the API as a string, JSON bodies as a document.
pub fn templates_match(local: &str, deployed: &serde_json::Value) -> bool {
    match deployed {
        serde_json::Value::String(body) => normalize(body) == normalize(local),
        other => serde_json::from_str::<serde_json::Value>(local)
            .map(|local| &local == other)
            .unwrap_or(false),
    }
}

fn normalize(body: &str) -> Vec<&str> {
    body.lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect()
}

/// [`StackActions`] backed by the `aws cloudformation` CLI.
///
/// Each instance owns its settings; nothing is cached across instances.
#[derive(Debug, Clone)]
pub struct CloudFormationActions {
    settings: YamlSettings,
}

impl CloudFormationActions {
    pub fn new(settings: YamlSettings) -> Self {
        Self { settings }
    }

    /// Append region/profile, preferring the stack's own over project settings.
    fn connection_args(&self, stack: &Stack, args: &mut Vec<String>) {
        if let Some(region) = stack.region.as_ref().or(self.settings.region.as_ref()) {
            args.push("--region".to_string());
            args.push(region.clone());
        }
        if let Some(profile) = stack.profile.as_ref().or(self.settings.profile.as_ref()) {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
    }

    /// Run `aws cloudformation <args>` for a stack, retrying throttled calls.
    async fn run_aws(&self, stack: &Stack, args: Vec<String>) -> Result<AwsResult> {
        let mut full_args = vec!["cloudformation".to_string()];
        full_args.extend(args);
        self.connection_args(stack, &mut full_args);

        let operation = format!(
            "{} {}",
            full_args.get(1).map(String::as_str).unwrap_or("cloudformation"),
            stack.external_name
        );
        with_retry(
            self.settings.max_retries,
            self.settings.retry_delay_ms,
            &operation,
            |e: &anyhow::Error| e.downcast_ref::<Throttled>().is_some(),
            || self.run_once(&full_args),
        )
        .await
    }

    async fn run_once(&self, args: &[String]) -> Result<AwsResult> {
        let binary = &self.settings.aws_binary;
        tracing::debug!(binary = binary.as_str(), args = ?args, "Running aws");

        let mut child = Command::new(binary)
            .args(args)
            .env("AWS_PAGER", "")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", binary))?;

        let stdout = child.stdout.take().context("aws stdout was not captured")?;
        let stderr = child.stderr.take().context("aws stderr was not captured")?;

        let mut stdout_stream = BufReader::new(stdout).lines();
        let mut stderr_stream = BufReader::new(stderr).lines();

        let stdout_handle = tokio::spawn(async move {
            let mut lines = Vec::new();
            while let Ok(Some(line)) = stdout_stream.next_line().await {
                tracing::debug!(stream = "stdout", "{}", line);
                lines.push(line);
            }
            lines
        });

        let stderr_handle = tokio::spawn(async move {
            let mut lines = Vec::new();
            while let Ok(Some(line)) = stderr_stream.next_line().await {
                tracing::debug!(stream = "stderr", "{}", line);
                lines.push(line);
            }
            lines
        });

        let stdout_lines = stdout_handle.await?;
        let stderr_lines = stderr_handle.await?;
        let status = child.wait().await?;

        let result = AwsResult {
            exit_code: status.code().unwrap_or(-1),
            stdout_lines,
            stderr_lines,
        };
        if result.throttled() {
            return Err(Throttled(result.error_message()).into());
        }
        Ok(result)
    }

    /// Current CloudFormation status string, `None` if the stack does not exist.
    async fn cloud_status(&self, stack: &Stack) -> Result<Option<String>> {
        let result = self
            .run_aws(
                stack,
                vec![
                    "describe-stacks".to_string(),
                    "--stack-name".to_string(),
                    stack.external_name.clone(),
                    "--query".to_string(),
                    "Stacks[0].StackStatus".to_string(),
                    "--output".to_string(),
                    "text".to_string(),
                ],
            )
            .await?;

        if result.stack_missing() {
            return Ok(None);
        }
        if !result.success() {
            bail!(
                "describe-stacks failed for stack '{}': {}",
                stack.name,
                result.error_message()
            );
        }
        Ok(Some(result.stdout().trim().to_string()))
    }

    /// Block on a CloudFormation waiter and turn its outcome into a status.
    async fn wait(&self, stack: &Stack, waiter: &str, verb_past: &str) -> Result<StackStatus> {
        let result = self
            .run_aws(
                stack,
                vec![
                    "wait".to_string(),
                    waiter.to_string(),
                    "--stack-name".to_string(),
                    stack.external_name.clone(),
                ],
            )
            .await?;

        if result.success() {
            println!(
                "{}: {}",
                stack.name,
                format!("{} complete", verb_past).green().bold()
            );
            Ok(StackStatus::Complete)
        } else {
            println!(
                "{}: {}: {}",
                stack.name.bold(),
                "FAILED".red().bold(),
                result.error_message().red()
            );
            Ok(StackStatus::Failed)
        }
    }

    async fn deploy(
        &self,
        stack: &Stack,
        subcommand: &str,
        args: &[String],
    ) -> Result<AwsResult> {
        let mut deploy = deploy_args(subcommand, stack)?;
        deploy.extend(args.iter().cloned());
        self.run_aws(stack, deploy).await
    }
}

#[async_trait]
impl StackActions for CloudFormationActions {
    async fn create(&self, stack: &Stack, args: &[String]) -> Result<StackStatus> {
        println!("{}: {}...", stack.name, "Creating".cyan());
        let result = self.deploy(stack, "create-stack", args).await?;
        if !result.success() {
            bail!(
                "create-stack failed for stack '{}': {}",
                stack.name,
                result.error_message()
            );
        }
        self.wait(stack, "stack-create-complete", "Creation").await
    }

    async fn update(&self, stack: &Stack, args: &[String]) -> Result<StackStatus> {
        println!("{}: {}...", stack.name, "Updating".cyan());
        let result = self.deploy(stack, "update-stack", args).await?;
        if result.no_updates() {
            println!("{}: {}", stack.name, "No updates to perform".dimmed());
            return Ok(StackStatus::Complete);
        }
        if !result.success() {
            bail!(
                "update-stack failed for stack '{}': {}",
                stack.name,
                result.error_message()
            );
        }
        self.wait(stack, "stack-update-complete", "Update").await
    }

    async fn launch(&self, stack: &Stack, args: &[String]) -> Result<StackStatus> {
        let current = self.cloud_status(stack).await?;
        match launch_step(current.as_deref()) {
            LaunchStep::Create => self.create(stack, args).await,
            LaunchStep::Recreate => {
                tracing::info!(stack = %stack, "Deleting stack left over from a failed creation");
                if self.delete(stack, &[]).await? != StackStatus::Complete {
                    return Ok(StackStatus::Failed);
                }
                self.create(stack, args).await
            }
            LaunchStep::Update => self.update(stack, args).await,
            LaunchStep::InProgress => {
                tracing::warn!(stack = %stack, "Stack operation already in progress");
                Ok(StackStatus::InProgress)
            }
            LaunchStep::Blocked(status) => bail!(
                "Stack '{}' is in state {} and cannot be updated",
                stack.name,
                status
            ),
        }
    }

    async fn delete(&self, stack: &Stack, args: &[String]) -> Result<StackStatus> {
        if self.cloud_status(stack).await?.is_none() {
            println!("{}: {}", stack.name, "Does not exist, nothing to delete".dimmed());
            return Ok(StackStatus::Complete);
        }

        println!("{}: {}...", stack.name, "Destroying".cyan());
        let mut delete = vec![
            "delete-stack".to_string(),
            "--stack-name".to_string(),
            stack.external_name.clone(),
        ];
        delete.extend(args.iter().cloned());
        let result = self.run_aws(stack, delete).await?;
        if !result.success() {
            bail!(
                "delete-stack failed for stack '{}': {}",
                stack.name,
                result.error_message()
            );
        }
        self.wait(stack, "stack-delete-complete", "Destruction").await
    }

    async fn status(&self, stack: &Stack, _args: &[String]) -> Result<StackStatus> {
        let current = self.cloud_status(stack).await?;
        println!(
            "{}: {}",
            stack.name,
            current.as_deref().unwrap_or("PENDING").bold()
        );
        Ok(status_from_cloud(current.as_deref()))
    }

    async fn diff(&self, stack: &Stack, args: &[String]) -> Result<StackStatus> {
        let template = stack
            .template_path
            .as_ref()
            .with_context(|| format!("Stack '{}' has no template_path", stack.name))?;
        let local = tokio::fs::read_to_string(template)
            .await
            .with_context(|| format!("Failed to read template {}", template.display()))?;

        let mut get_template = vec![
            "get-template".to_string(),
            "--stack-name".to_string(),
            stack.external_name.clone(),
            "--query".to_string(),
            "TemplateBody".to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        get_template.extend(args.iter().cloned());
        let result = self.run_aws(stack, get_template).await?;

        if result.stack_missing() {
            println!("{}: {}", stack.name, "not deployed".yellow());
            return Ok(StackStatus::Complete);
        }
        if !result.success() {
            bail!(
                "get-template failed for stack '{}': {}",
                stack.name,
                result.error_message()
            );
        }

        let deployed: serde_json::Value = serde_json::from_str(&result.stdout())
            .with_context(|| format!("Unexpected get-template output for '{}'", stack.name))?;
        if templates_match(&local, &deployed) {
            println!("{}: {}", stack.name, "no difference".green());
        } else {
            println!("{}: {}", stack.name, "template differs".yellow().bold());
        }
        Ok(StackStatus::Complete)
    }
}
