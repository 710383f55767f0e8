use std::sync::Arc;

use tracing::info;

use super::error::PlanError;
use super::plan::Plan;
use crate::executor::actions::{Command, StackActions};
use crate::executor::parallel::StatusMap;

/// Deploy every stack of `plan` that is neither ignored nor obsolete.
///
/// With `prune`, obsolete stacks in the plan are deleted first (in reverse
/// dependency order). Pruning refuses to run if a stack that is not obsolete
/// still depends on one that would be deleted.
pub async fn launch(
    plan: &mut Plan,
    actions: Arc<dyn StackActions>,
    prune: bool,
    args: &[String],
) -> Result<StatusMap, PlanError> {
    let prune_plan = prepare_launch(plan, prune)?;
    run_launch(plan, prune_plan, actions, args).await
}

/// Resolve `plan` for launching and drop ignored and obsolete stacks from it.
///
/// Returns the delete plan for the obsolete stacks when `prune` is set and
/// there is anything to prune. The delete plan covers every dependent of an
/// obsolete stack, inside the command path or not, and each of them must be
/// obsolete too.
pub fn prepare_launch(plan: &mut Plan, prune: bool) -> Result<Option<Plan>, PlanError> {
    plan.resolve(Command::Launch, false)?;

    let obsolete: Vec<_> = plan.iter().filter(|stack| stack.obsolete).cloned().collect();

    let prune_plan = if prune && !obsolete.is_empty() {
        info!(
            stacks = ?obsolete.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "Pruning obsolete stacks"
        );
        let mut prune_plan = Plan::new(
            plan.command_path(),
            plan.graph().clone(),
            obsolete,
            plan.options(),
        );
        prune_plan.resolve(Command::Delete, true)?;
        check_prunable(&prune_plan)?;
        Some(prune_plan)
    } else {
        None
    };

    plan.filter(|stack| !stack.ignore && !stack.obsolete);
    Ok(prune_plan)
}

/// Run the prune plan, if any, then the launch plan, merging their statuses.
pub async fn run_launch(
    plan: &mut Plan,
    prune_plan: Option<Plan>,
    actions: Arc<dyn StackActions>,
    args: &[String],
) -> Result<StatusMap, PlanError> {
    let mut statuses = StatusMap::new();
    if let Some(mut prune_plan) = prune_plan {
        statuses.extend(prune_plan.run(Command::Delete, Arc::clone(&actions), &[]).await?);
    }
    statuses.extend(plan.run(Command::Launch, actions, args).await?);
    Ok(statuses)
}

/// Every stack the delete would reach must be obsolete. The offender is
/// reported next to the obsolete stack it depends on.
fn check_prunable(prune_plan: &Plan) -> Result<(), PlanError> {
    for stack in prune_plan.iter().filter(|stack| stack.obsolete) {
        if let Some(dependent) = prune_plan
            .graph()
            .dependents(stack)
            .into_iter()
            .find(|dependent| !dependent.obsolete)
        {
            return Err(PlanError::ObsoleteDependency {
                stack: stack.name.clone(),
                dependent: dependent.name.clone(),
            });
        }
    }
    Ok(())
}
