use colored::Colorize;

use crate::executor::actions::{Command, StackStatus};
use crate::executor::parallel::StatusMap;
use crate::planner::plan::LaunchOrder;

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg.green());
}

/// Print an error message.
pub fn print_error(msg: &str) {
    println!("{} {}", "✗".red().bold(), msg.red());
}

/// Print a resolved launch order, one numbered section per batch.
pub fn print_launch_order(command: Command, order: &LaunchOrder) {
    println!();
    if order.stack_count() == 0 {
        println!("{}", "No stacks to run.".yellow());
        return;
    }

    // Batches emptied by filtering are not shown
    let batches: Vec<_> = order.batches().iter().filter(|b| !b.is_empty()).collect();
    println!(
        "Stratus will run {} on {} stack(s) in {} batch(es):",
        command.as_str().bold(),
        order.stack_count(),
        batches.len()
    );

    for (idx, batch) in batches.into_iter().enumerate() {
        println!();
        println!("  {} {}", "Batch".bold(), (idx + 1).to_string().bold());
        for stack in batch {
            let prerequisites = order.prerequisites(stack);
            if prerequisites.is_empty() {
                println!("    {} {}", "→".blue(), stack.name);
            } else {
                println!(
                    "    {} {} {}",
                    "→".blue(),
                    stack.name,
                    format!(
                        "(after {})",
                        prerequisites
                            .iter()
                            .map(|s| s.name.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                    .dimmed()
                );
            }
        }
    }
    println!();
}

fn colored_status(status: StackStatus) -> colored::ColoredString {
    let text = status.to_string();
    match status {
        StackStatus::Complete => text.green(),
        StackStatus::Failed => text.red().bold(),
        StackStatus::InProgress => text.yellow(),
        StackStatus::Pending => text.dimmed(),
    }
}

/// Print the final status of every stack, aligned on the stack name.
pub fn print_status_map(statuses: &StatusMap) {
    let width = statuses.keys().map(|s| s.name.len()).max().unwrap_or(0);
    println!();
    for (stack, status) in statuses {
        println!(
            "  {:<width$}  {}",
            stack.name,
            colored_status(*status),
            width = width
        );
    }
}
