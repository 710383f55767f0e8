use std::io::Write;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

/// Reset SIGPIPE to default behavior so piping (e.g. `stratus graph | dot`) exits cleanly
/// instead of panicking on broken pipe.
#[cfg(unix)]
fn reset_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use stratus::config::loader::StackSource;
use stratus::dag::visualizer;
use stratus::executor::actions::{Command, StackActions};
use stratus::executor::cloudformation::CloudFormationActions;
use stratus::executor::parallel::StatusMap;
use stratus::output::formatter;
use stratus::output::report::Report;
use stratus::planner::launch::{prepare_launch, run_launch};

/// stratus - dependency-ordered CloudFormation stack orchestration
#[derive(Parser)]
#[command(name = "stratus", version, about, long_about = None)]
struct Cli {
    /// Path to config directory or file
    #[arg(short, long, default_value = ".")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Maximum number of stacks run at once within a batch
    #[arg(long)]
    max_concurrency: Option<NonZeroUsize>,

    /// Run every targeted stack in one batch, ignoring dependencies
    #[arg(long)]
    ignore_dependencies: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create stacks in dependency order
    Create {
        /// Stack or stack group path
        path: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Extra arguments passed to every aws invocation
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Update existing stacks in dependency order
    Update {
        path: String,

        #[arg(short, long)]
        yes: bool,

        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Create or update stacks, skipping ignored and obsolete ones
    Launch {
        path: String,

        /// Delete obsolete stacks first
        #[arg(long)]
        prune: bool,

        #[arg(short, long)]
        yes: bool,

        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Delete stacks in reverse dependency order
    Delete {
        path: String,

        #[arg(short, long)]
        yes: bool,

        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Show the deployed status of stacks
    Status { path: String },

    /// Compare local templates with deployed ones
    Diff {
        path: String,

        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Show the launch order without running anything
    Plan {
        path: String,

        /// Command to plan for
        #[arg(long, default_value = "launch")]
        command: Command,
    },

    /// Show dependency graph as DOT
    Graph {
        /// Limit the graph to this path and its dependencies
        path: Option<String>,
    },

    /// Validate configuration without running anything
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    #[cfg(unix)]
    reset_sigpipe();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Create {
            ref path,
            yes,
            ref args,
        } => cmd_run(&cli, Command::Create, path, yes, args).await,
        Commands::Update {
            ref path,
            yes,
            ref args,
        } => cmd_run(&cli, Command::Update, path, yes, args).await,
        Commands::Launch {
            ref path,
            prune,
            yes,
            ref args,
        } => cmd_launch(&cli, path, prune, yes, args).await,
        Commands::Delete {
            ref path,
            yes,
            ref args,
        } => cmd_run(&cli, Command::Delete, path, yes, args).await,
        Commands::Status { ref path } => cmd_run(&cli, Command::Status, path, true, &[]).await,
        Commands::Diff { ref path, ref args } => {
            cmd_run(&cli, Command::Diff, path, true, args).await
        }
        Commands::Plan { ref path, command } => cmd_plan(&cli, path, command),
        Commands::Graph { ref path } => cmd_graph(&cli, path.as_deref()),
        Commands::Validate => cmd_validate(&cli),
    }
}

fn load_source(cli: &Cli) -> Result<StackSource> {
    StackSource::load(Path::new(&cli.config))
}

fn actions_for(source: &StackSource) -> Arc<dyn StackActions> {
    Arc::new(CloudFormationActions::new(source.settings().clone()))
}

/// Ask for a literal "yes". Returns false if the user declined.
fn confirm(command: Command, path: &str) -> Result<bool> {
    println!(
        "\nDo you want to {} '{}'? Only '{}' will be accepted.",
        command.as_str().bold(),
        path,
        "yes".bold()
    );
    print!("  Enter a value: ");
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    if input.trim() != "yes" {
        println!("\n{}", format!("{} cancelled.", command).yellow());
        return Ok(false);
    }
    Ok(true)
}

fn finish(statuses: &StatusMap) -> Result<()> {
    formatter::print_status_map(statuses);

    let report = Report::from_statuses(statuses);
    println!();
    println!("{}", report);
    if report.has_failures() {
        bail!("{} stack(s) failed", report.failed);
    }
    Ok(())
}

async fn cmd_run(cli: &Cli, command: Command, path: &str, yes: bool, args: &[String]) -> Result<()> {
    let source = load_source(cli)?;
    let options = source.plan_options(cli.max_concurrency, cli.ignore_dependencies);
    let mut plan = source.plan(path, options);

    let order = plan.resolve(command, command.reverses())?;
    formatter::print_launch_order(command, order);

    if !yes && !confirm(command, path)? {
        return Ok(());
    }

    let statuses = plan.run(command, actions_for(&source), args).await?;
    finish(&statuses)
}

async fn cmd_launch(cli: &Cli, path: &str, prune: bool, yes: bool, args: &[String]) -> Result<()> {
    let source = load_source(cli)?;
    let options = source.plan_options(cli.max_concurrency, cli.ignore_dependencies);
    let mut plan = source.plan(path, options);

    let prune_plan = prepare_launch(&mut plan, prune)?;
    if let Some(order) = prune_plan.as_ref().and_then(|p| p.launch_order()) {
        formatter::print_launch_order(Command::Delete, order);
    }
    if let Some(order) = plan.launch_order() {
        formatter::print_launch_order(Command::Launch, order);
    }

    if !yes && !confirm(Command::Launch, path)? {
        return Ok(());
    }

    let statuses = run_launch(&mut plan, prune_plan, actions_for(&source), args).await?;
    finish(&statuses)
}

fn cmd_plan(cli: &Cli, path: &str, command: Command) -> Result<()> {
    let source = load_source(cli)?;
    let options = source.plan_options(cli.max_concurrency, cli.ignore_dependencies);
    let mut plan = source.plan(path, options);

    let order = plan.resolve(command, command.reverses())?;
    formatter::print_launch_order(command, order);
    Ok(())
}

fn cmd_graph(cli: &Cli, path: Option<&str>) -> Result<()> {
    let source = load_source(cli)?;

    let dot = match path {
        Some(path) => {
            let targets = source.command_stacks(path);
            if targets.is_empty() {
                bail!("No stacks found at path '{}'", path);
            }
            let graph = source
                .graph()
                .filtered(targets.iter().map(|stack| &**stack), false);
            visualizer::to_dot(&graph)
        }
        None => visualizer::to_dot(source.graph()),
    };
    println!("{}", dot);
    Ok(())
}

fn cmd_validate(cli: &Cli) -> Result<()> {
    let source = load_source(cli)?;

    println!(
        "  {} project '{}', {} stack(s)",
        "→".blue(),
        source.project(),
        source.graph().len()
    );

    let cycles = source.graph().cycles();
    if !cycles.is_empty() {
        for cycle in &cycles {
            formatter::print_error(&format!("Dependency cycle: {}", cycle.join(" -> ")));
        }
        bail!("Configuration contains {} dependency cycle(s)", cycles.len());
    }

    for stack in source.graph().stacks() {
        if stack.template_path.is_none() && !stack.ignore {
            tracing::warn!(stack = %stack, "Stack has no template_path");
        }
    }

    formatter::print_success("Configuration is valid.");
    Ok(())
}
