use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use is_terminal::IsTerminal;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use frank::confirm::confirm;
use frank::kube_gateway::Gateway;
use frank::result::StackResult;
use frank::settings::AppSettings;
use frank::stack::{self, Stack};
use frank::{engine, Error};

#[derive(Parser)]
#[command(name = "frank", about = "Apply, plan, and delete Kubernetes resources from a templated config tree")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile matching stacks against the cluster.
    Apply {
        /// Stack filter (§3); matches every stack when omitted.
        stack: Option<String>,
        /// Skip the interactive confirmation prompt.
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Render matching stacks and diff them against the cluster without mutating it.
    Plan {
        /// Stack filter (§3); matches every stack when omitted.
        stack: Option<String>,
    },
    /// Delete every frank-owned object matching the filter.
    Delete {
        /// Stack filter (§3); matches every stack when omitted.
        stack: Option<String>,
        /// Skip the interactive confirmation prompt.
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Print the tool's name, version, commit, and build time.
    Version,
}

fn main() {
    let settings = AppSettings::load();
    init_tracing(&settings);

    let cli = Cli::parse();
    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start async runtime: {err}");
            process::exit(1);
        }
    };

    let exit_code = rt.block_on(run(cli));
    process::exit(exit_code);
}

fn init_tracing(settings: &AppSettings) {
    use tracing_subscriber::{filter::EnvFilter, prelude::*};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_filter()));
    let is_terminal = std::io::stdout().is_terminal();
    let collector = tracing_subscriber::Registry::default()
        .with(env_filter)
        .with(if is_terminal {
            Some(tracing_subscriber::fmt::layer())
        } else {
            None
        })
        .with(if is_terminal {
            None
        } else {
            Some(tracing_subscriber::fmt::layer().json())
        });
    if tracing::subscriber::set_global_default(collector).is_err() {
        eprintln!("tracing subscriber already set");
    }
}

async fn run(cli: Cli) -> i32 {
    match cli.command {
        Command::Version => {
            println!(
                "{} {} ({}, built {})",
                frank::CRATE_NAME,
                env!("CARGO_PKG_VERSION"),
                env!("FRANK_COMMIT"),
                env!("FRANK_BUILD_TIME"),
            );
            0
        }
        Command::Apply { stack, yes } => match locate_config_root() {
            Ok(root) => run_apply(&root, stack.as_deref().unwrap_or(""), yes).await,
            Err(err) => {
                eprintln!("{err}");
                1
            }
        },
        Command::Plan { stack } => match locate_config_root() {
            Ok(root) => run_plan(&root, stack.as_deref().unwrap_or("")).await,
            Err(err) => {
                eprintln!("{err}");
                1
            }
        },
        Command::Delete { stack, yes } => run_delete(stack.as_deref().unwrap_or(""), yes).await,
    }
}

async fn run_apply(config_root: &Path, filter: &str, yes: bool) -> i32 {
    let scope = if filter.is_empty() { "all stacks" } else { filter };
    if !yes && !confirm(&format!("apply '{scope}'")) {
        return 0;
    }

    let stacks = match enumerate_matching(config_root, filter) {
        Ok(stacks) => stacks,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };
    let gateway = match connect(&stacks).await {
        Ok(gateway) => gateway,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            watcher.cancel();
        }
    });

    let results = engine::apply_all(&gateway, config_root, &stacks, &cancel).await;
    report(&results)
}

async fn run_plan(config_root: &Path, filter: &str) -> i32 {
    let stacks = match enumerate_matching(config_root, filter) {
        Ok(stacks) => stacks,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };
    let gateway = match connect(&stacks).await {
        Ok(gateway) => gateway,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };

    let plans = engine::plan_all(&gateway, config_root, &stacks).await;
    let mut failed = false;
    for plan in plans {
        match plan {
            Ok(stack_plan) => {
                println!("stack {}: {}", stack_plan.stack, stack_plan.operation());
                for object in &stack_plan.objects {
                    println!("  {} {} - {}", object.kind, object.name, object.operation);
                    if !object.diff.is_empty() {
                        println!("{}", object.diff);
                    }
                }
            }
            Err(err) => {
                eprintln!("{err}");
                failed = true;
            }
        }
    }
    i32::from(failed)
}

async fn run_delete(filter: &str, yes: bool) -> i32 {
    let scope = if filter.is_empty() { "all stacks" } else { filter };
    if !yes && !confirm(&format!("delete '{scope}'")) {
        return 0;
    }

    let gateway = match Gateway::connect("").await {
        Ok(gateway) => gateway,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };

    let results = frank::delete::delete_matching(&gateway, filter).await;
    report(&results)
}

fn report(results: &[StackResult]) -> i32 {
    let mut failed = false;
    for result in results {
        result.log();
        if !result.is_success() {
            failed = true;
        }
    }
    if failed {
        error!("one or more stacks failed");
    } else {
        info!("all stacks reconciled successfully");
    }
    i32::from(failed)
}

fn enumerate_matching(config_root: &Path, filter: &str) -> frank::Result<Vec<Stack>> {
    let all = stack::enumerate(config_root)?;
    Ok(all.into_iter().filter(|s| s.matches(filter)).collect())
}

async fn connect(stacks: &[Stack]) -> frank::Result<Gateway> {
    let context = stacks
        .first()
        .and_then(|s| s.config.context.clone())
        .unwrap_or_default();
    Gateway::connect(&context).await
}

/// Locate_config_root implements the filesystem contract (§6): a `config/` directory
/// containing `config.yaml`, in the current directory or its immediate parent only.
fn locate_config_root() -> frank::Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    for candidate in [cwd.clone(), cwd.join("..")] {
        let config = candidate.join("config");
        if config.join("config.yaml").is_file() {
            return Ok(config.canonicalize().unwrap_or(config));
        }
    }
    Err(Error::ConfigNotFound(
        "no `config/config.yaml` found in the current directory or its parent".into(),
    ))
}
