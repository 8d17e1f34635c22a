use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use hailstorm::args::{CliArgs, Command};
use hailstorm::config;
use hailstorm::coordinator::{Coordinator, ImportSelectors, PurgeScope, ResultsOutcome};
use hailstorm::error::{AppError, AppResult, ConfigError};
use hailstorm::logger;
use hailstorm::model::slugify;
use hailstorm::remote::{Executor, OpenSsh, RetryPolicy};
use hailstorm::store::Store;
use hailstorm::workspace::Workspace;

fn main() -> ExitCode {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // Help and version are not failures.
            if err.use_stderr() {
                eprintln!("{err}");
                return ExitCode::from(1);
            }
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
    };

    logger::init_logging(args.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

async fn run(args: CliArgs) -> AppResult<()> {
    let config = config::load_config(args.config.as_deref())
        .map_err(AppError::config)?
        .ok_or_else(|| {
            AppError::config(ConfigError::Read {
                path: "hailstorm.toml".to_owned(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no configuration found (pass --config or create hailstorm.toml)",
                ),
            })
        })?;

    let workspace = Workspace::new(Path::new(&args.workspace), &slugify(&config.project_code));
    workspace.create()?;
    let store = Store::open(&workspace.database_path()).await?;
    let executor = Executor::new(Arc::new(OpenSsh), RetryPolicy::default());
    let coordinator = Coordinator::new(config, store, executor, workspace);

    match args.command {
        Command::Setup { force } => coordinator.setup(force).await,
        Command::Start { redeploy } => {
            let cycle = coordinator.start(redeploy).await?;
            println!("Execution cycle {} started.", cycle.id);
            Ok(())
        }
        Command::Stop { wait, suspend } => {
            let cycle = coordinator.stop(wait, suspend).await?;
            println!("Execution cycle {} stopped.", cycle.id);
            Ok(())
        }
        Command::Abort { suspend } => {
            let cycle = coordinator.abort(suspend).await?;
            println!("Execution cycle {} aborted.", cycle.id);
            Ok(())
        }
        Command::Terminate => coordinator.terminate().await,
        Command::Status => {
            let agents = coordinator.status().await?;
            if agents.is_empty() {
                println!("No load generation in progress.");
            } else {
                for agent in agents {
                    println!(
                        "{} pid {} ({})",
                        agent.public_ip_address.as_deref().unwrap_or("-"),
                        agent.jmeter_pid.unwrap_or_default(),
                        agent.identifier.as_deref().unwrap_or("-"),
                    );
                }
            }
            Ok(())
        }
        Command::Results(results) => {
            let selectors = ImportSelectors {
                file: results.file.clone(),
                plan_name: results.plan.clone(),
                cluster_id: results.cluster,
                cycle_id: results.cycle,
            };
            let outcome = coordinator
                .results(results.op.into(), &results.cycle_ids, selectors)
                .await?;
            print_outcome(outcome);
            Ok(())
        }
        Command::Purge { all } => {
            let scope = if all { PurgeScope::All } else { PurgeScope::Tests };
            coordinator.purge(scope).await
        }
    }
}

fn print_outcome(outcome: ResultsOutcome) {
    match outcome {
        ResultsOutcome::Cycles(cycles) => {
            for cycle in cycles {
                println!(
                    "cycle {:>4}  {:<10}  threads {:>6}  started {}",
                    cycle.id,
                    cycle.status.as_str(),
                    cycle.threads_count,
                    cycle.started_at.to_rfc3339(),
                );
            }
        }
        ResultsOutcome::Bundle(path) => println!("Exported {}", path.display()),
        ResultsOutcome::Imported(cycle) => println!("Imported into cycle {}.", cycle.id),
        ResultsOutcome::Report(path) => println!("Report written to {}", path.display()),
    }
}
