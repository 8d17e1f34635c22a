use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::coordinator::ResultsOp;

#[derive(Debug, Parser)]
#[clap(
    version,
    about = "Distributed load-test orchestration: provision load-agent fleets on AWS or fixed hosts, drive JMeter plans, monitor targets, and aggregate results."
)]
pub struct CliArgs {
    /// Configuration file (defaults to hailstorm.toml / hailstorm.json)
    #[arg(long, short)]
    pub config: Option<String>,

    /// Workspace root holding per-project state
    #[arg(long, default_value = ".hailstorm")]
    pub workspace: String,

    /// Verbose logging
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Prepare clusters, plans and target monitors
    Setup {
        /// Re-run even when the configuration is unchanged
        #[arg(long)]
        force: bool,
    },
    /// Open a new execution cycle and generate load
    Start {
        /// Re-upload plan artifacts even if unchanged
        #[arg(long)]
        redeploy: bool,
    },
    /// Stop load generation and collect results
    Stop {
        /// Let running plans finish instead of signalling them
        #[arg(long)]
        wait: bool,
        /// Park agent hosts after the load stops
        #[arg(long)]
        suspend: bool,
    },
    /// Hard-stop the current cycle without collecting results
    Abort {
        /// Park agent hosts after aborting
        #[arg(long)]
        suspend: bool,
    },
    /// Release agents and remote resources
    Terminate,
    /// Show masters still generating load
    Status,
    /// Inspect, exclude/include, export/import or report cycles
    Results(ResultsArgs),
    /// Destroy execution history (or the whole project with --all)
    Purge {
        #[arg(long)]
        all: bool,
    },
}

#[derive(Debug, Args)]
pub struct ResultsArgs {
    #[arg(value_enum)]
    pub op: ResultsOpArg,

    /// Cycle ids to operate on (all eligible cycles when omitted)
    pub cycle_ids: Vec<i64>,

    /// Result file or bundle to import
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Plan name an import attaches to
    #[arg(long)]
    pub plan: Option<String>,

    /// Cluster id an import attaches to
    #[arg(long)]
    pub cluster: Option<i64>,

    /// Existing cycle id an import attaches to
    #[arg(long)]
    pub cycle: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResultsOpArg {
    Show,
    Exclude,
    Include,
    Export,
    Import,
    Report,
}

impl From<ResultsOpArg> for ResultsOp {
    fn from(op: ResultsOpArg) -> Self {
        match op {
            ResultsOpArg::Show => ResultsOp::Show,
            ResultsOpArg::Exclude => ResultsOp::Exclude,
            ResultsOpArg::Include => ResultsOp::Include,
            ResultsOpArg::Export => ResultsOp::Export,
            ResultsOpArg::Import => ResultsOp::Import,
            ResultsOpArg::Report => ResultsOp::Report,
        }
    }
}
