use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tradegym")]
#[command(version = "0.1.0")]
#[command(about = "Trading-policy simulation, backtest and retrain pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory
    #[arg(short, long, default_value = "config")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a policy artifact from scratch
    Train {
        /// Market data CSV (columns: close, momentum, volume).
        /// A synthetic series is generated when omitted.
        #[arg(short, long)]
        data: Option<String>,
        /// Environment-step budget (default: config retrain.step_budget)
        #[arg(long)]
        steps: Option<u64>,
        /// Artifact output path (default: config retrain.artifact_path)
        #[arg(short, long)]
        artifact: Option<String>,
    },
    /// Backtest an existing policy artifact
    Backtest {
        /// Market data CSV; synthetic series when omitted
        #[arg(short, long)]
        data: Option<String>,
        /// Artifact path (default: config retrain.artifact_path)
        #[arg(short, long)]
        artifact: Option<String>,
    },
    /// Run one reward-gated retrain check (the scheduler entry point)
    RetrainCheck {
        /// Market data CSV; synthetic series when omitted
        #[arg(short, long)]
        data: Option<String>,
        /// Artifact path (default: config retrain.artifact_path)
        #[arg(short, long)]
        artifact: Option<String>,
        /// Reward threshold below which retraining triggers
        #[arg(short, long)]
        threshold: Option<f64>,
        /// Environment-step budget for the retrain
        #[arg(long)]
        steps: Option<u64>,
    },
    /// Print the training history ledger
    History {
        /// Ledger path (default: config retrain.ledger_path)
        #[arg(short, long)]
        ledger: Option<String>,
    },
    /// Generate a synthetic market data CSV
    Generate {
        /// Number of rows
        #[arg(short, long, default_value = "500")]
        rows: usize,
        /// RNG seed
        #[arg(short, long, default_value = "42")]
        seed: u64,
        /// Output path
        #[arg(short, long)]
        out: String,
    },
}
