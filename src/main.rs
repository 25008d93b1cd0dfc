use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tradegym::backtest::run_backtest;
use tradegym::cli::{Cli, Commands};
use tradegym::config::AppConfig;
use tradegym::error::Result;
use tradegym::ledger::{CsvLedger, TrainingLedger};
use tradegym::market::MarketTable;
use tradegym::optimizer::{train_policy, RandomSearchOptimizer};
use tradegym::retrain::{RetrainController, RetrainJob, RetrainOutcome};

fn init_logging(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn load_table(data: &Option<String>, seed: u64) -> Result<MarketTable> {
    match data {
        Some(path) => MarketTable::from_csv_path(path),
        None => {
            info!("no data file given, generating synthetic series");
            MarketTable::synthetic(500, seed)
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)?;
    init_logging(&config.logging.level);
    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("config error: {}", error);
        }
        anyhow::bail!("invalid configuration");
    }

    let optimizer = RandomSearchOptimizer::new(config.retrain.seed);
    let initial_balance = config.simulation.initial_balance;

    match cli.command {
        Commands::Train {
            data,
            steps,
            artifact,
        } => {
            let table = load_table(&data, config.retrain.seed)?;
            let steps = steps.unwrap_or(config.retrain.step_budget);
            let artifact = artifact.unwrap_or_else(|| config.retrain.artifact_path.clone());

            train_policy(
                &optimizer,
                &table,
                steps,
                Path::new(&artifact),
                initial_balance,
            )?;
            println!("Trained policy saved to {}", artifact);
        }

        Commands::Backtest { data, artifact } => {
            let table = load_table(&data, config.retrain.seed)?;
            let artifact = artifact.unwrap_or_else(|| config.retrain.artifact_path.clone());

            let report = run_backtest(&optimizer, Path::new(&artifact), &table, initial_balance)?;
            println!("Backtest of {}", artifact);
            println!("  Steps:        {}", report.steps);
            println!("  Total reward: {:.2}", report.total_reward);
            println!("  Final value:  {:.2}", report.final_value);
        }

        Commands::RetrainCheck {
            data,
            artifact,
            threshold,
            steps,
        } => {
            let table = load_table(&data, config.retrain.seed)?;
            let artifact = artifact.unwrap_or_else(|| config.retrain.artifact_path.clone());
            let threshold = threshold.unwrap_or(config.retrain.reward_threshold);
            let steps = steps.unwrap_or(config.retrain.step_budget);

            let ledger = Arc::new(CsvLedger::new(&config.retrain.ledger_path));
            let controller = Arc::new(RetrainController::new(
                Arc::new(optimizer),
                ledger,
                initial_balance,
            ));
            let job = RetrainJob::new(controller, table, artifact.clone().into(), threshold, steps);

            match job.run()? {
                RetrainOutcome::FreshTrained => {
                    println!("No artifact at {}, trained fresh.", artifact)
                }
                RetrainOutcome::Healthy { reward } => println!(
                    "Artifact healthy: reward {:.2} >= threshold {:.2}, no retrain.",
                    reward, threshold
                ),
                RetrainOutcome::Retrained {
                    previous_reward,
                    backup_path,
                } => println!(
                    "Reward {:.2} below threshold {:.2}: backed up to {} and retrained.",
                    previous_reward,
                    threshold,
                    backup_path.display()
                ),
                RetrainOutcome::Skipped => {
                    println!("Another retrain check is in flight, skipped.")
                }
            }
        }

        Commands::History { ledger } => {
            let path = ledger.unwrap_or_else(|| config.retrain.ledger_path.clone());
            let records = CsvLedger::new(&path).read_all()?;
            if records.is_empty() {
                println!("Ledger {} is empty.", path);
            } else {
                println!(
                    "{:<25} {:>10} {:>12}  {}",
                    "timestamp", "reward", "final_value", "model"
                );
                for rec in records {
                    println!(
                        "{:<25} {:>10.2} {:>12.2}  {}",
                        rec.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        rec.reward,
                        rec.final_value,
                        rec.model_name
                    );
                }
            }
        }

        Commands::Generate { rows, seed, out } => {
            let table = MarketTable::synthetic(rows, seed)?;
            table.write_csv_path(&out)?;
            println!("Wrote {} synthetic rows to {}", table.len(), out);
        }
    }

    Ok(())
}
