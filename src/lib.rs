pub mod backtest;
pub mod cli;
pub mod config;
pub mod env;
pub mod error;
pub mod ledger;
pub mod market;
pub mod optimizer;
pub mod policy;
pub mod retrain;

pub use backtest::{run_backtest, BacktestReport};
pub use config::AppConfig;
pub use env::{Action, Observation, StepOutcome, TradingEnv, OBSERVATION_DIM};
pub use error::{Result, TradegymError};
pub use ledger::{CsvLedger, MemoryLedger, TrainingLedger, TrainingRecord, LEDGER_CAPACITY};
pub use market::{MarketRow, MarketTable};
pub use optimizer::{train_policy, PolicyOptimizer, RandomSearchOptimizer};
pub use policy::{LinearPolicy, TradingPolicy};
pub use retrain::{backup_path, RetrainController, RetrainJob, RetrainOutcome};
