//! Backtest Evaluator
//!
//! Deterministic replay of a persisted policy over a market table. No
//! exploration randomness: the same artifact and table always produce the
//! same report.

use std::path::Path;

use tracing::{debug, info};

use crate::env::TradingEnv;
use crate::error::Result;
use crate::market::MarketTable;
use crate::optimizer::PolicyOptimizer;
use crate::policy::TradingPolicy;

/// Aggregate performance of one backtest episode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BacktestReport {
    /// Sum of all step rewards
    pub total_reward: f64,
    /// Portfolio value at the terminal step index
    pub final_value: f64,
    /// Steps replayed
    pub steps: usize,
}

/// Replay the artifact at `artifact_path` against `table`.
///
/// Fails with `ArtifactNotFound` for a missing path and `ArtifactCorrupt`
/// when the loader rejects the file. Each step is surfaced as a tracing
/// event (step index, action, reward, running portfolio value) for external
/// log consumers; that side channel is not part of the return contract.
pub fn run_backtest(
    loader: &dyn PolicyOptimizer,
    artifact_path: &Path,
    table: &MarketTable,
    initial_balance: f64,
) -> Result<BacktestReport> {
    let policy = loader.load(artifact_path)?;
    info!(artifact = %artifact_path.display(), rows = table.len(), "loaded policy for backtest");

    let mut env = TradingEnv::new(table.clone(), initial_balance)?;
    let mut obs = env.reset();
    let mut total_reward = 0.0;
    let mut steps = 0usize;

    loop {
        let action = policy.select_action(&obs, true);
        let outcome = env.step(action)?;
        total_reward += outcome.reward;

        debug!(
            step = steps,
            action = action.to_index(),
            reward = outcome.reward,
            portfolio_value = env.portfolio_value(),
            "backtest step"
        );
        steps += 1;

        if outcome.terminated || outcome.truncated {
            break;
        }
        obs = outcome.observation;
    }

    let final_value = env.portfolio_value();
    info!(total_reward, final_value, steps, "backtest complete");

    Ok(BacktestReport {
        total_reward,
        final_value,
        steps,
    })
}
