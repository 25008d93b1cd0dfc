//! Policy Optimizer & Training Driver
//!
//! `PolicyOptimizer` is the seam to the external learning algorithm: give it
//! an environment and a step budget, get back a trained policy; give it a
//! path, get the persisted artifact back. The built-in implementation is a
//! seeded derivative-free search over linear policies, good enough to drive
//! the full lifecycle without a deep-learning dependency.

use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::env::TradingEnv;
use crate::error::{Result, TradegymError};
use crate::market::MarketTable;
use crate::policy::{LinearPolicy, TradingPolicy};

/// External learning algorithm, seen from the pipeline.
#[cfg_attr(test, mockall::automock)]
pub trait PolicyOptimizer: Send + Sync {
    /// Train a policy in `env`, consuming roughly `step_budget` environment
    /// steps. Blocking; no progress callback is guaranteed.
    fn train(&self, env: &mut TradingEnv, step_budget: u64) -> Result<Box<dyn TradingPolicy>>;

    /// Load a previously persisted artifact.
    fn load(&self, path: &Path) -> Result<Box<dyn TradingPolicy>>;
}

/// Seeded hill-climbing search over linear policy weights.
#[derive(Debug, Clone)]
pub struct RandomSearchOptimizer {
    seed: u64,
    perturbation_scale: f64,
}

impl RandomSearchOptimizer {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            perturbation_scale: 0.3,
        }
    }

    pub fn with_perturbation_scale(mut self, scale: f64) -> Self {
        self.perturbation_scale = scale;
        self
    }

    /// One full deterministic episode; returns (total reward, steps taken).
    fn evaluate(env: &mut TradingEnv, policy: &LinearPolicy) -> Result<(f64, u64)> {
        let mut obs = env.reset();
        let mut total_reward = 0.0;
        let mut steps = 0u64;
        loop {
            let action = policy.select_action(&obs, true);
            let outcome = env.step(action)?;
            total_reward += outcome.reward;
            steps += 1;
            if outcome.terminated || outcome.truncated {
                break;
            }
            obs = outcome.observation;
        }
        Ok((total_reward, steps))
    }
}

impl PolicyOptimizer for RandomSearchOptimizer {
    fn train(&self, env: &mut TradingEnv, step_budget: u64) -> Result<Box<dyn TradingPolicy>> {
        if step_budget == 0 {
            return Err(TradegymError::Optimizer(
                "step budget must be positive".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best = LinearPolicy::random(&mut rng);
        let (mut best_reward, mut steps_used) = Self::evaluate(env, &best)?;
        let mut candidates = 1u64;

        while steps_used < step_budget {
            let candidate = best.perturbed(&mut rng, self.perturbation_scale);
            let (reward, steps) = Self::evaluate(env, &candidate)?;
            steps_used += steps;
            candidates += 1;
            if reward > best_reward {
                debug!(
                    candidates,
                    reward, best_reward, "search found a better policy"
                );
                best = candidate;
                best_reward = reward;
            }
        }

        info!(
            candidates,
            steps_used, best_reward, "random search finished"
        );
        Ok(Box::new(best.with_train_steps(steps_used)))
    }

    fn load(&self, path: &Path) -> Result<Box<dyn TradingPolicy>> {
        Ok(Box::new(LinearPolicy::load(path)?))
    }
}

/// Policy Training Driver: build an environment over `table`, hand it to the
/// optimizer, persist the result at `artifact_path`.
///
/// The environment lives only inside this call, so it is released on every
/// exit path. The artifact is written atomically by the policy's `save`, so
/// optimizer failures never leave a partial file behind.
pub fn train_policy(
    optimizer: &dyn PolicyOptimizer,
    table: &MarketTable,
    step_budget: u64,
    artifact_path: &Path,
    initial_balance: f64,
) -> Result<()> {
    let mut env = TradingEnv::new(table.clone(), initial_balance)?;
    info!(
        step_budget,
        rows = table.len(),
        artifact = %artifact_path.display(),
        "starting policy training"
    );

    let policy = optimizer.train(&mut env, step_budget)?;
    policy.save(artifact_path)?;

    info!(artifact = %artifact_path.display(), "policy trained and saved");
    Ok(())
}
