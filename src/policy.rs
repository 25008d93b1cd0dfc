//! Trading Policy
//!
//! The trained policy is modeled as a capability: something that selects an
//! action for an observation and can persist itself. The concrete learner
//! behind it is opaque to the rest of the pipeline, so any optimization
//! library can be substituted without touching the environment or the
//! retrain loop.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::env::{Action, Observation, OBSERVATION_DIM};
use crate::error::{Result, TradegymError};

/// On-disk artifact format version. Bump on incompatible layout changes.
pub const ARTIFACT_FORMAT: u32 = 1;

/// Exploration rate used when action selection is not deterministic.
const EXPLORATION_EPSILON: f64 = 0.05;

/// A trained policy: selects actions and persists itself.
pub trait TradingPolicy: Send + Sync {
    /// Select an action for `obs`. With `deterministic` set, selection must
    /// be a pure function of the observation (no exploration randomness);
    /// backtests rely on this.
    fn select_action(&self, obs: &Observation, deterministic: bool) -> Action;

    /// Persist the artifact to `path`. A successful write must be the only
    /// way the path is created or updated.
    fn save(&self, path: &Path) -> Result<()>;
}

/// Linear scoring policy: one weight row and bias per action, argmax wins.
///
/// Small enough to train with derivative-free search and to serialize as
/// plain JSON, while exercising the full artifact lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearPolicy {
    format: u32,
    pub trained_at: DateTime<Utc>,
    pub train_steps: u64,
    weights: [[f64; OBSERVATION_DIM]; 3],
    bias: [f64; 3],
}

impl LinearPolicy {
    pub fn new(weights: [[f64; OBSERVATION_DIM]; 3], bias: [f64; 3]) -> Self {
        Self {
            format: ARTIFACT_FORMAT,
            trained_at: Utc::now(),
            train_steps: 0,
            weights,
            bias,
        }
    }

    /// Random initial candidate.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let mut weights = [[0.0; OBSERVATION_DIM]; 3];
        let mut bias = [0.0; 3];
        for row in weights.iter_mut() {
            for w in row.iter_mut() {
                *w = rng.gen_range(-1.0..1.0);
            }
        }
        for b in bias.iter_mut() {
            *b = rng.gen_range(-1.0..1.0);
        }
        Self::new(weights, bias)
    }

    /// Neighbouring candidate: every parameter nudged by up to `scale`.
    pub fn perturbed<R: Rng>(&self, rng: &mut R, scale: f64) -> Self {
        let mut next = self.clone();
        for row in next.weights.iter_mut() {
            for w in row.iter_mut() {
                *w += rng.gen_range(-scale..scale);
            }
        }
        for b in next.bias.iter_mut() {
            *b += rng.gen_range(-scale..scale);
        }
        next.trained_at = Utc::now();
        next
    }

    /// Record how many environment steps went into this policy.
    pub fn with_train_steps(mut self, steps: u64) -> Self {
        self.train_steps = steps;
        self
    }

    fn scores(&self, obs: &Observation) -> [f64; 3] {
        let mut scores = self.bias;
        for (score, row) in scores.iter_mut().zip(self.weights.iter()) {
            for (w, x) in row.iter().zip(obs.iter()) {
                *score += w * x;
            }
        }
        scores
    }

    fn argmax_action(&self, obs: &Observation) -> Action {
        let scores = self.scores(obs);
        let mut best = 0;
        for i in 1..scores.len() {
            if scores[i] > scores[best] {
                best = i;
            }
        }
        // Indices 0..3 always map to valid actions.
        Action::from_index(best).unwrap_or_default()
    }

    /// Load an artifact, distinguishing "missing" from "corrupt".
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TradegymError::ArtifactNotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)?;
        let policy: LinearPolicy =
            serde_json::from_str(&contents).map_err(|e| TradegymError::ArtifactCorrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if policy.format != ARTIFACT_FORMAT {
            return Err(TradegymError::ArtifactCorrupt {
                path: path.to_path_buf(),
                reason: format!(
                    "unsupported artifact format {} (expected {})",
                    policy.format, ARTIFACT_FORMAT
                ),
            });
        }
        Ok(policy)
    }
}

impl TradingPolicy for LinearPolicy {
    fn select_action(&self, obs: &Observation, deterministic: bool) -> Action {
        if !deterministic {
            let mut rng = rand::thread_rng();
            if rng.gen::<f64>() < EXPLORATION_EPSILON {
                let idx = rng.gen_range(0..Action::all().len());
                return Action::from_index(idx).unwrap_or_default();
            }
        }
        self.argmax_action(obs)
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write-to-temp-then-rename so readers never observe a half-written
        // artifact and a failed write leaves nothing behind at `path`.
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TradegymError::Validation(format!("bad artifact path: {:?}", path)))?;
        let tmp = path.with_file_name(format!("{}.tmp", file_name));

        let json = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;

        debug!("Saved policy artifact to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_artifact(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "tradegym_policy_{}_{}.json",
            std::process::id(),
            name
        ))
    }

    #[test]
    fn test_deterministic_selection_is_stable() {
        let policy = LinearPolicy::new(
            [
                [0.0, 0.0, 0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0, 0.0, 0.0],
            ],
            [0.0; 3],
        );
        let obs = [100.0, 0.1, 500.0, 10_000.0, 0.0];
        let first = policy.select_action(&obs, true);
        assert_eq!(first, Action::Buy);
        for _ in 0..20 {
            assert_eq!(policy.select_action(&obs, true), first);
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let path = temp_artifact("roundtrip");
        let mut rng = rand::rngs::mock::StepRng::new(1, 7);
        let policy = LinearPolicy::random(&mut rng).with_train_steps(123);
        policy.save(&path).unwrap();

        let loaded = LinearPolicy::load(&path).unwrap();
        assert_eq!(loaded.train_steps, 123);

        let obs = [100.0, 0.5, 300.0, 5_000.0, 2.0];
        assert_eq!(
            policy.select_action(&obs, true),
            loaded.select_action(&obs, true)
        );

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let path = temp_artifact("missing");
        let _ = std::fs::remove_file(&path);
        assert!(matches!(
            LinearPolicy::load(&path),
            Err(TradegymError::ArtifactNotFound(_))
        ));
    }

    #[test]
    fn test_load_garbage_is_corrupt() {
        let path = temp_artifact("garbage");
        std::fs::write(&path, "not json at all").unwrap();
        assert!(matches!(
            LinearPolicy::load(&path),
            Err(TradegymError::ArtifactCorrupt { .. })
        ));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_wrong_format_is_corrupt() {
        let path = temp_artifact("format");
        let mut rng = rand::rngs::mock::StepRng::new(1, 7);
        let mut policy = LinearPolicy::random(&mut rng);
        policy.format = ARTIFACT_FORMAT + 1;
        std::fs::write(&path, serde_json::to_string(&policy).unwrap()).unwrap();

        assert!(matches!(
            LinearPolicy::load(&path),
            Err(TradegymError::ArtifactCorrupt { .. })
        ));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_no_temp_file_left_after_save() {
        let path = temp_artifact("tmpclean");
        let mut rng = rand::rngs::mock::StepRng::new(1, 7);
        LinearPolicy::random(&mut rng).save(&path).unwrap();

        let tmp = path.with_file_name(format!(
            "{}.tmp",
            path.file_name().unwrap().to_str().unwrap()
        ));
        assert!(path.exists());
        assert!(!tmp.exists());

        let _ = std::fs::remove_file(&path);
    }
}
