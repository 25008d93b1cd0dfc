//! Retrain Decision Loop
//!
//! The feedback controller that keeps a deployed policy artifact performant:
//! backtest the current artifact, record the outcome, and retrain (after
//! backing up) when measured reward falls below the threshold. Retraining is
//! reward-gated, not time-gated; the scheduler only supplies cadence.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashSet;
use tracing::{info, warn};

use crate::backtest::run_backtest;
use crate::error::Result;
use crate::ledger::{TrainingLedger, TrainingRecord};
use crate::market::MarketTable;
use crate::optimizer::{train_policy, PolicyOptimizer};

/// Note attached to every retrain-check ledger record
const RETRAIN_CHECK_NOTE: &str = "auto-retrain check";

/// What one retrain check did
#[derive(Debug, Clone, PartialEq)]
pub enum RetrainOutcome {
    /// No artifact existed; a fresh one was trained (no backtest, no backup)
    FreshTrained,
    /// Artifact performed at or above the threshold; nothing changed
    Healthy { reward: f64 },
    /// Artifact underperformed; backed up and retrained in place
    Retrained {
        previous_reward: f64,
        backup_path: PathBuf,
    },
    /// Another check on the same artifact was already in flight
    Skipped,
}

/// Backup location derived from the artifact path: `-backup` appended to the
/// file stem, extension preserved. Part of the artifact path convention.
pub fn backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("artifact");
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => path.with_file_name(format!("{}-backup.{}", stem, ext)),
        None => path.with_file_name(format!("{}-backup", stem)),
    }
}

/// Orchestrates retrain checks over a single-writer artifact path.
pub struct RetrainController {
    optimizer: Arc<dyn PolicyOptimizer>,
    ledger: Arc<dyn TrainingLedger>,
    initial_balance: f64,
    in_flight: DashSet<PathBuf>,
}

impl RetrainController {
    pub fn new(
        optimizer: Arc<dyn PolicyOptimizer>,
        ledger: Arc<dyn TrainingLedger>,
        initial_balance: f64,
    ) -> Self {
        Self {
            optimizer,
            ledger,
            initial_balance,
            in_flight: DashSet::new(),
        }
    }

    /// Run one retrain check against `artifact_path`.
    ///
    /// Exactly the ordered steps of the decision procedure: fresh-train when
    /// the artifact is missing; otherwise backtest, record to the ledger,
    /// then backup-and-retrain only if reward fell below the threshold. A
    /// check that finds another check already working on the same path skips
    /// instead of blocking.
    pub fn check(
        &self,
        table: &MarketTable,
        artifact_path: &Path,
        reward_threshold: f64,
        retrain_step_budget: u64,
    ) -> Result<RetrainOutcome> {
        let key = artifact_path.to_path_buf();
        if !self.in_flight.insert(key.clone()) {
            warn!(
                artifact = %artifact_path.display(),
                "retrain check already in flight, skipping"
            );
            return Ok(RetrainOutcome::Skipped);
        }
        let _guard = InFlightGuard {
            set: &self.in_flight,
            key,
        };

        if !artifact_path.exists() {
            info!(
                artifact = %artifact_path.display(),
                "no existing artifact, training fresh"
            );
            train_policy(
                self.optimizer.as_ref(),
                table,
                retrain_step_budget,
                artifact_path,
                self.initial_balance,
            )?;
            return Ok(RetrainOutcome::FreshTrained);
        }

        let report = run_backtest(
            self.optimizer.as_ref(),
            artifact_path,
            table,
            self.initial_balance,
        )?;
        info!(
            reward = report.total_reward,
            final_value = report.final_value,
            threshold = reward_threshold,
            "retrain check backtest complete"
        );

        self.ledger.append(TrainingRecord {
            timestamp: Utc::now(),
            model_name: artifact_path.display().to_string(),
            reward: report.total_reward,
            final_value: report.final_value,
            notes: RETRAIN_CHECK_NOTE.to_string(),
        })?;

        if report.total_reward < reward_threshold {
            let backup = backup_path(artifact_path);
            // Backup must land before any retrain can overwrite the artifact.
            fs::copy(artifact_path, &backup)?;
            info!(backup = %backup.display(), "artifact backed up, retraining");

            train_policy(
                self.optimizer.as_ref(),
                table,
                retrain_step_budget,
                artifact_path,
                self.initial_balance,
            )?;
            Ok(RetrainOutcome::Retrained {
                previous_reward: report.total_reward,
                backup_path: backup,
            })
        } else {
            info!("artifact performing above threshold, no retrain needed");
            Ok(RetrainOutcome::Healthy {
                reward: report.total_reward,
            })
        }
    }
}

/// Zero-argument retrain-check entry point for an external scheduler.
///
/// Captures everything one check needs so the scheduler only has to call
/// `run()` on its own cadence.
pub struct RetrainJob {
    controller: Arc<RetrainController>,
    table: MarketTable,
    artifact_path: PathBuf,
    reward_threshold: f64,
    retrain_step_budget: u64,
}

impl RetrainJob {
    pub fn new(
        controller: Arc<RetrainController>,
        table: MarketTable,
        artifact_path: PathBuf,
        reward_threshold: f64,
        retrain_step_budget: u64,
    ) -> Self {
        Self {
            controller,
            table,
            artifact_path,
            reward_threshold,
            retrain_step_budget,
        }
    }

    pub fn run(&self) -> Result<RetrainOutcome> {
        self.controller.check(
            &self.table,
            &self.artifact_path,
            self.reward_threshold,
            self.retrain_step_budget,
        )
    }
}

struct InFlightGuard<'a> {
    set: &'a DashSet<PathBuf>,
    key: PathBuf,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TradegymError;
    use crate::ledger::MemoryLedger;
    use crate::optimizer::RandomSearchOptimizer;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tradegym_retrain_{}_{}",
            std::process::id(),
            name
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn controller(ledger: Arc<MemoryLedger>) -> RetrainController {
        RetrainController::new(
            Arc::new(RandomSearchOptimizer::new(17)),
            ledger,
            10_000.0,
        )
    }

    #[test]
    fn test_backup_path_convention() {
        assert_eq!(
            backup_path(Path::new("models/rl_trading_model.json")),
            PathBuf::from("models/rl_trading_model-backup.json")
        );
        assert_eq!(
            backup_path(Path::new("rl_trading_model")),
            PathBuf::from("rl_trading_model-backup")
        );
    }

    #[test]
    fn test_missing_artifact_trains_fresh_without_backtest() {
        let dir = temp_dir("fresh");
        let artifact = dir.join("model.json");
        let ledger = Arc::new(MemoryLedger::new());
        let ctl = controller(ledger.clone());
        let table = MarketTable::synthetic(20, 1).unwrap();

        let outcome = ctl.check(&table, &artifact, 50.0, 100).unwrap();
        assert_eq!(outcome, RetrainOutcome::FreshTrained);
        assert!(artifact.exists());
        // Fresh train: no backtest ran, so no ledger record and no backup.
        assert!(ledger.read_all().unwrap().is_empty());
        assert!(!backup_path(&artifact).exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_healthy_artifact_is_left_alone() {
        let dir = temp_dir("healthy");
        let artifact = dir.join("model.json");
        let ledger = Arc::new(MemoryLedger::new());
        let ctl = controller(ledger.clone());
        let table = MarketTable::synthetic(20, 2).unwrap();

        ctl.check(&table, &artifact, 50.0, 100).unwrap();
        let before = fs::read_to_string(&artifact).unwrap();

        // An impossible-to-miss threshold: no retrain may happen.
        let outcome = ctl.check(&table, &artifact, f64::NEG_INFINITY, 100).unwrap();
        assert!(matches!(outcome, RetrainOutcome::Healthy { .. }));
        assert_eq!(fs::read_to_string(&artifact).unwrap(), before);
        assert!(!backup_path(&artifact).exists());
        assert_eq!(ledger.read_all().unwrap().len(), 1);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_low_reward_triggers_backup_then_retrain() {
        let dir = temp_dir("gated");
        let artifact = dir.join("model.json");
        let ledger = Arc::new(MemoryLedger::new());
        let ctl = controller(ledger.clone());
        let table = MarketTable::synthetic(20, 3).unwrap();

        ctl.check(&table, &artifact, 50.0, 100).unwrap();
        let before = fs::read_to_string(&artifact).unwrap();

        // An impossible-to-meet threshold forces the retrain branch.
        let outcome = ctl.check(&table, &artifact, f64::INFINITY, 100).unwrap();
        let backup = match outcome {
            RetrainOutcome::Retrained { backup_path, .. } => backup_path,
            other => panic!("expected retrain, got {:?}", other),
        };

        // Backup holds the pre-retrain artifact bytes.
        assert_eq!(fs::read_to_string(&backup).unwrap(), before);
        assert!(artifact.exists());

        let records = ledger.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].notes, "auto-retrain check");
        assert_eq!(records[0].model_name, artifact.display().to_string());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_artifact_aborts_check() {
        let dir = temp_dir("corrupt");
        let artifact = dir.join("model.json");
        fs::write(&artifact, "garbage").unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        let ctl = controller(ledger.clone());
        let table = MarketTable::synthetic(20, 4).unwrap();

        let err = ctl.check(&table, &artifact, 50.0, 100).unwrap_err();
        assert!(matches!(err, TradegymError::ArtifactCorrupt { .. }));
        // Corruption is fatal for the invocation: nothing recorded, nothing
        // overwritten.
        assert!(ledger.read_all().unwrap().is_empty());
        assert_eq!(fs::read_to_string(&artifact).unwrap(), "garbage");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_in_flight_check_skips() {
        let dir = temp_dir("inflight");
        let artifact = dir.join("model.json");
        let ledger = Arc::new(MemoryLedger::new());
        let ctl = controller(ledger);
        let table = MarketTable::synthetic(20, 5).unwrap();

        ctl.in_flight.insert(artifact.clone());
        let outcome = ctl.check(&table, &artifact, 50.0, 100).unwrap();
        assert_eq!(outcome, RetrainOutcome::Skipped);
        assert!(!artifact.exists());
        ctl.in_flight.remove(&artifact);

        // Once released, the check proceeds normally.
        let outcome = ctl.check(&table, &artifact, 50.0, 100).unwrap();
        assert_eq!(outcome, RetrainOutcome::FreshTrained);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_job_is_zero_argument_entry_point() {
        let dir = temp_dir("job");
        let artifact = dir.join("model.json");
        let ledger = Arc::new(MemoryLedger::new());
        let ctl = Arc::new(controller(ledger));
        let table = MarketTable::synthetic(20, 6).unwrap();

        let job = RetrainJob::new(ctl, table, artifact.clone(), 50.0, 100);
        assert_eq!(job.run().unwrap(), RetrainOutcome::FreshTrained);
        assert!(artifact.exists());
        assert!(matches!(job.run().unwrap(), RetrainOutcome::Healthy { .. } | RetrainOutcome::Retrained { .. }));

        let _ = fs::remove_dir_all(&dir);
    }
}
