//! Training History Ledger
//!
//! Bounded, append-only record of retrain-check outcomes. The store is an
//! explicit injected dependency (not ambient file access) so the retrain
//! loop can be tested against a double; the production implementation is a
//! small CSV file consumed by external plotting/reporting.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TradegymError};

/// Most-recent records retained; older entries are evicted first.
pub const LEDGER_CAPACITY: usize = 50;

/// One retrain-check outcome, immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub timestamp: DateTime<Utc>,
    pub model_name: String,
    pub reward: f64,
    pub final_value: f64,
    pub notes: String,
}

/// Bounded append-only record store
#[cfg_attr(test, mockall::automock)]
pub trait TrainingLedger: Send + Sync {
    /// Append one record, evicting the oldest beyond the retention bound.
    fn append(&self, record: TrainingRecord) -> Result<()>;

    /// All retained records, oldest first. Empty when nothing was written.
    fn read_all(&self) -> Result<Vec<TrainingRecord>>;
}

/// CSV-file ledger. Created lazily on first append; rewritten atomically so
/// a crashed append never truncates history.
pub struct CsvLedger {
    path: PathBuf,
    capacity: usize,
}

impl CsvLedger {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            capacity: LEDGER_CAPACITY,
        }
    }

    pub fn with_capacity<P: AsRef<Path>>(path: P, capacity: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            capacity,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_all(&self, records: &[TrainingRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut out = String::from("timestamp,model_name,reward,final_value,notes\n");
        for rec in records {
            out.push_str(&format!(
                "{},{},{},{},{}\n",
                rec.timestamp.to_rfc3339(),
                escape_field(&rec.model_name),
                rec.reward,
                rec.final_value,
                escape_field(&rec.notes),
            ));
        }

        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                TradegymError::Validation(format!("bad ledger path: {:?}", self.path))
            })?;
        let tmp = self.path.with_file_name(format!("{}.tmp", file_name));
        fs::write(&tmp, out)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn parse(&self, contents: &str) -> Result<Vec<TrainingRecord>> {
        let mut records = Vec::new();
        for (lineno, line) in contents.lines().enumerate().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_csv_line(line);
            if fields.len() != 5 {
                return Err(TradegymError::Data(format!(
                    "{}: line {}: expected 5 fields, got {}",
                    self.path.display(),
                    lineno + 1,
                    fields.len()
                )));
            }
            let bad_field = |what: &str| {
                TradegymError::Data(format!(
                    "{}: line {}: bad {}",
                    self.path.display(),
                    lineno + 1,
                    what
                ))
            };
            records.push(TrainingRecord {
                timestamp: DateTime::parse_from_rfc3339(&fields[0])
                    .map_err(|_| bad_field("timestamp"))?
                    .with_timezone(&Utc),
                model_name: fields[1].clone(),
                reward: fields[2].parse().map_err(|_| bad_field("reward"))?,
                final_value: fields[3].parse().map_err(|_| bad_field("final_value"))?,
                notes: fields[4].clone(),
            });
        }
        Ok(records)
    }
}

impl TrainingLedger for CsvLedger {
    fn append(&self, record: TrainingRecord) -> Result<()> {
        let mut records = self.read_all()?;
        records.push(record);
        if records.len() > self.capacity {
            let excess = records.len() - self.capacity;
            records.drain(..excess);
        }
        self.write_all(&records)?;
        debug!(
            records = records.len(),
            path = %self.path.display(),
            "ledger appended"
        );
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<TrainingRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        self.parse(&contents)
    }
}

/// In-memory ledger for tests and dry runs
pub struct MemoryLedger {
    records: Mutex<Vec<TrainingRecord>>,
    capacity: usize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            capacity: LEDGER_CAPACITY,
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingLedger for MemoryLedger {
    fn append(&self, record: TrainingRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| TradegymError::Internal("ledger mutex poisoned".to_string()))?;
        records.push(record);
        if records.len() > self.capacity {
            let excess = records.len() - self.capacity;
            records.drain(..excess);
        }
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<TrainingRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| TradegymError::Internal("ledger mutex poisoned".to_string()))?;
        Ok(records.clone())
    }
}

fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_ledger(name: &str) -> CsvLedger {
        let path = std::env::temp_dir().join(format!(
            "tradegym_ledger_{}_{}.csv",
            std::process::id(),
            name
        ));
        let _ = std::fs::remove_file(&path);
        CsvLedger::new(path)
    }

    fn record(i: usize) -> TrainingRecord {
        TrainingRecord {
            timestamp: Utc::now(),
            model_name: format!("model_{}", i),
            reward: i as f64,
            final_value: 10_000.0 + i as f64,
            notes: "auto-retrain check".to_string(),
        }
    }

    #[test]
    fn test_empty_ledger_reads_empty() {
        let ledger = temp_ledger("empty");
        assert!(ledger.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_append_creates_store_and_roundtrips() {
        let ledger = temp_ledger("roundtrip");
        let rec = TrainingRecord {
            timestamp: Utc::now(),
            model_name: "models/rl_trading_model.json".to_string(),
            reward: 20.5,
            final_value: 10_020.5,
            notes: "notes, with \"quotes\" and commas".to_string(),
        };
        ledger.append(rec.clone()).unwrap();

        let all = ledger.read_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].model_name, rec.model_name);
        assert_eq!(all[0].reward, rec.reward);
        assert_eq!(all[0].notes, rec.notes);

        let _ = std::fs::remove_file(ledger.path());
    }

    #[test]
    fn test_bound_evicts_oldest_first() {
        let ledger = temp_ledger("bound");
        for i in 0..55 {
            ledger.append(record(i)).unwrap();
        }

        let all = ledger.read_all().unwrap();
        assert_eq!(all.len(), LEDGER_CAPACITY);
        assert_eq!(all[0].model_name, "model_5");
        assert_eq!(all.last().unwrap().model_name, "model_54");

        let _ = std::fs::remove_file(ledger.path());
    }

    #[test]
    fn test_memory_ledger_bound() {
        let ledger = MemoryLedger::new();
        for i in 0..60 {
            ledger.append(record(i)).unwrap();
        }
        let all = ledger.read_all().unwrap();
        assert_eq!(all.len(), LEDGER_CAPACITY);
        assert_eq!(all[0].model_name, "model_10");
    }

    #[test]
    fn test_split_csv_line_quoting() {
        let fields = split_csv_line("a,\"b,c\",\"d\"\"e\",f");
        assert_eq!(fields, vec!["a", "b,c", "d\"e", "f"]);
    }
}
