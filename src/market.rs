//! Market Table
//!
//! Time-ordered price/feature rows consumed by the simulation environment.
//! The pipeline only requires `close`, `momentum` and `volume` columns;
//! where the data comes from (exchange, spreadsheet, synthetic) is the
//! caller's business.

use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TradegymError};

/// Minimum rows for a usable table: one to trade at and one to mark against.
pub const MIN_ROWS: usize = 2;

/// One time-indexed market row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketRow {
    /// Closing price
    pub close: f64,
    /// Momentum feature
    pub momentum: f64,
    /// Traded volume
    pub volume: f64,
}

/// Validated, time-ordered table of market rows
#[derive(Debug, Clone)]
pub struct MarketTable {
    rows: Vec<MarketRow>,
}

impl MarketTable {
    /// Build a table from rows, rejecting anything the environment
    /// cannot simulate against.
    pub fn from_rows(rows: Vec<MarketRow>) -> Result<Self> {
        if rows.len() < MIN_ROWS {
            return Err(TradegymError::Data(format!(
                "market table needs at least {} rows, got {}",
                MIN_ROWS,
                rows.len()
            )));
        }
        for (i, row) in rows.iter().enumerate() {
            if !row.close.is_finite() || row.close <= 0.0 {
                return Err(TradegymError::Data(format!(
                    "row {}: close must be a positive finite price, got {}",
                    i, row.close
                )));
            }
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> &MarketRow {
        &self.rows[index]
    }

    pub fn rows(&self) -> &[MarketRow] {
        &self.rows
    }

    /// Load a table from a headered CSV file.
    ///
    /// The header must name `close`, `momentum` and `volume`; any other
    /// columns are ignored. Column order does not matter.
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let mut lines = contents.lines();

        let header = lines.next().ok_or_else(|| {
            TradegymError::Data(format!("{}: empty file", path.display()))
        })?;
        let columns: Vec<&str> = header.split(',').map(|c| c.trim()).collect();
        let col = |name: &str| -> Result<usize> {
            columns
                .iter()
                .position(|c| c.eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    TradegymError::Data(format!(
                        "{}: missing required column '{}'",
                        path.display(),
                        name
                    ))
                })
        };
        let close_idx = col("close")?;
        let momentum_idx = col("momentum")?;
        let volume_idx = col("volume")?;

        let mut rows = Vec::new();
        for (lineno, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(|f| f.trim()).collect();
            let field = |idx: usize| -> Result<f64> {
                fields
                    .get(idx)
                    .and_then(|f| f.parse::<f64>().ok())
                    .ok_or_else(|| {
                        TradegymError::Data(format!(
                            "{}: line {}: unparsable numeric field",
                            path.display(),
                            lineno + 2
                        ))
                    })
            };
            rows.push(MarketRow {
                close: field(close_idx)?,
                momentum: field(momentum_idx)?,
                volume: field(volume_idx)?,
            });
        }

        info!("Loaded {} market rows from {}", rows.len(), path.display());
        Self::from_rows(rows)
    }

    /// Write the table as a headered CSV file.
    pub fn write_csv_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut out = String::from("close,momentum,volume\n");
        for row in &self.rows {
            out.push_str(&format!("{},{},{}\n", row.close, row.momentum, row.volume));
        }
        fs::write(path, out)?;
        Ok(())
    }

    /// Generate a seeded synthetic price series (random walk with drift)
    /// for training and smoke-testing without a data feed.
    pub fn synthetic(rows: usize, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut close = 100.0f64;
        let mut out = Vec::with_capacity(rows);

        for _ in 0..rows {
            let drift: f64 = rng.gen_range(-2.0..2.0);
            close = (close + drift).max(1.0);
            out.push(MarketRow {
                close,
                momentum: rng.gen_range(-1.0..1.0),
                volume: rng.gen_range(100.0..1000.0),
            });
        }

        Self::from_rows(out)
    }
}
