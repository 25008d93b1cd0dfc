//! Market Simulation Environment
//!
//! Deterministic gym-like state machine: one account trading one instrument
//! against a fixed historical price/feature table. Provides the
//! `reset`/`step` contract the optimizer and backtester drive.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Result, TradegymError};
use crate::market::MarketTable;

/// Observation dimension: `[close, momentum, volume, balance, holding]`
pub const OBSERVATION_DIM: usize = 5;

/// Fraction of cash committed by a BUY. Fixed partial sizing is deliberate:
/// it lets the policy scale into a position over several steps.
pub const BUY_FRACTION: f64 = 0.10;

/// Feature vector handed to the policy at each step
pub type Observation = [f64; OBSERVATION_DIM];

/// Closed trading action set. The wire encoding (0/1/2) is part of the
/// artifact contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Action {
    /// Do nothing
    Hold = 0,
    /// Spend 10% of cash at the current close
    Buy = 1,
    /// Liquidate the entire holding at the current close
    Sell = 2,
}

impl Action {
    /// Convert from action index
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Hold),
            1 => Some(Self::Buy),
            2 => Some(Self::Sell),
            _ => None,
        }
    }

    /// Convert to action index
    pub fn to_index(self) -> usize {
        self as usize
    }

    /// Get all possible actions
    pub fn all() -> &'static [Action] {
        &[Self::Hold, Self::Buy, Self::Sell]
    }
}

impl Default for Action {
    fn default() -> Self {
        Self::Hold
    }
}

/// Result of taking a step in the environment
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Observation at the new step index (zero vector on termination)
    pub observation: Observation,
    /// Mark-to-market change across this tick
    pub reward: f64,
    /// Episode reached the final row
    pub terminated: bool,
    /// Reserved: no external truncation source in this core
    pub truncated: bool,
}

/// Trading environment over a fixed market table.
///
/// Invariant: `balance >= 0` and `holding >= 0` at all times; both evolve
/// only through `step`'s trade rules and `reset`.
#[derive(Debug)]
pub struct TradingEnv {
    table: MarketTable,
    initial_balance: f64,
    step_index: usize,
    balance: f64,
    holding: f64,
    finished: bool,
}

impl TradingEnv {
    /// Create an environment over `table` with `initial_balance` cash.
    ///
    /// Fails with a data error if the table has fewer than two rows; the
    /// step rule marks against the row after the current one, so a single
    /// row can never be stepped.
    pub fn new(table: MarketTable, initial_balance: f64) -> Result<Self> {
        if table.len() < crate::market::MIN_ROWS {
            return Err(TradegymError::Data(format!(
                "environment needs at least {} market rows, got {}",
                crate::market::MIN_ROWS,
                table.len()
            )));
        }
        if !initial_balance.is_finite() || initial_balance < 0.0 {
            return Err(TradegymError::Data(format!(
                "initial balance must be non-negative, got {}",
                initial_balance
            )));
        }
        Ok(Self {
            table,
            initial_balance,
            step_index: 0,
            balance: initial_balance,
            holding: 0.0,
            finished: false,
        })
    }

    /// Reset to the start of the episode and return the initial observation.
    pub fn reset(&mut self) -> Observation {
        self.step_index = 0;
        self.balance = self.initial_balance;
        self.holding = 0.0;
        self.finished = false;
        self.observation()
    }

    /// Advance the episode by one tick.
    ///
    /// Applies `action` at the current row's close, moves to the next row,
    /// and rewards the mark-to-market change between the portfolio value
    /// before the action (old price) and after it (new price).
    pub fn step(&mut self, action: Action) -> Result<StepOutcome> {
        if self.finished {
            return Err(TradegymError::EpisodeFinished);
        }

        let price = self.table.row(self.step_index).close;
        let old_value = self.balance + self.holding * price;

        match action {
            Action::Buy => {
                let spend = BUY_FRACTION * self.balance;
                if spend > 0.0 {
                    self.holding += spend / price;
                    self.balance -= spend;
                }
            }
            Action::Sell => {
                if self.holding > 0.0 {
                    self.balance += self.holding * price;
                    self.holding = 0.0;
                }
            }
            Action::Hold => {}
        }

        self.step_index += 1;
        let terminated = self.step_index >= self.table.len() - 1;
        if terminated {
            self.finished = true;
        }

        let new_value = self.portfolio_value();
        let reward = new_value - old_value;

        trace!(
            step = self.step_index,
            action = action.to_index(),
            reward,
            portfolio_value = new_value,
            "env step"
        );

        let observation = if terminated {
            [0.0; OBSERVATION_DIM]
        } else {
            self.observation()
        };

        Ok(StepOutcome {
            observation,
            reward,
            terminated,
            truncated: false,
        })
    }

    /// Portfolio value marked at the current row's close.
    pub fn portfolio_value(&self) -> f64 {
        self.balance + self.holding * self.table.row(self.step_index).close
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn holding(&self) -> f64 {
        self.holding
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    /// Steps in one full episode (rows minus the terminal mark row).
    pub fn episode_len(&self) -> usize {
        self.table.len() - 1
    }

    fn observation(&self) -> Observation {
        let row = self.table.row(self.step_index);
        [row.close, row.momentum, row.volume, self.balance, self.holding]
    }
}
