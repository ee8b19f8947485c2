//! Termination control of the round loop.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use web_time::Instant;

/// Objective values closer to zero than this use an absolute change test.
const NEAR_ZERO: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Converged,
    RoundLimit,
    TimeLimit,
    SolverFailed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        self != RunStatus::Running
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Converged => "CONVERGED",
            RunStatus::RoundLimit => "ROUND_LIMIT",
            RunStatus::TimeLimit => "TIME_LIMIT",
            RunStatus::SolverFailed => "SOLVER_FAILED",
        };
        f.write_str(s)
    }
}

/// Round counter, objective history and start time of a run.
#[derive(Debug, Clone)]
pub struct RunState {
    pub round: usize,
    history: Vec<f64>,
    started: Instant,
}

impl RunState {
    pub fn start() -> Self {
        Self {
            round: 0,
            history: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Append the objective of the round just solved; exactly once per round.
    pub fn record(&mut self, objective: f64) {
        self.history.push(objective);
        self.round = self.history.len();
    }

    pub fn history(&self) -> &[f64] {
        &self.history
    }

    pub fn last_objective(&self) -> Option<f64> {
        self.history.last().copied()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceMonitor {
    pub ftol: f64,
    pub ftol_iterates: usize,
    pub max_rounds: usize,
    pub max_time: Duration,
}

impl ConvergenceMonitor {
    pub fn new(ftol: f64, ftol_iterates: usize, max_rounds: usize, max_time_secs: f64) -> Self {
        Self {
            ftol,
            ftol_iterates: ftol_iterates.max(1),
            max_rounds,
            max_time: Duration::try_from_secs_f64(max_time_secs.max(0.0))
                .unwrap_or(Duration::MAX),
        }
    }

    /// Relative change over the last `ftol_iterates` rounds, or the absolute
    /// change when the older objective is near zero. `None` until enough
    /// rounds exist.
    pub fn objective_change(&self, history: &[f64]) -> Option<f64> {
        let k = self.ftol_iterates;
        if history.len() <= k {
            return None;
        }
        let current = history[history.len() - 1];
        let before = history[history.len() - 1 - k];
        let delta = (current - before).abs();
        Some(if before.abs() > NEAR_ZERO {
            delta / before.abs()
        } else {
            delta
        })
    }

    /// Status after the round just recorded in `history`.
    pub fn check(&self, history: &[f64], elapsed: Duration) -> RunStatus {
        if let Some(change) = self.objective_change(history) {
            if change < self.ftol {
                return RunStatus::Converged;
            }
        }
        if history.len() >= self.max_rounds {
            return RunStatus::RoundLimit;
        }
        if elapsed > self.max_time {
            return RunStatus::TimeLimit;
        }
        RunStatus::Running
    }
}
