//! # mtpcut-algo: multi-period ACOPF cutting-plane engine
//!
//! A linear (or conic) relaxation of the multi-period AC optimal power flow
//! is solved repeatedly. After every solve the solution is checked against
//! four families of nonlinear constraints; the most violated instances are
//! linearized into cuts, aged cuts are dropped, and the loop stops on
//! convergence of the objective, a round limit, a time limit or a solver
//! failure.
//!
//! - [`scenario`]: per-period loads and ramp limits
//! - [`relaxation`]: variables, base model and the Clarabel backend
//! - [`cuts`]: violation scanning, selection and pools
//! - [`convergence`]: termination control
//! - [`engine`]: the round loop
//! - [`export`]: LP, solution, cut and report files
//!
//! ```rust,no_run
//! use mtpcut_algo::{build_scenario, CutPlaneEngine};
//! use mtpcut_io::{load_case, CutplaneConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = CutplaneConfig::from_file("case9.conf".as_ref())?;
//!     let network = load_case(&config.case_file)?;
//!     let scenario = build_scenario(&network, &config)?;
//!     let mut engine = CutPlaneEngine::new(&config, &network, &scenario, "sols".as_ref())?;
//!     let outcome = engine.run()?;
//!     println!("{} after {} rounds", outcome.report.status, outcome.report.rounds);
//!     Ok(())
//! }
//! ```

pub mod convergence;
pub mod cuts;
pub mod engine;
pub mod export;
pub mod relaxation;
pub mod scenario;

pub use convergence::{ConvergenceMonitor, RunState, RunStatus};
pub use cuts::{Cut, CutId, CutPool, CutPools, CutSelector, ViolationScanner};
pub use engine::{CutPlaneEngine, FamilyReport, RunOutcome, RunReport};
pub use relaxation::solver::SolverError;
pub use relaxation::{RelaxationModel, RelaxationState};
pub use scenario::{build_scenario, ScenarioData, ScenarioGenerator};
