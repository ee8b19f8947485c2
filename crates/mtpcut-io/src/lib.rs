//! # mtpcut-io: inputs of a cutting-plane run
//!
//! Everything that is read from (or written back to) disk before the round
//! loop starts:
//!
//! - [`importers`]: MATPOWER `.m` case reader producing a [`mtpcut_core::Network`]
//! - [`config`]: the textual run configuration, resolved into an immutable
//!   [`config::CutplaneConfig`]
//! - [`scenario_files`]: multi-period loads and ramp-rate files and the rule
//!   deriving their paths from the case name, T and the scenario policy
//!
//! ```rust,no_run
//! use mtpcut_io::config::CutplaneConfig;
//! use mtpcut_io::importers::load_case;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = CutplaneConfig::from_file("case9.conf".as_ref())?;
//!     let network = load_case(&config.case_file)?;
//!     println!("{}: {}", network.name, network.stats());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod helpers;
pub mod importers;
pub mod scenario_files;

pub use config::{
    ConfigError, ConfigKey, CutplaneConfig, FamilySettings, OutputFlags, ScenarioPolicy,
    SolverTolerances,
};
pub use importers::load_case;
pub use scenario_files::{BusLoad, LoadSeries, RampLimit, RampRates};
