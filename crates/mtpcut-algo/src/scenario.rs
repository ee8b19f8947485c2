//! Multi-period scenario construction.
//!
//! A scenario is the load of every bus in every period plus the ramp limits
//! coupling consecutive periods. Period 0 always carries the base case load;
//! later periods are scaled by a per-bus factor drawn from the active
//! [`ScenarioPolicy`]. Reactive load is scaled by the same factor as active
//! load so the power factor of every bus is preserved.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use mtpcut_core::{BusId, GenId, MtpError, MtpResult, Network};
use mtpcut_io::config::{CutplaneConfig, ScenarioPolicy};
use mtpcut_io::scenario_files::{
    loads_path, ramp_path, read_loads_file, read_ramp_file, write_loads_file, BusLoad,
    LoadSeries, RampLimit, RampRates,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

/// Per-period data fixed for the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioData {
    pub policy: ScenarioPolicy,
    pub loads: LoadSeries,
    pub ramps: RampRates,
}

/// Pure load synthesizer: identical inputs give identical series.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioGenerator {
    pub policy: ScenarioPolicy,
    pub periods: usize,
    pub seed: u64,
}

impl ScenarioGenerator {
    pub fn new(policy: ScenarioPolicy, periods: usize, seed: u64) -> Self {
        Self {
            policy,
            periods,
            seed,
        }
    }

    pub fn from_config(config: &CutplaneConfig) -> Self {
        Self::new(config.policy, config.periods, config.seed)
    }

    /// Scaling factors `[t][bus]` for `n_bus` buses taken in a fixed order.
    ///
    /// Random draws happen period by period, then bus by bus, so the same
    /// seed reproduces the same factors.
    pub fn factors(&self, n_bus: usize) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let horizon = self.periods.max(1) as f64;
        let mut out = Vec::with_capacity(self.periods);
        if self.periods == 0 {
            return out;
        }
        out.push(vec![1.0; n_bus]);

        for t in 1..self.periods {
            let prev = &out[t - 1];
            let tf = t as f64;
            let row: Vec<f64> = match self.policy {
                ScenarioPolicy::Gaussian { magnitude } => (0..n_bus)
                    .map(|_| (1.0 + magnitude * standard_normal(&mut rng)).max(0.0))
                    .collect(),
                ScenarioPolicy::Uniform { drift } => (0..n_bus)
                    .map(|_| 1.0 + symmetric(&mut rng, drift))
                    .collect(),
                ScenarioPolicy::Uniform2 { drift } => {
                    // one system-wide step shared by every bus
                    let step = 1.0 + symmetric(&mut rng, drift);
                    prev.iter().map(|f| (f * step).max(0.0)).collect()
                }
                ScenarioPolicy::Uniform3 { drift } => prev
                    .iter()
                    .map(|f| f * (1.0 + drift * rng.gen::<f64>()))
                    .collect(),
                ScenarioPolicy::Uniform4 { drift } => prev
                    .iter()
                    .map(|f| (f * (1.0 - drift * rng.gen::<f64>())).max(0.0))
                    .collect(),
                ScenarioPolicy::Uniform5 { drift } => prev
                    .iter()
                    .map(|f| (f * (1.0 + symmetric(&mut rng, drift))).max(0.0))
                    .collect(),
                ScenarioPolicy::Uniform6 { drift } => (0..n_bus)
                    .map(|_| (1.0 + drift * tf) * (1.0 + symmetric(&mut rng, drift / 2.0)))
                    .collect(),
                ScenarioPolicy::Arpae => {
                    let f = 1.0 + 0.2 * (PI * tf / horizon).sin().powi(2);
                    vec![f; n_bus]
                }
                ScenarioPolicy::Arpae2 => {
                    let f = 1.0 + 0.15 * (2.0 * PI * tf / horizon).sin().powi(2);
                    vec![f; n_bus]
                }
                ScenarioPolicy::PglibReverse { drift } => {
                    vec![(1.0 - drift * tf).max(0.0); n_bus]
                }
            };
            out.push(row);
        }
        out
    }

    pub fn generate(&self, base: &BTreeMap<BusId, BusLoad>) -> LoadSeries {
        let factors = self.factors(base.len());
        let by_bus = base
            .iter()
            .enumerate()
            .map(|(k, (bus, load))| {
                let series = factors
                    .iter()
                    .map(|row| BusLoad {
                        pd_mw: load.pd_mw * row[k],
                        qd_mvar: load.qd_mvar * row[k],
                    })
                    .collect();
                (*bus, series)
            })
            .collect();
        LoadSeries {
            periods: self.periods,
            by_bus,
        }
    }
}

/// Uniform draw in `[-half_width, half_width]`.
fn symmetric(rng: &mut StdRng, half_width: f64) -> f64 {
    half_width * (2.0 * rng.gen::<f64>() - 1.0)
}

/// Box-Muller transform.
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rand::Rng::gen::<f64>(rng).max(1e-10);
    let u2: f64 = rand::Rng::gen::<f64>(rng);
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Base-case load per bus (several loads on one bus are summed).
pub fn base_loads(network: &Network) -> BTreeMap<BusId, BusLoad> {
    let mut out: BTreeMap<BusId, BusLoad> = BTreeMap::new();
    for load in network.loads() {
        let entry = out.entry(load.bus).or_insert(BusLoad {
            pd_mw: 0.0,
            qd_mvar: 0.0,
        });
        entry.pd_mw += load.active_power.value();
        entry.qd_mvar += load.reactive_power.value();
    }
    out
}

/// Resolve loads and ramp limits for the run.
///
/// Loads come from the loads file of the selected policy unless
/// `generate_loads` is set; generated series are also written to that path
/// when no file exists there yet. Ramp limits come from the ramp file, or
/// from `ramp_fraction · Pmax` when the file is missing and a fraction is
/// configured. Any other missing input is a [`MtpError::Scenario`].
pub fn build_scenario(network: &Network, config: &CutplaneConfig) -> MtpResult<ScenarioData> {
    let base = base_loads(network);

    let loads = if config.generate_loads {
        let series = ScenarioGenerator::from_config(config).generate(&base);
        let path = loads_path(config);
        if !path.exists() {
            match write_loads_file(&path, &series) {
                Ok(()) => info!(path = %path.display(), "wrote generated loads"),
                Err(err) => warn!("could not save generated loads: {err:#}"),
            }
        }
        series
    } else {
        let path = loads_path(config);
        info!(path = %path.display(), "reading loads");
        read_loads_file(&path, config.periods)?
    };

    for bus in base.keys() {
        if !loads.by_bus.contains_key(bus) {
            return Err(MtpError::Scenario(format!(
                "loads file has no entry for load bus {}",
                bus.value()
            )));
        }
    }
    let known: Vec<BusId> = network.buses().iter().map(|b| b.id).collect();
    if let Some(bus) = loads.by_bus.keys().find(|b| !known.contains(b)) {
        return Err(MtpError::Scenario(format!(
            "loads given for unknown bus {}",
            bus.value()
        )));
    }

    let ramps = if config.periods <= 1 {
        RampRates::default()
    } else {
        let path = ramp_path(config);
        match (path.exists(), config.ramp_fraction) {
            (false, Some(fraction)) => {
                info!(fraction, "no ramp file, using a fraction of Pmax");
                ramps_from_fraction(network, fraction)
            }
            _ => {
                info!(path = %path.display(), "reading ramp rates");
                read_ramp_file(&path)?
            }
        }
    };

    Ok(ScenarioData {
        policy: config.policy,
        loads,
        ramps,
    })
}

fn ramps_from_fraction(network: &Network, fraction: f64) -> RampRates {
    let by_gen: BTreeMap<GenId, RampLimit> = network
        .generators()
        .into_iter()
        .filter(|g| g.pmax.is_finite())
        .map(|g| {
            let limit = fraction * g.pmax.value().abs();
            (
                g.id,
                RampLimit {
                    up_mw: limit,
                    down_mw: limit,
                },
            )
        })
        .collect();
    RampRates { by_gen }
}
