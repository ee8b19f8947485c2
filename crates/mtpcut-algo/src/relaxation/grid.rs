//! Per-unit, index-based view of the network and the scenario.
//!
//! The relaxation works on dense indices (bus 0..n_bus, branch 0..n_branch,
//! generator 0..n_gen) in network iteration order. Everything here is in
//! per-unit on the case base; angles are radians.

use std::collections::HashMap;

use mtpcut_core::{BusId, GenId, MtpError, MtpResult, Network};
use num_complex::Complex64;
use tracing::debug;

use crate::scenario::ScenarioData;

#[derive(Debug, Clone)]
pub struct GridBus {
    pub id: BusId,
    pub vmin: f64,
    pub vmax: f64,
    /// Shunt conductance at 1 p.u. voltage
    pub gs: f64,
    /// Shunt susceptance at 1 p.u. voltage
    pub bs: f64,
}

/// Real/imaginary parts of the four π-model admittance entries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchAdmittance {
    pub y_ff: Complex64,
    pub y_ft: Complex64,
    pub y_tf: Complex64,
    pub y_tt: Complex64,
}

impl BranchAdmittance {
    /// π-model with an ideal transformer (tap `tau`, shift `shift`) at the
    /// from end, as in MATPOWER's `makeYbus`.
    pub fn pi_model(r: f64, x: f64, b: f64, tau: f64, shift: f64) -> Self {
        let ys = Complex64::new(1.0, 0.0) / Complex64::new(r, x);
        let charging = Complex64::new(0.0, b / 2.0);
        let tap = Complex64::from_polar(tau, shift);
        Self {
            y_ff: (ys + charging) / (tau * tau),
            y_ft: -ys / tap.conj(),
            y_tf: -ys / tap,
            y_tt: ys + charging,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GridBranch {
    pub name: String,
    pub from: usize,
    pub to: usize,
    pub r: f64,
    pub b: f64,
    pub tau: f64,
    pub admittance: BranchAdmittance,
    /// Thermal limit (p.u.), `None` when unrated
    pub rate: Option<f64>,
    pub angmin: Option<f64>,
    pub angmax: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct GridGen {
    pub id: GenId,
    pub bus: usize,
    pub pmin: f64,
    pub pmax: f64,
    pub qmin: f64,
    pub qmax: f64,
    /// Cost `c0 + c1 p + c2 p²` with `p` in p.u.
    pub cost: (f64, f64, f64),
    /// Ramp up/down limits between consecutive periods (p.u.)
    pub ramp: Option<(f64, f64)>,
}

impl GridGen {
    pub fn cost_at(&self, p: f64) -> f64 {
        let (c0, c1, c2) = self.cost;
        c0 + c1 * p + c2 * p * p
    }

    pub fn marginal_cost_at(&self, p: f64) -> f64 {
        let (_, c1, c2) = self.cost;
        c1 + 2.0 * c2 * p
    }
}

#[derive(Debug, Clone)]
pub struct Grid {
    pub name: String,
    pub base_mva: f64,
    pub periods: usize,
    pub buses: Vec<GridBus>,
    pub branches: Vec<GridBranch>,
    pub gens: Vec<GridGen>,
    /// `load_p[t][bus]`, p.u.
    pub load_p: Vec<Vec<f64>>,
    pub load_q: Vec<Vec<f64>>,
}

impl Grid {
    pub fn build(network: &Network, scenario: &ScenarioData) -> MtpResult<Self> {
        let base = network.base_mva;
        let periods = scenario.loads.periods;

        let mut bus_pos: HashMap<BusId, usize> = HashMap::new();
        let mut buses = Vec::new();
        for bus in network.buses() {
            bus_pos.insert(bus.id, buses.len());
            buses.push(GridBus {
                id: bus.id,
                vmin: bus.vmin_pu.value(),
                vmax: bus.vmax_pu.value(),
                gs: 0.0,
                bs: 0.0,
            });
        }
        let position = |bus: BusId| -> MtpResult<usize> {
            bus_pos.get(&bus).copied().ok_or_else(|| {
                MtpError::Validation(format!("unknown bus {} in network", bus.value()))
            })
        };

        for shunt in network.shunts() {
            let k = position(shunt.bus)?;
            buses[k].gs += shunt.gs_pu;
            buses[k].bs += shunt.bs_pu;
        }

        let mut branches = Vec::new();
        for br in network.branches().into_iter().filter(|b| b.status) {
            let tau = br.tap_ratio;
            branches.push(GridBranch {
                name: br.name.clone(),
                from: position(br.from_bus)?,
                to: position(br.to_bus)?,
                r: br.resistance,
                b: br.charging_b,
                tau,
                admittance: BranchAdmittance::pi_model(
                    br.resistance,
                    br.reactance,
                    br.charging_b,
                    tau,
                    br.phase_shift.value(),
                ),
                rate: br.rating_a.map(|r| r.to_per_unit(base)),
                angmin: br.angle_min.map(|a| a.value()),
                angmax: br.angle_max.map(|a| a.value()),
            });
        }

        let mut gens = Vec::new();
        for gen in network.generators().into_iter().filter(|g| g.status) {
            let (c0, c1, c2) = gen.cost_model.quadratic_coeffs();
            let ramp = scenario
                .ramps
                .by_gen
                .get(&gen.id)
                .map(|r| (r.up_mw / base, r.down_mw / base));
            if ramp.is_none() && periods > 1 {
                debug!(gen = gen.id.value() + 1, "no ramp limit, periods uncoupled");
            }
            gens.push(GridGen {
                id: gen.id,
                bus: position(gen.bus)?,
                pmin: gen.pmin.to_per_unit(base),
                pmax: gen.pmax.to_per_unit(base),
                qmin: gen.qmin.to_per_unit(base),
                qmax: gen.qmax.to_per_unit(base),
                cost: (c0, c1 * base, c2 * base * base),
                ramp,
            });
        }

        let mut load_p = vec![vec![0.0; buses.len()]; periods];
        let mut load_q = vec![vec![0.0; buses.len()]; periods];
        for (bus, series) in &scenario.loads.by_bus {
            let k = position(*bus).map_err(|_| {
                MtpError::Scenario(format!("loads given for unknown bus {}", bus.value()))
            })?;
            for (t, load) in series.iter().enumerate().take(periods) {
                load_p[t][k] += load.pd_mw / base;
                load_q[t][k] += load.qd_mvar / base;
            }
        }

        Ok(Self {
            name: network.name.clone(),
            base_mva: base,
            periods,
            buses,
            branches,
            gens,
            load_p,
            load_q,
        })
    }

    /// Upper bound on |c|, |s| of a branch: vmax_from · vmax_to.
    pub fn product_bound(&self, branch: usize) -> f64 {
        let br = &self.branches[branch];
        self.buses[br.from].vmax * self.buses[br.to].vmax
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pi_model_without_tap_is_symmetric() {
        let y = BranchAdmittance::pi_model(0.01, 0.1, 0.02, 1.0, 0.0);
        assert!((y.y_ft - y.y_tf).norm() < 1e-12);
        assert!((y.y_ff - y.y_tt).norm() < 1e-12);
        // series admittance plus half the charging
        let ys = Complex64::new(1.0, 0.0) / Complex64::new(0.01, 0.1);
        assert!((y.y_ff - ys - Complex64::new(0.0, 0.01)).norm() < 1e-12);
    }

    #[test]
    fn tap_scales_from_side() {
        let y = BranchAdmittance::pi_model(0.0, 0.1, 0.0, 1.1, 0.0);
        let plain = BranchAdmittance::pi_model(0.0, 0.1, 0.0, 1.0, 0.0);
        assert!((y.y_ff * 1.21 - plain.y_ff).norm() < 1e-9);
        assert!((y.y_ft * 1.1 - plain.y_ft).norm() < 1e-9);
        assert!((y.y_tt - plain.y_tt).norm() < 1e-12);
    }
}
