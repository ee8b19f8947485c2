//! The four nonlinear constraint families, per branch and period.
//!
//! | family | constraint | instances |
//! |--------|------------|-----------|
//! | Jabr   | `c² + s² ≤ v_k·v_m` | every branch |
//! | i2     | `P_km² + Q_km² ≤ v_k·i2_km` | every branch (needs i2 columns) |
//! | limit  | `P² + Q² ≤ rate²` | rated branches, both ends |
//! | loss   | `(rτ²/vmax_k²)(P_km² + Q̃_km²) ≤ P_km + P_mk` | branches with `r > 0` |
//!
//! with `Q̃_km = Q_km + b·v_k/(2τ²)` the reactive power entering the series
//! element. Each is written as a second-order cone `‖w(x)‖ ≤ u(x)` so that
//! gradient cuts and the conic inequalities share one definition.

use std::fmt;

use mtpcut_core::CutFamily;
use serde::Serialize;

use crate::relaxation::grid::Grid;
use crate::relaxation::rows::{AffineExpr, ConeConstraint};
use crate::relaxation::vars::VarIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchEnd {
    From,
    To,
}

/// One concrete constraint of a family: a branch end in a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct InstanceId {
    pub period: usize,
    pub branch: usize,
    pub side: BranchEnd,
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.side {
            BranchEnd::From => write!(f, "br{}_t{}", self.branch, self.period),
            BranchEnd::To => write!(f, "br{}r_t{}", self.branch, self.period),
        }
    }
}

/// All instances of a family, in ascending order.
pub fn instances(family: CutFamily, grid: &Grid, vars: &VarIndex) -> Vec<InstanceId> {
    let mut out = Vec::new();
    for period in 0..grid.periods {
        for (branch, br) in grid.branches.iter().enumerate() {
            let sides: &[BranchEnd] = match family {
                CutFamily::Jabr => &[BranchEnd::From],
                CutFamily::I2 if vars.has_i2() => &[BranchEnd::From],
                CutFamily::I2 => &[],
                CutFamily::Limit if br.rate.is_some() => &[BranchEnd::From, BranchEnd::To],
                CutFamily::Limit => &[],
                CutFamily::Loss if br.r > 0.0 => &[BranchEnd::From],
                CutFamily::Loss => &[],
            };
            out.extend(sides.iter().map(|&side| InstanceId {
                period,
                branch,
                side,
            }));
        }
    }
    out
}

fn var(col: usize, coeff: f64) -> AffineExpr {
    AffineExpr::new(vec![(col, coeff)], 0.0)
}

fn loss_scale(grid: &Grid, branch: usize) -> f64 {
    let br = &grid.branches[branch];
    let vmax = grid.buses[br.from].vmax;
    br.r * br.tau * br.tau / (vmax * vmax)
}

/// Cone form of an instance; `None` when the instance does not exist on
/// this model (unrated branch, lossless branch, no i2 columns).
pub fn cone(
    family: CutFamily,
    grid: &Grid,
    vars: &VarIndex,
    inst: InstanceId,
) -> Option<ConeConstraint> {
    let t = inst.period;
    let l = inst.branch;
    let br = grid.branches.get(l)?;
    let name = format!("{}_{}", family.as_str(), inst);
    match family {
        CutFamily::Jabr => {
            let (vk, vm) = (vars.v(t, br.from), vars.v(t, br.to));
            Some(ConeConstraint {
                name,
                u: AffineExpr::new(vec![(vk, 1.0), (vm, 1.0)], 0.0),
                w: vec![
                    var(vars.c(t, l), 2.0),
                    var(vars.s(t, l), 2.0),
                    AffineExpr::new(vec![(vk, 1.0), (vm, -1.0)], 0.0),
                ],
            })
        }
        CutFamily::I2 => {
            let i2 = vars.i2(t, l)?;
            let vk = vars.v(t, br.from);
            Some(ConeConstraint {
                name,
                u: AffineExpr::new(vec![(vk, 1.0), (i2, 1.0)], 0.0),
                w: vec![
                    var(vars.p_from(t, l), 2.0),
                    var(vars.q_from(t, l), 2.0),
                    AffineExpr::new(vec![(vk, 1.0), (i2, -1.0)], 0.0),
                ],
            })
        }
        CutFamily::Limit => {
            let rate = br.rate?;
            let (p, q) = match inst.side {
                BranchEnd::From => (vars.p_from(t, l), vars.q_from(t, l)),
                BranchEnd::To => (vars.p_to(t, l), vars.q_to(t, l)),
            };
            Some(ConeConstraint {
                name,
                u: AffineExpr::constant(rate),
                w: vec![var(p, 1.0), var(q, 1.0)],
            })
        }
        CutFamily::Loss => {
            if br.r <= 0.0 {
                return None;
            }
            let k = loss_scale(grid, l);
            let vk = vars.v(t, br.from);
            let loss = vec![(vars.p_from(t, l), 1.0 / k), (vars.p_to(t, l), 1.0 / k)];
            Some(ConeConstraint {
                name,
                u: AffineExpr::new(loss.clone(), 1.0),
                w: vec![
                    var(vars.p_from(t, l), 2.0),
                    AffineExpr::new(
                        vec![
                            (vars.q_from(t, l), 2.0),
                            (vk, br.b / (br.tau * br.tau)),
                        ],
                        0.0,
                    ),
                    AffineExpr::new(loss, -1.0),
                ],
            })
        }
    }
}

/// Violation of an instance in the family's natural units; positive when
/// the nonlinear constraint is violated by `x`.
pub fn violation(
    family: CutFamily,
    grid: &Grid,
    vars: &VarIndex,
    inst: InstanceId,
    x: &[f64],
) -> Option<f64> {
    let t = inst.period;
    let l = inst.branch;
    let br = grid.branches.get(l)?;
    let at = |col: usize| x.get(col).copied().unwrap_or(0.0);
    match family {
        CutFamily::Jabr => {
            let (c, s) = (at(vars.c(t, l)), at(vars.s(t, l)));
            Some(c * c + s * s - at(vars.v(t, br.from)) * at(vars.v(t, br.to)))
        }
        CutFamily::I2 => {
            let i2 = at(vars.i2(t, l)?);
            let (p, q) = (at(vars.p_from(t, l)), at(vars.q_from(t, l)));
            Some(p * p + q * q - at(vars.v(t, br.from)) * i2)
        }
        CutFamily::Limit => {
            let rate = br.rate?;
            let (p, q) = match inst.side {
                BranchEnd::From => (at(vars.p_from(t, l)), at(vars.q_from(t, l))),
                BranchEnd::To => (at(vars.p_to(t, l)), at(vars.q_to(t, l))),
            };
            Some((p * p + q * q).sqrt() - rate)
        }
        CutFamily::Loss => {
            if br.r <= 0.0 {
                return None;
            }
            let k = loss_scale(grid, l);
            let p = at(vars.p_from(t, l));
            let q_series =
                at(vars.q_from(t, l)) + br.b * at(vars.v(t, br.from)) / (2.0 * br.tau * br.tau);
            let loss = p + at(vars.p_to(t, l));
            Some(k * (p * p + q_series * q_series) - loss)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relaxation::grid::{BranchAdmittance, GridBranch, GridBus, GridGen};
    use mtpcut_core::{BusId, GenId};

    fn grid() -> Grid {
        let bus = |i| GridBus {
            id: BusId::new(i),
            vmin: 0.9,
            vmax: 1.1,
            gs: 0.0,
            bs: 0.0,
        };
        let branch = |from, to, r, rate| GridBranch {
            name: format!("{from}-{to}"),
            from,
            to,
            r,
            b: 0.02,
            tau: 1.0,
            admittance: BranchAdmittance::pi_model(r, 0.1, 0.02, 1.0, 0.0),
            rate,
            angmin: None,
            angmax: None,
        };
        Grid {
            name: "t".into(),
            base_mva: 100.0,
            periods: 2,
            buses: vec![bus(1), bus(2), bus(3)],
            branches: vec![branch(0, 1, 0.01, Some(2.5)), branch(1, 2, 0.0, None)],
            gens: vec![GridGen {
                id: GenId::new(0),
                bus: 0,
                pmin: 0.0,
                pmax: 3.0,
                qmin: -3.0,
                qmax: 3.0,
                cost: (0.0, 10.0, 1.0),
                ramp: None,
            }],
            load_p: vec![vec![0.0, 0.0, 0.9]; 2],
            load_q: vec![vec![0.0, 0.0, 0.3]; 2],
        }
    }

    #[test]
    fn instance_sets_follow_branch_data() {
        let g = grid();
        let vars = VarIndex::new(&g, false, false);
        assert_eq!(instances(CutFamily::Jabr, &g, &vars).len(), 4);
        assert_eq!(instances(CutFamily::Limit, &g, &vars).len(), 4);
        assert_eq!(instances(CutFamily::Loss, &g, &vars).len(), 2);
        assert!(instances(CutFamily::I2, &g, &vars).is_empty());
        let sorted = instances(CutFamily::Limit, &g, &vars);
        assert!(sorted.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn cone_and_native_violation_agree_in_sign() {
        let g = grid();
        let vars = VarIndex::new(&g, true, false);
        let mut x = vec![0.0; vars.n_vars()];
        x[vars.v(0, 0)] = 1.0;
        x[vars.v(0, 1)] = 1.0;
        x[vars.c(0, 0)] = 1.2;
        x[vars.s(0, 0)] = 0.1;
        x[vars.p_from(0, 0)] = 3.0;
        x[vars.q_from(0, 0)] = 0.5;
        x[vars.p_to(0, 0)] = -2.99;
        x[vars.i2(0, 0).unwrap()] = 1.0;
        let inst = InstanceId {
            period: 0,
            branch: 0,
            side: BranchEnd::From,
        };
        for family in CutFamily::ALL {
            let native = violation(family, &g, &vars, inst, &x).unwrap();
            let conic = cone(family, &g, &vars, inst).unwrap().residual(&x);
            assert!(native > 0.0, "{family} should be violated");
            assert!(conic > 0.0, "{family} cone should be violated");
        }

        // a point on the Jabr surface
        x[vars.c(0, 0)] = 0.6;
        x[vars.s(0, 0)] = 0.8;
        let v = violation(CutFamily::Jabr, &g, &vars, inst, &x).unwrap();
        assert!(v.abs() < 1e-12);
    }

    #[test]
    fn missing_instances_have_no_cone() {
        let g = grid();
        let vars = VarIndex::new(&g, false, false);
        let lossless = InstanceId {
            period: 1,
            branch: 1,
            side: BranchEnd::From,
        };
        assert!(cone(CutFamily::Loss, &g, &vars, lossless).is_none());
        assert!(cone(CutFamily::Limit, &g, &vars, lossless).is_none());
        assert!(cone(CutFamily::I2, &g, &vars, lossless).is_none());
    }
}
