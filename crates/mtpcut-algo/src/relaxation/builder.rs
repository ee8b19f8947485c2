//! Construction of the cut-free relaxation.
//!
//! Per period and in per-unit, with `G + jB` the π-model admittances of a
//! branch k→m:
//!
//! ```text
//! P_km =  Gff·v_k + Gft·c + Bft·s        P_mk =  Gtt·v_m + Gtf·c − Btf·s
//! Q_km = −Bff·v_k + Gft·s − Bft·c        Q_mk = −Btt·v_m − Gtf·s − Btf·c
//! ```
//!
//! and for every bus `Σ Pg − Σ P_out − gs·v = Pd`, `Σ Qg − Σ Q_out + bs·v = Qd`.

use mtpcut_core::CutFamily;
use mtpcut_io::config::ConicInequalities;

use super::grid::Grid;
use super::rows::{ConeConstraint, LinearRow};
use super::vars::VarIndex;
use crate::cuts::families;

/// Objective `½·xᵀPx + qᵀx + constant` with diagonal `P`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Objective {
    pub quadratic: Vec<(usize, f64)>,
    pub linear: Vec<(usize, f64)>,
    pub constant: f64,
}

impl Objective {
    pub fn value(&self, x: &[f64]) -> f64 {
        let at = |col: usize| x.get(col).copied().unwrap_or(0.0);
        self.constant
            + self.linear.iter().map(|&(c, a)| a * at(c)).sum::<f64>()
            + 0.5 * self.quadratic.iter().map(|&(c, p)| p * at(c) * at(c)).sum::<f64>()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BaseModel {
    pub rows: Vec<LinearRow>,
    pub cones: Vec<ConeConstraint>,
    pub objective: Objective,
    /// Initial tangents of the cost epigraph (linear objective only)
    pub tangents: Vec<LinearRow>,
}

pub fn build_base(grid: &Grid, vars: &VarIndex, conic: &ConicInequalities) -> BaseModel {
    let mut rows = Vec::new();
    for t in 0..grid.periods {
        push_bounds(grid, vars, t, &mut rows);
        push_flow_definitions(grid, vars, t, &mut rows);
        push_balance(grid, vars, t, &mut rows);
        if t > 0 {
            push_ramps(grid, vars, t, &mut rows);
        }
    }

    let mut cones = Vec::new();
    for family in CutFamily::ALL {
        if !conic.get(family) {
            continue;
        }
        cones.extend(
            families::instances(family, grid, vars)
                .into_iter()
                .filter_map(|inst| families::cone(family, grid, vars, inst)),
        );
    }

    let mut objective = Objective::default();
    let mut tangents = Vec::new();
    for t in 0..grid.periods {
        for (g, gen) in grid.gens.iter().enumerate() {
            let (c0, c1, c2) = gen.cost;
            match vars.z(t, g) {
                Some(z) => {
                    objective.linear.push((z, 1.0));
                    for (n, p0) in initial_tangent_points(gen.pmin, gen.pmax, c2)
                        .into_iter()
                        .enumerate()
                    {
                        tangents.push(cost_tangent(grid, vars, t, g, p0, &n.to_string()));
                    }
                }
                None => {
                    let pg = vars.pg(t, g);
                    if c2.abs() > 1e-12 {
                        // Clarabel minimizes ½xᵀPx
                        objective.quadratic.push((pg, 2.0 * c2));
                    }
                    if c1 != 0.0 {
                        objective.linear.push((pg, c1));
                    }
                    objective.constant += c0;
                }
            }
        }
    }

    BaseModel {
        rows,
        cones,
        objective,
        tangents,
    }
}

fn initial_tangent_points(pmin: f64, pmax: f64, c2: f64) -> Vec<f64> {
    let lo = if pmin.is_finite() { pmin } else { 0.0 };
    if c2.abs() <= 1e-12 || !pmax.is_finite() || pmax <= lo {
        return vec![lo];
    }
    vec![lo, 0.5 * (lo + pmax), pmax]
}

/// Tangent of the generator cost at `p0`: `z ≥ f(p0) + f'(p0)(p − p0)`.
///
/// `tag` disambiguates row names.
pub fn cost_tangent(
    grid: &Grid,
    vars: &VarIndex,
    t: usize,
    g: usize,
    p0: f64,
    tag: &str,
) -> LinearRow {
    let gen = &grid.gens[g];
    let slope = gen.marginal_cost_at(p0);
    let mut coeffs = vec![(vars.pg(t, g), slope)];
    if let Some(z) = vars.z(t, g) {
        coeffs.push((z, -1.0));
    }
    LinearRow::le(
        format!("obj_g{g}_t{t}_{tag}"),
        coeffs,
        slope * p0 - gen.cost_at(p0),
    )
}

fn push_bounds(grid: &Grid, vars: &VarIndex, t: usize, rows: &mut Vec<LinearRow>) {
    for (k, bus) in grid.buses.iter().enumerate() {
        let v = vars.v(t, k);
        rows.push(LinearRow::le(
            format!("vmin_{k}_t{t}"),
            vec![(v, -1.0)],
            -bus.vmin * bus.vmin,
        ));
        rows.push(LinearRow::le(
            format!("vmax_{k}_t{t}"),
            vec![(v, 1.0)],
            bus.vmax * bus.vmax,
        ));
    }

    for (g, gen) in grid.gens.iter().enumerate() {
        let bounds = [
            ("pg", vars.pg(t, g), gen.pmin, gen.pmax),
            ("qg", vars.qg(t, g), gen.qmin, gen.qmax),
        ];
        for (label, col, lo, hi) in bounds {
            if hi.is_finite() {
                rows.push(LinearRow::le(format!("{label}max_{g}_t{t}"), vec![(col, 1.0)], hi));
            }
            if lo.is_finite() {
                rows.push(LinearRow::le(format!("{label}min_{g}_t{t}"), vec![(col, -1.0)], -lo));
            }
        }
    }

    for (l, br) in grid.branches.iter().enumerate() {
        let bound = grid.product_bound(l);
        let (c, s) = (vars.c(t, l), vars.s(t, l));
        for (label, col) in [("c", c), ("s", s)] {
            rows.push(LinearRow::le(format!("{label}up_{l}_t{t}"), vec![(col, 1.0)], bound));
            rows.push(LinearRow::le(format!("{label}lo_{l}_t{t}"), vec![(col, -1.0)], bound));
        }

        if let (Some(lo), Some(hi)) = (br.angmin, br.angmax) {
            let quarter = std::f64::consts::FRAC_PI_2;
            if lo > -quarter && hi < quarter {
                // |θk − θm| < 90° ⇒ c ≥ 0 and tan(lo)·c ≤ s ≤ tan(hi)·c
                rows.push(LinearRow::le(format!("cpos_{l}_t{t}"), vec![(c, -1.0)], 0.0));
                rows.push(LinearRow::le(
                    format!("angmin_{l}_t{t}"),
                    vec![(c, lo.tan()), (s, -1.0)],
                    0.0,
                ));
                rows.push(LinearRow::le(
                    format!("angmax_{l}_t{t}"),
                    vec![(s, 1.0), (c, -hi.tan())],
                    0.0,
                ));
            }
        }

        if let Some(rate) = br.rate {
            for (label, col) in [
                ("pf", vars.p_from(t, l)),
                ("qf", vars.q_from(t, l)),
                ("pt", vars.p_to(t, l)),
                ("qt", vars.q_to(t, l)),
            ] {
                rows.push(LinearRow::le(format!("{label}up_{l}_t{t}"), vec![(col, 1.0)], rate));
                rows.push(LinearRow::le(format!("{label}lo_{l}_t{t}"), vec![(col, -1.0)], rate));
            }
        }

        if let Some(i2) = vars.i2(t, l) {
            rows.push(LinearRow::le(format!("i2pos_{l}_t{t}"), vec![(i2, -1.0)], 0.0));
        }
    }
}

fn push_flow_definitions(grid: &Grid, vars: &VarIndex, t: usize, rows: &mut Vec<LinearRow>) {
    for (l, br) in grid.branches.iter().enumerate() {
        let y = br.admittance;
        let (vk, vm) = (vars.v(t, br.from), vars.v(t, br.to));
        let (c, s) = (vars.c(t, l), vars.s(t, l));
        let (gff, bff) = (y.y_ff.re, y.y_ff.im);
        let (gft, bft) = (y.y_ft.re, y.y_ft.im);
        let (gtf, btf) = (y.y_tf.re, y.y_tf.im);
        let (gtt, btt) = (y.y_tt.re, y.y_tt.im);

        rows.push(LinearRow::eq(
            format!("Pdef_{l}_t{t}"),
            vec![(vars.p_from(t, l), 1.0), (vk, -gff), (c, -gft), (s, -bft)],
            0.0,
        ));
        rows.push(LinearRow::eq(
            format!("Qdef_{l}_t{t}"),
            vec![(vars.q_from(t, l), 1.0), (vk, bff), (s, -gft), (c, bft)],
            0.0,
        ));
        rows.push(LinearRow::eq(
            format!("Pdefr_{l}_t{t}"),
            vec![(vars.p_to(t, l), 1.0), (vm, -gtt), (c, -gtf), (s, btf)],
            0.0,
        ));
        rows.push(LinearRow::eq(
            format!("Qdefr_{l}_t{t}"),
            vec![(vars.q_to(t, l), 1.0), (vm, btt), (s, gtf), (c, btf)],
            0.0,
        ));

        if let Some(i2) = vars.i2(t, l) {
            // |I_k|² = |Yff|²v_k + |Yft|²v_m + 2·Re(Yff·conj(Yft)·(c + js))
            let cross = y.y_ff * y.y_ft.conj();
            rows.push(LinearRow::eq(
                format!("i2def_{l}_t{t}"),
                vec![
                    (i2, 1.0),
                    (vk, -y.y_ff.norm_sqr()),
                    (vm, -y.y_ft.norm_sqr()),
                    (c, -2.0 * cross.re),
                    (s, 2.0 * cross.im),
                ],
                0.0,
            ));
        }
    }
}

fn push_balance(grid: &Grid, vars: &VarIndex, t: usize, rows: &mut Vec<LinearRow>) {
    let n = grid.buses.len();
    let mut p_terms: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    let mut q_terms: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];

    for (g, gen) in grid.gens.iter().enumerate() {
        p_terms[gen.bus].push((vars.pg(t, g), 1.0));
        q_terms[gen.bus].push((vars.qg(t, g), 1.0));
    }
    for (l, br) in grid.branches.iter().enumerate() {
        p_terms[br.from].push((vars.p_from(t, l), -1.0));
        q_terms[br.from].push((vars.q_from(t, l), -1.0));
        p_terms[br.to].push((vars.p_to(t, l), -1.0));
        q_terms[br.to].push((vars.q_to(t, l), -1.0));
    }

    for (k, bus) in grid.buses.iter().enumerate() {
        let v = vars.v(t, k);
        let mut p = std::mem::take(&mut p_terms[k]);
        let mut q = std::mem::take(&mut q_terms[k]);
        if bus.gs != 0.0 {
            p.push((v, -bus.gs));
        }
        if bus.bs != 0.0 {
            q.push((v, bus.bs));
        }
        rows.push(LinearRow::eq(format!("Pbal_{k}_t{t}"), p, grid.load_p[t][k]));
        rows.push(LinearRow::eq(format!("Qbal_{k}_t{t}"), q, grid.load_q[t][k]));
    }
}

fn push_ramps(grid: &Grid, vars: &VarIndex, t: usize, rows: &mut Vec<LinearRow>) {
    for (g, gen) in grid.gens.iter().enumerate() {
        let Some((up, down)) = gen.ramp else {
            continue;
        };
        let (now, before) = (vars.pg(t, g), vars.pg(t - 1, g));
        rows.push(LinearRow::le(
            format!("rampup_{g}_t{t}"),
            vec![(now, 1.0), (before, -1.0)],
            up,
        ));
        rows.push(LinearRow::le(
            format!("rampdn_{g}_t{t}"),
            vec![(before, 1.0), (now, -1.0)],
            down,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relaxation::grid::{BranchAdmittance, GridBranch, GridBus, GridGen};
    use crate::relaxation::rows::RowSense;
    use mtpcut_core::{BusId, GenId};
    use num_complex::Complex64;

    fn two_bus(periods: usize, ramp: Option<(f64, f64)>) -> Grid {
        let bus = |i| GridBus {
            id: BusId::new(i),
            vmin: 0.95,
            vmax: 1.05,
            gs: 0.0,
            bs: 0.0,
        };
        Grid {
            name: "two".into(),
            base_mva: 100.0,
            periods,
            buses: vec![bus(1), bus(2)],
            branches: vec![GridBranch {
                name: "1-2".into(),
                from: 0,
                to: 1,
                r: 0.01,
                b: 0.02,
                tau: 1.0,
                admittance: BranchAdmittance::pi_model(0.01, 0.1, 0.02, 1.0, 0.0),
                rate: Some(2.0),
                angmin: Some(-0.5),
                angmax: Some(0.5),
            }],
            gens: vec![GridGen {
                id: GenId::new(0),
                bus: 0,
                pmin: 0.1,
                pmax: 2.0,
                qmin: -1.0,
                qmax: 1.0,
                cost: (5.0, 20.0, 10.0),
                ramp,
            }],
            load_p: vec![vec![0.0, 0.8]; periods],
            load_q: vec![vec![0.0, 0.2]; periods],
        }
    }

    /// Exact AC operating point of the two-bus grid in the lifted variables.
    fn ac_point(grid: &Grid, vars: &VarIndex, vm: [f64; 2], va: [f64; 2]) -> Vec<f64> {
        let mut x = vec![0.0; vars.n_vars()];
        let v: Vec<Complex64> = (0..2).map(|k| Complex64::from_polar(vm[k], va[k])).collect();
        let y = grid.branches[0].admittance;
        let w = v[0] * v[1].conj();
        let s_from = v[0] * (y.y_ff * v[0] + y.y_ft * v[1]).conj();
        let s_to = v[1] * (y.y_tf * v[0] + y.y_tt * v[1]).conj();
        x[vars.v(0, 0)] = vm[0] * vm[0];
        x[vars.v(0, 1)] = vm[1] * vm[1];
        x[vars.c(0, 0)] = w.re;
        x[vars.s(0, 0)] = w.im;
        x[vars.p_from(0, 0)] = s_from.re;
        x[vars.q_from(0, 0)] = s_from.im;
        x[vars.p_to(0, 0)] = s_to.re;
        x[vars.q_to(0, 0)] = s_to.im;
        if let Some(i2) = vars.i2(0, 0) {
            x[i2] = (y.y_ff * v[0] + y.y_ft * v[1]).norm_sqr();
        }
        x
    }

    #[test]
    fn flow_definitions_hold_at_ac_point() {
        let grid = two_bus(1, None);
        let vars = VarIndex::new(&grid, true, false);
        let base = build_base(&grid, &vars, &ConicInequalities::default());
        let x = ac_point(&grid, &vars, [1.02, 0.98], [0.0, -0.07]);
        for row in base
            .rows
            .iter()
            .filter(|r| r.name.contains("def"))
        {
            assert!(
                (row.activity(&x) - row.rhs).abs() < 1e-10,
                "{} violated",
                row.name
            );
        }
        // the AC point satisfies every family constraint
        for family in CutFamily::ALL {
            for inst in families::instances(family, &grid, &vars) {
                let v = families::violation(family, &grid, &vars, inst, &x).unwrap();
                assert!(v <= 1e-9, "{family} {inst}: {v}");
            }
        }
    }

    #[test]
    fn ramp_rows_only_when_coupled() {
        let coupled = two_bus(3, Some((0.2, 0.3)));
        let vars = VarIndex::new(&coupled, false, false);
        let base = build_base(&coupled, &vars, &ConicInequalities::default());
        let ramps: Vec<_> = base.rows.iter().filter(|r| r.name.starts_with("ramp")).collect();
        assert_eq!(ramps.len(), 4);
        assert!(ramps.iter().all(|r| r.sense == RowSense::Le));

        let free = two_bus(3, None);
        let base = build_base(&free, &vars, &ConicInequalities::default());
        assert!(base.rows.iter().all(|r| !r.name.starts_with("ramp")));
    }

    #[test]
    fn quadratic_objective_matches_cost() {
        let grid = two_bus(2, None);
        let vars = VarIndex::new(&grid, false, false);
        let base = build_base(&grid, &vars, &ConicInequalities::default());
        let mut x = vec![0.0; vars.n_vars()];
        x[vars.pg(0, 0)] = 1.0;
        x[vars.pg(1, 0)] = 0.5;
        let expected = grid.gens[0].cost_at(1.0) + grid.gens[0].cost_at(0.5);
        assert!((base.objective.value(&x) - expected).abs() < 1e-12);
        assert!(base.tangents.is_empty());
    }

    #[test]
    fn linear_objective_uses_epigraph_tangents() {
        let grid = two_bus(1, None);
        let vars = VarIndex::new(&grid, false, true);
        let base = build_base(&grid, &vars, &ConicInequalities::default());
        assert!(base.objective.quadratic.is_empty());
        assert_eq!(base.tangents.len(), 3);
        // every tangent underestimates the cost
        let gen = &grid.gens[0];
        let mut x = vec![0.0; vars.n_vars()];
        for p in [0.1, 0.7, 1.3, 2.0] {
            x[vars.pg(0, 0)] = p;
            x[vars.z(0, 0).unwrap()] = gen.cost_at(p);
            assert!(base.tangents.iter().all(|r| r.activity(&x) <= r.rhs + 1e-9));
        }
    }

    #[test]
    fn conic_inequalities_add_cones() {
        let grid = two_bus(2, None);
        let vars = VarIndex::new(&grid, false, false);
        let conic = ConicInequalities {
            jabr: true,
            limit: true,
            ..Default::default()
        };
        let base = build_base(&grid, &vars, &conic);
        // 2 Jabr + 4 limit
        assert_eq!(base.cones.len(), 6);
    }
}
