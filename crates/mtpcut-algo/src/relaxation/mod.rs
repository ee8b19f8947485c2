//! The multi-period relaxation: a fixed base model plus cut rows.
//!
//! Cut rows are keyed by `(family, cut id)`, so removing some of them never
//! renumbers the others. The base model (physics, bounds, ramps, optional
//! conic inequalities) is built once per run.

pub mod builder;
pub mod grid;
pub mod rows;
pub mod solver;
pub mod vars;

use std::collections::{BTreeMap, BTreeSet};

use mtpcut_core::CutFamily;
use mtpcut_io::config::{CutplaneConfig, SolverTolerances};

use crate::cuts::{Cut, CutId, CutPools};
use builder::{build_base, BaseModel};
use grid::Grid;
use rows::{LinearRow, RowSense};
use solver::{solve_conic, ConicProblem, SolverError};
use vars::VarIndex;

/// Result of one solve. Superseded, never merged, by the next round's.
#[derive(Debug, Clone)]
pub struct RelaxationState {
    pub objective: f64,
    pub x: Vec<f64>,
    /// Dual of every cut row, when duals were requested
    pub cut_duals: Option<BTreeMap<(CutFamily, CutId), f64>>,
    pub iterations: u32,
}

/// Cut and objective rows of a model at one point of the run.
#[derive(Debug, Clone)]
pub struct RowSnapshot {
    objective_rows: Vec<LinearRow>,
    cut_rows: BTreeMap<(CutFamily, CutId), LinearRow>,
}

#[derive(Debug, Clone)]
pub struct RelaxationModel {
    grid: Grid,
    vars: VarIndex,
    base: BaseModel,
    /// Objective epigraph tangents added during the run
    objective_rows: Vec<LinearRow>,
    cut_rows: BTreeMap<(CutFamily, CutId), LinearRow>,
    tolerances: SolverTolerances,
    getduals: bool,
}

impl RelaxationModel {
    pub fn new(grid: Grid, config: &CutplaneConfig) -> Self {
        let vars = VarIndex::new(&grid, config.i2_variables, config.linear_objective);
        let base = build_base(&grid, &vars, &config.conic);
        Self {
            grid,
            vars,
            base,
            objective_rows: Vec::new(),
            cut_rows: BTreeMap::new(),
            tolerances: config.solver,
            getduals: config.getduals,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn vars(&self) -> &VarIndex {
        &self.vars
    }

    pub fn n_cut_rows(&self) -> usize {
        self.cut_rows.len()
    }

    pub fn has_cut(&self, family: CutFamily, id: CutId) -> bool {
        self.cut_rows.contains_key(&(family, id))
    }

    /// Append cut rows; rows already present are left untouched.
    pub fn apply_cuts<'c>(&mut self, cuts: impl IntoIterator<Item = &'c Cut>) {
        for cut in cuts {
            self.cut_rows
                .entry((cut.family, cut.id))
                .or_insert_with(|| LinearRow {
                    name: cut.row_name(),
                    coeffs: cut.coeffs.clone(),
                    sense: RowSense::Le,
                    rhs: cut.rhs,
                });
        }
    }

    /// Delete the rows of `ids`; returns how many rows were present.
    pub fn remove_cuts(&mut self, family: CutFamily, ids: &BTreeSet<CutId>) -> usize {
        ids.iter()
            .filter(|id| self.cut_rows.remove(&(family, **id)).is_some())
            .count()
    }

    /// Replace every cut row with the current content of the pools.
    pub fn rebuild_from_pools(&mut self, pools: &CutPools) {
        self.cut_rows.clear();
        for pool in pools.iter() {
            self.apply_cuts(pool.iter());
        }
    }

    pub fn add_objective_row(&mut self, row: LinearRow) {
        self.objective_rows.push(row);
    }

    pub fn snapshot_rows(&self) -> RowSnapshot {
        RowSnapshot {
            objective_rows: self.objective_rows.clone(),
            cut_rows: self.cut_rows.clone(),
        }
    }

    /// Return to the rows of `snapshot`; the base model is unchanged.
    pub fn restore_rows(&mut self, snapshot: RowSnapshot) {
        self.objective_rows = snapshot.objective_rows;
        self.cut_rows = snapshot.cut_rows;
    }

    /// Linear rows in solver order: equalities, inequalities, objective
    /// tangents, then cuts in `(family, id)` order.
    pub fn assemble(&self) -> ConicProblem {
        let (eq, le): (Vec<&LinearRow>, Vec<&LinearRow>) = self
            .base
            .rows
            .iter()
            .partition(|r| r.sense == RowSense::Eq);
        let rows = eq
            .into_iter()
            .chain(le)
            .chain(&self.base.tangents)
            .chain(&self.objective_rows)
            .chain(self.cut_rows.values())
            .cloned()
            .collect();
        ConicProblem {
            n_vars: self.vars.n_vars(),
            objective: self.base.objective.clone(),
            rows,
            cones: self.base.cones.clone(),
        }
    }

    pub fn solve(&self) -> Result<RelaxationState, SolverError> {
        let problem = self.assemble();
        let solution = solve_conic(&problem, &self.tolerances)?;

        let cut_duals = self.getduals.then(|| {
            let start = problem.rows.len() - self.cut_rows.len();
            self.cut_rows
                .keys()
                .enumerate()
                .map(|(i, key)| (*key, solution.row_duals.get(start + i).copied().unwrap_or(0.0)))
                .collect()
        });

        Ok(RelaxationState {
            objective: solution.objective,
            x: solution.x,
            cut_duals,
            iterations: solution.iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cuts::{families, CutDraft, CutPool};
    use crate::test_support::two_bus_grid;

    fn config(extra: &str) -> CutplaneConfig {
        format!("casefilename two.m\njabrcuts\n{extra}END\n")
            .parse()
            .unwrap()
    }

    fn jabr_draft(model: &RelaxationModel, x: &[f64], period: usize) -> Option<CutDraft> {
        let inst = families::InstanceId {
            period,
            branch: 0,
            side: families::BranchEnd::From,
        };
        let cone = families::cone(CutFamily::Jabr, model.grid(), model.vars(), inst)?;
        let (coeffs, rhs) = cone.linearize(x)?;
        Some(CutDraft {
            instance: inst,
            violation: cone.residual(x),
            coeffs,
            rhs,
        })
    }

    #[test]
    fn cuts_tighten_and_keep_their_ids() {
        let cfg = config("getduals\n");
        let mut model = RelaxationModel::new(two_bus_grid(2), &cfg);
        let first = model.solve().unwrap();
        assert_eq!(first.x.len(), model.vars().n_vars());
        assert_eq!(first.cut_duals.as_ref().map(|d| d.len()), Some(0));

        let mut pool = CutPool::new(CutFamily::Jabr);
        let drafts: Vec<_> = (0..2)
            .filter_map(|t| jabr_draft(&model, &first.x, t))
            .collect();
        assert!(!drafts.is_empty());
        let ids = pool.add(drafts, 1);
        model.apply_cuts(pool.iter());
        assert_eq!(model.n_cut_rows(), ids.len());

        let second = model.solve().unwrap();
        assert!(second.objective >= first.objective - 1e-6);
        let duals = second.cut_duals.unwrap();
        assert!(ids.iter().all(|id| duals.contains_key(&(CutFamily::Jabr, *id))));

        let snapshot = model.snapshot_rows();
        let removed = model.remove_cuts(CutFamily::Jabr, &BTreeSet::from([ids[0]]));
        assert_eq!(removed, 1);
        assert!(!model.has_cut(CutFamily::Jabr, ids[0]));
        for id in &ids[1..] {
            assert!(model.has_cut(CutFamily::Jabr, *id));
        }

        model.restore_rows(snapshot);
        assert_eq!(model.n_cut_rows(), ids.len());
        assert!(model.has_cut(CutFamily::Jabr, ids[0]));
    }

    #[test]
    fn rebuild_matches_pools() {
        let cfg = config("");
        let mut model = RelaxationModel::new(two_bus_grid(1), &cfg);
        let x = model.solve().unwrap().x;
        let mut pools = CutPools::for_families(&[CutFamily::Jabr]);
        if let (Some(pool), Some(draft)) = (pools.get_mut(CutFamily::Jabr), jabr_draft(&model, &x, 0)) {
            pool.add(vec![draft], 1);
        }
        model.rebuild_from_pools(&pools);
        assert_eq!(model.n_cut_rows(), pools.total_len());
        model.rebuild_from_pools(&CutPools::default());
        assert_eq!(model.n_cut_rows(), 0);
    }

    #[test]
    fn assembled_rows_put_equalities_first() {
        let cfg = config("");
        let model = RelaxationModel::new(two_bus_grid(2), &cfg);
        let problem = model.assemble();
        let first_le = problem
            .rows
            .iter()
            .position(|r| r.sense == RowSense::Le)
            .unwrap();
        assert!(problem.rows[first_le..].iter().all(|r| r.sense == RowSense::Le));
        assert!(problem.cones.is_empty());
    }
}
