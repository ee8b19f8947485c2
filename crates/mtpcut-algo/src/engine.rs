//! The round loop.
//!
//! Each round: solve the relaxation, scan the solution against every enabled
//! family, record the objective and ask the monitor whether to stop. When
//! the run continues, pools refresh their activity, absorb the selected cuts
//! and drop aged ones, and the model is brought in line with the pools. A
//! terminal round adds nothing, so the final pools are exactly the rows of
//! the final solve. When a solve fails, pools and rows go back to the last
//! round that solved.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::Path;

use mtpcut_core::{CutFamily, MtpResult, Network};
use mtpcut_io::config::CutplaneConfig;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::convergence::{ConvergenceMonitor, RunState, RunStatus};
use crate::cuts::{CutId, CutPools, CutSelector, FamilyScan, SelectionRule, ViolationScanner};
use crate::export::{self, OutputPaths};
use crate::relaxation::builder::cost_tangent;
use crate::relaxation::grid::Grid;
use crate::relaxation::rows::LinearRow;
use crate::relaxation::solver::SolverError;
use crate::relaxation::{RelaxationModel, RelaxationState, RowSnapshot};
use crate::scenario::ScenarioData;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FamilyReport {
    pub family: CutFamily,
    pub added: usize,
    pub dropped: usize,
    pub in_pool: usize,
    /// Largest violation seen in the last solved round
    pub max_violation: f64,
    pub max_cumulative_error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub case: String,
    pub periods: usize,
    pub policy: String,
    pub status: RunStatus,
    /// Rounds whose relaxation was solved
    pub rounds: usize,
    pub objective_history: Vec<f64>,
    pub final_objective: Option<f64>,
    pub families: Vec<FamilyReport>,
    pub objective_cuts: usize,
    pub elapsed_secs: f64,
    /// Percent gap to `primal_bound`, when one is configured
    pub gap_percent: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: RunReport,
    /// Last successfully solved relaxation
    pub state: Option<RelaxationState>,
}

/// Changes of one family's pool in one round.
struct FamilyUpdate {
    family: CutFamily,
    added: Vec<CutId>,
    dropped: BTreeSet<CutId>,
}

/// Pools and model rows as they stood when a round solved.
struct SolvedRound {
    pools: CutPools,
    rows: RowSnapshot,
    objective_cuts: usize,
}

pub struct CutPlaneEngine<'a> {
    config: &'a CutplaneConfig,
    model: RelaxationModel,
    pools: CutPools,
    monitor: ConvergenceMonitor,
    outputs: OutputPaths,
    max_violation: BTreeMap<CutFamily, f64>,
    objective_cuts: usize,
    #[cfg(test)]
    fail_at_round: Option<usize>,
}

impl<'a> CutPlaneEngine<'a> {
    pub fn new(
        config: &'a CutplaneConfig,
        network: &Network,
        scenario: &ScenarioData,
        sols_dir: &Path,
    ) -> MtpResult<Self> {
        let grid = Grid::build(network, scenario)?;
        Ok(Self::with_grid(config, grid, sols_dir))
    }

    pub(crate) fn with_grid(config: &'a CutplaneConfig, grid: Grid, sols_dir: &Path) -> Self {
        info!(
            case = %grid.name,
            periods = grid.periods,
            buses = grid.buses.len(),
            branches = grid.branches.len(),
            gens = grid.gens.len(),
            "building relaxation"
        );
        for key in &config.unsupported_keys {
            warn!(key = %key, "option accepted but not supported, ignoring");
        }
        let model = RelaxationModel::new(grid, config);
        Self {
            config,
            pools: CutPools::for_families(&config.enabled_families()),
            monitor: ConvergenceMonitor::new(
                config.ftol,
                config.ftol_iterates,
                config.max_rounds,
                config.max_time,
            ),
            outputs: OutputPaths {
                sols_dir: sols_dir.to_path_buf(),
                case_name: config.case_name.clone(),
                periods: config.periods,
            },
            model,
            max_violation: BTreeMap::new(),
            objective_cuts: 0,
            #[cfg(test)]
            fail_at_round: None,
        }
    }

    pub fn model(&self) -> &RelaxationModel {
        &self.model
    }

    pub fn pools(&self) -> &CutPools {
        &self.pools
    }

    pub fn run(&mut self) -> MtpResult<RunOutcome> {
        let mut state = RunState::start();
        let mut last: Option<RelaxationState> = None;
        let mut solved_round: Option<SolvedRound> = None;

        let status = loop {
            let round = state.round + 1;
            if self.config.outputs.write_lps {
                let title = format!("{} round {}", self.config.case_name, round);
                export::write_lp(
                    &self.config.lp_file,
                    &self.model.assemble(),
                    self.model.vars(),
                    &title,
                )?;
            }

            let solved = match self.solve(round) {
                Ok(solved) => solved,
                Err(err) => {
                    warn!(round, "solver failed: {err}");
                    if let Some(previous) = solved_round.take() {
                        self.restore(previous);
                    }
                    break RunStatus::SolverFailed;
                }
            };
            state.record(solved.objective);

            let scans = self.scan(&solved.x);
            for (family, scan) in &scans {
                self.max_violation.insert(*family, scan.max_violation);
            }

            let status = self.monitor.check(state.history(), state.elapsed());
            if status.is_terminal() {
                self.log_round(round, &state, solved.iterations, &scans, &[]);
                last = Some(solved);
                break status;
            }

            solved_round = Some(self.checkpoint());
            let updates = self.update_pools(round, &solved, &scans);
            if self.config.incremental {
                for update in &updates {
                    self.model.remove_cuts(update.family, &update.dropped);
                    if let Some(pool) = self.pools.get(update.family) {
                        self.model
                            .apply_cuts(update.added.iter().filter_map(|id| pool.get(*id)));
                    }
                }
            } else {
                self.model.rebuild_from_pools(&self.pools);
            }
            self.add_objective_cuts(round, &solved.x);

            self.log_round(round, &state, solved.iterations, &scans, &updates);
            last = Some(solved);
        };

        let report = self.report(status, &state, last.as_ref());
        info!(
            status = %status,
            rounds = report.rounds,
            objective = ?report.final_objective,
            elapsed = %format!("{:.2}s", report.elapsed_secs),
            "cutting-plane run finished"
        );
        self.write_outputs(&report, last.as_ref())?;
        if self.config.cut_analysis {
            self.log_cut_analysis(state.round);
        }
        Ok(RunOutcome {
            report,
            state: last,
        })
    }

    fn solve(&self, round: usize) -> Result<RelaxationState, SolverError> {
        debug!(round, rows = self.model.n_cut_rows(), "solving relaxation");
        #[cfg(test)]
        if self.fail_at_round == Some(round) {
            return Err(SolverError::Numerical(format!("forced failure at round {round}")));
        }
        self.model.solve()
    }

    fn checkpoint(&self) -> SolvedRound {
        SolvedRound {
            pools: self.pools.clone(),
            rows: self.model.snapshot_rows(),
            objective_cuts: self.objective_cuts,
        }
    }

    fn restore(&mut self, solved: SolvedRound) {
        self.pools = solved.pools;
        self.model.restore_rows(solved.rows);
        self.objective_cuts = solved.objective_cuts;
    }

    fn scan(&self, x: &[f64]) -> BTreeMap<CutFamily, FamilyScan> {
        let thresholds: Vec<(CutFamily, f64)> = self
            .config
            .enabled_families()
            .into_iter()
            .filter_map(|f| self.config.family(f).map(|s| (f, s.threshold)))
            .collect();
        ViolationScanner::new(self.model.grid(), self.model.vars()).scan(x, &thresholds)
    }

    fn update_pools(
        &mut self,
        round: usize,
        solved: &RelaxationState,
        scans: &BTreeMap<CutFamily, FamilyScan>,
    ) -> Vec<FamilyUpdate> {
        let selector = CutSelector::new(self.model.grid(), self.model.vars());
        let mut updates = Vec::new();
        for family in self.config.enabled_families() {
            let (Some(settings), Some(pool)) =
                (self.config.family(family), self.pools.get_mut(family))
            else {
                continue;
            };
            pool.update_activity(
                &solved.x,
                solved.cut_duals.as_ref(),
                self.config.tolerance,
                round,
            );

            let candidates = scans
                .get(&family)
                .map(|s| s.candidates.as_slice())
                .unwrap_or_default();
            let rule = SelectionRule {
                fraction: settings.most_violated_fraction,
                dotprod: self.config.threshold_dotprod,
            };
            let drafts = selector.select(family, candidates, &solved.x, rule, Some(&*pool));
            if self.config.loud_cuts {
                for draft in &drafts {
                    debug!(
                        family = %family,
                        instance = %draft.instance,
                        violation = draft.violation,
                        "adding cut"
                    );
                }
            }
            let added = pool.add(drafts, round);
            let dropped = pool.drop_aged(round, self.config.cut_age_limit, settings.drop);
            if self.config.loud_cuts && !dropped.is_empty() {
                debug!(family = %family, ids = ?dropped, "dropping aged cuts");
            }
            updates.push(FamilyUpdate {
                family,
                added,
                dropped,
            });
        }
        updates
    }

    /// Tangents of the cost epigraph at the current dispatch where the
    /// epigraph variable underestimates the cost by more than the threshold.
    fn add_objective_cuts(&mut self, round: usize, x: &[f64]) {
        let Some(threshold) = self.config.objective_cuts else {
            return;
        };
        let grid = self.model.grid();
        let vars = self.model.vars();
        let mut rows: Vec<LinearRow> = Vec::new();
        for t in 0..grid.periods {
            for (g, gen) in grid.gens.iter().enumerate() {
                let Some(z) = vars.z(t, g) else {
                    continue;
                };
                let p = x.get(vars.pg(t, g)).copied().unwrap_or(0.0);
                let epigraph = x.get(z).copied().unwrap_or(0.0);
                if gen.cost_at(p) - epigraph > threshold {
                    rows.push(cost_tangent(grid, vars, t, g, p, &format!("r{round}")));
                }
            }
        }
        self.objective_cuts += rows.len();
        for row in rows {
            self.model.add_objective_row(row);
        }
    }

    fn log_round(
        &self,
        round: usize,
        state: &RunState,
        iterations: u32,
        scans: &BTreeMap<CutFamily, FamilyScan>,
        updates: &[FamilyUpdate],
    ) {
        let mut families = String::new();
        for pool in self.pools.iter() {
            let family = pool.family();
            let (added, dropped) = updates
                .iter()
                .find(|u| u.family == family)
                .map(|u| (u.added.len(), u.dropped.len()))
                .unwrap_or((0, 0));
            let max_violation = scans.get(&family).map(|s| s.max_violation).unwrap_or(0.0);
            let _ = write!(
                families,
                " {family} +{added} -{dropped} ={} maxviol {max_violation:.3e};",
                pool.len()
            );
        }
        let objective = state.last_objective().unwrap_or(f64::NAN);
        info!(
            round,
            objective = %format!("{objective:.6}"),
            iterations,
            elapsed = %format!("{:.2}s", state.elapsed().as_secs_f64()),
            gap = ?self.gap(objective),
            "round{}",
            families
        );
    }

    fn gap(&self, objective: f64) -> Option<f64> {
        self.config
            .primal_bound
            .filter(|pb| pb.abs() > 0.0 && objective.is_finite())
            .map(|pb| 100.0 * (pb - objective) / pb.abs())
    }

    fn report(
        &self,
        status: RunStatus,
        state: &RunState,
        last: Option<&RelaxationState>,
    ) -> RunReport {
        let families = self
            .pools
            .iter()
            .map(|pool| FamilyReport {
                family: pool.family(),
                added: pool.total_added(),
                dropped: pool.dropped().len(),
                in_pool: pool.len(),
                max_violation: self
                    .max_violation
                    .get(&pool.family())
                    .copied()
                    .unwrap_or(0.0),
                max_cumulative_error: pool.max_cumulative_error(),
            })
            .collect();
        let final_objective = last.map(|s| s.objective);
        RunReport {
            case: self.config.case_name.clone(),
            periods: self.config.periods,
            policy: self.config.policy.name(),
            status,
            rounds: state.round,
            objective_history: state.history().to_vec(),
            final_objective,
            families,
            objective_cuts: self.objective_cuts,
            elapsed_secs: state.elapsed().as_secs_f64(),
            gap_percent: final_objective.and_then(|obj| self.gap(obj)),
        }
    }

    fn write_outputs(&self, report: &RunReport, last: Option<&RelaxationState>) -> MtpResult<()> {
        let outputs = &self.config.outputs;
        if outputs.write_last_lp {
            let title = format!("{} final relaxation with cuts", self.config.case_name);
            export::write_lp(
                &self.config.lp_file_cuts,
                &self.model.assemble(),
                self.model.vars(),
                &title,
            )?;
        }
        if outputs.write_sol {
            if let Some(state) = last {
                export::write_solution(
                    &self.outputs.solution(),
                    self.model.vars(),
                    &state.x,
                    state.objective,
                )?;
            }
            export::write_json(&self.outputs.report(), report)?;
        }
        if outputs.write_ac_sol {
            if let Some(state) = last {
                export::write_ac_solution(
                    &self.outputs.ac_solution(),
                    self.model.grid(),
                    self.model.vars(),
                    &state.x,
                )?;
            }
        }
        if outputs.write_cuts {
            export::write_cuts(&self.outputs.cuts(), &self.pools, self.model.vars())?;
        }
        Ok(())
    }

    fn log_cut_analysis(&self, round: usize) {
        for pool in self.pools.iter() {
            let dropped = pool.dropped();
            let mean_life = if dropped.is_empty() {
                0.0
            } else {
                dropped
                    .iter()
                    .map(|d| (d.dropped_at - d.created_at) as f64)
                    .sum::<f64>()
                    / dropped.len() as f64
            };
            let mean_age_in_pool = if pool.is_empty() {
                0.0
            } else {
                pool.iter().map(|c| c.age(round) as f64).sum::<f64>() / pool.len() as f64
            };
            info!(
                family = %pool.family(),
                added = pool.total_added(),
                dropped = dropped.len(),
                in_pool = pool.len(),
                mean_life_of_dropped = %format!("{mean_life:.2}"),
                mean_age_in_pool = %format!("{mean_age_in_pool:.2}"),
                "cut analysis"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::two_bus_grid;
    use std::fs;
    use tempfile::tempdir;

    fn config(extra: &str) -> CutplaneConfig {
        format!(
            "casefilename two.m\nT 2\njabrcuts\nwritecuts\nlinear_objective\nobjective_cuts\n{extra}END\n"
        )
        .parse()
        .unwrap()
    }

    fn cut_ids(pools: &CutPools) -> Vec<Vec<CutId>> {
        pools.iter().map(|p| p.ids().into_iter().collect()).collect()
    }

    #[test]
    fn failed_round_reports_the_last_solved_one() {
        // reference: stops cleanly right after round 2
        let clean_dir = tempdir().unwrap();
        let clean_cfg = config("max_rounds 2\n");
        let mut clean = CutPlaneEngine::with_grid(&clean_cfg, two_bus_grid(2), clean_dir.path());
        let expected = clean.run().unwrap();
        assert_eq!(expected.report.status, RunStatus::RoundLimit);

        // same rounds, but round 3 fails after round 2 already grew the pools
        let failing_dir = tempdir().unwrap();
        let failing_cfg = config("max_rounds 10\n");
        let mut failing =
            CutPlaneEngine::with_grid(&failing_cfg, two_bus_grid(2), failing_dir.path());
        failing.fail_at_round = Some(3);
        let outcome = failing.run().unwrap();
        let report = &outcome.report;

        assert_eq!(report.status, RunStatus::SolverFailed);
        assert_eq!(report.rounds, 2);
        assert_eq!(report.objective_history, expected.report.objective_history);
        assert_eq!(
            report.final_objective,
            outcome.state.as_ref().map(|s| s.objective)
        );
        assert_eq!(report.families, expected.report.families);
        assert_eq!(report.objective_cuts, expected.report.objective_cuts);

        assert_eq!(cut_ids(failing.pools()), cut_ids(clean.pools()));
        assert_eq!(failing.model().n_cut_rows(), failing.pools().total_len());
        for pool in failing.pools().iter() {
            for cut in pool.iter() {
                assert!(failing.model().has_cut(pool.family(), cut.id));
            }
        }

        let name = "cuts_two_2.txt";
        assert_eq!(
            fs::read_to_string(failing_dir.path().join(name)).unwrap(),
            fs::read_to_string(clean_dir.path().join(name)).unwrap()
        );
    }

    #[test]
    fn failure_in_the_first_round_leaves_nothing_to_report() {
        let dir = tempdir().unwrap();
        let cfg = config("max_rounds 4\n");
        let mut engine = CutPlaneEngine::with_grid(&cfg, two_bus_grid(2), dir.path());
        engine.fail_at_round = Some(1);
        let outcome = engine.run().unwrap();
        assert_eq!(outcome.report.status, RunStatus::SolverFailed);
        assert_eq!(outcome.report.rounds, 0);
        assert!(outcome.state.is_none());
        assert_eq!(engine.pools().total_len(), 0);
    }
}
