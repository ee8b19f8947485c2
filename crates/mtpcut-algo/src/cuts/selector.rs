//! Which violated instances become cuts this round.

use mtpcut_core::CutFamily;
use tracing::debug;

use super::families;
use super::pool::{CutDraft, CutPool};
use super::scanner::Candidate;
use crate::relaxation::grid::Grid;
use crate::relaxation::rows::cosine;
use crate::relaxation::vars::VarIndex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionRule {
    /// Share of the candidates kept, in (0, 1]
    pub fraction: f64,
    /// Near-duplicate filter: drop a cut whose cosine with a pool cut or an
    /// already selected cut of the same period exceeds this value
    pub dotprod: Option<f64>,
}

pub struct CutSelector<'a> {
    grid: &'a Grid,
    vars: &'a VarIndex,
}

impl<'a> CutSelector<'a> {
    pub fn new(grid: &'a Grid, vars: &'a VarIndex) -> Self {
        Self { grid, vars }
    }

    /// Linearize the top `ceil(fraction · n)` candidates at `x`.
    ///
    /// `candidates` must already be sorted by decreasing violation. A
    /// candidate without a linearization at `x` does not use up a slot; the
    /// next one in order takes it. The output is in candidate order, so
    /// pools assign identifiers deterministically.
    pub fn select(
        &self,
        family: CutFamily,
        candidates: &[Candidate],
        x: &[f64],
        rule: SelectionRule,
        pool: Option<&CutPool>,
    ) -> Vec<CutDraft> {
        let take = take_count(candidates.len(), rule.fraction);
        let mut selected: Vec<CutDraft> = Vec::with_capacity(take);
        let mut slots = 0;
        let mut degenerate = 0;
        for candidate in candidates {
            if slots == take {
                break;
            }
            let linearized = families::cone(family, self.grid, self.vars, candidate.instance)
                .and_then(|cone| cone.linearize(x));
            let Some((coeffs, rhs)) = linearized else {
                degenerate += 1;
                continue;
            };
            slots += 1;
            if let Some(limit) = rule.dotprod {
                let period = candidate.instance.period;
                let near_pool = pool
                    .into_iter()
                    .flat_map(|p| p.in_period(period))
                    .any(|cut| cosine(&cut.coeffs, &coeffs) > limit);
                let near_selected = selected
                    .iter()
                    .filter(|d| d.instance.period == period)
                    .any(|d| cosine(&d.coeffs, &coeffs) > limit);
                if near_pool || near_selected {
                    continue;
                }
            }
            selected.push(CutDraft {
                instance: candidate.instance,
                violation: candidate.violation,
                coeffs,
                rhs,
            });
        }
        if degenerate > 0 {
            debug!(family = %family, skipped = degenerate, "candidates without a linearization");
        }
        selected
    }
}

pub fn take_count(n: usize, fraction: f64) -> usize {
    if n == 0 {
        return 0;
    }
    let k = (fraction * n as f64).ceil() as usize;
    k.clamp(1, n)
}
