//! Read-only evaluation of a relaxation solution against the enabled
//! families.

use std::collections::BTreeMap;

use mtpcut_core::CutFamily;
use rayon::prelude::*;

use super::families::{self, InstanceId};
use crate::relaxation::grid::Grid;
use crate::relaxation::vars::VarIndex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub instance: InstanceId,
    pub violation: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FamilyScan {
    /// Instances violated beyond the family threshold, most violated first
    pub candidates: Vec<Candidate>,
    /// Largest violation over all instances (zero when none is violated)
    pub max_violation: f64,
}

pub struct ViolationScanner<'a> {
    grid: &'a Grid,
    vars: &'a VarIndex,
}

impl<'a> ViolationScanner<'a> {
    pub fn new(grid: &'a Grid, vars: &'a VarIndex) -> Self {
        Self { grid, vars }
    }

    /// Violations of one family at `x`; instances at or below `threshold`
    /// are not candidates.
    pub fn scan_family(&self, family: CutFamily, x: &[f64], threshold: f64) -> FamilyScan {
        let mut max_violation: f64 = 0.0;
        let mut candidates = Vec::new();
        for instance in families::instances(family, self.grid, self.vars) {
            let Some(violation) = families::violation(family, self.grid, self.vars, instance, x)
            else {
                continue;
            };
            max_violation = max_violation.max(violation);
            if violation > threshold {
                candidates.push(Candidate {
                    instance,
                    violation,
                });
            }
        }
        sort_candidates(&mut candidates);
        FamilyScan {
            candidates,
            max_violation,
        }
    }

    /// Scan every `(family, threshold)` pair in parallel.
    pub fn scan(&self, x: &[f64], families: &[(CutFamily, f64)]) -> BTreeMap<CutFamily, FamilyScan> {
        families
            .par_iter()
            .map(|&(family, threshold)| (family, self.scan_family(family, x, threshold)))
            .collect()
    }
}

/// Decreasing violation, ties by ascending instance.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.violation
            .total_cmp(&a.violation)
            .then_with(|| a.instance.cmp(&b.instance))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cuts::families::BranchEnd;

    fn inst(period: usize, branch: usize) -> InstanceId {
        InstanceId {
            period,
            branch,
            side: BranchEnd::From,
        }
    }

    #[test]
    fn ties_break_by_instance() {
        let mut c = vec![
            Candidate {
                instance: inst(1, 0),
                violation: 0.5,
            },
            Candidate {
                instance: inst(0, 3),
                violation: 0.5,
            },
            Candidate {
                instance: inst(0, 1),
                violation: 0.9,
            },
        ];
        sort_candidates(&mut c);
        let order: Vec<_> = c.iter().map(|c| c.instance).collect();
        assert_eq!(order, vec![inst(0, 1), inst(0, 3), inst(1, 0)]);
    }
}
