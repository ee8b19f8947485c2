//! Cut lifecycle: creation, activity tracking, aging and dropping.
//!
//! One [`CutPool`] per enabled family. Identifiers increase monotonically
//! within a pool and are never reused, so removing rows from the model never
//! invalidates the identifiers of surviving cuts.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use mtpcut_core::CutFamily;
use serde::Serialize;

use super::families::InstanceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CutId(u64);

impl CutId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A selected linearization not yet owned by a pool.
#[derive(Debug, Clone, PartialEq)]
pub struct CutDraft {
    pub instance: InstanceId,
    /// Violation of the instance when the cut was generated
    pub violation: f64,
    /// Sorted by column
    pub coeffs: Vec<(usize, f64)>,
    pub rhs: f64,
}

/// Linear inequality `coeffs·x ≤ rhs` owned by a pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Cut {
    pub id: CutId,
    pub family: CutFamily,
    pub instance: InstanceId,
    pub coeffs: Vec<(usize, f64)>,
    pub rhs: f64,
    pub created_at: usize,
    pub last_active: usize,
    /// Sum of the violations of the instance each time this cut was found
    /// violated, starting with the violation that produced it
    pub cumulative_error: f64,
}

impl Cut {
    pub fn age(&self, round: usize) -> usize {
        round.saturating_sub(self.last_active)
    }

    /// `rhs − coeffs·x`; negative when violated.
    pub fn slack(&self, x: &[f64]) -> f64 {
        self.rhs
            - self
                .coeffs
                .iter()
                .map(|&(col, a)| a * x.get(col).copied().unwrap_or(0.0))
                .sum::<f64>()
    }

    pub fn row_name(&self) -> String {
        format!("{}cut_{}", self.family.as_str(), self.id)
    }
}

/// Record of a removed cut, kept for post-run analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedCut {
    pub id: CutId,
    pub instance: InstanceId,
    pub created_at: usize,
    pub dropped_at: usize,
    pub last_active: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoundCounts {
    pub added: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone)]
pub struct CutPool {
    family: CutFamily,
    cuts: BTreeMap<CutId, Cut>,
    next_id: u64,
    /// Counts per round, indexed by round number
    rounds: BTreeMap<usize, RoundCounts>,
    dropped: Vec<DroppedCut>,
    total_added: usize,
}

impl CutPool {
    pub fn new(family: CutFamily) -> Self {
        Self {
            family,
            cuts: BTreeMap::new(),
            next_id: 0,
            rounds: BTreeMap::new(),
            dropped: Vec::new(),
            total_added: 0,
        }
    }

    pub fn family(&self) -> CutFamily {
        self.family
    }

    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    pub fn get(&self, id: CutId) -> Option<&Cut> {
        self.cuts.get(&id)
    }

    pub fn contains(&self, id: CutId) -> bool {
        self.cuts.contains_key(&id)
    }

    /// Cuts in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &Cut> {
        self.cuts.values()
    }

    pub fn ids(&self) -> BTreeSet<CutId> {
        self.cuts.keys().copied().collect()
    }

    pub fn in_period(&self, period: usize) -> impl Iterator<Item = &Cut> {
        self.cuts
            .values()
            .filter(move |c| c.instance.period == period)
    }

    pub fn total_added(&self) -> usize {
        self.total_added
    }

    pub fn dropped(&self) -> &[DroppedCut] {
        &self.dropped
    }

    pub fn counts(&self, round: usize) -> RoundCounts {
        self.rounds.get(&round).copied().unwrap_or_default()
    }

    /// Take ownership of drafts, assigning fresh identifiers in draft order.
    pub fn add(&mut self, drafts: Vec<CutDraft>, round: usize) -> Vec<CutId> {
        let mut ids = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let id = CutId(self.next_id);
            self.next_id += 1;
            self.cuts.insert(
                id,
                Cut {
                    id,
                    family: self.family,
                    instance: draft.instance,
                    coeffs: draft.coeffs,
                    rhs: draft.rhs,
                    created_at: round,
                    last_active: round,
                    cumulative_error: draft.violation,
                },
            );
            ids.push(id);
        }
        self.total_added += ids.len();
        self.rounds.entry(round).or_default().added += ids.len();
        ids
    }

    /// Refresh `last_active` of every cut binding or violated at `x`, or with
    /// a dual value above `tolerance` when duals are available.
    pub fn update_activity(
        &mut self,
        x: &[f64],
        duals: Option<&BTreeMap<(CutFamily, CutId), f64>>,
        tolerance: f64,
        round: usize,
    ) -> usize {
        let mut active = 0;
        for cut in self.cuts.values_mut() {
            let slack = cut.slack(x);
            let dual_active = duals
                .and_then(|d| d.get(&(cut.family, cut.id)))
                .map(|z| z.abs() > tolerance)
                .unwrap_or(false);
            if slack < -tolerance {
                cut.cumulative_error += -slack;
            }
            if slack <= tolerance || dual_active {
                cut.last_active = round;
                active += 1;
            }
        }
        active
    }

    /// Remove every cut whose age exceeds `age_limit`; nothing is removed
    /// when dropping is disabled for the family.
    pub fn drop_aged(&mut self, round: usize, age_limit: usize, enabled: bool) -> BTreeSet<CutId> {
        if !enabled {
            return BTreeSet::new();
        }
        let stale: BTreeSet<CutId> = self
            .cuts
            .values()
            .filter(|c| c.age(round) > age_limit)
            .map(|c| c.id)
            .collect();
        for id in &stale {
            if let Some(cut) = self.cuts.remove(id) {
                self.dropped.push(DroppedCut {
                    id: cut.id,
                    instance: cut.instance,
                    created_at: cut.created_at,
                    dropped_at: round,
                    last_active: cut.last_active,
                });
            }
        }
        self.rounds.entry(round).or_default().dropped += stale.len();
        stale
    }

    /// Largest accumulated error over the cuts still in the pool.
    pub fn max_cumulative_error(&self) -> f64 {
        self.cuts
            .values()
            .map(|c| c.cumulative_error)
            .fold(0.0, f64::max)
    }
}

/// One optional pool per family, present iff the family is enabled.
#[derive(Debug, Clone, Default)]
pub struct CutPools {
    pub jabr: Option<CutPool>,
    pub i2: Option<CutPool>,
    pub limit: Option<CutPool>,
    pub loss: Option<CutPool>,
}

impl CutPools {
    pub fn for_families(families: &[CutFamily]) -> Self {
        let mut pools = Self::default();
        for &family in families {
            *pools.slot_mut(family) = Some(CutPool::new(family));
        }
        pools
    }

    fn slot_mut(&mut self, family: CutFamily) -> &mut Option<CutPool> {
        match family {
            CutFamily::Jabr => &mut self.jabr,
            CutFamily::I2 => &mut self.i2,
            CutFamily::Limit => &mut self.limit,
            CutFamily::Loss => &mut self.loss,
        }
    }

    pub fn get(&self, family: CutFamily) -> Option<&CutPool> {
        match family {
            CutFamily::Jabr => self.jabr.as_ref(),
            CutFamily::I2 => self.i2.as_ref(),
            CutFamily::Limit => self.limit.as_ref(),
            CutFamily::Loss => self.loss.as_ref(),
        }
    }

    pub fn get_mut(&mut self, family: CutFamily) -> Option<&mut CutPool> {
        self.slot_mut(family).as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CutPool> {
        [&self.jabr, &self.i2, &self.limit, &self.loss]
            .into_iter()
            .flatten()
    }

    pub fn total_len(&self) -> usize {
        self.iter().map(CutPool::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cuts::families::BranchEnd;

    fn draft(branch: usize, coeffs: Vec<(usize, f64)>, rhs: f64) -> CutDraft {
        CutDraft {
            instance: InstanceId {
                period: 0,
                branch,
                side: BranchEnd::From,
            },
            violation: 0.1,
            coeffs,
            rhs,
        }
    }

    #[test]
    fn ids_increase_and_are_never_reused() {
        let mut pool = CutPool::new(CutFamily::Jabr);
        let first = pool.add(vec![draft(0, vec![(0, 1.0)], 1.0), draft(1, vec![(1, 1.0)], 1.0)], 1);
        assert_eq!(first, vec![CutId::new(0), CutId::new(1)]);

        let dropped = pool.drop_aged(5, 2, true);
        assert_eq!(dropped.len(), 2);
        assert!(pool.is_empty());

        let next = pool.add(vec![draft(0, vec![(0, 1.0)], 1.0)], 6);
        assert_eq!(next, vec![CutId::new(2)]);
        assert_eq!(pool.dropped().len(), 2);
        assert_eq!(pool.total_added(), 3);
    }

    #[test]
    fn age_tracks_last_activity() {
        let mut pool = CutPool::new(CutFamily::I2);
        // x0 ≤ 1 and x1 ≤ 1
        pool.add(vec![draft(0, vec![(0, 1.0)], 1.0), draft(1, vec![(1, 1.0)], 1.0)], 1);
        let x = [1.0, 0.0];
        for round in 2..=4 {
            let active = pool.update_activity(&x, None, 1e-6, round);
            assert_eq!(active, 1);
        }
        let binding = pool.get(CutId::new(0)).unwrap();
        let slack = pool.get(CutId::new(1)).unwrap();
        assert_eq!(binding.age(4), 0);
        assert_eq!(slack.age(4), 3);
        assert_eq!(slack.age(4), 4 - slack.last_active);

        // limit 2: the slack cut goes, the binding one stays
        let dropped = pool.drop_aged(4, 2, true);
        assert_eq!(dropped, BTreeSet::from([CutId::new(1)]));
        assert!(pool.contains(CutId::new(0)));
        assert_eq!(pool.counts(4).dropped, 1);
    }

    #[test]
    fn dropping_disabled_keeps_everything() {
        let mut pool = CutPool::new(CutFamily::Limit);
        pool.add(vec![draft(0, vec![(0, 1.0)], 5.0)], 1);
        let mut sizes = Vec::new();
        for round in 2..30 {
            pool.update_activity(&[0.0], None, 1e-6, round);
            assert!(pool.drop_aged(round, 3, false).is_empty());
            if round % 5 == 0 {
                pool.add(vec![draft(round, vec![(0, 1.0)], 5.0)], round);
            }
            sizes.push(pool.len());
        }
        assert!(sizes.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn duals_mark_cuts_active() {
        let mut pool = CutPool::new(CutFamily::Jabr);
        pool.add(vec![draft(0, vec![(0, 1.0)], 10.0)], 1);
        let duals = BTreeMap::from([((CutFamily::Jabr, CutId::new(0)), 0.5)]);
        assert_eq!(pool.update_activity(&[0.0], Some(&duals), 1e-6, 7), 1);
        assert_eq!(pool.get(CutId::new(0)).unwrap().last_active, 7);
    }

    #[test]
    fn violated_cuts_accumulate_error() {
        let mut pool = CutPool::new(CutFamily::Loss);
        pool.add(vec![draft(0, vec![(0, 1.0)], 1.0)], 1);
        pool.update_activity(&[1.5], None, 1e-6, 2);
        let cut = pool.get(CutId::new(0)).unwrap();
        assert!((cut.cumulative_error - 0.6).abs() < 1e-12);
        assert!((pool.max_cumulative_error() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn pools_exist_only_for_enabled_families() {
        let pools = CutPools::for_families(&[CutFamily::Jabr, CutFamily::Loss]);
        assert!(pools.get(CutFamily::Jabr).is_some());
        assert!(pools.get(CutFamily::I2).is_none());
        assert_eq!(pools.iter().count(), 2);
    }
}
