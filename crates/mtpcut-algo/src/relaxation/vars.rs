//! Column layout of the relaxation.
//!
//! Every period owns a contiguous block of columns:
//!
//! ```text
//! | v (bus) | c | s | P_km | Q_km | P_mk | Q_mk (branch) | Pg | Qg (gen) | i2 (branch)? | z (gen)? |
//! ```
//!
//! `i2` columns exist only when current-magnitude variables are enabled and
//! `z` (cost epigraph) columns only with a linear objective.

use super::grid::Grid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    V,
    C,
    S,
    PFrom,
    QFrom,
    PTo,
    QTo,
    Pg,
    Qg,
    I2,
    Z,
}

impl VarKind {
    fn prefix(self) -> &'static str {
        match self {
            VarKind::V => "v",
            VarKind::C => "c",
            VarKind::S => "s",
            VarKind::PFrom => "Pf",
            VarKind::QFrom => "Qf",
            VarKind::PTo => "Pt",
            VarKind::QTo => "Qt",
            VarKind::Pg => "Pg",
            VarKind::Qg => "Qg",
            VarKind::I2 => "i2",
            VarKind::Z => "z",
        }
    }
}

#[derive(Debug, Clone)]
pub struct VarIndex {
    n_bus: usize,
    n_branch: usize,
    n_gen: usize,
    periods: usize,
    has_i2: bool,
    has_z: bool,
    block: usize,
    // (kind, offset within the block, count)
    layout: Vec<(VarKind, usize, usize)>,
}

impl VarIndex {
    pub fn new(grid: &Grid, has_i2: bool, has_z: bool) -> Self {
        let (nb, nl, ng) = (grid.buses.len(), grid.branches.len(), grid.gens.len());
        let mut kinds = vec![
            (VarKind::V, nb),
            (VarKind::C, nl),
            (VarKind::S, nl),
            (VarKind::PFrom, nl),
            (VarKind::QFrom, nl),
            (VarKind::PTo, nl),
            (VarKind::QTo, nl),
            (VarKind::Pg, ng),
            (VarKind::Qg, ng),
        ];
        if has_i2 {
            kinds.push((VarKind::I2, nl));
        }
        if has_z {
            kinds.push((VarKind::Z, ng));
        }
        let mut layout = Vec::with_capacity(kinds.len());
        let mut offset = 0;
        for (kind, count) in kinds {
            layout.push((kind, offset, count));
            offset += count;
        }
        Self {
            n_bus: nb,
            n_branch: nl,
            n_gen: ng,
            periods: grid.periods,
            has_i2,
            has_z,
            block: offset,
            layout,
        }
    }

    pub fn n_vars(&self) -> usize {
        self.block * self.periods
    }

    pub fn periods(&self) -> usize {
        self.periods
    }

    pub fn has_i2(&self) -> bool {
        self.has_i2
    }

    pub fn has_z(&self) -> bool {
        self.has_z
    }

    fn offset(&self, kind: VarKind) -> Option<usize> {
        self.layout
            .iter()
            .find(|(k, _, _)| *k == kind)
            .map(|(_, off, _)| *off)
    }

    #[inline]
    fn at(&self, t: usize, kind: VarKind, idx: usize) -> usize {
        // kinds outside the layout are guarded by the Option accessors below
        t * self.block + self.offset(kind).unwrap_or(0) + idx
    }

    pub fn v(&self, t: usize, bus: usize) -> usize {
        debug_assert!(bus < self.n_bus);
        self.at(t, VarKind::V, bus)
    }

    pub fn c(&self, t: usize, br: usize) -> usize {
        debug_assert!(br < self.n_branch);
        self.at(t, VarKind::C, br)
    }

    pub fn s(&self, t: usize, br: usize) -> usize {
        self.at(t, VarKind::S, br)
    }

    pub fn p_from(&self, t: usize, br: usize) -> usize {
        self.at(t, VarKind::PFrom, br)
    }

    pub fn q_from(&self, t: usize, br: usize) -> usize {
        self.at(t, VarKind::QFrom, br)
    }

    pub fn p_to(&self, t: usize, br: usize) -> usize {
        self.at(t, VarKind::PTo, br)
    }

    pub fn q_to(&self, t: usize, br: usize) -> usize {
        self.at(t, VarKind::QTo, br)
    }

    pub fn pg(&self, t: usize, gen: usize) -> usize {
        debug_assert!(gen < self.n_gen);
        self.at(t, VarKind::Pg, gen)
    }

    pub fn qg(&self, t: usize, gen: usize) -> usize {
        self.at(t, VarKind::Qg, gen)
    }

    pub fn i2(&self, t: usize, br: usize) -> Option<usize> {
        self.has_i2.then(|| self.at(t, VarKind::I2, br))
    }

    pub fn z(&self, t: usize, gen: usize) -> Option<usize> {
        self.has_z.then(|| self.at(t, VarKind::Z, gen))
    }

    /// Period, kind and element index of a column.
    pub fn locate(&self, col: usize) -> Option<(usize, VarKind, usize)> {
        if col >= self.n_vars() || self.block == 0 {
            return None;
        }
        let t = col / self.block;
        let within = col % self.block;
        self.layout
            .iter()
            .find(|(_, off, count)| within >= *off && within < off + count)
            .map(|(kind, off, _)| (t, *kind, within - off))
    }

    /// LP-file name of a column, e.g. `c_3_t1` or `Pg_0_t2`.
    pub fn name(&self, col: usize) -> String {
        match self.locate(col) {
            Some((t, kind, idx)) => format!("{}_{}_t{}", kind.prefix(), idx, t),
            None => format!("x{col}"),
        }
    }
}
