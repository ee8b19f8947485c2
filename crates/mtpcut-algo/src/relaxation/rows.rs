//! Sparse linear rows, affine expressions and second-order cones.

/// `Σ coeffᵢ·xᵢ + constant`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AffineExpr {
    pub terms: Vec<(usize, f64)>,
    pub constant: f64,
}

impl AffineExpr {
    pub fn new(terms: Vec<(usize, f64)>, constant: f64) -> Self {
        Self { terms, constant }
    }

    pub fn constant(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    pub fn eval(&self, x: &[f64]) -> f64 {
        self.constant
            + self
                .terms
                .iter()
                .map(|&(col, coeff)| coeff * x.get(col).copied().unwrap_or(0.0))
                .sum::<f64>()
    }
}

/// `‖w(x)‖₂ ≤ u(x)`
#[derive(Debug, Clone, PartialEq)]
pub struct ConeConstraint {
    pub name: String,
    pub u: AffineExpr,
    pub w: Vec<AffineExpr>,
}

impl ConeConstraint {
    /// `‖w(x)‖ − u(x)`, positive when violated.
    pub fn residual(&self, x: &[f64]) -> f64 {
        let norm = self
            .w
            .iter()
            .map(|e| e.eval(x).powi(2))
            .sum::<f64>()
            .sqrt();
        norm - self.u.eval(x)
    }

    /// Gradient cut `(w(x*)/‖w(x*)‖)·w(x) ≤ u(x)`, written as `a·x ≤ b`.
    ///
    /// Valid for every point inside the cone; cuts off `x*` when the cone is
    /// violated there. `None` when `w(x*)` vanishes.
    pub fn linearize(&self, x_star: &[f64]) -> Option<(Vec<(usize, f64)>, f64)> {
        let w_star: Vec<f64> = self.w.iter().map(|e| e.eval(x_star)).collect();
        let norm = w_star.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm <= 1e-12 {
            return None;
        }
        let mut terms = Vec::new();
        let mut rhs = self.u.constant;
        for (expr, value) in self.w.iter().zip(&w_star) {
            let g = value / norm;
            if g == 0.0 {
                continue;
            }
            terms.extend(expr.terms.iter().map(|&(col, a)| (col, g * a)));
            rhs -= g * expr.constant;
        }
        terms.extend(self.u.terms.iter().map(|&(col, a)| (col, -a)));
        Some((merge_terms(terms), rhs))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSense {
    Eq,
    Le,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearRow {
    pub name: String,
    pub coeffs: Vec<(usize, f64)>,
    pub sense: RowSense,
    pub rhs: f64,
}

impl LinearRow {
    pub fn eq(name: impl Into<String>, coeffs: Vec<(usize, f64)>, rhs: f64) -> Self {
        Self {
            name: name.into(),
            coeffs: merge_terms(coeffs),
            sense: RowSense::Eq,
            rhs,
        }
    }

    pub fn le(name: impl Into<String>, coeffs: Vec<(usize, f64)>, rhs: f64) -> Self {
        Self {
            name: name.into(),
            coeffs: merge_terms(coeffs),
            sense: RowSense::Le,
            rhs,
        }
    }

    pub fn activity(&self, x: &[f64]) -> f64 {
        self.coeffs
            .iter()
            .map(|&(col, a)| a * x.get(col).copied().unwrap_or(0.0))
            .sum()
    }
}

/// Sort by column, merge duplicates and drop zeros.
pub fn merge_terms(mut terms: Vec<(usize, f64)>) -> Vec<(usize, f64)> {
    terms.sort_by_key(|&(col, _)| col);
    let mut out: Vec<(usize, f64)> = Vec::with_capacity(terms.len());
    for (col, a) in terms {
        match out.last_mut() {
            Some((last, acc)) if *last == col => *acc += a,
            _ => out.push((col, a)),
        }
    }
    out.retain(|&(_, a)| a != 0.0);
    out
}

/// Cosine of the angle between two sparse rows (both sorted by column).
pub fn cosine(a: &[(usize, f64)], b: &[(usize, f64)]) -> f64 {
    let norm = |r: &[(usize, f64)]| r.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
    let (na, nb) = (norm(a), norm(b));
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    let (mut i, mut j, mut dot) = (0, 0, 0.0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    dot / (na * nb)
}
