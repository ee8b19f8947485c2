//! Clarabel backend.
//!
//! Clarabel solves
//!
//! ```text
//! minimize    ½·xᵀPx + qᵀx
//! subject to  Ax + s = b,  s ∈ K
//! ```
//!
//! Equalities go to the zero cone, `a·x ≤ b` rows to the nonnegative cone and
//! each `‖w(x)‖ ≤ u(x)` to a second-order cone of dimension `1 + len(w)`
//! whose slack is `(u(x), w₁(x), …)`; hence the negated terms in `A`.

use clarabel::{
    algebra::CscMatrix,
    solver::{DefaultSettingsBuilder, IPSolver, SolverStatus, SupportedConeT},
};
use mtpcut_core::MtpError;
use mtpcut_io::config::SolverTolerances;
use thiserror::Error;

use super::builder::Objective;
use super::rows::{ConeConstraint, LinearRow, RowSense};

#[derive(Debug, Clone, Error)]
pub enum SolverError {
    #[error("relaxation infeasible ({0})")]
    Infeasible(String),

    #[error("relaxation unbounded ({0})")]
    Unbounded(String),

    #[error("numerical failure: {0}")]
    Numerical(String),

    #[error("solver setup failed: {0}")]
    Setup(String),
}

impl From<SolverError> for MtpError {
    fn from(err: SolverError) -> Self {
        MtpError::Solver(err.to_string())
    }
}

/// A fully assembled conic program.
///
/// Duals come back in `rows` order, so owners of trailing rows (cuts) can
/// find theirs by position.
#[derive(Debug, Clone)]
pub struct ConicProblem {
    pub n_vars: usize,
    pub objective: Objective,
    pub rows: Vec<LinearRow>,
    pub cones: Vec<ConeConstraint>,
}

#[derive(Debug, Clone)]
pub struct ConicSolution {
    pub x: Vec<f64>,
    /// One dual per entry of `ConicProblem::rows`
    pub row_duals: Vec<f64>,
    pub objective: f64,
    pub iterations: u32,
}

pub fn solve_conic(
    problem: &ConicProblem,
    tolerances: &SolverTolerances,
) -> Result<ConicSolution, SolverError> {
    let n_var = problem.n_vars;
    let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n_var];
    let mut rhs: Vec<f64> = Vec::new();
    let mut cones: Vec<SupportedConeT<f64>> = Vec::new();

    let push_row = |coeffs: &[(usize, f64)],
                    b: f64,
                    sense: RowSense,
                    rows: &mut Vec<Vec<(usize, f64)>>,
                    rhs: &mut Vec<f64>,
                    cones: &mut Vec<SupportedConeT<f64>>|
     -> Result<(), SolverError> {
        let row_idx = rhs.len();
        for &(col, val) in coeffs {
            let column = rows
                .get_mut(col)
                .ok_or_else(|| SolverError::Setup(format!("column {col} out of range")))?;
            column.push((row_idx, val));
        }
        rhs.push(b);
        match (sense, cones.last_mut()) {
            (RowSense::Eq, Some(SupportedConeT::ZeroConeT(n))) => *n += 1,
            (RowSense::Eq, _) => cones.push(SupportedConeT::ZeroConeT(1)),
            (RowSense::Le, Some(SupportedConeT::NonnegativeConeT(n))) => *n += 1,
            (RowSense::Le, _) => cones.push(SupportedConeT::NonnegativeConeT(1)),
        }
        Ok(())
    };

    for row in &problem.rows {
        push_row(&row.coeffs, row.rhs, row.sense, &mut rows, &mut rhs, &mut cones)?;
    }
    let n_linear = rhs.len();

    for cone in &problem.cones {
        let base = rhs.len();
        for (offset, expr) in std::iter::once(&cone.u).chain(&cone.w).enumerate() {
            for &(col, val) in &expr.terms {
                let column = rows
                    .get_mut(col)
                    .ok_or_else(|| SolverError::Setup(format!("column {col} out of range")))?;
                column.push((base + offset, -val));
            }
            rhs.push(expr.constant);
        }
        cones.push(SupportedConeT::SecondOrderConeT(1 + cone.w.len()));
    }

    let n_con_rows = rhs.len();
    let mut col_ptr = Vec::with_capacity(n_var + 1);
    let mut row_idx = Vec::new();
    let mut values = Vec::new();
    for column in rows.iter_mut() {
        col_ptr.push(row_idx.len());
        column.sort_by_key(|(r, _)| *r);
        for &(r, v) in column.iter() {
            row_idx.push(r);
            values.push(v);
        }
    }
    col_ptr.push(row_idx.len());
    let a_mat = CscMatrix::new(n_con_rows, n_var, col_ptr, row_idx, values);

    let mut diag = vec![0.0; n_var];
    for &(col, p) in &problem.objective.quadratic {
        if let Some(entry) = diag.get_mut(col) {
            *entry += p;
        }
    }
    let mut p_col_ptr = vec![0usize];
    let mut p_row_idx = Vec::new();
    let mut p_values = Vec::new();
    for (col, &p) in diag.iter().enumerate() {
        if p != 0.0 {
            p_row_idx.push(col);
            p_values.push(p);
        }
        p_col_ptr.push(p_row_idx.len());
    }
    let p_mat = CscMatrix::new(n_var, n_var, p_col_ptr, p_row_idx, p_values);

    let mut obj = vec![0.0f64; n_var];
    for &(col, q) in &problem.objective.linear {
        if let Some(entry) = obj.get_mut(col) {
            *entry += q;
        }
    }

    let settings = DefaultSettingsBuilder::default()
        .verbose(false)
        .tol_feas(tolerances.feastol)
        .tol_gap_abs(tolerances.opttol)
        .tol_gap_rel(tolerances.opttol)
        .tol_ktratio(tolerances.barconvtol)
        .tol_infeas_abs(tolerances.feasibility_tol)
        .tol_infeas_rel(tolerances.feasibility_tol)
        .build()
        .map_err(|e| SolverError::Setup(format!("Clarabel settings error: {:?}", e)))?;

    let mut solver =
        clarabel::solver::DefaultSolver::new(&p_mat, &obj, &a_mat, &rhs, &cones, settings)
            .map_err(|e| SolverError::Setup(format!("Clarabel initialization failed: {:?}", e)))?;

    solver.solve();

    let sol = solver.solution;
    match sol.status {
        SolverStatus::Solved | SolverStatus::AlmostSolved => {}
        SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
            return Err(SolverError::Infeasible(format!("{:?}", sol.status)));
        }
        SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
            return Err(SolverError::Unbounded(format!("{:?}", sol.status)));
        }
        other => return Err(SolverError::Numerical(format!("Clarabel status {:?}", other))),
    }

    Ok(ConicSolution {
        objective: problem.objective.value(&sol.x),
        row_duals: sol.z[..n_linear].to_vec(),
        x: sol.x,
        iterations: sol.iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relaxation::rows::AffineExpr;

    #[test]
    fn small_lp() {
        // min x0 + 2 x1  s.t. x0 + x1 = 1, x0 ≤ 0.25, x ≥ 0
        let problem = ConicProblem {
            n_vars: 2,
            objective: Objective {
                quadratic: vec![],
                linear: vec![(0, 1.0), (1, 2.0)],
                constant: 3.0,
            },
            rows: vec![
                LinearRow::eq("sum", vec![(0, 1.0), (1, 1.0)], 1.0),
                LinearRow::le("cap", vec![(0, 1.0)], 0.25),
                LinearRow::le("x0pos", vec![(0, -1.0)], 0.0),
                LinearRow::le("x1pos", vec![(1, -1.0)], 0.0),
            ],
            cones: vec![],
        };
        let sol = solve_conic(&problem, &SolverTolerances::default()).unwrap();
        assert!((sol.x[0] - 0.25).abs() < 1e-5);
        assert!((sol.objective - (3.0 + 0.25 + 1.5)).abs() < 1e-4);
        // the capacity row binds and carries a positive dual
        assert!(sol.row_duals[1] > 1e-3);
        assert_eq!(sol.row_duals.len(), 4);
    }

    #[test]
    fn cone_is_respected() {
        // max x0 + x1 s.t. ‖(x0, x1)‖ ≤ 1
        let problem = ConicProblem {
            n_vars: 2,
            objective: Objective {
                quadratic: vec![],
                linear: vec![(0, -1.0), (1, -1.0)],
                constant: 0.0,
            },
            rows: vec![],
            cones: vec![ConeConstraint {
                name: "disk".into(),
                u: AffineExpr::constant(1.0),
                w: vec![
                    AffineExpr::new(vec![(0, 1.0)], 0.0),
                    AffineExpr::new(vec![(1, 1.0)], 0.0),
                ],
            }],
        };
        let sol = solve_conic(&problem, &SolverTolerances::default()).unwrap();
        let half_sqrt2 = std::f64::consts::FRAC_1_SQRT_2;
        assert!((sol.x[0] - half_sqrt2).abs() < 1e-4);
        assert!((sol.objective + 2.0 * half_sqrt2).abs() < 1e-4);
    }

    #[test]
    fn infeasible_is_reported() {
        let problem = ConicProblem {
            n_vars: 1,
            objective: Objective {
                quadratic: vec![],
                linear: vec![(0, 1.0)],
                constant: 0.0,
            },
            rows: vec![
                LinearRow::le("up", vec![(0, 1.0)], -1.0),
                LinearRow::le("lo", vec![(0, -1.0)], -1.0),
            ],
            cones: vec![],
        };
        let err = solve_conic(&problem, &SolverTolerances::default()).unwrap_err();
        assert!(matches!(err, SolverError::Infeasible(_)));
        let err: MtpError = err.into();
        assert!(!err.is_fatal_at_start());
    }
}
