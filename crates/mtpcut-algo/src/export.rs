//! Write-only outputs: LP dumps, solutions, cuts and the run report.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cuts::CutPools;
use crate::relaxation::grid::Grid;
use crate::relaxation::rows::{AffineExpr, RowSense};
use crate::relaxation::solver::ConicProblem;
use crate::relaxation::vars::VarIndex;

/// File names derived from the case name and the number of periods.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub sols_dir: PathBuf,
    pub case_name: String,
    pub periods: usize,
}

impl OutputPaths {
    fn stem(&self) -> String {
        format!("{}_{}", self.case_name, self.periods)
    }

    pub fn solution(&self) -> PathBuf {
        self.sols_dir.join(format!("{}.sol", self.stem()))
    }

    pub fn ac_solution(&self) -> PathBuf {
        self.sols_dir.join(format!("ACsol_{}.txt", self.stem()))
    }

    pub fn cuts(&self) -> PathBuf {
        self.sols_dir.join(format!("cuts_{}.txt", self.stem()))
    }

    pub fn report(&self) -> PathBuf {
        self.sols_dir.join(format!("report_{}.json", self.stem()))
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory '{}'", parent.display()))?;
    }
    Ok(())
}

fn write_text(path: &Path, content: &str) -> Result<()> {
    create_parent(path)?;
    fs::write(path, content).with_context(|| format!("writing '{}'", path.display()))
}

fn push_terms(out: &mut String, terms: &[(usize, f64)], name: &dyn Fn(usize) -> String) {
    if terms.is_empty() {
        out.push_str(" 0");
        return;
    }
    for &(col, a) in terms {
        let sign = if a < 0.0 { '-' } else { '+' };
        let _ = write!(out, " {} {} {}", sign, a.abs(), name(col));
    }
}

/// CPLEX LP text of a conic problem.
///
/// Each cone `‖w‖ ≤ u` is written with auxiliary columns `u_i`, `w_i_j`
/// defined by equalities and a quadratic row `w_i_0² + … − u_i² ≤ 0` with
/// `u_i ≥ 0`.
pub fn lp_text(problem: &ConicProblem, vars: &VarIndex, title: &str) -> String {
    let name = |col: usize| vars.name(col);
    let mut out = String::new();
    let _ = writeln!(out, "\\ {title}");
    if problem.objective.constant != 0.0 {
        let _ = writeln!(out, "\\ objective constant {}", problem.objective.constant);
    }

    out.push_str("Minimize\n obj:");
    push_terms(&mut out, &problem.objective.linear, &name);
    if !problem.objective.quadratic.is_empty() {
        out.push_str(" + [");
        for (i, &(col, p)) in problem.objective.quadratic.iter().enumerate() {
            let sign = if p < 0.0 { '-' } else { '+' };
            if i == 0 && p >= 0.0 {
                let _ = write!(out, " {} {} ^2", p, name(col));
            } else {
                let _ = write!(out, " {} {} {} ^2", sign, p.abs(), name(col));
            }
        }
        out.push_str(" ] / 2");
    }
    out.push_str("\nSubject To\n");

    for row in &problem.rows {
        let _ = write!(out, " {}:", row.name);
        push_terms(&mut out, &row.coeffs, &name);
        let sense = match row.sense {
            RowSense::Eq => "=",
            RowSense::Le => "<=",
        };
        let _ = writeln!(out, " {} {}", sense, row.rhs);
    }

    let mut aux_nonneg = Vec::new();
    let mut aux_free = Vec::new();
    for (i, cone) in problem.cones.iter().enumerate() {
        let u_name = format!("u_{i}");
        let def = |out: &mut String, aux: &str, expr: &AffineExpr| {
            let _ = write!(out, " {}_{}: {}", cone.name, aux, aux);
            let negated: Vec<(usize, f64)> = expr.terms.iter().map(|&(c, a)| (c, -a)).collect();
            if !negated.is_empty() {
                push_terms(out, &negated, &name);
            }
            let _ = writeln!(out, " = {}", expr.constant);
        };
        def(&mut out, &u_name, &cone.u);
        let mut quad = String::new();
        for (j, w) in cone.w.iter().enumerate() {
            let w_name = format!("w_{i}_{j}");
            def(&mut out, &w_name, w);
            let _ = write!(quad, " + {w_name} ^2");
            aux_free.push(w_name);
        }
        let _ = writeln!(out, " {}: [{} - {} ^2 ] <= 0", cone.name, quad, u_name);
        aux_nonneg.push(u_name);
    }

    out.push_str("Bounds\n");
    for col in 0..problem.n_vars {
        let _ = writeln!(out, " {} free", vars.name(col));
    }
    for aux in &aux_free {
        let _ = writeln!(out, " {aux} free");
    }
    for aux in &aux_nonneg {
        let _ = writeln!(out, " {aux} >= 0");
    }
    out.push_str("End\n");
    out
}

pub fn write_lp(path: &Path, problem: &ConicProblem, vars: &VarIndex, title: &str) -> Result<()> {
    write_text(path, &lp_text(problem, vars, title))
}

/// `name value` per column.
pub fn write_solution(path: &Path, vars: &VarIndex, x: &[f64], objective: f64) -> Result<()> {
    let mut out = String::new();
    let _ = writeln!(out, "objvalue {objective}");
    for (col, value) in x.iter().enumerate() {
        let _ = writeln!(out, "{} {}", vars.name(col), value);
    }
    write_text(path, &out)
}

/// AMPL `param` tables: voltage magnitude per bus and generator output in
/// MW / Mvar, one row per period.
pub fn write_ac_solution(path: &Path, grid: &Grid, vars: &VarIndex, x: &[f64]) -> Result<()> {
    let at = |col: usize| x.get(col).copied().unwrap_or(0.0);
    let mut out = String::new();
    let _ = writeln!(out, "# {} T={}", grid.name, grid.periods);
    out.push_str("param: vm :=\n");
    for t in 0..grid.periods {
        for (k, bus) in grid.buses.iter().enumerate() {
            let vm = at(vars.v(t, k)).max(0.0).sqrt();
            let _ = writeln!(out, "{} {} {:.8}", t, bus.id.value(), vm);
        }
    }
    out.push_str(";\nparam: Pg Qg :=\n");
    for t in 0..grid.periods {
        for (g, gen) in grid.gens.iter().enumerate() {
            let _ = writeln!(
                out,
                "{} {} {:.6} {:.6}",
                t,
                gen.id.value() + 1,
                at(vars.pg(t, g)) * grid.base_mva,
                at(vars.qg(t, g)) * grid.base_mva
            );
        }
    }
    out.push_str(";\n");
    write_text(path, &out)
}

/// One line per cut still in a pool.
pub fn write_cuts(path: &Path, pools: &CutPools, vars: &VarIndex) -> Result<()> {
    let name = |col: usize| vars.name(col);
    let mut out = String::from("# family id period branch side created last_active : row\n");
    for pool in pools.iter() {
        for cut in pool.iter() {
            let side = match cut.instance.side {
                crate::cuts::BranchEnd::From => "from",
                crate::cuts::BranchEnd::To => "to",
            };
            let _ = write!(
                out,
                "{} {} {} {} {} {} {} :",
                cut.family,
                cut.id,
                cut.instance.period,
                cut.instance.branch,
                side,
                cut.created_at,
                cut.last_active
            );
            push_terms(&mut out, &cut.coeffs, &name);
            let _ = writeln!(out, " <= {}", cut.rhs);
        }
    }
    write_text(path, &out)
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    create_parent(path)?;
    let file = fs::File::create(path)
        .with_context(|| format!("creating '{}'", path.display()))?;
    serde_json::to_writer_pretty(file, value)
        .with_context(|| format!("writing '{}'", path.display()))?;
    Ok(())
}
