//! MATPOWER .m file parser
//!
//! Reads the scalar `mpc.baseMVA` and the `mpc.bus`, `mpc.gen`, `mpc.branch`
//! and `mpc.gencost` matrices. Other assignments (`mpc.areas`, `mpc.bus_name`,
//! functions) are skipped.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

use crate::helpers::{safe_f64_to_i32, safe_f64_to_usize};

/// Parsed MATPOWER case data
#[derive(Debug, Default)]
pub struct MatpowerCase {
    pub base_mva: f64,
    pub bus: Vec<MatpowerBus>,
    pub gen: Vec<MatpowerGen>,
    pub branch: Vec<MatpowerBranch>,
    pub gencost: Vec<MatpowerGenCost>,
}

/// One row of `mpc.bus`
#[derive(Debug, Clone)]
pub struct MatpowerBus {
    pub bus_i: usize,
    pub bus_type: i32,
    pub pd: f64,
    pub qd: f64,
    pub gs: f64,
    pub bs: f64,
    pub vm: f64,
    pub base_kv: f64,
    pub vmax: f64,
    pub vmin: f64,
}

/// One row of `mpc.gen`
#[derive(Debug, Clone)]
pub struct MatpowerGen {
    pub gen_bus: usize,
    pub qmax: f64,
    pub qmin: f64,
    pub gen_status: i32,
    pub pmax: f64,
    pub pmin: f64,
}

/// One row of `mpc.branch`
#[derive(Debug, Clone)]
pub struct MatpowerBranch {
    pub f_bus: usize,
    pub t_bus: usize,
    pub br_r: f64,
    pub br_x: f64,
    pub br_b: f64,
    pub rate_a: f64,
    pub tap: f64,
    pub shift: f64,
    pub br_status: i32,
    pub angmin: f64,
    pub angmax: f64,
}

/// One row of `mpc.gencost`
#[derive(Debug, Clone)]
pub struct MatpowerGenCost {
    pub model: i32,
    pub ncost: usize,
    pub cost: Vec<f64>,
}

pub fn parse_matpower_file(path: &Path) -> Result<MatpowerCase> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading MATPOWER file: {}", path.display()))?;
    parse_matpower_string(&content)
        .with_context(|| format!("parsing MATPOWER file: {}", path.display()))
}

/// Parse MATPOWER content from a string in a single pass.
pub fn parse_matpower_string(content: &str) -> Result<MatpowerCase> {
    let mut case = MatpowerCase {
        base_mva: 100.0,
        ..MatpowerCase::default()
    };

    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        let trimmed = strip_comment(line).trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with("mpc.baseMVA") && trimmed.contains('=') {
            case.base_mva = extract_inline_scalar(trimmed)
                .ok_or_else(|| anyhow!("malformed mpc.baseMVA line: {}", trimmed))?;
        } else if is_matrix_start(trimmed, "mpc.bus") {
            case.bus = parse_section(trimmed, &mut lines, 13, "bus", parse_bus_row)?;
        } else if is_matrix_start(trimmed, "mpc.gencost") {
            case.gencost = parse_section(trimmed, &mut lines, 4, "gencost", parse_gencost_row)?;
        } else if is_matrix_start(trimmed, "mpc.gen") {
            case.gen = parse_section(trimmed, &mut lines, 10, "gen", parse_gen_row)?;
        } else if is_matrix_start(trimmed, "mpc.branch") {
            case.branch = parse_section(trimmed, &mut lines, 11, "branch", parse_branch_row)?;
        }
    }

    if case.bus.is_empty() {
        return Err(anyhow!("mpc.bus matrix not found"));
    }
    if !(case.base_mva > 0.0) {
        return Err(anyhow!("mpc.baseMVA must be positive, got {}", case.base_mva));
    }

    Ok(case)
}

/// `mpc.bus = [` but not `mpc.bus_name = {`
fn is_matrix_start(line: &str, name: &str) -> bool {
    line.strip_prefix(name)
        .map(|rest| {
            let rest = rest.trim_start();
            rest.starts_with('=') && rest.contains('[')
        })
        .unwrap_or(false)
}

fn strip_comment(line: &str) -> &str {
    match line.find('%') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Extract scalar value from a single line (e.g., "mpc.baseMVA = 100.0;")
fn extract_inline_scalar(line: &str) -> Option<f64> {
    line.split('=')
        .nth(1)
        .and_then(|v| v.trim().trim_end_matches(';').trim().parse().ok())
}

/// Parse a row of numeric values from MATPOWER format
fn parse_row(line: &str) -> Result<Vec<f64>> {
    line.split(|c: char| c.is_whitespace() || c == ';' || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| anyhow!("malformed number '{}'", s))
        })
        .collect()
}

/// Consume one `mpc.<name> = [ ... ];` matrix, starting at its header line.
fn parse_section<'a, T>(
    header: &str,
    lines: &mut impl Iterator<Item = &'a str>,
    min_cols: usize,
    name: &str,
    parse_fn: fn(&[f64], usize) -> Result<T>,
) -> Result<Vec<T>> {
    let mut rows = Vec::new();
    let mut row_idx = 0;

    let mut push = |data: &str, rows: &mut Vec<T>| -> Result<()> {
        let data = data
            .trim()
            .trim_end_matches(|c: char| c == ']' || c == ';')
            .trim();
        if data.is_empty() {
            return Ok(());
        }
        let values =
            parse_row(data).with_context(|| format!("mpc.{} row {}", name, row_idx + 1))?;
        if values.len() < min_cols {
            return Err(anyhow!(
                "mpc.{} row {} has {} columns, expected at least {}",
                name,
                row_idx + 1,
                values.len(),
                min_cols
            ));
        }
        rows.push(parse_fn(&values, row_idx)?);
        row_idx += 1;
        Ok(())
    };

    if let Some(after_bracket) = header.split_once('[').map(|(_, rest)| rest) {
        push(after_bracket, &mut rows)?;
        if header.contains(']') {
            return Ok(rows);
        }
    }

    for line in lines {
        let trimmed = strip_comment(line).trim();
        if trimmed.is_empty() {
            continue;
        }
        let done = trimmed.contains(']');
        push(trimmed, &mut rows)?;
        if done {
            return Ok(rows);
        }
    }
    Err(anyhow!("mpc.{} matrix is not terminated", name))
}

fn parse_bus_row(values: &[f64], row_idx: usize) -> Result<MatpowerBus> {
    Ok(MatpowerBus {
        bus_i: safe_f64_to_usize(values[0])
            .with_context(|| format!("invalid bus_i at row {}", row_idx))?,
        bus_type: safe_f64_to_i32(values[1])
            .with_context(|| format!("invalid bus_type at row {}", row_idx))?,
        pd: values[2],
        qd: values[3],
        gs: values[4],
        bs: values[5],
        vm: values[7],
        base_kv: values[9],
        vmax: values[11],
        vmin: values[12],
    })
}

fn parse_gen_row(values: &[f64], row_idx: usize) -> Result<MatpowerGen> {
    Ok(MatpowerGen {
        gen_bus: safe_f64_to_usize(values[0])
            .with_context(|| format!("invalid gen_bus at row {}", row_idx))?,
        qmax: values[3],
        qmin: values[4],
        gen_status: safe_f64_to_i32(values[7])
            .with_context(|| format!("invalid gen_status at row {}", row_idx))?,
        pmax: values[8],
        pmin: values[9],
    })
}

fn parse_branch_row(values: &[f64], row_idx: usize) -> Result<MatpowerBranch> {
    // angmin/angmax are optional in old-format cases
    Ok(MatpowerBranch {
        f_bus: safe_f64_to_usize(values[0])
            .with_context(|| format!("invalid f_bus at row {}", row_idx))?,
        t_bus: safe_f64_to_usize(values[1])
            .with_context(|| format!("invalid t_bus at row {}", row_idx))?,
        br_r: values[2],
        br_x: values[3],
        br_b: values[4],
        rate_a: values[5],
        tap: values[8],
        shift: values[9],
        br_status: safe_f64_to_i32(values[10])
            .with_context(|| format!("invalid br_status at row {}", row_idx))?,
        angmin: values.get(11).copied().unwrap_or(-360.0),
        angmax: values.get(12).copied().unwrap_or(360.0),
    })
}

fn parse_gencost_row(values: &[f64], row_idx: usize) -> Result<MatpowerGenCost> {
    let ncost = safe_f64_to_usize(values[3])
        .with_context(|| format!("invalid ncost at row {}", row_idx))?;
    let model = safe_f64_to_i32(values[0])
        .with_context(|| format!("invalid cost model at row {}", row_idx))?;
    let width = if model == 1 { 2 * ncost } else { ncost };
    let cost: Vec<f64> = values[4..].iter().take(width).copied().collect();
    if cost.len() < width {
        return Err(anyhow!(
            "gencost row {} declares {} coefficients but has {}",
            row_idx,
            width,
            cost.len()
        ));
    }
    Ok(MatpowerGenCost { model, ncost, cost })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CASE3: &str = r#"
function mpc = case3
mpc.version = '2';
mpc.baseMVA = 100;
%% bus data
mpc.bus = [
	1	3	0	0	0	0	1	1	0	345	1	1.1	0.9;
	2	2	0	0	0	0	1	1	0	345	1	1.1	0.9;
	3	1	90	30	0	0	1	1	0	345	1	1.1	0.9;
];
mpc.gen = [
	1	0	0	300	-300	1	100	1	250	10	0	0	0	0	0	0	0	0	0	0	0;
	2	163	0	300	-300	1	100	0	300	10	0	0	0	0	0	0	0	0	0	0	0;
];
mpc.branch = [
	1	2	0.01	0.1	0.02	250	250	250	0	0	1	-360	360;
	2	3	0.02	0.2	0.04	0	250	250	0	0	1	-360	360;
];
mpc.gencost = [
	2	0	0	3	0.11	5	150;
	2	0	0	3	0.085	1.2	600;
];
"#;

    #[test]
    fn parses_all_sections() {
        let case = parse_matpower_string(CASE3).unwrap();
        assert_eq!(case.base_mva, 100.0);
        assert_eq!(case.bus.len(), 3);
        assert_eq!(case.gen.len(), 2);
        assert_eq!(case.branch.len(), 2);
        assert_eq!(case.gencost.len(), 2);
        assert_eq!(case.bus[2].pd, 90.0);
        assert_eq!(case.gen[1].gen_status, 0);
        assert_eq!(case.gencost[0].cost, vec![0.11, 5.0, 150.0]);
    }

    #[test]
    fn missing_bus_matrix_is_error() {
        let err = parse_matpower_string("mpc.baseMVA = 100;\n").unwrap_err();
        assert!(err.to_string().contains("mpc.bus"));
    }

    #[test]
    fn malformed_number_is_error() {
        let content = "mpc.bus = [\n 1 3 0 0 0 0 1 1 0 345 1 1.1 x;\n];\n";
        let err = parse_matpower_string(content).unwrap_err();
        assert!(format!("{err:#}").contains("malformed number"));
    }

    #[test]
    fn unterminated_matrix_is_error() {
        let content = "mpc.bus = [\n 1 3 0 0 0 0 1 1 0 345 1 1.1 0.9;\n";
        assert!(parse_matpower_string(content).is_err());
    }

    #[test]
    fn single_line_matrix() {
        let content = "mpc.bus = [1 3 0 0 0 0 1 1 0 345 1 1.1 0.9];\n";
        let case = parse_matpower_string(content).unwrap();
        assert_eq!(case.bus.len(), 1);
    }
}
