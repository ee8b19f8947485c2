//! Multi-period loads and ramp-rate files.
//!
//! Loads file, one line per (period, bus):
//!
//! ```text
//! # t bus pd_mw qd_mvar
//! 0 5 90.000000 30.000000
//! 1 5 92.314000 30.771333
//! END
//! ```
//!
//! Ramp file, one line per generator; `gen` is the 1-based row of `mpc.gen`
//! and the ramp-down limit defaults to the ramp-up limit:
//!
//! ```text
//! # gen ramp_up_mw [ramp_down_mw]
//! 1 25.0
//! 2 40.0 35.0
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use mtpcut_core::{BusId, GenId, MtpError, MtpResult};

use crate::config::CutplaneConfig;
use crate::helpers::{parse_f64_token, parse_index_token};

/// Load of one bus in one period, in MW / Mvar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BusLoad {
    pub pd_mw: f64,
    pub qd_mvar: f64,
}

/// Per-bus load for every period `0..periods`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadSeries {
    pub periods: usize,
    pub by_bus: BTreeMap<BusId, Vec<BusLoad>>,
}

impl LoadSeries {
    pub fn load(&self, bus: BusId, t: usize) -> Option<BusLoad> {
        self.by_bus.get(&bus).and_then(|series| series.get(t)).copied()
    }

    /// Total active load of period `t` (MW).
    pub fn total_pd(&self, t: usize) -> f64 {
        self.by_bus
            .values()
            .filter_map(|series| series.get(t))
            .map(|l| l.pd_mw)
            .sum()
    }

    /// Text form written by [`write_loads_file`].
    pub fn to_text(&self) -> String {
        let mut out = String::from("# t bus pd_mw qd_mvar\n");
        for t in 0..self.periods {
            for (bus, series) in &self.by_bus {
                if let Some(load) = series.get(t) {
                    let _ = writeln!(
                        out,
                        "{} {} {:.6} {:.6}",
                        t,
                        bus.value(),
                        load.pd_mw,
                        load.qd_mvar
                    );
                }
            }
        }
        out.push_str("END\n");
        out
    }
}

/// Up/down ramp limit of a generator between consecutive periods (MW).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampLimit {
    pub up_mw: f64,
    pub down_mw: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RampRates {
    pub by_gen: BTreeMap<GenId, RampLimit>,
}

/// `<loadsdir>/<case>_mtploads_<T>_<suffix>.txt`
pub fn loads_path(config: &CutplaneConfig) -> PathBuf {
    config.loads_dir.join(format!(
        "{}_mtploads_{}_{}.txt",
        config.case_name,
        config.periods,
        config.policy.file_suffix()
    ))
}

/// `<rampdir>/<case>_rampr_<T>.txt`
pub fn ramp_path(config: &CutplaneConfig) -> PathBuf {
    config
        .ramp_dir
        .join(format!("{}_rampr_{}.txt", config.case_name, config.periods))
}

fn data_lines(content: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.split_whitespace().collect::<Vec<_>>()))
        .take_while(|(_, tokens)| tokens.first() != Some(&"END"))
        .filter(|(_, tokens)| {
            tokens
                .first()
                .map(|t| !t.starts_with('#') && !t.starts_with('%'))
                .unwrap_or(false)
        })
}

pub fn parse_loads(content: &str, periods: usize) -> Result<LoadSeries> {
    let mut raw: BTreeMap<BusId, Vec<Option<BusLoad>>> = BTreeMap::new();
    for (line, tokens) in data_lines(content) {
        if tokens.len() < 4 {
            return Err(anyhow!("line {}: expected 't bus pd qd'", line));
        }
        let t = parse_index_token(tokens[0], "period").with_context(|| format!("line {line}"))?;
        let bus = parse_index_token(tokens[1], "bus").with_context(|| format!("line {line}"))?;
        let pd_mw = parse_f64_token(tokens[2], "pd").with_context(|| format!("line {line}"))?;
        let qd_mvar = parse_f64_token(tokens[3], "qd").with_context(|| format!("line {line}"))?;
        if t >= periods {
            // files generated for a longer horizon are usable
            continue;
        }
        let slot = raw
            .entry(BusId::new(bus))
            .or_insert_with(|| vec![None; periods]);
        if slot[t].is_some() {
            return Err(anyhow!("line {}: duplicate entry for bus {} period {}", line, bus, t));
        }
        slot[t] = Some(BusLoad { pd_mw, qd_mvar });
    }

    let mut by_bus = BTreeMap::new();
    for (bus, series) in raw {
        let complete: Option<Vec<BusLoad>> = series.iter().copied().collect();
        let complete = complete.ok_or_else(|| {
            let missing = series.iter().position(Option::is_none).unwrap_or(0);
            anyhow!("bus {} has no load for period {}", bus.value(), missing)
        })?;
        by_bus.insert(bus, complete);
    }
    Ok(LoadSeries { periods, by_bus })
}

pub fn parse_ramps(content: &str) -> Result<RampRates> {
    let mut by_gen = BTreeMap::new();
    for (line, tokens) in data_lines(content) {
        if tokens.len() < 2 {
            return Err(anyhow!("line {}: expected 'gen ramp_up [ramp_down]'", line));
        }
        let row = parse_index_token(tokens[0], "generator").with_context(|| format!("line {line}"))?;
        if row == 0 {
            return Err(anyhow!("line {}: generator rows are 1-based", line));
        }
        let up_mw = parse_f64_token(tokens[1], "ramp_up").with_context(|| format!("line {line}"))?;
        let down_mw = match tokens.get(2) {
            Some(tok) => parse_f64_token(tok, "ramp_down").with_context(|| format!("line {line}"))?,
            None => up_mw,
        };
        if up_mw < 0.0 || down_mw < 0.0 {
            return Err(anyhow!("line {}: negative ramp limit", line));
        }
        by_gen.insert(GenId::new(row - 1), RampLimit { up_mw, down_mw });
    }
    Ok(RampRates { by_gen })
}

/// Read a loads file; any failure is a [`MtpError::Scenario`].
pub fn read_loads_file(path: &Path, periods: usize) -> MtpResult<LoadSeries> {
    fs::read_to_string(path)
        .with_context(|| format!("reading loads file {}", path.display()))
        .and_then(|content| {
            parse_loads(&content, periods)
                .with_context(|| format!("parsing loads file {}", path.display()))
        })
        .map_err(|e| MtpError::Scenario(format!("{e:#}")))
}

/// Read a ramp-rate file; any failure is a [`MtpError::Scenario`].
pub fn read_ramp_file(path: &Path) -> MtpResult<RampRates> {
    fs::read_to_string(path)
        .with_context(|| format!("reading ramp file {}", path.display()))
        .and_then(|content| {
            parse_ramps(&content).with_context(|| format!("parsing ramp file {}", path.display()))
        })
        .map_err(|e| MtpError::Scenario(format!("{e:#}")))
}

pub fn write_loads_file(path: &Path, loads: &LoadSeries) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    fs::write(path, loads.to_text())
        .with_context(|| format!("writing loads file {}", path.display()))
}
