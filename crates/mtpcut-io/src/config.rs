//! Run configuration.
//!
//! The configuration file is a sequence of whitespace-separated lines. The
//! first token of a line is a key from [`ConfigKey`]; flag keys stand alone,
//! value keys take exactly one value. A line holding `END` stops parsing.
//! Blank lines and lines starting with `#` are skipped.
//!
//! ```text
//! casefilename ../data/case9.m
//! jabrcuts
//! most_violated_fraction_jabr 0.5
//! T 3
//! uniform5
//! uniform_drift 0.03
//! END
//! ```
//!
//! The file is resolved once into an immutable [`CutplaneConfig`]. Unknown
//! keys, missing values and out-of-range values are [`ConfigError`]s.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use mtpcut_core::{CutFamily, MtpError};
use serde::Serialize;
use thiserror::Error;

use crate::importers::case_name;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot open config file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("illegal input {token} at line {line}")]
    IllegalInput { line: usize, token: String },

    #[error("line {line}: key {key} requires a value")]
    MissingValue { line: usize, key: &'static str },

    #[error("line {line}: invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        line: usize,
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("casefilename is not set")]
    MissingCaseFile,
}

impl From<ConfigError> for MtpError {
    fn from(err: ConfigError) -> Self {
        MtpError::Config(err.to_string())
    }
}

/// Token that is not a recognized configuration key.
#[derive(Debug, Error)]
#[error("unknown configuration key '{0}'")]
pub struct UnknownKey(pub String);

macro_rules! config_keys {
    ($($variant:ident => $token:literal : $kind:ident),* $(,)?) => {
        /// Every key accepted in a configuration file.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ConfigKey {
            $($variant),*
        }

        impl ConfigKey {
            pub const ALL: &'static [ConfigKey] = &[$(ConfigKey::$variant),*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(ConfigKey::$variant => $token),*
                }
            }

            /// Whether the key is followed by a value token.
            pub fn takes_value(self) -> bool {
                match self {
                    $(ConfigKey::$variant => config_keys!(@kind $kind)),*
                }
            }
        }

        impl FromStr for ConfigKey {
            type Err = UnknownKey;

            fn from_str(token: &str) -> Result<Self, Self::Err> {
                match token {
                    $($token => Ok(ConfigKey::$variant),)*
                    other => Err(UnknownKey(other.to_string())),
                }
            }
        }
    };
    (@kind flag) => { false };
    (@kind value) => { true };
}

config_keys! {
    CaseFilename => "casefilename": value,
    LpFilename => "lpfilename": value,
    LpFilenameCuts => "lpfilename_cuts": value,
    JabrCuts => "jabrcuts": flag,
    I2Cuts => "i2cuts": flag,
    LimitCuts => "limitcuts": flag,
    LossCuts => "losscuts": flag,
    JabrInequalities => "jabr_inequalities": flag,
    I2Inequalities => "i2_inequalities": flag,
    LimitInequalities => "limit_inequalities": flag,
    LossInequalities => "loss_inequalities": flag,
    I2 => "i2": flag,
    Threshold => "threshold": value,
    ThresholdI2 => "threshold_i2": value,
    ThresholdLimit => "threshold_limit": value,
    ThresholdDotprod => "threshold_dotprod": value,
    ThresholdObjcuts => "threshold_objcuts": value,
    Tolerance => "tolerance": value,
    FractionJabr => "most_violated_fraction_jabr": value,
    FractionI2 => "most_violated_fraction_i2": value,
    FractionLimit => "most_violated_fraction_limit": value,
    FractionLoss => "most_violated_fraction_loss": value,
    DropJabr => "dropjabr": flag,
    DropI2 => "dropi2": flag,
    DropLimit => "droplimit": flag,
    DropLoss => "droploss": flag,
    CutAgeLimit => "cut_age_limit": value,
    MaxRounds => "max_rounds": value,
    MaxTime => "max_time": value,
    Ftol => "ftol": value,
    FtolIterates => "ftol_iterates": value,
    AddCuts => "addcuts": flag,
    FromScratch => "fromscratch": flag,
    LinearObjective => "linear_objective": flag,
    ObjectiveCuts => "objective_cuts": flag,
    PrimalBound => "primal_bound": value,
    FeasibilityTol => "FeasibilityTol": value,
    Feastol => "feastol": value,
    Opttol => "opttol": value,
    Barconvtol => "barconvtol": value,
    GetDuals => "getduals": flag,
    WriteLps => "writelps": flag,
    WriteLastLp => "writelastLP": flag,
    WriteSol => "writesol": flag,
    WriteAcSol => "writeACsol": flag,
    WriteCuts => "writecuts": flag,
    LoudCuts => "loud_cuts": flag,
    CutAnalysis => "cut_analysis": flag,
    Periods => "T": value,
    Nperturb => "nperturb": value,
    Uniform => "uniform": flag,
    Uniform2 => "uniform2": flag,
    Uniform3 => "uniform3": flag,
    Uniform4 => "uniform4": flag,
    Uniform5 => "uniform5": flag,
    Uniform6 => "uniform6": flag,
    Arpae => "arpae": flag,
    Arpae2 => "arpae2": flag,
    PglibReverse => "pglib_reverse": flag,
    UniformDrift => "uniform_drift": value,
    LoadsDir => "loadsdir": value,
    RampDir => "rampdir": value,
    GenerateLoads => "generate_loads": flag,
    Seed => "seed": value,
    RampFraction => "ramp_fraction": value,
    // Accepted for compatibility; the features behind them are not part of
    // this tool and only produce a warning.
    SolverMethod => "solver_method": value,
    Crossover => "crossover": value,
    RhoThreshold => "rho_threshold": value,
    FixTolerance => "fix_tolerance": value,
    Dographics => "dographics": flag,
    Obbt => "obbt": flag,
    Hybrid => "hybrid": flag,
    Mincut => "mincut": flag,
    MincutReactive => "mincut_reactive": flag,
    MincutSwitch => "mincut_switch": flag,
    FixFlows => "fixflows": flag,
    FixCs => "fixcs": flag,
    AmplSol => "ampl_sol": flag,
    GetSol => "getsol": flag,
    JabrValidity => "jabr_validity": flag,
    I2Validity => "i2_validity": flag,
    LossValidity => "loss_validity": flag,
    LimitValidity => "limit_validity": flag,
    End => "END": flag,
}

impl ConfigKey {
    /// Keys that are parsed and then ignored with a warning.
    pub fn is_unsupported(self) -> bool {
        matches!(
            self,
            ConfigKey::SolverMethod
                | ConfigKey::Crossover
                | ConfigKey::RhoThreshold
                | ConfigKey::FixTolerance
                | ConfigKey::Dographics
                | ConfigKey::Obbt
                | ConfigKey::Hybrid
                | ConfigKey::Mincut
                | ConfigKey::MincutReactive
                | ConfigKey::MincutSwitch
                | ConfigKey::FixFlows
                | ConfigKey::FixCs
                | ConfigKey::AmplSol
                | ConfigKey::GetSol
                | ConfigKey::JabrValidity
                | ConfigKey::I2Validity
                | ConfigKey::LossValidity
                | ConfigKey::LimitValidity
        )
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load perturbation policy used to build the T periods.
///
/// Exactly one policy is active. When several policy keys appear in a file
/// the last one wins; `nperturb` selects the Gaussian policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioPolicy {
    Gaussian { magnitude: f64 },
    Uniform { drift: f64 },
    Uniform2 { drift: f64 },
    Uniform3 { drift: f64 },
    Uniform4 { drift: f64 },
    Uniform5 { drift: f64 },
    Uniform6 { drift: f64 },
    Arpae,
    Arpae2,
    PglibReverse { drift: f64 },
}

impl ScenarioPolicy {
    /// Name used in logs (`gaussian`, `uniform_0.02`, `uniform5`, ...).
    pub fn name(&self) -> String {
        match self {
            ScenarioPolicy::Gaussian { .. } => "gaussian".to_string(),
            ScenarioPolicy::Uniform { drift } => format!("uniform_{drift}"),
            ScenarioPolicy::Uniform2 { .. } => "uniform2".to_string(),
            ScenarioPolicy::Uniform3 { .. } => "uniform3".to_string(),
            ScenarioPolicy::Uniform4 { .. } => "uniform4".to_string(),
            ScenarioPolicy::Uniform5 { .. } => "uniform5".to_string(),
            ScenarioPolicy::Uniform6 { .. } => "uniform6".to_string(),
            ScenarioPolicy::Arpae => "arpae".to_string(),
            ScenarioPolicy::Arpae2 => "arpae2".to_string(),
            ScenarioPolicy::PglibReverse { .. } => "pglib_reverse".to_string(),
        }
    }

    /// Suffix of the loads file name for this policy.
    pub fn file_suffix(&self) -> String {
        match self {
            ScenarioPolicy::Gaussian { .. } => "n1".to_string(),
            ScenarioPolicy::Uniform { drift } => format!("u{drift}"),
            ScenarioPolicy::Uniform2 { .. } => "u2".to_string(),
            ScenarioPolicy::Uniform3 { .. } => "u3".to_string(),
            ScenarioPolicy::Uniform4 { .. } => "u4".to_string(),
            ScenarioPolicy::Uniform5 { drift } => format!("u5_{drift}"),
            ScenarioPolicy::Uniform6 { drift } => format!("u6_{drift}"),
            ScenarioPolicy::Arpae => "arpae".to_string(),
            ScenarioPolicy::Arpae2 => "arpae2".to_string(),
            ScenarioPolicy::PglibReverse { drift } => format!("{drift}_pglib"),
        }
    }
}

/// Selection, threshold and aging settings of one enabled cut family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FamilySettings {
    /// Share of the candidates (sorted by violation) that become cuts, in (0, 1]
    pub most_violated_fraction: f64,
    /// Violation above which an instance is a candidate
    pub threshold: f64,
    /// Drop cuts whose age exceeds `cut_age_limit`
    pub drop: bool,
}

/// Which families are also imposed exactly, as second-order cones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConicInequalities {
    pub jabr: bool,
    pub i2: bool,
    pub limit: bool,
    pub loss: bool,
}

impl ConicInequalities {
    pub fn get(&self, family: CutFamily) -> bool {
        match family {
            CutFamily::Jabr => self.jabr,
            CutFamily::I2 => self.i2,
            CutFamily::Limit => self.limit,
            CutFamily::Loss => self.loss,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SolverTolerances {
    /// Primal/dual infeasibility detection tolerance
    pub feasibility_tol: f64,
    pub feastol: f64,
    pub opttol: f64,
    pub barconvtol: f64,
}

impl Default for SolverTolerances {
    fn default() -> Self {
        Self {
            feasibility_tol: 1e-5,
            feastol: 1e-6,
            opttol: 1e-6,
            barconvtol: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutputFlags {
    pub write_lps: bool,
    pub write_last_lp: bool,
    pub write_sol: bool,
    pub write_ac_sol: bool,
    pub write_cuts: bool,
}

/// Immutable configuration of one run.
#[derive(Debug, Clone, Serialize)]
pub struct CutplaneConfig {
    pub case_file: PathBuf,
    pub case_name: String,
    pub lp_file: PathBuf,
    pub lp_file_cuts: PathBuf,

    pub jabr: Option<FamilySettings>,
    pub i2: Option<FamilySettings>,
    pub limit: Option<FamilySettings>,
    pub loss: Option<FamilySettings>,
    pub conic: ConicInequalities,
    /// Current-magnitude variables are part of the model
    pub i2_variables: bool,

    pub threshold_dotprod: Option<f64>,
    pub tolerance: f64,
    pub cut_age_limit: usize,
    pub max_rounds: usize,
    /// Wall-clock limit in seconds
    pub max_time: f64,
    pub ftol: f64,
    pub ftol_iterates: usize,
    /// Keep the model across rounds and only add/remove cut rows
    pub incremental: bool,

    pub linear_objective: bool,
    /// Threshold for objective tangent cuts, present iff they are enabled
    pub objective_cuts: Option<f64>,
    pub primal_bound: Option<f64>,
    pub solver: SolverTolerances,
    pub getduals: bool,

    pub outputs: OutputFlags,
    pub loud_cuts: bool,
    pub cut_analysis: bool,

    pub periods: usize,
    pub policy: ScenarioPolicy,
    pub loads_dir: PathBuf,
    pub ramp_dir: PathBuf,
    pub generate_loads: bool,
    pub seed: u64,
    pub ramp_fraction: Option<f64>,

    /// Recognized keys whose features are not available, in file order
    pub unsupported_keys: Vec<String>,
}

impl CutplaneConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    pub fn family(&self, family: CutFamily) -> Option<&FamilySettings> {
        match family {
            CutFamily::Jabr => self.jabr.as_ref(),
            CutFamily::I2 => self.i2.as_ref(),
            CutFamily::Limit => self.limit.as_ref(),
            CutFamily::Loss => self.loss.as_ref(),
        }
    }

    /// Families with cut generation enabled, in fixed order.
    pub fn enabled_families(&self) -> Vec<CutFamily> {
        CutFamily::ALL
            .into_iter()
            .filter(|f| self.family(*f).is_some())
            .collect()
    }
}

impl FromStr for CutplaneConfig {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let mut raw = RawConfig::default();
        for (idx, line) in content.lines().enumerate() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let Some(first) = tokens.first() else {
                continue;
            };
            if first.starts_with('#') {
                continue;
            }
            let line_no = idx + 1;
            let key: ConfigKey = first.parse().map_err(|UnknownKey(token)| {
                ConfigError::IllegalInput {
                    line: line_no,
                    token,
                }
            })?;
            if key == ConfigKey::End {
                break;
            }
            let value = if key.takes_value() {
                Some(*tokens.get(1).ok_or(ConfigError::MissingValue {
                    line: line_no,
                    key: key.as_str(),
                })?)
            } else {
                None
            };
            raw.apply(key, value, line_no)?;
        }
        raw.finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PolicyToken {
    Gaussian,
    Uniform,
    Uniform2,
    Uniform3,
    Uniform4,
    Uniform5,
    Uniform6,
    Arpae,
    Arpae2,
    PglibReverse,
}

/// Values as they appear in the file, before cross-key resolution.
#[derive(Debug)]
struct RawConfig {
    case_file: Option<PathBuf>,
    lp_file: Option<PathBuf>,
    lp_file_cuts: Option<PathBuf>,
    cuts: [bool; 4],
    fractions: [f64; 4],
    drops: [bool; 4],
    conic: ConicInequalities,
    i2: bool,
    threshold: f64,
    threshold_i2: f64,
    threshold_limit: f64,
    threshold_dotprod: Option<f64>,
    threshold_objcuts: f64,
    tolerance: f64,
    cut_age_limit: usize,
    max_rounds: usize,
    max_time: f64,
    ftol: f64,
    ftol_iterates: usize,
    addcuts: bool,
    linear_objective: bool,
    objective_cuts: bool,
    primal_bound: Option<f64>,
    solver: SolverTolerances,
    getduals: bool,
    outputs: OutputFlags,
    loud_cuts: bool,
    cut_analysis: bool,
    periods: usize,
    nperturb: f64,
    policy: PolicyToken,
    uniform_drift: f64,
    loads_dir: PathBuf,
    ramp_dir: PathBuf,
    generate_loads: bool,
    seed: u64,
    ramp_fraction: Option<f64>,
    unsupported: Vec<String>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            case_file: None,
            lp_file: None,
            lp_file_cuts: None,
            cuts: [false; 4],
            fractions: [1.0; 4],
            drops: [false; 4],
            conic: ConicInequalities::default(),
            i2: false,
            threshold: 1e-5,
            threshold_i2: 1e-1,
            threshold_limit: 1e-5,
            threshold_dotprod: None,
            threshold_objcuts: 1e-5,
            tolerance: 1e-5,
            cut_age_limit: 20,
            max_rounds: 100,
            max_time: 200.0,
            ftol: 1e-3,
            ftol_iterates: 5,
            addcuts: false,
            linear_objective: false,
            objective_cuts: false,
            primal_bound: None,
            solver: SolverTolerances::default(),
            getduals: false,
            outputs: OutputFlags::default(),
            loud_cuts: false,
            cut_analysis: false,
            periods: 2,
            nperturb: 0.01,
            policy: PolicyToken::Gaussian,
            uniform_drift: 0.02,
            loads_dir: PathBuf::from("../data/mtploads"),
            ramp_dir: PathBuf::from("../data/ramprates"),
            generate_loads: false,
            seed: 0,
            ramp_fraction: None,
            unsupported: Vec::new(),
        }
    }
}

fn family_slot(family: CutFamily) -> usize {
    match family {
        CutFamily::Jabr => 0,
        CutFamily::I2 => 1,
        CutFamily::Limit => 2,
        CutFamily::Loss => 3,
    }
}

fn parse_value<T: FromStr>(key: ConfigKey, value: &str, line: usize) -> Result<T, ConfigError> {
    value.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        line,
        key: key.as_str(),
        value: value.to_string(),
        reason: "not a number".to_string(),
    })
}

fn positive(key: ConfigKey, value: &str, line: usize) -> Result<f64, ConfigError> {
    let v: f64 = parse_value(key, value, line)?;
    if v > 0.0 && v.is_finite() {
        Ok(v)
    } else {
        Err(ConfigError::InvalidValue {
            line,
            key: key.as_str(),
            value: value.to_string(),
            reason: "must be positive".to_string(),
        })
    }
}

fn fraction(key: ConfigKey, value: &str, line: usize) -> Result<f64, ConfigError> {
    let v: f64 = parse_value(key, value, line)?;
    if v > 0.0 && v <= 1.0 {
        Ok(v)
    } else {
        Err(ConfigError::InvalidValue {
            line,
            key: key.as_str(),
            value: value.to_string(),
            reason: "must be in (0, 1]".to_string(),
        })
    }
}

fn at_least_one(key: ConfigKey, value: &str, line: usize) -> Result<usize, ConfigError> {
    let v: usize = parse_value(key, value, line)?;
    if v >= 1 {
        Ok(v)
    } else {
        Err(ConfigError::InvalidValue {
            line,
            key: key.as_str(),
            value: value.to_string(),
            reason: "must be at least 1".to_string(),
        })
    }
}

impl RawConfig {
    fn apply(&mut self, key: ConfigKey, value: Option<&str>, line: usize) -> Result<(), ConfigError> {
        use ConfigKey as K;
        // takes_value() guarantees Some for value keys
        let v = value.unwrap_or_default();
        match key {
            K::CaseFilename => self.case_file = Some(PathBuf::from(v)),
            K::LpFilename => self.lp_file = Some(PathBuf::from(v)),
            K::LpFilenameCuts => self.lp_file_cuts = Some(PathBuf::from(v)),
            K::JabrCuts => self.cuts[family_slot(CutFamily::Jabr)] = true,
            K::I2Cuts => self.cuts[family_slot(CutFamily::I2)] = true,
            K::LimitCuts => self.cuts[family_slot(CutFamily::Limit)] = true,
            K::LossCuts => self.cuts[family_slot(CutFamily::Loss)] = true,
            K::JabrInequalities => self.conic.jabr = true,
            K::I2Inequalities => self.conic.i2 = true,
            K::LimitInequalities => self.conic.limit = true,
            K::LossInequalities => self.conic.loss = true,
            K::I2 => self.i2 = true,
            K::Threshold => self.threshold = positive(key, v, line)?,
            K::ThresholdI2 => self.threshold_i2 = positive(key, v, line)?,
            K::ThresholdLimit => self.threshold_limit = positive(key, v, line)?,
            K::ThresholdDotprod => self.threshold_dotprod = Some(fraction(key, v, line)?),
            K::ThresholdObjcuts => self.threshold_objcuts = positive(key, v, line)?,
            K::Tolerance => self.tolerance = positive(key, v, line)?,
            K::FractionJabr => self.fractions[family_slot(CutFamily::Jabr)] = fraction(key, v, line)?,
            K::FractionI2 => self.fractions[family_slot(CutFamily::I2)] = fraction(key, v, line)?,
            K::FractionLimit => {
                self.fractions[family_slot(CutFamily::Limit)] = fraction(key, v, line)?
            }
            K::FractionLoss => self.fractions[family_slot(CutFamily::Loss)] = fraction(key, v, line)?,
            K::DropJabr => self.drops[family_slot(CutFamily::Jabr)] = true,
            K::DropI2 => self.drops[family_slot(CutFamily::I2)] = true,
            K::DropLimit => self.drops[family_slot(CutFamily::Limit)] = true,
            K::DropLoss => self.drops[family_slot(CutFamily::Loss)] = true,
            K::CutAgeLimit => self.cut_age_limit = parse_value(key, v, line)?,
            K::MaxRounds => self.max_rounds = at_least_one(key, v, line)?,
            K::MaxTime => self.max_time = positive(key, v, line)?,
            K::Ftol => self.ftol = positive(key, v, line)?,
            K::FtolIterates => self.ftol_iterates = at_least_one(key, v, line)?,
            K::AddCuts => self.addcuts = true,
            K::FromScratch => self.addcuts = false,
            K::LinearObjective => self.linear_objective = true,
            K::ObjectiveCuts => self.objective_cuts = true,
            K::PrimalBound => self.primal_bound = Some(parse_value(key, v, line)?),
            K::FeasibilityTol => self.solver.feasibility_tol = positive(key, v, line)?,
            K::Feastol => self.solver.feastol = positive(key, v, line)?,
            K::Opttol => self.solver.opttol = positive(key, v, line)?,
            K::Barconvtol => self.solver.barconvtol = positive(key, v, line)?,
            K::GetDuals => self.getduals = true,
            K::WriteLps => self.outputs.write_lps = true,
            K::WriteLastLp => self.outputs.write_last_lp = true,
            K::WriteSol => self.outputs.write_sol = true,
            K::WriteAcSol => self.outputs.write_ac_sol = true,
            K::WriteCuts => self.outputs.write_cuts = true,
            K::LoudCuts => self.loud_cuts = true,
            K::CutAnalysis => self.cut_analysis = true,
            K::Periods => self.periods = at_least_one(key, v, line)?,
            K::Nperturb => {
                let magnitude: f64 = parse_value(key, v, line)?;
                if !(magnitude >= 0.0) {
                    return Err(ConfigError::InvalidValue {
                        line,
                        key: key.as_str(),
                        value: v.to_string(),
                        reason: "must be non-negative".to_string(),
                    });
                }
                self.nperturb = magnitude;
                self.policy = PolicyToken::Gaussian;
            }
            K::Uniform => self.policy = PolicyToken::Uniform,
            K::Uniform2 => self.policy = PolicyToken::Uniform2,
            K::Uniform3 => self.policy = PolicyToken::Uniform3,
            K::Uniform4 => self.policy = PolicyToken::Uniform4,
            K::Uniform5 => self.policy = PolicyToken::Uniform5,
            K::Uniform6 => self.policy = PolicyToken::Uniform6,
            K::Arpae => self.policy = PolicyToken::Arpae,
            K::Arpae2 => self.policy = PolicyToken::Arpae2,
            K::PglibReverse => self.policy = PolicyToken::PglibReverse,
            K::UniformDrift => self.uniform_drift = positive(key, v, line)?,
            K::LoadsDir => self.loads_dir = PathBuf::from(v),
            K::RampDir => self.ramp_dir = PathBuf::from(v),
            K::GenerateLoads => self.generate_loads = true,
            K::Seed => self.seed = parse_value(key, v, line)?,
            K::RampFraction => self.ramp_fraction = Some(positive(key, v, line)?),
            K::End => {}
            other if other.is_unsupported() => {
                if other.takes_value() {
                    let _: f64 = parse_value(other, v, line)?;
                }
                self.unsupported.push(other.as_str().to_string());
            }
            other => {
                return Err(ConfigError::IllegalInput {
                    line,
                    token: other.as_str().to_string(),
                })
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<CutplaneConfig, ConfigError> {
        let case_file = self.case_file.ok_or(ConfigError::MissingCaseFile)?;
        let case_name = case_name(&case_file);

        let thresholds = [
            self.threshold,
            self.threshold_i2,
            self.threshold_limit,
            self.threshold,
        ];
        let settings = |family: CutFamily| {
            let slot = family_slot(family);
            self.cuts[slot].then_some(FamilySettings {
                most_violated_fraction: self.fractions[slot],
                threshold: thresholds[slot],
                drop: self.drops[slot],
            })
        };

        let drift = self.uniform_drift;
        let policy = match self.policy {
            PolicyToken::Gaussian => ScenarioPolicy::Gaussian {
                magnitude: self.nperturb,
            },
            PolicyToken::Uniform => ScenarioPolicy::Uniform { drift },
            PolicyToken::Uniform2 => ScenarioPolicy::Uniform2 { drift },
            PolicyToken::Uniform3 => ScenarioPolicy::Uniform3 { drift },
            PolicyToken::Uniform4 => ScenarioPolicy::Uniform4 { drift },
            PolicyToken::Uniform5 => ScenarioPolicy::Uniform5 { drift },
            PolicyToken::Uniform6 => ScenarioPolicy::Uniform6 { drift },
            PolicyToken::Arpae => ScenarioPolicy::Arpae,
            PolicyToken::Arpae2 => ScenarioPolicy::Arpae2,
            PolicyToken::PglibReverse => ScenarioPolicy::PglibReverse { drift },
        };

        let i2_cuts = self.cuts[family_slot(CutFamily::I2)];
        Ok(CutplaneConfig {
            lp_file: self
                .lp_file
                .unwrap_or_else(|| PathBuf::from(format!("{case_name}.lp"))),
            lp_file_cuts: self
                .lp_file_cuts
                .unwrap_or_else(|| PathBuf::from(format!("{case_name}_cuts.lp"))),
            jabr: settings(CutFamily::Jabr),
            i2: settings(CutFamily::I2),
            limit: settings(CutFamily::Limit),
            loss: settings(CutFamily::Loss),
            conic: self.conic,
            i2_variables: self.i2 || i2_cuts || self.conic.i2,
            threshold_dotprod: self.threshold_dotprod,
            tolerance: self.tolerance,
            cut_age_limit: self.cut_age_limit,
            max_rounds: self.max_rounds,
            max_time: self.max_time,
            ftol: self.ftol,
            ftol_iterates: self.ftol_iterates,
            incremental: self.addcuts,
            linear_objective: self.linear_objective,
            objective_cuts: (self.linear_objective && self.objective_cuts)
                .then_some(self.threshold_objcuts),
            primal_bound: self.primal_bound,
            solver: self.solver,
            getduals: self.getduals,
            outputs: self.outputs,
            loud_cuts: self.loud_cuts,
            cut_analysis: self.cut_analysis,
            periods: self.periods,
            policy,
            loads_dir: self.loads_dir,
            ramp_dir: self.ramp_dir,
            generate_loads: self.generate_loads,
            seed: self.seed,
            ramp_fraction: self.ramp_fraction,
            unsupported_keys: self.unsupported,
            case_file,
            case_name,
        })
    }
}
