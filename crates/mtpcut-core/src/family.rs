//! The four nonlinear constraint families separated by the cutting-plane loop.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A family of nonlinear branch constraints whose violations are cut off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CutFamily {
    /// c² + s² ≤ v_k v_m
    Jabr,
    /// P² + Q² ≤ v_k i2 (current magnitude)
    I2,
    /// P² + Q² ≤ rate² (thermal limit, both ends)
    Limit,
    /// resistive loss lower bound
    Loss,
}

impl CutFamily {
    pub const ALL: [CutFamily; 4] = [
        CutFamily::Jabr,
        CutFamily::I2,
        CutFamily::Limit,
        CutFamily::Loss,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CutFamily::Jabr => "jabr",
            CutFamily::I2 => "i2",
            CutFamily::Limit => "limit",
            CutFamily::Loss => "loss",
        }
    }
}

impl fmt::Display for CutFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CutFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jabr" => Ok(CutFamily::Jabr),
            "i2" => Ok(CutFamily::I2),
            "limit" => Ok(CutFamily::Limit),
            "loss" => Ok(CutFamily::Loss),
            other => Err(format!("unknown cut family '{other}'")),
        }
    }
}
