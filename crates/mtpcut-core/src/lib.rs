//! # mtpcut-core: static network model
//!
//! Provides the power-network data structures consumed by the multi-period
//! cutting-plane relaxation.
//!
//! Networks are modeled as **undirected multigraphs** where:
//! - **Nodes**: Buses, Generators, Loads, Shunts
//! - **Edges**: Branches (lines and transformers, π-model)
//!
//! Parallel branches between the same pair of buses are separate edges. The
//! graph keeps insertion order, so iterating buses, branches and generators is
//! deterministic; the relaxation relies on that to number its variables.
//!
//! ```rust
//! use mtpcut_core::*;
//!
//! let mut network = Network::new("two_bus", 100.0);
//! let b1 = network.graph.add_node(Node::Bus(Bus {
//!     id: BusId::new(1),
//!     name: "Bus 1".to_string(),
//!     ..Bus::default()
//! }));
//! let b2 = network.graph.add_node(Node::Bus(Bus {
//!     id: BusId::new(2),
//!     name: "Bus 2".to_string(),
//!     ..Bus::default()
//! }));
//! network.graph.add_edge(
//!     b1,
//!     b2,
//!     Edge::Branch(Branch::new(BranchId::new(0), "1-2".into(), BusId::new(1), BusId::new(2), 0.01, 0.1)),
//! );
//! assert_eq!(network.stats().num_branches, 1);
//! ```

use petgraph::{prelude::*, Undirected};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub mod error;
pub mod family;
pub mod units;

pub use error::{MtpError, MtpResult};
pub use family::CutFamily;
pub use petgraph::graph::NodeIndex;
pub use units::{Degrees, Kilovolts, Megavars, MegavoltAmperes, Megawatts, PerUnit, Radians};

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShuntId(usize);

macro_rules! impl_id {
    ($type:ident) => {
        impl $type {
            #[inline]
            pub fn new(value: usize) -> Self {
                $type(value)
            }
            #[inline]
            pub fn value(&self) -> usize {
                self.0
            }
        }
    };
}

impl_id!(BusId);
impl_id!(BranchId);
impl_id!(GenId);
impl_id!(LoadId);
impl_id!(ShuntId);

#[derive(Debug, Clone)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    /// Base voltage in kilovolts
    pub base_kv: Kilovolts,
    /// Voltage magnitude from the case (warm start / reporting only)
    pub voltage_pu: PerUnit,
    /// Minimum voltage limit in per-unit
    pub vmin_pu: PerUnit,
    /// Maximum voltage limit in per-unit
    pub vmax_pu: PerUnit,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            id: BusId(0),
            name: String::new(),
            base_kv: Kilovolts(0.0),
            voltage_pu: PerUnit(1.0),
            vmin_pu: PerUnit(0.9),
            vmax_pu: PerUnit(1.1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub from_bus: BusId,
    pub to_bus: BusId,
    /// Series resistance (per-unit)
    pub resistance: f64,
    /// Series reactance (per-unit)
    pub reactance: f64,
    /// Total line charging susceptance (per-unit, split half/half)
    pub charging_b: f64,
    /// Off-nominal tap magnitude at the from end
    pub tap_ratio: f64,
    /// Phase shift applied from from_bus to to_bus
    pub phase_shift: Radians,
    /// Thermal limit (Rate A); `None` when unrated
    pub rating_a: Option<MegavoltAmperes>,
    /// Minimum angle difference θ_from − θ_to
    pub angle_min: Option<Radians>,
    /// Maximum angle difference θ_from − θ_to
    pub angle_max: Option<Radians>,
    pub status: bool,
}

impl Default for Branch {
    fn default() -> Self {
        Self {
            id: BranchId(0),
            name: String::new(),
            from_bus: BusId(0),
            to_bus: BusId(0),
            resistance: 0.0,
            reactance: 0.0,
            charging_b: 0.0,
            tap_ratio: 1.0,
            phase_shift: Radians(0.0),
            rating_a: None,
            angle_min: None,
            angle_max: None,
            status: true,
        }
    }
}

impl Branch {
    pub fn new(
        id: BranchId,
        name: String,
        from_bus: BusId,
        to_bus: BusId,
        resistance: f64,
        reactance: f64,
    ) -> Self {
        Self {
            id,
            name,
            from_bus,
            to_bus,
            resistance,
            reactance,
            ..Self::default()
        }
    }

    /// Attach a thermal limit in MVA.
    pub fn with_rating(mut self, rate_mva: Option<f64>) -> Self {
        self.rating_a = rate_mva.map(MegavoltAmperes);
        self
    }
}

/// Generator cost model
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CostModel {
    #[default]
    NoCost,
    /// Polynomial cost, lowest degree first: `[c0, c1, c2]` is `c0 + c1*P + c2*P^2` (P in MW).
    Polynomial(Vec<f64>),
    /// Piecewise linear cost: (MW, $/hr) breakpoints
    PiecewiseLinear(Vec<(f64, f64)>),
}

impl CostModel {
    pub fn quadratic(c0: f64, c1: f64, c2: f64) -> Self {
        CostModel::Polynomial(vec![c0, c1, c2])
    }

    pub fn linear(c0: f64, c1: f64) -> Self {
        CostModel::Polynomial(vec![c0, c1])
    }

    /// Evaluate cost at given power output ($/hr)
    pub fn evaluate(&self, p_mw: f64) -> f64 {
        match self {
            CostModel::NoCost => 0.0,
            CostModel::Polynomial(coeffs) => coeffs
                .iter()
                .enumerate()
                .map(|(i, c)| c * p_mw.powi(i as i32))
                .sum(),
            CostModel::PiecewiseLinear(points) => {
                let (first, last) = match (points.first(), points.last()) {
                    (Some(f), Some(l)) => (*f, *l),
                    _ => return 0.0,
                };
                if p_mw <= first.0 {
                    return first.1;
                }
                if p_mw >= last.0 {
                    return last.1;
                }
                points
                    .windows(2)
                    .find(|w| p_mw >= w[0].0 && p_mw <= w[1].0)
                    .map(|w| {
                        let t = (p_mw - w[0].0) / (w[1].0 - w[0].0);
                        w[0].1 + t * (w[1].1 - w[0].1)
                    })
                    .unwrap_or(0.0)
            }
        }
    }

    /// Quadratic view `(c0, c1, c2)` used by the relaxation objective.
    ///
    /// Polynomials above degree two are truncated; piecewise-linear curves are
    /// replaced by their secant through the end points.
    pub fn quadratic_coeffs(&self) -> (f64, f64, f64) {
        match self {
            CostModel::NoCost => (0.0, 0.0, 0.0),
            CostModel::Polynomial(c) => (
                c.first().copied().unwrap_or(0.0),
                c.get(1).copied().unwrap_or(0.0),
                c.get(2).copied().unwrap_or(0.0),
            ),
            CostModel::PiecewiseLinear(points) => match (points.first(), points.last()) {
                (Some(a), Some(b)) if (b.0 - a.0).abs() > 1e-12 => {
                    let slope = (b.1 - a.1) / (b.0 - a.0);
                    (a.1 - slope * a.0, slope, 0.0)
                }
                (Some(a), _) => (a.1, 0.0, 0.0),
                _ => (0.0, 0.0, 0.0),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Gen {
    pub id: GenId,
    pub name: String,
    pub bus: BusId,
    pub pmin: Megawatts,
    pub pmax: Megawatts,
    pub qmin: Megavars,
    pub qmax: Megavars,
    pub status: bool,
    pub cost_model: CostModel,
}

impl Default for Gen {
    fn default() -> Self {
        Self {
            id: GenId(0),
            name: String::new(),
            bus: BusId(0),
            pmin: Megawatts(0.0),
            pmax: Megawatts(f64::INFINITY),
            qmin: Megavars(f64::NEG_INFINITY),
            qmax: Megavars(f64::INFINITY),
            status: true,
            cost_model: CostModel::NoCost,
        }
    }
}

impl Gen {
    pub fn new(id: GenId, name: String, bus: BusId) -> Self {
        Self {
            id,
            name,
            bus,
            ..Self::default()
        }
    }

    /// Set active power limits (in MW)
    pub fn with_p_limits(mut self, pmin: f64, pmax: f64) -> Self {
        self.pmin = Megawatts(pmin);
        self.pmax = Megawatts(pmax);
        self
    }

    /// Set reactive power limits (in Mvar)
    pub fn with_q_limits(mut self, qmin: f64, qmax: f64) -> Self {
        self.qmin = Megavars(qmin);
        self.qmax = Megavars(qmax);
        self
    }

    pub fn with_cost(mut self, cost: CostModel) -> Self {
        self.cost_model = cost;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Load {
    pub id: LoadId,
    pub name: String,
    pub bus: BusId,
    pub active_power: Megawatts,
    pub reactive_power: Megavars,
}

/// Fixed shunt admittance at a bus (per-unit at 1.0 p.u. voltage)
#[derive(Debug, Clone)]
pub struct Shunt {
    pub id: ShuntId,
    pub name: String,
    pub bus: BusId,
    pub gs_pu: f64,
    pub bs_pu: f64,
}

#[derive(Debug, Clone)]
pub enum Node {
    Bus(Bus),
    Gen(Gen),
    Load(Load),
    Shunt(Shunt),
}

#[derive(Debug, Clone)]
pub enum Edge {
    Branch(Branch),
}

/// The static power network of one case.
#[derive(Debug)]
pub struct Network {
    pub graph: Graph<Node, Edge, Undirected>,
    /// Case name (file stem of the case file)
    pub name: String,
    /// System MVA base for per-unit conversion
    pub base_mva: f64,
}

impl Default for Network {
    fn default() -> Self {
        Self::new("", 100.0)
    }
}

impl Network {
    pub fn new(name: impl Into<String>, base_mva: f64) -> Self {
        Self {
            graph: Graph::new_undirected(),
            name: name.into(),
            base_mva,
        }
    }

    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats::default();
        for node in self.graph.node_weights() {
            match node {
                Node::Bus(_) => stats.num_buses += 1,
                Node::Gen(g) => {
                    stats.num_gens += 1;
                    stats.total_gen_capacity_mw += g.pmax.value();
                }
                Node::Load(l) => {
                    stats.num_loads += 1;
                    stats.total_load_mw += l.active_power.value();
                }
                Node::Shunt(_) => stats.num_shunts += 1,
            }
        }
        stats.num_branches = self.graph.edge_count();
        stats
    }

    /// Check structural consistency: buses and generators present, every
    /// element attached to a known bus, positive base.
    pub fn validate(&self) -> MtpResult<()> {
        if !(self.base_mva > 0.0) {
            return Err(MtpError::Validation(format!(
                "baseMVA must be positive, got {}",
                self.base_mva
            )));
        }
        let buses: HashSet<BusId> = self.buses().iter().map(|b| b.id).collect();
        if buses.is_empty() {
            return Err(MtpError::Validation("network has no buses".into()));
        }
        if self.generators().is_empty() {
            return Err(MtpError::Validation("network has no generators".into()));
        }
        for bus in self.buses() {
            if bus.vmin_pu.value() > bus.vmax_pu.value() {
                return Err(MtpError::Validation(format!(
                    "bus {} has vmin > vmax",
                    bus.id.value()
                )));
            }
        }
        for gen in self.generators() {
            if !buses.contains(&gen.bus) {
                return Err(MtpError::Validation(format!(
                    "generator {} references unknown bus {}",
                    gen.name,
                    gen.bus.value()
                )));
            }
        }
        for branch in self.branches() {
            if !buses.contains(&branch.from_bus) || !buses.contains(&branch.to_bus) {
                return Err(MtpError::Validation(format!(
                    "branch {} references unknown bus",
                    branch.name
                )));
            }
            if branch.resistance.abs() < 1e-12 && branch.reactance.abs() < 1e-12 {
                return Err(MtpError::Validation(format!(
                    "branch {} has zero impedance",
                    branch.name
                )));
            }
        }
        Ok(())
    }

    pub fn buses(&self) -> Vec<&Bus> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Bus(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    pub fn generators(&self) -> Vec<&Gen> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Gen(g) => Some(g),
                _ => None,
            })
            .collect()
    }

    pub fn loads(&self) -> Vec<&Load> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Load(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    pub fn shunts(&self) -> Vec<&Shunt> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Shunt(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn branches(&self) -> Vec<&Branch> {
        self.graph
            .edge_weights()
            .map(|e| match e {
                Edge::Branch(b) => b,
            })
            .collect()
    }

    /// Total active load (MW)
    pub fn total_load_mw(&self) -> f64 {
        self.loads().iter().map(|l| l.active_power.value()).sum()
    }
}

#[derive(Debug, Default, Clone)]
pub struct NetworkStats {
    pub num_buses: usize,
    pub num_branches: usize,
    pub num_gens: usize,
    pub num_loads: usize,
    pub num_shunts: usize,
    pub total_load_mw: f64,
    pub total_gen_capacity_mw: f64,
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} buses, {} branches, {} generators, {} loads ({:.1} MW load, {:.1} MW capacity)",
            self.num_buses,
            self.num_branches,
            self.num_gens,
            self.num_loads,
            self.total_load_mw,
            self.total_gen_capacity_mw
        )
    }
}
