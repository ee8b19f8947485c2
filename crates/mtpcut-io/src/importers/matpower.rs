use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Result};
use mtpcut_core::{
    Branch, BranchId, Bus, BusId, CostModel, Degrees, Edge, Gen, GenId, Kilovolts, Load, LoadId,
    Megavars, Megawatts, MtpError, MtpResult, Network, Node, NodeIndex, PerUnit, Shunt, ShuntId,
};

use super::matpower_parser::{parse_matpower_file, MatpowerCase, MatpowerGenCost};

/// Read a MATPOWER `.m` case into the static network model.
///
/// The network is named after the file stem (`pglib_opf_case14_ieee.m` gives
/// `pglib_opf_case14_ieee`). Every failure is reported as
/// [`MtpError::CaseRead`].
pub fn load_case(path: &Path) -> MtpResult<Network> {
    let case = parse_matpower_file(path).map_err(|e| MtpError::CaseRead(format!("{e:#}")))?;
    let name = case_name(path);
    let network = build_network_from_matpower_case(&case, &name)
        .map_err(|e| MtpError::CaseRead(format!("{}: {e:#}", path.display())))?;
    network
        .validate()
        .map_err(|e| MtpError::CaseRead(format!("{}: {e}", path.display())))?;
    Ok(network)
}

/// File stem of a case path, used in every derived file name.
pub fn case_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn gencost_to_cost_model(gencost: Option<&MatpowerGenCost>) -> CostModel {
    match gencost {
        None => CostModel::NoCost,
        Some(gc) => match gc.model {
            // MATPOWER stores highest degree first
            2 => CostModel::Polynomial(gc.cost.iter().rev().copied().collect()),
            1 => CostModel::PiecewiseLinear(
                gc.cost
                    .chunks_exact(2)
                    .map(|chunk| (chunk[0], chunk[1]))
                    .collect(),
            ),
            _ => CostModel::NoCost,
        },
    }
}

/// Angle limits of ±360° (or both zero) mean "unconstrained".
fn angle_limit(deg: f64) -> Option<mtpcut_core::Radians> {
    (deg.abs() < 360.0).then(|| Degrees(deg).to_radians())
}

pub fn build_network_from_matpower_case(case: &MatpowerCase, name: &str) -> Result<Network> {
    let mut network = Network::new(name, case.base_mva);
    let mut bus_index: HashMap<usize, NodeIndex> = HashMap::with_capacity(case.bus.len());

    for bus in &case.bus {
        if bus_index.contains_key(&bus.bus_i) {
            return Err(anyhow!("duplicate bus number {}", bus.bus_i));
        }
        let idx = network.graph.add_node(Node::Bus(Bus {
            id: BusId::new(bus.bus_i),
            name: format!("Bus {}", bus.bus_i),
            base_kv: Kilovolts(bus.base_kv),
            voltage_pu: PerUnit(bus.vm),
            vmin_pu: PerUnit(bus.vmin),
            vmax_pu: PerUnit(bus.vmax),
        }));
        bus_index.insert(bus.bus_i, idx);
    }

    let lookup = |bus: usize, what: &str| -> Result<NodeIndex> {
        bus_index
            .get(&bus)
            .copied()
            .ok_or_else(|| anyhow!("{} references unknown bus {}", what, bus))
    };

    // Loads and shunts are embedded in the bus rows
    let mut next_load = 0;
    let mut next_shunt = 0;
    for bus in &case.bus {
        if bus.pd != 0.0 || bus.qd != 0.0 {
            network.graph.add_node(Node::Load(Load {
                id: LoadId::new(next_load),
                name: format!("Load {}", bus.bus_i),
                bus: BusId::new(bus.bus_i),
                active_power: Megawatts(bus.pd),
                reactive_power: Megavars(bus.qd),
            }));
            next_load += 1;
        }
        if bus.gs != 0.0 || bus.bs != 0.0 {
            network.graph.add_node(Node::Shunt(Shunt {
                id: ShuntId::new(next_shunt),
                name: format!("Shunt {}", bus.bus_i),
                bus: BusId::new(bus.bus_i),
                gs_pu: bus.gs / case.base_mva,
                bs_pu: bus.bs / case.base_mva,
            }));
            next_shunt += 1;
        }
    }

    // GenId is the row of mpc.gen, so ramp files can refer to it even when
    // earlier rows are out of service.
    for (row, gen) in case.gen.iter().enumerate() {
        if gen.gen_status <= 0 {
            continue;
        }
        lookup(gen.gen_bus, &format!("generator row {}", row + 1))?;
        network.graph.add_node(Node::Gen(
            Gen::new(
                GenId::new(row),
                format!("Gen {}@{}", row + 1, gen.gen_bus),
                BusId::new(gen.gen_bus),
            )
            .with_p_limits(gen.pmin, gen.pmax)
            .with_q_limits(gen.qmin, gen.qmax)
            .with_cost(gencost_to_cost_model(case.gencost.get(row))),
        ));
    }

    let mut next_branch = 0;
    for (row, br) in case.branch.iter().enumerate() {
        if br.br_status <= 0 {
            continue;
        }
        let from = lookup(br.f_bus, &format!("branch row {}", row + 1))?;
        let to = lookup(br.t_bus, &format!("branch row {}", row + 1))?;
        let unconstrained_angles = br.angmin == 0.0 && br.angmax == 0.0;
        let branch = Branch {
            id: BranchId::new(next_branch),
            name: format!("{}-{}", br.f_bus, br.t_bus),
            from_bus: BusId::new(br.f_bus),
            to_bus: BusId::new(br.t_bus),
            resistance: br.br_r,
            reactance: br.br_x,
            charging_b: br.br_b,
            tap_ratio: if br.tap == 0.0 { 1.0 } else { br.tap },
            phase_shift: Degrees(br.shift).to_radians(),
            rating_a: None,
            angle_min: if unconstrained_angles { None } else { angle_limit(br.angmin) },
            angle_max: if unconstrained_angles { None } else { angle_limit(br.angmax) },
            status: true,
        }
        .with_rating((br.rate_a > 0.0).then_some(br.rate_a));
        network.graph.add_edge(from, to, Edge::Branch(branch));
        next_branch += 1;
    }

    Ok(network)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importers::matpower_parser::parse_matpower_string;

    const CASE: &str = r#"
mpc.baseMVA = 100;
mpc.bus = [
	1	3	0	0	0	0	1	1	0	345	1	1.1	0.9;
	2	1	60	20	0	19	1	1	0	345	1	1.05	0.95;
];
mpc.gen = [
	1	0	0	300	-300	1	100	0	250	10;
	1	0	0	300	-300	1	100	1	200	0;
];
mpc.branch = [
	1	2	0.01	0.1	0.02	250	250	250	0.98	2	1	-30	30;
	1	2	0.01	0.1	0.02	0	250	250	0	0	0	-360	360;
];
mpc.gencost = [
	2	0	0	3	0.11	5	150;
	2	0	0	3	0.085	1.2	600;
];
"#;

    #[test]
    fn builds_network_with_row_based_gen_ids() {
        let case = parse_matpower_string(CASE).unwrap();
        let network = build_network_from_matpower_case(&case, "toy").unwrap();
        let gens = network.generators();
        assert_eq!(gens.len(), 1);
        assert_eq!(gens[0].id, GenId::new(1));
        assert_eq!(gens[0].cost_model, CostModel::quadratic(600.0, 1.2, 0.085));
        assert_eq!(network.branches().len(), 1);
        assert_eq!(network.loads().len(), 1);
        assert_eq!(network.shunts()[0].bs_pu, 0.19);
    }

    #[test]
    fn converts_branch_units() {
        let case = parse_matpower_string(CASE).unwrap();
        let network = build_network_from_matpower_case(&case, "toy").unwrap();
        let br = network.branches()[0];
        assert_eq!(br.tap_ratio, 0.98);
        assert!((br.phase_shift.to_degrees().value() - 2.0).abs() < 1e-12);
        assert_eq!(br.rating_a.map(|r| r.value()), Some(250.0));
        assert!(br.angle_max.is_some());
    }

    #[test]
    fn dangling_bus_is_error() {
        let content = CASE.replace("1\t2\t0.01\t0.1\t0.02\t250", "1\t7\t0.01\t0.1\t0.02\t250");
        let case = parse_matpower_string(&content).unwrap();
        let err = build_network_from_matpower_case(&case, "toy").unwrap_err();
        assert!(err.to_string().contains("unknown bus 7"));
    }

    #[test]
    fn case_name_is_file_stem() {
        assert_eq!(case_name(Path::new("../data/case9.m")), "case9");
    }
}
