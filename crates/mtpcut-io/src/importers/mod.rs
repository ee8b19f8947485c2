//! Case readers.

pub mod matpower;
pub mod matpower_parser;

pub use matpower::{build_network_from_matpower_case, case_name, load_case};
pub use matpower_parser::{parse_matpower_file, parse_matpower_string, MatpowerCase};
