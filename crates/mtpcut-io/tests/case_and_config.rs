use std::fs;

use mtpcut_core::{CutFamily, MtpError};
use mtpcut_io::config::CutplaneConfig;
use mtpcut_io::importers::load_case;
use mtpcut_io::scenario_files::{loads_path, ramp_path, read_loads_file, read_ramp_file};
use tempfile::tempdir;

const CASE3: &str = r#"function mpc = case3
mpc.version = '2';
mpc.baseMVA = 100;
mpc.bus = [
	1	3	0	0	0	0	1	1	0	345	1	1.1	0.9;
	2	2	0	0	0	0	1	1	0	345	1	1.1	0.9;
	3	1	90	30	0	0	1	1	0	345	1	1.1	0.9;
];
mpc.gen = [
	1	0	0	300	-300	1	100	1	250	10;
	2	0	0	300	-300	1	100	1	300	10;
];
mpc.branch = [
	1	2	0.01	0.1	0.02	250	250	250	0	0	1	-360	360;
	2	3	0.02	0.2	0.04	250	250	250	0	0	1	-360	360;
	1	3	0.02	0.2	0.04	250	250	250	0	0	1	-360	360;
];
mpc.gencost = [
	2	0	0	3	0.11	5	150;
	2	0	0	3	0.085	1.2	600;
];
"#;

#[test]
fn config_case_and_scenario_files_resolve_together() {
    let dir = tempdir().unwrap();
    let case_path = dir.path().join("case3.m");
    fs::write(&case_path, CASE3).unwrap();
    let loads_dir = dir.path().join("mtploads");
    let ramp_dir = dir.path().join("ramprates");
    fs::create_dir_all(&loads_dir).unwrap();
    fs::create_dir_all(&ramp_dir).unwrap();

    let conf = format!(
        "casefilename {}\njabrcuts\nT 2\nuniform2\nloadsdir {}\nrampdir {}\nEND\n",
        case_path.display(),
        loads_dir.display(),
        ramp_dir.display()
    );
    let conf_path = dir.path().join("run.conf");
    fs::write(&conf_path, conf).unwrap();

    let config = CutplaneConfig::from_file(&conf_path).unwrap();
    assert_eq!(config.enabled_families(), vec![CutFamily::Jabr]);

    let network = load_case(&config.case_file).unwrap();
    assert_eq!(network.name, "case3");
    assert_eq!(network.stats().num_branches, 3);

    let lp = loads_path(&config);
    assert!(lp.ends_with("case3_mtploads_2_u2.txt"));
    fs::write(&lp, "0 3 90 30\n1 3 99 33\n").unwrap();
    fs::write(ramp_path(&config), "1 50\n2 60 40\n").unwrap();

    let loads = read_loads_file(&lp, config.periods).unwrap();
    assert_eq!(loads.total_pd(1), 99.0);
    let ramps = read_ramp_file(&ramp_path(&config)).unwrap();
    assert_eq!(ramps.by_gen.len(), 2);
}

#[test]
fn unreadable_config_and_case_are_distinct_errors() {
    let dir = tempdir().unwrap();
    let err = CutplaneConfig::from_file(&dir.path().join("missing.conf")).unwrap_err();
    let err: MtpError = err.into();
    assert!(matches!(err, MtpError::Config(_)));

    let err = load_case(&dir.path().join("missing.m")).unwrap_err();
    assert!(matches!(err, MtpError::CaseRead(_)));
    assert!(err.is_fatal_at_start());
}
