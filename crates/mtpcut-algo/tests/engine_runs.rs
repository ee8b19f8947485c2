use std::fs;
use std::path::Path;

use mtpcut_algo::{build_scenario, CutPlaneEngine, RunOutcome, RunStatus};
use mtpcut_core::CutFamily;
use mtpcut_io::{load_case, CutplaneConfig};
use tempfile::{tempdir, TempDir};

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

fn setup(case: &str, options: &str) -> (TempDir, CutplaneConfig) {
    let dir = tempdir().unwrap();
    let case_path = dir.path().join("case3.m");
    fs::write(&case_path, case).unwrap();
    let conf = format!(
        "casefilename {}\nloadsdir {}\nrampdir {}\ngenerate_loads\nramp_fraction 0.5\n{}\nEND\n",
        case_path.display(),
        dir.path().join("mtploads").display(),
        dir.path().join("ramprates").display(),
        options
    );
    let conf_path = dir.path().join("run.conf");
    fs::write(&conf_path, conf).unwrap();
    let config = CutplaneConfig::from_file(&conf_path).unwrap();
    (dir, config)
}

fn run(config: &CutplaneConfig, sols: &Path) -> (RunOutcome, Vec<(CutFamily, Vec<(u64, usize, f64)>)>) {
    let network = load_case(&config.case_file).unwrap();
    let scenario = build_scenario(&network, config).unwrap();
    let mut engine = CutPlaneEngine::new(config, &network, &scenario, sols).unwrap();
    let outcome = engine.run().unwrap();
    let x = outcome.state.as_ref().map(|s| s.x.clone()).unwrap_or_default();
    let pools = engine
        .pools()
        .iter()
        .map(|pool| {
            let cuts = pool
                .iter()
                .map(|c| (c.id.value(), c.last_active, c.slack(&x)))
                .collect();
            (pool.family(), cuts)
        })
        .collect();
    (outcome, pools)
}

#[test]
fn jabr_run_terminates_with_satisfied_pool() {
    let (dir, config) = setup(
        CASE3,
        "T 3\nuniform5\njabrcuts\nmost_violated_fraction_jabr 0.5\nthreshold 1e-5\nmax_rounds 10",
    );
    let (outcome, pools) = run(&config, &dir.path().join("sols"));
    let report = &outcome.report;

    assert!(matches!(
        report.status,
        RunStatus::RoundLimit | RunStatus::Converged
    ));
    assert!(report.rounds >= 1 && report.rounds <= 10);
    assert_eq!(report.objective_history.len(), report.rounds);

    // cuts are only added, so the relaxation can only tighten
    for w in report.objective_history.windows(2) {
        assert!(w[1] >= w[0] - 1e-5 * w[0].abs().max(1.0), "{:?}", w);
    }

    let (family, cuts) = &pools[0];
    assert_eq!(*family, CutFamily::Jabr);
    assert!(!cuts.is_empty());
    for (id, _, slack) in cuts {
        assert!(*slack >= -1e-5, "cut {id} violated by {}", -slack);
    }
}

#[test]
fn incremental_and_rebuild_modes_agree() {
    let options = "T 2\nuniform2\njabrcuts\nlimitcuts\nmost_violated_fraction_jabr 0.5\nmax_rounds 4";
    let (dir, rebuild) = setup(CASE3, options);
    let (a, pools_a) = run(&rebuild, &dir.path().join("a"));

    let (dir_b, incremental) = setup(CASE3, &format!("{options}\naddcuts"));
    assert!(incremental.incremental);
    let (b, pools_b) = run(&incremental, &dir_b.path().join("b"));

    assert_eq!(a.report.rounds, b.report.rounds);
    let ids = |pools: &[(CutFamily, Vec<(u64, usize, f64)>)]| -> Vec<Vec<u64>> {
        pools
            .iter()
            .map(|(_, cuts)| cuts.iter().map(|c| c.0).collect())
            .collect()
    };
    assert_eq!(ids(&pools_a), ids(&pools_b));
    for (x, y) in a.report.objective_history.iter().zip(&b.report.objective_history) {
        assert!((x - y).abs() <= 1e-6 * x.abs().max(1.0));
    }
}

#[test]
fn aged_cuts_are_dropped() {
    let (dir, config) = setup(
        CASE3,
        "T 2\nuniform\njabrcuts\ndropjabr\ncut_age_limit 1\nmax_rounds 8\nftol 1e-12",
    );
    let (outcome, pools) = run(&config, &dir.path().join("sols"));
    let report = &outcome.report;
    // the last aging pass ran in the round before the final one
    let last_aging = report.rounds.saturating_sub(1);
    for (_, cuts) in &pools {
        for (id, last_active, _) in cuts {
            assert!(
                last_aging - last_active <= 1,
                "cut {id} survived with age {}",
                last_aging - last_active
            );
        }
    }
    let jabr = &report.families[0];
    assert_eq!(jabr.added, jabr.dropped + jabr.in_pool);
}

#[test]
fn solver_failure_ends_the_run_without_error() {
    // 900 MW of load against 550 MW of generation
    let heavy = CASE3.replace("3\t1\t90\t30", "3\t1\t900\t30");
    let (dir, config) = setup(&heavy, "T 1\njabrcuts\nmax_rounds 5");
    let (outcome, _) = run(&config, &dir.path().join("sols"));
    assert_eq!(outcome.report.status, RunStatus::SolverFailed);
    assert_eq!(outcome.report.rounds, 0);
    assert!(outcome.report.final_objective.is_none());
    assert!(outcome.state.is_none());
}

#[test]
fn requested_outputs_are_written() {
    let (dir, mut config) = setup(
        CASE3,
        "T 2\narpae\njabrcuts\nmax_rounds 2\nwritesol\nwriteACsol\nwritecuts\nwritelastLP\nlinear_objective\nobjective_cuts",
    );
    config.lp_file_cuts = dir.path().join("final.lp");
    let sols = dir.path().join("sols");
    let (outcome, _) = run(&config, &sols);

    for name in ["case3_2.sol", "ACsol_case3_2.txt", "cuts_case3_2.txt", "report_case3_2.json"] {
        assert!(sols.join(name).exists(), "missing {name}");
    }
    let lp = fs::read_to_string(dir.path().join("final.lp")).unwrap();
    assert!(lp.starts_with("\\ case3 final relaxation with cuts"));
    assert!(lp.contains("Subject To"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(sols.join("report_case3_2.json")).unwrap())
            .unwrap();
    assert_eq!(json["case"], "case3");
    assert_eq!(json["rounds"], outcome.report.rounds);
}
