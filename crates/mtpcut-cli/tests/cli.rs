use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
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

fn write_config(dir: &Path, options: &str) -> std::path::PathBuf {
    let case = dir.join("case3.m");
    fs::write(&case, CASE3).unwrap();
    let conf = dir.join("case3.conf");
    fs::write(
        &conf,
        format!(
            "casefilename {}\nloadsdir {}\nrampdir {}\ngenerate_loads\nramp_fraction 0.5\n{options}\nEND\n",
            case.display(),
            dir.join("loads").display(),
            dir.join("ramps").display(),
        ),
    )
    .unwrap();
    conf
}

#[test]
fn mtpcut_runs_and_writes_outputs() {
    let dir = tempdir().unwrap();
    let conf = write_config(dir.path(), "T 2\njabrcuts\nmax_rounds 3\nwritesol\nsolver_method 2");
    let sols = dir.path().join("sols");
    let log = dir.path().join("run.log");

    let mut cmd = Command::cargo_bin("mtpcut").unwrap();
    cmd.arg(&conf)
        .arg(&sols)
        .arg(&log)
        .env("RUST_LOG", "info")
        .assert()
        .success()
        .stdout(predicate::str::contains("mtpcut v"))
        .stdout(predicate::str::contains("cutting-plane run finished"));

    assert!(sols.join("case3_2.sol").exists());
    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(sols.join("report_case3_2.json")).unwrap())
            .unwrap();
    assert!(report["rounds"].as_u64().unwrap() <= 3);

    let logged = fs::read_to_string(&log).unwrap();
    assert!(logged.contains("mtpcut v"));
    assert!(logged.contains("solver_method"));
}

#[test]
fn mtpcut_fails_on_missing_config() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("mtpcut").unwrap();
    cmd.arg(dir.path().join("absent.conf"))
        .arg(dir.path())
        .arg(dir.path().join("main.log"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("fatal"))
        .stdout(predicate::str::contains("startup"));
}

#[test]
fn mtpcut_rejects_unknown_keys() {
    let dir = tempdir().unwrap();
    let conf = write_config(dir.path(), "jabrcuts\nnot_an_option 3");
    let mut cmd = Command::cargo_bin("mtpcut").unwrap();
    cmd.arg(&conf)
        .arg(dir.path())
        .arg(dir.path().join("main.log"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("not_an_option"));
}

#[test]
fn mtpcut_fails_on_missing_case() {
    let dir = tempdir().unwrap();
    let conf = dir.path().join("bad.conf");
    fs::write(
        &conf,
        format!("casefilename {}\njabrcuts\nEND\n", dir.path().join("nope.m").display()),
    )
    .unwrap();
    let mut cmd = Command::cargo_bin("mtpcut").unwrap();
    cmd.arg(&conf)
        .arg(dir.path())
        .arg(dir.path().join("main.log"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("Case read error"))
        .stdout(predicate::str::contains("startup"));
}
