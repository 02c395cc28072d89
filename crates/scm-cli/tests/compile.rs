use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir.parent().unwrap().parent().unwrap().to_path_buf()
}

fn config_arg(game: &str) -> String {
    format!("--config-path={}", workspace_root().join("config").join(game).display())
}

fn scmc() -> Command {
    Command::cargo_bin("scmc").unwrap()
}

#[test]
fn compiles_to_ir2() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("main.sc");
    fs::write(&src, "VAR_INT score\nscore = 5\nscore += 1\n").unwrap();
    let out = dir.path().join("main.ir2");

    scmc()
        .arg(&src)
        .arg("--config=gtasa")
        .arg(config_arg("gtasa"))
        .arg("--emit-ir2")
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    let ir2 = fs::read_to_string(&out).unwrap();
    assert_eq!(ir2, "SET_VAR_INT &0 5i8\nADD_VAL_TO_INT_VAR &0 1i8\n");
}

#[test]
fn compiles_a_switch_with_fswitch() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("main.sc");
    fs::write(
        &src,
        "VAR_INT x\nSWITCH x\nCASE 100\nWAIT 0\nBREAK\nCASE 50\nWAIT 1\nBREAK\nENDSWITCH\n",
    )
    .unwrap();
    let out = dir.path().join("main.ir2");

    scmc()
        .arg(&src)
        .arg("--config=gtasa")
        .arg(config_arg("gtasa"))
        .arg("--fswitch")
        .arg("--emit-ir2")
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    let ir2 = fs::read_to_string(&out).unwrap();
    assert!(ir2.starts_with("SWITCH_START &0 2i8"));
}

#[test]
fn break_outside_a_loop_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("main.sc");
    fs::write(&src, "WAIT 0\nBREAK\n").unwrap();
    let out = dir.path().join("main.scm");

    scmc()
        .arg(&src)
        .arg("--config=gtasa")
        .arg(config_arg("gtasa"))
        .arg("-o")
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("BREAK outside"));

    assert!(!out.exists(), "no output may be written on error");
}

#[test]
fn duplicate_script_name_references_both_locations() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("main.sc");
    let sub = dir.path().join("extra.sc");
    fs::write(&main, "SCRIPT_NAME intro\nWAIT 0\n").unwrap();
    fs::write(&sub, "SCRIPT_NAME intro\nWAIT 0\n").unwrap();

    scmc()
        .arg(&main)
        .arg("--config=gtasa")
        .arg(config_arg("gtasa"))
        .arg(format!("--subscript={}", sub.display()))
        .arg("--emit-ir2")
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate SCRIPT_NAME 'INTRO'"))
        .stderr(predicate::str::contains("previously used here"));
}

#[test]
fn switch_is_unsupported_on_gta3() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("main.sc");
    fs::write(&src, "VAR_INT x\nSWITCH x\nCASE 1\nBREAK\nENDSWITCH\n").unwrap();

    scmc()
        .arg(&src)
        .arg("--config=gta3")
        .arg(config_arg("gta3"))
        .arg("--fswitch")
        .arg("--emit-ir2")
        .assert()
        .failure()
        .stderr(predicate::str::contains("undefined or unsupported"));
}

#[test]
fn unsupported_command_is_a_plain_error_under_pedantic() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("main.sc");
    fs::write(&src, "PRINT_HELP HELP_1\nWAIT 0\n").unwrap();

    // fatal by default
    scmc()
        .arg(&src)
        .arg("--config=gta3")
        .arg(config_arg("gta3"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("fatal error"));

    // plain error under --pedantic
    scmc()
        .arg(&src)
        .arg("--config=gta3")
        .arg(config_arg("gta3"))
        .arg("--pedantic")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("fatal").not());
}

#[test]
fn repeated_compilation_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("main.sc");
    let mission = dir.path().join("mis0.sc");
    fs::write(
        &main,
        "VAR_INT progress\nprogress = 0\nloop:\nWAIT 250\nGOTO loop\n",
    )
    .unwrap();
    fs::write(
        &mission,
        "MISSION_START\nSCRIPT_NAME mis0\nWAIT 0\nTERMINATE_THIS_SCRIPT\nMISSION_END\n",
    )
    .unwrap();

    let out_a = dir.path().join("a.scm");
    let out_b = dir.path().join("b.scm");
    for out in [&out_a, &out_b] {
        scmc()
            .arg(&main)
            .arg("--config=gtasa")
            .arg(config_arg("gtasa"))
            .arg(format!("--mission={}", mission.display()))
            .arg("-o")
            .arg(out)
            .assert()
            .success();
    }
    assert_eq!(fs::read(&out_a).unwrap(), fs::read(&out_b).unwrap());
}

#[test]
fn ir2_round_trip_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("main.sc");
    fs::write(
        &src,
        "VAR_INT x\nstart:\nx += 1\nIF x < 10\nGOTO start\nENDIF\nTERMINATE_THIS_SCRIPT\n",
    )
    .unwrap();

    let first = dir.path().join("first.ir2");
    scmc()
        .arg(&src)
        .arg("--config=gtasa")
        .arg(config_arg("gtasa"))
        .arg("--emit-ir2")
        .arg("-o")
        .arg(&first)
        .assert()
        .success();

    let second = dir.path().join("second.ir2");
    scmc()
        .arg(&first)
        .arg("--config=gtasa")
        .arg(config_arg("gtasa"))
        .arg("--lang=ir2")
        .arg("--emit-ir2")
        .arg("-o")
        .arg(&second)
        .assert()
        .success();

    assert_eq!(fs::read_to_string(&first).unwrap(), fs::read_to_string(&second).unwrap());
}

#[test]
fn fsyntax_only_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("main.sc");
    fs::write(&src, "WAIT 0\n").unwrap();
    let out = dir.path().join("main.scm");

    scmc()
        .arg(&src)
        .arg("--config=gtasa")
        .arg(config_arg("gtasa"))
        .arg("--fsyntax-only")
        .arg("-o")
        .arg(&out)
        .assert()
        .success();
    assert!(!out.exists());
}

#[test]
fn missing_input_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    scmc()
        .arg(dir.path().join("nope.sc"))
        .arg("--config=gtasa")
        .arg(config_arg("gtasa"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot open"));
}
