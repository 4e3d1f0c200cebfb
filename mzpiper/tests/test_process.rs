use std::{error::Error, process::Command};

use assert_cmd::prelude::*;
use predicates::prelude::*;

#[test]
fn test_directory_missing() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzpiper")?;

    cmd.arg("not_a_real_directory").arg("-o").arg("-");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("is not a directory"));
    Ok(())
}

#[test]
fn test_detections_missing() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzpiper")?;

    cmd.arg("./tests/data/empty").arg("-o").arg("-");
    cmd.assert().failure().stderr(predicate::str::contains(
        "Could not find the detection table (allPeptides)",
    ));
    Ok(())
}

#[test]
fn test_malformed_arguments() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzpiper")?;

    cmd.arg("./tests/data/scenario").args(["-k", "0"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("must be at least one"));

    let mut cmd = Command::cargo_bin("mzpiper")?;

    cmd.arg("./tests/data/scenario").args(["-p", "-0.5"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("is less than zero"));
    Ok(())
}

#[test]
fn test_shape_column_missing() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzpiper")?;

    cmd.arg("./tests/data/scenario").arg("--tims-ms");
    cmd.assert().failure().stderr(predicate::str::contains(
        "is missing the required column \"Ion mobility index\"",
    ));
    Ok(())
}

#[test]
fn test_propagate_single_neighbor() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzpiper")?;
    cmd.env("RUST_LOG", "info");
    cmd.arg("./tests/data/scenario").args(["-o", "-", "-k", "1"]);
    let result = cmd.assert().success();
    result
        .stdout(predicate::str::starts_with(
            "Raw file\tPeptideID\tIntensity\n",
        ))
        .stdout(predicate::str::contains("A\t_PEPTIDEK_2\t100\n"))
        .stdout(predicate::str::contains("B\t_PEPTIDEK_2\t90\n"))
        .stdout(predicate::str::contains("\t80").not())
        .stderr(predicate::str::contains("Runs Processed: 1 | Skipped: 1"))
        .stderr(predicate::str::contains(
            "Propagated Identities: 1 | Low Confidence Discarded: 0",
        ));
    Ok(())
}

#[test]
fn test_propagate_weights_and_threshold() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzpiper")?;
    cmd.env("RUST_LOG", "info");
    cmd.arg("./tests/data/scenario")
        .args(["-k", "1", "--skip-weights", "false"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "Raw file\tPeptideID\tIntensity\tWeight\n",
        ))
        .stdout(predicate::str::contains("A\t_PEPTIDEK_2\t100\t1\n"))
        .stdout(predicate::str::contains("B\t_PEPTIDEK_2\t90\t1\n"));

    // A lone neighbor scores exactly one
    let mut cmd = Command::cargo_bin("mzpiper")?;
    cmd.env("RUST_LOG", "info");
    cmd.arg("./tests/data/scenario").args(["-k", "1", "-p", "1.0"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("B\t_PEPTIDEK_2").not())
        .stderr(predicate::str::contains(
            "Propagated Identities: 0 | Low Confidence Discarded: 1",
        ));
    Ok(())
}

#[test]
fn test_too_few_candidates() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzpiper")?;
    cmd.env("RUST_LOG", "info");
    cmd.arg("./tests/data/scenario").args(["-k", "3"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("B\t").not())
        .stderr(predicate::str::contains("too few candidates: 1"));
    Ok(())
}

#[test]
fn test_wide_layout() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzpiper")?;
    cmd.env("RUST_LOG", "info");
    cmd.arg("./tests/data/scenario")
        .args(["-k", "2", "--layout", "wide"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with("PeptideID\tA\tB\n"))
        .stdout(predicate::str::contains("_PEPTIDEK_2\t100\t90\n"));
    Ok(())
}

#[test]
fn test_run_groups() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzpiper")?;
    cmd.env("RUST_LOG", "info");
    cmd.arg("./tests/data/scenario")
        .args(["-k", "1", "-g", "./tests/data/groups.txt"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("B\t_PEPTIDEK_2").not())
        .stderr(predicate::str::contains("Runs Processed: 0"));
    Ok(())
}
