use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../floorplan-io/tests/data")
        .join(name)
}

fn write_config(dir: &Path, input: &Path) -> PathBuf {
    let config = format!(
        "[logging]\nlevel = \"warn\"\n\n[ingest]\ninput = '{}'\nfootprints = '{}'\nscene_output = '{}'\nbounds_output = '{}'\n",
        input.display(),
        fixture("footprints.json").display(),
        dir.join("out/floorplan.svg").display(),
        dir.join("out/block_bounds.json").display(),
    );
    let path = dir.join("floorplan.toml");
    fs::write(&path, config).expect("写入配置");
    path
}

#[test]
fn ingests_fixture_and_prints_summary() {
    let dir = tempfile::tempdir().expect("创建临时目录");
    let config = write_config(dir.path(), &fixture("warehouse.dxf"));

    Command::cargo_bin("floorplan-ingest")
        .expect("二进制存在")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("entities: 13 read, 7 kept, 6 dropped"))
        .stdout(predicate::str::contains("no_footprint"))
        .stdout(predicate::str::contains("sha256"));

    let svg = fs::read_to_string(dir.path().join("out/floorplan.svg")).expect("读取 SVG");
    assert!(svg.contains(r#"data-block="HAAS_VF2""#));
    let bounds = fs::read_to_string(dir.path().join("out/block_bounds.json")).expect("读取包围盒");
    assert!(bounds.contains("\"HAAS_VF2\""));
}

#[test]
fn repeated_runs_produce_identical_digests() {
    let dir = tempfile::tempdir().expect("创建临时目录");
    let config = write_config(dir.path(), &fixture("warehouse.json"));

    let run = || {
        let output = Command::cargo_bin("floorplan-ingest")
            .expect("二进制存在")
            .arg("--config")
            .arg(&config)
            .output()
            .expect("运行导入");
        assert!(output.status.success());
        String::from_utf8(output.stdout).expect("UTF-8 输出")
    };
    assert_eq!(run(), run());
}

#[test]
fn missing_input_fails_with_diagnostic() {
    let dir = tempfile::tempdir().expect("创建临时目录");
    let config = write_config(dir.path(), &dir.path().join("missing.dxf"));

    Command::cargo_bin("floorplan-ingest")
        .expect("二进制存在")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.dxf"));
}

#[test]
fn malformed_dxf_fails_with_structure_error() {
    let dir = tempfile::tempdir().expect("创建临时目录");
    let input = dir.path().join("broken.dxf");
    fs::write(&input, "0\nSECTION\n2\nENTITIES\nabc\nLINE\n0\nENDSEC\n0\nEOF\n")
        .expect("写入 DXF");
    let config = write_config(dir.path(), &input);

    Command::cargo_bin("floorplan-ingest")
        .expect("二进制存在")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid document structure"));
    assert!(!dir.path().join("out/floorplan.svg").exists());
}

#[test]
fn unreadable_config_is_fatal() {
    let dir = tempfile::tempdir().expect("创建临时目录");
    let config = dir.path().join("broken.toml");
    fs::write(&config, "[ingest]\npercentile_low = \"low\"\n").expect("写入配置");

    Command::cargo_bin("floorplan-ingest")
        .expect("二进制存在")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken.toml"));
}
