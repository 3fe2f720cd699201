use assert_cmd::prelude::*;
use predicates::str::contains;
use std::fs;
use std::io::Write;
use std::process::Command;
use tempfile::{tempdir, NamedTempFile};

fn write_triangle() -> NamedTempFile {
    let obj = "# one triangle facing +Z\n\
               v -1 -1 0\n\
               v 1 -1 0\n\
               v 0 1 0\n\
               vn 0 0 1\n\
               f 1//1 2//1 3//1\n";
    let mut tmp = NamedTempFile::new().expect("temp mesh");
    tmp.write_all(obj.as_bytes()).expect("write mesh");
    tmp
}

#[test]
fn cli_renders_mesh_in_software_and_prints_summary() {
    let mesh = write_triangle();
    let mut cmd = Command::cargo_bin("lambert-shader").expect("binary exists");
    cmd.arg(mesh.path())
        .arg("--size")
        .arg("64x48")
        .arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Loaded mesh with 3 vertices (1 triangles)"))
        .stdout(contains("Lighting: direction=(1.00, 1.00, 1.00) ambient=0.20"))
        .stdout(contains("Rendered 64x48 frame (backend: software)"))
        .stdout(contains("Covered pixels:"))
        .stdout(contains("Average color: ("));
}

#[test]
fn cli_reads_lighting_and_writes_ppm() {
    let mesh = write_triangle();
    let dir = tempdir().expect("temp dir");
    let lighting = dir.path().join("lighting.xml");
    fs::write(
        &lighting,
        "<lighting><direction>0 0 1</direction><ambient>0.5</ambient></lighting>",
    )
    .expect("write lighting");
    let output = dir.path().join("frame.ppm");

    let mut cmd = Command::cargo_bin("lambert-shader").expect("binary exists");
    cmd.arg(mesh.path())
        .arg("--lighting")
        .arg(&lighting)
        .arg("--size")
        .arg("16x8")
        .arg("--output")
        .arg(&output)
        .arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("direction=(0.00, 0.00, 1.00) ambient=0.50"));

    let bytes = fs::read(&output).expect("ppm written");
    assert!(bytes.starts_with(b"P6\n16 8\n255\n"));
    assert_eq!(bytes.len(), b"P6\n16 8\n255\n".len() + 16 * 8 * 3);
}

#[test]
fn cli_reports_missing_mesh() {
    let mut cmd = Command::cargo_bin("lambert-shader").expect("binary exists");
    cmd.arg("does-not-exist.obj").arg("--summary-only");
    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("Error: failed to read mesh"));
}

#[test]
fn cli_rejects_invalid_lighting() {
    let mesh = write_triangle();
    let mut lighting = NamedTempFile::new().expect("temp lighting");
    lighting
        .write_all(b"<lighting><direction>0 0 0</direction></lighting>")
        .expect("write lighting");

    let mut cmd = Command::cargo_bin("lambert-shader").expect("binary exists");
    cmd.arg(mesh.path())
        .arg("--lighting")
        .arg(lighting.path())
        .arg("--summary-only");
    cmd.assert()
        .failure()
        .stderr(contains("invalid lighting file"));
}

#[test]
fn cli_without_mesh_renders_default_box() {
    let mut cmd = Command::cargo_bin("lambert-shader").expect("binary exists");
    cmd.arg("--size").arg("32x32").arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Built default box with 24 vertices (12 triangles)"))
        .stdout(contains("Rendered 32x32 frame (backend: software)"));
}

#[test]
fn cli_reads_json_lighting() {
    let mesh = write_triangle();
    let dir = tempdir().expect("temp dir");
    let lighting = dir.path().join("lighting.json");
    fs::write(&lighting, r#"{"ambient": 0.35, "base_color": [1, 0, 0]}"#).expect("write lighting");

    let mut cmd = Command::cargo_bin("lambert-shader").expect("binary exists");
    cmd.arg(mesh.path())
        .arg("--lighting")
        .arg(&lighting)
        .arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("ambient=0.35 diffuse=0.80 color=(1.00, 0.00, 0.00)"));
}
