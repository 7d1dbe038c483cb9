// CLI entry point tests

use std::path::Path;
use std::process::Command;

use image::{GrayImage, Luma};

fn cargo_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_docseg"))
}

/// 200x100 page with ink bands at rows 10..26 and 60..81, columns 20..181.
fn write_two_line_page(path: &Path) {
    let img = GrayImage::from_fn(200, 100, |x, y| {
        if ((10..26).contains(&y) || (60..81).contains(&y)) && (20..181).contains(&x) {
            Luma([0])
        } else {
            Luma([255])
        }
    });
    img.save(path).expect("failed to write test image");
}

fn read_json(path: &Path) -> serde_json::Value {
    let text = std::fs::read_to_string(path).expect("output JSON should exist");
    serde_json::from_str(&text).expect("output should be valid JSON")
}

// ============================================================
// 1. No arguments shows usage and exits with failure
// ============================================================

#[test]
fn test_main_no_args_shows_usage() {
    let output = cargo_bin().output().expect("failed to execute binary");

    assert!(
        !output.status.success(),
        "should exit with failure when no args given"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Usage"),
        "stderr should contain 'Usage', got: {stderr}"
    );
}

// ============================================================
// 2. --help flag shows usage and exits with success
// ============================================================

#[test]
fn test_main_help_flag() {
    let output = cargo_bin()
        .arg("--help")
        .output()
        .expect("failed to execute binary");

    assert!(
        output.status.success(),
        "should exit with success for --help"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Usage"),
        "stderr should contain 'Usage', got: {stderr}"
    );
}

// ============================================================
// 3. --version flag shows version and exits with success
// ============================================================

#[test]
fn test_main_version_flag() {
    let output = cargo_bin()
        .arg("--version")
        .output()
        .expect("failed to execute binary");

    assert!(
        output.status.success(),
        "should exit with success for --version"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    let version = env!("CARGO_PKG_VERSION");
    assert!(
        stderr.contains(version),
        "stderr should contain version '{version}', got: {stderr}"
    );
}

// ============================================================
// 4. Nonexistent job file produces error
// ============================================================

#[test]
fn test_main_nonexistent_job_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = cargo_bin()
        .arg(dir.path().join("missing_jobs.yaml"))
        .output()
        .expect("failed to execute binary");

    assert!(
        !output.status.success(),
        "should exit with failure for nonexistent file"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("ERROR"),
        "stderr should contain error message, got: {stderr}"
    );
}

// ============================================================
// 5. Line job writes boxes as JSON (relative paths, settings.yaml picked up)
// ============================================================

#[test]
fn test_main_runs_line_job() {
    let dir = tempfile::tempdir().unwrap();
    write_two_line_page(&dir.path().join("page.png"));
    std::fs::write(
        dir.path().join("settings.yaml"),
        "preprocess:\n  pipeline: none\nparallel_workers: 2\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("jobs.yaml"),
        "jobs:\n  - input: page.png\n    output: lines.json\n",
    )
    .unwrap();

    let output = cargo_bin()
        .arg(dir.path().join("jobs.yaml"))
        .output()
        .expect("failed to execute binary");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "job should succeed, got: {stderr}");
    assert!(stderr.contains("OK:"), "stderr should report OK, got: {stderr}");

    let json = read_json(&dir.path().join("lines.json"));
    assert_eq!(json["mode"], "lines");
    let image = &json["images"][0];
    assert_eq!(image["width"], 200);
    assert_eq!(image["height"], 100);
    let boxes = image["boxes"].as_array().unwrap();
    assert_eq!(boxes.len(), 2);
    assert_eq!(boxes[0]["x"], 20);
    assert_eq!(boxes[0]["y"], 10);
    assert_eq!(boxes[1]["y"], 60);
}

// ============================================================
// 6. Confidence mode adds a score per box
// ============================================================

#[test]
fn test_main_confidence_mode() {
    let dir = tempfile::tempdir().unwrap();
    write_two_line_page(&dir.path().join("page.png"));
    std::fs::write(
        dir.path().join("jobs.yaml"),
        "jobs:\n  - input: [page.png]\n    output: scored.json\n    mode: confidence\n    pipeline: none\n",
    )
    .unwrap();

    let output = cargo_bin()
        .arg(dir.path().join("jobs.yaml"))
        .output()
        .expect("failed to execute binary");
    assert!(output.status.success());

    let json = read_json(&dir.path().join("scored.json"));
    for b in json["images"][0]["boxes"].as_array().unwrap() {
        let c = b["confidence"].as_f64().expect("confidence should be present");
        assert!((0.0..=1.0).contains(&c));
    }
}

// ============================================================
// 7. A missing input fails the run but keeps the other images
// ============================================================

#[test]
fn test_main_reports_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    write_two_line_page(&dir.path().join("page.png"));
    std::fs::write(
        dir.path().join("jobs.yaml"),
        "jobs:\n  - input: \"missing.png, page.png\"\n    output: out.json\n",
    )
    .unwrap();

    let output = cargo_bin()
        .arg(dir.path().join("jobs.yaml"))
        .output()
        .expect("failed to execute binary");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR"), "got: {stderr}");

    let json = read_json(&dir.path().join("out.json"));
    let images = json["images"].as_array().unwrap();
    assert_eq!(images.len(), 2);
    assert!(images[0]["error"].is_string());
    assert!(images[1]["boxes"].is_array());
}
