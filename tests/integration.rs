use std::path::Path;

use duct::cmd;
use tempfile::TempDir;

use assert_cmd::cargo::cargo_bin;

fn write(dir: &Path, name: &str, contents: &[u8]) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path.to_str().unwrap().to_owned()
}

fn stdin_list(paths: &[&str]) -> Vec<u8> {
    paths
        .iter()
        .flat_map(|p| p.bytes().chain(std::iter::once(b'\n')))
        .collect()
}

#[test]
fn test_concrete_scenario() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dir = temp_dir.path();
    let a = write(dir, "a.txt", b"abcd");
    let b = write(dir, "b.txt", b"");
    let out = dir.join("out.bin");

    let output = cmd!(cargo_bin("refcat"), &out)
        .stdin_bytes(stdin_list(&[a.as_str(), "", b.as_str()]))
        .stderr_capture()
        .unchecked()
        .run()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    assert!(output.stderr.is_empty());
    assert_eq!(std::fs::read(&out).unwrap(), b"abcd");
}

#[test]
fn test_missing_target() {
    let temp_dir = TempDir::new().unwrap();
    let a = write(temp_dir.path(), "a.txt", b"abcd");

    let output = cmd!(cargo_bin("refcat"))
        .dir(temp_dir.path())
        .stdin_bytes(stdin_list(&[a.as_str()]))
        .stderr_capture()
        .unchecked()
        .run()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No target specified"), "{}", stderr);

    // only the fixture, nothing created
    let entries: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_missing_source_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let a = write(dir, "a", b"first");
    let c = write(dir, "c", b"third");
    let missing = dir.join("missing").to_str().unwrap().to_owned();
    let out = dir.join("out");

    let output = cmd!(cargo_bin("refcat"), &out)
        .stdin_bytes(stdin_list(&[a.as_str(), missing.as_str(), c.as_str()]))
        .stderr_capture()
        .unchecked()
        .run()
        .unwrap();

    // ENOENT
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed opening source"), "{}", stderr);
    assert!(stderr.contains(&missing), "{}", stderr);
    assert_eq!(stderr.lines().count(), 1);
    assert_eq!(std::fs::read(&out).unwrap(), b"first");
}

#[test]
fn test_runs_append_to_existing_target() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let a = write(dir, "a", b"alpha ");
    let b = write(dir, "b", b"beta ");
    let out = dir.join("out");

    for _ in 0..2 {
        cmd!(cargo_bin("refcat"), &out)
            .stdin_bytes(stdin_list(&[a.as_str(), b.as_str()]))
            .run()
            .unwrap();
    }

    assert_eq!(std::fs::read(&out).unwrap(), b"alpha beta alpha beta ");
}

#[test]
fn test_no_clone_output_is_identical() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let block: Vec<u8> = (0..(256 * 1024)).map(|i: u32| (i % 241) as u8).collect();
    let a = write(dir, "a", &block);
    let b = write(dir, "b", b"odd-sized tail");
    let input = stdin_list(&[a.as_str(), b.as_str(), a.as_str(), "", b.as_str()]);

    let linked = dir.join("linked");
    cmd!(cargo_bin("refcat"), &linked)
        .stdin_bytes(input.clone())
        .run()
        .unwrap();

    let copied = dir.join("copied");
    let output = cmd!(cargo_bin("refcat"), "--no-clone", "--summary", &copied)
        .stdin_bytes(input)
        .stderr_capture()
        .run()
        .unwrap();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("4 sources: 0 cloned, 4 copied, 1 blank lines skipped"),
        "{}",
        stderr
    );
    assert_eq!(
        std::fs::read(&linked).unwrap(),
        std::fs::read(&copied).unwrap()
    );
    assert_eq!(std::fs::metadata(&copied).unwrap().len(), 2 * (256 * 1024 + 14));
}

#[test]
fn test_verbose_logs_to_stderr() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let a = write(dir, "a", b"data");
    let out = dir.join("out");

    let output = cmd!(cargo_bin("refcat"), "-vv", &out)
        .stdin_bytes(stdin_list(&[a.as_str()]))
        .stdout_capture()
        .stderr_capture()
        .run()
        .unwrap();

    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("done"), "{}", stderr);
    assert_eq!(std::fs::read(&out).unwrap(), b"data");
}
