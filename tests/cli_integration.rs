//! CLI integration tests for omnibuild.
//!
//! These tests drive the binary against small recipe directories whose
//! steps only touch files, so they run anywhere a POSIX shell exists.

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get the omnibuild binary command, isolated from the user's config.
fn omnibuild(tmp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("omnibuild").unwrap();
    cmd.current_dir(tmp.path())
        .env("HOME", tmp.path())
        .args(["--no-color"]);
    cmd
}

fn write_recipe(tmp: &TempDir, file: &str, contents: &str) {
    let dir = tmp.path().join("recipes");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(file), contents).unwrap();
}

/// zlib <- openssl <- agent, every step touching a marker file.
fn agent_recipes() -> TempDir {
    let tmp = TempDir::new().unwrap();
    write_recipe(
        &tmp,
        "zlib.toml",
        r#"
[component]
name = "zlib"
default_version = "1.2.11"

[[steps]]
touch = "{{ install_dir }}/zlib-{{ version }}"

[[steps]]
touch = "{{ install_dir }}/zlib.dll"
when = { os = "windows" }
"#,
    );
    write_recipe(
        &tmp,
        "openssl.toml",
        r#"
[component]
name = "openssl"
default_version = "1.1.1l"

[[dependencies]]
name = "zlib"

[[steps]]
command = "touch {{ install_dir }}/openssl"
"#,
    );
    write_recipe(
        &tmp,
        "agent.toml",
        r#"
[component]
name = "agent"
default_version = "7.0.0"

[[dependencies]]
name = "openssl"

[[steps]]
mkdir = "{{ install_dir }}/bin"

[[steps]]
touch = "{{ install_dir }}/bin/agent"
"#,
    );
    tmp
}

fn build_args<'a>(tmp: &'a Path, targets: &[&'a str]) -> Vec<String> {
    let mut args = vec!["build".to_string()];
    args.extend(targets.iter().map(|t| t.to_string()));
    args.extend([
        "--os".to_string(),
        "linux".to_string(),
        "--cache-dir".to_string(),
        tmp.join("cache").display().to_string(),
        "--install-dir".to_string(),
        tmp.join("install").display().to_string(),
    ]);
    args
}

// ============================================================================
// omnibuild plan
// ============================================================================

#[test]
fn test_plan_list() {
    let tmp = agent_recipes();

    omnibuild(&tmp)
        .args(["plan", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("agent v7.0.0"))
        .stdout(predicate::str::contains("openssl v1.1.1l"))
        .stdout(predicate::str::contains("zlib v1.2.11"));
}

#[test]
fn test_plan_shows_dependency_order() {
    let tmp = agent_recipes();

    let output = omnibuild(&tmp)
        .args(["plan", "agent", "--os", "linux"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let zlib = stdout.find("zlib v1.2.11").unwrap();
    let openssl = stdout.find("openssl v1.1.1l").unwrap();
    let agent = stdout.find("agent v7.0.0").unwrap();
    assert!(zlib < openssl && openssl < agent);
    assert!(stdout.contains("(1 step, 1 skipped)"));
}

#[test]
fn test_plan_dot() {
    let tmp = agent_recipes();

    omnibuild(&tmp)
        .args(["plan", "agent", "--dot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("digraph"));
}

#[test]
fn test_plan_unknown_component() {
    let tmp = agent_recipes();

    omnibuild(&tmp)
        .args(["plan", "datadog-agent"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("`datadog-agent` is not defined"));
}

#[test]
fn test_plan_reports_cycle() {
    let tmp = TempDir::new().unwrap();
    write_recipe(
        &tmp,
        "a.toml",
        "[component]\nname = \"a\"\n\n[[dependencies]]\nname = \"b\"\n",
    );
    write_recipe(
        &tmp,
        "b.toml",
        "[component]\nname = \"b\"\n\n[[dependencies]]\nname = \"a\"\n",
    );

    omnibuild(&tmp)
        .args(["plan", "a"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("a -> b -> a"));
}

#[test]
fn test_missing_recipes_dir() {
    let tmp = TempDir::new().unwrap();

    omnibuild(&tmp)
        .args(["plan", "--list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("recipes directory not found"));
}

// ============================================================================
// omnibuild build
// ============================================================================

#[test]
fn test_build_installs_and_caches() {
    let tmp = agent_recipes();
    let install = tmp.path().join("install");

    omnibuild(&tmp)
        .args(build_args(tmp.path(), &["agent"]))
        .assert()
        .success()
        .stderr(predicate::str::contains("3 built, 0 fresh"));

    assert!(install.join("zlib-1.2.11").is_file());
    assert!(install.join("openssl").is_file());
    assert!(install.join("bin/agent").is_file());
    assert!(!install.join("zlib.dll").exists());

    // Nothing changed, so the second run builds nothing
    fs::remove_file(install.join("openssl")).unwrap();
    omnibuild(&tmp)
        .args(build_args(tmp.path(), &["agent"]))
        .assert()
        .success()
        .stderr(predicate::str::contains("Fresh zlib v1.2.11"))
        .stderr(predicate::str::contains("0 built, 3 fresh"));
    assert!(!install.join("openssl").exists());
}

#[test]
fn test_build_failure_exits_nonzero() {
    let tmp = agent_recipes();
    write_recipe(
        &tmp,
        "openssl.toml",
        r#"
[component]
name = "openssl"
default_version = "1.1.1l"

[[dependencies]]
name = "zlib"

[[steps]]
command = "echo 'no acceptable C compiler' >&2; exit 3"
"#,
    );

    omnibuild(&tmp)
        .args(build_args(tmp.path(), &["agent"]))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("openssl v1.1.1l"))
        .stderr(predicate::str::contains("exited with code 3"))
        .stderr(predicate::str::contains("no acceptable C compiler"));

    let install = tmp.path().join("install");
    assert!(install.join("zlib-1.2.11").is_file());
    assert!(!install.join("bin/agent").exists());
}

#[test]
fn test_build_version_override() {
    let tmp = agent_recipes();

    omnibuild(&tmp)
        .args(build_args(tmp.path(), &["zlib"]))
        .args(["--version-override", "zlib=1.2.8"])
        .assert()
        .success();

    assert!(tmp.path().join("install/zlib-1.2.8").is_file());
}

#[test]
fn test_build_windows_steps() {
    let tmp = agent_recipes();

    omnibuild(&tmp)
        .args([
            "build",
            "zlib",
            "--os",
            "windows",
            "--cache-dir",
            "cache",
            "--install-dir",
            "install",
        ])
        .assert()
        .success();

    assert!(tmp.path().join("install/zlib.dll").is_file());
}

#[test]
fn test_build_json_events() {
    let tmp = agent_recipes();

    omnibuild(&tmp)
        .args(build_args(tmp.path(), &["openssl"]))
        .args(["--message-format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""reason":"component-started""#))
        .stdout(predicate::str::contains(r#""reason":"build-finished""#))
        .stdout(predicate::str::contains(r#""success":true"#));
}

#[test]
fn test_build_requires_target() {
    let tmp = agent_recipes();

    omnibuild(&tmp).args(["build"]).assert().failure();
}

// ============================================================================
// omnibuild clean
// ============================================================================

#[test]
fn test_clean_forgets_builds() {
    let tmp = agent_recipes();
    let cache = tmp.path().join("cache");

    omnibuild(&tmp)
        .args(build_args(tmp.path(), &["zlib"]))
        .assert()
        .success();

    omnibuild(&tmp)
        .args(["clean", "--cache-dir"])
        .arg(&cache)
        .assert()
        .success()
        .stderr(predicate::str::contains("Removed 1 build record"));

    omnibuild(&tmp)
        .args(build_args(tmp.path(), &["zlib"]))
        .assert()
        .success()
        .stderr(predicate::str::contains("1 built, 0 fresh"));
}

// ============================================================================
// omnibuild completions
// ============================================================================

#[test]
fn test_completions_bash() {
    let tmp = TempDir::new().unwrap();

    omnibuild(&tmp)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("omnibuild"));
}
