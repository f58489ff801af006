//! Integration tests for the fxgen CLI.
//!
//! Each test runs the binary against its own temporary project directory.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create an fxgen Command with a clean environment
fn fxgen() -> Command {
    let mut cmd = cargo_bin_cmd!("fxgen");
    for key in [
        "FXGEN_MAX_CONCURRENT",
        "FXGEN_PORT",
        "FXGEN_DB_PATH",
        "FXGEN_LOG",
        "RUST_LOG",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

fn init_project(dir: &TempDir) {
    fxgen()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
}

fn submit(dir: &TempDir, description: &str) {
    fxgen()
        .current_dir(dir.path())
        .args(["submit", description, "--platform", "glsl"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Queued job"));
}

/// Parse `fxgen status --json` output.
fn status_json(dir: &TempDir) -> serde_json::Value {
    let output = fxgen()
        .current_dir(dir.path())
        .args(["status", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}

fn first_job_id(dir: &TempDir) -> String {
    status_json(dir)["jobs"][0]["id"]
        .as_str()
        .unwrap()
        .to_string()
}

mod cli_basics {
    use super::*;

    #[test]
    fn test_fxgen_help() {
        fxgen()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("submit"));
    }

    #[test]
    fn test_fxgen_version() {
        fxgen().arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_structure() {
        let dir = create_temp_project();

        fxgen()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Created"))
            .stdout(predicate::str::contains("Database ready"));

        assert!(dir.path().join(".fxgen/fxgen.toml").exists());
        assert!(dir.path().join(".fxgen/fxgen.db").exists());
    }

    #[test]
    fn test_init_keeps_existing_config() {
        let dir = create_temp_project();
        init_project(&dir);
        let config_path = dir.path().join(".fxgen/fxgen.toml");
        fs::write(&config_path, "[scheduler]\nmax_concurrent = 3\n").unwrap();

        fxgen()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("max_concurrent = 3"));
    }

    #[test]
    fn test_project_dir_flag() {
        let dir = create_temp_project();
        fxgen()
            .arg("--project-dir")
            .arg(dir.path())
            .arg("init")
            .assert()
            .success();
        assert!(dir.path().join(".fxgen/fxgen.toml").exists());
    }
}

mod jobs {
    use super::*;

    #[test]
    fn test_submit_then_status() {
        let dir = create_temp_project();
        init_project(&dir);
        submit(&dir, "purple swirling portal");

        let status = status_json(&dir);
        assert_eq!(status["stats"]["queued"], 1);
        assert_eq!(status["jobs"][0]["status"], "queued");
        assert_eq!(status["jobs"][0]["progress"], 0);
        assert!(status["jobs"][0]["estimatedTime"].is_number());

        let id = first_job_id(&dir);
        fxgen()
            .current_dir(dir.path())
            .args(["status", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains(id.as_str()))
            .stdout(predicate::str::contains("queued"));
    }

    #[test]
    fn test_submit_rejects_invalid_platform() {
        let dir = create_temp_project();
        init_project(&dir);

        fxgen()
            .current_dir(dir.path())
            .args(["submit", "fire", "--platform", "unity"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid platform"));
    }

    #[test]
    fn test_submit_rejects_non_object_options() {
        let dir = create_temp_project();
        init_project(&dir);

        fxgen()
            .current_dir(dir.path())
            .args(["submit", "fire", "--options", "[1,2]"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("JSON object"));
    }

    #[test]
    fn test_submit_rejects_empty_description() {
        let dir = create_temp_project();
        init_project(&dir);

        fxgen()
            .current_dir(dir.path())
            .args(["submit", "   "])
            .assert()
            .failure()
            .stderr(predicate::str::contains("description"));
    }

    #[test]
    fn test_cancel_then_retry() {
        let dir = create_temp_project();
        init_project(&dir);
        submit(&dir, "gentle snow");
        let id = first_job_id(&dir);

        fxgen()
            .current_dir(dir.path())
            .args(["cancel", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cancelled"));

        let status = status_json(&dir);
        assert_eq!(status["jobs"][0]["status"], "failed");
        assert_eq!(status["jobs"][0]["error"], "cancelled");

        // A second cancel is a no-op.
        fxgen()
            .current_dir(dir.path())
            .args(["cancel", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("nothing to do"));

        fxgen()
            .current_dir(dir.path())
            .args(["retry", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("Requeued"));

        let status = status_json(&dir);
        assert_eq!(status["jobs"][0]["status"], "queued");
        assert!(status["jobs"][0].get("error").is_none());
    }

    #[test]
    fn test_retry_unknown_job_fails() {
        let dir = create_temp_project();
        init_project(&dir);

        fxgen()
            .current_dir(dir.path())
            .args(["retry", "does-not-exist"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No job"));
    }

    #[test]
    fn test_status_filter() {
        let dir = create_temp_project();
        init_project(&dir);
        submit(&dir, "one");
        submit(&dir, "two");

        let output = fxgen()
            .current_dir(dir.path())
            .args(["status", "--status", "completed", "--json"])
            .output()
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(body["jobs"].as_array().unwrap().len(), 0);
        assert_eq!(body["stats"]["queued"], 2);

        fxgen()
            .current_dir(dir.path())
            .args(["status", "--status", "running"])
            .assert()
            .failure();
    }

    #[test]
    fn test_effects_empty() {
        let dir = create_temp_project();
        init_project(&dir);

        fxgen()
            .current_dir(dir.path())
            .arg("effects")
            .assert()
            .success()
            .stdout(predicate::str::contains("No effects yet"));
    }
}

mod config {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = create_temp_project();

        fxgen()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[scheduler]"))
            .stdout(predicate::str::contains("max_concurrent = 5"));
    }

    #[test]
    fn test_config_validate_clean() {
        let dir = create_temp_project();
        init_project(&dir);

        fxgen()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid"));
    }

    #[test]
    fn test_config_validate_warns_on_out_of_range_concurrency() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".fxgen")).unwrap();
        fs::write(
            dir.path().join(".fxgen/fxgen.toml"),
            "[scheduler]\nmax_concurrent = 50\n",
        )
        .unwrap();

        fxgen()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("clamped"));
    }

    #[test]
    fn test_env_override_is_reported() {
        let dir = create_temp_project();

        fxgen()
            .current_dir(dir.path())
            .env("FXGEN_MAX_CONCURRENT", "lots")
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("FXGEN_MAX_CONCURRENT"));
    }

    #[test]
    fn test_config_init_writes_file() {
        let dir = create_temp_project();

        fxgen()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created fxgen.toml"));

        let content = fs::read_to_string(dir.path().join(".fxgen/fxgen.toml")).unwrap();
        assert!(content.contains("[scheduler]"));
    }
}
