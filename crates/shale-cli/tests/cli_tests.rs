use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Project {
    dir: TempDir,
}

impl Project {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let migrations = dir.path().join("migrations");
        fs::create_dir_all(&migrations).unwrap();
        fs::write(
            migrations.join("001_users.up.sql"),
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);",
        )
        .unwrap();
        fs::write(migrations.join("001_users.down.sql"), "DROP TABLE users;").unwrap();
        fs::write(
            migrations.join("002_posts.up.sql"),
            "CREATE TABLE posts (id INTEGER PRIMARY KEY);\nGO\nCREATE INDEX posts_id ON posts (id);\n",
        )
        .unwrap();
        fs::write(migrations.join("002_posts.down.sql"), "DROP TABLE posts;").unwrap();
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn database(&self) -> PathBuf {
        self.path().join("app.db")
    }

    /// `shale` pointed at this project's database and migrations
    fn shale(&self) -> Command {
        let mut cmd = Command::cargo_bin("shale").unwrap();
        cmd.current_dir(self.path())
            .env_remove("SHALE_CONFIG")
            .env_remove("SHALE_DATABASE")
            .env_remove("RUST_LOG")
            .arg("--database")
            .arg(self.database())
            .arg("--migrations-dir")
            .arg(self.path().join("migrations"));
        cmd
    }

    fn create_database(&self) {
        self.shale().args(["db", "create"]).assert().success();
    }
}

#[test]
fn test_help_mentions_binary() {
    Command::cargo_bin("shale")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("shale"));
}

#[test]
fn test_status_without_database_lists_pending() {
    let project = Project::new();
    project
        .shale()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("[pending] 001  users"))
        .stdout(predicate::str::contains("[pending] 002  posts"));
}

#[test]
fn test_up_without_database_fails() {
    let project = Project::new();
    project.shale().args(["up", "--all"]).assert().failure();
    assert!(!project.database().exists());
}

#[test]
fn test_db_lifecycle() {
    let project = Project::new();

    project.shale().args(["db", "exists"]).assert().code(1);
    project.create_database();
    assert!(project.database().exists());
    project.shale().args(["db", "exists"]).assert().success();
    project.shale().args(["db", "check"]).assert().success();

    project.shale().args(["db", "create"]).assert().failure();
    project.shale().args(["db", "drop"]).assert().failure();
    project
        .shale()
        .args(["db", "drop", "--force"])
        .assert()
        .success();
    assert!(!project.database().exists());
}

#[test]
fn test_up_and_down() {
    let project = Project::new();
    project.create_database();

    project
        .shale()
        .arg("up")
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied 001 users"))
        .stdout(predicate::str::contains("002").not());

    project
        .shale()
        .args(["up", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied 002 posts"));

    project
        .shale()
        .arg("up")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to do"));

    project
        .shale()
        .arg("down")
        .assert()
        .success()
        .stdout(predicate::str::contains("Reverted 002 posts"))
        .stdout(predicate::str::contains("001").not());

    project
        .shale()
        .args(["down", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reverted 001 users"));
}

#[test]
fn test_up_to_target() {
    let project = Project::new();
    project.create_database();

    project
        .shale()
        .args(["up", "--to", "001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied 001 users"));

    project
        .shale()
        .args(["up", "--to", "999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("999"));
}

#[test]
fn test_status_json() {
    let project = Project::new();
    project.create_database();
    project.shale().args(["up", "--all"]).assert().success();

    let output = project
        .shale()
        .args(["status", "-f", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let migrations = value["migrations"].as_array().unwrap();
    assert_eq!(migrations.len(), 2);
    assert_eq!(migrations[0]["version"], "001");
    assert_eq!(migrations[0]["status"], "applied");
    assert_eq!(migrations[1]["status"], "applied");
    assert!(value["orphaned"].as_array().unwrap().is_empty());
}

#[test]
fn test_apply_revert_and_mark() {
    let project = Project::new();
    project.create_database();

    project
        .shale()
        .args(["apply", "002"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied 002 posts"));
    project.shale().args(["apply", "002"]).assert().failure();

    project
        .shale()
        .args(["revert", "002"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reverted 002 posts"));
    project.shale().args(["revert", "002"]).assert().failure();

    project
        .shale()
        .args(["mark", "001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recorded 001 users"));
    project
        .shale()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("[applied] 001  users"));

    project.shale().args(["apply", "777"]).assert().failure();
}

#[test]
fn test_failed_migration_leaves_no_trace() {
    let project = Project::new();
    fs::write(
        project.path().join("migrations").join("003_broken.up.sql"),
        "CREATE TABLE broken (id INTEGER);\nGO\nTHIS IS NOT SQL;",
    )
    .unwrap();
    project.create_database();

    project
        .shale()
        .args(["up", "--all"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("003"))
        .stderr(predicate::str::contains("batch 2"));

    project
        .shale()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("[applied] 002  posts"))
        .stdout(predicate::str::contains("[pending] 003  broken"));

    project
        .shale()
        .arg("script")
        .assert()
        .success()
        .stdout(predicate::str::contains("CREATE TABLE users"))
        .stdout(predicate::str::contains("broken").not());
}

#[test]
fn test_drift_blocks_down() {
    let project = Project::new();
    project.create_database();
    project.shale().args(["up", "--all"]).assert().success();

    fs::write(
        project.path().join("migrations").join("001_users.up.sql"),
        "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT);",
    )
    .unwrap();

    project
        .shale()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("[drifted] 001"));

    project
        .shale()
        .arg("down")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Drift detected"));
}

#[test]
fn test_table_commands() {
    let project = Project::new();
    project.create_database();

    project
        .shale()
        .args(["--table", "history", "table", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created tracking table history"));
    project
        .shale()
        .args(["--table", "history", "table", "init"])
        .assert()
        .failure();
    project
        .shale()
        .args(["--table", "history", "table", "drop", "--force"])
        .assert()
        .success();
    project
        .shale()
        .args(["--table", "history", "table", "drop", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_script_to_file_with_data() {
    let project = Project::new();
    project.create_database();
    project.shale().args(["up", "--all"]).assert().success();

    let out = project.path().join("schema.sql");
    project
        .shale()
        .args(["script", "--data", "--output"])
        .arg(&out)
        .assert()
        .success();

    let script = fs::read_to_string(out).unwrap();
    assert!(script.contains("CREATE TABLE posts"));
    assert!(script.contains("\nGO\n"));
    assert!(script.contains("INSERT INTO"));
}

#[test]
fn test_new_scaffolds_files() {
    let project = Project::new();

    project
        .shale()
        .args(["new", "Add Comments", "--version", "003"])
        .assert()
        .success()
        .stdout(predicate::str::contains("003_add_comments.up.sql"));

    let migrations = project.path().join("migrations");
    assert!(migrations.join("003_add_comments.up.sql").exists());
    assert!(migrations.join("003_add_comments.down.sql").exists());

    project
        .shale()
        .args(["new", "add comments", "--version", "003"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    project
        .shale()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("[pending] 003  add_comments"));
}

#[test]
fn test_config_commands() {
    let temp = TempDir::new().unwrap();
    let shale = || {
        let mut cmd = Command::cargo_bin("shale").unwrap();
        cmd.current_dir(temp.path())
            .env_remove("SHALE_CONFIG")
            .env_remove("SHALE_DATABASE");
        cmd
    };

    shale()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("shale.toml"));

    shale().args(["config", "init"]).assert().success();
    assert!(temp.path().join("shale.toml").exists());
    shale().args(["config", "init"]).assert().failure();
    shale().args(["config", "init", "--force"]).assert().success();

    shale()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("table_name = shale_migrations"));

    shale()
        .args(["--database", "other.db", "config", "show", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"database\": \"other.db\""));
}

#[test]
fn test_unsupported_dialect() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("shale.toml"), "dialect = \"oracle\"\n").unwrap();

    Command::cargo_bin("shale")
        .unwrap()
        .current_dir(temp.path())
        .env_remove("SHALE_CONFIG")
        .env_remove("SHALE_DATABASE")
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported dialect"));
}

#[test]
fn test_completions() {
    Command::cargo_bin("shale")
        .unwrap()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("shale"));
}
