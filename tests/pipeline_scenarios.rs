//! End-to-end pipeline scenarios against fake toolchain scripts

#![cfg(unix)]

use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SAMPLE: &str = r#"features
    Pizza
        mandatory
            Base
        optional
            Cheese

constraints
    Cheese => Base
"#;

/// Copies the variables file to the order output (`$3`)
const ORDER_OK: &str = "#!/bin/sh\ncp \"$1\" \"$3\"\n";

const ORDER_SLOW: &str = "#!/bin/sh\nsleep 30\n";

/// Writes a DDDMP header to `-out` (`$2`) and reports its time
const COMPILE_OK: &str = r#"#!/bin/sh
printf '.ver DDDMP-2.0\n.mode A\n.nnodes 42\n.nvars 3\n' > "$2"
echo "Building BDD"
echo "Time: 12 ms"
"#;

const COMPILE_NO_MARKER: &str = r#"#!/bin/sh
printf '.nnodes 42\n' > "$2"
echo "Aborted"
"#;

const COMPILE_NO_ARTIFACT: &str = "#!/bin/sh\necho \"Time: 3 ms\"\n";

const COUNT_OK: &str = "#!/bin/sh\necho 123456789\n";

struct Toolbox {
    dir: TempDir,
    config: PathBuf,
}

impl Toolbox {
    fn new(orderer: &str, compiler: &str, timeout_secs: u64) -> Self {
        let dir = TempDir::new().unwrap();
        let tools = dir.path().join("tools");
        fs::create_dir_all(&tools).unwrap();

        let order = script(&tools, "order.sh", orderer);
        let compile = script(&tools, "compile.sh", compiler);
        let count = script(&tools, "count.sh", COUNT_OK);

        let config = dir.path().join("test.toml");
        fs::write(
            &config,
            format!(
                "[tools]\norderer = \"{}\"\norder_flags = []\ncompiler = \"{}\"\ncounter = \"{}\"\n\n[pipeline]\ntimeout_secs = {}\n",
                order.display(),
                compile.display(),
                count.display(),
                timeout_secs
            ),
        )
        .unwrap();

        fs::create_dir_all(dir.path().join("models")).unwrap();
        Self { dir, config }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn add_model(&self, name: &str) {
        fs::write(self.path().join("models").join(format!("{}.uvl", name)), SAMPLE).unwrap();
    }

    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("uvl2bdd"));
        cmd.current_dir(self.path())
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path().join(".xdg"))
            .env_remove("RUST_LOG")
            .arg("--config")
            .arg(&self.config);
        cmd
    }

    /// Ledger rows without the header, split on commas
    fn ledger_rows(&self) -> Vec<Vec<String>> {
        let content = fs::read_to_string(self.path().join("results.csv")).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("Model,Features,Constraints"));
        lines
            .map(|l| l.split(',').map(str::to_string).collect())
            .collect()
    }
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn test_successful_run_records_every_column() {
    let toolbox = Toolbox::new(ORDER_OK, COMPILE_OK, 30);
    toolbox.add_model("pizza");

    toolbox
        .cmd()
        .args(["run", "models", "--ledger", "results.csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 succeeded"));

    let rows = toolbox.ledger_rows();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.len(), 11);
    assert_eq!(row[0], "pizza");
    assert_eq!(row[1], "3");
    assert_eq!(row[2], "1");
    assert_eq!(row[4], "3");
    assert_eq!(row[5], "4");
    assert_eq!(row[8], "42");
    assert_eq!(row[9], "1.23e8");
    assert_eq!(row[10], "Success");
    for time in [&row[3], &row[6], &row[7]] {
        assert!(time.parse::<f64>().is_ok(), "time column {:?}", time);
    }

    let models = toolbox.path().join("models");
    assert!(models.join("pizza-sifting.var").exists());
    assert!(models.join("pizza.dddmp").exists());
}

#[test]
fn test_rerun_skips_recorded_models() {
    let toolbox = Toolbox::new(ORDER_OK, COMPILE_OK, 30);
    toolbox.add_model("pizza");

    toolbox
        .cmd()
        .args(["run", "models", "--ledger", "results.csv"])
        .assert()
        .success();

    toolbox.add_model("pizza_v2");
    let assert = toolbox
        .cmd()
        .args(["--format", "json", "run", "models", "--ledger", "results.csv"])
        .assert()
        .success();

    let json: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(json["summary"]["discovered"], 2);
    assert_eq!(json["summary"]["skipped"], 1);
    assert_eq!(json["summary"]["succeeded"], 1);

    let names: Vec<_> = toolbox.ledger_rows().into_iter().map(|r| r[0].clone()).collect();
    assert_eq!(names, vec!["pizza", "pizza_v2"]);
}

#[test]
fn test_order_timeout_is_recorded_and_batch_continues() {
    let toolbox = Toolbox::new(ORDER_SLOW, COMPILE_OK, 1);
    toolbox.add_model("first");
    toolbox.add_model("second");

    toolbox
        .cmd()
        .args(["run", "models", "--ledger", "results.csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 failed"))
        .stdout(predicate::str::contains("OrderTimeout"));

    let rows = toolbox.ledger_rows();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row[5], "4");
        assert_eq!(row[6], "Timeout");
        assert_eq!(row[7], "-");
        assert_eq!(row[9], "-");
        assert_eq!(row[10], "OrderTimeout");
    }
}

#[test]
fn test_missing_time_marker_is_build_timeout() {
    let toolbox = Toolbox::new(ORDER_OK, COMPILE_NO_MARKER, 30);
    toolbox.add_model("pizza");

    toolbox
        .cmd()
        .args(["run", "models", "--ledger", "results.csv"])
        .assert()
        .success();

    let row = &toolbox.ledger_rows()[0];
    assert!(row[6].parse::<f64>().is_ok());
    assert_eq!(row[7], "Timeout");
    assert_eq!(row[8], "-");
    assert_eq!(row[10], "BuildTimeout");
}

#[test]
fn test_missing_artifact_is_missing_file() {
    let toolbox = Toolbox::new(ORDER_OK, COMPILE_NO_ARTIFACT, 30);
    toolbox.add_model("pizza");

    toolbox
        .cmd()
        .args(["run", "models", "--ledger", "results.csv"])
        .assert()
        .success();

    let row = &toolbox.ledger_rows()[0];
    assert_eq!(row[7], "Error");
    assert_eq!(row[10], "MissingFile");
}

#[test]
fn test_build_mode_uses_existing_logic_without_ledger() {
    let toolbox = Toolbox::new(ORDER_OK, COMPILE_OK, 30);
    toolbox.add_model("pizza");

    toolbox
        .cmd()
        .args(["compile", "models", "--out", "logic"])
        .assert()
        .success();

    let assert = toolbox
        .cmd()
        .args(["--format", "json", "build", "logic", "--bdd-dir", "bdds"])
        .assert()
        .success();

    let json: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(json["summary"]["discovered"], 1);
    assert_eq!(json["summary"]["succeeded"], 1);
    assert_eq!(json["models"][0]["Status"], "Success");
    assert_eq!(json["models"][0]["BDD Nodes"], "42");

    assert!(toolbox.path().join("bdds/pizza.dddmp").exists());
    assert!(!toolbox.path().join("results.csv").exists());
}

#[test]
fn test_build_pair_without_expressions_fails() {
    let toolbox = Toolbox::new(ORDER_OK, COMPILE_OK, 30);
    fs::write(toolbox.path().join("m.var"), "A B").unwrap();

    toolbox
        .cmd()
        .args(["build", "--var", "m.var", "--exp", "m.exp"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("MissingFile"))
        .stderr(predicate::str::contains("1 build(s) failed"));
}
