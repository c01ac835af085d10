//! End-to-end CLI tests over real script files.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn write_script(dir: &std::path::Path, name: &str, body: serde_json::Value) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(&body).unwrap()).unwrap();
    path
}

#[test]
fn resolve_prints_the_argument_dump() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "boot.json",
        serde_json::json!({
            "params": {"memory_megs": {"type": "int", "default": 4096}}
        }),
    );

    Command::cargo_bin("parlay")
        .unwrap()
        .args(["resolve"])
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"value\": 4096"))
        .stdout(predicate::str::contains("\"state\": \"default\""));
}

#[test]
fn overrides_take_precedence_and_decode_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "boot.json",
        serde_json::json!({
            "params": {
                "memory_megs": {"type": "int", "default": 4096},
                "name": {"type": "str", "default": "qsp"}
            }
        }),
    );

    Command::cargo_bin("parlay")
        .unwrap()
        .args(["resolve"])
        .arg(&script)
        .args(["-p", "memory_megs=8192", "-p", "name=carl"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"value\": 8192"))
        .stdout(predicate::str::contains("\"value\": \"carl\""))
        .stdout(predicate::str::contains("\"state\": \"user\""));
}

#[test]
fn preset_args_sit_between_script_and_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "boot.json",
        serde_json::json!({
            "params": {"memory_megs": {"type": "int", "default": 4096}}
        }),
    );
    let preset = write_script(
        dir.path(),
        "big.json",
        serde_json::json!({
            "args": {"memory_megs": 8192}
        }),
    );

    Command::cargo_bin("parlay")
        .unwrap()
        .args(["resolve"])
        .arg(&script)
        .arg("--preset")
        .arg(&preset)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"value\": 8192"));

    Command::cargo_bin("parlay")
        .unwrap()
        .args(["resolve"])
        .arg(&script)
        .arg("--preset")
        .arg(&preset)
        .args(["-p", "memory_megs=16384"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"value\": 16384"));
}

#[test]
fn resolution_errors_print_the_name_to_message_map() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "boot.json",
        serde_json::json!({
            "params": {"net": {"mtu": {"type": "int", "required": true}}}
        }),
    );

    Command::cargo_bin("parlay")
        .unwrap()
        .args(["resolve"])
        .arg(&script)
        .assert()
        .failure()
        .stderr(predicate::str::contains("net:mtu"))
        .stderr(predicate::str::contains("missing required parameter"));
}

#[test]
fn params_prints_the_declaration_dump_with_advanced_filtering() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "boot.json",
        serde_json::json!({
            "params": {
                "memory_megs": {"type": "int", "default": 4096},
                "tuning": {"type": "int", "default": 0, "advanced": 3}
            }
        }),
    );

    Command::cargo_bin("parlay")
        .unwrap()
        .args(["params"])
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"full-type\": \"int\""))
        .stdout(predicate::str::contains("memory_megs"))
        .stdout(predicate::str::contains("tuning").not());

    Command::cargo_bin("parlay")
        .unwrap()
        .args(["params"])
        .arg(&script)
        .args(["--advanced", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tuning"));
}

#[test]
fn imports_resolve_relative_to_the_importing_script() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "net.json",
        serde_json::json!({
            "params": {"mtu": {"type": "int", "default": 1500}}
        }),
    );
    let script = write_script(
        dir.path(),
        "boot.json",
        serde_json::json!({
            "params": {"network": {"import": "%script%/net.json"}}
        }),
    );

    Command::cargo_bin("parlay")
        .unwrap()
        .args(["resolve"])
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"mtu\""))
        .stdout(predicate::str::contains("\"value\": 1500"));
}
