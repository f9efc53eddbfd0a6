mod common;

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value as JsonValue;

use common::{PEOPLE_CSV, TEAMS_CSV, TestWorkspace};

#[test]
fn probe_prints_fields_and_primary_key() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("people.csv", PEOPLE_CSV);
    cargo_bin_cmd!("tabular-query")
        .args(["probe", "-i", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("(computed)"))
        .stdout(predicate::str::contains("boolean"))
        .stdout(predicate::str::contains("4 row(s), primary key id"));
}

#[test]
fn probe_writes_yaml_and_json_metadata() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("people.csv", PEOPLE_CSV);
    let yaml = workspace.file("people.yml");
    let json = workspace.file("people.json");

    for meta in [&yaml, &json] {
        cargo_bin_cmd!("tabular-query")
            .args([
                "probe",
                "-i",
                input.to_str().unwrap(),
                "--meta",
                meta.to_str().unwrap(),
            ])
            .assert()
            .success();
    }

    let yaml_text = fs::read_to_string(&yaml).expect("read yaml metadata");
    assert!(yaml_text.contains("primaryKey: id"));
    assert!(yaml_text.contains("sourceSchema:"));

    let report: JsonValue =
        serde_json::from_str(&fs::read_to_string(&json).expect("read json metadata"))
            .expect("parse json metadata");
    assert_eq!(report["rowCount"], 4);
    assert_eq!(report["fields"].as_array().map(Vec::len), Some(7));
    assert_eq!(report["sourceSchema"]["version"], 1);
    assert_eq!(report["sourceSchema"]["columns"][3]["type"], "boolean");
}

#[test]
fn probe_reports_header_only_files() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("header.csv", "id,name\n");
    cargo_bin_cmd!("tabular-query")
        .args(["probe", "-i", input.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no data rows"));
}

#[test]
fn probe_reports_empty_files() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("empty.csv", "");
    cargo_bin_cmd!("tabular-query")
        .args(["probe", "-i", input.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("File is empty"));
}

#[test]
fn probe_enforces_max_bytes() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("people.csv", PEOPLE_CSV);
    cargo_bin_cmd!("tabular-query")
        .args(["probe", "-i", input.to_str().unwrap(), "--max-bytes", "16"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exceeds the 16 byte limit"));
}

#[test]
fn probe_reads_tsv_by_extension() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("scores.tsv", "name\tscore\nada\t9\n");
    cargo_bin_cmd!("tabular-query")
        .args(["probe", "-i", input.to_str().unwrap(), "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"score\""));
}

#[test]
fn query_filters_sorts_and_projects() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("people.csv", PEOPLE_CSV);
    let assert = cargo_bin_cmd!("tabular-query")
        .args([
            "query",
            "-i",
            input.to_str().unwrap(),
            "--filter",
            "age > 18",
            "--sort",
            "age:desc",
            "--columns",
            "name,age",
        ])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let lines = stdout.lines().collect::<Vec<_>>();
    assert!(lines[0].starts_with("name"));
    assert!(lines[2].starts_with("Cy, Jr."));
    assert!(lines[3].starts_with("Ada"));
    assert_eq!(lines.len(), 4);
}

#[test]
fn query_show_sql_prints_parameterised_statement() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("people.csv", PEOPLE_CSV);
    cargo_bin_cmd!("tabular-query")
        .args([
            "query",
            "-i",
            input.to_str().unwrap(),
            "--filter",
            "name contains Jr",
            "--limit",
            "5",
            "--show-sql",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "SELECT * FROM \"people\" AS t0 WHERE t0.\"name\" LIKE ? ESCAPE '\\' LIMIT 5",
        ))
        .stdout(predicate::str::contains("-- params: [\"%Jr%\"]"));
}

#[test]
fn query_joins_another_file() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("people.csv", PEOPLE_CSV);
    let teams = workspace.write("teams.csv", TEAMS_CSV);
    let join = format!("{}:team_id=tid:left", teams.display());
    let assert = cargo_bin_cmd!("tabular-query")
        .args([
            "query",
            "-i",
            input.to_str().unwrap(),
            "--join",
            join.as_str(),
            "--sort",
            "id",
            "--json",
        ])
        .assert()
        .success();
    let frame: JsonValue =
        serde_json::from_slice(&assert.get_output().stdout).expect("query json output");
    let rows = frame["rows"].as_array().expect("rows array");
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0]["team"], "red");
    assert_eq!(rows[3]["team"], JsonValue::Null);
}

#[test]
fn query_rejects_unknown_columns() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("people.csv", PEOPLE_CSV);
    cargo_bin_cmd!("tabular-query")
        .args(["query", "-i", input.to_str().unwrap(), "--sort", "salary"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Column 'salary' referenced by sort does not exist"));
}

#[test]
fn query_uses_custom_table_name() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("people.csv", PEOPLE_CSV);
    cargo_bin_cmd!("tabular-query")
        .args([
            "query",
            "-i",
            input.to_str().unwrap(),
            "--table",
            "staff",
            "--group-by",
            "vip",
            "--columns",
            "vip",
            "--show-sql",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "SELECT t0.\"vip\" FROM \"staff\" AS t0 GROUP BY t0.\"vip\"",
        ));
}

#[test]
fn query_writes_csv_output_file() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("people.csv", PEOPLE_CSV);
    let output = workspace.file("adults.csv");
    cargo_bin_cmd!("tabular-query")
        .args([
            "query",
            "-i",
            input.to_str().unwrap(),
            "--filter",
            "age > 18",
            "--columns",
            "id,name",
            "--sort",
            "id",
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let written = fs::read_to_string(&output).expect("read csv output");
    assert_eq!(written, "\"id\",\"name\"\n\"1\",\"Ada\"\n\"3\",\"Cy, Jr.\"\n");
}
