//! CLI integration tests for polydb.
//!
//! These tests verify command-line argument parsing, help output,
//! command results and exit codes for various error conditions.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the polydb binary.
fn cmd() -> Command {
    Command::cargo_bin("polydb").unwrap()
}

const STOCK: &str = "\
tables:
  - name: Stock
    columns:
      - name: Id
        data_type: Int32
        identity: true
        primary_key: true
        nullable: false
      - name: Sku
        data_type: String
        length: 20
        nullable: false
    indexes:
      - name: IU_Stock_Sku
        columns: [Sku]
        unique: true
";

fn schema_file(content: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    write!(file, "{}", content).unwrap();
    file
}

fn stock_with_qty() -> String {
    STOCK.replace(
        "    indexes:",
        "      - name: Qty\n        data_type: Int32\n    indexes:",
    )
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("candidates"))
        .stdout(predicate::str::contains("paginate"))
        .stdout(predicate::str::contains("ddl"))
        .stdout(predicate::str::contains("diff"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("polydb"));
}

#[test]
fn test_global_flags_and_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--connections"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("[default: warn]"));
}

#[test]
fn test_diff_subcommand_help() {
    cmd()
        .args(["diff", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--migration"))
        .stdout(predicate::str::contains("--server-version"));
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

// =============================================================================
// Command Results
// =============================================================================

#[test]
fn test_candidates_for_platform() {
    cmd()
        .args([
            "candidates", "sqlite", "--os", "linux", "--arch", "x64", "--runtime", "8.0",
        ])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "Microsoft.Data.Sqlite.linux-x64\nMicrosoft.Data.Sqlite.linux\nMicrosoft.Data.Sqlite_net80\n",
        ))
        .stdout(predicate::str::contains("Microsoft.Data.Sqlite_net70"))
        .stdout(predicate::str::contains("Microsoft.Data.Sqlite_net90").not())
        .stdout(predicate::str::ends_with(
            "Microsoft.Data.Sqlite_netstandard20\nMicrosoft.Data.Sqlite\n",
        ));
}

#[test]
fn test_paginate_per_backend() {
    cmd()
        .args(["-c", "Provider=mysql", "paginate", "SELECT * FROM t"])
        .args(["--start", "10", "--max", "5"])
        .assert()
        .success()
        .stdout("SELECT * FROM t LIMIT 10, 5\n");

    cmd()
        .args(["paginate", "SELECT * FROM t", "--start", "10", "--max", "5"])
        .assert()
        .success()
        .stdout("SELECT * FROM t LIMIT 5 OFFSET 10\n");
}

#[test]
fn test_ddl_prints_create_statements() {
    let schema = schema_file(STOCK, ".yaml");
    cmd()
        .args(["ddl", schema.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("-- Stock: missing"))
        .stdout(predicate::str::contains(
            "CREATE TABLE Stock (Id INTEGER PRIMARY KEY AUTOINCREMENT, Sku nvarchar(20) NOT NULL);",
        ))
        .stdout(predicate::str::contains(
            "CREATE UNIQUE INDEX IU_Stock_Sku ON Stock (Sku);",
        ));
}

#[test]
fn test_diff_plans_added_column() {
    let desired = schema_file(&stock_with_qty(), ".yaml");
    let live = schema_file(STOCK, ".yaml");
    cmd()
        .args(["-c", "Provider=sqlite;Migration=On", "diff"])
        .args([desired.path(), live.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("-- Stock: alter"))
        .stdout(predicate::str::contains(
            "ALTER TABLE Stock ADD COLUMN Qty int NULL;",
        ));
}

#[test]
fn test_diff_json_output() {
    let desired = schema_file(STOCK, ".yaml");
    let live = schema_file(STOCK, ".yaml");
    cmd()
        .args(["--output-json", "diff"])
        .args([desired.path(), live.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"in_sync\": true"))
        .stdout(predicate::str::contains("\"state\": \"in_sync\""));
}

#[test]
fn test_diff_reports_suppressed_drops() {
    let desired = schema_file(STOCK, ".yaml");
    let live = schema_file(&stock_with_qty(), ".yaml");
    cmd()
        .args(["-c", "Provider=postgresql", "diff", "--migration", "on"])
        .args([desired.path(), live.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("-- suppressed by migration mode:"))
        .stdout(predicate::str::contains("-- ALTER TABLE Stock DROP COLUMN Qty;"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_schema_exits_with_code_7() {
    cmd()
        .args(["ddl", "nonexistent_schema_file.yaml"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let schema = schema_file("tables: [", ".yaml");
    cmd()
        .args(["ddl", schema.path().to_str().unwrap()])
        .assert()
        .code(1);
}

#[test]
fn test_unknown_backend_exits_with_code_1() {
    cmd()
        .args(["candidates", "oracle"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown database type"));
}

#[test]
fn test_named_connection_from_file() {
    let connections = schema_file(
        "connections:\n  Reports:\n    connection_string: \"Server=.;Database=reports\"\n    provider: sqlserver\n",
        ".yaml",
    );
    cmd()
        .args(["--connections", connections.path().to_str().unwrap()])
        .args(["-c", "Missing", "paginate", "SELECT 1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No connection named 'Missing'"));
}
