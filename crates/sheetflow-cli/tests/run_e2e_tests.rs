//! End-to-end tests for `sheetflow run` and `sheetflow inspect` in dry-run mode
//! against a mock sheet export server

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::path::Path;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const CATEGORIES: &str = "categoriesSheet000000000001";
const PRODUCTS: &str = "productsSheet00000000000001";

async fn mount_sheet(server: &MockServer, id: &str, csv: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/spreadsheets/d/{}/export", id)))
        .respond_with(ResponseTemplate::new(200).set_body_string(csv.to_string()))
        .mount(server)
        .await;
}

fn write_run_file(dir: &Path, products: &str) -> std::path::PathBuf {
    let run_file = json!({
        "sources": [
            {"locator": CATEGORIES, "destination_table": "categories", "join_key": "categoryId"},
            {"locator": products, "destination_table": "products", "join_key": "categoryId"}
        ],
        "merge": {
            "steps": [{"from_table": "categories", "to_table": "products", "on_key": "categoryId"}]
        },
        "config": {
            "extract": {"max_attempts": 1, "retry_delay_secs": 0},
            "clean": {"null_policy": "drop_all_null"},
            "schema": {"width": {"mode": "capped", "width": 4000}},
            "load": {"provision": "conditional"}
        }
    });
    let path = dir.join("parameters.json");
    std::fs::write(&path, serde_json::to_string_pretty(&run_file).unwrap()).unwrap();
    path
}

#[tokio::test]
async fn test_run_dry_run_loads_merged_table() {
    let server = MockServer::start().await;
    mount_sheet(&server, CATEGORIES, "categoryId,name\n1,Drinks\n").await;
    mount_sheet(&server, PRODUCTS, "productId,name,categoryId\n10,Cola,1\n11,Widget,2\n").await;

    let dir = tempfile::tempdir().unwrap();
    let params = write_run_file(dir.path(), PRODUCTS);
    let report_path = dir.path().join("report.json");

    let mut cmd = Command::cargo_bin("sheetflow").unwrap();
    cmd.arg("run")
        .arg("--params")
        .arg(&params)
        .arg("--dry-run")
        .arg("--output")
        .arg(&report_path)
        .arg("--sheets-base-url")
        .arg(server.uri());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("final_merged_table loaded (1 rows)"))
        .stdout(predicate::str::contains("CREATE TABLE IF NOT EXISTS"));

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    let outcomes = report["outcomes"].as_array().unwrap();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[2]["table_name"], "final_merged_table");
    assert_eq!(outcomes[2]["status"], "loaded");
}

#[tokio::test]
async fn test_run_reports_missing_upstream_and_fails() {
    let server = MockServer::start().await;
    mount_sheet(&server, CATEGORIES, "categoryId,name\n1,Drinks\n").await;
    // No mock for the products sheet: the server answers 404

    let dir = tempfile::tempdir().unwrap();
    let params = write_run_file(dir.path(), PRODUCTS);

    let mut cmd = Command::cargo_bin("sheetflow").unwrap();
    cmd.arg("run")
        .arg("--params")
        .arg(&params)
        .arg("--dry-run")
        .arg("--sheets-base-url")
        .arg(server.uri());

    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("products failed"))
        .stdout(predicate::str::contains("UpstreamMissing"))
        .stderr(predicate::str::contains("destination(s) failed"));
}

#[test]
fn test_run_missing_params_file() {
    let mut cmd = Command::cargo_bin("sheetflow").unwrap();
    cmd.arg("run")
        .arg("--params")
        .arg("/nonexistent/parameters.json")
        .arg("--dry-run");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("File operation failed"));
}

#[tokio::test]
async fn test_inspect_prints_schema() {
    let server = MockServer::start().await;
    mount_sheet(&server, PRODUCTS, "productId,name,price\n10,Cola,1.5\n11,Widget,2\n").await;

    let dir = tempfile::tempdir().unwrap();
    let params = write_run_file(dir.path(), PRODUCTS);

    let mut cmd = Command::cargo_bin("sheetflow").unwrap();
    cmd.arg("inspect")
        .arg(PRODUCTS)
        .arg("--params")
        .arg(&params)
        .arg("--sheets-base-url")
        .arg(server.uri());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("2 rows, 3 columns"))
        .stdout(predicate::str::contains("integer"))
        .stdout(predicate::str::contains("float"))
        .stdout(predicate::str::contains("text(6)"));
}
