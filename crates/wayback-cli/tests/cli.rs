#![allow(missing_docs, clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{wayback_cmd, write_config};
use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LINE: &str = "com,example)/ 20200101000000 https://example.com/ text/html 200 \
                    ABCDEFGHIJKLMNOPQRSTUVWXYZ234567 1234";

#[test]
fn help_lists_subcommands() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), "http://127.0.0.1:9");

    wayback_cmd(&config)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("save"))
        .stdout(predicate::str::contains("cdx"))
        .stdout(predicate::str::contains("near"));
}

#[test]
fn invalid_filter_fails_before_any_request() {
    let dir = tempdir().unwrap();
    // Nothing listens on the discard port; a request would fail differently.
    let config = write_config(dir.path(), "http://127.0.0.1:9");

    wayback_cmd(&config)
        .args(["cdx", "example.com", "--filter", "status:200"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("status:200"))
        .stderr(predicate::str::contains("filter syntax"));
}

#[test]
fn wildcard_with_match_type_is_rejected() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), "http://127.0.0.1:9");

    wayback_cmd(&config)
        .args(["cdx", "example.com/*", "--match-type", "prefix"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("wildcard"));
}

#[test]
fn missing_config_file_is_reported() {
    let dir = tempdir().unwrap();

    wayback_cmd(&dir.path().join("absent.toml"))
        .args(["cdx", "example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[tokio::test]
async fn cdx_streams_records_as_jsonl() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cdx/search/cdx"))
        .and(query_param("showResumeKey", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("{LINE}\n{LINE}\n")))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir()?;
    let config = write_config(dir.path(), &server.uri());

    let out = wayback_cmd(&config)
        .args(["cdx", "example.com", "--from", "2020", "--format", "jsonl"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let text = String::from_utf8(out)?;
    let records: Vec<Value> = text
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["timestamp"], "20200101000000");
    assert_eq!(records[0]["digest"], "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567");
    Ok(())
}

#[tokio::test]
async fn cdx_prints_archive_urls() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cdx/search/cdx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("{LINE}\n")))
        .mount(&server)
        .await;

    let dir = tempdir()?;
    let config = write_config(dir.path(), &server.uri());

    wayback_cmd(&config)
        .args(["cdx", "example.com", "--pagination", "resume-key", "--archive-urls"])
        .assert()
        .success()
        .stdout(predicate::str::diff(
            "https://web.archive.org/web/20200101000000/https://example.com/\n",
        ));
    Ok(())
}

#[tokio::test]
async fn save_prints_archive_url() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/save/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Location", "/web/20201126185327/https://example.com/et-al"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir()?;
    let config = write_config(dir.path(), &server.uri());

    wayback_cmd(&config)
        .args(["save", "https://example.com/et-al"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "https://web.archive.org/web/20201126185327/https://example.com/et-al",
        ));
    Ok(())
}

#[tokio::test]
async fn save_rate_limit_exits_non_zero() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let dir = tempdir()?;
    let config = write_config(dir.path(), &server.uri());

    wayback_cmd(&config)
        .args(["save", "https://example.com/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("HTTP 429"));
    Ok(())
}
