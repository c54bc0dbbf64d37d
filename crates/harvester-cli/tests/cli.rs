//! Integration tests for the harvester CLI.

use assert_cmd::Command;
use predicates::prelude::*;
use wiremock::{
  matchers::{method, path},
  Mock, MockServer, ResponseTemplate,
};

fn harvester() -> Command {
  let mut cmd = Command::cargo_bin("harvester").unwrap();
  cmd.env_remove("HARVESTER_API_KEY").env_remove("HARVESTER_API_URL").env_remove("RUST_LOG");
  cmd
}

#[test]
fn test_help_lists_commands() {
  harvester()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("harvest"))
    .stdout(predicate::str::contains("teardown"));
}

#[test]
fn test_missing_command() {
  harvester().assert().failure().stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_missing_required_flags() {
  harvester()
    .arg("harvest")
    .assert()
    .failure()
    .stderr(predicate::str::contains("--keywords"))
    .stderr(predicate::str::contains("--tablename"))
    .stderr(predicate::str::contains("Usage"));

  harvester()
    .args(["harvest", "--keywords", "graphs", "--tablename", "Articles", "--pkname", "ID"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("--pktype"));
}

#[test]
fn test_invalid_key_type() {
  harvester()
    .args(["harvest", "--keywords", "graphs", "--tablename", "Articles"])
    .args(["--pkname", "ID", "--pktype", "B"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Invalid key type"));
}

#[test]
fn test_sort_key_needs_both_parts() {
  harvester()
    .args(["harvest", "--keywords", "graphs", "--tablename", "Articles"])
    .args(["--pkname", "ID", "--pktype", "N", "--skname", "Title"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("--sktype"));
}

#[test]
fn test_page_size_out_of_range() {
  harvester()
    .args(["harvest", "--keywords", "graphs", "--tablename", "Articles"])
    .args(["--pkname", "ID", "--pktype", "N", "--records", "80", "--dry-run"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Page length must be between 1 and 50"));
}

#[test]
fn test_partial_credentials() {
  harvester()
    .args(["harvest", "--keywords", "graphs", "--tablename", "Articles"])
    .args(["--pkname", "ID", "--pktype", "N", "--accesskey", "AKIA", "--region", "eu-west-1"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("missing secret key"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dry_run() {
  let server = MockServer::start().await;
  let records: String = (1..=2)
    .map(|i| {
      format!(
        "<pam:message><xhtml:head><pam:article><dc:title>Paper {i}</dc:title>\
         <prism:openAccess>false</prism:openAccess><prism:url>{}/article/{i}</prism:url>\
         </pam:article></xhtml:head></pam:message>",
        server.uri()
      )
    })
    .collect();
  let page = format!(
    "<response><result><total>2</total><start>1</start><pageLength>2</pageLength></result>\
     <records>{records}</records></response>"
  );
  Mock::given(method("GET"))
    .and(path("/metadata/pam"))
    .respond_with(ResponseTemplate::new(200).set_body_string(page))
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/article/1"))
    .respond_with(ResponseTemplate::new(200).set_body_string(
      r#"<div class="KeywordGroup"><span class="Keyword">Graphs</span></div>"#,
    ))
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/article/2"))
    .respond_with(ResponseTemplate::new(404))
    .mount(&server)
    .await;

  let uri = server.uri();
  let assert = tokio::task::spawn_blocking(move || {
    harvester()
      .args(["harvest", "--keywords", "graphs", "--tablename", "Articles"])
      .args(["--pkname", "ID", "--pktype", "N", "--records", "10", "--dry-run"])
      .args(["--apikey", "test-key", "--api-url", &uri])
      .assert()
  })
  .await
  .unwrap();

  assert
    .success()
    .stdout(predicate::str::contains("2 items would have been stored"))
    .stdout(predicate::str::contains("Paper 1"))
    .stdout(predicate::str::contains("Paper 2"))
    .stdout(predicate::str::contains("Items stored: 2"));
}
