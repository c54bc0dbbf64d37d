use std::collections::BTreeSet;

use super::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_run_over_three_pages() -> TestResult<()> {
  let server = MockServer::start().await;
  mount_page(&server, 1, numbered_page(125, 0, 50)).await;
  mount_page(&server, 51, numbered_page(125, 50, 50)).await;
  mount_page(&server, 101, numbered_page(125, 100, 25)).await;

  let store = Arc::new(MemoryKeyValueStore::new());
  let harvester = Harvester::builder(config(&server, 50)?.build()?)
    .key_value_store(store.clone())
    .keyword_source(Arc::new(StaticKeywords))
    .build()?;
  let report = harvester.run().await?;

  assert!(report.is_clean(), "{report}");
  assert!(!report.single_page);
  assert_eq!(report.total_records, 125);
  assert_eq!(report.pages_planned, 3);
  assert_eq!(report.counters.pages, 3);
  assert_eq!(report.counters.records, 125);
  assert_eq!(report.items_stored, 125);

  let ids: BTreeSet<u64> = report.sequence_ids.iter().copied().collect();
  assert_eq!(ids, (0..125u64).collect::<BTreeSet<_>>());

  let items = store.items("Articles");
  assert_eq!(items.len(), 125);
  let item = item_titled(&items, "Record 124").unwrap();
  assert_eq!(item["Keywords"], Attribute::L(vec![Attribute::S("graphs".into())]));
  assert_eq!(item["Abstract"], Attribute::S("Abstract of Record 124".into()));
  assert_eq!(item["AlwaysTheSame"], Attribute::N("1".into()));
  Ok(())
}

#[tokio::test]
async fn test_page_ceiling() -> TestResult<()> {
  let server = MockServer::start().await;
  mount_page(&server, 1, numbered_page(125, 0, 50)).await;
  Mock::given(method("GET"))
    .and(query_param("s", "51"))
    .respond_with(ResponseTemplate::new(200).set_body_string(numbered_page(125, 50, 50)))
    .expect(0)
    .mount(&server)
    .await;

  let store = Arc::new(MemoryKeyValueStore::new());
  let harvester = Harvester::builder(config(&server, 50)?.max_pages(1).build()?)
    .key_value_store(store.clone())
    .keyword_source(Arc::new(StaticKeywords))
    .build()?;
  let report = harvester.run().await?;

  assert_eq!(report.pages_planned, 1);
  assert_eq!(report.items_stored, 50);
  Ok(())
}

#[tokio::test]
async fn test_small_result_set_skips_the_pools() -> TestResult<()> {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/metadata/pam"))
    .respond_with(ResponseTemplate::new(200).set_body_string(numbered_page(40, 0, 40)))
    .expect(1)
    .mount(&server)
    .await;

  let store = Arc::new(MemoryKeyValueStore::new());
  let harvester = Harvester::builder(config(&server, 50)?.build()?)
    .key_value_store(store.clone())
    .keyword_source(Arc::new(StaticKeywords))
    .build()?;
  let report = harvester.run().await?;

  assert!(report.single_page);
  assert_eq!(report.pages_planned, 0);
  assert_eq!(report.items_stored, 40);
  assert_eq!(report.sequence_ids, (0..40u64).collect::<Vec<_>>());
  assert_eq!(store.items("Articles").len(), 40);
  Ok(())
}

#[tokio::test]
async fn test_empty_result_set() -> TestResult<()> {
  let server = MockServer::start().await;
  mount_page(&server, 1, listing_page(0, &[])).await;

  let store = Arc::new(MemoryKeyValueStore::new());
  let harvester = Harvester::builder(config(&server, 10)?.build()?)
    .key_value_store(store.clone())
    .keyword_source(Arc::new(StaticKeywords))
    .build()?;
  let report = harvester.run().await?;

  assert!(report.single_page);
  assert_eq!(report.items_stored, 0);
  assert!(store.items("Articles").is_empty());
  Ok(())
}

#[tokio::test]
async fn test_failed_page_does_not_stop_siblings() -> TestResult<()> {
  let server = MockServer::start().await;
  mount_page(&server, 1, numbered_page(30, 0, 10)).await;
  Mock::given(method("GET"))
    .and(query_param("s", "11"))
    .respond_with(ResponseTemplate::new(503))
    .mount(&server)
    .await;
  mount_page(&server, 21, numbered_page(30, 20, 10)).await;

  let store = Arc::new(MemoryKeyValueStore::new());
  let harvester = Harvester::builder(config(&server, 10)?.build()?)
    .key_value_store(store.clone())
    .keyword_source(Arc::new(StaticKeywords))
    .build()?;
  let report = harvester.run().await?;

  assert_eq!(report.fetch_errors.len(), 1);
  assert_eq!(report.fetch_errors[0].job, "page 1");
  assert!(matches!(report.fetch_errors[0].error, HarvestError::Api(_)));
  assert_eq!(report.items_stored, 20);
  assert_eq!(report.unprocessed, 0);
  assert_eq!(store.items("Articles").len(), 20);
  Ok(())
}

#[tokio::test]
async fn test_artifacts_are_validated_before_upload() -> TestResult<()> {
  let server = MockServer::start().await;
  let messages = vec![
    message("Good Paper", true, "10.1/good"),
    message("Bad Paper", true, "10.1/bad"),
    message("Closed Paper", false, "10.1/closed"),
  ];
  mount_page(&server, 1, listing_page(3, &messages)).await;
  Mock::given(method("GET"))
    .and(path_regex(r"good\.pdf$"))
    .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7 body".to_vec()))
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path_regex(r"bad\.pdf$"))
    .respond_with(ResponseTemplate::new(200).set_body_string("<html>Sign in</html>"))
    .mount(&server)
    .await;

  let scratch = tempdir()?;
  let store = Arc::new(MemoryKeyValueStore::new());
  let objects = Arc::new(MemoryObjectStore::new());
  let config = config(&server, 10)?.bucket("papers").scratch_dir(scratch.path()).build()?;
  let harvester = Harvester::builder(config)
    .key_value_store(store.clone())
    .object_store(objects.clone())
    .keyword_source(Arc::new(StaticKeywords))
    .build()?;
  let report = harvester.run().await?;

  assert_eq!(report.items_stored, 3);
  assert_eq!(report.artifacts_uploaded, 1);
  assert_eq!(report.artifact_errors.len(), 1);
  assert_eq!(report.artifact_errors[0].job, "Bad Paper");
  assert!(matches!(report.artifact_errors[0].error, HarvestError::NotAnArtifact { .. }));
  assert_eq!(objects.object("papers", "Good_Paper.pdf").as_deref(), Some(&b"%PDF-1.7 body"[..]));
  assert_eq!(objects.upload_count(), 1);

  let items = store.items("Articles");
  let file_name = |title: &str| item_titled(&items, title).map(|item| item["FileName"].clone());
  assert_eq!(file_name("Good Paper"), Some(Attribute::S("Good_Paper.pdf".into())));
  assert_eq!(file_name("Bad Paper"), Some(Attribute::S(String::new())));
  assert_eq!(file_name("Closed Paper"), Some(Attribute::S(String::new())));
  assert_eq!(std::fs::read_dir(scratch.path())?.count(), 0);
  Ok(())
}

#[tokio::test]
async fn test_unknown_key_name_fails_every_put() -> TestResult<()> {
  let server = MockServer::start().await;
  mount_page(&server, 1, numbered_page(5, 0, 5)).await;

  let config = config(&server, 10)?
    .table(TableConfig::new("Articles", KeySchema::new("DOI", KeyType::String)))
    .build()?;
  let harvester = Harvester::builder(config)
    .key_value_store(Arc::new(MemoryKeyValueStore::new()))
    .keyword_source(Arc::new(StaticKeywords))
    .build()?;
  let report = harvester.run().await?;

  assert_eq!(report.items_stored, 0);
  assert_eq!(report.store_errors.len(), 5);
  assert!(report.sequence_ids.is_empty());
  Ok(())
}

#[tokio::test]
async fn test_cancelled_run_stops_at_startup() -> TestResult<()> {
  let server = MockServer::start().await;
  let token = CancellationToken::new();
  token.cancel();

  let harvester = Harvester::builder(config(&server, 10)?.build()?)
    .key_value_store(Arc::new(MemoryKeyValueStore::new()))
    .keyword_source(Arc::new(StaticKeywords))
    .cancellation_token(token)
    .build()?;
  assert!(matches!(harvester.run().await, Err(HarvestError::Cancelled)));
  Ok(())
}

#[tokio::test]
async fn test_unreachable_api_is_fatal() -> TestResult<()> {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .respond_with(ResponseTemplate::new(401))
    .mount(&server)
    .await;

  let harvester = Harvester::builder(config(&server, 10)?.build()?)
    .key_value_store(Arc::new(MemoryKeyValueStore::new()))
    .build()?;
  let err = harvester.run().await.unwrap_err();
  assert!(matches!(err, HarvestError::Api(_)));
  assert!(!err.to_string().contains("test-key"));
  Ok(())
}
