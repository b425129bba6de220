//! End-to-end sync pipeline against a mocked feed and file-backed blobs:
//! pagination, cursor persistence, dedup, and rollup contents.

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use secrecy::SecretString;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use spendbook::clock::FixedClock;
use spendbook::costs::{CostsAggregator, PeriodType};
use spendbook::feed::HttpTransactionFeed;
use spendbook::models::CategoryBucket;
use spendbook::storage::stores::{LinkStore, OverrideStore, SyncStateStore};
use spendbook::storage::{BlobStore, JsonFileBlobStore};
use spendbook::sync::SyncService;

fn cursor_is(expected: Option<&'static str>) -> impl Fn(&Request) -> bool + Send + Sync {
    move |req: &Request| {
        let Ok(body) = req.body_json::<serde_json::Value>() else {
            return false;
        };
        body.get("cursor").and_then(|c| c.as_str()) == expected
    }
}

fn feed_page(
    added: serde_json::Value,
    next_cursor: &str,
    has_more: bool,
) -> serde_json::Value {
    serde_json::json!({
        "added": added,
        "modified": [],
        "removed": [],
        "has_more": has_more,
        "next_cursor": next_cursor,
    })
}

struct Pipeline {
    service: SyncService,
    costs: CostsAggregator,
    sync_state: SyncStateStore,
    links: LinkStore,
    overrides: OverrideStore,
}

fn pipeline(data_dir: &std::path::Path, feed_url: &str) -> Pipeline {
    let blobs: Arc<dyn BlobStore> = Arc::new(JsonFileBlobStore::new(data_dir));
    let links = LinkStore::new(blobs.clone());
    // Pinned near the fixture dates so seen-set pruning never fires.
    let clock = FixedClock::from_date("2024-06-01".parse().unwrap());
    let sync_state = SyncStateStore::with_clock(blobs.clone(), Arc::new(clock));
    let overrides = OverrideStore::new(blobs.clone());
    let costs = CostsAggregator::new(blobs);

    let feed = HttpTransactionFeed::new(
        feed_url,
        SecretString::new("client-id".to_string().into()),
        SecretString::new("secret".to_string().into()),
        HttpTransactionFeed::DEFAULT_TIMEOUT,
    )
    .expect("feed client");

    let service = SyncService::new(
        Arc::new(feed),
        links.clone(),
        sync_state.clone(),
        overrides.clone(),
        costs.clone(),
    );

    Pipeline {
        service,
        costs,
        sync_state,
        links,
        overrides,
    }
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

#[tokio::test]
async fn paginated_sync_aggregates_and_persists_cursor() -> Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;
    let pipeline = pipeline(dir.path(), &server.uri());

    pipeline
        .links
        .save_access_token("alice", "item_1", "access-token-1")
        .await?;

    // Initial sync: no cursor -> page 1, then cursor "c1" -> final page.
    Mock::given(method("POST"))
        .and(path("/transactions/sync"))
        .and(cursor_is(None))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed_page(
            serde_json::json!([{
                "transaction_id": "tx_1",
                "account_id": "acc_1",
                "amount": 12.30,
                "date": "2024-05-01",
                "name": "WHOLE FOODS #10",
                "pending": false
            }]),
            "c1",
            true,
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/transactions/sync"))
        .and(cursor_is(Some("c1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed_page(
            serde_json::json!([{
                "transaction_id": "tx_2",
                "account_id": "acc_1",
                "amount": 7.70,
                "date": "2024-05-01",
                "name": "TRADER JOE'S #55",
                "pending": false
            }, {
                "transaction_id": "tx_3",
                "account_id": "acc_1",
                "amount": 30.00,
                "date": "2024-05-02",
                "name": "Shell Gas",
                "pending": false,
                "personal_finance_category": {"primary": "TRANSPORTATION"}
            }]),
            "c2",
            false,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let report = pipeline.service.sync("alice", None).await?;
    assert_eq!(report.added, 3);
    assert_eq!(report.days_updated, 2);
    assert!(report.uncategorized.is_empty());

    let may_1: NaiveDate = "2024-05-01".parse().unwrap();
    let may_2: NaiveDate = "2024-05-02".parse().unwrap();
    for period in PeriodType::ALL {
        let doc = pipeline.costs.get_costs("alice", period).await?;
        assert_eq!(doc[&may_1][&CategoryBucket::Groceries], dec("20.00"));
        assert_eq!(doc[&may_2][&CategoryBucket::Transportation], dec("30.00"));
    }

    assert_eq!(
        pipeline.sync_state.get_cursor("alice", "item_1").await?,
        Some("c2".to_string())
    );

    // Blobs landed on disk under the hierarchical key layout.
    assert!(dir.path().join("users/alice/costs/weekly.json").exists());
    assert!(dir.path().join("users/alice/sync/item_1.json").exists());
    Ok(())
}

#[tokio::test]
async fn second_sync_resumes_from_cursor_and_dedups() -> Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;
    let pipeline = pipeline(dir.path(), &server.uri());

    pipeline
        .links
        .save_access_token("alice", "item_1", "access-token-1")
        .await?;

    let starbucks = serde_json::json!([{
        "transaction_id": "tx_1",
        "account_id": "acc_1",
        "amount": 4.50,
        "date": "2024-05-01",
        "name": "STARBUCKS #1234",
        "pending": false
    }]);

    Mock::given(method("POST"))
        .and(path("/transactions/sync"))
        .and(cursor_is(None))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(feed_page(starbucks.clone(), "c1", false)),
        )
        .expect(1)
        .mount(&server)
        .await;

    // A pagination retry delivers the same transaction as "added" again.
    Mock::given(method("POST"))
        .and(path("/transactions/sync"))
        .and(cursor_is(Some("c1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed_page(starbucks, "c2", false)))
        .expect(1)
        .mount(&server)
        .await;

    let first = pipeline.service.sync("alice", None).await?;
    assert_eq!(first.added, 1);

    let second = pipeline.service.sync("alice", None).await?;
    assert_eq!(second.added, 0);

    let date: NaiveDate = "2024-05-01".parse().unwrap();
    let doc = pipeline.costs.get_costs("alice", PeriodType::Weekly).await?;
    assert_eq!(doc[&date][&CategoryBucket::EatingOut], dec("4.50"));
    Ok(())
}

#[tokio::test]
async fn override_reroutes_keyword_match() -> Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;
    let pipeline = pipeline(dir.path(), &server.uri());

    pipeline
        .links
        .save_access_token("alice", "item_1", "access-token-1")
        .await?;
    pipeline
        .overrides
        .save_override("alice", "STARBUCKS #1234", CategoryBucket::Groceries)
        .await?;

    Mock::given(method("POST"))
        .and(path("/transactions/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed_page(
            serde_json::json!([{
                "transaction_id": "tx_1",
                "account_id": "acc_1",
                "amount": 4.50,
                "date": "2024-05-01",
                "name": "STARBUCKS #1234",
                "pending": false
            }]),
            "c1",
            false,
        )))
        .mount(&server)
        .await;

    pipeline.service.sync("alice", None).await?;

    let date: NaiveDate = "2024-05-01".parse().unwrap();
    let doc = pipeline.costs.get_costs("alice", PeriodType::Weekly).await?;
    assert_eq!(doc[&date][&CategoryBucket::Groceries], dec("4.50"));
    assert!(!doc[&date].contains_key(&CategoryBucket::EatingOut));
    Ok(())
}

#[tokio::test]
async fn feed_auth_failure_aborts_without_state_changes() -> Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;
    let pipeline = pipeline(dir.path(), &server.uri());

    pipeline
        .links
        .save_access_token("alice", "item_1", "revoked-token")
        .await?;

    Mock::given(method("POST"))
        .and(path("/transactions/sync"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({"error_code": "ITEM_LOGIN_REQUIRED"})),
        )
        .mount(&server)
        .await;

    let err = pipeline.service.sync("alice", None).await.unwrap_err();
    assert!(err.to_string().contains("ITEM_LOGIN_REQUIRED"));

    assert_eq!(pipeline.sync_state.get_cursor("alice", "item_1").await?, None);
    assert!(pipeline
        .costs
        .get_costs("alice", PeriodType::Weekly)
        .await?
        .is_empty());
    Ok(())
}
