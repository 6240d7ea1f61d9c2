//! Integration test for PgStore.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or the test is skipped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use xsync_server::store::{PgStore, SyncStore};
use xsync_server::testing::{batch, feed, media, RecordingCache};
use xsync_server::{IngestionConsumer, SyncCounters};
use xsync_worker::NoteReceipt;

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
}

/// Migrated store with empty tables, or `None` when no test DB is configured.
async fn test_store() -> Option<PgStore> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let store = PgStore::connect(&url).await.ok()?;
    store.migrate().await.ok()?;

    sqlx::query("TRUNCATE medias, feeds, accounts, characters RESTART IDENTITY CASCADE")
        .execute(store.pool())
        .await
        .ok()?;

    sqlx::query(
        r#"
        INSERT INTO accounts (character_id, platform, username, verify_key, last_updated, next_update)
        VALUES (42, 'twitter', 'alice', 'csb:xyz123', $1, $1)
        "#,
    )
    .bind(at(0))
    .execute(store.pool())
    .await
    .ok()?;

    Some(store)
}

#[tokio::test]
async fn batch_round_trips_through_postgres() {
    let Some(store) = test_store().await else {
        return;
    };
    let store = Arc::new(store);
    let consumer = IngestionConsumer::new(
        store.clone(),
        Arc::new(RecordingCache::new()),
        Arc::new(SyncCounters::new()),
    );

    // Account 1 is the only row after RESTART IDENTITY.
    let mut first = feed("https://x.com/alice/status/1", at(1), Some("0xtx1"));
    first.media = vec![media("ipfs://bafyshared", 2048)];
    let mut second = feed("https://x.com/alice/status/2", at(2), None);
    second.media = vec![media("ipfs://bafyshared", 2048)];
    let mut work = batch("twitter", at(6), Some(Duration::from_secs(3600)), vec![first, second]);
    work.account_id = 1;

    let summary = consumer.handle(work).await.expect("batch persisted");
    assert_eq!(summary.new_media, 1);
    assert!(summary.paused);

    let account = store.account(1).await.unwrap().unwrap();
    assert!(account.is_on_chain_paused);
    assert_eq!(account.update_interval, Duration::from_secs(3600));
    assert_eq!(account.next_update, at(7));
    assert_eq!(store.character(42).await.unwrap().unwrap().media_usage, 2048);

    let shared = store
        .media_by_ipfs_uri("ipfs://bafyshared")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(shared.related_feeds.len(), 2);

    let pending = store.pending_feeds(1).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].link, "https://x.com/alice/status/2");
    assert_eq!(
        store.medias_by_uris(&pending[0].media_ipfs_uris).await.unwrap()[0].file_size,
        2048
    );

    store
        .record_publish_failure(pending[0].id, "ipfs://bafymeta")
        .await
        .unwrap();
    store
        .record_publish(
            pending[0].id,
            &NoteReceipt {
                ipfs_uri: "ipfs://bafymeta".into(),
                transaction: "0xtx2".into(),
                note_character_id: 42,
                note_id: 2,
            },
        )
        .await
        .unwrap();
    assert!(store.pending_feeds(1).await.unwrap().is_empty());

    // A second publish of the same feed is ignored.
    store
        .record_publish(
            pending[0].id,
            &NoteReceipt {
                transaction: "0xother".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let feeds = store.feeds(1).await.unwrap();
    assert_eq!(feeds[1].transaction.as_deref(), Some("0xtx2"));

    // A clean batch never clears a stored pause.
    let mut clean = batch(
        "twitter",
        at(7),
        None,
        vec![feed("https://x.com/alice/status/3", at(6), Some("0xtx3"))],
    );
    clean.account_id = 1;
    assert!(consumer.handle(clean).await.expect("batch persisted").paused);
    assert!(store.account(1).await.unwrap().unwrap().is_on_chain_paused);

    store.set_paused(1, false).await.unwrap();
    assert!(store.paused_accounts().await.unwrap().is_empty());
    // Twitter with no proposal refreshes after its 12h maximum.
    assert_eq!(store.due_accounts(at(18)).await.unwrap().len(), 0);
    assert_eq!(store.due_accounts(at(19)).await.unwrap().len(), 1);
}
