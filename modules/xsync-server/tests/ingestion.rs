use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use xsync_common::{ErrorCode, WorkFailed};
use xsync_server::store::{Account, StoreTx, SyncStore};
use xsync_server::testing::{account, batch, feed, media, FailStep, MemoryStore, RecordingCache};
use xsync_server::{FailedWorkConsumer, IngestionConsumer, SyncCounters};

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
}

struct Harness {
    consumer: IngestionConsumer,
    store: Arc<MemoryStore>,
    cache: Arc<RecordingCache>,
    counters: Arc<SyncCounters>,
}

fn harness(store: MemoryStore) -> Harness {
    let store = Arc::new(store);
    let cache = Arc::new(RecordingCache::new());
    let counters = Arc::new(SyncCounters::new());
    let consumer = IngestionConsumer::new(store.clone(), cache.clone(), counters.clone());
    Harness {
        consumer,
        store,
        cache,
        counters,
    }
}

#[tokio::test]
async fn shared_media_is_stored_once_with_both_feeds() {
    let h = harness(MemoryStore::new().with_account(account("medium", at(0))));

    let shared = media("ipfs://bafyshared", 2048);
    let mut first = feed("https://medium.com/p/1", at(1), Some("0xtx1"));
    first.media = vec![shared.clone()];
    let mut second = feed("https://medium.com/p/2", at(3), Some("0xtx2"));
    second.media = vec![shared.clone(), media("ipfs://bafyonly", 100)];

    let summary = h
        .consumer
        .handle(batch("medium", at(6), Some(Duration::from_secs(3 * 3600)), vec![first, second]))
        .await
        .expect("batch persisted");

    assert_eq!(summary.feeds, 2);
    assert_eq!(summary.new_media, 2);
    assert_eq!(summary.added_bytes, 2148);
    assert!(!summary.paused);

    let feeds = h.store.all_feeds();
    assert_eq!(feeds.len(), 2);
    assert_eq!(feeds[1].media_ipfs_uris, vec!["ipfs://bafyshared", "ipfs://bafyonly"]);

    let medias = h.store.all_medias();
    assert_eq!(medias.len(), 2);
    let stored_shared = medias
        .iter()
        .find(|m| m.media.ipfs_uri == "ipfs://bafyshared")
        .unwrap();
    let related: Vec<i64> = stored_shared.related_feeds.iter().map(|r| r.id).collect();
    assert_eq!(related, vec![feeds[0].id, feeds[1].id]);
    assert!(stored_shared.related_feeds.iter().all(|r| r.platform == "medium"));

    let characters = h.store.characters();
    assert_eq!(characters.len(), 1);
    assert_eq!(characters[0].media_usage, 2148);

    assert_eq!(
        h.cache.invalidated(),
        vec!["xsync:accounts:42", "xsync:feeds:7", "xsync:medias:42"]
    );
    assert_eq!(h.counters.snapshot().work_succeeded, 1);
}

#[tokio::test]
async fn known_media_gains_feed_without_usage() {
    let store = MemoryStore::new().with_account(account("tiktok", at(0)));
    store.seed_media(42, media("ipfs://bafyknown", 5000));
    let h = harness(store);

    let mut post = feed("https://tiktok.com/@alice/video/1", at(2), Some("0xtx1"));
    post.media = vec![media("ipfs://bafyknown", 5000)];

    let summary = h
        .consumer
        .handle(batch("tiktok", at(4), None, vec![post]))
        .await
        .unwrap();

    assert_eq!(summary.new_media, 0);
    assert_eq!(summary.added_bytes, 0);
    let medias = h.store.all_medias();
    assert_eq!(medias.len(), 1);
    assert_eq!(medias[0].related_feeds.len(), 1);
    // The character row is written even when no bytes were added.
    assert_eq!(h.store.characters()[0].media_usage, 0);
}

#[tokio::test]
async fn proposed_interval_is_clamped_and_schedules_next_update() {
    let h = harness(MemoryStore::new().with_account(account("medium", at(0))));

    h.consumer
        .handle(batch("medium", at(6), Some(Duration::from_secs(600)), vec![]))
        .await
        .unwrap();

    let account = h.store.account_snapshot(7).unwrap();
    assert_eq!(account.last_updated, at(6));
    assert_eq!(account.update_interval, Duration::from_secs(2 * 3600));
    assert_eq!(account.next_update, at(8));

    h.consumer
        .handle(batch("medium", at(9), None, vec![]))
        .await
        .unwrap();
    let account = h.store.account_snapshot(7).unwrap();
    assert_eq!(account.update_interval, Duration::from_secs(48 * 3600));
}

#[tokio::test]
async fn off_chain_feed_pauses_account() {
    let h = harness(MemoryStore::new().with_account(account("twitter", at(0))));

    let summary = h
        .consumer
        .handle(batch(
            "twitter",
            at(5),
            None,
            vec![
                feed("https://x.com/alice/status/1", at(1), Some("0xtx1")),
                feed("https://x.com/alice/status/2", at(2), None),
            ],
        ))
        .await
        .unwrap();

    assert!(summary.paused);
    assert!(h.store.account_snapshot(7).unwrap().is_on_chain_paused);
}

#[tokio::test]
async fn clean_batch_keeps_existing_pause() {
    let paused = Account {
        is_on_chain_paused: true,
        ..account("twitter", at(0))
    };
    let h = harness(MemoryStore::new().with_account(paused));

    let summary = h
        .consumer
        .handle(batch(
            "twitter",
            at(5),
            None,
            vec![feed("https://x.com/alice/status/1", at(1), Some("0xtx1"))],
        ))
        .await
        .unwrap();

    assert!(summary.paused);
    let stored = h.store.account_snapshot(7).unwrap();
    assert!(stored.is_on_chain_paused);
    assert_eq!(stored.last_updated, at(5));
}

#[tokio::test]
async fn pause_stored_during_batch_survives_commit() {
    let store = MemoryStore::new().with_account(account("medium", at(0)));

    let mut tx = store.begin().await.unwrap();
    store.set_paused(7, true).await.unwrap();

    let clean = Account {
        last_updated: at(6),
        ..account("medium", at(0))
    };
    tx.save_account(&clean).await.unwrap();
    tx.commit().await.unwrap();

    let stored = store.account_snapshot(7).unwrap();
    assert!(stored.is_on_chain_paused);
    assert_eq!(stored.last_updated, at(6));
}

#[tokio::test]
async fn failure_late_in_batch_persists_nothing() {
    let store = MemoryStore::new().with_account(account("medium", at(0)));
    store.fail_on(FailStep::SaveCharacter);
    let h = harness(store);

    let mut post = feed("https://medium.com/p/1", at(1), None);
    post.media = vec![media("ipfs://bafyimg", 300)];

    let result = h
        .consumer
        .handle(batch("medium", at(6), Some(Duration::from_secs(3 * 3600)), vec![post]))
        .await;

    assert!(result.is_none());
    assert!(h.store.all_feeds().is_empty());
    assert!(h.store.all_medias().is_empty());
    assert!(h.store.characters().is_empty());
    assert_eq!(h.store.account_snapshot(7).unwrap(), account("medium", at(0)));
    assert!(h.cache.invalidated().is_empty());
    assert_eq!(h.counters.snapshot().work_succeeded, 0);
}

#[tokio::test]
async fn unknown_account_is_dropped() {
    let h = harness(MemoryStore::new());
    let result = h
        .consumer
        .handle(batch("medium", at(6), None, vec![feed("https://medium.com/p/1", at(1), None)]))
        .await;
    assert!(result.is_none());
    assert!(h.store.all_feeds().is_empty());
}

#[tokio::test]
async fn chain_failure_pauses_account() {
    let store = Arc::new(MemoryStore::new().with_account(account("medium", at(0))));
    let cache = Arc::new(RecordingCache::new());
    let counters = Arc::new(SyncCounters::new());
    let consumer = FailedWorkConsumer::new(store.clone(), cache.clone(), counters.clone());

    consumer
        .handle(WorkFailed {
            account_id: 7,
            platform: "medium".into(),
            error_code: ErrorCode::FetchFailed,
            error_message: "timeout".into(),
        })
        .await;
    assert!(!store.account_snapshot(7).unwrap().is_on_chain_paused);
    assert!(cache.invalidated().is_empty());

    consumer
        .handle(WorkFailed {
            account_id: 7,
            platform: "medium".into(),
            error_code: ErrorCode::ChainTransactionFailed,
            error_message: "reverted".into(),
        })
        .await;
    assert!(store.account_snapshot(7).unwrap().is_on_chain_paused);
    assert_eq!(cache.invalidated(), vec!["xsync:accounts:42"]);
    assert_eq!(counters.snapshot().work_failed, 2);
}
