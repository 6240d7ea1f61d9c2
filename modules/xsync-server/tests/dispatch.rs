use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use xsync_server::store::Account;
use xsync_server::testing::{account, MemoryStore, RecordingDispatchPublisher};
use xsync_server::DueWorkDispatcher;

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
}

fn bound(id: i64, platform: &str, last_updated: DateTime<Utc>, next_update: DateTime<Utc>) -> Account {
    Account {
        id,
        next_update,
        ..account(platform, last_updated)
    }
}

#[tokio::test]
async fn due_account_gets_window_and_lease() {
    let store = Arc::new(
        MemoryStore::new()
            .with_account(bound(1, "twitter", at(2), at(4)))
            .with_account(bound(2, "medium", at(3), at(9))),
    );
    let bus = Arc::new(RecordingDispatchPublisher::new());
    let dispatcher = DueWorkDispatcher::new(store.clone(), bus.clone());

    let sent = dispatcher.run_once(at(5)).await.unwrap();
    assert_eq!(sent, 1);

    let dispatched = bus.dispatched();
    assert_eq!(dispatched.len(), 1);
    let work = &dispatched[0];
    assert_eq!(work.account_id, 1);
    assert_eq!(work.platform, "twitter");
    assert_eq!(work.verify_key, "csb:xyz123");
    assert!(work.on_chain);
    assert_eq!(work.drop_before, at(2));
    assert_eq!(work.drop_after, at(5));
    assert_eq!(work.dispatch_at, at(5));

    // Leased to the platform's slowest refresh; the schedule itself is untouched.
    let leased = store.account_snapshot(1).unwrap();
    assert_eq!(leased.next_update, at(17));
    assert_eq!(leased.last_updated, at(2));
    assert_eq!(store.account_snapshot(2).unwrap().next_update, at(9));

    assert_eq!(dispatcher.run_once(at(6)).await.unwrap(), 0);
}

#[tokio::test]
async fn paused_account_is_collected_off_chain() {
    let mut paused = bound(1, "tiktok", at(0), at(1));
    paused.is_on_chain_paused = true;
    let store = Arc::new(MemoryStore::new().with_account(paused));
    let bus = Arc::new(RecordingDispatchPublisher::new());
    let dispatcher = DueWorkDispatcher::new(store, bus.clone());

    dispatcher.run_once(at(2)).await.unwrap();

    assert!(!bus.dispatched()[0].on_chain);
}

#[tokio::test]
async fn unknown_platform_is_still_dispatched_and_leased() {
    let store = Arc::new(MemoryStore::new().with_account(bound(1, "myspace", at(0), at(1))));
    let bus = Arc::new(RecordingDispatchPublisher::new());
    let dispatcher = DueWorkDispatcher::new(store.clone(), bus.clone());

    dispatcher.run_once(at(2)).await.unwrap();

    assert_eq!(bus.dispatched()[0].platform, "myspace");
    assert_eq!(
        store.account_snapshot(1).unwrap().next_update,
        at(2) + Duration::hours(24)
    );
}

#[tokio::test]
async fn publish_failure_leaves_account_due() {
    let store = Arc::new(
        MemoryStore::new()
            .with_account(bound(1, "medium", at(0), at(1)))
            .with_account(bound(2, "medium", at(0), at(1))),
    );
    let bus = Arc::new(RecordingDispatchPublisher::new().failing_for(1));
    let dispatcher = DueWorkDispatcher::new(store.clone(), bus.clone());

    let sent = dispatcher.run_once(at(2)).await.unwrap();

    assert_eq!(sent, 1);
    assert_eq!(bus.dispatched()[0].account_id, 2);
    assert_eq!(store.account_snapshot(1).unwrap().next_update, at(1));
}
