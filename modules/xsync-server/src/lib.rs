pub mod cache;
pub mod dispatch;
pub mod failed;
pub mod ingestion;
pub mod interval;
pub mod metrics;
pub mod recovery;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use cache::{CacheInvalidator, RedisCache};
pub use dispatch::{DispatchPublisher, DueWorkDispatcher, NatsDispatchPublisher};
pub use failed::FailedWorkConsumer;
pub use ingestion::{IngestSummary, IngestionConsumer};
pub use metrics::SyncCounters;
pub use recovery::{AccountOutcome, RecoveryScheduler, SweepReport};
pub use store::{PgStore, StoreError, SyncStore};
