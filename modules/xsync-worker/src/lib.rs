pub mod adapters;
pub mod dispatcher;
pub mod governor;
pub mod media;
pub mod publisher;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use adapters::{AdapterRegistry, FetchedFeeds, PlatformAdapter};
pub use dispatcher::{Dispatcher, NatsWorkPublisher, WorkPublisher};
pub use governor::{Governor, GovernorPermit};
pub use media::MediaIngestor;
pub use publisher::{NoteMetadata, NotePublisher, NoteReceipt, OnChainPublisher, PublishError};
pub use traits::{ContentStore, FeedFetcher, HttpFeedFetcher, NoteContract, NoteIndexer};
