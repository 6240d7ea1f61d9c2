pub mod contract;
pub mod error;
pub mod indexer;

pub use contract::{has_permission_bit, ContractClient, PostedNote, POST_NOTE_PERMISSION_BIT};
pub use error::{CrossbellError, Result};
pub use indexer::{IndexedNote, IndexerClient};
