pub mod config;
pub mod error;
pub mod platform;
pub mod types;

pub use config::{AttachmentDimensions, PublisherConfig, ServerConfig, WorkerConfig};
pub use error::{ErrorCode, WorkError};
pub use platform::{platform, ConcurrencyClass, Platform, SUPPORTED_PLATFORMS};
pub use types::*;

/// Message bus subjects shared by the worker and the server.
pub mod subjects {
    /// Prefix for per-platform dispatch subjects: `xsync.work.dispatched.<platform>`.
    pub const WORK_DISPATCHED_PREFIX: &str = "xsync.work.dispatched";
    pub const WORK_SUCCEEDED: &str = "xsync.work.succeeded";
    pub const WORK_FAILED: &str = "xsync.work.failed";

    pub fn work_dispatched(platform_id: &str) -> String {
        format!("{WORK_DISPATCHED_PREFIX}.{platform_id}")
    }
}
