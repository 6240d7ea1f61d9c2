// Concurrency Governor: one counting pool per concurrency class, shared by
// every work item in the process. Upstream platforms and the RSSHub proxies
// rate-limit without telling us the limits, so the pools cap our aggregate
// outbound rate per class no matter how many work items arrive at once.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tracing::trace;

use xsync_common::{ConcurrencyClass, WorkerConfig};

pub struct Governor {
    direct: Arc<Semaphore>,
    stateful: Arc<Semaphore>,
    stateless: Arc<Semaphore>,
}

/// A held slot. The slot goes back to its pool when this is dropped, on every
/// exit path.
pub struct GovernorPermit {
    class: ConcurrencyClass,
    _permit: OwnedSemaphorePermit,
}

impl GovernorPermit {
    pub fn class(&self) -> ConcurrencyClass {
        self.class
    }
}

impl Drop for GovernorPermit {
    fn drop(&mut self) {
        trace!(class = ?self.class, "Governor slot released");
    }
}

impl Governor {
    pub fn new(direct: usize, stateful: usize, stateless: usize) -> Self {
        Self {
            direct: Arc::new(Semaphore::new(direct)),
            stateful: Arc::new(Semaphore::new(stateful)),
            stateless: Arc::new(Semaphore::new(stateless)),
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(
            config.concurrency_direct,
            config.concurrency_stateful,
            config.concurrency_stateless,
        )
    }

    fn pool(&self, class: ConcurrencyClass) -> &Arc<Semaphore> {
        match class {
            ConcurrencyClass::Direct => &self.direct,
            ConcurrencyClass::Stateful => &self.stateful,
            ConcurrencyClass::Stateless => &self.stateless,
        }
    }

    /// Wait for a free slot in `class`. Pools are never closed, so the error
    /// arm only fires if that invariant is broken.
    pub async fn acquire(&self, class: ConcurrencyClass) -> Result<GovernorPermit, AcquireError> {
        let permit = self.pool(class).clone().acquire_owned().await?;
        trace!(?class, "Governor slot acquired");
        Ok(GovernorPermit {
            class,
            _permit: permit,
        })
    }

    /// Run `fut` while holding a slot in `class`.
    pub async fn scoped<F, T>(&self, class: ConcurrencyClass, fut: F) -> Result<T, AcquireError>
    where
        F: Future<Output = T>,
    {
        let _permit = self.acquire(class).await?;
        Ok(fut.await)
    }

    /// Free slots right now.
    pub fn available(&self, class: ConcurrencyClass) -> usize {
        self.pool(class).available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn second_acquire_waits_for_release() {
        let governor = Arc::new(Governor::new(1, 1, 1));
        let first = governor.acquire(ConcurrencyClass::Direct).await.unwrap();

        let g = governor.clone();
        let waiter = tokio::spawn(async move { g.acquire(ConcurrencyClass::Direct).await.map(|_| ()) });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should proceed after release")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn classes_do_not_share_slots() {
        let governor = Governor::new(1, 1, 1);
        let _direct = governor.acquire(ConcurrencyClass::Direct).await.unwrap();
        let stateless = tokio::time::timeout(
            Duration::from_millis(100),
            governor.acquire(ConcurrencyClass::Stateless),
        )
        .await;
        assert!(stateless.is_ok());
        assert_eq!(governor.available(ConcurrencyClass::Direct), 0);
        assert_eq!(governor.available(ConcurrencyClass::Stateful), 1);
    }

    #[tokio::test]
    async fn scoped_releases_after_failing_body() {
        let governor = Governor::new(2, 1, 1);
        let result: Result<Result<(), &str>, _> = governor
            .scoped(ConcurrencyClass::Stateful, async { Err("upstream exploded") })
            .await;
        assert_eq!(result.unwrap(), Err("upstream exploded"));
        assert_eq!(governor.available(ConcurrencyClass::Stateful), 1);
    }
}
