//! Assertion and polling helpers shared by the suites.

use crate::fakes::MemoryStore;
use oxide_core::Status;
use oxide_core::ids::BuildId;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Name and status of each stage of a build, ordered by stage number.
pub fn stage_statuses(store: &MemoryStore, build_id: BuildId) -> Vec<(String, Status)> {
    store
        .stages(build_id)
        .into_iter()
        .map(|s| (s.name, s.status))
        .collect()
}

/// Poll `condition` every `interval` until it holds or `timeout` elapses.
///
/// Used for effects of detached work, such as auto-cancellation, that the
/// triggerer does not wait on.
pub async fn wait_for<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Await `future`, panicking if it is still pending after `timeout`.
pub async fn assert_completes_within<F, T>(future: F, timeout: Duration) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(value) => value,
        Err(_) => panic!("did not complete within {:?}", timeout),
    }
}
