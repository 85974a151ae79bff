//! Supervised background tasks
//!
//! Fire-and-forget continuations never vanish silently: every spawn goes
//! through here, and failures are logged under the label of the work that
//! produced them.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::error;

/// Spawn `future` detached from the caller, logging an error result
pub fn spawn_supervised<F>(label: &'static str, future: F) -> JoinHandle<()>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = future.await {
            error!("background task '{}' failed: {:#}", label, e);
        }
    })
}

/// Spawn infallible background work detached from the caller
pub fn spawn_detached<F>(label: &'static str, future: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    spawn_supervised(label, async move {
        future.await;
        Ok(())
    })
}
