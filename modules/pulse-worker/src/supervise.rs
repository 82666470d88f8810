//! Shutdown supervision for the spawned worker task.
//!
//! On the shutdown signal the token is cancelled and the task gets a bounded
//! grace period to finish its current message. The worker only stops between
//! messages, so abort is the last resort for a message that overruns the
//! grace period. An aborted transaction is dropped uncommitted and Postgres
//! rolls it back; its message is still unacked and comes back through the
//! backlog.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::TaskFault;

/// How the worker task ended.
#[derive(Debug)]
pub enum Stopped<T> {
    /// The task returned on its own.
    Finished(T),
    /// The grace period ran out and the task was aborted.
    Aborted,
}

/// Wait for `shutdown` or for the task to end, cancel, then collect the task.
///
/// A task that panics returns `Err` on the same path, after cancellation, so
/// the caller still tears down its connections.
pub async fn supervise<T, F>(
    mut handle: JoinHandle<T>,
    cancel: &CancellationToken,
    grace: Duration,
    shutdown: F,
) -> Result<Stopped<T>, TaskFault>
where
    T: Send + 'static,
    F: Future<Output = ()>,
{
    // The loop only returns once cancelled, so finishing first means it faulted.
    let early_exit = tokio::select! {
        _ = shutdown => None,
        joined = &mut handle => Some(joined),
    };
    cancel.cancel();

    let joined = match early_exit {
        Some(joined) => joined,
        None => match tokio::time::timeout(grace, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "In-flight message did not finish within grace period, aborting"
                );
                handle.abort();
                handle.await
            }
        },
    };

    match joined {
        Ok(value) => Ok(Stopped::Finished(value)),
        Err(e) if e.is_cancelled() => {
            info!("Worker task aborted");
            Ok(Stopped::Aborted)
        }
        Err(e) => {
            error!(error = %e, "Worker task faulted");
            Err(TaskFault(e))
        }
    }
}
