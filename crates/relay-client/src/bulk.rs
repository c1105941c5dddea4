//! Bounded-concurrency bulk engine

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use futures_util::future::join_all;
use tracing::{debug, info, warn};

fn lock<M>(m: &Mutex<M>) -> MutexGuard<'_, M> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Run `tasks` with at most `concurrency` in flight.
///
/// `min(concurrency, tasks.len())` workers each claim the next unclaimed task
/// index until none are left. Failed tasks are logged and dropped; the
/// successes come back in their original task order.
pub async fn run_bulk<T, E, F, Fut>(tasks: Vec<F>, concurrency: usize) -> Vec<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let total = tasks.len();
    if total == 0 {
        return Vec::new();
    }
    let workers = concurrency.max(1).min(total);
    info!("Starting bulk run: {} tasks across {} workers", total, workers);

    let slots: Vec<Mutex<Option<F>>> = tasks.into_iter().map(|t| Mutex::new(Some(t))).collect();
    let results: Mutex<Vec<Option<T>>> = Mutex::new((0..total).map(|_| None).collect());
    let next = AtomicUsize::new(0);

    let (slots, results_ref, next) = (&slots, &results, &next);
    join_all((0..workers).map(|worker_id| async move {
        loop {
            let idx = next.fetch_add(1, Ordering::SeqCst);
            if idx >= total {
                break;
            }
            let Some(task) = lock(&slots[idx]).take() else {
                continue;
            };
            match task().await {
                Ok(value) => lock(results_ref)[idx] = Some(value),
                Err(e) => warn!("Bulk task {} failed on worker {}: {}", idx, worker_id, e),
            }
        }
        debug!("Bulk worker {} finished", worker_id);
    }))
    .await;

    let results: Vec<T> = results
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .into_iter()
        .flatten()
        .collect();
    info!("Bulk run complete: {}/{} tasks succeeded", results.len(), total);
    results
}
