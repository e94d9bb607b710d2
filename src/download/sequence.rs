use std::collections::HashMap;
use std::future::poll_fn;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::time::DelayQueue;

/// Outcome of a fetch attempt, reported back by a worker.
#[derive(Debug)]
pub(crate) struct Feedback {
    pub id: u64,
    /// true for transient failures, false for a terminal 404.
    pub retry: bool,
}

const MAX_RETRIES: u32 = 10;
const RETRY_BACKOFF: Duration = Duration::from_millis(50);
const MIN_DEAD_POOL: usize = 100;

/// Spawns the id generator. It emits an unbounded ascending sequence of
/// candidate ids, re-emits transiently failed ids after a backoff, and closes
/// the returned channel once the not-found feedback suggests the id space is
/// exhausted.
pub(crate) fn spawn(
    feedback: mpsc::Receiver<Feedback>,
    feedback_capacity: usize,
) -> mpsc::Receiver<u64> {
    let (ids, ids_rx) = mpsc::channel(1);
    tokio::spawn(run(ids, feedback, feedback_capacity));
    ids_rx
}

async fn run(
    ids: mpsc::Sender<u64>,
    mut feedback: mpsc::Receiver<Feedback>,
    feedback_capacity: usize,
) {
    let pool_capacity = feedback_capacity.max(MIN_DEAD_POOL);

    let mut retries: HashMap<u64, u32> = HashMap::new();
    let mut backoff: DelayQueue<u64> = DelayQueue::new();
    let mut dead: Vec<u64> = Vec::with_capacity(pool_capacity);
    let mut next: u64 = 0;

    loop {
        tokio::select! {
            item = feedback.recv() => {
                match item {
                    Some(Feedback { id, retry: true }) => {
                        let count = retries.entry(id).or_insert(0);
                        if *count < MAX_RETRIES {
                            *count += 1;
                            // Give the endpoint some time to breathe before
                            // offering the id again.
                            backoff.insert(id, RETRY_BACKOFF);
                        } else {
                            tracing::debug!(id, "giving up after {MAX_RETRIES} attempts");
                        }
                    }
                    Some(Feedback { id, retry: false }) => {
                        if space_exhausted(&mut dead, pool_capacity, feedback_capacity, id) {
                            tracing::info!(last_id = next, "id space looks exhausted, stopping");
                            break;
                        }
                    }
                    None => break,
                }
            }
            Some(expired) = poll_fn(|cx| backoff.poll_expired(cx)), if !backoff.is_empty() => {
                if ids.send(expired.into_inner()).await.is_err() {
                    break;
                }
            }
            permit = ids.reserve() => {
                match permit {
                    Ok(permit) => {
                        permit.send(next);
                        next += 1;
                    }
                    Err(_) => break,
                }
            }
        }
    }
}

/// Collects terminal not-found ids into a bounded pool. Once the pool is
/// full, the ids are sorted: a span barely wider than the pool means a
/// contiguous dead region at the top of the id space, so there is nothing
/// left to download. A wider span means the misses are scattered holes; the
/// pool is reset and the walk continues.
fn space_exhausted(
    dead: &mut Vec<u64>,
    pool_capacity: usize,
    slack: usize,
    id: u64,
) -> bool {
    if dead.len() < pool_capacity {
        dead.push(id);
        return false;
    }

    dead.sort_unstable();
    let span = dead[dead.len() - 1] - dead[0];

    // Leeway for ids reported out of order under concurrency.
    if (span as usize) < pool_capacity + slack {
        true
    } else {
        dead.clear();
        false
    }
}
