//! Concurrent team download pipeline: an id generator feeding a bounded pool
//! of fetch workers, with failure feedback routed back to the generator.

mod fetch;
mod sequence;

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::debug;

use crate::config::DownloadConfig;
use crate::error::Result;
use fetch::{FetchError, fetch_team};
use sequence::Feedback;

/// Raw payload downloaded for a single team id.
#[derive(Debug, Clone)]
pub struct RawTeam {
    pub id: u64,
    pub bytes: Bytes,
}

/// Starts the download pipeline and returns the data stream. The stream
/// yields payloads in no particular id order and closes once every worker
/// has exited, which happens after the id generator decides the id space is
/// exhausted.
///
/// Dropping the returned receiver unwinds the pipeline: workers stop at
/// their next send, and the generator stops once the workers are gone.
pub fn teams(config: &DownloadConfig) -> Result<mpsc::Receiver<RawTeam>> {
    let client = reqwest::Client::builder()
        .timeout(config.timeout)
        .build()?;

    let worker_count = if config.workers == 0 {
        DownloadConfig::default().workers
    } else {
        config.workers
    };

    let (data, data_rx) = mpsc::channel(1);
    let (feedback, feedback_rx) = mpsc::channel(worker_count);

    let ids = sequence::spawn(feedback_rx, worker_count);
    let ids = Arc::new(Mutex::new(ids));

    let mut workers = JoinSet::new();
    for _ in 0..worker_count {
        workers.spawn(worker(
            client.clone(),
            config.endpoint.clone(),
            ids.clone(),
            data.clone(),
            feedback.clone(),
        ));
    }

    // The data stream must stay open until the last worker is done; each
    // worker holds its own sender clone, so joining here is just the barrier
    // that keeps the JoinSet alive.
    tokio::spawn(async move {
        while workers.join_next().await.is_some() {}
        debug!("all download workers finished");
    });

    Ok(data_rx)
}

async fn worker(
    client: reqwest::Client,
    endpoint: String,
    ids: Arc<Mutex<mpsc::Receiver<u64>>>,
    data: mpsc::Sender<RawTeam>,
    feedback: mpsc::Sender<Feedback>,
) {
    loop {
        let id = { ids.lock().await.recv().await };
        let Some(id) = id else { break };

        match fetch_team(&client, &endpoint, id).await {
            Ok(bytes) => {
                if data.send(RawTeam { id, bytes }).await.is_err() {
                    break;
                }
            }
            Err(FetchError::NotFound(_)) => {
                if feedback.send(Feedback { id, retry: false }).await.is_err() {
                    break;
                }
            }
            Err(FetchError::Transient(e)) => {
                debug!(id, "fetch failed: {e}");
                if feedback.send(Feedback { id, retry: true }).await.is_err() {
                    break;
                }
            }
        }
    }
}
