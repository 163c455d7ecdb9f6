//! Batched, retry-capable persistence engine
//!
//! Samples enter through a bounded queue and never block the caller; a
//! background writer coalesces them into bulk inserts, amortizing
//! transaction overhead against end-to-end latency. Contention is retried
//! with backoff; a batch refused as busy goes back on the queue instead of
//! being lost.

mod db;

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::error::{CoreError, Result};
use crate::types::PointSample;

/// Tuning knobs for the persistence engine
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Database file location
    pub db_path: PathBuf,
    /// Bounded sample queue depth
    pub queue_capacity: usize,
    /// Samples per bulk insert
    pub batch_size: usize,
    /// Maximum time a partial batch may wait before flushing
    pub flush_interval: Duration,
    /// Queue poll timeout for the writer
    pub poll_timeout: Duration,
    /// Connection-open attempts while the file is busy
    pub open_retries: u32,
    /// Base backoff between busy retries; scales linearly per attempt
    pub busy_backoff: Duration,
    /// SQLite busy_timeout applied to every connection
    pub busy_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("matrix_data.db"),
            queue_capacity: 10_000,
            batch_size: 50,
            flush_interval: Duration::from_millis(500),
            poll_timeout: Duration::from_millis(100),
            open_retries: 3,
            busy_backoff: Duration::from_millis(50),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Append-only sample store backed by SQLite
///
/// Dropping the engine (or calling [`StorageEngine::shutdown`]) closes the
/// queue; the writer drains what is left and flushes it before stopping.
pub struct StorageEngine {
    tx: mpsc::Sender<PointSample>,
    writer: JoinHandle<()>,
    config: StorageConfig,
}

impl StorageEngine {
    /// Initialize the schema and start the background writer.
    pub async fn open(config: StorageConfig) -> Result<Self> {
        let cfg = config.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = db::open_with_retries(&cfg.db_path, &cfg)?;
            db::init_schema(&conn)?;
            Ok(())
        })
        .await
        .map_err(|_| CoreError::ChannelClosed("storage init"))??;

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let writer = tokio::spawn(writer_loop(rx, tx.downgrade(), config.clone()));
        info!(path = %config.db_path.display(), "storage engine started");
        Ok(Self { tx, writer, config })
    }

    /// Queue one sample; never blocks. Returns false when the queue is
    /// full and the sample was discarded.
    pub fn add_data_point(&self, sample: PointSample) -> bool {
        self.tx.try_send(sample).is_ok()
    }

    /// Queue every point of a frame; returns how many were accepted.
    pub fn add_frame_points<I>(&self, samples: I) -> usize
    where
        I: IntoIterator<Item = PointSample>,
    {
        let mut accepted = 0usize;
        for sample in samples {
            if self.tx.try_send(sample).is_ok() {
                accepted += 1;
            }
        }
        accepted
    }

    /// Write one sample synchronously, bypassing the queue. Meant for
    /// low-rate tracked-point recording where durability matters more
    /// than latency.
    pub async fn add_data_point_blocking(&self, sample: PointSample) -> Result<()> {
        let cfg = self.config.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = db::open_with_retries(&cfg.db_path, &cfg)?;
            db::insert_batch(&mut conn, std::slice::from_ref(&sample))?;
            Ok(())
        })
        .await
        .map_err(|_| CoreError::ChannelClosed("storage write"))?
    }

    /// Values recorded for one cell, oldest first. `limit` keeps the
    /// newest N entries. A busy read is retried once after a short wait.
    pub async fn point_history(
        &self,
        row: u8,
        col: u8,
        limit: Option<usize>,
    ) -> Result<Vec<i64>> {
        let cfg = self.config.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<i64>> {
            let conn = db::open_with_retries(&cfg.db_path, &cfg)?;
            match db::point_history(&conn, row, col, limit) {
                Err(e) if db::is_busy(&e) => {
                    std::thread::sleep(cfg.busy_backoff);
                    Ok(db::point_history(&conn, row, col, limit)?)
                }
                other => Ok(other?),
            }
        })
        .await
        .map_err(|_| CoreError::ChannelClosed("storage query"))?
    }

    /// Stop the writer after it has flushed everything still queued.
    pub async fn shutdown(self) {
        let StorageEngine {
            tx,
            writer,
            config: _,
        } = self;
        drop(tx);
        if writer.await.is_err() {
            error!("storage writer panicked during shutdown");
        }
        info!("storage engine stopped");
    }
}

/// Outcome of one blocking flush attempt
enum FlushOutcome {
    Done,
    /// Contention; the untouched batch comes back for re-queueing
    Busy(Vec<PointSample>),
    Failed(CoreError),
}

fn flush_blocking(samples: Vec<PointSample>, config: &StorageConfig) -> FlushOutcome {
    let mut conn = match db::open_with_retries(&config.db_path, config) {
        Ok(conn) => conn,
        Err(CoreError::StorageBusy { .. }) => return FlushOutcome::Busy(samples),
        Err(e) => return FlushOutcome::Failed(e),
    };
    match db::insert_batch(&mut conn, &samples) {
        Ok(()) => FlushOutcome::Done,
        Err(e) if db::is_busy(&e) => FlushOutcome::Busy(samples),
        Err(e) => FlushOutcome::Failed(e.into()),
    }
}

/// Background writer: accumulate samples, flush on size or age, re-queue
/// busy batches.
async fn writer_loop(
    mut rx: mpsc::Receiver<PointSample>,
    requeue: mpsc::WeakSender<PointSample>,
    config: StorageConfig,
) {
    let mut batch: Vec<PointSample> = Vec::with_capacity(config.batch_size);
    let mut last_flush = Instant::now();

    loop {
        match tokio::time::timeout(config.poll_timeout, rx.recv()).await {
            Ok(Some(sample)) => batch.push(sample),
            // Channel closed and drained: the engine is shutting down.
            Ok(None) => break,
            // Poll timeout; fall through to the age check.
            Err(_) => {}
        }

        let flush_due = batch.len() >= config.batch_size
            || (!batch.is_empty() && last_flush.elapsed() >= config.flush_interval);
        if flush_due {
            flush(&mut batch, &requeue, &config).await;
            last_flush = Instant::now();
        }
    }

    // Final synchronous flush of whatever was still pending.
    if !batch.is_empty() {
        flush(&mut batch, &requeue, &config).await;
    }
    debug!("storage writer stopped");
}

async fn flush(
    batch: &mut Vec<PointSample>,
    requeue: &mpsc::WeakSender<PointSample>,
    config: &StorageConfig,
) {
    let samples = std::mem::take(batch);
    let count = samples.len();
    let cfg = config.clone();

    match tokio::task::spawn_blocking(move || flush_blocking(samples, &cfg)).await {
        Ok(FlushOutcome::Done) => trace!(count, "batch committed"),
        Ok(FlushOutcome::Busy(samples)) => {
            // Transactional rollback guarantees none of the batch landed;
            // put it back for a later attempt.
            warn!(count, "storage busy, re-queueing batch");
            match requeue.upgrade() {
                Some(tx) => {
                    let mut dropped = 0usize;
                    for sample in samples {
                        if tx.try_send(sample).is_err() {
                            dropped += 1;
                        }
                    }
                    if dropped > 0 {
                        warn!(dropped, "queue full during re-queue, samples lost");
                    }
                }
                None => warn!(count, "engine shut down during re-queue, batch lost"),
            }
        }
        Ok(FlushOutcome::Failed(e)) => error!(error = %e, count, "batch write failed, samples lost"),
        Err(e) => error!(error = %e, "flush task failed"),
    }
}
