//! Background batch prefetching
//!
//! `num_workers` threads sample batches ahead of the trainer into bounded
//! channels. Worker `i` owns batch indices `start + i`, `start + i + W`, ...
//! and the consumer drains the channels round-robin, so batches arrive in
//! index order no matter how many workers run.

use super::batch::Batch;
use super::corpus::FeatureSource;
use super::sampler::BatchSampler;
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Prefetch settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Number of sampler threads
    pub num_workers: usize,
    /// Batches buffered per worker
    pub capacity: usize,
    /// Index of the first batch to produce
    pub start_index: u64,
    /// Total number of batches to produce, unbounded if `None`
    pub limit: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            num_workers: 2,
            capacity: 10,
            start_index: 0,
            limit: None,
        }
    }
}

/// Source of training batches consumed by the sweep loop
pub trait BatchSource {
    /// Next batch, or `None` once the source is exhausted
    fn next_batch(&mut self) -> Result<Option<Batch>>;
}

impl BatchSource for std::vec::IntoIter<Batch> {
    fn next_batch(&mut self) -> Result<Option<Batch>> {
        Ok(self.next())
    }
}

/// Bounded multi-worker batch queue
pub struct BatchQueue {
    receivers: Vec<Receiver<Result<Batch>>>,
    workers: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    config: QueueConfig,
    produced: u64,
    closed: bool,
    /// Set once an error has been delivered; the stream is over
    failed: bool,
}

impl BatchQueue {
    /// Start the sampler workers
    pub fn spawn<F>(sampler: Arc<BatchSampler<F>>, config: QueueConfig) -> Result<Self>
    where
        F: FeatureSource + 'static,
    {
        if config.num_workers == 0 {
            return Err(Error::config(
                "num_parallel_datasets",
                "at least one sampler worker is required",
            ));
        }
        if config.capacity == 0 {
            return Err(Error::config(
                "queue_capacity",
                "the batch queue needs room for at least one batch",
            ));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stride = config.num_workers as u64;
        let end = config.limit.map(|n| config.start_index + n);
        let mut receivers = Vec::with_capacity(config.num_workers);
        let mut workers = Vec::with_capacity(config.num_workers);

        for worker in 0..config.num_workers {
            let (tx, rx) = sync_channel(config.capacity);
            let sampler = Arc::clone(&sampler);
            let stop = Arc::clone(&stop);
            let first = config.start_index + worker as u64;

            let handle = thread::Builder::new()
                .name(format!("sampler-{worker}"))
                .spawn(move || {
                    let mut index = first;
                    while end.is_none_or(|end| index < end) {
                        if stop.load(Ordering::Relaxed) {
                            break;
                        }
                        let item = sampler.sample(index);
                        let failed = item.is_err();
                        if tx.send(item).is_err() || failed {
                            break;
                        }
                        index += stride;
                    }
                })
                .map_err(|e| Error::io(format!("spawning sampler worker {worker}"), e))?;

            receivers.push(rx);
            workers.push(handle);
        }

        tracing::debug!(
            workers = config.num_workers,
            capacity = config.capacity,
            start = config.start_index,
            "batch queue started"
        );

        Ok(Self {
            receivers,
            workers,
            stop,
            config,
            produced: 0,
            closed: false,
            failed: false,
        })
    }

    /// Index of the batch the next call to [`BatchQueue::next`] returns
    pub fn next_index(&self) -> u64 {
        self.config.start_index + self.produced
    }

    /// Next batch in index order
    ///
    /// Returns `Ok(None)` once the configured limit is reached. A sampling
    /// failure is returned in place of the batch it would have produced and
    /// ends the stream: every later call returns `Ok(None)`.
    pub fn next(&mut self) -> Result<Option<Batch>> {
        if self.closed {
            return Err(Error::State("batch queue is closed".into()));
        }
        if self.failed || self.config.limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(None);
        }

        let worker = (self.produced % self.config.num_workers as u64) as usize;
        let item = match self.receivers[worker].recv() {
            Ok(item) => item,
            Err(_) => Err(Error::Execution(format!(
                "sampler worker {worker} stopped before producing batch {}",
                self.next_index()
            ))),
        };
        match item {
            Ok(batch) => {
                self.produced += 1;
                Ok(Some(batch))
            }
            Err(e) => {
                self.failed = true;
                // workers stop at their next batch; close() unblocks the rest
                self.stop.store(true, Ordering::Relaxed);
                tracing::debug!(batch = self.next_index(), error = %e, "batch stream ended by error");
                Err(e)
            }
        }
    }

    /// Stop the workers and release the buffered batches
    ///
    /// Idempotent; also runs on drop.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.stop.store(true, Ordering::Relaxed);
        // dropping the receivers unblocks workers waiting on a full channel
        self.receivers.clear();
        for (i, handle) in self.workers.drain(..).enumerate() {
            if handle.join().is_err() {
                tracing::warn!(worker = i, "sampler worker panicked");
            }
        }
        tracing::debug!(produced = self.produced, "batch queue closed");
    }

    /// True once [`BatchQueue::close`] has run
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl BatchSource for BatchQueue {
    fn next_batch(&mut self) -> Result<Option<Batch>> {
        self.next()
    }
}

impl Drop for BatchQueue {
    fn drop(&mut self) {
        self.close();
    }
}
