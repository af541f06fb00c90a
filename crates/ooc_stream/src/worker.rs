//! Fixed pool of block-loading threads.
//!
//! Each worker loops `pop job → read block file → push result` until the job
//! queue is stopped and drained. Workers never touch residency state.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use web_time::Instant;

use crate::block_store::read_block_file;
use crate::job::{Job, LoadResult};
use crate::queue::WorkQueue;

/// Execute one job. Never fails: read errors are carried in the result with
/// an empty point buffer.
pub fn load_job(job: Job) -> LoadResult {
  let start = Instant::now();
  let Job {
    block_id,
    destination,
    count,
    path,
    mut buffer,
  } = job;

  let error = read_block_file(&path, count, &mut buffer).err();
  if let Some(e) = &error {
    tracing::warn!(block = block_id, error = %e, "block load failed");
  }

  LoadResult {
    block_id,
    destination,
    points: buffer,
    error,
    load_us: start.elapsed().as_micros() as u64,
  }
}

/// Worker thread body.
pub fn worker_main(worker_id: usize, jobs: &WorkQueue<Job>, results: &WorkQueue<LoadResult>) {
  tracing::debug!(worker_id, "block worker started");
  let mut loaded = 0usize;
  while let Some(job) = jobs.pop() {
    results.push(load_job(job));
    loaded += 1;
  }
  tracing::debug!(worker_id, loaded, "block worker exiting");
}

pub struct WorkerPool {
  jobs: Arc<WorkQueue<Job>>,
  handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
  /// Start `num_workers` threads named `ooc-worker-{i}`.
  pub fn spawn(
    num_workers: usize,
    jobs: Arc<WorkQueue<Job>>,
    results: Arc<WorkQueue<LoadResult>>,
  ) -> io::Result<Self> {
    // Dropping a partially built pool on spawn failure joins what started
    let mut pool = Self {
      jobs: Arc::clone(&jobs),
      handles: Vec::with_capacity(num_workers),
    };

    for worker_id in 0..num_workers {
      let jobs = Arc::clone(&jobs);
      let results = Arc::clone(&results);
      let handle = thread::Builder::new()
        .name(format!("ooc-worker-{worker_id}"))
        .spawn(move || worker_main(worker_id, &jobs, &results))?;
      pool.handles.push(handle);
    }

    tracing::info!(num_workers, "worker pool started");
    Ok(pool)
  }

  /// Live worker threads.
  pub fn len(&self) -> usize {
    self.handles.len()
  }

  pub fn is_empty(&self) -> bool {
    self.handles.is_empty()
  }

  /// Stop the job queue and join every worker. Idempotent.
  pub fn shutdown(&mut self) {
    if self.handles.is_empty() {
      return;
    }
    self.jobs.stop();
    for handle in self.handles.drain(..) {
      if handle.join().is_err() {
        tracing::error!("block worker panicked");
      }
    }
    tracing::debug!("worker pool joined");
  }
}

impl Drop for WorkerPool {
  fn drop(&mut self) {
    self.shutdown();
  }
}

#[cfg(test)]
#[path = "worker_test.rs"]
mod worker_test;
