//! Blocking multi-producer multi-consumer work queue with stop support.
//!
//! `pop` blocks until an item arrives or the queue is stopped. Stopping is
//! signalled by dropping the sender of a second channel: every waiter parked
//! in `select!` sees the disconnect at once. Items pushed before `stop` are
//! still handed out; `pop` returns `None` only once stopped AND empty.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crossbeam_channel::{self as channel, select, Receiver, Sender};

pub struct WorkQueue<T> {
  tx: Sender<T>,
  rx: Receiver<T>,
  /// Dropped by `stop` to wake all blocked `pop` calls.
  stop_tx: Mutex<Option<Sender<()>>>,
  stop_rx: Receiver<()>,
  stopped: AtomicBool,
}

impl<T> Default for WorkQueue<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> WorkQueue<T> {
  pub fn new() -> Self {
    let (tx, rx) = channel::unbounded();
    let (stop_tx, stop_rx) = channel::bounded(0);
    Self {
      tx,
      rx,
      stop_tx: Mutex::new(Some(stop_tx)),
      stop_rx,
      stopped: AtomicBool::new(false),
    }
  }

  /// Append an item, waking one waiter.
  pub fn push(&self, item: T) {
    // `self.rx` keeps the channel connected, so send cannot fail
    let _ = self.tx.send(item);
  }

  /// Block until an item is available. `None` once stopped and drained.
  pub fn pop(&self) -> Option<T> {
    loop {
      if let Ok(item) = self.rx.try_recv() {
        return Some(item);
      }
      if self.is_stopped() {
        return self.rx.try_recv().ok();
      }

      select! {
        recv(self.rx) -> msg => {
          if let Ok(item) = msg {
            return Some(item);
          }
        }
        recv(self.stop_rx) -> _ => {}
      }
    }
  }

  /// Non-blocking pop.
  pub fn try_pop(&self) -> Option<T> {
    self.rx.try_recv().ok()
  }

  /// Wake every waiter permanently. Idempotent.
  pub fn stop(&self) {
    self.stopped.store(true, Ordering::Release);
    self
      .stop_tx
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take();
  }

  #[inline]
  pub fn is_stopped(&self) -> bool {
    self.stopped.load(Ordering::Acquire)
  }

  /// Items currently queued.
  pub fn len(&self) -> usize {
    self.rx.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rx.is_empty()
  }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod queue_test;
