use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::*;

#[test]
fn test_fifo_single_thread() {
  let q = WorkQueue::new();
  q.push(1);
  q.push(2);
  q.push(3);
  assert_eq!(q.len(), 3);
  assert_eq!(q.pop(), Some(1));
  assert_eq!(q.try_pop(), Some(2));
  assert_eq!(q.pop(), Some(3));
  assert!(q.is_empty());
  assert_eq!(q.try_pop(), None);
}

#[test]
fn test_stop_drains_then_fails() {
  let q = WorkQueue::new();
  q.push("a");
  q.push("b");
  q.stop();
  assert!(q.is_stopped());

  assert_eq!(q.pop(), Some("a"));
  assert_eq!(q.pop(), Some("b"));
  assert_eq!(q.pop(), None);
  assert_eq!(q.pop(), None);
}

#[test]
fn test_stop_is_idempotent() {
  let q: WorkQueue<u8> = WorkQueue::new();
  q.stop();
  q.stop();
  assert_eq!(q.pop(), None);
}

#[test]
fn test_stop_wakes_all_blocked_waiters() {
  let q: Arc<WorkQueue<u32>> = Arc::new(WorkQueue::new());

  let waiters: Vec<_> = (0..4)
    .map(|_| {
      let q = Arc::clone(&q);
      thread::spawn(move || q.pop())
    })
    .collect();

  thread::sleep(Duration::from_millis(50));
  q.stop();

  for w in waiters {
    assert_eq!(w.join().unwrap(), None);
  }
}

#[test]
fn test_push_wakes_blocked_pop() {
  let q: Arc<WorkQueue<u32>> = Arc::new(WorkQueue::new());
  let consumer = {
    let q = Arc::clone(&q);
    thread::spawn(move || q.pop())
  };

  thread::sleep(Duration::from_millis(20));
  q.push(42);
  assert_eq!(consumer.join().unwrap(), Some(42));
}

/// Every pushed item is delivered exactly once across competing consumers.
#[test]
fn test_many_producers_many_consumers() {
  let q: Arc<WorkQueue<u32>> = Arc::new(WorkQueue::new());
  const PER_PRODUCER: u32 = 500;

  let consumers: Vec<_> = (0..3)
    .map(|_| {
      let q = Arc::clone(&q);
      thread::spawn(move || {
        let mut got = Vec::new();
        while let Some(v) = q.pop() {
          got.push(v);
        }
        got
      })
    })
    .collect();

  let producers: Vec<_> = (0..4)
    .map(|p| {
      let q = Arc::clone(&q);
      thread::spawn(move || {
        for i in 0..PER_PRODUCER {
          q.push(p * PER_PRODUCER + i);
        }
      })
    })
    .collect();
  for p in producers {
    p.join().unwrap();
  }
  q.stop();

  let mut all: Vec<u32> = consumers
    .into_iter()
    .flat_map(|c| c.join().unwrap())
    .collect();
  all.sort_unstable();
  assert_eq!(all, (0..4 * PER_PRODUCER).collect::<Vec<_>>());
}
