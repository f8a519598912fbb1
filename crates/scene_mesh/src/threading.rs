//! Background execution on rayon's pool.
//!
//! Uses `rayon::spawn` for fire-and-forget work submission and a channel
//! for results. The owner polls once per frame; nothing calls back into
//! the render loop.
//!
//! # Usage
//!
//! ```ignore
//! let mut executor = TaskExecutor::new();
//!
//! // Queue work (non-blocking)
//! let task_id = executor.spawn(move || expensive_computation());
//!
//! // Poll for results each frame
//! if let Some(done) = executor.poll() {
//!     // Use done.output
//! }
//! ```

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

/// Unique identifier for a spawned task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
  fn next() -> Self {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    Self(COUNTER.fetch_add(1, Ordering::Relaxed))
  }
}

/// A finished task. `output` is `None` when the task panicked.
#[derive(Debug)]
pub struct TaskCompletion<T> {
  pub id: TaskId,
  pub output: Option<T>,
}

/// Typed task executor on rayon's thread pool.
pub struct TaskExecutor<T> {
  sender: Sender<TaskCompletion<T>>,
  receiver: Receiver<TaskCompletion<T>>,
  pending: HashSet<TaskId>,
}

impl<T: Send + 'static> TaskExecutor<T> {
  pub fn new() -> Self {
    let (sender, receiver) = crossbeam_channel::unbounded();
    Self {
      sender,
      receiver,
      pending: HashSet::new(),
    }
  }

  /// Spawn a task on rayon's thread pool (non-blocking).
  pub fn spawn<F>(&mut self, work: F) -> TaskId
  where
    F: FnOnce() -> T + Send + 'static,
  {
    let id = TaskId::next();
    self.pending.insert(id);
    let sender = self.sender.clone();
    rayon::spawn(move || {
      let output = catch_unwind(AssertUnwindSafe(work)).ok();
      // The executor may have been dropped; the result is then unwanted.
      let _ = sender.send(TaskCompletion { id, output });
    });
    id
  }

  /// Take one finished task, if any (non-blocking).
  pub fn poll(&mut self) -> Option<TaskCompletion<T>> {
    match self.receiver.try_recv() {
      Ok(done) => {
        self.pending.remove(&done.id);
        Some(done)
      }
      Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
    }
  }

  /// Block up to `timeout` for a finished task.
  pub fn wait(&mut self, timeout: Duration) -> Option<TaskCompletion<T>> {
    if self.pending.is_empty() {
      return self.poll();
    }
    match self.receiver.recv_timeout(timeout) {
      Ok(done) => {
        self.pending.remove(&done.id);
        Some(done)
      }
      Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
    }
  }

  pub fn is_pending(&self, id: TaskId) -> bool {
    self.pending.contains(&id)
  }

  /// Number of tasks spawned and not yet polled.
  pub fn pending_count(&self) -> usize {
    self.pending.len()
  }

  /// Get the number of worker threads in rayon's pool.
  pub fn num_threads(&self) -> usize {
    rayon::current_num_threads()
  }
}

impl<T: Send + 'static> Default for TaskExecutor<T> {
  fn default() -> Self {
    Self::new()
  }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
  use super::*;

  fn wait_for<T: Send + 'static>(executor: &mut TaskExecutor<T>) -> TaskCompletion<T> {
    executor.wait(Duration::from_secs(10)).expect("task finished")
  }

  #[test]
  fn test_spawn_and_poll() {
    let mut executor = TaskExecutor::new();
    let task_id = executor.spawn(|| 42i32);
    assert!(executor.is_pending(task_id));

    let done = wait_for(&mut executor);
    assert_eq!(done.id, task_id);
    assert_eq!(done.output, Some(42));
    assert!(!executor.is_pending(task_id));
    assert!(executor.poll().is_none());
  }

  #[test]
  fn test_multiple_tasks() {
    let mut executor = TaskExecutor::new();
    let ids: Vec<_> = (0..10).map(|i| executor.spawn(move || i * 2)).collect();
    assert_eq!(executor.pending_count(), 10);

    let mut results = vec![None; 10];
    for _ in 0..10 {
      let done = wait_for(&mut executor);
      let slot = ids.iter().position(|&id| id == done.id).expect("known task");
      results[slot] = done.output;
    }
    for (i, result) in results.into_iter().enumerate() {
      assert_eq!(result, Some(i * 2));
    }
    assert_eq!(executor.pending_count(), 0);
  }

  #[test]
  fn test_panicking_task_reports_no_output() {
    let mut executor: TaskExecutor<u32> = TaskExecutor::new();
    let id = executor.spawn(|| panic!("cycle failed"));
    let done = wait_for(&mut executor);
    assert_eq!(done.id, id);
    assert!(done.output.is_none());
  }

  #[test]
  fn test_wait_without_tasks_returns_immediately() {
    let mut executor: TaskExecutor<u32> = TaskExecutor::new();
    assert!(executor.wait(Duration::from_secs(60)).is_none());
  }
}
