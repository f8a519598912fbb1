//! Command buffers over rayon's pool.
//!
//! Kernels are rayon parallel loops. They run as soon as they are
//! dispatched, but the results only become meaningful to the CPU side after
//! the owning command buffer is committed and waited on. Every stage follows
//! the same lock-step shape:
//!
//! ```text
//! command buffer 1:  mark ─► count 16 ─► count 256 ─► count 4096
//!                    commit_and_wait()
//! CPU:               exclusive prefix over the 4096-blocks, grow buffers
//! command buffer 2:  offsets 4096 ─► offsets 256 ─► offsets 16 ─► fill
//!                    commit_and_wait()
//! ```
//!
//! The queue keeps running totals so callers (and tests) can see exactly how
//! much work a stage issued.

/// Dispatch accounting for one queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
  /// Committed command buffers.
  pub command_buffers: u64,
  /// Kernel dispatches across all committed command buffers.
  pub dispatches: u64,
  /// Sum of the thread counts passed to `dispatch`.
  pub threads: u64,
  /// Blocking waits after which the CPU read results back.
  pub cpu_handoffs: u64,
  /// Buffers replaced by larger ones.
  pub buffer_growths: u64,
}

impl DispatchStats {
  /// Work issued since `earlier` was captured.
  pub fn since(&self, earlier: &DispatchStats) -> DispatchStats {
    DispatchStats {
      command_buffers: self.command_buffers - earlier.command_buffers,
      dispatches: self.dispatches - earlier.dispatches,
      threads: self.threads - earlier.threads,
      cpu_handoffs: self.cpu_handoffs - earlier.cpu_handoffs,
      buffer_growths: self.buffer_growths - earlier.buffer_growths,
    }
  }
}

/// Serial queue of command buffers.
#[derive(Debug, Default)]
pub struct ComputeQueue {
  stats: DispatchStats,
}

impl ComputeQueue {
  pub fn new() -> Self {
    Self::default()
  }

  /// Begin encoding a command buffer.
  pub fn command_buffer(&mut self, label: &'static str) -> CommandBuffer<'_> {
    CommandBuffer {
      queue: self,
      label,
      dispatches: 0,
      threads: 0,
    }
  }

  pub fn stats(&self) -> DispatchStats {
    self.stats
  }

  /// Record that a buffer was replaced by a larger one.
  pub fn record_growth(&mut self, label: &'static str, capacity: usize) {
    self.stats.buffer_growths += 1;
    #[cfg(feature = "tracing")]
    tracing::debug!(buffer = label, capacity, "grew buffer");
    #[cfg(not(feature = "tracing"))]
    let _ = (label, capacity);
  }
}

/// A sequence of kernel dispatches submitted together.
pub struct CommandBuffer<'q> {
  queue: &'q mut ComputeQueue,
  label: &'static str,
  dispatches: u64,
  threads: u64,
}

impl CommandBuffer<'_> {
  /// Encode and run one kernel over `threads` logical threads.
  pub fn dispatch<R>(
    &mut self,
    kernel: &'static str,
    threads: usize,
    work: impl FnOnce() -> R,
  ) -> R {
    #[cfg(feature = "tracing")]
    let _span = tracing::info_span!(
      "dispatch",
      command_buffer = self.label,
      kernel,
      threads
    )
    .entered();
    #[cfg(not(feature = "tracing"))]
    let _ = kernel;

    self.dispatches += 1;
    self.threads += threads as u64;
    work()
  }

  pub fn label(&self) -> &'static str {
    self.label
  }

  /// Number of dispatches encoded so far.
  pub fn dispatch_count(&self) -> u64 {
    self.dispatches
  }

  /// Submit the command buffer and block until it completes.
  ///
  /// After this returns, every buffer written by the encoded kernels may be
  /// read on the CPU.
  pub fn commit_and_wait(self) {
    let stats = &mut self.queue.stats;
    stats.command_buffers += 1;
    stats.dispatches += self.dispatches;
    stats.threads += self.threads;
    stats.cpu_handoffs += 1;
  }
}
