//! When a reconstruction cycle may start.
//!
//! A cycle starts only when none is in flight, the upstream mesh changed
//! since the last start, and enough render frames went by. The very first
//! cycle does not wait.

use crate::config::TriggerConfig;

#[derive(Clone, Debug)]
pub struct ReconstructionTrigger {
  config: TriggerConfig,
  last_generation: Option<u64>,
  frames_since_start: Option<u32>,
}

impl ReconstructionTrigger {
  pub fn new(config: TriggerConfig) -> Self {
    Self {
      config,
      last_generation: None,
      frames_since_start: None,
    }
  }

  pub fn config(&self) -> &TriggerConfig {
    &self.config
  }

  /// Count one render frame.
  pub fn advance_frame(&mut self) {
    if let Some(frames) = &mut self.frames_since_start {
      *frames = frames.saturating_add(1);
    }
  }

  /// Whether a cycle over `generation` may start now.
  pub fn is_due(&self, in_flight: bool, generation: u64) -> bool {
    if in_flight || self.last_generation == Some(generation) {
      return false;
    }
    match self.frames_since_start {
      None => true,
      Some(frames) => frames >= self.config.min_frames_between_cycles,
    }
  }

  /// Record that a cycle over `generation` started.
  pub fn record_start(&mut self, generation: u64) {
    self.last_generation = Some(generation);
    self.frames_since_start = Some(0);
  }

  /// Forget the last started generation so it may be retried, as when its
  /// cycle was skipped.
  pub fn forget_generation(&mut self) {
    self.last_generation = None;
  }

  pub fn last_generation(&self) -> Option<u64> {
    self.last_generation
  }
}

impl Default for ReconstructionTrigger {
  fn default() -> Self {
    Self::new(TriggerConfig::default())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn trigger(min_frames: u32) -> ReconstructionTrigger {
    ReconstructionTrigger::new(TriggerConfig::default().with_min_frames_between_cycles(min_frames))
  }

  #[test]
  fn test_first_cycle_starts_immediately() {
    let trigger = trigger(30);
    assert!(trigger.is_due(false, 1));
    assert!(!trigger.is_due(true, 1));
  }

  #[test]
  fn test_same_generation_never_restarts() {
    let mut trigger = trigger(0);
    trigger.record_start(4);
    for _ in 0..100 {
      trigger.advance_frame();
    }
    assert!(!trigger.is_due(false, 4));
    assert!(trigger.is_due(false, 5));
  }

  #[test]
  fn test_waits_for_minimum_frames() {
    let mut trigger = trigger(3);
    trigger.record_start(1);
    trigger.advance_frame();
    trigger.advance_frame();
    assert!(!trigger.is_due(false, 2));
    trigger.advance_frame();
    assert!(trigger.is_due(false, 2));
    assert!(!trigger.is_due(true, 2));
  }

  #[test]
  fn test_forgotten_generation_may_retry() {
    let mut trigger = trigger(0);
    trigger.record_start(9);
    trigger.forget_generation();
    assert!(trigger.is_due(false, 9));
    assert_eq!(trigger.last_generation(), None);
  }
}
