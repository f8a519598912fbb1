//! Color refresh cadence by device thermal state.

/// Device thermal pressure as reported by the platform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ThermalState {
  #[default]
  Nominal,
  Fair,
  Serious,
  Critical,
}

impl ThermalState {
  /// Frames between color refreshes; `None` stops refreshing.
  pub fn color_update_interval(self) -> Option<u32> {
    match self {
      ThermalState::Nominal => Some(6),
      ThermalState::Fair => Some(9),
      ThermalState::Serious => Some(24),
      ThermalState::Critical => None,
    }
  }
}

/// Decides, once per frame, whether this frame samples camera color.
#[derive(Clone, Debug)]
pub struct ColorSamplingThrottle {
  state: ThermalState,
  frames_since_sample: u32,
  forced: bool,
}

impl ColorSamplingThrottle {
  /// The first frame always samples.
  pub fn new(state: ThermalState) -> Self {
    Self {
      state,
      frames_since_sample: 0,
      forced: true,
    }
  }

  pub fn state(&self) -> ThermalState {
    self.state
  }

  pub fn set_state(&mut self, state: ThermalState) {
    self.state = state;
  }

  /// Make the next permitted frame sample regardless of the interval.
  pub fn force_next(&mut self) {
    self.forced = true;
  }

  pub fn is_forced(&self) -> bool {
    self.forced
  }

  /// Advance one frame. Returns whether this frame samples.
  pub fn should_sample(&mut self) -> bool {
    let Some(interval) = self.state.color_update_interval() else {
      return false;
    };
    self.frames_since_sample += 1;
    if self.forced || self.frames_since_sample >= interval {
      self.frames_since_sample = 0;
      self.forced = false;
      return true;
    }
    false
  }
}

impl Default for ColorSamplingThrottle {
  fn default() -> Self {
    Self::new(ThermalState::Nominal)
  }
}
