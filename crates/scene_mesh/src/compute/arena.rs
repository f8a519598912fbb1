//! Growable power-of-two buffers.
//!
//! A [`GrowableBuffer`] never resizes in place. When a pass needs more room
//! than the buffer has, a new allocation of the next power of two replaces
//! the old one wholesale and the live prefix is copied across. Capacity
//! only ever grows, so a buffer that survived a large cycle keeps its
//! allocation for the rest of the session.

use crate::error::{ReconstructionError, Result};

/// Owning buffer with power-of-two capacity and an explicit length.
#[derive(Clone, Debug)]
pub struct GrowableBuffer<T> {
  data: Vec<T>,
  len: usize,
  label: &'static str,
}

impl<T: Copy + Default> GrowableBuffer<T> {
  /// Allocate a buffer holding at least `capacity` elements.
  pub fn with_capacity(label: &'static str, capacity: usize) -> Self {
    let capacity = capacity.max(1).next_power_of_two();
    Self {
      data: vec![T::default(); capacity],
      len: 0,
      label,
    }
  }

  pub fn label(&self) -> &'static str {
    self.label
  }

  #[inline]
  pub fn capacity(&self) -> usize {
    self.data.len()
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.len
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Make room for `required` elements.
  ///
  /// Returns `Ok(true)` when the buffer was replaced by a larger one.
  pub fn ensure_capacity(&mut self, required: usize) -> Result<bool> {
    if required <= self.capacity() {
      return Ok(false);
    }
    let capacity = required
      .checked_next_power_of_two()
      .filter(|&c| c as u64 <= 1u64 << 32)
      .ok_or(ReconstructionError::CapacityOverflow {
        requested: required,
      })?;

    let mut replacement = vec![T::default(); capacity];
    replacement[..self.len].copy_from_slice(&self.data[..self.len]);
    self.data = replacement;
    Ok(true)
  }

  /// Set the length, growing if needed. Newly exposed elements are reset to
  /// `T::default()`.
  pub fn resize(&mut self, len: usize) -> Result<bool> {
    let grew = self.ensure_capacity(len)?;
    if len > self.len {
      self.data[self.len..len].fill(T::default());
    }
    self.len = len;
    Ok(grew)
  }

  /// Replace the contents with `src`, growing if needed.
  pub fn assign(&mut self, src: &[T]) -> Result<bool> {
    let grew = self.ensure_capacity(src.len())?;
    self.data[..src.len()].copy_from_slice(src);
    self.len = src.len();
    Ok(grew)
  }

  /// Append `src`, growing if needed.
  pub fn extend_from_slice(&mut self, src: &[T]) -> Result<bool> {
    let end = self.len + src.len();
    let grew = self.ensure_capacity(end)?;
    self.data[self.len..end].copy_from_slice(src);
    self.len = end;
    Ok(grew)
  }

  /// Forget the contents but keep the allocation.
  pub fn clear(&mut self) {
    self.len = 0;
  }

  #[inline]
  pub fn as_slice(&self) -> &[T] {
    &self.data[..self.len]
  }

  #[inline]
  pub fn as_mut_slice(&mut self) -> &mut [T] {
    &mut self.data[..self.len]
  }
}

impl<T> std::ops::Deref for GrowableBuffer<T> {
  type Target = [T];

  fn deref(&self) -> &[T] {
    &self.data[..self.len]
  }
}

#[cfg(test)]
#[path = "arena_test.rs"]
mod arena_test;
