use super::*;

// =========================================================================
// Batch 1: Capacity rounding
// =========================================================================

#[test]
fn test_initial_capacity_is_power_of_two() {
  for requested in [0usize, 1, 3, 16, 17, 1000, 65_536] {
    let buffer = GrowableBuffer::<u32>::with_capacity("t", requested);
    assert!(buffer.capacity().is_power_of_two());
    assert!(buffer.capacity() >= requested);
    assert!(buffer.is_empty());
  }
}

#[test]
fn test_ensure_capacity_within_capacity_is_noop() {
  let mut buffer = GrowableBuffer::<u32>::with_capacity("t", 64);
  assert_eq!(buffer.ensure_capacity(64), Ok(false));
  assert_eq!(buffer.capacity(), 64);
}

#[test]
fn test_ensure_capacity_rounds_to_next_power_of_two() {
  let mut buffer = GrowableBuffer::<u32>::with_capacity("t", 64);
  assert_eq!(buffer.ensure_capacity(65), Ok(true));
  assert_eq!(buffer.capacity(), 128);
  assert_eq!(buffer.ensure_capacity(1000), Ok(true));
  assert_eq!(buffer.capacity(), 1024);
}

// =========================================================================
// Batch 2: Growth monotonicity and content preservation
// =========================================================================

/// Capacity never shrinks and always covers the largest request so far.
#[test]
fn test_capacity_never_shrinks() {
  let mut buffer = GrowableBuffer::<u8>::with_capacity("t", 4);
  let mut largest = 0usize;
  let mut previous = buffer.capacity();
  let mut state = 17u32;
  for _ in 0..200 {
    state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
    let required = (state >> 20) as usize;
    buffer.resize(required).unwrap();
    largest = largest.max(required);

    assert!(buffer.capacity() >= previous, "capacity shrank");
    assert!(buffer.capacity() >= largest);
    assert!(buffer.capacity().is_power_of_two());
    previous = buffer.capacity();
  }
}

#[test]
fn test_growth_preserves_live_prefix() {
  let mut buffer = GrowableBuffer::<u32>::with_capacity("t", 4);
  buffer.assign(&[1, 2, 3, 4]).unwrap();
  assert_eq!(buffer.extend_from_slice(&[5, 6]), Ok(true));
  assert_eq!(buffer.as_slice(), &[1, 2, 3, 4, 5, 6]);
  assert_eq!(buffer.capacity(), 8);
}

#[test]
fn test_resize_resets_exposed_elements() {
  let mut buffer = GrowableBuffer::<u32>::with_capacity("t", 8);
  buffer.assign(&[9, 9, 9, 9]).unwrap();
  buffer.resize(1).unwrap();
  buffer.resize(4).unwrap();
  assert_eq!(buffer.as_slice(), &[9, 0, 0, 0]);
}

#[test]
fn test_clear_keeps_allocation() {
  let mut buffer = GrowableBuffer::<u32>::with_capacity("t", 8);
  buffer.assign(&[1; 300]).unwrap();
  let capacity = buffer.capacity();
  buffer.clear();
  assert!(buffer.is_empty());
  assert_eq!(buffer.capacity(), capacity);
}
