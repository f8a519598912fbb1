use glam::Vec3;

use super::packing::*;
use super::*;

// =========================================================================
// Batch 1: Packing
// =========================================================================

#[test]
fn test_normal_packing_axis_aligned() {
  for axis in [Vec3::X, Vec3::Y, Vec3::Z, -Vec3::X, -Vec3::Y, -Vec3::Z] {
    let unpacked = unpack_normal(pack_normal(axis));
    assert!(
      (unpacked - axis).length() < 1e-2,
      "{:?} unpacked to {:?}",
      axis,
      unpacked
    );
  }
}

#[test]
fn test_normal_packing_oblique() {
  let n = Vec3::new(0.3, -0.5, 0.8).normalize();
  let unpacked = unpack_normal(pack_normal(n));
  assert!((unpacked - n).length() < 1e-2);
}

#[test]
fn test_color_packing_is_byte_order() {
  let rgba = [10, 20, 30, 255];
  assert_eq!(unpack_color(pack_color(rgba)), rgba);
  assert_eq!(pack_color(rgba) & 0xFF, 10);
}

#[test]
fn test_color_distance_ignores_alpha() {
  assert_eq!(color_distance([0, 0, 0, 0], [0, 0, 0, 255]), 0);
  assert_eq!(color_distance([10, 20, 30, 255], [20, 10, 40, 255]), 30);
  assert_eq!(color_distance([0, 0, 0, 0], [255, 255, 255, 0]), 765);
}

// =========================================================================
// Batch 2: Bounds and matches
// =========================================================================

#[test]
fn test_bounds_corners_follow_octant_bits() {
  let b = SectorBounds::cube(Vec3::ZERO, 2.0);
  let corners = b.corners();
  assert_eq!(corners[0], Vec3::ZERO);
  assert_eq!(corners[1], Vec3::new(2.0, 0.0, 0.0));
  assert_eq!(corners[2], Vec3::new(0.0, 2.0, 0.0));
  assert_eq!(corners[4], Vec3::new(0.0, 0.0, 2.0));
  assert_eq!(corners[7], Vec3::splat(2.0));
}

#[test]
fn test_empty_bounds_become_valid() {
  let mut b = SectorBounds::empty();
  assert!(!b.is_valid());
  b.encapsulate(Vec3::ONE);
  assert!(b.is_valid());
  assert!(b.contains(Vec3::ONE));
}

#[test]
fn test_match_corner_mapping() {
  let same = TriangleMatch::Matched {
    old: 4,
    winding: Winding::Same,
    rotation: 1,
  };
  assert_eq!(
    [same.new_corner(0), same.new_corner(1), same.new_corner(2)],
    [1, 2, 0]
  );

  let reversed = TriangleMatch::Matched {
    old: 4,
    winding: Winding::Reversed,
    rotation: 0,
  };
  assert_eq!(
    [
      reversed.new_corner(0),
      reversed.new_corner(1),
      reversed.new_corner(2)
    ],
    [0, 2, 1]
  );
  assert_eq!(reversed.old_triangle(), Some(4));
  assert!(!TriangleMatch::Unmatched.is_matched());
}

// =========================================================================
// Batch 3: Raw mesh validation
// =========================================================================

fn tri_mesh() -> RawMesh {
  let v = |x: f32| Vertex::new(Vec3::new(x, 0.0, 0.0), Vec3::Y, [255; 4]);
  RawMesh::new(vec![v(0.0), v(1.0), v(2.0)], vec![[0, 1, 2]])
}

#[test]
fn test_validate_accepts_well_formed_mesh() {
  assert_eq!(tri_mesh().validate(), Ok(()));
}

#[test]
fn test_validate_rejects_empty_mesh() {
  let err = RawMesh::default().validate().unwrap_err();
  assert!(matches!(err, ReconstructionError::TooFewTriangles { .. }));
}

#[test]
fn test_validate_rejects_out_of_range_index() {
  let mut mesh = tri_mesh();
  mesh.indices.push([0, 1, 7]);
  assert_eq!(
    mesh.validate(),
    Err(ReconstructionError::IndexOutOfRange {
      triangle: 1,
      index: 7,
      vertex_count: 3
    })
  );
}

#[test]
fn test_validate_rejects_nan_position() {
  let mut mesh = tri_mesh();
  mesh.vertices[2].position[1] = f32::NAN;
  assert_eq!(
    mesh.validate(),
    Err(ReconstructionError::NonFiniteVertex { index: 2 })
  );
}

#[test]
fn test_validate_rejects_vertex_beyond_world_bound() {
  let mut mesh = tri_mesh();
  mesh.vertices[1].position[0] = 1.0e9;
  assert!(matches!(
    mesh.validate(),
    Err(ReconstructionError::VertexOutOfBounds { index: 1, .. })
  ));

  let mut mesh = tri_mesh();
  mesh.vertices[2].position[2] = -3.0e38;
  assert!(matches!(
    mesh.validate(),
    Err(ReconstructionError::VertexOutOfBounds { index: 2, .. })
  ));
}

#[test]
fn test_validate_within_uses_the_given_limit() {
  let mesh = tri_mesh();
  assert_eq!(mesh.validate_within(2.0), Ok(()));
  assert_eq!(
    mesh.validate_within(1.5),
    Err(ReconstructionError::VertexOutOfBounds { index: 2, limit: 1.5 })
  );
}
