use std::ops::Range;

use strata_geometry::{Box3, Vec3};

/// Limits where tree building stops and a node stays a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeBuildOption {
  pub max_depth: usize,
  /// a node holding at most this many primitives is not split further
  pub max_leaf_size: usize,
}

impl Default for TreeBuildOption {
  fn default() -> Self {
    Self {
      max_depth: 10,
      max_leaf_size: 50,
    }
  }
}

impl TreeBuildOption {
  pub fn stays_leaf(&self, primitive_count: usize, depth: usize) -> bool {
    depth >= self.max_depth || primitive_count <= self.max_leaf_size
  }
}

/// A primitive bounding with its cached centroid.
#[derive(Debug, Clone, Copy)]
pub struct BuildEntry<B> {
  pub bounding: B,
  pub centroid: Vec3,
}

/// Merged bounding of the entries that `order[range]` points to.
pub fn range_bounding<B>(entries: &[BuildEntry<B>], order: &[usize], range: Range<usize>) -> B
where
  B: Copy + FromIterator<B>,
{
  order[range].iter().map(|&i| entries[i].bounding).collect()
}

/// Deterministic random boxes scattered in `[0, space_size]^3`, each extent up to `2 * box_size`.
pub fn random_boxes(seed: u64, count: usize, space_size: f32, box_size: f32) -> Vec<Box3> {
  use rand::prelude::*;
  use rand_chacha::ChaCha8Rng;

  let mut rng = ChaCha8Rng::seed_from_u64(seed);
  let mut vec3 = move || Vec3::new(rng.gen(), rng.gen(), rng.gen());

  (0..count)
    .map(|_| {
      let center = vec3() * space_size;
      let extent = vec3() * box_size;
      Box3::new3(center - extent, center + extent)
    })
    .collect()
}
