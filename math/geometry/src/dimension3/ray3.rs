use crate::*;

/// A ray with an unnormalized direction.
///
/// Distances along the ray are parametric: a point is `origin + direction * t`. Transforming
/// the ray with an affine matrix keeps every `t` valid, which is why the direction is never
/// renormalized when moving a ray between world and object space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray3 {
  pub origin: Vec3,
  pub direction: Vec3,
}

impl Ray3 {
  pub fn new(origin: Vec3, direction: Vec3) -> Self {
    Self { origin, direction }
  }

  #[inline(always)]
  pub fn at(&self, t: f32) -> Vec3 {
    self.origin + self.direction * t
  }

  pub fn apply_matrix_into(&self, mat: Affine3A) -> Self {
    Self {
      origin: mat.transform_point3(self.origin),
      direction: mat.transform_vector3(self.direction),
    }
  }

  pub fn is_valid(&self) -> bool {
    self.origin.is_finite() && self.direction.is_finite() && self.direction != Vec3::ZERO
  }
}

/// near and far parametric distance for a ray query, both inclusive.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RayRange {
  pub min: f32,
  pub max: f32,
}

impl RayRange {
  pub fn new(min: f32, max: f32) -> Self {
    Self { min, max }
  }

  #[inline(always)]
  pub fn contains(&self, t: f32) -> bool {
    t >= self.min && t <= self.max
  }

  pub fn is_valid(&self) -> bool {
    self.min >= 0. && self.min <= self.max && !self.min.is_nan() && !self.max.is_nan()
  }
}

impl Default for RayRange {
  fn default() -> Self {
    Self::new(0., f32::INFINITY)
  }
}
