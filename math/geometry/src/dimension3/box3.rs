use std::iter::FromIterator;

use serde::{Deserialize, Serialize};

use crate::*;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Box3 {
  pub min: Vec3,
  pub max: Vec3,
}

impl Default for Box3 {
  fn default() -> Self {
    Self::empty()
  }
}

impl Box3 {
  pub fn new3(min: Vec3, max: Vec3) -> Self {
    Self { min, max }
  }

  /// the union identity, anything unioned with it is itself.
  pub fn empty() -> Self {
    Self {
      min: Vec3::splat(f32::INFINITY),
      max: Vec3::splat(f32::NEG_INFINITY),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.max.x < self.min.x || self.max.y < self.min.y || self.max.z < self.min.z
  }

  pub fn center(&self) -> Vec3 {
    (self.min + self.max) * 0.5
  }

  pub fn size(&self) -> Vec3 {
    self.max - self.min
  }

  pub fn union(&mut self, other: Self) {
    self.min = self.min.min(other.min);
    self.max = self.max.max(other.max);
  }

  pub fn union_into(&self, other: Self) -> Self {
    let mut r = *self;
    r.union(other);
    r
  }

  pub fn expand_by_point(&mut self, point: Vec3) {
    self.min = self.min.min(point);
    self.max = self.max.max(point);
  }

  /// grow each flat extent to at least `thickness`, a zero volume box
  /// is still hit by rays but is easy to lose through float rounding after transforms.
  pub fn padded_to(&self, thickness: f32) -> Self {
    if self.is_empty() {
      return *self;
    }
    let size = self.size();
    let pad = Vec3::select(size.cmplt(Vec3::splat(thickness)), Vec3::splat(thickness * 0.5), Vec3::ZERO);
    Self::new3(self.min - pad, self.max + pad)
  }

  pub fn longest_axis(&self) -> (Axis3, f32) {
    let size = self.size();
    if size.x >= size.y && size.x >= size.z {
      (Axis3::X, size.x)
    } else if size.y >= size.z {
      (Axis3::Y, size.y)
    } else {
      (Axis3::Z, size.z)
    }
  }

  /// half of the surface area, which is enough to compare costs in sah.
  pub fn half_surface_area(&self) -> f32 {
    if self.is_empty() {
      return 0.;
    }
    let d = self.size();
    d.x * d.y + d.y * d.z + d.z * d.x
  }

  pub fn contains_point(&self, point: Vec3) -> bool {
    point.cmpge(self.min).all() && point.cmple(self.max).all()
  }

  pub fn contains_box(&self, other: &Self) -> bool {
    other.is_empty() || (self.contains_point(other.min) && self.contains_point(other.max))
  }

  pub fn corners(&self) -> [Vec3; 8] {
    let (min, max) = (self.min, self.max);
    [
      Vec3::new(min.x, min.y, min.z),
      Vec3::new(min.x, min.y, max.z),
      Vec3::new(min.x, max.y, min.z),
      Vec3::new(min.x, max.y, max.z),
      Vec3::new(max.x, min.y, min.z),
      Vec3::new(max.x, min.y, max.z),
      Vec3::new(max.x, max.y, min.z),
      Vec3::new(max.x, max.y, max.z),
    ]
  }

  pub fn apply_matrix_into(&self, mat: Affine3A) -> Self {
    if self.is_empty() {
      return *self;
    }
    self
      .corners()
      .into_iter()
      .map(|p| mat.transform_point3(p))
      .collect()
  }
}

impl FromIterator<Vec3> for Box3 {
  fn from_iter<I: IntoIterator<Item = Vec3>>(items: I) -> Self {
    let mut bbox = Self::empty();
    items.into_iter().for_each(|p| bbox.expand_by_point(p));
    bbox
  }
}

impl FromIterator<Box3> for Box3 {
  fn from_iter<I: IntoIterator<Item = Box3>>(items: I) -> Self {
    let mut bbox = Self::empty();
    items.into_iter().for_each(|p| bbox.union(p));
    bbox
  }
}

impl<'a> FromIterator<&'a Box3> for Box3 {
  fn from_iter<I: IntoIterator<Item = &'a Box3>>(items: I) -> Self {
    items.into_iter().copied().collect()
  }
}
