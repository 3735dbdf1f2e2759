use strata_geometry::{Axis3, Box3, Vec3};

use super::*;

impl BVHBounding for Box3 {
  type AxisType = Axis3;

  #[inline(always)]
  fn partition_axis(&self) -> Axis3 {
    self.longest_axis().0
  }

  #[inline(always)]
  fn centroid(&self) -> Vec3 {
    self.center()
  }

  #[inline(always)]
  fn axis_value(point: Vec3, axis: Axis3) -> f32 {
    axis.component(point)
  }
}

impl SAHBounding for Box3 {
  #[inline(always)]
  fn surface_heuristic(&self) -> f32 {
    self.half_surface_area()
  }

  fn empty() -> Self {
    Box3::empty()
  }

  fn merge(&mut self, other: Self) {
    self.union(other)
  }
}
