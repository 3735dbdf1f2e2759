mod bounding_impl;
mod box3;
mod intersection;
mod ray3;
mod triangle;


pub use box3::*;
pub use intersection::*;
pub use ray3::*;
pub use triangle::*;

use crate::*;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Axis3 {
  X,
  Y,
  Z,
}

impl Axis3 {
  #[inline(always)]
  pub fn component(self, v: Vec3) -> f32 {
    match self {
      Axis3::X => v.x,
      Axis3::Y => v.y,
      Axis3::Z => v.z,
    }
  }
}
