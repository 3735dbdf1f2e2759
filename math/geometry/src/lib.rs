mod dimension3;

pub use dimension3::*;
pub use glam::{Affine3A, Mat3, Mat4, Vec2, Vec3, Vec3A, Vec4};

/// Anything that can be bounded by an axis aligned box.
pub trait SpaceBounding<B> {
  fn to_bounding(&self) -> B;
}
