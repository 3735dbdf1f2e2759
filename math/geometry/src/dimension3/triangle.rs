use crate::*;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Triangle {
  pub a: Vec3,
  pub b: Vec3,
  pub c: Vec3,
}

impl Triangle {
  pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
    Self { a, b, c }
  }

  pub fn points(&self) -> [Vec3; 3] {
    [self.a, self.b, self.c]
  }

  /// counter clockwise winding normal, not normalized
  #[inline(always)]
  pub fn face_normal_unnormalized(&self) -> Vec3 {
    (self.b - self.a).cross(self.c - self.a)
  }

  pub fn is_degenerated(&self) -> bool {
    self.face_normal_unnormalized().length_squared() == 0.
  }

  pub fn is_finite(&self) -> bool {
    self.a.is_finite() && self.b.is_finite() && self.c.is_finite()
  }

  /// return None when triangle is degenerated to a line or point
  pub fn barycentric(&self, p: Vec3) -> Option<Vec3> {
    let v0 = self.b - self.a;
    let v1 = self.c - self.a;
    let v2 = p - self.a;

    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);

    let denom = d00 * d11 - d01 * d01;
    if denom == 0. {
      return None;
    }

    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    let u = 1. - v - w;
    Some(Vec3::new(u, v, w))
  }
}
