use crate::*;

/// slab test, `inv_direction` is the component wise reciprocal of ray direction.
#[inline(always)]
pub fn intersect_ray_aabb(origin: Vec3, inv_direction: Vec3, range: RayRange, bbox: &Box3) -> bool {
  let t0 = (bbox.min - origin) * inv_direction;
  let t1 = (bbox.max - origin) * inv_direction;

  // min/max drop NaN produced by 0 * inf when the origin sits on a slab plane
  let t_near_max = t0.min(t1).max_element();
  let t_far_min = t0.max(t1).min_element();

  t_near_max <= t_far_min && range.min <= t_far_min && t_near_max <= range.max
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TriangleIntersection {
  pub distance: f32,
  /// barycentric weight of vertex b and c, the weight of a is 1 - u - v
  pub uv: Vec2,
  /// counter clockwise seen from the ray origin
  pub front_face: bool,
}

impl Triangle {
  /// möller trumbore, the distance is in the ray's parametric unit.
  pub fn intersect_ray(&self, ray: &Ray3, range: RayRange) -> Option<TriangleIntersection> {
    let e1 = self.b - self.a;
    let e2 = self.c - self.a;
    let p = ray.direction.cross(e2);
    let det = e1.dot(p);
    if det == 0. || !det.is_finite() {
      return None;
    }
    let inv_det = 1. / det;

    let s = ray.origin - self.a;
    let u = s.dot(p) * inv_det;
    if !(0. ..=1.).contains(&u) {
      return None;
    }

    let q = s.cross(e1);
    let v = ray.direction.dot(q) * inv_det;
    if v < 0. || u + v > 1. {
      return None;
    }

    let distance = e2.dot(q) * inv_det;
    if !range.contains(distance) {
      return None;
    }

    Some(TriangleIntersection {
      distance,
      uv: Vec2::new(u, v),
      front_face: det > 0.,
    })
  }
}
