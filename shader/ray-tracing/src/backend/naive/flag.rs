use crate::*;

bitflags::bitflags! {
  /// ray flags combined with instance flags during traversal
  #[derive(Debug, Clone, Copy, PartialEq, Eq)]
  pub(crate) struct TraverseFlags: u32 {
    // first bits are identical to ray flag
    const FORCE_OPAQUE = 0x01;
    const FORCE_NON_OPAQUE = 0x02;
    const ACCEPT_FIRST_HIT_AND_END_SEARCH = 0x04;
    const SKIP_CLOSEST_HIT_SHADER = 0x08;
    const CULL_BACK_FACING_TRIANGLES = 0x10;
    const CULL_FRONT_FACING_TRIANGLES = 0x20;
    const CULL_OPAQUE = 0x40;
    const CULL_NON_OPAQUE = 0x80;
    const SKIP_TRIANGLES = 0x100;

    const TRIANGLE_FLIP_FACING = 0x400;
  }
}

impl TraverseFlags {
  pub fn from_ray_flags(ray_flags: RayFlags) -> Self {
    Self::from_bits_truncate(ray_flags.bits())
  }

  /// opacity forced by the ray takes precedence over the instance
  pub fn merge_geometry_instance_flags(mut self, instance: GeometryInstanceFlags) -> Self {
    if instance.contains(GeometryInstanceFlags::TRIANGLE_FACING_CULL_DISABLE) {
      self.remove(Self::CULL_BACK_FACING_TRIANGLES | Self::CULL_FRONT_FACING_TRIANGLES);
    }
    if instance.contains(GeometryInstanceFlags::TRIANGLE_FLIP_FACING) {
      self.toggle(Self::TRIANGLE_FLIP_FACING);
    }
    if !self.intersects(Self::FORCE_OPAQUE | Self::FORCE_NON_OPAQUE) {
      if instance.contains(GeometryInstanceFlags::FORCE_OPAQUE) {
        self.insert(Self::FORCE_OPAQUE);
      } else if instance.contains(GeometryInstanceFlags::FORCE_NO_OPAQUE) {
        self.insert(Self::FORCE_NON_OPAQUE);
      }
    }
    self
  }

  /// returns Pass(true)/Fail(false), Opaque(true)/Non-opaque(false)
  pub fn cull_geometry(self, geometry_flags: GeometryFlags) -> (bool, bool) {
    let is_opaque = if self.contains(Self::FORCE_OPAQUE) {
      true
    } else if self.contains(Self::FORCE_NON_OPAQUE) {
      false
    } else {
      geometry_flags.contains(GeometryFlags::OPAQUE)
    };
    let culled = (is_opaque && self.contains(Self::CULL_OPAQUE))
      || (!is_opaque && self.contains(Self::CULL_NON_OPAQUE));
    (!culled, is_opaque)
  }

  pub fn is_front_face(self, is_ccw_in_local: bool) -> bool {
    is_ccw_in_local ^ self.contains(Self::TRIANGLE_FLIP_FACING)
  }

  /// returns Pass(true)/Fail(false)
  pub fn cull_triangle(self, is_ccw_in_local: bool) -> bool {
    let is_front = self.is_front_face(is_ccw_in_local);
    (is_front && !self.contains(Self::CULL_FRONT_FACING_TRIANGLES))
      || (!is_front && !self.contains(Self::CULL_BACK_FACING_TRIANGLES))
  }

  pub fn end_search_on_hit(self) -> bool {
    self.contains(Self::ACCEPT_FIRST_HIT_AND_END_SEARCH)
  }
}
