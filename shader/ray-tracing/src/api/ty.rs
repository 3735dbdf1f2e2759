use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::*;

bitflags::bitflags! {
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
  pub struct GeometryFlags: u32 {
    const OPAQUE = 0x1;
    const NO_DUPLICATE_ANY_HIT_INVOCATION = 0x2;
  }
}

bitflags::bitflags! {
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
  pub struct GeometryInstanceFlags: u8 {
    const TRIANGLE_FACING_CULL_DISABLE = 0x1;
    const TRIANGLE_FLIP_FACING = 0x2;
    const FORCE_OPAQUE = 0x4;
    const FORCE_NO_OPAQUE = 0x8;
  }
}

bitflags::bitflags! {
  /// https://registry.khronos.org/vulkan/specs/latest/man/html/RayFlagsKHR.html
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
  pub struct RayFlags: u32 {
    const FORCE_OPAQUE = 0x01;
    const FORCE_NON_OPAQUE = 0x02;
    const ACCEPT_FIRST_HIT_AND_END_SEARCH = 0x04;
    const SKIP_CLOSEST_HIT_SHADER = 0x08;
    const CULL_BACK_FACING_TRIANGLES = 0x10;
    const CULL_FRONT_FACING_TRIANGLES = 0x20;
    const CULL_OPAQUE = 0x40;
    const CULL_NON_OPAQUE = 0x80;
    const SKIP_TRIANGLES = 0x100;
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BuildHint {
  /// slower build, better partition quality
  #[default]
  FastTrace,
  FastBuild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildMode {
  Build,
  /// refit the existing tree, only valid for structures built with update allowed
  Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TopLevelBuildOptions {
  pub hint: BuildHint,
  pub allow_update: bool,
}

/// The device visible reference of a built bottom level structure, never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlasHandle(NonZeroU64);

impl BlasHandle {
  pub fn new(raw: u64) -> Option<Self> {
    NonZeroU64::new(raw).map(Self)
  }

  pub fn raw(self) -> u64 {
    self.0.get()
  }
}

/// row major 3x4 affine transform, the last column is the translation.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Transform3x4(pub [f32; 12]);

impl Transform3x4 {
  pub const IDENTITY: Self = Self([
    1., 0., 0., 0., //
    0., 1., 0., 0., //
    0., 0., 1., 0., //
  ]);

  pub fn from_translation(translation: Vec3) -> Self {
    Self::from_affine(Affine3A::from_translation(translation))
  }

  pub fn from_affine(affine: Affine3A) -> Self {
    let m = affine.matrix3;
    let t = affine.translation;
    Self([
      m.x_axis.x, m.y_axis.x, m.z_axis.x, t.x, //
      m.x_axis.y, m.y_axis.y, m.z_axis.y, t.y, //
      m.x_axis.z, m.y_axis.z, m.z_axis.z, t.z, //
    ])
  }

  pub fn to_affine(&self) -> Affine3A {
    let m = &self.0;
    Affine3A::from_cols(
      Vec3A::new(m[0], m[4], m[8]),
      Vec3A::new(m[1], m[5], m[9]),
      Vec3A::new(m[2], m[6], m[10]),
      Vec3A::new(m[3], m[7], m[11]),
    )
  }

  pub fn is_invertible(&self) -> bool {
    let det = self.to_affine().matrix3.determinant();
    det != 0. && det.is_finite()
  }
}

impl Default for Transform3x4 {
  fn default() -> Self {
    Self::IDENTITY
  }
}

/// Triangle mesh input of a bottom level build.
///
/// The buffers are shared read only, other consumers such as a rasterizer may keep them
/// for the lifetime of the structure. Without an index buffer every three consecutive
/// positions form a triangle.
#[derive(Debug, Clone)]
pub struct MeshGeometry {
  pub positions: Arc<[Vec3]>,
  pub indices: Option<Arc<[u32]>>,
  pub flags: GeometryFlags,
}

impl MeshGeometry {
  pub fn new(positions: impl Into<Arc<[Vec3]>>) -> Self {
    Self {
      positions: positions.into(),
      indices: None,
      flags: GeometryFlags::OPAQUE,
    }
  }

  pub fn with_indices(mut self, indices: impl Into<Arc<[u32]>>) -> Self {
    self.indices = Some(indices.into());
    self
  }

  pub fn with_flags(mut self, flags: GeometryFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn index_count(&self) -> usize {
    match &self.indices {
      Some(indices) => indices.len(),
      None => self.positions.len(),
    }
  }

  pub fn triangle_count(&self) -> usize {
    self.index_count() / 3
  }

  #[inline]
  fn vertex_index(&self, i: usize) -> usize {
    match &self.indices {
      Some(indices) => indices[i] as usize,
      None => i,
    }
  }

  /// the caller should validate the index buffer first
  pub fn triangle(&self, primitive: usize) -> Triangle {
    let v = |i| self.positions[self.vertex_index(primitive * 3 + i)];
    Triangle::new(v(0), v(1), v(2))
  }

  pub(crate) fn validate(&self) -> AccelerationStructureResult<()> {
    if self.index_count() % 3 != 0 {
      return Err(AccelerationStructureError::UnsupportedGeometry(format!(
        "index count {} is not a multiple of 3",
        self.index_count()
      )));
    }
    if let Some(indices) = &self.indices {
      let vertex_count = self.positions.len();
      if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(AccelerationStructureError::UnsupportedGeometry(format!(
          "index {bad} addresses outside of {vertex_count} vertices"
        )));
      }
    }
    Ok(())
  }
}

pub const INSTANCE_INDEX_MAX: u32 = (1 << 24) - 1;

/// Host side description of an instance, serialized into an [`InstanceRecord`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstancePlacement {
  pub blas: BlasHandle,
  pub transform: Transform3x4,
  /// user value reported to hit programs, 24 bits
  pub custom_index: u32,
  /// combined with the ray cull mask by bitwise and, the instance is visible if non zero
  pub mask: u8,
  /// offset into the hit group records of the shader binding table, 24 bits
  pub hit_group_offset: u32,
  pub flags: GeometryInstanceFlags,
}

impl InstancePlacement {
  pub fn new(blas: BlasHandle, transform: Transform3x4) -> Self {
    Self {
      blas,
      transform,
      custom_index: 0,
      mask: 0xFF,
      hit_group_offset: 0,
      flags: GeometryInstanceFlags::empty(),
    }
  }
}

/// https://registry.khronos.org/vulkan/specs/latest/man/html/VkAccelerationStructureInstanceKHR.html
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceRecord {
  pub transform: [f32; 12],
  /// custom index in the low 24 bits, mask in the high 8 bits
  pub custom_index_and_mask: u32,
  /// hit group offset in the low 24 bits, flags in the high 8 bits
  pub hit_group_offset_and_flags: u32,
  pub blas_reference: u64,
}

impl InstanceRecord {
  pub fn from_placement(placement: &InstancePlacement) -> AccelerationStructureResult<Self> {
    if placement.custom_index > INSTANCE_INDEX_MAX {
      return Err(AccelerationStructureError::InvalidInstance(format!(
        "custom index {} does not fit in 24 bits",
        placement.custom_index
      )));
    }
    if placement.hit_group_offset > INSTANCE_INDEX_MAX {
      return Err(AccelerationStructureError::InvalidInstance(format!(
        "hit group offset {} does not fit in 24 bits",
        placement.hit_group_offset
      )));
    }
    Ok(Self {
      transform: placement.transform.0,
      custom_index_and_mask: placement.custom_index | (placement.mask as u32) << 24,
      hit_group_offset_and_flags: placement.hit_group_offset
        | (placement.flags.bits() as u32) << 24,
      blas_reference: placement.blas.raw(),
    })
  }

  pub fn custom_index(&self) -> u32 {
    self.custom_index_and_mask & INSTANCE_INDEX_MAX
  }

  pub fn mask(&self) -> u8 {
    (self.custom_index_and_mask >> 24) as u8
  }

  pub fn hit_group_offset(&self) -> u32 {
    self.hit_group_offset_and_flags & INSTANCE_INDEX_MAX
  }

  pub fn flags(&self) -> GeometryInstanceFlags {
    GeometryInstanceFlags::from_bits_truncate((self.hit_group_offset_and_flags >> 24) as u8)
  }

  pub fn transform(&self) -> Transform3x4 {
    Transform3x4(self.transform)
  }
}

/// Parameters of one trace ray call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceRayCall {
  pub flags: RayFlags,
  pub cull_mask: u8,
  /// the ray type, added to the hit group index
  pub sbt_offset: u32,
  /// the ray type count, multiplied with the geometry index
  pub sbt_stride: u32,
  pub miss_index: u32,
  pub ray: Ray3,
  pub range: RayRange,
}

impl TraceRayCall {
  pub fn new(ray: Ray3, range: RayRange) -> Self {
    Self {
      flags: RayFlags::empty(),
      cull_mask: 0xFF,
      sbt_offset: 0,
      sbt_stride: 1,
      miss_index: 0,
      ray,
      range,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceStatus {
  Hit,
  Miss,
  /// the call exceeded the pipeline max recursion depth and was not traced
  RecursionLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnyHitBehavior {
  Accept,
  AcceptAndEndSearch,
  Ignore,
}

/// A committed or candidate intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitInfo {
  /// position of the instance in the assembled instance list
  pub instance_index: u32,
  pub instance_custom_index: u32,
  pub instance_hit_group_offset: u32,
  /// position of the geometry in its bottom level structure
  pub geometry_index: u32,
  pub primitive_index: u32,
  /// parametric distance along the world ray
  pub distance: f32,
  /// barycentric weight of the second and third vertex
  pub barycentric: Vec2,
  pub front_face: bool,
  pub world_ray: Ray3,
  pub object_to_world: Affine3A,
  pub world_to_object: Affine3A,
}

impl HitInfo {
  pub fn world_position(&self) -> Vec3 {
    self.world_ray.at(self.distance)
  }

  pub fn object_ray(&self) -> Ray3 {
    self.world_ray.apply_matrix_into(self.world_to_object)
  }
}
