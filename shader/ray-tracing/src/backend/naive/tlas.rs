use strata_space_algorithm::bvh::*;

use super::blas::*;
use crate::*;

#[derive(Clone)]
pub(crate) struct NaiveInstance {
  pub object_to_world: Affine3A,
  pub world_to_object: Affine3A,
  pub custom_index: u32,
  pub mask: u8,
  pub hit_group_offset: u32,
  pub flags: GeometryInstanceFlags,
  pub blas: Arc<NaiveBlasData>,
  pub world_bounding: Box3,
}

impl NaiveInstance {
  pub fn new(record: &InstanceRecord, blas: Arc<NaiveBlasData>) -> Self {
    let transform = record.transform();
    let object_to_world = transform.to_affine();
    // a singular transform collapses the instance, it can never be hit
    let (world_to_object, world_bounding) = if transform.is_invertible() {
      (
        object_to_world.inverse(),
        blas.bounding.apply_matrix_into(object_to_world),
      )
    } else {
      (Affine3A::ZERO, Box3::empty())
    };
    Self {
      object_to_world,
      world_to_object,
      custom_index: record.custom_index(),
      mask: record.mask(),
      hit_group_offset: record.hit_group_offset(),
      flags: record.flags(),
      blas,
      world_bounding,
    }
  }
}

/// Device side content of a built top level structure.
///
/// Instances keep their record order, the bvh primitive index is the instance index.
#[derive(Clone)]
pub(crate) struct NaiveTlasData {
  pub instances: Vec<NaiveInstance>,
  pub bvh: FlattenBVH<Box3>,
  pub traverse_next: Vec<(u32, u32)>,
}

impl NaiveTlasData {
  pub fn build(instances: Vec<NaiveInstance>, hint: BuildHint) -> Self {
    let bvh = build_bvh(instances.iter().map(|i| i.world_bounding), hint);
    let traverse_next = compute_bvh_next(&bvh.nodes);
    Self {
      instances,
      bvh,
      traverse_next,
    }
  }

  /// keep the topology, the stackless links stay valid
  pub fn refit(&mut self, instances: Vec<NaiveInstance>) -> AccelerationStructureResult<()> {
    if instances.len() != self.instances.len() {
      return Err(AccelerationStructureError::DeviceLost);
    }
    self.instances = instances;
    self.bvh.refit(|i| self.instances[i].world_bounding);
    Ok(())
  }
}
