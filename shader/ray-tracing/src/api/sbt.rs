use crate::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HitGroupShaderRecord {
  pub closest_hit: Option<ShaderHandle>,
  pub any_hit: Option<ShaderHandle>,
}

/// Selects which pipeline program runs for each ray generation, miss and hit group slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderBindingTable {
  pub ray_generation: Option<ShaderHandle>,
  pub ray_miss: Vec<Option<ShaderHandle>>,
  pub ray_hit: Vec<Option<HitGroupShaderRecord>>,
}

impl ShaderBindingTable {
  /// preallocate hit group slots for `geometry_count` geometries and `ray_type_count` ray types
  pub fn new(geometry_count: u32, ray_type_count: u32) -> Self {
    Self {
      ray_generation: None,
      ray_miss: vec![None; ray_type_count as usize],
      ray_hit: vec![None; (geometry_count * ray_type_count) as usize],
    }
  }

  pub fn config_ray_generation(&mut self, s: ShaderHandle) -> &mut Self {
    self.ray_generation = Some(s);
    self
  }

  pub fn config_missing(&mut self, miss_index: u32, s: ShaderHandle) -> &mut Self {
    let idx = miss_index as usize;
    if self.ray_miss.len() <= idx {
      self.ray_miss.resize(idx + 1, None);
    }
    self.ray_miss[idx] = Some(s);
    self
  }

  pub fn config_hit_group(&mut self, hit_group_index: u32, record: HitGroupShaderRecord) -> &mut Self {
    let idx = hit_group_index as usize;
    if self.ray_hit.len() <= idx {
      self.ray_hit.resize(idx + 1, None);
    }
    self.ray_hit[idx] = Some(record);
    self
  }

  pub fn hit_group(&self, hit_group_index: u32) -> Option<&HitGroupShaderRecord> {
    self.ray_hit.get(hit_group_index as usize)?.as_ref()
  }

  pub fn miss(&self, miss_index: u32) -> Option<ShaderHandle> {
    *self.ray_miss.get(miss_index as usize)?
  }

  /// every referenced program must exist in the pipeline with the stage of its slot
  pub fn validate<P, O>(&self, pipeline: &RayTracingPipeline<P, O>) -> AccelerationStructureResult<()> {
    let check = |handle: ShaderHandle, stage: RayTracingShaderStage| {
      if handle.stage != stage {
        return Err(AccelerationStructureError::PipelineMismatch(format!(
          "{:?} program bound to a {:?} slot",
          handle.stage, stage
        )));
      }
      if handle.index >= pipeline.program_count(stage) {
        return Err(AccelerationStructureError::PipelineMismatch(format!(
          "{:?} program {} does not exist in the pipeline",
          stage, handle.index
        )));
      }
      Ok(())
    };

    let ray_gen = self.ray_generation.ok_or_else(|| {
      AccelerationStructureError::PipelineMismatch("no ray generation record".to_string())
    })?;
    check(ray_gen, RayTracingShaderStage::RayGeneration)?;

    for miss in self.ray_miss.iter().flatten() {
      check(*miss, RayTracingShaderStage::Miss)?;
    }
    for group in self.ray_hit.iter().flatten() {
      if let Some(closest_hit) = group.closest_hit {
        check(closest_hit, RayTracingShaderStage::ClosestHit)?;
      }
      if let Some(any_hit) = group.any_hit {
        check(any_hit, RayTracingShaderStage::AnyHit)?;
      }
    }
    Ok(())
  }
}

/// The shader record to call is determined by parameters set on the instance, trace ray call, and
/// the order of geometries in the bottom level structure.
pub fn compute_sbt_hit_group(call: &TraceRayCall, hit: &HitInfo) -> u32 {
  call
    .sbt_offset
    .wrapping_add(call.sbt_stride.wrapping_mul(hit.geometry_index))
    .wrapping_add(hit.instance_hit_group_offset)
}
