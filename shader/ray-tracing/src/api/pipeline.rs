use glam::UVec3;

use crate::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RayTracingShaderStage {
  RayGeneration,
  ClosestHit,
  AnyHit,
  Miss,
}

/// Index of a program registered in a pipeline builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle {
  pub stage: RayTracingShaderStage,
  pub index: u32,
}

pub type RayGenProgram<P, O> = Arc<dyn Fn(&RayContext<P>) -> O + Send + Sync>;
pub type ClosestHitProgram<P> = Arc<dyn Fn(&RayContext<P>, &HitInfo, &mut P) + Send + Sync>;
pub type AnyHitProgram<P> = Arc<dyn Fn(&RayContext<P>, &HitInfo, &mut P) -> AnyHitBehavior + Send + Sync>;
pub type MissProgram<P> = Arc<dyn Fn(&RayContext<P>, &TraceRayCall, &mut P) + Send + Sync>;

/// Programs reachable from a trace ray call, shared by every invocation.
pub struct TracePrograms<P> {
  pub closest_hit: Vec<ClosestHitProgram<P>>,
  pub any_hit: Vec<AnyHitProgram<P>>,
  pub miss: Vec<MissProgram<P>>,
}

impl<P> Default for TracePrograms<P> {
  fn default() -> Self {
    Self {
      closest_hit: Vec::new(),
      any_hit: Vec::new(),
      miss: Vec::new(),
    }
  }
}

/// Collects the programs of a pipeline, `P` is the ray payload and `O` is the per invocation output.
pub struct RayTracingPipelineBuilder<P, O> {
  ray_generation: Vec<RayGenProgram<P, O>>,
  programs: TracePrograms<P>,
}

impl<P, O> Default for RayTracingPipelineBuilder<P, O> {
  fn default() -> Self {
    Self {
      ray_generation: Vec::new(),
      programs: Default::default(),
    }
  }
}

fn handle(stage: RayTracingShaderStage, index: usize) -> ShaderHandle {
  ShaderHandle {
    stage,
    index: index as u32,
  }
}

impl<P, O> RayTracingPipelineBuilder<P, O> {
  pub fn register_ray_gen(
    &mut self,
    program: impl Fn(&RayContext<P>) -> O + Send + Sync + 'static,
  ) -> ShaderHandle {
    self.ray_generation.push(Arc::new(program));
    handle(RayTracingShaderStage::RayGeneration, self.ray_generation.len() - 1)
  }

  pub fn register_ray_closest_hit(
    &mut self,
    program: impl Fn(&RayContext<P>, &HitInfo, &mut P) + Send + Sync + 'static,
  ) -> ShaderHandle {
    self.programs.closest_hit.push(Arc::new(program));
    handle(RayTracingShaderStage::ClosestHit, self.programs.closest_hit.len() - 1)
  }

  pub fn register_ray_any_hit(
    &mut self,
    program: impl Fn(&RayContext<P>, &HitInfo, &mut P) -> AnyHitBehavior + Send + Sync + 'static,
  ) -> ShaderHandle {
    self.programs.any_hit.push(Arc::new(program));
    handle(RayTracingShaderStage::AnyHit, self.programs.any_hit.len() - 1)
  }

  pub fn register_ray_miss(
    &mut self,
    program: impl Fn(&RayContext<P>, &TraceRayCall, &mut P) + Send + Sync + 'static,
  ) -> ShaderHandle {
    self.programs.miss.push(Arc::new(program));
    handle(RayTracingShaderStage::Miss, self.programs.miss.len() - 1)
  }
}

pub struct RayTracingPipeline<P, O> {
  pub(crate) ray_generation: Vec<RayGenProgram<P, O>>,
  pub(crate) programs: Arc<TracePrograms<P>>,
  pub(crate) max_recursion_depth: u32,
}

impl<P, O> RayTracingPipeline<P, O> {
  /// the device limit is checked when the pipeline is created through an accelerator
  pub fn new(builder: RayTracingPipelineBuilder<P, O>, max_recursion_depth: u32) -> Self {
    Self {
      ray_generation: builder.ray_generation,
      programs: Arc::new(builder.programs),
      max_recursion_depth,
    }
  }

  pub fn max_recursion_depth(&self) -> u32 {
    self.max_recursion_depth
  }

  pub fn program_count(&self, stage: RayTracingShaderStage) -> u32 {
    let count = match stage {
      RayTracingShaderStage::RayGeneration => self.ray_generation.len(),
      RayTracingShaderStage::ClosestHit => self.programs.closest_hit.len(),
      RayTracingShaderStage::AnyHit => self.programs.any_hit.len(),
      RayTracingShaderStage::Miss => self.programs.miss.len(),
    };
    count as u32
  }
}

/// `id` flattened in x, y, z order
pub fn flatten_launch_index(id: UVec3, size: UVec3) -> usize {
  let (w, h) = (size.x as usize, size.y as usize);
  id.x as usize + id.y as usize * w + id.z as usize * w * h
}

/// inverse of [`flatten_launch_index`], `index` must be inside the launch
pub fn launch_id_of(index: usize, size: UVec3) -> UVec3 {
  let (w, h) = (size.x as usize, size.y as usize);
  UVec3::new(
    (index % w) as u32,
    (index / w % h) as u32,
    (index / (w * h)) as u32,
  )
}

/// Execution context of one program invocation.
///
/// `depth` counts the trace ray calls on the current invocation stack, the ray generation program
/// runs at depth zero. A trace ray call at `max_recursion_depth` is rejected.
pub struct RayContext<'a, P> {
  pub launch_id: UVec3,
  pub launch_size: UVec3,
  pub depth: u32,
  pub(crate) max_recursion_depth: u32,
  pub(crate) scene: &'a dyn SceneIntersector,
  pub(crate) programs: &'a TracePrograms<P>,
  pub(crate) sbt: &'a ShaderBindingTable,
}

impl<'a, P> RayContext<'a, P> {
  fn nested(&self) -> Self {
    Self {
      launch_id: self.launch_id,
      launch_size: self.launch_size,
      depth: self.depth + 1,
      max_recursion_depth: self.max_recursion_depth,
      scene: self.scene,
      programs: self.programs,
      sbt: self.sbt,
    }
  }

  /// launch index flattened in x, y, z order
  pub fn launch_index(&self) -> usize {
    flatten_launch_index(self.launch_id, self.launch_size)
  }

  pub fn trace_ray(&self, call: &TraceRayCall, payload: &mut P) -> TraceStatus {
    if self.depth >= self.max_recursion_depth {
      log::trace!(
        "trace ray at depth {} rejected, max recursion depth is {}",
        self.depth,
        self.max_recursion_depth
      );
      return TraceStatus::RecursionLimit;
    }

    let nested = self.nested();
    let hit = if call.ray.is_valid() && call.range.is_valid() {
      let mut any_hit = |candidate: &HitInfo| {
        let record = self.sbt.hit_group(compute_sbt_hit_group(call, candidate));
        match record.and_then(|r| r.any_hit) {
          Some(program) => (self.programs.any_hit[program.index as usize])(&nested, candidate, &mut *payload),
          None => AnyHitBehavior::Accept,
        }
      };
      self.scene.intersect(call, &mut any_hit)
    } else {
      None
    };

    match hit {
      Some(hit) => {
        if !call.flags.contains(RayFlags::SKIP_CLOSEST_HIT_SHADER) {
          let record = self.sbt.hit_group(compute_sbt_hit_group(call, &hit));
          if let Some(program) = record.and_then(|r| r.closest_hit) {
            (self.programs.closest_hit[program.index as usize])(&nested, &hit, payload);
          }
        }
        TraceStatus::Hit
      }
      None => {
        if let Some(program) = self.sbt.miss(call.miss_index) {
          (self.programs.miss[program.index as usize])(&nested, call, payload);
        }
        TraceStatus::Miss
      }
    }
  }
}
