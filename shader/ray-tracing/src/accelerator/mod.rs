mod blas;
mod config;
mod instance;
mod resource;
mod tlas;
mod trace;

pub use blas::*;
pub use config::*;
pub use instance::*;
use parking_lot::Mutex;
pub use resource::*;
pub use tlas::*;
pub use trace::*;

use crate::*;

/// Builds two level acceleration structures on a device and dispatches ray queries against them.
///
/// All state lives in this context, there is no process wide device.
pub struct TwoLevelAccelerator {
  device: Arc<dyn AccelerationStructureDevice>,
  config: AcceleratorConfig,
  /// scratch buffers whose owning build completion has been observed
  scratch_pool: Mutex<Vec<DeviceBuffer>>,
}

impl TwoLevelAccelerator {
  pub fn new(device: Arc<dyn AccelerationStructureDevice>, config: AcceleratorConfig) -> Self {
    Self {
      device,
      config,
      scratch_pool: Default::default(),
    }
  }

  pub fn device(&self) -> &Arc<dyn AccelerationStructureDevice> {
    &self.device
  }

  pub fn config(&self) -> &AcceleratorConfig {
    &self.config
  }

  pub fn capabilities(&self) -> &DeviceCapabilities {
    self.device.capabilities()
  }

  fn check_device(&self) -> AccelerationStructureResult<()> {
    if self.device.is_lost() {
      Err(AccelerationStructureError::DeviceLost)
    } else {
      Ok(())
    }
  }

  fn query_build_sizes(&self, query: &BuildSizeQuery) -> AccelerationStructureResult<BuildSizes> {
    let sizes = match self.capabilities().size_query_mode {
      SizeQueryMode::Combined => self.device.get_build_sizes(query)?,
      SizeQueryMode::Separate => {
        let get = |kind| self.device.get_memory_requirement(query, kind);
        BuildSizes {
          structure_size: get(MemoryRequirementKind::Structure)?,
          build_scratch_size: get(MemoryRequirementKind::BuildScratch)?,
          update_scratch_size: get(MemoryRequirementKind::UpdateScratch)?,
        }
      }
    };
    log::debug!("{:?} build sizes {:?}", query.kind, sizes);
    Ok(sizes)
  }

  fn acquire_scratch(&self, size: u64) -> AccelerationStructureResult<DeviceBuffer> {
    {
      let mut pool = self.scratch_pool.lock();
      let best = pool
        .iter()
        .enumerate()
        .filter(|(_, b)| b.size() >= size)
        .min_by_key(|(_, b)| b.size())
        .map(|(i, _)| i);
      if let Some(i) = best {
        return Ok(pool.swap_remove(i));
      }
    }
    self.allocate_buffer(size, BufferUsage::SCRATCH)
  }

  /// Every device allocation of the accelerator goes through here, idle pooled scratch is
  /// released and the allocation retried once when the device runs out of memory.
  fn allocate_buffer(&self, size: u64, usage: BufferUsage) -> AccelerationStructureResult<DeviceBuffer> {
    match DeviceBuffer::allocate(&self.device, size, usage) {
      Err(AccelerationStructureError::OutOfDeviceMemory { .. }) if self.trim_scratch_pool() => {
        log::debug!("out of device memory for {size} bytes {usage:?}, retry after trimming scratch pool");
        DeviceBuffer::allocate(&self.device, size, usage)
      }
      r => r,
    }
  }

  /// a build input buffer filled with `data`
  fn create_init_buffer(&self, data: &[u8]) -> AccelerationStructureResult<DeviceBuffer> {
    let buffer = self.allocate_buffer(data.len() as u64, BufferUsage::BUILD_INPUT)?;
    buffer.write(0, data)?;
    Ok(buffer)
  }

  fn create_structure(
    &self,
    kind: AccelerationStructureKind,
    size: u64,
  ) -> AccelerationStructureResult<AccelerationStructure> {
    let storage = self.allocate_buffer(size, BufferUsage::STRUCTURE_STORAGE)?;
    AccelerationStructure::create(&self.device, kind, storage)
  }

  /// only call once the completion of the build using it has been observed
  fn release_scratch(&self, scratch: DeviceBuffer) {
    if self.config.scratch_reuse && !self.device.is_lost() {
      self.scratch_pool.lock().push(scratch);
    }
  }

  /// free pooled scratch memory, returns if anything was freed
  pub fn trim_scratch_pool(&self) -> bool {
    let mut pool = self.scratch_pool.lock();
    let had_any = !pool.is_empty();
    pool.clear();
    had_any
  }

  pub fn pooled_scratch_count(&self) -> usize {
    self.scratch_pool.lock().len()
  }

  fn wait_fence(&self, fence: &Fence) -> AccelerationStructureResult<()> {
    let result = match self.config.fence_timeout() {
      Some(timeout) => fence.wait_timeout(timeout),
      None => fence.wait(),
    };
    if let Err(AccelerationStructureError::DeviceLost) = result {
      log::warn!("device lost while waiting for a submission");
    }
    result
  }

  pub fn create_pipeline<P, O>(
    &self,
    builder: RayTracingPipelineBuilder<P, O>,
    max_recursion_depth: u32,
  ) -> AccelerationStructureResult<RayTracingPipeline<P, O>> {
    let limit = self.capabilities().limits.max_ray_recursion_depth;
    if max_recursion_depth > limit {
      return Err(AccelerationStructureError::PipelineMismatch(format!(
        "max recursion depth {max_recursion_depth} exceeds the device limit {limit}"
      )));
    }
    Ok(RayTracingPipeline::new(builder, max_recursion_depth))
  }
}
