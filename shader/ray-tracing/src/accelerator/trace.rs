use glam::UVec3;
use rayon::prelude::*;

use crate::*;

/// Per invocation outputs of a dispatch in launch index order.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceOutput<O> {
  pub size: (u32, u32, u32),
  pub data: Vec<O>,
}

impl<O> TraceOutput<O> {
  pub fn get(&self, x: u32, y: u32, z: u32) -> Option<&O> {
    let (w, h, d) = self.size;
    if x >= w || y >= h || z >= d {
      return None;
    }
    self.data.get(flatten_launch_index(UVec3::new(x, y, z), UVec3::new(w, h, d)))
  }

  pub fn into_vec(self) -> Vec<O> {
    self.data
  }
}

/// A submitted dispatch, the traced structure stays borrowed until it completed.
pub struct PendingTrace<'a, O> {
  accelerator: &'a TwoLevelAccelerator,
  _tlas: &'a Tlas,
  fence: Fence,
  size: (u32, u32, u32),
  receiver: flume::Receiver<Vec<O>>,
}

impl<O> PendingTrace<'_, O> {
  pub fn is_complete(&self) -> bool {
    self.fence.is_complete()
  }

  pub fn wait(self) -> AccelerationStructureResult<TraceOutput<O>> {
    self.accelerator.wait_fence(&self.fence)?;
    let data = self
      .receiver
      .try_recv()
      .map_err(|_| AccelerationStructureError::DeviceLost)?;
    Ok(TraceOutput {
      size: self.size,
      data,
    })
  }
}

impl<O> Drop for PendingTrace<'_, O> {
  fn drop(&mut self) {
    let _ = self.fence.wait();
  }
}

impl TwoLevelAccelerator {
  pub fn trace_rays<P, O>(
    &self,
    tlas: &Tlas,
    pipeline: &RayTracingPipeline<P, O>,
    sbt: &ShaderBindingTable,
    size: (u32, u32, u32),
  ) -> AccelerationStructureResult<TraceOutput<O>>
  where
    P: 'static,
    O: Send + 'static,
  {
    self.dispatch_trace_rays(tlas, pipeline, sbt, size)?.wait()
  }

  /// Dispatch `width * height * depth` independent ray generation invocations.
  ///
  /// Invocations run in parallel without any ordering, the output is collected in launch index order.
  pub fn dispatch_trace_rays<'a, P, O>(
    &'a self,
    tlas: &'a Tlas,
    pipeline: &RayTracingPipeline<P, O>,
    sbt: &ShaderBindingTable,
    size: (u32, u32, u32),
  ) -> AccelerationStructureResult<PendingTrace<'a, O>>
  where
    P: 'static,
    O: Send + 'static,
  {
    self.check_device()?;
    if !tlas.structure().is_owned_by(&self.device) {
      return Err(AccelerationStructureError::InvalidReference(
        "top level structure belongs to another device".to_string(),
      ));
    }
    if tlas.structure().address() == 0 {
      return Err(AccelerationStructureError::InvalidReference(
        "top level structure is not built".to_string(),
      ));
    }
    sbt.validate(pipeline)?;
    let ray_gen = sbt
      .ray_generation
      .map(|h| pipeline.ray_generation[h.index as usize].clone())
      .ok_or_else(|| {
        AccelerationStructureError::PipelineMismatch("no ray generation record".to_string())
      })?;

    let programs = pipeline.programs.clone();
    let sbt = sbt.clone();
    let max_recursion_depth = pipeline.max_recursion_depth;
    let (sender, receiver) = flume::bounded(1);

    let job: TraceJob = Box::new(move |scene: &dyn SceneIntersector| {
      let (w, h, d) = size;
      let launch_size = UVec3::new(w, h, d);
      let count = w as usize * h as usize * d as usize;
      let (programs, sbt) = (&*programs, &sbt);
      let output: Vec<O> = (0..count)
        .into_par_iter()
        .map(|i| {
          let ctx = RayContext {
            launch_id: launch_id_of(i, launch_size),
            launch_size,
            depth: 0,
            max_recursion_depth,
            scene,
            programs,
            sbt,
          };
          ray_gen(&ctx)
        })
        .collect();
      let _ = sender.send(output);
    });

    let mut commands = CommandSequence::default();
    commands.push(Command::TraceRays {
      tlas: tlas.structure().id(),
      job,
    });
    let fence = self.device.submit(commands)?;
    log::debug!("trace rays dispatched, size {size:?}");

    Ok(PendingTrace {
      accelerator: self,
      _tlas: tlas,
      fence,
      size,
      receiver,
    })
  }
}
