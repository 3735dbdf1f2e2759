use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::*;

/// How geometry input reaches the device during a bottom level build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GeometryAddressMode {
  /// the build command carries host data directly
  HostPointer,
  /// geometry is uploaded into device buffers and referenced by device address
  #[default]
  DeviceAddress,
}

/// How a device reports the memory a build requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SizeQueryMode {
  /// one query returns structure, build scratch and update scratch size
  #[default]
  Combined,
  /// each memory kind is queried on its own
  Separate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceLimits {
  pub max_geometry_count: u32,
  pub max_primitive_count: u64,
  pub max_instance_count: u32,
  pub max_ray_recursion_depth: u32,
}

impl Default for DeviceLimits {
  fn default() -> Self {
    Self {
      max_geometry_count: 1 << 24,
      max_primitive_count: 1 << 29,
      max_instance_count: 1 << 24,
      max_ray_recursion_depth: 31,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
  pub limits: DeviceLimits,
  pub address_mode: GeometryAddressMode,
  pub size_query_mode: SizeQueryMode,
  /// a bottom level build over zero primitives yields a valid structure that never hits
  pub allow_empty_bottom_level: bool,
  /// a top level build over zero instances yields a valid structure that never hits
  pub allow_empty_top_level: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccelerationStructureKind {
  BottomLevel,
  TopLevel,
}

/// Input of a build size query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSizeQuery {
  pub kind: AccelerationStructureKind,
  pub hint: BuildHint,
  pub allow_update: bool,
  /// triangle count per geometry for bottom level, a single instance count for top level
  pub primitive_counts: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildSizes {
  pub structure_size: u64,
  pub build_scratch_size: u64,
  pub update_scratch_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryRequirementKind {
  Structure,
  BuildScratch,
  UpdateScratch,
}

bitflags::bitflags! {
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
  pub struct BufferUsage: u32 {
    const STRUCTURE_STORAGE = 0x1;
    const SCRATCH = 0x2;
    /// host visible, read by builds as geometry or instance input
    const BUILD_INPUT = 0x4;
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocationId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAllocation {
  pub id: AllocationId,
  pub size: u64,
  pub usage: BufferUsage,
  pub device_address: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccelerationStructureId(pub u64);

/// Geometry referenced by a bottom level build command.
#[derive(Debug, Clone)]
pub enum BuildGeometryData {
  Host(MeshGeometry),
  DeviceAddress {
    positions: u64,
    vertex_count: u32,
    /// device address and index count
    indices: Option<(u64, u32)>,
    flags: GeometryFlags,
  },
}

pub type TraceJob = Box<dyn FnOnce(&dyn SceneIntersector) + Send>;

pub enum Command {
  BuildBottomLevel {
    target: AccelerationStructureId,
    hint: BuildHint,
    geometries: Vec<BuildGeometryData>,
    scratch: DeviceAllocation,
  },
  BuildTopLevel {
    target: AccelerationStructureId,
    hint: BuildHint,
    mode: BuildMode,
    instances: DeviceAllocation,
    instance_count: u32,
    scratch: DeviceAllocation,
  },
  TraceRays {
    tlas: AccelerationStructureId,
    job: TraceJob,
  },
}

impl Command {
  pub fn scratch(&self) -> Option<DeviceAllocation> {
    match self {
      Command::BuildBottomLevel { scratch, .. } | Command::BuildTopLevel { scratch, .. } => {
        Some(*scratch)
      }
      Command::TraceRays { .. } => None,
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Command::BuildBottomLevel { .. } => "build bottom level",
      Command::BuildTopLevel { .. } => "build top level",
      Command::TraceRays { .. } => "trace rays",
    }
  }
}

/// Commands executed in order on the device timeline as one submission.
#[derive(Default)]
pub struct CommandSequence {
  commands: Vec<Command>,
}

impl CommandSequence {
  pub fn push(&mut self, command: Command) -> &mut Self {
    self.commands.push(command);
    self
  }

  pub fn len(&self) -> usize {
    self.commands.len()
  }

  pub fn is_empty(&self) -> bool {
    self.commands.is_empty()
  }

  pub fn commands(&self) -> &[Command] {
    &self.commands
  }

  pub fn into_commands(self) -> Vec<Command> {
    self.commands
  }
}

/// Scene queries the device exposes to trace jobs while they execute.
pub trait SceneIntersector: Sync {
  /// Find the closest accepted intersection of the call.
  ///
  /// `any_hit` is invoked for non opaque candidates in traversal order, it decides if the
  /// candidate is committed.
  fn intersect(
    &self,
    call: &TraceRayCall,
    any_hit: &mut dyn FnMut(&HitInfo) -> AnyHitBehavior,
  ) -> Option<HitInfo>;
}

/// The driver abstraction the accelerator records work against.
pub trait AccelerationStructureDevice: Send + Sync {
  fn capabilities(&self) -> &DeviceCapabilities;

  /// worst case sizes of a build, only supported in [`SizeQueryMode::Combined`]
  fn get_build_sizes(&self, query: &BuildSizeQuery) -> AccelerationStructureResult<BuildSizes>;

  /// one memory requirement of a build, only required in [`SizeQueryMode::Separate`]
  fn get_memory_requirement(
    &self,
    query: &BuildSizeQuery,
    kind: MemoryRequirementKind,
  ) -> AccelerationStructureResult<u64> {
    let sizes = self.get_build_sizes(query)?;
    Ok(match kind {
      MemoryRequirementKind::Structure => sizes.structure_size,
      MemoryRequirementKind::BuildScratch => sizes.build_scratch_size,
      MemoryRequirementKind::UpdateScratch => sizes.update_scratch_size,
    })
  }

  fn allocate(&self, size: u64, usage: BufferUsage) -> AccelerationStructureResult<DeviceAllocation>;
  fn free(&self, allocation: DeviceAllocation);
  /// only valid for [`BufferUsage::BUILD_INPUT`] allocations
  fn write_buffer(
    &self,
    allocation: &DeviceAllocation,
    offset: u64,
    data: &[u8],
  ) -> AccelerationStructureResult<()>;

  fn create_acceleration_structure(
    &self,
    kind: AccelerationStructureKind,
    storage: &DeviceAllocation,
  ) -> AccelerationStructureResult<AccelerationStructureId>;
  fn destroy_acceleration_structure(&self, id: AccelerationStructureId);

  /// the device reference of a structure, zero until its build has completed
  fn acceleration_structure_address(&self, id: AccelerationStructureId) -> u64;
  /// if the address refers to a built bottom level structure that is still alive
  fn is_bottom_level_address_live(&self, address: u64) -> bool;

  fn submit(&self, commands: CommandSequence) -> AccelerationStructureResult<Fence>;
  fn is_lost(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
  Pending,
  Signaled,
  Lost,
}

struct FenceInner {
  state: Mutex<FenceState>,
  condvar: Condvar,
}

impl FenceInner {
  fn finish(&self, state: FenceState) {
    let mut current = self.state.lock();
    if *current == FenceState::Pending {
      *current = state;
      self.condvar.notify_all();
    }
  }
}

/// Completion signal of a submission, the only ordering primitive between host and device timeline.
#[derive(Clone)]
pub struct Fence {
  inner: Arc<FenceInner>,
}

/// The device side of a [`Fence`], dropping it unsignaled marks the fence lost.
pub struct FenceSignaler {
  inner: Arc<FenceInner>,
}

impl Fence {
  pub fn new_pair() -> (Fence, FenceSignaler) {
    let inner = Arc::new(FenceInner {
      state: Mutex::new(FenceState::Pending),
      condvar: Condvar::new(),
    });
    (
      Fence {
        inner: inner.clone(),
      },
      FenceSignaler { inner },
    )
  }

  fn state_to_result(state: FenceState) -> AccelerationStructureResult<()> {
    match state {
      FenceState::Signaled => Ok(()),
      FenceState::Lost => Err(AccelerationStructureError::DeviceLost),
      FenceState::Pending => Err(AccelerationStructureError::Timeout),
    }
  }

  pub fn wait(&self) -> AccelerationStructureResult<()> {
    let mut state = self.inner.state.lock();
    while *state == FenceState::Pending {
      self.inner.condvar.wait(&mut state);
    }
    Self::state_to_result(*state)
  }

  pub fn wait_timeout(&self, timeout: Duration) -> AccelerationStructureResult<()> {
    let deadline = Instant::now() + timeout;
    let mut state = self.inner.state.lock();
    while *state == FenceState::Pending {
      if self
        .inner
        .condvar
        .wait_until(&mut state, deadline)
        .timed_out()
      {
        break;
      }
    }
    Self::state_to_result(*state)
  }

  /// signaled or lost, waiting will not block
  pub fn is_complete(&self) -> bool {
    *self.inner.state.lock() != FenceState::Pending
  }

  pub fn is_signaled(&self) -> bool {
    *self.inner.state.lock() == FenceState::Signaled
  }
}

impl FenceSignaler {
  pub fn signal(self) {
    self.inner.finish(FenceState::Signaled)
  }

  pub fn lose(self) {
    self.inner.finish(FenceState::Lost)
  }
}

impl Drop for FenceSignaler {
  fn drop(&mut self) {
    self.inner.finish(FenceState::Lost)
  }
}
