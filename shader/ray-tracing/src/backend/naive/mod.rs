mod blas;
mod flag;
mod memory;
mod timeline;
mod tlas;
mod traverse;

#[cfg(test)]
mod test;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use blas::NaiveBlasData;
use memory::DeviceMemory;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use timeline::*;
use tlas::NaiveTlasData;

use crate::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NaiveDeviceConfig {
  /// bytes of device memory available to allocations
  pub memory_budget: u64,
  pub limits: DeviceLimits,
  pub address_mode: GeometryAddressMode,
  pub size_query_mode: SizeQueryMode,
  pub allow_empty_bottom_level: bool,
  pub allow_empty_top_level: bool,
}

impl Default for NaiveDeviceConfig {
  fn default() -> Self {
    Self {
      memory_budget: 256 * 1024 * 1024,
      limits: Default::default(),
      address_mode: Default::default(),
      size_query_mode: Default::default(),
      allow_empty_bottom_level: true,
      allow_empty_top_level: true,
    }
  }
}

impl NaiveDeviceConfig {
  pub fn capabilities(&self) -> DeviceCapabilities {
    DeviceCapabilities {
      limits: self.limits,
      address_mode: self.address_mode,
      size_query_mode: self.size_query_mode,
      allow_empty_bottom_level: self.allow_empty_bottom_level,
      allow_empty_top_level: self.allow_empty_top_level,
    }
  }
}

pub(crate) enum BuiltStructure {
  /// the data is resolved by device address through `blas_by_address`
  Bottom,
  Top(Arc<NaiveTlasData>),
}

pub(crate) struct StructureEntry {
  pub kind: AccelerationStructureKind,
  pub storage: DeviceAllocation,
  pub built: Option<BuiltStructure>,
}

pub(crate) struct NaiveDeviceState {
  pub memory: DeviceMemory,
  pub structures: HashMap<AccelerationStructureId, StructureEntry>,
  next_structure_id: u64,
  /// built bottom level structures by device reference, for top level builds to resolve
  pub blas_by_address: HashMap<u64, Arc<NaiveBlasData>>,
  pub in_flight_scratch: HashSet<AllocationId>,
}

pub(crate) struct NaiveDeviceShared {
  pub state: Mutex<NaiveDeviceState>,
  lost: AtomicBool,
}

impl NaiveDeviceShared {
  pub fn is_lost(&self) -> bool {
    self.lost.load(Ordering::Acquire)
  }

  pub fn mark_lost(&self) {
    if !self.lost.swap(true, Ordering::AcqRel) {
      log::warn!("naive device lost");
    }
  }
}

const NODE_SIZE: u64 = 32;
const TRIANGLE_SIZE: u64 = 36;
const INSTANCE_SIZE: u64 = 128;
const STRUCTURE_HEADER_SIZE: u64 = 64;
const SCRATCH_BASE_SIZE: u64 = 256;
const SAH_BIN_COUNT: u64 = 12;

/// A software device, builds and traces on the CPU.
///
/// Submissions run in order on a dedicated device timeline thread, trace jobs spread their
/// invocations over the rayon pool.
pub struct NaiveDevice {
  shared: Arc<NaiveDeviceShared>,
  capabilities: DeviceCapabilities,
  config: NaiveDeviceConfig,
  sender: Option<flume::Sender<Submission>>,
  timeline: Option<JoinHandle<()>>,
}

impl NaiveDevice {
  pub fn new(config: NaiveDeviceConfig) -> AccelerationStructureResult<Self> {
    let shared = Arc::new(NaiveDeviceShared {
      state: Mutex::new(NaiveDeviceState {
        memory: DeviceMemory::new(config.memory_budget),
        structures: Default::default(),
        next_structure_id: 1,
        blas_by_address: Default::default(),
        in_flight_scratch: Default::default(),
      }),
      lost: AtomicBool::new(false),
    });

    let (sender, receiver) = flume::unbounded();
    let timeline_shared = shared.clone();
    let timeline = std::thread::Builder::new()
      .name("naive-device-timeline".to_string())
      .spawn(move || run_timeline(timeline_shared, receiver))
      .map_err(|e| {
        log::warn!("failed to start device timeline: {e}");
        AccelerationStructureError::DeviceLost
      })?;

    log::info!(
      "naive device created, {} bytes budget, {:?} address mode, {:?} size query",
      config.memory_budget,
      config.address_mode,
      config.size_query_mode
    );

    Ok(Self {
      shared,
      capabilities: config.capabilities(),
      config,
      sender: Some(sender),
      timeline: Some(timeline),
    })
  }

  pub fn config(&self) -> &NaiveDeviceConfig {
    &self.config
  }

  pub fn memory_used(&self) -> u64 {
    self.shared.state.lock().memory.used()
  }

  pub fn memory_available(&self) -> u64 {
    let state = self.shared.state.lock();
    state.memory.budget().saturating_sub(state.memory.used())
  }

  pub fn live_structure_count(&self) -> usize {
    self.shared.state.lock().structures.len()
  }

  fn compute_build_sizes(query: &BuildSizeQuery) -> BuildSizes {
    let count: u64 = query.primitive_counts.iter().map(|&c| c as u64).sum();
    let node_storage = 2 * count * NODE_SIZE;
    let bin_scratch = match query.hint {
      BuildHint::FastTrace => SAH_BIN_COUNT * 2 * NODE_SIZE,
      BuildHint::FastBuild => 0,
    };
    let (primitive_size, build_primitive_size) = match query.kind {
      AccelerationStructureKind::BottomLevel => (TRIANGLE_SIZE, 24 + 12 + 8),
      AccelerationStructureKind::TopLevel => (INSTANCE_SIZE, 24 + 12 + 8),
    };
    BuildSizes {
      structure_size: STRUCTURE_HEADER_SIZE + count * primitive_size + node_storage,
      build_scratch_size: SCRATCH_BASE_SIZE + bin_scratch + count * build_primitive_size,
      update_scratch_size: if query.allow_update {
        SCRATCH_BASE_SIZE + count * 24
      } else {
        0
      },
    }
  }
}

impl Drop for NaiveDevice {
  fn drop(&mut self) {
    self.sender.take();
    if let Some(timeline) = self.timeline.take() {
      if timeline.join().is_err() {
        log::warn!("naive device timeline panicked");
      }
    }
  }
}

impl AccelerationStructureDevice for NaiveDevice {
  fn capabilities(&self) -> &DeviceCapabilities {
    &self.capabilities
  }

  fn get_build_sizes(&self, query: &BuildSizeQuery) -> AccelerationStructureResult<BuildSizes> {
    if self.config.size_query_mode != SizeQueryMode::Combined {
      return Err(AccelerationStructureError::UnsupportedGeometry(
        "combined build size query is not supported, query each memory requirement".to_string(),
      ));
    }
    Ok(Self::compute_build_sizes(query))
  }

  fn get_memory_requirement(
    &self,
    query: &BuildSizeQuery,
    kind: MemoryRequirementKind,
  ) -> AccelerationStructureResult<u64> {
    let sizes = Self::compute_build_sizes(query);
    Ok(match kind {
      MemoryRequirementKind::Structure => sizes.structure_size,
      MemoryRequirementKind::BuildScratch => sizes.build_scratch_size,
      MemoryRequirementKind::UpdateScratch => sizes.update_scratch_size,
    })
  }

  fn allocate(&self, size: u64, usage: BufferUsage) -> AccelerationStructureResult<DeviceAllocation> {
    if self.is_lost() {
      return Err(AccelerationStructureError::DeviceLost);
    }
    self.shared.state.lock().memory.allocate(size, usage)
  }

  fn free(&self, allocation: DeviceAllocation) {
    let mut state = self.shared.state.lock();
    if state.in_flight_scratch.contains(&allocation.id) {
      log::warn!("freeing scratch {:?} while a build may still use it", allocation.id);
    }
    state.memory.free(allocation.id);
  }

  fn write_buffer(
    &self,
    allocation: &DeviceAllocation,
    offset: u64,
    data: &[u8],
  ) -> AccelerationStructureResult<()> {
    self.shared.state.lock().memory.write(allocation.id, offset, data)
  }

  fn create_acceleration_structure(
    &self,
    kind: AccelerationStructureKind,
    storage: &DeviceAllocation,
  ) -> AccelerationStructureResult<AccelerationStructureId> {
    let mut state = self.shared.state.lock();
    let usable = state
      .memory
      .get(storage.id)
      .is_some_and(|a| a.usage.contains(BufferUsage::STRUCTURE_STORAGE));
    if !usable {
      return Err(AccelerationStructureError::InvalidReference(format!(
        "allocation {:?} is not a structure storage",
        storage.id
      )));
    }
    let id = AccelerationStructureId(state.next_structure_id);
    state.next_structure_id += 1;
    state.structures.insert(
      id,
      StructureEntry {
        kind,
        storage: *storage,
        built: None,
      },
    );
    Ok(id)
  }

  fn destroy_acceleration_structure(&self, id: AccelerationStructureId) {
    let mut state = self.shared.state.lock();
    if let Some(entry) = state.structures.remove(&id) {
      if let Some(BuiltStructure::Bottom) = entry.built {
        state.blas_by_address.remove(&entry.storage.device_address);
      }
    }
  }

  fn acceleration_structure_address(&self, id: AccelerationStructureId) -> u64 {
    let state = self.shared.state.lock();
    match state.structures.get(&id) {
      Some(StructureEntry {
        built: Some(_),
        storage,
        ..
      }) => storage.device_address,
      _ => 0,
    }
  }

  fn is_bottom_level_address_live(&self, address: u64) -> bool {
    self.shared.state.lock().blas_by_address.contains_key(&address)
  }

  fn submit(&self, commands: CommandSequence) -> AccelerationStructureResult<Fence> {
    if self.is_lost() {
      return Err(AccelerationStructureError::DeviceLost);
    }

    {
      let mut state = self.shared.state.lock();
      let scratch: Vec<DeviceAllocation> =
        commands.commands().iter().filter_map(|c| c.scratch()).collect();
      for s in &scratch {
        let usable = state
          .memory
          .get(s.id)
          .is_some_and(|a| a.usage.contains(BufferUsage::SCRATCH));
        if !usable {
          return Err(AccelerationStructureError::InvalidReference(format!(
            "allocation {:?} is not a scratch buffer",
            s.id
          )));
        }
        if state.in_flight_scratch.contains(&s.id) {
          return Err(AccelerationStructureError::ResourceInUse(format!(
            "scratch {:?} is still used by an incomplete build",
            s.id
          )));
        }
      }
      state.in_flight_scratch.extend(scratch.iter().map(|s| s.id));
    }

    let names: Vec<_> = commands.commands().iter().map(|c| c.name()).collect();
    let (fence, signaler) = Fence::new_pair();
    let sender = self.sender.as_ref().ok_or(AccelerationStructureError::DeviceLost)?;
    if sender
      .send(Submission {
        commands: commands.into_commands(),
        signaler,
      })
      .is_err()
    {
      // the timeline is gone, the unsent signaler has already marked the fence lost
      self.shared.mark_lost();
      return Err(AccelerationStructureError::DeviceLost);
    }
    log::debug!("naive device submission {names:?}");
    Ok(fence)
  }

  fn is_lost(&self) -> bool {
    self.shared.is_lost()
  }
}
