use crate::*;

/// A device allocation freed on drop.
pub struct DeviceBuffer {
  device: Arc<dyn AccelerationStructureDevice>,
  allocation: DeviceAllocation,
}

impl DeviceBuffer {
  pub fn allocate(
    device: &Arc<dyn AccelerationStructureDevice>,
    size: u64,
    usage: BufferUsage,
  ) -> AccelerationStructureResult<Self> {
    let allocation = device.allocate(size, usage)?;
    log::debug!(
      "allocated {size} bytes {usage:?} at {:#x}",
      allocation.device_address
    );
    Ok(Self {
      device: device.clone(),
      allocation,
    })
  }

  pub fn write(&self, offset: u64, data: &[u8]) -> AccelerationStructureResult<()> {
    self.device.write_buffer(&self.allocation, offset, data)
  }

  pub fn allocation(&self) -> &DeviceAllocation {
    &self.allocation
  }

  pub fn size(&self) -> u64 {
    self.allocation.size
  }

  pub fn device_address(&self) -> u64 {
    self.allocation.device_address
  }
}

impl Drop for DeviceBuffer {
  fn drop(&mut self) {
    self.device.free(self.allocation);
  }
}

/// A device acceleration structure and its storage, both released on drop.
pub struct AccelerationStructure {
  device: Arc<dyn AccelerationStructureDevice>,
  id: AccelerationStructureId,
  kind: AccelerationStructureKind,
  storage: DeviceBuffer,
}

impl AccelerationStructure {
  pub fn create(
    device: &Arc<dyn AccelerationStructureDevice>,
    kind: AccelerationStructureKind,
    storage: DeviceBuffer,
  ) -> AccelerationStructureResult<Self> {
    // the storage is freed by its own drop if creation fails
    let id = device.create_acceleration_structure(kind, storage.allocation())?;
    Ok(Self {
      device: device.clone(),
      id,
      kind,
      storage,
    })
  }

  pub fn id(&self) -> AccelerationStructureId {
    self.id
  }

  pub fn kind(&self) -> AccelerationStructureKind {
    self.kind
  }

  pub fn storage_size(&self) -> u64 {
    self.storage.size()
  }

  pub fn address(&self) -> u64 {
    self.device.acceleration_structure_address(self.id)
  }

  pub(crate) fn is_owned_by(&self, device: &Arc<dyn AccelerationStructureDevice>) -> bool {
    std::ptr::eq(
      Arc::as_ptr(&self.device) as *const (),
      Arc::as_ptr(device) as *const (),
    )
  }
}

impl Drop for AccelerationStructure {
  fn drop(&mut self) {
    self.device.destroy_acceleration_structure(self.id);
  }
}
