use std::collections::{BTreeMap, HashMap};

use crate::*;

pub const ALLOCATION_ALIGNMENT: u64 = 256;
/// address zero is never handed out
const ADDRESS_SPACE_START: u64 = 0x10000;

struct MemoryBlock {
  allocation: DeviceAllocation,
  reserved: u64,
  /// only build input allocations are host visible
  data: Option<Vec<u8>>,
}

/// Budget accounting over a bump allocated device address space.
pub(crate) struct DeviceMemory {
  budget: u64,
  used: u64,
  next_id: u64,
  next_address: u64,
  blocks: BTreeMap<u64, MemoryBlock>,
  address_by_id: HashMap<AllocationId, u64>,
}

impl DeviceMemory {
  pub fn new(budget: u64) -> Self {
    Self {
      budget,
      used: 0,
      next_id: 1,
      next_address: ADDRESS_SPACE_START,
      blocks: Default::default(),
      address_by_id: Default::default(),
    }
  }

  pub fn used(&self) -> u64 {
    self.used
  }

  pub fn budget(&self) -> u64 {
    self.budget
  }

  pub fn allocate(
    &mut self,
    size: u64,
    usage: BufferUsage,
  ) -> AccelerationStructureResult<DeviceAllocation> {
    let reserved = size.max(1).div_ceil(ALLOCATION_ALIGNMENT) * ALLOCATION_ALIGNMENT;
    let available = self.budget.saturating_sub(self.used);
    if reserved > available {
      log::warn!("device allocation of {size} bytes failed, {available} bytes available");
      return Err(AccelerationStructureError::OutOfDeviceMemory {
        requested: size,
        available,
      });
    }

    let allocation = DeviceAllocation {
      id: AllocationId(self.next_id),
      size,
      usage,
      device_address: self.next_address,
    };
    self.next_id += 1;
    self.next_address += reserved;
    self.used += reserved;

    let data = usage
      .contains(BufferUsage::BUILD_INPUT)
      .then(|| vec![0; size as usize]);
    self.blocks.insert(
      allocation.device_address,
      MemoryBlock {
        allocation,
        reserved,
        data,
      },
    );
    self.address_by_id.insert(allocation.id, allocation.device_address);
    Ok(allocation)
  }

  pub fn free(&mut self, id: AllocationId) -> bool {
    let Some(address) = self.address_by_id.remove(&id) else {
      return false;
    };
    if let Some(block) = self.blocks.remove(&address) {
      self.used -= block.reserved;
    }
    true
  }

  pub fn get(&self, id: AllocationId) -> Option<&DeviceAllocation> {
    let address = self.address_by_id.get(&id)?;
    self.blocks.get(address).map(|b| &b.allocation)
  }

  pub fn write(&mut self, id: AllocationId, offset: u64, data: &[u8]) -> AccelerationStructureResult<()> {
    let block = self
      .address_by_id
      .get(&id)
      .and_then(|address| self.blocks.get_mut(address))
      .ok_or_else(|| {
        AccelerationStructureError::InvalidReference(format!("write to freed allocation {id:?}"))
      })?;
    let Some(target) = block.data.as_mut() else {
      return Err(AccelerationStructureError::InvalidReference(format!(
        "allocation {id:?} is not host visible"
      )));
    };
    let end = offset.checked_add(data.len() as u64);
    let Some(end) = end.filter(|&end| end <= target.len() as u64) else {
      return Err(AccelerationStructureError::InvalidReference(format!(
        "write of {} bytes at offset {offset} exceeds allocation {id:?} of {} bytes",
        data.len(),
        target.len()
      )));
    };
    target[offset as usize..end as usize].copy_from_slice(data);
    Ok(())
  }

  /// read host visible memory by device address, the range may start inside an allocation
  pub fn read(&self, address: u64, len: u64) -> Option<&[u8]> {
    let (&base, block) = self.blocks.range(..=address).next_back()?;
    let data = block.data.as_ref()?;
    let start = (address - base) as usize;
    let end = start.checked_add(len as usize)?;
    data.get(start..end)
  }
}
