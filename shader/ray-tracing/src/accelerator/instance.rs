use crate::*;

/// Serialized instance records uploaded for top level builds.
///
/// The record order is the instance index reported to hit programs.
pub struct InstanceBuffer {
  buffer: DeviceBuffer,
  records: Vec<InstanceRecord>,
}

impl InstanceBuffer {
  pub fn records(&self) -> &[InstanceRecord] {
    &self.records
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub fn allocation(&self) -> &DeviceAllocation {
    self.buffer.allocation()
  }
}

impl TwoLevelAccelerator {
  pub fn assemble_instances(
    &self,
    placements: &[InstancePlacement],
  ) -> AccelerationStructureResult<InstanceBuffer> {
    self.check_device()?;
    let limit = self.capabilities().limits.max_instance_count;
    if placements.len() > limit as usize {
      return Err(AccelerationStructureError::UnsupportedGeometry(format!(
        "{} instances exceed the device limit {limit}",
        placements.len()
      )));
    }

    let records = placements
      .iter()
      .enumerate()
      .map(|(i, placement)| {
        if !self.device.is_bottom_level_address_live(placement.blas.raw()) {
          return Err(AccelerationStructureError::InvalidReference(format!(
            "instance {i} references {:#x} which is not a built bottom level structure",
            placement.blas.raw()
          )));
        }
        InstanceRecord::from_placement(placement)
      })
      .collect::<AccelerationStructureResult<Vec<_>>>()?;

    let buffer = self.create_init_buffer(bytemuck::cast_slice(&records))?;
    log::debug!("assembled {} instances", records.len());
    Ok(InstanceBuffer { buffer, records })
  }
}
