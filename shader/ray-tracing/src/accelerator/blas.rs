use crate::*;

/// A built bottom level structure, its device memory is released on drop.
///
/// Top level structures built over it keep the device side data alive, dropping a `Blas`
/// only makes its handle unavailable to later instance assembly.
pub struct Blas {
  structure: AccelerationStructure,
  handle: BlasHandle,
  geometry_count: u32,
  primitive_count: u64,
}

impl Blas {
  pub fn handle(&self) -> BlasHandle {
    self.handle
  }

  pub fn geometry_count(&self) -> u32 {
    self.geometry_count
  }

  pub fn primitive_count(&self) -> u64 {
    self.primitive_count
  }

  pub fn storage_size(&self) -> u64 {
    self.structure.storage_size()
  }
}

impl std::fmt::Debug for Blas {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Blas")
      .field("handle", &self.handle)
      .field("geometry_count", &self.geometry_count)
      .field("primitive_count", &self.primitive_count)
      .finish()
  }
}

struct PendingBlasResource {
  structure: AccelerationStructure,
  scratch: DeviceBuffer,
  /// device address mode uploads, only read by the build
  _geometry_buffers: Vec<DeviceBuffer>,
  geometry_count: u32,
  primitive_count: u64,
}

/// A submitted bottom level build.
///
/// Dropping it without [`PendingBlas::wait`] blocks until the build completed, so that its
/// scratch memory is never released while the device may still use it.
pub struct PendingBlas<'a> {
  accelerator: &'a TwoLevelAccelerator,
  fence: Fence,
  resource: Option<PendingBlasResource>,
}

impl PendingBlas<'_> {
  pub fn is_complete(&self) -> bool {
    self.fence.is_complete()
  }

  pub fn wait(mut self) -> AccelerationStructureResult<Blas> {
    self.accelerator.wait_fence(&self.fence)?;
    let Some(resource) = self.resource.take() else {
      return Err(AccelerationStructureError::DeviceLost);
    };
    self.accelerator.release_scratch(resource.scratch);

    let address = resource.structure.address();
    let handle = BlasHandle::new(address).ok_or_else(|| {
      AccelerationStructureError::InvalidReference(
        "device reported a zero address for a completed build".to_string(),
      )
    })?;

    log::info!(
      "bottom level structure {:#x} built, {} geometries, {} primitives, {} bytes",
      handle.raw(),
      resource.geometry_count,
      resource.primitive_count,
      resource.structure.storage_size()
    );

    Ok(Blas {
      structure: resource.structure,
      handle,
      geometry_count: resource.geometry_count,
      primitive_count: resource.primitive_count,
    })
  }
}

impl Drop for PendingBlas<'_> {
  fn drop(&mut self) {
    if let Some(resource) = self.resource.take() {
      if self.fence.wait().is_ok() {
        self.accelerator.release_scratch(resource.scratch);
      }
    }
  }
}

impl TwoLevelAccelerator {
  pub fn build_bottom_level(
    &self,
    geometries: &[MeshGeometry],
    hint: BuildHint,
  ) -> AccelerationStructureResult<Blas> {
    self.enqueue_bottom_level(geometries, hint)?.wait()
  }

  pub fn build_bottom_level_default(
    &self,
    geometries: &[MeshGeometry],
  ) -> AccelerationStructureResult<Blas> {
    self.build_bottom_level(geometries, self.config.default_hint)
  }

  fn validate_bottom_level(&self, geometries: &[MeshGeometry]) -> AccelerationStructureResult<u64> {
    let caps = self.capabilities();
    let limits = &caps.limits;
    if geometries.len() > limits.max_geometry_count as usize {
      return Err(AccelerationStructureError::UnsupportedGeometry(format!(
        "{} geometries exceed the device limit {}",
        geometries.len(),
        limits.max_geometry_count
      )));
    }
    for geometry in geometries {
      geometry.validate()?;
    }
    let primitive_count: u64 = geometries.iter().map(|g| g.triangle_count() as u64).sum();
    if primitive_count > limits.max_primitive_count {
      return Err(AccelerationStructureError::UnsupportedGeometry(format!(
        "{primitive_count} primitives exceed the device limit {}",
        limits.max_primitive_count
      )));
    }
    if primitive_count == 0 && !caps.allow_empty_bottom_level {
      log::warn!("empty bottom level build rejected by device policy");
      return Err(AccelerationStructureError::UnsupportedGeometry(
        "the device does not support bottom level structures without primitives".to_string(),
      ));
    }
    Ok(primitive_count)
  }

  fn upload_geometry(
    &self,
    geometry: &MeshGeometry,
    buffers: &mut Vec<DeviceBuffer>,
  ) -> AccelerationStructureResult<BuildGeometryData> {
    Ok(match self.capabilities().address_mode {
      GeometryAddressMode::HostPointer => BuildGeometryData::Host(geometry.clone()),
      GeometryAddressMode::DeviceAddress => {
        let positions = self.create_init_buffer(bytemuck::cast_slice(&geometry.positions))?;
        let positions_address = positions.device_address();
        buffers.push(positions);

        let indices = match &geometry.indices {
          Some(indices) => {
            let buffer = self.create_init_buffer(bytemuck::cast_slice(indices))?;
            let address = buffer.device_address();
            buffers.push(buffer);
            Some((address, indices.len() as u32))
          }
          None => None,
        };

        BuildGeometryData::DeviceAddress {
          positions: positions_address,
          vertex_count: geometry.positions.len() as u32,
          indices,
          flags: geometry.flags,
        }
      }
    })
  }

  /// Submit a bottom level build without waiting for it.
  ///
  /// Sizes are queried from the device before anything is allocated. Every allocation is owned by
  /// a scoped resource, so a failure in any step releases what was acquired before it.
  pub fn enqueue_bottom_level(
    &self,
    geometries: &[MeshGeometry],
    hint: BuildHint,
  ) -> AccelerationStructureResult<PendingBlas<'_>> {
    self.check_device()?;
    let primitive_count = self.validate_bottom_level(geometries)?;

    let query = BuildSizeQuery {
      kind: AccelerationStructureKind::BottomLevel,
      hint,
      allow_update: false,
      primitive_counts: geometries.iter().map(|g| g.triangle_count() as u32).collect(),
    };
    let sizes = self.query_build_sizes(&query)?;

    let structure = self.create_structure(AccelerationStructureKind::BottomLevel, sizes.structure_size)?;
    let scratch = self.acquire_scratch(sizes.build_scratch_size)?;

    let mut geometry_buffers = Vec::new();
    let geometry_data = geometries
      .iter()
      .map(|g| self.upload_geometry(g, &mut geometry_buffers))
      .collect::<AccelerationStructureResult<Vec<_>>>()?;

    let mut commands = CommandSequence::default();
    commands.push(Command::BuildBottomLevel {
      target: structure.id(),
      hint,
      geometries: geometry_data,
      scratch: *scratch.allocation(),
    });
    let fence = self.device.submit(commands)?;
    log::debug!("bottom level build submitted, {primitive_count} primitives");

    Ok(PendingBlas {
      accelerator: self,
      fence,
      resource: Some(PendingBlasResource {
        structure,
        scratch,
        _geometry_buffers: geometry_buffers,
        geometry_count: geometries.len() as u32,
        primitive_count,
      }),
    })
  }
}
