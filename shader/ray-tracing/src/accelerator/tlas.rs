use crate::*;

/// A built top level structure over an instance list.
pub struct Tlas {
  structure: AccelerationStructure,
  instance_count: u32,
  options: TopLevelBuildOptions,
  update_scratch_size: u64,
}

impl Tlas {
  pub fn instance_count(&self) -> u32 {
    self.instance_count
  }

  pub fn options(&self) -> TopLevelBuildOptions {
    self.options
  }

  pub fn storage_size(&self) -> u64 {
    self.structure.storage_size()
  }

  pub(crate) fn structure(&self) -> &AccelerationStructure {
    &self.structure
  }
}

impl TwoLevelAccelerator {
  fn check_instance_count(&self, instances: &InstanceBuffer) -> AccelerationStructureResult<u32> {
    let caps = self.capabilities();
    if instances.len() > caps.limits.max_instance_count as usize {
      return Err(AccelerationStructureError::UnsupportedGeometry(format!(
        "{} instances exceed the device limit {}",
        instances.len(),
        caps.limits.max_instance_count
      )));
    }
    if instances.is_empty() && !caps.allow_empty_top_level {
      log::warn!("empty top level build rejected by device policy");
      return Err(AccelerationStructureError::EmptyInstanceSet);
    }
    Ok(instances.len() as u32)
  }

  /// reject instances whose bottom level structure was dropped after assembly
  fn check_instance_references(&self, instances: &InstanceBuffer) -> AccelerationStructureResult<()> {
    for (i, record) in instances.records().iter().enumerate() {
      if !self.device.is_bottom_level_address_live(record.blas_reference) {
        return Err(AccelerationStructureError::InvalidReference(format!(
          "instance {i} references {:#x} which is no longer a built bottom level structure",
          record.blas_reference
        )));
      }
    }
    Ok(())
  }

  fn submit_top_level(
    &self,
    target: AccelerationStructureId,
    instances: &InstanceBuffer,
    hint: BuildHint,
    mode: BuildMode,
    scratch_size: u64,
  ) -> AccelerationStructureResult<()> {
    let scratch = self.acquire_scratch(scratch_size)?;
    let mut commands = CommandSequence::default();
    commands.push(Command::BuildTopLevel {
      target,
      hint,
      mode,
      instances: *instances.allocation(),
      instance_count: instances.len() as u32,
      scratch: *scratch.allocation(),
    });
    let fence = self.device.submit(commands)?;
    log::debug!("top level {mode:?} submitted, {} instances", instances.len());

    // the instance buffer and the scratch stay borrowed until completion is observed
    let result = self.wait_fence(&fence);
    if let Err(AccelerationStructureError::Timeout) = result {
      // the device may still read the scratch
      let _ = fence.wait();
    }
    if result.is_ok() {
      self.release_scratch(scratch);
    }
    result
  }

  pub fn build_top_level(
    &self,
    instances: &InstanceBuffer,
    options: TopLevelBuildOptions,
  ) -> AccelerationStructureResult<Tlas> {
    self.check_device()?;
    let instance_count = self.check_instance_count(instances)?;
    self.check_instance_references(instances)?;

    let query = BuildSizeQuery {
      kind: AccelerationStructureKind::TopLevel,
      hint: options.hint,
      allow_update: options.allow_update,
      primitive_counts: vec![instance_count],
    };
    let sizes = self.query_build_sizes(&query)?;

    let structure = self.create_structure(AccelerationStructureKind::TopLevel, sizes.structure_size)?;
    self.submit_top_level(
      structure.id(),
      instances,
      options.hint,
      BuildMode::Build,
      sizes.build_scratch_size,
    )?;

    log::info!(
      "top level structure built, {instance_count} instances, {} bytes",
      structure.storage_size()
    );

    Ok(Tlas {
      structure,
      instance_count,
      options,
      update_scratch_size: sizes.update_scratch_size,
    })
  }

  /// Refit `tlas` to new instance transforms.
  ///
  /// The tree topology of the last full build is kept, so bounds may get looser than
  /// a rebuild while query results stay the same.
  pub fn update_top_level(
    &self,
    tlas: &mut Tlas,
    instances: &InstanceBuffer,
  ) -> AccelerationStructureResult<()> {
    self.check_device()?;
    if !tlas.structure.is_owned_by(&self.device) {
      return Err(AccelerationStructureError::InvalidReference(
        "top level structure belongs to another device".to_string(),
      ));
    }
    if !tlas.options.allow_update {
      return Err(AccelerationStructureError::IncompatibleUpdate(
        "the structure was not built with update allowed".to_string(),
      ));
    }
    if instances.len() != tlas.instance_count as usize {
      return Err(AccelerationStructureError::IncompatibleUpdate(format!(
        "instance count changed from {} to {}",
        tlas.instance_count,
        instances.len()
      )));
    }
    self.check_instance_references(instances)?;

    self.submit_top_level(
      tlas.structure.id(),
      instances,
      tlas.options.hint,
      BuildMode::Update,
      tlas.update_scratch_size,
    )?;
    log::info!("top level structure updated, {} instances", tlas.instance_count);
    Ok(())
  }
}
