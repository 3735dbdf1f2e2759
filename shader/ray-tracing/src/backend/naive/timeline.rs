use super::blas::*;
use super::tlas::*;
use super::*;

pub(super) struct Submission {
  pub commands: Vec<Command>,
  pub signaler: FenceSignaler,
}

fn fault(message: impl Into<String>) -> AccelerationStructureError {
  log::warn!("naive device fault: {}", message.into());
  AccelerationStructureError::DeviceLost
}

/// Executes submissions in order until every sender is gone.
pub(super) fn run_timeline(shared: Arc<NaiveDeviceShared>, receiver: flume::Receiver<Submission>) {
  for Submission { commands, signaler } in receiver.iter() {
    let scratch: Vec<AllocationId> = commands
      .iter()
      .filter_map(|c| c.scratch())
      .map(|s| s.id)
      .collect();

    let result = if shared.is_lost() {
      Err(AccelerationStructureError::DeviceLost)
    } else {
      commands
        .into_iter()
        .try_for_each(|command| execute(&shared, command))
    };

    {
      let mut state = shared.state.lock();
      for id in &scratch {
        state.in_flight_scratch.remove(id);
      }
    }

    match result {
      Ok(()) => signaler.signal(),
      Err(_) => {
        shared.mark_lost();
        signaler.lose()
      }
    }
  }
  log::debug!("naive device timeline finished");
}

fn read_pod<T: bytemuck::Pod>(
  state: &NaiveDeviceState,
  address: u64,
  count: u32,
) -> AccelerationStructureResult<Vec<T>> {
  let len = count as u64 * std::mem::size_of::<T>() as u64;
  let bytes = state
    .memory
    .read(address, len)
    .ok_or_else(|| fault(format!("unreadable build input at {address:#x}")))?;
  Ok(bytemuck::pod_collect_to_vec(bytes))
}

fn resolve_geometry(
  state: &NaiveDeviceState,
  data: BuildGeometryData,
) -> AccelerationStructureResult<MeshGeometry> {
  match data {
    BuildGeometryData::Host(geometry) => Ok(geometry),
    BuildGeometryData::DeviceAddress {
      positions,
      vertex_count,
      indices,
      flags,
    } => {
      let positions: Vec<Vec3> = read_pod(state, positions, vertex_count)?;
      let mut geometry = MeshGeometry::new(positions).with_flags(flags);
      if let Some((address, count)) = indices {
        let indices: Vec<u32> = read_pod(state, address, count)?;
        geometry = geometry.with_indices(indices);
      }
      geometry
        .validate()
        .map_err(|e| fault(format!("invalid geometry in device memory: {e}")))?;
      Ok(geometry)
    }
  }
}

fn execute(shared: &NaiveDeviceShared, command: Command) -> AccelerationStructureResult<()> {
  match command {
    Command::BuildBottomLevel {
      target,
      hint,
      geometries,
      ..
    } => {
      let sources = {
        let state = shared.state.lock();
        geometries
          .into_iter()
          .map(|g| resolve_geometry(&state, g))
          .collect::<AccelerationStructureResult<Vec<_>>>()?
      };

      let data = Arc::new(NaiveBlasData::build(&sources, hint));

      let mut state = shared.state.lock();
      let entry = state
        .structures
        .get_mut(&target)
        .filter(|e| e.kind == AccelerationStructureKind::BottomLevel)
        .ok_or_else(|| fault(format!("bottom level build target {target:?} does not exist")))?;
      entry.built = Some(BuiltStructure::Bottom);
      let address = entry.storage.device_address;
      state.blas_by_address.insert(address, data);
      Ok(())
    }
    Command::BuildTopLevel {
      target,
      hint,
      mode,
      instances,
      instance_count,
      ..
    } => {
      let (instances, previous) = {
        let state = shared.state.lock();
        let records: Vec<InstanceRecord> =
          read_pod(&state, instances.device_address, instance_count)?;
        let instances = records
          .iter()
          .map(|record| {
            let blas = state
              .blas_by_address
              .get(&record.blas_reference)
              .cloned()
              .ok_or_else(|| {
                fault(format!(
                  "unresolvable bottom level reference {:#x}",
                  record.blas_reference
                ))
              })?;
            Ok::<_, AccelerationStructureError>(NaiveInstance::new(record, blas))
          })
          .collect::<AccelerationStructureResult<Vec<_>>>()?;

        let previous = match mode {
          BuildMode::Build => None,
          BuildMode::Update => match state.structures.get(&target).and_then(|e| e.built.as_ref()) {
            Some(BuiltStructure::Top(data)) => Some(data.clone()),
            _ => return Err(fault(format!("update of unbuilt top level structure {target:?}"))),
          },
        };
        (instances, previous)
      };

      let data = match previous {
        None => NaiveTlasData::build(instances, hint),
        Some(previous) => {
          let mut data = NaiveTlasData::clone(&previous);
          data.refit(instances)?;
          data
        }
      };

      let mut state = shared.state.lock();
      let entry = state
        .structures
        .get_mut(&target)
        .filter(|e| e.kind == AccelerationStructureKind::TopLevel)
        .ok_or_else(|| fault(format!("top level build target {target:?} does not exist")))?;
      entry.built = Some(BuiltStructure::Top(Arc::new(data)));
      Ok(())
    }
    Command::TraceRays { tlas, job } => {
      let data = {
        let state = shared.state.lock();
        match state.structures.get(&tlas).and_then(|e| e.built.as_ref()) {
          Some(BuiltStructure::Top(data)) => data.clone(),
          _ => return Err(fault(format!("trace against unbuilt top level structure {tlas:?}"))),
        }
      };
      job(data.as_ref());
      Ok(())
    }
  }
}
