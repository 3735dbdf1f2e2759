use super::flag::*;
use super::memory::*;
use super::*;

fn naive_device(config: NaiveDeviceConfig) -> (Arc<NaiveDevice>, TwoLevelAccelerator) {
  let device = Arc::new(NaiveDevice::new(config).unwrap());
  let accelerator = TwoLevelAccelerator::new(device.clone(), AcceleratorConfig::default());
  (device, accelerator)
}

fn unit_triangle() -> MeshGeometry {
  MeshGeometry::new(vec![
    Vec3::new(1., 1., 0.),
    Vec3::new(-1., 1., 0.),
    Vec3::new(0., -1., 0.),
  ])
}

#[test]
fn instance_flags_merge_into_ray_flags() {
  let ray = TraverseFlags::from_ray_flags(RayFlags::CULL_BACK_FACING_TRIANGLES);

  let merged = ray.merge_geometry_instance_flags(GeometryInstanceFlags::TRIANGLE_FACING_CULL_DISABLE);
  assert!(!merged.contains(TraverseFlags::CULL_BACK_FACING_TRIANGLES));

  let flipped = ray.merge_geometry_instance_flags(GeometryInstanceFlags::TRIANGLE_FLIP_FACING);
  assert!(!flipped.is_front_face(true));
  assert!(flipped.is_front_face(false));
  assert!(!flipped.cull_triangle(false));
  assert!(flipped.cull_triangle(true));

  let forced = ray.merge_geometry_instance_flags(GeometryInstanceFlags::FORCE_OPAQUE);
  assert_eq!(forced.cull_geometry(GeometryFlags::empty()), (true, true));

  // the ray decision wins over the instance
  let ray_forced = TraverseFlags::from_ray_flags(RayFlags::FORCE_NON_OPAQUE)
    .merge_geometry_instance_flags(GeometryInstanceFlags::FORCE_OPAQUE);
  assert_eq!(ray_forced.cull_geometry(GeometryFlags::OPAQUE), (true, false));
}

#[test]
fn opacity_culling() {
  let cull_opaque = TraverseFlags::from_ray_flags(RayFlags::CULL_OPAQUE);
  assert_eq!(cull_opaque.cull_geometry(GeometryFlags::OPAQUE), (false, true));
  assert_eq!(cull_opaque.cull_geometry(GeometryFlags::empty()), (true, false));

  let cull_non_opaque = TraverseFlags::from_ray_flags(RayFlags::CULL_NON_OPAQUE);
  assert_eq!(cull_non_opaque.cull_geometry(GeometryFlags::OPAQUE), (true, true));
  assert_eq!(cull_non_opaque.cull_geometry(GeometryFlags::empty()), (false, false));

  let none = TraverseFlags::from_ray_flags(RayFlags::empty());
  assert!(none.cull_triangle(true));
  assert!(none.cull_triangle(false));
  assert!(!none.end_search_on_hit());
}

#[test]
fn memory_budget_accounting() {
  let mut memory = DeviceMemory::new(4 * ALLOCATION_ALIGNMENT);

  let a = memory.allocate(10, BufferUsage::SCRATCH).unwrap();
  let b = memory.allocate(ALLOCATION_ALIGNMENT + 1, BufferUsage::BUILD_INPUT).unwrap();
  assert_eq!(memory.used(), 3 * ALLOCATION_ALIGNMENT);
  assert_ne!(a.device_address, 0);
  assert_eq!(b.device_address % ALLOCATION_ALIGNMENT, 0);
  assert!(b.device_address > a.device_address);

  let err = memory.allocate(2 * ALLOCATION_ALIGNMENT, BufferUsage::SCRATCH).unwrap_err();
  assert_eq!(
    err,
    AccelerationStructureError::OutOfDeviceMemory {
      requested: 2 * ALLOCATION_ALIGNMENT,
      available: ALLOCATION_ALIGNMENT,
    }
  );

  assert!(memory.free(a.id));
  assert!(!memory.free(a.id));
  assert_eq!(memory.used(), 2 * ALLOCATION_ALIGNMENT);
  assert!(memory.get(a.id).is_none());

  // addresses are never reused
  let c = memory.allocate(10, BufferUsage::SCRATCH).unwrap();
  assert_ne!(c.device_address, a.device_address);
}

#[test]
fn memory_host_visibility() {
  let mut memory = DeviceMemory::new(1 << 20);
  let input = memory.allocate(16, BufferUsage::BUILD_INPUT).unwrap();
  let scratch = memory.allocate(16, BufferUsage::SCRATCH).unwrap();

  memory.write(input.id, 4, &[1, 2, 3, 4]).unwrap();
  assert_eq!(memory.read(input.device_address + 4, 4), Some(&[1u8, 2, 3, 4][..]));
  assert_eq!(memory.read(input.device_address, 20), None);

  assert!(matches!(
    memory.write(scratch.id, 0, &[1]),
    Err(AccelerationStructureError::InvalidReference(_))
  ));
  assert!(matches!(
    memory.write(input.id, 14, &[0; 4]),
    Err(AccelerationStructureError::InvalidReference(_))
  ));
  assert_eq!(memory.read(scratch.device_address, 1), None);
}

#[test]
fn build_sizes_follow_size_query_mode() {
  let query = BuildSizeQuery {
    kind: AccelerationStructureKind::BottomLevel,
    hint: BuildHint::FastTrace,
    allow_update: false,
    primitive_counts: vec![10, 20],
  };

  let (combined, _) = naive_device(Default::default());
  let sizes = combined.get_build_sizes(&query).unwrap();
  assert!(sizes.structure_size > 0);
  assert!(sizes.build_scratch_size > 0);
  assert_eq!(sizes.update_scratch_size, 0);

  let (separate, _) = naive_device(NaiveDeviceConfig {
    size_query_mode: SizeQueryMode::Separate,
    ..Default::default()
  });
  assert!(separate.get_build_sizes(&query).is_err());
  assert_eq!(
    separate
      .get_memory_requirement(&query, MemoryRequirementKind::Structure)
      .unwrap(),
    sizes.structure_size
  );

  let updatable = BuildSizeQuery {
    kind: AccelerationStructureKind::TopLevel,
    allow_update: true,
    primitive_counts: vec![4],
    ..query
  };
  assert!(
    separate
      .get_memory_requirement(&updatable, MemoryRequirementKind::UpdateScratch)
      .unwrap()
      > 0
  );
}

#[test]
fn in_flight_scratch_is_rejected() {
  let (device, accelerator) = naive_device(Default::default());
  let instances = accelerator.assemble_instances(&[]).unwrap();
  let tlas = accelerator
    .build_top_level(&instances, Default::default())
    .unwrap();

  // hold the device timeline inside a trace job
  let (gate_sender, gate) = flume::bounded::<()>(1);
  let mut blocker = CommandSequence::default();
  blocker.push(Command::TraceRays {
    tlas: tlas.structure().id(),
    job: Box::new(move |_: &dyn SceneIntersector| {
      let _ = gate.recv();
    }),
  });
  let blocker = device.submit(blocker).unwrap();

  let scratch = device.allocate(1024, BufferUsage::SCRATCH).unwrap();
  let storage = device
    .allocate(1024, BufferUsage::STRUCTURE_STORAGE)
    .unwrap();
  let target = device
    .create_acceleration_structure(AccelerationStructureKind::BottomLevel, &storage)
    .unwrap();
  let build = || {
    let mut commands = CommandSequence::default();
    commands.push(Command::BuildBottomLevel {
      target,
      hint: BuildHint::FastBuild,
      geometries: vec![BuildGeometryData::Host(unit_triangle())],
      scratch,
    });
    commands
  };

  let first = device.submit(build()).unwrap();
  assert!(matches!(
    device.submit(build()),
    Err(AccelerationStructureError::ResourceInUse(_))
  ));

  gate_sender.send(()).unwrap();
  blocker.wait().unwrap();
  first.wait().unwrap();
  assert_ne!(device.acceleration_structure_address(target), 0);
  assert!(device.is_bottom_level_address_live(storage.device_address));

  // observed completion releases the scratch
  device.submit(build()).unwrap().wait().unwrap();

  device.destroy_acceleration_structure(target);
  assert!(!device.is_bottom_level_address_live(storage.device_address));
  device.free(storage);
  device.free(scratch);
}

#[test]
fn non_scratch_allocation_is_rejected_as_scratch() {
  let (device, _) = naive_device(Default::default());
  let storage = device
    .allocate(1024, BufferUsage::STRUCTURE_STORAGE)
    .unwrap();
  let target = device
    .create_acceleration_structure(AccelerationStructureKind::BottomLevel, &storage)
    .unwrap();
  let mut commands = CommandSequence::default();
  commands.push(Command::BuildBottomLevel {
    target,
    hint: BuildHint::FastBuild,
    geometries: vec![],
    scratch: storage,
  });
  assert!(matches!(
    device.submit(commands),
    Err(AccelerationStructureError::InvalidReference(_))
  ));
  assert!(!device.is_lost());
}

#[test]
fn dropped_bottom_level_is_a_local_error() {
  let (device, accelerator) = naive_device(Default::default());
  let kept = accelerator.build_bottom_level_default(&[unit_triangle()]).unwrap();
  let kept_instances = accelerator
    .assemble_instances(&[InstancePlacement::new(kept.handle(), Transform3x4::IDENTITY)])
    .unwrap();
  let kept_tlas = accelerator
    .build_top_level(&kept_instances, Default::default())
    .unwrap();

  let blas = accelerator.build_bottom_level_default(&[unit_triangle()]).unwrap();
  let instances = accelerator
    .assemble_instances(&[InstancePlacement::new(blas.handle(), Transform3x4::IDENTITY)])
    .unwrap();
  drop(blas);

  assert!(matches!(
    accelerator.build_top_level(&instances, Default::default()),
    Err(AccelerationStructureError::InvalidReference(_))
  ));
  let mut updatable = accelerator
    .build_top_level(
      &kept_instances,
      TopLevelBuildOptions {
        allow_update: true,
        ..Default::default()
      },
    )
    .unwrap();
  assert!(matches!(
    accelerator.update_top_level(&mut updatable, &instances),
    Err(AccelerationStructureError::InvalidReference(_))
  ));
  assert!(!device.is_lost());

  // unrelated structures keep working
  let mut commands = CommandSequence::default();
  let (hit_sender, hit) = flume::bounded(1);
  commands.push(Command::TraceRays {
    tlas: kept_tlas.structure().id(),
    job: Box::new(move |scene: &dyn SceneIntersector| {
      let call = TraceRayCall::new(
        Ray3::new(Vec3::new(0., 0., 1.), Vec3::new(0., 0., -1.)),
        RayRange::new(0.001, 100.),
      );
      let _ = hit_sender.send(scene.intersect(&call, &mut |_: &HitInfo| AnyHitBehavior::Accept).is_some());
    }),
  });
  device.submit(commands).unwrap().wait().unwrap();
  assert_eq!(hit.recv(), Ok(true));
}

#[test]
fn unresolvable_instance_reference_at_execution_loses_device() {
  let (device, accelerator) = naive_device(Default::default());
  let blas = accelerator.build_bottom_level_default(&[unit_triangle()]).unwrap();
  let instances = accelerator
    .assemble_instances(&[InstancePlacement::new(blas.handle(), Transform3x4::IDENTITY)])
    .unwrap();
  drop(blas);

  // submitted straight to the device, only the execution resolves the reference
  let storage = device
    .allocate(4096, BufferUsage::STRUCTURE_STORAGE)
    .unwrap();
  let target = device
    .create_acceleration_structure(AccelerationStructureKind::TopLevel, &storage)
    .unwrap();
  let scratch = device.allocate(4096, BufferUsage::SCRATCH).unwrap();
  let mut commands = CommandSequence::default();
  commands.push(Command::BuildTopLevel {
    target,
    hint: BuildHint::FastBuild,
    mode: BuildMode::Build,
    instances: *instances.allocation(),
    instance_count: 1,
    scratch,
  });
  let fence = device.submit(commands).unwrap();
  assert_eq!(fence.wait(), Err(AccelerationStructureError::DeviceLost));
  assert!(device.is_lost());
  assert!(AccelerationStructureError::DeviceLost.is_fatal());

  assert_eq!(
    accelerator.build_bottom_level_default(&[unit_triangle()]).err(),
    Some(AccelerationStructureError::DeviceLost)
  );
  assert_eq!(
    device.allocate(16, BufferUsage::SCRATCH).err(),
    Some(AccelerationStructureError::DeviceLost)
  );
}

#[test]
fn out_of_range_write_is_rejected() {
  let mut memory = DeviceMemory::new(1 << 20);
  let input = memory.allocate(16, BufferUsage::BUILD_INPUT).unwrap();
  for offset in [u64::MAX, u64::MAX - 1, 1 << 40, 16] {
    assert!(matches!(
      memory.write(input.id, offset, &[1, 2, 3]),
      Err(AccelerationStructureError::InvalidReference(_))
    ));
  }
  memory.write(input.id, 13, &[1, 2, 3]).unwrap();

  let (device, accelerator) = naive_device(Default::default());
  let buffer = DeviceBuffer::allocate(accelerator.device(), 16, BufferUsage::BUILD_INPUT).unwrap();
  assert!(matches!(
    buffer.write(u64::MAX, &[1, 2, 3]),
    Err(AccelerationStructureError::InvalidReference(_))
  ));
  assert!(!device.is_lost());
}

#[test]
fn scoped_resources_release_device_memory() {
  let (device, accelerator) = naive_device(Default::default());
  {
    let blas = accelerator.build_bottom_level_default(&[unit_triangle()]).unwrap();
    let instances = accelerator
      .assemble_instances(&[InstancePlacement::new(blas.handle(), Transform3x4::IDENTITY)])
      .unwrap();
    let _tlas = accelerator
      .build_top_level(&instances, Default::default())
      .unwrap();
    assert_eq!(device.live_structure_count(), 2);
    assert!(device.memory_used() > 0);
  }
  assert_eq!(device.live_structure_count(), 0);
  assert!(accelerator.pooled_scratch_count() > 0);

  accelerator.trim_scratch_pool();
  assert_eq!(device.memory_used(), 0);
  assert_eq!(device.memory_available(), device.config().memory_budget);
}
