use std::cell::Cell;

use strata_space_algorithm::bvh::traverse_stackless;

use super::flag::*;
use super::tlas::*;
use crate::*;

#[inline]
fn hit_box(origin: Vec3, inv_direction: Vec3, near: f32, far: f32, bounding: &Box3) -> bool {
  !bounding.is_empty() && intersect_ray_aabb(origin, inv_direction, RayRange::new(near, far), bounding)
}

struct TraversalState {
  closest: Option<HitInfo>,
  end_search: bool,
}

impl NaiveTlasData {
  fn intersect_instance(
    &self,
    instance_index: usize,
    call: &TraceRayCall,
    ray_flags: TraverseFlags,
    t_max: &Cell<f32>,
    state: &mut TraversalState,
    any_hit: &mut dyn FnMut(&HitInfo) -> AnyHitBehavior,
  ) {
    let instance = &self.instances[instance_index];
    if instance.mask & call.cull_mask == 0 {
      return;
    }
    let world_inv = call.ray.direction.recip();
    if !hit_box(
      call.ray.origin,
      world_inv,
      call.range.min,
      t_max.get(),
      &instance.world_bounding,
    ) {
      return;
    }

    let flags = ray_flags.merge_geometry_instance_flags(instance.flags);
    if flags.contains(TraverseFlags::SKIP_TRIANGLES) {
      return;
    }

    // the transform keeps the parametric distance, no rescale of the range is needed
    let object_ray = call.ray.apply_matrix_into(instance.world_to_object);
    let object_inv = object_ray.direction.recip();

    for (geometry_index, geometry) in instance.blas.geometries.iter().enumerate() {
      let (pass, is_opaque) = flags.cull_geometry(geometry.flags);
      if !pass {
        continue;
      }

      traverse_stackless(
        &geometry.bvh.nodes,
        &geometry.traverse_next,
        |node| {
          hit_box(
            object_ray.origin,
            object_inv,
            call.range.min,
            t_max.get(),
            &node.bounding,
          )
        },
        |leaf| {
          for &primitive in &geometry.bvh.sorted_primitive_index()[leaf.primitive_range.clone()] {
            let range = RayRange::new(call.range.min, t_max.get());
            let Some(hit) = geometry.triangles[primitive].intersect_ray(&object_ray, range) else {
              continue;
            };
            if !flags.cull_triangle(hit.front_face) {
              continue;
            }

            let info = HitInfo {
              instance_index: instance_index as u32,
              instance_custom_index: instance.custom_index,
              instance_hit_group_offset: instance.hit_group_offset,
              geometry_index: geometry_index as u32,
              primitive_index: primitive as u32,
              distance: hit.distance,
              barycentric: hit.uv,
              front_face: flags.is_front_face(hit.front_face),
              world_ray: call.ray,
              object_to_world: instance.object_to_world,
              world_to_object: instance.world_to_object,
            };

            let behavior = if is_opaque {
              AnyHitBehavior::Accept
            } else {
              any_hit(&info)
            };
            if behavior == AnyHitBehavior::Ignore {
              continue;
            }

            t_max.set(hit.distance);
            state.closest = Some(info);
            if behavior == AnyHitBehavior::AcceptAndEndSearch || flags.end_search_on_hit() {
              state.end_search = true;
              return false;
            }
          }
          true
        },
      );

      if state.end_search {
        return;
      }
    }
  }
}

impl SceneIntersector for NaiveTlasData {
  fn intersect(
    &self,
    call: &TraceRayCall,
    any_hit: &mut dyn FnMut(&HitInfo) -> AnyHitBehavior,
  ) -> Option<HitInfo> {
    if self.instances.is_empty() {
      return None;
    }

    let flags = TraverseFlags::from_ray_flags(call.flags);
    let world_inv = call.ray.direction.recip();
    let t_max = Cell::new(call.range.max);
    let mut state = TraversalState {
      closest: None,
      end_search: false,
    };

    traverse_stackless(
      &self.bvh.nodes,
      &self.traverse_next,
      |node| {
        hit_box(
          call.ray.origin,
          world_inv,
          call.range.min,
          t_max.get(),
          &node.bounding,
        )
      },
      |leaf| {
        for &instance in &self.bvh.sorted_primitive_index()[leaf.primitive_range.clone()] {
          self.intersect_instance(instance, call, flags, &t_max, &mut state, &mut *any_hit);
          if state.end_search {
            return false;
          }
        }
        true
      },
    );

    state.closest
  }
}
