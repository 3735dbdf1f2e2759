use strata_space_algorithm::bvh::*;
use strata_space_algorithm::utils::TreeBuildOption;

use crate::*;

pub(crate) fn build_bvh(source: impl Iterator<Item = Box3>, hint: BuildHint) -> FlattenBVH<Box3> {
  match hint {
    BuildHint::FastTrace => FlattenBVH::new(
      source,
      &mut SAH::new(12),
      &TreeBuildOption {
        max_depth: 32,
        max_leaf_size: 4,
      },
    ),
    BuildHint::FastBuild => FlattenBVH::new(
      source,
      &mut BalanceTree,
      &TreeBuildOption {
        max_depth: 32,
        max_leaf_size: 8,
      },
    ),
  }
}

pub(crate) struct NaiveGeometry {
  pub flags: GeometryFlags,
  pub triangles: Vec<Triangle>,
  pub bvh: FlattenBVH<Box3>,
  pub traverse_next: Vec<(u32, u32)>,
}

impl NaiveGeometry {
  fn build(source: &MeshGeometry, hint: BuildHint) -> Self {
    let triangles: Vec<Triangle> = (0..source.triangle_count())
      .map(|i| source.triangle(i))
      .collect();

    // non finite triangles stay in the primitive list to keep primitive indices, but never hit
    let bvh = build_bvh(
      triangles.iter().map(|t| {
        if t.is_finite() {
          t.to_bounding()
        } else {
          Box3::empty()
        }
      }),
      hint,
    );
    let traverse_next = compute_bvh_next(&bvh.nodes);

    Self {
      flags: source.flags,
      triangles,
      bvh,
      traverse_next,
    }
  }
}

/// Device side content of a built bottom level structure.
pub(crate) struct NaiveBlasData {
  pub geometries: Vec<NaiveGeometry>,
  pub bounding: Box3,
}

impl NaiveBlasData {
  pub fn build(sources: &[MeshGeometry], hint: BuildHint) -> Self {
    let geometries: Vec<_> = sources.iter().map(|g| NaiveGeometry::build(g, hint)).collect();
    let bounding = geometries.iter().map(|g| g.bvh.root_bounding()).collect();
    log::trace!(
      "naive blas built, {} geometries, {} nodes",
      geometries.len(),
      geometries.iter().map(|g| g.bvh.nodes.len()).sum::<usize>()
    );
    Self {
      geometries,
      bounding,
    }
  }
}
