use strata_geometry::{Box3, Vec3};

use super::*;
use crate::utils::{random_boxes, TreeBuildOption};

const SEED: u64 = 0x5EED_B0C5;

fn option() -> TreeBuildOption {
  TreeBuildOption {
    max_depth: 15,
    max_leaf_size: 4,
  }
}

fn check_tree(bvh: &FlattenBVH<Box3>, boxes: &[Box3]) {
  let mut sorted = bvh.sorted_primitive_index().to_vec();
  sorted.sort_unstable();
  assert_eq!(sorted, (0..boxes.len()).collect::<Vec<_>>());

  for node in &bvh.nodes {
    for &p in &bvh.sorted_primitive_index()[node.primitive_range.clone()] {
      assert!(node.bounding.contains_box(&boxes[p]));
    }
    if let Some((left, right)) = node.children() {
      let l = &bvh.nodes[left];
      let r = &bvh.nodes[right];
      assert_eq!(l.primitive_range.start, node.primitive_range.start);
      assert_eq!(l.primitive_range.end, r.primitive_range.start);
      assert_eq!(r.primitive_range.end, node.primitive_range.end);
      assert!(!l.primitive_range.is_empty());
      assert!(!r.primitive_range.is_empty());
    }
  }
}

#[test]
fn balance_tree_build() {
  let boxes = random_boxes(SEED, 1000, 100., 1.);
  let bvh = FlattenBVH::new(boxes.iter().copied(), &mut BalanceTree, &option());
  assert!(bvh.nodes.len() > 1);
  check_tree(&bvh, &boxes);
}

#[test]
fn sah_build() {
  let boxes = random_boxes(SEED, 1000, 100., 1.);
  let bvh = FlattenBVH::new(boxes.iter().copied(), &mut SAH::new(12), &option());
  assert!(bvh.nodes.len() > 1);
  check_tree(&bvh, &boxes);
}

#[test]
fn sah_separates_clusters() {
  let mut boxes = random_boxes(SEED, 100, 10., 0.5);
  let far = Vec3::new(1000., 0., 0.);
  boxes.extend(
    random_boxes(SEED + 1, 100, 10., 0.5)
      .into_iter()
      .map(|b| Box3::new3(b.min + far, b.max + far)),
  );
  let bvh = FlattenBVH::new(boxes.iter().copied(), &mut SAH::new(12), &option());
  check_tree(&bvh, &boxes);

  let (left, right) = bvh.nodes[0].children().unwrap();
  let mut sides = [&bvh.nodes[left], &bvh.nodes[right]];
  sides.sort_by(|a, b| a.bounding.min.x.total_cmp(&b.bounding.min.x));
  assert_eq!(sides[0].primitive_range.len(), 100);
  assert!(sides[0].bounding.max.x < 500.);
  assert!(sides[1].bounding.min.x > 500.);
}

#[test]
fn leaf_limits_are_respected() {
  let boxes = random_boxes(SEED, 300, 100., 1.);
  let shallow = TreeBuildOption {
    max_depth: 2,
    max_leaf_size: 1,
  };
  let bvh = FlattenBVH::new(boxes.iter().copied(), &mut BalanceTree, &shallow);
  // at most a complete binary tree of depth 2
  assert!(bvh.nodes.len() <= 7);
  check_tree(&bvh, &boxes);

  let deep = TreeBuildOption {
    max_depth: 32,
    ..option()
  };
  let bvh = FlattenBVH::new(boxes.iter().copied(), &mut SAH::new(8), &deep);
  for leaf in bvh.nodes.iter().filter(|n| n.is_leaf()) {
    assert!(leaf.primitive_range.len() <= 4);
  }
}

#[test]
fn sah_handles_overlapped_primitives() {
  let boxes = vec![Box3::new3(Vec3::ZERO, Vec3::ONE); 40];
  let bvh = FlattenBVH::new(boxes.iter().copied(), &mut SAH::new(8), &option());
  check_tree(&bvh, &boxes);
}

#[test]
fn empty_and_single_source() {
  let bvh = FlattenBVH::<Box3>::new(std::iter::empty(), &mut BalanceTree, &option());
  assert_eq!(bvh.nodes.len(), 1);
  assert!(bvh.root_bounding().is_empty());
  assert_eq!(compute_bvh_next(&bvh.nodes), vec![(INVALID_NEXT, INVALID_NEXT)]);

  let one = [Box3::new3(Vec3::ZERO, Vec3::ONE)];
  let bvh = FlattenBVH::new(one.iter().copied(), &mut SAH::new(4), &option());
  assert_eq!(bvh.primitive_count(), 1);
  assert_eq!(bvh.root_bounding(), one[0]);
}

#[test]
fn refit_follows_moved_primitives() {
  let boxes = random_boxes(SEED, 200, 50., 1.);
  let mut bvh = FlattenBVH::new(boxes.iter().copied(), &mut SAH::new(8), &option());
  let node_count = bvh.nodes.len();

  let offset = Vec3::new(100., -20., 3.);
  let moved: Vec<Box3> = boxes
    .iter()
    .map(|b| Box3::new3(b.min + offset, b.max + offset))
    .collect();
  bvh.refit(|i| moved[i]);

  assert_eq!(bvh.nodes.len(), node_count);
  check_tree(&bvh, &moved);
  let expect: Box3 = moved.iter().collect();
  assert_eq!(bvh.root_bounding(), expect);
}

#[test]
fn stackless_links_visit_every_leaf_once() {
  let boxes = random_boxes(SEED, 500, 100., 1.);
  let bvh = FlattenBVH::new(boxes.iter().copied(), &mut BalanceTree, &option());
  let links = compute_bvh_next(&bvh.nodes);
  assert_eq!(links.len(), bvh.nodes.len());

  let mut stack_order = Vec::new();
  bvh.traverse(
    |_| true,
    |leaf| {
      stack_order.push(leaf.self_index);
      true
    },
  );

  let mut stackless_order = Vec::new();
  traverse_stackless(
    &bvh.nodes,
    &links,
    |_| true,
    |leaf| {
      stackless_order.push(leaf.self_index);
      true
    },
  );

  assert_eq!(stack_order, stackless_order);
  let leaf_count = bvh.nodes.iter().filter(|n| n.is_leaf()).count();
  assert_eq!(stackless_order.len(), leaf_count);
}

#[test]
fn stackless_skips_missed_subtree() {
  let boxes = random_boxes(SEED, 500, 100., 1.);
  let bvh = FlattenBVH::new(boxes.iter().copied(), &mut BalanceTree, &option());
  let links = compute_bvh_next(&bvh.nodes);
  let query = Box3::new3(Vec3::ZERO, Vec3::splat(30.));

  let mut found = Vec::new();
  traverse_stackless(
    &bvh.nodes,
    &links,
    |node| {
      let b = node.bounding;
      b.min.cmple(query.max).all() && b.max.cmpge(query.min).all()
    },
    |leaf| {
      found.extend_from_slice(&bvh.sorted_primitive_index()[leaf.primitive_range.clone()]);
      true
    },
  );

  for (i, b) in boxes.iter().enumerate() {
    let overlap = b.min.cmple(query.max).all() && b.max.cmpge(query.min).all();
    if overlap {
      assert!(found.contains(&i));
    }
  }
}
