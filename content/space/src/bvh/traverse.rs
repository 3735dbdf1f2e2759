use super::{BVHBounding, FlattenBVHNode};

pub const INVALID_NEXT: u32 = u32::MAX;

/// Stackless traversal links for every node, as `(hit, miss)`.
///
/// `hit` is the node to visit when the node bounding is hit, `miss` is the node to visit when
/// it is missed or after a leaf is processed. A leaf has `hit == miss`. `INVALID_NEXT` ends traversal.
pub fn compute_bvh_next<B: BVHBounding>(flatten_nodes: &[FlattenBVHNode<B>]) -> Vec<(u32, u32)> {
  let mut result = Vec::with_capacity(flatten_nodes.len());
  let mut next_stack = Vec::new();

  for node in flatten_nodes {
    if next_stack.last().copied() == Some(node.self_index as u32) {
      next_stack.pop();
    }
    let miss = next_stack.last().copied().unwrap_or(INVALID_NEXT);
    let next = match node.children() {
      Some((left, right)) => {
        next_stack.push(right as u32);
        (left as u32, miss)
      }
      None => (miss, miss),
    };
    result.push(next);
  }
  result
}

/// walk the tree with precomputed links, `enter` tests a node bounding, `leaf` returns false to stop.
pub fn traverse_stackless<B: BVHBounding>(
  nodes: &[FlattenBVHNode<B>],
  links: &[(u32, u32)],
  mut enter: impl FnMut(&FlattenBVHNode<B>) -> bool,
  mut leaf: impl FnMut(&FlattenBVHNode<B>) -> bool,
) {
  if nodes.is_empty() {
    return;
  }
  let mut current = 0_u32;
  while current != INVALID_NEXT {
    let node = &nodes[current as usize];
    let (hit, miss) = links[current as usize];
    if !enter(node) {
      current = miss;
      continue;
    }
    if node.is_leaf() && !leaf(node) {
      return;
    }
    current = hit;
  }
}
