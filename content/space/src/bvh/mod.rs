mod apply;
mod node;
mod strategy;
mod traverse;

#[cfg(test)]
mod test;

use std::ops::Range;

pub use node::*;
pub use strategy::*;
use strata_geometry::Vec3;
pub use traverse::*;

use crate::utils::{range_bounding, BuildEntry, TreeBuildOption};

pub trait BVHBounding: Sized + Copy + FromIterator<Self> {
  type AxisType: Copy;
  fn partition_axis(&self) -> Self::AxisType;
  fn centroid(&self) -> Vec3;
  fn axis_value(point: Vec3, axis: Self::AxisType) -> f32;
}

#[derive(Clone)]
pub struct FlattenBVH<B: BVHBounding> {
  /// nodes in depth first order, a parent always comes before its children.
  pub nodes: Vec<FlattenBVHNode<B>>,
  /// node primitive_range index into this list, which maps to the source primitive index.
  pub sorted_primitive_index: Vec<usize>,
}

struct TreeBuilder<'a, B: BVHBounding, S> {
  option: &'a TreeBuildOption,
  strategy: &'a mut S,
  entries: Vec<BuildEntry<B>>,
  order: Vec<usize>,
  nodes: Vec<FlattenBVHNode<B>>,
}

impl<B: BVHBounding, S: BVHBuildStrategy<B>> TreeBuilder<'_, B, S> {
  /// push the subtree rooted at a new node, return its node count
  fn subtree(&mut self, bounding: B, range: Range<usize>, depth: usize) -> usize {
    let index = self.nodes.len();
    self.nodes.push(FlattenBVHNode::new(bounding, range.clone(), index));
    if self.option.stays_leaf(range.len(), depth) {
      return 1;
    }

    let split = self.strategy.split(&bounding, range.clone(), &self.entries, &mut self.order);
    let Some(NodeSplit {
      axis,
      middle,
      left,
      right,
    }) = split.filter(|s| s.middle > range.start && s.middle < range.end)
    else {
      return 1;
    };

    let left_count = self.subtree(left, range.start..middle, depth + 1);
    let right_count = self.subtree(right, middle..range.end, depth + 1);
    self.nodes[index].child = Some(NodeChildren {
      left_count,
      split_axis: axis,
    });
    1 + left_count + right_count
  }
}

impl<B: BVHBounding> FlattenBVH<B> {
  pub fn new<S: BVHBuildStrategy<B>>(
    source: impl IntoIterator<Item = B>,
    strategy: &mut S,
    option: &TreeBuildOption,
  ) -> Self {
    let entries: Vec<_> = source
      .into_iter()
      .map(|bounding| BuildEntry {
        bounding,
        centroid: bounding.centroid(),
      })
      .collect();
    let order: Vec<usize> = (0..entries.len()).collect();
    let root = range_bounding(&entries, &order, 0..order.len());

    let mut builder = TreeBuilder {
      option,
      strategy,
      entries,
      order,
      nodes: Vec::new(),
    };
    builder.subtree(root, 0..builder.order.len(), 0);

    log::trace!(
      "bvh built, {} primitives, {} nodes",
      builder.order.len(),
      builder.nodes.len()
    );

    Self {
      nodes: builder.nodes,
      sorted_primitive_index: builder.order,
    }
  }

  pub fn sorted_primitive_index(&self) -> &[usize] {
    &self.sorted_primitive_index
  }

  pub fn primitive_count(&self) -> usize {
    self.sorted_primitive_index.len()
  }

  pub fn root_bounding(&self) -> B {
    self.nodes[0].bounding
  }

  /// Recompute every node bounding for moved primitives while keeping the tree topology.
  ///
  /// `bounding_of` receives the source primitive index. The result stays a valid bvh for the
  /// new primitive positions, but the partition quality may be worse than a fresh build.
  pub fn refit(&mut self, bounding_of: impl Fn(usize) -> B) {
    // children come after their parent, so a reverse walk sees them first
    for idx in (0..self.nodes.len()).rev() {
      let node = &self.nodes[idx];
      let bounding = match node.children() {
        Some((left, right)) => [self.nodes[left].bounding, self.nodes[right].bounding]
          .into_iter()
          .collect(),
        None => self.sorted_primitive_index[node.primitive_range.clone()]
          .iter()
          .map(|&primitive| bounding_of(primitive))
          .collect(),
      };
      self.nodes[idx].bounding = bounding;
    }
  }

  /// visit leaves in depth first order, `branch_enter_visitor` decides if a subtree is entered.
  pub fn traverse(
    &self,
    mut branch_enter_visitor: impl FnMut(&FlattenBVHNode<B>) -> bool,
    mut leaf_visitor: impl FnMut(&FlattenBVHNode<B>) -> bool,
  ) {
    let mut stack = vec![0];
    while let Some(idx) = stack.pop() {
      let node = &self.nodes[idx];
      if !branch_enter_visitor(node) {
        continue;
      }
      match node.children() {
        Some((left, right)) => {
          stack.push(right);
          stack.push(left);
        }
        None => {
          if !leaf_visitor(node) {
            return;
          }
        }
      }
    }
  }
}
