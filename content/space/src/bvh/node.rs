use std::ops::Range;

use super::BVHBounding;

#[derive(Clone)]
pub struct FlattenBVHNode<B: BVHBounding> {
  pub bounding: B,
  pub primitive_range: Range<usize>,
  pub self_index: usize,
  pub child: Option<NodeChildren<B>>,
}

#[derive(Clone)]
pub struct NodeChildren<B: BVHBounding> {
  /// node count of the left subtree, the right child is placed right after it.
  pub left_count: usize,
  pub split_axis: B::AxisType,
}

impl<B: BVHBounding> FlattenBVHNode<B> {
  pub(super) fn new(bounding: B, primitive_range: Range<usize>, self_index: usize) -> Self {
    Self {
      bounding,
      primitive_range,
      self_index,
      child: None,
    }
  }

  pub fn is_leaf(&self) -> bool {
    self.child.is_none()
  }

  /// `(left, right)` node indices of a branch.
  pub fn children(&self) -> Option<(usize, usize)> {
    let child = self.child.as_ref()?;
    let left = self.self_index + 1;
    Some((left, left + child.left_count))
  }

  pub fn left_child_offset(&self) -> Option<usize> {
    self.children().map(|(left, _)| left)
  }

  pub fn right_child_offset(&self) -> Option<usize> {
    self.children().map(|(_, right)| right)
  }
}
