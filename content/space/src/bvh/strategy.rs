use std::ops::Range;

use super::BVHBounding;
use crate::utils::{range_bounding, BuildEntry};

/// How a node divides its primitives between two children.
#[derive(Clone, Copy)]
pub struct NodeSplit<B: BVHBounding> {
  pub axis: B::AxisType,
  /// `range.start..middle` goes to the left child, `middle..range.end` to the right
  pub middle: usize,
  pub left: B,
  pub right: B,
}

pub trait BVHBuildStrategy<B: BVHBounding> {
  /// Reorder `order[range]` so it divides in two non empty halves.
  ///
  /// Return None to keep the node a leaf.
  fn split(
    &mut self,
    bounding: &B,
    range: Range<usize>,
    entries: &[BuildEntry<B>],
    order: &mut [usize],
  ) -> Option<NodeSplit<B>>;
}

/// Median split on the longest axis, every level halves the primitive count.
pub struct BalanceTree;

impl<B: BVHBounding> BVHBuildStrategy<B> for BalanceTree {
  fn split(
    &mut self,
    bounding: &B,
    range: Range<usize>,
    entries: &[BuildEntry<B>],
    order: &mut [usize],
  ) -> Option<NodeSplit<B>> {
    if range.len() < 2 {
      return None;
    }
    let axis = bounding.partition_axis();
    let half = range.len() / 2;
    order[range.clone()].select_nth_unstable_by(half, |&a, &b| {
      let a = B::axis_value(entries[a].centroid, axis);
      let b = B::axis_value(entries[b].centroid, axis);
      a.total_cmp(&b)
    });

    let middle = range.start + half;
    Some(NodeSplit {
      axis,
      middle,
      left: range_bounding(entries, order, range.start..middle),
      right: range_bounding(entries, order, middle..range.end),
    })
  }
}

pub trait SAHBounding: BVHBounding {
  /// proportional to the probability that a random ray hits the bounding
  fn surface_heuristic(&self) -> f32;
  fn empty() -> Self;
  fn merge(&mut self, other: Self);
}

#[derive(Clone, Copy)]
struct Bin<B> {
  bounding: B,
  count: usize,
}

impl<B: SAHBounding> Bin<B> {
  fn empty() -> Self {
    Self {
      bounding: B::empty(),
      count: 0,
    }
  }

  fn add(&mut self, other: &Self) {
    self.bounding.merge(other.bounding);
    self.count += other.count;
  }

  fn cost(&self) -> f32 {
    self.bounding.surface_heuristic() * self.count as f32
  }
}

/// Maps a centroid coordinate to one of `bin_count` equal slices of `lo..hi`.
#[derive(Clone, Copy)]
struct Binning {
  lo: f32,
  scale: f32,
  last: usize,
}

impl Binning {
  fn new(lo: f32, hi: f32, bin_count: usize) -> Self {
    Self {
      lo,
      scale: bin_count as f32 / (hi - lo),
      last: bin_count - 1,
    }
  }

  /// non finite values saturate into the first bin
  fn bin_of(&self, value: f32) -> usize {
    (((value - self.lo) * self.scale) as usize).min(self.last)
  }
}

/// Binned surface area heuristic over the centroid extent of each node.
///
/// Falls back to [`BalanceTree`] when every centroid lands in one bin.
pub struct SAH<B: SAHBounding> {
  bins: Vec<Bin<B>>,
  /// `suffix[i]` merges bins `i..`
  suffix: Vec<Bin<B>>,
}

impl<B: SAHBounding> SAH<B> {
  pub fn new(bin_count: usize) -> Self {
    let bin_count = bin_count.max(2);
    Self {
      bins: vec![Bin::empty(); bin_count],
      suffix: vec![Bin::empty(); bin_count],
    }
  }

  /// the bin boundary with the lowest cost, as (last left bin, left, right)
  fn best_boundary(&mut self) -> Option<(usize, Bin<B>, Bin<B>)> {
    let bin_count = self.bins.len();
    let mut acc = Bin::empty();
    for i in (0..bin_count).rev() {
      acc.add(&self.bins[i]);
      self.suffix[i] = acc;
    }

    let mut left = Bin::empty();
    let mut best = None;
    let mut best_cost = f32::INFINITY;
    for boundary in 0..bin_count - 1 {
      left.add(&self.bins[boundary]);
      let right = self.suffix[boundary + 1];
      if left.count == 0 || right.count == 0 {
        continue;
      }
      let cost = left.cost() + right.cost();
      if cost < best_cost {
        best_cost = cost;
        best = Some((boundary, left, right));
      }
    }
    best
  }
}

impl<B: SAHBounding> BVHBuildStrategy<B> for SAH<B> {
  fn split(
    &mut self,
    bounding: &B,
    range: Range<usize>,
    entries: &[BuildEntry<B>],
    order: &mut [usize],
  ) -> Option<NodeSplit<B>> {
    if range.len() < 2 {
      return None;
    }
    let axis = bounding.partition_axis();
    let slice = &mut order[range.clone()];

    let (lo, hi) = slice.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &i| {
      let v = B::axis_value(entries[i].centroid, axis);
      (lo.min(v), hi.max(v))
    });
    // overlapped centroids, binning can not separate them
    if hi <= lo {
      return BalanceTree.split(bounding, range, entries, order);
    }
    let binning = Binning::new(lo, hi, self.bins.len());

    self.bins.fill(Bin::empty());
    for &i in slice.iter() {
      let bin = &mut self.bins[binning.bin_of(B::axis_value(entries[i].centroid, axis))];
      bin.bounding.merge(entries[i].bounding);
      bin.count += 1;
    }

    let Some((boundary, left, right)) = self.best_boundary() else {
      return BalanceTree.split(bounding, range, entries, order);
    };

    let mut cursor = 0;
    for i in 0..slice.len() {
      if binning.bin_of(B::axis_value(entries[slice[i]].centroid, axis)) <= boundary {
        slice.swap(i, cursor);
        cursor += 1;
      }
    }
    debug_assert_eq!(cursor, left.count);

    Some(NodeSplit {
      axis,
      middle: range.start + cursor,
      left: left.bounding,
      right: right.bounding,
    })
  }
}
