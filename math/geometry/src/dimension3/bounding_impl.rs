use crate::*;

impl SpaceBounding<Box3> for Triangle {
  #[inline(always)]
  fn to_bounding(&self) -> Box3 {
    self.points().into_iter().collect()
  }
}
