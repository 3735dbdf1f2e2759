use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceleratorConfig {
  /// used by [`TwoLevelAccelerator::build_bottom_level_default`]
  pub default_hint: BuildHint,
  /// keep scratch buffers of completed builds for later builds
  pub scratch_reuse: bool,
  /// wait forever if not set
  pub fence_timeout_ms: Option<u64>,
}

impl Default for AcceleratorConfig {
  fn default() -> Self {
    Self {
      default_hint: BuildHint::FastTrace,
      scratch_reuse: true,
      fence_timeout_ms: None,
    }
  }
}

impl AcceleratorConfig {
  pub fn fence_timeout(&self) -> Option<Duration> {
    self.fence_timeout_ms.map(Duration::from_millis)
  }
}
