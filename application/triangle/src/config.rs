use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use strata_ray_tracing::*;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleConfig {
  pub device: NaiveDeviceConfig,
  pub accelerator: AcceleratorConfig,
}

impl SampleConfig {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let source = std::fs::read_to_string(path)
      .with_context(|| format!("failed to read config {}", path.display()))?;
    Self::parse(&source).with_context(|| format!("invalid config {}", path.display()))
  }

  pub fn parse(source: &str) -> anyhow::Result<Self> {
    Ok(toml::from_str(source)?)
  }
}
