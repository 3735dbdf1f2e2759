use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use strata_ray_tracing::*;

mod config;
mod image;
mod scene;

use config::*;
use scene::*;


/// Trace the single triangle sample scene on the software device and write it as a ppm image.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  #[arg(long, default_value_t = 256)]
  width: u32,
  #[arg(long, default_value_t = 256)]
  height: u32,
  #[arg(short, long, default_value = "triangle.ppm")]
  output: PathBuf,
  /// toml file with optional `[device]` and `[accelerator]` sections
  #[arg(short, long)]
  config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
  env_logger::builder().init();

  let args = Args::parse();
  let config = match &args.config {
    Some(path) => SampleConfig::load(path)?,
    None => SampleConfig::default(),
  };
  log::info!("sample config {config:?}");

  let device = NaiveDevice::new(config.device).context("failed to create the naive device")?;
  let accelerator = TwoLevelAccelerator::new(Arc::new(device), config.accelerator);

  let scene = TriangleScene::new(&accelerator).context("failed to build the scene")?;
  let image = scene
    .render(&accelerator, args.width, args.height)
    .context("failed to trace the scene")?;
  log::info!(
    "{} of {} pixels covered",
    image.covered_pixel_count(),
    image.pixels.len()
  );

  image
    .save_ppm(&args.output)
    .with_context(|| format!("failed to write {}", args.output.display()))?;
  log::info!("image written to {}", args.output.display());
  Ok(())
}
