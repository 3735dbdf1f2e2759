use glam::Vec3;
use strata_geometry::*;
use strata_ray_tracing::*;

use crate::image::*;

pub const BACKGROUND: Rgb = [25, 25, 38];

/// half height of the orthographic view in world units
const VIEW_EXTENT: f32 = 1.5;

pub fn triangle_geometry() -> MeshGeometry {
  MeshGeometry::new(vec![
    Vec3::new(1., 1., 0.),
    Vec3::new(-1., 1., 0.),
    Vec3::new(0., -1., 0.),
  ])
}

fn to_rgb(color: Vec3) -> Rgb {
  let c = (color.clamp(Vec3::ZERO, Vec3::ONE) * 255. + 0.5).to_array();
  [c[0] as u8, c[1] as u8, c[2] as u8]
}

/// One triangle, placed once with the identity transform.
pub struct TriangleScene {
  _blas: Blas,
  tlas: Tlas,
}

impl TriangleScene {
  pub fn new(accelerator: &TwoLevelAccelerator) -> AccelerationStructureResult<Self> {
    let blas = accelerator.build_bottom_level_default(&[triangle_geometry()])?;
    let instances = accelerator.assemble_instances(&[InstancePlacement::new(
      blas.handle(),
      Transform3x4::IDENTITY,
    )])?;
    let tlas = accelerator.build_top_level(&instances, Default::default())?;
    Ok(Self { _blas: blas, tlas })
  }

  /// One ray along -Z per pixel through an orthographic camera centered on the triangle.
  ///
  /// Covered pixels are shaded with the barycentric weights of the hit, the others with the
  /// background color.
  pub fn render(
    &self,
    accelerator: &TwoLevelAccelerator,
    width: u32,
    height: u32,
  ) -> AccelerationStructureResult<Image> {
    let mut builder = RayTracingPipelineBuilder::<Vec3, Rgb>::default();

    let aspect = width as f32 / height.max(1) as f32;
    let ray_gen = builder.register_ray_gen(move |ctx| {
      let id = ctx.launch_id;
      let size = ctx.launch_size;
      let u = (id.x as f32 + 0.5) / size.x as f32 * 2. - 1.;
      let v = 1. - (id.y as f32 + 0.5) / size.y as f32 * 2.;
      let origin = Vec3::new(u * VIEW_EXTENT * aspect, v * VIEW_EXTENT, 1.);

      let call = TraceRayCall::new(
        Ray3::new(origin, Vec3::new(0., 0., -1.)),
        RayRange::new(0.001, 10.),
      );
      let mut color = Vec3::ZERO;
      ctx.trace_ray(&call, &mut color);
      to_rgb(color)
    });
    let closest_hit = builder.register_ray_closest_hit(|_, hit, color| {
      let uv = hit.barycentric;
      *color = Vec3::new(1. - uv.x - uv.y, uv.x, uv.y);
    });
    let miss = builder.register_ray_miss(|_, _, color| {
      *color = Vec3::from_array(BACKGROUND.map(|c| c as f32 / 255.));
    });
    let pipeline = accelerator.create_pipeline(builder, 1)?;

    let mut sbt = ShaderBindingTable::new(1, 1);
    sbt
      .config_ray_generation(ray_gen)
      .config_missing(0, miss)
      .config_hit_group(
        0,
        HitGroupShaderRecord {
          closest_hit: Some(closest_hit),
          any_hit: None,
        },
      );

    let output = accelerator.trace_rays(&self.tlas, &pipeline, &sbt, (width, height, 1))?;
    Ok(Image {
      width,
      height,
      pixels: output.into_vec(),
      background: BACKGROUND,
    })
  }
}
