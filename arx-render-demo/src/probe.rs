//! Capability report on a scripted context.

use arx_render::buffer::BufferUsage;
use arx_render::driver::headless::{HeadlessContext, HeadlessDriver};
use arx_render::features::Feature;
use arx_render::vertex::TexturedVertex;
use arx_render::{Renderer, RendererConfig};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
pub struct ProbeOpts {
  #[structopt(long = "gl-version", default_value = "4.6.0")]
  /// Version string reported by the context.
  version: String,

  #[structopt(long, default_value = "arx")]
  /// Vendor string reported by the context.
  vendor: String,

  #[structopt(long, default_value = "headless")]
  /// Device string reported by the context.
  device: String,

  #[structopt(short, long = "extension")]
  /// Extension reported by the context; repeat for several.
  extensions: Vec<String>,

  #[structopt(long, default_value = "0")]
  /// Samples per pixel of the default framebuffer.
  samples: u32,

  #[structopt(long, default_value = "4")]
  /// Fixed-function texture units.
  texture_units: usize,
}

pub fn run(opts: &ProbeOpts, config: RendererConfig) {
  let context = HeadlessContext::default()
    .set_version(opts.version.clone())
    .set_vendor(opts.vendor.as_str())
    .set_renderer(opts.device.as_str())
    .set_extensions(opts.extensions.iter().map(String::as_str))
    .set_samples(opts.samples)
    .set_max_texture_units(opts.texture_units);

  let mut renderer = Renderer::new(HeadlessDriver::new(context), config);
  renderer.initialize();

  if let Some(info) = renderer.info() {
    println!(
      "context: {} ({}, {})",
      info.version_string(),
      info.vendor(),
      info.renderer()
    );

    if !info.overrides().is_empty() {
      println!("overrides: {}", info.overrides().join(" "));
    }
  }

  println!("msaa: {}x", renderer.msaa_level().max(1));
  println!("texture stages: {}", renderer.texture_stage_count());
  println!("max anisotropy: {}", renderer.max_supported_anisotropy());
  println!(
    "alpha cutout antialiasing: {:?}",
    renderer.max_supported_alpha_cutout_aa()
  );

  println!("features:");
  for feature in Feature::ALL.iter() {
    let mark = if renderer.has(*feature) { 'x' } else { ' ' };
    println!("  [{}] {}", mark, feature);
  }

  println!("vertex buffers:");
  for (name, usage) in [
    ("static", BufferUsage::Static),
    ("dynamic", BufferUsage::Dynamic),
    ("stream", BufferUsage::Stream),
  ] {
    match renderer.create_vertex_buffer::<TexturedVertex>(64, usage) {
      Ok(buffer) => println!("  {}: {} ({:?})", name, buffer.strategy(), buffer.usage()),
      Err(e) => println!("  {}: {}", name, e),
    }
  }
}
