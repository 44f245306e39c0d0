mod probe;
mod scene;

use arx_render::alpha_cutout::AlphaCutoutAA;
use arx_render::config::{RendererKind, VSync};
use arx_render::RendererConfig;
use std::process;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "arx-render-demo")]
pub struct CLIOpts {
  #[structopt(flatten)]
  renderer: RendererOpts,

  #[structopt(subcommand)]
  command: Command,
}

#[derive(Debug, StructOpt)]
pub struct RendererOpts {
  #[structopt(long, default_value = "auto")]
  /// Graphics API: auto, OpenGL or OpenGL ES.
  renderer: RendererKind,

  #[structopt(long, default_value = "8")]
  /// Highest MSAA level to try.
  msaa: u32,

  #[structopt(long)]
  /// Disable multisampling.
  no_antialiasing: bool,

  #[structopt(long, default_value = "adaptive")]
  /// Vertical synchronization: adaptive, on or off.
  vsync: VSync,

  #[structopt(long, default_value = "")]
  /// Vertex buffer upload method (persistent-orphan, maprange, shadow, …).
  buffer_upload: String,

  #[structopt(long, default_value = "")]
  /// Extension overrides, e.g. "-GL_ARB_buffer_storage +GL_ARB_sample_shading" or "1.4".
  extensions: String,

  #[structopt(long, default_value = "9999")]
  /// Maximum anisotropic filtering.
  max_anisotropy: f32,

  #[structopt(long, default_value = "2")]
  /// Alpha cutout antialiasing: 0 (none), 1 (fuzzy) or 2 (crisp).
  alpha_cutout_aa: i32,
}

impl RendererOpts {
  fn config(&self) -> RendererConfig {
    RendererConfig::default()
      .set_renderer(self.renderer)
      .set_msaa_level(self.msaa)
      .set_antialiasing(!self.no_antialiasing)
      .set_vsync(self.vsync)
      .set_buffer_upload(self.buffer_upload.as_str())
      .set_runtime_extension_overrides(self.extensions.as_str())
      .set_max_anisotropy(self.max_anisotropy)
      .set_alpha_cutout_aa(AlphaCutoutAA::from_level(self.alpha_cutout_aa))
  }
}

#[derive(Debug, StructOpt)]
pub enum Command {
  /// Report what the renderer would do on a scripted context, without a GPU.
  Probe(probe::ProbeOpts),

  /// Open a window and render a test scene.
  Run(scene::SceneOpts),
}

fn main() {
  env_logger::builder()
    .filter_level(log::LevelFilter::Info)
    .parse_default_env()
    .init();
  let cli_opts = CLIOpts::from_args();
  let config = cli_opts.renderer.config();

  let result = match cli_opts.command {
    Command::Probe(opts) => {
      probe::run(&opts, config);
      Ok(())
    }
    Command::Run(opts) => scene::run(&opts, config),
  };

  if let Err(e) = result {
    log::error!("{}", e);
    process::exit(1);
  }
}
