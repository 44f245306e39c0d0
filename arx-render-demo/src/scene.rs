//! Test scene: an opaque checkerboard quad and a spinning alpha-cutout quad over it.

use arx_render::blending::Factor;
use arx_render::buffer::{BufferUsage, WriteFlags};
use arx_render::driver::{ClearBuffers, Primitive};
use arx_render::image::{Image, PixelFormat};
use arx_render::render_state::RenderState;
use arx_render::texture::TextureFlags;
use arx_render::texture_stage::TextureOp;
use arx_render::vertex::TexturedVertex;
use arx_render::RendererConfig;
use arx_render_sdl2::sdl2::event::Event;
use arx_render_sdl2::sdl2::keyboard::Keycode;
use arx_render_sdl2::Sdl2Surface;
use arx_render_windowing::{Surface, WindowDim, WindowOpt};
use log::{info, warn};
use std::error::Error;
use std::time::Instant;
use structopt::StructOpt;

const TEXTURE_SIZE: usize = 64;

#[derive(Debug, StructOpt)]
pub struct SceneOpts {
  #[structopt(long)]
  /// Start in fullscreen mode.
  fullscreen: bool,

  #[structopt(long, default_value = "1024")]
  width: u32,

  #[structopt(long, default_value = "768")]
  height: u32,

  #[structopt(long)]
  /// Quit after that many frames.
  frames: Option<u64>,
}

pub fn run(opts: &SceneOpts, config: RendererConfig) -> Result<(), Box<dyn Error>> {
  let windowed = WindowDim::Windowed(opts.width, opts.height);
  let dim = if opts.fullscreen {
    WindowDim::Fullscreen
  } else {
    windowed
  };

  let win_opt = WindowOpt::from(&config);
  let mut surface = Sdl2Surface::new(dim, "arx-render demo", win_opt, config)?;

  let renderer = surface.renderer_mut();
  let checker = renderer.create_texture(
    checkerboard(),
    TextureFlags {
      mipmaps: true,
      ..TextureFlags::default()
    },
  );
  let disc = renderer.create_texture(disc(), TextureFlags::default());
  let mut quads = renderer.create_vertex_buffer::<TexturedVertex>(8, BufferUsage::Dynamic)?;
  info!("quads use the {} upload method", quads.strategy());

  let start = Instant::now();
  let mut frame = 0;

  'app: loop {
    let mut toggle_fullscreen = false;

    for event in surface.poll_events() {
      match event {
        Event::Quit { .. }
        | Event::KeyDown {
          keycode: Some(Keycode::Escape),
          ..
        } => break 'app,

        Event::KeyDown {
          keycode: Some(Keycode::F11),
          ..
        } => toggle_fullscreen = true,

        _ => (),
      }
    }

    if toggle_fullscreen {
      let dim = if surface.dim().is_fullscreen() {
        windowed
      } else {
        WindowDim::Fullscreen
      };

      if let Err(e) = surface.set_dim(dim) {
        warn!("{}", e);
      }
    }

    let [width, height] = surface.size();
    let vertices = quad_pair(width as f32, height as f32, start.elapsed().as_secs_f32());

    let renderer = surface.renderer_mut();
    renderer.clear(ClearBuffers::ALL, [0.1, 0.1, 0.15, 1.], 1., &[]);
    renderer.set_buffer_data(&mut quads, &vertices, 0, WriteFlags::DISCARD)?;
    renderer.disable_transform();
    renderer.set_color_op(0, TextureOp::Modulate);

    renderer.set_render_state(RenderState::default().set_opaque());
    renderer.set_texture(0, Some(&checker));
    renderer.draw(&quads, Primitive::TriangleStrip, 0, 4);

    renderer.set_render_state(
      RenderState::default()
        .set_blend(Factor::SrcAlpha, Factor::SrcAlphaComplement)
        .set_alpha_cutout(true),
    );
    renderer.set_texture(0, Some(&disc));
    renderer.draw(&quads, Primitive::TriangleStrip, 4, 4);

    surface.swap_buffers();

    frame += 1;
    if opts.frames.map_or(false, |frames| frame >= frames) {
      break;
    }
  }

  info!("rendered {} frames", frame);

  Ok(())
}

fn quad(center: (f32, f32), half: f32, angle: f32, color: [u8; 4]) -> [TexturedVertex; 4] {
  let (sin, cos) = angle.sin_cos();
  let corner = |x: f32, y: f32, u: f32, v: f32| TexturedVertex {
    p: [
      center.0 + (x * cos - y * sin) * half,
      center.1 + (x * sin + y * cos) * half,
      0.5,
    ],
    w: 1.,
    color,
    uv: [u, v],
  };

  [
    corner(-1., -1., 0., 0.),
    corner(1., -1., 1., 0.),
    corner(-1., 1., 0., 1.),
    corner(1., 1., 1., 1.),
  ]
}

fn quad_pair(width: f32, height: f32, t: f32) -> Vec<TexturedVertex> {
  let center = (width * 0.5, height * 0.5);
  let half = width.min(height) * 0.4;

  let mut vertices = Vec::with_capacity(8);
  vertices.extend_from_slice(&quad(center, half, 0., [255; 4]));
  vertices.extend_from_slice(&quad(center, half * 0.6, t, [255, 200, 120, 255]));
  vertices
}

fn checkerboard() -> Image {
  let mut image = Image::new(TEXTURE_SIZE, TEXTURE_SIZE, PixelFormat::Rgba8);

  for (i, texel) in image.data_mut().chunks_mut(4).enumerate() {
    let (x, y) = (i % TEXTURE_SIZE, i / TEXTURE_SIZE);
    let light = (x / 8 + y / 8) % 2 == 0;
    let c = if light { 200 } else { 60 };
    texel.copy_from_slice(&[c, c, c, 255]);
  }

  image
}

// White disc on a transparent background.
fn disc() -> Image {
  let mut image = Image::new(TEXTURE_SIZE, TEXTURE_SIZE, PixelFormat::Rgba8);
  let radius = TEXTURE_SIZE as f32 * 0.5;

  for (i, texel) in image.data_mut().chunks_mut(4).enumerate() {
    let x = (i % TEXTURE_SIZE) as f32 + 0.5 - radius;
    let y = (i / TEXTURE_SIZE) as f32 + 0.5 - radius;
    let alpha = if x * x + y * y <= radius * radius { 255 } else { 0 };
    texel.copy_from_slice(&[255, 255, 255, alpha]);
  }

  image
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn disc_is_cut_out() {
    let image = disc();

    assert_eq!(image.pixel(0, 0)[3], 0);
    assert_eq!(image.pixel(TEXTURE_SIZE / 2, TEXTURE_SIZE / 2)[3], 255);
  }

  #[test]
  fn quads_fit_the_window() {
    let vertices = quad_pair(800., 600., 0.);

    assert_eq!(vertices.len(), 8);
    for v in &vertices {
      assert!(v.p[0] >= 0. && v.p[0] <= 800.);
      assert!(v.p[1] >= 0. && v.p[1] <= 600.);
    }
  }
}
