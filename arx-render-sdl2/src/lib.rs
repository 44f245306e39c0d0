//! [SDL2](https://crates.io/crates/sdl2) backend for arx-render and arx-render-windowing.
//!
//! [`Sdl2Surface`] creates the window and its OpenGL context through the negotiation loop of
//! `arx-render-windowing`, loads the OpenGL driver, initializes a [`Renderer`] on top of it and
//! forwards window resizes to the renderer lifecycle.

#![deny(missing_docs)]

use arx_render::config::VSync;
use arx_render::driver::Driver;
use arx_render::gl_info::ContextProbe;
use arx_render::{Rect, Renderer, RendererConfig};
pub use arx_render_gl::GLDriverError;
use arx_render_gl::GLDriver;
use arx_render_windowing::{
  negotiate_context, set_vsync, ContextAttributes, ContextDescription, ContextError,
  ContextFactory, ContextProfile, ContextRequest, Surface, WindowDim, WindowOpt,
};
use log::{info, warn};
pub use sdl2;
use sdl2::event::{Event, WindowEvent};
use sdl2::video::{FullscreenType, GLContext, GLProfile, Window, WindowBuildError};
use sdl2::{EventPump, Sdl, VideoSubsystem};
use std::error;
use std::fmt;
use std::os::raw::c_void;

/// Error that can be risen while creating a surface.
#[non_exhaustive]
#[derive(Debug)]
pub enum Sdl2SurfaceError {
  /// Initialization of the surface went wrong.
  InitError(String),
  /// No available video mode.
  VideoInitError(String),
  /// No usable OpenGL context could be negotiated.
  ContextError(ContextError),
  /// Switching the window mode failed.
  ModeChangeFailed(String),
}

impl fmt::Display for Sdl2SurfaceError {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    match *self {
      Sdl2SurfaceError::InitError(ref e) => write!(f, "initialization error: {}", e),
      Sdl2SurfaceError::VideoInitError(ref e) => {
        write!(f, "failed to initialize video system: {}", e)
      }
      Sdl2SurfaceError::ContextError(ref e) => write!(f, "failed to create OpenGL context: {}", e),
      Sdl2SurfaceError::ModeChangeFailed(ref e) => write!(f, "failed to change window mode: {}", e),
    }
  }
}

impl From<ContextError> for Sdl2SurfaceError {
  fn from(e: ContextError) -> Self {
    Sdl2SurfaceError::ContextError(e)
  }
}

impl error::Error for Sdl2SurfaceError {
  fn source(&self) -> Option<&(dyn error::Error + 'static)> {
    match self {
      Sdl2SurfaceError::ContextError(e) => Some(e),
      _ => None,
    }
  }
}

// Failure of a single creation attempt.
#[derive(Debug)]
enum AttemptError {
  Window(WindowBuildError),
  Context(String),
  Driver(GLDriverError),
}

impl fmt::Display for AttemptError {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    match *self {
      AttemptError::Window(ref e) => write!(f, "could not create window: {}", e),
      AttemptError::Context(ref e) => write!(f, "could not create context: {}", e),
      AttemptError::Driver(ref e) => write!(f, "could not load driver: {}", e),
    }
  }
}

// Fields drop in order: the driver goes before its context, the context before its window.
struct Sdl2Context {
  driver: GLDriver,
  gl_context: GLContext,
  window: Window,
}

struct Sdl2ContextFactory<'a> {
  video: &'a VideoSubsystem,
  title: &'a str,
  dim: WindowDim,
}

impl<'a> Sdl2ContextFactory<'a> {
  fn window_size(&self) -> (u32, u32) {
    match self.dim {
      WindowDim::Windowed(w, h) | WindowDim::FullscreenRestricted(w, h) => (w, h),
      WindowDim::Fullscreen => self
        .video
        .desktop_display_mode(0)
        .map(|mode| (mode.w.max(1) as u32, mode.h.max(1) as u32))
        .unwrap_or((640, 480)),
    }
  }
}

impl<'a> ContextFactory for Sdl2ContextFactory<'a> {
  type Context = Sdl2Context;
  type Error = AttemptError;

  fn create(
    &mut self,
    request: ContextRequest,
    attributes: &ContextAttributes,
  ) -> Result<Sdl2Context, AttemptError> {
    let gl_attr = self.video.gl_attr();

    if request.debug {
      gl_attr.set_context_flags().debug().set();
    } else {
      gl_attr.set_context_flags().set();
    }

    match request.profile {
      ContextProfile::Desktop => {
        gl_attr.set_context_profile(GLProfile::Compatibility);
        gl_attr.set_context_version(1, 5);
      }
      ContextProfile::Es => {
        gl_attr.set_context_profile(GLProfile::GLES);
        gl_attr.set_context_version(1, 0);
      }
    }

    gl_attr.set_multisample_buffers(attributes.multisample_buffers as u8);
    gl_attr.set_multisample_samples(attributes.multisample_samples as u8);
    gl_attr.set_depth_size(attributes.depth_size);
    gl_attr.set_red_size(attributes.color_size[0]);
    gl_attr.set_green_size(attributes.color_size[1]);
    gl_attr.set_blue_size(attributes.color_size[2]);

    let (width, height) = self.window_size();
    let mut builder = self.video.window(self.title, width, height);
    builder.opengl().resizable().hidden();

    match self.dim {
      WindowDim::Windowed(..) => (),
      WindowDim::Fullscreen => {
        builder.fullscreen_desktop();
      }
      WindowDim::FullscreenRestricted(..) => {
        builder.fullscreen();
      }
    }

    let window = builder.build().map_err(AttemptError::Window)?;
    let gl_context = window.gl_create_context().map_err(AttemptError::Context)?;

    let video = self.video;
    let driver = GLDriver::load_with(|s| video.gl_get_proc_address(s) as *const c_void)
      .map_err(AttemptError::Driver)?;

    Ok(Sdl2Context {
      driver,
      gl_context,
      window,
    })
  }

  fn granted_samples(&self, _: &Sdl2Context) -> (u32, u32) {
    let gl_attr = self.video.gl_attr();
    (
      gl_attr.multisample_buffers() as u32,
      gl_attr.multisample_samples() as u32,
    )
  }

  fn texture_units(&self, context: &Sdl2Context) -> u32 {
    context.driver.max_texture_units() as u32
  }

  fn describe(&self, context: &Sdl2Context) -> ContextDescription {
    let driver = &context.driver;

    ContextDescription {
      version: driver
        .version_string()
        .map(|v| v.trim_start_matches("OpenGL ").to_owned()),
      vendor: driver.vendor(),
      renderer: driver.renderer(),
    }
  }
}

/// An arx-render surface backed by SDL2 and an OpenGL compatibility (or ES 1.x) context.
///
/// ```ignore
/// use arx_render::RendererConfig;
/// use arx_render_sdl2::Sdl2Surface;
/// use arx_render_windowing::{Surface, WindowDim, WindowOpt};
///
/// let config = RendererConfig::default().set_msaa_level(8);
/// let surface = Sdl2Surface::new(
///   WindowDim::Windowed(1024, 768),
///   "Arx",
///   WindowOpt::from(&config),
///   config,
/// )
/// .expect("failed to create surface");
/// ```
pub struct Sdl2Surface {
  // the renderer owns the driver, which must go before the context
  renderer: Renderer<GLDriver>,
  _gl_context: GLContext,
  window: Window,
  event_pump: EventPump,
  video: VideoSubsystem,
  sdl: Sdl,
  opts: WindowOpt,
  dim: WindowDim,
  size: [u32; 2],
}

impl Sdl2Surface {
  /// The entry point to most of the SDL2 API.
  pub fn sdl(&self) -> &Sdl {
    &self.sdl
  }

  /// Borrow the underlying SDL2 window of this surface.
  pub fn window(&self) -> &Window {
    &self.window
  }

  /// Current window mode.
  pub fn dim(&self) -> WindowDim {
    self.dim
  }

  // Read the window size back and forward a change to the renderer.
  fn update_size(&mut self, force: bool) {
    let (width, height) = self.window.size();
    let size = [width, height];

    if force || size != self.size {
      self.size = size;
      self.renderer.set_window_size(width, height);
      self.renderer.after_resize();
      self
        .renderer
        .set_viewport(Rect::new(0, 0, width as i32, height as i32));
    }
  }
}

impl Surface for Sdl2Surface {
  type Driver = GLDriver;
  type Event = Event;
  type Error = Sdl2SurfaceError;

  fn new(
    dim: WindowDim,
    title: &str,
    win_opt: WindowOpt,
    config: RendererConfig,
  ) -> Result<Self, Self::Error> {
    let sdl = sdl2::init().map_err(Sdl2SurfaceError::InitError)?;
    let video = sdl.video().map_err(Sdl2SurfaceError::VideoInitError)?;

    let gl_attr = video.gl_attr();
    gl_attr.set_double_buffer(true);

    // prevent software fallbacks
    #[cfg(windows)]
    gl_attr.set_accelerated_visual(true);

    let mut factory = Sdl2ContextFactory {
      video: &video,
      title,
      dim,
    };

    let mut failure = ContextError::NoRequest;
    let mut negotiated = None;

    for request in ContextRequest::sequence(win_opt.renderer(), win_opt.debug_context()) {
      match negotiate_context(
        &mut factory,
        request,
        win_opt.max_msaa_level(),
        win_opt.min_texture_units(),
      ) {
        Ok(n) => {
          negotiated = Some(n);
          break;
        }
        Err(e) => failure = e,
      }
    }

    let negotiated = negotiated.ok_or(failure)?;
    let Sdl2Context {
      driver,
      gl_context,
      window,
    } = negotiated.context;

    info!(
      "Window: r:{} g:{} b:{} a:{} depth:{} aa:{}x doublebuffer:{}",
      gl_attr.red_size(),
      gl_attr.green_size(),
      gl_attr.blue_size(),
      gl_attr.alpha_size(),
      gl_attr.depth_size(),
      negotiated.samples,
      gl_attr.double_buffer()
    );

    let mut opts = win_opt;
    match set_vsync(win_opt.vsync(), |i| video.gl_set_swap_interval(i).is_ok()) {
      Some(vsync) => opts = opts.set_vsync(vsync),
      None => warn!("could not set vsync mode {:?}", win_opt.vsync()),
    }

    let event_pump = sdl.event_pump().map_err(Sdl2SurfaceError::InitError)?;

    let mut window = window;
    window.show();
    sdl.mouse().show_cursor(false);

    let mut renderer = Renderer::new(driver, config);
    renderer.initialize();

    let mut surface = Sdl2Surface {
      renderer,
      _gl_context: gl_context,
      window,
      event_pump,
      video,
      sdl,
      opts,
      dim,
      size: [0, 0],
    };

    surface.update_size(true);

    Ok(surface)
  }

  fn opts(&self) -> &WindowOpt {
    &self.opts
  }

  fn renderer(&self) -> &Renderer<GLDriver> {
    &self.renderer
  }

  fn renderer_mut(&mut self) -> &mut Renderer<GLDriver> {
    &mut self.renderer
  }

  fn set_vsync(&mut self, vsync: VSync) -> bool {
    let video = &self.video;

    match set_vsync(vsync, |i| video.gl_set_swap_interval(i).is_ok()) {
      Some(applied) => {
        self.opts = self.opts.set_vsync(applied);
        true
      }
      None => false,
    }
  }

  fn set_dim(&mut self, dim: WindowDim) -> Result<(), Self::Error> {
    if dim == self.dim {
      return Ok(());
    }

    let was_fullscreen = self.dim.is_fullscreen();
    self
      .renderer
      .before_resize(was_fullscreen || dim.is_fullscreen());

    let result = match dim {
      WindowDim::Windowed(w, h) => self
        .window
        .set_fullscreen(FullscreenType::Off)
        .and_then(|_| {
          if was_fullscreen {
            self.window.restore();
          }
          self.window.set_size(w, h).map_err(|e| e.to_string())
        }),
      WindowDim::Fullscreen => self.window.set_fullscreen(FullscreenType::Desktop),
      WindowDim::FullscreenRestricted(w, h) => self
        .window
        .set_size(w, h)
        .map_err(|e| e.to_string())
        .and_then(|_| self.window.set_fullscreen(FullscreenType::True)),
    };

    // the renderer may have shut down; bring it back whatever happened
    self.update_size(true);
    result.map_err(Sdl2SurfaceError::ModeChangeFailed)?;

    self.dim = dim;
    Ok(())
  }

  fn size(&self) -> [u32; 2] {
    self.size
  }

  fn poll_events<'a>(&'a mut self) -> Box<dyn Iterator<Item = Self::Event> + 'a> {
    let events: Vec<Event> = self.event_pump.poll_iter().collect();

    // SDL sends size changes when a fullscreen window gets minimized; those are handled by
    // mode changes instead
    if !self.dim.is_fullscreen() {
      let resized = events.iter().any(|event| {
        matches!(
          event,
          Event::Window {
            win_event: WindowEvent::SizeChanged(..),
            ..
          }
        )
      });

      if resized {
        self.update_size(false);
      }
    }

    Box::new(events.into_iter())
  }

  fn swap_buffers(&mut self) {
    self.window.gl_swap_window();
  }
}
