//! # arx-render windowing
//!
//! This is the base, abstract crate for windowing common types and functions in arx-render. The
//! `arx-render` crate reconciles renderer state with whatever context it is handed, but it doesn’t
//! give you a way to create that context. Creating a window and an OpenGL context is tightly
//! related to the windowing library you use, so backends (`arx-render-sdl2`, …) live in their own
//! crates and share what is in here.
//!
//! # What’s included
//!
//! - [`WindowDim`]: dimension of a window and its mode (windowed, fullscreen, fullscreen
//!   restricted).
//! - [`WindowOpt`]: hints driving context creation, such as the maximum MSAA level or the number
//!   of texture units a context must at least have.
//! - [`context`]: the context negotiation loop, which retries lower MSAA levels and other profiles
//!   until the windowing library hands out a usable context, and the vsync fallback.
//! - [`Surface`]: the trait every backend implements so that an application is completely
//!   agnostic of the backend.

#![deny(missing_docs)]

pub mod context;

use arx_render::config::{RendererKind, VSync};
use arx_render::driver::Driver;
use arx_render::{Renderer, RendererConfig};

pub use crate::context::{
  negotiate_context, profile_order, set_vsync, ContextAttributes, ContextDescription, ContextError,
  ContextFactory, ContextProfile, ContextRequest, Negotiated,
};

/// Dimension metrics.
///
///   - `Windowed(width, height)` opens in windowed mode with the wished resolution.
///   - `Fullscreen` opens in fullscreen mode by using the primary monitor resolution.
///   - `FullscreenRestricted(width, height)` is a mix between `Windowed(width, height)` and
///     `Fullscreen`. It opens in fullscreen mode by using the wished resolution.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WindowDim {
  /// Windowed mode.
  Windowed(u32, u32),
  /// Fullscreen mode (adapt to your screen).
  Fullscreen,
  /// Fullscreen mode with restricted viewport dimension.
  FullscreenRestricted(u32, u32),
}

impl WindowDim {
  /// Whether the window covers a whole display.
  pub fn is_fullscreen(self) -> bool {
    !matches!(self, WindowDim::Windowed(..))
  }
}

/// Different window options.
///
/// Feel free to look at the different methods available to tweak the options. You may want to start
/// with `default()` though.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WindowOpt {
  max_msaa_level: u32,
  min_texture_units: u32,
  vsync: VSync,
  renderer: RendererKind,
  debug_context: bool,
}

impl Default for WindowOpt {
  /// Defaults:
  ///
  /// - `max_msaa_level` set to `1` (no multisampling).
  /// - `min_texture_units` set to `3`.
  /// - `vsync` set to `VSync::Adaptive`.
  /// - `renderer` set to `RendererKind::Auto`.
  /// - `debug_context` set to `false`.
  fn default() -> Self {
    WindowOpt {
      max_msaa_level: 1,
      min_texture_units: 3,
      vsync: VSync::Adaptive,
      renderer: RendererKind::Auto,
      debug_context: false,
    }
  }
}

impl<'a> From<&'a RendererConfig> for WindowOpt {
  fn from(config: &'a RendererConfig) -> Self {
    let max_msaa_level = if config.antialiasing() {
      config.msaa_level().max(1)
    } else {
      1
    };

    WindowOpt::default()
      .set_max_msaa_level(max_msaa_level)
      .set_vsync(config.vsync())
      .set_renderer(config.renderer())
  }
}

impl WindowOpt {
  /// Highest MSAA level to try first. Default to `1`.
  #[inline]
  pub fn set_max_msaa_level(self, max_msaa_level: u32) -> Self {
    WindowOpt {
      max_msaa_level,
      ..self
    }
  }

  /// Get the highest MSAA level to try.
  #[inline]
  pub fn max_msaa_level(&self) -> u32 {
    self.max_msaa_level
  }

  /// Fixed-function texture units a context must have to be accepted. Default to `3`.
  #[inline]
  pub fn set_min_texture_units(self, min_texture_units: u32) -> Self {
    WindowOpt {
      min_texture_units,
      ..self
    }
  }

  /// Get the minimum number of texture units.
  #[inline]
  pub fn min_texture_units(&self) -> u32 {
    self.min_texture_units
  }

  /// Vertical synchronization. Default to `VSync::Adaptive`.
  #[inline]
  pub fn set_vsync(self, vsync: VSync) -> Self {
    WindowOpt { vsync, ..self }
  }

  /// Get the vertical synchronization mode.
  #[inline]
  pub fn vsync(&self) -> VSync {
    self.vsync
  }

  /// Preferred graphics API flavour. Default to `RendererKind::Auto`.
  #[inline]
  pub fn set_renderer(self, renderer: RendererKind) -> Self {
    WindowOpt { renderer, ..self }
  }

  /// Get the preferred graphics API flavour.
  #[inline]
  pub fn renderer(&self) -> RendererKind {
    self.renderer
  }

  /// Ask for debug contexts first. Default to `false`.
  #[inline]
  pub fn set_debug_context(self, debug_context: bool) -> Self {
    WindowOpt {
      debug_context,
      ..self
    }
  }

  /// Whether debug contexts are requested.
  #[inline]
  pub fn debug_context(&self) -> bool {
    self.debug_context
  }
}

/// Rendering surface.
///
/// A surface owns a window, its graphics context and the [`Renderer`] driving it. Backends forward
/// window resizes to the renderer lifecycle (`before_resize` / `after_resize` and viewport update).
pub trait Surface: Sized {
  /// Driver of the graphics context.
  type Driver: Driver;

  /// Type of events.
  type Event;

  /// Type of surface errors.
  type Error;

  /// Create a surface, negotiate its graphics context and initialize its renderer.
  fn new(
    dim: WindowDim,
    title: &str,
    win_opt: WindowOpt,
    config: RendererConfig,
  ) -> Result<Self, Self::Error>;

  /// Retrieve the options the surface was created with.
  fn opts(&self) -> &WindowOpt;

  /// Renderer of the surface.
  fn renderer(&self) -> &Renderer<Self::Driver>;

  /// Mutable access to the renderer of the surface.
  fn renderer_mut(&mut self) -> &mut Renderer<Self::Driver>;

  /// Change the vertical synchronization mode; returns whether it could be applied.
  fn set_vsync(&mut self, vsync: VSync) -> bool;

  /// Switch to another window mode.
  fn set_dim(&mut self, dim: WindowDim) -> Result<(), Self::Error>;

  /// Size of the surface’s framebuffer.
  fn size(&self) -> [u32; 2];

  /// Width of the surface’s framebuffer.
  ///
  /// # Defaults
  ///
  /// Defaults to `.size()[0]`.
  fn width(&self) -> u32 {
    self.size()[0]
  }

  /// Height of the surface’s framebuffer.
  ///
  /// # Defaults
  ///
  /// Defaults to `.size()[1]`.
  fn height(&self) -> u32 {
    self.size()[1]
  }

  /// Get an iterator over events without blocking if no event is there.
  fn poll_events<'a>(&'a mut self) -> Box<dyn Iterator<Item = Self::Event> + 'a>;

  /// Swap the back and front buffers.
  fn swap_buffers(&mut self);
}
