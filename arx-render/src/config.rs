//! Renderer configuration.

use std::fmt;
use std::str::FromStr;

use crate::alpha_cutout::AlphaCutoutAA;

/// Requested graphics API flavour.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RendererKind {
  /// Desktop OpenGL if possible, OpenGL ES otherwise.
  Auto,
  /// Desktop OpenGL, compatibility profile.
  OpenGL,
  /// OpenGL ES 1.x.
  OpenGLES,
}

impl fmt::Display for RendererKind {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    match *self {
      RendererKind::Auto => f.write_str("auto"),
      RendererKind::OpenGL => f.write_str("OpenGL"),
      RendererKind::OpenGLES => f.write_str("OpenGL ES"),
    }
  }
}

impl FromStr for RendererKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "" | "auto" => Ok(RendererKind::Auto),
      "opengl" | "gl" => Ok(RendererKind::OpenGL),
      "opengl es" | "opengles" | "gles" => Ok(RendererKind::OpenGLES),
      _ => Err(format!("unknown renderer: {}", s)),
    }
  }
}

/// Vertical synchronization.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum VSync {
  /// Synchronize, unless the frame is late.
  Adaptive,
  Off,
  On,
}

impl VSync {
  /// Map the persisted integer setting: `-1` adaptive, `0` off, anything else on.
  pub fn from_level(level: i32) -> Self {
    match level {
      i32::MIN..=-1 => VSync::Adaptive,
      0 => VSync::Off,
      _ => VSync::On,
    }
  }

  pub fn level(self) -> i32 {
    match self {
      VSync::Adaptive => -1,
      VSync::Off => 0,
      VSync::On => 1,
    }
  }
}

impl FromStr for VSync {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "adaptive" | "-1" => Ok(VSync::Adaptive),
      "off" | "0" => Ok(VSync::Off),
      "on" | "1" => Ok(VSync::On),
      _ => Err(format!("invalid vsync mode: {}", s)),
    }
  }
}

/// Renderer options.
///
/// Feel free to look at the different methods available to tweak the options. You may want to
/// start with `default()` though.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct RendererConfig {
  renderer: RendererKind,
  msaa_level: u32,
  vsync: VSync,
  buffer_upload: String,
  extension_overrides: String,
  runtime_extension_overrides: String,
  max_anisotropy: f32,
  antialiasing: bool,
  alpha_cutout_aa: AlphaCutoutAA,
}

impl Default for RendererConfig {
  /// Defaults:
  ///
  /// - `renderer` set to `RendererKind::Auto`.
  /// - `msaa_level` set to `0`.
  /// - `vsync` set to `VSync::Adaptive`.
  /// - `buffer_upload` empty (automatic selection).
  /// - `extension_overrides` and `runtime_extension_overrides` empty.
  /// - `max_anisotropy` set to `9999.` (clamped to what the driver supports).
  /// - `antialiasing` set to `true`.
  /// - `alpha_cutout_aa` set to `AlphaCutoutAA::Crisp`.
  fn default() -> Self {
    RendererConfig {
      renderer: RendererKind::Auto,
      msaa_level: 0,
      vsync: VSync::Adaptive,
      buffer_upload: String::new(),
      extension_overrides: String::new(),
      runtime_extension_overrides: String::new(),
      max_anisotropy: 9999.,
      antialiasing: true,
      alpha_cutout_aa: AlphaCutoutAA::Crisp,
    }
  }
}

impl RendererConfig {
  #[inline]
  pub fn set_renderer(self, renderer: RendererKind) -> Self {
    RendererConfig { renderer, ..self }
  }

  #[inline]
  pub fn renderer(&self) -> RendererKind {
    self.renderer
  }

  /// Requested number of samples per pixel; `0` disables multisampling.
  #[inline]
  pub fn set_msaa_level(self, msaa_level: u32) -> Self {
    RendererConfig { msaa_level, ..self }
  }

  #[inline]
  pub fn msaa_level(&self) -> u32 {
    self.msaa_level
  }

  #[inline]
  pub fn set_vsync(self, vsync: VSync) -> Self {
    RendererConfig { vsync, ..self }
  }

  #[inline]
  pub fn vsync(&self) -> VSync {
    self.vsync
  }

  /// Vertex buffer upload preference, see [`crate::buffer`].
  #[inline]
  pub fn set_buffer_upload(self, buffer_upload: impl Into<String>) -> Self {
    RendererConfig {
      buffer_upload: buffer_upload.into(),
      ..self
    }
  }

  #[inline]
  pub fn buffer_upload(&self) -> &str {
    &self.buffer_upload
  }

  /// Persisted extension overrides.
  #[inline]
  pub fn set_extension_overrides(self, overrides: impl Into<String>) -> Self {
    RendererConfig {
      extension_overrides: overrides.into(),
      ..self
    }
  }

  #[inline]
  pub fn extension_overrides(&self) -> &str {
    &self.extension_overrides
  }

  /// Extension overrides given on the command line; applied after the persisted ones.
  #[inline]
  pub fn set_runtime_extension_overrides(self, overrides: impl Into<String>) -> Self {
    RendererConfig {
      runtime_extension_overrides: overrides.into(),
      ..self
    }
  }

  #[inline]
  pub fn runtime_extension_overrides(&self) -> &str {
    &self.runtime_extension_overrides
  }

  #[inline]
  pub fn set_max_anisotropy(self, max_anisotropy: f32) -> Self {
    RendererConfig {
      max_anisotropy,
      ..self
    }
  }

  #[inline]
  pub fn max_anisotropy(&self) -> f32 {
    self.max_anisotropy
  }

  #[inline]
  pub fn set_antialiasing(self, antialiasing: bool) -> Self {
    RendererConfig {
      antialiasing,
      ..self
    }
  }

  #[inline]
  pub fn antialiasing(&self) -> bool {
    self.antialiasing
  }

  #[inline]
  pub fn set_alpha_cutout_aa(self, alpha_cutout_aa: AlphaCutoutAA) -> Self {
    RendererConfig {
      alpha_cutout_aa,
      ..self
    }
  }

  #[inline]
  pub fn alpha_cutout_aa(&self) -> AlphaCutoutAA {
    self.alpha_cutout_aa
  }

  /// Override sources, lowest priority first.
  pub fn override_sources(&self) -> [&str; 2] {
    [&self.extension_overrides, &self.runtime_extension_overrides]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_renderer() {
    assert_eq!("auto".parse(), Ok(RendererKind::Auto));
    assert_eq!("OpenGL".parse(), Ok(RendererKind::OpenGL));
    assert_eq!("OpenGL ES".parse(), Ok(RendererKind::OpenGLES));
    assert!("Vulkan".parse::<RendererKind>().is_err());

    for kind in [RendererKind::Auto, RendererKind::OpenGL, RendererKind::OpenGLES] {
      assert_eq!(kind.to_string().parse(), Ok(kind));
    }
  }

  #[test]
  fn vsync_levels() {
    assert_eq!(VSync::from_level(-1), VSync::Adaptive);
    assert_eq!(VSync::from_level(0), VSync::Off);
    assert_eq!(VSync::from_level(3), VSync::On);
    assert_eq!("on".parse::<VSync>().map(VSync::level), Ok(1));
  }

  #[test]
  fn builder() {
    let config = RendererConfig::default()
      .set_msaa_level(4)
      .set_extension_overrides("-GL_ARB_sample_shading")
      .set_runtime_extension_overrides("+GL_ARB_sample_shading");

    assert_eq!(config.msaa_level(), 4);
    assert_eq!(config.vsync(), VSync::Adaptive);
    assert_eq!(
      config.override_sources(),
      ["-GL_ARB_sample_shading", "+GL_ARB_sample_shading"]
    );
  }
}
