//! Graphics context negotiation.
//!
//! Windowing libraries only tell whether a context with a given set of attributes could be
//! created, and even then the context may be unusable (fewer samples than requested, a software
//! implementation with too few texture units). [`negotiate_context`] starts from the highest MSAA
//! level allowed and walks down to `0`, each level lowering the framebuffer requirements, until a
//! context passes every check. The windowing library itself hides behind [`ContextFactory`].

use arx_render::config::{RendererKind, VSync};
use log::{debug, error, warn};
use std::error;
use std::fmt;

/// Graphics API flavour of a context.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ContextProfile {
  /// Desktop OpenGL, legacy or compatibility profile.
  Desktop,
  /// OpenGL ES 1.x.
  Es,
}

impl fmt::Display for ContextProfile {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    match *self {
      ContextProfile::Desktop => f.write_str("Desktop OpenGL"),
      ContextProfile::Es => f.write_str("OpenGL ES"),
    }
  }
}

/// Order in which profiles are tried for a renderer preference.
///
/// The preference only decides which profile comes first; the other one stays a fallback.
pub fn profile_order(renderer: RendererKind) -> [ContextProfile; 2] {
  match renderer {
    RendererKind::Auto | RendererKind::OpenGL => [ContextProfile::Desktop, ContextProfile::Es],
    RendererKind::OpenGLES => [ContextProfile::Es, ContextProfile::Desktop],
  }
}

/// Profile and flags of a context to negotiate.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ContextRequest {
  /// Graphics API flavour.
  pub profile: ContextProfile,
  /// Request a debug context.
  pub debug: bool,
}

impl ContextRequest {
  /// Every request to try, in order: preferred profile first and, when `debug` is set, a debug
  /// context before a regular one for each profile.
  pub fn sequence(renderer: RendererKind, debug: bool) -> Vec<ContextRequest> {
    let flags: &[bool] = if debug { &[true, false] } else { &[false] };

    profile_order(renderer)
      .iter()
      .flat_map(|&profile| flags.iter().map(move |&debug| ContextRequest { profile, debug }))
      .collect()
  }
}

/// Framebuffer attributes asked for at a given MSAA level.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ContextAttributes {
  /// MSAA level the attributes are derived from.
  pub msaa_level: u32,
  /// Number of multisample buffers.
  pub multisample_buffers: u32,
  /// Samples per pixel; `0` when not multisampled.
  pub multisample_samples: u32,
  /// Depth buffer bits.
  pub depth_size: u8,
  /// Red, green and blue bits.
  pub color_size: [u8; 3],
}

impl ContextAttributes {
  /// Attributes for an MSAA level.
  ///
  /// Levels above `1` ask for multisampling. Level `1` asks for a regular 24-bit framebuffer and
  /// level `0` for the smallest framebuffer possible (16-bit depth, 3-3-2 colours).
  pub fn for_msaa_level(msaa_level: u32) -> Self {
    let multisampled = msaa_level > 1;
    let full = msaa_level > 0;

    ContextAttributes {
      msaa_level,
      multisample_buffers: if multisampled { 1 } else { 0 },
      multisample_samples: if multisampled { msaa_level } else { 0 },
      depth_size: if full { 24 } else { 16 },
      color_size: if full { [8, 8, 8] } else { [3, 3, 2] },
    }
  }
}

/// Strings identifying a context, for diagnostics.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct ContextDescription {
  /// Version string, without its `OpenGL ` prefix.
  pub version: Option<String>,
  /// Vendor string.
  pub vendor: Option<String>,
  /// Device string.
  pub renderer: Option<String>,
}

impl ContextDescription {
  fn field(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("(unknown)")
  }
}

/// Windowing library creating graphics contexts.
pub trait ContextFactory {
  /// A window and its context. Dropping it destroys both.
  type Context;

  /// Creation failures.
  type Error: fmt::Display;

  /// Create a window and a context with the given attributes.
  fn create(
    &mut self,
    request: ContextRequest,
    attributes: &ContextAttributes,
  ) -> Result<Self::Context, Self::Error>;

  /// Multisample buffers and samples per pixel actually granted.
  fn granted_samples(&self, context: &Self::Context) -> (u32, u32);

  /// Fixed-function texture units of the context; `0` if the query fails.
  fn texture_units(&self, context: &Self::Context) -> u32;

  /// Version, vendor and device strings of the context.
  fn describe(&self, context: &Self::Context) -> ContextDescription;
}

/// A context that passed negotiation.
#[derive(Debug)]
pub struct Negotiated<C> {
  /// The window and context.
  pub context: C,
  /// Request the context was created for.
  pub request: ContextRequest,
  /// Samples per pixel; `1` when not multisampled.
  pub samples: u32,
}

/// Errors that can happen while negotiating a context.
///
/// Please keep in mind that this `enum` is _non exhaustive_; you will not be able to exhaustively
/// pattern-match against it.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ContextError {
  /// The windowing library could not create a window or a context, even with the lowest
  /// requirements.
  CreationFailed {
    /// Profile of the failed request.
    profile: ContextProfile,
    /// Error reported by the windowing library.
    reason: String,
  },
  /// The best context available has too few texture units.
  NotEnoughTextureUnits {
    /// Profile of the rejected context.
    profile: ContextProfile,
    /// What the rejected context is.
    description: ContextDescription,
    /// Texture units available.
    have: u32,
    /// Texture units required.
    need: u32,
  },
  /// No request was tried.
  NoRequest,
}

impl fmt::Display for ContextError {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    match *self {
      ContextError::CreationFailed {
        profile,
        ref reason,
      } => write!(f, "could not create {} context: {}", profile, reason),

      ContextError::NotEnoughTextureUnits {
        profile,
        ref description,
        have,
        need,
      } => write!(
        f,
        "ignoring {} context version {} - not enough texture units available: have {}, need at least {}",
        profile,
        ContextDescription::field(&description.version),
        have,
        need
      ),

      ContextError::NoRequest => f.write_str("no context request"),
    }
  }
}

impl error::Error for ContextError {}

/// Create a context for `request`, from `max_msaa_level` down to `0`.
///
/// A level is rejected if the context cannot be created, if it has fewer samples than asked for
/// (levels above `1` only) or if it has fewer than `min_texture_units` texture units. The context
/// of a rejected level is dropped before trying the next one. The failure of the last level
/// (`0`) is the one returned.
pub fn negotiate_context<F>(
  factory: &mut F,
  request: ContextRequest,
  max_msaa_level: u32,
  min_texture_units: u32,
) -> Result<Negotiated<F::Context>, ContextError>
where
  F: ContextFactory,
{
  let profile = request.profile;
  let mut failure = None;

  for msaa in (0..=max_msaa_level).rev() {
    let attributes = ContextAttributes::for_msaa_level(msaa);

    let context = match factory.create(request, &attributes) {
      Ok(context) => context,
      Err(e) => {
        debug!("could not create {} context with {}x MSAA: {}", profile, msaa, e);
        failure = Some(ContextError::CreationFailed {
          profile,
          reason: e.to_string(),
        });
        continue;
      }
    };

    if msaa > 1 {
      let (buffers, samples) = factory.granted_samples(&context);

      if buffers == 0 || samples < msaa {
        warn!("requested {}x MSAA, got {}x; trying a lower level", msaa, samples);
        continue;
      }
    }

    let units = factory.texture_units(&context);
    if units < min_texture_units {
      failure = Some(ContextError::NotEnoughTextureUnits {
        profile,
        description: factory.describe(&context),
        have: units,
        need: min_texture_units,
      });
      continue;
    }

    return Ok(Negotiated {
      context,
      request,
      samples: msaa.max(1),
    });
  }

  let failure = failure.unwrap_or(ContextError::NoRequest);
  error!("{}", failure);

  if let ContextError::NotEnoughTextureUnits {
    ref description, ..
  } = failure
  {
    error!(" ├─ Vendor: {}", ContextDescription::field(&description.vendor));
    error!(" └─ Device: {}", ContextDescription::field(&description.renderer));
  }

  Err(failure)
}

/// Apply a vsync mode through `swap_interval`, which returns whether the interval was accepted.
///
/// Adaptive vsync falls back to regular vsync. Returns the mode in effect, or `None` if nothing
/// could be applied.
pub fn set_vsync<F>(vsync: VSync, mut swap_interval: F) -> Option<VSync>
where
  F: FnMut(i32) -> bool,
{
  if swap_interval(vsync.level()) {
    return Some(vsync);
  }

  if vsync == VSync::Adaptive {
    warn!("adaptive vsync not supported; falling back to regular vsync");

    if swap_interval(VSync::On.level()) {
      return Some(VSync::On);
    }
  }

  None
}
