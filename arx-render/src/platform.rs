//! Runtime platform description.
//!
//! Driver quirks and context-loss rules depend on the platform. They are expressed against this
//! value rather than against compile-time configuration so that every rule can be exercised on any
//! host.

/// Operating system family the renderer runs on.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Platform {
  Linux,
  Bsd,
  Haiku,
  Windows,
  MacOs,
  Other,
}

impl Platform {
  /// Platform the crate was compiled for.
  pub fn current() -> Self {
    if cfg!(target_os = "linux") || cfg!(target_os = "android") {
      Platform::Linux
    } else if cfg!(any(
      target_os = "freebsd",
      target_os = "openbsd",
      target_os = "netbsd",
      target_os = "dragonfly"
    )) {
      Platform::Bsd
    } else if cfg!(target_os = "haiku") {
      Platform::Haiku
    } else if cfg!(windows) {
      Platform::Windows
    } else if cfg!(target_os = "macos") {
      Platform::MacOs
    } else {
      Platform::Other
    }
  }

  /// Does resizing the window invalidate the graphics context?
  ///
  /// `was_or_is_fullscreen` tells whether the resize enters or leaves fullscreen mode. Untested
  /// platforms always answer `true`.
  pub fn resize_loses_context(self, was_or_is_fullscreen: bool) -> bool {
    match self {
      Platform::Linux | Platform::Bsd | Platform::Haiku => false,
      Platform::Windows => was_or_is_fullscreen,
      Platform::MacOs | Platform::Other => true,
    }
  }
}
