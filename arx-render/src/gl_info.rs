//! Graphics context capability probe.
//!
//! [`GraphicsContextInfo`] captures what the driver reports about the current context (version,
//! vendor, device, extensions) and layers a list of user- and quirk-provided overrides on top of
//! it. Every capability check of the renderer goes through [`GraphicsContextInfo::has`].
//!
//! # Override strings
//!
//! Override strings are made of tokens separated by whitespace, `,`, `;` or `:`:
//!
//! - `+GL_NAME` / `-GL_NAME` force-enable / force-disable a single extension. The last matching
//!   directive wins.
//! - `M.m`, `MM` or `M` (optionally prefixed with `GL`) caps the context version: every feature
//!   that is core in a later version is only used if its extension is available.
//! - `-` / `-*` disables every feature that is not core in the reported version, including pure
//!   extensions. `+` / `+*` lifts the cap again.
//!
//! A version token discards the extension directives that appear before it in the same string.
//! Directives coming from an earlier source (driver quirks, the configuration file) are kept.

use log::{info, warn};
use std::collections::HashSet;

use crate::platform::Platform;

/// Version sentinel for features that were never promoted to core.
pub const NOT_IN_CORE: u32 = i32::MAX as u32;

/// Characters separating override tokens.
const OVERRIDE_SEPARATORS: &[char] = &[' ', '\t', '\r', '\n', ',', ';', ':'];

/// Encode a context version the way capability checks compare them: `major * 10 + minor`.
pub const fn gl_version(major: u32, minor: u32) -> u32 {
  major * 10 + minor
}

/// Raw queries against the current graphics context.
///
/// Implemented by drivers. Every query may fail on hostile or minimal contexts; implementations
/// return `None` / empty values instead of erroring.
pub trait ContextProbe {
  /// Version string (e.g. `4.6.0 NVIDIA 535.54` or `OpenGL ES 3.2 Mesa`).
  fn version_string(&self) -> Option<String>;

  /// Vendor string.
  fn vendor(&self) -> Option<String>;

  /// Device string.
  fn renderer(&self) -> Option<String>;

  /// Extensions reported by the driver.
  fn extensions(&self) -> Vec<String>;

  /// Largest supported texture dimension.
  fn max_texture_size(&self) -> u32;
}

/// Information about the graphics context in use and the active overrides.
#[derive(Clone, Debug)]
pub struct GraphicsContextInfo {
  version_string: String,
  vendor: String,
  renderer: String,
  is_es: bool,
  version: u32,
  version_override: u32,
  extensions: HashSet<String>,
  overrides: Vec<String>,
}

impl GraphicsContextInfo {
  /// Probe the current context.
  ///
  /// `override_sources` are applied in order, so later sources take precedence (typically the
  /// configuration file first and the command line last). Built-in driver quirks are applied
  /// before any of them.
  pub fn probe<P>(probe: &P, platform: Platform, override_sources: &[&str]) -> Self
  where
    P: ContextProbe + ?Sized,
  {
    let mut info = match probe.version_string() {
      Some(raw) => {
        let (is_es, version) = parse_version_string(&raw);
        let version_string = raw
          .strip_prefix("OpenGL ")
          .map(str::to_owned)
          .unwrap_or(raw);

        GraphicsContextInfo {
          version_string,
          vendor: probe.vendor().unwrap_or_else(unknown),
          renderer: probe.renderer().unwrap_or_else(unknown),
          is_es,
          version,
          version_override: NOT_IN_CORE,
          extensions: probe.extensions().into_iter().collect(),
          overrides: Vec::new(),
        }
      }

      None => {
        warn!("Could not query the OpenGL version; assuming no capabilities");
        GraphicsContextInfo::unknown()
      }
    };

    // some older implementations incorrectly claim support for non-power-of-two textures
    if !info.is_es && !info.is(3, 0) && probe.max_texture_size() < 8192 {
      info
        .overrides
        .push("-GL_ARB_texture_non_power_of_two".to_owned());
    }

    // some Intel Windows drivers crash or render black with per-sample shading
    if platform == Platform::Windows && !info.is_es && info.vendor == "Intel" {
      info.overrides.push("-GL_ARB_sample_shading".to_owned());
    }

    for source in override_sources {
      info.parse_overrides(source);
    }

    info
  }

  /// A context we know nothing about: version 0 and no extensions.
  pub fn unknown() -> Self {
    GraphicsContextInfo {
      version_string: unknown(),
      vendor: unknown(),
      renderer: unknown(),
      is_es: false,
      version: 0,
      version_override: NOT_IN_CORE,
      extensions: HashSet::new(),
      overrides: Vec::new(),
    }
  }

  /// Append the directives of an override string.
  ///
  /// Malformed tokens are logged and skipped.
  pub fn parse_overrides(&mut self, overrides: &str) {
    let source_start = self.overrides.len();

    for token in overrides
      .split(OVERRIDE_SEPARATORS)
      .filter(|token| !token.is_empty())
    {
      if token.starts_with("+GL_") || token.starts_with("-GL_") {
        self.overrides.push(token.to_owned());
        continue;
      }

      match parse_version_token(token, self.version) {
        Some(version) => {
          if self.overrides.len() > source_start {
            warn!("Ignoring OpenGL feature overrides before '{}'", token);
            self.overrides.truncate(source_start);
          }

          self.version_override = version;
        }

        None => warn!("Invalid OpenGL feature override '{}'", token),
      }
    }
  }

  /// Version string without the `OpenGL ` prefix.
  pub fn version_string(&self) -> &str {
    &self.version_string
  }

  pub fn vendor(&self) -> &str {
    &self.vendor
  }

  pub fn renderer(&self) -> &str {
    &self.renderer
  }

  /// Is this an OpenGL ES context?
  pub fn is_es(&self) -> bool {
    self.is_es
  }

  /// OpenGL ES common-lite profiles lack floating point support.
  pub fn is_common_lite(&self) -> bool {
    self.version_string.starts_with("ES-CL ")
  }

  /// Reported version, encoded with [`gl_version`].
  pub fn version(&self) -> u32 {
    self.version
  }

  /// Current version cap set by overrides.
  pub fn version_override(&self) -> u32 {
    self.version_override
  }

  /// Active extension directives, lowest priority first.
  pub fn overrides(&self) -> &[String] {
    &self.overrides
  }

  /// Is the reported version at least `major.minor`?
  pub fn is(&self, major: u32, minor: u32) -> bool {
    self.version >= gl_version(major, minor)
  }

  /// Can the functionality of `extension`, core since `version`, be used?
  ///
  /// Pass [`NOT_IN_CORE`] (or use [`GraphicsContextInfo::has_extension`]) for pure extensions.
  pub fn has(&self, extension: &str, version: u32) -> bool {
    if self.version < version && !self.extensions.contains(extension) {
      return false;
    }

    for directive in self.overrides.iter().rev() {
      if &directive[1..] == extension {
        if directive.starts_with('+') {
          return true;
        }

        info!("Ignoring OpenGL extension {}", extension);
        return false;
      }
    }

    if self.version_override >= version {
      true
    } else {
      info!("Ignoring OpenGL extension {}", extension);
      false
    }
  }

  /// Can `extension` be used? Same as `has(extension, NOT_IN_CORE)`.
  pub fn has_extension(&self, extension: &str) -> bool {
    self.has(extension, NOT_IN_CORE)
  }
}

fn unknown() -> String {
  "(unknown)".to_owned()
}

/// Extract the profile and version out of a driver version string.
fn parse_version_string(raw: &str) -> (bool, u32) {
  let stripped = raw.strip_prefix("OpenGL ").unwrap_or(raw);
  let is_es = stripped.starts_with("ES");

  let numbers = stripped
    .split(|c: char| c.is_whitespace())
    .find(|word| word.starts_with(|c: char| c.is_ascii_digit()));

  let version = numbers
    .and_then(|word| {
      let mut parts = word.split('.');
      let major = parse_digits(parts.next()?)?;
      let minor = parts.next().and_then(parse_digits).unwrap_or(0);
      major.checked_mul(10)?.checked_add(minor.min(9))
    })
    .unwrap_or(0);

  (is_es, version)
}

/// Parse a version override token; `None` if malformed.
fn parse_version_token(token: &str, reported: u32) -> Option<u32> {
  match token {
    "+" | "+*" => return Some(NOT_IN_CORE),
    "-" | "-*" => return Some(reported),
    _ => (),
  }

  let token = token.strip_prefix("GL").unwrap_or(token);

  if let Some(dot) = token.find('.') {
    let major = parse_digits(&token[..dot])?;
    let minor = parse_digits(&token[dot + 1..])?;

    if minor > 10 {
      return None;
    }

    major.checked_mul(10)?.checked_add(minor)
  } else if token.len() > 1 {
    parse_digits(token)
  } else {
    parse_digits(token)?.checked_mul(10)
  }
}

fn parse_digits(s: &str) -> Option<u32> {
  if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }

  s.parse().ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  struct FakeProbe {
    version: Option<&'static str>,
    vendor: &'static str,
    extensions: &'static [&'static str],
    max_texture_size: u32,
  }

  impl FakeProbe {
    fn new(version: &'static str, extensions: &'static [&'static str]) -> Self {
      FakeProbe {
        version: Some(version),
        vendor: "Mesa",
        extensions,
        max_texture_size: 16384,
      }
    }
  }

  impl ContextProbe for FakeProbe {
    fn version_string(&self) -> Option<String> {
      self.version.map(str::to_owned)
    }

    fn vendor(&self) -> Option<String> {
      Some(self.vendor.to_owned())
    }

    fn renderer(&self) -> Option<String> {
      Some("llvmpipe".to_owned())
    }

    fn extensions(&self) -> Vec<String> {
      self.extensions.iter().map(|e| (*e).to_owned()).collect()
    }

    fn max_texture_size(&self) -> u32 {
      self.max_texture_size
    }
  }

  fn probe(probe: &FakeProbe, overrides: &[&str]) -> GraphicsContextInfo {
    GraphicsContextInfo::probe(probe, Platform::Linux, overrides)
  }

  #[test]
  fn version_strings() {
    assert_eq!(parse_version_string("4.6.0 NVIDIA 535.54.03"), (false, 46));
    assert_eq!(parse_version_string("OpenGL ES 3.2 Mesa 23.1"), (true, 32));
    assert_eq!(parse_version_string("OpenGL ES-CM 1.1"), (true, 11));
    assert_eq!(parse_version_string("2.1"), (false, 21));
    assert_eq!(parse_version_string("garbage"), (false, 0));

    let info = probe(&FakeProbe::new("OpenGL ES-CL 1.1", &[]), &[]);
    assert!(info.is_es());
    assert!(info.is_common_lite());
    assert_eq!(info.version_string(), "ES-CL 1.1");
  }

  #[test]
  fn core_version_or_extension() {
    let info = probe(&FakeProbe::new("2.1", &["GL_ARB_map_buffer_range"]), &[]);

    assert!(info.has("GL_ARB_map_buffer_range", 30));
    assert!(info.has("GL_ARB_texture_non_power_of_two", 20));
    assert!(!info.has("GL_ARB_buffer_storage", 44));
    assert!(!info.has_extension("GL_NV_fog_distance"));
  }

  #[test]
  fn old_context_without_extensions() {
    let info = probe(&FakeProbe::new("1.4", &[]), &[]);

    assert_eq!(info.version(), 14);
    assert!(!info.has("GL_ARB_vertex_buffer_object", 15));
    assert!(info.has("GL_ARB_vertex_buffer_object", 14));
  }

  #[test]
  fn later_disable_wins() {
    let fake = FakeProbe::new("4.6", &["GL_ARB_sample_shading"]);

    let info = probe(&fake, &["+GL_ARB_sample_shading -GL_ARB_sample_shading"]);
    assert!(!info.has("GL_ARB_sample_shading", 40));

    let info = probe(&fake, &["+GL_ARB_sample_shading", "-GL_ARB_sample_shading"]);
    assert!(!info.has("GL_ARB_sample_shading", 40));

    let info = probe(&fake, &["-GL_ARB_sample_shading", "+GL_ARB_sample_shading"]);
    assert!(info.has("GL_ARB_sample_shading", 40));
  }

  #[test]
  fn enabling_does_not_invent_driver_support() {
    let info = probe(&FakeProbe::new("3.0", &[]), &["+GL_ARB_buffer_storage"]);
    assert!(!info.has("GL_ARB_buffer_storage", 44));
  }

  #[test]
  fn version_cap_applies_to_every_query() {
    let fake = FakeProbe::new("4.6", &["GL_ARB_buffer_storage", "GL_NV_fog_distance"]);
    let info = probe(&fake, &["3.3"]);

    assert_eq!(info.version_override(), 33);
    assert!(info.has("GL_ARB_map_buffer_range", 30));
    assert!(!info.has("GL_ARB_sample_shading", 40));
    // the extension is reported but not core at the capped version
    assert!(!info.has("GL_ARB_buffer_storage", 44));
    assert!(!info.has_extension("GL_NV_fog_distance"));
    assert!(info.is(4, 6));

    let info = probe(&fake, &["3.3 +GL_ARB_buffer_storage"]);
    assert!(info.has("GL_ARB_buffer_storage", 44));
  }

  #[test]
  fn version_tokens() {
    assert_eq!(parse_version_token("GL3.3", 46), Some(33));
    assert_eq!(parse_version_token("3.10", 46), Some(40));
    assert_eq!(parse_version_token("3.11", 46), None);
    assert_eq!(parse_version_token("21", 46), Some(21));
    assert_eq!(parse_version_token("GL4", 46), Some(40));
    assert_eq!(parse_version_token("-", 46), Some(46));
    assert_eq!(parse_version_token("+*", 46), Some(NOT_IN_CORE));
    assert_eq!(parse_version_token("GL", 46), None);
    assert_eq!(parse_version_token("+5", 46), None);
    assert_eq!(parse_version_token("x.y", 46), None);
  }

  #[test]
  fn minus_disables_extensions_plus_restores() {
    let fake = FakeProbe::new("3.0", &["GL_NV_fog_distance"]);

    let info = probe(&fake, &["-"]);
    assert!(!info.has_extension("GL_NV_fog_distance"));
    assert!(info.has("GL_ARB_map_buffer_range", 30));

    let info = probe(&fake, &["-", "+"]);
    assert!(info.has_extension("GL_NV_fog_distance"));
  }

  #[test]
  fn version_token_clears_earlier_directives_of_the_same_source() {
    let fake = FakeProbe::new("4.6", &["GL_ARB_sample_shading", "GL_NV_fog_distance"]);

    let info = probe(
      &fake,
      &[
        "-GL_NV_fog_distance",
        "-GL_ARB_sample_shading 4.6 -GL_ARB_buffer_storage",
      ],
    );

    assert_eq!(
      info.overrides(),
      &["-GL_NV_fog_distance", "-GL_ARB_buffer_storage"]
    );
    assert!(!info.has_extension("GL_NV_fog_distance"));
    assert!(info.has("GL_ARB_sample_shading", 40));
    assert!(!info.has("GL_ARB_buffer_storage", 44));
  }

  #[test]
  fn malformed_tokens_are_ignored() {
    let fake = FakeProbe::new("4.6", &["GL_ARB_sample_shading"]);
    let info = probe(&fake, &[";;+FOO, bar: -GL_ARB_sample_shading 9.99"]);

    assert_eq!(info.version_override(), NOT_IN_CORE);
    assert_eq!(info.overrides(), &["-GL_ARB_sample_shading"]);
    assert!(!info.has("GL_ARB_sample_shading", 40));
  }

  #[test]
  fn driver_quirks() {
    let mut fake = FakeProbe::new("2.1", &["GL_ARB_texture_non_power_of_two"]);
    fake.max_texture_size = 4096;
    let info = probe(&fake, &[]);
    assert!(!info.has("GL_ARB_texture_non_power_of_two", 20));

    let mut fake = FakeProbe::new("4.6", &["GL_ARB_sample_shading"]);
    fake.vendor = "Intel";
    let info = GraphicsContextInfo::probe(&fake, Platform::Windows, &[]);
    assert!(!info.has("GL_ARB_sample_shading", 40));
    let info = GraphicsContextInfo::probe(&fake, Platform::Linux, &[]);
    assert!(info.has("GL_ARB_sample_shading", 40));

    // user overrides come after the quirks
    let info = GraphicsContextInfo::probe(&fake, Platform::Windows, &["+GL_ARB_sample_shading"]);
    assert!(info.has("GL_ARB_sample_shading", 40));
  }

  #[test]
  fn unavailable_context_degrades() {
    let fake = FakeProbe {
      version: None,
      vendor: "Nobody",
      extensions: &["GL_ARB_buffer_storage"],
      max_texture_size: 0,
    };
    let info = probe(&fake, &[]);

    assert_eq!(info.version(), 0);
    assert_eq!(info.vendor(), "(unknown)");
    assert!(!info.has("GL_ARB_buffer_storage", 44));
  }
}
