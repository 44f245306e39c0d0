//! Feature matrix.
//!
//! Every optional code path of the renderer is gated by a [`Feature`]. The set of available
//! features is derived once per context from a [`GraphicsContextInfo`] by evaluating a fixed rule
//! table; rules only look at the context information, never at other features, so the order in
//! which they are evaluated does not matter.

use log::{error, warn};
use std::fmt;

use crate::gl_info::{gl_version, GraphicsContextInfo, NOT_IN_CORE};

/// Optional renderer functionality.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Feature {
  /// Textures with non-power-of-two dimensions.
  TextureNpot,
  /// Sized internal texture formats.
  SizedTextureFormats,
  /// Intensity texture formats.
  IntensityTextures,
  /// BGR(A) pixel transfers.
  BgrTextureTransfer,
  /// Anisotropic texture filtering.
  AnisotropicFiltering,
  /// Indexed draws with a base vertex.
  DrawElementsBaseVertex,
  /// Indexed draws with an index range hint.
  DrawRangeElements,
  /// Mapping a sub-range of a buffer.
  MapBufferRange,
  /// Mapping a whole buffer.
  MapBuffer,
  /// Immutable buffer storage (persistent mappings).
  BufferStorage,
  /// The stream buffer usage hint.
  BufferUsageStream,
  /// Single precision depth clear value.
  ClearDepthf,
  /// Per-vertex fog coordinates.
  VertexFogCoordinate,
  /// Per-sample shading.
  SampleShading,
  /// Fixed-point fog parameters.
  Fogx,
  /// Eye-plane fog distance mode.
  FogDistanceMode,
}

impl Feature {
  /// Every feature, in declaration order.
  pub const ALL: [Feature; 16] = [
    Feature::TextureNpot,
    Feature::SizedTextureFormats,
    Feature::IntensityTextures,
    Feature::BgrTextureTransfer,
    Feature::AnisotropicFiltering,
    Feature::DrawElementsBaseVertex,
    Feature::DrawRangeElements,
    Feature::MapBufferRange,
    Feature::MapBuffer,
    Feature::BufferStorage,
    Feature::BufferUsageStream,
    Feature::ClearDepthf,
    Feature::VertexFogCoordinate,
    Feature::SampleShading,
    Feature::Fogx,
    Feature::FogDistanceMode,
  ];

  fn bit(self) -> u32 {
    1 << self as u32
  }
}

impl fmt::Display for Feature {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    fmt::Debug::fmt(self, f)
  }
}

/// Availability rule of a feature for one profile.
#[derive(Clone, Copy, Debug)]
enum Rule {
  Always,
  Never,
  /// Raw context version at least `major.minor`.
  Core(u32, u32),
  /// `has(name, version)`.
  Ext(&'static str, u32),
  Any(&'static [Rule]),
}

impl Rule {
  fn eval(self, info: &GraphicsContextInfo) -> bool {
    match self {
      Rule::Always => true,
      Rule::Never => false,
      Rule::Core(major, minor) => info.is(major, minor),
      Rule::Ext(name, version) => info.has(name, version),
      Rule::Any(rules) => rules.iter().any(|rule| rule.eval(info)),
    }
  }
}

/// Rule plus the extension to warn about when it does not hold.
#[derive(Clone, Copy, Debug)]
struct Requirement {
  rule: Rule,
  warn: Option<&'static str>,
}

const fn req(rule: Rule) -> Requirement {
  Requirement { rule, warn: None }
}

const fn expected(rule: Rule, extension: &'static str) -> Requirement {
  Requirement {
    rule,
    warn: Some(extension),
  }
}

/// `(feature, OpenGL ES rule, desktop OpenGL rule)`
const RULES: &[(Feature, Requirement, Requirement)] = &[
  (
    Feature::TextureNpot,
    expected(Rule::Ext("GL_OES_texture_npot", 20), "GL_OES_texture_npot"),
    expected(
      Rule::Ext("GL_ARB_texture_non_power_of_two", 20),
      "GL_ARB_texture_non_power_of_two",
    ),
  ),
  (
    Feature::SizedTextureFormats,
    req(Rule::Ext("GL_OES_required_internalformat", 30)),
    req(Rule::Always),
  ),
  (
    Feature::IntensityTextures,
    req(Rule::Never),
    req(Rule::Always),
  ),
  (
    Feature::BgrTextureTransfer,
    req(Rule::Never),
    req(Rule::Always),
  ),
  (
    Feature::AnisotropicFiltering,
    req(Rule::Any(&[
      Rule::Ext("GL_ARB_texture_filter_anisotropic", 46),
      Rule::Ext("GL_EXT_texture_filter_anisotropic", NOT_IN_CORE),
    ])),
    req(Rule::Any(&[
      Rule::Ext("GL_ARB_texture_filter_anisotropic", 46),
      Rule::Ext("GL_EXT_texture_filter_anisotropic", NOT_IN_CORE),
    ])),
  ),
  (
    Feature::DrawElementsBaseVertex,
    req(Rule::Any(&[
      Rule::Ext("GL_OES_draw_elements_base_vertex", 32),
      Rule::Ext("GL_EXT_draw_elements_base_vertex", NOT_IN_CORE),
    ])),
    expected(
      Rule::Ext("GL_ARB_draw_elements_base_vertex", 32),
      "GL_ARB_draw_elements_base_vertex",
    ),
  ),
  (
    Feature::DrawRangeElements,
    req(Rule::Core(3, 0)),
    req(Rule::Always),
  ),
  (
    Feature::MapBufferRange,
    expected(
      Rule::Any(&[
        Rule::Core(3, 0),
        Rule::Ext("GL_EXT_map_buffer_range", NOT_IN_CORE),
      ]),
      "GL_EXT_map_buffer_range",
    ),
    expected(
      Rule::Ext("GL_ARB_map_buffer_range", 30),
      "GL_ARB_map_buffer_range",
    ),
  ),
  (
    Feature::MapBuffer,
    expected(Rule::Ext("GL_OES_mapbuffer", NOT_IN_CORE), "GL_OES_mapbuffer"),
    // buffer objects themselves are core since 1.5
    req(Rule::Ext("GL_ARB_vertex_buffer_object", 15)),
  ),
  (
    Feature::BufferStorage,
    req(Rule::Ext("GL_EXT_buffer_storage", NOT_IN_CORE)),
    req(Rule::Ext("GL_ARB_buffer_storage", 44)),
  ),
  (
    Feature::BufferUsageStream,
    req(Rule::Core(2, 0)),
    req(Rule::Always),
  ),
  (
    Feature::ClearDepthf,
    req(Rule::Always),
    req(Rule::Any(&[
      Rule::Ext("GL_ARB_ES2_compatibility", 41),
      Rule::Ext("GL_OES_single_precision", NOT_IN_CORE),
    ])),
  ),
  (
    Feature::VertexFogCoordinate,
    req(Rule::Never),
    req(Rule::Always),
  ),
  (
    Feature::SampleShading,
    req(Rule::Ext("GL_OES_sample_shading", 32)),
    req(Rule::Ext("GL_ARB_sample_shading", 40)),
  ),
  (Feature::Fogx, req(Rule::Always), req(Rule::Never)),
  (
    Feature::FogDistanceMode,
    req(Rule::Never),
    req(Rule::Ext("GL_NV_fog_distance", NOT_IN_CORE)),
  ),
];

/// Set of available features, fixed for the lifetime of a context.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct Features {
  bits: u32,
}

impl Features {
  /// No feature at all.
  pub fn none() -> Self {
    Features::default()
  }

  /// Evaluate the rule table against a context.
  ///
  /// Missing expected extensions are logged as warnings and an unsupported context version as an
  /// error; neither aborts the derivation.
  pub fn derive(info: &GraphicsContextInfo) -> Self {
    check_baseline(info);

    let mut features = Features::none();

    for &(feature, es, desktop) in RULES {
      let requirement = if info.is_es() { es } else { desktop };

      if requirement.rule.eval(info) {
        features = features.with(feature);
      } else if let Some(extension) = requirement.warn {
        warn!("Missing OpenGL extension {}", extension);
      }
    }

    features
  }

  /// Copy of `self` with `feature` available.
  pub fn with(self, feature: Feature) -> Self {
    Features {
      bits: self.bits | feature.bit(),
    }
  }

  /// Copy of `self` without `feature`.
  pub fn without(self, feature: Feature) -> Self {
    Features {
      bits: self.bits & !feature.bit(),
    }
  }

  pub fn has(&self, feature: Feature) -> bool {
    self.bits & feature.bit() != 0
  }

  /// Available features, in declaration order.
  pub fn iter(&self) -> impl Iterator<Item = Feature> + '_ {
    Feature::ALL.into_iter().filter(move |f| self.has(*f))
  }
}

impl fmt::Debug for Features {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    f.debug_set().entries(self.iter()).finish()
  }
}

fn check_baseline(info: &GraphicsContextInfo) {
  if info.is_common_lite() {
    error!("OpenGL ES common lite profile detected but floating point functionality is required");
  }

  if info.is_es() {
    if !info.is(1, 0) {
      error!("OpenGL ES version 1.0 or newer required");
    }
  } else if !info.is(1, 4) || !info.has("GL_ARB_vertex_buffer_object", gl_version(1, 5)) {
    error!("OpenGL version 1.5 or newer or 1.4 + GL_ARB_vertex_buffer_object required");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::gl_info::ContextProbe;
  use crate::platform::Platform;

  struct Probe(&'static str, &'static [&'static str]);

  impl ContextProbe for Probe {
    fn version_string(&self) -> Option<String> {
      Some(self.0.to_owned())
    }

    fn vendor(&self) -> Option<String> {
      Some("Mesa".to_owned())
    }

    fn renderer(&self) -> Option<String> {
      Some("softpipe".to_owned())
    }

    fn extensions(&self) -> Vec<String> {
      self.1.iter().map(|e| (*e).to_owned()).collect()
    }

    fn max_texture_size(&self) -> u32 {
      16384
    }
  }

  fn derive(version: &'static str, extensions: &'static [&'static str], overrides: &[&str]) -> Features {
    let info = GraphicsContextInfo::probe(&Probe(version, extensions), Platform::Linux, overrides);
    Features::derive(&info)
  }

  #[test]
  fn modern_desktop_context() {
    let features = derive("4.6.0 NVIDIA", &["GL_NV_fog_distance"], &[]);

    for feature in Feature::ALL {
      let expected = feature != Feature::Fogx;
      assert_eq!(features.has(feature), expected, "{}", feature);
    }
  }

  #[test]
  fn old_desktop_context() {
    let features = derive("1.4", &[], &[]);

    assert!(!features.has(Feature::TextureNpot));
    assert!(!features.has(Feature::MapBufferRange));
    assert!(!features.has(Feature::BufferStorage));
    assert!(!features.has(Feature::SampleShading));
    assert!(!features.has(Feature::ClearDepthf));
    assert!(!features.has(Feature::MapBuffer));
    assert!(features.has(Feature::DrawRangeElements));
    assert!(features.has(Feature::VertexFogCoordinate));

    let features = derive("1.4", &["GL_ARB_vertex_buffer_object"], &[]);
    assert!(features.has(Feature::MapBuffer));
  }

  #[test]
  fn es_context() {
    let features = derive("OpenGL ES 2.0", &["GL_OES_mapbuffer", "GL_EXT_map_buffer_range"], &[]);

    assert!(features.has(Feature::TextureNpot));
    assert!(features.has(Feature::MapBufferRange));
    assert!(features.has(Feature::MapBuffer));
    assert!(features.has(Feature::BufferUsageStream));
    assert!(features.has(Feature::Fogx));
    assert!(features.has(Feature::ClearDepthf));
    assert!(!features.has(Feature::DrawRangeElements));
    assert!(!features.has(Feature::SizedTextureFormats));
    assert!(!features.has(Feature::VertexFogCoordinate));
    assert!(!features.has(Feature::FogDistanceMode));
  }

  #[test]
  fn either_extension_is_enough() {
    let features = derive("2.1", &["GL_OES_single_precision", "GL_EXT_texture_filter_anisotropic"], &[]);

    assert!(features.has(Feature::ClearDepthf));
    assert!(features.has(Feature::AnisotropicFiltering));
  }

  #[test]
  fn overrides_reach_the_matrix() {
    let features = derive("4.6", &[], &["3.3"]);

    assert!(features.has(Feature::MapBufferRange));
    assert!(!features.has(Feature::BufferStorage));
    assert!(!features.has(Feature::SampleShading));

    let features = derive("4.6", &[], &["-GL_ARB_map_buffer_range"]);
    assert!(!features.has(Feature::MapBufferRange));
  }

  #[test]
  fn derivation_is_deterministic() {
    let a = derive("3.0", &["GL_ARB_buffer_storage"], &[]);
    let b = derive("3.0", &["GL_ARB_buffer_storage"], &[]);

    assert_eq!(a, b);
    assert!(a.has(Feature::BufferStorage));
  }

  #[test]
  fn set_operations() {
    let features = Features::none()
      .with(Feature::MapBuffer)
      .with(Feature::Fogx)
      .without(Feature::Fogx);

    assert!(features.has(Feature::MapBuffer));
    assert!(!features.has(Feature::Fogx));
    assert_eq!(features.iter().collect::<Vec<_>>(), vec![Feature::MapBuffer]);
  }
}
