//! Alpha cutout resolution.
//!
//! Alpha cutouts must discard transparent texels even when the blending factors do not look at
//! the source alpha. Depending on the blending in use, multisampling and the user preference, the
//! discard is implemented with a strict alpha test, a conservative alpha test, per-sample shading
//! or alpha-to-coverage. [`resolve`] is the decision table.
//!
//! Alpha-to-coverage cannot be combined with blending that already respects the source alpha, as
//! that would apply the alpha twice (think text rendering). This is why the resolution is keyed on
//! the blending factors and must be recomputed whenever they change.

use std::error;
use std::fmt;
use std::str::FromStr;

use crate::blending::Factor;

/// Alpha cutout anti-aliasing preference.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum AlphaCutoutAA {
  /// Plain alpha test, jagged edges.
  None,
  /// Alpha-to-coverage; soft edges.
  Fuzzy,
  /// Per-sample alpha test; crisp edges. Needs sample shading.
  Crisp,
}

impl AlphaCutoutAA {
  /// Map the persisted integer setting (clamped to `0..=2`).
  pub fn from_level(level: i32) -> Self {
    match level {
      i32::MIN..=0 => AlphaCutoutAA::None,
      1 => AlphaCutoutAA::Fuzzy,
      _ => AlphaCutoutAA::Crisp,
    }
  }

  /// Persisted integer value of the setting.
  pub fn level(self) -> i32 {
    match self {
      AlphaCutoutAA::None => 0,
      AlphaCutoutAA::Fuzzy => 1,
      AlphaCutoutAA::Crisp => 2,
    }
  }
}

impl Default for AlphaCutoutAA {
  fn default() -> Self {
    AlphaCutoutAA::Crisp
  }
}

impl FromStr for AlphaCutoutAA {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "none" | "off" | "0" => Ok(AlphaCutoutAA::None),
      "fuzzy" | "1" => Ok(AlphaCutoutAA::Fuzzy),
      "crisp" | "2" => Ok(AlphaCutoutAA::Crisp),
      _ => Err(format!("invalid alpha cutout antialiasing mode: {}", s)),
    }
  }
}

/// How transparent texels end up discarded.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum AlphaTest {
  /// Strict alpha test evaluated per sample.
  SampleShading,
  /// Alpha converted into a coverage mask; a conservative test removes fully transparent texels.
  AlphaToCoverage,
  /// Alpha test with a 0.5 threshold.
  Strict,
  /// Alpha test removing only fully transparent texels.
  Conservative,
  /// No alpha test at all.
  None,
}

impl AlphaTest {
  /// Alpha threshold of the `GREATER` test, or `None` if texels always pass.
  pub fn cutoff(self) -> Option<f32> {
    match self {
      AlphaTest::None => None,
      AlphaTest::Conservative | AlphaTest::AlphaToCoverage => Some(0.),
      AlphaTest::Strict | AlphaTest::SampleShading => Some(0.5),
    }
  }
}

/// Inputs of the alpha cutout decision table that do not come from the render state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CutoutContext {
  /// Multisampling is currently active.
  pub multisampling: bool,
  /// The driver supports per-sample shading.
  pub sample_shading: bool,
  /// User preference.
  pub preference: AlphaCutoutAA,
}

impl CutoutContext {
  fn use_sample_shading(&self) -> bool {
    self.multisampling && self.sample_shading && self.preference == AlphaCutoutAA::Crisp
  }

  fn use_alpha_to_coverage(&self) -> bool {
    self.multisampling && self.preference == AlphaCutoutAA::Fuzzy
  }
}

/// Outcome of the decision table: the blending factors to actually send to the driver and the
/// alpha test to use.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Resolution {
  pub blend_src: Factor,
  pub blend_dst: Factor,
  pub test: AlphaTest,
}

/// Invalid alpha cutout requests.
#[non_exhaustive]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AlphaCutoutError {
  /// Inverted alpha blending combined with an alpha cutout applies transparency twice.
  InvertedAlphaBlending { src: Factor, dst: Factor },
}

impl fmt::Display for AlphaCutoutError {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    match *self {
      AlphaCutoutError::InvertedAlphaBlending { src, dst } => write!(
        f,
        "inverted alpha blending ({:?}, {:?}) combined with alpha cutout makes no sense",
        src, dst
      ),
    }
  }
}

impl error::Error for AlphaCutoutError {}

/// Resolve blending and alpha cutout into driver-level blending factors and an alpha test.
pub fn resolve(
  src: Factor,
  dst: Factor,
  alpha_cutout: bool,
  ctx: CutoutContext,
) -> Result<Resolution, AlphaCutoutError> {
  if !alpha_cutout {
    return Ok(Resolution {
      blend_src: src,
      blend_dst: dst,
      test: AlphaTest::None,
    });
  }

  if src == Factor::SrcAlphaComplement || dst == Factor::SrcAlpha {
    return Err(AlphaCutoutError::InvertedAlphaBlending { src, dst });
  }

  let resolution = match (src, dst) {
    (Factor::One, Factor::Zero) => {
      let test = if ctx.use_sample_shading() {
        AlphaTest::SampleShading
      } else if ctx.use_alpha_to_coverage() {
        AlphaTest::AlphaToCoverage
      } else {
        AlphaTest::Strict
      };

      Resolution {
        blend_src: src,
        blend_dst: dst,
        test,
      }
    }

    // additive: weighting by the source alpha already hides transparent texels; the test only
    // saves fill rate
    (Factor::One, Factor::One) => Resolution {
      blend_src: Factor::SrcAlpha,
      blend_dst: dst,
      test: AlphaTest::Conservative,
    },

    (Factor::SrcAlpha, _) | (_, Factor::SrcAlphaComplement) => Resolution {
      blend_src: src,
      blend_dst: dst,
      test: AlphaTest::Conservative,
    },

    _ => Resolution {
      blend_src: src,
      blend_dst: dst,
      test: if ctx.use_sample_shading() {
        AlphaTest::SampleShading
      } else {
        AlphaTest::Strict
      },
    },
  };

  Ok(resolution)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ctx(multisampling: bool, sample_shading: bool, preference: AlphaCutoutAA) -> CutoutContext {
    CutoutContext {
      multisampling,
      sample_shading,
      preference,
    }
  }

  #[test]
  fn opaque_cutout_without_msaa_is_strict() {
    let r = resolve(
      Factor::One,
      Factor::Zero,
      true,
      ctx(false, true, AlphaCutoutAA::Crisp),
    )
    .unwrap();

    assert_eq!(r.test, AlphaTest::Strict);
    assert_eq!(r.test.cutoff(), Some(0.5));
    assert_eq!((r.blend_src, r.blend_dst), (Factor::One, Factor::Zero));
  }

  #[test]
  fn opaque_cutout_crisp_msaa_uses_sample_shading() {
    let r = resolve(
      Factor::One,
      Factor::Zero,
      true,
      ctx(true, true, AlphaCutoutAA::Crisp),
    )
    .unwrap();
    assert_eq!(r.test, AlphaTest::SampleShading);

    // no sample shading support: falls back to the strict test, not alpha-to-coverage
    let r = resolve(
      Factor::One,
      Factor::Zero,
      true,
      ctx(true, false, AlphaCutoutAA::Crisp),
    )
    .unwrap();
    assert_eq!(r.test, AlphaTest::Strict);
  }

  #[test]
  fn opaque_cutout_fuzzy_msaa_uses_alpha_to_coverage() {
    let r = resolve(
      Factor::One,
      Factor::Zero,
      true,
      ctx(true, true, AlphaCutoutAA::Fuzzy),
    )
    .unwrap();

    assert_eq!(r.test, AlphaTest::AlphaToCoverage);
    assert_eq!(r.test.cutoff(), Some(0.));
  }

  #[test]
  fn additive_cutout_rewrites_source_factor() {
    for &multisampling in &[false, true] {
      let r = resolve(
        Factor::One,
        Factor::One,
        true,
        ctx(multisampling, true, AlphaCutoutAA::Crisp),
      )
      .unwrap();

      assert_eq!(r.blend_src, Factor::SrcAlpha);
      assert_eq!(r.blend_dst, Factor::One);
      assert_eq!(r.test, AlphaTest::Conservative);
      assert_eq!(r.test.cutoff(), Some(0.));
    }
  }

  #[test]
  fn alpha_blending_cutout_is_conservative() {
    let r = resolve(
      Factor::SrcAlpha,
      Factor::SrcAlphaComplement,
      true,
      ctx(true, true, AlphaCutoutAA::Fuzzy),
    )
    .unwrap();

    assert_eq!(r.test, AlphaTest::Conservative);
  }

  #[test]
  fn inverted_alpha_blending_with_cutout_is_rejected() {
    let err = resolve(
      Factor::SrcAlphaComplement,
      Factor::SrcAlpha,
      true,
      ctx(false, false, AlphaCutoutAA::None),
    )
    .unwrap_err();

    assert_eq!(
      err,
      AlphaCutoutError::InvertedAlphaBlending {
        src: Factor::SrcAlphaComplement,
        dst: Factor::SrcAlpha
      }
    );

    assert!(resolve(
      Factor::One,
      Factor::SrcAlpha,
      true,
      ctx(false, false, AlphaCutoutAA::None)
    )
    .is_err());
  }

  #[test]
  fn no_cutout_disables_the_test() {
    let r = resolve(
      Factor::SrcAlphaComplement,
      Factor::SrcAlpha,
      false,
      ctx(true, true, AlphaCutoutAA::Crisp),
    )
    .unwrap();

    assert_eq!(r.test, AlphaTest::None);
    assert_eq!(r.test.cutoff(), None);
  }

  #[test]
  fn other_blending_uses_strict_or_sample_shading() {
    let r = resolve(
      Factor::DstColor,
      Factor::Zero,
      true,
      ctx(true, true, AlphaCutoutAA::Fuzzy),
    )
    .unwrap();
    assert_eq!(r.test, AlphaTest::Strict);

    let r = resolve(
      Factor::DstColor,
      Factor::Zero,
      true,
      ctx(true, true, AlphaCutoutAA::Crisp),
    )
    .unwrap();
    assert_eq!(r.test, AlphaTest::SampleShading);
  }

  #[test]
  fn preference_parsing() {
    assert_eq!("fuzzy".parse(), Ok(AlphaCutoutAA::Fuzzy));
    assert_eq!("2".parse(), Ok(AlphaCutoutAA::Crisp));
    assert!("blurry".parse::<AlphaCutoutAA>().is_err());
    assert_eq!(AlphaCutoutAA::from_level(7), AlphaCutoutAA::Crisp);
    assert_eq!(AlphaCutoutAA::from_level(-3), AlphaCutoutAA::None);
  }
}
