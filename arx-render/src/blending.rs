//! Blending factors.
//!
//! Given two pixels *src* and *dst* – source and destination, we associate each pixel a blending
//! factor – respectively, *srcK* and *dstK*. *src* is the pixel being computed, and *dst* is the
//! pixel that is already stored in the framebuffer. The renderer always blends with the additive
//! equation:
//!
//! > `blended = src * srcK + dst * dstK`
//!
//! Turning blending “off” is expressed with the `(One, Zero)` pair, which is also the default.

/// Blending factors. Pixel data are multiplied by these factors before being added together.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Factor {
  /// `0 * color = 0`
  Zero,
  /// `1 * color = color`
  One,
  /// `src * color`
  SrcColor,
  /// `srcA * color`
  SrcAlpha,
  /// `(1 - src) * color`
  SrcColorComplement,
  /// `(1 - srcA) * color`
  SrcAlphaComplement,
  /// `min(srcA, 1 - dstA) * color`
  SrcAlphaSaturate,
  /// `dst * color`
  DstColor,
  /// `dstA * color`
  DstAlpha,
  /// `(1 - dst) * color`
  DstColorComplement,
  /// `(1 - dstA) * color`
  DstAlphaComplement,
}
