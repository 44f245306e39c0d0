//! Fixed-function render state.
//!
//! Such a state controls how the GPU must operate some fixed pipeline functionality, such as the
//! blending, alpha cutouts, the depth test or face culling. A [`RenderState`] is a plain value:
//! draw-call producers build the one they want and hand it to the renderer, which reconciles it
//! with what the driver currently has (see [`StateCache`](crate::state::StateCache)).

use crate::blending::Factor;

/// Fixed-function render state.
///
/// You can get a default value with [`RenderState::default`] and set the operations you want with
/// the various `set_*` methods.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct RenderState {
  cull: bool,
  fog: bool,
  blend_src: Factor,
  blend_dst: Factor,
  alpha_cutout: bool,
  depth_test: bool,
  depth_write: bool,
  depth_offset: u32,
}

impl RenderState {
  /// Enable or disable back-face culling.
  pub fn set_cull(self, cull: bool) -> Self {
    RenderState { cull, ..self }
  }

  pub fn cull(&self) -> bool {
    self.cull
  }

  /// Enable or disable linear fog.
  pub fn set_fog(self, fog: bool) -> Self {
    RenderState { fog, ..self }
  }

  pub fn fog(&self) -> bool {
    self.fog
  }

  /// Set the blending factors.
  ///
  /// `(One, Zero)` is opaque rendering.
  pub fn set_blend(self, src: Factor, dst: Factor) -> Self {
    RenderState {
      blend_src: src,
      blend_dst: dst,
      ..self
    }
  }

  /// Shortcut for opaque rendering, i.e. `set_blend(Factor::One, Factor::Zero)`.
  pub fn set_opaque(self) -> Self {
    self.set_blend(Factor::One, Factor::Zero)
  }

  pub fn blend_src(&self) -> Factor {
    self.blend_src
  }

  pub fn blend_dst(&self) -> Factor {
    self.blend_dst
  }

  /// Discard (mostly) transparent texels.
  pub fn set_alpha_cutout(self, alpha_cutout: bool) -> Self {
    RenderState {
      alpha_cutout,
      ..self
    }
  }

  pub fn alpha_cutout(&self) -> bool {
    self.alpha_cutout
  }

  pub fn set_depth_test(self, depth_test: bool) -> Self {
    RenderState { depth_test, ..self }
  }

  pub fn depth_test(&self) -> bool {
    self.depth_test
  }

  pub fn set_depth_write(self, depth_write: bool) -> Self {
    RenderState {
      depth_write,
      ..self
    }
  }

  pub fn depth_write(&self) -> bool {
    self.depth_write
  }

  /// Depth bias, in units of the smallest resolvable depth difference. The geometry is pulled
  /// towards the viewer.
  pub fn set_depth_offset(self, depth_offset: u32) -> Self {
    RenderState {
      depth_offset,
      ..self
    }
  }

  pub fn depth_offset(&self) -> u32 {
    self.depth_offset
  }

  /// Compute what must change to go from `self` to `target`.
  pub fn delta(&self, target: &RenderState) -> StateDelta {
    fn changed<T: PartialEq + Copy>(from: T, to: T) -> Option<T> {
      if from != to {
        Some(to)
      } else {
        None
      }
    }

    let blending = if self.blend_src != target.blend_src
      || self.blend_dst != target.blend_dst
      || self.alpha_cutout != target.alpha_cutout
    {
      Some((target.blend_src, target.blend_dst, target.alpha_cutout))
    } else {
      None
    };

    StateDelta {
      cull: changed(self.cull, target.cull),
      fog: changed(self.fog, target.fog),
      blending,
      depth_test: changed(self.depth_test, target.depth_test),
      depth_write: changed(self.depth_write, target.depth_write),
      depth_offset: changed(self.depth_offset, target.depth_offset),
    }
  }
}

impl Default for RenderState {
  /// The default `RenderState`.
  ///
  ///   - `cull`: `false`
  ///   - `fog`: `false`
  ///   - blending: `(One, Zero)`
  ///   - `alpha_cutout`: `false`
  ///   - `depth_test`: `false`
  ///   - `depth_write`: `true`
  ///   - `depth_offset`: `0`
  fn default() -> Self {
    RenderState {
      cull: false,
      fog: false,
      blend_src: Factor::One,
      blend_dst: Factor::Zero,
      alpha_cutout: false,
      depth_test: false,
      depth_write: true,
      depth_offset: 0,
    }
  }
}

/// Per-field difference between two [`RenderState`]s.
///
/// Each field is `Some(new_value)` when it must be re-applied. Blend factors and the alpha cutout
/// flag travel together because they are resolved as a single unit.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StateDelta {
  pub cull: Option<bool>,
  pub fog: Option<bool>,
  pub blending: Option<(Factor, Factor, bool)>,
  pub depth_test: Option<bool>,
  pub depth_write: Option<bool>,
  pub depth_offset: Option<u32>,
}

impl StateDelta {
  /// Is there nothing to do?
  pub fn is_empty(&self) -> bool {
    *self == StateDelta::default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn no_delta_between_equal_states() {
    let state = RenderState::default().set_cull(true).set_depth_offset(2);
    assert!(state.delta(&state).is_empty());
  }

  #[test]
  fn delta_only_reports_changed_fields() {
    let from = RenderState::default();
    let to = from.set_fog(true).set_depth_write(false);
    let delta = from.delta(&to);

    assert_eq!(delta.fog, Some(true));
    assert_eq!(delta.depth_write, Some(false));
    assert_eq!(delta.cull, None);
    assert_eq!(delta.blending, None);
    assert_eq!(delta.depth_test, None);
    assert_eq!(delta.depth_offset, None);
  }

  #[test]
  fn cutout_toggle_is_a_blending_change() {
    let from = RenderState::default();
    let to = from.set_alpha_cutout(true);

    assert_eq!(
      from.delta(&to).blending,
      Some((Factor::One, Factor::Zero, true))
    );
  }
}
