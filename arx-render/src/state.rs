//! Render state reconciliation.
//!
//! The [`StateCache`] keeps two [`RenderState`]s: the *desired* one, freely modified by draw-call
//! producers, and the *applied* one, mirroring what the driver currently has. [`StateCache::flush`]
//! sends the difference to the driver and is the only place the applied state changes.
//!
//! Below the render state, a few driver-level values (alpha function, blending factors, sample
//! shading, alpha-to-coverage) are cached separately: several render states resolve to the same
//! driver state, and the alpha cutout resolution may rewrite the blending factors.

use log::error;

use crate::alpha_cutout::{resolve, AlphaTest, CutoutContext, Resolution};
use crate::blending::Factor;
use crate::driver::{AlphaFunc, Capability, DepthFunc, Driver};
use crate::render_state::RenderState;

/// Cached value.
///
/// A cached value is used to prevent issuing costly driver commands if we know the target value is
/// already set to what the command tries to set. An empty cache is invalid for every value, which
/// forces the next command to run.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Cached<T>(Option<T>)
where
  T: PartialEq;

impl<T> Cached<T>
where
  T: PartialEq,
{
  /// Cache a value.
  pub(crate) fn new(initial: T) -> Self {
    Cached(Some(initial))
  }

  pub(crate) fn empty() -> Self {
    Cached(None)
  }

  /// Explicitly invalidate a value.
  pub(crate) fn invalidate(&mut self) {
    self.0 = None;
  }

  pub(crate) fn set(&mut self, value: T) {
    self.0 = Some(value);
  }

  /// Check if the cached value is invalid regarding a value.
  ///
  /// A non-cached value (i.e. empty) is always invalid whatever compared value. If a value is
  /// already cached, then it’s invalid if it’s not equal ([`PartialEq`]) to the input value.
  pub(crate) fn is_invalid(&self, new_val: &T) -> bool {
    match &self.0 {
      Some(ref t) => t != new_val,
      _ => true,
    }
  }

  pub(crate) fn get(&self) -> Option<&T> {
    self.0.as_ref()
  }
}

/// Desired and applied render states, plus the driver-level state they resolve to.
#[derive(Debug)]
pub struct StateCache {
  desired: RenderState,
  applied: RenderState,
  sample_shading: bool,
  alpha_to_coverage: bool,
  /// `None` while the alpha test lets everything through.
  alpha_cutoff: Option<f32>,
  blend_func: Cached<(Factor, Factor)>,
}

impl StateCache {
  pub fn new() -> Self {
    StateCache {
      desired: RenderState::default(),
      applied: RenderState::default(),
      sample_shading: false,
      alpha_to_coverage: false,
      alpha_cutoff: None,
      blend_func: Cached::empty(),
    }
  }

  /// Put the driver in a known state matching the default render state.
  ///
  /// The alpha and depth tests stay enabled for the lifetime of the context; they are switched by
  /// their comparison functions instead.
  ///
  /// `sample_shading` and `multisample` tell whether the context has sample shading and a
  /// multisampled framebuffer. Sample shading and alpha-to-coverage are only touched when the
  /// context has them; otherwise they are known to be off and left alone.
  pub fn reset<D>(&mut self, driver: &mut D, sample_shading: bool, multisample: bool)
  where
    D: Driver + ?Sized,
  {
    driver.set_capability(Capability::CullFace, false);
    driver.set_capability(Capability::Fog, false);

    if sample_shading {
      driver.set_capability(Capability::SampleShading, false);
    }
    if multisample {
      driver.set_capability(Capability::AlphaToCoverage, false);
    }
    self.sample_shading = false;
    self.alpha_to_coverage = false;

    driver.set_capability(Capability::AlphaTest, true);
    driver.alpha_func(AlphaFunc::Always, 0.);
    self.alpha_cutoff = None;
    if sample_shading {
      driver.min_sample_shading(1.);
    }

    driver.set_capability(Capability::DepthTest, true);
    driver.depth_func(DepthFunc::Always);
    driver.depth_mask(true);

    driver.set_capability(Capability::PolygonOffsetFill, true);
    driver.polygon_offset(0., 0.);

    driver.set_capability(Capability::Blend, true);
    driver.blend_func(Factor::One, Factor::Zero);
    self.blend_func.set((Factor::One, Factor::Zero));

    // blending is marked as unknown so that the first flush resolves the alpha cutout state
    self.applied = RenderState::default()
      .set_blend(Factor::Zero, Factor::One)
      .set_depth_test(false)
      .set_depth_write(true);
  }

  /// State requested by draw-call producers.
  pub fn desired(&self) -> &RenderState {
    &self.desired
  }

  pub fn set_desired(&mut self, state: RenderState) {
    self.desired = state;
  }

  /// State the driver currently has.
  pub fn applied(&self) -> &RenderState {
    &self.applied
  }

  /// Is a flush pending?
  pub fn is_dirty(&self) -> bool {
    self.applied != self.desired
  }

  /// Send the difference between the desired and applied states to the driver.
  ///
  /// Returns whether anything had to be applied.
  pub fn flush<D>(&mut self, driver: &mut D, ctx: CutoutContext) -> bool
  where
    D: Driver + ?Sized,
  {
    if !self.is_dirty() {
      return false;
    }

    let delta = self.applied.delta(&self.desired);

    if let Some(cull) = delta.cull {
      driver.set_capability(Capability::CullFace, cull);
    }

    if let Some(fog) = delta.fog {
      driver.set_capability(Capability::Fog, fog);
    }

    if let Some((src, dst, alpha_cutout)) = delta.blending {
      self.apply_blending(driver, src, dst, alpha_cutout, ctx);
    }

    if let Some(depth_test) = delta.depth_test {
      driver.depth_func(if depth_test {
        DepthFunc::LessOrEqual
      } else {
        DepthFunc::Always
      });
    }

    if let Some(depth_write) = delta.depth_write {
      driver.depth_mask(depth_write);
    }

    if let Some(depth_offset) = delta.depth_offset {
      let offset = -(depth_offset as f32);
      driver.polygon_offset(offset, offset);
    }

    self.applied = self.desired;

    true
  }

  fn apply_blending<D>(
    &mut self,
    driver: &mut D,
    src: Factor,
    dst: Factor,
    alpha_cutout: bool,
    ctx: CutoutContext,
  ) where
    D: Driver + ?Sized,
  {
    let resolution = match resolve(src, dst, alpha_cutout, ctx) {
      Ok(resolution) => resolution,

      Err(err) => {
        debug_assert!(false, "{}", err);
        error!("{}", err);

        Resolution {
          blend_src: src,
          blend_dst: dst,
          test: AlphaTest::Conservative,
        }
      }
    };

    let sample_shading = resolution.test == AlphaTest::SampleShading;
    let alpha_to_coverage = resolution.test == AlphaTest::AlphaToCoverage;

    // both must never be enabled at the same time: disable first, then enable
    if self.sample_shading && !sample_shading {
      driver.set_capability(Capability::SampleShading, false);
      self.sample_shading = false;
    }

    if self.alpha_to_coverage && !alpha_to_coverage {
      driver.set_capability(Capability::AlphaToCoverage, false);
      self.alpha_to_coverage = false;
    }

    if !self.sample_shading && sample_shading {
      driver.set_capability(Capability::SampleShading, true);
      self.sample_shading = true;
    }

    if !self.alpha_to_coverage && alpha_to_coverage {
      driver.set_capability(Capability::AlphaToCoverage, true);
      self.alpha_to_coverage = true;
    }

    match resolution.test.cutoff() {
      None => {
        if self.alpha_cutoff.is_some() {
          driver.alpha_func(AlphaFunc::Always, 0.);
          self.alpha_cutoff = None;
        }
      }

      Some(cutoff) => {
        if self.alpha_cutoff != Some(cutoff) {
          driver.alpha_func(AlphaFunc::Greater, cutoff);
          self.alpha_cutoff = Some(cutoff);
        }
      }
    }

    let factors = (resolution.blend_src, resolution.blend_dst);
    if self.blend_func.is_invalid(&factors) {
      driver.blend_func(factors.0, factors.1);
      self.blend_func.set(factors);
    }
  }

  /// Make sure depth writes are on, e.g. because clears respect the depth mask.
  pub fn force_depth_write<D>(&mut self, driver: &mut D)
  where
    D: Driver + ?Sized,
  {
    if !self.applied.depth_write() {
      driver.depth_mask(true);
      self.applied = self.applied.set_depth_write(true);
    }
  }

  /// Flush an alpha cutout-free state, then restore the requested cutout.
  ///
  /// The driver state used for alpha cutouts depends on multisampling; this must be done with the
  /// old multisampling state before it changes.
  pub fn reset_alpha_cutout<D>(&mut self, driver: &mut D, ctx: CutoutContext)
  where
    D: Driver + ?Sized,
  {
    if !self.applied.alpha_cutout() {
      return;
    }

    let desired = self.desired;
    self.desired = desired.set_alpha_cutout(false);
    self.flush(driver, ctx);
    self.desired = desired;
  }
}

impl Default for StateCache {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::alpha_cutout::AlphaCutoutAA;
  use crate::driver::headless::{Call, HeadlessDriver};

  fn ctx(multisampling: bool, preference: AlphaCutoutAA) -> CutoutContext {
    CutoutContext {
      multisampling,
      sample_shading: true,
      preference,
    }
  }

  fn setup() -> (HeadlessDriver, StateCache) {
    let mut driver = HeadlessDriver::default();
    let mut cache = StateCache::new();
    cache.reset(&mut driver, true, true);
    driver.clear_calls();
    (driver, cache)
  }

  #[test]
  fn cached_values() {
    let mut cached = Cached::new(3);
    assert!(!cached.is_invalid(&3));
    assert!(cached.is_invalid(&4));

    cached.invalidate();
    assert!(cached.is_invalid(&3));
    assert_eq!(cached.get(), None);

    cached.set(4);
    assert_eq!(cached.get(), Some(&4));
  }

  #[test]
  fn first_flush_resolves_blending_without_redundant_calls() {
    let (mut driver, mut cache) = setup();

    assert!(cache.flush(&mut driver, ctx(false, AlphaCutoutAA::Crisp)));
    // blending factors and alpha function already match the reset state
    assert!(driver.calls().is_empty());
    assert_eq!(cache.applied(), &RenderState::default());
  }

  #[test]
  fn flush_is_idempotent() {
    let (mut driver, mut cache) = setup();
    let state = RenderState::default()
      .set_cull(true)
      .set_fog(true)
      .set_blend(Factor::SrcAlpha, Factor::SrcAlphaComplement)
      .set_alpha_cutout(true)
      .set_depth_test(true)
      .set_depth_write(false)
      .set_depth_offset(2);

    cache.set_desired(state);
    assert!(cache.flush(&mut driver, ctx(true, AlphaCutoutAA::Crisp)));
    let issued = driver.calls().len();
    assert!(issued > 0);

    assert!(!cache.flush(&mut driver, ctx(true, AlphaCutoutAA::Crisp)));
    assert_eq!(driver.calls().len(), issued);
  }

  #[test]
  fn only_changed_fields_are_sent() {
    let (mut driver, mut cache) = setup();
    cache.flush(&mut driver, ctx(false, AlphaCutoutAA::None));

    cache.set_desired(cache.desired().set_depth_offset(3));
    cache.flush(&mut driver, ctx(false, AlphaCutoutAA::None));

    assert_eq!(driver.calls(), &[Call::PolygonOffset(-3., -3.)]);
  }

  #[test]
  fn round_trip_through_the_driver() {
    let states = [
      RenderState::default(),
      RenderState::default()
        .set_cull(true)
        .set_depth_test(true)
        .set_depth_offset(1),
      RenderState::default()
        .set_blend(Factor::SrcAlpha, Factor::SrcAlphaComplement)
        .set_alpha_cutout(true)
        .set_fog(true),
      RenderState::default()
        .set_alpha_cutout(true)
        .set_depth_write(false),
    ];

    let (mut driver, mut cache) = setup();

    for state in states.iter().copied() {
      cache.set_desired(state);
      cache.flush(&mut driver, ctx(false, AlphaCutoutAA::Crisp));

      assert_eq!(cache.applied(), &state);
      assert_eq!(driver.state().render_state(), state);
    }
  }

  #[test]
  fn opaque_cutout_without_msaa_is_a_strict_test() {
    let (mut driver, mut cache) = setup();

    cache.set_desired(RenderState::default().set_alpha_cutout(true));
    cache.flush(&mut driver, ctx(false, AlphaCutoutAA::Crisp));

    assert_eq!(driver.calls(), &[Call::AlphaFunc(AlphaFunc::Greater, 0.5)]);
    assert!(!driver.state().is_enabled(Capability::SampleShading));
    assert!(!driver.state().is_enabled(Capability::AlphaToCoverage));
  }

  #[test]
  fn additive_cutout_rewrites_blending() {
    let (mut driver, mut cache) = setup();

    cache.set_desired(
      RenderState::default()
        .set_blend(Factor::One, Factor::One)
        .set_alpha_cutout(true),
    );
    cache.flush(&mut driver, ctx(true, AlphaCutoutAA::Fuzzy));

    assert_eq!(driver.state().blend_func, (Factor::SrcAlpha, Factor::One));
    assert_eq!(driver.state().alpha_func, (AlphaFunc::Greater, 0.));
  }

  #[test]
  fn sample_shading_and_alpha_to_coverage_never_overlap() {
    let (mut driver, mut cache) = setup();
    let cutout = RenderState::default().set_alpha_cutout(true);

    cache.set_desired(cutout);
    cache.flush(&mut driver, ctx(true, AlphaCutoutAA::Fuzzy));
    assert!(driver.state().is_enabled(Capability::AlphaToCoverage));

    // the preference changed: clear the cutout state and apply it again
    cache.reset_alpha_cutout(&mut driver, ctx(true, AlphaCutoutAA::Fuzzy));
    driver.clear_calls();
    cache.flush(&mut driver, ctx(true, AlphaCutoutAA::Crisp));
    assert!(driver.state().is_enabled(Capability::SampleShading));
    assert!(!driver.state().is_enabled(Capability::AlphaToCoverage));

    // going straight from one to the other disables before enabling
    cache.set_desired(cutout.set_depth_write(false));
    cache.flush(&mut driver, ctx(true, AlphaCutoutAA::Crisp));
    cache.set_desired(RenderState::default());
    cache.flush(&mut driver, ctx(true, AlphaCutoutAA::Crisp));
    cache.set_desired(cutout);
    driver.clear_calls();
    cache.flush(&mut driver, ctx(true, AlphaCutoutAA::Fuzzy));
    assert_eq!(
      driver.calls(),
      &[
        Call::SetCapability(Capability::AlphaToCoverage, true),
        Call::AlphaFunc(AlphaFunc::Greater, 0.),
      ]
    );

    let (mut driver, mut cache) = setup();
    cache.set_desired(cutout);
    cache.flush(&mut driver, ctx(true, AlphaCutoutAA::Crisp));
    cache.set_desired(cutout.set_blend(Factor::DstColor, Factor::Zero));
    cache.flush(&mut driver, ctx(true, AlphaCutoutAA::Crisp));
    cache.set_desired(cutout);
    driver.clear_calls();
    cache.flush(&mut driver, ctx(true, AlphaCutoutAA::Fuzzy));

    let disable = driver
      .calls()
      .iter()
      .position(|c| *c == Call::SetCapability(Capability::SampleShading, false));
    let enable = driver
      .calls()
      .iter()
      .position(|c| *c == Call::SetCapability(Capability::AlphaToCoverage, true));
    assert!(disable.is_some() && enable.is_some());
    assert!(disable < enable);
  }

  #[test]
  fn disabling_the_cutout_resets_the_threshold() {
    let (mut driver, mut cache) = setup();

    cache.set_desired(RenderState::default().set_alpha_cutout(true));
    cache.flush(&mut driver, ctx(false, AlphaCutoutAA::None));
    cache.set_desired(RenderState::default());
    driver.clear_calls();
    cache.flush(&mut driver, ctx(false, AlphaCutoutAA::None));

    assert_eq!(driver.calls(), &[Call::AlphaFunc(AlphaFunc::Always, 0.)]);
  }

  #[test]
  #[cfg_attr(debug_assertions, should_panic(expected = "inverted alpha blending"))]
  fn inverted_alpha_blending_with_cutout() {
    let (mut driver, mut cache) = setup();

    cache.set_desired(
      RenderState::default()
        .set_blend(Factor::SrcAlphaComplement, Factor::SrcAlpha)
        .set_alpha_cutout(true),
    );
    cache.flush(&mut driver, ctx(false, AlphaCutoutAA::None));

    // release builds fall back to the conservative test
    assert_eq!(driver.state().alpha_func, (AlphaFunc::Greater, 0.));
  }

  #[test]
  fn forced_depth_write() {
    let (mut driver, mut cache) = setup();

    cache.set_desired(RenderState::default().set_depth_write(false));
    cache.flush(&mut driver, ctx(false, AlphaCutoutAA::None));
    driver.clear_calls();

    cache.force_depth_write(&mut driver);
    cache.force_depth_write(&mut driver);
    assert_eq!(driver.calls(), &[Call::DepthMask(true)]);

    // the next flush restores the requested mask
    cache.flush(&mut driver, ctx(false, AlphaCutoutAA::None));
    assert_eq!(driver.calls().last(), Some(&Call::DepthMask(false)));
  }

  #[test]
  fn reset_leaves_missing_capabilities_alone() {
    let mut driver = HeadlessDriver::default();
    let mut cache = StateCache::new();
    cache.reset(&mut driver, false, false);

    let touched = driver.calls().iter().any(|c| {
      matches!(
        c,
        Call::SetCapability(Capability::SampleShading, _)
          | Call::SetCapability(Capability::AlphaToCoverage, _)
          | Call::MinSampleShading(_)
      )
    });
    assert!(!touched);

    driver.clear_calls();
    cache.reset(&mut driver, true, true);

    let calls = driver.calls();
    assert!(calls.contains(&Call::SetCapability(Capability::SampleShading, false)));
    assert!(calls.contains(&Call::SetCapability(Capability::AlphaToCoverage, false)));
  }
}
