//! Transform cache.
//!
//! Draw calls come in two flavours: world-space geometry going through the view and projection
//! matrices, and pre-transformed (screen-space) vertices. Switching between the two means
//! uploading matrices, so the currently loaded mode is cached and only explicit
//! `enable`/`disable` requests change it.

use crate::driver::{Driver, FogSource};

/// 4x4 floating matrix, column-major.
pub type M44 = [[f32; 4]; 4];

/// Identity matrix.
pub const IDENTITY: M44 = [
  [1., 0., 0., 0.],
  [0., 1., 0., 0.],
  [0., 0., 1., 0.],
  [0., 0., 0., 1.],
];

/// Matrix mode currently loaded in the driver.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TransformMode {
  /// Unknown; the next request uploads.
  Unset,
  /// Screen-space passthrough for pre-transformed vertices.
  NoTransform,
  /// Full view and projection pipeline.
  ModelViewProjection,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransformCache {
  mode: TransformMode,
  view: M44,
  projection: M44,
}

impl TransformCache {
  pub fn new() -> Self {
    TransformCache {
      mode: TransformMode::Unset,
      view: IDENTITY,
      projection: IDENTITY,
    }
  }

  pub fn mode(&self) -> TransformMode {
    self.mode
  }

  pub fn view(&self) -> &M44 {
    &self.view
  }

  pub fn projection(&self) -> &M44 {
    &self.projection
  }

  /// Forget what the driver has loaded.
  pub fn reset(&mut self) {
    self.mode = TransformMode::Unset;
  }

  pub fn set_view(&mut self, view: M44) {
    if self.view == view {
      return;
    }

    if self.mode == TransformMode::ModelViewProjection {
      self.mode = TransformMode::Unset;
    }

    self.view = view;
  }

  pub fn set_projection(&mut self, projection: M44) {
    if self.projection == projection {
      return;
    }

    if self.mode == TransformMode::ModelViewProjection {
      self.mode = TransformMode::Unset;
    }

    self.projection = projection;
  }

  /// The screen-space projection depends on the viewport size.
  pub fn viewport_changed(&mut self) {
    if self.mode == TransformMode::NoTransform {
      self.mode = TransformMode::Unset;
    }
  }

  /// Load the view and projection matrices.
  pub fn enable<D>(&mut self, driver: &mut D, vertex_fog: bool)
  where
    D: Driver + ?Sized,
  {
    if self.mode == TransformMode::ModelViewProjection {
      return;
    }

    driver.load_matrices(&self.view, &self.projection);

    if vertex_fog {
      driver.fog_source(FogSource::FragmentDepth);
    }

    self.mode = TransformMode::ModelViewProjection;
  }

  /// Load the screen-space passthrough for a `width` × `height` viewport.
  pub fn disable<D>(&mut self, driver: &mut D, width: i32, height: i32, vertex_fog: bool)
  where
    D: Driver + ?Sized,
  {
    if self.mode == TransformMode::NoTransform {
      return;
    }

    driver.load_matrices(&IDENTITY, &screen_projection(width, height));

    if vertex_fog {
      driver.fog_source(FogSource::FogCoordinate);
    }

    self.mode = TransformMode::NoTransform;
  }
}

impl Default for TransformCache {
  fn default() -> Self {
    Self::new()
  }
}

/// Map `[0, width] × [0, height]` (y down, pixel centers at half coordinates) to clip space.
///
/// This is `translate(-1, 1) · scale(2 / width, -2 / height) · translate(0.5, 0.5)`.
pub fn screen_projection(width: i32, height: i32) -> M44 {
  let w = width.max(1) as f32;
  let h = height.max(1) as f32;

  [
    [2. / w, 0., 0., 0.],
    [0., -2. / h, 0., 0.],
    [0., 0., 1., 0.],
    [1. / w - 1., 1. - 1. / h, 0., 1.],
  ]
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::driver::headless::{Call, HeadlessDriver};

  fn apply(m: &M44, x: f32, y: f32) -> (f32, f32) {
    (
      m[0][0] * x + m[1][0] * y + m[3][0],
      m[0][1] * x + m[1][1] * y + m[3][1],
    )
  }

  #[test]
  fn screen_projection_corners() {
    let m = screen_projection(640, 480);

    let (x, y) = apply(&m, -0.5, -0.5);
    assert!((x + 1.).abs() < 1e-6 && (y - 1.).abs() < 1e-6);

    let (x, y) = apply(&m, 639.5, 479.5);
    assert!((x - 1.).abs() < 1e-6 && (y + 1.).abs() < 1e-6);
  }

  #[test]
  fn uploads_only_on_mode_change() {
    let mut driver = HeadlessDriver::default();
    let mut cache = TransformCache::new();

    cache.enable(&mut driver, true);
    cache.enable(&mut driver, true);
    assert_eq!(driver.count(|c| matches!(c, Call::LoadMatrices(..))), 1);
    assert!(driver
      .calls()
      .contains(&Call::FogSource(FogSource::FragmentDepth)));

    cache.disable(&mut driver, 800, 600, false);
    cache.disable(&mut driver, 800, 600, false);
    assert_eq!(driver.count(|c| matches!(c, Call::LoadMatrices(..))), 2);
    assert_eq!(cache.mode(), TransformMode::NoTransform);
  }

  #[test]
  fn matrix_changes_invalidate_the_full_transform() {
    let mut driver = HeadlessDriver::default();
    let mut cache = TransformCache::new();

    cache.enable(&mut driver, false);
    cache.set_view(IDENTITY);
    assert_eq!(cache.mode(), TransformMode::ModelViewProjection);

    let mut view = IDENTITY;
    view[3][2] = -5.;
    cache.set_view(view);
    assert_eq!(cache.mode(), TransformMode::Unset);

    cache.enable(&mut driver, false);
    assert_eq!(driver.count(|c| matches!(c, Call::LoadMatrices(..))), 2);
  }

  #[test]
  fn viewport_changes_invalidate_the_passthrough_only() {
    let mut driver = HeadlessDriver::default();
    let mut cache = TransformCache::new();

    cache.enable(&mut driver, false);
    cache.viewport_changed();
    assert_eq!(cache.mode(), TransformMode::ModelViewProjection);

    cache.disable(&mut driver, 320, 200, false);
    cache.set_projection(screen_projection(1, 1));
    assert_eq!(cache.mode(), TransformMode::NoTransform);
    cache.viewport_changed();
    assert_eq!(cache.mode(), TransformMode::Unset);
  }
}
