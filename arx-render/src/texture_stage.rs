//! Fixed-function texture stages.
//!
//! Every texture unit is a stage combining its texture with the output of the previous stage. A
//! stage is enabled as long as its color operation is not [`TextureOp::Disable`]; only stages up
//! to the highest enabled one are applied before a draw.

use log::{debug, error, warn};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::driver::{
  Capability, CombineChannel, CombineFunction, CombineSource, Combiner, Driver, TextureHandle,
};
use crate::features::Features;
use crate::state::Cached;
use crate::texture::{self, Filter, SamplerState, Texture, TextureData, TextureRef, Wrap};

/// Operation of a stage channel.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TextureOp {
  /// Pass the previous stage through.
  Disable,
  /// Texture only.
  SelectArg1,
  /// Texture × previous.
  Modulate,
  /// Texture × previous × 2.
  Modulate2X,
  /// Texture × previous × 4.
  Modulate4X,
}

impl TextureOp {
  fn combiner(self) -> Combiner {
    let (function, source, scale) = match self {
      TextureOp::Disable => (CombineFunction::Replace, CombineSource::Previous, 1),
      TextureOp::SelectArg1 => (CombineFunction::Replace, CombineSource::Texture, 1),
      TextureOp::Modulate => (CombineFunction::Modulate, CombineSource::Texture, 1),
      TextureOp::Modulate2X => (CombineFunction::Modulate, CombineSource::Texture, 2),
      TextureOp::Modulate4X => (CombineFunction::Modulate, CombineSource::Texture, 4),
    };

    Combiner {
      function,
      source,
      scale,
    }
  }
}

fn channel_index(channel: CombineChannel) -> usize {
  match channel {
    CombineChannel::Color => 0,
    CombineChannel::Alpha => 1,
  }
}

/// State of one texture unit.
#[derive(Debug)]
pub struct TextureStage {
  texture: Option<Weak<RefCell<TextureData>>>,
  /// Texture bound to the unit.
  current: Option<TextureHandle>,
  ops: [TextureOp; 2],
  combiners: [Cached<Combiner>; 2],
  wrap: Wrap,
  min_filter: Filter,
  mag_filter: Filter,
  lod_bias: Cached<f32>,
}

impl TextureStage {
  fn new(ops: [TextureOp; 2]) -> Self {
    TextureStage {
      texture: None,
      current: None,
      ops,
      combiners: [Cached::empty(), Cached::empty()],
      wrap: Wrap::Repeat,
      min_filter: Filter::Linear,
      mag_filter: Filter::Linear,
      lod_bias: Cached::empty(),
    }
  }

  pub fn color_op(&self) -> TextureOp {
    self.ops[0]
  }

  pub fn alpha_op(&self) -> TextureOp {
    self.ops[1]
  }

  pub fn is_enabled(&self) -> bool {
    self.color_op() != TextureOp::Disable
  }

  pub fn wrap(&self) -> Wrap {
    self.wrap
  }

  pub fn min_filter(&self) -> Filter {
    self.min_filter
  }

  pub fn mag_filter(&self) -> Filter {
    self.mag_filter
  }

  /// Texture object bound to the unit, as far as the driver knows.
  pub fn bound(&self) -> Option<TextureHandle> {
    self.current
  }

  fn texture(&self) -> Option<TextureRef> {
    self.texture.as_ref().and_then(Weak::upgrade)
  }

  fn has_texture(&self, texture: &TextureRef) -> bool {
    self.texture().map_or(false, |t| Rc::ptr_eq(&t, texture))
  }
}

/// Every texture stage of a context, with the active unit.
///
/// Methods taking a stage index ignore stages the context does not have, which includes every
/// stage while the renderer is shut down.
#[derive(Debug)]
pub struct TextureStages {
  stages: Vec<TextureStage>,
  active: Cached<usize>,
  max_enabled: usize,
  warned_shared: bool,
}

impl TextureStages {
  pub fn new() -> Self {
    TextureStages {
      stages: Vec::new(),
      active: Cached::empty(),
      max_enabled: 0,
      warned_shared: false,
    }
  }

  /// Create `units` stages in their default state: stage 0 modulates color and selects texture
  /// alpha, every other stage is disabled.
  pub fn reset<D>(&mut self, driver: &mut D, units: usize)
  where
    D: Driver + ?Sized,
  {
    self.stages.clear();
    self.active.invalidate();
    self.max_enabled = 0;

    for unit in 0..units {
      if unit == 0 {
        let mut stage = TextureStage::new([TextureOp::Modulate, TextureOp::SelectArg1]);

        self.activate(driver, 0);
        driver.combine_mode();
        let alpha = Combiner {
          function: CombineFunction::Replace,
          source: CombineSource::Texture,
          scale: 1,
        };
        driver.combiner(CombineChannel::Alpha, alpha);
        driver.set_capability(Capability::Texture2D, true);

        stage.combiners[0].set(TextureOp::Modulate.combiner());
        stage.combiners[1].set(alpha);
        self.stages.push(stage);
      } else {
        self.stages.push(TextureStage::new([TextureOp::Disable, TextureOp::Disable]));
      }
    }
  }

  /// Forget every stage.
  pub fn clear(&mut self) {
    self.stages.clear();
    self.active.invalidate();
    self.max_enabled = 0;
  }

  pub fn len(&self) -> usize {
    self.stages.len()
  }

  pub fn is_empty(&self) -> bool {
    self.stages.is_empty()
  }

  pub fn get(&self, stage: usize) -> Option<&TextureStage> {
    self.stages.get(stage)
  }

  /// Highest enabled stage.
  pub fn max_enabled(&self) -> usize {
    self.max_enabled
  }

  fn has_stage(&self, stage: usize) -> bool {
    let known = stage < self.stages.len();
    if !known {
      debug!("ignoring unknown texture stage {} ({} available)", stage, self.stages.len());
    }

    known
  }

  fn stage_mut(&mut self, stage: usize) -> Option<&mut TextureStage> {
    if self.has_stage(stage) {
      self.stages.get_mut(stage)
    } else {
      None
    }
  }

  fn activate<D>(&mut self, driver: &mut D, unit: usize)
  where
    D: Driver + ?Sized,
  {
    if self.active.is_invalid(&unit) {
      driver.active_texture(unit);
      self.active.set(unit);
    }
  }

  pub fn set_color_op<D>(&mut self, driver: &mut D, stage: usize, op: TextureOp)
  where
    D: Driver + ?Sized,
  {
    self.set_op(driver, stage, CombineChannel::Color, op);
  }

  pub fn set_alpha_op<D>(&mut self, driver: &mut D, stage: usize, op: TextureOp)
  where
    D: Driver + ?Sized,
  {
    self.set_op(driver, stage, CombineChannel::Alpha, op);
  }

  fn set_op<D>(&mut self, driver: &mut D, stage: usize, channel: CombineChannel, op: TextureOp)
  where
    D: Driver + ?Sized,
  {
    if !self.has_stage(stage) {
      return;
    }

    self.activate(driver, stage);

    let was_enabled = self.stages[stage].is_enabled();
    self.stages[stage].ops[channel_index(channel)] = op;
    let enabled = self.stages[stage].is_enabled();

    if was_enabled != enabled {
      driver.set_capability(Capability::Texture2D, enabled);

      if enabled {
        driver.combine_mode();
        self.max_enabled = self.max_enabled.max(stage);
      } else if self.max_enabled == stage {
        self.max_enabled = (0..stage)
          .rev()
          .find(|&i| self.stages[i].is_enabled())
          .unwrap_or(0);
      }
    }

    let combiner = op.combiner();
    let cached = &mut self.stages[stage].combiners[channel_index(channel)];
    if cached.is_invalid(&combiner) {
      driver.combiner(channel, combiner);
      cached.set(combiner);
    }
  }

  /// Texture sampled by a stage; bound at the next [`TextureStages::apply`].
  pub fn set_texture(&mut self, stage: usize, texture: Option<&Texture>) {
    if let Some(stage) = self.stage_mut(stage) {
      stage.texture = texture.map(|t| Rc::downgrade(t.data()));
    }
  }

  pub fn set_wrap(&mut self, stage: usize, wrap: Wrap) {
    if let Some(stage) = self.stage_mut(stage) {
      stage.wrap = wrap;
    }
  }

  pub fn set_filters(&mut self, stage: usize, min: Filter, mag: Filter) {
    if let Some(stage) = self.stage_mut(stage) {
      stage.min_filter = min;
      stage.mag_filter = mag;
    }
  }

  pub fn set_lod_bias<D>(&mut self, driver: &mut D, stage: usize, bias: f32)
  where
    D: Driver + ?Sized,
  {
    if !self.has_stage(stage) {
      return;
    }

    if self.stages[stage].lod_bias.is_invalid(&bias) {
      self.activate(driver, stage);
      driver.lod_bias(bias);
      self.stages[stage].lod_bias.set(bias);
    }
  }

  /// Bind the textures of every stage up to the highest enabled one, uploading textures that are
  /// not resident yet.
  pub fn apply<D>(&mut self, driver: &mut D, features: Features, anisotropy: f32)
  where
    D: Driver + ?Sized,
  {
    if self.stages.is_empty() {
      return;
    }

    for stage in 0..=self.max_enabled.min(self.stages.len() - 1) {
      self.apply_stage(driver, stage, features, anisotropy);
    }
  }

  fn apply_stage<D>(&mut self, driver: &mut D, stage: usize, features: Features, anisotropy: f32)
  where
    D: Driver + ?Sized,
  {
    let texture = self.stages[stage].texture();

    if texture.is_none() && self.stages[stage].current.is_none() {
      return;
    }

    self.activate(driver, stage);

    let handle = match texture {
      Some(ref texture) => {
        let resident = texture.borrow().handle();
        match resident {
          Some(handle) => Some(handle),
          None => {
            let uploaded =
              texture::upload(driver, texture, features, |d, h| d.bind_texture(Some(h)));
            match uploaded {
              Ok(handle) => {
                self.stages[stage].current = Some(handle);
                Some(handle)
              }
              Err(e) => {
                error!("cannot upload texture: {}", e);
                None
              }
            }
          }
        }
      }
      None => None,
    };

    if self.stages[stage].current != handle {
      driver.bind_texture(handle);
      self.stages[stage].current = handle;
    }

    let texture = match texture {
      Some(texture) if handle.is_some() => texture,
      _ => return,
    };

    // an earlier stage already set the sampler of this texture
    let (wrap, min, mag) = {
      let s = &self.stages[stage];
      (s.wrap, s.min_filter, s.mag_filter)
    };

    let earlier = self.stages[..stage]
      .iter()
      .find(|s| s.is_enabled() && s.has_texture(&texture));

    if let Some(earlier) = earlier {
      let same = (earlier.wrap, earlier.min_filter, earlier.mag_filter) == (wrap, min, mag);
      if !same && !self.warned_shared {
        warn!("Same texture used in multiple stages with different attributes.");
        self.warned_shared = true;
      }
      return;
    }

    let mipmaps = texture.borrow().flags().mipmaps;
    let sampler = SamplerState::resolve(wrap, min, mag, mipmaps, anisotropy);
    texture.borrow_mut().apply_sampler(driver, sampler);
  }

  /// Bind a texture on unit 0 for uploading.
  pub(crate) fn bind_for_upload<D>(&mut self, driver: &mut D, handle: TextureHandle)
  where
    D: Driver + ?Sized,
  {
    self.activate(driver, 0);
    driver.bind_texture(Some(handle));

    if let Some(stage) = self.stages.first_mut() {
      stage.current = Some(handle);
    }
  }

  /// Forget the bindings of a deleted texture object.
  pub(crate) fn forget(&mut self, handle: TextureHandle) {
    for stage in &mut self.stages {
      if stage.current == Some(handle) {
        stage.current = None;
      }
    }
  }
}

impl Default for TextureStages {
  fn default() -> Self {
    Self::new()
  }
}
