//! Renderer lifecycle and frame operations.
//!
//! A [`Renderer`] owns a [`Driver`] and everything derived from the context behind it: the
//! capability probe, the feature matrix, the state and transform caches and the texture stages.
//! It goes through the following lifecycle:
//!
//! - [`Renderer::initialize`] probes the context once it is current and calls
//!   [`Renderer::reinit`].
//! - [`Renderer::reinit`] puts the driver in a known state and notifies the listeners.
//! - [`Renderer::shutdown`] notifies the listeners, then drops per-context resources.
//!
//! Resizing the window may destroy the context on some platforms; [`Renderer::before_resize`] and
//! [`Renderer::after_resize`] bracket the resize and go through a shutdown / reinit cycle when
//! needed. Textures survive it: their GPU side is released and re-uploaded on next use.

use log::{debug, error, info};
use std::error;
use std::fmt;
use std::mem;

use crate::alpha_cutout::{AlphaCutoutAA, CutoutContext};
use crate::buffer::{
  self, BufferError, BufferGraveyard, BufferUsage, StrategySelector, VertexBuffer, WriteFlags,
};
use crate::config::RendererConfig;
use crate::driver::{
  Capability, ClearBuffers, Driver, DriverError, FillMode, Indices, MemoryInfo, MemoryInfoSource,
  Primitive, VertexSource,
};
use crate::features::{Feature, Features};
use crate::gl_info::GraphicsContextInfo;
use crate::image::Image;
use crate::platform::Platform;
use crate::render_state::RenderState;
use crate::state::StateCache;
use crate::texture::{self, Filter, Texture, TextureFlags, TextureRegistry, Wrap};
use crate::texture_stage::{TextureOp, TextureStages};
use crate::transform::{TransformCache, M44};
use crate::vertex::{TexturedVertex, Vertex};

/// Window-space rectangle, y down.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Rect {
  pub left: i32,
  pub top: i32,
  pub right: i32,
  pub bottom: i32,
}

impl Rect {
  pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
    Rect {
      left,
      top,
      right,
      bottom,
    }
  }

  pub fn width(&self) -> i32 {
    self.right - self.left
  }

  pub fn height(&self) -> i32 {
    self.bottom - self.top
  }

  pub fn is_valid(&self) -> bool {
    self.left <= self.right && self.top <= self.bottom
  }
}

/// Dependents of the renderer lifecycle.
///
/// Listeners are called with the renderer, so they can recreate their GPU resources.
pub trait RendererListener<D>
where
  D: Driver,
{
  /// The renderer has been (re)initialized.
  fn on_renderer_init(&mut self, renderer: &mut Renderer<D>);

  /// The renderer is about to lose its context.
  fn on_renderer_shutdown(&mut self, renderer: &mut Renderer<D>);
}

/// Possible errors that might occur when using the renderer.
///
/// Please keep in mind that this `enum` is _non exhaustive_; you will not be able to exhaustively
/// pattern-match against it.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RendererError {
  /// The operation needs a context.
  NotInitialized,
  /// Vertex buffer error.
  Buffer(BufferError),
  /// The driver reported an error.
  Driver(DriverError),
}

impl fmt::Display for RendererError {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    match *self {
      RendererError::NotInitialized => f.write_str("renderer not initialized"),
      RendererError::Buffer(ref e) => write!(f, "buffer error: {}", e),
      RendererError::Driver(ref e) => write!(f, "driver error: {}", e),
    }
  }
}

impl error::Error for RendererError {
  fn source(&self) -> Option<&(dyn error::Error + 'static)> {
    match self {
      RendererError::NotInitialized => None,
      RendererError::Buffer(e) => Some(e),
      RendererError::Driver(e) => Some(e),
    }
  }
}

impl From<BufferError> for RendererError {
  fn from(e: BufferError) -> Self {
    RendererError::Buffer(e)
  }
}

impl From<DriverError> for RendererError {
  fn from(e: DriverError) -> Self {
    RendererError::Driver(e)
  }
}

/// Fixed-function renderer.
pub struct Renderer<D>
where
  D: Driver,
{
  driver: D,
  platform: Platform,
  config: RendererConfig,
  info: Option<GraphicsContextInfo>,
  features: Features,
  initialized: bool,
  state: StateCache,
  transform: TransformCache,
  stages: TextureStages,
  textures: TextureRegistry,
  buffers: BufferGraveyard,
  selector: StrategySelector,
  msaa_level: u32,
  has_msaa: bool,
  max_anisotropy: f32,
  max_supported_anisotropy: f32,
  window_size: (i32, i32),
  viewport: Option<Rect>,
  scissor: Option<Rect>,
  listeners: Vec<Box<dyn RendererListener<D>>>,
}

impl<D> Renderer<D>
where
  D: Driver,
{
  /// Create an uninitialized renderer for the platform the crate is compiled for.
  pub fn new(driver: D, config: RendererConfig) -> Self {
    Self::with_platform(driver, config, Platform::current())
  }

  pub fn with_platform(driver: D, config: RendererConfig, platform: Platform) -> Self {
    Renderer {
      driver,
      platform,
      config,
      info: None,
      features: Features::none(),
      initialized: false,
      state: StateCache::new(),
      transform: TransformCache::new(),
      stages: TextureStages::new(),
      textures: TextureRegistry::new(),
      buffers: BufferGraveyard::default(),
      selector: StrategySelector::new(),
      msaa_level: 0,
      has_msaa: false,
      max_anisotropy: 1.,
      max_supported_anisotropy: 1.,
      window_size: (0, 0),
      viewport: None,
      scissor: None,
      listeners: Vec::new(),
    }
  }

  pub fn driver(&self) -> &D {
    &self.driver
  }

  pub fn driver_mut(&mut self) -> &mut D {
    &mut self.driver
  }

  pub fn config(&self) -> &RendererConfig {
    &self.config
  }

  pub fn platform(&self) -> Platform {
    self.platform
  }

  /// Context information; `None` until initialized once.
  pub fn info(&self) -> Option<&GraphicsContextInfo> {
    self.info.as_ref()
  }

  pub fn features(&self) -> Features {
    self.features
  }

  pub fn has(&self, feature: Feature) -> bool {
    self.features.has(feature)
  }

  pub fn is_initialized(&self) -> bool {
    self.initialized
  }

  pub fn add_listener(&mut self, listener: Box<dyn RendererListener<D>>) {
    self.listeners.push(listener);
  }

  /// Size of the window, used to flip window-space rectangles.
  pub fn set_window_size(&mut self, width: u32, height: u32) {
    self.window_size = (
      i32::try_from(width).unwrap_or(i32::MAX),
      i32::try_from(height).unwrap_or(i32::MAX),
    );
  }

  /// Probe the current context, derive the feature matrix and initialize.
  pub fn initialize(&mut self) {
    let [persisted, runtime] = self.config.override_sources();
    let info = GraphicsContextInfo::probe(&self.driver, self.platform, &[persisted, runtime]);

    self.log_context(&info);
    self.features = Features::derive(&info);
    debug!("OpenGL features: {:?}", self.features);
    self.info = Some(info);

    self.reinit();
  }

  fn log_context(&self, info: &GraphicsContextInfo) {
    info!("Using OpenGL {}", info.version_string());
    info!(" ├─ Vendor: {}", info.vendor());
    info!(" ├─ Device: {}", info.renderer());

    let has_flags = if info.is_es() {
      info.is(3, 2)
    } else {
      info.is(3, 0)
    };

    if has_flags {
      let flags = self.driver.context_flags();

      if flags.debug {
        info!(" ├─ Context type: debug");
      }

      if flags.no_error {
        info!(" ├─ Context type: no error");
      }
    }

    let memory = if info.has_extension("GL_NVX_gpu_memory_info") {
      self.driver.memory_info(MemoryInfoSource::Nvx)
    } else if info.has_extension("GL_ATI_meminfo") {
      self.driver.memory_info(MemoryInfoSource::Ati)
    } else {
      MemoryInfo::default()
    };

    info!(" └─ VRAM: {}", format_vram(memory));
  }

  /// Put the driver in its default state and notify the listeners.
  pub fn reinit(&mut self) {
    if self.initialized {
      debug_assert!(false, "renderer already initialized");
      error!("renderer already initialized");
      return;
    }

    self.msaa_level = if self.driver.sample_buffers() > 0 {
      self.driver.samples()
    } else {
      0
    };

    if self.msaa_level > 0 {
      self.driver.set_capability(Capability::Multisample, false);
    }

    self.has_msaa = false;

    self.driver.fog_linear(
      self.features.has(Feature::Fogx),
      self.features.has(Feature::FogDistanceMode),
    );

    self.state.reset(
      &mut self.driver,
      self.features.has(Feature::SampleShading),
      self.msaa_level > 0,
    );

    self.driver.pixel_alignment(1);

    let units = self.driver.max_texture_units();
    self.stages.reset(&mut self.driver, units);

    self.viewport = None;
    self.scissor = None;
    self.initialized = true;

    if self.features.has(Feature::AnisotropicFiltering) {
      self.max_supported_anisotropy = self.driver.max_anisotropy().max(1.);
      self.set_max_anisotropy(self.config.max_anisotropy());
    } else {
      self.max_supported_anisotropy = 1.;
      self.max_anisotropy = 1.;
    }

    self.clear(ClearBuffers::ALL, [0., 0., 0., 0.], 1., &[]);

    self.driver.enable_client_arrays();
    self.transform.reset();

    self.notify(|listener, renderer| listener.on_renderer_init(renderer));
  }

  /// Notify the listeners, then drop every per-context resource.
  pub fn shutdown(&mut self) {
    if !self.initialized {
      debug_assert!(false, "renderer not initialized");
      error!("renderer not initialized");
      return;
    }

    self.notify(|listener, renderer| listener.on_renderer_shutdown(renderer));

    self.textures.release_all(&mut self.driver);
    buffer::collect_buffers(&mut self.driver, &self.buffers);

    self.stages.clear();
    self.max_anisotropy = 1.;
    self.max_supported_anisotropy = 1.;
    self.initialized = false;
  }

  fn notify<F>(&mut self, mut f: F)
  where
    F: FnMut(&mut dyn RendererListener<D>, &mut Self),
  {
    let mut listeners = mem::take(&mut self.listeners);

    for listener in &mut listeners {
      f(listener.as_mut(), self);
    }

    // keep listeners registered during the notification
    let added = mem::replace(&mut self.listeners, listeners);
    self.listeners.extend(added);
  }

  /// The window is about to be resized; `was_or_is_fullscreen` tells whether the resize enters or
  /// leaves fullscreen mode.
  pub fn before_resize(&mut self, was_or_is_fullscreen: bool) {
    if self.initialized && self.platform.resize_loses_context(was_or_is_fullscreen) {
      self.shutdown();
    }
  }

  /// The window has been resized.
  pub fn after_resize(&mut self) {
    if !self.initialized {
      self.reinit();
    }
  }

  /// MSAA samples of the context; `0` without multisampling.
  pub fn msaa_level(&self) -> u32 {
    self.msaa_level
  }

  /// Is multisampling currently enabled?
  pub fn has_msaa(&self) -> bool {
    self.has_msaa
  }

  fn cutout_context(&self) -> CutoutContext {
    CutoutContext {
      multisampling: self.has_msaa,
      sample_shading: self.features.has(Feature::SampleShading),
      preference: self.config.alpha_cutout_aa(),
    }
  }

  /// Render state of the next draws.
  pub fn render_state(&self) -> RenderState {
    *self.state.desired()
  }

  pub fn set_render_state(&mut self, state: RenderState) {
    self.state.set_desired(state);
  }

  pub fn state_cache(&self) -> &StateCache {
    &self.state
  }

  /// Apply pending state changes; done before every draw.
  pub fn flush_state(&mut self) {
    let ctx = self.cutout_context();
    self.state.flush(&mut self.driver, ctx);
    self
      .stages
      .apply(&mut self.driver, self.features, self.max_anisotropy);
  }

  pub fn transform(&self) -> &TransformCache {
    &self.transform
  }

  pub fn set_view_matrix(&mut self, view: M44) {
    self.transform.set_view(view);
  }

  pub fn set_projection_matrix(&mut self, projection: M44) {
    self.transform.set_projection(projection);
  }

  /// Use the view and projection matrices for the next draws.
  pub fn enable_transform(&mut self) {
    let vertex_fog = self.features.has(Feature::VertexFogCoordinate);
    self.transform.enable(&mut self.driver, vertex_fog);
  }

  /// Draw pre-transformed vertices, in window coordinates.
  pub fn disable_transform(&mut self) {
    let vertex_fog = self.features.has(Feature::VertexFogCoordinate);
    let (width, height) = self
      .viewport
      .map_or(self.window_size, |v| (v.width(), v.height()));
    self
      .transform
      .disable(&mut self.driver, width, height, vertex_fog);
  }

  pub fn viewport(&self) -> Option<Rect> {
    self.viewport
  }

  pub fn set_viewport(&mut self, viewport: Rect) {
    if self.viewport == Some(viewport) {
      return;
    }

    let height = self.window_size.1;
    self.driver.viewport(
      viewport.left,
      height - viewport.bottom,
      viewport.width(),
      viewport.height(),
    );

    self.viewport = Some(viewport);
    self.transform.viewport_changed();
  }

  pub fn scissor(&self) -> Option<Rect> {
    self.scissor
  }

  /// Restrict rendering to a rectangle; `None` or an invalid rectangle disables scissoring.
  pub fn set_scissor(&mut self, scissor: Option<Rect>) {
    let scissor = scissor.filter(Rect::is_valid);

    if self.scissor == scissor {
      return;
    }

    match scissor {
      Some(rect) => {
        if self.scissor.is_none() {
          self.driver.set_capability(Capability::ScissorTest, true);
        }

        let height = self.window_size.1;
        self
          .driver
          .scissor(rect.left, height - rect.bottom, rect.width(), rect.height());
      }

      None => {
        self.driver.set_capability(Capability::ScissorTest, false);
      }
    }

    self.scissor = scissor;
  }

  /// Clear the whole framebuffer, or only `rects` if not empty.
  pub fn clear(&mut self, buffers: ClearBuffers, color: [f32; 4], depth: f32, rects: &[Rect]) {
    if buffers.is_empty() {
      return;
    }

    if buffers.color {
      self.driver.clear_color(color);
    }

    if buffers.depth {
      // clears respect the depth mask
      self.state.force_depth_write(&mut self.driver);
      self
        .driver
        .clear_depth(depth, self.features.has(Feature::ClearDepthf));
    }

    if rects.is_empty() {
      let scissor = self.scissor.is_some();

      if scissor {
        self.driver.set_capability(Capability::ScissorTest, false);
      }

      self.driver.clear(buffers);

      if scissor {
        self.driver.set_capability(Capability::ScissorTest, true);
      }
    } else {
      let saved = self.scissor;

      for &rect in rects {
        self.set_scissor(Some(rect));
        self.driver.clear(buffers);
      }

      self.set_scissor(saved);
    }
  }

  pub fn set_fog_color(&mut self, color: [f32; 4]) {
    self.driver.fog_color(color);
  }

  pub fn set_fog_params(&mut self, start: f32, end: f32) {
    self.driver.fog_range(start, end);
  }

  /// Toggle multisampling, if the context has it and the configuration allows it.
  pub fn set_antialiasing(&mut self, enable: bool) {
    if self.msaa_level == 0 || (enable && !self.config.antialiasing()) || enable == self.has_msaa {
      return;
    }

    // the cutout state depends on multisampling
    let ctx = self.cutout_context();
    self.state.reset_alpha_cutout(&mut self.driver, ctx);

    self.driver.set_capability(Capability::Multisample, enable);
    self.has_msaa = enable;
  }

  pub fn set_fill_mode(&mut self, mode: FillMode) {
    self.driver.polygon_mode(mode);
  }

  pub fn max_anisotropy(&self) -> f32 {
    self.max_anisotropy
  }

  pub fn max_supported_anisotropy(&self) -> f32 {
    self.max_supported_anisotropy
  }

  /// Set the anisotropic filtering level, clamped to what the driver supports.
  pub fn set_max_anisotropy(&mut self, value: f32) {
    let value = value.max(1.).min(self.max_supported_anisotropy);

    if self.max_anisotropy == value {
      return;
    }

    self.max_anisotropy = value;
    self.textures.invalidate_samplers();
  }

  /// Best alpha cutout anti-aliasing mode of the context.
  pub fn max_supported_alpha_cutout_aa(&self) -> AlphaCutoutAA {
    if self.features.has(Feature::SampleShading) {
      AlphaCutoutAA::Crisp
    } else {
      AlphaCutoutAA::Fuzzy
    }
  }

  /// Number of texture stages of the context.
  pub fn texture_stage_count(&self) -> usize {
    self.stages.len()
  }

  pub fn texture_stages(&self) -> &TextureStages {
    &self.stages
  }

  pub fn set_texture(&mut self, stage: usize, texture: Option<&Texture>) {
    self.stages.set_texture(stage, texture);
  }

  pub fn set_color_op(&mut self, stage: usize, op: TextureOp) {
    self.stages.set_color_op(&mut self.driver, stage, op);
  }

  pub fn set_alpha_op(&mut self, stage: usize, op: TextureOp) {
    self.stages.set_alpha_op(&mut self.driver, stage, op);
  }

  pub fn set_wrap(&mut self, stage: usize, wrap: Wrap) {
    self.stages.set_wrap(stage, wrap);
  }

  pub fn set_filters(&mut self, stage: usize, min: Filter, mag: Filter) {
    self.stages.set_filters(stage, min, mag);
  }

  pub fn set_lod_bias(&mut self, stage: usize, bias: f32) {
    self.stages.set_lod_bias(&mut self.driver, stage, bias);
  }

  /// Register a texture; it is uploaded when first used.
  pub fn create_texture(&mut self, image: Image, flags: TextureFlags) -> Texture {
    self.textures.create(image, flags)
  }

  pub fn texture_count(&self) -> usize {
    self.textures.len()
  }

  /// Upload a texture now.
  pub fn upload_texture(&mut self, texture: &Texture) -> Result<(), RendererError> {
    if !self.initialized {
      return Err(RendererError::NotInitialized);
    }

    let stages = &mut self.stages;
    texture::upload(&mut self.driver, texture.data(), self.features, |d, h| {
      stages.bind_for_upload(d, h)
    })?;

    Ok(())
  }

  /// Drop the GPU side of every texture.
  pub fn release_all_textures(&mut self) {
    for handle in self.textures.release_all(&mut self.driver) {
      self.stages.forget(handle);
    }
  }

  /// Upload every texture again.
  pub fn restore_all_textures(&mut self) -> Result<(), RendererError> {
    self.reupload(|_| true)
  }

  /// Upload color-keyed textures again, e.g. after the color key changed.
  pub fn reload_color_key_textures(&mut self) -> Result<(), RendererError> {
    self.reupload(|flags| flags.color_key)
  }

  fn reupload<F>(&mut self, filter: F) -> Result<(), RendererError>
  where
    F: Fn(TextureFlags) -> bool,
  {
    if !self.initialized {
      return Err(RendererError::NotInitialized);
    }

    for texture in self.textures.select(|t| filter(t.flags())) {
      let stages = &mut self.stages;
      texture::upload(&mut self.driver, &texture, self.features, |d, h| {
        stages.bind_for_upload(d, h)
      })?;
    }

    Ok(())
  }

  /// Delete the GPU objects of dropped textures and buffers.
  fn collect(&mut self) {
    for handle in self.textures.collect(&mut self.driver) {
      self.stages.forget(handle);
    }

    buffer::collect_buffers(&mut self.driver, &self.buffers);
  }

  /// Create a vertex buffer of `capacity` vertices.
  ///
  /// The upload strategy depends on the feature matrix, `usage` and the configured preference.
  pub fn create_vertex_buffer<V>(
    &mut self,
    capacity: usize,
    usage: BufferUsage,
  ) -> Result<VertexBuffer<V>, RendererError>
  where
    V: Vertex,
  {
    if !self.initialized {
      return Err(RendererError::NotInitialized);
    }

    let strategy = self
      .selector
      .select(self.features, usage, self.config.buffer_upload());
    let usage = buffer::effective_usage(usage, self.features);

    let buffer = VertexBuffer::new(
      &mut self.driver,
      capacity,
      usage,
      strategy,
      self.buffers.clone(),
    )?;

    Ok(buffer)
  }

  /// Write vertices into a buffer.
  pub fn set_buffer_data<V>(
    &mut self,
    buffer: &mut VertexBuffer<V>,
    vertices: &[V],
    offset: usize,
    flags: WriteFlags,
  ) -> Result<(), RendererError>
  where
    V: Vertex,
  {
    buffer.set_data(&mut self.driver, vertices, offset, flags)?;
    Ok(())
  }

  fn before_draw(&mut self) {
    debug_assert!(self.initialized, "drawing without a context");
    self.collect();
    self.flush_state();
  }

  /// Draw `count` vertices of a buffer, starting at `first`.
  pub fn draw<V>(&mut self, buffer: &VertexBuffer<V>, primitive: Primitive, first: usize, count: usize)
  where
    V: Vertex,
  {
    self.before_draw();
    buffer.draw(&mut self.driver, primitive, first, count);
  }

  /// Draw indexed vertices of a buffer; indices are relative to `first`.
  pub fn draw_buffer_indexed<V>(
    &mut self,
    buffer: &VertexBuffer<V>,
    primitive: Primitive,
    first: usize,
    indices: &[u16],
  ) where
    V: Vertex,
  {
    if indices.is_empty() {
      return;
    }

    self.before_draw();

    let indices = Indices {
      indices,
      range: None,
    };
    buffer.draw_indexed(&mut self.driver, primitive, first, indices);
  }

  /// Draw indexed pre-transformed vertices from client memory.
  pub fn draw_indexed(&mut self, primitive: Primitive, vertices: &[TexturedVertex], indices: &[u16]) {
    if vertices.is_empty() || indices.is_empty() {
      return;
    }

    self.before_draw();

    let range = if self.features.has(Feature::DrawRangeElements) {
      Some((0, (vertices.len() - 1).min(u16::MAX as usize) as u16))
    } else {
      None
    };

    self.driver.draw_elements(
      primitive,
      VertexSource::Client(bytemuck::cast_slice(vertices)),
      &TexturedVertex::VERTEX_FMT,
      Indices { indices, range },
    );
  }

  /// Read the framebuffer, top row first.
  pub fn snapshot(&mut self) -> Result<Image, RendererError> {
    if !self.initialized {
      return Err(RendererError::NotInitialized);
    }

    let (width, height) = self.window_size;
    let mut image = self
      .driver
      .read_pixels(width.max(0) as usize, height.max(0) as usize);
    image.flip_y();

    Ok(image)
  }

  /// Read the framebuffer and scale it to `width` × `height`.
  pub fn snapshot_resized(&mut self, width: usize, height: usize) -> Result<Image, RendererError> {
    let image = self.snapshot()?;
    Ok(image.resized(width, height))
  }
}

/// Human-readable video memory report.
fn format_vram(memory: MemoryInfo) -> String {
  const MIB: u64 = 1024 * 1024;

  match (memory.total, memory.free) {
    (0, 0) => "(unknown)".to_owned(),
    (total, 0) => format!("{} MiB", total / MIB),
    (0, free) => format!("{} MiB free", free / MIB),
    (total, free) => format!("{} MiB, {} MiB free", total / MIB, free / MIB),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::blending::Factor;
  use crate::buffer::BufferStrategy;
  use crate::driver::headless::{Call, HeadlessContext, HeadlessDriver};
  use crate::image::PixelFormat;
  use crate::vertex::SmyVertex;
  use std::cell::RefCell;
  use std::rc::Rc;

  fn renderer(context: HeadlessContext) -> Renderer<HeadlessDriver> {
    renderer_on(context, Platform::Linux)
  }

  fn renderer_on(context: HeadlessContext, platform: Platform) -> Renderer<HeadlessDriver> {
    let mut renderer =
      Renderer::with_platform(HeadlessDriver::new(context), RendererConfig::default(), platform);
    renderer.set_window_size(640, 480);
    renderer.initialize();
    renderer
  }

  struct Recorder(Rc<RefCell<Vec<&'static str>>>);

  impl RendererListener<HeadlessDriver> for Recorder {
    fn on_renderer_init(&mut self, renderer: &mut Renderer<HeadlessDriver>) {
      assert!(renderer.is_initialized());
      self.0.borrow_mut().push("init");
    }

    fn on_renderer_shutdown(&mut self, renderer: &mut Renderer<HeadlessDriver>) {
      // resources are still alive
      assert!(renderer.is_initialized());
      assert!(renderer.texture_stage_count() > 0);
      self.0.borrow_mut().push("shutdown");
    }
  }

  #[test]
  fn reinit_establishes_defaults() {
    let renderer = renderer(HeadlessContext::default());
    let state = renderer.driver().state();

    assert!(renderer.is_initialized());
    assert_eq!(renderer.texture_stage_count(), 4);
    assert_eq!(state.render_state(), *renderer.state_cache().desired());
    assert!(state.is_enabled(Capability::AlphaTest));
    assert!(state.is_enabled(Capability::DepthTest));
    assert!(state.is_enabled(Capability::Blend));
    assert_eq!(state.blend_func, (Factor::One, Factor::Zero));
    assert!(renderer
      .driver()
      .calls()
      .contains(&Call::Clear(ClearBuffers::ALL)));
    assert_eq!(renderer.transform().mode(), crate::transform::TransformMode::Unset);
  }

  #[test]
  fn anisotropy_is_clamped() {
    let mut renderer = renderer(HeadlessContext::default().set_max_anisotropy(8.));

    // the configured 9999 is clamped
    assert_eq!(renderer.max_anisotropy(), 8.);

    renderer.set_max_anisotropy(0.);
    assert_eq!(renderer.max_anisotropy(), 1.);

    let old = renderer_on(
      HeadlessContext::default().set_version("1.5".to_owned()),
      Platform::Linux,
    );
    assert_eq!(old.max_supported_anisotropy(), 1.);
  }

  #[test]
  fn old_context_uses_shadow_buffers() {
    let mut renderer = renderer(HeadlessContext::default().set_version("1.4".to_owned()));

    let vb: VertexBuffer<SmyVertex> = renderer
      .create_vertex_buffer(16, BufferUsage::Stream)
      .unwrap();
    assert_eq!(vb.strategy(), BufferStrategy::Shadow { sub_data: false });
    assert_eq!(vb.usage(), BufferUsage::Stream);
  }

  #[test]
  fn modern_context_streams_with_persistent_buffers() {
    let mut renderer = renderer(HeadlessContext::default());

    let vb: VertexBuffer<SmyVertex> = renderer
      .create_vertex_buffer(16, BufferUsage::Stream)
      .unwrap();
    assert_eq!(vb.strategy(), BufferStrategy::PersistentOrphan);
  }

  #[test]
  fn redundant_draw_state_is_not_resent() {
    let mut renderer = renderer(HeadlessContext::default());
    let mut vb: VertexBuffer<SmyVertex> = renderer
      .create_vertex_buffer(3, BufferUsage::Dynamic)
      .unwrap();
    renderer
      .set_buffer_data(&mut vb, &[SmyVertex::default(); 3], 0, WriteFlags::DISCARD)
      .unwrap();

    let state = renderer.render_state().set_depth_test(true).set_cull(true);
    renderer.set_render_state(state);
    renderer.draw(&vb, Primitive::TriangleList, 0, 3);
    assert_eq!(renderer.driver().state().render_state(), state);

    renderer.driver_mut().clear_calls();
    renderer.draw(&vb, Primitive::TriangleList, 0, 3);
    assert_eq!(renderer.driver().calls().len(), 1);
  }

  #[test]
  fn resize_lifecycle() {
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut renderer = renderer_on(HeadlessContext::default(), Platform::Windows);
    renderer.add_listener(Box::new(Recorder(events.clone())));

    // windowed resizes keep the context on windows
    renderer.before_resize(false);
    renderer.after_resize();
    assert!(events.borrow().is_empty());

    renderer.before_resize(true);
    assert!(!renderer.is_initialized());
    assert_eq!(renderer.texture_stage_count(), 0);
    renderer.after_resize();
    assert!(renderer.is_initialized());

    assert_eq!(*events.borrow(), vec!["shutdown", "init"]);
  }

  #[test]
  fn linux_never_loses_the_context() {
    let mut renderer = renderer_on(HeadlessContext::default(), Platform::Linux);
    renderer.before_resize(true);
    assert!(renderer.is_initialized());
  }

  #[test]
  fn textures_survive_shutdown() {
    let mut renderer = renderer(HeadlessContext::default());
    let texture = renderer.create_texture(
      Image::new(8, 8, PixelFormat::Rgba8),
      TextureFlags::default(),
    );
    renderer.upload_texture(&texture).unwrap();
    assert!(texture.is_resident());

    renderer.shutdown();
    assert!(!texture.is_resident());

    renderer.reinit();
    renderer.set_texture(0, Some(&texture));
    renderer.flush_state();
    assert!(texture.is_resident());
    assert_eq!(
      renderer.texture_stages().get(0).unwrap().bound(),
      texture.handle()
    );
  }

  #[test]
  fn viewport_and_scissor_are_flipped() {
    let mut renderer = renderer(HeadlessContext::default());

    renderer.set_viewport(Rect::new(10, 20, 110, 220));
    renderer.set_viewport(Rect::new(10, 20, 110, 220));
    assert_eq!(renderer.driver().count(|c| matches!(c, Call::Viewport(..))), 1);
    assert_eq!(renderer.driver().state().viewport, [10, 260, 100, 200]);

    renderer.set_scissor(Some(Rect::new(0, 0, 64, 32)));
    assert_eq!(renderer.driver().state().scissor, [0, 448, 64, 32]);
    assert!(renderer.driver().state().is_enabled(Capability::ScissorTest));

    renderer.set_scissor(Some(Rect::new(5, 5, 0, 0)));
    assert_eq!(renderer.scissor(), None);
    assert!(!renderer.driver().state().is_enabled(Capability::ScissorTest));
  }

  #[test]
  fn clear_rects_restore_the_scissor() {
    let mut renderer = renderer(HeadlessContext::default());
    let scissor = Rect::new(0, 0, 100, 100);
    renderer.set_scissor(Some(scissor));
    renderer.set_render_state(renderer.render_state().set_depth_write(false));
    renderer.flush_state();
    renderer.driver_mut().clear_calls();

    let rects = [Rect::new(0, 0, 10, 10), Rect::new(20, 20, 30, 30)];
    renderer.clear(ClearBuffers::DEPTH, [0.; 4], 1., &rects);

    assert_eq!(renderer.driver().count(|c| matches!(c, Call::Clear(_))), 2);
    assert!(renderer.driver().calls().contains(&Call::DepthMask(true)));
    assert_eq!(renderer.scissor(), Some(scissor));
    assert_eq!(renderer.driver().state().scissor, [0, 380, 100, 100]);

    // the depth mask is restored by the next flush
    renderer.flush_state();
    assert!(!renderer.driver().state().depth_mask);
  }

  #[test]
  fn antialiasing_needs_a_multisampled_context() {
    let mut renderer = renderer(HeadlessContext::default());
    renderer.set_antialiasing(true);
    assert!(!renderer.has_msaa());

    let mut renderer = renderer_on(HeadlessContext::default().set_samples(4), Platform::Linux);
    assert_eq!(renderer.msaa_level(), 4);
    assert!(!renderer.driver().state().is_enabled(Capability::Multisample));

    renderer.set_render_state(renderer.render_state().set_alpha_cutout(true));
    renderer.flush_state();

    renderer.set_antialiasing(true);
    assert!(renderer.has_msaa());
    assert!(renderer.driver().state().is_enabled(Capability::Multisample));

    // the cutout is resolved again with multisampling
    renderer.flush_state();
    assert!(renderer.driver().state().is_enabled(Capability::SampleShading));
  }

  #[test]
  fn indexed_draws_use_index_ranges() {
    let mut renderer = renderer(HeadlessContext::default());
    let vertices = [TexturedVertex::default(); 4];

    renderer.draw_indexed(Primitive::TriangleList, &vertices, &[0, 1, 2, 2, 3, 0]);
    assert_eq!(
      renderer.driver().calls().last(),
      Some(&Call::DrawElements {
        primitive: Primitive::TriangleList,
        buffer: None,
        count: 6,
        range: Some((0, 3)),
      })
    );
  }

  #[test]
  fn snapshots_are_read_and_scaled() {
    let mut renderer = renderer(HeadlessContext::default());

    let image = renderer.snapshot().unwrap();
    assert_eq!((image.width(), image.height()), (640, 480));

    let image = renderer.snapshot_resized(64, 48).unwrap();
    assert_eq!((image.width(), image.height()), (64, 48));

    renderer.shutdown();
    assert_eq!(renderer.snapshot().err(), Some(RendererError::NotInitialized));
  }

  #[test]
  fn alpha_cutout_aa_support() {
    let renderer = renderer(HeadlessContext::default());
    assert_eq!(renderer.max_supported_alpha_cutout_aa(), AlphaCutoutAA::Crisp);

    let renderer = renderer_on(
      HeadlessContext::default().set_version("2.1".to_owned()),
      Platform::Linux,
    );
    assert_eq!(renderer.max_supported_alpha_cutout_aa(), AlphaCutoutAA::Fuzzy);
  }

  #[test]
  fn vram_report() {
    assert_eq!(format_vram(MemoryInfo::default()), "(unknown)");
    assert_eq!(
      format_vram(MemoryInfo {
        total: 2048 * 1024 * 1024,
        free: 512 * 1024 * 1024
      }),
      "2048 MiB, 512 MiB free"
    );
    assert_eq!(
      format_vram(MemoryInfo {
        total: 0,
        free: 100 * 1024 * 1024
      }),
      "100 MiB free"
    );
  }

  #[test]
  fn unknown_stages_are_ignored() {
    let mut renderer = renderer(HeadlessContext::default());
    let past_end = renderer.texture_stage_count();
    renderer.driver_mut().clear_calls();

    renderer.set_texture(past_end, None);
    renderer.set_color_op(past_end, TextureOp::Modulate);
    renderer.set_alpha_op(past_end, TextureOp::SelectArg1);
    renderer.set_wrap(past_end, Wrap::ClampToEdge);
    renderer.set_filters(past_end, Filter::Nearest, Filter::Nearest);
    renderer.set_lod_bias(past_end, -1.);

    assert!(renderer.driver().calls().is_empty());
    assert_eq!(renderer.texture_stage_count(), past_end);
  }

  #[test]
  fn stages_after_shutdown() {
    let mut renderer = renderer(HeadlessContext::default());
    renderer.shutdown();
    assert_eq!(renderer.texture_stage_count(), 0);

    renderer.set_texture(0, None);
    renderer.set_color_op(0, TextureOp::Disable);
    renderer.set_lod_bias(0, 0.5);

    renderer.reinit();
    assert_eq!(renderer.texture_stage_count(), 4);
    assert_eq!(
      renderer.texture_stages().get(0).map(|s| s.color_op()),
      Some(TextureOp::Modulate)
    );
  }

  #[test]
  fn huge_window_sizes_saturate() {
    let mut renderer = renderer(HeadlessContext::default());
    renderer.set_window_size(u32::MAX, u32::MAX);
    renderer.driver_mut().clear_calls();

    renderer.set_viewport(Rect::new(0, 0, 10, 10));
    assert_eq!(
      renderer.driver().calls(),
      &[Call::Viewport(0, i32::MAX - 10, 10, 10)]
    );
  }

  #[test]
  fn fog_setup_follows_the_profile() {
    let es = renderer(
      HeadlessContext::default()
        .set_version("OpenGL ES-CM 1.1".to_owned())
        .set_extensions(vec!["GL_OES_mapbuffer"]),
    );
    assert!(es.driver().calls().contains(&Call::FogLinear {
      fixed_point: true,
      eye_plane: false
    }));

    let desktop = renderer(
      HeadlessContext::default()
        .set_version("2.1".to_owned())
        .set_extensions(vec!["GL_NV_fog_distance"]),
    );
    assert!(desktop.driver().calls().contains(&Call::FogLinear {
      fixed_point: false,
      eye_plane: true
    }));
  }
}
