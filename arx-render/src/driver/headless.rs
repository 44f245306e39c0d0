//! Headless driver.
//!
//! [`HeadlessDriver`] is a scriptable graphics context without a GPU. It answers capability
//! queries from a [`HeadlessContext`] description, keeps track of the effective fixed-function
//! state in a [`HeadlessState`] and records every call it receives. It is what the renderer is
//! tested against and what `probe`-style tools use to show the decisions taken for a given
//! driver.

use std::collections::{HashMap, HashSet};

use crate::blending::Factor;
use crate::buffer::BufferUsage;
use crate::driver::{
  AlphaFunc, BufferHandle, BufferStorage, BufferWrite, Capability, ClearBuffers, CombineChannel,
  Combiner, ContextFlags, DepthFunc, Driver, DriverError, FenceHandle, FillMode, FogSource,
  Indices, MemoryInfo, MemoryInfoSource, Primitive, TextureFormat, TextureHandle, VertexSource,
};
use crate::gl_info::ContextProbe;
use crate::image::{Image, PixelFormat};
use crate::render_state::RenderState;
use crate::texture::SamplerState;
use crate::transform::M44;
use crate::vertex::VertexFmt;

/// Description of the emulated context.
///
/// Feel free to look at the different methods available to tweak it. You may want to start with
/// `default()` though.
#[derive(Clone, Debug, PartialEq)]
pub struct HeadlessContext {
  version: Option<String>,
  vendor: String,
  renderer: String,
  extensions: Vec<String>,
  max_texture_size: u32,
  max_texture_units: usize,
  samples: u32,
  max_anisotropy: f32,
  context_flags: ContextFlags,
  memory: Option<MemoryInfo>,
}

impl Default for HeadlessContext {
  /// Defaults:
  ///
  /// - `version` set to `4.6.0 Headless`.
  /// - `vendor` set to `arx`.
  /// - `renderer` set to `headless`.
  /// - no extensions.
  /// - `max_texture_size` set to `16384`.
  /// - `max_texture_units` set to `4`.
  /// - `samples` set to `0` (no multisampling).
  /// - `max_anisotropy` set to `16`.
  /// - no context flags and unknown video memory.
  fn default() -> Self {
    HeadlessContext {
      version: Some("4.6.0 Headless".to_owned()),
      vendor: "arx".to_owned(),
      renderer: "headless".to_owned(),
      extensions: Vec::new(),
      max_texture_size: 16384,
      max_texture_units: 4,
      samples: 0,
      max_anisotropy: 16.,
      context_flags: ContextFlags::default(),
      memory: None,
    }
  }
}

impl HeadlessContext {
  /// Version string; `None` emulates a context that cannot report it.
  pub fn set_version<S>(self, version: S) -> Self
  where
    S: Into<Option<String>>,
  {
    HeadlessContext {
      version: version.into(),
      ..self
    }
  }

  pub fn set_vendor(self, vendor: impl Into<String>) -> Self {
    HeadlessContext {
      vendor: vendor.into(),
      ..self
    }
  }

  pub fn set_renderer(self, renderer: impl Into<String>) -> Self {
    HeadlessContext {
      renderer: renderer.into(),
      ..self
    }
  }

  pub fn set_extensions<I, S>(self, extensions: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    HeadlessContext {
      extensions: extensions.into_iter().map(Into::into).collect(),
      ..self
    }
  }

  pub fn set_max_texture_size(self, max_texture_size: u32) -> Self {
    HeadlessContext {
      max_texture_size,
      ..self
    }
  }

  pub fn set_max_texture_units(self, max_texture_units: usize) -> Self {
    HeadlessContext {
      max_texture_units,
      ..self
    }
  }

  /// Samples of the default framebuffer; `0` disables multisampling.
  pub fn set_samples(self, samples: u32) -> Self {
    HeadlessContext { samples, ..self }
  }

  pub fn set_max_anisotropy(self, max_anisotropy: f32) -> Self {
    HeadlessContext {
      max_anisotropy,
      ..self
    }
  }

  pub fn set_context_flags(self, context_flags: ContextFlags) -> Self {
    HeadlessContext {
      context_flags,
      ..self
    }
  }

  /// Video memory reported through the memory info extensions.
  pub fn set_memory<M>(self, memory: M) -> Self
  where
    M: Into<Option<MemoryInfo>>,
  {
    HeadlessContext {
      memory: memory.into(),
      ..self
    }
  }

  pub fn samples(&self) -> u32 {
    self.samples
  }
}

/// A recorded driver call.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
  SetCapability(Capability, bool),
  AlphaFunc(AlphaFunc, f32),
  BlendFunc(Factor, Factor),
  DepthFunc(DepthFunc),
  DepthMask(bool),
  PolygonOffset(f32, f32),
  MinSampleShading(f32),
  PolygonMode(FillMode),
  FogLinear { fixed_point: bool, eye_plane: bool },
  FogColor([f32; 4]),
  FogRange(f32, f32),
  FogSource(FogSource),
  PixelAlignment(u32),
  EnableClientArrays,
  LoadMatrices(M44, M44),
  Viewport(i32, i32, i32, i32),
  Scissor(i32, i32, i32, i32),
  ClearColor([f32; 4]),
  ClearDepth(f32),
  Clear(ClearBuffers),
  ReadPixels(usize, usize),
  ActiveTexture(usize),
  CombineMode,
  Combiner(CombineChannel, Combiner),
  LodBias(f32),
  CreateTexture(TextureHandle),
  DeleteTexture(TextureHandle),
  BindTexture(Option<TextureHandle>),
  UploadTexture {
    width: usize,
    height: usize,
    format: TextureFormat,
    mipmaps: bool,
  },
  TextureParameters(SamplerState),
  CreateBuffer {
    handle: BufferHandle,
    capacity: usize,
    usage: BufferUsage,
    storage: BufferStorage,
  },
  DeleteBuffer(BufferHandle),
  OrphanBuffer(BufferHandle),
  WriteBuffer {
    handle: BufferHandle,
    offset: usize,
    len: usize,
    method: BufferWrite,
  },
  InsertFence(FenceHandle),
  WaitFence(FenceHandle),
  DeleteFence(FenceHandle),
  DrawArrays {
    primitive: Primitive,
    buffer: Option<BufferHandle>,
    first: usize,
    count: usize,
  },
  DrawElements {
    primitive: Primitive,
    buffer: Option<BufferHandle>,
    count: usize,
    range: Option<(u16, u16)>,
  },
}

/// A texture object.
#[derive(Clone, Debug, PartialEq)]
pub struct HeadlessTexture {
  pub width: usize,
  pub height: usize,
  pub format: Option<TextureFormat>,
  pub sampler: Option<SamplerState>,
}

/// A buffer object.
#[derive(Clone, Debug, PartialEq)]
pub struct HeadlessBuffer {
  pub data: Vec<u8>,
  pub usage: BufferUsage,
  pub storage: BufferStorage,
}

/// Effective state of the emulated context.
#[derive(Clone, Debug, PartialEq)]
pub struct HeadlessState {
  pub capabilities: HashSet<Capability>,
  pub alpha_func: (AlphaFunc, f32),
  pub blend_func: (Factor, Factor),
  pub depth_func: DepthFunc,
  pub depth_mask: bool,
  pub polygon_offset: (f32, f32),
  pub fill_mode: FillMode,
  pub viewport: [i32; 4],
  pub scissor: [i32; 4],
  pub clear_color: [f32; 4],
  pub fog_color: [f32; 4],
  pub fog_range: (f32, f32),
  pub active_texture: usize,
  /// Texture bound to each unit.
  pub bound_textures: Vec<Option<TextureHandle>>,
  pub textures: HashMap<TextureHandle, HeadlessTexture>,
  pub buffers: HashMap<BufferHandle, HeadlessBuffer>,
  pub fences: HashSet<FenceHandle>,
}

impl HeadlessState {
  fn new(texture_units: usize) -> Self {
    HeadlessState {
      capabilities: HashSet::new(),
      alpha_func: (AlphaFunc::Always, 0.),
      blend_func: (Factor::One, Factor::Zero),
      depth_func: DepthFunc::Always,
      depth_mask: true,
      polygon_offset: (0., 0.),
      fill_mode: FillMode::Solid,
      viewport: [0; 4],
      scissor: [0; 4],
      clear_color: [0.; 4],
      fog_color: [0.; 4],
      fog_range: (0., 1.),
      active_texture: 0,
      bound_textures: vec![None; texture_units.max(1)],
      textures: HashMap::new(),
      buffers: HashMap::new(),
      fences: HashSet::new(),
    }
  }

  pub fn is_enabled(&self, cap: Capability) -> bool {
    self.capabilities.contains(&cap)
  }

  /// Render state the current driver state implements.
  ///
  /// Alpha cutouts are recognized by an enabled `GREATER` alpha test; blending factors rewritten
  /// by the cutout resolution are reported as sent.
  pub fn render_state(&self) -> RenderState {
    let alpha_cutout =
      self.is_enabled(Capability::AlphaTest) && self.alpha_func.0 == AlphaFunc::Greater;
    let depth_test =
      self.is_enabled(Capability::DepthTest) && self.depth_func == DepthFunc::LessOrEqual;

    RenderState::default()
      .set_cull(self.is_enabled(Capability::CullFace))
      .set_fog(self.is_enabled(Capability::Fog))
      .set_blend(self.blend_func.0, self.blend_func.1)
      .set_alpha_cutout(alpha_cutout)
      .set_depth_test(depth_test)
      .set_depth_write(self.depth_mask)
      .set_depth_offset((-self.polygon_offset.1).max(0.) as u32)
  }
}

/// A driver without a GPU.
#[derive(Clone, Debug)]
pub struct HeadlessDriver {
  context: HeadlessContext,
  state: HeadlessState,
  calls: Vec<Call>,
  next_name: u32,
  next_fence: u64,
  fail_maps: bool,
}

impl Default for HeadlessDriver {
  fn default() -> Self {
    Self::new(HeadlessContext::default())
  }
}

impl HeadlessDriver {
  pub fn new(context: HeadlessContext) -> Self {
    let state = HeadlessState::new(context.max_texture_units);

    HeadlessDriver {
      context,
      state,
      calls: Vec::new(),
      next_name: 1,
      next_fence: 1,
      fail_maps: false,
    }
  }

  pub fn context(&self) -> &HeadlessContext {
    &self.context
  }

  pub fn state(&self) -> &HeadlessState {
    &self.state
  }

  /// Calls received since creation or since the last [`HeadlessDriver::clear_calls`].
  pub fn calls(&self) -> &[Call] {
    &self.calls
  }

  pub fn clear_calls(&mut self) {
    self.calls.clear();
  }

  /// Number of recorded calls matching `pred`.
  pub fn count<F>(&self, pred: F) -> usize
  where
    F: Fn(&Call) -> bool,
  {
    self.calls.iter().filter(|call| pred(call)).count()
  }

  /// Make every mapped write fail.
  pub fn set_fail_maps(&mut self, fail_maps: bool) {
    self.fail_maps = fail_maps;
  }

  fn name(&mut self) -> u32 {
    let name = self.next_name;
    self.next_name += 1;
    name
  }

  fn bound_texture(&self) -> Option<TextureHandle> {
    self
      .state
      .bound_textures
      .get(self.state.active_texture)
      .copied()
      .flatten()
  }
}

impl ContextProbe for HeadlessDriver {
  fn version_string(&self) -> Option<String> {
    self.context.version.clone()
  }

  fn vendor(&self) -> Option<String> {
    Some(self.context.vendor.clone())
  }

  fn renderer(&self) -> Option<String> {
    Some(self.context.renderer.clone())
  }

  fn extensions(&self) -> Vec<String> {
    self.context.extensions.clone()
  }

  fn max_texture_size(&self) -> u32 {
    self.context.max_texture_size
  }
}

impl Driver for HeadlessDriver {
  fn sample_buffers(&self) -> u32 {
    (self.context.samples > 0) as u32
  }

  fn samples(&self) -> u32 {
    self.context.samples
  }

  fn max_texture_units(&self) -> usize {
    self.context.max_texture_units
  }

  fn max_anisotropy(&self) -> f32 {
    self.context.max_anisotropy
  }

  fn context_flags(&self) -> ContextFlags {
    self.context.context_flags
  }

  fn memory_info(&self, source: MemoryInfoSource) -> MemoryInfo {
    let memory = self.context.memory.unwrap_or_default();

    match source {
      MemoryInfoSource::Nvx => memory,
      MemoryInfoSource::Ati => MemoryInfo {
        total: 0,
        free: memory.free,
      },
    }
  }

  fn set_capability(&mut self, cap: Capability, enabled: bool) {
    self.calls.push(Call::SetCapability(cap, enabled));

    if enabled {
      self.state.capabilities.insert(cap);
    } else {
      self.state.capabilities.remove(&cap);
    }
  }

  fn alpha_func(&mut self, func: AlphaFunc, reference: f32) {
    self.calls.push(Call::AlphaFunc(func, reference));
    self.state.alpha_func = (func, reference);
  }

  fn blend_func(&mut self, src: Factor, dst: Factor) {
    self.calls.push(Call::BlendFunc(src, dst));
    self.state.blend_func = (src, dst);
  }

  fn depth_func(&mut self, func: DepthFunc) {
    self.calls.push(Call::DepthFunc(func));
    self.state.depth_func = func;
  }

  fn depth_mask(&mut self, write: bool) {
    self.calls.push(Call::DepthMask(write));
    self.state.depth_mask = write;
  }

  fn polygon_offset(&mut self, factor: f32, units: f32) {
    self.calls.push(Call::PolygonOffset(factor, units));
    self.state.polygon_offset = (factor, units);
  }

  fn min_sample_shading(&mut self, value: f32) {
    self.calls.push(Call::MinSampleShading(value));
  }

  fn polygon_mode(&mut self, mode: FillMode) {
    self.calls.push(Call::PolygonMode(mode));
    self.state.fill_mode = mode;
  }

  fn fog_linear(&mut self, fixed_point: bool, eye_plane: bool) {
    self.calls.push(Call::FogLinear {
      fixed_point,
      eye_plane,
    });
  }

  fn fog_color(&mut self, color: [f32; 4]) {
    self.calls.push(Call::FogColor(color));
    self.state.fog_color = color;
  }

  fn fog_range(&mut self, start: f32, end: f32) {
    self.calls.push(Call::FogRange(start, end));
    self.state.fog_range = (start, end);
  }

  fn fog_source(&mut self, source: FogSource) {
    self.calls.push(Call::FogSource(source));
  }

  fn pixel_alignment(&mut self, alignment: u32) {
    self.calls.push(Call::PixelAlignment(alignment));
  }

  fn enable_client_arrays(&mut self) {
    self.calls.push(Call::EnableClientArrays);
  }

  fn load_matrices(&mut self, modelview: &M44, projection: &M44) {
    self.calls.push(Call::LoadMatrices(*modelview, *projection));
  }

  fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
    self.calls.push(Call::Viewport(x, y, width, height));
    self.state.viewport = [x, y, width, height];
  }

  fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
    self.calls.push(Call::Scissor(x, y, width, height));
    self.state.scissor = [x, y, width, height];
  }

  fn clear_color(&mut self, color: [f32; 4]) {
    self.calls.push(Call::ClearColor(color));
    self.state.clear_color = color;
  }

  fn clear_depth(&mut self, depth: f32, _single_precision: bool) {
    self.calls.push(Call::ClearDepth(depth));
  }

  fn clear(&mut self, buffers: ClearBuffers) {
    self.calls.push(Call::Clear(buffers));
  }

  fn read_pixels(&mut self, width: usize, height: usize) -> Image {
    self.calls.push(Call::ReadPixels(width, height));

    let color = self.state.clear_color;
    let texel = [
      (color[0].max(0.).min(1.) * 255.).round() as u8,
      (color[1].max(0.).min(1.) * 255.).round() as u8,
      (color[2].max(0.).min(1.) * 255.).round() as u8,
    ];

    let mut image = Image::new(width, height, PixelFormat::Rgb8);
    for pixel in image.data_mut().chunks_exact_mut(3) {
      pixel.copy_from_slice(&texel);
    }

    image
  }

  fn active_texture(&mut self, unit: usize) {
    self.calls.push(Call::ActiveTexture(unit));
    self.state.active_texture = unit;

    if unit >= self.state.bound_textures.len() {
      self.state.bound_textures.resize(unit + 1, None);
    }
  }

  fn combine_mode(&mut self) {
    self.calls.push(Call::CombineMode);
  }

  fn combiner(&mut self, channel: CombineChannel, combiner: Combiner) {
    self.calls.push(Call::Combiner(channel, combiner));
  }

  fn lod_bias(&mut self, bias: f32) {
    self.calls.push(Call::LodBias(bias));
  }

  fn create_texture(&mut self) -> Result<TextureHandle, DriverError> {
    let handle = TextureHandle(self.name());
    self.calls.push(Call::CreateTexture(handle));
    self.state.textures.insert(
      handle,
      HeadlessTexture {
        width: 0,
        height: 0,
        format: None,
        sampler: None,
      },
    );

    Ok(handle)
  }

  fn delete_texture(&mut self, handle: TextureHandle) {
    self.calls.push(Call::DeleteTexture(handle));
    self.state.textures.remove(&handle);

    // deleting a bound texture unbinds it
    for bound in &mut self.state.bound_textures {
      if *bound == Some(handle) {
        *bound = None;
      }
    }
  }

  fn bind_texture(&mut self, handle: Option<TextureHandle>) {
    self.calls.push(Call::BindTexture(handle));
    let unit = self.state.active_texture;
    self.state.bound_textures[unit] = handle;
  }

  fn upload_texture(&mut self, image: &Image, format: TextureFormat, mipmaps: bool) {
    self.calls.push(Call::UploadTexture {
      width: image.width(),
      height: image.height(),
      format,
      mipmaps,
    });

    if let Some(texture) = self
      .bound_texture()
      .and_then(|handle| self.state.textures.get_mut(&handle))
    {
      texture.width = image.width();
      texture.height = image.height();
      texture.format = Some(format);
    }
  }

  fn texture_parameters(&mut self, sampler: &SamplerState) {
    self.calls.push(Call::TextureParameters(*sampler));

    if let Some(texture) = self
      .bound_texture()
      .and_then(|handle| self.state.textures.get_mut(&handle))
    {
      texture.sampler = Some(*sampler);
    }
  }

  fn create_buffer(
    &mut self,
    capacity: usize,
    usage: BufferUsage,
    storage: BufferStorage,
  ) -> Result<BufferHandle, DriverError> {
    let handle = BufferHandle(self.name());
    self.calls.push(Call::CreateBuffer {
      handle,
      capacity,
      usage,
      storage,
    });
    self.state.buffers.insert(
      handle,
      HeadlessBuffer {
        data: vec![0; capacity],
        usage,
        storage,
      },
    );

    Ok(handle)
  }

  fn delete_buffer(&mut self, handle: BufferHandle) {
    self.calls.push(Call::DeleteBuffer(handle));
    self.state.buffers.remove(&handle);
  }

  fn orphan_buffer(&mut self, handle: BufferHandle, capacity: usize, usage: BufferUsage) {
    self.calls.push(Call::OrphanBuffer(handle));

    if let Some(buffer) = self.state.buffers.get_mut(&handle) {
      buffer.data = vec![0; capacity];
      buffer.usage = usage;
    }
  }

  fn write_buffer(
    &mut self,
    handle: BufferHandle,
    offset: usize,
    data: &[u8],
    method: BufferWrite,
  ) -> Result<(), DriverError> {
    self.calls.push(Call::WriteBuffer {
      handle,
      offset,
      len: data.len(),
      method,
    });

    if self.fail_maps && method != BufferWrite::SubData {
      return Err(DriverError::MapFailed);
    }

    let buffer = self
      .state
      .buffers
      .get_mut(&handle)
      .ok_or(DriverError::InvalidHandle)?;

    let persistent = buffer.storage == BufferStorage::Persistent;
    if persistent != (method == BufferWrite::Persistent) && method != BufferWrite::SubData {
      return Err(DriverError::MapFailed);
    }

    let capacity = buffer.data.len();
    if offset.checked_add(data.len()).map_or(true, |end| end > capacity) {
      return Err(DriverError::OutOfBounds {
        offset,
        len: data.len(),
        capacity,
      });
    }

    buffer.data[offset..offset + data.len()].copy_from_slice(data);

    Ok(())
  }

  fn insert_fence(&mut self) -> FenceHandle {
    let fence = FenceHandle(self.next_fence);
    self.next_fence += 1;
    self.calls.push(Call::InsertFence(fence));
    self.state.fences.insert(fence);

    fence
  }

  fn wait_fence(&mut self, fence: FenceHandle) {
    self.calls.push(Call::WaitFence(fence));
  }

  fn delete_fence(&mut self, fence: FenceHandle) {
    self.calls.push(Call::DeleteFence(fence));
    self.state.fences.remove(&fence);
  }

  fn draw_arrays(
    &mut self,
    primitive: Primitive,
    source: VertexSource,
    _fmt: &VertexFmt,
    first: usize,
    count: usize,
  ) {
    self.calls.push(Call::DrawArrays {
      primitive,
      buffer: buffer_of(source),
      first,
      count,
    });
  }

  fn draw_elements(
    &mut self,
    primitive: Primitive,
    source: VertexSource,
    _fmt: &VertexFmt,
    indices: Indices,
  ) {
    self.calls.push(Call::DrawElements {
      primitive,
      buffer: buffer_of(source),
      count: indices.indices.len(),
      range: indices.range,
    });
  }
}

fn buffer_of(source: VertexSource) -> Option<BufferHandle> {
  match source {
    VertexSource::Client(_) => None,
    VertexSource::Buffer(handle, _) => Some(handle),
  }
}
