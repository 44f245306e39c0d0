//! Driver interface.
//!
//! A [`Driver`] is the thin layer that turns renderer decisions into graphics API calls. It does
//! no caching and no capability checks of its own: the renderer only calls what the feature
//! matrix allows and skips redundant calls itself. This keeps drivers close to one-line forwards
//! and lets the [`headless`] driver record the exact call stream the renderer produces.
//!
//! Drivers are not thread-safe; they must only be used on the thread owning the graphics context.

pub mod headless;

use std::error;
use std::fmt;

use crate::blending::Factor;
use crate::buffer::BufferUsage;
use crate::gl_info::ContextProbe;
use crate::image::{Image, PixelFormat};
use crate::texture::SamplerState;
use crate::transform::M44;
use crate::vertex::VertexFmt;

/// Toggleable pipeline capabilities.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Capability {
  CullFace,
  Fog,
  AlphaTest,
  Blend,
  DepthTest,
  PolygonOffsetFill,
  Multisample,
  SampleShading,
  AlphaToCoverage,
  ScissorTest,
  /// 2D texturing on the active texture unit.
  Texture2D,
}

/// Alpha test comparison.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AlphaFunc {
  Always,
  Greater,
}

/// Depth test comparison.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DepthFunc {
  Always,
  LessOrEqual,
}

/// Polygon rasterization mode.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FillMode {
  Wireframe,
  Solid,
}

/// Source of the fog distance.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FogSource {
  FragmentDepth,
  /// Per-vertex fog coordinate attribute.
  FogCoordinate,
}

/// Buffers affected by a clear.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ClearBuffers {
  pub color: bool,
  pub depth: bool,
}

impl ClearBuffers {
  pub const COLOR: ClearBuffers = ClearBuffers {
    color: true,
    depth: false,
  };

  pub const DEPTH: ClearBuffers = ClearBuffers {
    color: false,
    depth: true,
  };

  pub const ALL: ClearBuffers = ClearBuffers {
    color: true,
    depth: true,
  };

  pub fn is_empty(&self) -> bool {
    !self.color && !self.depth
  }
}

/// Texture combiner channel.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CombineChannel {
  Color,
  Alpha,
}

/// Texture combiner function.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CombineFunction {
  Replace,
  Modulate,
}

/// Texture combiner first argument.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CombineSource {
  /// Output of the previous stage.
  Previous,
  Texture,
}

/// Configuration of one combiner channel of a texture unit.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Combiner {
  pub function: CombineFunction,
  pub source: CombineSource,
  /// Output scale: 1, 2 or 4.
  pub scale: u8,
}

/// Primitive topology.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Primitive {
  TriangleList,
  TriangleStrip,
  TriangleFan,
  LineList,
  LineStrip,
}

/// Internal texture storage format.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TextureFormat {
  /// Let the driver choose the precision.
  Unsized(PixelFormat),
  /// Explicit 8 bits per channel.
  Sized(PixelFormat),
  /// Single channel replicated to all four channels.
  Intensity,
}

/// Driver texture name.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TextureHandle(pub u32);

/// Driver buffer name.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BufferHandle(pub u32);

/// Driver fence.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct FenceHandle(pub u64);

/// Kind of storage backing a buffer.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BufferStorage {
  /// Re-specifiable storage.
  Mutable,
  /// Immutable storage, mapped once for the whole lifetime of the buffer (coherent writes).
  Persistent,
}

/// What a mapped write may discard.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Invalidate {
  Nothing,
  /// The written range.
  Range,
  /// The whole buffer.
  Buffer,
}

/// How data reaches a buffer.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BufferWrite {
  /// Plain sub-range update.
  SubData,
  /// Map the written range.
  MapRange {
    invalidate: Invalidate,
    /// Skip the implicit synchronization with pending draws.
    unsynchronized: bool,
  },
  /// Map the whole buffer.
  Map,
  /// Copy into the persistent mapping.
  Persistent,
}

/// Where a draw call reads its vertices from.
#[derive(Clone, Copy, Debug)]
pub enum VertexSource<'a> {
  /// Client memory.
  Client(&'a [u8]),
  /// A buffer, starting at the given vertex.
  Buffer(BufferHandle, usize),
}

/// Indices of an indexed draw.
#[derive(Clone, Copy, Debug)]
pub struct Indices<'a> {
  pub indices: &'a [u16],
  /// Smallest and largest index, as a hint for the driver.
  pub range: Option<(u16, u16)>,
}

/// Extension a memory query goes through.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MemoryInfoSource {
  /// `GL_NVX_gpu_memory_info`: total and free dedicated memory.
  Nvx,
  /// `GL_ATI_meminfo`: free memory only.
  Ati,
}

/// Video memory, in bytes; `0` if unknown.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct MemoryInfo {
  pub total: u64,
  pub free: u64,
}

/// Context creation flags.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ContextFlags {
  pub debug: bool,
  pub no_error: bool,
}

/// Driver failures.
///
/// Please keep in mind that this `enum` is _non exhaustive_; you will not be able to exhaustively
/// pattern-match against it.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DriverError {
  /// The driver refused to create an object.
  CreationFailed(String),
  /// Buffer mapping failed.
  MapFailed,
  /// A write went past the end of a buffer.
  OutOfBounds {
    offset: usize,
    len: usize,
    capacity: usize,
  },
  /// Unknown object name.
  InvalidHandle,
}

impl fmt::Display for DriverError {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    match *self {
      DriverError::CreationFailed(ref reason) => write!(f, "object creation failed: {}", reason),
      DriverError::MapFailed => f.write_str("buffer mapping failed"),
      DriverError::OutOfBounds {
        offset,
        len,
        capacity,
      } => write!(
        f,
        "write out of bounds (offset = {}, len = {}, capacity = {})",
        offset, len, capacity
      ),
      DriverError::InvalidHandle => f.write_str("invalid object handle"),
    }
  }
}

impl error::Error for DriverError {}

/// Graphics API backend.
pub trait Driver: ContextProbe {
  // queries

  /// Number of multisample buffers of the default framebuffer.
  fn sample_buffers(&self) -> u32;

  /// Samples per pixel of the default framebuffer.
  fn samples(&self) -> u32;

  /// Number of fixed-function texture units.
  fn max_texture_units(&self) -> usize;

  /// Largest supported anisotropy.
  fn max_anisotropy(&self) -> f32;

  fn context_flags(&self) -> ContextFlags;

  fn memory_info(&self, source: MemoryInfoSource) -> MemoryInfo;

  // fixed-function state

  fn set_capability(&mut self, cap: Capability, enabled: bool);

  fn alpha_func(&mut self, func: AlphaFunc, reference: f32);

  fn blend_func(&mut self, src: Factor, dst: Factor);

  fn depth_func(&mut self, func: DepthFunc);

  fn depth_mask(&mut self, write: bool);

  fn polygon_offset(&mut self, factor: f32, units: f32);

  fn min_sample_shading(&mut self, value: f32);

  fn polygon_mode(&mut self, mode: FillMode);

  /// Linear fog; `fixed_point` selects the fixed-point entry points, `eye_plane` the eye-plane
  /// distance mode.
  ///
  /// Backends without fixed-point entry points ignore `fixed_point` and set up the same fog through
  /// their integer ones.
  fn fog_linear(&mut self, fixed_point: bool, eye_plane: bool);

  fn fog_color(&mut self, color: [f32; 4]);

  fn fog_range(&mut self, start: f32, end: f32);

  fn fog_source(&mut self, source: FogSource);

  /// Pack and unpack alignment.
  fn pixel_alignment(&mut self, alignment: u32);

  /// Enable the position, colour and texture coordinate client arrays.
  fn enable_client_arrays(&mut self);

  /// Load the model-view and projection matrices.
  fn load_matrices(&mut self, modelview: &M44, projection: &M44);

  // framebuffer

  fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);

  fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32);

  fn clear_color(&mut self, color: [f32; 4]);

  /// `single_precision` selects the float entry point.
  fn clear_depth(&mut self, depth: f32, single_precision: bool);

  fn clear(&mut self, buffers: ClearBuffers);

  /// Read the framebuffer as bottom-up RGB rows.
  fn read_pixels(&mut self, width: usize, height: usize) -> Image;

  // textures

  fn active_texture(&mut self, unit: usize);

  fn combine_mode(&mut self);

  fn combiner(&mut self, channel: CombineChannel, combiner: Combiner);

  fn lod_bias(&mut self, bias: f32);

  fn create_texture(&mut self) -> Result<TextureHandle, DriverError>;

  fn delete_texture(&mut self, handle: TextureHandle);

  /// Bind a texture to the active unit; `None` unbinds.
  fn bind_texture(&mut self, handle: Option<TextureHandle>);

  /// Upload an image into the bound texture.
  fn upload_texture(&mut self, image: &Image, format: TextureFormat, mipmaps: bool);

  /// Sampler parameters of the bound texture.
  fn texture_parameters(&mut self, sampler: &SamplerState);

  // buffers

  fn create_buffer(
    &mut self,
    capacity: usize,
    usage: BufferUsage,
    storage: BufferStorage,
  ) -> Result<BufferHandle, DriverError>;

  fn delete_buffer(&mut self, handle: BufferHandle);

  /// Re-specify the storage of a mutable buffer, dropping its content.
  fn orphan_buffer(&mut self, handle: BufferHandle, capacity: usize, usage: BufferUsage);

  fn write_buffer(
    &mut self,
    handle: BufferHandle,
    offset: usize,
    data: &[u8],
    method: BufferWrite,
  ) -> Result<(), DriverError>;

  fn insert_fence(&mut self) -> FenceHandle;

  /// Block until the GPU passed the fence.
  fn wait_fence(&mut self, fence: FenceHandle);

  fn delete_fence(&mut self, fence: FenceHandle);

  // draws

  fn draw_arrays(
    &mut self,
    primitive: Primitive,
    source: VertexSource,
    fmt: &VertexFmt,
    first: usize,
    count: usize,
  );

  fn draw_elements(
    &mut self,
    primitive: Primitive,
    source: VertexSource,
    fmt: &VertexFmt,
    indices: Indices,
  );
}
