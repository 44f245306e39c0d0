//! OpenGL implementation of the driver interface.

use arx_render::blending::Factor;
use arx_render::buffer::BufferUsage;
use arx_render::driver::{
  AlphaFunc, BufferHandle, BufferStorage, BufferWrite, Capability, ClearBuffers, CombineChannel,
  CombineFunction, CombineSource, Combiner, ContextFlags, DepthFunc, Driver, DriverError,
  FenceHandle, FillMode, FogSource, Indices, Invalidate, MemoryInfo, MemoryInfoSource, Primitive,
  TextureFormat, TextureHandle, VertexSource,
};
use arx_render::gl_info::ContextProbe;
use arx_render::image::{Image, PixelFormat};
use arx_render::texture::{MagFilter, MinFilter, SamplerState, Wrap};
use arx_render::transform::M44;
use arx_render::vertex::{Semantic, VertexAttribType, VertexFmt};
use log::warn;
use std::cell::RefCell;
use std::collections::HashMap;
use std::error;
use std::ffi::{c_void, CStr};
use std::fmt;
use std::marker::PhantomData;
use std::os::raw::c_char;
use std::ptr;

use crate::gl;
use crate::gl::types::*;

// TLS synchronization barrier for `GLDriver`.
thread_local!(static TLS_ACQUIRE_GL_DRIVER: RefCell<Option<()>> = RefCell::new(Some(())));

// how long a single fence wait blocks before trying again, in nanoseconds
const FENCE_WAIT_TIMEOUT: GLuint64 = 1_000_000_000;

/// Errors that can happen while loading the driver.
///
/// Please keep in mind that this `enum` is _non exhaustive_; you will not be able to exhaustively
/// pattern-match against it.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GLDriverError {
  /// Another driver is alive on the current thread.
  UnavailableDriver,
  /// The loader did not provide a mandatory entry point.
  MissingEntryPoint(&'static str),
}

impl fmt::Display for GLDriverError {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    match *self {
      GLDriverError::UnavailableDriver => {
        f.write_str("an OpenGL driver already exists on this thread")
      }
      GLDriverError::MissingEntryPoint(name) => write!(f, "missing OpenGL entry point: {}", name),
    }
  }
}

impl error::Error for GLDriverError {}

#[derive(Debug)]
struct GLBuffer {
  capacity: usize,
  // persistent mapping, for immutable storage
  mapping: Option<*mut u8>,
}

/// OpenGL driver.
///
/// Only one driver can exist per thread at a time, as the bindings are global and the driver
/// assumes it is alone in talking to the current context.
#[derive(Debug)]
pub struct GLDriver {
  _a: PhantomData<*const ()>, // !Send and !Sync
  buffers: HashMap<GLuint, GLBuffer>,
  fences: HashMap<u64, GLsync>,
  next_fence: u64,
  fog_coord_array: bool,
  anisotropic: bool,
}

impl GLDriver {
  /// Load the OpenGL entry points of the current context and create the driver.
  ///
  /// `loader` maps a symbol name (e.g. `glGetString`) to its address for the current context.
  pub fn load_with<F>(loader: F) -> Result<Self, GLDriverError>
  where
    F: FnMut(&'static str) -> *const c_void,
  {
    TLS_ACQUIRE_GL_DRIVER.with(|rc| {
      let mut inner = rc.borrow_mut();

      match inner.take() {
        Some(_) => {
          gl::load_with(loader);

          match Self::from_context() {
            Ok(driver) => Ok(driver),
            Err(e) => {
              *inner = Some(());
              Err(e)
            }
          }
        }

        None => Err(GLDriverError::UnavailableDriver),
      }
    })
  }

  fn from_context() -> Result<Self, GLDriverError> {
    let mandatory: [(&'static str, bool); 5] = [
      ("glGetString", gl::GetString::is_loaded()),
      ("glGetIntegerv", gl::GetIntegerv::is_loaded()),
      ("glEnable", gl::Enable::is_loaded()),
      ("glTexEnvi", gl::TexEnvi::is_loaded()),
      ("glDrawElements", gl::DrawElements::is_loaded()),
    ];

    if let Some((name, _)) = mandatory.iter().find(|(_, loaded)| !loaded) {
      return Err(GLDriverError::MissingEntryPoint(*name));
    }

    let mut driver = GLDriver {
      _a: PhantomData,
      buffers: HashMap::new(),
      fences: HashMap::new(),
      next_fence: 0,
      fog_coord_array: false,
      anisotropic: false,
    };

    // an unknown query leaves the value untouched, so no anisotropy support reads as 1
    driver.anisotropic = driver.max_anisotropy() > 1.;

    Ok(driver)
  }

  fn bind_array_buffer(&mut self, handle: GLuint) {
    if gl::BindBuffer::is_loaded() {
      unsafe { gl::BindBuffer(gl::ARRAY_BUFFER, handle) };
    }
  }

  // Point the client arrays at the vertices of a draw.
  fn vertex_pointers(&mut self, source: VertexSource, fmt: &VertexFmt) {
    let base: *const u8 = match source {
      VertexSource::Client(bytes) => {
        self.bind_array_buffer(0);
        bytes.as_ptr()
      }

      VertexSource::Buffer(handle, first) => {
        self.bind_array_buffer(handle.0);
        (first * fmt.stride) as *const u8
      }
    };

    let stride = fmt.stride as GLsizei;
    let mut fog_coord = false;

    for attrib in fmt.attribs {
      let pointer = base.wrapping_add(attrib.offset) as *const c_void;
      let size = attrib.dim.size() as GLint;
      let ty = from_attrib_type(attrib.comp_type);

      unsafe {
        match attrib.sem {
          Semantic::Position => gl::VertexPointer(size, ty, stride, pointer),
          Semantic::Color => gl::ColorPointer(size, ty, stride, pointer),
          Semantic::TexCoord(unit) => {
            gl::ClientActiveTexture(gl::TEXTURE0 + unit as GLenum);
            gl::TexCoordPointer(size, ty, stride, pointer);
          }
          Semantic::FogCoord => {
            gl::FogCoordPointer(ty, stride, pointer);
            fog_coord = true;
          }
        }
      }
    }

    if fog_coord != self.fog_coord_array {
      unsafe {
        if fog_coord {
          gl::EnableClientState(gl::FOG_COORD_ARRAY);
        } else {
          gl::DisableClientState(gl::FOG_COORD_ARRAY);
        }
      }

      self.fog_coord_array = fog_coord;
    }
  }
}

impl Drop for GLDriver {
  fn drop(&mut self) {
    unsafe {
      for (_, sync) in self.fences.drain() {
        gl::DeleteSync(sync);
      }
    }

    TLS_ACQUIRE_GL_DRIVER.with(|rc| *rc.borrow_mut() = Some(()));
  }
}

impl ContextProbe for GLDriver {
  fn version_string(&self) -> Option<String> {
    unsafe { get_string(gl::VERSION) }
  }

  fn vendor(&self) -> Option<String> {
    unsafe { get_string(gl::VENDOR) }
  }

  fn renderer(&self) -> Option<String> {
    unsafe { get_string(gl::RENDERER) }
  }

  fn extensions(&self) -> Vec<String> {
    unsafe {
      if gl::GetStringi::is_loaded() {
        let mut count = 0;
        gl::GetIntegerv(gl::NUM_EXTENSIONS, &mut count);

        (0..count.max(0) as GLuint)
          .filter_map(|i| c_string(gl::GetStringi(gl::EXTENSIONS, i)))
          .collect()
      } else {
        get_string(gl::EXTENSIONS)
          .map(|exts| exts.split_whitespace().map(str::to_owned).collect())
          .unwrap_or_default()
      }
    }
  }

  fn max_texture_size(&self) -> u32 {
    unsafe { get_integer(gl::MAX_TEXTURE_SIZE) as u32 }
  }
}

impl Driver for GLDriver {
  fn sample_buffers(&self) -> u32 {
    unsafe { get_integer(gl::SAMPLE_BUFFERS).max(0) as u32 }
  }

  fn samples(&self) -> u32 {
    unsafe { get_integer(gl::SAMPLES).max(0) as u32 }
  }

  fn max_texture_units(&self) -> usize {
    unsafe { get_integer(gl::MAX_TEXTURE_UNITS).max(1) as usize }
  }

  fn max_anisotropy(&self) -> f32 {
    let mut value = 1.;
    unsafe { gl::GetFloatv(gl::MAX_TEXTURE_MAX_ANISOTROPY, &mut value) };
    value
  }

  fn context_flags(&self) -> ContextFlags {
    // pre-3.0 contexts have no flags and leave the value untouched
    let flags = unsafe { get_integer(gl::CONTEXT_FLAGS) } as GLuint;

    ContextFlags {
      debug: flags & gl::CONTEXT_FLAG_DEBUG_BIT != 0,
      no_error: flags & gl::CONTEXT_FLAG_NO_ERROR_BIT != 0,
    }
  }

  fn memory_info(&self, source: MemoryInfoSource) -> MemoryInfo {
    // both extensions report KiB
    unsafe {
      match source {
        MemoryInfoSource::Nvx => MemoryInfo {
          total: kib(get_integer(gl::GPU_MEMORY_INFO_DEDICATED_VIDMEM_NVX)),
          free: kib(get_integer(gl::GPU_MEMORY_INFO_CURRENT_AVAILABLE_VIDMEM_NVX)),
        },

        MemoryInfoSource::Ati => {
          let mut vbo = [0; 4];
          let mut texture = [0; 4];
          gl::GetIntegerv(gl::VBO_FREE_MEMORY_ATI, vbo.as_mut_ptr());
          gl::GetIntegerv(gl::TEXTURE_FREE_MEMORY_ATI, texture.as_mut_ptr());

          MemoryInfo {
            total: 0,
            free: ati_free_memory(&vbo, &texture),
          }
        }
      }
    }
  }

  fn set_capability(&mut self, cap: Capability, enabled: bool) {
    let cap = from_capability(cap);

    unsafe {
      if enabled {
        gl::Enable(cap);
      } else {
        gl::Disable(cap);
      }
    }
  }

  fn alpha_func(&mut self, func: AlphaFunc, reference: f32) {
    let func = match func {
      AlphaFunc::Always => gl::ALWAYS,
      AlphaFunc::Greater => gl::GREATER,
    };

    unsafe { gl::AlphaFunc(func, reference) };
  }

  fn blend_func(&mut self, src: Factor, dst: Factor) {
    unsafe { gl::BlendFunc(from_factor(src), from_factor(dst)) };
  }

  fn depth_func(&mut self, func: DepthFunc) {
    let func = match func {
      DepthFunc::Always => gl::ALWAYS,
      DepthFunc::LessOrEqual => gl::LEQUAL,
    };

    unsafe { gl::DepthFunc(func) };
  }

  fn depth_mask(&mut self, write: bool) {
    unsafe { gl::DepthMask(if write { gl::TRUE } else { gl::FALSE }) };
  }

  fn polygon_offset(&mut self, factor: f32, units: f32) {
    unsafe { gl::PolygonOffset(factor, units) };
  }

  fn min_sample_shading(&mut self, value: f32) {
    unsafe { gl::MinSampleShading(value) };
  }

  fn polygon_mode(&mut self, mode: FillMode) {
    let mode = match mode {
      FillMode::Wireframe => gl::LINE,
      FillMode::Solid => gl::FILL,
    };

    unsafe { gl::PolygonMode(gl::FRONT_AND_BACK, mode) };
  }

  // Compatibility-profile GL has no fixed-point fog entry points; glFogi sets up the same linear
  // fog, so the flag does not change anything here.
  fn fog_linear(&mut self, _fixed_point: bool, eye_plane: bool) {
    unsafe {
      gl::Fogi(gl::FOG_MODE, gl::LINEAR as GLint);

      if eye_plane {
        gl::Fogi(gl::FOG_DISTANCE_MODE_NV, gl::EYE_PLANE as GLint);
      }
    }
  }

  fn fog_color(&mut self, color: [f32; 4]) {
    unsafe { gl::Fogfv(gl::FOG_COLOR, color.as_ptr()) };
  }

  fn fog_range(&mut self, start: f32, end: f32) {
    unsafe {
      gl::Fogf(gl::FOG_START, start);
      gl::Fogf(gl::FOG_END, end);
    }
  }

  fn fog_source(&mut self, source: FogSource) {
    let source = match source {
      FogSource::FragmentDepth => gl::FRAGMENT_DEPTH,
      FogSource::FogCoordinate => gl::FOG_COORD,
    };

    unsafe { gl::Fogi(gl::FOG_COORD_SRC, source as GLint) };
  }

  fn pixel_alignment(&mut self, alignment: u32) {
    unsafe {
      gl::PixelStorei(gl::PACK_ALIGNMENT, alignment as GLint);
      gl::PixelStorei(gl::UNPACK_ALIGNMENT, alignment as GLint);
    }
  }

  fn enable_client_arrays(&mut self) {
    unsafe {
      gl::EnableClientState(gl::VERTEX_ARRAY);
      gl::EnableClientState(gl::COLOR_ARRAY);
      gl::EnableClientState(gl::TEXTURE_COORD_ARRAY);
    }
  }

  fn load_matrices(&mut self, modelview: &M44, projection: &M44) {
    unsafe {
      gl::MatrixMode(gl::MODELVIEW);
      gl::LoadMatrixf(modelview.as_ptr() as *const GLfloat);
      gl::MatrixMode(gl::PROJECTION);
      gl::LoadMatrixf(projection.as_ptr() as *const GLfloat);
    }
  }

  fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
    unsafe { gl::Viewport(x, y, width, height) };
  }

  fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
    unsafe { gl::Scissor(x, y, width, height) };
  }

  fn clear_color(&mut self, color: [f32; 4]) {
    unsafe { gl::ClearColor(color[0], color[1], color[2], color[3]) };
  }

  fn clear_depth(&mut self, depth: f32, single_precision: bool) {
    unsafe {
      if single_precision {
        gl::ClearDepthf(depth);
      } else {
        gl::ClearDepth(depth as GLdouble);
      }
    }
  }

  fn clear(&mut self, buffers: ClearBuffers) {
    let mut bits = 0;

    if buffers.color {
      bits |= gl::COLOR_BUFFER_BIT;
    }

    if buffers.depth {
      bits |= gl::DEPTH_BUFFER_BIT;
    }

    unsafe { gl::Clear(bits) };
  }

  fn read_pixels(&mut self, width: usize, height: usize) -> Image {
    let mut image = Image::new(width, height, PixelFormat::Rgb8);

    unsafe {
      gl::ReadPixels(
        0,
        0,
        width as GLsizei,
        height as GLsizei,
        gl::RGB,
        gl::UNSIGNED_BYTE,
        image.data_mut().as_mut_ptr() as *mut c_void,
      );
    }

    image
  }

  fn active_texture(&mut self, unit: usize) {
    unsafe { gl::ActiveTexture(gl::TEXTURE0 + unit as GLenum) };
  }

  fn combine_mode(&mut self) {
    unsafe { gl::TexEnvi(gl::TEXTURE_ENV, gl::TEXTURE_ENV_MODE, gl::COMBINE as GLint) };
  }

  fn combiner(&mut self, channel: CombineChannel, combiner: Combiner) {
    let (combine, src0, src1, scale) = match channel {
      CombineChannel::Color => (gl::COMBINE_RGB, gl::SRC0_RGB, gl::SRC1_RGB, gl::RGB_SCALE),
      CombineChannel::Alpha => (
        gl::COMBINE_ALPHA,
        gl::SRC0_ALPHA,
        gl::SRC1_ALPHA,
        gl::ALPHA_SCALE,
      ),
    };

    let source = match combiner.source {
      CombineSource::Previous => gl::PREVIOUS,
      CombineSource::Texture => gl::TEXTURE,
    };

    unsafe {
      match combiner.function {
        CombineFunction::Replace => {
          gl::TexEnvi(gl::TEXTURE_ENV, combine, gl::REPLACE as GLint);
          gl::TexEnvi(gl::TEXTURE_ENV, src0, source as GLint);
        }

        CombineFunction::Modulate => {
          gl::TexEnvi(gl::TEXTURE_ENV, combine, gl::MODULATE as GLint);
          gl::TexEnvi(gl::TEXTURE_ENV, src0, source as GLint);
          gl::TexEnvi(gl::TEXTURE_ENV, src1, gl::PREVIOUS as GLint);
        }
      }

      gl::TexEnvf(gl::TEXTURE_ENV, scale, combiner.scale as GLfloat);
    }
  }

  fn lod_bias(&mut self, bias: f32) {
    unsafe { gl::TexEnvf(gl::TEXTURE_FILTER_CONTROL, gl::TEXTURE_LOD_BIAS, bias) };
  }

  fn create_texture(&mut self) -> Result<TextureHandle, DriverError> {
    let mut texture = 0;
    unsafe { gl::GenTextures(1, &mut texture) };

    if texture == 0 {
      Err(DriverError::CreationFailed("glGenTextures returned no name".to_owned()))
    } else {
      Ok(TextureHandle(texture))
    }
  }

  fn delete_texture(&mut self, handle: TextureHandle) {
    unsafe { gl::DeleteTextures(1, &handle.0) };
  }

  fn bind_texture(&mut self, handle: Option<TextureHandle>) {
    unsafe { gl::BindTexture(gl::TEXTURE_2D, handle.map_or(0, |h| h.0)) };
  }

  fn upload_texture(&mut self, image: &Image, format: TextureFormat, mipmaps: bool) {
    let internal = from_texture_format(format);
    let (pixel_format, _) = from_pixel_format(image.format());
    let generate_mipmap = gl::GenerateMipmap::is_loaded();

    unsafe {
      if mipmaps && !generate_mipmap {
        gl::TexParameteri(gl::TEXTURE_2D, gl::GENERATE_MIPMAP, gl::TRUE as GLint);
      }

      gl::TexImage2D(
        gl::TEXTURE_2D,
        0,
        internal as GLint,
        image.width() as GLsizei,
        image.height() as GLsizei,
        0,
        pixel_format,
        gl::UNSIGNED_BYTE,
        image.data().as_ptr() as *const c_void,
      );

      if mipmaps && generate_mipmap {
        gl::GenerateMipmap(gl::TEXTURE_2D);
      }
    }
  }

  fn texture_parameters(&mut self, sampler: &SamplerState) {
    let wrap = from_wrap(sampler.wrap) as GLint;
    let min = from_min_filter(sampler.min_filter) as GLint;
    let mag = from_mag_filter(sampler.mag_filter) as GLint;

    unsafe {
      gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, wrap);
      gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, wrap);
      gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, min);
      gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, mag);

      if self.anisotropic {
        gl::TexParameterf(gl::TEXTURE_2D, gl::TEXTURE_MAX_ANISOTROPY, sampler.anisotropy);
      }
    }
  }

  fn create_buffer(
    &mut self,
    capacity: usize,
    usage: BufferUsage,
    storage: BufferStorage,
  ) -> Result<BufferHandle, DriverError> {
    if !gl::GenBuffers::is_loaded() {
      return Err(DriverError::CreationFailed(
        "buffer objects are not supported".to_owned(),
      ));
    }

    let mut handle = 0;

    unsafe {
      gl::GenBuffers(1, &mut handle);
      gl::BindBuffer(gl::ARRAY_BUFFER, handle);
    }

    if handle == 0 {
      return Err(DriverError::CreationFailed("glGenBuffers returned no name".to_owned()));
    }

    let mapping = match storage {
      BufferStorage::Mutable => {
        unsafe {
          gl::BufferData(
            gl::ARRAY_BUFFER,
            capacity as GLsizeiptr,
            ptr::null(),
            from_usage(usage),
          );
        }

        None
      }

      BufferStorage::Persistent => {
        let flags = gl::MAP_WRITE_BIT | gl::MAP_PERSISTENT_BIT | gl::MAP_COHERENT_BIT;

        let mapped = unsafe {
          gl::BufferStorage(gl::ARRAY_BUFFER, capacity as GLsizeiptr, ptr::null(), flags);
          gl::MapBufferRange(gl::ARRAY_BUFFER, 0, capacity as GLsizeiptr, flags)
        };

        if mapped.is_null() {
          warn!("failed to map a persistent buffer of {} bytes", capacity);
          unsafe { gl::DeleteBuffers(1, &handle) };
          return Err(DriverError::MapFailed);
        }

        Some(mapped as *mut u8)
      }
    };

    self.buffers.insert(handle, GLBuffer { capacity, mapping });

    Ok(BufferHandle(handle))
  }

  fn delete_buffer(&mut self, handle: BufferHandle) {
    if let Some(buffer) = self.buffers.remove(&handle.0) {
      unsafe {
        if buffer.mapping.is_some() {
          gl::BindBuffer(gl::ARRAY_BUFFER, handle.0);
          gl::UnmapBuffer(gl::ARRAY_BUFFER);
        }

        gl::DeleteBuffers(1, &handle.0);
      }
    }
  }

  fn orphan_buffer(&mut self, handle: BufferHandle, capacity: usize, usage: BufferUsage) {
    unsafe {
      gl::BindBuffer(gl::ARRAY_BUFFER, handle.0);
      gl::BufferData(
        gl::ARRAY_BUFFER,
        capacity as GLsizeiptr,
        ptr::null(),
        from_usage(usage),
      );
    }

    if let Some(buffer) = self.buffers.get_mut(&handle.0) {
      buffer.capacity = capacity;
    }
  }

  fn write_buffer(
    &mut self,
    handle: BufferHandle,
    offset: usize,
    data: &[u8],
    method: BufferWrite,
  ) -> Result<(), DriverError> {
    let buffer = self.buffers.get(&handle.0).ok_or(DriverError::InvalidHandle)?;

    if offset
      .checked_add(data.len())
      .map_or(true, |end| end > buffer.capacity)
    {
      return Err(DriverError::OutOfBounds {
        offset,
        len: data.len(),
        capacity: buffer.capacity,
      });
    }

    unsafe {
      let mapped = match method {
        BufferWrite::Persistent => {
          let mapping = buffer.mapping.ok_or(DriverError::MapFailed)?;
          ptr::copy_nonoverlapping(data.as_ptr(), mapping.add(offset), data.len());

          return Ok(());
        }

        BufferWrite::SubData => {
          gl::BindBuffer(gl::ARRAY_BUFFER, handle.0);
          gl::BufferSubData(
            gl::ARRAY_BUFFER,
            offset as GLintptr,
            data.len() as GLsizeiptr,
            data.as_ptr() as *const c_void,
          );

          return Ok(());
        }

        BufferWrite::MapRange {
          invalidate,
          unsynchronized,
        } => {
          let mut access = gl::MAP_WRITE_BIT;

          match invalidate {
            Invalidate::Nothing => (),
            Invalidate::Range => access |= gl::MAP_INVALIDATE_RANGE_BIT,
            Invalidate::Buffer => access |= gl::MAP_INVALIDATE_BUFFER_BIT,
          }

          if unsynchronized {
            access |= gl::MAP_UNSYNCHRONIZED_BIT;
          }

          gl::BindBuffer(gl::ARRAY_BUFFER, handle.0);
          gl::MapBufferRange(
            gl::ARRAY_BUFFER,
            offset as GLintptr,
            data.len() as GLsizeiptr,
            access,
          ) as *mut u8
        }

        BufferWrite::Map => {
          gl::BindBuffer(gl::ARRAY_BUFFER, handle.0);
          let whole = gl::MapBuffer(gl::ARRAY_BUFFER, gl::WRITE_ONLY) as *mut u8;

          if whole.is_null() {
            whole
          } else {
            whole.add(offset)
          }
        }
      };

      if mapped.is_null() {
        return Err(DriverError::MapFailed);
      }

      ptr::copy_nonoverlapping(data.as_ptr(), mapped, data.len());

      // the content of the buffer is undefined if unmapping fails
      if gl::UnmapBuffer(gl::ARRAY_BUFFER) == gl::FALSE {
        return Err(DriverError::MapFailed);
      }
    }

    Ok(())
  }

  fn insert_fence(&mut self) -> FenceHandle {
    let fence = FenceHandle(self.next_fence);
    self.next_fence += 1;

    let sync = unsafe { gl::FenceSync(gl::SYNC_GPU_COMMANDS_COMPLETE, 0) };
    self.fences.insert(fence.0, sync);

    fence
  }

  fn wait_fence(&mut self, fence: FenceHandle) {
    if let Some(&sync) = self.fences.get(&fence.0) {
      loop {
        let status =
          unsafe { gl::ClientWaitSync(sync, gl::SYNC_FLUSH_COMMANDS_BIT, FENCE_WAIT_TIMEOUT) };

        match status {
          gl::ALREADY_SIGNALED | gl::CONDITION_SATISFIED => break,
          gl::WAIT_FAILED => {
            warn!("waiting on a buffer fence failed");
            break;
          }
          _ => (),
        }
      }
    }
  }

  fn delete_fence(&mut self, fence: FenceHandle) {
    if let Some(sync) = self.fences.remove(&fence.0) {
      unsafe { gl::DeleteSync(sync) };
    }
  }

  fn draw_arrays(
    &mut self,
    primitive: Primitive,
    source: VertexSource,
    fmt: &VertexFmt,
    first: usize,
    count: usize,
  ) {
    self.vertex_pointers(source, fmt);

    unsafe { gl::DrawArrays(from_primitive(primitive), first as GLint, count as GLsizei) };
  }

  fn draw_elements(
    &mut self,
    primitive: Primitive,
    source: VertexSource,
    fmt: &VertexFmt,
    indices: Indices,
  ) {
    self.vertex_pointers(source, fmt);

    let mode = from_primitive(primitive);
    let count = indices.indices.len() as GLsizei;
    let pointer = indices.indices.as_ptr() as *const c_void;

    unsafe {
      if gl::BindBuffer::is_loaded() {
        gl::BindBuffer(gl::ELEMENT_ARRAY_BUFFER, 0);
      }

      match indices.range {
        Some((min, max)) if gl::DrawRangeElements::is_loaded() => gl::DrawRangeElements(
          mode,
          min as GLuint,
          max as GLuint,
          count,
          gl::UNSIGNED_SHORT,
          pointer,
        ),
        _ => gl::DrawElements(mode, count, gl::UNSIGNED_SHORT, pointer),
      }
    }
  }
}

unsafe fn c_string(s: *const GLubyte) -> Option<String> {
  if s.is_null() {
    None
  } else {
    Some(
      CStr::from_ptr(s as *const c_char)
        .to_string_lossy()
        .into_owned(),
    )
  }
}

unsafe fn get_string(name: GLenum) -> Option<String> {
  c_string(gl::GetString(name))
}

unsafe fn get_integer(name: GLenum) -> GLint {
  let mut value = 0;
  gl::GetIntegerv(name, &mut value);
  value
}

fn kib(value: GLint) -> u64 {
  value.max(0) as u64 * 1024
}

// The first value of each ATI pool is its total free memory; pools may share the same memory.
fn ati_free_memory(vbo: &[GLint; 4], texture: &[GLint; 4]) -> u64 {
  kib(vbo[0].max(texture[0]))
}

fn from_capability(cap: Capability) -> GLenum {
  match cap {
    Capability::CullFace => gl::CULL_FACE,
    Capability::Fog => gl::FOG,
    Capability::AlphaTest => gl::ALPHA_TEST,
    Capability::Blend => gl::BLEND,
    Capability::DepthTest => gl::DEPTH_TEST,
    Capability::PolygonOffsetFill => gl::POLYGON_OFFSET_FILL,
    Capability::Multisample => gl::MULTISAMPLE,
    Capability::SampleShading => gl::SAMPLE_SHADING,
    Capability::AlphaToCoverage => gl::SAMPLE_ALPHA_TO_COVERAGE,
    Capability::ScissorTest => gl::SCISSOR_TEST,
    Capability::Texture2D => gl::TEXTURE_2D,
  }
}

fn from_factor(factor: Factor) -> GLenum {
  match factor {
    Factor::Zero => gl::ZERO,
    Factor::One => gl::ONE,
    Factor::SrcColor => gl::SRC_COLOR,
    Factor::SrcAlpha => gl::SRC_ALPHA,
    Factor::SrcColorComplement => gl::ONE_MINUS_SRC_COLOR,
    Factor::SrcAlphaComplement => gl::ONE_MINUS_SRC_ALPHA,
    Factor::SrcAlphaSaturate => gl::SRC_ALPHA_SATURATE,
    Factor::DstColor => gl::DST_COLOR,
    Factor::DstAlpha => gl::DST_ALPHA,
    Factor::DstColorComplement => gl::ONE_MINUS_DST_COLOR,
    Factor::DstAlphaComplement => gl::ONE_MINUS_DST_ALPHA,
  }
}

fn from_primitive(primitive: Primitive) -> GLenum {
  match primitive {
    Primitive::TriangleList => gl::TRIANGLES,
    Primitive::TriangleStrip => gl::TRIANGLE_STRIP,
    Primitive::TriangleFan => gl::TRIANGLE_FAN,
    Primitive::LineList => gl::LINES,
    Primitive::LineStrip => gl::LINE_STRIP,
  }
}

fn from_usage(usage: BufferUsage) -> GLenum {
  match usage {
    BufferUsage::Static => gl::STATIC_DRAW,
    BufferUsage::Dynamic => gl::DYNAMIC_DRAW,
    BufferUsage::Stream => gl::STREAM_DRAW,
  }
}

fn from_attrib_type(ty: VertexAttribType) -> GLenum {
  match ty {
    VertexAttribType::Floating => gl::FLOAT,
    VertexAttribType::NormalizedUnsigned => gl::UNSIGNED_BYTE,
  }
}

fn from_wrap(wrap: Wrap) -> GLenum {
  match wrap {
    Wrap::Repeat => gl::REPEAT,
    Wrap::MirroredRepeat => gl::MIRRORED_REPEAT,
    Wrap::ClampToEdge => gl::CLAMP_TO_EDGE,
  }
}

fn from_min_filter(filter: MinFilter) -> GLenum {
  match filter {
    MinFilter::Nearest => gl::NEAREST,
    MinFilter::Linear => gl::LINEAR,
    MinFilter::NearestMipmapNearest => gl::NEAREST_MIPMAP_NEAREST,
    MinFilter::LinearMipmapLinear => gl::LINEAR_MIPMAP_LINEAR,
  }
}

fn from_mag_filter(filter: MagFilter) -> GLenum {
  match filter {
    MagFilter::Nearest => gl::NEAREST,
    MagFilter::Linear => gl::LINEAR,
  }
}

// Pixel format and its sized internal format.
fn from_pixel_format(format: PixelFormat) -> (GLenum, GLenum) {
  match format {
    PixelFormat::L8 => (gl::LUMINANCE, gl::LUMINANCE8),
    PixelFormat::A8 => (gl::ALPHA, gl::ALPHA8),
    PixelFormat::La8 => (gl::LUMINANCE_ALPHA, gl::LUMINANCE8_ALPHA8),
    PixelFormat::Rgb8 => (gl::RGB, gl::RGB8),
    PixelFormat::Bgr8 => (gl::BGR, gl::RGB8),
    PixelFormat::Rgba8 => (gl::RGBA, gl::RGBA8),
    PixelFormat::Bgra8 => (gl::BGRA, gl::RGBA8),
  }
}

fn from_texture_format(format: TextureFormat) -> GLenum {
  match format {
    TextureFormat::Unsized(format) => match format {
      PixelFormat::L8 => gl::LUMINANCE,
      PixelFormat::A8 => gl::ALPHA,
      PixelFormat::La8 => gl::LUMINANCE_ALPHA,
      PixelFormat::Rgb8 | PixelFormat::Bgr8 => gl::RGB,
      PixelFormat::Rgba8 | PixelFormat::Bgra8 => gl::RGBA,
    },
    TextureFormat::Sized(format) => from_pixel_format(format).1,
    TextureFormat::Intensity => gl::INTENSITY8,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sized_formats_keep_channel_count() {
    assert_eq!(from_texture_format(TextureFormat::Sized(PixelFormat::Bgra8)), gl::RGBA8);
    assert_eq!(from_texture_format(TextureFormat::Unsized(PixelFormat::Bgr8)), gl::RGB);
    assert_eq!(from_pixel_format(PixelFormat::Bgr8).0, gl::BGR);
  }

  #[test]
  fn memory_is_reported_in_bytes() {
    assert_eq!(kib(2048), 2 * 1024 * 1024);
    assert_eq!(kib(-1), 0);

    assert_eq!(ati_free_memory(&[4096, 0, 0, 0], &[1024, 0, 0, 0]), 4096 * 1024);
    assert_eq!(ati_free_memory(&[0; 4], &[2048, 1, 1, 1]), 2048 * 1024);
  }

  #[test]
  fn single_driver_per_thread() {
    TLS_ACQUIRE_GL_DRIVER.with(|rc| *rc.borrow_mut() = None);

    let err = GLDriver::load_with(|_| ptr::null()).map(|_| ());
    assert_eq!(err, Err(GLDriverError::UnavailableDriver));

    TLS_ACQUIRE_GL_DRIVER.with(|rc| *rc.borrow_mut() = Some(()));

    let err = GLDriver::load_with(|_| ptr::null()).map(|_| ());
    assert_eq!(err, Err(GLDriverError::MissingEntryPoint("glGetString")));
  }
}
