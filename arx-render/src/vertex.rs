//! Vertex formats.
//!
//! A vertex is a plain-old-data type handed to the driver as raw bytes. To be usable with the
//! renderer, a type must implement [`Vertex`], which maps it to a [`VertexFmt`]: a stride and a
//! list of attributes with their semantics, component types, dimensions and byte offsets. The
//! fixed-function pipeline only knows a closed set of semantics ([`Semantic`]).

use bytemuck::{Pod, Zeroable};
use std::mem;

/// A type that can be used as a vertex.
///
/// # Safety
///
/// The format must describe the memory layout of the type: every attribute must lie within
/// `stride` bytes and `stride` must be the size of the type. The driver reads vertex memory
/// through this description.
pub unsafe trait Vertex: Pod {
  const VERTEX_FMT: VertexFmt;
}

/// Memory layout of a vertex type.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct VertexFmt {
  /// Size in bytes of a whole vertex.
  pub stride: usize,
  pub attribs: &'static [VertexAttribFmt],
}

impl VertexFmt {
  /// Format of the attribute with the given semantics, if any.
  pub fn attrib(&self, sem: Semantic) -> Option<&VertexAttribFmt> {
    self.attribs.iter().find(|attrib| attrib.sem == sem)
  }
}

/// Vertex attribute format.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct VertexAttribFmt {
  pub sem: Semantic,
  /// Type of the attribute components.
  pub comp_type: VertexAttribType,
  pub dim: VertexAttribDim,
  /// Offset of the attribute from the start of the vertex, in bytes.
  pub offset: usize,
}

/// Fixed-function vertex attribute semantics.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Semantic {
  Position,
  Color,
  /// Texture coordinates for the given texture unit.
  TexCoord(u8),
  FogCoord,
}

/// Possible type of vertex attributes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum VertexAttribType {
  Floating,
  /// Unsigned bytes mapped to `[0; 1]`.
  NormalizedUnsigned,
}

impl VertexAttribType {
  /// Size in bytes of a single component.
  pub fn unit_size(self) -> usize {
    match self {
      VertexAttribType::Floating => mem::size_of::<f32>(),
      VertexAttribType::NormalizedUnsigned => mem::size_of::<u8>(),
    }
  }
}

/// Possible dimension of vertex attributes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum VertexAttribDim {
  Dim1,
  Dim2,
  Dim3,
  Dim4,
}

impl VertexAttribDim {
  pub fn size(self) -> usize {
    match self {
      VertexAttribDim::Dim1 => 1,
      VertexAttribDim::Dim2 => 2,
      VertexAttribDim::Dim3 => 3,
      VertexAttribDim::Dim4 => 4,
    }
  }
}

/// Pre-transformed vertex, in window coordinates.
///
/// `w` is the reciprocal homogeneous W, used for perspective-correct interpolation.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TexturedVertex {
  pub p: [f32; 3],
  pub w: f32,
  pub color: [u8; 4],
  pub uv: [f32; 2],
}

unsafe impl Vertex for TexturedVertex {
  const VERTEX_FMT: VertexFmt = VertexFmt {
    stride: mem::size_of::<TexturedVertex>(),
    attribs: &[
      VertexAttribFmt {
        sem: Semantic::Position,
        comp_type: VertexAttribType::Floating,
        dim: VertexAttribDim::Dim4,
        offset: 0,
      },
      VertexAttribFmt {
        sem: Semantic::Color,
        comp_type: VertexAttribType::NormalizedUnsigned,
        dim: VertexAttribDim::Dim4,
        offset: 16,
      },
      VertexAttribFmt {
        sem: Semantic::TexCoord(0),
        comp_type: VertexAttribType::Floating,
        dim: VertexAttribDim::Dim2,
        offset: 20,
      },
    ],
  };
}

/// World-space vertex with a single set of texture coordinates.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SmyVertex {
  pub p: [f32; 3],
  pub color: [u8; 4],
  pub uv: [f32; 2],
}

unsafe impl Vertex for SmyVertex {
  const VERTEX_FMT: VertexFmt = VertexFmt {
    stride: mem::size_of::<SmyVertex>(),
    attribs: &[
      VertexAttribFmt {
        sem: Semantic::Position,
        comp_type: VertexAttribType::Floating,
        dim: VertexAttribDim::Dim3,
        offset: 0,
      },
      VertexAttribFmt {
        sem: Semantic::Color,
        comp_type: VertexAttribType::NormalizedUnsigned,
        dim: VertexAttribDim::Dim4,
        offset: 12,
      },
      VertexAttribFmt {
        sem: Semantic::TexCoord(0),
        comp_type: VertexAttribType::Floating,
        dim: VertexAttribDim::Dim2,
        offset: 16,
      },
    ],
  };
}

/// World-space vertex with three sets of texture coordinates (multi-texturing).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SmyVertex3 {
  pub p: [f32; 3],
  pub color: [u8; 4],
  pub uv: [[f32; 2]; 3],
}

unsafe impl Vertex for SmyVertex3 {
  const VERTEX_FMT: VertexFmt = VertexFmt {
    stride: mem::size_of::<SmyVertex3>(),
    attribs: &[
      VertexAttribFmt {
        sem: Semantic::Position,
        comp_type: VertexAttribType::Floating,
        dim: VertexAttribDim::Dim3,
        offset: 0,
      },
      VertexAttribFmt {
        sem: Semantic::Color,
        comp_type: VertexAttribType::NormalizedUnsigned,
        dim: VertexAttribDim::Dim4,
        offset: 12,
      },
      VertexAttribFmt {
        sem: Semantic::TexCoord(0),
        comp_type: VertexAttribType::Floating,
        dim: VertexAttribDim::Dim2,
        offset: 16,
      },
      VertexAttribFmt {
        sem: Semantic::TexCoord(1),
        comp_type: VertexAttribType::Floating,
        dim: VertexAttribDim::Dim2,
        offset: 24,
      },
      VertexAttribFmt {
        sem: Semantic::TexCoord(2),
        comp_type: VertexAttribType::Floating,
        dim: VertexAttribDim::Dim2,
        offset: 32,
      },
    ],
  };
}

#[cfg(test)]
mod tests {
  use super::*;

  fn check<V: Vertex>() {
    let fmt = V::VERTEX_FMT;
    assert_eq!(fmt.stride, mem::size_of::<V>());

    for attrib in fmt.attribs {
      let end = attrib.offset + attrib.comp_type.unit_size() * attrib.dim.size();
      assert!(end <= fmt.stride, "{:?} overflows the vertex", attrib.sem);
    }
  }

  #[test]
  fn formats_fit_their_types() {
    check::<TexturedVertex>();
    check::<SmyVertex>();
    check::<SmyVertex3>();
  }

  #[test]
  fn attribute_lookup() {
    let fmt = SmyVertex3::VERTEX_FMT;

    assert_eq!(fmt.attrib(Semantic::TexCoord(2)).map(|a| a.offset), Some(32));
    assert!(fmt.attrib(Semantic::FogCoord).is_none());
  }
}
