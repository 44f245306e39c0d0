//! Vertex buffers and upload strategies.
//!
//! How vertex data is best sent to the GPU depends on what the driver offers: persistently mapped
//! immutable storage, range mapping, whole-buffer mapping or nothing but plain sub-range updates.
//! Each vertex buffer gets a [`BufferStrategy`] when it is created, chosen by a
//! [`StrategySelector`] from the feature matrix, the usage pattern and an optional user
//! preference. The strategy never changes for the lifetime of the buffer.
//!
//! # Preferences
//!
//! The preference string is one of `persistent-orphan`, `persistent-x3`, `persistent-x2`,
//! `persistent-nosync`, `maprange`, `maprange+subdata`, `map`, `map+subdata`, `shadow` and
//! `shadow+subdata`. The empty string selects automatically. The `+subdata` variants upload with
//! plain sub-range updates instead of mappings.

use log::{debug, warn};
use std::cell::RefCell;
use std::error;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::driver::{
  BufferHandle, BufferStorage, BufferWrite, Driver, DriverError, FenceHandle, Indices, Invalidate,
  Primitive, VertexSource,
};
use crate::features::{Feature, Features};
use crate::vertex::Vertex;

/// Expected update frequency of a buffer.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BufferUsage {
  /// Written once.
  Static,
  /// Rewritten from time to time.
  Dynamic,
  /// Rewritten every frame.
  Stream,
}

/// How a vertex buffer uploads its data.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BufferStrategy {
  /// Persistent mapping; discarding writes allocate new storage.
  PersistentOrphan,
  /// Persistent mapping split into `buffers` regions cycled on discard and guarded by fences.
  PersistentFence { buffers: usize },
  /// Persistent mapping without any synchronization.
  PersistentUnsynchronized,
  /// Map the written range.
  MapRange { sub_data: bool },
  /// Map the whole buffer.
  Map { sub_data: bool },
  /// Client-side copy, re-uploaded with sub-range updates.
  Shadow { sub_data: bool },
}

impl BufferStrategy {
  pub fn is_persistent(&self) -> bool {
    matches!(
      self,
      BufferStrategy::PersistentOrphan
        | BufferStrategy::PersistentFence { .. }
        | BufferStrategy::PersistentUnsynchronized
    )
  }

  /// Number of regions the storage is split into.
  pub fn regions(&self) -> usize {
    match *self {
      BufferStrategy::PersistentFence { buffers } => buffers,
      _ => 1,
    }
  }
}

impl fmt::Display for BufferStrategy {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    let subdata = |sub_data: bool| if sub_data { "+subdata" } else { "" };

    match *self {
      BufferStrategy::PersistentOrphan => f.write_str("persistent-orphan"),
      BufferStrategy::PersistentFence { buffers } => write!(f, "persistent-x{}", buffers),
      BufferStrategy::PersistentUnsynchronized => f.write_str("persistent-nosync"),
      BufferStrategy::MapRange { sub_data } => write!(f, "maprange{}", subdata(sub_data)),
      BufferStrategy::Map { sub_data } => write!(f, "map{}", subdata(sub_data)),
      BufferStrategy::Shadow { sub_data } => write!(f, "shadow{}", subdata(sub_data)),
    }
  }
}

/// Outcome of one selection pass: a strategy, or whether the preference named a supported family
/// that did not apply to the usage.
fn pick(features: Features, usage: BufferUsage, preference: &str) -> Result<BufferStrategy, bool> {
  let auto = preference.is_empty();
  let mut matched = false;

  if features.has(Feature::MapBufferRange) {
    if features.has(Feature::BufferStorage) {
      if auto || preference == "persistent-orphan" {
        if usage != BufferUsage::Static {
          return Ok(BufferStrategy::PersistentOrphan);
        }
        matched = true;
      }

      if auto || preference == "persistent-x3" {
        if usage == BufferUsage::Stream {
          return Ok(BufferStrategy::PersistentFence { buffers: 3 });
        }
        matched = true;
      }

      if auto || preference == "persistent-x2" {
        if usage == BufferUsage::Stream {
          return Ok(BufferStrategy::PersistentFence { buffers: 2 });
        }
        matched = true;
      }

      if preference == "persistent-nosync" {
        if usage != BufferUsage::Static {
          return Ok(BufferStrategy::PersistentUnsynchronized);
        }
        matched = true;
      }
    }

    if auto || preference == "maprange" || preference == "maprange+subdata" {
      return Ok(BufferStrategy::MapRange {
        sub_data: preference.ends_with("+subdata"),
      });
    }
  }

  if features.has(Feature::MapBuffer) && (auto || preference == "map" || preference == "map+subdata") {
    return Ok(BufferStrategy::Map {
      sub_data: preference.ends_with("+subdata"),
    });
  }

  if auto || preference == "shadow" || preference == "shadow+subdata" {
    return Ok(BufferStrategy::Shadow {
      sub_data: preference.ends_with("+subdata"),
    });
  }

  Err(matched)
}

/// Chooses buffer strategies; warns once about an unsupported preference.
#[derive(Debug, Default)]
pub struct StrategySelector {
  warned: bool,
}

impl StrategySelector {
  pub fn new() -> Self {
    Self::default()
  }

  /// Select the strategy of a new buffer.
  ///
  /// A preference that cannot be honoured falls back to automatic selection.
  pub fn select(&mut self, features: Features, usage: BufferUsage, preference: &str) -> BufferStrategy {
    let matched = match pick(features, usage, preference) {
      Ok(strategy) => return strategy,
      Err(matched) => matched,
    };

    if !matched && !self.warned {
      warn!("Ignoring unsupported buffer upload setting: {}", preference);
      self.warned = true;
    }

    // automatic selection always ends with shadow copies
    pick(features, usage, "").unwrap_or(BufferStrategy::Shadow { sub_data: false })
  }
}

/// Usage hint to give the driver.
pub fn effective_usage(usage: BufferUsage, features: Features) -> BufferUsage {
  if usage == BufferUsage::Stream && !features.has(Feature::BufferUsageStream) {
    BufferUsage::Dynamic
  } else {
    usage
  }
}

/// Possible errors that might occur when dealing with vertex buffers.
///
/// Please keep in mind that this `enum` is _non exhaustive_; you will not be able to exhaustively
/// pattern-match against it.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BufferError {
  /// Writing past the end of the buffer.
  ///
  /// Contains the vertex offset, the number of written vertices and the capacity of the buffer.
  Overflow {
    offset: usize,
    len: usize,
    capacity: usize,
  },
  /// Buffer mapping failed.
  MapFailed,
  /// The driver could not create the buffer.
  CreationFailed(String),
  /// The driver reported an error.
  Driver(DriverError),
}

impl fmt::Display for BufferError {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    match *self {
      BufferError::Overflow {
        offset,
        len,
        capacity,
      } => write!(
        f,
        "buffer overflow (offset = {}, len = {}, capacity = {})",
        offset, len, capacity
      ),

      BufferError::MapFailed => write!(f, "buffer mapping failed"),

      BufferError::CreationFailed(ref reason) => write!(f, "buffer creation failed: {}", reason),

      BufferError::Driver(ref e) => write!(f, "driver error: {}", e),
    }
  }
}

impl error::Error for BufferError {
  fn source(&self) -> Option<&(dyn error::Error + 'static)> {
    match self {
      BufferError::Driver(e) => Some(e),
      _ => None,
    }
  }
}

impl From<DriverError> for BufferError {
  fn from(e: DriverError) -> Self {
    match e {
      DriverError::MapFailed => BufferError::MapFailed,
      DriverError::CreationFailed(reason) => BufferError::CreationFailed(reason),
      e => BufferError::Driver(e),
    }
  }
}

/// How a write relates to the previous content of the buffer.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct WriteFlags {
  /// The whole previous content may be thrown away.
  pub discard: bool,
  /// The written range is not used by pending draws.
  pub no_overwrite: bool,
}

impl WriteFlags {
  pub const DISCARD: WriteFlags = WriteFlags {
    discard: true,
    no_overwrite: false,
  };

  pub const NO_OVERWRITE: WriteFlags = WriteFlags {
    discard: false,
    no_overwrite: true,
  };
}

/// GPU objects of dropped buffers, waiting for the driver.
#[derive(Debug, Default)]
pub(crate) struct DeadBuffers {
  pub(crate) buffers: Vec<BufferHandle>,
  pub(crate) fences: Vec<FenceHandle>,
}

pub(crate) type BufferGraveyard = Rc<RefCell<DeadBuffers>>;

/// Delete the driver objects of dropped buffers.
pub(crate) fn collect_buffers<D>(driver: &mut D, graveyard: &BufferGraveyard)
where
  D: Driver + ?Sized,
{
  let mut dead = graveyard.borrow_mut();

  for fence in dead.fences.drain(..) {
    driver.delete_fence(fence);
  }

  for handle in dead.buffers.drain(..) {
    driver.delete_buffer(handle);
  }
}

/// A vertex buffer.
///
/// Dropping a buffer queues its driver objects for deletion by the renderer.
#[derive(Debug)]
pub struct VertexBuffer<V> {
  handle: BufferHandle,
  capacity: usize,
  usage: BufferUsage,
  strategy: BufferStrategy,
  shadow: Vec<V>,
  /// Fence guarding each region, for fenced strategies.
  fences: Vec<Option<FenceHandle>>,
  region: usize,
  graveyard: BufferGraveyard,
  _v: PhantomData<*const V>,
}

impl<V> VertexBuffer<V>
where
  V: Vertex,
{
  pub(crate) fn new<D>(
    driver: &mut D,
    capacity: usize,
    usage: BufferUsage,
    strategy: BufferStrategy,
    graveyard: BufferGraveyard,
  ) -> Result<Self, BufferError>
  where
    D: Driver + ?Sized,
  {
    let storage = if strategy.is_persistent() {
      BufferStorage::Persistent
    } else {
      BufferStorage::Mutable
    };

    let regions = strategy.regions();
    let handle = driver.create_buffer(Self::bytes(capacity * regions), usage, storage)?;

    let shadow = match strategy {
      BufferStrategy::Shadow { .. } => vec![V::zeroed(); capacity],
      _ => Vec::new(),
    };

    debug!(
      "created {} vertex buffer ({} vertices, {:?})",
      strategy, capacity, usage
    );

    Ok(VertexBuffer {
      handle,
      capacity,
      usage,
      strategy,
      shadow,
      fences: vec![None; regions],
      region: 0,
      graveyard,
      _v: PhantomData,
    })
  }

  fn bytes(vertices: usize) -> usize {
    vertices * V::VERTEX_FMT.stride
  }

  pub fn handle(&self) -> BufferHandle {
    self.handle
  }

  /// Capacity, in vertices.
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn usage(&self) -> BufferUsage {
    self.usage
  }

  pub fn strategy(&self) -> BufferStrategy {
    self.strategy
  }

  /// First vertex of the region currently written to and drawn from.
  fn base(&self) -> usize {
    self.region * self.capacity
  }

  /// Write `vertices` starting at vertex `offset`.
  pub fn set_data<D>(
    &mut self,
    driver: &mut D,
    vertices: &[V],
    offset: usize,
    flags: WriteFlags,
  ) -> Result<(), BufferError>
  where
    D: Driver + ?Sized,
  {
    if offset
      .checked_add(vertices.len())
      .map_or(true, |end| end > self.capacity)
    {
      return Err(BufferError::Overflow {
        offset,
        len: vertices.len(),
        capacity: self.capacity,
      });
    }

    let data: &[u8] = bytemuck::cast_slice(vertices);

    match self.strategy {
      BufferStrategy::PersistentOrphan => {
        if flags.discard {
          self.reallocate(driver)?;
        }

        driver.write_buffer(self.handle, Self::bytes(offset), data, BufferWrite::Persistent)?;
      }

      BufferStrategy::PersistentFence { buffers } => {
        if flags.discard {
          // fence the draws of the current region, then move to the next one
          let fence = driver.insert_fence();
          if let Some(old) = self.fences[self.region].replace(fence) {
            driver.delete_fence(old);
          }

          self.region = (self.region + 1) % buffers;

          if let Some(pending) = self.fences[self.region].take() {
            driver.wait_fence(pending);
            driver.delete_fence(pending);
          }
        }

        let at = Self::bytes(self.base() + offset);
        driver.write_buffer(self.handle, at, data, BufferWrite::Persistent)?;
      }

      BufferStrategy::PersistentUnsynchronized => {
        driver.write_buffer(self.handle, Self::bytes(offset), data, BufferWrite::Persistent)?;
      }

      BufferStrategy::MapRange { sub_data } => {
        let method = if sub_data {
          if flags.discard {
            driver.orphan_buffer(self.handle, Self::bytes(self.capacity), self.usage);
          }
          BufferWrite::SubData
        } else {
          BufferWrite::MapRange {
            invalidate: if flags.discard {
              Invalidate::Buffer
            } else {
              Invalidate::Range
            },
            unsynchronized: flags.no_overwrite,
          }
        };

        driver.write_buffer(self.handle, Self::bytes(offset), data, method)?;
      }

      BufferStrategy::Map { sub_data } => {
        if flags.discard {
          driver.orphan_buffer(self.handle, Self::bytes(self.capacity), self.usage);
        }

        let method = if sub_data {
          BufferWrite::SubData
        } else {
          BufferWrite::Map
        };

        driver.write_buffer(self.handle, Self::bytes(offset), data, method)?;
      }

      BufferStrategy::Shadow { sub_data } => {
        self.shadow[offset..offset + vertices.len()].copy_from_slice(vertices);

        if flags.discard || !sub_data {
          driver.orphan_buffer(self.handle, Self::bytes(self.capacity), self.usage);
        }

        if sub_data {
          driver.write_buffer(self.handle, Self::bytes(offset), data, BufferWrite::SubData)?;
        } else {
          let whole: &[u8] = bytemuck::cast_slice(&self.shadow);
          driver.write_buffer(self.handle, 0, whole, BufferWrite::SubData)?;
        }
      }
    }

    Ok(())
  }

  /// New persistent storage; pending draws keep using the old one.
  fn reallocate<D>(&mut self, driver: &mut D) -> Result<(), BufferError>
  where
    D: Driver + ?Sized,
  {
    let handle = driver.create_buffer(
      Self::bytes(self.capacity),
      self.usage,
      BufferStorage::Persistent,
    )?;
    driver.delete_buffer(self.handle);
    self.handle = handle;

    Ok(())
  }

  /// Client-side copy, for shadowed buffers.
  pub fn shadow(&self) -> Option<&[V]> {
    match self.strategy {
      BufferStrategy::Shadow { .. } => Some(&self.shadow),
      _ => None,
    }
  }

  pub(crate) fn draw<D>(&self, driver: &mut D, primitive: Primitive, first: usize, count: usize)
  where
    D: Driver + ?Sized,
  {
    let source = VertexSource::Buffer(self.handle, self.base());
    driver.draw_arrays(primitive, source, &V::VERTEX_FMT, first, count);
  }

  pub(crate) fn draw_indexed<D>(
    &self,
    driver: &mut D,
    primitive: Primitive,
    first: usize,
    indices: Indices,
  ) where
    D: Driver + ?Sized,
  {
    let source = VertexSource::Buffer(self.handle, self.base() + first);
    driver.draw_elements(primitive, source, &V::VERTEX_FMT, indices);
  }
}

impl<V> Drop for VertexBuffer<V> {
  fn drop(&mut self) {
    let mut dead = self.graveyard.borrow_mut();
    dead.buffers.push(self.handle);
    dead.fences.extend(self.fences.iter().flatten().copied());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::driver::headless::{Call, HeadlessDriver};
  use crate::vertex::SmyVertex;

  fn features(list: &[Feature]) -> Features {
    list.iter().fold(Features::none(), |f, &feature| f.with(feature))
  }

  fn modern() -> Features {
    features(&[
      Feature::MapBufferRange,
      Feature::BufferStorage,
      Feature::MapBuffer,
      Feature::BufferUsageStream,
    ])
  }

  fn select(features: Features, usage: BufferUsage, preference: &str) -> BufferStrategy {
    StrategySelector::new().select(features, usage, preference)
  }

  #[test]
  fn automatic_selection() {
    assert_eq!(
      select(modern(), BufferUsage::Dynamic, ""),
      BufferStrategy::PersistentOrphan
    );
    assert_eq!(
      select(modern(), BufferUsage::Stream, ""),
      BufferStrategy::PersistentOrphan
    );
    assert_eq!(
      select(modern(), BufferUsage::Static, ""),
      BufferStrategy::MapRange { sub_data: false }
    );

    let old = features(&[Feature::MapBuffer]);
    assert_eq!(
      select(old, BufferUsage::Stream, ""),
      BufferStrategy::Map { sub_data: false }
    );

    assert_eq!(
      select(Features::none(), BufferUsage::Dynamic, ""),
      BufferStrategy::Shadow { sub_data: false }
    );
  }

  #[test]
  fn explicit_preferences() {
    assert_eq!(
      select(modern(), BufferUsage::Stream, "persistent-x3"),
      BufferStrategy::PersistentFence { buffers: 3 }
    );
    assert_eq!(
      select(modern(), BufferUsage::Stream, "persistent-x2"),
      BufferStrategy::PersistentFence { buffers: 2 }
    );
    assert_eq!(
      select(modern(), BufferUsage::Dynamic, "persistent-nosync"),
      BufferStrategy::PersistentUnsynchronized
    );
    assert_eq!(
      select(modern(), BufferUsage::Stream, "maprange+subdata"),
      BufferStrategy::MapRange { sub_data: true }
    );
    assert_eq!(
      select(modern(), BufferUsage::Stream, "shadow+subdata"),
      BufferStrategy::Shadow { sub_data: true }
    );
  }

  #[test]
  fn inapplicable_preference_falls_back_silently() {
    let mut selector = StrategySelector::new();

    // fenced buffers are only for streamed data
    assert_eq!(
      selector.select(modern(), BufferUsage::Dynamic, "persistent-x3"),
      BufferStrategy::PersistentOrphan
    );
    assert!(!selector.warned);
  }

  #[test]
  fn unsupported_preference_warns_once() {
    let mut selector = StrategySelector::new();
    let old = features(&[Feature::MapBuffer]);

    assert_eq!(
      selector.select(old, BufferUsage::Dynamic, "persistent-orphan"),
      BufferStrategy::Map { sub_data: false }
    );
    assert!(selector.warned);

    assert_eq!(
      selector.select(old, BufferUsage::Dynamic, "bogus"),
      BufferStrategy::Map { sub_data: false }
    );
  }

  #[test]
  fn selection_is_idempotent() {
    let mut selector = StrategySelector::new();

    for &usage in &[BufferUsage::Static, BufferUsage::Dynamic, BufferUsage::Stream] {
      for &preference in &["", "persistent-x2", "map", "nonsense"] {
        let first = selector.select(modern(), usage, preference);
        let second = selector.select(modern(), usage, preference);
        assert_eq!(first, second);
      }
    }
  }

  #[test]
  fn stream_hint_needs_support() {
    assert_eq!(
      effective_usage(BufferUsage::Stream, Features::none()),
      BufferUsage::Dynamic
    );
    assert_eq!(
      effective_usage(BufferUsage::Stream, modern()),
      BufferUsage::Stream
    );
  }

  fn vertices(n: usize) -> Vec<SmyVertex> {
    (0..n)
      .map(|i| SmyVertex {
        p: [i as f32, 0., 0.],
        ..SmyVertex::default()
      })
      .collect()
  }

  fn buffer(driver: &mut HeadlessDriver, strategy: BufferStrategy) -> VertexBuffer<SmyVertex> {
    VertexBuffer::new(
      driver,
      4,
      BufferUsage::Stream,
      strategy,
      BufferGraveyard::default(),
    )
    .unwrap()
  }

  #[test]
  fn overflow_is_rejected() {
    let mut driver = HeadlessDriver::default();
    let mut vb = buffer(&mut driver, BufferStrategy::Shadow { sub_data: true });

    assert_eq!(
      vb.set_data(&mut driver, &vertices(3), 2, WriteFlags::default()),
      Err(BufferError::Overflow {
        offset: 2,
        len: 3,
        capacity: 4
      })
    );

    assert_eq!(
      vb.set_data(&mut driver, &vertices(1), usize::MAX, WriteFlags::default()),
      Err(BufferError::Overflow {
        offset: usize::MAX,
        len: 1,
        capacity: 4
      })
    );
    assert!(vb.shadow().unwrap().iter().all(|v| *v == SmyVertex::default()));
  }

  #[test]
  fn shadow_copy_uploads() {
    let mut driver = HeadlessDriver::default();
    let mut vb = buffer(&mut driver, BufferStrategy::Shadow { sub_data: false });
    let data = vertices(2);

    vb.set_data(&mut driver, &data, 1, WriteFlags::default()).unwrap();
    assert_eq!(&vb.shadow().unwrap()[1..3], &data[..]);

    // whole shadow re-uploaded
    let stride = SmyVertex::VERTEX_FMT.stride;
    assert_eq!(
      driver.calls().last(),
      Some(&Call::WriteBuffer {
        handle: vb.handle(),
        offset: 0,
        len: 4 * stride,
        method: BufferWrite::SubData,
      })
    );
    let stored = &driver.state().buffers[&vb.handle()].data;
    assert_eq!(&stored[stride..3 * stride], bytemuck::cast_slice::<_, u8>(&data));
  }

  #[test]
  fn fenced_regions_cycle_on_discard() {
    let mut driver = HeadlessDriver::default();
    let mut vb = buffer(&mut driver, BufferStrategy::PersistentFence { buffers: 2 });
    let stride = SmyVertex::VERTEX_FMT.stride;

    vb.set_data(&mut driver, &vertices(4), 0, WriteFlags::DISCARD).unwrap();
    vb.set_data(&mut driver, &vertices(4), 0, WriteFlags::DISCARD).unwrap();
    vb.set_data(&mut driver, &vertices(4), 0, WriteFlags::DISCARD).unwrap();

    let writes: Vec<_> = driver
      .calls()
      .iter()
      .filter_map(|c| match c {
        Call::WriteBuffer { offset, .. } => Some(*offset),
        _ => None,
      })
      .collect();
    assert_eq!(writes, vec![4 * stride, 0, 4 * stride]);

    // the first discard moves to a region that was never fenced
    assert_eq!(driver.count(|c| matches!(c, Call::WaitFence(_))), 2);
    assert_eq!(driver.count(|c| matches!(c, Call::InsertFence(_))), 3);
  }

  #[test]
  fn persistent_orphan_reallocates_on_discard() {
    let mut driver = HeadlessDriver::default();
    let mut vb = buffer(&mut driver, BufferStrategy::PersistentOrphan);
    let first = vb.handle();

    vb.set_data(&mut driver, &vertices(1), 0, WriteFlags::NO_OVERWRITE).unwrap();
    assert_eq!(vb.handle(), first);

    vb.set_data(&mut driver, &vertices(1), 0, WriteFlags::DISCARD).unwrap();
    assert_ne!(vb.handle(), first);
    assert!(driver.calls().contains(&Call::DeleteBuffer(first)));
  }

  #[test]
  fn map_range_flags() {
    let mut driver = HeadlessDriver::default();
    let mut vb = buffer(&mut driver, BufferStrategy::MapRange { sub_data: false });

    vb.set_data(&mut driver, &vertices(2), 2, WriteFlags::NO_OVERWRITE).unwrap();
    assert!(matches!(
      driver.calls().last(),
      Some(Call::WriteBuffer {
        method: BufferWrite::MapRange {
          invalidate: Invalidate::Range,
          unsynchronized: true
        },
        ..
      })
    ));

    driver.set_fail_maps(true);
    assert_eq!(
      vb.set_data(&mut driver, &vertices(1), 0, WriteFlags::DISCARD),
      Err(BufferError::MapFailed)
    );
  }

  #[test]
  fn dropped_buffers_are_collected() {
    let mut driver = HeadlessDriver::default();
    let graveyard = BufferGraveyard::default();
    let vb: VertexBuffer<SmyVertex> = VertexBuffer::new(
      &mut driver,
      4,
      BufferUsage::Static,
      BufferStrategy::Map { sub_data: false },
      graveyard.clone(),
    )
    .unwrap();
    let handle = vb.handle();

    drop(vb);
    collect_buffers(&mut driver, &graveyard);
    assert!(driver.calls().contains(&Call::DeleteBuffer(handle)));
    assert!(driver.state().buffers.is_empty());
  }
}
