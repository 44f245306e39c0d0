//! Textures and the texture registry.
//!
//! A [`Texture`] is owned by whoever created it. The renderer keeps a weak reference to every
//! live texture in its [`TextureRegistry`] so that all of them can be released before a context is
//! lost and re-uploaded afterwards. Dropping a [`Texture`] does not call the driver: its GPU name
//! is queued and deleted the next time the renderer gets hold of the driver.

use log::debug;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::driver::{Driver, DriverError, TextureFormat, TextureHandle};
use crate::features::{Feature, Features};
use crate::image::{Image, PixelFormat};

/// How to wrap texture coordinates while sampling textures?
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Wrap {
  /// Textures coordinates are repeated if they lay outside of *[0;1]*.
  Repeat,
  /// Same as `Repeat` but it will alternatively repeat between *[0;1]* and *[1;0]*.
  MirroredRepeat,
  /// If textures coordinates lay outside of *[0;1]*, they will be clamped to either *0* or *1* for
  /// every components.
  ClampToEdge,
}

/// Texel filtering requested by a texture stage.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Filter {
  Nearest,
  Linear,
}

/// Minification filter.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MinFilter {
  /// Nearest interpolation.
  Nearest,
  /// Linear interpolation between surrounding pixels.
  Linear,
  /// This filter will select the nearest mipmap between two samples and will perform a nearest
  /// interpolation afterwards.
  NearestMipmapNearest,
  /// This filter will linearly interpolate between two mipmaps, which selected texels would have
  /// been linarily interpolated as well.
  LinearMipmapLinear,
}

/// Magnification filter.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MagFilter {
  /// Nearest interpolation.
  Nearest,
  /// Linear interpolation between surrounding pixels.
  Linear,
}

/// Sampler parameters of a texture object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerState {
  pub wrap: Wrap,
  pub min_filter: MinFilter,
  pub mag_filter: MagFilter,
  /// `1.` disables anisotropic filtering.
  pub anisotropy: f32,
}

impl SamplerState {
  /// Sampler parameters for a stage request on a texture with or without mipmaps.
  pub fn resolve(wrap: Wrap, min: Filter, mag: Filter, mipmaps: bool, anisotropy: f32) -> Self {
    let min_filter = match (min, mipmaps) {
      (Filter::Nearest, false) => MinFilter::Nearest,
      (Filter::Linear, false) => MinFilter::Linear,
      (Filter::Nearest, true) => MinFilter::NearestMipmapNearest,
      (Filter::Linear, true) => MinFilter::LinearMipmapLinear,
    };

    let mag_filter = match mag {
      Filter::Nearest => MagFilter::Nearest,
      Filter::Linear => MagFilter::Linear,
    };

    SamplerState {
      wrap,
      min_filter,
      mag_filter,
      anisotropy: if mipmaps { anisotropy } else { 1. },
    }
  }
}

/// Texture creation flags.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct TextureFlags {
  /// Black texels become transparent.
  pub color_key: bool,
  pub mipmaps: bool,
  /// Single-channel image used as intensity.
  pub intensity: bool,
}

/// Renderer side of a texture.
#[derive(Debug)]
pub struct TextureData {
  image: Image,
  flags: TextureFlags,
  handle: Option<TextureHandle>,
  stored_size: (usize, usize),
  sampler: Option<SamplerState>,
}

impl TextureData {
  pub fn handle(&self) -> Option<TextureHandle> {
    self.handle
  }

  pub fn flags(&self) -> TextureFlags {
    self.flags
  }

  /// Size of the image.
  pub fn size(&self) -> (usize, usize) {
    (self.image.width(), self.image.height())
  }

  /// Size of the GPU storage; larger than the image when padded to powers of two.
  pub fn stored_size(&self) -> (usize, usize) {
    self.stored_size
  }

  /// Set the sampler parameters, skipping the driver if they did not change.
  pub(crate) fn apply_sampler<D>(&mut self, driver: &mut D, sampler: SamplerState)
  where
    D: Driver + ?Sized,
  {
    if self.sampler != Some(sampler) {
      driver.texture_parameters(&sampler);
      self.sampler = Some(sampler);
    }
  }

  /// Image as it must be uploaded, with the GPU-side size and format.
  fn prepare(&self, features: Features) -> (Image, TextureFormat) {
    let mut image = if self.flags.color_key {
      self.image.apply_color_key([0, 0, 0])
    } else {
      self.image.clone()
    };

    if !features.has(Feature::BgrTextureTransfer) {
      image = image.to_rgb_order();
    }

    if !features.has(Feature::TextureNpot) {
      let width = image.width().next_power_of_two();
      let height = image.height().next_power_of_two();
      if (width, height) != (image.width(), image.height()) {
        image = image.padded(width, height);
      }
    }

    let format = if self.flags.intensity
      && image.format() == PixelFormat::L8
      && features.has(Feature::IntensityTextures)
    {
      TextureFormat::Intensity
    } else if features.has(Feature::SizedTextureFormats) {
      TextureFormat::Sized(image.format())
    } else {
      TextureFormat::Unsized(image.format())
    };

    (image, format)
  }
}

pub(crate) type TextureRef = Rc<RefCell<TextureData>>;

/// Deleted texture names waiting for the driver.
type Graveyard = Rc<RefCell<Vec<TextureHandle>>>;

/// A texture, owned by its creator.
#[derive(Debug)]
pub struct Texture {
  data: TextureRef,
  graveyard: Graveyard,
}

impl Texture {
  pub fn handle(&self) -> Option<TextureHandle> {
    self.data.borrow().handle
  }

  pub fn size(&self) -> (usize, usize) {
    self.data.borrow().size()
  }

  pub fn stored_size(&self) -> (usize, usize) {
    self.data.borrow().stored_size
  }

  pub fn flags(&self) -> TextureFlags {
    self.data.borrow().flags
  }

  /// Is the texture currently uploaded?
  pub fn is_resident(&self) -> bool {
    self.handle().is_some()
  }

  pub(crate) fn data(&self) -> &TextureRef {
    &self.data
  }
}

impl Drop for Texture {
  fn drop(&mut self) {
    if let Some(handle) = self.data.borrow_mut().handle.take() {
      self.graveyard.borrow_mut().push(handle);
    }
  }
}

/// Weak collection of every live texture.
#[derive(Debug, Default)]
pub struct TextureRegistry {
  textures: Vec<Weak<RefCell<TextureData>>>,
  graveyard: Graveyard,
}

impl TextureRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a new, not yet uploaded, texture.
  pub fn create(&mut self, image: Image, flags: TextureFlags) -> Texture {
    let stored_size = (image.width(), image.height());
    let data = Rc::new(RefCell::new(TextureData {
      image,
      flags,
      handle: None,
      stored_size,
      sampler: None,
    }));

    self.textures.push(Rc::downgrade(&data));

    Texture {
      data,
      graveyard: self.graveyard.clone(),
    }
  }

  /// Number of live textures.
  pub fn len(&self) -> usize {
    self.live().count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn live(&self) -> impl Iterator<Item = TextureRef> + '_ {
    self.textures.iter().filter_map(Weak::upgrade)
  }

  /// Delete the names of dropped textures and forget them.
  ///
  /// Returns the deleted names so that texture bindings can be updated.
  pub fn collect<D>(&mut self, driver: &mut D) -> Vec<TextureHandle>
  where
    D: Driver + ?Sized,
  {
    let dead: Vec<_> = self.graveyard.borrow_mut().drain(..).collect();

    for &handle in &dead {
      driver.delete_texture(handle);
    }

    self.textures.retain(|texture| texture.strong_count() > 0);

    dead
  }

  /// Drop the GPU side of every texture.
  pub fn release_all<D>(&mut self, driver: &mut D) -> Vec<TextureHandle>
  where
    D: Driver + ?Sized,
  {
    let mut released = self.collect(driver);

    for texture in self.live() {
      let mut texture = texture.borrow_mut();
      if let Some(handle) = texture.handle.take() {
        driver.delete_texture(handle);
        released.push(handle);
      }
      texture.sampler = None;
    }

    released
  }

  /// Forget every sampler state, e.g. after the anisotropy changed.
  pub fn invalidate_samplers(&mut self) {
    for texture in self.live() {
      texture.borrow_mut().sampler = None;
    }
  }

  /// Live textures matching `filter`.
  pub(crate) fn select(&self, filter: impl Fn(&TextureData) -> bool) -> Vec<TextureRef> {
    self.live().filter(|t| filter(&t.borrow())).collect()
  }
}

/// Upload a texture into the currently bound texture object, creating the name if needed.
///
/// The caller binds the returned name before uploading.
pub(crate) fn upload<D, B>(
  driver: &mut D,
  texture: &TextureRef,
  features: Features,
  mut bind: B,
) -> Result<TextureHandle, DriverError>
where
  D: Driver + ?Sized,
  B: FnMut(&mut D, TextureHandle),
{
  let mut data = texture.borrow_mut();

  let handle = match data.handle {
    Some(handle) => handle,
    None => driver.create_texture()?,
  };

  let (image, format) = data.prepare(features);
  debug!(
    "uploading {}x{} texture as {:?}",
    image.width(),
    image.height(),
    format
  );

  bind(driver, handle);
  driver.upload_texture(&image, format, data.flags.mipmaps);

  data.handle = Some(handle);
  data.stored_size = (image.width(), image.height());
  data.sampler = None;

  Ok(handle)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::driver::headless::{Call, HeadlessDriver};

  fn image(width: usize, height: usize, format: PixelFormat) -> Image {
    Image::new(width, height, format)
  }

  fn all_features() -> Features {
    Feature::ALL
      .into_iter()
      .fold(Features::none(), |f, feature| f.with(feature))
  }

  #[test]
  fn npot_padding_without_support() {
    let mut driver = HeadlessDriver::default();
    let mut registry = TextureRegistry::new();
    let texture = registry.create(image(100, 60, PixelFormat::Rgba8), TextureFlags::default());

    let features = all_features().without(Feature::TextureNpot);
    upload(&mut driver, texture.data(), features, |d, h| d.bind_texture(Some(h))).unwrap();
    assert_eq!(texture.stored_size(), (128, 64));
    assert_eq!(texture.size(), (100, 60));

    upload(&mut driver, texture.data(), all_features(), |d, h| d.bind_texture(Some(h))).unwrap();
    assert_eq!(texture.stored_size(), (100, 60));
  }

  #[test]
  fn formats_follow_features() {
    let mut registry = TextureRegistry::new();
    let flags = TextureFlags {
      intensity: true,
      ..TextureFlags::default()
    };
    let texture = registry.create(image(4, 4, PixelFormat::L8), flags);

    let (_, format) = texture.data().borrow().prepare(all_features());
    assert_eq!(format, TextureFormat::Intensity);

    let features = Features::none().with(Feature::TextureNpot);
    let (_, format) = texture.data().borrow().prepare(features);
    assert_eq!(format, TextureFormat::Unsized(PixelFormat::L8));

    let bgr = registry.create(image(4, 4, PixelFormat::Bgr8), TextureFlags::default());
    let (prepared, format) = bgr.data().borrow().prepare(features);
    assert_eq!(prepared.format(), PixelFormat::Rgb8);
    assert_eq!(format, TextureFormat::Unsized(PixelFormat::Rgb8));
  }

  #[test]
  fn dropped_textures_are_deleted_later() {
    let mut driver = HeadlessDriver::default();
    let mut registry = TextureRegistry::new();

    let texture = registry.create(image(2, 2, PixelFormat::Rgb8), TextureFlags::default());
    let handle = upload(&mut driver, texture.data(), all_features(), |d, h| d.bind_texture(Some(h))).unwrap();
    assert_eq!(registry.len(), 1);

    drop(texture);
    assert!(!driver.calls().contains(&Call::DeleteTexture(handle)));

    assert_eq!(registry.collect(&mut driver), vec![handle]);
    assert!(driver.calls().contains(&Call::DeleteTexture(handle)));
    assert!(registry.is_empty());
  }

  #[test]
  fn release_keeps_the_source_image() {
    let mut driver = HeadlessDriver::default();
    let mut registry = TextureRegistry::new();
    let texture = registry.create(image(8, 8, PixelFormat::Rgba8), TextureFlags::default());

    upload(&mut driver, texture.data(), all_features(), |d, h| d.bind_texture(Some(h))).unwrap();
    assert!(texture.is_resident());

    let released = registry.release_all(&mut driver);
    assert_eq!(released.len(), 1);
    assert!(!texture.is_resident());

    upload(&mut driver, texture.data(), all_features(), |d, h| d.bind_texture(Some(h))).unwrap();
    assert!(texture.is_resident());
    assert_eq!(texture.size(), (8, 8));
  }

  #[test]
  fn sampler_is_cached_per_texture() {
    let mut driver = HeadlessDriver::default();
    let mut registry = TextureRegistry::new();
    let texture = registry.create(image(8, 8, PixelFormat::Rgba8), TextureFlags::default());
    let sampler = SamplerState::resolve(Wrap::Repeat, Filter::Linear, Filter::Linear, false, 16.);

    texture.data().borrow_mut().apply_sampler(&mut driver, sampler);
    texture.data().borrow_mut().apply_sampler(&mut driver, sampler);
    assert_eq!(driver.count(|c| matches!(c, Call::TextureParameters(_))), 1);
    assert_eq!(sampler.anisotropy, 1.);

    registry.invalidate_samplers();
    texture.data().borrow_mut().apply_sampler(&mut driver, sampler);
    assert_eq!(driver.count(|c| matches!(c, Call::TextureParameters(_))), 2);
  }
}
