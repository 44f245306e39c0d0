//! CPU-side images.
//!
//! Images are the source of texture uploads and the destination of framebuffer snapshots. Rows are
//! stored top-down and tightly packed (the driver is set up with a pixel alignment of 1).

/// Pixel format of an [`Image`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PixelFormat {
  /// Single channel, used as luminance.
  L8,
  /// Single channel, used as alpha.
  A8,
  /// Luminance + alpha.
  La8,
  Rgb8,
  Bgr8,
  Rgba8,
  Bgra8,
}

impl PixelFormat {
  /// Size of a pixel, in bytes.
  pub fn size(self) -> usize {
    match self {
      PixelFormat::L8 | PixelFormat::A8 => 1,
      PixelFormat::La8 => 2,
      PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
      PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
    }
  }

  pub fn has_alpha(self) -> bool {
    matches!(
      self,
      PixelFormat::A8 | PixelFormat::La8 | PixelFormat::Rgba8 | PixelFormat::Bgra8
    )
  }

  /// Same channel order, with an alpha channel.
  pub fn with_alpha(self) -> Self {
    match self {
      PixelFormat::L8 => PixelFormat::La8,
      PixelFormat::Rgb8 => PixelFormat::Rgba8,
      PixelFormat::Bgr8 => PixelFormat::Bgra8,
      format => format,
    }
  }

  /// Swap BGR orders into RGB orders.
  pub fn to_rgb_order(self) -> Self {
    match self {
      PixelFormat::Bgr8 => PixelFormat::Rgb8,
      PixelFormat::Bgra8 => PixelFormat::Rgba8,
      format => format,
    }
  }

  fn is_bgr(self) -> bool {
    matches!(self, PixelFormat::Bgr8 | PixelFormat::Bgra8)
  }
}

/// A 2D image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Image {
  width: usize,
  height: usize,
  format: PixelFormat,
  data: Vec<u8>,
}

impl Image {
  /// Create a zero-filled image.
  pub fn new(width: usize, height: usize, format: PixelFormat) -> Self {
    Image {
      width,
      height,
      format,
      data: vec![0; width * height * format.size()],
    }
  }

  /// Wrap existing pixel data; `None` if the length does not match.
  pub fn from_data(width: usize, height: usize, format: PixelFormat, data: Vec<u8>) -> Option<Self> {
    if data.len() != width * height * format.size() {
      return None;
    }

    Some(Image {
      width,
      height,
      format,
      data,
    })
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn format(&self) -> PixelFormat {
    self.format
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }

  pub fn data_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }

  fn row_len(&self) -> usize {
    self.width * self.format.size()
  }

  /// Pixel bytes at `(x, y)`.
  pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
    let size = self.format.size();
    let start = y * self.row_len() + x * size;
    &self.data[start..start + size]
  }

  /// Mirror the image vertically.
  pub fn flip_y(&mut self) {
    let row_len = self.row_len();

    for y in 0..self.height / 2 {
      let (top, bottom) = self.data.split_at_mut((self.height - 1 - y) * row_len);
      top[y * row_len..(y + 1) * row_len].swap_with_slice(&mut bottom[..row_len]);
    }
  }

  /// Nearest-neighbour resize.
  pub fn resized(&self, width: usize, height: usize) -> Image {
    let mut out = Image::new(width, height, self.format);
    let size = self.format.size();

    if self.width == 0 || self.height == 0 {
      return out;
    }

    for y in 0..height {
      let sy = y * self.height / height.max(1);
      for x in 0..width {
        let sx = x * self.width / width.max(1);
        let dst = (y * width + x) * size;
        out.data[dst..dst + size].copy_from_slice(self.pixel(sx, sy));
      }
    }

    out
  }

  /// Copy into a (larger) image, leaving the remaining area zeroed.
  pub fn padded(&self, width: usize, height: usize) -> Image {
    let mut out = Image::new(width.max(self.width), height.max(self.height), self.format);
    let row_len = self.row_len();
    let out_row_len = out.row_len();

    for y in 0..self.height {
      out.data[y * out_row_len..y * out_row_len + row_len]
        .copy_from_slice(&self.data[y * row_len..(y + 1) * row_len]);
    }

    out
  }

  /// Same image with RGB channel order.
  pub fn to_rgb_order(&self) -> Image {
    if !self.format.is_bgr() {
      return self.clone();
    }

    let mut out = self.clone();
    let size = self.format.size();
    for pixel in out.data.chunks_exact_mut(size) {
      pixel.swap(0, 2);
    }
    out.format = self.format.to_rgb_order();

    out
  }

  /// Make every pixel matching `key` (RGB) fully transparent, adding an alpha channel if needed.
  pub fn apply_color_key(&self, key: [u8; 3]) -> Image {
    let format = self.format.with_alpha();

    match format {
      PixelFormat::Rgba8 | PixelFormat::Bgra8 => (),
      // no colour channels to match
      _ => return self.clone(),
    }

    let key = if format.is_bgr() {
      [key[2], key[1], key[0]]
    } else {
      key
    };

    let size = self.format.size();
    let mut data = Vec::with_capacity(self.width * self.height * 4);

    for pixel in self.data.chunks_exact(size) {
      let alpha = if size == 4 { pixel[3] } else { 255 };
      let alpha = if pixel[..3] == key { 0 } else { alpha };
      data.extend_from_slice(&[pixel[0], pixel[1], pixel[2], alpha]);
    }

    Image {
      width: self.width,
      height: self.height,
      format,
      data,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn gradient(width: usize, height: usize) -> Image {
    let data = (0..width * height).map(|i| i as u8).collect();
    Image::from_data(width, height, PixelFormat::L8, data).unwrap()
  }

  #[test]
  fn flip_rows() {
    let mut image = gradient(2, 3);
    image.flip_y();
    assert_eq!(image.data(), &[4, 5, 2, 3, 0, 1]);
  }

  #[test]
  fn nearest_resize() {
    let image = gradient(4, 4);
    let half = image.resized(2, 2);
    assert_eq!(half.data(), &[0, 2, 8, 10]);
  }

  #[test]
  fn padding_keeps_content_top_left() {
    let image = gradient(3, 1);
    let padded = image.padded(4, 2);
    assert_eq!(padded.data(), &[0, 1, 2, 0, 0, 0, 0, 0]);
  }

  #[test]
  fn color_key_adds_alpha() {
    let data = vec![0, 0, 0, 10, 20, 30];
    let image = Image::from_data(2, 1, PixelFormat::Bgr8, data).unwrap();
    let keyed = image.apply_color_key([0, 0, 0]);

    assert_eq!(keyed.format(), PixelFormat::Bgra8);
    assert_eq!(keyed.data(), &[0, 0, 0, 0, 10, 20, 30, 255]);
  }

  #[test]
  fn wrong_data_length() {
    assert!(Image::from_data(2, 2, PixelFormat::Rgb8, vec![0; 11]).is_none());
  }
}
