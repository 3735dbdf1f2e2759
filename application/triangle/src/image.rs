use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub type Rgb = [u8; 3];

/// Row major pixels, the first row is the top of the image.
pub struct Image {
  pub width: u32,
  pub height: u32,
  pub pixels: Vec<Rgb>,
  pub background: Rgb,
}

impl Image {
  pub fn covered_pixel_count(&self) -> usize {
    self.pixels.iter().filter(|&&p| p != self.background).count()
  }

  /// binary portable pixmap
  pub fn write_ppm(&self, mut writer: impl Write) -> std::io::Result<()> {
    write!(writer, "P6\n{} {}\n255\n", self.width, self.height)?;
    for pixel in &self.pixels {
      writer.write_all(pixel)?;
    }
    writer.flush()
  }

  pub fn save_ppm(&self, path: &Path) -> std::io::Result<()> {
    self.write_ppm(BufWriter::new(File::create(path)?))
  }
}
