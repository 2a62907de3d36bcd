//! Image providers the locator reads from.
//!
//! The locator never owns pixel storage. It borrows an [`ImageSource`]
//! for the duration of a sweep and reads single pixels through it, so a
//! caller can back the trait with a decoded raster, a memory map, or a
//! tiled reader.
//!
//! Coordinates are 1-based: `read(1, 1, 1)` is the top-left pixel of the
//! first band.

use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use serde::{Deserialize, Serialize};

use crate::types::Dimensions;

/// Storage type of the scanned pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelType {
    /// 8-bit unsigned.
    U8,
    /// 16-bit unsigned.
    U16,
    /// 32-bit float.
    F32,
}

impl PixelType {
    /// Lowest DN that still counts as a bright fiducial target.
    ///
    /// Used when the configuration does not override the centroid's
    /// DN floor.
    #[must_use]
    pub const fn bright_target_floor(self) -> f64 {
        match self {
            Self::U8 => 12.0,
            Self::U16 => 3500.0,
            Self::F32 => f64::NEG_INFINITY,
        }
    }
}

/// Read access to a 2-D, possibly multi-band image.
pub trait ImageSource {
    /// Image width.
    fn samples(&self) -> usize;

    /// Image height.
    fn lines(&self) -> usize;

    /// Number of bands.
    fn bands(&self) -> usize {
        1
    }

    /// Pixel storage type.
    fn pixel_type(&self) -> PixelType;

    /// Read one pixel at 1-based `(sample, line, band)`.
    ///
    /// Returns `None` outside the image or band range.
    fn read(&self, sample: i64, line: i64, band: usize) -> Option<f64>;

    /// Image dimensions.
    fn dimensions(&self) -> Dimensions {
        Dimensions {
            samples: self.samples(),
            lines: self.lines(),
        }
    }
}

/// Convert 1-based coordinates into 0-based `u32` indices when inside
/// `samples x lines`.
fn zero_based(sample: i64, line: i64, samples: usize, lines: usize) -> Option<(u32, u32)> {
    let x = usize::try_from(sample.checked_sub(1)?).ok()?;
    let y = usize::try_from(line.checked_sub(1)?).ok()?;
    if x >= samples || y >= lines {
        return None;
    }
    Some((u32::try_from(x).ok()?, u32::try_from(y).ok()?))
}

impl ImageSource for GrayImage {
    fn samples(&self) -> usize {
        self.width() as usize
    }

    fn lines(&self) -> usize {
        self.height() as usize
    }

    fn pixel_type(&self) -> PixelType {
        PixelType::U8
    }

    fn read(&self, sample: i64, line: i64, band: usize) -> Option<f64> {
        if band != 1 {
            return None;
        }
        let (x, y) = zero_based(sample, line, self.samples(), self.lines())?;
        Some(f64::from(self.get_pixel(x, y).0[0]))
    }
}

impl ImageSource for ImageBuffer<Luma<u16>, Vec<u16>> {
    fn samples(&self) -> usize {
        self.width() as usize
    }

    fn lines(&self) -> usize {
        self.height() as usize
    }

    fn pixel_type(&self) -> PixelType {
        PixelType::U16
    }

    fn read(&self, sample: i64, line: i64, band: usize) -> Option<f64> {
        if band != 1 {
            return None;
        }
        let (x, y) = zero_based(sample, line, self.samples(), self.lines())?;
        Some(f64::from(self.get_pixel(x, y).0[0]))
    }
}

/// An owned single-band raster of `f64` values.
///
/// Non-finite values read back as no-data.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    samples: usize,
    lines: usize,
    pixel_type: PixelType,
    data: Vec<f64>,
}

impl Raster {
    /// Wrap a row-major buffer. Returns `None` when the buffer length
    /// does not match `samples * lines`.
    #[must_use]
    pub fn new(samples: usize, lines: usize, pixel_type: PixelType, data: Vec<f64>) -> Option<Self> {
        (data.len() == samples.checked_mul(lines)?).then_some(Self {
            samples,
            lines,
            pixel_type,
            data,
        })
    }

    /// Build a raster by evaluating `f(sample, line)` at every 1-based
    /// pixel coordinate.
    #[must_use]
    pub fn from_fn(
        samples: usize,
        lines: usize,
        pixel_type: PixelType,
        mut f: impl FnMut(usize, usize) -> f64,
    ) -> Self {
        let mut data = Vec::with_capacity(samples * lines);
        for line in 1..=lines {
            for sample in 1..=samples {
                data.push(f(sample, line));
            }
        }
        Self {
            samples,
            lines,
            pixel_type,
            data,
        }
    }

    /// Convert a decoded image to a single-band raster.
    ///
    /// Colour images are reduced to luma. The pixel type follows the
    /// channel depth so the bright-target floor matches the source.
    #[must_use]
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        let samples = image.width() as usize;
        let lines = image.height() as usize;
        let (pixel_type, data): (PixelType, Vec<f64>) = match image {
            DynamicImage::ImageLuma8(gray) => {
                (PixelType::U8, gray.as_raw().iter().map(|&v| f64::from(v)).collect())
            }
            DynamicImage::ImageLuma16(gray) => {
                (PixelType::U16, gray.as_raw().iter().map(|&v| f64::from(v)).collect())
            }
            DynamicImage::ImageLumaA16(_)
            | DynamicImage::ImageRgb16(_)
            | DynamicImage::ImageRgba16(_) => (
                PixelType::U16,
                image
                    .to_luma16()
                    .as_raw()
                    .iter()
                    .map(|&v| f64::from(v))
                    .collect(),
            ),
            DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => (
                PixelType::F32,
                image
                    .to_luma32f()
                    .as_raw()
                    .iter()
                    .map(|&v| f64::from(v))
                    .collect(),
            ),
            _ => (
                PixelType::U8,
                image
                    .to_luma8()
                    .as_raw()
                    .iter()
                    .map(|&v| f64::from(v))
                    .collect(),
            ),
        };
        Self {
            samples,
            lines,
            pixel_type,
            data,
        }
    }

    /// Overwrite one pixel at 1-based coordinates. Out-of-range writes
    /// are ignored.
    pub fn put(&mut self, sample: usize, line: usize, value: f64) {
        if (1..=self.samples).contains(&sample) && (1..=self.lines).contains(&line) {
            self.data[(line - 1) * self.samples + (sample - 1)] = value;
        }
    }

    /// Row-major pixel values.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

impl ImageSource for Raster {
    fn samples(&self) -> usize {
        self.samples
    }

    fn lines(&self) -> usize {
        self.lines
    }

    fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    fn read(&self, sample: i64, line: i64, band: usize) -> Option<f64> {
        if band != 1 {
            return None;
        }
        let (x, y) = zero_based(sample, line, self.samples, self.lines)?;
        let v = self.data[y as usize * self.samples + x as usize];
        v.is_finite().then_some(v)
    }
}
