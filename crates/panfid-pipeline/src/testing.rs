//! Synthetic scenes for tests.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::source::{PixelType, Raster};
use crate::types::Point;

pub const BACKGROUND: f64 = 5.0;
pub const PEAK: f64 = 200.0;

/// Subsamples per axis for edge pixels.
const SUPERSAMPLE: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct Disk {
    pub center: Point,
    pub radius: f64,
}

impl Disk {
    pub const fn new(x: f64, y: f64, radius: f64) -> Self {
        Self {
            center: Point::new(x, y),
            radius,
        }
    }

    /// Fraction of pixel `(s, l)` covered by the disk.
    #[allow(clippy::cast_precision_loss)]
    fn coverage(&self, s: usize, l: usize) -> f64 {
        let (px, py) = (s as f64, l as f64);
        let d = Point::new(px, py).distance(self.center);
        if d > self.radius + 1.0 {
            return 0.0;
        }
        if d < self.radius - 1.0 {
            return 1.0;
        }
        let step = 1.0 / SUPERSAMPLE as f64;
        let r2 = self.radius * self.radius;
        let mut inside = 0usize;
        for j in 0..SUPERSAMPLE {
            for i in 0..SUPERSAMPLE {
                let x = px - 0.5 + (i as f64 + 0.5) * step;
                let y = py - 0.5 + (j as f64 + 0.5) * step;
                if Point::new(x, y).distance_squared(self.center) <= r2 {
                    inside += 1;
                }
            }
        }
        inside as f64 / (SUPERSAMPLE * SUPERSAMPLE) as f64
    }
}

/// 8-bit scene of anti-aliased bright disks on a dark background.
pub fn render_disks(samples: usize, lines: usize, disks: &[Disk]) -> Raster {
    Raster::from_fn(samples, lines, PixelType::U8, |s, l| {
        let covered = disks
            .iter()
            .map(|d| d.coverage(s, l))
            .fold(0.0f64, f64::max);
        (PEAK - BACKGROUND).mul_add(covered, BACKGROUND)
    })
}

/// Overwrite a `size x size` square centred on `center` with uniform
/// noise in `[0, 10)`, below the 8-bit bright-target floor.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn noise_patch(image: &mut Raster, center: Point, size: usize, seed: u64) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let half = size as f64 / 2.0;
    let s0 = (center.x - half).round().max(1.0) as usize;
    let l0 = (center.y - half).round().max(1.0) as usize;
    for l in l0..l0 + size {
        for s in s0..s0 + size {
            image.put(s, l, rng.random_range(0.0..10.0));
        }
    }
}
