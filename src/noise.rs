//! Deterministic 3D simplex noise.
//!
//! CPU counterpart of the gradient noise used by the pattern shaders. The
//! generator owns a 512-entry permutation table (0-255 shuffled, then
//! duplicated) that is built once and never touched again, so a
//! [`SimplexNoise`] can be shared freely between threads.
//!
//! The table is shuffled from a fixed seed. Every generator built with
//! [`SimplexNoise::new`] is therefore identical and produces bit-identical
//! output for identical coordinates.
//!
//! # Example
//!
//! ```
//! use patternkit::noise::SimplexNoise;
//!
//! let noise = SimplexNoise::new();
//! let v = noise.noise3(0.5, 1.25, -3.0);
//! assert!((-1.0..=1.0).contains(&v));
//!
//! // Layered detail
//! let f = noise.fbm3(0.5, 1.25, -3.0, 4);
//! assert!((-1.0..=1.0).contains(&f));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Seed used by [`SimplexNoise::new`].
pub const DEFAULT_SEED: u64 = 0x5EED_CAFE_F00D_0042;

// Skew / unskew factors for three dimensions.
/// Octave limit for [`SimplexNoise::fbm3`]. Further layers would add less
/// than 2^-16 of the signal.
pub const MAX_OCTAVES: u32 = 16;

const F3: f64 = 1.0 / 3.0;
const G3: f64 = 1.0 / 6.0;

/// Edge midpoints of a cube, the classic 12 simplex gradients.
const GRAD3: [[f64; 3]; 12] = [
    [1.0, 1.0, 0.0],
    [-1.0, 1.0, 0.0],
    [1.0, -1.0, 0.0],
    [-1.0, -1.0, 0.0],
    [1.0, 0.0, 1.0],
    [-1.0, 0.0, 1.0],
    [1.0, 0.0, -1.0],
    [-1.0, 0.0, -1.0],
    [0.0, 1.0, 1.0],
    [0.0, -1.0, 1.0],
    [0.0, 1.0, -1.0],
    [0.0, -1.0, -1.0],
];

/// 3D simplex noise generator with an immutable permutation table.
#[derive(Clone)]
pub struct SimplexNoise {
    seed: u64,
    perm: [u8; 512],
}

impl SimplexNoise {
    /// Create a generator using [`DEFAULT_SEED`].
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    /// Create a generator whose permutation table is shuffled from `seed`.
    ///
    /// Same seed, same table. Different seeds give unrelated fields.
    pub fn with_seed(seed: u64) -> Self {
        let mut table: Vec<u8> = (0..=255).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        table.shuffle(&mut rng);

        let mut perm = [0u8; 512];
        for (i, slot) in perm.iter_mut().enumerate() {
            *slot = table[i & 255];
        }
        Self { seed, perm }
    }

    /// Seed the permutation table was built from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Sample the noise field at `(x, y, z)`.
    ///
    /// Returns a value in `[-1, 1]` for every finite input. Non-finite
    /// coordinates have no lattice cell and sample as `0.0`, as do finite
    /// inputs so large that skewing overflows.
    pub fn noise3(&self, x: f64, y: f64, z: f64) -> f64 {
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return 0.0;
        }

        // Skew input space to find the containing simplex cell.
        let s = (x + y + z) * F3;
        let i = (x + s).floor();
        let j = (y + s).floor();
        let k = (z + s).floor();

        // Unskew the cell origin back to (x, y, z) space.
        let t = (i + j + k) * G3;
        let x0 = x - (i - t);
        let y0 = y - (j - t);
        let z0 = z - (k - t);

        // Which of the six tetrahedra are we in?
        let (i1, j1, k1, i2, j2, k2): (usize, usize, usize, usize, usize, usize) = if x0 >= y0 {
            if y0 >= z0 {
                (1, 0, 0, 1, 1, 0)
            } else if x0 >= z0 {
                (1, 0, 0, 1, 0, 1)
            } else {
                (0, 0, 1, 1, 0, 1)
            }
        } else if y0 < z0 {
            (0, 0, 1, 0, 1, 1)
        } else if x0 < z0 {
            (0, 1, 0, 0, 1, 1)
        } else {
            (0, 1, 0, 1, 1, 0)
        };

        let x1 = x0 - i1 as f64 + G3;
        let y1 = y0 - j1 as f64 + G3;
        let z1 = z0 - k1 as f64 + G3;
        let x2 = x0 - i2 as f64 + 2.0 * G3;
        let y2 = y0 - j2 as f64 + 2.0 * G3;
        let z2 = z0 - k2 as f64 + 2.0 * G3;
        let x3 = x0 - 1.0 + 3.0 * G3;
        let y3 = y0 - 1.0 + 3.0 * G3;
        let z3 = z0 - 1.0 + 3.0 * G3;

        // `as i64` saturates for huge inputs, masking keeps us in the table.
        let ii = (i as i64 & 255) as usize;
        let jj = (j as i64 & 255) as usize;
        let kk = (k as i64 & 255) as usize;

        let gi0 = self.gradient_index(ii, jj, kk);
        let gi1 = self.gradient_index(ii + i1, jj + j1, kk + k1);
        let gi2 = self.gradient_index(ii + i2, jj + j2, kk + k2);
        let gi3 = self.gradient_index(ii + 1, jj + 1, kk + 1);

        let n = corner(gi0, x0, y0, z0)
            + corner(gi1, x1, y1, z1)
            + corner(gi2, x2, y2, z2)
            + corner(gi3, x3, y3, z3);

        // Inputs near f64::MAX overflow while skewing.
        if n.is_nan() {
            return 0.0;
        }
        (32.0 * n).clamp(-1.0, 1.0)
    }

    /// Fractal Brownian motion: `octaves` layers of [`noise3`](Self::noise3),
    /// each at double the frequency and half the amplitude of the last.
    ///
    /// The sum is normalised by the total amplitude so the result stays in
    /// `[-1, 1]`. Octaves are clamped to `1..=`[`MAX_OCTAVES`].
    pub fn fbm3(&self, x: f64, y: f64, z: f64, octaves: u32) -> f64 {
        let mut sum = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        let mut total = 0.0;

        for _ in 0..octaves.clamp(1, MAX_OCTAVES) {
            sum += amplitude * self.noise3(x * frequency, y * frequency, z * frequency);
            total += amplitude;
            amplitude *= 0.5;
            frequency *= 2.0;
        }

        (sum / total).clamp(-1.0, 1.0)
    }

    #[inline]
    fn gradient_index(&self, i: usize, j: usize, k: usize) -> usize {
        let p = &self.perm;
        p[i + p[j + p[k] as usize] as usize] as usize % 12
    }
}

impl Default for SimplexNoise {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SimplexNoise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimplexNoise")
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

/// Contribution of one simplex corner: `(0.6 - r²)⁴ * (g · d)`.
#[inline]
fn corner(gi: usize, x: f64, y: f64, z: f64) -> f64 {
    let t = 0.6 - x * x - y * y - z * z;
    if t < 0.0 {
        return 0.0;
    }
    let g = GRAD3[gi];
    let t2 = t * t;
    t2 * t2 * (g[0] * x + g[1] * y + g[2] * z)
}

/// String-keyed cache of shared noise generators.
///
/// Owned by whatever builds patterns; nothing here is global. Each key maps
/// to a generator seeded from a stable hash of the key, so the same key
/// always yields the same field, even after [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct NoiseCache {
    generators: HashMap<String, Arc<SimplexNoise>>,
}

impl NoiseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the generator for `key`, building it on first use.
    pub fn generator(&mut self, key: &str) -> Arc<SimplexNoise> {
        if let Some(existing) = self.generators.get(key) {
            return Arc::clone(existing);
        }
        log::debug!("noise cache miss for {:?}", key);
        let generator = Arc::new(SimplexNoise::with_seed(seed_for_key(key)));
        self.generators
            .insert(key.to_string(), Arc::clone(&generator));
        generator
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Drop every cached generator.
    pub fn clear(&mut self) {
        self.generators.clear();
    }
}

/// FNV-1a over the key bytes.
fn seed_for_key(key: &str) -> u64 {
    key.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}
