//! Seeded simplex noise in two, three, and four dimensions.

use crate::random::{RandomStream, Seed};

const F2: f32 = 0.366_025_42; // (sqrt(3) - 1) / 2
const G2: f32 = 0.211_324_87; // (3 - sqrt(3)) / 6
const F3: f32 = 1.0 / 3.0;
const G3: f32 = 1.0 / 6.0;
const F4: f32 = 0.309_017; // (sqrt(5) - 1) / 4
const G4: f32 = 0.138_196_6; // (5 - sqrt(5)) / 20

const GRAD3: [[f32; 3]; 12] = [
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

const GRAD4: [[f32; 4]; 32] = [
    [0.0, 1.0, 1.0, 1.0],
    [0.0, 1.0, 1.0, -1.0],
    [0.0, 1.0, -1.0, 1.0],
    [0.0, 1.0, -1.0, -1.0],
    [0.0, -1.0, 1.0, 1.0],
    [0.0, -1.0, 1.0, -1.0],
    [0.0, -1.0, -1.0, 1.0],
    [0.0, -1.0, -1.0, -1.0],
    [1.0, 0.0, 1.0, 1.0],
    [1.0, 0.0, 1.0, -1.0],
    [1.0, 0.0, -1.0, 1.0],
    [1.0, 0.0, -1.0, -1.0],
    [-1.0, 0.0, 1.0, 1.0],
    [-1.0, 0.0, 1.0, -1.0],
    [-1.0, 0.0, -1.0, 1.0],
    [-1.0, 0.0, -1.0, -1.0],
    [1.0, 1.0, 0.0, 1.0],
    [1.0, 1.0, 0.0, -1.0],
    [1.0, -1.0, 0.0, 1.0],
    [1.0, -1.0, 0.0, -1.0],
    [-1.0, 1.0, 0.0, 1.0],
    [-1.0, 1.0, 0.0, -1.0],
    [-1.0, -1.0, 0.0, 1.0],
    [-1.0, -1.0, 0.0, -1.0],
    [1.0, 1.0, 1.0, 0.0],
    [1.0, 1.0, -1.0, 0.0],
    [1.0, -1.0, 1.0, 0.0],
    [1.0, -1.0, -1.0, 0.0],
    [-1.0, 1.0, 1.0, 0.0],
    [-1.0, 1.0, -1.0, 0.0],
    [-1.0, -1.0, 1.0, 0.0],
    [-1.0, -1.0, -1.0, 0.0],
];

/// Coherent noise over 2, 3, or 4 coordinates with values in `[-1, 1]`.
///
/// The field holds only a permutation table derived from the seed, so every
/// lookup is a pure function of `(seed, coordinates)`.
#[derive(Clone)]
pub struct NoiseField {
    seed: Seed,
    perm: [u8; 512],
}

impl std::fmt::Debug for NoiseField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseField").field("seed", &self.seed).finish()
    }
}

impl NoiseField {
    pub fn new(seed: Seed) -> Self {
        let mut table: Vec<u8> = (0..=255).collect();
        RandomStream::new(seed).shuffle(&mut table);
        let mut perm = [0u8; 512];
        for (index, slot) in perm.iter_mut().enumerate() {
            *slot = table[index & 255];
        }
        Self { seed, perm }
    }

    pub fn seed(&self) -> Seed {
        self.seed
    }

    #[inline]
    fn p(&self, index: usize) -> usize {
        self.perm[index] as usize
    }

    pub fn noise2(&self, x: f32, y: f32) -> f32 {
        let s = (x + y) * F2;
        let i = (x + s).floor();
        let j = (y + s).floor();
        let t = (i + j) * G2;
        let x0 = x - (i - t);
        let y0 = y - (j - t);

        let (i1, j1) = if x0 > y0 { (1, 0) } else { (0, 1) };

        let x1 = x0 - i1 as f32 + G2;
        let y1 = y0 - j1 as f32 + G2;
        let x2 = x0 - 1.0 + 2.0 * G2;
        let y2 = y0 - 1.0 + 2.0 * G2;

        let ii = (i as i32 & 255) as usize;
        let jj = (j as i32 & 255) as usize;
        let gi0 = self.p(ii + self.p(jj)) % 12;
        let gi1 = self.p(ii + i1 + self.p(jj + j1)) % 12;
        let gi2 = self.p(ii + 1 + self.p(jj + 1)) % 12;

        let n0 = corner2(GRAD3[gi0], x0, y0);
        let n1 = corner2(GRAD3[gi1], x1, y1);
        let n2 = corner2(GRAD3[gi2], x2, y2);

        (70.0 * (n0 + n1 + n2)).clamp(-1.0, 1.0)
    }

    pub fn noise3(&self, x: f32, y: f32, z: f32) -> f32 {
        let s = (x + y + z) * F3;
        let i = (x + s).floor();
        let j = (y + s).floor();
        let k = (z + s).floor();
        let t = (i + j + k) * G3;
        let x0 = x - (i - t);
        let y0 = y - (j - t);
        let z0 = z - (k - t);

        let (i1, j1, k1, i2, j2, k2) = if x0 >= y0 {
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

        let x1 = x0 - i1 as f32 + G3;
        let y1 = y0 - j1 as f32 + G3;
        let z1 = z0 - k1 as f32 + G3;
        let x2 = x0 - i2 as f32 + 2.0 * G3;
        let y2 = y0 - j2 as f32 + 2.0 * G3;
        let z2 = z0 - k2 as f32 + 2.0 * G3;
        let x3 = x0 - 1.0 + 3.0 * G3;
        let y3 = y0 - 1.0 + 3.0 * G3;
        let z3 = z0 - 1.0 + 3.0 * G3;

        let ii = (i as i32 & 255) as usize;
        let jj = (j as i32 & 255) as usize;
        let kk = (k as i32 & 255) as usize;
        let gi0 = self.p(ii + self.p(jj + self.p(kk))) % 12;
        let gi1 = self.p(ii + i1 + self.p(jj + j1 + self.p(kk + k1))) % 12;
        let gi2 = self.p(ii + i2 + self.p(jj + j2 + self.p(kk + k2))) % 12;
        let gi3 = self.p(ii + 1 + self.p(jj + 1 + self.p(kk + 1))) % 12;

        let n0 = corner3(GRAD3[gi0], x0, y0, z0);
        let n1 = corner3(GRAD3[gi1], x1, y1, z1);
        let n2 = corner3(GRAD3[gi2], x2, y2, z2);
        let n3 = corner3(GRAD3[gi3], x3, y3, z3);

        (32.0 * (n0 + n1 + n2 + n3)).clamp(-1.0, 1.0)
    }

    pub fn noise4(&self, x: f32, y: f32, z: f32, w: f32) -> f32 {
        let s = (x + y + z + w) * F4;
        let i = (x + s).floor();
        let j = (y + s).floor();
        let k = (z + s).floor();
        let l = (w + s).floor();
        let t = (i + j + k + l) * G4;
        let x0 = x - (i - t);
        let y0 = y - (j - t);
        let z0 = z - (k - t);
        let w0 = w - (l - t);

        // Rank each axis to pick the simplex traversal order.
        let mut rank = [0u8; 4];
        let coords = [x0, y0, z0, w0];
        for a in 0..4 {
            for b in (a + 1)..4 {
                if coords[a] > coords[b] {
                    rank[a] += 1;
                } else {
                    rank[b] += 1;
                }
            }
        }
        let step = |threshold: u8| -> [usize; 4] {
            [
                (rank[0] >= threshold) as usize,
                (rank[1] >= threshold) as usize,
                (rank[2] >= threshold) as usize,
                (rank[3] >= threshold) as usize,
            ]
        };
        let o1 = step(3);
        let o2 = step(2);
        let o3 = step(1);

        let offset = |o: [usize; 4], scale: f32| -> [f32; 4] {
            [
                x0 - o[0] as f32 + scale * G4,
                y0 - o[1] as f32 + scale * G4,
                z0 - o[2] as f32 + scale * G4,
                w0 - o[3] as f32 + scale * G4,
            ]
        };
        let c1 = offset(o1, 1.0);
        let c2 = offset(o2, 2.0);
        let c3 = offset(o3, 3.0);
        let c4 = offset([1, 1, 1, 1], 4.0);

        let ii = (i as i32 & 255) as usize;
        let jj = (j as i32 & 255) as usize;
        let kk = (k as i32 & 255) as usize;
        let ll = (l as i32 & 255) as usize;
        let hash = |o: [usize; 4]| -> usize {
            self.p(ii + o[0] + self.p(jj + o[1] + self.p(kk + o[2] + self.p(ll + o[3])))) % 32
        };

        let n0 = corner4(GRAD4[hash([0, 0, 0, 0])], [x0, y0, z0, w0]);
        let n1 = corner4(GRAD4[hash(o1)], c1);
        let n2 = corner4(GRAD4[hash(o2)], c2);
        let n3 = corner4(GRAD4[hash(o3)], c3);
        let n4 = corner4(GRAD4[hash([1, 1, 1, 1])], c4);

        (27.0 * (n0 + n1 + n2 + n3 + n4)).clamp(-1.0, 1.0)
    }

    /// Base octave plus an eighth-scale detail octave at half amplitude.
    ///
    /// The result spans `[-1.5, 1.5]`; generators use it for vertex offsets
    /// rather than as a normalized value.
    pub fn layered2(&self, x: f32, y: f32) -> f32 {
        self.noise2(x, y) + self.noise2(x * 8.0, y * 8.0) * 0.5
    }
}

#[inline]
fn corner2(grad: [f32; 3], x: f32, y: f32) -> f32 {
    let t = 0.5 - x * x - y * y;
    if t < 0.0 {
        0.0
    } else {
        let t2 = t * t;
        t2 * t2 * (grad[0] * x + grad[1] * y)
    }
}

#[inline]
fn corner3(grad: [f32; 3], x: f32, y: f32, z: f32) -> f32 {
    let t = 0.6 - x * x - y * y - z * z;
    if t < 0.0 {
        0.0
    } else {
        let t2 = t * t;
        t2 * t2 * (grad[0] * x + grad[1] * y + grad[2] * z)
    }
}

#[inline]
fn corner4(grad: [f32; 4], c: [f32; 4]) -> f32 {
    let t = 0.6 - c[0] * c[0] - c[1] * c[1] - c[2] * c[2] - c[3] * c[3];
    if t < 0.0 {
        0.0
    } else {
        let t2 = t * t;
        t2 * t2 * (grad[0] * c[0] + grad[1] * c[1] + grad[2] * c[2] + grad[3] * c[3])
    }
}
