//! Palette helpers for generated colors.

use crate::random::RandomStream;

/// Linear RGBA color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);
    pub const TRANSPARENT: Rgba = Rgba::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn grey(lightness: f32) -> Self {
        let l = lightness.clamp(0.0, 1.0);
        Self::new(l, l, l, 1.0)
    }

    /// Builds a color from hue in degrees (any value, wrapped), saturation
    /// and lightness in `[0, 1]`.
    pub fn from_hsl(hue: f32, saturation: f32, lightness: f32) -> Self {
        let h = hue.rem_euclid(360.0) / 360.0;
        let s = saturation.clamp(0.0, 1.0);
        let l = lightness.clamp(0.0, 1.0);
        if s == 0.0 {
            return Self::grey(l);
        }
        let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        Self::new(
            hue_channel(p, q, h + 1.0 / 3.0),
            hue_channel(p, q, h),
            hue_channel(p, q, h - 1.0 / 3.0),
            1.0,
        )
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn rgb(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    /// Quantizes to 8-bit channels, rounding to nearest.
    pub fn to_rgba8(self) -> [u8; 4] {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }

    pub fn from_rgba8(px: [u8; 4]) -> Self {
        let f = |v: u8| v as f32 / 255.0;
        Self::new(f(px[0]), f(px[1]), f(px[2]), f(px[3]))
    }
}

fn hue_channel(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// Ranges a generated palette draws hue, saturation, and lightness from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub hue: (f32, f32),
    pub saturation: (f32, f32),
    pub lightness: (f32, f32),
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            hue: (0.0, 360.0),
            saturation: (0.5, 1.0),
            lightness: (0.4, 0.7),
        }
    }
}

impl Palette {
    /// A palette with no saturation; every pick is a grey.
    pub fn greys(lightness: (f32, f32)) -> Self {
        Self {
            hue: (0.0, 0.0),
            saturation: (0.0, 0.0),
            lightness,
        }
    }

    /// Draws exactly three values from the stream.
    pub fn pick(&self, rng: &mut RandomStream) -> Rgba {
        let h = rng.range(self.hue.0, self.hue.1);
        let s = rng.range(self.saturation.0, self.saturation.1);
        let l = rng.range(self.lightness.0, self.lightness.1);
        Rgba::from_hsl(h, s, l)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::Seed;

    fn close(a: Rgba, b: Rgba) -> bool {
        a.to_array()
            .iter()
            .zip(b.to_array())
            .all(|(x, y)| (x - y).abs() < 1e-4)
    }

    #[test]
    fn primary_hues_convert() {
        assert!(close(Rgba::from_hsl(0.0, 1.0, 0.5), Rgba::new(1.0, 0.0, 0.0, 1.0)));
        assert!(close(Rgba::from_hsl(120.0, 1.0, 0.5), Rgba::new(0.0, 1.0, 0.0, 1.0)));
        assert!(close(Rgba::from_hsl(240.0, 1.0, 0.5), Rgba::new(0.0, 0.0, 1.0, 1.0)));
        assert!(close(Rgba::from_hsl(-120.0, 1.0, 0.5), Rgba::from_hsl(240.0, 1.0, 0.5)));
    }

    #[test]
    fn zero_saturation_is_grey() {
        assert!(close(Rgba::from_hsl(200.0, 0.0, 0.3), Rgba::grey(0.3)));
    }

    #[test]
    fn palette_picks_are_seeded() {
        let palette = Palette::default();
        let mut a = RandomStream::new(Seed(4));
        let mut b = RandomStream::new(Seed(4));
        for _ in 0..16 {
            assert_eq!(palette.pick(&mut a), palette.pick(&mut b));
        }
    }

    #[test]
    fn rgba8_quantization_round_trips_exact_bytes() {
        let px = [12, 200, 0, 255];
        assert_eq!(Rgba::from_rgba8(px).to_rgba8(), px);
    }
}
