//! One-shot procedural generation of element collections.

use crate::color::Palette;
use crate::element::Element;
use crate::math::{remap, TAU};
use crate::noise::NoiseField;
use crate::random::RandomStream;

/// How element positions are laid out before jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Layout {
    /// Along X from `-spread` to `spread`.
    Line,
    /// Rows of `columns` elements filling `[-spread, spread]` on X and Y.
    Grid { columns: usize },
    /// Evenly around a circle of radius `spread`.
    Ring,
    /// Uniformly inside the `[-spread, spread]` cube.
    Scatter,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorConfig {
    pub layout: Layout,
    /// Half-width of the range normalized indices map into.
    pub spread: f32,
    /// Per-axis random displacement, scaled by this amount.
    pub jitter: f32,
    /// Frequency at which the noise field is sampled.
    pub noise_scale: f32,
    pub palette: Palette,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            layout: Layout::Line,
            spread: 2.0,
            jitter: 0.0,
            noise_scale: 1.0,
            palette: Palette::default(),
        }
    }
}

/// Builds `count` elements.
///
/// Per element, draws in a fixed order: the random triple, three palette
/// values, scatter coordinates when the layout needs them, then jitter when
/// it is non-zero. The noise field is sampled at the element's final
/// position. `count == 0` yields an empty collection.
pub fn generate(
    rng: &mut RandomStream,
    noise: &NoiseField,
    count: usize,
    config: &GeneratorConfig,
) -> Vec<Element> {
    let spread = config.spread;
    let rows = match config.layout {
        Layout::Grid { columns } => count.div_ceil(columns.max(1)),
        _ => 1,
    };

    (0..count)
        .map(|index| {
            let t = index as f32 / count as f32;
            let random = rng.triple();
            let color = config.palette.pick(rng);

            let mut position = match config.layout {
                Layout::Line => [remap(t, 0.0, 1.0, -spread, spread), 0.0, 0.0],
                Layout::Grid { columns } => {
                    let columns = columns.max(1);
                    let col = (index % columns) as f32 / columns as f32;
                    let row = (index / columns) as f32 / rows as f32;
                    [
                        remap(col, 0.0, 1.0, -spread, spread),
                        remap(row, 0.0, 1.0, -spread, spread),
                        0.0,
                    ]
                }
                Layout::Ring => {
                    let angle = t * TAU;
                    [angle.cos() * spread, angle.sin() * spread, 0.0]
                }
                Layout::Scatter => [
                    rng.range(-spread, spread),
                    rng.range(-spread, spread),
                    rng.range(-spread, spread),
                ],
            };

            if config.jitter != 0.0 {
                for axis in position.iter_mut() {
                    *axis += (rng.next() - 0.5) * config.jitter;
                }
            }

            let offset = noise.noise3(
                position[0] * config.noise_scale,
                position[1] * config.noise_scale,
                position[2] * config.noise_scale,
            );

            Element {
                index,
                t,
                position,
                color,
                random,
                offset,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::Seed;

    fn run(seed: u64, count: usize, config: &GeneratorConfig) -> Vec<Element> {
        let mut rng = RandomStream::new(Seed(seed));
        let noise = NoiseField::new(Seed(seed));
        generate(&mut rng, &noise, count, config)
    }

    #[test]
    fn zero_count_is_empty() {
        assert!(run(1, 0, &GeneratorConfig::default()).is_empty());
    }

    #[test]
    fn generation_is_seeded() {
        let config = GeneratorConfig {
            layout: Layout::Scatter,
            jitter: 0.3,
            ..GeneratorConfig::default()
        };
        assert_eq!(run(42, 64, &config), run(42, 64, &config));
        assert_ne!(run(42, 64, &config), run(43, 64, &config));
    }

    #[test]
    fn line_layout_maps_index_into_spread() {
        let elements = run(7, 4, &GeneratorConfig::default());
        let xs: Vec<f32> = elements.iter().map(|e| e.position[0]).collect();
        assert_eq!(xs, vec![-2.0, -1.0, 0.0, 1.0]);
        assert!(elements.iter().all(|e| (-1.0..=1.0).contains(&e.offset)));
    }

    #[test]
    fn grid_layout_fills_rows() {
        let config = GeneratorConfig {
            layout: Layout::Grid { columns: 3 },
            spread: 1.0,
            ..GeneratorConfig::default()
        };
        let elements = run(2, 6, &config);
        assert_eq!(elements[4].position[1], 0.0);
        assert_eq!(elements[0].position[1], -1.0);
        assert!((elements[4].position[0] + 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn random_triples_stay_in_unit_interval() {
        for element in run(9, 100, &GeneratorConfig::default()) {
            assert!(element.random.iter().all(|v| (0.0..1.0).contains(v)));
            assert!((0.0..1.0).contains(&element.t));
        }
    }
}
