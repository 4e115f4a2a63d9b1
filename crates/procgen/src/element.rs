//! Generated elements and the per-frame parameters derived from them.

use crate::color::Rgba;
use crate::math::TAU;
use crate::playhead::FrameTime;
use crate::program::Uniforms;

/// Static attributes fixed at generation time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Element {
    pub index: usize,
    /// `index / count`, in `[0, 1)`.
    pub t: f32,
    pub position: [f32; 3],
    pub color: Rgba,
    /// Per-element random triple, each in `[0, 1)`.
    pub random: [f32; 3],
    /// Noise sampled at the element's position, in `[-1, 1]`.
    pub offset: f32,
}

/// Everything a draw needs for one element in one frame.
///
/// Built fresh every frame from the element and the frame time; nothing is
/// carried over, so values never drift.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameParams {
    pub index: usize,
    pub position: [f32; 3],
    pub color: Rgba,
    pub random: [f32; 3],
    pub offset: f32,
    pub playhead: f32,
    /// `sin` of the loop phase shifted by the element's first random value.
    pub wave: f32,
    pub audio: f32,
}

impl FrameParams {
    pub fn new(element: &Element, time: &FrameTime, audio: f32) -> Self {
        let playhead = time.playhead.value();
        Self {
            index: element.index,
            position: element.position,
            color: element.color,
            random: element.random,
            offset: element.offset,
            playhead,
            wave: ((playhead + element.random[0]) * TAU).sin(),
            audio,
        }
    }

    /// Uniform bag using the conventional names the built-in programs read.
    pub fn uniforms(&self) -> Uniforms {
        Uniforms::new()
            .with("u_time", self.playhead)
            .with("u_wave", self.wave)
            .with("u_audio", self.audio)
            .with("u_offset", self.offset)
            .with("u_position", self.position)
            .with("u_color", self.color)
            .with("u_random", self.random)
    }
}
