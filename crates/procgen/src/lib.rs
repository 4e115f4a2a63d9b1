//! Deterministic procedural generation and frame driving for generative
//! sketches.
//!
//! A sketch run starts from a [`Seed`]. The seed feeds a [`RandomStream`] and
//! a [`NoiseField`], which generators use once at setup to build
//! [`Element`]s. Every frame the [`ReadySketch`] turns a [`Playhead`] (and,
//! optionally, an audio snapshot) into fresh [`FrameParams`] and runs the
//! sketch's passes in the order computed by its [`PassGraph`], against any
//! [`RenderBackend`].

pub mod audio;
pub mod camera;
pub mod color;
pub mod element;
pub mod error;
pub mod flock;
pub mod generator;
pub mod geometry;
pub mod graph;
pub mod math;
pub mod noise;
pub mod playhead;
pub mod program;
pub mod random;
pub mod runner;
pub mod software;
pub mod target;

pub use audio::{
    AudioFeatures, AudioFrame, AudioInput, AudioProcessor, DecibelRange, FeatureSource,
    PendingSource, StaticSource,
};
pub use camera::Camera;
pub use color::{Palette, Rgba};
pub use element::{Element, FrameParams};
pub use error::{FrameError, SetupError};
pub use flock::{Boid, Flock, FlockRules};
pub use generator::{generate, GeneratorConfig, Layout};
pub use geometry::{GeometryId, Mesh, Primitive};
pub use graph::{Load, Pass, PassGraph, PassGraphBuilder, PassId};
pub use noise::NoiseField;
pub use playhead::{BoxedClock, Clock, FixedClock, FrameTime, LoopClock, Playhead, SteppedClock};
pub use program::{
    AttributeKind, Attributes, Program, ProgramId, ProgramSpec, UniformKind, UniformValue,
    Uniforms,
};
pub use random::{RandomStream, Seed};
pub use runner::{
    Frame, ParamValue, ReadySketch, RunnerSettings, SetupContext, Sketch, SketchParams,
    SketchRunner,
};
pub use software::{DrawRecord, SoftwareBackend};
pub use target::{
    use_target, BackendKind, BlendMode, Destination, DrawCall, PixelBuffer, PixelFormat,
    RenderBackend, Shape, TargetDescriptor, TargetId, TargetScope,
};
