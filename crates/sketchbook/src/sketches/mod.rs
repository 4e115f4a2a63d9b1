//! Built-in sketches and the catalog the CLI resolves names against.

mod echo;
mod flock;
mod panes;
mod tubes;

use std::fmt;
use std::time::Duration;

use procgen::Sketch;
use serde::Serialize;
use sketchconfig::{BackendChoice, SketchConfig};

pub struct SketchEntry {
    pub name: &'static str,
    pub description: &'static str,
    width: u32,
    height: u32,
    duration: Duration,
    build: fn() -> Box<dyn Sketch>,
}

pub const CATALOG: &[SketchEntry] = &[
    SketchEntry {
        name: "flock",
        description: "boids released from a ring, drawn as grey discs",
        width: 1024,
        height: 1024,
        duration: Duration::from_secs(8),
        build: build_flock,
    },
    SketchEntry {
        name: "echo",
        description: "orbiting dots smeared through a feedback buffer",
        width: 1024,
        height: 1024,
        duration: Duration::from_secs(4),
        build: build_echo,
    },
    SketchEntry {
        name: "tubes",
        description: "randomly scattered cylinders spinning in place",
        width: 1024,
        height: 1024,
        duration: Duration::from_secs(8),
        build: build_tubes,
    },
    SketchEntry {
        name: "panes",
        description: "noise web rendered at two resolutions and cross-faded, lit by the spectrum",
        width: 1024,
        height: 1024,
        duration: Duration::from_millis(8770),
        build: build_panes,
    },
];

fn build_flock() -> Box<dyn Sketch> {
    Box::new(flock::FlockSketch::default())
}

fn build_echo() -> Box<dyn Sketch> {
    Box::new(echo::EchoSketch::default())
}

fn build_tubes() -> Box<dyn Sketch> {
    Box::new(tubes::TubesSketch::default())
}

fn build_panes() -> Box<dyn Sketch> {
    Box::new(panes::PanesSketch::default())
}

pub fn find(name: &str) -> Option<&'static SketchEntry> {
    let wanted = name.trim();
    CATALOG
        .iter()
        .find(|entry| entry.name.eq_ignore_ascii_case(wanted))
}

pub fn names() -> Vec<&'static str> {
    CATALOG.iter().map(|entry| entry.name).collect()
}

impl SketchEntry {
    pub fn build(&self) -> Box<dyn Sketch> {
        (self.build)()
    }

    pub fn requires_gpu(&self) -> bool {
        self.build().requires_gpu()
    }

    /// The bottom configuration layer; files and flags override it.
    pub fn defaults(&self) -> SketchConfig {
        let mut config = SketchConfig {
            sketch: Some(self.name.to_string()),
            duration: Some(self.duration),
            ..SketchConfig::default()
        };
        config.surface.width = Some(self.width);
        config.surface.height = Some(self.height);
        config.surface.backend = Some(if self.requires_gpu() {
            BackendChoice::Gpu
        } else {
            BackendChoice::Software
        });
        config.surface.antialias = Some(true);
        config
    }

    pub fn summary(&self) -> SketchSummary {
        SketchSummary {
            name: self.name,
            description: self.description,
            backend: if self.requires_gpu() { "gpu" } else { "2d" },
            width: self.width,
            height: self.height,
            duration_secs: self.duration.as_secs_f64(),
        }
    }
}

impl fmt::Debug for SketchEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SketchEntry")
            .field("name", &self.name)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

/// One row of `sketchbook list`.
#[derive(Debug, Clone, Serialize)]
pub struct SketchSummary {
    pub name: &'static str,
    pub description: &'static str,
    pub backend: &'static str,
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
}

#[cfg(test)]
pub(crate) mod testing {
    //! A backend that claims to be a GPU but records and validates draws on
    //! the CPU, so mesh sketches can be exercised without an adapter.

    use procgen::{
        BackendKind, BlendMode, Destination, DrawCall, DrawRecord, FrameError, GeometryId, Mesh,
        PixelBuffer, Program, ProgramId, RenderBackend, Rgba, SetupError, Shape, SoftwareBackend,
        TargetDescriptor, TargetId,
    };

    pub struct Shadeless(pub SoftwareBackend);

    impl Shadeless {
        pub fn new(width: u32, height: u32) -> Self {
            Self(SoftwareBackend::new(width, height))
        }

        pub fn log(&self) -> &[DrawRecord] {
            self.0.log()
        }
    }

    impl RenderBackend for Shadeless {
        fn kind(&self) -> BackendKind {
            BackendKind::Gpu
        }

        fn surface_size(&self) -> (u32, u32) {
            self.0.surface_size()
        }

        fn create_target(&mut self, descriptor: TargetDescriptor) -> Result<TargetId, SetupError> {
            self.0.create_target(descriptor)
        }

        fn target(&self, id: TargetId) -> Option<&TargetDescriptor> {
            self.0.target(id)
        }

        fn create_program(&mut self, program: Program) -> Result<ProgramId, SetupError> {
            self.0.create_program(program)
        }

        fn program(&self, id: ProgramId) -> Option<&Program> {
            self.0.program(id)
        }

        fn create_geometry(&mut self, mesh: &Mesh) -> Result<GeometryId, SetupError> {
            self.0.create_geometry(mesh)
        }

        fn update_geometry(&mut self, id: GeometryId, mesh: &Mesh) -> Result<(), FrameError> {
            self.0.update_geometry(id, mesh)
        }

        fn destination(&self) -> Destination {
            self.0.destination()
        }

        fn bind(&mut self, destination: Destination) -> Result<Destination, FrameError> {
            self.0.bind(destination)
        }

        fn clear(&mut self, destination: Destination, color: Rgba) -> Result<(), FrameError> {
            self.0.clear(destination, color)
        }

        fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), FrameError> {
            self.0.draw(call)
        }

        fn draw_shapes(&mut self, shapes: &[Shape], blend: BlendMode) -> Result<(), FrameError> {
            self.0.draw_shapes(shapes, blend)
        }

        fn blit(&mut self, source: TargetId, blend: BlendMode) -> Result<(), FrameError> {
            self.0.blit(source, blend)
        }

        fn write_pixels(&mut self, target: TargetId, pixels: &[Rgba]) -> Result<(), FrameError> {
            self.0.write_pixels(target, pixels)
        }

        fn read_pixels(&mut self, destination: Destination) -> Result<PixelBuffer, FrameError> {
            self.0.read_pixels(destination)
        }

        fn begin_frame(&mut self) -> Result<(), FrameError> {
            self.0.begin_frame()
        }

        fn end_frame(&mut self) -> Result<(), FrameError> {
            self.0.end_frame()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_names_are_unique_and_findable() {
        let names = names();
        for (index, name) in names.iter().enumerate() {
            assert!(!names[index + 1..].contains(name), "duplicate sketch {name}");
            assert_eq!(find(name).map(|entry| entry.name), Some(*name));
        }
        assert_eq!(find(" FLOCK ").map(|entry| entry.name), Some("flock"));
        assert!(find("missing").is_none());
    }

    #[test]
    fn defaults_pick_backend_from_sketch_needs() {
        let flock = find("flock").expect("flock");
        let tubes = find("tubes").expect("tubes");
        assert_eq!(flock.defaults().surface.backend, Some(BackendChoice::Software));
        assert_eq!(tubes.defaults().surface.backend, Some(BackendChoice::Gpu));
        for entry in CATALOG {
            entry.defaults().validate().expect("defaults validate");
        }
    }

    #[test]
    fn summaries_serialise() {
        let summaries: Vec<SketchSummary> = CATALOG.iter().map(SketchEntry::summary).collect();
        let json = serde_json::to_value(&summaries).expect("json");
        assert_eq!(json[0]["name"], "flock");
        let panes = json[3]["duration_secs"].as_f64().expect("seconds");
        assert!((panes - 8.77).abs() < 1e-9);
    }
}
