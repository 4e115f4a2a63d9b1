//! Mesh containers and the handful of shapes the sketches build on.
//!
//! Solid shapes carry `a_position` and unit `a_normal` (both vec3) with
//! counter-clockwise triangles when seen from outside.

use std::collections::HashMap;

use crate::math::{remap, TAU};
use crate::noise::NoiseField;
use crate::program::{AttributeKind, Attributes};

/// Handle to geometry uploaded to a render backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Primitive {
    #[default]
    Triangles,
    TriangleStrip,
    Lines,
    LineStrip,
    Points,
}

/// Vertex attributes plus an optional index list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub attributes: Attributes,
    pub indices: Option<Vec<u32>>,
}

impl Mesh {
    pub fn new(attributes: Attributes) -> Self {
        Self {
            attributes,
            indices: None,
        }
    }

    pub fn indexed(attributes: Attributes, indices: Vec<u32>) -> Self {
        Self {
            attributes,
            indices: Some(indices),
        }
    }

    /// Number of elements a draw of the whole mesh consumes.
    pub fn element_count(&self) -> Result<usize, String> {
        let vertices = self.attributes.vertex_count()?;
        match &self.indices {
            None => Ok(vertices),
            Some(indices) => {
                if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertices) {
                    return Err(format!("index {bad} is out of range for {vertices} vertices"));
                }
                Ok(indices.len())
            }
        }
    }
}

/// Subdivided plane in the XY plane centred on the origin.
///
/// Carries `a_position` (vec3), `a_uv` (vec2), and triangle indices.
pub fn plane(width: f32, height: f32, segments_x: u32, segments_y: u32) -> Mesh {
    let sx = segments_x.max(1);
    let sy = segments_y.max(1);
    let mut positions = Vec::with_capacity(((sx + 1) * (sy + 1)) as usize);
    let mut uvs = Vec::with_capacity(positions.capacity());
    for row in 0..=sy {
        let v = row as f32 / sy as f32;
        for col in 0..=sx {
            let u = col as f32 / sx as f32;
            positions.push([(u - 0.5) * width, (0.5 - v) * height, 0.0]);
            uvs.push([u, 1.0 - v]);
        }
    }
    let stride = sx + 1;
    let mut indices = Vec::with_capacity((sx * sy * 6) as usize);
    for row in 0..sy {
        for col in 0..sx {
            let a = row * stride + col;
            let b = a + stride;
            indices.extend_from_slice(&[a, b, a + 1, b, b + 1, a + 1]);
        }
    }
    Mesh::indexed(
        Attributes::new().vec3("a_position", &positions).vec2("a_uv", &uvs),
        indices,
    )
}

/// Open cylinder along the Y axis with `a_position` and `a_normal`.
pub fn cylinder(radius: f32, height: f32, radial_segments: u32, height_segments: u32) -> Mesh {
    let radial = radial_segments.max(3);
    let rows = height_segments.max(1);
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    for row in 0..=rows {
        let y = remap(row as f32, 0.0, rows as f32, -height / 2.0, height / 2.0);
        for seg in 0..=radial {
            let angle = seg as f32 / radial as f32 * TAU;
            let (sin, cos) = angle.sin_cos();
            positions.push([radius * sin, y, radius * cos]);
            normals.push([sin, 0.0, cos]);
        }
    }
    let stride = radial + 1;
    let mut indices = Vec::with_capacity((radial * rows * 6) as usize);
    for row in 0..rows {
        for seg in 0..radial {
            let a = row * stride + seg;
            let b = a + stride;
            indices.extend_from_slice(&[a, a + 1, b, b, a + 1, b + 1]);
        }
    }
    Mesh::indexed(
        Attributes::new()
            .vec3("a_position", &positions)
            .vec3("a_normal", &normals),
        indices,
    )
}

/// Axis-aligned cube of edge `size` centred on the origin, with flat
/// per-face normals.
pub fn cube(size: f32) -> Mesh {
    // (normal, u, v) with u × v = normal so both triangles face outward.
    const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
    ];
    let half = size / 2.0;
    let mut positions = Vec::with_capacity(24);
    let mut normals = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in FACES {
        let base = positions.len() as u32;
        for (s, t) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let corner = [0usize, 1, 2].map(|axis| normal[axis] + s * u[axis] + t * v[axis]);
            positions.push(corner.map(|axis| axis * half));
            normals.push(normal);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    Mesh::indexed(
        Attributes::new()
            .vec3("a_position", &positions)
            .vec3("a_normal", &normals),
        indices,
    )
}

/// Sphere built by splitting each icosahedron face into four,
/// `subdivisions` times (capped at 6).
///
/// Vertices are shared between faces: `10 * 4^n + 2` of them.
pub fn icosphere(radius: f32, subdivisions: u32) -> Mesh {
    let t = (1.0 + 5f32.sqrt()) / 2.0;
    let mut directions: Vec<[f32; 3]> = [
        [-1.0, t, 0.0],
        [1.0, t, 0.0],
        [-1.0, -t, 0.0],
        [1.0, -t, 0.0],
        [0.0, -1.0, t],
        [0.0, 1.0, t],
        [0.0, -1.0, -t],
        [0.0, 1.0, -t],
        [t, 0.0, -1.0],
        [t, 0.0, 1.0],
        [-t, 0.0, -1.0],
        [-t, 0.0, 1.0],
    ]
    .into_iter()
    .map(normalize)
    .collect();
    let mut faces: Vec<[u32; 3]> = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for _ in 0..subdivisions.min(6) {
        let mut midpoints: HashMap<(u32, u32), u32> = HashMap::new();
        let mut midpoint = |a: u32, b: u32| {
            let key = (a.min(b), a.max(b));
            *midpoints.entry(key).or_insert_with(|| {
                let (pa, pb) = (directions[a as usize], directions[b as usize]);
                let mid = [0usize, 1, 2].map(|axis| (pa[axis] + pb[axis]) / 2.0);
                directions.push(normalize(mid));
                directions.len() as u32 - 1
            })
        };
        faces = faces
            .iter()
            .flat_map(|&[a, b, c]| {
                let ab = midpoint(a, b);
                let bc = midpoint(b, c);
                let ca = midpoint(c, a);
                [[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]
            })
            .collect();
    }

    let positions: Vec<[f32; 3]> = directions
        .iter()
        .map(|d| d.map(|axis| axis * radius))
        .collect();
    Mesh::indexed(
        Attributes::new()
            .vec3("a_position", &positions)
            .vec3("a_normal", &directions),
        faces.into_iter().flatten().collect(),
    )
}

/// Torus around the Z axis: a tube of radius `minor` swept along a circle of
/// radius `major` in the XY plane.
pub fn torus(major: f32, minor: f32, radial_segments: u32, tubular_segments: u32) -> Mesh {
    let radial = radial_segments.max(3);
    let tubular = tubular_segments.max(3);
    let mut positions = Vec::with_capacity(((radial + 1) * (tubular + 1)) as usize);
    let mut normals = Vec::with_capacity(positions.capacity());
    for ring in 0..=radial {
        let (sin_u, cos_u) = (ring as f32 / radial as f32 * TAU).sin_cos();
        for step in 0..=tubular {
            let (sin_v, cos_v) = (step as f32 / tubular as f32 * TAU).sin_cos();
            let reach = major + minor * cos_v;
            positions.push([reach * cos_u, reach * sin_u, minor * sin_v]);
            normals.push([cos_v * cos_u, cos_v * sin_u, sin_v]);
        }
    }
    let stride = tubular + 1;
    let mut indices = Vec::with_capacity((radial * tubular * 6) as usize);
    for ring in 0..radial {
        for step in 0..tubular {
            let a = ring * stride + step;
            let b = a + stride;
            indices.extend_from_slice(&[a, b, a + 1, b, b + 1, a + 1]);
        }
    }
    Mesh::indexed(
        Attributes::new()
            .vec3("a_position", &positions)
            .vec3("a_normal", &normals),
        indices,
    )
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let length = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if length == 0.0 {
        return v;
    }
    v.map(|axis| axis / length)
}

/// `count` points evenly spaced on a circle, starting on the +X axis.
pub fn ring(count: usize, centre: [f32; 2], radius: f32) -> Vec<[f32; 2]> {
    (0..count)
        .map(|i| {
            let angle = i as f32 / count as f32 * TAU;
            [centre[0] + angle.cos() * radius, centre[1] + angle.sin() * radius]
        })
        .collect()
}

/// Plane whose vertices are pushed along Z by two octaves of noise.
///
/// Also carries a per-vertex `a_offset` float holding the raw displacement so
/// shaders can color by height.
pub fn web(noise: &NoiseField, extent: f32, segments: u32, amplitude: f32) -> Mesh {
    let mut mesh = plane(extent, extent, segments, segments);
    let mut offsets = Vec::new();
    if let Some(positions) = mesh.attributes.get_mut("a_position") {
        for vertex in positions.values.chunks_exact_mut(3) {
            let offset = noise.layered2(vertex[0] / extent * 2.0, vertex[1] / extent * 2.0);
            vertex[2] = offset * amplitude;
            offsets.push(offset);
        }
    }
    mesh.attributes.set("a_offset", AttributeKind::Float, offsets);
    mesh
}

/// One triangle covering clip space, with `a_position` as vec2.
pub fn fullscreen() -> Mesh {
    Mesh::new(Attributes::new().vec2("a_position", &[[-1.0, -1.0], [3.0, -1.0], [-1.0, 3.0]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::Seed;

    #[test]
    fn plane_has_expected_counts() {
        let mesh = plane(2.0, 2.0, 4, 3);
        assert_eq!(mesh.attributes.vertex_count(), Ok(20));
        assert_eq!(mesh.element_count(), Ok(4 * 3 * 6));
    }

    #[test]
    fn plane_spans_requested_extent() {
        let mesh = plane(4.0, 2.0, 1, 1);
        let positions = &mesh.attributes.get("a_position").expect("positions").values;
        let xs: Vec<f32> = positions.chunks(3).map(|p| p[0]).collect();
        let ys: Vec<f32> = positions.chunks(3).map(|p| p[1]).collect();
        assert_eq!(xs.iter().cloned().fold(f32::MAX, f32::min), -2.0);
        assert_eq!(xs.iter().cloned().fold(f32::MIN, f32::max), 2.0);
        assert_eq!(ys.iter().cloned().fold(f32::MAX, f32::min), -1.0);
        assert_eq!(ys.iter().cloned().fold(f32::MIN, f32::max), 1.0);
    }

    #[test]
    fn cylinder_indices_stay_in_range() {
        let mesh = cylinder(1.0, 2.0, 12, 2);
        assert!(mesh.element_count().is_ok());
        let normals = &mesh.attributes.get("a_normal").expect("normals").values;
        for n in normals.chunks(3) {
            let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
            assert!((len - 1.0).abs() < 1e-5);
        }
    }

    fn vec3s(mesh: &Mesh, name: &str) -> Vec<[f32; 3]> {
        mesh.attributes
            .get(name)
            .expect(name)
            .values
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect()
    }

    fn length(v: [f32; 3]) -> f32 {
        (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
    }

    /// Every triangle's winding agrees with the normal at its first corner.
    fn assert_faces_outward(mesh: &Mesh) {
        let positions = vec3s(mesh, "a_position");
        let normals = vec3s(mesh, "a_normal");
        let indices = mesh.indices.as_ref().expect("indexed");
        assert_eq!(indices.len() % 3, 0);
        for tri in indices.chunks_exact(3) {
            let [a, b, c] = [0usize, 1, 2].map(|k| positions[tri[k] as usize]);
            let ab = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
            let ac = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
            let face = [
                ab[1] * ac[2] - ab[2] * ac[1],
                ab[2] * ac[0] - ab[0] * ac[2],
                ab[0] * ac[1] - ab[1] * ac[0],
            ];
            let n = normals[tri[0] as usize];
            assert!(face[0] * n[0] + face[1] * n[1] + face[2] * n[2] > 0.0);
        }
        for n in normals {
            assert!((length(n) - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn solids_face_outward() {
        assert_faces_outward(&cylinder(0.5, 2.0, 12, 2));
        assert_faces_outward(&cube(2.0));
        assert_faces_outward(&icosphere(1.5, 2));
        assert_faces_outward(&torus(1.0, 0.25, 16, 8));
    }

    #[test]
    fn cube_corners_sit_at_half_size() {
        let mesh = cube(3.0);
        assert_eq!(mesh.attributes.vertex_count(), Ok(24));
        assert_eq!(mesh.element_count(), Ok(36));
        for p in vec3s(&mesh, "a_position") {
            assert!(p.iter().all(|axis| axis.abs() == 1.5));
        }
    }

    #[test]
    fn icosphere_shares_vertices_between_faces() {
        for (subdivisions, vertices) in [(0, 12), (1, 42), (2, 162)] {
            let mesh = icosphere(2.0, subdivisions);
            assert_eq!(mesh.attributes.vertex_count(), Ok(vertices));
            assert_eq!(mesh.element_count(), Ok(60 * 4usize.pow(subdivisions)));
            for p in vec3s(&mesh, "a_position") {
                assert!((length(p) - 2.0).abs() < 1e-5);
            }
        }
        assert_eq!(icosphere(1.0, 40).attributes.vertex_count(), Ok(40962));
    }

    #[test]
    fn torus_surface_is_minor_radius_from_its_core() {
        let mesh = torus(2.0, 0.5, 12, 6);
        assert_eq!(mesh.attributes.vertex_count(), Ok(13 * 7));
        assert_eq!(mesh.element_count(), Ok(12 * 6 * 6));
        for p in vec3s(&mesh, "a_position") {
            let core = (p[0] * p[0] + p[1] * p[1]).sqrt() - 2.0;
            assert!(((core * core + p[2] * p[2]).sqrt() - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn ring_points_sit_on_radius() {
        let points = ring(8, [10.0, -5.0], 3.0);
        assert_eq!(points.len(), 8);
        for [x, y] in points {
            let r = ((x - 10.0).powi(2) + (y + 5.0).powi(2)).sqrt();
            assert!((r - 3.0).abs() < 1e-4);
        }
        assert!(ring(0, [0.0, 0.0], 1.0).is_empty());
    }

    #[test]
    fn web_is_deterministic_per_seed() {
        let a = web(&NoiseField::new(Seed(8)), 4.0, 8, 0.5);
        let b = web(&NoiseField::new(Seed(8)), 4.0, 8, 0.5);
        assert_eq!(a, b);
        assert_eq!(a.attributes.vertex_count(), Ok(81));
    }

    #[test]
    fn out_of_range_index_is_reported() {
        let mesh = Mesh::indexed(fullscreen().attributes, vec![0, 1, 3]);
        assert!(mesh.element_count().unwrap_err().contains("index 3"));
    }
}
