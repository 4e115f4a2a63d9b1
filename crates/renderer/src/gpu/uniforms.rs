//! std140 packing of sketch uniform bags.

use procgen::{Program, UniformKind, UniformValue, Uniforms};

/// Name of the block member holding the destination size in pixels.
pub(crate) const RESOLUTION_SLOT: &str = "sketch_resolution";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UniformSlot {
    pub name: String,
    pub kind: UniformKind,
    pub offset: usize,
    /// Filled by the backend rather than the sketch.
    pub internal: bool,
}

/// Byte layout of a program's uniform block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UniformLayout {
    slots: Vec<UniformSlot>,
    size: usize,
}

/// std140 base alignment and size of a block member.
fn std140(kind: UniformKind) -> (usize, usize) {
    match kind {
        UniformKind::Float | UniformKind::Int => (4, 4),
        UniformKind::Vec2 => (8, 8),
        UniformKind::Vec3 => (16, 12),
        UniformKind::Vec4 => (16, 16),
        UniformKind::Mat4 => (16, 64),
        UniformKind::Texture => (4, 0),
    }
}

fn align_to(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

impl UniformLayout {
    pub fn for_program(program: &Program) -> Self {
        Self::from_members(
            program
                .uniforms()
                .iter()
                .filter(|(_, kind)| *kind != UniformKind::Texture)
                .map(|(name, kind)| (name.as_str(), *kind)),
        )
    }

    fn from_members<'a>(members: impl Iterator<Item = (&'a str, UniformKind)>) -> Self {
        let mut slots = vec![UniformSlot {
            name: RESOLUTION_SLOT.to_string(),
            kind: UniformKind::Vec2,
            offset: 0,
            internal: true,
        }];
        let mut cursor = 8;
        for (name, kind) in members {
            let (alignment, size) = std140(kind);
            let offset = align_to(cursor, alignment);
            slots.push(UniformSlot {
                name: name.to_string(),
                kind,
                offset,
                internal: false,
            });
            cursor = offset + size;
        }
        Self {
            slots,
            size: align_to(cursor, 16),
        }
    }

    pub fn slots(&self) -> &[UniformSlot] {
        &self.slots
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Writes every non-texture value into a block-sized buffer. Values
    /// missing from `uniforms` stay zeroed; callers validate beforehand.
    pub fn pack(&self, resolution: [f32; 2], uniforms: &Uniforms) -> Vec<u8> {
        let mut bytes = vec![0u8; self.size];
        for slot in &self.slots {
            let value = if slot.internal {
                UniformValue::Vec2(resolution)
            } else {
                match uniforms.get(&slot.name) {
                    Some(value) => *value,
                    None => continue,
                }
            };
            let at = slot.offset;
            match value {
                UniformValue::Float(v) => write(&mut bytes, at, bytemuck::bytes_of(&v)),
                UniformValue::Int(v) => write(&mut bytes, at, bytemuck::bytes_of(&v)),
                UniformValue::Vec2(v) => write(&mut bytes, at, bytemuck::cast_slice(&v)),
                UniformValue::Vec3(v) => write(&mut bytes, at, bytemuck::cast_slice(&v)),
                UniformValue::Vec4(v) => write(&mut bytes, at, bytemuck::cast_slice(&v)),
                UniformValue::Mat4(columns) => {
                    for (index, column) in columns.iter().enumerate() {
                        write(&mut bytes, at + index * 16, bytemuck::cast_slice(column));
                    }
                }
                UniformValue::Texture(_) => {}
            }
        }
        bytes
    }
}

fn write(bytes: &mut [u8], offset: usize, data: &[u8]) {
    if let Some(slot) = bytes.get_mut(offset..offset + data.len()) {
        slot.copy_from_slice(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(members: &[(&str, UniformKind)]) -> UniformLayout {
        UniformLayout::from_members(members.iter().copied())
    }

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn offset(layout: &UniformLayout, name: &str) -> usize {
        layout
            .slots()
            .iter()
            .find(|slot| slot.name == name)
            .map(|slot| slot.offset)
            .expect("slot")
    }

    #[test]
    fn offsets_follow_std140() {
        let layout = layout(&[
            ("u_time", UniformKind::Float),
            ("u_color", UniformKind::Vec3),
            ("u_wave", UniformKind::Float),
            ("u_matrix", UniformKind::Mat4),
            ("u_position", UniformKind::Vec2),
        ]);
        assert_eq!(offset(&layout, RESOLUTION_SLOT), 0);
        assert_eq!(offset(&layout, "u_time"), 8);
        assert_eq!(offset(&layout, "u_color"), 16);
        assert_eq!(offset(&layout, "u_wave"), 28);
        assert_eq!(offset(&layout, "u_matrix"), 32);
        assert_eq!(offset(&layout, "u_position"), 96);
        assert_eq!(layout.size(), 112);
    }

    #[test]
    fn empty_block_still_carries_resolution() {
        let layout = layout(&[]);
        assert_eq!(layout.slots().len(), 1);
        assert_eq!(layout.size(), 16);
        let bytes = layout.pack([640.0, 480.0], &Uniforms::new());
        assert_eq!(floats(&bytes), vec![640.0, 480.0, 0.0, 0.0]);
    }

    #[test]
    fn pack_places_values() {
        let layout = layout(&[
            ("u_count", UniformKind::Int),
            ("u_color", UniformKind::Vec3),
            ("u_matrix", UniformKind::Mat4),
        ]);
        let mut identity = [[0.0f32; 4]; 4];
        for (i, column) in identity.iter_mut().enumerate() {
            column[i] = 1.0;
        }
        let uniforms = Uniforms::new()
            .with("u_count", 3)
            .with("u_color", [0.25f32, 0.5, 0.75])
            .with("u_matrix", identity);
        let bytes = layout.pack([8.0, 4.0], &uniforms);
        assert_eq!(bytes.len(), layout.size());
        assert_eq!(&bytes[8..12], &3i32.to_ne_bytes());
        let floats = floats(&bytes);
        assert_eq!(&floats[0..2], &[8.0, 4.0]);
        assert_eq!(&floats[4..7], &[0.25, 0.5, 0.75]);
        assert_eq!(floats[8], 1.0);
        assert_eq!(floats[8 + 5], 1.0);
        assert_eq!(floats[8 + 15], 1.0);
        assert_eq!(floats[8 + 1], 0.0);
    }
}
