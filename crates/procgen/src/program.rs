//! Typed shader programs and the uniform/attribute bags fed to them.
//!
//! A [`Program`] pairs WebGL-style GLSL sources with an explicit list of the
//! uniforms and vertex attributes it consumes. Construction scans both
//! sources and rejects any mismatch, so a draw call never depends on a name
//! that only exists in one place.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::color::Rgba;
use crate::error::SetupError;
use crate::target::TargetId;

/// Handle to a program registered with a render backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    /// A render target sampled as a 2D texture.
    Texture,
}

impl UniformKind {
    pub fn glsl_type(self) -> &'static str {
        match self {
            UniformKind::Float => "float",
            UniformKind::Int => "int",
            UniformKind::Vec2 => "vec2",
            UniformKind::Vec3 => "vec3",
            UniformKind::Vec4 => "vec4",
            UniformKind::Mat4 => "mat4",
            UniformKind::Texture => "sampler2D",
        }
    }

    fn from_glsl(ty: &str) -> Option<Self> {
        Some(match ty {
            "float" => UniformKind::Float,
            "int" => UniformKind::Int,
            "vec2" => UniformKind::Vec2,
            "vec3" => UniformKind::Vec3,
            "vec4" => UniformKind::Vec4,
            "mat4" => UniformKind::Mat4,
            "sampler2D" => UniformKind::Texture,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
}

impl AttributeKind {
    pub fn components(self) -> usize {
        match self {
            AttributeKind::Float => 1,
            AttributeKind::Vec2 => 2,
            AttributeKind::Vec3 => 3,
            AttributeKind::Vec4 => 4,
        }
    }

    pub fn glsl_type(self) -> &'static str {
        match self {
            AttributeKind::Float => "float",
            AttributeKind::Vec2 => "vec2",
            AttributeKind::Vec3 => "vec3",
            AttributeKind::Vec4 => "vec4",
        }
    }

    fn from_glsl(ty: &str) -> Option<Self> {
        Some(match ty {
            "float" => AttributeKind::Float,
            "vec2" => AttributeKind::Vec2,
            "vec3" => AttributeKind::Vec3,
            "vec4" => AttributeKind::Vec4,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Column-major, as GLSL expects.
    Mat4([[f32; 4]; 4]),
    Texture(TargetId),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Int(_) => UniformKind::Int,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Mat4(_) => UniformKind::Mat4,
            UniformValue::Texture(_) => UniformKind::Texture,
        }
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        UniformValue::Int(value)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(value: [f32; 2]) -> Self {
        UniformValue::Vec2(value)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(value: [f32; 3]) -> Self {
        UniformValue::Vec3(value)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(value: [f32; 4]) -> Self {
        UniformValue::Vec4(value)
    }
}

impl From<[[f32; 4]; 4]> for UniformValue {
    fn from(value: [[f32; 4]; 4]) -> Self {
        UniformValue::Mat4(value)
    }
}

impl From<Rgba> for UniformValue {
    fn from(value: Rgba) -> Self {
        UniformValue::Vec4(value.to_array())
    }
}

impl From<TargetId> for UniformValue {
    fn from(value: TargetId) -> Self {
        UniformValue::Texture(value)
    }
}

/// Named uniform values for one draw call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Uniforms {
    values: BTreeMap<String, UniformValue>,
}

impl Uniforms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<UniformValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.values.get(name)
    }

    /// Copies every value from `other`, replacing same-named entries.
    pub fn extend(mut self, other: &Uniforms) -> Self {
        for (name, value) in &other.values {
            self.values.insert(name.clone(), *value);
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UniformValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Every texture target this bag samples.
    pub fn textures(&self) -> impl Iterator<Item = TargetId> + '_ {
        self.values.values().filter_map(|value| match value {
            UniformValue::Texture(id) => Some(*id),
            _ => None,
        })
    }
}

/// Flat per-vertex data for one attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeData {
    pub kind: AttributeKind,
    pub values: Vec<f32>,
}

impl AttributeData {
    pub fn vertex_count(&self) -> usize {
        self.values.len() / self.kind.components()
    }
}

/// Named vertex attributes for one mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    entries: BTreeMap<String, AttributeData>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, kind: AttributeKind, values: Vec<f32>) -> &mut Self {
        self.entries
            .insert(name.into(), AttributeData { kind, values });
        self
    }

    pub fn float(mut self, name: impl Into<String>, values: Vec<f32>) -> Self {
        self.set(name, AttributeKind::Float, values);
        self
    }

    pub fn vec2(mut self, name: impl Into<String>, values: &[[f32; 2]]) -> Self {
        self.set(name, AttributeKind::Vec2, values.iter().flatten().copied().collect());
        self
    }

    pub fn vec3(mut self, name: impl Into<String>, values: &[[f32; 3]]) -> Self {
        self.set(name, AttributeKind::Vec3, values.iter().flatten().copied().collect());
        self
    }

    pub fn vec4(mut self, name: impl Into<String>, values: &[[f32; 4]]) -> Self {
        self.set(name, AttributeKind::Vec4, values.iter().flatten().copied().collect());
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeData> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut AttributeData> {
        self.entries.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeData)> {
        self.entries.iter().map(|(name, data)| (name.as_str(), data))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shared vertex count, or an explanation of why there is none.
    pub fn vertex_count(&self) -> Result<usize, String> {
        let mut count: Option<(usize, &str)> = None;
        for (name, data) in &self.entries {
            if data.values.len() % data.kind.components() != 0 {
                return Err(format!(
                    "attribute '{name}' holds {} floats, not a multiple of {}",
                    data.values.len(),
                    data.kind.components()
                ));
            }
            let vertices = data.vertex_count();
            match count {
                None => count = Some((vertices, name)),
                Some((expected, first)) if expected != vertices => {
                    return Err(format!(
                        "attribute '{name}' has {vertices} vertices but '{first}' has {expected}"
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(count.map(|(vertices, _)| vertices).unwrap_or(0))
    }
}

/// Declares a program's sources and interface before validation.
#[derive(Debug, Clone, Default)]
pub struct ProgramSpec {
    name: String,
    vertex: String,
    fragment: String,
    uniforms: Vec<(String, UniformKind)>,
    attributes: Vec<(String, AttributeKind)>,
}

impl ProgramSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn vertex(mut self, source: impl Into<String>) -> Self {
        self.vertex = source.into();
        self
    }

    pub fn fragment(mut self, source: impl Into<String>) -> Self {
        self.fragment = source.into();
        self
    }

    pub fn uniform(mut self, name: impl Into<String>, kind: UniformKind) -> Self {
        self.uniforms.push((name.into(), kind));
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes.push((name.into(), kind));
        self
    }

    pub fn build(self) -> Result<Program, SetupError> {
        Program::new(self)
    }
}

/// A validated program: the declared interface is exactly what the sources
/// declare.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    name: String,
    vertex: String,
    fragment: String,
    uniforms: Vec<(String, UniformKind)>,
    attributes: Vec<(String, AttributeKind)>,
}

impl Program {
    pub fn new(spec: ProgramSpec) -> Result<Self, SetupError> {
        let name = spec.name.trim().to_string();
        let invalid = |reason: String| SetupError::Program {
            program: if name.is_empty() {
                "<unnamed>".to_string()
            } else {
                name.clone()
            },
            reason,
        };

        if name.is_empty() {
            return Err(invalid("program name is empty".into()));
        }
        if !spec.vertex.contains("main") {
            return Err(invalid("vertex source has no main function".into()));
        }
        if !spec.fragment.contains("main") {
            return Err(invalid("fragment source has no main function".into()));
        }

        let vertex_decls = scan_declarations(&spec.vertex).map_err(&invalid)?;
        let fragment_decls = scan_declarations(&spec.fragment).map_err(&invalid)?;

        let mut source_uniforms: BTreeMap<String, String> = BTreeMap::new();
        for decl in vertex_decls
            .iter()
            .chain(fragment_decls.iter())
            .filter(|decl| decl.storage == Storage::Uniform)
        {
            if let Some(previous) = source_uniforms.insert(decl.name.clone(), decl.ty.clone()) {
                if previous != decl.ty {
                    return Err(invalid(format!(
                        "uniform '{}' is declared as {} and {}",
                        decl.name, previous, decl.ty
                    )));
                }
            }
        }
        if let Some(decl) = fragment_decls
            .iter()
            .find(|decl| decl.storage == Storage::Attribute)
        {
            return Err(invalid(format!(
                "attribute '{}' is declared in the fragment source",
                decl.name
            )));
        }
        let source_attributes: BTreeMap<&str, &str> = vertex_decls
            .iter()
            .filter(|decl| decl.storage == Storage::Attribute)
            .map(|decl| (decl.name.as_str(), decl.ty.as_str()))
            .collect();

        let mut seen = BTreeSet::new();
        for (uniform, kind) in &spec.uniforms {
            if !seen.insert(uniform.as_str()) {
                return Err(invalid(format!("uniform '{uniform}' is declared twice")));
            }
            match source_uniforms.get(uniform) {
                None => {
                    return Err(invalid(format!(
                        "uniform '{uniform}' is declared but missing from the sources"
                    )))
                }
                Some(ty) if UniformKind::from_glsl(ty) != Some(*kind) => {
                    return Err(invalid(format!(
                        "uniform '{uniform}' is {ty} in the sources but declared as {}",
                        kind.glsl_type()
                    )))
                }
                Some(_) => {}
            }
        }
        for uniform in source_uniforms.keys() {
            if !spec.uniforms.iter().any(|(name, _)| name == uniform) {
                return Err(invalid(format!(
                    "uniform '{uniform}' appears in the sources but is not declared"
                )));
            }
        }

        let mut seen = BTreeSet::new();
        for (attribute, kind) in &spec.attributes {
            if !seen.insert(attribute.as_str()) {
                return Err(invalid(format!("attribute '{attribute}' is declared twice")));
            }
            match source_attributes.get(attribute.as_str()) {
                None => {
                    return Err(invalid(format!(
                        "attribute '{attribute}' is declared but missing from the vertex source"
                    )))
                }
                Some(ty) if AttributeKind::from_glsl(ty) != Some(*kind) => {
                    return Err(invalid(format!(
                        "attribute '{attribute}' is {ty} in the vertex source but declared as {}",
                        kind.glsl_type()
                    )))
                }
                Some(_) => {}
            }
        }
        for attribute in source_attributes.keys() {
            if !spec.attributes.iter().any(|(name, _)| name == attribute) {
                return Err(invalid(format!(
                    "attribute '{attribute}' appears in the vertex source but is not declared"
                )));
            }
        }

        Ok(Self {
            name,
            vertex: spec.vertex,
            fragment: spec.fragment,
            uniforms: spec.uniforms,
            attributes: spec.attributes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex_source(&self) -> &str {
        &self.vertex
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment
    }

    pub fn uniforms(&self) -> &[(String, UniformKind)] {
        &self.uniforms
    }

    pub fn attributes(&self) -> &[(String, AttributeKind)] {
        &self.attributes
    }

    pub fn uniform_kind(&self, name: &str) -> Option<UniformKind> {
        self.uniforms
            .iter()
            .find(|(uniform, _)| uniform == name)
            .map(|(_, kind)| *kind)
    }

    /// Checks a uniform bag against the declared interface: every uniform
    /// supplied with the right kind, nothing extra.
    pub fn check_uniforms(&self, uniforms: &Uniforms) -> Result<(), String> {
        for (name, kind) in &self.uniforms {
            match uniforms.get(name) {
                None => return Err(format!("uniform '{name}' was not supplied")),
                Some(value) if value.kind() != *kind => {
                    return Err(format!(
                        "uniform '{name}' expects {} but got {}",
                        kind.glsl_type(),
                        value.kind().glsl_type()
                    ))
                }
                Some(_) => {}
            }
        }
        if let Some((extra, _)) = uniforms
            .iter()
            .find(|(name, _)| self.uniform_kind(name).is_none())
        {
            return Err(format!("uniform '{extra}' is not declared by the program"));
        }
        Ok(())
    }

    /// Checks a mesh's attributes and returns its vertex count. Attributes
    /// the program does not consume are allowed and ignored.
    pub fn check_attributes(&self, attributes: &Attributes) -> Result<usize, String> {
        for (name, kind) in &self.attributes {
            match attributes.get(name) {
                None => return Err(format!("attribute '{name}' is missing from the geometry")),
                Some(data) if data.kind != *kind => {
                    return Err(format!(
                        "attribute '{name}' expects {} but geometry holds {}",
                        kind.glsl_type(),
                        data.kind.glsl_type()
                    ))
                }
                Some(_) => {}
            }
        }
        attributes.vertex_count()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Storage {
    Uniform,
    Attribute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Declaration {
    pub storage: Storage,
    pub ty: String,
    pub name: String,
}

const PRECISION_QUALIFIERS: [&str; 3] = ["lowp", "mediump", "highp"];

/// Collects `uniform` and `attribute` declarations from GLSL source.
///
/// Handles precision qualifiers and comma-separated names. Arrays are
/// rejected because uniform bags carry only scalar, vector, and matrix
/// values.
pub(crate) fn scan_declarations(source: &str) -> Result<Vec<Declaration>, String> {
    let stripped = strip_comments(source);
    let mut declarations = Vec::new();
    for statement in stripped.split(|c| c == ';' || c == '{' || c == '}') {
        let mut tokens = statement
            .split_whitespace()
            .skip_while(|token| token.starts_with('#'));
        let storage = match tokens.next() {
            Some("uniform") => Storage::Uniform,
            Some("attribute") => Storage::Attribute,
            _ => continue,
        };
        let ty = match tokens.find(|token| !PRECISION_QUALIFIERS.contains(token)) {
            Some(ty) => ty.to_string(),
            None => return Err("declaration without a type".into()),
        };
        let names: String = tokens.collect::<Vec<_>>().join(" ");
        for raw in names.split(',') {
            let name = raw.trim();
            if name.is_empty() {
                return Err(format!("{ty} declaration without a name"));
            }
            if name.contains('[') {
                return Err(format!("array declaration '{name}' is not supported"));
            }
            if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(format!("malformed declaration name '{name}'"));
            }
            declarations.push(Declaration {
                storage,
                ty: ty.clone(),
                name: name.to_string(),
            });
        }
    }
    Ok(declarations)
}

/// Replaces comments with whitespace, keeping line structure intact.
pub(crate) fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '/' && chars.peek() == Some(&'/') {
            for next in chars.by_ref() {
                if next == '\n' {
                    out.push('\n');
                    break;
                }
            }
        } else if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            let mut last = '\0';
            for next in chars.by_ref() {
                if next == '\n' {
                    out.push('\n');
                }
                if last == '*' && next == '/' {
                    break;
                }
                last = next;
            }
            out.push(' ');
        } else if c == '#' {
            // Preprocessor lines end at the newline, not at a semicolon.
            out.push(c);
            for next in chars.by_ref() {
                out.push(next);
                if next == '\n' {
                    break;
                }
            }
            out.push(';');
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = r"
        precision highp float;
        attribute vec3 a_position;
        attribute vec2 a_uv; // texture coords
        uniform mat4 u_matrix;
        varying vec2 v_uv;
        void main() {
            v_uv = a_uv;
            gl_Position = u_matrix * vec4(a_position, 1.0);
        }
    ";

    const FRAGMENT: &str = r"
        precision mediump float;
        uniform float u_time, u_audio;
        /* uniform vec3 u_commented; */
        uniform sampler2D u_spectrum;
        varying vec2 v_uv;
        void main() {
            gl_FragColor = texture2D(u_spectrum, v_uv) * u_time * u_audio;
        }
    ";

    fn spec() -> ProgramSpec {
        ProgramSpec::new("panes")
            .vertex(VERTEX)
            .fragment(FRAGMENT)
            .attribute("a_position", AttributeKind::Vec3)
            .attribute("a_uv", AttributeKind::Vec2)
            .uniform("u_matrix", UniformKind::Mat4)
            .uniform("u_time", UniformKind::Float)
            .uniform("u_audio", UniformKind::Float)
            .uniform("u_spectrum", UniformKind::Texture)
    }

    #[test]
    fn scan_finds_declarations_and_skips_comments() {
        let decls = scan_declarations(FRAGMENT).expect("scan");
        let names: Vec<&str> = decls.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["u_time", "u_audio", "u_spectrum"]);
        assert!(decls.iter().all(|d| d.storage == Storage::Uniform));
    }

    #[test]
    fn extend_overrides_same_named_values() {
        let base = Uniforms::new().with("u_time", 0.25).with("u_audio", 0.5);
        let merged = base.extend(&Uniforms::new().with("u_audio", 1.0).with("u_wave", 2.0));
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get("u_time"), Some(&UniformValue::Float(0.25)));
        assert_eq!(merged.get("u_audio"), Some(&UniformValue::Float(1.0)));
    }

    #[test]
    fn matching_interface_validates() {
        let program = spec().build().expect("program");
        assert_eq!(program.name(), "panes");
        assert_eq!(program.uniform_kind("u_spectrum"), Some(UniformKind::Texture));
    }

    #[test]
    fn missing_uniform_in_source_names_program() {
        let err = spec()
            .uniform("u_missing", UniformKind::Float)
            .build()
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("panes"), "{message}");
        assert!(message.contains("u_missing"), "{message}");
    }

    #[test]
    fn undeclared_source_uniform_is_rejected() {
        let err = ProgramSpec::new("bare")
            .vertex(VERTEX)
            .fragment(FRAGMENT)
            .attribute("a_position", AttributeKind::Vec3)
            .attribute("a_uv", AttributeKind::Vec2)
            .uniform("u_matrix", UniformKind::Mat4)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("u_time"));
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let err = ProgramSpec::new("wrong")
            .vertex(VERTEX)
            .fragment(FRAGMENT)
            .attribute("a_position", AttributeKind::Vec4)
            .attribute("a_uv", AttributeKind::Vec2)
            .uniform("u_matrix", UniformKind::Mat4)
            .uniform("u_time", UniformKind::Float)
            .uniform("u_audio", UniformKind::Float)
            .uniform("u_spectrum", UniformKind::Texture)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("a_position"));
    }

    #[test]
    fn uniform_bag_checks() {
        let program = spec().build().expect("program");
        let mut uniforms = Uniforms::new()
            .with("u_matrix", [[0.0f32; 4]; 4])
            .with("u_time", 0.5f32)
            .with("u_audio", 0.0f32)
            .with("u_spectrum", TargetId(0));
        assert!(program.check_uniforms(&uniforms).is_ok());

        uniforms.set("u_time", [1.0f32, 2.0]);
        assert!(program.check_uniforms(&uniforms).unwrap_err().contains("u_time"));

        uniforms.set("u_time", 0.5f32).set("u_extra", 1.0f32);
        assert!(program.check_uniforms(&uniforms).unwrap_err().contains("u_extra"));
    }

    #[test]
    fn attribute_counts_must_agree() {
        let program = spec().build().expect("program");
        let good = Attributes::new()
            .vec3("a_position", &[[0.0; 3]; 4])
            .vec2("a_uv", &[[0.0; 2]; 4]);
        assert_eq!(program.check_attributes(&good), Ok(4));

        let bad = Attributes::new()
            .vec3("a_position", &[[0.0; 3]; 4])
            .vec2("a_uv", &[[0.0; 2]; 3]);
        assert!(program.check_attributes(&bad).is_err());
    }

    #[test]
    fn arrays_are_rejected() {
        let err = scan_declarations("uniform float u_bins[4];").unwrap_err();
        assert!(err.contains("u_bins"));
    }
}
