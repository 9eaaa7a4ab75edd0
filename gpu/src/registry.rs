//! Type/format registry.
//!
//! Static lookup from the textual parameter tags accepted in kernel
//! configurations (`"buffer"`, `"texture"`, `"float[]"`, `"uint[][]"`, ...)
//! to [`ParamType`], plus the pixel-format tables used when binding and
//! reading back image parameters. Everything here is a constant `match`;
//! there is no process-wide mutable table.

use crate::error::{GpuError, Result};

/// Scalar element kinds a kernel parameter or uniform can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    U32,
    I32,
    F32,
    F64,
}

impl ScalarKind {
    /// Keyword used in type tags (`"uint"`, `"int"`, `"float"`, `"double"`).
    pub fn keyword(self) -> &'static str {
        match self {
            ScalarKind::U32 => "uint",
            ScalarKind::I32 => "int",
            ScalarKind::F32 => "float",
            ScalarKind::F64 => "double",
        }
    }

    /// Parse a tag keyword. Shader spellings (`u32`, `f32`, ...) are accepted too.
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "uint" | "u32" => Some(ScalarKind::U32),
            "int" | "i32" => Some(ScalarKind::I32),
            "float" | "f32" => Some(ScalarKind::F32),
            "double" | "f64" => Some(ScalarKind::F64),
            _ => None,
        }
    }

    pub fn byte_size(self) -> usize {
        match self {
            ScalarKind::U32 | ScalarKind::I32 | ScalarKind::F32 => 4,
            ScalarKind::F64 => 8,
        }
    }

    pub fn wgsl(self) -> &'static str {
        match self {
            ScalarKind::U32 => "u32",
            ScalarKind::I32 => "i32",
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
        }
    }

    pub fn glsl(self) -> &'static str {
        match self {
            ScalarKind::U32 => "uint",
            ScalarKind::I32 => "int",
            ScalarKind::F32 => "float",
            ScalarKind::F64 => "double",
        }
    }

    /// Host type used when reading a buffer of this kind back without a hint.
    pub fn host_scalar(self) -> HostScalar {
        match self {
            ScalarKind::U32 => HostScalar::U32,
            ScalarKind::I32 => HostScalar::I32,
            ScalarKind::F32 => HostScalar::F32,
            ScalarKind::F64 => HostScalar::F64,
        }
    }
}

/// Element representation of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Scalar(ScalarKind),
    /// Four 8-bit normalized channels, read as `vec4<f32>` in the kernel.
    PackedUnorm8x4,
}

/// 1 = linear buffer, 2 = 2-D image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimensionality {
    Buffer,
    Image,
}

impl Dimensionality {
    pub fn rank(self) -> u32 {
        match self {
            Dimensionality::Buffer => 1,
            Dimensionality::Image => 2,
        }
    }
}

/// Declared type of a kernel parameter. Fixed once declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamType {
    element: ElementType,
    dims: Dimensionality,
}

impl ParamType {
    pub const fn buffer(kind: ScalarKind) -> Self {
        ParamType {
            element: ElementType::Scalar(kind),
            dims: Dimensionality::Buffer,
        }
    }

    pub const fn image(kind: ScalarKind) -> Self {
        ParamType {
            element: ElementType::Scalar(kind),
            dims: Dimensionality::Image,
        }
    }

    /// The `"texture"` tag: a packed RGBA8 image.
    pub const fn texture() -> Self {
        ParamType {
            element: ElementType::PackedUnorm8x4,
            dims: Dimensionality::Image,
        }
    }

    pub fn element(&self) -> ElementType {
        self.element
    }

    pub fn dims(&self) -> Dimensionality {
        self.dims
    }

    pub fn is_image(&self) -> bool {
        self.dims == Dimensionality::Image
    }

    /// Scalar kind the kernel sees when it reads one element (or one texel channel).
    pub fn scalar(&self) -> ScalarKind {
        match self.element {
            ElementType::Scalar(kind) => kind,
            ElementType::PackedUnorm8x4 => ScalarKind::F32,
        }
    }

    /// Bytes per element of a buffer parameter.
    pub fn element_byte_size(&self) -> usize {
        match self.element {
            ElementType::Scalar(kind) => kind.byte_size(),
            ElementType::PackedUnorm8x4 => 4,
        }
    }

    /// Canonical spelling of this type. `resolve(canonical_tag(t)) == t`.
    pub fn canonical_tag(&self) -> String {
        match (self.element, self.dims) {
            (ElementType::PackedUnorm8x4, _) => "texture".to_string(),
            (ElementType::Scalar(kind), Dimensionality::Buffer) => format!("{}[]", kind.keyword()),
            (ElementType::Scalar(kind), Dimensionality::Image) => {
                format!("{}[][]", kind.keyword())
            }
        }
    }

    /// Pixel format used for an image parameter when no explicit format is given.
    pub fn default_format(&self) -> Option<ImageFormat> {
        if !self.is_image() {
            return None;
        }
        match self.element {
            ElementType::PackedUnorm8x4 => Some(ImageFormat::Rgba8Unorm),
            ElementType::Scalar(ScalarKind::F32) => Some(ImageFormat::Rgba32Float),
            ElementType::Scalar(ScalarKind::U32) => Some(ImageFormat::Rgba32Uint),
            ElementType::Scalar(ScalarKind::I32) => Some(ImageFormat::Rgba32Sint),
            ElementType::Scalar(ScalarKind::F64) => None,
        }
    }
}

impl Default for ParamType {
    fn default() -> Self {
        ParamType::buffer(ScalarKind::F32)
    }
}

/// Result of resolving a tag that may also name a pixel format (`"rgba8[][]"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTag {
    pub ty: ParamType,
    pub format: Option<ImageFormat>,
}

/// Resolve a type tag to its [`ParamType`].
pub fn resolve(tag: &str) -> Result<ParamType> {
    resolve_tag(tag).map(|resolved| resolved.ty)
}

/// Resolve a type tag, keeping any pixel format spelled in the tag.
pub fn resolve_tag(tag: &str) -> Result<ResolvedTag> {
    let tag = tag.trim();
    let plain = |ty| Ok(ResolvedTag { ty, format: None });

    match tag {
        "buffer" => return plain(ParamType::buffer(ScalarKind::F32)),
        "texture" | "[][]" => return plain(ParamType::texture()),
        _ => {}
    }

    if let Some(head) = tag.strip_suffix("[][]") {
        if let Some(kind) = ScalarKind::from_keyword(head) {
            return plain(ParamType::image(kind));
        }
        if let Some(format) = ImageFormat::parse(head) {
            return Ok(ResolvedTag {
                ty: format.param_type(),
                format: Some(format),
            });
        }
    } else if let Some(head) = tag.strip_suffix("[]") {
        if let Some(kind) = ScalarKind::from_keyword(head) {
            return plain(ParamType::buffer(kind));
        }
    }

    Err(GpuError::config(format!("unknown parameter type tag '{}'", tag)))
}

/// Every canonical tag the registry produces.
pub const CANONICAL_TAGS: &[&str] = &[
    "uint[]",
    "int[]",
    "float[]",
    "double[]",
    "uint[][]",
    "int[][]",
    "float[][]",
    "double[][]",
    "texture",
];

/// Host-side scalar type of read-back data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostScalar {
    U8,
    U32,
    I32,
    F32,
    F64,
}

impl HostScalar {
    /// Parse a read-back type hint (`"float"`, `"uint"`, `"int"`, `"double"`, `"byte"`).
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint {
            "byte" | "u8" | "uint8" => Some(HostScalar::U8),
            "uint" | "u32" => Some(HostScalar::U32),
            "int" | "i32" => Some(HostScalar::I32),
            "float" | "f32" => Some(HostScalar::F32),
            "double" | "f64" => Some(HostScalar::F64),
            _ => None,
        }
    }

    pub fn byte_size(self) -> usize {
        match self {
            HostScalar::U8 => 1,
            HostScalar::U32 | HostScalar::I32 | HostScalar::F32 => 4,
            HostScalar::F64 => 8,
        }
    }
}

/// Pixel formats an image parameter can be bound with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Rgba8Unorm,
    Rgba32Float,
    Rgba32Uint,
    Rgba32Sint,
    R32Float,
    R32Uint,
    R32Sint,
}

impl ImageFormat {
    /// Format-string lookup (`"rgba8"`, `"rgba32f"`, `"r32ui"`, WGSL spellings, ...).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "rgba8" | "rgba8unorm" => Some(ImageFormat::Rgba8Unorm),
            "rgba32f" | "rgba32float" => Some(ImageFormat::Rgba32Float),
            "rgba32ui" | "rgba32uint" => Some(ImageFormat::Rgba32Uint),
            "rgba32i" | "rgba32sint" => Some(ImageFormat::Rgba32Sint),
            "r32f" | "r32float" => Some(ImageFormat::R32Float),
            "r32ui" | "r32uint" => Some(ImageFormat::R32Uint),
            "r32i" | "r32sint" => Some(ImageFormat::R32Sint),
            _ => None,
        }
    }

    /// Storage-texture format token in WGSL.
    pub fn wgsl_token(self) -> &'static str {
        match self {
            ImageFormat::Rgba8Unorm => "rgba8unorm",
            ImageFormat::Rgba32Float => "rgba32float",
            ImageFormat::Rgba32Uint => "rgba32uint",
            ImageFormat::Rgba32Sint => "rgba32sint",
            ImageFormat::R32Float => "r32float",
            ImageFormat::R32Uint => "r32uint",
            ImageFormat::R32Sint => "r32sint",
        }
    }

    /// Image format layout qualifier in GLSL.
    pub fn glsl_token(self) -> &'static str {
        match self {
            ImageFormat::Rgba8Unorm => "rgba8",
            ImageFormat::Rgba32Float => "rgba32f",
            ImageFormat::Rgba32Uint => "rgba32ui",
            ImageFormat::Rgba32Sint => "rgba32i",
            ImageFormat::R32Float => "r32f",
            ImageFormat::R32Uint => "r32ui",
            ImageFormat::R32Sint => "r32i",
        }
    }

    /// Scalar kind a shader sees when loading a texel.
    pub fn sample_kind(self) -> ScalarKind {
        match self {
            ImageFormat::Rgba8Unorm | ImageFormat::Rgba32Float | ImageFormat::R32Float => {
                ScalarKind::F32
            }
            ImageFormat::Rgba32Uint | ImageFormat::R32Uint => ScalarKind::U32,
            ImageFormat::Rgba32Sint | ImageFormat::R32Sint => ScalarKind::I32,
        }
    }

    /// Parameter type implied by this format.
    pub fn param_type(self) -> ParamType {
        match self {
            ImageFormat::Rgba8Unorm => ParamType::texture(),
            other => ParamType::image(other.sample_kind()),
        }
    }

    pub fn channels(self) -> usize {
        match self {
            ImageFormat::R32Float | ImageFormat::R32Uint | ImageFormat::R32Sint => 1,
            _ => 4,
        }
    }

    pub fn texel_size(self) -> usize {
        match self {
            ImageFormat::Rgba8Unorm => 4,
            ImageFormat::R32Float | ImageFormat::R32Uint | ImageFormat::R32Sint => 4,
            ImageFormat::Rgba32Float | ImageFormat::Rgba32Uint | ImageFormat::Rgba32Sint => 16,
        }
    }

    /// Host scalar type that read-back texels decode to.
    pub fn readback_scalar(self) -> HostScalar {
        match self {
            ImageFormat::Rgba8Unorm => HostScalar::U8,
            ImageFormat::Rgba32Float | ImageFormat::R32Float => HostScalar::F32,
            ImageFormat::Rgba32Uint | ImageFormat::R32Uint => HostScalar::U32,
            ImageFormat::Rgba32Sint | ImageFormat::R32Sint => HostScalar::I32,
        }
    }

    #[cfg(feature = "webgpu-backend")]
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            ImageFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            ImageFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            ImageFormat::Rgba32Uint => wgpu::TextureFormat::Rgba32Uint,
            ImageFormat::Rgba32Sint => wgpu::TextureFormat::Rgba32Sint,
            ImageFormat::R32Float => wgpu::TextureFormat::R32Float,
            ImageFormat::R32Uint => wgpu::TextureFormat::R32Uint,
            ImageFormat::R32Sint => wgpu::TextureFormat::R32Sint,
        }
    }

    #[cfg(feature = "webgpu-backend")]
    pub fn from_wgpu(format: wgpu::TextureFormat) -> Option<Self> {
        match format {
            wgpu::TextureFormat::Rgba8Unorm => Some(ImageFormat::Rgba8Unorm),
            wgpu::TextureFormat::Rgba32Float => Some(ImageFormat::Rgba32Float),
            wgpu::TextureFormat::Rgba32Uint => Some(ImageFormat::Rgba32Uint),
            wgpu::TextureFormat::Rgba32Sint => Some(ImageFormat::Rgba32Sint),
            wgpu::TextureFormat::R32Float => Some(ImageFormat::R32Float),
            wgpu::TextureFormat::R32Uint => Some(ImageFormat::R32Uint),
            wgpu::TextureFormat::R32Sint => Some(ImageFormat::R32Sint),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_tags_round_trip() {
        for tag in CANONICAL_TAGS {
            let ty = resolve(tag).unwrap();
            assert_eq!(&ty.canonical_tag(), tag, "tag {} did not round-trip", tag);
        }
    }

    #[test]
    fn test_resolve_is_stable() {
        assert_eq!(resolve("uint[]").unwrap(), resolve("uint[]").unwrap());
        assert_eq!(resolve("buffer").unwrap(), resolve("float[]").unwrap());
    }

    #[test]
    fn test_aliases() {
        assert_eq!(resolve("buffer").unwrap(), ParamType::buffer(ScalarKind::F32));
        assert_eq!(resolve("texture").unwrap(), ParamType::texture());
        assert_eq!(resolve("[][]").unwrap(), ParamType::texture());
        assert_eq!(resolve(" int[][] ").unwrap(), ParamType::image(ScalarKind::I32));
    }

    #[test]
    fn test_format_tags() {
        let rgba8 = resolve_tag("rgba8[][]").unwrap();
        assert_eq!(rgba8.ty, ParamType::texture());
        assert_eq!(rgba8.format, Some(ImageFormat::Rgba8Unorm));

        let r32ui = resolve_tag("r32ui[][]").unwrap();
        assert_eq!(r32ui.ty, ParamType::image(ScalarKind::U32));
        assert_eq!(r32ui.format, Some(ImageFormat::R32Uint));
    }

    #[test]
    fn test_unknown_tags_are_configuration_errors() {
        for tag in ["", "vec4", "float[][][]", "half[]", "rgba8[]", "texture[]"] {
            match resolve(tag) {
                Err(GpuError::Configuration(msg)) => assert!(msg.contains("unknown")),
                other => panic!("expected configuration error for {:?}, got {:?}", tag, other),
            }
        }
    }

    #[test]
    fn test_dimensionality() {
        assert_eq!(resolve("float[]").unwrap().dims().rank(), 1);
        assert_eq!(resolve("float[][]").unwrap().dims().rank(), 2);
        assert_eq!(resolve("texture").unwrap().dims().rank(), 2);
        assert_eq!(resolve("double[]").unwrap().element_byte_size(), 8);
    }

    #[test]
    fn test_default_formats() {
        assert_eq!(ParamType::texture().default_format(), Some(ImageFormat::Rgba8Unorm));
        assert_eq!(
            ParamType::image(ScalarKind::F32).default_format(),
            Some(ImageFormat::Rgba32Float)
        );
        assert_eq!(ParamType::image(ScalarKind::F64).default_format(), None);
        assert_eq!(ParamType::buffer(ScalarKind::F32).default_format(), None);
    }

    #[test]
    fn test_format_tables() {
        let fmt = ImageFormat::parse("RGBA32F").unwrap();
        assert_eq!(fmt, ImageFormat::Rgba32Float);
        assert_eq!(fmt.wgsl_token(), "rgba32float");
        assert_eq!(fmt.glsl_token(), "rgba32f");
        assert_eq!(fmt.texel_size(), 16);
        assert_eq!(fmt.readback_scalar(), HostScalar::F32);
        assert_eq!(ImageFormat::Rgba8Unorm.readback_scalar(), HostScalar::U8);
        assert_eq!(ImageFormat::parse("bgra8"), None);
    }

    #[test]
    fn test_host_hints() {
        assert_eq!(HostScalar::from_hint("float"), Some(HostScalar::F32));
        assert_eq!(HostScalar::from_hint("byte"), Some(HostScalar::U8));
        assert_eq!(HostScalar::from_hint("vec4"), None);
    }
}
