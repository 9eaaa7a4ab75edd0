//! Kernel source analyzer.
//!
//! Works on comment-stripped kernel text and recovers what the rewriter and
//! assembler need to know: which parameters exist and how they are typed,
//! which uniforms the body reads (and with which vector type), and whether an
//! image parameter is ever the target of a store.

use std::collections::HashMap;
use std::sync::LazyLock;

use log::{debug, warn};
use regex::Regex;

use crate::codegen::Target;
use crate::config::{KernelConfig, ParamDecl};
use crate::error::{GpuError, Result};
use crate::kernel_ir::{AccessMode, UniformSlot};
use crate::registry::{ImageFormat, ParamType, ScalarKind};

/// Prefix that marks a uniform access in kernel bodies: `this.uniform.NAME[.field]`.
pub const UNIFORM_MARKER: &str = "this.uniform.";

static COMMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").unwrap());

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

static UNIFORM_ACCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"this\.uniform\.([A-Za-z_][A-Za-z0-9_]*)(?:\.([A-Za-z_][A-Za-z0-9_]*))?").unwrap()
});

static BODY_VAR_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bvar\s+([A-Za-z_][A-Za-z0-9_]*)\s*:\s*([^;=]+?)\s*;").unwrap()
});

/// Remove `//` and `/* */` comments. Block comments become a single space so
/// tokens on either side stay separated.
pub fn strip_comments(text: &str) -> String {
    COMMENTS
        .replace_all(text, |caps: &regex::Captures| {
            if caps[0].starts_with("/*") {
                " ".to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}

/// Check a parameter list: identifiers, unique, not reserved by the target.
pub fn validate_param_names(names: &[String], target: Target) -> Result<()> {
    for (i, name) in names.iter().enumerate() {
        if !IDENTIFIER.is_match(name) {
            return Err(GpuError::config(format!(
                "parameter {} ('{}') is not a valid identifier",
                i, name
            )));
        }
        if target.is_reserved(name) {
            return Err(GpuError::config(format!(
                "parameter '{}' collides with a reserved {} name",
                name,
                target.name()
            )));
        }
        if names[..i].contains(name) {
            return Err(GpuError::config(format!(
                "parameter '{}' is declared more than once",
                name
            )));
        }
    }
    Ok(())
}

/// Split a comma-separated parameter list (`"A, B, C"`).
///
/// A blank list means no parameters. Otherwise empty entries are kept so
/// that [`validate_param_names`] rejects lists like `"A,,B"`.
pub fn parse_param_list(list: &str) -> Vec<String> {
    if list.trim().is_empty() {
        return Vec::new();
    }
    list.split(',').map(|s| s.trim().to_string()).collect()
}

/// Pull `var NAME: TYPE;` declarations of parameters out of a body.
///
/// Returns the body without those declarations and the type hints they carry.
/// Declarations of names that are not parameters are left untouched.
pub fn extract_param_declarations(
    body: &str,
    names: &[String],
) -> Result<(String, HashMap<String, ParamDecl>)> {
    let mut hints = HashMap::new();
    let mut out = String::with_capacity(body.len());
    let mut last = 0;

    for caps in BODY_VAR_DECL.captures_iter(body) {
        let Some(whole) = caps.get(0) else { continue };
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            continue;
        }
        let decl = decl_from_shader_type(name, &caps[2])?;
        debug!("parameter '{}' declared in body as '{}'", name, &caps[2]);
        hints.insert(name.to_string(), decl);

        out.push_str(&body[last..whole.start()]);
        last = whole.end();
    }
    out.push_str(&body[last..]);
    Ok((out, hints))
}

/// Map a WGSL resource type written in a kernel body to a declaration.
fn decl_from_shader_type(name: &str, ty: &str) -> Result<ParamDecl> {
    let compact: String = ty.chars().filter(|c| !c.is_whitespace()).collect();
    let unsupported =
        || GpuError::config(format!("cannot bind parameter '{}' declared as '{}'", name, ty));

    let generic_args = |prefix: &str| -> Option<Vec<String>> {
        compact
            .strip_prefix(prefix)?
            .strip_prefix('<')?
            .strip_suffix('>')
            .map(|inner| inner.split(',').map(str::to_string).collect())
    };

    if let Some(args) = generic_args("array") {
        let kind = args
            .first()
            .and_then(|a| ScalarKind::from_keyword(a))
            .ok_or_else(unsupported)?;
        return Ok(ParamDecl::of(ParamType::buffer(kind)));
    }
    if let Some(args) = generic_args("texture_2d") {
        return match args.first().and_then(|a| ScalarKind::from_keyword(a)) {
            Some(ScalarKind::F32) => Ok(ParamDecl::of(ParamType::texture())),
            Some(ScalarKind::F64) | None => Err(unsupported()),
            Some(kind) => Ok(ParamDecl::of(ParamType::image(kind))),
        };
    }
    if let Some(args) = generic_args("texture_storage_2d") {
        let format = args
            .first()
            .and_then(|f| ImageFormat::parse(f))
            .ok_or_else(unsupported)?;
        let access = match args.get(1) {
            Some(mode) => Some(AccessMode::parse(mode).ok_or_else(unsupported)?),
            None => None,
        };
        return Ok(ParamDecl {
            ty: format.param_type(),
            format: Some(format),
            access,
        });
    }
    Err(unsupported())
}

/// Resolve every parameter's declaration, in declaration order.
///
/// Precedence: configuration entry, then in-body declaration, then `"buffer"`.
pub fn resolve_params(
    names: &[String],
    config: &KernelConfig,
    body_hints: &HashMap<String, ParamDecl>,
) -> Result<Vec<(String, ParamDecl)>> {
    for configured in config.params.keys() {
        if !names.contains(configured) {
            warn!(
                "configuration declares '{}' which is not a kernel parameter",
                configured
            );
        }
    }

    names
        .iter()
        .map(|name| {
            let decl = match config.declared(name)? {
                Some(decl) => decl,
                None => body_hints.get(name).copied().unwrap_or_default(),
            };
            Ok((name.clone(), decl))
        })
        .collect()
}

/// Discover every uniform referenced through the uniform marker.
///
/// Slots are indexed in order of first occurrence and start out as `u32`
/// vectors. A `NAME.field` access in a statement with a recognized type
/// keyword sets the vector type; other accesses leave it unchanged.
pub fn discover_uniforms(text: &str) -> Vec<UniformSlot> {
    let mut slots: Vec<UniformSlot> = Vec::new();

    for caps in UNIFORM_ACCESS.captures_iter(text) {
        let name = &caps[1];
        let index = match slots.iter().position(|s| s.name == name) {
            Some(i) => i,
            None => {
                slots.push(UniformSlot {
                    name: name.to_string(),
                    kind: ScalarKind::U32,
                    index: slots.len() as u32,
                });
                slots.len() - 1
            }
        };

        if caps.get(2).is_some() {
            let start = caps.get(0).map_or(0, |m| m.start());
            if let Some(kind) = declared_vector_kind(text, start) {
                slots[index].kind = kind;
            }
        }
    }

    debug!(
        "discovered uniforms: {:?}",
        slots.iter().map(|s| (&s.name, s.kind)).collect::<Vec<_>>()
    );
    slots
}

/// Scalar kind of the statement a uniform access at `at` belongs to.
///
/// Reads the first token after the nearest preceding `;`, `{` or `}`. For
/// `var`/`let`/`const` statements the type after the `:` is used instead.
fn declared_vector_kind(text: &str, at: usize) -> Option<ScalarKind> {
    let head = &text[..at];
    let stmt_start = head.rfind([';', '{', '}']).map_or(0, |i| i + 1);
    let stmt = head[stmt_start..].trim_start();

    let token_end = stmt
        .find(|c: char| c.is_whitespace() || matches!(c, ':' | '=' | '(' | ','))
        .unwrap_or(stmt.len());
    let token = &stmt[..token_end];

    let declared = if matches!(token, "var" | "let" | "const") {
        stmt.find(':').map(|colon| {
            let rest = &stmt[colon + 1..];
            rest[..rest.find('=').unwrap_or(rest.len())].trim()
        })
    } else {
        Some(token)
    };

    declared.and_then(classify_type_keyword)
}

/// Map a declared type keyword to the scalar kind of its 4-wide uniform vector.
pub fn classify_type_keyword(word: &str) -> Option<ScalarKind> {
    let word: String = word.chars().filter(|c| !c.is_whitespace()).collect();

    if let (Some(open), Some(close)) = (word.find('<'), word.rfind('>')) {
        if open < close {
            return classify_type_keyword(&word[open + 1..close]);
        }
    }

    match word.as_str() {
        "uint" | "u32" => return Some(ScalarKind::U32),
        "int" | "i32" => return Some(ScalarKind::I32),
        "float" | "f32" | "double" | "f64" => return Some(ScalarKind::F32),
        _ => {}
    }

    if word.starts_with("uvec") {
        return Some(ScalarKind::U32);
    }
    if word.starts_with("ivec") {
        return Some(ScalarKind::I32);
    }
    if word.starts_with("dvec") {
        return Some(ScalarKind::F32);
    }
    if let Some(rest) = word.strip_prefix("vec") {
        return match rest.chars().last() {
            Some('u') => Some(ScalarKind::U32),
            Some('i') => Some(ScalarKind::I32),
            Some('f') => Some(ScalarKind::F32),
            Some(c) if c.is_ascii_digit() => Some(ScalarKind::F32),
            _ => None,
        };
    }
    None
}

/// Whether `text` contains a store call (`textureStore(name, ...` or
/// `imageStore(name, ...`) targeting `name`.
pub fn has_store(text: &str, name: &str, target: Target) -> bool {
    let pattern = format!(
        r"\b{}\s*\(\s*{}\s*,",
        target.store_function(),
        regex::escape(name)
    );
    Regex::new(&pattern).is_ok_and(|re| re.is_match(text))
}

/// Access mode of an image parameter after rewriting.
pub fn infer_access(
    decl: &ParamDecl,
    rewritten: &str,
    name: &str,
    target: Target,
) -> AccessMode {
    if let Some(access) = decl.access {
        return access;
    }
    if has_store(rewritten, name, target) {
        AccessMode::WriteOnly
    } else {
        AccessMode::ReadOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &str) -> Vec<String> {
        parse_param_list(list)
    }

    #[test]
    fn test_strip_comments() {
        let text = "a = 1; // this.uniform.X.x\n/* this.uniform.Y.y\n */b = 2;";
        let stripped = strip_comments(text);
        assert!(!stripped.contains("uniform"));
        assert!(stripped.contains("a = 1;"));
        assert!(stripped.contains("b = 2;"));
    }

    #[test]
    fn test_uniform_discovery_order() {
        let body = "var a:u32 = this.uniform.K.x; var b:f32 = this.uniform.M.y; var c = this.uniform.K.z;";
        let uniforms = discover_uniforms(body);
        assert_eq!(uniforms.len(), 2);
        assert_eq!(uniforms[0].name, "K");
        assert_eq!(uniforms[0].index, 0);
        assert_eq!(uniforms[1].name, "M");
        assert_eq!(uniforms[1].index, 1);
        assert_eq!(uniforms[1].kind, ScalarKind::F32);
    }

    #[test]
    fn test_uniform_type_from_glsl_declaration() {
        let body = "uint M = this.uniform.MNK.x; float s = this.uniform.SCALE.x; int o = this.uniform.OFF.w;";
        let uniforms = discover_uniforms(body);
        let kinds: Vec<_> = uniforms.iter().map(|u| u.kind).collect();
        assert_eq!(kinds, vec![ScalarKind::U32, ScalarKind::F32, ScalarKind::I32]);
    }

    #[test]
    fn test_bare_uniform_defaults_to_unsigned() {
        let uniforms = discover_uniforms("var mnk:vec4u = this.uniform.MNK;\n");
        assert_eq!(uniforms.len(), 1);
        assert_eq!(uniforms[0].kind, ScalarKind::U32);
    }

    #[test]
    fn test_unknown_declared_type_defaults_to_unsigned() {
        let uniforms = discover_uniforms("{ weird k = this.uniform.P.x; }");
        assert_eq!(uniforms[0].kind, ScalarKind::U32);
    }

    #[test]
    fn test_uniform_boundary_is_nearest_statement() {
        let body = "var x: f32 = 1.0;\nfor (var i = 0u; i < 4u; i++) { var w: i32 = this.uniform.W.x; }";
        let uniforms = discover_uniforms(body);
        assert_eq!(uniforms[0].kind, ScalarKind::I32);
    }

    #[test]
    fn test_untyped_statement_keeps_inferred_type() {
        let body = "var s: f32 = this.uniform.S.x;\nif (s > this.uniform.S.y) { s = 0.0; }";
        let uniforms = discover_uniforms(body);
        assert_eq!(uniforms[0].kind, ScalarKind::F32);
    }

    #[test]
    fn test_empty_param_entries_rejected() {
        assert!(names("").is_empty());
        assert!(names("  ").is_empty());
        assert_eq!(names("A, B"), vec!["A", "B"]);
        assert!(validate_param_names(&names("A,,B"), Target::Wgsl).is_err());
        assert!(validate_param_names(&names("A,B,"), Target::Wgsl).is_err());
    }

    #[test]
    fn test_classify_type_keyword() {
        assert_eq!(classify_type_keyword("vec4<f32>"), Some(ScalarKind::F32));
        assert_eq!(classify_type_keyword("vec4u"), Some(ScalarKind::U32));
        assert_eq!(classify_type_keyword("ivec4"), Some(ScalarKind::I32));
        assert_eq!(classify_type_keyword("vec4"), Some(ScalarKind::F32));
        assert_eq!(classify_type_keyword("mat3x3f"), None);
    }

    #[test]
    fn test_validate_param_names() {
        assert!(validate_param_names(&names("A,B,C"), Target::Wgsl).is_ok());
        assert!(validate_param_names(&names("A,A"), Target::Wgsl).is_err());
        assert!(validate_param_names(&names("1a"), Target::Wgsl).is_err());
        assert!(validate_param_names(&names("fn"), Target::Wgsl).is_err());
        assert!(validate_param_names(&names("thread"), Target::Wgsl).is_err());
        assert!(validate_param_names(&names("buffer"), Target::Glsl).is_err());
        assert!(validate_param_names(&[String::from("a.b")], Target::Wgsl).is_err());
    }

    #[test]
    fn test_extract_param_declarations() {
        let body = "var A:array<f32>;\nvar src : texture_2d<f32>;\nvar dst: texture_storage_2d<rgba8unorm, write>;\nvar k: f32;";
        let (rest, hints) = extract_param_declarations(body, &names("A,src,dst")).unwrap();
        assert!(!rest.contains("array<f32>"));
        assert!(!rest.contains("texture_2d"));
        assert!(rest.contains("var k: f32;"));
        assert_eq!(hints["A"].ty, ParamType::buffer(ScalarKind::F32));
        assert_eq!(hints["src"].ty, ParamType::texture());
        assert_eq!(hints["dst"].format, Some(ImageFormat::Rgba8Unorm));
        assert_eq!(hints["dst"].access, Some(AccessMode::WriteOnly));
    }

    #[test]
    fn test_extract_rejects_unbindable_declaration() {
        let err = extract_param_declarations("var A: vec4<f32>;", &names("A")).unwrap_err();
        assert!(matches!(err, GpuError::Configuration(_)));
    }

    #[test]
    fn test_resolve_params_precedence() {
        let config = KernelConfig::default().param("B", "uint[]");
        let (_, hints) =
            extract_param_declarations("var B: array<i32>; var C: array<i32>;", &names("A,B,C"))
                .unwrap();
        let resolved = resolve_params(&names("A,B,C"), &config, &hints).unwrap();
        assert_eq!(resolved[0].1.ty, ParamType::buffer(ScalarKind::F32));
        assert_eq!(resolved[1].1.ty, ParamType::buffer(ScalarKind::U32));
        assert_eq!(resolved[2].1.ty, ParamType::buffer(ScalarKind::I32));
    }

    #[test]
    fn test_store_detection() {
        let written = "textureStore(dst, vec2<i32>(i32(x), i32(y)), v);";
        let read = "let v = textureLoad(src, vec2<i32>(i32(x), i32(y)), 0);";
        assert!(has_store(written, "dst", Target::Wgsl));
        assert!(!has_store(read, "src", Target::Wgsl));
        assert!(!has_store(written, "ds", Target::Wgsl));
        assert!(has_store("imageStore( out , ivec2(0), v);", "out", Target::Glsl));
    }

    #[test]
    fn test_explicit_access_wins() {
        let decl = ParamDecl {
            ty: ParamType::texture(),
            format: None,
            access: Some(AccessMode::ReadWrite),
        };
        assert_eq!(infer_access(&decl, "", "dst", Target::Wgsl), AccessMode::ReadWrite);
    }
}
