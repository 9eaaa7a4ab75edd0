//! Lexical rewrite of kernel bodies into target shader syntax.
//!
//! Rules run in a fixed order and later rules never re-match earlier output:
//!
//! 1. hoist workgroup-shared declarations to module scope
//! 2. hoist `function NAME(ARGS) [-> RET] { ... }` helpers
//! 3. hoist body-level `const ...;` declarations
//! 4. image subscripts become texel loads and stores
//! 5. buffer subscripts become the dialect's element access
//! 6. uniform markers become plain uniform names
//!
//! Rules 4-6 also run over the hoisted text. Scanning is bracket-balanced but
//! not expression-aware.

use std::sync::LazyLock;

use regex::Regex;

use super::{Coords, Target};
use crate::analyzer::UNIFORM_MARKER;

static WGSL_SHARED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bvar\s*<\s*workgroup\s*>[^;]*;").unwrap());

static GLSL_SHARED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bshared\s+[^;]*;").unwrap());

static HELPER_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bfunction\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap());

/// How subscripts of a parameter are rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamForm {
    Buffer,
    /// `read_write` images are loaded without a mip level.
    Image { read_write: bool },
}

/// Output of the rewrite pipeline, split by where each piece is emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewrittenSource {
    pub shared: Vec<String>,
    pub consts: Vec<String>,
    pub helpers: Vec<String>,
    pub body: String,
}

impl RewrittenSource {
    /// All generated text, used for store detection.
    pub fn all_text(&self) -> String {
        let mut text = String::new();
        for part in self.shared.iter().chain(&self.consts).chain(&self.helpers) {
            text.push_str(part);
            text.push('\n');
        }
        text.push_str(&self.body);
        text
    }
}

/// Run the full pipeline over a comment-free body.
pub fn rewrite(body: &str, target: Target, params: &[(String, ParamForm)]) -> RewrittenSource {
    let (body, shared) = hoist_shared(body, target);
    let (body, helpers) = hoist_helpers(&body, target);
    let (body, consts) = hoist_consts(&body);

    let apply = |text: &str| rewrite_uses(text, target, params);
    RewrittenSource {
        shared,
        consts: consts.iter().map(|c| apply(c)).collect(),
        helpers: helpers.iter().map(|h| apply(h)).collect(),
        body: apply(&body),
    }
}

/// Rules 4-6 on one piece of text.
pub fn rewrite_uses(text: &str, target: Target, params: &[(String, ParamForm)]) -> String {
    let mut text = text.to_string();

    for (name, form) in params {
        if let ParamForm::Image { read_write } = *form {
            text = rewrite_subscripts(&text, name, 2, &|sub: Subscript| {
                let coords = match sub.indices.as_slice() {
                    [row, col] => Coords::RowCol {
                        row: row.trim().to_string(),
                        col: col.trim().to_string(),
                    },
                    [pos, ..] => Coords::Vector(pos.trim().to_string()),
                    [] => Coords::Vector(String::new()),
                };
                match sub.assign {
                    None => target.image_load(name, &coords, read_write),
                    Some(Assign { op: None, value }) => target.image_store(name, &coords, &value),
                    Some(Assign {
                        op: Some(op),
                        value,
                    }) => {
                        let current = target.image_load(name, &coords, read_write);
                        target.image_store(name, &coords, &format!("{} {} ({})", current, op, value))
                    }
                }
            });
        }
    }

    if target == Target::Glsl {
        for (name, form) in params {
            if *form == ParamForm::Buffer {
                text = rewrite_subscripts(&text, name, 1, &|sub: Subscript| {
                    let index = sub.indices.first().map(String::as_str).unwrap_or("");
                    let access = target.buffer_access(name, index);
                    match sub.assign {
                        None => access,
                        Some(Assign { op, value }) => match op {
                            Some(op) => format!("{} {}= {}", access, op, value),
                            None => format!("{} = {}", access, value),
                        },
                    }
                });
            }
        }
    }

    text.replace(UNIFORM_MARKER, "")
}

fn shared_decl(target: Target) -> &'static Regex {
    match target {
        Target::Wgsl => &WGSL_SHARED,
        Target::Glsl => &GLSL_SHARED,
    }
}

fn hoist_shared(body: &str, target: Target) -> (String, Vec<String>) {
    let re = shared_decl(target);
    let shared = re
        .find_iter(body)
        .map(|m| m.as_str().trim().to_string())
        .collect();
    (re.replace_all(body, "").into_owned(), shared)
}

fn hoist_helpers(body: &str, target: Target) -> (String, Vec<String>) {
    let mut text = body.to_string();
    let mut helpers = Vec::new();
    let mut from = 0;

    loop {
        let found = HELPER_START.captures_at(&text, from).and_then(|caps| {
            let whole = caps.get(0)?;
            Some((whole.start(), whole.end() - 1, caps[1].to_string()))
        });
        let Some((start, open_paren, name)) = found else { break };

        let Some(close_paren) = matching_close(&text, open_paren) else { break };
        let Some(brace) = text[close_paren..].find('{').map(|i| close_paren + i) else { break };
        let Some(end) = matching_close(&text, brace) else { break };

        let args = text[open_paren + 1..close_paren].trim().to_string();
        let between = text[close_paren + 1..brace].trim();
        let ret = between
            .strip_prefix("->")
            .map(str::trim)
            .filter(|r| !r.is_empty());

        let header = target.helper_header(&name, &args, ret);
        helpers.push(format!("{} {}", header, &text[brace..=end]));

        text.replace_range(start..=end, "");
        from = start;
    }

    (text, helpers)
}

/// Extract `const ...;` statements that sit at brace depth 0.
fn hoist_consts(body: &str) -> (String, Vec<String>) {
    let bytes = body.as_bytes();
    let mut out = String::with_capacity(body.len());
    let mut consts = Vec::new();
    let mut depth = 0i32;
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'(' | b'[' => depth += 1,
            b'}' | b')' | b']' => depth -= 1,
            b'c' if depth == 0 && starts_keyword(body, i, "const") => {
                if let Some(end) = statement_end(body, i) {
                    out.push_str(&body[copied..i]);
                    consts.push(body[i..=end].trim().to_string());
                    copied = end + 1;
                    i = end + 1;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }
    out.push_str(&body[copied..]);
    (out, consts)
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn starts_keyword(text: &str, at: usize, word: &str) -> bool {
    text[at..].starts_with(word)
        && !text[..at].chars().next_back().is_some_and(is_ident)
        && text[at + word.len()..]
            .chars()
            .next()
            .is_some_and(char::is_whitespace)
}

/// Index of the bracket that closes the one at `open`.
fn matching_close(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in text.bytes().enumerate().skip(open) {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Index of the `;` that ends the statement starting at `from`.
fn statement_end(text: &str, from: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, b) in text.bytes().enumerate().skip(from) {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b';' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// End of an assignment's right-hand side: the `;` or the unmatched closing
/// bracket that terminates it, or the end of the text.
fn value_end(text: &str, from: usize) -> usize {
    let mut depth = 0i32;
    for (i, b) in text.bytes().enumerate().skip(from) {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                if depth == 0 {
                    return i;
                }
                depth -= 1;
            }
            b';' if depth == 0 => return i,
            _ => {}
        }
    }
    text.len()
}

fn skip_ws(text: &str, from: usize) -> usize {
    from + text[from..].len() - text[from..].trim_start().len()
}

/// One subscripted occurrence of a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscript {
    pub indices: Vec<String>,
    pub assign: Option<Assign>,
}

/// `= value` or `op= value` following a subscript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assign {
    pub op: Option<char>,
    pub value: String,
}

/// Replace every `name[..]` (up to `max_groups` subscripts) with the text
/// produced by `f`. Indices and assigned values are rewritten first.
pub fn rewrite_subscripts(
    text: &str,
    name: &str,
    max_groups: usize,
    f: &dyn Fn(Subscript) -> String,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut search = 0;

    while let Some(found) = text[search..].find(name) {
        let start = search + found;
        let name_end = start + name.len();
        search = name_end;

        let preceded = text[..start]
            .chars()
            .next_back()
            .is_some_and(|c| is_ident(c) || c == '.');
        let followed = text[name_end..].chars().next().is_some_and(is_ident);
        if preceded || followed {
            continue;
        }

        let mut indices = Vec::new();
        let mut cursor = name_end;
        loop {
            let next = skip_ws(text, cursor);
            if indices.len() >= max_groups || !text[next..].starts_with('[') {
                break;
            }
            let Some(close) = matching_close(text, next) else { break };
            indices.push(rewrite_subscripts(&text[next + 1..close], name, max_groups, f));
            cursor = close + 1;
        }
        if indices.is_empty() {
            continue;
        }

        let after = skip_ws(text, cursor);
        let rest = &text[after..];
        let op = if rest.starts_with('=') && !rest.starts_with("==") {
            Some(None)
        } else {
            ['+', '-', '*', '/']
                .into_iter()
                .find(|&c| rest.starts_with(c) && rest[1..].starts_with('='))
                .map(Some)
        };

        let (replacement, end) = match op {
            Some(op) => {
                let value_start = after + 1 + usize::from(op.is_some());
                let end = value_end(text, value_start);
                let value = rewrite_subscripts(text[value_start..end].trim(), name, max_groups, f);
                (f(Subscript { indices, assign: Some(Assign { op, value }) }), end)
            }
            None => (f(Subscript { indices, assign: None }), cursor),
        };

        out.push_str(&text[copied..start]);
        out.push_str(&replacement);
        copied = end;
        search = end;
    }

    out.push_str(&text[copied..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str) -> (String, ParamForm) {
        (name.to_string(), ParamForm::Image { read_write: false })
    }

    fn buffer(name: &str) -> (String, ParamForm) {
        (name.to_string(), ParamForm::Buffer)
    }

    #[test]
    fn test_pass_through_without_subscripts_or_markers() {
        let body = "var x: f32 = 1.0;\nlet y = x * 2.0;\n";
        let out = rewrite(body, Target::Wgsl, &[image("src"), buffer("A")]);
        assert_eq!(out.body, body);
        assert!(out.helpers.is_empty() && out.consts.is_empty() && out.shared.is_empty());
    }

    #[test]
    fn test_image_copy() {
        let out = rewrite_uses(
            "dst[thread.y][thread.x] = src[thread.y][thread.x];",
            Target::Wgsl,
            &[image("src"), image("dst")],
        );
        assert_eq!(
            out,
            "textureStore(dst, vec2<i32>(i32(thread.x), i32(thread.y)), \
             textureLoad(src, vec2<i32>(i32(thread.x), i32(thread.y)), 0));"
        );
    }

    #[test]
    fn test_vector_subscript() {
        let out = rewrite_uses(
            "var pixel:vec4<f32> = src[thread.xy];",
            Target::Wgsl,
            &[image("src")],
        );
        assert_eq!(
            out,
            "var pixel:vec4<f32> = textureLoad(src, vec2<i32>(thread.xy), 0);"
        );
    }

    #[test]
    fn test_nested_index_expressions() {
        let out = rewrite_uses(
            "dst[y + YSize()][x] = (p00 + p01) / 4.0;",
            Target::Wgsl,
            &[image("dst")],
        );
        assert_eq!(
            out,
            "textureStore(dst, vec2<i32>(i32(x), i32(y + YSize())), (p00 + p01) / 4.0);"
        );
    }

    #[test]
    fn test_comparison_is_not_assignment() {
        let out = rewrite_uses("if (src[0][1] == v) {}", Target::Glsl, &[image("src")]);
        assert_eq!(out, "if (imageLoad(src, ivec2(int(1), int(0))) == v) {}");
    }

    #[test]
    fn test_compound_store() {
        let out = rewrite_uses("dst[r][c] += v;", Target::Glsl, &[image("dst")]);
        assert_eq!(
            out,
            "imageStore(dst, ivec2(int(c), int(r)), imageLoad(dst, ivec2(int(c), int(r))) + (v));"
        );
    }

    #[test]
    fn test_field_access_is_skipped() {
        let out = rewrite_uses("let v = pixel.src[0];", Target::Wgsl, &[image("src")]);
        assert_eq!(out, "let v = pixel.src[0];");
        let out = rewrite_uses("let v = my_src[0][0];", Target::Wgsl, &[image("src")]);
        assert_eq!(out, "let v = my_src[0][0];");
    }

    #[test]
    fn test_buffer_forms() {
        let body = "dst[grayu] = dst[grayu] + 1.0;";
        assert_eq!(rewrite_uses(body, Target::Wgsl, &[buffer("dst")]), body);
        assert_eq!(
            rewrite_uses(body, Target::Glsl, &[buffer("dst")]),
            "dst.data[grayu] = dst.data[grayu] + 1.0;"
        );
    }

    #[test]
    fn test_uniform_markers() {
        let out = rewrite_uses(
            "var m:u32 = this.uniform.MNK.x; var all = this.uniform.MNK;",
            Target::Wgsl,
            &[],
        );
        assert_eq!(out, "var m:u32 = MNK.x; var all = MNK;");
    }

    #[test]
    fn test_hoist_helpers_and_consts() {
        let body = "function YSize() -> u32{ return u32(g_workgroup_id.y);}\n\
                    const kernel = mat3x3f(1.0,1.0,1.0, 0.0,0.0,0.0, -1.0,-1.0,-1.0);\n\
                    for (var i = 0u; i < 3u; i++) { const k = 2; }\n\
                    dst[YSize()][0] = vec4<f32>(1.0);";
        let out = rewrite(body, Target::Wgsl, &[image("dst")]);

        assert_eq!(out.helpers, vec!["fn YSize() -> u32 { return u32(g_workgroup_id.y);}"]);
        assert_eq!(
            out.consts,
            vec!["const kernel = mat3x3f(1.0,1.0,1.0, 0.0,0.0,0.0, -1.0,-1.0,-1.0);"]
        );
        assert!(out.body.contains("const k = 2;"));
        assert!(!out.body.contains("function"));
        assert!(out.body.contains("textureStore(dst"));
    }

    #[test]
    fn test_helpers_see_parameters() {
        let body = "function sample(x: u32, y: u32) -> vec4<f32> { return src[y][x]; }\nlet p = sample(1u, 2u);";
        let out = rewrite(body, Target::Wgsl, &[image("src")]);
        assert_eq!(
            out.helpers[0],
            "fn sample(x: u32, y: u32) -> vec4<f32> { return textureLoad(src, vec2<i32>(i32(x), i32(y)), 0); }"
        );
    }

    #[test]
    fn test_hoist_shared() {
        let out = rewrite(
            "var<workgroup> tile: array<f32, 64>;\ntile[0] = 1.0;",
            Target::Wgsl,
            &[],
        );
        assert_eq!(out.shared, vec!["var<workgroup> tile: array<f32, 64>;"]);
        assert!(!out.body.contains("workgroup"));

        let out = rewrite("shared float tile[64];\ntile[0] = 1.0;", Target::Glsl, &[]);
        assert_eq!(out.shared, vec!["shared float tile[64];"]);
    }

    #[test]
    fn test_glsl_helper_header() {
        let out = rewrite(
            "function scale(float v) -> float { return v * 2.0; }",
            Target::Glsl,
            &[],
        );
        assert_eq!(out.helpers, vec!["float scale(float v) { return v * 2.0; }"]);
    }
}
