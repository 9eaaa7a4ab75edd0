//! The demo kernels shipped with WebCS must assemble into programs naga accepts.

use webcs_gpu::{
    assembler::assemble, AccessMode, KernelConfig, KernelSource, ScalarKind, SlotKind, Target,
};

const SMM_NAIVE: &str = r#"
    // C[M, N] = A[M, K] * B[K, N]
    var A:array<f32>;
    var mnk:vec4u = this.uniform.MNK;
    var M:u32 = mnk.x;
    var N:u32 = mnk.y;
    var K:u32 = mnk.z;
    var sum:f32 = 0.0;
    for (var k:u32 = 0u; k < K; k = k+1u)
    {
        sum = sum + A[thread.y * K + k] * B[k * N + thread.x];
    }
    C[thread.y*N + thread.x] = sum;
"#;

const TEXCOPY: &str = r#"
    dst[thread.y][thread.x] = src[thread.y][thread.x];
"#;

const TEXTURE: &str = r#"
    var pos:vec2<u32> = vec2<u32>(thread.xy);
    var x : f32 = f32(thread.x);
    var y : f32 = f32(thread.y);
    dst[thread.y][thread.x] =  vec4<f32>(x / (y+1.0+x), y / (y+1.0+x),  0.0, 1.0);
"#;

const TEXTURE2: &str = r#"
    var pos:vec2<u32> = vec2<u32>(thread.xy);
    // vec4 pixel = imageLoad(src, pos); or vec4 pixel = src[pos]
    var pixel:vec4<f32> = src[pos.y][pos.x];
    var invert:vec4<f32> = vec4<f32>(1.0 - pixel.x, 1.0 - pixel.y, 1.0 - pixel.z, 1.0);
    dst[pos.y][pos.x] = invert;
"#;

const IMG_DWT: &str = r#"
    function  YSize() -> u32{ return u32(g_workgroup_id.y*g_num_workgroups.y);}
    function  XSize() -> u32{ return u32(g_workgroup_id.x*g_num_workgroups.x);}
    var x:u32 = u32(thread.x);
    var y:u32 = u32(thread.y);
    var p00: vec4<f32> = src[2u*y + 0u][2u*x + 0u];
    var p01: vec4<f32> = src[2u*y + 0u][2u*x + 1u];
    var p10: vec4<f32> = src[2u*y + 1u][2u*x + 0u];
    var p11: vec4<f32> = src[2u*y + 1u][2u*x + 1u];
    dst[y][x] = (p00 + p01 + p10 + p11) / 4.0;
    dst[y][x + XSize()] = (p00 + p10 - p01 - p11) / 4.0;
    dst[y + YSize()][x] = (p00 + p01 - p10 - p11) / 4.0;
    dst[y + YSize()][x + XSize()] = (p00 + p11 - p01 - p10) / 4.0;
"#;

const HISTOGRAM: &str = r#"
    var pixel:vec4<f32> = src[thread.xy];
    var gray: f32 = 0.2126 * pixel.r + 0.7152 * pixel.g + 0.0722 * pixel.b;
    var grayu:u32 = u32(floor(gray * 255.0));
    grayu = grayu & 255u;
    dst[grayu] = dst[grayu] + 1.0;
    //int ru = int(floor(pixel.r*255.0));
    //dst[ru + 256] = dst[ru+256] + 1.0;
"#;

const REPLACE: &str = r#"
    var pixel : vec4<f32> = src[thread.xy];
    var gray:f32 = 0.2126 * pixel.r + 0.7152 * pixel.g + 0.0722 * pixel.b;
    var grayu:u32 = u32(floor(gray * 255.0));
    grayu = grayu & 255u;
    var new_gray:f32 = histo[grayu];
    var diff_gray:f32 = new_gray - gray;
    var new_pixel:vec4<f32> = vec4(pixel.r + diff_gray * 0.2126, pixel.g + diff_gray * 0.7152, pixel.b + diff_gray * 0.0722, 1.0);
    dst[thread.xy] = new_pixel;
"#;

const FILTER: &str = r#"
    const kernel = mat3x3f(
        1.0,1.0,1.0,
        0.0,0.0,0.0,
        -1.0,-1.0,-1.0);
    var weights:mat3x3f = kernel;
    var pos:vec2<u32> = vec2<u32>(thread.xy);
    var sum:vec4<f32> = vec4<f32>(0.0,0.0,0.0,1.0);
    for(var j:u32=0; j<3; j++){
        for(var i:u32=0; i<3; i++){
            let pixel = src[pos.y + j -1][pos.x + i -1];
            sum = sum + pixel * weights[j][i];
        }
    }
    dst[pos.y][pos.x] = sum;
"#;

fn images() -> KernelConfig {
    KernelConfig::new([8, 8, 1])
        .groups([64, 64, 1])
        .param("src", "texture")
        .param("dst", "texture")
}

fn build(params: &str, body: &str, config: &KernelConfig) -> webcs_gpu::ShaderProgram {
    let KernelSource::Body { params, body } = KernelSource::body(params, body) else {
        unreachable!()
    };
    match assemble(&params, &body, config) {
        Ok(program) => program,
        Err(e) => panic!(
            "kernel should assemble, got: {}\n{}",
            e,
            e.diagnostics().unwrap_or_default()
        ),
    }
}

#[test]
fn test_smm_naive() {
    let config = KernelConfig::new([8, 8, 1]).groups([8, 8, 1]);
    let program = build("A, B, C", SMM_NAIVE, &config);

    let names: Vec<&str> = program.layout.params.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["A", "B", "C"]);
    assert!(program
        .layout
        .params
        .iter()
        .all(|p| matches!(p.kind, SlotKind::Buffer(_))));
    assert_eq!(program.layout.uniforms.len(), 1);
    assert_eq!(program.layout.uniforms[0].name, "MNK");
    assert_eq!(program.layout.uniforms[0].kind, ScalarKind::U32);
    assert!(program.source.contains("@group(1) @binding(0) var<uniform> MNK: vec4<u32>;"));
    assert!(!program.source.contains("this.uniform"));
}

#[test]
fn test_texcopy() {
    let config = KernelConfig::new([8, 8, 1])
        .param("src", "[][]")
        .param("dst", "[][]");
    let program = build("src, dst", TEXCOPY, &config);
    assert!(matches!(
        program.layout.params[0].kind,
        SlotKind::Texture { access: AccessMode::ReadOnly, .. }
    ));
    assert!(matches!(
        program.layout.params[1].kind,
        SlotKind::Texture { access: AccessMode::WriteOnly, .. }
    ));
    assert!(program.source.contains("textureStore(dst"));
    assert!(program.source.contains("textureLoad(src"));
}

#[test]
fn test_texture_gradient() {
    let config = KernelConfig::new([8, 8, 1]).param("dst", "texture");
    let program = build("dst", TEXTURE, &config);
    assert_eq!(program.layout.params.len(), 1);
    assert!(program.source.contains("texture_storage_2d<rgba8unorm, write>"));
}

#[test]
fn test_texture2_with_rgba8_destination() {
    let config = KernelConfig::new([8, 8, 1])
        .param("src", "[][]")
        .param("dst", "rgba8[][]");
    build("src, dst", TEXTURE2, &config);
}

#[test]
fn test_img_texture() {
    build("src, dst", TEXTURE2, &images());
}

#[test]
fn test_img_dwt_hoists_helpers() {
    let program = build("src, dst", IMG_DWT, &images());
    assert!(program.source.contains("fn YSize() -> u32"));
    assert!(program.source.contains("fn XSize() -> u32"));
    assert!(!program.source.contains("function"));
}

#[test]
fn test_histogram() {
    let config = KernelConfig::new([8, 8, 1])
        .param("src", "texture")
        .param("dst", "float[]");
    let program = build("src, dst", HISTOGRAM, &config);
    assert!(matches!(program.layout.params[1].kind, SlotKind::Buffer(_)));
    assert!(!program.source.contains("ru + 256"));
}

#[test]
fn test_replace() {
    let config = KernelConfig::new([8, 8, 1])
        .param("src", "texture")
        .param("dst", "texture")
        .param("histo", "float[]");
    let program = build("src, dst, histo", REPLACE, &config);
    assert_eq!(program.layout.params[2].index, 2);
}

#[test]
fn test_filter_hoists_const() {
    let program = build("src, dst", FILTER, &images());
    let const_at = program.source.find("const kernel").unwrap();
    let body_at = program.source.find("fn csmain").unwrap();
    assert!(const_at < body_at);
}

#[test]
fn test_texcopy_in_glsl() {
    let config = KernelConfig::new([8, 8, 1])
        .param("src", "[][]")
        .param("dst", "[][]")
        .target(Target::Glsl);
    let program = build("src, dst", TEXCOPY, &config);
    assert!(program.source.starts_with("#version 450"));
    assert!(program.source.contains("imageStore(dst"));
}
