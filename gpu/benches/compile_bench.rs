//! Benchmarks for the kernel compile pipeline (analysis, rewrite, naga validation)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use webcs_gpu::analyzer::parse_param_list;
use webcs_gpu::assembler::assemble;
use webcs_gpu::{KernelConfig, Target};

const MATMUL: &str = r#"
    var mnk:vec4u = this.uniform.MNK;
    var N:u32 = mnk.y;
    var K:u32 = mnk.z;
    var sum:f32 = 0.0;
    for (var k:u32 = 0u; k < K; k = k+1u) {
        sum = sum + A[thread.y * K + k] * B[k * N + thread.x];
    }
    C[thread.y*N + thread.x] = sum;
"#;

/// A body touching `taps` texels of `src`, to stress the subscript rewriter.
fn generate_stencil(taps: usize) -> String {
    let mut body = String::from("var sum:vec4<f32> = vec4<f32>(0.0);\n");
    for i in 0..taps {
        body.push_str(&format!(
            "sum = sum + src[thread.y + {}u][thread.x + {}u];\n",
            i % 7,
            i / 7
        ));
    }
    body.push_str(&format!("dst[thread.y][thread.x] = sum / {}.0;\n", taps.max(1)));
    body
}

fn bench_matmul(c: &mut Criterion) {
    let params = parse_param_list("A, B, C");
    let mut group = c.benchmark_group("matmul");
    for target in [Target::Wgsl, Target::Glsl] {
        let config = KernelConfig::new([8, 8, 1])
            .param("A", "float[]")
            .param("B", "float[]")
            .param("C", "float[]")
            .target(target);
        group.bench_with_input(BenchmarkId::from_parameter(target), &config, |b, config| {
            b.iter(|| assemble(black_box(&params), black_box(MATMUL), config).unwrap())
        });
    }
    group.finish();
}

fn bench_stencil(c: &mut Criterion) {
    let params = parse_param_list("src, dst");
    let config = KernelConfig::new([8, 8, 1])
        .param("src", "texture")
        .param("dst", "texture");
    let mut group = c.benchmark_group("stencil");
    for taps in [9, 49, 196] {
        let body = generate_stencil(taps);
        group.bench_with_input(BenchmarkId::from_parameter(taps), &body, |b, body| {
            b.iter(|| assemble(black_box(&params), black_box(body), &config).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_matmul, bench_stencil);
criterion_main!(benches);
