//! webcs - compile pseudo-kernels into GPU compute shaders
//!
//! # Usage
//!
//! ```bash
//! # Print the WGSL generated for a kernel body
//! webcs compile matmul.cs --params A,B,C --config matmul.json
//!
//! # Assemble, validate and print the binding layout
//! webcs check matmul.cs --params A,B,C --target glsl
//!
//! # Reflect the binding layout of a complete shader
//! webcs check-shader blur.wgsl
//!
//! # Show the GPU adapter the runtime would use
//! webcs info
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use std::path::PathBuf;
use std::process;

use webcs_gpu::assembler::{self, KernelSource, ShaderProgram};
use webcs_gpu::{GpuError, KernelConfig, SlotKind, Target};

#[derive(Parser)]
#[command(name = "webcs")]
#[command(version = "0.1.0")]
#[command(about = "Compile WebCS pseudo-kernels to WGSL or GLSL compute shaders", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a kernel body and print the generated shader
    Compile {
        /// Path to the kernel body
        file: PathBuf,

        /// Comma-separated parameter names, in binding order
        #[arg(short, long)]
        params: String,

        /// JSON kernel configuration (local_size, groups, params, target)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Shader dialect; overrides the configuration
        #[arg(short, long, value_enum)]
        target: Option<Dialect>,

        /// Write the shader here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Assemble and validate a kernel body, printing its binding layout
    Check {
        /// Path to the kernel body
        file: PathBuf,

        /// Comma-separated parameter names, in binding order
        #[arg(short, long)]
        params: String,

        /// JSON kernel configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Shader dialect; overrides the configuration
        #[arg(short, long, value_enum)]
        target: Option<Dialect>,

        /// Print the layout as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a complete shader and print the layout recovered from it
    CheckShader {
        /// Path to the shader source
        file: PathBuf,

        /// Shader dialect
        #[arg(short, long, value_enum, default_value = "wgsl")]
        target: Dialect,

        /// Print the layout as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the GPU adapter the runtime would use
    Info,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Dialect {
    Wgsl,
    Glsl,
}

impl From<Dialect> for Target {
    fn from(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Wgsl => Target::Wgsl,
            Dialect::Glsl => Target::Glsl,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if cli.verbose {
        webcs_gpu::logging::init_with_level(LevelFilter::Debug);
    } else {
        webcs_gpu::logging::init_from_env();
    }

    let result = match cli.command {
        Commands::Compile { file, params, config, target, output } => {
            compile_file(file, &params, config, target, output)
        }
        Commands::Check { file, params, config, target, json } => {
            check_file(file, &params, config, target, json)
        }
        Commands::CheckShader { file, target, json } => check_shader(file, target, json),
        Commands::Info => show_info(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        if let Some(diagnostics) = e.diagnostics() {
            eprintln!("{}", diagnostics);
        }
        process::exit(1);
    }
}

fn read_source(path: &PathBuf) -> Result<String, GpuError> {
    std::fs::read_to_string(path)
        .map_err(|e| GpuError::config(format!("cannot read {}: {}", path.display(), e)))
}

fn load_config(path: Option<PathBuf>, target: Option<Dialect>) -> Result<KernelConfig, GpuError> {
    let mut config = match path {
        Some(path) => KernelConfig::from_json(&read_source(&path)?)?,
        None => KernelConfig::default(),
    };
    if let Some(target) = target {
        config.target = target.into();
    }
    Ok(config)
}

fn build_program(
    file: PathBuf,
    params: &str,
    config: Option<PathBuf>,
    target: Option<Dialect>,
) -> Result<ShaderProgram, GpuError> {
    let body = read_source(&file)?;
    let config = load_config(config, target)?;
    assembler::compile(&KernelSource::body(params, body), &config)
}

fn compile_file(
    file: PathBuf,
    params: &str,
    config: Option<PathBuf>,
    target: Option<Dialect>,
    output: Option<PathBuf>,
) -> Result<(), GpuError> {
    let program = build_program(file, params, config, target)?;
    match output {
        Some(path) => std::fs::write(&path, &program.source)
            .map_err(|e| GpuError::config(format!("cannot write {}: {}", path.display(), e))),
        None => {
            print!("{}", program.source);
            Ok(())
        }
    }
}

fn check_file(
    file: PathBuf,
    params: &str,
    config: Option<PathBuf>,
    target: Option<Dialect>,
    json: bool,
) -> Result<(), GpuError> {
    let program = build_program(file, params, config, target)?;
    print_layout(&program, json);
    Ok(())
}

fn check_shader(file: PathBuf, target: Dialect, json: bool) -> Result<(), GpuError> {
    let text = read_source(&file)?;
    let config = KernelConfig::default().target(target.into());
    let program = assembler::compile(&KernelSource::literal(text), &config)?;
    print_layout(&program, json);
    Ok(())
}

fn print_layout(program: &ShaderProgram, json: bool) {
    let layout = &program.layout;
    if json {
        let params: Vec<_> = layout
            .params
            .iter()
            .map(|slot| {
                let (kind, format, access) = match slot.kind {
                    SlotKind::Buffer(_) => ("buffer", None, Some("read_write")),
                    SlotKind::Texture { format, access, .. } => {
                        ("texture", Some(format.wgsl_token()), Some(access.name()))
                    }
                };
                serde_json::json!({
                    "name": slot.name,
                    "binding": slot.index,
                    "kind": kind,
                    "type": slot.kind.param_type().canonical_tag(),
                    "format": format,
                    "access": access,
                })
            })
            .collect();
        let uniforms: Vec<_> = layout
            .uniforms
            .iter()
            .map(|slot| {
                serde_json::json!({
                    "name": slot.name,
                    "binding": slot.index,
                    "type": slot.wgsl_type(),
                })
            })
            .collect();
        let report = serde_json::json!({
            "target": program.target.name(),
            "workgroup_size": layout.workgroup_size,
            "params": params,
            "uniforms": uniforms,
        });
        println!("{:#}", report);
        return;
    }

    println!("✓ {} program is valid", program.target);
    println!("  workgroup size: {:?}", layout.workgroup_size);
    println!("  group 0 (parameters):");
    for slot in &layout.params {
        match slot.kind {
            SlotKind::Buffer(ty) => println!(
                "    @binding({}) {:<12} {} buffer",
                slot.index,
                slot.name,
                ty.canonical_tag()
            ),
            SlotKind::Texture { format, access, .. } => println!(
                "    @binding({}) {:<12} {} texture, {}",
                slot.index,
                slot.name,
                format.wgsl_token(),
                access.name()
            ),
        }
    }
    if !layout.uniforms.is_empty() {
        println!("  group 1 (uniforms):");
        for slot in &layout.uniforms {
            println!("    @binding({}) {:<12} {}", slot.index, slot.name, slot.wgsl_type());
        }
    }
}

fn show_info() -> Result<(), GpuError> {
    let gpu = webcs_gpu::ComputeContext::new(webcs_gpu::ContextOptions::default())?;
    let info = gpu.adapter_info();
    println!("webcs v{}", env!("CARGO_PKG_VERSION"));
    println!("  adapter:  {}", info.name);
    println!("  backend:  {:?}", info.backend);
    println!("  device:   {:?}", info.device_type);
    println!("  driver:   {} {}", info.driver, info.driver_info);
    println!("  f64:      {}", if gpu.supports_f64() { "yes" } else { "no" });
    let (width, height) = gpu.render_size();
    println!("  render target: {}x{}", width, height);
    Ok(())
}
