//! Error type shared by the kernel compiler and the resource binder.

use std::fmt;

/// Errors raised while defining, compiling or dispatching a kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    /// Unknown type tag, malformed parameter list or kernel configuration.
    Configuration(String),

    /// The generated (or literal) shader source was rejected.
    ShaderCompile {
        message: String,
        diagnostics: String,
    },

    /// The backend refused to build a pipeline from a compiled module.
    ShaderLink {
        message: String,
        diagnostics: String,
    },

    /// The caller used a kernel handle incorrectly (arity, unknown slot, ...).
    Usage(String),

    /// No compute-capable adapter or device could be obtained.
    BackendUnavailable(String),

    /// The backend failed while executing submitted work or mapping memory.
    Backend(String),
}

impl GpuError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        GpuError::Configuration(msg.into())
    }

    pub fn usage<S: Into<String>>(msg: S) -> Self {
        GpuError::Usage(msg.into())
    }

    pub fn backend<S: Into<String>>(msg: S) -> Self {
        GpuError::Backend(msg.into())
    }

    pub fn compile<S: Into<String>, D: Into<String>>(msg: S, diagnostics: D) -> Self {
        GpuError::ShaderCompile {
            message: msg.into(),
            diagnostics: diagnostics.into(),
        }
    }

    pub fn link<S: Into<String>, D: Into<String>>(msg: S, diagnostics: D) -> Self {
        GpuError::ShaderLink {
            message: msg.into(),
            diagnostics: diagnostics.into(),
        }
    }

    /// Backend diagnostic text attached to compile and link failures.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            GpuError::ShaderCompile { diagnostics, .. } | GpuError::ShaderLink { diagnostics, .. } => {
                Some(diagnostics)
            }
            _ => None,
        }
    }
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            GpuError::ShaderCompile {
                message,
                diagnostics,
            } => {
                write!(f, "shader compile error: {}", message)?;
                if !diagnostics.is_empty() {
                    write!(f, "\n{}", diagnostics)?;
                }
                Ok(())
            }
            GpuError::ShaderLink {
                message,
                diagnostics,
            } => {
                write!(f, "shader link error: {}", message)?;
                if !diagnostics.is_empty() {
                    write!(f, "\n{}", diagnostics)?;
                }
                Ok(())
            }
            GpuError::Usage(msg) => write!(f, "usage error: {}", msg),
            GpuError::BackendUnavailable(msg) => write!(f, "GPU backend unavailable: {}", msg),
            GpuError::Backend(msg) => write!(f, "GPU backend error: {}", msg),
        }
    }
}

impl std::error::Error for GpuError {}

impl From<serde_json::Error> for GpuError {
    fn from(err: serde_json::Error) -> Self {
        GpuError::Configuration(format!("invalid kernel configuration: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, GpuError>;
