use std::path::PathBuf;

use thiserror::Error;

use crate::render::shader::CompilationDiagnostic;


pub type SplatResult<T> = Result<T, SplatError>;


#[derive(Error, Debug)]
pub enum SplatError {
    #[error("no compatible gpu adapter found")]
    NoAdapter,

    #[error("failed to request gpu device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("failed to read shader `{name}` from {path:?}: {source}")]
    ShaderFetch {
        name: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("shader `{name}` failed to compile ({} diagnostic(s))", .diagnostics.len())]
    ShaderCompilation {
        name: &'static str,
        diagnostics: Vec<CompilationDiagnostic>,
    },

    #[error("gpu validation failed during {stage}: {message}")]
    Validation {
        stage: &'static str,
        message: String,
    },

    #[error("invalid render target: {0}")]
    InvalidTarget(String),

    #[error("splat pipeline is not initialized")]
    NotInitialized,

    #[error("loaded splat count {loaded} exceeds declared total {total}")]
    DatasetOverflow {
        loaded: usize,
        total: usize,
    },

    #[error("host {attribute} array holds {available} splats, {required} required")]
    HostDataTruncated {
        attribute: &'static str,
        available: usize,
        required: usize,
    },

    #[error("upload of {attribute} bytes {start}..{end} exceeds buffer size {size}")]
    UploadOutOfBounds {
        attribute: &'static str,
        start: u64,
        end: u64,
        size: u64,
    },

    #[error("radix sort bit count {0} must be a positive multiple of 8 no larger than 32")]
    InvalidBitCount(u32),

    #[error("sort capacity {capacity} cannot hold {count} entries")]
    SortCapacity {
        count: u32,
        capacity: u32,
    },
}
