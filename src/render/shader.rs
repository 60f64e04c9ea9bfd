use std::{
    borrow::Cow,
    fmt,
    path::PathBuf,
};

use bevy::log::{
    debug,
    error,
    warn,
};

use crate::error::{
    SplatError,
    SplatResult,
};


pub const SPLAT_SHADER: &str = include_str!("gaussian_splats.wgsl");
pub const COMPOSE_SHADER: &str = include_str!("compose.wgsl");
pub const DEPTH_KEY_SHADER: &str = include_str!("../sort/depth_key.wgsl");
pub const RADIX_SHADER: &str = include_str!("../sort/radix.wgsl");


#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
)]
pub enum DiagnosticKind {
    Error,
    Warning,
    Info,
}


/// one compiler message, with 1-based line/column when the compiler
/// reported a location (0 otherwise)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilationDiagnostic {
    pub kind: DiagnosticKind,
    pub line_num: u32,
    pub line_pos: u32,
    pub message: String,
}

impl CompilationDiagnostic {
    pub fn is_error(&self) -> bool {
        self.kind == DiagnosticKind::Error
    }
}

impl From<&wgpu::CompilationMessage> for CompilationDiagnostic {
    fn from(message: &wgpu::CompilationMessage) -> Self {
        let kind = match message.message_type {
            wgpu::CompilationMessageType::Error => DiagnosticKind::Error,
            wgpu::CompilationMessageType::Warning => DiagnosticKind::Warning,
            wgpu::CompilationMessageType::Info => DiagnosticKind::Info,
        };

        let (line_num, line_pos) = message.location
            .as_ref()
            .map(|location| (location.line_number, location.line_position))
            .unwrap_or((0, 0));

        Self {
            kind,
            line_num,
            line_pos,
            message: message.message.clone(),
        }
    }
}

impl fmt::Display for CompilationDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {}:{}: {}",
            self.kind,
            self.line_num,
            self.line_pos,
            self.message,
        )
    }
}


/// where a wgsl program comes from at initialization time
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShaderSource {
    Embedded(&'static str),
    Path(PathBuf),
}

impl ShaderSource {
    pub fn load(&self, name: &'static str) -> SplatResult<Cow<'static, str>> {
        match self {
            Self::Embedded(source) => Ok(Cow::Borrowed(source)),
            Self::Path(path) => std::fs::read_to_string(path)
                .map(Cow::Owned)
                .map_err(|source| SplatError::ShaderFetch {
                    name,
                    path: path.clone(),
                    source,
                }),
        }
    }
}


/// the two programs the splat pipeline loads during initialization
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplatShaderSources {
    pub splat: ShaderSource,
    pub depth_key: ShaderSource,
}

impl Default for SplatShaderSources {
    fn default() -> Self {
        Self {
            splat: ShaderSource::Embedded(SPLAT_SHADER),
            depth_key: ShaderSource::Embedded(DEPTH_KEY_SHADER),
        }
    }
}


pub struct CompiledShader {
    pub module: wgpu::ShaderModule,
    pub diagnostics: Vec<CompilationDiagnostic>,
}


/// compiles `source`, logging every compiler message.
///
/// only error diagnostics fail the compilation; warnings are returned to the
/// caller alongside the module.
pub async fn compile_shader(
    device: &wgpu::Device,
    name: &'static str,
    source: &str,
) -> SplatResult<CompiledShader> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(name),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
    });

    let info = module.get_compilation_info().await;
    let scope_error = device.pop_error_scope().await;

    let diagnostics: Vec<CompilationDiagnostic> = info.messages
        .iter()
        .map(CompilationDiagnostic::from)
        .collect();

    for diagnostic in &diagnostics {
        match diagnostic.kind {
            DiagnosticKind::Error => error!(shader = name, "{diagnostic}"),
            DiagnosticKind::Warning => warn!(shader = name, "{diagnostic}"),
            DiagnosticKind::Info => debug!(shader = name, "{diagnostic}"),
        }
    }

    if diagnostics.iter().any(CompilationDiagnostic::is_error) {
        return Err(SplatError::ShaderCompilation {
            name,
            diagnostics,
        });
    }

    if let Some(scope_error) = scope_error {
        return Err(SplatError::Validation {
            stage: name,
            message: scope_error.to_string(),
        });
    }

    Ok(CompiledShader {
        module,
        diagnostics,
    })
}
