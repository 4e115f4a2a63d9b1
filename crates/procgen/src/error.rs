use std::path::PathBuf;

/// Failures that abort a sketch before its first frame.
///
/// Every variant names the asset, program, target, or pass that failed so the
/// caller can print a single diagnostic and exit.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("failed to load asset {}: {reason}", path.display())]
    Asset { path: PathBuf, reason: String },
    #[error("program '{program}' is invalid: {reason}")]
    Program { program: String, reason: String },
    #[error("program '{program}' failed to compile: {message}")]
    Compile { program: String, message: String },
    #[error("render target '{target}' is invalid: {reason}")]
    Target { target: String, reason: String },
    #[error("pass graph is invalid: {0}")]
    Graph(String),
    #[error("sketch requires the {required} backend but {available} was supplied")]
    BackendMismatch {
        required: &'static str,
        available: &'static str,
    },
    #[error("sketch setup failed: {0}")]
    Sketch(String),
    #[error("backend failure during setup: {0}")]
    Backend(String),
}

/// Failures raised while rendering a frame.
///
/// Transient data gaps (missing audio, collapsed remap ranges) never surface
/// here; they are absorbed with neutral values. What remains are draw calls
/// that cannot be honoured and backend faults.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("unknown render target #{0}")]
    UnknownTarget(usize),
    #[error("unknown program #{0}")]
    UnknownProgram(usize),
    #[error("unknown geometry #{0}")]
    UnknownGeometry(usize),
    #[error("draw with program '{program}' rejected: {reason}")]
    InvalidDraw { program: String, reason: String },
    #[error("feedback target '{0}' keeps the previous frame and cannot be cleared")]
    FeedbackClear(String),
    #[error("pass '{pass}' samples '{target}' without declaring it as a read")]
    UndeclaredRead { pass: String, target: String },
    #[error("pixel upload to target '{target}' rejected: {reason}")]
    InvalidUpload { target: String, reason: String },
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
    #[error("backend failure: {0}")]
    Backend(String),
}
