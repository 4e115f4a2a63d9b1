use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("failed to open audio file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("failed to decode audio file {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("audio file {} contains no samples", path.display())]
    Empty { path: PathBuf },
    #[error("unsupported sample format in {}: {detail}", path.display())]
    Format { path: PathBuf, detail: String },
    #[error("spectrum size {0} must be a power of two and at least 2")]
    InvalidBins(usize),
    #[error("audio loader for {} stopped before finishing", path.display())]
    Disconnected { path: PathBuf },
}

impl MediaError {
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            MediaError::Open { path, .. }
            | MediaError::Decode { path, .. }
            | MediaError::Empty { path }
            | MediaError::Format { path, .. }
            | MediaError::Disconnected { path } => Some(path),
            MediaError::InvalidBins(_) => None,
        }
    }
}
