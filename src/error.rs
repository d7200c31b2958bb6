use thiserror::Error;

/// Errors produced while scanning a chart for images.
///
/// Each variant corresponds to one pipeline stage so callers can tell a broken
/// chart apart from an unreachable image.
#[derive(Error, Debug)]
pub enum ScanError {
    /// The chart path was blank or does not point at a directory
    #[error("{0}")]
    InvalidInput(String),

    /// The chart renderer could not be launched or exited non-zero. `stderr`
    /// holds the renderer's diagnostics exactly as written.
    #[error("failed to render Helm chart: {message}, stderr: {}", .stderr.trim())]
    Render { message: String, stderr: String },

    /// Rendered manifests could not be parsed for image references
    #[error("failed to parse images from output: {0}")]
    Parse(String),

    /// The runtime could not pull the image
    #[error("failed to pull image {image}: {cause}")]
    Pull { image: String, cause: String },

    /// The image was pulled but its metadata could not be read
    #[error("failed to inspect image {image}: {cause}")]
    Inspect { image: String, cause: String },

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// A worker task panicked or was cancelled
    #[error("internal error: {0}")]
    Internal(String),
}

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Render,
    Parse,
    Pull,
    Inspect,
    Config,
    Internal,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Validate => "validate",
            Stage::Render => "render",
            Stage::Parse => "parse",
            Stage::Pull => "pull",
            Stage::Inspect => "inspect",
            Stage::Config => "config",
            Stage::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl ScanError {
    pub fn stage(&self) -> Stage {
        match self {
            ScanError::InvalidInput(_) => Stage::Validate,
            ScanError::Render { .. } => Stage::Render,
            ScanError::Parse(_) => Stage::Parse,
            ScanError::Pull { .. } => Stage::Pull,
            ScanError::Inspect { .. } => Stage::Inspect,
            ScanError::Config(_) => Stage::Config,
            ScanError::Internal(_) => Stage::Internal,
        }
    }

    /// Whether the caller supplied bad input (as opposed to a server-side failure).
    pub fn is_client_error(&self) -> bool {
        matches!(self, ScanError::InvalidInput(_))
    }

    /// The image reference a resolver error is about, if any.
    pub fn image(&self) -> Option<&str> {
        match self {
            ScanError::Pull { image, .. } | ScanError::Inspect { image, .. } => {
                Some(image.as_str())
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
