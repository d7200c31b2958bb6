use std::path::Path;
use std::process::{Command, Output, Stdio};

use crate::error::{Result, ScanError};

/// Expands a chart into rendered manifest text.
pub trait ChartRenderer: Send + Sync {
    fn render(&self, chart: &Path) -> Result<String>;
}

/// Renders charts with `helm template`.
pub struct HelmRenderer {
    cmd: String,
}

impl HelmRenderer {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }
}

impl ChartRenderer for HelmRenderer {
    fn render(&self, chart: &Path) -> Result<String> {
        let output = Command::new(&self.cmd)
            .arg("template")
            .arg(chart)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ScanError::Render {
                message: format!("failed to run '{} template': {e}", self.cmd),
                stderr: String::new(),
            })?;
        finish_render(output)
    }
}

fn finish_render(output: Output) -> Result<String> {
    if !output.status.success() {
        return Err(ScanError::Render {
            message: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
