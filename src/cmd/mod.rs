pub mod probe;
pub mod scan;
pub mod serve;

use std::sync::Arc;

use anyhow::Result;

use crate::config::AppConfig;
use crate::pipeline::Pipeline;
use crate::render::HelmRenderer;
use crate::runtime::cli::CliRuntime;

/// Wire the helm renderer and the selected runtime CLI into a pipeline.
fn build_pipeline(cfg: &AppConfig) -> Result<Pipeline> {
    let rt = cfg.require_runtime()?;
    let runtime = CliRuntime::new(rt.binary_path.display().to_string(), rt.kind);
    Ok(Pipeline::new(
        Arc::new(HelmRenderer::new(cfg.helm.clone())),
        Arc::new(runtime),
        cfg.pipeline,
    ))
}
