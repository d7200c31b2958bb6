use anyhow::Result;

use crate::config::AppConfig;
use crate::server;

pub async fn run(cfg: &AppConfig) -> Result<()> {
    let pipeline = super::build_pipeline(cfg)?;
    if let Some(rt) = &cfg.runtime {
        tracing::info!(
            runtime = %rt.kind,
            binary = %rt.binary_path.display(),
            helm = %cfg.helm,
            concurrency = cfg.pipeline.concurrency,
            "scan pipeline ready"
        );
    }
    server::serve(cfg.listen, pipeline).await
}
