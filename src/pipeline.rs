//! Render a chart, extract its image references and resolve each one.
//!
//! A run either returns a complete [`Report`] or the first error it hit. No
//! partial report is ever produced.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{Result, ScanError};
use crate::extract::{self, ExtractMode};
use crate::render::ChartRenderer;
use crate::report::{ImageRecord, Report};
use crate::resolve::resolve;
use crate::runtime::ImageRuntime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub extract_mode: ExtractMode,

    /// Resolve each distinct reference once instead of once per occurrence
    pub dedupe: bool,

    /// Maximum number of images resolved at the same time
    pub concurrency: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            extract_mode: ExtractMode::Lines,
            dedupe: true,
            concurrency: 1,
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    renderer: Arc<dyn ChartRenderer>,
    runtime: Arc<dyn ImageRuntime>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        renderer: Arc<dyn ChartRenderer>,
        runtime: Arc<dyn ImageRuntime>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            renderer,
            runtime,
            options,
        }
    }

    /// Run the whole pipeline against a local chart directory.
    pub async fn run(&self, chart: &Path) -> Result<Report> {
        let manifest = self.render(chart).await?;

        let mut images = extract::extract(&manifest, self.options.extract_mode)?;
        let found = images.len();
        if self.options.dedupe {
            images = dedupe(images);
        }
        tracing::info!(
            chart = %chart.display(),
            found,
            distinct = images.len(),
            "extracted image references"
        );

        let records = if self.options.concurrency <= 1 {
            self.resolve_sequential(images).await?
        } else {
            self.resolve_concurrent(images).await?
        };
        Ok(Report::assemble(records))
    }

    async fn render(&self, chart: &Path) -> Result<String> {
        tracing::info!(chart = %chart.display(), "rendering chart");
        let renderer = self.renderer.clone();
        let chart: PathBuf = chart.to_path_buf();
        let manifest = tokio::task::spawn_blocking(move || renderer.render(&chart))
            .await
            .map_err(|e| ScanError::Internal(format!("renderer task failed: {e}")))?
            .inspect_err(|e| tracing::warn!(error = %e, "chart render failed"))?;
        tracing::debug!(bytes = manifest.len(), "chart rendered");
        Ok(manifest)
    }

    /// One image at a time, stopping at the first failure in extraction order.
    async fn resolve_sequential(&self, images: Vec<String>) -> Result<Vec<ImageRecord>> {
        let mut records = Vec::with_capacity(images.len());
        for image in images {
            let runtime = self.runtime.clone();
            let record = tokio::task::spawn_blocking(move || resolve(runtime.as_ref(), &image))
                .await
                .map_err(|e| ScanError::Internal(format!("resolver task failed: {e}")))?
                .inspect_err(|e| tracing::warn!(error = %e, "image resolution failed"))?;
            records.push(record);
        }
        Ok(records)
    }

    /// Up to `concurrency` images at a time. The first failure observed aborts
    /// the run; it is not necessarily the first failing image in order.
    /// Resolutions already running on blocking threads finish in the background
    /// and their results are dropped.
    async fn resolve_concurrent(&self, images: Vec<String>) -> Result<Vec<ImageRecord>> {
        let limit = self
            .options
            .concurrency
            .min(images.len())
            .clamp(1, Semaphore::MAX_PERMITS);
        let permits = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();

        for (index, image) in images.iter().cloned().enumerate() {
            let permits = permits.clone();
            let runtime = self.runtime.clone();
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| ScanError::Internal(e.to_string()))?;
                let record = tokio::task::spawn_blocking(move || resolve(runtime.as_ref(), &image))
                    .await
                    .map_err(|e| ScanError::Internal(format!("resolver task failed: {e}")))??;
                Ok::<_, ScanError>((index, record))
            });
        }

        let mut slots: Vec<Option<ImageRecord>> = vec![None; images.len()];
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| ScanError::Internal(format!("resolver task failed: {e}")))
                .and_then(|r| r);
            match outcome {
                Ok((index, record)) => slots[index] = Some(record),
                Err(e) => {
                    tracing::warn!(error = %e, "image resolution failed, aborting run");
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }
        Ok(slots.into_iter().flatten().collect())
    }
}

/// Drop repeated references, keeping the first occurrence of each.
pub fn dedupe(images: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    images
        .into_iter()
        .filter(|image| seen.insert(extract::normalize(image).to_string()))
        .collect()
}

/// Check a caller-supplied chart path before anything is rendered.
pub fn validate_chart_path(chart: &str) -> Result<PathBuf> {
    let chart = chart.trim();
    if chart.is_empty() {
        return Err(ScanError::InvalidInput(
            "chart path is required/cannot be blank".to_string(),
        ));
    }
    let path = PathBuf::from(chart);
    if !path.is_dir() {
        return Err(ScanError::InvalidInput("invalid chart Path provided".to_string()));
    }
    Ok(path)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::{Result, ScanError};
    use crate::render::ChartRenderer;

    /// Renderer returning canned output and counting invocations.
    pub struct FakeRenderer {
        pub output: std::result::Result<String, String>,
        pub calls: AtomicUsize,
    }

    impl FakeRenderer {
        pub fn ok(manifest: &str) -> Self {
            Self {
                output: Ok(manifest.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(stderr: &str) -> Self {
            Self {
                output: Err(stderr.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ChartRenderer for FakeRenderer {
        fn render(&self, _chart: &Path) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.output.clone().map_err(|stderr| ScanError::Render {
                message: "exit status: 1".to_string(),
                stderr,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeRenderer;
    use super::*;
    use crate::error::Stage;
    use crate::resolve::testing::FakeRuntime;

    const ONE_DEPLOYMENT: &str = "kind: Deployment\nspec:\n  template:\n    spec:\n      containers:\n        - name: hello-world\n          image: \"nginx:1.16.0\"\n";

    fn pipeline(renderer: FakeRenderer, runtime: FakeRuntime, options: PipelineOptions) -> Pipeline {
        Pipeline::new(Arc::new(renderer), Arc::new(runtime), options)
    }

    #[tokio::test]
    async fn test_single_deployment_chart() {
        let p = pipeline(
            FakeRenderer::ok(ONE_DEPLOYMENT),
            FakeRuntime::with(&[("nginx:1.16.0", 126_322_476, 3)]),
            PipelineOptions::default(),
        );
        let report = p.run(Path::new("charts/hello-world")).await.unwrap();
        assert_eq!(report.images.len(), 1);
        assert_eq!(report.images[0].name, "nginx:1.16.0");
        assert!(report.images.iter().all(|i| i.size > 0));
    }

    #[tokio::test]
    async fn test_no_images_is_empty_report() {
        let p = pipeline(
            FakeRenderer::ok("kind: Service\n"),
            FakeRuntime::default(),
            PipelineOptions::default(),
        );
        assert!(p.run(Path::new("chart")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_render_failure_surfaces_stderr() {
        let renderer = Arc::new(FakeRenderer::failing("Error: Chart.yaml file is missing"));
        let runtime = Arc::new(FakeRuntime::with(&[("nginx:1.16.0", 1, 1)]));
        let p = Pipeline::new(renderer.clone(), runtime.clone(), PipelineOptions::default());

        let err = p.run(Path::new("broken")).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Render);
        assert!(err.to_string().contains("Chart.yaml file is missing"));
        assert_eq!(renderer.calls(), 1);
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sequential_fail_fast_on_first_in_order() {
        let manifest = "image: a:1\nimage: missing:1\nimage: b:1\n";
        let runtime = Arc::new(FakeRuntime::with(&[("a:1", 5, 1), ("b:1", 5, 1)]));
        let p = Pipeline::new(
            Arc::new(FakeRenderer::ok(manifest)),
            runtime.clone(),
            PipelineOptions::default(),
        );

        let err = p.run(Path::new("chart")).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Pull);
        assert_eq!(err.image(), Some("missing:1"));
        // b:1 was never attempted
        assert!(!runtime.calls().iter().any(|c| c.contains("b:1")));
    }

    #[tokio::test]
    async fn test_inspect_failure_names_stage() {
        let mut runtime = FakeRuntime::with(&[("a:1", 5, 1)]);
        runtime.broken_inspect.push("a:1".to_string());
        let p = pipeline(FakeRenderer::ok("image: a:1\n"), runtime, PipelineOptions::default());

        let err = p.run(Path::new("chart")).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Inspect);
        assert_eq!(err.image(), Some("a:1"));
    }

    #[tokio::test]
    async fn test_dedupe_resolves_each_image_once() {
        let manifest = "image: \"b:1\"\nimage: a:1\nimage: b:1\n";
        let runtime = Arc::new(FakeRuntime::with(&[("a:1", 5, 1), ("b:1", 7, 2)]));
        let p = Pipeline::new(
            Arc::new(FakeRenderer::ok(manifest)),
            runtime.clone(),
            PipelineOptions::default(),
        );

        let report = p.run(Path::new("chart")).await.unwrap();
        let names: Vec<_> = report.images.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["b:1", "a:1"]);
        assert_eq!(runtime.calls().iter().filter(|c| *c == "pull b:1").count(), 1);
    }

    #[tokio::test]
    async fn test_keep_duplicates_resolves_every_occurrence() {
        let options = PipelineOptions {
            dedupe: false,
            ..Default::default()
        };
        let p = pipeline(
            FakeRenderer::ok("image: b:1\nimage: b:1\n"),
            FakeRuntime::with(&[("b:1", 7, 2)]),
            options,
        );
        assert_eq!(p.run(Path::new("chart")).await.unwrap().images.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_keeps_extraction_order() {
        let manifest = "image: c:1\nimage: a:1\nimage: d:1\nimage: b:1\n";
        let options = PipelineOptions {
            concurrency: 3,
            ..Default::default()
        };
        let p = pipeline(
            FakeRenderer::ok(manifest),
            FakeRuntime::with(&[("a:1", 1, 1), ("b:1", 2, 1), ("c:1", 3, 1), ("d:1", 4, 1)]),
            options,
        );
        let report = p.run(Path::new("chart")).await.unwrap();
        let names: Vec<_> = report.images.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["c:1", "a:1", "d:1", "b:1"]);
    }

    #[tokio::test]
    async fn test_concurrent_failure_returns_no_report() {
        let manifest = "image: a:1\nimage: nope:1\nimage: b:1\n";
        let options = PipelineOptions {
            concurrency: 4,
            ..Default::default()
        };
        let p = pipeline(
            FakeRenderer::ok(manifest),
            FakeRuntime::with(&[("a:1", 1, 1), ("b:1", 2, 1)]),
            options,
        );
        let err = p.run(Path::new("chart")).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Pull);
        assert_eq!(err.image(), Some("nope:1"));
    }

    #[tokio::test]
    async fn test_oversized_concurrency_is_bounded() {
        let options = PipelineOptions {
            concurrency: usize::MAX,
            ..Default::default()
        };
        let p = pipeline(
            FakeRenderer::ok("image: a:1\nimage: b:1\n"),
            FakeRuntime::with(&[("a:1", 1, 1), ("b:1", 2, 1)]),
            options,
        );
        let report = p.run(Path::new("chart")).await.unwrap();
        assert_eq!(report.images.len(), 2);
    }

    #[tokio::test]
    async fn test_structured_mode_parse_error() {
        let options = PipelineOptions {
            extract_mode: ExtractMode::Structured,
            ..Default::default()
        };
        let p = pipeline(
            FakeRenderer::ok("spec: [unclosed\n"),
            FakeRuntime::default(),
            options,
        );
        let err = p.run(Path::new("chart")).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Parse);
    }

    #[test]
    fn test_dedupe_normalizes_quotes() {
        let out = dedupe(vec!["\"x:1\"".into(), "x:1".into(), "y:1".into()]);
        assert_eq!(out, vec!["\"x:1\"", "y:1"]);
    }

    #[test]
    fn test_validate_chart_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();
        assert_eq!(validate_chart_path(&format!("  {path} ")).unwrap(), dir.path());

        let blank = validate_chart_path("   ").unwrap_err();
        assert!(blank.is_client_error());
        assert_eq!(blank.to_string(), "chart path is required/cannot be blank");

        let missing = validate_chart_path("invalid-url").unwrap_err();
        assert_eq!(missing.to_string(), "invalid chart Path provided");

        let file = dir.path().join("Chart.yaml");
        std::fs::write(&file, "name: x\n").unwrap();
        assert!(validate_chart_path(file.to_str().unwrap()).is_err());
    }
}
