use std::net::SocketAddr;
use std::sync::OnceLock;

use tokio::sync::Semaphore;

use crate::error::{Result, ScanError};
use crate::extract::ExtractMode;
use crate::pipeline::PipelineOptions;
use crate::runtime::{self, ProbeResult, RuntimeInfo, RuntimeKind};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8000";
pub const DEFAULT_HELM: &str = "helm";

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Settings gathered from flags and the environment before any work starts.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub runtime: Option<String>,
    pub helm: Option<String>,
    pub concurrency: Option<usize>,
    pub strict: bool,
    pub keep_duplicates: bool,
    pub listen: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub helm: String,
    pub probe: ProbeResult,
    /// Runtime selected for pulls, if one is available
    pub runtime: Option<RuntimeInfo>,
    pub pipeline: PipelineOptions,
    pub listen: SocketAddr,
}

impl AppConfig {
    pub fn resolve(overrides: Overrides, probe: ProbeResult) -> Result<Self> {
        let runtime = match overrides.runtime.as_deref() {
            Some(name) => {
                let kind: RuntimeKind = name.parse().map_err(ScanError::Config)?;
                Some(probe.find(kind).cloned().ok_or_else(|| {
                    ScanError::Config(format!("runtime '{kind}' was not found on PATH"))
                })?)
            }
            None => probe.default_runtime().cloned(),
        };

        let concurrency = overrides.concurrency.unwrap_or(1);
        if concurrency == 0 {
            return Err(ScanError::Config("concurrency must be at least 1".to_string()));
        }
        if concurrency > Semaphore::MAX_PERMITS {
            return Err(ScanError::Config(format!(
                "concurrency must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }

        let listen_str = overrides.listen.as_deref().unwrap_or(DEFAULT_LISTEN);
        let listen: SocketAddr = listen_str
            .parse()
            .map_err(|e| ScanError::Config(format!("invalid listen address '{listen_str}': {e}")))?;

        let helm = overrides
            .helm
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HELM.to_string());

        Ok(Self {
            helm,
            probe,
            runtime,
            pipeline: PipelineOptions {
                extract_mode: if overrides.strict {
                    ExtractMode::Structured
                } else {
                    ExtractMode::Lines
                },
                dedupe: !overrides.keep_duplicates,
                concurrency,
            },
            listen,
        })
    }

    /// The runtime to pull with, or an error explaining none was found.
    pub fn require_runtime(&self) -> Result<&RuntimeInfo> {
        self.runtime.as_ref().ok_or_else(|| {
            ScanError::Config(
                "No container runtime detected. Install Docker or Podman, or pass --runtime."
                    .to_string(),
            )
        })
    }
}

/// Probe the host and store the process-wide configuration.
pub fn init_from_cli(overrides: Overrides) -> Result<&'static AppConfig> {
    let cfg = AppConfig::resolve(overrides, runtime::probe())?;
    Ok(CONFIG.get_or_init(|| cfg))
}
