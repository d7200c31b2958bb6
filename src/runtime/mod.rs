pub mod cli;

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

/// Size and layer information read back from the local image store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDetails {
    /// Total image size in bytes
    pub size: i64,

    /// Number of rootfs layers
    pub layers: usize,
}

/// Common interface for the container runtime that pulls and inspects images.
///
/// Implementations block until the operation completes.
pub trait ImageRuntime: Send + Sync {
    /// Pull an image into the local store. Returns once the pull has finished.
    fn pull(&self, image: &str) -> Result<()>;

    /// Read metadata for an image already present locally.
    fn inspect(&self, image: &str) -> Result<ImageDetails>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    Docker,
    Podman,
}

impl RuntimeKind {
    pub const ALL: [RuntimeKind; 2] = [RuntimeKind::Docker, RuntimeKind::Podman];

    pub fn binary_name(self) -> &'static str {
        match self {
            RuntimeKind::Docker => "docker",
            RuntimeKind::Podman => "podman",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary_name())
    }
}

impl std::str::FromStr for RuntimeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(RuntimeKind::Docker),
            "podman" => Ok(RuntimeKind::Podman),
            other => Err(format!("unsupported runtime '{other}' (expected docker or podman)")),
        }
    }
}

/// A container runtime found on this host.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeInfo {
    pub kind: RuntimeKind,
    pub binary_path: PathBuf,
}

/// Runtimes detected on `PATH`, in preference order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeResult {
    pub runtimes: Vec<RuntimeInfo>,

    /// Index into `runtimes` of the one used when none is requested
    pub default: Option<usize>,
}

impl ProbeResult {
    pub fn default_runtime(&self) -> Option<&RuntimeInfo> {
        self.default.map(|i| &self.runtimes[i])
    }

    pub fn find(&self, kind: RuntimeKind) -> Option<&RuntimeInfo> {
        self.runtimes.iter().find(|rt| rt.kind == kind)
    }
}

/// Detect docker and podman binaries on `PATH`.
pub fn probe() -> ProbeResult {
    let path = std::env::var_os("PATH").unwrap_or_default();
    let dirs: Vec<PathBuf> = std::env::split_paths(&path).collect();
    probe_in(&dirs)
}

fn probe_in(dirs: &[PathBuf]) -> ProbeResult {
    let runtimes: Vec<RuntimeInfo> = RuntimeKind::ALL
        .iter()
        .filter_map(|&kind| {
            find_binary(dirs, kind.binary_name()).map(|binary_path| RuntimeInfo { kind, binary_path })
        })
        .collect();
    let default = if runtimes.is_empty() { None } else { Some(0) };
    ProbeResult { runtimes, default }
}

/// Look for an executable file called `name` in `dirs`.
pub fn find_binary(dirs: &[PathBuf], name: &str) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
