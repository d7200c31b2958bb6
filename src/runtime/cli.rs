use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use super::{ImageDetails, ImageRuntime, RuntimeKind};

// --- Docker/Podman CLI JSON output ---

#[derive(Deserialize)]
struct CliInspect {
    #[serde(rename = "Size", default)]
    size: i64,
    #[serde(rename = "RootFS")]
    rootfs: InspectRootFS,
}

#[derive(Deserialize)]
struct InspectRootFS {
    #[serde(rename = "Layers", default)]
    layers: Vec<String>,
}

/// Pulls and inspects images through the runtime CLI (`docker`/`podman`).
pub struct CliRuntime {
    cmd: String,
    kind: RuntimeKind,
}

impl CliRuntime {
    pub fn new(cmd: impl Into<String>, kind: RuntimeKind) -> Self {
        Self {
            cmd: cmd.into(),
            kind,
        }
    }
}

impl ImageRuntime for CliRuntime {
    fn pull(&self, image: &str) -> Result<()> {
        tracing::debug!(runtime = %self.kind, image, "starting pull");
        let mut child = Command::new(&self.cmd)
            .args(["pull", image])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to run '{} pull'", self.cmd))?;

        // stderr is drained on its own thread so a chatty runtime can't block
        // on a full pipe while we wait for stdout to close.
        let stderr_thread = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf);
                buf
            })
        });

        // The pull is only complete once the progress stream hits EOF.
        let drained = match child.stdout.take() {
            Some(stdout) => drain_progress(stdout, image),
            None => Err(std::io::Error::other("stdout was not captured")),
        };
        if drained.is_err() {
            let _ = child.kill();
        }

        let status = child.wait();
        let stderr = stderr_thread
            .and_then(|t| t.join().ok())
            .unwrap_or_default();

        drained.with_context(|| format!("Failed to read pull output for {image}"))?;
        let status = status.with_context(|| format!("Failed to wait for '{} pull'", self.cmd))?;
        if !status.success() {
            bail!(
                "'{} pull {}' failed ({}): {}",
                self.cmd,
                image,
                status,
                stderr.trim()
            );
        }
        Ok(())
    }

    fn inspect(&self, image: &str) -> Result<ImageDetails> {
        tracing::debug!(runtime = %self.kind, image, "starting inspect");
        let out = Command::new(&self.cmd)
            .args(["image", "inspect", image, "--format", "{{json .}}"])
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run '{} image inspect'", self.cmd))?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            bail!(
                "'{} image inspect {}' failed: {}",
                self.cmd,
                image,
                stderr.trim()
            );
        }

        parse_inspect(&String::from_utf8_lossy(&out.stdout))
    }
}

/// Read pull progress to EOF. Lines are logged lossily; the runtime may emit
/// bytes that are not UTF-8.
fn drain_progress(stdout: impl Read, image: &str) -> std::io::Result<()> {
    let mut reader = BufReader::new(stdout);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&line);
        let text = text.trim();
        if !text.is_empty() {
            tracing::trace!(image, progress = text, "pull");
        }
    }
}

/// Decode `image inspect --format '{{json .}}'` output.
fn parse_inspect(json: &str) -> Result<ImageDetails> {
    let inspect: CliInspect =
        serde_json::from_str(json.trim()).context("Failed to parse image inspect JSON")?;
    Ok(ImageDetails {
        size: inspect.size,
        layers: inspect.rootfs.layers.len(),
    })
}
