use anyhow::Result;
use crossterm::style::{self, Stylize};
use serde::Serialize;

use crate::config::AppConfig;
use crate::runtime::{self, RuntimeInfo};

#[derive(Serialize)]
struct ProbeReport<'a> {
    runtimes: &'a [RuntimeInfo],
    selected: Option<&'a RuntimeInfo>,
    helm: Option<String>,
}

pub fn run(json: bool, cfg: &AppConfig) -> Result<()> {
    let helm = locate_helm(&cfg.helm);

    if json {
        let report = ProbeReport {
            runtimes: &cfg.probe.runtimes,
            selected: cfg.runtime.as_ref(),
            helm: helm.clone(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if cfg.probe.runtimes.is_empty() {
        println!("{} No container runtimes detected", "!".yellow().bold());
    }
    for rt in &cfg.probe.runtimes {
        let selected = cfg.runtime.as_ref().is_some_and(|s| s.kind == rt.kind);
        let marker = if selected { "*".green().bold() } else { " ".stylize() };
        println!(
            "{marker} {:<8} {}",
            rt.kind.to_string(),
            style::style(rt.binary_path.display()).dim()
        );
    }

    match helm {
        Some(path) => println!("  {:<8} {}", "helm", style::style(path).dim()),
        None => println!(
            "{} {} not found; charts cannot be rendered",
            "!".yellow().bold(),
            cfg.helm
        ),
    }
    Ok(())
}

/// Resolve the renderer binary: an explicit path is checked as-is, a bare name
/// is searched on `PATH`.
fn locate_helm(helm: &str) -> Option<String> {
    if helm.contains(std::path::MAIN_SEPARATOR) {
        let path = std::path::Path::new(helm);
        return path.is_file().then(|| helm.to_string());
    }
    let path = std::env::var_os("PATH").unwrap_or_default();
    let dirs: Vec<_> = std::env::split_paths(&path).collect();
    runtime::find_binary(&dirs, helm).map(|p| p.display().to_string())
}
