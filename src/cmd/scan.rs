use std::fs;
use std::io::{self, Write};

use anyhow::{Context, Result};
use crossterm::style::{self, Stylize};

use crate::config::AppConfig;
use crate::pipeline::validate_chart_path;
use crate::progress::Spinner;
use crate::report::Report;

pub async fn run(chart: &str, json: Option<&str>, cfg: &AppConfig) -> Result<()> {
    let chart = validate_chart_path(chart)?;
    let pipeline = super::build_pipeline(cfg)?;

    print_runtime_summary(cfg);

    let spinner = Spinner::new(format!("Scanning {} ...", chart.display()));
    let report = match pipeline.run(&chart).await {
        Ok(report) => report,
        Err(e) => {
            spinner.fail(format!("Scan failed at {} stage", e.stage()));
            return Err(e.into());
        }
    };
    spinner.finish(format!(
        "Resolved {} images ({})",
        report.images.len(),
        format_bytes(report.total_size())
    ));

    if let Some(dest) = json {
        let output = serde_json::to_string_pretty(&report)?;
        if dest == "-" {
            println!("{output}");
        } else {
            fs::write(dest, &output).with_context(|| format!("Failed to write JSON to {dest}"))?;
            eprintln!("{} Wrote {dest}", "✔".green());
        }
    } else {
        print_table(&report);
    }

    Ok(())
}

fn print_table(report: &Report) {
    if report.is_empty() {
        println!("No images found");
        return;
    }
    let width = report
        .images
        .iter()
        .map(|i| i.name.len())
        .max()
        .unwrap_or(0)
        .max("IMAGE".len());
    println!("{:<width$}  {:>10}  {:>6}", "IMAGE", "SIZE", "LAYERS");
    for image in &report.images {
        println!(
            "{:<width$}  {:>10}  {:>6}",
            image.name,
            format_bytes(image.size),
            image.layers
        );
    }
}

fn print_runtime_summary(cfg: &AppConfig) {
    let mut stderr = io::stderr();
    if let Some(rt) = &cfg.runtime {
        let _ = writeln!(
            stderr,
            "{} {} ({})",
            "Runtime".dim(),
            style::style(&rt.kind).green().bold(),
            style::style(rt.binary_path.display()).dim(),
        );
    }
    let _ = writeln!(stderr, "{} {}", "Renderer".dim(), style::style(&cfg.helm).dim());
    let _ = writeln!(stderr);
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return if size.fract() < 0.05 {
                format!("{:.0} {unit}", size)
            } else {
                format!("{:.1} {unit}", size)
            };
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}
