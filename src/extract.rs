//! Image reference extraction from rendered manifests.
//!
//! The default mode is a line-oriented heuristic: any line containing `image:`
//! contributes whatever follows the first `": "`. It does not understand YAML
//! nesting, comments or document boundaries, so it tolerates the malformed and
//! partially templated output real charts sometimes produce, at the price of
//! occasional false positives (a commented-out `# image: foo` is matched).
//!
//! [`ExtractMode::Structured`] is the opt-in strict alternative that parses the
//! manifest stream as YAML and only reports `image` keys with string values.

use serde::Deserialize;
use serde_yaml::Value;

use crate::error::{Result, ScanError};

const IMAGE_TOKEN: &str = "image:";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtractMode {
    #[default]
    Lines,
    Structured,
}

/// Strip surrounding whitespace and double quotes from an image reference.
pub fn normalize(image: &str) -> &str {
    image.trim().trim_matches('"')
}

/// Extract image references in first-seen order. Duplicates are kept.
pub fn extract(manifest: &str, mode: ExtractMode) -> Result<Vec<String>> {
    match mode {
        ExtractMode::Lines => Ok(extract_lines(manifest)),
        ExtractMode::Structured => extract_structured(manifest),
    }
}

fn extract_lines(manifest: &str) -> Vec<String> {
    manifest
        .lines()
        .filter(|line| line.contains(IMAGE_TOKEN))
        .filter_map(|line| line.split_once(": "))
        .map(|(_, rest)| normalize(rest))
        .filter(|image| !image.is_empty())
        .map(str::to_string)
        .collect()
}

fn extract_structured(manifest: &str) -> Result<Vec<String>> {
    let mut images = Vec::new();
    for document in serde_yaml::Deserializer::from_str(manifest) {
        let value = Value::deserialize(document).map_err(|e| ScanError::Parse(e.to_string()))?;
        collect_images(&value, &mut images);
    }
    Ok(images)
}

fn collect_images(value: &Value, images: &mut Vec<String>) {
    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                if key.as_str() == Some("image") {
                    if let Some(image) = child.as_str() {
                        let image = normalize(image);
                        if !image.is_empty() {
                            images.push(image.to_string());
                        }
                        continue;
                    }
                }
                collect_images(child, images);
            }
        }
        Value::Sequence(items) => {
            for item in items {
                collect_images(item, images);
            }
        }
        Value::Tagged(tagged) => collect_images(&tagged.value, images),
        _ => {}
    }
}
