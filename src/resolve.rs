use crate::error::{Result, ScanError};
use crate::extract::normalize;
use crate::report::ImageRecord;
use crate::runtime::ImageRuntime;

/// Pull `image` and read back its size and layer count.
///
/// The image stays in the runtime's local store afterwards.
pub fn resolve(runtime: &dyn ImageRuntime, image: &str) -> Result<ImageRecord> {
    let image = normalize(image);

    tracing::debug!(image, "pulling image");
    runtime.pull(image).map_err(|e| ScanError::Pull {
        image: image.to_string(),
        cause: format!("{e:#}"),
    })?;

    tracing::debug!(image, "inspecting image");
    let details = runtime.inspect(image).map_err(|e| ScanError::Inspect {
        image: image.to_string(),
        cause: format!("{e:#}"),
    })?;

    let size = u64::try_from(details.size)
        .ok()
        .filter(|&size| size > 0)
        .ok_or_else(|| ScanError::Inspect {
            image: image.to_string(),
            cause: format!("runtime reported invalid size {}", details.size),
        })?;

    tracing::info!(image, size, layers = details.layers, "resolved image");
    Ok(ImageRecord {
        name: image.to_string(),
        size,
        layers: details.layers,
    })
}
