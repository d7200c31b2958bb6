use serde::Serialize;

/// Metadata for one resolved image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    /// Image reference with surrounding quotes removed
    pub name: String,

    /// Total image size in bytes, as reported by the runtime
    pub size: u64,

    /// Number of entries in the image's rootfs layer list
    pub layers: usize,
}

/// Every image a chart references, in the order first discovered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub images: Vec<ImageRecord>,
}

impl Report {
    /// Collect resolved records into a report, keeping their order.
    pub fn assemble(records: impl IntoIterator<Item = ImageRecord>) -> Self {
        Self {
            images: records.into_iter().collect(),
        }
    }

    pub fn total_size(&self) -> u64 {
        self.images.iter().map(|i| i.size).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
