use crate::image::{Layer, LayerIndex};

/// What squashing one layer pair would save: every file of the lower layer
/// that the upper layer shadows, with sizes.
#[derive(Debug, Default)]
pub struct DuplicationResult {
    pub total_bytes: u64,
    pub file_count: u64,
    /// `(path, size)` per shadowed file, in index iteration order.
    pub files: Vec<(String, u64)>,
}

impl DuplicationResult {
    /// Shadowed files sorted descending by size, for display.
    pub fn files_by_size(&self) -> Vec<(String, u64)> {
        let mut sorted = self.files.clone();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        sorted
    }
}

/// Collect every file of `lower` that `upper` shadows. The caller guarantees
/// `upper` appears strictly later than `lower` in the same layer set; nothing
/// here depends on it, but the result is only meaningful that way around.
pub fn compare(upper: &Layer, lower: &Layer) -> DuplicationResult {
    let mut result = DuplicationResult::default();

    for (path, &size) in &lower.index.files {
        if is_shadowed(&upper.index, path) {
            result.total_bytes += size;
            result.file_count += 1;
            result.files.push((path.clone(), size));
        }
    }

    result
}

/// A lower-layer file is shadowed when the upper layer overwrites it, deletes
/// it with a whiteout, or hides it by deleting or opaque-masking any ancestor
/// directory. The ancestor walk stops at the first match, or unmatched at the
/// top-level component.
fn is_shadowed(upper: &LayerIndex, path: &str) -> bool {
    if upper.files.contains_key(path) || upper.whiteouts.contains_key(path) {
        return true;
    }

    let mut ancestor = path;
    while let Some(cut) = ancestor.rfind('/') {
        ancestor = &ancestor[..cut];
        if upper.whiteouts.contains_key(ancestor) || upper.opaque_dirs.contains_key(ancestor) {
            return true;
        }
    }

    false
}
