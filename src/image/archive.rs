use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::Deserialize;

use super::index::{self, LayerIndex};
use super::{Layer, LayerSet};

/// Ordered layer sets keyed by repository tag.
pub type ImageMap = BTreeMap<String, LayerSet>;

// ---- docker-save archive structs ----

#[derive(Deserialize)]
struct ManifestEntry {
    #[serde(rename = "Config")]
    config: String,
    #[serde(rename = "RepoTags", default)]
    repo_tags: Vec<String>,
    #[serde(rename = "Layers")]
    layers: Vec<String>,
}

#[derive(Deserialize)]
struct ImageConfig {
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

#[derive(Deserialize)]
struct HistoryEntry {
    created_by: Option<String>,
    #[serde(default)]
    empty_layer: bool,
}

/// Everything gathered in the single pass over the outer tar. Entries may
/// arrive in any order, so metadata is joined only after the stream ends.
#[derive(Default)]
struct Scan {
    manifests: Vec<ManifestEntry>,
    indexes: HashMap<String, LayerIndex>,
    compressed_sizes: HashMap<String, u64>,
    configs: HashMap<String, ImageConfig>,
}

/// Read a `docker save` archive to completion and assemble, per repository
/// tag, the ordered list of layers with their file indexes (auto-detects a
/// gzip-compressed outer stream).
pub fn read_image<R: Read>(reader: R) -> Result<ImageMap> {
    let mut reader = BufReader::new(reader);
    let magic = reader.fill_buf().context("Failed to read archive")?;
    let is_gzip = magic.len() >= 2 && magic[0] == 0x1f && magic[1] == 0x8b;

    let scan = if is_gzip {
        scan_entries(tar::Archive::new(flate2::read::GzDecoder::new(reader)))?
    } else {
        scan_entries(tar::Archive::new(reader))?
    };

    assemble(scan)
}

fn scan_entries<R: Read>(mut archive: tar::Archive<R>) -> Result<Scan> {
    let mut scan = Scan::default();

    for entry_result in archive.entries().context("Failed to read tar entries")? {
        let mut entry = entry_result.context("Failed to read tar entry")?;
        let entry_path = entry.path()?.to_string_lossy().to_string();

        if entry_path == "manifest.json" {
            scan.manifests =
                serde_json::from_reader(&mut entry).context("Failed to parse manifest.json")?;
        } else if entry_path.ends_with(".tar") {
            let layer_id = layer_id_for(&entry_path);
            debug!("indexing layer {layer_id} ({entry_path})");
            // The compressed size is the size of this nested-tar entry
            // itself, not the sum of the files inside it.
            let compressed_size = entry.size();
            let index = index::from_tar_entry(&mut entry)
                .with_context(|| format!("Failed to index layer {entry_path}"))?;
            scan.compressed_sizes.insert(layer_id.clone(), compressed_size);
            scan.indexes.insert(layer_id, index);
        } else if entry_path.ends_with(".json") {
            let config: ImageConfig = serde_json::from_reader(&mut entry)
                .with_context(|| format!("Failed to parse image config {entry_path}"))?;
            scan.configs.insert(entry_path, config);
        }
        // Anything else (repositories, oci-layout, ...) is ignored.
    }

    Ok(scan)
}

/// Join manifest, config history, and indexed layer tars into per-tag layer
/// sets. Each non-empty history entry consumes the next manifest layer path,
/// oldest first.
fn assemble(scan: Scan) -> Result<ImageMap> {
    let mut images = ImageMap::new();

    for manifest in &scan.manifests {
        let config = scan
            .configs
            .get(&manifest.config)
            .with_context(|| format!("Image config {} not found in archive", manifest.config))?;

        let mut layer_paths = manifest.layers.iter();
        let mut layers: LayerSet = Vec::new();

        for history in &config.history {
            if history.empty_layer {
                continue;
            }
            let layer_path = layer_paths.next().with_context(|| {
                format!(
                    "Config {} has more non-empty history entries than manifest layers",
                    manifest.config
                )
            })?;
            let layer_id = layer_id_for(layer_path);

            // A referenced layer whose tar never appeared in the stream
            // degrades to an empty index instead of failing the run.
            let index = match scan.indexes.get(&layer_id) {
                Some(index) => index.clone(),
                None => {
                    warn!("layer {layer_id} referenced by manifest but missing from archive");
                    LayerIndex::default()
                }
            };

            let compressed_size = scan.compressed_sizes.get(&layer_id).copied().unwrap_or(0);

            layers.push(Layer {
                layer_id,
                index,
                command: history.created_by.clone().unwrap_or_default(),
                compressed_size,
            });
        }

        // Multiple tags aliasing one image are not reported separately.
        let tag = match manifest.repo_tags.first() {
            Some(tag) => tag.clone(),
            None => {
                debug!("manifest record without repo tags, keying by config {}", manifest.config);
                manifest.config.clone()
            }
        };
        images.insert(tag, layers);
    }

    Ok(images)
}

/// A layer tar's identifier is the name of the directory containing it
/// (`<id>/layer.tar` -> `<id>`).
fn layer_id_for(layer_path: &str) -> String {
    Path::new(layer_path)
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| layer_path.trim_end_matches(".tar").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_id_is_the_parent_directory_name() {
        assert_eq!(layer_id_for("abc123/layer.tar"), "abc123");
        assert_eq!(layer_id_for("deep/nested/abc123/layer.tar"), "abc123");
    }

    #[test]
    fn bare_layer_path_falls_back_to_the_stem() {
        assert_eq!(layer_id_for("layer.tar"), "layer");
    }
}
