use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Component, Path};

use anyhow::{Context, Result};

/// Marker file name declaring its parent directory opaque: everything the
/// directory contained in lower layers is hidden.
pub const OPAQUE_MARKER: &str = ".wh..wh..opq";

/// File name prefix marking the sibling path (prefix stripped) as deleted.
pub const WHITEOUT_PREFIX: &str = ".wh.";

/// Per-layer lookup structure: every tar entry of one layer, classified.
///
/// Keys are normalized, slash-separated, relative paths. A path lives in at
/// most one of `files`/`whiteouts`; within one layer, a later entry for the
/// same path overwrites the earlier classification (last write wins).
#[derive(Debug, Clone, Default)]
pub struct LayerIndex {
    /// Ordinary file path -> size in bytes.
    pub files: HashMap<String, u64>,
    /// Deleted path (whiteout prefix stripped) -> marker entry size.
    pub whiteouts: HashMap<String, u64>,
    /// Opaque-masked directory -> marker entry size.
    pub opaque_dirs: HashMap<String, u64>,
    /// Total tar entries seen, markers and directories included.
    pub entry_count: u64,
}

impl LayerIndex {
    /// Classify one tar entry into the index.
    fn record(&mut self, raw_path: &Path, size: u64, is_dir: bool) {
        self.entry_count += 1;

        let full_path = clean_path(raw_path);
        if full_path.is_empty() {
            return;
        }

        // Directory entries carry no payload and must never collide with an
        // opaque marker recorded under the same key.
        if is_dir {
            return;
        }

        let (dir_path, base_name) = match full_path.rfind('/') {
            Some(i) => (&full_path[..i], &full_path[i + 1..]),
            None => ("", full_path.as_str()),
        };

        // The opaque marker itself starts with the whiteout prefix, so it has
        // to be matched first.
        if base_name == OPAQUE_MARKER {
            self.opaque_dirs.insert(dir_path.to_string(), size);
        } else if let Some(stripped) = base_name.strip_prefix(WHITEOUT_PREFIX) {
            let target = if dir_path.is_empty() {
                stripped.to_string()
            } else {
                format!("{dir_path}/{stripped}")
            };
            self.files.remove(&target);
            self.whiteouts.insert(target, size);
        } else {
            self.whiteouts.remove(&full_path);
            self.files.insert(full_path, size);
        }
    }
}

/// Read one layer's inner tar from an outer-archive entry and index it
/// (auto-detects gzip).
pub fn from_tar_entry<R: Read>(entry: &mut R) -> Result<LayerIndex> {
    let mut data = Vec::new();
    entry.read_to_end(&mut data)?;
    from_bytes(&data)
}

pub fn from_bytes(data: &[u8]) -> Result<LayerIndex> {
    let is_gzip = data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b;
    let cursor = Cursor::new(data);

    if is_gzip {
        index_inner_tar(flate2::read::GzDecoder::new(cursor))
    } else {
        index_inner_tar(cursor)
    }
}

fn index_inner_tar<R: Read>(reader: R) -> Result<LayerIndex> {
    let mut archive = tar::Archive::new(reader);
    let mut index = LayerIndex::default();

    for entry_result in archive.entries().context("Failed to read layer tar entries")? {
        let entry = entry_result.context("Failed to read layer tar entry")?;
        let path = entry.path().context("Non-decodable path in layer tar")?;
        let is_dir = entry.header().entry_type().is_dir();
        index.record(&path, entry.size(), is_dir);
    }

    Ok(index)
}

/// Lexically normalize a tar entry path: drop `.`, resolve `..`, strip any
/// leading `/`. The result uses `/` separators and is relative.
fn clean_path(p: &Path) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for comp in p.components() {
        match comp {
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(c) => parts.push(c.to_str().unwrap_or_default()),
        }
    }

    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn file(index: &mut LayerIndex, path: &str, size: u64) {
        index.record(Path::new(path), size, false);
    }

    #[test]
    fn classifies_files_whiteouts_and_opaque_dirs() {
        let mut index = LayerIndex::default();
        file(&mut index, "etc/passwd", 100);
        file(&mut index, "var/lib/.wh.dropped", 0);
        file(&mut index, "opt/app/.wh..wh..opq", 4);

        assert_eq!(index.files.get("etc/passwd"), Some(&100));
        assert_eq!(index.whiteouts.get("var/lib/dropped"), Some(&0));
        assert_eq!(index.opaque_dirs.get("opt/app"), Some(&4));
        assert_eq!(index.entry_count, 3);
    }

    #[test]
    fn normalizes_paths_before_classifying() {
        let mut index = LayerIndex::default();
        file(&mut index, "./usr//bin/tool", 7);
        file(&mut index, "/etc/hosts", 3);
        file(&mut index, "a/b/../c", 5);

        assert_eq!(index.files.get("usr/bin/tool"), Some(&7));
        assert_eq!(index.files.get("etc/hosts"), Some(&3));
        assert_eq!(index.files.get("a/c"), Some(&5));
    }

    #[test]
    fn top_level_whiteout_has_no_directory_prefix() {
        let mut index = LayerIndex::default();
        file(&mut index, ".wh.gone", 0);

        assert_eq!(index.whiteouts.get("gone"), Some(&0));
    }

    #[test]
    fn later_entry_wins_within_one_layer() {
        let mut index = LayerIndex::default();
        file(&mut index, "data/blob", 10);
        file(&mut index, "data/blob", 30);

        assert_eq!(index.files.get("data/blob"), Some(&30));
        assert_eq!(index.entry_count, 2);
    }

    #[test]
    fn reclassification_moves_the_key_between_maps() {
        // A whiteout followed by a recreated file (and vice versa) must not
        // leave the path in both maps.
        let mut index = LayerIndex::default();
        file(&mut index, "tmp/.wh.cache", 0);
        file(&mut index, "tmp/cache", 42);

        assert_eq!(index.files.get("tmp/cache"), Some(&42));
        assert!(!index.whiteouts.contains_key("tmp/cache"));

        let mut index = LayerIndex::default();
        file(&mut index, "tmp/cache", 42);
        file(&mut index, "tmp/.wh.cache", 0);

        assert_eq!(index.whiteouts.get("tmp/cache"), Some(&0));
        assert!(!index.files.contains_key("tmp/cache"));
    }

    #[test]
    fn directory_entries_are_counted_but_not_indexed() {
        let mut index = LayerIndex::default();
        index.record(Path::new("opt/app/"), 0, true);
        file(&mut index, "opt/app/bin", 9);

        assert!(!index.files.contains_key("opt/app"));
        assert_eq!(index.files.get("opt/app/bin"), Some(&9));
        assert_eq!(index.entry_count, 2);
    }

    fn layer_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn indexes_a_plain_layer_tar() {
        let tar = layer_tar(&[
            ("bin/sh", b"#!/bin/sh".as_slice()),
            ("bin/.wh.dash", b"".as_slice()),
        ]);

        let index = from_bytes(&tar).unwrap();
        assert_eq!(index.files.get("bin/sh"), Some(&9));
        assert_eq!(index.whiteouts.get("bin/dash"), Some(&0));
        assert_eq!(index.entry_count, 2);
    }

    #[test]
    fn indexes_a_gzipped_layer_tar() {
        let tar = layer_tar(&[("usr/share/doc", b"readme".as_slice())]);
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar).unwrap();
        let gz = encoder.finish().unwrap();

        let index = from_bytes(&gz).unwrap();
        assert_eq!(index.files.get("usr/share/doc"), Some(&6));
    }
}
