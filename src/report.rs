use std::io::Write;

use anyhow::Result;

use crate::config::ReportOptions;
use crate::dedup;
use crate::image::ImageMap;

const SIZE_COLUMN_WIDTH: usize = 8;

/// Render the per-tag layer summary and every layer pair whose squash
/// savings clear the configured threshold.
pub fn render<W: Write>(out: &mut W, images: &ImageMap, opts: &ReportOptions) -> Result<()> {
    let rule = "=".repeat(opts.display_width);

    for (repo_tag, layers) in images {
        writeln!(out, "{rule}")?;
        writeln!(out, "RepoTag : {repo_tag}")?;

        for (i, layer) in layers.iter().enumerate() {
            writeln!(
                out,
                "[{i}] {} \t{} files\t $ {}",
                format_bytes(layer.compressed_size),
                layer.index.entry_count,
                layer.command,
            )?;
        }

        writeln!(out, "{rule}")?;
        writeln!(out)?;
        writeln!(
            out,
            "merging [lower] into [upper] saves num_of_files data_size (pairs saving {} or less are hidden)",
            format_bytes(opts.min_save_bytes).trim_start(),
        )?;
        writeln!(out)?;

        for i in 0..layers.len() {
            for j in (i + 1)..layers.len() {
                let lower = &layers[i];
                let upper = &layers[j];
                let result = dedup::compare(upper, lower);
                if result.total_bytes <= opts.min_save_bytes {
                    continue;
                }

                writeln!(out, "{rule}")?;
                writeln!(out, "[{i}] {}", lower.command)?;
                writeln!(out, "[{j}] {}", upper.command)?;
                writeln!(
                    out,
                    "save : {} files ({})",
                    result.file_count,
                    format_bytes(result.total_bytes).trim_start(),
                )?;

                for (path, size) in result.files_by_size().into_iter().take(opts.max_files_shown)
                {
                    if size <= opts.min_file_size_shown {
                        break;
                    }
                    writeln!(out, "{}\t{path}", format_bytes(size))?;
                }
            }
        }
        writeln!(out, "{rule}")?;
    }

    Ok(())
}

/// Human-readable byte count, right-aligned to the size column.
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            let text = if size.fract() < 0.05 {
                format!("{size:.0} {unit}")
            } else {
                format!("{size:.1} {unit}")
            };
            return format!("{text:>SIZE_COLUMN_WIDTH$}");
        }
        size /= 1024.0;
    }
    format!("{:>SIZE_COLUMN_WIDTH$}", format!("{size:.1} TB"))
}
