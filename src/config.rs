/// Report thresholds, passed explicitly into the rendering entry point.
/// These only shape presentation; detection itself is unfiltered.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Hide layer pairs saving no more than this many bytes.
    pub min_save_bytes: u64,
    /// Cap on shadowed files listed per pair.
    pub max_files_shown: usize,
    /// Stop listing at the first file at or below this size.
    pub min_file_size_shown: u64,
    /// Width of the `=` rule lines.
    pub display_width: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            min_save_bytes: 10 * 1024,
            max_files_shown: 10,
            min_file_size_shown: 10 * 1024,
            display_width: 100,
        }
    }
}
