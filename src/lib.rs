pub mod config;
pub mod dedup;
pub mod image;
pub mod input;
pub mod progress;
pub mod report;

pub use config::ReportOptions;
pub use dedup::{compare, DuplicationResult};
pub use image::{read_image, ImageMap, Layer, LayerIndex, LayerSet};
