pub mod archive;
pub mod index;

pub use archive::{read_image, ImageMap};
pub use index::LayerIndex;

/// One filesystem delta in an image's build history.
#[derive(Debug, Clone)]
pub struct Layer {
    /// Content-addressable id, derived from the directory holding the
    /// layer's tar inside the archive.
    pub layer_id: String,

    /// Classified file listing for this layer.
    pub index: LayerIndex,

    /// The build instruction that produced the layer (may be empty).
    pub command: String,

    /// Size of the nested layer-tar entry itself, in bytes.
    pub compressed_size: u64,
}

/// A tag's layers in build order, oldest first, one per non-empty history
/// entry.
pub type LayerSet = Vec<Layer>;
