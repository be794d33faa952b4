mod compress;
mod dedup;
mod encoder;
mod structures;

pub use dedup::{
    default_deduplicator, default_name_reconstructor, DefaultDeduplicator, Deduplication,
    NameDeduplicator, NameReconstructor, DEFAULT_NAME_PATTERN,
};
pub use encoder::{zip_stream, zip_stream_resource, ZipEntry, ZipStreamEncoder, ZipStreamOptions};
pub use structures::*;
