//! # nitf-core
//!
//! Library for decoding NITF/NSIF imagery containers: the file header in
//! both historical layouts, the segment catalog, tagged record extensions
//! (TREs), data extension segments, attachment geometry, and the RPC
//! sensor model.
//!
//! Designed for **defensive parsing**: every field read is bounds-checked
//! against the buffer it came from, numeric fields reject signs and
//! embedded garbage, and a malformed TRE poisons only itself, never its
//! siblings or the container.
//!
//! ## Supported versions
//!
//! - **NITF02.10 / NSIF01.00** — the modern layout, including the
//!   streaming-writer convention of a replicated header at the end of the
//!   file when the leading header carries a length placeholder.
//! - **NITF01.10 / NITF02.00** — the legacy layout, including the
//!   conditional 40-byte security downgrade fields and label segments.
//!
//! ## Example
//!
//! ```no_run
//! use nitf_core::NitfFile;
//!
//! let mut file = NitfFile::open("scene.ntf")?;
//! println!("{} ({} segments)", file.version.as_str(), file.segments.len());
//! if let Some(rpc) = file.rpc(0)? {
//!     let (sample, line) = rpc.geo_to_image(-117.1, 32.7, 50.0);
//!     println!("ground point maps to pixel ({sample:.1}, {line:.1})");
//! }
//! # Ok::<(), nitf_core::NitfError>(())
//! ```
//!
//! ## TRE schemas
//!
//! TRE decoding is schema-driven: a built-in JSON document covers the
//! common registered extensions, and the `NITF_TRE_SPEC` environment
//! variable points at a site document that replaces it. See
//! [`tre::shared_registry`].

pub mod attach;
pub mod des;
pub mod error;
pub mod field;
pub mod file;
pub mod header;
pub mod image;
pub mod metadata;
pub mod rpc;
pub mod segments;
pub mod tre;

pub use des::{DesPayload, DesPayloadPolicy, DesSubheader, ShapefilePart};
pub use error::{NitfError, Result};
pub use field::FieldReader;
pub use file::NitfFile;
pub use header::Version;
pub use image::ImageSegment;
pub use metadata::{MetadataMap, MetadataNode};
pub use rpc::RpcModel;
pub use segments::{SegmentInfo, SegmentKind};
pub use tre::{decode_tre, TreDecoded, TreIter, TreRecord};

/// Quick magic check without opening a file.
#[inline]
pub fn is_nitf(data: &[u8]) -> bool {
    Version::from_magic(data).is_some()
}

/// Open a container read-only. Shorthand for [`NitfFile::open`].
pub fn open(path: impl AsRef<std::path::Path>) -> Result<NitfFile> {
    NitfFile::open(path)
}

/// Open many containers in parallel, pairing each path with its outcome.
/// Useful for sweeping archive directories; per-file work stays serial.
#[cfg(feature = "parallel")]
pub fn open_all<P>(paths: &[P]) -> Vec<(std::path::PathBuf, Result<NitfFile>)>
where
    P: AsRef<std::path::Path> + Sync,
{
    use rayon::prelude::*;
    paths
        .par_iter()
        .map(|p| (p.as_ref().to_path_buf(), NitfFile::open(p)))
        .collect()
}

/// Decode every TRE in a blob against the shared schema registry. Records
/// without a schema are skipped; a record whose framing is broken ends the
/// walk (TREs are packed back to back, so nothing after it can be framed).
pub fn decode_tre_blob(blob: &[u8]) -> Vec<TreDecoded> {
    let registry = tre::shared_registry();
    let mut out = Vec::new();
    for record in tre::TreIter::new(blob) {
        let Ok(record) = record else { break };
        if let Some(schema) = registry.schema_for(record.tag) {
            out.push(decode_tre(schema, record.data));
        }
    }
    out
}
