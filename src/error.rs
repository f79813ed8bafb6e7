//! Error taxonomy for the NITF decode path.
//!
//! Header-level errors ([`NitfError::Format`], [`NitfError::CorruptHeader`],
//! [`NitfError::SegmentTable`]) are fatal to the whole open. Record-level
//! errors ([`NitfError::TreSize`], [`NitfError::DesHeader`]) are local: the
//! offending record is marked incomplete and siblings keep decoding.

use thiserror::Error;

/// Errors produced while opening or decoding a NITF container.
#[derive(Debug, Error)]
pub enum NitfError {
    /// The file could not be opened or read.
    #[error("cannot open NITF file: {0}")]
    Open(#[from] std::io::Error),

    /// The first bytes are not a recognized NITF/NSIF magic + version.
    #[error("not a NITF file: {0}")]
    Format(String),

    /// Header length fields are inconsistent with the physical file size,
    /// including failures of the streaming-header recovery path.
    #[error("corrupt NITF header: {0}")]
    CorruptHeader(String),

    /// Declared segment counts or lengths exceed the header bounds, or a
    /// length field hides a sign character.
    #[error("invalid segment table: {0}")]
    SegmentTable(String),

    /// A TRE field or loop would read past the TRE's declared extent.
    #[error("TRE exceeds declared size: {0}")]
    TreSize(String),

    /// A DES subheader is too small for its fixed or declared fields.
    #[error("invalid DES subheader: {0}")]
    DesHeader(String),

    /// The attachment graph leaves one or more segments unreachable from
    /// any unattached root.
    #[error("unresolved segment attachment: {0}")]
    UnresolvedAttachment(String),

    /// The TRE schema document is missing or malformed.
    #[error("bad TRE schema document: {0}")]
    Schema(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NitfError>;
