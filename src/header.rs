//! NITF file header: version detection, the two historical field layouts,
//! and the streaming-file-header trailer convention.
//!
//! NITF01.10 and NITF02.00 share the legacy security block (six 20-40 byte
//! fields plus a downgrade date that, when set to the literal `999998`,
//! inserts an extra 40-byte event field and shifts everything after it).
//! NITF02.10 and NSIF01.00 share the modern block with fixed widths.

use crate::error::{NitfError, Result};
use crate::field::FieldReader;
use crate::metadata::MetadataMap;

/// Length of the `FHDR` + `FVER` magic at the start of the file.
pub const MAGIC_LEN: usize = 9;

/// Leading delimiter of a replicated streaming file header.
pub const SFH_DELIM1: [u8; 4] = [0x0A, 0x6E, 0x1D, 0x97];
/// Trailing delimiter of a replicated streaming file header.
pub const SFH_DELIM2: [u8; 4] = [0x0E, 0xCA, 0x14, 0xBF];
/// Width of the SFH_L1 / SFH_L2 length fields flanking the replica.
pub const SFH_LEN_DIGITS: usize = 7;

/// The all-nines placeholder a streaming writer leaves in `FL`.
pub const FL_PLACEHOLDER: &[u8; 12] = b"999999999999";

/// Recognized file version literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Version {
    Nitf0110,
    Nitf0200,
    Nitf0210,
    Nsif0100,
}

impl Version {
    /// Detect from the first 9 bytes of the file.
    pub fn from_magic(data: &[u8]) -> Option<Version> {
        if data.len() < MAGIC_LEN {
            return None;
        }
        match &data[..MAGIC_LEN] {
            b"NITF01.10" => Some(Version::Nitf0110),
            b"NITF02.00" => Some(Version::Nitf0200),
            b"NITF02.10" => Some(Version::Nitf0210),
            b"NSIF01.00" => Some(Version::Nsif0100),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Version::Nitf0110 => "NITF01.10",
            Version::Nitf0200 => "NITF02.00",
            Version::Nitf0210 => "NITF02.10",
            Version::Nsif0100 => "NSIF01.00",
        }
    }

    /// Legacy versions use the NITF 2.0 field layout.
    pub fn is_legacy(self) -> bool {
        matches!(self, Version::Nitf0110 | Version::Nitf0200)
    }
}

/// Offset of the legacy `FSDWNG` downgrade field.
const FSDWNG_OFFSET: usize = 280;
/// Downgrade value that inserts the 40-byte `FSDEVT` field after it.
const FSDWNG_EXTENDED: &[u8; 6] = b"999998";
/// Width of the conditional `FSDEVT` field.
const FSDEVT_LEN: usize = 40;

/// Resolved offsets of the version-dependent trailing header fields.
#[derive(Debug, Clone, Copy)]
pub struct HeaderLayout {
    /// Byte shift induced by the legacy `FSDEVT` field (0 or 40).
    pub shift: usize,
    /// Offset of the 12-digit file length field.
    pub fl_offset: usize,
    /// Offset of the 6-digit header length field.
    pub hl_offset: usize,
    /// Offset of the first segment count table.
    pub segments_offset: usize,
}

impl HeaderLayout {
    /// Compute the layout for `version` given at least the first
    /// `segments_offset` bytes of the header.
    pub fn resolve(version: Version, header: &[u8]) -> Result<HeaderLayout> {
        let mut shift = 0;
        if version.is_legacy() {
            let window = header
                .get(FSDWNG_OFFSET..FSDWNG_OFFSET + 6)
                .ok_or_else(|| {
                    NitfError::CorruptHeader(format!(
                        "header buffer of {} bytes is too small for the legacy security block",
                        header.len()
                    ))
                })?;
            if window == FSDWNG_EXTENDED {
                shift = FSDEVT_LEN;
            }
        }
        Ok(HeaderLayout {
            shift,
            fl_offset: 342 + shift,
            hl_offset: 354 + shift,
            segments_offset: 360 + shift,
        })
    }

    /// Smallest header that can hold the field layout plus the six 3-digit
    /// segment counts and two 5-digit TRE length fields, all zero.
    pub fn min_header_len(&self) -> usize {
        self.segments_offset + 6 * 3 + 2 * 5
    }
}

/// Decode the named fixed fields of the file header into ordered metadata.
/// Empty optional text fields are skipped, numeric fields kept verbatim.
pub fn decode_header_fields(version: Version, header: &[u8]) -> Result<MetadataMap> {
    let layout = HeaderLayout::resolve(version, header)?;
    let r = FieldReader::new(header);
    let mut md = MetadataMap::new();

    let put = |md: &mut MetadataMap, name: &str, off: usize, len: usize| -> Result<()> {
        let value = r.trimmed_at(off, len).ok_or_else(|| {
            NitfError::CorruptHeader(format!("header field {name} at {off}+{len} out of range"))
        })?;
        if !value.is_empty() {
            md.insert(name, value);
        }
        Ok(())
    };

    put(&mut md, "FHDR", 0, 4)?;
    put(&mut md, "FVER", 4, 5)?;
    put(&mut md, "CLEVEL", 9, 2)?;
    put(&mut md, "STYPE", 11, 4)?;
    put(&mut md, "OSTAID", 15, 10)?;
    put(&mut md, "FDT", 25, 14)?;
    put(&mut md, "FTITLE", 39, 80)?;
    put(&mut md, "FSCLAS", 119, 1)?;

    if version.is_legacy() {
        put(&mut md, "FSCODE", 120, 40)?;
        put(&mut md, "FSCTLH", 160, 40)?;
        put(&mut md, "FSREL", 200, 40)?;
        put(&mut md, "FSCAUT", 240, 20)?;
        put(&mut md, "FSCTLN", 260, 20)?;
        put(&mut md, "FSDWNG", 280, 6)?;
        let mut off = 286;
        if layout.shift != 0 {
            put(&mut md, "FSDEVT", off, FSDEVT_LEN)?;
            off += FSDEVT_LEN;
        }
        put(&mut md, "FSCOP", off, 5)?;
        put(&mut md, "FSCPYS", off + 5, 5)?;
        put(&mut md, "ENCRYP", off + 10, 1)?;
        put(&mut md, "ONAME", off + 11, 27)?;
        put(&mut md, "OPHONE", off + 38, 18)?;
    } else {
        put(&mut md, "FSCLSY", 120, 2)?;
        put(&mut md, "FSCODE", 122, 11)?;
        put(&mut md, "FSCTLH", 133, 2)?;
        put(&mut md, "FSREL", 135, 20)?;
        put(&mut md, "FSDCTP", 155, 2)?;
        put(&mut md, "FSDCDT", 157, 8)?;
        put(&mut md, "FSDCXM", 165, 4)?;
        put(&mut md, "FSDG", 169, 1)?;
        put(&mut md, "FSDGDT", 170, 8)?;
        put(&mut md, "FSCLTX", 178, 43)?;
        put(&mut md, "FSCATP", 221, 1)?;
        put(&mut md, "FSCAUT", 222, 40)?;
        put(&mut md, "FSCRSN", 262, 1)?;
        put(&mut md, "FSSRDT", 263, 8)?;
        put(&mut md, "FSCTLN", 271, 15)?;
        put(&mut md, "FSCOP", 286, 5)?;
        put(&mut md, "FSCPYS", 291, 5)?;
        put(&mut md, "ENCRYP", 296, 1)?;
        if let Some(bkgc) = r.bytes_at(297, 3) {
            md.insert(
                "FBKGC",
                format!("0x{:02X}{:02X}{:02X}", bkgc[0], bkgc[1], bkgc[2]),
            );
        }
        put(&mut md, "ONAME", 300, 24)?;
        put(&mut md, "OPHONE", 324, 18)?;
    }

    put(&mut md, "FL", layout.fl_offset, 12)?;
    put(&mut md, "HL", layout.hl_offset, 6)?;
    Ok(md)
}
