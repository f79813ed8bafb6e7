//! Segment catalog: the per-kind count and header/data length tables at the
//! end of the file header, turned into descriptors with absolute byte
//! ranges. One running data cursor is shared across all six kinds.

use crate::error::{NitfError, Result};
use crate::field::FieldReader;
use crate::header::Version;

/// Width of every segment count field.
const COUNT_DIGITS: usize = 3;

/// DE subheader length some producers encode when the overflow linkage
/// fields are present; the true length is 209.
const DES_HEADER_LEN_WRONG: u64 = 207;
const DES_HEADER_LEN_FIXED: u64 = 209;

/// Segment kinds in their fixed file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SegmentKind {
    Image,
    Graphic,
    Label,
    Text,
    DataExtension,
    ReservedExtension,
}

impl SegmentKind {
    /// Two-letter tag used in segment subheaders and diagnostics.
    pub fn tag(self) -> &'static str {
        match self {
            SegmentKind::Image => "IM",
            SegmentKind::Graphic => "GR",
            SegmentKind::Label => "LA",
            SegmentKind::Text => "TX",
            SegmentKind::DataExtension => "DE",
            SegmentKind::ReservedExtension => "RE",
        }
    }

    /// Decimal digits of the subheader length field for this kind.
    pub fn header_len_digits(self) -> usize {
        match self {
            SegmentKind::Image => 6,
            _ => 4,
        }
    }

    /// Decimal digits of the data length field for this kind.
    pub fn data_len_digits(self) -> usize {
        match self {
            SegmentKind::Image => 10,
            SegmentKind::Graphic => 6,
            SegmentKind::Label => 3,
            SegmentKind::Text => 5,
            SegmentKind::DataExtension => 9,
            SegmentKind::ReservedExtension => 7,
        }
    }
}

/// One entry of the segment catalog: absolute subheader and data ranges
/// plus the attachment fields filled in by the attachment resolver.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SegmentInfo {
    pub kind: SegmentKind,
    pub header_offset: u64,
    pub header_len: u64,
    pub data_offset: u64,
    pub data_len: u64,
    /// Display level (DLVL); 0 when the segment carries none.
    pub dlvl: i32,
    /// Attachment level (ALVL); < 1 means unattached.
    pub alvl: i32,
    /// Own location (row, col) relative to the attachment parent.
    pub loc: (i32, i32),
    /// Cumulative placement in the common coordinate system; `None` until
    /// the resolver runs (or when the segment is unreachable).
    pub ccs: Option<(i32, i32)>,
}

impl SegmentInfo {
    fn new(kind: SegmentKind, header_offset: u64, header_len: u64, data_len: u64) -> Self {
        Self {
            kind,
            header_offset,
            header_len,
            data_offset: header_offset + header_len,
            data_len,
            dlvl: 0,
            alvl: 0,
            loc: (0, 0),
            ccs: None,
        }
    }

    /// End of the data range (exclusive).
    pub fn data_end(&self) -> u64 {
        self.data_offset + self.data_len
    }
}

/// Parse one kind's table at `*table_off`, appending descriptors and
/// advancing both the table cursor and the shared data cursor.
fn collect_kind(
    reader: &FieldReader,
    kind: SegmentKind,
    table_off: &mut usize,
    data_cursor: &mut u64,
    out: &mut Vec<SegmentInfo>,
) -> Result<()> {
    let count = reader
        .uint_at(*table_off, COUNT_DIGITS)
        .ok_or_else(|| table_error(kind, "segment count", *table_off))?;
    *table_off += COUNT_DIGITS;

    let hw = kind.header_len_digits();
    let dw = kind.data_len_digits();
    for i in 0..count {
        let mut header_len = reader
            .uint_at(*table_off, hw)
            .ok_or_else(|| table_error(kind, "subheader length", *table_off))?;
        let data_len = reader
            .uint_at(*table_off + hw, dw)
            .ok_or_else(|| table_error(kind, "data length", *table_off + hw))?;
        *table_off += hw + dw;

        if kind == SegmentKind::DataExtension && header_len == DES_HEADER_LEN_WRONG {
            header_len = DES_HEADER_LEN_FIXED;
        }
        if header_len == 0 {
            return Err(NitfError::SegmentTable(format!(
                "{} segment {} declares a zero-length subheader",
                kind.tag(),
                i + 1
            )));
        }

        out.push(SegmentInfo::new(kind, *data_cursor, header_len, data_len));
        *data_cursor += header_len + data_len;
    }
    Ok(())
}

fn table_error(kind: SegmentKind, what: &str, offset: usize) -> NitfError {
    NitfError::SegmentTable(format!(
        "{} {} at header offset {} is missing, out of bounds, or signed",
        kind.tag(),
        what,
        offset
    ))
}

/// Parse all segment tables starting at `segments_offset` in the header
/// buffer. Segment data begins right after the header, so the shared data
/// cursor starts at the declared header length.
///
/// Returns the descriptors and the header offset just past the last table
/// (where the file-level TRE length fields begin).
pub fn collect_segments(
    header: &[u8],
    segments_offset: usize,
    version: Version,
    header_len: u64,
) -> Result<(Vec<SegmentInfo>, usize)> {
    let reader = FieldReader::new(header);
    let mut table_off = segments_offset;
    let mut data_cursor = header_len;
    let mut out = Vec::new();

    collect_kind(&reader, SegmentKind::Image, &mut table_off, &mut data_cursor, &mut out)?;
    collect_kind(&reader, SegmentKind::Graphic, &mut table_off, &mut data_cursor, &mut out)?;
    if version.is_legacy() {
        collect_kind(&reader, SegmentKind::Label, &mut table_off, &mut data_cursor, &mut out)?;
    } else {
        // NUMX: reserved in 02.10/NSIF, count only, never any entries.
        reader
            .uint_at(table_off, COUNT_DIGITS)
            .ok_or_else(|| table_error(SegmentKind::Label, "reserved count", table_off))?;
        table_off += COUNT_DIGITS;
    }
    collect_kind(&reader, SegmentKind::Text, &mut table_off, &mut data_cursor, &mut out)?;
    collect_kind(&reader, SegmentKind::DataExtension, &mut table_off, &mut data_cursor, &mut out)?;
    collect_kind(&reader, SegmentKind::ReservedExtension, &mut table_off, &mut data_cursor, &mut out)?;

    Ok((out, table_off))
}

/// Check every descriptor's ranges against the physical file length.
pub fn validate_segment_ranges(segments: &[SegmentInfo], file_len: u64) -> Result<()> {
    for (i, seg) in segments.iter().enumerate() {
        if seg.data_end() > file_len {
            return Err(NitfError::SegmentTable(format!(
                "{} segment {} spans {}..{} past the file end at {}",
                seg.kind.tag(),
                i,
                seg.header_offset,
                seg.data_end(),
                file_len
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_widths() {
        assert_eq!(SegmentKind::Image.header_len_digits(), 6);
        assert_eq!(SegmentKind::Image.data_len_digits(), 10);
        assert_eq!(SegmentKind::Label.data_len_digits(), 3);
        assert_eq!(SegmentKind::DataExtension.data_len_digits(), 9);
    }

    #[test]
    fn des_header_len_fixup() {
        // 02.10 table: no images/graphics, reserved, no text, one DES with
        // the known-wrong 207 subheader length, no RES.
        let mut table = Vec::new();
        table.extend_from_slice(b"000"); // NUMI
        table.extend_from_slice(b"000"); // NUMS
        table.extend_from_slice(b"000"); // NUMX
        table.extend_from_slice(b"000"); // NUMT
        table.extend_from_slice(b"001"); // NUMDES
        table.extend_from_slice(b"0207");
        table.extend_from_slice(b"000000100");
        table.extend_from_slice(b"000"); // NUMRES
        let (segs, _) = collect_segments(&table, 0, Version::Nitf0210, 500).unwrap();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].header_len, 209);
        assert_eq!(segs[0].data_offset, 709);
    }
}
