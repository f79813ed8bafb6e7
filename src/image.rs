//! Image segment subheader: the structural fields the container layer
//! needs (dimensions, display/attachment levels, location) and the
//! per-image TRE blob feeding the RPC model and generic TRE decoding.
//!
//! Only the structural walk is done here; pixel block decoding belongs to
//! the raster codecs, which consume the byte ranges this module exposes.

use crate::error::{NitfError, Result};
use crate::field::FieldReader;
use crate::header::Version;
use crate::metadata::MetadataMap;

/// Parsed image subheader.
#[derive(Debug, Clone)]
pub struct ImageSegment {
    /// Named subheader fields in decode order.
    pub fields: MetadataMap,
    pub nrows: u64,
    pub ncols: u64,
    pub nbands: u64,
    /// Geolocation quad, when ICORDS declares one.
    pub igeolo: Option<String>,
    pub idlvl: i32,
    pub ialvl: i32,
    /// (row, col) offset relative to the attachment parent.
    pub iloc: (i32, i32),
    /// Concatenated UDID + IXSHD TRE bytes.
    pub tre: Vec<u8>,
}

fn short(what: &str, offset: usize) -> NitfError {
    NitfError::CorruptHeader(format!("image subheader truncated at {what} (offset {offset})"))
}

impl ImageSegment {
    /// Walk the subheader buffer. The walk is sequential because IGEOLO,
    /// the comment list, the compression rate field, and the band table
    /// are all conditionally present.
    pub fn parse(subheader: &[u8], version: Version) -> Result<ImageSegment> {
        let r = FieldReader::new(subheader);
        let mut md = MetadataMap::new();

        let part = r.str_at(0, 2).ok_or_else(|| short("IM", 0))?;
        if part != "IM" {
            return Err(NitfError::CorruptHeader(format!(
                "image subheader starts with {part:?}, expected \"IM\""
            )));
        }
        md.insert("IID1", r.trimmed_at(2, 10).ok_or_else(|| short("IID1", 2))?);
        md.insert("IDATIM", r.trimmed_at(12, 14).ok_or_else(|| short("IDATIM", 12))?);
        md.insert("TGTID", r.trimmed_at(26, 17).ok_or_else(|| short("TGTID", 26))?);
        md.insert("IID2", r.trimmed_at(43, 80).ok_or_else(|| short("IID2", 43))?);
        md.insert("ISCLAS", r.trimmed_at(123, 1).ok_or_else(|| short("ISCLAS", 123))?);

        // Security block: 167 bytes in both layouts, plus the legacy
        // conditional 40-byte downgrade event.
        let mut shift = 0usize;
        if version.is_legacy() {
            let dwng = r.bytes_at(284, 6).ok_or_else(|| short("ISDWNG", 284))?;
            if dwng == b"999998" {
                shift = 40;
            }
        }
        let mut off = 290 + shift;

        md.insert("ENCRYP", r.trimmed_at(off, 1).ok_or_else(|| short("ENCRYP", off))?);
        off += 1;
        md.insert("ISORCE", r.trimmed_at(off, 42).ok_or_else(|| short("ISORCE", off))?);
        off += 42;

        let nrows = r.uint_at(off, 8).ok_or_else(|| short("NROWS", off))?;
        md.insert("NROWS", nrows.to_string());
        off += 8;
        let ncols = r.uint_at(off, 8).ok_or_else(|| short("NCOLS", off))?;
        md.insert("NCOLS", ncols.to_string());
        off += 8;

        md.insert("PVTYPE", r.trimmed_at(off, 3).ok_or_else(|| short("PVTYPE", off))?);
        md.insert("IREP", r.trimmed_at(off + 3, 8).ok_or_else(|| short("IREP", off + 3))?);
        md.insert("ICAT", r.trimmed_at(off + 11, 8).ok_or_else(|| short("ICAT", off + 11))?);
        md.insert("ABPP", r.trimmed_at(off + 19, 2).ok_or_else(|| short("ABPP", off + 19))?);
        md.insert("PJUST", r.trimmed_at(off + 21, 1).ok_or_else(|| short("PJUST", off + 21))?);
        off += 22;

        let icords = r.bytes_at(off, 1).ok_or_else(|| short("ICORDS", off))?[0];
        md.insert("ICORDS", (icords as char).to_string());
        off += 1;
        // Legacy files mark "no geolocation" with 'N'; modern files with a
        // blank.
        let has_igeolo = if version.is_legacy() {
            icords != b'N'
        } else {
            icords != b' '
        };
        let mut igeolo = None;
        if has_igeolo {
            let quad = r.str_at(off, 60).ok_or_else(|| short("IGEOLO", off))?;
            md.insert("IGEOLO", quad.clone());
            igeolo = Some(quad);
            off += 60;
        }

        let nicom = r.uint_at(off, 1).ok_or_else(|| short("NICOM", off))?;
        off += 1;
        for i in 0..nicom {
            let comment = r.trimmed_at(off, 80).ok_or_else(|| short("ICOM", off))?;
            md.insert(format!("ICOM{}", i + 1), comment);
            off += 80;
        }

        let ic = r.str_at(off, 2).ok_or_else(|| short("IC", off))?;
        md.insert("IC", ic.clone());
        off += 2;
        if ic != "NC" && ic != "NM" {
            md.insert("COMRAT", r.trimmed_at(off, 4).ok_or_else(|| short("COMRAT", off))?);
            off += 4;
        }

        let mut nbands = r.uint_at(off, 1).ok_or_else(|| short("NBANDS", off))?;
        off += 1;
        if nbands == 0 {
            nbands = r.uint_at(off, 5).ok_or_else(|| short("XBANDS", off))?;
            off += 5;
        }
        for b in 0..nbands {
            md.insert(
                format!("IREPBAND{}", b + 1),
                r.trimmed_at(off, 2).ok_or_else(|| short("IREPBAND", off))?,
            );
            md.insert(
                format!("ISUBCAT{}", b + 1),
                r.trimmed_at(off + 2, 6).ok_or_else(|| short("ISUBCAT", off + 2))?,
            );
            off += 12; // IREPBAND + ISUBCAT + IFC + IMFLT
            let nluts = r.uint_at(off, 1).ok_or_else(|| short("NLUTS", off))?;
            off += 1;
            if nluts > 0 {
                let nelut = r.uint_at(off, 5).ok_or_else(|| short("NELUT", off))?;
                off += 5 + (nluts * nelut) as usize;
            }
        }

        // ISYNC, IMODE, NBPR, NBPC, NPPBH, NPPBV, NBPP.
        md.insert("IMODE", r.trimmed_at(off + 1, 1).ok_or_else(|| short("IMODE", off + 1))?);
        md.insert("NBPR", r.trimmed_at(off + 2, 4).ok_or_else(|| short("NBPR", off + 2))?);
        md.insert("NBPC", r.trimmed_at(off + 6, 4).ok_or_else(|| short("NBPC", off + 6))?);
        md.insert("NPPBH", r.trimmed_at(off + 10, 4).ok_or_else(|| short("NPPBH", off + 10))?);
        md.insert("NPPBV", r.trimmed_at(off + 14, 4).ok_or_else(|| short("NPPBV", off + 14))?);
        md.insert("NBPP", r.trimmed_at(off + 18, 2).ok_or_else(|| short("NBPP", off + 18))?);
        off += 20;

        let idlvl = r.int_at(off, 3).ok_or_else(|| short("IDLVL", off))? as i32;
        let ialvl = r.int_at(off + 3, 3).ok_or_else(|| short("IALVL", off + 3))? as i32;
        let loc_row = r.int_at(off + 6, 5).ok_or_else(|| short("ILOC", off + 6))? as i32;
        let loc_col = r.int_at(off + 11, 5).ok_or_else(|| short("ILOC", off + 11))? as i32;
        md.insert("IDLVL", idlvl.to_string());
        md.insert("IALVL", ialvl.to_string());
        md.insert("ILOC_ROW", loc_row.to_string());
        md.insert("ILOC_COLUMN", loc_col.to_string());
        off += 16;
        md.insert("IMAG", r.trimmed_at(off, 4).ok_or_else(|| short("IMAG", off))?);
        off += 4;

        // UDID and IXSHD TRE spans, concatenated into one blob. Both use
        // the 3-byte overflow-index convention when non-empty.
        let mut tre = Vec::new();
        for name in ["UDIDL", "IXSHDL"] {
            let decl = r.uint_at(off, 5).ok_or_else(|| short(name, off))? as usize;
            off += 5;
            if decl > 0 {
                if decl < 3 {
                    return Err(NitfError::CorruptHeader(format!(
                        "image subheader {name} of {decl} cannot hold its overflow index"
                    )));
                }
                let span = r
                    .bytes_at(off + 3, decl - 3)
                    .ok_or_else(|| short(name, off))?;
                tre.extend_from_slice(span);
                off += decl;
            }
        }

        Ok(ImageSegment {
            fields: md,
            nrows,
            ncols,
            nbands,
            igeolo,
            idlvl,
            ialvl,
            iloc: (loc_row, loc_col),
            tre,
        })
    }
}
