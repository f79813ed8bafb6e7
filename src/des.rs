//! Data Extension Segment subheaders and payload access.
//!
//! DES subheaders carry a four-byte user-subheader length (DESSHL) whose
//! content depends on DESID. Three identifiers get a field-level decode
//! (CSSHPA DES, XML_DATA_CONTENT, CSATTA DES); anything else keeps its
//! user subheader verbatim under the DESSHF key. TRE overflow segments
//! additionally name the header field they spilled from and the segment
//! item they belong to.

use crate::error::{NitfError, Result};
use crate::field::FieldReader;
use crate::header::Version;
use crate::metadata::MetadataMap;
use crate::tre::{read_record, TreRecord, TRE_PREFIX_LEN};

/// Fixed part of the subheader: DE + DESID + DESVER + security block.
const DES_FIXED_LEN: usize = 196;
/// Legacy downgrade marker offset within the security block.
const DES_DWNG_OFFSET: usize = 190;

/// Inline-versus-reference decision for DES payloads.
#[derive(Debug, Clone, Copy)]
pub struct DesPayloadPolicy {
    /// Payloads at or under this many bytes are loaded into memory.
    pub inline_limit: u64,
}

impl Default for DesPayloadPolicy {
    fn default() -> Self {
        DesPayloadPolicy {
            inline_limit: 10 * 1024 * 1024,
        }
    }
}

/// A DES payload, either materialized or left in the file.
#[derive(Debug, Clone)]
pub enum DesPayload {
    Inline(Vec<u8>),
    Ref { offset: u64, length: u64 },
}

/// Where an overflow DES spilled from: the originating header field name
/// (UDHD, XHD, UDID, IXSHD, SXSHD, TXSHD) and the 1-based segment item.
#[derive(Debug, Clone)]
pub struct OverflowLink {
    pub destination: String,
    pub item: u64,
}

/// Parsed DES subheader.
#[derive(Debug, Clone)]
pub struct DesSubheader {
    pub desid: String,
    pub desver: u64,
    /// Named subheader fields, including the DESID-specific user
    /// subheader decode (or verbatim DESSHF).
    pub fields: MetadataMap,
    /// Set when this segment is a TRE overflow container.
    pub overflow: Option<OverflowLink>,
    /// Total subheader bytes consumed, including the user subheader.
    pub subheader_len: usize,
}

impl DesSubheader {
    pub fn is_tre_overflow(&self) -> bool {
        self.overflow.is_some()
    }
}

fn short(what: &str) -> NitfError {
    NitfError::DesHeader(format!("DES subheader too small for {what}"))
}

/// Decode a DES subheader buffer.
pub fn parse_des_subheader(subheader: &[u8], version: Version) -> Result<DesSubheader> {
    let r = FieldReader::new(subheader);
    let mut md = MetadataMap::new();

    let part = r.str_at(0, 2).ok_or_else(|| short("DE"))?;
    if part != "DE" {
        return Err(NitfError::DesHeader(format!(
            "DES subheader starts with {part:?}, expected \"DE\""
        )));
    }
    let desid = r.trimmed_at(2, 25).ok_or_else(|| short("DESID"))?;
    let desver = r.uint_or_zero_at(27, 2).ok_or_else(|| short("DESVER"))?;
    md.insert("DESID", desid.clone());
    md.insert("DESVER", format!("{desver:02}"));
    md.insert("DECLAS", r.trimmed_at(29, 1).ok_or_else(|| short("DECLAS"))?);

    // Legacy files insert a 40-byte downgrade event after the marker.
    let mut off = DES_FIXED_LEN;
    if version.is_legacy() {
        let dwng = r
            .bytes_at(DES_DWNG_OFFSET, 6)
            .ok_or_else(|| short("DESDWNG"))?;
        if dwng == b"999998" {
            off += 40;
        }
    }

    // Overflow containers carry DESOFLW + DESITEM before DESSHL. Modern
    // files name them TRE_OVERFLOW; legacy files use the two extension
    // identifiers, or (for nonconforming writers) can only be told apart
    // by DESOFLW being alphabetic where DESSHL would be numeric.
    let declared_overflow = match version.is_legacy() {
        false => desid == "TRE_OVERFLOW",
        true => desid == "Registered Extensions" || desid == "Controlled Extensions",
    };
    let probable_overflow = version.is_legacy()
        && r.bytes_at(off, 4)
            .map(|b| b.iter().any(|c| !c.is_ascii_digit()))
            .unwrap_or(false);

    let mut overflow = None;
    if declared_overflow || probable_overflow {
        let destination = r.trimmed_at(off, 6).ok_or_else(|| short("DESOFLW"))?;
        let item = r.uint_or_zero_at(off + 6, 3).ok_or_else(|| short("DESITEM"))?;
        md.insert("DESOFLW", destination.clone());
        md.insert("DESITEM", format!("{item:03}"));
        overflow = Some(OverflowLink { destination, item });
        off += 9;
    }

    let desshl = r.uint_at(off, 4).ok_or_else(|| short("DESSHL"))? as usize;
    md.insert("DESSHL", format!("{desshl:04}"));
    off += 4;
    let user = r.bytes_at(off, desshl).ok_or_else(|| short("DESSHF"))?;
    decode_user_subheader(&desid, user, &mut md);
    off += desshl;

    Ok(DesSubheader {
        desid,
        desver,
        fields: md,
        overflow,
        subheader_len: off,
    })
}

/// DESID-specific user subheader decode. Unknown identifiers keep the raw
/// bytes under DESSHF.
fn decode_user_subheader(desid: &str, user: &[u8], md: &mut MetadataMap) {
    let r = FieldReader::new(user);
    let take = |md: &mut MetadataMap, off: &mut usize, name: &str, len: usize| -> bool {
        match r.trimmed_at(*off, len) {
            Some(v) => {
                md.insert(name, v);
                *off += len;
                true
            }
            None => false,
        }
    };
    match desid {
        "CSSHPA DES" => {
            let mut off = 0;
            take(md, &mut off, "SHAPE_USE", 25);
            take(md, &mut off, "SHAPE_CLASS", 10);
            if md.get("SHAPE_USE") == Some("CLOUD_SHAPES") {
                take(md, &mut off, "CC_SOURCE", 18);
            }
            for i in 1..=3 {
                take(md, &mut off, &format!("SHAPE{i}_NAME"), 3);
                take(md, &mut off, &format!("SHAPE{i}_START"), 6);
            }
        }
        "XML_DATA_CONTENT" => {
            let mut off = 0;
            take(md, &mut off, "DESCRC", 5);
            if user.len() >= 283 {
                take(md, &mut off, "DESSHFT", 8);
                take(md, &mut off, "DESSHDT", 20);
                take(md, &mut off, "DESSHRP", 40);
                take(md, &mut off, "DESSHSI", 60);
                take(md, &mut off, "DESSHSV", 10);
                take(md, &mut off, "DESSHSD", 20);
                take(md, &mut off, "DESSHTN", 120);
            }
            if user.len() >= 773 {
                take(md, &mut off, "DESSHLPG", 125);
                take(md, &mut off, "DESSHLPT", 25);
                take(md, &mut off, "DESSHLI", 20);
                take(md, &mut off, "DESSHLIN", 120);
                take(md, &mut off, "DESSHABS", 200);
            }
        }
        "CSATTA DES" => {
            let mut off = 0;
            take(md, &mut off, "ATT_TYPE", 12);
            take(md, &mut off, "DT_ATT", 14);
            take(md, &mut off, "DATE_ATT", 8);
            take(md, &mut off, "T0_ATT", 13);
            take(md, &mut off, "NUM_ATT", 5);
        }
        _ => {
            md.insert("DESSHF", String::from_utf8_lossy(user).to_string());
        }
    }
}

/// Read the nested TRE record at `offset` within an overflow DES payload.
/// Returns `None` at the exact end of the payload; a record that would not
/// fit its 11-byte prefix or its declared length is an error.
pub fn read_des_tre(payload: &[u8], offset: usize) -> Result<Option<TreRecord<'_>>> {
    if offset == payload.len() {
        return Ok(None);
    }
    if offset + TRE_PREFIX_LEN > payload.len() {
        return Err(NitfError::TreSize(format!(
            "overflow DES payload of {} bytes cannot hold a TRE prefix at offset {}",
            payload.len(),
            offset
        )));
    }
    read_record(payload, offset).map(Some)
}

/// One member file of an embedded shapefile trio.
#[derive(Debug, Clone)]
pub struct ShapefilePart {
    /// Extension from SHAPEn_NAME: SHP, SHX or DBF.
    pub name: String,
    pub data: Vec<u8>,
}

/// Split a CSSHPA DES payload into its shapefile members using the
/// SHAPEn_NAME / SHAPEn_START user subheader fields. Each member runs to
/// the next declared start, the last to the end of the payload.
pub fn extract_shapefile(subheader: &DesSubheader, payload: &[u8]) -> Result<Vec<ShapefilePart>> {
    if subheader.desid != "CSSHPA DES" {
        return Err(NitfError::DesHeader(format!(
            "segment {:?} is not a shapefile DES",
            subheader.desid
        )));
    }
    let mut parts: Vec<(String, usize)> = Vec::new();
    for i in 1..=3 {
        let name = subheader.fields.get(&format!("SHAPE{i}_NAME"));
        let start = subheader
            .fields
            .get(&format!("SHAPE{i}_START"))
            .and_then(|v| crate::field::parse_uint(v.as_bytes()));
        if let (Some(name), Some(start)) = (name, start) {
            parts.push((name.to_string(), start as usize));
        }
    }
    if parts.is_empty() {
        return Err(NitfError::DesHeader(
            "shapefile DES declares no member offsets".into(),
        ));
    }
    parts.sort_by_key(|(_, start)| *start);
    let mut out = Vec::with_capacity(parts.len());
    for (i, (name, start)) in parts.iter().enumerate() {
        let end = parts
            .get(i + 1)
            .map(|(_, s)| *s)
            .unwrap_or(payload.len());
        if *start > end || end > payload.len() {
            return Err(NitfError::DesHeader(format!(
                "shapefile member {name} spans {start}..{end} outside a {} byte payload",
                payload.len()
            )));
        }
        out.push(ShapefilePart {
            name: name.clone(),
            data: payload[*start..end].to_vec(),
        });
    }
    Ok(out)
}
