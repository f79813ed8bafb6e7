//! TRE wire framing: back-to-back records of
//! `<6-char tag><5-digit decimal length><payload>`.

use crate::error::{NitfError, Result};
use crate::field::parse_uint;

/// Width of a TRE tag.
pub const TRE_TAG_LEN: usize = 6;
/// Width of the decimal length field following the tag.
pub const TRE_LEN_DIGITS: usize = 5;
/// Combined prefix width before the payload.
pub const TRE_PREFIX_LEN: usize = TRE_TAG_LEN + TRE_LEN_DIGITS;

/// One framed record; the payload borrows from the owning blob.
#[derive(Debug, Clone, Copy)]
pub struct TreRecord<'a> {
    pub tag: &'a str,
    pub data: &'a [u8],
}

/// Parse the record at `offset`. The declared length is checked against the
/// remaining blob before any slice is taken.
pub fn read_record(blob: &[u8], offset: usize) -> Result<TreRecord<'_>> {
    let prefix = blob.get(offset..offset + TRE_PREFIX_LEN).ok_or_else(|| {
        NitfError::TreSize(format!(
            "TRE prefix at offset {} needs {} bytes, {} remain",
            offset,
            TRE_PREFIX_LEN,
            blob.len().saturating_sub(offset)
        ))
    })?;
    let tag = std::str::from_utf8(&prefix[..TRE_TAG_LEN])
        .map_err(|_| NitfError::TreSize(format!("non-ASCII TRE tag at offset {offset}")))?;
    let length = parse_uint(&prefix[TRE_TAG_LEN..]).ok_or_else(|| {
        NitfError::TreSize(format!("unparseable length for TRE {tag} at offset {offset}"))
    })? as usize;

    let start = offset + TRE_PREFIX_LEN;
    let data = blob.get(start..start + length).ok_or_else(|| {
        NitfError::TreSize(format!(
            "TRE {} declares {} bytes, only {} remain",
            tag.trim_end(),
            length,
            blob.len().saturating_sub(start)
        ))
    })?;
    Ok(TreRecord {
        tag: tag.trim_end(),
        data,
    })
}

/// First record matching `tag`, or `None`. Stops at the first framing
/// violation rather than scanning garbage.
pub fn find_tre<'a>(blob: &'a [u8], tag: &str) -> Option<&'a [u8]> {
    for rec in TreIter::new(blob) {
        match rec {
            Ok(rec) if rec.tag == tag => return Some(rec.data),
            Ok(_) => {}
            Err(_) => return None,
        }
    }
    None
}

/// Iterator over all framed records in a blob. A record whose declared
/// length exceeds the remaining bytes yields one error and ends iteration.
pub struct TreIter<'a> {
    blob: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> TreIter<'a> {
    pub fn new(blob: &'a [u8]) -> Self {
        Self {
            blob,
            offset: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for TreIter<'a> {
    type Item = Result<TreRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.blob.len() {
            return None;
        }
        match read_record(self.blob, self.offset) {
            Ok(rec) => {
                self.offset += TRE_PREFIX_LEN + rec.data.len();
                Some(Ok(rec))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: &str, payload: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(format!("{tag:<6}").as_bytes());
        v.extend_from_slice(format!("{:05}", payload.len()).as_bytes());
        v.extend_from_slice(payload);
        v
    }

    #[test]
    fn find_second_record() {
        let mut blob = frame("AAAAAA", b"xy");
        blob.extend_from_slice(&frame("BBBBBB", b"12345"));
        assert_eq!(find_tre(&blob, "BBBBBB"), Some(&b"12345"[..]));
        assert_eq!(find_tre(&blob, "CCCCCC"), None);
    }

    #[test]
    fn oversized_length_is_error() {
        let mut blob = b"AAAAAA99999".to_vec();
        blob.extend_from_slice(&[0u8; 50]);
        let mut it = TreIter::new(&blob);
        assert!(matches!(
            it.next(),
            Some(Err(crate::error::NitfError::TreSize(_)))
        ));
        assert!(it.next().is_none());
    }
}
