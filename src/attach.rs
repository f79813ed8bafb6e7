//! Attachment levels: pulling display/attachment levels and locations out
//! of image, graphic, and label subheaders, then resolving every segment's
//! placement in the common coordinate system.
//!
//! Resolution is a fixed-point iteration, so segment order in the file does
//! not matter: a child can precede its parent and still resolve on a later
//! pass. Anything still unresolved when a pass makes no progress points at
//! a missing or cyclic parent.

use crate::error::{NitfError, Result};
use crate::field::FieldReader;
use crate::header::Version;
use crate::image::ImageSegment;
use crate::segments::{SegmentInfo, SegmentKind};

/// Display level, attachment level, (row, col) location.
pub type AttachmentFields = (i32, i32, (i32, i32));

/// Copy the attachment fields of a parsed image subheader into its catalog
/// entry.
pub fn fill_image_levels(seg: &mut SegmentInfo, image: &ImageSegment) {
    seg.dlvl = image.idlvl;
    seg.alvl = image.ialvl;
    seg.loc = image.iloc;
}

/// Read SDLVL/SALVL/SLOC out of a graphic subheader. Legacy files shift the
/// window by 40 bytes when the security downgrade marker is set.
pub fn graphic_levels(subheader: &[u8], version: Version) -> Result<AttachmentFields> {
    // SY + SID + SNAME = 32 bytes ahead of the security block.
    let shift = legacy_shift(subheader, version, 193)?;
    read_levels(subheader, 214 + shift, "graphic")
}

/// Read LDLVL/LALVL/LLOC out of a label subheader (legacy files only carry
/// label segments).
pub fn label_levels(subheader: &[u8], version: Version) -> Result<AttachmentFields> {
    // LA + LID = 12 bytes ahead of the security block.
    let shift = legacy_shift(subheader, version, 173)?;
    read_levels(subheader, 185 + shift, "label")
}

fn legacy_shift(subheader: &[u8], version: Version, dwng_offset: usize) -> Result<usize> {
    if !version.is_legacy() {
        return Ok(0);
    }
    let window = subheader.get(dwng_offset..dwng_offset + 6).ok_or_else(|| {
        NitfError::CorruptHeader(format!(
            "subheader of {} bytes is too small for its security block",
            subheader.len()
        ))
    })?;
    Ok(if window == b"999998" { 40 } else { 0 })
}

fn read_levels(subheader: &[u8], offset: usize, what: &str) -> Result<AttachmentFields> {
    let r = FieldReader::new(subheader);
    let bad = |field: &str| {
        NitfError::CorruptHeader(format!("{what} subheader {field} is missing or non-numeric"))
    };
    let dlvl = r.int_at(offset, 3).ok_or_else(|| bad("display level"))? as i32;
    let alvl = r.int_at(offset + 3, 3).ok_or_else(|| bad("attachment level"))? as i32;
    let row = r.int_at(offset + 6, 5).ok_or_else(|| bad("location row"))? as i32;
    let col = r.int_at(offset + 11, 5).ok_or_else(|| bad("location column"))? as i32;
    Ok((dlvl, alvl, (row, col)))
}

/// Resolve common-coordinate-system placements for every segment carrying a
/// display level. Unattached segments (attachment level below 1) sit at
/// their own location; attached segments add their location to the resolved
/// placement of the parent whose display level equals their attachment
/// level.
pub fn reconcile_attachments(segments: &mut [SegmentInfo]) -> Result<()> {
    loop {
        let mut progressed = false;
        for i in 0..segments.len() {
            if segments[i].ccs.is_some() || !participates(&segments[i]) {
                continue;
            }
            if segments[i].alvl < 1 {
                segments[i].ccs = Some(segments[i].loc);
                progressed = true;
                continue;
            }
            let parent_ccs = segments
                .iter()
                .find(|p| participates(p) && p.dlvl == segments[i].alvl)
                .and_then(|p| p.ccs);
            if let Some((prow, pcol)) = parent_ccs {
                let (row, col) = segments[i].loc;
                segments[i].ccs = Some((prow + row, pcol + col));
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    let unresolved: Vec<String> = segments
        .iter()
        .enumerate()
        .filter(|(_, s)| participates(s) && s.ccs.is_none())
        .map(|(i, s)| format!("{} segment {} (attachment level {})", s.kind.tag(), i, s.alvl))
        .collect();
    if unresolved.is_empty() {
        Ok(())
    } else {
        Err(NitfError::UnresolvedAttachment(unresolved.join(", ")))
    }
}

/// Only image, graphic, and label segments carry attachment fields, and
/// only once a display level was actually decoded for them.
fn participates(seg: &SegmentInfo) -> bool {
    matches!(
        seg.kind,
        SegmentKind::Image | SegmentKind::Graphic | SegmentKind::Label
    ) && seg.dlvl > 0
}
