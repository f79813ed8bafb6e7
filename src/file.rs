//! The container: opening a file, locating the header (directly or through
//! the streaming-writer replica at the end of the file), building the
//! segment catalog, and serving segment bytes on demand.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::attach::{self, reconcile_attachments};
use crate::des::{parse_des_subheader, DesPayload, DesPayloadPolicy, DesSubheader};
use crate::error::{NitfError, Result};
use crate::field::{parse_uint, FieldReader};
use crate::header::{
    decode_header_fields, HeaderLayout, Version, FL_PLACEHOLDER, SFH_DELIM1, SFH_DELIM2,
    SFH_LEN_DIGITS,
};
use crate::image::ImageSegment;
use crate::metadata::MetadataMap;
use crate::rpc::RpcModel;
use crate::segments::{collect_segments, validate_segment_ranges, SegmentInfo, SegmentKind};

/// How many bytes to probe at the start of the file before the header
/// length is known. Covers the magic, the legacy downgrade marker, and the
/// FL/HL fields under the largest possible shift.
const HEADER_PROBE_LEN: u64 = 1024;

/// An open NITF container.
#[derive(Debug)]
pub struct NitfFile {
    file: File,
    path: PathBuf,
    pub version: Version,
    pub file_len: u64,
    pub header_len: u64,
    /// Named fixed fields of the file header.
    pub header_fields: MetadataMap,
    pub segments: Vec<SegmentInfo>,
    /// Concatenated UDHD + XHD TRE bytes from the file header.
    file_tre: Vec<u8>,
    /// True when the header came from the trailing streaming replica.
    pub streaming: bool,
    pub des_policy: DesPayloadPolicy,
    des_cache: HashMap<usize, DesSubheader>,
    image_cache: HashMap<usize, ImageSegment>,
    /// Set when attachment reconciliation left segments unplaced; those
    /// segments keep `ccs: None` while the rest stay resolved.
    attachment_error: Option<NitfError>,
}

impl NitfFile {
    /// Open a container read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<NitfFile> {
        let file = File::open(path.as_ref())?;
        Self::from_file(file, path.as_ref().to_path_buf())
    }

    /// Open a container with write access kept on the handle, for callers
    /// that patch header fields in place after inspection.
    pub fn open_updatable(path: impl AsRef<Path>) -> Result<NitfFile> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        Self::from_file(file, path.as_ref().to_path_buf())
    }

    fn from_file(mut file: File, path: PathBuf) -> Result<NitfFile> {
        let file_len = file.metadata()?.len();
        let (version, header, streaming) = load_header(&mut file, file_len)?;

        let layout = HeaderLayout::resolve(version, &header)?;
        if header.len() < layout.min_header_len() {
            return Err(NitfError::CorruptHeader(format!(
                "header of {} bytes cannot hold the segment tables (minimum {})",
                header.len(),
                layout.min_header_len()
            )));
        }
        let header_fields = decode_header_fields(version, &header)?;
        let header_len = header.len() as u64;

        let (mut segments, after_tables) =
            collect_segments(&header, layout.segments_offset, version, header_len)?;
        validate_segment_ranges(&segments, file_len)?;

        let file_tre = collect_file_tre(&header, after_tables)?;

        let mut this = NitfFile {
            file,
            path,
            version,
            file_len,
            header_len,
            header_fields,
            segments: Vec::new(),
            file_tre,
            streaming,
            des_policy: DesPayloadPolicy::default(),
            des_cache: HashMap::new(),
            image_cache: HashMap::new(),
            attachment_error: None,
        };
        this.fill_attachment_fields(&mut segments)?;
        // A broken attachment graph does not void the open: reachable
        // segments keep their resolved placements, unreachable ones stay
        // at `ccs: None`, and the failure is kept for callers that care.
        this.attachment_error = reconcile_attachments(&mut segments).err();
        this.segments = segments;
        Ok(this)
    }

    /// The reconciliation failure, when one or more segments could not be
    /// placed in the common coordinate system.
    pub fn attachment_error(&self) -> Option<&NitfError> {
        self.attachment_error.as_ref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file-level TRE blob (UDHD then XHD spans).
    pub fn file_tre(&self) -> &[u8] {
        &self.file_tre
    }

    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        read_at(&mut self.file, offset, len)
    }

    fn segment(&self, index: usize) -> Result<SegmentInfo> {
        self.segments.get(index).cloned().ok_or_else(|| {
            NitfError::SegmentTable(format!(
                "segment index {} out of range ({} segments)",
                index,
                self.segments.len()
            ))
        })
    }

    /// Raw subheader bytes of one segment.
    pub fn read_segment_header(&mut self, index: usize) -> Result<Vec<u8>> {
        let seg = self.segment(index)?;
        self.read_at(seg.header_offset, seg.header_len as usize)
    }

    /// Full data payload of one segment.
    pub fn read_segment_data(&mut self, index: usize) -> Result<Vec<u8>> {
        let seg = self.segment(index)?;
        self.read_at(seg.data_offset, seg.data_len as usize)
    }

    /// A sub-range of one segment's data payload.
    pub fn read_segment_data_range(&mut self, index: usize, offset: u64, len: usize) -> Result<Vec<u8>> {
        let seg = self.segment(index)?;
        let end = offset.checked_add(len as u64).ok_or_else(|| {
            NitfError::SegmentTable(format!(
                "range {offset}+{len} in segment {index} overflows"
            ))
        })?;
        if end > seg.data_len {
            return Err(NitfError::SegmentTable(format!(
                "range {}+{} exceeds the {} byte data payload of segment {}",
                offset, len, seg.data_len, index
            )));
        }
        self.read_at(seg.data_offset + offset, len)
    }

    /// Parse (and cache) the subheader of an image segment.
    pub fn image(&mut self, index: usize) -> Result<ImageSegment> {
        if let Some(image) = self.image_cache.get(&index) {
            return Ok(image.clone());
        }
        let seg = self.segment(index)?;
        if seg.kind != SegmentKind::Image {
            return Err(NitfError::SegmentTable(format!(
                "segment {} is {}, not an image",
                index,
                seg.kind.tag()
            )));
        }
        let subheader = self.read_at(seg.header_offset, seg.header_len as usize)?;
        let image = ImageSegment::parse(&subheader, self.version)?;
        self.image_cache.insert(index, image.clone());
        Ok(image)
    }

    /// The RPC sensor model of an image segment, when its TRE blob carries
    /// one.
    pub fn rpc(&mut self, index: usize) -> Result<Option<RpcModel>> {
        let image = self.image(index)?;
        match RpcModel::from_tre_blob(&image.tre) {
            Some(model) => Ok(Some(model?)),
            None => Ok(None),
        }
    }

    /// Parse (and cache) the subheader of a data extension segment.
    pub fn des(&mut self, index: usize) -> Result<DesSubheader> {
        if let Some(sub) = self.des_cache.get(&index) {
            return Ok(sub.clone());
        }
        let seg = self.segment(index)?;
        if seg.kind != SegmentKind::DataExtension {
            return Err(NitfError::DesHeader(format!(
                "segment {} is {}, not a data extension",
                index,
                seg.kind.tag()
            )));
        }
        let subheader = self.read_at(seg.header_offset, seg.header_len as usize)?;
        let sub = parse_des_subheader(&subheader, self.version)?;
        self.des_cache.insert(index, sub.clone());
        Ok(sub)
    }

    /// The payload of a data extension segment, inlined when it fits the
    /// policy limit and left as a file reference otherwise.
    pub fn des_payload(&mut self, index: usize) -> Result<DesPayload> {
        let seg = self.segment(index)?;
        if seg.data_len <= self.des_policy.inline_limit {
            Ok(DesPayload::Inline(
                self.read_at(seg.data_offset, seg.data_len as usize)?,
            ))
        } else {
            Ok(DesPayload::Ref {
                offset: seg.data_offset,
                length: seg.data_len,
            })
        }
    }

    /// Pull DLVL/ALVL/LOC out of every image, graphic, and label subheader
    /// ahead of attachment resolution.
    fn fill_attachment_fields(&mut self, segments: &mut [SegmentInfo]) -> Result<()> {
        for (index, seg) in segments.iter_mut().enumerate() {
            match seg.kind {
                SegmentKind::Image => {
                    let subheader = read_at(&mut self.file, seg.header_offset, seg.header_len as usize)?;
                    let image = ImageSegment::parse(&subheader, self.version)?;
                    attach::fill_image_levels(seg, &image);
                    self.image_cache.insert(index, image);
                }
                SegmentKind::Graphic => {
                    let subheader = read_at(&mut self.file, seg.header_offset, seg.header_len as usize)?;
                    let (dlvl, alvl, loc) = attach::graphic_levels(&subheader, self.version)?;
                    seg.dlvl = dlvl;
                    seg.alvl = alvl;
                    seg.loc = loc;
                }
                SegmentKind::Label => {
                    let subheader = read_at(&mut self.file, seg.header_offset, seg.header_len as usize)?;
                    let (dlvl, alvl, loc) = attach::label_levels(&subheader, self.version)?;
                    seg.dlvl = dlvl;
                    seg.alvl = alvl;
                    seg.loc = loc;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn read_at(file: &mut File, offset: u64, len: usize) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// Locate and read the full file header. A streaming writer leaves the
/// all-nines placeholder in FL and replicates the completed header at the
/// end of the file; that substitution is attempted exactly once.
fn load_header(file: &mut File, file_len: u64) -> Result<(Version, Vec<u8>, bool)> {
    let probe_len = file_len.min(HEADER_PROBE_LEN) as usize;
    let mut buf = read_at(file, 0, probe_len)?;
    let version = Version::from_magic(&buf).ok_or_else(|| {
        NitfError::Format("file does not start with a recognized NITF/NSIF version".into())
    })?;

    let mut streaming = false;
    loop {
        let layout = HeaderLayout::resolve(version, &buf)?;
        let r = FieldReader::new(&buf);
        let fl = r.bytes_at(layout.fl_offset, 12).ok_or_else(|| {
            NitfError::CorruptHeader(format!(
                "header buffer of {} bytes ends before the file length field",
                buf.len()
            ))
        })?;
        if fl == FL_PLACEHOLDER {
            if streaming {
                return Err(NitfError::CorruptHeader(
                    "streaming header replica still carries the file length placeholder".into(),
                ));
            }
            streaming = true;
            buf = read_streaming_replica(file, file_len)?;
            if Version::from_magic(&buf) != Some(version) {
                return Err(NitfError::CorruptHeader(
                    "streaming header replica disagrees with the leading version magic".into(),
                ));
            }
            continue;
        }

        let hl = r
            .uint_at(layout.hl_offset, 6)
            .ok_or_else(|| NitfError::CorruptHeader("header length field is non-numeric".into()))?
            as usize;
        if hl < layout.min_header_len() {
            return Err(NitfError::CorruptHeader(format!(
                "declared header length {} is below the {} byte minimum",
                hl,
                layout.min_header_len()
            )));
        }
        let header = if streaming {
            if buf.len() < hl {
                return Err(NitfError::CorruptHeader(format!(
                    "streaming replica of {} bytes is shorter than the declared header length {}",
                    buf.len(),
                    hl
                )));
            }
            buf[..hl].to_vec()
        } else {
            if (hl as u64) > file_len {
                return Err(NitfError::CorruptHeader(format!(
                    "declared header length {} exceeds the {} byte file",
                    hl, file_len
                )));
            }
            read_at(file, 0, hl)?
        };
        return Ok((version, header, streaming));
    }
}

/// Find the replicated header a streaming writer appends: the last 11
/// bytes hold a delimiter and the replica length, the replica itself opens
/// with a matching delimiter and length just before its header copy.
fn read_streaming_replica(file: &mut File, file_len: u64) -> Result<Vec<u8>> {
    let trailer_len = (SFH_DELIM2.len() + SFH_LEN_DIGITS) as u64;
    if file_len < 2 * trailer_len {
        return Err(NitfError::CorruptHeader(
            "file is too short to carry a streaming header replica".into(),
        ));
    }
    let trailer = read_at(file, file_len - trailer_len, trailer_len as usize)?;
    if trailer[..SFH_DELIM2.len()] != SFH_DELIM2 {
        return Err(NitfError::CorruptHeader(
            "file length placeholder is set but no streaming trailer delimiter was found".into(),
        ));
    }
    let l2 = parse_uint(&trailer[SFH_DELIM2.len()..]).ok_or_else(|| {
        NitfError::CorruptHeader("streaming trailer length is non-numeric".into())
    })?;
    let block_start = file_len
        .checked_sub(trailer_len + l2)
        .ok_or_else(|| NitfError::CorruptHeader("streaming replica length exceeds the file".into()))?;
    let block = read_at(file, block_start, l2 as usize)?;

    let lead_len = SFH_DELIM1.len() + SFH_LEN_DIGITS;
    if block.len() < lead_len || block[..SFH_DELIM1.len()] != SFH_DELIM1 {
        return Err(NitfError::CorruptHeader(
            "streaming replica does not open with its delimiter".into(),
        ));
    }
    let l1 = parse_uint(&block[SFH_DELIM1.len()..lead_len]).ok_or_else(|| {
        NitfError::CorruptHeader("streaming replica length field is non-numeric".into())
    })?;
    if l1 != l2 {
        return Err(NitfError::CorruptHeader(format!(
            "streaming replica length fields disagree ({l1} leading, {l2} trailing)"
        )));
    }
    Ok(block[lead_len..].to_vec())
}

/// Gather the file-level TRE blob: the UDHD span then the XHD span, each
/// declared by a 5-digit length that includes a 3-byte overflow index when
/// non-zero.
fn collect_file_tre(header: &[u8], mut offset: usize) -> Result<Vec<u8>> {
    let r = FieldReader::new(header);
    let mut blob = Vec::new();
    for name in ["UDHDL", "XHDL"] {
        let decl = r.uint_at(offset, 5).ok_or_else(|| {
            NitfError::CorruptHeader(format!("header field {name} is missing or non-numeric"))
        })? as usize;
        offset += 5;
        if decl > 0 {
            if decl < 3 {
                return Err(NitfError::CorruptHeader(format!(
                    "header field {name} of {decl} cannot hold its overflow index"
                )));
            }
            let span = r.bytes_at(offset + 3, decl - 3).ok_or_else(|| {
                NitfError::CorruptHeader(format!(
                    "header field {name} declares {decl} bytes past the header end"
                ))
            })?;
            blob.extend_from_slice(span);
            offset += decl;
        }
    }
    Ok(blob)
}
