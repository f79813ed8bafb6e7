//! End-to-end container tests over synthetic files: the modern header
//! layout, the streaming-header recovery path, segment cataloging, and
//! attachment resolution.

use std::fs;
use std::path::PathBuf;

use nitf_core::{NitfError, NitfFile, SegmentKind, Version};

fn temp_path(name: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("nitf-core-test-{}-{}", std::process::id(), name));
    p
}

fn write_temp(name: &str, bytes: &[u8]) -> PathBuf {
    let p = temp_path(name);
    fs::write(&p, bytes).unwrap();
    p
}

/// A minimal, attachable NITF02.10 image subheader: 16x16 mono, no
/// geolocation, no comments, no compression, no LUTs, no TREs.
fn image_subheader(idlvl: i32, ialvl: i32, loc: (i32, i32), tre: &[u8]) -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(b"IM");
    b.extend_from_slice(format!("{:<10}", "TEST").as_bytes());
    b.extend_from_slice(b"20260829120000");
    b.extend_from_slice(&[b' '; 17]); // TGTID
    b.extend_from_slice(&[b' '; 80]); // IID2
    b.extend_from_slice(&[b' '; 167]); // security block
    b.extend_from_slice(b"0"); // ENCRYP
    b.extend_from_slice(&[b' '; 42]); // ISORCE
    b.extend_from_slice(b"0000001600000016"); // NROWS, NCOLS
    b.extend_from_slice(b"INT");
    b.extend_from_slice(format!("{:<8}", "MONO").as_bytes());
    b.extend_from_slice(format!("{:<8}", "VIS").as_bytes());
    b.extend_from_slice(b"08R");
    b.extend_from_slice(b" "); // ICORDS blank: no IGEOLO
    b.extend_from_slice(b"0"); // NICOM
    b.extend_from_slice(b"NC"); // IC
    b.extend_from_slice(b"1"); // NBANDS
    b.extend_from_slice(b"M ");
    b.extend_from_slice(&[b' '; 6]); // ISUBCAT
    b.extend_from_slice(b"N   "); // IFC + IMFLT
    b.extend_from_slice(b"0"); // NLUTS
    b.extend_from_slice(b"0B0001000100160016"); // ISYNC..NPPBV
    b.extend_from_slice(b"08"); // NBPP
    b.extend_from_slice(format!("{idlvl:03}{ialvl:03}").as_bytes());
    b.extend_from_slice(format!("{:05}{:05}", loc.0, loc.1).as_bytes());
    b.extend_from_slice(b"1.0 "); // IMAG
    b.extend_from_slice(b"00000"); // UDIDL
    if tre.is_empty() {
        b.extend_from_slice(b"00000"); // IXSHDL
    } else {
        b.extend_from_slice(format!("{:05}", tre.len() + 3).as_bytes());
        b.extend_from_slice(b"000"); // IXSOFL
        b.extend_from_slice(tre);
    }
    b
}

/// Build a full NITF02.10 file around the given image subheaders (each
/// followed by a 256-byte data payload) and file-level TRE blob.
fn modern_file(images: &[Vec<u8>], file_tre: &[u8]) -> Vec<u8> {
    let image_data_len = 256usize;
    let mut tables = Vec::new();
    tables.extend_from_slice(format!("{:03}", images.len()).as_bytes());
    for sub in images {
        tables.extend_from_slice(format!("{:06}{:010}", sub.len(), image_data_len).as_bytes());
    }
    tables.extend_from_slice(b"000"); // NUMS
    tables.extend_from_slice(b"000"); // NUMX
    tables.extend_from_slice(b"000"); // NUMT
    tables.extend_from_slice(b"000"); // NUMDES
    tables.extend_from_slice(b"000"); // NUMRES

    let mut trailer = Vec::new();
    if file_tre.is_empty() {
        trailer.extend_from_slice(b"00000"); // UDHDL
    } else {
        trailer.extend_from_slice(format!("{:05}", file_tre.len() + 3).as_bytes());
        trailer.extend_from_slice(b"000"); // UDHOFL
        trailer.extend_from_slice(file_tre);
    }
    trailer.extend_from_slice(b"00000"); // XHDL

    let header_len = 360 + tables.len() + trailer.len();
    let file_len =
        header_len + images.iter().map(|s| s.len() + image_data_len).sum::<usize>();

    let mut b = Vec::new();
    b.extend_from_slice(b"NITF02.10");
    b.resize(342, b' ');
    b.extend_from_slice(format!("{file_len:012}").as_bytes());
    b.extend_from_slice(format!("{header_len:06}").as_bytes());
    b.extend_from_slice(&tables);
    b.extend_from_slice(&trailer);
    for sub in images {
        b.extend_from_slice(sub);
        b.resize(b.len() + image_data_len, 0xAB);
    }
    b
}

#[test]
fn open_minimal_modern() {
    let bytes = modern_file(&[], b"");
    let path = write_temp("minimal", &bytes);
    let file = NitfFile::open(&path).unwrap();
    assert_eq!(file.version, Version::Nitf0210);
    assert!(!file.streaming);
    assert_eq!(file.file_len, bytes.len() as u64);
    assert_eq!(file.header_len, bytes.len() as u64);
    assert!(file.segments.is_empty());
    assert!(file.file_tre().is_empty());
    assert_eq!(file.header_fields.get("FHDR"), Some("NITF"));
    fs::remove_file(path).unwrap();
}

#[test]
fn bad_magic_is_format_error() {
    let path = write_temp("badmagic", b"GIF89a not imagery at all, promise");
    let err = NitfFile::open(&path).unwrap_err();
    assert!(matches!(err, NitfError::Format(_)));
    fs::remove_file(path).unwrap();
}

#[test]
fn truncated_header_is_corrupt() {
    let mut bytes = modern_file(&[], b"");
    bytes.truncate(370);
    let path = write_temp("truncated", &bytes);
    assert!(NitfFile::open(&path).is_err());
    fs::remove_file(path).unwrap();
}

#[test]
fn image_segment_catalog_and_subheader() {
    let sub = image_subheader(1, 0, (0, 0), b"");
    let bytes = modern_file(&[sub.clone()], b"");
    let path = write_temp("oneimage", &bytes);
    let mut file = NitfFile::open(&path).unwrap();

    assert_eq!(file.segments.len(), 1);
    let seg = file.segments[0].clone();
    assert_eq!(seg.kind, SegmentKind::Image);
    assert_eq!(seg.header_len, sub.len() as u64);
    assert_eq!(seg.data_len, 256);
    assert_eq!(seg.data_end(), bytes.len() as u64);

    let image = file.image(0).unwrap();
    assert_eq!(image.nrows, 16);
    assert_eq!(image.ncols, 16);
    assert_eq!(image.nbands, 1);
    assert!(image.igeolo.is_none());
    assert_eq!(image.fields.get("IC"), Some("NC"));

    let data = file.read_segment_data(0).unwrap();
    assert_eq!(data.len(), 256);
    assert!(data.iter().all(|&b| b == 0xAB));
    fs::remove_file(path).unwrap();
}

#[test]
fn data_range_overflow_is_an_error_not_a_panic() {
    let sub = image_subheader(1, 0, (0, 0), b"");
    let bytes = modern_file(&[sub], b"");
    let path = write_temp("rangeovf", &bytes);
    let mut file = NitfFile::open(&path).unwrap();
    let err = file.read_segment_data_range(0, u64::MAX, 2).unwrap_err();
    assert!(matches!(err, NitfError::SegmentTable(_)));
    fs::remove_file(path).unwrap();
}

#[test]
fn image_subheader_is_served_from_cache() {
    let sub = image_subheader(1, 0, (0, 0), b"");
    let bytes = modern_file(&[sub], b"");
    let path = write_temp("imgcache", &bytes);
    let mut file = NitfFile::open(&path).unwrap();

    // Clobber the subheader bytes on disk behind the open handle; the
    // accessor must keep serving the parse taken at open time.
    let start = file.header_len as usize;
    let mut clobbered = bytes.clone();
    for b in &mut clobbered[start..start + 100] {
        *b = b'!';
    }
    fs::write(&path, &clobbered).unwrap();

    let image = file.image(0).unwrap();
    assert_eq!(image.nrows, 16);
    assert_eq!(image.ncols, 16);
    fs::remove_file(path).unwrap();
}

#[test]
fn segment_past_file_end_is_rejected() {
    let sub = image_subheader(1, 0, (0, 0), b"");
    let mut bytes = modern_file(&[sub], b"");
    bytes.truncate(bytes.len() - 100);
    let path = write_temp("pastend", &bytes);
    let err = NitfFile::open(&path).unwrap_err();
    assert!(matches!(err, NitfError::SegmentTable(_)));
    fs::remove_file(path).unwrap();
}

#[test]
fn attachment_chain_resolves_in_any_order() {
    // The child (display level 2, attached to level 1) comes first in the
    // file; its parent is the second segment.
    let child = image_subheader(2, 1, (5, 5), b"");
    let parent = image_subheader(1, 0, (10, 20), b"");
    let bytes = modern_file(&[child, parent], b"");
    let path = write_temp("attach", &bytes);
    let file = NitfFile::open(&path).unwrap();
    assert_eq!(file.segments[0].ccs, Some((15, 25)));
    assert_eq!(file.segments[1].ccs, Some((10, 20)));
    fs::remove_file(path).unwrap();
}

#[test]
fn dangling_attachment_keeps_reachable_segments() {
    // One image resolves normally; the other names a parent level that no
    // segment carries. The open must still succeed, keep the reachable
    // placement, and report the failure on the side.
    let good = image_subheader(1, 0, (10, 20), b"");
    let orphan = image_subheader(2, 7, (5, 5), b"");
    let bytes = modern_file(&[good, orphan], b"");
    let path = write_temp("dangling", &bytes);
    let file = NitfFile::open(&path).unwrap();
    assert_eq!(file.segments[0].ccs, Some((10, 20)));
    assert_eq!(file.segments[1].ccs, None);
    let err = file.attachment_error().unwrap();
    assert!(matches!(err, NitfError::UnresolvedAttachment(_)));
    assert!(err.to_string().contains("IM segment 1"));
    fs::remove_file(path).unwrap();
}

#[test]
fn clean_attachment_graph_reports_no_error() {
    let sub = image_subheader(1, 0, (0, 0), b"");
    let bytes = modern_file(&[sub], b"");
    let path = write_temp("cleanattach", &bytes);
    let file = NitfFile::open(&path).unwrap();
    assert!(file.attachment_error().is_none());
    fs::remove_file(path).unwrap();
}

#[test]
fn file_level_tre_blob() {
    let mut tre = Vec::new();
    tre.extend_from_slice(b"STDIDC00089");
    tre.extend_from_slice(&[b'x'; 89]);
    let bytes = modern_file(&[], &tre);
    let path = write_temp("filetre", &bytes);
    let file = NitfFile::open(&path).unwrap();
    assert_eq!(file.file_tre(), &tre[..]);
    let decoded = nitf_core::decode_tre_blob(file.file_tre());
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].tag, "STDIDC");
    assert!(decoded[0].error.is_none());
    fs::remove_file(path).unwrap();
}

#[test]
fn streaming_header_is_recovered_from_the_trailer() {
    // A streaming writer leaves all-nines in FL at the front and appends
    // the completed header, framed by delimiters and length fields, at the
    // end of the file.
    let finished = modern_file(&[], b"");
    let header_len = finished.len();

    let replica_len = 4 + 7 + header_len;
    let file_len = header_len + replica_len + 11;

    let mut front = finished.clone();
    front[342..354].copy_from_slice(b"999999999999");

    let mut back = finished;
    back[342..354].copy_from_slice(format!("{file_len:012}").as_bytes());

    let mut bytes = front;
    bytes.extend_from_slice(&[0x0A, 0x6E, 0x1D, 0x97]);
    bytes.extend_from_slice(format!("{replica_len:07}").as_bytes());
    bytes.extend_from_slice(&back);
    bytes.extend_from_slice(&[0x0E, 0xCA, 0x14, 0xBF]);
    bytes.extend_from_slice(format!("{replica_len:07}").as_bytes());
    assert_eq!(bytes.len(), file_len);

    let path = write_temp("streaming", &bytes);
    let file = NitfFile::open(&path).unwrap();
    assert!(file.streaming);
    assert_eq!(file.version, Version::Nitf0210);
    assert_eq!(file.header_fields.get("FL").unwrap(), format!("{file_len:012}"));
    fs::remove_file(path).unwrap();
}

#[test]
fn streaming_placeholder_without_trailer_fails() {
    let mut bytes = modern_file(&[], b"");
    bytes[342..354].copy_from_slice(b"999999999999");
    let path = write_temp("nostream", &bytes);
    let err = NitfFile::open(&path).unwrap_err();
    assert!(matches!(err, NitfError::CorruptHeader(_)));
    fs::remove_file(path).unwrap();
}
