//! CLI for nitf-core: dump container structure, metadata, and TREs from
//! NITF/NSIF files or directories of them.

#![cfg(feature = "cli")]

use clap::Parser;
use indexmap::IndexMap;
use nitf_core::{decode_tre_blob, is_nitf, NitfFile, SegmentKind};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[derive(Parser)]
#[command(name = "nitf-dump")]
#[command(about = "Dump NITF/NSIF container structure, metadata, and TREs", long_about = None)]
struct Args {
    /// Path to a file or directory to dump (use -d/--directory for a whole directory)
    path: Option<String>,

    /// Dump every container in a directory (with -r to recurse)
    #[arg(short = 'd', long = "directory", value_name = "DIR")]
    directory: Option<String>,

    /// When dumping a directory, recurse into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// File extensions to consider (comma-separated). Files without an
    /// extension are probed by magic. Use --all to ignore the filter.
    #[arg(short, long, default_value = "ntf,nitf,nsf,nsif")]
    extensions: String,

    /// Probe every file by magic regardless of extension
    #[arg(long)]
    all: bool,

    /// Output JSON per file (one line per file unless --pretty)
    #[arg(long)]
    json: bool,

    /// Pretty-print JSON (use with --json)
    #[arg(long)]
    pretty: bool,

    /// Also decode TREs (file-level and per-image)
    #[arg(short, long)]
    tres: bool,

    /// Quiet: only print paths that fail to open
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let exts: std::collections::HashSet<String> = args
        .extensions
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .collect();

    let path_str = args
        .directory
        .as_ref()
        .or(args.path.as_ref())
        .ok_or("Missing path: give a file/directory as argument or use -d/--directory <DIR>")?;
    let path = Path::new(path_str.as_str());

    if !path.exists() {
        eprintln!("Not found: {}", path.display());
        std::process::exit(1);
    }

    if path.is_file() {
        if args.directory.is_some() {
            eprintln!("--directory expects a directory, not a file: {}", path.display());
            std::process::exit(1);
        }
        dump_file(path, &args)?;
        return Ok(());
    }

    if path.is_dir() {
        if !args.quiet {
            eprintln!(
                "Dumping directory: {} {}",
                path.display(),
                if args.recursive { "(recursive)" } else { "" }
            );
        }
        dump_dir(path, &args, &exts)?;
        return Ok(());
    }

    eprintln!("Not a file or directory: {}", path.display());
    std::process::exit(1);
}

fn dump_dir(
    dir: &Path,
    args: &Args,
    exts: &std::collections::HashSet<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let walker = if args.recursive {
        WalkDir::new(dir).into_iter()
    } else {
        WalkDir::new(dir).max_depth(1).into_iter()
    };

    let mut total = 0u64;
    let mut failed = 0u64;

    for entry in walker.filter_entry(|e| !e.path().starts_with(".")) {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        if !args.all && !ext.is_empty() && !exts.contains(&ext) {
            continue;
        }
        // Files outside the extension list (or without one) get a magic probe
        // so renamed containers are still picked up under --all.
        if ext.is_empty() || args.all {
            let mut magic = [0u8; 9];
            let ok = fs::File::open(path)
                .and_then(|mut f| std::io::Read::read_exact(&mut f, &mut magic))
                .is_ok();
            if !ok || !is_nitf(&magic) {
                continue;
            }
        }
        total += 1;
        if dump_file(path, args).is_err() {
            failed += 1;
        }
    }

    if !args.quiet {
        eprintln!("Dumped {} containers, {} failed", total, failed);
    }
    Ok(())
}

fn dump_file(path: &Path, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = match NitfFile::open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("FAIL {}: {}", path.display(), e);
            return Err(e.into());
        }
    };
    if args.quiet {
        return Ok(());
    }

    if args.json {
        return print_json(path, &mut file, args);
    }

    println!("{}", path.display());
    let bytes = fs::read(path)?;
    println!("  sha256: {}", sha256_hex(&bytes));
    println!(
        "  version: {}{}",
        file.version.as_str(),
        if file.streaming { " (streaming header)" } else { "" }
    );
    println!("  file length: {} bytes, header {} bytes", file.file_len, file.header_len);

    for (i, seg) in file.segments.clone().iter().enumerate() {
        let ccs = seg
            .ccs
            .map(|(r, c)| format!(" ccs=({r},{c})"))
            .unwrap_or_default();
        println!(
            "  segment {}: {} header {}+{} data {}+{}{}",
            i,
            seg.kind.tag(),
            seg.header_offset,
            seg.header_len,
            seg.data_offset,
            seg.data_len,
            ccs
        );
        match seg.kind {
            SegmentKind::Image => {
                if let Ok(image) = file.image(i) {
                    println!(
                        "    {}x{} pixels, {} band(s), IC={}",
                        image.ncols,
                        image.nrows,
                        image.nbands,
                        image.fields.get("IC").unwrap_or("?")
                    );
                    if let Ok(Some(rpc)) = file.rpc(i) {
                        println!(
                            "    RPC model: line_off={} samp_off={}",
                            rpc.line_off, rpc.samp_off
                        );
                    }
                    if args.tres {
                        print_tres("    ", &image.tre);
                    }
                }
            }
            SegmentKind::DataExtension => {
                if let Ok(des) = file.des(i) {
                    println!("    DESID: {}", des.desid);
                    if let Some(link) = &des.overflow {
                        println!("    overflow of {} item {}", link.destination, link.item);
                    }
                }
            }
            _ => {}
        }
    }

    if args.tres {
        let blob = file.file_tre().to_vec();
        if !blob.is_empty() {
            println!("  file-level TREs:");
            print_tres("    ", &blob);
        }
    }
    Ok(())
}

fn print_tres(indent: &str, blob: &[u8]) {
    for decoded in decode_tre_blob(blob) {
        let status = match &decoded.error {
            Some(e) => format!(" (incomplete: {e})"),
            None => String::new(),
        };
        println!(
            "{}{}: {} field(s), {} byte(s){}",
            indent,
            decoded.tag,
            decoded.fields.len(),
            decoded.consumed,
            status
        );
        for w in &decoded.warnings {
            println!("{}  warning: {}", indent, w);
        }
    }
}

fn print_json(
    path: &Path,
    file: &mut NitfFile,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = fs::read(path)?;
    let mut out = IndexMap::<String, serde_json::Value>::new();
    out.insert("sha256".into(), serde_json::Value::String(sha256_hex(&bytes)));
    out.insert(
        "path".into(),
        serde_json::Value::String(path.display().to_string()),
    );
    out.insert(
        "version".into(),
        serde_json::Value::String(file.version.as_str().to_string()),
    );
    out.insert("streaming".into(), serde_json::Value::Bool(file.streaming));
    out.insert("file_len".into(), serde_json::to_value(file.file_len)?);
    out.insert("header_len".into(), serde_json::to_value(file.header_len)?);
    out.insert("header".into(), serde_json::to_value(&file.header_fields)?);
    out.insert("segments".into(), serde_json::to_value(&file.segments)?);

    if args.tres {
        let mut tres = Vec::new();
        for decoded in decode_tre_blob(&file.file_tre().to_vec()) {
            let mut entry = IndexMap::<String, serde_json::Value>::new();
            entry.insert("tag".into(), serde_json::Value::String(decoded.tag.clone()));
            entry.insert("fields".into(), serde_json::to_value(&decoded.fields)?);
            entry.insert(
                "error".into(),
                serde_json::to_value(decoded.error.as_ref().map(|e| e.to_string()))?,
            );
            tres.push(serde_json::Value::Object(entry.into_iter().collect()));
        }
        out.insert("file_tres".into(), serde_json::Value::Array(tres));
    }

    let json_str = if args.pretty {
        serde_json::to_string_pretty(&out)?
    } else {
        serde_json::to_string(&out)?
    };
    println!("{}", json_str);
    Ok(())
}
