//! Binary manifest encoding.
//!
//! # Layout
//!
//! All integers are big-endian; strings and blobs are `i32` length-prefixed.
//!
//! ```text
//! format_version   i32
//! dependency_blob  bytes    graph blob, see `dependency`
//! file_table       bytes    bincode-encoded Vec<FileInfo>
//! version          string   "<semVer>+<buildCode>" or empty
//! checksum         string   md5 hex of every byte above
//! -- format_version >= 1 --
//! tag              string
//! -- always --
//! sub_patch_count  i32
//! sub_patches      string * sub_patch_count
//! -- format_version >= 3 --
//! record_count     i32
//! records          (name, file_name, size:i64, md5, bundle_hash) * record_count
//! ```
//!
//! A buffer starting with the graph magic has no wrapper at all and decodes
//! as a bare graph.

use super::dependency::{is_graph_blob, DependencyGraph};
use super::error::ManifestResult;
use super::types::{FileInfo, Manifest, ManifestParts};
use super::version::OLDEST_VERSION;
use super::wire::{WireReader, WireWriter};
use crate::integrity::bytes_md5;

/// Format version written by [`encode`].
pub const FORMAT_VERSION: i32 = 3;

/// First format version carrying the tag.
const TAG_SINCE: i32 = 1;

/// First format version carrying full file records after the header.
const RECORDS_SINCE: i32 = 3;

/// Encodes a manifest at the current format version.
pub fn encode(manifest: &Manifest) -> ManifestResult<Vec<u8>> {
    let mut writer = WireWriter::new();
    writer.write_i32(FORMAT_VERSION);
    writer.write_bytes(manifest.dependency_blob());
    let table = bincode::serialize(manifest.files())?;
    writer.write_bytes(&table);
    writer.write_string(manifest.version());

    let checksum = bytes_md5(writer.as_slice());
    writer.write_string(&checksum);

    writer.write_string(manifest.tag());
    writer.write_len(manifest.sub_patches().len());
    for sub in manifest.sub_patches() {
        writer.write_string(sub);
    }

    writer.write_len(manifest.files().len());
    for info in manifest.files() {
        write_record(&mut writer, info);
    }

    Ok(writer.into_inner())
}

/// Decodes a manifest buffer.
///
/// An empty buffer yields an empty manifest. A checksum mismatch does not
/// fail the decode; the version is replaced with [`OLDEST_VERSION`] so that
/// any comparison asks for a full re-sync.
pub fn decode(name: &str, buf: &[u8]) -> ManifestResult<Manifest> {
    if buf.is_empty() {
        return Ok(Manifest::empty(name));
    }

    if is_graph_blob(buf) {
        let graph = DependencyGraph::decode(buf)?;
        tracing::debug!(manifest = %name, bundles = graph.len(), "decoded bare dependency graph");
        return Ok(Manifest::foreign(name.to_string(), buf.to_vec(), graph));
    }

    let mut reader = WireReader::new(buf);
    let format_version = reader.read_i32()?;
    let blob = reader.read_bytes()?.to_vec();
    let table = reader.read_bytes()?;
    let mut version = reader.read_string()?;

    let expected = bytes_md5(reader.consumed());
    let checksum = reader.read_string()?;
    if checksum != expected {
        tracing::warn!(
            manifest = %name,
            embedded = %checksum,
            computed = %expected,
            "manifest checksum mismatch, treating as oldest version"
        );
        version = OLDEST_VERSION.to_string();
    }

    let tag = if format_version >= TAG_SINCE {
        reader.read_string()?
    } else {
        String::new()
    };
    let count = reader.read_len()?;
    let mut sub_patches = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        sub_patches.push(reader.read_string()?);
    }

    let files = if format_version >= RECORDS_SINCE {
        let count = reader.read_len()?;
        let mut files = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            files.push(read_record(&mut reader)?);
        }
        files
    } else {
        bincode::deserialize::<Vec<FileInfo>>(table)?
    };

    if !reader.is_at_end() {
        tracing::debug!(
            manifest = %name,
            offset = reader.position(),
            "ignoring trailing manifest bytes"
        );
    }

    let graph = DependencyGraph::decode(&blob)?;
    let parts = ManifestParts {
        version,
        tag,
        sub_patches,
        files,
        graph,
    };
    Manifest::from_parts_with_blob(name.to_string(), parts, blob)
}

fn write_record(writer: &mut WireWriter, info: &FileInfo) {
    writer.write_string(&info.name);
    writer.write_string(&info.file_name);
    writer.write_i64(info.size);
    writer.write_string(&info.md5);
    writer.write_string(&info.bundle_hash);
}

fn read_record(reader: &mut WireReader<'_>) -> ManifestResult<FileInfo> {
    Ok(FileInfo {
        name: reader.read_string()?,
        file_name: reader.read_string()?,
        size: reader.read_i64()?,
        md5: reader.read_string()?,
        bundle_hash: reader.read_string()?,
    })
}
