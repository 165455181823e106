//! Input archive builders and output archive readers

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

fn append_entries<W: Write>(builder: &mut tar::Builder<W>, entries: &[(&str, Vec<u8>)]) {
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, data.as_slice()).unwrap();
    }
}

/// Write an uncompressed tar with the given (name, body) entries
pub fn write_tar(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let mut builder = tar::Builder::new(File::create(path).unwrap());
    append_entries(&mut builder, entries);
    builder.into_inner().unwrap().flush().unwrap();
}

/// Write a gzip-compressed tar with the given (name, body) entries
pub fn write_tar_gz(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::fast());
    let mut builder = tar::Builder::new(encoder);
    append_entries(&mut builder, entries);
    builder.into_inner().unwrap().finish().unwrap();
}

fn jsonl_body(texts: &[String]) -> String {
    texts
        .iter()
        .map(|text| serde_json::json!({ "text": text }).to_string() + "\n")
        .collect()
}

/// Write one `{"text": ..}` object per line
pub fn write_jsonl(path: &Path, texts: &[String]) {
    std::fs::write(path, jsonl_body(texts)).unwrap();
}

/// Gzip-compressed variant of [`write_jsonl`]
pub fn write_jsonl_gz(path: &Path, texts: &[String]) {
    let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::fast());
    encoder.write_all(jsonl_body(texts).as_bytes()).unwrap();
    encoder.finish().unwrap();
}

/// All (name, body) entries of an output `.tar.gz`, in archive order
pub fn read_output(path: &Path) -> Vec<(String, Vec<u8>)> {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut body = Vec::new();
            entry.read_to_end(&mut body).unwrap();
            (name, body)
        })
        .collect()
}

/// Entries sharing one base id
#[derive(Debug)]
pub struct OutputGroup {
    pub base_id: String,
    /// (variant index, body) in archive order
    pub variants: Vec<(usize, Vec<u8>)>,
}

/// Split entries named `{base}_{n}.{ext}` into groups, in first-seen order
pub fn group_entries(entries: Vec<(String, Vec<u8>)>) -> Vec<OutputGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: BTreeMap<String, Vec<(usize, Vec<u8>)>> = BTreeMap::new();

    for (name, body) in entries {
        let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap();
        let (base, index) = stem.rsplit_once('_').unwrap();
        if !groups.contains_key(base) {
            order.push(base.to_string());
        }
        groups
            .entry(base.to_string())
            .or_default()
            .push((index.parse().unwrap(), body));
    }

    order
        .into_iter()
        .map(|base_id| OutputGroup {
            variants: groups.remove(&base_id).unwrap_or_default(),
            base_id,
        })
        .collect()
}
