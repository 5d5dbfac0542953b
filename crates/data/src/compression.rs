//! Cluster blob codec: compact JSON, zlib level 6, base64, tagged with a
//! literal `ZLIB:` prefix. Untagged values are treated as plain JSON so
//! rows written before the compression rollout keep decoding.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::models::ClusterDoc;

/// Prefix identifying compressed blobs.
pub const COMPRESSION_TAG: &str = "ZLIB:";

/// Serializes and compresses a cluster document into a tagged blob.
///
/// # Errors
/// Returns an error if serialization or compression fails.
pub fn compress_clusters(doc: &ClusterDoc) -> Result<String> {
    let json = serde_json::to_vec(doc).context("serializing cluster document")?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(6));
    encoder
        .write_all(&json)
        .context("compressing cluster document")?;
    let compressed = encoder.finish().context("finishing zlib stream")?;

    Ok(format!("{COMPRESSION_TAG}{}", BASE64.encode(compressed)))
}

/// Decodes a blob, compressed or not, back into a cluster document.
///
/// # Errors
/// Returns an error if the blob is neither a valid tagged blob nor plain
/// JSON.
pub fn decompress_clusters(blob: &str) -> Result<ClusterDoc> {
    if let Some(encoded) = blob.strip_prefix(COMPRESSION_TAG) {
        let compressed = BASE64
            .decode(encoded)
            .context("base64-decoding cluster blob")?;

        let mut decoder = ZlibDecoder::new(compressed.as_slice());
        let mut json = Vec::new();
        decoder
            .read_to_end(&mut json)
            .context("decompressing cluster blob")?;

        return serde_json::from_slice(&json).context("parsing decompressed cluster document");
    }

    serde_json::from_str(blob).context("parsing uncompressed cluster document")
}

/// Returns true if a blob carries the compression tag.
#[must_use]
pub fn is_compressed(blob: &str) -> bool {
    blob.starts_with(COMPRESSION_TAG)
}
