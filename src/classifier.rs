//! Object Classifier (C3): a pure function from an object descriptor to its
//! `ObjectVariant`. Checks run in a fixed order and the first match wins.

use regex::Regex;
use std::sync::LazyLock;

use crate::model::{ObjectDescriptor, ObjectVariant, MANIFEST_HEADER, SLO_HEADER};

pub const FIVE_GIB: u64 = 5 * 1024 * 1024 * 1024;

/// ETags produced by S3 multipart uploads look like `<hex-of-hashes>-<count>`,
/// e.g. `d41d8cd98f00b204e9800998ecf8427e-2`. A plain whole-object MD5 never
/// contains a dash, so anchoring both ends avoids misclassifying a
/// coincidentally hyphenated but otherwise normal hash.
static MULTIPART_HASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\w+-\w+$").unwrap());

pub fn is_s3_multipart_hash(hash: &str) -> bool {
    MULTIPART_HASH.is_match(hash)
}

/// Classify a source object. `threshold` is normally [`FIVE_GIB`]; exposed as
/// a parameter so tests can exercise the size boundary cheaply.
pub fn classify(desc: &ObjectDescriptor, threshold: u64) -> ObjectVariant {
    if let Some(manifest) = desc.header(MANIFEST_HEADER) {
        return ObjectVariant::Dlo {
            manifest: manifest.to_string(),
        };
    }
    if desc.header(SLO_HEADER).is_some() {
        return ObjectVariant::Slo;
    }
    if desc.bytes > threshold {
        return ObjectVariant::SingleLarge;
    }
    if is_s3_multipart_hash(&desc.hash) {
        return ObjectVariant::S3Multipart;
    }
    ObjectVariant::Normal
}
