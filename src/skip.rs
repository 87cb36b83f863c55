//! Skip Decider (C4): decides whether a source object needs transferring,
//! given its (possibly absent) target counterpart. The rule is idempotent —
//! a successful prior run always yields `Skip` on re-run.

use crate::classifier::is_s3_multipart_hash;
use crate::model::{Decision, ObjectDescriptor, MANIFEST_HEADER, OLD_HASH_HEADER};

pub fn decide(source: &ObjectDescriptor, target: Option<&ObjectDescriptor>) -> (Decision, String) {
    let Some(target) = target else {
        return (Decision::Transfer, "no target object".to_string());
    };

    if is_s3_multipart_hash(&source.hash) {
        if target.header(OLD_HASH_HEADER) == Some(source.hash.as_str()) {
            return (
                Decision::Skip,
                format!("target carries old-hash {} from prior S3-multipart migration", source.hash),
            );
        }
    }

    if source.header(MANIFEST_HEADER).is_some() {
        let source_len = source.header("content-length");
        let target_len = target.header("content-length");
        if source_len.is_some() && source_len == target_len {
            return (
                Decision::Skip,
                "DLO with matching content-length on target".to_string(),
            );
        }
    }

    if !source.hash.is_empty() && target.header("etag") == Some(source.hash.as_str()) {
        return (Decision::Skip, "target etag matches source hash".to_string());
    }

    (Decision::Transfer, "target present but out of date".to_string())
}
