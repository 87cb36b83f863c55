//! Core data model shared across the migration and reconciliation engine.

use std::collections::BTreeMap;

/// An isolated account/namespace in the identity directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub enabled: bool,
}

/// A flat namespace of objects within one tenant.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Container {
    pub name: String,
    pub object_count: u64,
    pub byte_count: u64,
    pub acl_read: Option<String>,
    pub acl_write: Option<String>,
}

impl Container {
    /// `_segments`-suffixed containers are internal to large-object layout
    /// and excluded from reconciliation listings.
    pub fn is_segments_container(&self) -> bool {
        self.name.ends_with("_segments")
    }
}

/// One object as reported by the gateway, with lowercased headers.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ObjectDescriptor {
    pub name: String,
    pub bytes: u64,
    pub hash: String,
    pub headers: BTreeMap<String, String>,
}

impl ObjectDescriptor {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn user_metadata(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .filter(|(k, _)| k.starts_with("x-object-meta-"))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

pub const OLD_HASH_HEADER: &str = "x-object-meta-old-hash";
pub const MANIFEST_HEADER: &str = "x-object-manifest";
pub const SLO_HEADER: &str = "x-static-large-object";

/// How the classifier (C3) tags a source object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectVariant {
    Normal,
    SingleLarge,
    Dlo { manifest: String },
    Slo,
    S3Multipart,
}

impl ObjectVariant {
    pub fn is_dlo(&self) -> bool {
        matches!(self, ObjectVariant::Dlo { .. })
    }
}

/// The outcome of the skip decider (C4).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Skip,
    Transfer,
}

/// A planned (or executed) per-object action, used both to drive the
/// migrator and to render audit-file lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferPlan {
    pub container: String,
    pub object: String,
    pub variant: ObjectVariant,
    pub decision: Decision,
    pub reason: String,
}

/// Outcome of running a `TransferPlan` through the migrator (C5).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    Skipped,
    Transferred { bytes: u64 },
    Failed { reason: String },
}

/// A contiguous slice of tenants handed to one worker (C8).
#[derive(Clone, Debug, Default)]
pub struct WorkerBucket(pub Vec<Tenant>);

impl WorkerBucket {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Global, mutex-guarded run totals. All three fields are updated together
/// so that their sum stays additive across workers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub containers_seen: u64,
    pub objects_seen: u64,
    pub bytes_seen: u64,
}

impl Counters {
    pub fn add(&mut self, containers: u64, objects: u64, bytes: u64) {
        self.containers_seen += containers;
        self.objects_seen += objects;
        self.bytes_seen += bytes;
    }
}
