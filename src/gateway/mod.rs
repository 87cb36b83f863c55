//! Object-Store Gateway (C1): a uniform streaming adapter over source and
//! target stores. The trait is intentionally thin — list/stat/download/
//! upload/delete/post/head — so that both an S3-compatible gateway and a
//! genuine Swift proxy can implement it. Concrete HTTP wiring lives in
//! [`http`]; everything above this trait (classifier, skip decider,
//! migrator, reconciler, scheduler) is written against the trait alone.

pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

use crate::model::{Container, ObjectDescriptor};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

/// A lazy, one-pass page of a paginated listing. Each page either succeeds
/// with a slice of the listing or fails with an error that aborts
/// iteration — implementations must never buffer the full listing.
pub type Page<T> = Result<Vec<T>, GatewayError>;

/// Boxed async byte stream returned by `download`; dropping it must release
/// any underlying connection even on partial consumption.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send + Unpin>>;

#[derive(Clone, Debug, Default)]
pub struct UploadOptions {
    /// When set, the gateway performs a segmented upload with this segment
    /// size, writing parts into `<container>_segments`.
    pub segment_size: Option<u64>,
}

#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    async fn list_containers(&self) -> BoxStream<'_, Page<Container>>;

    async fn list_objects(&self, container: &str) -> BoxStream<'_, Page<ObjectDescriptor>>;

    async fn stat_container(&self, name: &str) -> Result<Option<Container>, GatewayError>;

    async fn stat_object(
        &self,
        container: &str,
        name: &str,
    ) -> Result<Option<ObjectDescriptor>, GatewayError>;

    /// Returns a byte stream plus the headers observed at acquisition time.
    async fn download(
        &self,
        container: &str,
        name: &str,
    ) -> Result<(ByteStream, BTreeMap<String, String>), GatewayError>;

    async fn upload(
        &self,
        container: &str,
        name: &str,
        body: ByteStream,
        headers: BTreeMap<String, String>,
        options: UploadOptions,
    ) -> Result<(), GatewayError>;

    /// Server-side copy within the same store (used by the duplicate-
    /// collision reconciler to avoid a download/upload round trip).
    async fn copy_object(
        &self,
        source_container: &str,
        source_name: &str,
        dest_container: &str,
        dest_name: &str,
    ) -> Result<(), GatewayError>;

    async fn post_container(
        &self,
        name: &str,
        headers: BTreeMap<String, String>,
    ) -> Result<(), GatewayError>;

    async fn delete_container(&self, name: &str) -> Result<(), GatewayError>;

    async fn delete_object(&self, container: &str, name: &str) -> Result<(), GatewayError>;

    async fn head_container(&self, name: &str) -> Result<Option<Container>, GatewayError>;

    /// `x-account-*` account-level stats used by the scheduler.
    async fn account_stats(&self) -> Result<AccountStats, GatewayError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccountStats {
    pub container_count: u64,
    pub object_count: u64,
    pub bytes_used: u64,
}

/// Wraps an in-memory byte buffer as an `AsyncRead`, used when uploading
/// from a zero-body placeholder (DLO creation) or small in-memory bodies.
pub fn empty_stream() -> ByteStream {
    Box::pin(tokio::io::empty())
}

/// A pre-loaded in-memory `AsyncRead`. Not used for large objects — those
/// always go through a spooled temp file — only for small, known-size
/// bodies such as the zero-length DLO placeholder.
struct BytesReader {
    data: Bytes,
    pos: usize,
}

impl AsyncRead for BytesReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..n]);
        self.pos += n;
        Poll::Ready(Ok(()))
    }
}

pub fn bytes_stream(data: Bytes) -> ByteStream {
    Box::pin(BytesReader { data, pos: 0 })
}
