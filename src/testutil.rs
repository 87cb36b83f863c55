//! In-memory fakes for the gateway and identity-directory traits, used only
//! by unit tests in the modules above. Not wired into any release binary.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use crate::directory::IdentityDirectory;
use crate::gateway::{bytes_stream, AccountStats, ByteStream, GatewayError, ObjectStoreClient, Page, UploadOptions};
use crate::model::{Container, ObjectDescriptor, Tenant};

/// Deterministic content fingerprint standing in for a real ETag/MD5. Tests
/// that need a source and target hash to agree after a round trip derive
/// both from this function rather than hand-picking matching strings.
pub fn content_hash(body: &[u8]) -> String {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in body {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{hash:016x}")
}

#[derive(Clone, Default)]
struct Record {
    bytes: Vec<u8>,
    hash: String,
    extra_headers: BTreeMap<String, String>,
}

#[derive(Default)]
pub struct InMemoryStore {
    objects: Mutex<BTreeMap<(String, String), Record>>,
    containers: Mutex<BTreeMap<String, Container>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, container: &str, desc: ObjectDescriptor, body: Vec<u8>) {
        self.containers
            .lock()
            .unwrap()
            .entry(container.to_string())
            .or_insert_with(|| Container {
                name: container.to_string(),
                ..Default::default()
            });
        self.objects.lock().unwrap().insert(
            (container.to_string(), desc.name.clone()),
            Record {
                bytes: body,
                hash: desc.hash,
                extra_headers: desc.headers,
            },
        );
    }

    pub async fn get_desc(&self, container: &str, name: &str) -> Option<ObjectDescriptor> {
        self.objects
            .lock()
            .unwrap()
            .get(&(container.to_string(), name.to_string()))
            .map(|r| descriptor_of(name, r))
    }

    pub fn stat_container_exists(&self, name: &str) -> bool {
        self.containers.lock().unwrap().contains_key(name)
    }

    pub async fn body_of(&self, container: &str, name: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(container.to_string(), name.to_string()))
            .map(|r| r.bytes.clone())
    }
}

fn descriptor_of(name: &str, record: &Record) -> ObjectDescriptor {
    let mut headers = record.extra_headers.clone();
    headers.insert("etag".to_string(), record.hash.clone());
    headers.insert("content-length".to_string(), record.bytes.len().to_string());
    ObjectDescriptor {
        name: name.to_string(),
        bytes: record.bytes.len() as u64,
        hash: record.hash.clone(),
        headers,
    }
}

#[async_trait]
impl ObjectStoreClient for InMemoryStore {
    async fn list_containers(&self) -> BoxStream<'_, Page<Container>> {
        let containers: Vec<Container> = self.containers.lock().unwrap().values().cloned().collect();
        Box::pin(stream::iter(std::iter::once(Ok(containers))))
    }

    async fn list_objects(&self, container: &str) -> BoxStream<'_, Page<ObjectDescriptor>> {
        let objects: Vec<ObjectDescriptor> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((c, _), _)| c == container)
            .map(|((_, name), r)| descriptor_of(name, r))
            .collect();
        Box::pin(stream::iter(std::iter::once(Ok(objects))))
    }

    async fn stat_container(&self, name: &str) -> Result<Option<Container>, GatewayError> {
        Ok(self.containers.lock().unwrap().get(name).cloned())
    }

    async fn stat_object(&self, container: &str, name: &str) -> Result<Option<ObjectDescriptor>, GatewayError> {
        Ok(self.get_desc(container, name).await)
    }

    async fn download(
        &self,
        container: &str,
        name: &str,
    ) -> Result<(ByteStream, BTreeMap<String, String>), GatewayError> {
        let record = self
            .objects
            .lock()
            .unwrap()
            .get(&(container.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("{container}/{name}")))?;
        let desc = descriptor_of(name, &record);
        Ok((bytes_stream(Bytes::from(record.bytes)), desc.headers))
    }

    async fn upload(
        &self,
        container: &str,
        name: &str,
        mut body: ByteStream,
        headers: BTreeMap<String, String>,
        _options: UploadOptions,
    ) -> Result<(), GatewayError> {
        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut body, &mut buf)
            .await
            .map_err(|e| GatewayError::Transport(e.into()))?;
        let hash = content_hash(&buf);
        self.containers
            .lock()
            .unwrap()
            .entry(container.to_string())
            .or_insert_with(|| Container {
                name: container.to_string(),
                ..Default::default()
            });
        self.objects.lock().unwrap().insert(
            (container.to_string(), name.to_string()),
            Record {
                bytes: buf,
                hash,
                extra_headers: headers,
            },
        );
        Ok(())
    }

    async fn copy_object(
        &self,
        source_container: &str,
        source_name: &str,
        dest_container: &str,
        dest_name: &str,
    ) -> Result<(), GatewayError> {
        let record = self
            .objects
            .lock()
            .unwrap()
            .get(&(source_container.to_string(), source_name.to_string()))
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("{source_container}/{source_name}")))?;
        self.containers
            .lock()
            .unwrap()
            .entry(dest_container.to_string())
            .or_insert_with(|| Container {
                name: dest_container.to_string(),
                ..Default::default()
            });
        self.objects
            .lock()
            .unwrap()
            .insert((dest_container.to_string(), dest_name.to_string()), record);
        Ok(())
    }

    async fn post_container(&self, name: &str, headers: BTreeMap<String, String>) -> Result<(), GatewayError> {
        let mut containers = self.containers.lock().unwrap();
        let entry = containers.entry(name.to_string()).or_insert_with(|| Container {
            name: name.to_string(),
            ..Default::default()
        });
        if let Some(read) = headers.get("x-container-read") {
            entry.acl_read = Some(read.clone());
        }
        if let Some(write) = headers.get("x-container-write") {
            entry.acl_write = Some(write.clone());
        }
        Ok(())
    }

    async fn delete_container(&self, name: &str) -> Result<(), GatewayError> {
        self.containers.lock().unwrap().remove(name);
        self.objects.lock().unwrap().retain(|(c, _), _| c != name);
        Ok(())
    }

    async fn delete_object(&self, container: &str, name: &str) -> Result<(), GatewayError> {
        self.objects.lock().unwrap().remove(&(container.to_string(), name.to_string()));
        Ok(())
    }

    async fn head_container(&self, name: &str) -> Result<Option<Container>, GatewayError> {
        self.stat_container(name).await
    }

    async fn account_stats(&self) -> Result<AccountStats, GatewayError> {
        let containers = self.containers.lock().unwrap();
        let objects = self.objects.lock().unwrap();
        Ok(AccountStats {
            container_count: containers.len() as u64,
            object_count: objects.len() as u64,
            bytes_used: objects.values().map(|r| r.bytes.len() as u64).sum(),
        })
    }
}

#[async_trait]
impl ObjectStoreClient for std::sync::Arc<InMemoryStore> {
    async fn list_containers(&self) -> BoxStream<'_, Page<Container>> {
        (**self).list_containers().await
    }

    async fn list_objects(&self, container: &str) -> BoxStream<'_, Page<ObjectDescriptor>> {
        (**self).list_objects(container).await
    }

    async fn stat_container(&self, name: &str) -> Result<Option<Container>, GatewayError> {
        (**self).stat_container(name).await
    }

    async fn stat_object(&self, container: &str, name: &str) -> Result<Option<ObjectDescriptor>, GatewayError> {
        (**self).stat_object(container, name).await
    }

    async fn download(
        &self,
        container: &str,
        name: &str,
    ) -> Result<(ByteStream, BTreeMap<String, String>), GatewayError> {
        (**self).download(container, name).await
    }

    async fn upload(
        &self,
        container: &str,
        name: &str,
        body: ByteStream,
        headers: BTreeMap<String, String>,
        options: UploadOptions,
    ) -> Result<(), GatewayError> {
        (**self).upload(container, name, body, headers, options).await
    }

    async fn copy_object(
        &self,
        source_container: &str,
        source_name: &str,
        dest_container: &str,
        dest_name: &str,
    ) -> Result<(), GatewayError> {
        (**self).copy_object(source_container, source_name, dest_container, dest_name).await
    }

    async fn post_container(&self, name: &str, headers: BTreeMap<String, String>) -> Result<(), GatewayError> {
        (**self).post_container(name, headers).await
    }

    async fn delete_container(&self, name: &str) -> Result<(), GatewayError> {
        (**self).delete_container(name).await
    }

    async fn delete_object(&self, container: &str, name: &str) -> Result<(), GatewayError> {
        (**self).delete_object(container, name).await
    }

    async fn head_container(&self, name: &str) -> Result<Option<Container>, GatewayError> {
        (**self).head_container(name).await
    }

    async fn account_stats(&self) -> Result<AccountStats, GatewayError> {
        (**self).account_stats().await
    }
}

/// Backs [`crate::scheduler::ClientFactory`] in tests: every tenant shares
/// the same pre-seeded source/target pair, which is enough to exercise the
/// scheduler's counter/audit-file plumbing without per-tenant routing.
pub struct FakeClientFactory {
    pub source: std::sync::Arc<InMemoryStore>,
    pub target: std::sync::Arc<InMemoryStore>,
}

impl FakeClientFactory {
    pub fn seeded() -> Self {
        let source = InMemoryStore::new();
        let body = b"hello scheduler".to_vec();
        let hash = content_hash(&body);
        source
            .containers
            .lock()
            .unwrap()
            .insert("c1".to_string(), Container { name: "c1".to_string(), ..Default::default() });
        source.objects.lock().unwrap().insert(
            ("c1".to_string(), "a".to_string()),
            Record {
                bytes: body,
                hash,
                extra_headers: BTreeMap::new(),
            },
        );
        Self {
            source: std::sync::Arc::new(source),
            target: std::sync::Arc::new(InMemoryStore::new()),
        }
    }
}

#[async_trait]
impl crate::scheduler::ClientFactory for FakeClientFactory {
    async fn source_client(&self, _tenant: &Tenant) -> anyhow::Result<Box<dyn ObjectStoreClient>> {
        Ok(Box::new(self.source.clone()))
    }

    async fn target_client(&self, _tenant: &Tenant) -> anyhow::Result<Box<dyn ObjectStoreClient>> {
        Ok(Box::new(self.target.clone()))
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    tenants: Mutex<Vec<Tenant>>,
    granted: Mutex<BTreeSet<(String, String)>>,
    fail_role_grant_for: Mutex<BTreeSet<String>>,
}

impl FakeDirectory {
    pub fn new(tenants: Vec<Tenant>) -> Self {
        Self {
            tenants: Mutex::new(tenants),
            granted: Mutex::new(BTreeSet::new()),
            fail_role_grant_for: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn fail_role_grant_for(&self, tenant_name: &str) {
        self.fail_role_grant_for.lock().unwrap().insert(tenant_name.to_string());
    }

    pub fn was_granted(&self, tenant_name: &str, role: &str) -> bool {
        self.granted.lock().unwrap().contains(&(tenant_name.to_string(), role.to_string()))
    }
}

#[async_trait]
impl IdentityDirectory for FakeDirectory {
    async fn list_tenants(&self) -> anyhow::Result<Vec<Tenant>> {
        Ok(self.tenants.lock().unwrap().clone())
    }

    async fn ensure_role(&self, tenant: &Tenant, role: &str) -> anyhow::Result<()> {
        if self.fail_role_grant_for.lock().unwrap().contains(&tenant.name) {
            anyhow::bail!("simulated role-grant failure for {}", tenant.name);
        }
        self.granted.lock().unwrap().insert((tenant.name.clone(), role.to_string()));
        Ok(())
    }
}
