//! Worker Scheduler (C8): spawns one task per tenant bucket, each writing
//! its own truncated audit file and folding results into shared counters
//! under a mutex. Tenants and objects within a worker are strictly
//! sequential — no concurrency within a tenant.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::container_migrator::migrate_container;
use crate::error::MigrateError;
use crate::gateway::ObjectStoreClient;
use crate::model::{Counters, Tenant, WorkerBucket};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Stat,
    Copy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TenantUsage {
    pub containers: u64,
    pub objects: u64,
    pub bytes: u64,
}

/// Acquires per-tenant source/target gateway handles. Implementations own
/// connection setup (auth, region selection); the scheduler only borrows
/// the resulting trait objects for the duration of one tenant's work.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn source_client(&self, tenant: &Tenant) -> anyhow::Result<Box<dyn ObjectStoreClient>>;
    async fn target_client(&self, tenant: &Tenant) -> anyhow::Result<Box<dyn ObjectStoreClient>>;
}

pub struct RunSummary {
    pub elapsed: std::time::Duration,
    pub counters: Counters,
    pub tenant_usage: HashMap<String, TenantUsage>,
}

pub async fn run(
    buckets: Vec<WorkerBucket>,
    act: Action,
    factory: Arc<dyn ClientFactory>,
    audit_dir: PathBuf,
) -> RunSummary {
    let counters = Arc::new(Mutex::new(Counters::default()));
    let tenant_usage = Arc::new(Mutex::new(HashMap::new()));
    let start = Instant::now();

    let mut handles = Vec::new();
    for (index, bucket) in buckets.into_iter().enumerate() {
        let factory = factory.clone();
        let counters = counters.clone();
        let tenant_usage = tenant_usage.clone();
        let audit_dir = audit_dir.clone();
        handles.push(tokio::task::spawn(async move {
            if let Err(e) = run_worker(index, bucket, act, factory.as_ref(), counters, tenant_usage, &audit_dir).await {
                tracing::error!(worker = index, "worker aborted: {e}");
            }
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }

    let elapsed = start.elapsed();
    let counters = *counters.lock().unwrap();
    let tenant_usage = tenant_usage.lock().unwrap().clone();

    let mut by_bytes: Vec<(&String, &TenantUsage)> = tenant_usage.iter().collect();
    by_bytes.sort_by(|a, b| b.1.bytes.cmp(&a.1.bytes));

    println!("elapsed: {elapsed:?}");
    println!(
        "containers_seen={} objects_seen={} bytes_seen={}",
        counters.containers_seen, counters.objects_seen, counters.bytes_seen
    );
    println!("TOP 10 Tenants");
    for (name, usage) in by_bytes.iter().take(10) {
        println!("{name}: {} bytes", usage.bytes);
    }

    tracing::info!(
        ?elapsed,
        containers_seen = counters.containers_seen,
        objects_seen = counters.objects_seen,
        bytes_seen = counters.bytes_seen,
        "migration run complete"
    );

    RunSummary {
        elapsed,
        counters,
        tenant_usage,
    }
}

async fn run_worker(
    index: usize,
    bucket: WorkerBucket,
    act: Action,
    factory: &dyn ClientFactory,
    counters: Arc<Mutex<Counters>>,
    tenant_usage: Arc<Mutex<HashMap<String, TenantUsage>>>,
    audit_dir: &Path,
) -> anyhow::Result<()> {
    let audit_path = audit_dir.join(format!("swift-migrate-worker-{index:02}.output"));
    let mut audit = tokio::fs::File::create(&audit_path).await?;

    let mut max_object: Option<(String, String, String, u64)> = None;

    for tenant in &bucket.0 {
        if let Err(e) = run_tenant(tenant, act, factory, &counters, &tenant_usage, &mut audit, &mut max_object).await {
            let scoped = MigrateError::TenantScope { tenant: tenant.name.clone(), source: e };
            audit.write_all(format!("tenant {}: failed. Reason: {scoped}\n", tenant.name).as_bytes()).await?;
        }
    }

    if let Some((tenant, container, object, bytes)) = max_object {
        audit
            .write_all(
                format!("largest object: tenant={tenant} container={container} object={object} bytes={bytes}\n")
                    .as_bytes(),
            )
            .await?;
    }

    Ok(())
}

async fn run_tenant(
    tenant: &Tenant,
    act: Action,
    factory: &dyn ClientFactory,
    counters: &Arc<Mutex<Counters>>,
    tenant_usage: &Arc<Mutex<HashMap<String, TenantUsage>>>,
    audit: &mut tokio::fs::File,
    max_object: &mut Option<(String, String, String, u64)>,
) -> anyhow::Result<()> {
    let source = factory.source_client(tenant).await?;
    let target = factory.target_client(tenant).await?;

    let stats = source.account_stats().await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    counters
        .lock()
        .unwrap()
        .add(stats.container_count, stats.object_count, stats.bytes_used);
    tenant_usage.lock().unwrap().insert(
        tenant.name.clone(),
        TenantUsage {
            containers: stats.container_count,
            objects: stats.object_count,
            bytes: stats.bytes_used,
        },
    );

    let mut pages = source.list_containers().await;
    while let Some(page) = pages.next().await {
        let containers = page.map_err(|e| anyhow::anyhow!(e.to_string()))?;
        for container in containers {
            match act {
                Action::Stat => {
                    audit
                        .write_all(format!("tenant {} container {}\n", tenant.name, container.name).as_bytes())
                        .await?;
                    let mut opages = source.list_objects(&container.name).await;
                    while let Some(opage) = opages.next().await {
                        let objects = opage.map_err(|e| anyhow::anyhow!(e.to_string()))?;
                        for object in objects {
                            audit
                                .write_all(
                                    format!(
                                        "  object {}/{} bytes={}\n",
                                        container.name, object.name, object.bytes
                                    )
                                    .as_bytes(),
                                )
                                .await?;
                            let is_new_max = max_object.as_ref().map(|(_, _, _, b)| object.bytes > *b).unwrap_or(true);
                            if is_new_max {
                                *max_object =
                                    Some((tenant.name.clone(), container.name.clone(), object.name.clone(), object.bytes));
                            }
                        }
                    }
                }
                Action::Copy => {
                    let report = migrate_container(source.as_ref(), target.as_ref(), &container).await;
                    for line in report.audit_lines {
                        audit.write_all(format!("{line}\n").as_bytes()).await?;
                    }
                }
            }
        }
    }

    Ok(())
}
