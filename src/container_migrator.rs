//! Container Migrator (C6): ensures the target container exists with the
//! two ACL headers copied from source, then routes every source object
//! through the migrator (C5). Container creation does not copy arbitrary
//! metadata — only `x-container-read`/`x-container-write` — by design.

use std::collections::BTreeMap;

use futures_util::StreamExt;

use crate::error::MigrateError;
use crate::gateway::ObjectStoreClient;
use crate::migrator::migrate_object;
use crate::model::{Container, TransferOutcome};

#[derive(Debug, Default)]
pub struct ContainerMigrationReport {
    pub container: String,
    pub transferred: u64,
    pub transferred_bytes: u64,
    pub skipped: u64,
    pub failed: Vec<(String, String)>,
    pub audit_lines: Vec<String>,
}

pub async fn migrate_container(
    source: &dyn ObjectStoreClient,
    target: &dyn ObjectStoreClient,
    source_container: &Container,
) -> ContainerMigrationReport {
    let mut report = ContainerMigrationReport {
        container: source_container.name.clone(),
        ..Default::default()
    };

    match target.head_container(&source_container.name).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            let mut headers = BTreeMap::new();
            if let Some(read) = &source_container.acl_read {
                headers.insert("x-container-read".to_string(), read.clone());
            }
            if let Some(write) = &source_container.acl_write {
                headers.insert("x-container-write".to_string(), write.clone());
            }
            if let Err(e) = target.post_container(&source_container.name, headers).await {
                let scoped = MigrateError::ContainerScope { container: source_container.name.clone(), source: e.into() };
                report.audit_lines.push(format!("container {}: creation failed: {scoped}", source_container.name));
                report.failed.push((source_container.name.clone(), scoped.to_string()));
                return report;
            }
        }
        Err(e) => {
            let scoped = MigrateError::ContainerScope { container: source_container.name.clone(), source: e.into() };
            report.audit_lines.push(format!("container {}: head failed: {scoped}", source_container.name));
            report.failed.push((source_container.name.clone(), scoped.to_string()));
            return report;
        }
    }

    let mut pages = source.list_objects(&source_container.name).await;
    while let Some(page) = pages.next().await {
        let objects = match page {
            Ok(objects) => objects,
            Err(e) => {
                let scoped = MigrateError::ContainerScope { container: source_container.name.clone(), source: e.into() };
                report.audit_lines.push(format!("container {}: listing failed: {scoped}", source_container.name));
                break;
            }
        };
        for obj in objects {
            let (outcome, audit) = migrate_object(source, target, &source_container.name, &obj).await;
            report.audit_lines.extend(audit);
            match outcome {
                TransferOutcome::Skipped => report.skipped += 1,
                TransferOutcome::Transferred { bytes } => {
                    report.transferred += 1;
                    report.transferred_bytes += bytes;
                }
                TransferOutcome::Failed { reason } => report.failed.push((obj.name.clone(), reason)),
            }
        }
    }

    report
}
